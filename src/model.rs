//! The timeline tree (C1): `Project`, `Sequence`, `Timeline`, `Layer`,
//! `Clip`, `AudioTrack`, `AudioClip`, `Marker`, and their sub-structures.
//!
//! This is a pure in-memory representation — no locking here (callers hold
//! the sequence lock, per spec.md §4.1) and no I/O. Generalized from the
//! teacher's `timeline.rs` (`Clip`/`TimelineState`, serde-derived, ids as
//! plain `String`s) to the full data model in spec.md §3.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    Background,
    Content,
    Avatar,
    Effects,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioTrackType {
    Narration,
    Bgm,
    Se,
}

/// Where a mutating operation originated — carried onto every operation
/// record (spec.md §3) so history queries can filter by it (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationSource {
    ApiV1,
    AiChat,
    Editor,
    Batch,
    Semantic,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_anchor")]
    pub anchor: String,
}

fn default_scale() -> f64 {
    1.0
}

fn default_anchor() -> String {
    "center".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChromaKey {
    #[serde(default)]
    pub enabled: bool,
    pub color: Option<String>,
    pub similarity: Option<f64>,
    pub blend: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipEffects {
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default = "default_blend_mode")]
    pub blend_mode: String,
    #[serde(default)]
    pub fade_in_ms: i64,
    #[serde(default)]
    pub fade_out_ms: i64,
    #[serde(default)]
    pub chroma_key: ChromaKey,
}

fn default_opacity() -> f64 {
    1.0
}

fn default_blend_mode() -> String {
    "normal".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub transition_type: String,
    #[serde(default = "default_transition_duration")]
    pub duration_ms: i64,
}

fn default_transition_duration() -> i64 {
    500
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    #[serde(default = "default_font_size")]
    pub font_size: i64,
    #[serde(default = "default_font_color")]
    pub font_color: String,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    pub outline_color: Option<String>,
    #[serde(default)]
    pub outline_width: i64,
    pub shadow_color: Option<String>,
    #[serde(default)]
    pub shadow_offset: i64,
}

fn default_font_size() -> i64 {
    48
}

fn default_font_color() -> String {
    "white".to_string()
}

fn default_font_family() -> String {
    "NotoSansJP".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub shape_type: String,
    pub fill_color: Option<String>,
    pub stroke_color: Option<String>,
    #[serde(default)]
    pub stroke_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crop {
    #[serde(default)]
    pub top: f64,
    #[serde(default)]
    pub bottom: f64,
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub right: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time_ms: i64,
    pub properties: serde_json::Value,
}

/// A visual clip placed on a `Layer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub asset_id: Option<String>,
    pub start_ms: i64,
    pub duration_ms: i64,
    #[serde(default)]
    pub in_point_ms: i64,
    pub out_point_ms: Option<i64>,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub effects: ClipEffects,
    pub transition_in: Option<Transition>,
    pub transition_out: Option<Transition>,
    pub text_content: Option<String>,
    pub text_style: Option<TextStyle>,
    pub shape: Option<Shape>,
    pub crop: Option<Crop>,
    pub keyframes: Option<Vec<Keyframe>>,
    pub group_id: Option<String>,
}

impl Clip {
    pub fn end_ms(&self) -> i64 {
        self.start_ms + self.duration_ms
    }

    pub fn effective_out_point(&self, asset_duration_ms: Option<i64>) -> Option<i64> {
        self.out_point_ms.or(asset_duration_ms)
    }
}

/// A z-ordered container of visual clips. Index 0 in `Timeline::layers` is
/// topmost (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub clips: Vec<Clip>,
    /// Redundant legacy field; expected to equal `len(layers)-1-index`. The
    /// analysis engine reports drift but never enforces it (spec.md §3).
    pub order: Option<i64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ducking {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_duck_to")]
    pub duck_to: f64,
    #[serde(default = "default_attack_ms")]
    pub attack_ms: i64,
    #[serde(default = "default_release_ms")]
    pub release_ms: i64,
    pub trigger_track: Option<String>,
}

fn default_duck_to() -> f64 {
    0.2
}

fn default_attack_ms() -> i64 {
    200
}

fn default_release_ms() -> i64 {
    500
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioClip {
    pub id: String,
    pub asset_id: String,
    pub start_ms: i64,
    pub duration_ms: i64,
    #[serde(default)]
    pub in_point_ms: i64,
    pub out_point_ms: Option<i64>,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub fade_in_ms: i64,
    #[serde(default)]
    pub fade_out_ms: i64,
    pub volume_keyframes: Option<Vec<Keyframe>>,
    pub group_id: Option<String>,
}

fn default_volume() -> f64 {
    1.0
}

impl AudioClip {
    pub fn end_ms(&self) -> i64 {
        self.start_ms + self.duration_ms
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub track_type: AudioTrackType,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub muted: bool,
    pub ducking: Option<Ducking>,
    #[serde(default)]
    pub clips: Vec<AudioClip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: String,
    pub time_ms: i64,
    pub name: String,
    pub color: Option<String>,
}

/// The composite structure of layers, audio tracks, and markers belonging
/// to a `Sequence` (GLOSSARY).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub duration_ms: i64,
}

/// Where a clip or audio clip was found by id — the entity plus enough
/// context to mutate it in place.
pub struct ClipLocation<'a> {
    pub layer_index: usize,
    pub clip_index: usize,
    pub clip: &'a Clip,
}

pub struct AudioClipLocation<'a> {
    pub track_index: usize,
    pub clip_index: usize,
    pub clip: &'a AudioClip,
}

impl Timeline {
    /// I5: recompute `duration_ms` as the max end-time across all clips and
    /// audio clips. Call after every mutation.
    pub fn recompute_duration(&mut self) {
        let mut max_end = 0i64;
        for layer in &self.layers {
            for clip in &layer.clips {
                max_end = max_end.max(clip.end_ms());
            }
        }
        for track in &self.audio_tracks {
            for clip in &track.clips {
                max_end = max_end.max(clip.end_ms());
            }
        }
        self.duration_ms = max_end;
    }

    pub fn find_layer_index(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn find_layer(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn find_layer_mut(&mut self, id: &str) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn find_track_index(&self, id: &str) -> Option<usize> {
        self.audio_tracks.iter().position(|t| t.id == id)
    }

    pub fn find_track(&self, id: &str) -> Option<&AudioTrack> {
        self.audio_tracks.iter().find(|t| t.id == id)
    }

    pub fn find_track_mut(&mut self, id: &str) -> Option<&mut AudioTrack> {
        self.audio_tracks.iter_mut().find(|t| t.id == id)
    }

    /// Locate a clip by exact id, returning its containing layer index too.
    pub fn find_clip(&self, id: &str) -> Option<ClipLocation<'_>> {
        for (layer_index, layer) in self.layers.iter().enumerate() {
            if let Some(clip_index) = layer.clips.iter().position(|c| c.id == id) {
                return Some(ClipLocation {
                    layer_index,
                    clip_index,
                    clip: &layer.clips[clip_index],
                });
            }
        }
        None
    }

    pub fn find_audio_clip(&self, id: &str) -> Option<AudioClipLocation<'_>> {
        for (track_index, track) in self.audio_tracks.iter().enumerate() {
            if let Some(clip_index) = track.clips.iter().position(|c| c.id == id) {
                return Some(AudioClipLocation {
                    track_index,
                    clip_index,
                    clip: &track.clips[clip_index],
                });
            }
        }
        None
    }

    pub fn find_marker_index(&self, id: &str) -> Option<usize> {
        self.markers.iter().position(|m| m.id == id)
    }

    /// I2: would a clip with this interval overlap any other clip already
    /// on `layer_id`? `exclude_clip_id` lets a move exclude the clip being
    /// moved from the check against itself.
    pub fn overlaps_in_layer(
        &self,
        layer_id: &str,
        start_ms: i64,
        duration_ms: i64,
        exclude_clip_id: Option<&str>,
    ) -> Option<String> {
        let layer = self.find_layer(layer_id)?;
        let end_ms = start_ms + duration_ms;
        layer
            .clips
            .iter()
            .find(|c| {
                Some(c.id.as_str()) != exclude_clip_id
                    && intervals_overlap(start_ms, end_ms, c.start_ms, c.end_ms())
            })
            .map(|c| c.id.clone())
    }

    /// C1: merge overlapping intervals for a set of clips, sorted by start.
    pub fn coverage_intervals(intervals: &mut Vec<(i64, i64)>) -> Vec<(i64, i64)> {
        intervals.sort_by_key(|i| i.0);
        let mut merged: Vec<(i64, i64)> = Vec::new();
        for &(start, end) in intervals.iter() {
            if let Some(last) = merged.last_mut() {
                if start <= last.1 {
                    last.1 = last.1.max(end);
                    continue;
                }
            }
            merged.push((start, end));
        }
        merged
    }

    /// Sum of asset ids referenced anywhere in the timeline (visual and
    /// audio clips), used by the L2 asset catalog (C8) for `usage_count`.
    pub fn referenced_asset_ids(&self) -> HashSet<String> {
        let mut ids = HashSet::new();
        for layer in &self.layers {
            for clip in &layer.clips {
                if let Some(asset_id) = &clip.asset_id {
                    ids.insert(asset_id.clone());
                }
            }
        }
        for track in &self.audio_tracks {
            for clip in &track.clips {
                ids.insert(clip.asset_id.clone());
            }
        }
        ids
    }
}

pub fn intervals_overlap(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> bool {
    a_start < b_end && b_start < a_end
}

/// Top-level container (spec.md §3). A project owns zero or more
/// `Sequence`s; `timeline_data` here is the legacy fallback used only when
/// the project has no sequences at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub timeline_data: Timeline,
    #[serde(default)]
    pub default_sequence_id: Option<String>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            width,
            height,
            fps,
            duration_ms: 0,
            version: 0,
            timeline_data: Timeline::default(),
            default_sequence_id: None,
        }
    }
}

/// An independently-versioned timeline belonging to a `Project`
/// (GLOSSARY). `I6`: the default sequence of a project is unique and
/// cannot be deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub is_default: bool,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub timeline_data: Timeline,
}

impl Sequence {
    pub fn new_default(project_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            project_id: project_id.into(),
            name: "default".to_string(),
            is_default: true,
            version: 0,
            timeline_data: Timeline::default(),
        }
    }

    pub fn named(project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            project_id: project_id.into(),
            name: name.into(),
            is_default: false,
            version: 0,
            timeline_data: Timeline::default(),
        }
    }
}

pub fn generate_id() -> String {
    new_id()
}
