//! The three disclosure levels an AI agent reads instead of the raw
//! timeline tree (C8). Each shape is sized to the context-window budget
//! spec.md §4.8 names; none of these functions mutate anything.
//!
//! Grounded on `examples/original_source/backend/src/api/ai_v1.py`'s route
//! shapes and `timeline_analysis.py`'s coverage-merge helper, reused here
//! (via `Timeline::coverage_intervals`) for L2's `time_coverage`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ErrorCode};
use crate::ids;
use crate::model::{AudioTrackType, LayerType, Project, Timeline};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectOverview {
    pub project_id: String,
    pub name: String,
    pub duration_ms: i64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub status: String,
    pub layer_count: usize,
    pub audio_track_count: usize,
    pub total_video_clips: usize,
    pub total_audio_clips: usize,
    pub total_assets_used: usize,
    pub last_modified: DateTime<Utc>,
}

/// L1 — designed to fit in ~300 tokens. `status` and `last_modified` are not
/// part of the in-memory timeline model — they're tracked by the store layer
/// (job/render status is explicitly out of this crate's scope) and passed in.
pub fn project_overview(project: &Project, status: impl Into<String>, last_modified: DateTime<Utc>) -> ProjectOverview {
    let timeline = &project.timeline_data;
    ProjectOverview {
        project_id: project.id.clone(),
        name: project.name.clone(),
        duration_ms: timeline.duration_ms,
        width: project.width,
        height: project.height,
        fps: project.fps,
        status: status.into(),
        layer_count: timeline.layers.len(),
        audio_track_count: timeline.audio_tracks.len(),
        total_video_clips: timeline.layers.iter().map(|l| l.clips.len()).sum(),
        total_audio_clips: timeline.audio_tracks.iter().map(|t| t.clips.len()).sum(),
        total_assets_used: timeline.referenced_asset_ids().len(),
        last_modified,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub clip_count: usize,
    pub time_coverage: Vec<(i64, i64)>,
    pub visible: bool,
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioTrackSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub track_type: AudioTrackType,
    pub clip_count: usize,
    pub time_coverage: Vec<(i64, i64)>,
    pub muted: bool,
    pub volume: f64,
    pub ducking_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineStructure {
    pub layers: Vec<LayerSummary>,
    pub audio_tracks: Vec<AudioTrackSummary>,
}

/// L2, shape one: the skeleton of every layer and track.
pub fn timeline_structure(timeline: &Timeline) -> TimelineStructure {
    let layers = timeline
        .layers
        .iter()
        .map(|layer| {
            let mut intervals: Vec<(i64, i64)> = layer.clips.iter().map(|c| (c.start_ms, c.end_ms())).collect();
            LayerSummary {
                id: layer.id.clone(),
                name: layer.name.clone(),
                layer_type: layer.layer_type,
                clip_count: layer.clips.len(),
                time_coverage: Timeline::coverage_intervals(&mut intervals),
                visible: layer.visible,
                locked: layer.locked,
            }
        })
        .collect();

    let audio_tracks = timeline
        .audio_tracks
        .iter()
        .map(|track| {
            let mut intervals: Vec<(i64, i64)> = track.clips.iter().map(|c| (c.start_ms, c.end_ms())).collect();
            AudioTrackSummary {
                id: track.id.clone(),
                name: track.name.clone(),
                track_type: track.track_type,
                clip_count: track.clips.len(),
                time_coverage: Timeline::coverage_intervals(&mut intervals),
                muted: track.muted,
                volume: track.volume,
                ducking_enabled: track.ducking.is_some(),
            }
        })
        .collect();

    TimelineStructure { layers, audio_tracks }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveClipKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveClipSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActiveClipKind,
    pub container_id: String,
    pub container_name: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub progress_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineAtTime {
    pub active_clips: Vec<ActiveClipSummary>,
    pub next_event_ms: Option<i64>,
}

fn progress_percent(start_ms: i64, end_ms: i64, at_ms: i64) -> f64 {
    let span = (end_ms - start_ms).max(1) as f64;
    (((at_ms - start_ms) as f64 / span) * 100.0).clamp(0.0, 100.0)
}

/// L2, shape two: what's on screen/audible at `at_ms`, plus the next clip
/// boundary after it so a caller can "step to the next event."
pub fn timeline_at_time(timeline: &Timeline, at_ms: i64) -> TimelineAtTime {
    let mut active_clips = Vec::new();
    let mut next_event_ms: Option<i64> = None;

    let mut consider_boundary = |boundary: i64| {
        if boundary > at_ms {
            next_event_ms = Some(next_event_ms.map_or(boundary, |current| current.min(boundary)));
        }
    };

    for layer in &timeline.layers {
        for clip in &layer.clips {
            let end_ms = clip.end_ms();
            consider_boundary(clip.start_ms);
            consider_boundary(end_ms);
            if clip.start_ms <= at_ms && at_ms < end_ms {
                active_clips.push(ActiveClipSummary {
                    id: clip.id.clone(),
                    kind: ActiveClipKind::Video,
                    container_id: layer.id.clone(),
                    container_name: layer.name.clone(),
                    start_ms: clip.start_ms,
                    end_ms,
                    progress_percent: progress_percent(clip.start_ms, end_ms, at_ms),
                });
            }
        }
    }

    for track in &timeline.audio_tracks {
        for clip in &track.clips {
            let end_ms = clip.end_ms();
            consider_boundary(clip.start_ms);
            consider_boundary(end_ms);
            if clip.start_ms <= at_ms && at_ms < end_ms {
                active_clips.push(ActiveClipSummary {
                    id: clip.id.clone(),
                    kind: ActiveClipKind::Audio,
                    container_id: track.id.clone(),
                    container_name: track.name.clone(),
                    start_ms: clip.start_ms,
                    end_ms,
                    progress_percent: progress_percent(clip.start_ms, end_ms, at_ms),
                });
            }
        }
    }

    TimelineAtTime { active_clips, next_event_ms }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetCatalogEntry {
    pub id: String,
    pub name: String,
    pub asset_type: String,
    pub subtype: Option<String>,
    pub duration_ms: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub usage_count: usize,
}

/// The subset of asset metadata the read API needs. Asset storage itself is
/// out of this crate's scope; the caller (store layer) supplies a lookup
/// over whatever backs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub name: String,
    pub asset_type: String,
    pub subtype: Option<String>,
    pub duration_ms: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

pub trait AssetLookup {
    fn get(&self, asset_id: &str) -> Option<AssetMetadata>;
}

impl<F: Fn(&str) -> Option<AssetMetadata>> AssetLookup for F {
    fn get(&self, asset_id: &str) -> Option<AssetMetadata> {
        self(asset_id)
    }
}

/// L2, shape three: one entry per asset referenced anywhere on the
/// timeline, with how many clips use it.
pub fn asset_catalog(timeline: &Timeline, assets: &impl AssetLookup) -> Vec<AssetCatalogEntry> {
    let mut usage: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for layer in &timeline.layers {
        for clip in &layer.clips {
            if let Some(asset_id) = &clip.asset_id {
                *usage.entry(asset_id.clone()).or_insert(0) += 1;
            }
        }
    }
    for track in &timeline.audio_tracks {
        for clip in &track.clips {
            *usage.entry(clip.asset_id.clone()).or_insert(0) += 1;
        }
    }

    let mut entries: Vec<AssetCatalogEntry> = usage
        .into_iter()
        .map(|(asset_id, usage_count)| {
            let metadata = assets.get(&asset_id);
            AssetCatalogEntry {
                id: asset_id,
                name: metadata.as_ref().map(|m| m.name.clone()).unwrap_or_default(),
                asset_type: metadata.as_ref().map(|m| m.asset_type.clone()).unwrap_or_default(),
                subtype: metadata.as_ref().and_then(|m| m.subtype.clone()),
                duration_ms: metadata.as_ref().and_then(|m| m.duration_ms),
                width: metadata.as_ref().and_then(|m| m.width),
                height: metadata.as_ref().and_then(|m| m.height),
                usage_count,
            }
        })
        .collect();
    entries.sort_by(|a, b| a.id.cmp(&b.id));
    entries
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipNeighbor {
    pub id: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub gap_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipDetail {
    pub id: String,
    pub layer_id: String,
    pub start_ms: i64,
    pub duration_ms: i64,
    pub end_ms: i64,
    pub in_point_ms: i64,
    pub out_point_ms: Option<i64>,
    pub transform: crate::model::Transform,
    pub effects: crate::model::ClipEffects,
    pub transition_in: Option<crate::model::Transition>,
    pub transition_out: Option<crate::model::Transition>,
    pub text_content: Option<String>,
    pub group_id: Option<String>,
    pub previous_clip: Option<ClipNeighbor>,
    pub next_clip: Option<ClipNeighbor>,
}

/// L3 — ~400 tokens on a single clip, with its same-layer neighbors so an
/// agent can reason about adjacency without fetching the whole layer.
pub fn clip_detail(timeline: &Timeline, clip_id: &str) -> Result<ClipDetail, CoreError> {
    let entries: Vec<(usize, usize, &str)> = timeline
        .layers
        .iter()
        .enumerate()
        .flat_map(|(li, layer)| layer.clips.iter().enumerate().map(move |(ci, c)| (li, ci, c.id.as_str())))
        .collect();
    let ids: Vec<&str> = entries.iter().map(|e| e.2).collect();
    let match_index = ids::resolve_index(clip_id, ids.iter().copied())
        .ok_or_else(|| CoreError::new(ErrorCode::ClipNotFound, format!("clip {clip_id} not found")))?;
    let (layer_index, clip_index) = (entries[match_index].0, entries[match_index].1);

    let layer = &timeline.layers[layer_index];
    let clip = &layer.clips[clip_index];

    let mut siblings: Vec<&crate::model::Clip> = layer.clips.iter().collect();
    siblings.sort_by_key(|c| c.start_ms);
    let position = siblings.iter().position(|c| c.id == clip.id).expect("clip is in its own layer");

    let previous_clip = position
        .checked_sub(1)
        .and_then(|i| siblings.get(i))
        .map(|prev| ClipNeighbor {
            id: prev.id.clone(),
            start_ms: prev.start_ms,
            end_ms: prev.end_ms(),
            gap_ms: (clip.start_ms - prev.end_ms()).max(0),
        });
    let next_clip = siblings.get(position + 1).map(|next| ClipNeighbor {
        id: next.id.clone(),
        start_ms: next.start_ms,
        end_ms: next.end_ms(),
        gap_ms: (next.start_ms - clip.end_ms()).max(0),
    });

    Ok(ClipDetail {
        id: clip.id.clone(),
        layer_id: layer.id.clone(),
        start_ms: clip.start_ms,
        duration_ms: clip.duration_ms,
        end_ms: clip.end_ms(),
        in_point_ms: clip.in_point_ms,
        out_point_ms: clip.out_point_ms,
        transform: clip.transform.clone(),
        effects: clip.effects.clone(),
        transition_in: clip.transition_in.clone(),
        transition_out: clip.transition_out.clone(),
        text_content: clip.text_content.clone(),
        group_id: clip.group_id.clone(),
        previous_clip,
        next_clip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Clip, ClipEffects, Layer, Transform};

    fn clip(id: &str, start_ms: i64, duration_ms: i64) -> Clip {
        Clip {
            id: id.to_string(),
            asset_id: Some("asset-1".to_string()),
            start_ms,
            duration_ms,
            in_point_ms: 0,
            out_point_ms: None,
            transform: Transform::default(),
            effects: ClipEffects::default(),
            transition_in: None,
            transition_out: None,
            text_content: None,
            text_style: None,
            shape: None,
            crop: None,
            keyframes: None,
            group_id: None,
        }
    }

    fn layer(id: &str, clips: Vec<Clip>) -> Layer {
        Layer {
            id: id.to_string(),
            name: id.to_string(),
            layer_type: LayerType::Content,
            visible: true,
            locked: false,
            clips,
            order: None,
        }
    }

    #[test]
    fn clip_detail_reports_zero_gap_when_adjacent() {
        let timeline = Timeline {
            layers: vec![layer("l1", vec![clip("c1", 0, 1000), clip("c2", 1000, 500)])],
            ..Default::default()
        };
        let detail = clip_detail(&timeline, "c2").unwrap();
        let previous = detail.previous_clip.unwrap();
        assert_eq!(previous.gap_ms, 0);
    }

    #[test]
    fn clip_detail_clamps_negative_gap_to_zero() {
        // c1 and c2 are given as overlapping purely to exercise the clamp;
        // real timelines reject this via I2, but the read path must still
        // never report a negative gap for whatever state it's handed.
        let timeline = Timeline {
            layers: vec![layer("l1", vec![clip("c1", 0, 1000), clip("c2", 500, 1000)])],
            ..Default::default()
        };
        let detail = clip_detail(&timeline, "c2").unwrap();
        let previous = detail.previous_clip.unwrap();
        assert_eq!(previous.gap_ms, 0);
    }

    #[test]
    fn timeline_at_time_reports_next_event_boundary() {
        let timeline = Timeline {
            layers: vec![layer("l1", vec![clip("c1", 0, 1000), clip("c2", 2000, 500)])],
            ..Default::default()
        };
        let snapshot = timeline_at_time(&timeline, 500);
        assert_eq!(snapshot.active_clips.len(), 1);
        assert_eq!(snapshot.next_event_ms, Some(1000));
    }

    #[test]
    fn asset_catalog_counts_usage_across_layers() {
        let timeline = Timeline {
            layers: vec![layer("l1", vec![clip("c1", 0, 1000), clip("c2", 1000, 500)])],
            ..Default::default()
        };
        let lookup = |id: &str| {
            if id == "asset-1" {
                Some(AssetMetadata {
                    name: "Beach.mp4".to_string(),
                    asset_type: "video".to_string(),
                    subtype: None,
                    duration_ms: Some(5000),
                    width: Some(1920),
                    height: Some(1080),
                })
            } else {
                None
            }
        };
        let catalog = asset_catalog(&timeline, &lookup);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].usage_count, 2);
    }
}
