//! Applies one mutation to a timeline under an already-held sequence lock
//! (C4). Generalized from the teacher's `action_router::run_edit_plan`
//! (snapshot the touched entity, apply, recompute duration, hand back
//! enough to roll back) from its four `ActionType` variants to the full
//! operation set in spec.md §4.4.
//!
//! This module never acquires a lock and never appends to history — it is
//! the pure "apply one op to this timeline" step; `batch.rs` wraps it with
//! the version check and all-or-nothing semantics, `history.rs` wraps it
//! with the append-only log and rollback engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CoreConfig;
use crate::error::{CoreError, ErrorCode};
use crate::ids;
use crate::model::{
    AudioClip, AudioTrack, AudioTrackType, Clip, ClipEffects, Crop, Keyframe, Layer, LayerType,
    Marker, Shape, TextStyle, Timeline, Transform,
};

/// The payload for `clip.add` / `audio_clip.add` — everything but the id,
/// which the dispatcher mints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClip {
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
    pub transition_in: Option<crate::model::Transition>,
    pub transition_out: Option<crate::model::Transition>,
    pub text_content: Option<String>,
    pub text_style: Option<TextStyle>,
    pub shape: Option<Shape>,
    pub crop: Option<Crop>,
    pub keyframes: Option<Vec<Keyframe>>,
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAudioClip {
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

/// The full operation set the dispatcher recognizes (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op_type", rename_all = "snake_case")]
pub enum OperationInput {
    ClipAdd {
        layer_id: String,
        clip: NewClip,
    },
    ClipMove {
        clip_id: String,
        new_start_ms: i64,
        new_layer_id: Option<String>,
    },
    ClipDelete {
        clip_id: String,
    },
    ClipTrim {
        clip_id: String,
        start_ms: Option<i64>,
        duration_ms: Option<i64>,
        in_point_ms: Option<i64>,
        out_point_ms: Option<i64>,
    },
    ClipTransform {
        clip_id: String,
        transform: Transform,
    },
    ClipEffects {
        clip_id: String,
        effects: ClipEffects,
        transition_in: Option<crate::model::Transition>,
        transition_out: Option<crate::model::Transition>,
    },
    ClipText {
        clip_id: String,
        text_content: Option<String>,
    },
    ClipTextStyle {
        clip_id: String,
        text_style: TextStyle,
    },
    ClipShape {
        clip_id: String,
        shape: Shape,
    },
    ClipCrop {
        clip_id: String,
        crop: Crop,
    },
    ClipUpdate {
        clip_id: String,
        asset_id: Option<String>,
        group_id: Option<String>,
    },
    ClipKeyframes {
        clip_id: String,
        keyframes: Vec<Keyframe>,
    },
    LayerAdd {
        name: String,
        #[serde(rename = "type")]
        layer_type: LayerType,
        insert_at: Option<usize>,
    },
    LayerDelete {
        layer_id: String,
    },
    LayerReorder {
        order: Vec<String>,
    },
    LayerUpdate {
        layer_id: String,
        name: Option<String>,
        visible: Option<bool>,
        locked: Option<bool>,
    },
    AudioClipAdd {
        track_id: String,
        clip: NewAudioClip,
    },
    AudioClipMove {
        clip_id: String,
        new_start_ms: i64,
        new_track_id: Option<String>,
    },
    AudioClipDelete {
        clip_id: String,
    },
    AudioClipUpdate {
        clip_id: String,
        volume: Option<f64>,
        fade_in_ms: Option<i64>,
        fade_out_ms: Option<i64>,
    },
    AudioTrackAdd {
        name: String,
        #[serde(rename = "type")]
        track_type: AudioTrackType,
        volume: Option<f64>,
        muted: Option<bool>,
    },
    AudioTrackDelete {
        track_id: String,
    },
    AudioTrackUpdate {
        track_id: String,
        name: Option<String>,
        volume: Option<f64>,
        muted: Option<bool>,
    },
    AudioTrackReorder {
        order: Vec<String>,
    },
    MarkerAdd {
        time_ms: i64,
        name: String,
        color: Option<String>,
    },
    MarkerUpdate {
        marker_id: String,
        time_ms: Option<i64>,
        name: Option<String>,
        color: Option<String>,
    },
    MarkerDelete {
        marker_id: String,
    },
    TimelineFullReplace {
        timeline: Timeline,
    },
}

impl OperationInput {
    /// The stable operation-type string recorded on the history entry
    /// (spec.md §3's `operation_type`, the rollback table's left column).
    pub fn type_name(&self) -> &'static str {
        match self {
            OperationInput::ClipAdd { .. } => "add_clip",
            OperationInput::ClipMove { .. } => "move_clip",
            OperationInput::ClipDelete { .. } => "delete_clip",
            OperationInput::ClipTrim { .. } => "update_clip_timing",
            OperationInput::ClipTransform { .. } => "update_transform",
            OperationInput::ClipEffects { .. } => "update_effects",
            OperationInput::ClipText { .. } => "update_text",
            OperationInput::ClipTextStyle { .. } => "update_text_style",
            OperationInput::ClipShape { .. } => "update_shape",
            OperationInput::ClipCrop { .. } => "update_crop",
            OperationInput::ClipUpdate { .. } => "update_clip",
            OperationInput::ClipKeyframes { .. } => "update_keyframes",
            OperationInput::LayerAdd { .. } => "add_layer",
            OperationInput::LayerDelete { .. } => "delete_layer",
            OperationInput::LayerReorder { .. } => "reorder_layers",
            OperationInput::LayerUpdate { .. } => "update_layer",
            OperationInput::AudioClipAdd { .. } => "add_audio_clip",
            OperationInput::AudioClipMove { .. } => "move_audio_clip",
            OperationInput::AudioClipDelete { .. } => "delete_audio_clip",
            OperationInput::AudioClipUpdate { .. } => "update_audio_clip",
            OperationInput::AudioTrackAdd { .. } => "add_audio_track",
            OperationInput::AudioTrackDelete { .. } => "delete_audio_track",
            OperationInput::AudioTrackUpdate { .. } => "update_audio_track",
            OperationInput::AudioTrackReorder { .. } => "reorder_audio_tracks",
            OperationInput::MarkerAdd { .. } => "add_marker",
            OperationInput::MarkerUpdate { .. } => "update_marker",
            OperationInput::MarkerDelete { .. } => "delete_marker",
            OperationInput::TimelineFullReplace { .. } => "full_replace",
        }
    }
}

/// The fixed set of op types §4.4 names as rollback-supported.
pub fn is_rollback_supported(op_type: &str) -> bool {
    matches!(
        op_type,
        "add_clip"
            | "delete_clip"
            | "move_clip"
            | "update_transform"
            | "update_effects"
            | "update_text_style"
            | "update_clip_timing"
            | "add_layer"
            | "add_audio_clip"
            | "delete_audio_clip"
            | "move_audio_clip"
            | "add_marker"
            | "update_marker"
            | "delete_marker"
            | "close_gap"
            | "auto_duck_bgm"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Clip,
    Layer,
    AudioClip,
    AudioTrack,
    Marker,
    Timeline,
}

/// Before/after snapshot of one touched entity, the raw material the
/// history engine turns into `OperationRecord.diff` (`compute_diff`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeDetail {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// The minimum state needed to invert a rollback-supported operation
/// (spec.md §4.7's table, one variant per row).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RollbackData {
    AddClip {
        layer_id: String,
        clip_id: String,
    },
    DeleteClip {
        layer_id: String,
        clip: Clip,
    },
    MoveClip {
        clip_id: String,
        original_start_ms: i64,
        original_layer_id: String,
    },
    AddAudioClip {
        track_id: String,
        clip_id: String,
    },
    DeleteAudioClip {
        track_id: String,
        clip: AudioClip,
    },
    MoveAudioClip {
        clip_id: String,
        original_start_ms: i64,
        original_track_id: String,
    },
    AddLayer {
        layer_id: String,
    },
    AddMarker {
        marker_id: String,
    },
    UpdateTransform {
        clip_id: String,
        original_transform: Transform,
    },
    UpdateEffects {
        clip_id: String,
        original_effects: ClipEffects,
        original_transition_in: Option<crate::model::Transition>,
        original_transition_out: Option<crate::model::Transition>,
    },
    UpdateTextStyle {
        clip_id: String,
        original_text_style: Option<TextStyle>,
    },
    UpdateClipTiming {
        clip_id: String,
        original_start_ms: i64,
        original_duration_ms: i64,
        original_in_point_ms: i64,
        original_out_point_ms: Option<i64>,
    },
    UpdateMarker {
        marker_id: String,
        original: Marker,
    },
    DeleteMarker {
        marker: Marker,
    },
    /// `semantic::close_gap`'s inverse: every clip shifted left by the gap
    /// width, paired with its pre-shift `start_ms`, in the order they were
    /// moved.
    CloseGap {
        layer_id: String,
        original_starts: Vec<(String, i64)>,
    },
    /// `semantic::auto_duck_bgm`'s inverse: the track's `ducking` field
    /// before it was set.
    UpdateDucking {
        track_id: String,
        original_ducking: Option<crate::model::Ducking>,
    },
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub op_type: &'static str,
    pub affected_clips: Vec<String>,
    pub affected_layers: Vec<String>,
    pub affected_audio_clips: Vec<String>,
    pub affected_audio_tracks: Vec<String>,
    pub changes: Vec<ChangeDetail>,
    pub rollback: Option<RollbackData>,
}

pub(crate) fn resolve_layer_id(timeline: &Timeline, search: &str) -> Result<String, CoreError> {
    let ids: Vec<&str> = timeline.layers.iter().map(|l| l.id.as_str()).collect();
    let index = ids::resolve_index(search, ids.iter().copied())
        .ok_or_else(|| CoreError::new(ErrorCode::LayerNotFound, format!("layer {search} not found")))?;
    Ok(timeline.layers[index].id.clone())
}

pub(crate) fn resolve_track_id(timeline: &Timeline, search: &str) -> Result<String, CoreError> {
    let ids: Vec<&str> = timeline.audio_tracks.iter().map(|t| t.id.as_str()).collect();
    let index = ids::resolve_index(search, ids.iter().copied()).ok_or_else(|| {
        CoreError::new(ErrorCode::AudioTrackNotFound, format!("audio track {search} not found"))
    })?;
    Ok(timeline.audio_tracks[index].id.clone())
}

pub(crate) fn resolve_clip_location(timeline: &Timeline, search: &str) -> Result<(usize, usize), CoreError> {
    let entries: Vec<(usize, usize, &str)> = timeline
        .layers
        .iter()
        .enumerate()
        .flat_map(|(li, layer)| layer.clips.iter().enumerate().map(move |(ci, c)| (li, ci, c.id.as_str())))
        .collect();
    let ids: Vec<&str> = entries.iter().map(|e| e.2).collect();
    let index = ids::resolve_index(search, ids.iter().copied())
        .ok_or_else(|| CoreError::new(ErrorCode::ClipNotFound, format!("clip {search} not found")))?;
    Ok((entries[index].0, entries[index].1))
}

pub(crate) fn resolve_audio_clip_location(timeline: &Timeline, search: &str) -> Result<(usize, usize), CoreError> {
    let entries: Vec<(usize, usize, &str)> = timeline
        .audio_tracks
        .iter()
        .enumerate()
        .flat_map(|(ti, track)| track.clips.iter().enumerate().map(move |(ci, c)| (ti, ci, c.id.as_str())))
        .collect();
    let ids: Vec<&str> = entries.iter().map(|e| e.2).collect();
    let index = ids::resolve_index(search, ids.iter().copied())
        .ok_or_else(|| CoreError::new(ErrorCode::AudioClipNotFound, format!("audio clip {search} not found")))?;
    Ok((entries[index].0, entries[index].1))
}

fn resolve_marker_index(timeline: &Timeline, search: &str) -> Result<usize, CoreError> {
    let ids: Vec<&str> = timeline.markers.iter().map(|m| m.id.as_str()).collect();
    ids::resolve_index(search, ids.iter().copied())
        .ok_or_else(|| CoreError::new(ErrorCode::MarkerNotFound, format!("marker {search} not found")))
}

/// Apply `op` to `timeline` in place. Returns the change set and, for
/// rollback-supported ops, the data needed to invert it. Always recomputes
/// `duration_ms` before returning (I5), even on ops that can't change it.
pub fn apply(timeline: &mut Timeline, op: &OperationInput, config: &CoreConfig) -> Result<DispatchOutcome, CoreError> {
    let outcome = apply_inner(timeline, op, config)?;
    timeline.recompute_duration();
    Ok(outcome)
}

fn apply_inner(timeline: &mut Timeline, op: &OperationInput, config: &CoreConfig) -> Result<DispatchOutcome, CoreError> {
    match op {
        OperationInput::ClipAdd { layer_id, clip } => add_clip(timeline, layer_id, clip, config),
        OperationInput::ClipMove {
            clip_id,
            new_start_ms,
            new_layer_id,
        } => move_clip(timeline, clip_id, *new_start_ms, new_layer_id.as_deref()),
        OperationInput::ClipDelete { clip_id } => delete_clip(timeline, clip_id),
        OperationInput::ClipTrim {
            clip_id,
            start_ms,
            duration_ms,
            in_point_ms,
            out_point_ms,
        } => trim_clip(timeline, clip_id, *start_ms, *duration_ms, *in_point_ms, *out_point_ms),
        OperationInput::ClipTransform { clip_id, transform } => transform_clip(timeline, clip_id, transform.clone()),
        OperationInput::ClipEffects {
            clip_id,
            effects,
            transition_in,
            transition_out,
        } => effects_clip(timeline, clip_id, effects.clone(), transition_in.clone(), transition_out.clone()),
        OperationInput::ClipText { clip_id, text_content } => text_clip(timeline, clip_id, text_content.clone()),
        OperationInput::ClipTextStyle { clip_id, text_style } => text_style_clip(timeline, clip_id, text_style.clone()),
        OperationInput::ClipShape { clip_id, shape } => shape_clip(timeline, clip_id, shape.clone()),
        OperationInput::ClipCrop { clip_id, crop } => crop_clip(timeline, clip_id, crop.clone()),
        OperationInput::ClipUpdate {
            clip_id,
            asset_id,
            group_id,
        } => update_clip(timeline, clip_id, asset_id.clone(), group_id.clone()),
        OperationInput::ClipKeyframes { clip_id, keyframes } => keyframes_clip(timeline, clip_id, keyframes.clone()),
        OperationInput::LayerAdd {
            name,
            layer_type,
            insert_at,
        } => add_layer(timeline, name, *layer_type, *insert_at, config),
        OperationInput::LayerDelete { layer_id } => delete_layer(timeline, layer_id),
        OperationInput::LayerReorder { order } => reorder_layers(timeline, order),
        OperationInput::LayerUpdate {
            layer_id,
            name,
            visible,
            locked,
        } => update_layer(timeline, layer_id, name.clone(), *visible, *locked),
        OperationInput::AudioClipAdd { track_id, clip } => add_audio_clip(timeline, track_id, clip),
        OperationInput::AudioClipMove {
            clip_id,
            new_start_ms,
            new_track_id,
        } => move_audio_clip(timeline, clip_id, *new_start_ms, new_track_id.as_deref()),
        OperationInput::AudioClipDelete { clip_id } => delete_audio_clip(timeline, clip_id),
        OperationInput::AudioClipUpdate {
            clip_id,
            volume,
            fade_in_ms,
            fade_out_ms,
        } => update_audio_clip(timeline, clip_id, *volume, *fade_in_ms, *fade_out_ms),
        OperationInput::AudioTrackAdd {
            name,
            track_type,
            volume,
            muted,
        } => add_audio_track(timeline, name, *track_type, *volume, *muted),
        OperationInput::AudioTrackDelete { track_id } => delete_audio_track(timeline, track_id),
        OperationInput::AudioTrackUpdate {
            track_id,
            name,
            volume,
            muted,
        } => update_audio_track(timeline, track_id, name.clone(), *volume, *muted),
        OperationInput::AudioTrackReorder { order } => reorder_audio_tracks(timeline, order),
        OperationInput::MarkerAdd { time_ms, name, color } => add_marker(timeline, *time_ms, name, color.clone()),
        OperationInput::MarkerUpdate {
            marker_id,
            time_ms,
            name,
            color,
        } => update_marker(timeline, marker_id, *time_ms, name.clone(), color.clone()),
        OperationInput::MarkerDelete { marker_id } => delete_marker(timeline, marker_id),
        OperationInput::TimelineFullReplace { timeline: replacement } => full_replace(timeline, replacement.clone()),
    }
}

fn add_clip(timeline: &mut Timeline, layer_id: &str, input: &NewClip, config: &CoreConfig) -> Result<DispatchOutcome, CoreError> {
    let canonical_layer_id = resolve_layer_id(timeline, layer_id)?;

    if input.start_ms < 0 {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "start_ms must be >= 0").with_field("start_ms"));
    }
    if input.duration_ms <= 0 {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "duration_ms must be > 0").with_field("duration_ms"));
    }
    if input.duration_ms > config.max_clip_duration_ms {
        return Err(CoreError::new(ErrorCode::DurationTooLong, "duration_ms exceeds the configured maximum").with_field("duration_ms"));
    }
    if input.asset_id.is_none() && input.text_content.is_none() && input.shape.is_none() {
        return Err(CoreError::new(
            ErrorCode::MissingRequiredField,
            "a clip without asset_id must provide text_content or shape",
        )
        .with_field("text_content"));
    }

    if let Some(overlap_id) = timeline.overlaps_in_layer(&canonical_layer_id, input.start_ms, input.duration_ms, None) {
        return Err(CoreError::new(ErrorCode::ClipOverlap, format!("overlaps existing clip {overlap_id}")));
    }

    let layer = timeline.find_layer(&canonical_layer_id).expect("resolved above");
    if layer.clips.len() >= config.max_clips_per_layer {
        return Err(CoreError::new(ErrorCode::TooManyClips, "layer has reached its clip limit"));
    }

    let clip = Clip {
        id: crate::model::generate_id(),
        asset_id: input.asset_id.clone(),
        start_ms: input.start_ms,
        duration_ms: input.duration_ms,
        in_point_ms: input.in_point_ms,
        out_point_ms: input.out_point_ms,
        transform: input.transform.clone(),
        effects: input.effects.clone(),
        transition_in: input.transition_in.clone(),
        transition_out: input.transition_out.clone(),
        text_content: input.text_content.clone(),
        text_style: input.text_style.clone(),
        shape: input.shape.clone(),
        crop: input.crop.clone(),
        keyframes: input.keyframes.clone(),
        group_id: input.group_id.clone(),
    };
    let clip_id = clip.id.clone();
    let after = serde_json::to_value(&clip).ok();
    let layer_mut = timeline.find_layer_mut(&canonical_layer_id).expect("resolved above");
    layer_mut.clips.push(clip);

    Ok(DispatchOutcome {
        op_type: "add_clip",
        affected_clips: vec![clip_id.clone()],
        affected_layers: vec![canonical_layer_id.clone()],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: clip_id.clone(),
            before: None,
            after,
        }],
        rollback: Some(RollbackData::AddClip {
            layer_id: canonical_layer_id,
            clip_id,
        }),
    })
}

fn move_clip(
    timeline: &mut Timeline,
    clip_id: &str,
    new_start_ms: i64,
    new_layer_id: Option<&str>,
) -> Result<DispatchOutcome, CoreError> {
    let (layer_index, clip_index) = resolve_clip_location(timeline, clip_id)?;
    if new_start_ms < 0 {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "start_ms must be >= 0").with_field("start_ms"));
    }

    let original_layer_id = timeline.layers[layer_index].id.clone();
    let original_start_ms = timeline.layers[layer_index].clips[clip_index].start_ms;
    let canonical_clip_id = timeline.layers[layer_index].clips[clip_index].id.clone();
    let duration_ms = timeline.layers[layer_index].clips[clip_index].duration_ms;

    let target_layer_id = match new_layer_id {
        Some(search) => resolve_layer_id(timeline, search)?,
        None => original_layer_id.clone(),
    };

    if let Some(overlap_id) = timeline.overlaps_in_layer(&target_layer_id, new_start_ms, duration_ms, Some(&canonical_clip_id)) {
        return Err(CoreError::new(ErrorCode::ClipOverlap, format!("overlaps existing clip {overlap_id}")));
    }

    let before = serde_json::to_value(&timeline.layers[layer_index].clips[clip_index]).ok();

    let mut clip = timeline.layers[layer_index].clips.remove(clip_index);
    clip.start_ms = new_start_ms;
    let after = serde_json::to_value(&clip).ok();
    let target_index = timeline.find_layer_index(&target_layer_id).expect("resolved above");
    timeline.layers[target_index].clips.push(clip);

    let mut affected_layers = vec![original_layer_id.clone()];
    if target_layer_id != original_layer_id {
        affected_layers.push(target_layer_id.clone());
    }

    Ok(DispatchOutcome {
        op_type: "move_clip",
        affected_clips: vec![canonical_clip_id.clone()],
        affected_layers,
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: canonical_clip_id.clone(),
            before,
            after,
        }],
        rollback: Some(RollbackData::MoveClip {
            clip_id: canonical_clip_id,
            original_start_ms,
            original_layer_id,
        }),
    })
}

fn delete_clip(timeline: &mut Timeline, clip_id: &str) -> Result<DispatchOutcome, CoreError> {
    let (layer_index, clip_index) = resolve_clip_location(timeline, clip_id)?;
    let layer_id = timeline.layers[layer_index].id.clone();
    let clip = timeline.layers[layer_index].clips.remove(clip_index);
    let clip_id = clip.id.clone();
    let before = serde_json::to_value(&clip).ok();

    Ok(DispatchOutcome {
        op_type: "delete_clip",
        affected_clips: vec![clip_id.clone()],
        affected_layers: vec![layer_id.clone()],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: clip_id,
            before,
            after: None,
        }],
        rollback: Some(RollbackData::DeleteClip { layer_id, clip }),
    })
}

fn trim_clip(
    timeline: &mut Timeline,
    clip_id: &str,
    start_ms: Option<i64>,
    duration_ms: Option<i64>,
    in_point_ms: Option<i64>,
    out_point_ms: Option<i64>,
) -> Result<DispatchOutcome, CoreError> {
    let (layer_index, clip_index) = resolve_clip_location(timeline, clip_id)?;
    let layer_id = timeline.layers[layer_index].id.clone();
    let clip = &timeline.layers[layer_index].clips[clip_index];
    let before = serde_json::to_value(clip).ok();
    let rollback = RollbackData::UpdateClipTiming {
        clip_id: clip.id.clone(),
        original_start_ms: clip.start_ms,
        original_duration_ms: clip.duration_ms,
        original_in_point_ms: clip.in_point_ms,
        original_out_point_ms: clip.out_point_ms,
    };

    let new_start_ms = start_ms.unwrap_or(clip.start_ms);
    let new_duration_ms = duration_ms.unwrap_or(clip.duration_ms);
    let new_in_point_ms = in_point_ms.unwrap_or(clip.in_point_ms);
    let new_out_point_ms = out_point_ms.or(clip.out_point_ms);

    if new_start_ms < 0 {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "start_ms must be >= 0").with_field("start_ms"));
    }
    if new_duration_ms <= 0 {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "duration_ms must be > 0").with_field("duration_ms"));
    }
    if let Some(out) = new_out_point_ms {
        if new_in_point_ms >= out {
            return Err(CoreError::new(ErrorCode::InvalidTimeRange, "in_point_ms must be < out_point_ms").with_field("in_point_ms"));
        }
    }

    let clip_id_owned = clip.id.clone();
    if let Some(overlap_id) = timeline.overlaps_in_layer(&layer_id, new_start_ms, new_duration_ms, Some(&clip_id_owned)) {
        return Err(CoreError::new(ErrorCode::ClipOverlap, format!("overlaps existing clip {overlap_id}")));
    }

    let clip = &mut timeline.layers[layer_index].clips[clip_index];
    clip.start_ms = new_start_ms;
    clip.duration_ms = new_duration_ms;
    clip.in_point_ms = new_in_point_ms;
    clip.out_point_ms = new_out_point_ms;
    let after = serde_json::to_value(&*clip).ok();

    Ok(DispatchOutcome {
        op_type: "update_clip_timing",
        affected_clips: vec![clip_id_owned.clone()],
        affected_layers: vec![layer_id],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: clip_id_owned,
            before,
            after,
        }],
        rollback: Some(rollback),
    })
}

fn transform_clip(timeline: &mut Timeline, clip_id: &str, transform: Transform) -> Result<DispatchOutcome, CoreError> {
    let (layer_index, clip_index) = resolve_clip_location(timeline, clip_id)?;
    let layer_id = timeline.layers[layer_index].id.clone();
    let clip = &mut timeline.layers[layer_index].clips[clip_index];
    let clip_id_owned = clip.id.clone();
    let before = serde_json::to_value(&*clip).ok();
    let original_transform = clip.transform.clone();
    clip.transform = transform;
    let after = serde_json::to_value(&*clip).ok();

    Ok(DispatchOutcome {
        op_type: "update_transform",
        affected_clips: vec![clip_id_owned.clone()],
        affected_layers: vec![layer_id],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: clip_id_owned.clone(),
            before,
            after,
        }],
        rollback: Some(RollbackData::UpdateTransform {
            clip_id: clip_id_owned,
            original_transform,
        }),
    })
}

fn effects_clip(
    timeline: &mut Timeline,
    clip_id: &str,
    effects: ClipEffects,
    transition_in: Option<crate::model::Transition>,
    transition_out: Option<crate::model::Transition>,
) -> Result<DispatchOutcome, CoreError> {
    let (layer_index, clip_index) = resolve_clip_location(timeline, clip_id)?;
    let layer_id = timeline.layers[layer_index].id.clone();
    let clip = &mut timeline.layers[layer_index].clips[clip_index];
    let clip_id_owned = clip.id.clone();
    let before = serde_json::to_value(&*clip).ok();
    let original_effects = clip.effects.clone();
    let original_transition_in = clip.transition_in.clone();
    let original_transition_out = clip.transition_out.clone();

    clip.effects = effects;
    if transition_in.is_some() {
        clip.transition_in = transition_in;
    }
    if transition_out.is_some() {
        clip.transition_out = transition_out;
    }
    let after = serde_json::to_value(&*clip).ok();

    Ok(DispatchOutcome {
        op_type: "update_effects",
        affected_clips: vec![clip_id_owned.clone()],
        affected_layers: vec![layer_id],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: clip_id_owned.clone(),
            before,
            after,
        }],
        rollback: Some(RollbackData::UpdateEffects {
            clip_id: clip_id_owned,
            original_effects,
            original_transition_in,
            original_transition_out,
        }),
    })
}

fn text_clip(timeline: &mut Timeline, clip_id: &str, text_content: Option<String>) -> Result<DispatchOutcome, CoreError> {
    let (layer_index, clip_index) = resolve_clip_location(timeline, clip_id)?;
    let layer_id = timeline.layers[layer_index].id.clone();
    let clip = &mut timeline.layers[layer_index].clips[clip_index];
    let clip_id_owned = clip.id.clone();
    let before = serde_json::to_value(&*clip).ok();
    clip.text_content = text_content;
    let after = serde_json::to_value(&*clip).ok();

    Ok(DispatchOutcome {
        op_type: "update_text",
        affected_clips: vec![clip_id_owned.clone()],
        affected_layers: vec![layer_id],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: clip_id_owned,
            before,
            after,
        }],
        rollback: None,
    })
}

fn text_style_clip(timeline: &mut Timeline, clip_id: &str, text_style: TextStyle) -> Result<DispatchOutcome, CoreError> {
    let (layer_index, clip_index) = resolve_clip_location(timeline, clip_id)?;
    let layer_id = timeline.layers[layer_index].id.clone();
    let clip = &mut timeline.layers[layer_index].clips[clip_index];
    let clip_id_owned = clip.id.clone();
    let before = serde_json::to_value(&*clip).ok();
    let original_text_style = clip.text_style.clone();
    clip.text_style = Some(text_style);
    let after = serde_json::to_value(&*clip).ok();

    Ok(DispatchOutcome {
        op_type: "update_text_style",
        affected_clips: vec![clip_id_owned.clone()],
        affected_layers: vec![layer_id],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: clip_id_owned.clone(),
            before,
            after,
        }],
        rollback: Some(RollbackData::UpdateTextStyle {
            clip_id: clip_id_owned,
            original_text_style,
        }),
    })
}

fn shape_clip(timeline: &mut Timeline, clip_id: &str, shape: Shape) -> Result<DispatchOutcome, CoreError> {
    let (layer_index, clip_index) = resolve_clip_location(timeline, clip_id)?;
    let layer_id = timeline.layers[layer_index].id.clone();
    let clip = &mut timeline.layers[layer_index].clips[clip_index];
    let clip_id_owned = clip.id.clone();
    let before = serde_json::to_value(&*clip).ok();
    clip.shape = Some(shape);
    let after = serde_json::to_value(&*clip).ok();

    Ok(DispatchOutcome {
        op_type: "update_shape",
        affected_clips: vec![clip_id_owned.clone()],
        affected_layers: vec![layer_id],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: clip_id_owned,
            before,
            after,
        }],
        rollback: None,
    })
}

fn crop_clip(timeline: &mut Timeline, clip_id: &str, crop: Crop) -> Result<DispatchOutcome, CoreError> {
    let (layer_index, clip_index) = resolve_clip_location(timeline, clip_id)?;
    let layer_id = timeline.layers[layer_index].id.clone();
    let clip = &mut timeline.layers[layer_index].clips[clip_index];
    let clip_id_owned = clip.id.clone();
    let before = serde_json::to_value(&*clip).ok();
    clip.crop = Some(crop);
    let after = serde_json::to_value(&*clip).ok();

    Ok(DispatchOutcome {
        op_type: "update_crop",
        affected_clips: vec![clip_id_owned.clone()],
        affected_layers: vec![layer_id],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: clip_id_owned,
            before,
            after,
        }],
        rollback: None,
    })
}

fn update_clip(
    timeline: &mut Timeline,
    clip_id: &str,
    asset_id: Option<String>,
    group_id: Option<String>,
) -> Result<DispatchOutcome, CoreError> {
    let (layer_index, clip_index) = resolve_clip_location(timeline, clip_id)?;
    let layer_id = timeline.layers[layer_index].id.clone();
    let clip = &mut timeline.layers[layer_index].clips[clip_index];
    let clip_id_owned = clip.id.clone();
    let before = serde_json::to_value(&*clip).ok();
    if asset_id.is_some() {
        clip.asset_id = asset_id;
    }
    if group_id.is_some() {
        clip.group_id = group_id;
    }
    let after = serde_json::to_value(&*clip).ok();

    Ok(DispatchOutcome {
        op_type: "update_clip",
        affected_clips: vec![clip_id_owned.clone()],
        affected_layers: vec![layer_id],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: clip_id_owned,
            before,
            after,
        }],
        rollback: None,
    })
}

fn keyframes_clip(timeline: &mut Timeline, clip_id: &str, keyframes: Vec<Keyframe>) -> Result<DispatchOutcome, CoreError> {
    let (layer_index, clip_index) = resolve_clip_location(timeline, clip_id)?;
    let layer_id = timeline.layers[layer_index].id.clone();
    let clip = &mut timeline.layers[layer_index].clips[clip_index];
    let clip_id_owned = clip.id.clone();
    let before = serde_json::to_value(&*clip).ok();
    clip.keyframes = Some(keyframes);
    let after = serde_json::to_value(&*clip).ok();

    Ok(DispatchOutcome {
        op_type: "update_keyframes",
        affected_clips: vec![clip_id_owned.clone()],
        affected_layers: vec![layer_id],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: clip_id_owned,
            before,
            after,
        }],
        rollback: None,
    })
}

fn add_layer(
    timeline: &mut Timeline,
    name: &str,
    layer_type: LayerType,
    insert_at: Option<usize>,
    config: &CoreConfig,
) -> Result<DispatchOutcome, CoreError> {
    if timeline.layers.len() >= config.max_layers_per_project {
        return Err(CoreError::new(ErrorCode::TooManyLayers, "project has reached its layer limit"));
    }
    let layer = Layer {
        id: crate::model::generate_id(),
        name: name.to_string(),
        layer_type,
        visible: true,
        locked: false,
        clips: vec![],
        order: None,
    };
    let layer_id = layer.id.clone();
    let after = serde_json::to_value(&layer).ok();

    let index = insert_at.unwrap_or(timeline.layers.len()).min(timeline.layers.len());
    timeline.layers.insert(index, layer);

    Ok(DispatchOutcome {
        op_type: "add_layer",
        affected_clips: vec![],
        affected_layers: vec![layer_id.clone()],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Layer,
            entity_id: layer_id.clone(),
            before: None,
            after,
        }],
        rollback: Some(RollbackData::AddLayer { layer_id }),
    })
}

fn delete_layer(timeline: &mut Timeline, layer_id: &str) -> Result<DispatchOutcome, CoreError> {
    let canonical_id = resolve_layer_id(timeline, layer_id)?;
    let index = timeline.find_layer_index(&canonical_id).expect("resolved above");
    let layer = timeline.layers.remove(index);

    Ok(DispatchOutcome {
        op_type: "delete_layer",
        affected_clips: layer.clips.iter().map(|c| c.id.clone()).collect(),
        affected_layers: vec![canonical_id],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Layer,
            entity_id: layer.id.clone(),
            before: serde_json::to_value(&layer).ok(),
            after: None,
        }],
        rollback: None,
    })
}

fn reorder_layers(timeline: &mut Timeline, order: &[String]) -> Result<DispatchOutcome, CoreError> {
    let mut reordered = Vec::with_capacity(timeline.layers.len());
    let mut remaining = std::mem::take(&mut timeline.layers);

    for search in order {
        let canonical_id = {
            let ids: Vec<&str> = remaining.iter().map(|l| l.id.as_str()).collect();
            let index = ids::resolve_index(search, ids.iter().copied())
                .ok_or_else(|| CoreError::new(ErrorCode::LayerNotFound, format!("layer {search} not found")))?;
            remaining[index].id.clone()
        };
        let position = remaining.iter().position(|l| l.id == canonical_id).expect("resolved above");
        reordered.push(remaining.remove(position));
    }
    // Omitted ids are appended in their original relative order.
    reordered.extend(remaining);
    timeline.layers = reordered;

    Ok(DispatchOutcome {
        op_type: "reorder_layers",
        affected_clips: vec![],
        affected_layers: timeline.layers.iter().map(|l| l.id.clone()).collect(),
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![],
        rollback: None,
    })
}

fn update_layer(
    timeline: &mut Timeline,
    layer_id: &str,
    name: Option<String>,
    visible: Option<bool>,
    locked: Option<bool>,
) -> Result<DispatchOutcome, CoreError> {
    let canonical_id = resolve_layer_id(timeline, layer_id)?;
    let layer = timeline.find_layer_mut(&canonical_id).expect("resolved above");
    let before = serde_json::to_value(&*layer).ok();
    if let Some(name) = name {
        layer.name = name;
    }
    if let Some(visible) = visible {
        layer.visible = visible;
    }
    if let Some(locked) = locked {
        layer.locked = locked;
    }
    let after = serde_json::to_value(&*layer).ok();

    Ok(DispatchOutcome {
        op_type: "update_layer",
        affected_clips: vec![],
        affected_layers: vec![canonical_id.clone()],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Layer,
            entity_id: canonical_id,
            before,
            after,
        }],
        rollback: None,
    })
}

fn add_audio_clip(timeline: &mut Timeline, track_id: &str, input: &NewAudioClip) -> Result<DispatchOutcome, CoreError> {
    let canonical_track_id = resolve_track_id(timeline, track_id)?;

    if input.start_ms < 0 {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "start_ms must be >= 0").with_field("start_ms"));
    }
    if input.duration_ms <= 0 {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "duration_ms must be > 0").with_field("duration_ms"));
    }

    let clip = AudioClip {
        id: crate::model::generate_id(),
        asset_id: input.asset_id.clone(),
        start_ms: input.start_ms,
        duration_ms: input.duration_ms,
        in_point_ms: input.in_point_ms,
        out_point_ms: input.out_point_ms,
        volume: input.volume,
        fade_in_ms: input.fade_in_ms,
        fade_out_ms: input.fade_out_ms,
        volume_keyframes: input.volume_keyframes.clone(),
        group_id: input.group_id.clone(),
    };
    let clip_id = clip.id.clone();
    let after = serde_json::to_value(&clip).ok();
    let track = timeline.find_track_mut(&canonical_track_id).expect("resolved above");
    track.clips.push(clip);

    Ok(DispatchOutcome {
        op_type: "add_audio_clip",
        affected_clips: vec![],
        affected_layers: vec![],
        affected_audio_clips: vec![clip_id.clone()],
        affected_audio_tracks: vec![canonical_track_id.clone()],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::AudioClip,
            entity_id: clip_id.clone(),
            before: None,
            after,
        }],
        rollback: Some(RollbackData::AddAudioClip {
            track_id: canonical_track_id,
            clip_id,
        }),
    })
}

fn move_audio_clip(
    timeline: &mut Timeline,
    clip_id: &str,
    new_start_ms: i64,
    new_track_id: Option<&str>,
) -> Result<DispatchOutcome, CoreError> {
    let (track_index, clip_index) = resolve_audio_clip_location(timeline, clip_id)?;
    if new_start_ms < 0 {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "start_ms must be >= 0").with_field("start_ms"));
    }

    let original_track_id = timeline.audio_tracks[track_index].id.clone();
    let original_start_ms = timeline.audio_tracks[track_index].clips[clip_index].start_ms;
    let canonical_clip_id = timeline.audio_tracks[track_index].clips[clip_index].id.clone();

    let target_track_id = match new_track_id {
        Some(search) => resolve_track_id(timeline, search)?,
        None => original_track_id.clone(),
    };

    let before = serde_json::to_value(&timeline.audio_tracks[track_index].clips[clip_index]).ok();
    let mut clip = timeline.audio_tracks[track_index].clips.remove(clip_index);
    clip.start_ms = new_start_ms;
    let after = serde_json::to_value(&clip).ok();
    let target_index = timeline.find_track_index(&target_track_id).expect("resolved above");
    timeline.audio_tracks[target_index].clips.push(clip);

    let mut affected_tracks = vec![original_track_id.clone()];
    if target_track_id != original_track_id {
        affected_tracks.push(target_track_id.clone());
    }

    Ok(DispatchOutcome {
        op_type: "move_audio_clip",
        affected_clips: vec![],
        affected_layers: vec![],
        affected_audio_clips: vec![canonical_clip_id.clone()],
        affected_audio_tracks: affected_tracks,
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::AudioClip,
            entity_id: canonical_clip_id.clone(),
            before,
            after,
        }],
        rollback: Some(RollbackData::MoveAudioClip {
            clip_id: canonical_clip_id,
            original_start_ms,
            original_track_id,
        }),
    })
}

fn delete_audio_clip(timeline: &mut Timeline, clip_id: &str) -> Result<DispatchOutcome, CoreError> {
    let (track_index, clip_index) = resolve_audio_clip_location(timeline, clip_id)?;
    let track_id = timeline.audio_tracks[track_index].id.clone();
    let clip = timeline.audio_tracks[track_index].clips.remove(clip_index);
    let clip_id = clip.id.clone();
    let before = serde_json::to_value(&clip).ok();

    Ok(DispatchOutcome {
        op_type: "delete_audio_clip",
        affected_clips: vec![],
        affected_layers: vec![],
        affected_audio_clips: vec![clip_id.clone()],
        affected_audio_tracks: vec![track_id.clone()],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::AudioClip,
            entity_id: clip_id,
            before,
            after: None,
        }],
        rollback: Some(RollbackData::DeleteAudioClip { track_id, clip }),
    })
}

fn update_audio_clip(
    timeline: &mut Timeline,
    clip_id: &str,
    volume: Option<f64>,
    fade_in_ms: Option<i64>,
    fade_out_ms: Option<i64>,
) -> Result<DispatchOutcome, CoreError> {
    let (track_index, clip_index) = resolve_audio_clip_location(timeline, clip_id)?;
    let track_id = timeline.audio_tracks[track_index].id.clone();
    let clip = &mut timeline.audio_tracks[track_index].clips[clip_index];
    let clip_id_owned = clip.id.clone();
    let before = serde_json::to_value(&*clip).ok();
    if let Some(volume) = volume {
        clip.volume = volume;
    }
    if let Some(fade_in_ms) = fade_in_ms {
        clip.fade_in_ms = fade_in_ms;
    }
    if let Some(fade_out_ms) = fade_out_ms {
        clip.fade_out_ms = fade_out_ms;
    }
    let after = serde_json::to_value(&*clip).ok();

    Ok(DispatchOutcome {
        op_type: "update_audio_clip",
        affected_clips: vec![],
        affected_layers: vec![],
        affected_audio_clips: vec![clip_id_owned.clone()],
        affected_audio_tracks: vec![track_id],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::AudioClip,
            entity_id: clip_id_owned,
            before,
            after,
        }],
        rollback: None,
    })
}

fn add_audio_track(
    timeline: &mut Timeline,
    name: &str,
    track_type: AudioTrackType,
    volume: Option<f64>,
    muted: Option<bool>,
) -> Result<DispatchOutcome, CoreError> {
    let track = AudioTrack {
        id: crate::model::generate_id(),
        name: name.to_string(),
        track_type,
        volume: volume.unwrap_or(1.0),
        muted: muted.unwrap_or(false),
        ducking: None,
        clips: vec![],
    };
    let track_id = track.id.clone();
    let after = serde_json::to_value(&track).ok();
    timeline.audio_tracks.push(track);

    Ok(DispatchOutcome {
        op_type: "add_audio_track",
        affected_clips: vec![],
        affected_layers: vec![],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![track_id.clone()],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::AudioTrack,
            entity_id: track_id,
            before: None,
            after,
        }],
        rollback: None,
    })
}

fn delete_audio_track(timeline: &mut Timeline, track_id: &str) -> Result<DispatchOutcome, CoreError> {
    let canonical_id = resolve_track_id(timeline, track_id)?;
    let index = timeline.find_track_index(&canonical_id).expect("resolved above");
    let track = timeline.audio_tracks.remove(index);

    Ok(DispatchOutcome {
        op_type: "delete_audio_track",
        affected_clips: vec![],
        affected_layers: vec![],
        affected_audio_clips: track.clips.iter().map(|c| c.id.clone()).collect(),
        affected_audio_tracks: vec![canonical_id],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::AudioTrack,
            entity_id: track.id.clone(),
            before: serde_json::to_value(&track).ok(),
            after: None,
        }],
        rollback: None,
    })
}

fn update_audio_track(
    timeline: &mut Timeline,
    track_id: &str,
    name: Option<String>,
    volume: Option<f64>,
    muted: Option<bool>,
) -> Result<DispatchOutcome, CoreError> {
    let canonical_id = resolve_track_id(timeline, track_id)?;
    let track = timeline.find_track_mut(&canonical_id).expect("resolved above");
    let before = serde_json::to_value(&*track).ok();
    if let Some(name) = name {
        track.name = name;
    }
    if let Some(volume) = volume {
        track.volume = volume;
    }
    if let Some(muted) = muted {
        track.muted = muted;
    }
    let after = serde_json::to_value(&*track).ok();

    Ok(DispatchOutcome {
        op_type: "update_audio_track",
        affected_clips: vec![],
        affected_layers: vec![],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![canonical_id.clone()],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::AudioTrack,
            entity_id: canonical_id,
            before,
            after,
        }],
        rollback: None,
    })
}

fn reorder_audio_tracks(timeline: &mut Timeline, order: &[String]) -> Result<DispatchOutcome, CoreError> {
    let mut reordered = Vec::with_capacity(timeline.audio_tracks.len());
    let mut remaining = std::mem::take(&mut timeline.audio_tracks);

    for search in order {
        let canonical_id = {
            let ids: Vec<&str> = remaining.iter().map(|t| t.id.as_str()).collect();
            let index = ids::resolve_index(search, ids.iter().copied())
                .ok_or_else(|| CoreError::new(ErrorCode::AudioTrackNotFound, format!("audio track {search} not found")))?;
            remaining[index].id.clone()
        };
        let position = remaining.iter().position(|t| t.id == canonical_id).expect("resolved above");
        reordered.push(remaining.remove(position));
    }
    reordered.extend(remaining);
    timeline.audio_tracks = reordered;

    Ok(DispatchOutcome {
        op_type: "reorder_audio_tracks",
        affected_clips: vec![],
        affected_layers: vec![],
        affected_audio_clips: vec![],
        affected_audio_tracks: timeline.audio_tracks.iter().map(|t| t.id.clone()).collect(),
        changes: vec![],
        rollback: None,
    })
}

fn add_marker(timeline: &mut Timeline, time_ms: i64, name: &str, color: Option<String>) -> Result<DispatchOutcome, CoreError> {
    if time_ms < 0 {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "time_ms must be >= 0").with_field("time_ms"));
    }
    let marker = Marker {
        id: crate::model::generate_id(),
        time_ms,
        name: name.to_string(),
        color,
    };
    let marker_id = marker.id.clone();
    let after = serde_json::to_value(&marker).ok();
    timeline.markers.push(marker);
    timeline.markers.sort_by_key(|m| m.time_ms);

    Ok(DispatchOutcome {
        op_type: "add_marker",
        affected_clips: vec![],
        affected_layers: vec![],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Marker,
            entity_id: marker_id.clone(),
            before: None,
            after,
        }],
        rollback: Some(RollbackData::AddMarker { marker_id }),
    })
}

fn update_marker(
    timeline: &mut Timeline,
    marker_id: &str,
    time_ms: Option<i64>,
    name: Option<String>,
    color: Option<String>,
) -> Result<DispatchOutcome, CoreError> {
    let index = resolve_marker_index(timeline, marker_id)?;
    let original = timeline.markers[index].clone();
    let before = serde_json::to_value(&original).ok();

    let marker = &mut timeline.markers[index];
    if let Some(time_ms) = time_ms {
        marker.time_ms = time_ms;
    }
    if let Some(name) = name {
        marker.name = name;
    }
    if color.is_some() {
        marker.color = color;
    }
    let canonical_id = marker.id.clone();
    let after = serde_json::to_value(&*marker).ok();
    timeline.markers.sort_by_key(|m| m.time_ms);

    Ok(DispatchOutcome {
        op_type: "update_marker",
        affected_clips: vec![],
        affected_layers: vec![],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Marker,
            entity_id: canonical_id,
            before,
            after,
        }],
        rollback: Some(RollbackData::UpdateMarker {
            marker_id: original.id.clone(),
            original,
        }),
    })
}

fn delete_marker(timeline: &mut Timeline, marker_id: &str) -> Result<DispatchOutcome, CoreError> {
    let index = resolve_marker_index(timeline, marker_id)?;
    let marker = timeline.markers.remove(index);
    let before = serde_json::to_value(&marker).ok();

    Ok(DispatchOutcome {
        op_type: "delete_marker",
        affected_clips: vec![],
        affected_layers: vec![],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Marker,
            entity_id: marker.id.clone(),
            before,
            after: None,
        }],
        rollback: Some(RollbackData::DeleteMarker { marker }),
    })
}

fn full_replace(timeline: &mut Timeline, replacement: Timeline) -> Result<DispatchOutcome, CoreError> {
    let before = serde_json::to_value(&*timeline).ok();
    *timeline = replacement;
    let after = serde_json::to_value(&*timeline).ok();

    Ok(DispatchOutcome {
        op_type: "full_replace",
        affected_clips: vec![],
        affected_layers: timeline.layers.iter().map(|l| l.id.clone()).collect(),
        affected_audio_clips: vec![],
        affected_audio_tracks: timeline.audio_tracks.iter().map(|t| t.id.clone()).collect(),
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::Timeline,
            entity_id: "timeline".to_string(),
            before,
            after,
        }],
        rollback: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LayerType;

    fn timeline_with_layer(layer_id: &str) -> Timeline {
        Timeline {
            layers: vec![Layer {
                id: layer_id.to_string(),
                name: "L1".to_string(),
                layer_type: LayerType::Content,
                visible: true,
                locked: false,
                clips: vec![],
                order: None,
            }],
            ..Default::default()
        }
    }

    fn new_clip(start_ms: i64, duration_ms: i64) -> NewClip {
        NewClip {
            asset_id: None,
            start_ms,
            duration_ms,
            in_point_ms: 0,
            out_point_ms: None,
            transform: Transform::default(),
            effects: ClipEffects::default(),
            transition_in: None,
            transition_out: None,
            text_content: Some("hi".to_string()),
            text_style: None,
            shape: None,
            crop: None,
            keyframes: None,
            group_id: None,
        }
    }

    #[test]
    fn add_clip_refuses_overlap() {
        let mut timeline = timeline_with_layer("l1");
        let config = CoreConfig::default();
        let op = OperationInput::ClipAdd {
            layer_id: "l1".to_string(),
            clip: new_clip(0, 1000),
        };
        apply(&mut timeline, &op, &config).unwrap();
        let op2 = OperationInput::ClipAdd {
            layer_id: "l1".to_string(),
            clip: new_clip(500, 1000),
        };
        let err = apply(&mut timeline, &op2, &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::ClipOverlap);
    }

    #[test]
    fn move_clip_produces_rollback_with_original_position() {
        let mut timeline = timeline_with_layer("l1");
        let config = CoreConfig::default();
        let add = OperationInput::ClipAdd {
            layer_id: "l1".to_string(),
            clip: new_clip(0, 1000),
        };
        let outcome = apply(&mut timeline, &add, &config).unwrap();
        let clip_id = outcome.affected_clips[0].clone();

        let mv = OperationInput::ClipMove {
            clip_id: clip_id.clone(),
            new_start_ms: 5000,
            new_layer_id: None,
        };
        let outcome = apply(&mut timeline, &mv, &config).unwrap();
        match outcome.rollback {
            Some(RollbackData::MoveClip { original_start_ms, .. }) => assert_eq!(original_start_ms, 0),
            _ => panic!("expected MoveClip rollback data"),
        }
        assert_eq!(timeline.duration_ms, 6000);
    }

    #[test]
    fn unknown_layer_in_add_reports_layer_not_found() {
        let mut timeline = timeline_with_layer("l1");
        let config = CoreConfig::default();
        let op = OperationInput::ClipAdd {
            layer_id: "nonexistent".to_string(),
            clip: new_clip(0, 1000),
        };
        let err = apply(&mut timeline, &op, &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::LayerNotFound);
    }

    #[test]
    fn delete_last_clip_shrinks_duration() {
        let mut timeline = timeline_with_layer("l1");
        let config = CoreConfig::default();
        let add = OperationInput::ClipAdd {
            layer_id: "l1".to_string(),
            clip: new_clip(0, 1000),
        };
        let outcome = apply(&mut timeline, &add, &config).unwrap();
        let clip_id = outcome.affected_clips[0].clone();
        assert_eq!(timeline.duration_ms, 1000);

        let del = OperationInput::ClipDelete { clip_id };
        apply(&mut timeline, &del, &config).unwrap();
        assert_eq!(timeline.duration_ms, 0);
    }

    #[test]
    fn rollback_supported_set_matches_spec_table() {
        assert!(is_rollback_supported("add_clip"));
        assert!(is_rollback_supported("move_clip"));
        assert!(is_rollback_supported("update_transform"));
        assert!(!is_rollback_supported("update_text"));
        assert!(!is_rollback_supported("update_shape"));
        assert!(is_rollback_supported("delete_marker"));
    }

    #[test]
    fn delete_marker_produces_rollback_with_full_marker() {
        let mut timeline = timeline_with_layer("l1");
        let config = CoreConfig::default();
        let add = OperationInput::MarkerAdd {
            time_ms: 1000,
            name: "chapter".to_string(),
            color: None,
        };
        let outcome = apply(&mut timeline, &add, &config).unwrap();
        let marker_id = outcome.changes[0].entity_id.clone();

        let del = OperationInput::MarkerDelete { marker_id: marker_id.clone() };
        let outcome = apply(&mut timeline, &del, &config).unwrap();
        match outcome.rollback {
            Some(RollbackData::DeleteMarker { marker }) => assert_eq!(marker.id, marker_id),
            _ => panic!("expected DeleteMarker rollback data"),
        }
    }
}
