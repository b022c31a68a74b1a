//! The append-only operation log and rollback engine (C7).
//!
//! Grounded directly on `operation_service.py`'s `rollback_operation` /
//! `_apply_rollback`: the critical property carried over verbatim is that
//! `move_*` rollback locates the clip, then locates the *original*
//! container, then moves — falling back to the clip's current container
//! (with a warning) if the original vanished, rather than ever dropping
//! the clip. Everything else follows the teacher's snapshot/restore shape
//! in `action_router::run_edit_plan`, lifted from a single transient
//! snapshot to a durable, queryable log.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dispatcher::{ChangeDetail, DispatchOutcome, RollbackData};
use crate::error::{CoreError, ErrorCode};
use crate::model::{OperationSource, Timeline};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: String,
    pub project_id: String,
    pub operation_type: String,
    pub source: OperationSource,
    pub affected_clips: Vec<String>,
    pub affected_layers: Vec<String>,
    pub affected_audio_clips: Vec<String>,
    pub diff: Value,
    pub request_summary: Option<String>,
    pub result_summary: Option<String>,
    pub rollback_data: Option<RollbackData>,
    pub rollback_available: bool,
    pub rolled_back: bool,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub rolled_back_by: Option<String>,
    pub success: bool,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub idempotency_key: Option<String>,
    pub user_id: Option<String>,
    pub project_version: u64,
    pub created_at: DateTime<Utc>,
}

/// Aggregate `{entity_id: {field: {from, to}}}` diff for one operation's
/// change set. Distinct from `rollback_data`, which is the inverse-apply
/// payload; this is purely descriptive.
pub fn compute_diff(changes: &[ChangeDetail]) -> Value {
    let mut out = serde_json::Map::new();
    for change in changes {
        out.insert(change.entity_id.clone(), diff_one(change));
    }
    Value::Object(out)
}

fn diff_one(change: &ChangeDetail) -> Value {
    match (&change.before, &change.after) {
        (None, Some(after)) => json!({ "created": after }),
        (Some(before), None) => json!({ "deleted": before }),
        (None, None) => Value::Null,
        (Some(before), Some(after)) => {
            let mut fields = serde_json::Map::new();
            if let (Value::Object(b), Value::Object(a)) = (before, after) {
                let mut keys: Vec<&String> = b.keys().chain(a.keys()).collect();
                keys.sort();
                keys.dedup();
                for key in keys {
                    let bv = b.get(key).cloned().unwrap_or(Value::Null);
                    let av = a.get(key).cloned().unwrap_or(Value::Null);
                    if bv != av {
                        fields.insert(key.clone(), json!({ "from": bv, "to": av }));
                    }
                }
            }
            Value::Object(fields)
        }
    }
}

/// Build the record for a successful dispatch, ready to push onto the log.
/// `version` is the `project_version` this operation committed as.
#[allow(clippy::too_many_arguments)]
pub fn record_success(
    project_id: impl Into<String>,
    outcome: &DispatchOutcome,
    source: OperationSource,
    idempotency_key: Option<String>,
    user_id: Option<String>,
    version: u64,
    now: DateTime<Utc>,
) -> OperationRecord {
    debug_assert_eq!(
        outcome.rollback.is_some(),
        crate::dispatcher::is_rollback_supported(outcome.op_type),
        "op {} produced rollback data inconsistent with its declared support",
        outcome.op_type,
    );
    OperationRecord {
        id: crate::model::generate_id(),
        project_id: project_id.into(),
        operation_type: outcome.op_type.to_string(),
        source,
        affected_clips: outcome.affected_clips.clone(),
        affected_layers: outcome.affected_layers.clone(),
        affected_audio_clips: outcome.affected_audio_clips.clone(),
        diff: compute_diff(&outcome.changes),
        request_summary: None,
        result_summary: None,
        rollback_data: outcome.rollback.clone(),
        rollback_available: outcome.rollback.is_some(),
        rolled_back: false,
        rolled_back_at: None,
        rolled_back_by: None,
        success: true,
        error_code: None,
        error_message: None,
        idempotency_key,
        user_id,
        project_version: version,
        created_at: now,
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub since_version: Option<u64>,
    pub clip_id: Option<String>,
    pub operation_type: Option<String>,
    pub source: Option<OperationSource>,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// `GET .../history` with the filters and pagination spec.md §6 lists.
pub fn query<'a>(records: &'a [OperationRecord], q: &HistoryQuery) -> Vec<&'a OperationRecord> {
    let filtered: Vec<&OperationRecord> = records
        .iter()
        .filter(|r| q.since_version.map_or(true, |v| r.project_version > v))
        .filter(|r| {
            q.clip_id
                .as_deref()
                .map_or(true, |id| r.affected_clips.iter().any(|c| c == id))
        })
        .filter(|r| q.operation_type.as_deref().map_or(true, |t| r.operation_type == t))
        .filter(|r| q.source.map_or(true, |s| r.source == s))
        .collect();

    let end = match q.limit {
        Some(limit) => (q.offset + limit).min(filtered.len()),
        None => filtered.len(),
    };
    if q.offset >= filtered.len() {
        Vec::new()
    } else {
        filtered[q.offset..end].to_vec()
    }
}

fn resolve_record_index(records: &[OperationRecord], search: &str) -> Result<usize, CoreError> {
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    crate::ids::resolve_index(search, ids.iter().copied())
        .ok_or_else(|| CoreError::new(ErrorCode::OperationNotFound, format!("operation {search} not found")))
}

/// Roll back the operation identified by `operation_id` (exact or
/// prefix-matched). Validates every precondition (§4.7) before touching
/// state; applies the inverse; appends a `rollback_<type>` record.
pub fn rollback(
    records: &mut Vec<OperationRecord>,
    timeline: &mut Timeline,
    version: &mut u64,
    operation_id: &str,
    now: DateTime<Utc>,
) -> Result<OperationRecord, CoreError> {
    let index = resolve_record_index(records, operation_id)?;

    if !records[index].success {
        return Err(CoreError::new(ErrorCode::RollbackNotAvailable, "the original operation did not succeed"));
    }
    if !records[index].rollback_available {
        return Err(CoreError::new(ErrorCode::RollbackNotAvailable, "this operation type does not support rollback"));
    }
    if records[index].rolled_back {
        return Err(CoreError::new(
            ErrorCode::OperationAlreadyRolledBack,
            "this operation was already rolled back",
        ));
    }
    let Some(rollback_data) = records[index].rollback_data.clone() else {
        return Err(CoreError::new(ErrorCode::RollbackNotAvailable, "no rollback data was recorded"));
    };

    let changes = apply_inverse(timeline, &rollback_data)?;
    timeline.recompute_duration();

    *version += 1;
    let new_record = OperationRecord {
        id: crate::model::generate_id(),
        project_id: records[index].project_id.clone(),
        operation_type: format!("rollback_{}", records[index].operation_type),
        source: OperationSource::Editor,
        affected_clips: changes.iter().map(|c| c.entity_id.clone()).collect(),
        affected_layers: records[index].affected_layers.clone(),
        affected_audio_clips: records[index].affected_audio_clips.clone(),
        diff: compute_diff(&changes),
        request_summary: Some(format!("rollback of {}", records[index].id)),
        result_summary: None,
        rollback_data: None,
        rollback_available: false,
        rolled_back: false,
        rolled_back_at: None,
        rolled_back_by: None,
        success: true,
        error_code: None,
        error_message: None,
        idempotency_key: None,
        user_id: None,
        project_version: *version,
        created_at: now,
    };

    records[index].rolled_back = true;
    records[index].rolled_back_at = Some(now);
    records[index].rolled_back_by = Some(new_record.id.clone());
    records.push(new_record.clone());

    Ok(new_record)
}

fn apply_inverse(timeline: &mut Timeline, rollback_data: &RollbackData) -> Result<Vec<ChangeDetail>, CoreError> {
    use crate::dispatcher::EntityKind;

    match rollback_data {
        RollbackData::AddClip { clip_id, .. } => {
            let location = timeline
                .find_clip(clip_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "clip to remove no longer exists"))?;
            let (layer_index, clip_index) = (location.layer_index, location.clip_index);
            let before = serde_json::to_value(&timeline.layers[layer_index].clips[clip_index]).ok();
            timeline.layers[layer_index].clips.remove(clip_index);
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::Clip,
                entity_id: clip_id.clone(),
                before,
                after: None,
            }])
        }
        RollbackData::DeleteClip { layer_id, clip } => {
            let index = timeline.find_layer_index(layer_id).ok_or_else(|| {
                CoreError::new(ErrorCode::RollbackFailed, "original layer no longer exists; cannot restore clip")
            })?;
            let after = serde_json::to_value(clip).ok();
            timeline.layers[index].clips.push(clip.clone());
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::Clip,
                entity_id: clip.id.clone(),
                before: None,
                after,
            }])
        }
        RollbackData::MoveClip {
            clip_id,
            original_start_ms,
            original_layer_id,
        } => {
            // Mandatory ordering (spec.md §4.7 / S4): locate the clip and its
            // current container first, then the original container, then move.
            let current = timeline
                .find_clip(clip_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "clip no longer exists"))?;
            let current_layer_index = current.layer_index;
            let clip_index = current.clip_index;
            let before = serde_json::to_value(&timeline.layers[current_layer_index].clips[clip_index]).ok();

            let target_layer_index = match timeline.find_layer_index(original_layer_id) {
                Some(index) => index,
                None => {
                    warn!(
                        "rollback of move_clip {clip_id}: original layer {original_layer_id} no longer exists, \
                         restoring on current layer instead"
                    );
                    current_layer_index
                }
            };

            let mut clip = timeline.layers[current_layer_index].clips.remove(clip_index);
            clip.start_ms = *original_start_ms;
            let after = serde_json::to_value(&clip).ok();
            // current_layer_index may have shifted if target == current and
            // the remove already happened on it; re-resolve by id to be safe.
            let target_layer_id = timeline.layers.get(target_layer_index).map(|l| l.id.clone());
            let target_index = match target_layer_id {
                Some(id) => timeline.find_layer_index(&id).unwrap_or(target_layer_index.min(timeline.layers.len())),
                None => timeline.layers.len().saturating_sub(1),
            };
            timeline.layers[target_index].clips.push(clip);

            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::Clip,
                entity_id: clip_id.clone(),
                before,
                after,
            }])
        }
        RollbackData::AddAudioClip { clip_id, .. } => {
            let location = timeline
                .find_audio_clip(clip_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "audio clip to remove no longer exists"))?;
            let (track_index, clip_index) = (location.track_index, location.clip_index);
            let before = serde_json::to_value(&timeline.audio_tracks[track_index].clips[clip_index]).ok();
            timeline.audio_tracks[track_index].clips.remove(clip_index);
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::AudioClip,
                entity_id: clip_id.clone(),
                before,
                after: None,
            }])
        }
        RollbackData::DeleteAudioClip { track_id, clip } => {
            let index = timeline.find_track_index(track_id).ok_or_else(|| {
                CoreError::new(ErrorCode::RollbackFailed, "original audio track no longer exists; cannot restore clip")
            })?;
            let after = serde_json::to_value(clip).ok();
            timeline.audio_tracks[index].clips.push(clip.clone());
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::AudioClip,
                entity_id: clip.id.clone(),
                before: None,
                after,
            }])
        }
        RollbackData::MoveAudioClip {
            clip_id,
            original_start_ms,
            original_track_id,
        } => {
            let current = timeline
                .find_audio_clip(clip_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "audio clip no longer exists"))?;
            let current_track_index = current.track_index;
            let clip_index = current.clip_index;
            let before = serde_json::to_value(&timeline.audio_tracks[current_track_index].clips[clip_index]).ok();

            let target_track_index = match timeline.find_track_index(original_track_id) {
                Some(index) => index,
                None => {
                    warn!(
                        "rollback of move_audio_clip {clip_id}: original track {original_track_id} no longer exists, \
                         restoring on current track instead"
                    );
                    current_track_index
                }
            };

            let mut clip = timeline.audio_tracks[current_track_index].clips.remove(clip_index);
            clip.start_ms = *original_start_ms;
            let after = serde_json::to_value(&clip).ok();
            let target_track_id = timeline.audio_tracks.get(target_track_index).map(|t| t.id.clone());
            let target_index = match target_track_id {
                Some(id) => timeline
                    .find_track_index(&id)
                    .unwrap_or(target_track_index.min(timeline.audio_tracks.len())),
                None => timeline.audio_tracks.len().saturating_sub(1),
            };
            timeline.audio_tracks[target_index].clips.push(clip);

            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::AudioClip,
                entity_id: clip_id.clone(),
                before,
                after,
            }])
        }
        RollbackData::AddLayer { layer_id } => {
            let index = timeline
                .find_layer_index(layer_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "layer to remove no longer exists"))?;
            let before = serde_json::to_value(&timeline.layers[index]).ok();
            timeline.layers.remove(index);
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::Layer,
                entity_id: layer_id.clone(),
                before,
                after: None,
            }])
        }
        RollbackData::AddMarker { marker_id } => {
            let index = timeline
                .find_marker_index(marker_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "marker to remove no longer exists"))?;
            let before = serde_json::to_value(&timeline.markers[index]).ok();
            timeline.markers.remove(index);
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::Marker,
                entity_id: marker_id.clone(),
                before,
                after: None,
            }])
        }
        RollbackData::UpdateTransform { clip_id, original_transform } => {
            let location = timeline
                .find_clip(clip_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "clip no longer exists"))?;
            let (layer_index, clip_index) = (location.layer_index, location.clip_index);
            let before = serde_json::to_value(&timeline.layers[layer_index].clips[clip_index]).ok();
            timeline.layers[layer_index].clips[clip_index].transform = original_transform.clone();
            let after = serde_json::to_value(&timeline.layers[layer_index].clips[clip_index]).ok();
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::Clip,
                entity_id: clip_id.clone(),
                before,
                after,
            }])
        }
        RollbackData::UpdateEffects {
            clip_id,
            original_effects,
            original_transition_in,
            original_transition_out,
        } => {
            let location = timeline
                .find_clip(clip_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "clip no longer exists"))?;
            let (layer_index, clip_index) = (location.layer_index, location.clip_index);
            let before = serde_json::to_value(&timeline.layers[layer_index].clips[clip_index]).ok();
            let clip = &mut timeline.layers[layer_index].clips[clip_index];
            clip.effects = original_effects.clone();
            clip.transition_in = original_transition_in.clone();
            clip.transition_out = original_transition_out.clone();
            let after = serde_json::to_value(&*clip).ok();
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::Clip,
                entity_id: clip_id.clone(),
                before,
                after,
            }])
        }
        RollbackData::UpdateTextStyle { clip_id, original_text_style } => {
            let location = timeline
                .find_clip(clip_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "clip no longer exists"))?;
            let (layer_index, clip_index) = (location.layer_index, location.clip_index);
            let before = serde_json::to_value(&timeline.layers[layer_index].clips[clip_index]).ok();
            timeline.layers[layer_index].clips[clip_index].text_style = original_text_style.clone();
            let after = serde_json::to_value(&timeline.layers[layer_index].clips[clip_index]).ok();
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::Clip,
                entity_id: clip_id.clone(),
                before,
                after,
            }])
        }
        RollbackData::UpdateClipTiming {
            clip_id,
            original_start_ms,
            original_duration_ms,
            original_in_point_ms,
            original_out_point_ms,
        } => {
            let location = timeline
                .find_clip(clip_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "clip no longer exists"))?;
            let (layer_index, clip_index) = (location.layer_index, location.clip_index);
            let before = serde_json::to_value(&timeline.layers[layer_index].clips[clip_index]).ok();
            let clip = &mut timeline.layers[layer_index].clips[clip_index];
            clip.start_ms = *original_start_ms;
            clip.duration_ms = *original_duration_ms;
            clip.in_point_ms = *original_in_point_ms;
            clip.out_point_ms = *original_out_point_ms;
            let after = serde_json::to_value(&*clip).ok();
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::Clip,
                entity_id: clip_id.clone(),
                before,
                after,
            }])
        }
        RollbackData::DeleteMarker { marker } => {
            let after = serde_json::to_value(marker).ok();
            timeline.markers.push(marker.clone());
            timeline.markers.sort_by_key(|m| m.time_ms);
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::Marker,
                entity_id: marker.id.clone(),
                before: None,
                after,
            }])
        }
        RollbackData::UpdateMarker { marker_id, original } => {
            let index = timeline
                .find_marker_index(marker_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "marker no longer exists"))?;
            let before = serde_json::to_value(&timeline.markers[index]).ok();
            timeline.markers[index] = original.clone();
            let after = serde_json::to_value(&timeline.markers[index]).ok();
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::Marker,
                entity_id: marker_id.clone(),
                before,
                after,
            }])
        }
        RollbackData::CloseGap { layer_id, original_starts } => {
            let layer_index = timeline
                .find_layer_index(layer_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "layer no longer exists"))?;
            let mut changes = Vec::new();
            for (clip_id, original_start_ms) in original_starts {
                let Some(clip_index) = timeline.layers[layer_index].clips.iter().position(|c| &c.id == clip_id) else {
                    warn!("rollback of close_gap: clip {clip_id} no longer exists on layer {layer_id}, skipping");
                    continue;
                };
                let before = serde_json::to_value(&timeline.layers[layer_index].clips[clip_index]).ok();
                timeline.layers[layer_index].clips[clip_index].start_ms = *original_start_ms;
                let after = serde_json::to_value(&timeline.layers[layer_index].clips[clip_index]).ok();
                changes.push(ChangeDetail {
                    entity_kind: EntityKind::Clip,
                    entity_id: clip_id.clone(),
                    before,
                    after,
                });
            }
            Ok(changes)
        }
        RollbackData::UpdateDucking { track_id, original_ducking } => {
            let index = timeline
                .find_track_index(track_id)
                .ok_or_else(|| CoreError::new(ErrorCode::RollbackFailed, "audio track no longer exists"))?;
            let before = serde_json::to_value(&timeline.audio_tracks[index]).ok();
            timeline.audio_tracks[index].ducking = original_ducking.clone();
            let after = serde_json::to_value(&timeline.audio_tracks[index]).ok();
            Ok(vec![ChangeDetail {
                entity_kind: EntityKind::AudioTrack,
                entity_id: track_id.clone(),
                before,
                after,
            }])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::dispatcher::{self, NewClip, OperationInput};
    use crate::model::{ClipEffects, Layer, LayerType, Transform};

    fn timeline_with_two_layers() -> Timeline {
        Timeline {
            layers: vec![
                Layer {
                    id: "l1".to_string(),
                    name: "L1".to_string(),
                    layer_type: LayerType::Content,
                    visible: true,
                    locked: false,
                    clips: vec![],
                    order: None,
                },
                Layer {
                    id: "l2".to_string(),
                    name: "L2".to_string(),
                    layer_type: LayerType::Content,
                    visible: true,
                    locked: false,
                    clips: vec![],
                    order: None,
                },
            ],
            ..Default::default()
        }
    }

    fn new_clip() -> NewClip {
        NewClip {
            asset_id: None,
            start_ms: 0,
            duration_ms: 1000,
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
    fn rollback_of_move_falls_back_to_current_layer_when_original_vanished() {
        let mut timeline = timeline_with_two_layers();
        let config = CoreConfig::default();
        let add = OperationInput::ClipAdd {
            layer_id: "l1".to_string(),
            clip: new_clip(),
        };
        let outcome = dispatcher::apply(&mut timeline, &add, &config).unwrap();
        let clip_id = outcome.affected_clips[0].clone();

        let mv = OperationInput::ClipMove {
            clip_id: clip_id.clone(),
            new_start_ms: 0,
            new_layer_id: Some("l2".to_string()),
        };
        let mv_outcome = dispatcher::apply(&mut timeline, &mv, &config).unwrap();

        // L1 vanishes via a path the history engine doesn't track.
        timeline.layers.retain(|l| l.id != "l1");

        let mut records = vec![record_success(
            "proj",
            &mv_outcome,
            OperationSource::ApiV1,
            None,
            None,
            1,
            Utc::now(),
        )];
        let mut version = 1u64;
        rollback(&mut records, &mut timeline, &mut version, &records[0].id.clone(), Utc::now()).unwrap();

        let location = timeline.find_clip(&clip_id).expect("clip still present");
        assert_eq!(timeline.layers[location.layer_index].id, "l2");
        assert_eq!(location.clip.start_ms, 0);
        assert!(records[0].rolled_back);
    }

    #[test]
    fn rollback_twice_is_rejected() {
        let mut timeline = timeline_with_two_layers();
        let config = CoreConfig::default();
        let add = OperationInput::ClipAdd {
            layer_id: "l1".to_string(),
            clip: new_clip(),
        };
        let outcome = dispatcher::apply(&mut timeline, &add, &config).unwrap();
        let mut records = vec![record_success("proj", &outcome, OperationSource::ApiV1, None, None, 1, Utc::now())];
        let mut version = 1u64;
        let op_id = records[0].id.clone();
        rollback(&mut records, &mut timeline, &mut version, &op_id, Utc::now()).unwrap();
        let err = rollback(&mut records, &mut timeline, &mut version, &op_id, Utc::now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationAlreadyRolledBack);
    }

    #[test]
    fn unsupported_rollback_is_rejected_without_mutating() {
        let mut timeline = timeline_with_two_layers();
        let config = CoreConfig::default();
        let add = OperationInput::ClipAdd {
            layer_id: "l1".to_string(),
            clip: new_clip(),
        };
        let outcome = dispatcher::apply(&mut timeline, &add, &config).unwrap();
        let clip_id = outcome.affected_clips[0].clone();
        let shape_op = OperationInput::ClipShape {
            clip_id: clip_id.clone(),
            shape: crate::model::Shape {
                shape_type: "rect".to_string(),
                fill_color: None,
                stroke_color: None,
                stroke_width: 0.0,
            },
        };
        let shape_outcome = dispatcher::apply(&mut timeline, &shape_op, &config).unwrap();
        let mut records = vec![record_success(
            "proj",
            &shape_outcome,
            OperationSource::ApiV1,
            None,
            None,
            2,
            Utc::now(),
        )];
        let mut version = 2u64;
        let err = rollback(&mut records, &mut timeline, &mut version, &records[0].id.clone(), Utc::now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::RollbackNotAvailable);
    }

    #[test]
    fn history_query_filters_by_since_version() {
        let records = vec![
            OperationRecord {
                project_version: 1,
                ..blank_record()
            },
            OperationRecord {
                project_version: 2,
                ..blank_record()
            },
        ];
        let results = query(&records, &HistoryQuery { since_version: Some(1), ..Default::default() });
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].project_version, 2);
    }

    fn blank_record() -> OperationRecord {
        OperationRecord {
            id: crate::model::generate_id(),
            project_id: "proj".to_string(),
            operation_type: "add_clip".to_string(),
            source: OperationSource::ApiV1,
            affected_clips: vec![],
            affected_layers: vec![],
            affected_audio_clips: vec![],
            diff: Value::Null,
            request_summary: None,
            result_summary: None,
            rollback_data: None,
            rollback_available: false,
            rolled_back: false,
            rolled_back_at: None,
            rolled_back_by: None,
            success: true,
            error_code: None,
            error_message: None,
            idempotency_key: None,
            user_id: None,
            project_version: 0,
            created_at: Utc::now(),
        }
    }
}
