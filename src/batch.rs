//! Atomic multi-op apply under an optimistic version check, plus the
//! idempotency cache (C5).
//!
//! Grounded on the teacher's `run_edit_plan`: snapshot, apply each action in
//! order, roll back to the snapshot on the first failure. Here the "snapshot"
//! is an owned clone of the timeline rather than a single before-value, since
//! a batch can touch many entities across many operations before it either
//! all takes effect or none of it does (spec.md §4.5, S2).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::dispatcher::{self, DispatchOutcome, OperationInput};
use crate::error::{CoreError, ErrorCode};
use crate::model::Timeline;

/// What a successful batch (or single op applied through the batch path)
/// hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub version: u64,
    pub timeline_data: Timeline,
}

/// The recorded-type string for the history entry this batch produces:
/// the single op's type if `len == 1`, else `"batch"` (spec.md §4.5 step 3).
pub fn recorded_op_type(outcomes: &[DispatchOutcome]) -> String {
    match outcomes {
        [single] => single.op_type.to_string(),
        _ => "batch".to_string(),
    }
}

#[derive(Debug)]
pub enum BatchApplyError {
    /// The request's expected version didn't match the server's current one.
    ConcurrentModification { server_version: u64 },
    /// Operation at `index` failed; the batch was aborted and nothing in it
    /// took effect.
    Operation { index: usize, error: CoreError },
}

impl BatchApplyError {
    pub fn into_core_error(self) -> CoreError {
        match self {
            BatchApplyError::ConcurrentModification { server_version } => {
                CoreError::new(ErrorCode::ConcurrentModification, "the project has been modified since this version was read")
                    .with_details(serde_json::json!({ "server_version": server_version }))
            }
            BatchApplyError::Operation { index, error } => error.with_details(serde_json::json!({ "operation_index": index })),
        }
    }
}

/// Apply `operations` in order against an uncommitted copy of `timeline`.
/// On any failure, `timeline` and `version` are left completely untouched
/// and the index/error of the first failing op is returned. On success,
/// `timeline` is swapped in and `version` incremented by exactly one.
pub fn apply_batch(
    timeline: &mut Timeline,
    version: &mut u64,
    expected_version: u64,
    operations: &[OperationInput],
    config: &CoreConfig,
) -> Result<(BatchResponse, Vec<DispatchOutcome>), BatchApplyError> {
    if expected_version != *version {
        return Err(BatchApplyError::ConcurrentModification { server_version: *version });
    }

    let mut working = timeline.clone();
    let mut outcomes = Vec::with_capacity(operations.len());
    for (index, op) in operations.iter().enumerate() {
        match dispatcher::apply(&mut working, op, config) {
            Ok(outcome) => outcomes.push(outcome),
            Err(error) => return Err(BatchApplyError::Operation { index, error }),
        }
    }

    *timeline = working;
    *version += 1;

    Ok((
        BatchResponse {
            version: *version,
            timeline_data: timeline.clone(),
        },
        outcomes,
    ))
}

fn fingerprint(expected_version: u64, operations: &[OperationInput]) -> u64 {
    let mut hasher = DefaultHasher::new();
    expected_version.hash(&mut hasher);
    if let Ok(json) = serde_json::to_string(operations) {
        json.hash(&mut hasher);
    }
    hasher.finish()
}

/// Per-project cache of committed `Idempotency-Key` results. A key replayed
/// with the same parameters returns the original response verbatim without
/// touching the timeline again; replayed with different parameters is a
/// conflict.
#[derive(Debug, Clone, Default)]
pub struct IdempotencyCache {
    entries: HashMap<String, (u64, BatchResponse)>,
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key` against the request shape that would be applied.
    /// `Ok(Some(response))` means replay this verbatim without reapplying.
    /// `Ok(None)` means this key hasn't been seen — proceed to apply.
    /// `Err` means the key was seen with different parameters.
    pub fn check(
        &self,
        key: &str,
        expected_version: u64,
        operations: &[OperationInput],
    ) -> Result<Option<BatchResponse>, CoreError> {
        let Some((stored_fingerprint, response)) = self.entries.get(key) else {
            return Ok(None);
        };
        if *stored_fingerprint == fingerprint(expected_version, operations) {
            Ok(Some(response.clone()))
        } else {
            Err(CoreError::new(
                ErrorCode::IdempotencyConflict,
                "this idempotency key was already used with different parameters",
            ))
        }
    }

    pub fn store(&mut self, key: String, expected_version: u64, operations: &[OperationInput], response: BatchResponse) {
        self.entries.insert(key, (fingerprint(expected_version, operations), response));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::NewClip;
    use crate::model::{ClipEffects, Layer, LayerType, Transform};

    fn timeline_with_layers() -> Timeline {
        Timeline {
            layers: vec![
                Layer {
                    id: "l1".to_string(),
                    name: "L1".to_string(),
                    layer_type: LayerType::Content,
                    visible: true,
                    locked: false,
                    clips: vec![crate::model::Clip {
                        id: "existing".to_string(),
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
                    }],
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
            duration_ms: 1000,
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
    fn version_mismatch_reports_server_version() {
        let mut timeline = timeline_with_layers();
        let mut version = 7u64;
        let config = CoreConfig::default();
        let ops = vec![OperationInput::ClipAdd {
            layer_id: "l2".to_string(),
            clip: new_clip(0, 2000),
        }];
        let err = apply_batch(&mut timeline, &mut version, 6, &ops, &config).unwrap_err();
        match err {
            BatchApplyError::ConcurrentModification { server_version } => assert_eq!(server_version, 7),
            _ => panic!("expected ConcurrentModification"),
        }
        assert_eq!(version, 7);
    }

    /// S2: second op would succeed individually, first fails with overlap;
    /// the whole batch must abort and leave the timeline untouched.
    #[test]
    fn partial_failure_restores_original_timeline_and_version() {
        let mut timeline = timeline_with_layers();
        let mut version = 1u64;
        let config = CoreConfig::default();
        let ops = vec![
            OperationInput::ClipAdd {
                layer_id: "l1".to_string(),
                clip: new_clip(500, 1000),
            },
            OperationInput::ClipAdd {
                layer_id: "l2".to_string(),
                clip: new_clip(0, 2000),
            },
        ];
        let err = apply_batch(&mut timeline, &mut version, 1, &ops, &config).unwrap_err();
        match err {
            BatchApplyError::Operation { index, error } => {
                assert_eq!(index, 0);
                assert_eq!(error.code, ErrorCode::ClipOverlap);
            }
            _ => panic!("expected Operation error"),
        }
        assert_eq!(version, 1);
        assert_eq!(timeline.layers[1].clips.len(), 0);
        assert_eq!(timeline.duration_ms, 1000);
    }

    #[test]
    fn successful_batch_increments_version_exactly_once() {
        let mut timeline = timeline_with_layers();
        let mut version = 1u64;
        let config = CoreConfig::default();
        let ops = vec![
            OperationInput::ClipAdd {
                layer_id: "l2".to_string(),
                clip: new_clip(0, 500),
            },
            OperationInput::ClipAdd {
                layer_id: "l2".to_string(),
                clip: new_clip(500, 500),
            },
        ];
        let (response, outcomes) = apply_batch(&mut timeline, &mut version, 1, &ops, &config).unwrap();
        assert_eq!(version, 2);
        assert_eq!(response.version, 2);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(recorded_op_type(&outcomes), "batch");
    }

    #[test]
    fn single_op_batch_is_recorded_under_its_own_type() {
        let mut timeline = timeline_with_layers();
        let mut version = 1u64;
        let config = CoreConfig::default();
        let ops = vec![OperationInput::ClipAdd {
            layer_id: "l2".to_string(),
            clip: new_clip(0, 500),
        }];
        let (_response, outcomes) = apply_batch(&mut timeline, &mut version, 1, &ops, &config).unwrap();
        assert_eq!(recorded_op_type(&outcomes), "add_clip");
    }

    #[test]
    fn idempotent_replay_returns_stored_response_without_reapplying() {
        let mut timeline = timeline_with_layers();
        let mut version = 1u64;
        let config = CoreConfig::default();
        let ops = vec![OperationInput::ClipAdd {
            layer_id: "l2".to_string(),
            clip: new_clip(0, 500),
        }];
        let mut cache = IdempotencyCache::new();
        assert!(cache.check("key-1", 1, &ops).unwrap().is_none());

        let (response, _outcomes) = apply_batch(&mut timeline, &mut version, 1, &ops, &config).unwrap();
        cache.store("key-1".to_string(), 1, &ops, response.clone());

        // A second submission with the same key and parameters must not
        // reapply — the cache just hands back what was already committed.
        let replay = cache.check("key-1", 1, &ops).unwrap();
        assert_eq!(replay.unwrap().version, response.version);
        assert_eq!(version, 2, "version must not have advanced again");
    }

    #[test]
    fn idempotent_replay_with_different_parameters_conflicts() {
        let ops_a = vec![OperationInput::ClipAdd {
            layer_id: "l2".to_string(),
            clip: new_clip(0, 500),
        }];
        let ops_b = vec![OperationInput::ClipAdd {
            layer_id: "l2".to_string(),
            clip: new_clip(0, 999),
        }];
        let mut cache = IdempotencyCache::new();
        cache.store(
            "key-1".to_string(),
            1,
            &ops_a,
            BatchResponse {
                version: 2,
                timeline_data: Timeline::default(),
            },
        );
        let err = cache.check("key-1", 1, &ops_b).unwrap_err();
        assert_eq!(err.code, ErrorCode::IdempotencyConflict);
    }
}
