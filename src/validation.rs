//! Pure dry-run evaluation of a proposed mutation (C3).
//!
//! Generalized from the teacher's `validator::validate_plan` (lock, check
//! every target clip exists, never mutate) to the field-level policy in
//! spec.md §4.3. Unlike the teacher, this never touches a lock — it takes
//! an immutable `&Timeline` snapshot and returns a value, exactly like the
//! original's `composition_validator`/`validation_service`.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ErrorCode};
use crate::model::{Clip, ClipEffects, Crop, Shape, TextStyle, Timeline, Transform};

/// The fixed shape of clip payload a caller proposes for `clip.add`
/// (spec.md §4.3: "a proposed mutation of a fixed shape").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipInput {
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
    pub text_content: Option<String>,
    pub text_style: Option<TextStyle>,
    pub shape: Option<Shape>,
    pub crop: Option<Crop>,
    pub group_id: Option<String>,
}

/// The four proposed-mutation shapes the Validation Engine evaluates
/// (spec.md §4.3: "add/move/transform/delete of a clip").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposedMutation {
    AddClip {
        layer_id: String,
        clip: ClipInput,
    },
    MoveClip {
        clip_id: String,
        new_start_ms: i64,
        new_layer_id: Option<String>,
    },
    TransformClip {
        clip_id: String,
        transform: Transform,
    },
    DeleteClip {
        clip_id: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WouldAffect {
    pub clips_created: u32,
    pub clips_modified: u32,
    pub clips_deleted: u32,
    pub duration_change_ms: i64,
    pub layers_affected: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub would_affect: WouldAffect,
}

/// Looks up an asset's known duration, if any. `None` means the asset's
/// duration is unknown (or the clip has no `asset_id`), in which case I3's
/// bounds check is skipped the way the original does when no asset record
/// is attached yet.
pub trait AssetDurationLookup {
    fn duration_ms(&self, asset_id: &str) -> Option<i64>;
}

impl<F: Fn(&str) -> Option<i64>> AssetDurationLookup for F {
    fn duration_ms(&self, asset_id: &str) -> Option<i64> {
        self(asset_id)
    }
}

/// Evaluate `mutation` against `timeline` without mutating it.
pub fn validate(
    timeline: &Timeline,
    mutation: &ProposedMutation,
    assets: &impl AssetDurationLookup,
) -> Result<ValidationResult, CoreError> {
    match mutation {
        ProposedMutation::AddClip { layer_id, clip } => validate_add(timeline, layer_id, clip, assets),
        ProposedMutation::MoveClip {
            clip_id,
            new_start_ms,
            new_layer_id,
        } => validate_move(timeline, clip_id, *new_start_ms, new_layer_id.as_deref()),
        ProposedMutation::TransformClip { clip_id, .. } => validate_transform(timeline, clip_id),
        ProposedMutation::DeleteClip { clip_id } => validate_delete(timeline, clip_id),
    }
}

fn validate_timing(start_ms: i64, duration_ms: i64, in_point_ms: i64, out_point_ms: Option<i64>) -> Result<(), CoreError> {
    if start_ms < 0 {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "start_ms must be >= 0").with_field("start_ms"));
    }
    if duration_ms <= 0 {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "duration_ms must be > 0").with_field("duration_ms"));
    }
    if let Some(out_point_ms) = out_point_ms {
        if in_point_ms >= out_point_ms {
            return Err(CoreError::new(
                ErrorCode::InvalidTimeRange,
                "in_point_ms must be < out_point_ms",
            )
            .with_field("in_point_ms"));
        }
    }
    Ok(())
}

fn validate_add(
    timeline: &Timeline,
    layer_id: &str,
    clip: &ClipInput,
    assets: &impl AssetDurationLookup,
) -> Result<ValidationResult, CoreError> {
    let layer = timeline
        .find_layer(layer_id)
        .ok_or_else(|| CoreError::new(ErrorCode::LayerNotFound, format!("layer {layer_id} not found")))?;

    validate_timing(clip.start_ms, clip.duration_ms, clip.in_point_ms, clip.out_point_ms)?;

    // I4: a clip without an asset_id must have text_content or a shape.
    if clip.asset_id.is_none() && clip.text_content.is_none() && clip.shape.is_none() {
        return Err(CoreError::new(
            ErrorCode::MissingRequiredField,
            "a clip without asset_id must provide text_content or shape",
        )
        .with_field("text_content"));
    }

    let mut warnings = Vec::new();

    // I3: for asset-backed clips with a known duration, timing must lie
    // within the asset's bounds.
    if let Some(asset_id) = &clip.asset_id {
        if let Some(asset_duration) = assets.duration_ms(asset_id) {
            let effective_out = clip.out_point_ms.unwrap_or(asset_duration);
            if clip.in_point_ms < 0 || effective_out > asset_duration {
                return Err(CoreError::new(
                    ErrorCode::OutOfBounds,
                    "in_point_ms/out_point_ms must lie within the asset's known duration",
                )
                .with_field("out_point_ms"));
            }
            if clip.duration_ms > effective_out - clip.in_point_ms {
                warnings.push(format!(
                    "duration_ms ({}) exceeds the asset's usable span ({}); accepted with discrepancy",
                    clip.duration_ms,
                    effective_out - clip.in_point_ms
                ));
            }
        }
    }

    let new_end = clip.start_ms + clip.duration_ms;
    if let Some(overlap_id) = timeline.overlaps_in_layer(layer_id, clip.start_ms, clip.duration_ms, None) {
        warnings.push(format!("overlaps existing clip {overlap_id} on layer {layer_id}"));
    }

    let duration_change_ms = (new_end - timeline.duration_ms).max(0);

    Ok(ValidationResult {
        valid: true,
        warnings,
        would_affect: WouldAffect {
            clips_created: 1,
            clips_modified: 0,
            clips_deleted: 0,
            duration_change_ms,
            layers_affected: vec![layer.id.clone()],
        },
    })
}

fn validate_move(
    timeline: &Timeline,
    clip_id: &str,
    new_start_ms: i64,
    new_layer_id: Option<&str>,
) -> Result<ValidationResult, CoreError> {
    let location = timeline
        .find_clip(clip_id)
        .ok_or_else(|| CoreError::new(ErrorCode::ClipNotFound, format!("clip {clip_id} not found")))?;

    if new_start_ms < 0 {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "start_ms must be >= 0").with_field("start_ms"));
    }

    let current_layer = &timeline.layers[location.layer_index];
    let target_layer_id = new_layer_id.unwrap_or(current_layer.id.as_str());
    if new_layer_id.is_some() && timeline.find_layer(target_layer_id).is_none() {
        return Err(CoreError::new(
            ErrorCode::LayerNotFound,
            format!("layer {target_layer_id} not found"),
        ));
    }

    let mut warnings = Vec::new();
    if let Some(overlap_id) =
        timeline.overlaps_in_layer(target_layer_id, new_start_ms, location.clip.duration_ms, Some(clip_id))
    {
        warnings.push(format!(
            "overlaps existing clip {overlap_id} on layer {target_layer_id}"
        ));
    }

    let mut layers_affected = vec![current_layer.id.clone()];
    if target_layer_id != current_layer.id {
        layers_affected.push(target_layer_id.to_string());
    }

    Ok(ValidationResult {
        valid: true,
        warnings,
        would_affect: WouldAffect {
            clips_created: 0,
            clips_modified: 1,
            clips_deleted: 0,
            duration_change_ms: 0,
            layers_affected,
        },
    })
}

fn validate_transform(timeline: &Timeline, clip_id: &str) -> Result<ValidationResult, CoreError> {
    let location = timeline
        .find_clip(clip_id)
        .ok_or_else(|| CoreError::new(ErrorCode::ClipNotFound, format!("clip {clip_id} not found")))?;
    let layer_id = timeline.layers[location.layer_index].id.clone();

    Ok(ValidationResult {
        valid: true,
        warnings: Vec::new(),
        would_affect: WouldAffect {
            clips_created: 0,
            clips_modified: 1,
            clips_deleted: 0,
            duration_change_ms: 0,
            layers_affected: vec![layer_id],
        },
    })
}

fn validate_delete(timeline: &Timeline, clip_id: &str) -> Result<ValidationResult, CoreError> {
    let location = timeline
        .find_clip(clip_id)
        .ok_or_else(|| CoreError::new(ErrorCode::ClipNotFound, format!("clip {clip_id} not found")))?;
    let layer_id = timeline.layers[location.layer_index].id.clone();

    let duration_change_ms = if location.clip.end_ms() == timeline.duration_ms {
        let remaining_max = max_end_excluding(timeline, clip_id);
        remaining_max - timeline.duration_ms
    } else {
        0
    };

    Ok(ValidationResult {
        valid: true,
        warnings: Vec::new(),
        would_affect: WouldAffect {
            clips_created: 0,
            clips_modified: 0,
            clips_deleted: 1,
            duration_change_ms,
            layers_affected: vec![layer_id],
        },
    })
}

fn max_end_excluding(timeline: &Timeline, exclude_clip_id: &str) -> i64 {
    let mut max_end = 0i64;
    for layer in &timeline.layers {
        for clip in &layer.clips {
            if clip.id != exclude_clip_id {
                max_end = max_end.max(clip.end_ms());
            }
        }
    }
    for track in &timeline.audio_tracks {
        for clip in &track.clips {
            max_end = max_end.max(clip.end_ms());
        }
    }
    max_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LayerType, Timeline};

    fn no_assets() -> impl Fn(&str) -> Option<i64> {
        |_: &str| None
    }

    fn timeline_with_layer(layer_id: &str) -> Timeline {
        Timeline {
            layers: vec![crate::model::Layer {
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

    #[test]
    fn rejects_negative_start() {
        let timeline = timeline_with_layer("l1");
        let mutation = ProposedMutation::AddClip {
            layer_id: "l1".to_string(),
            clip: ClipInput {
                asset_id: None,
                start_ms: -1,
                duration_ms: 1000,
                in_point_ms: 0,
                out_point_ms: None,
                transform: Transform::default(),
                effects: ClipEffects::default(),
                text_content: Some("hi".to_string()),
                text_style: None,
                shape: None,
                crop: None,
                group_id: None,
            },
        };
        let err = validate(&timeline, &mutation, &no_assets()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTimeRange);
    }

    #[test]
    fn rejects_text_clip_without_text_content() {
        let timeline = timeline_with_layer("l1");
        let mutation = ProposedMutation::AddClip {
            layer_id: "l1".to_string(),
            clip: ClipInput {
                asset_id: None,
                start_ms: 0,
                duration_ms: 1000,
                in_point_ms: 0,
                out_point_ms: None,
                transform: Transform::default(),
                effects: ClipEffects::default(),
                text_content: None,
                text_style: None,
                shape: None,
                crop: None,
                group_id: None,
            },
        };
        let err = validate(&timeline, &mutation, &no_assets()).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingRequiredField);
    }

    #[test]
    fn overlap_is_a_warning_not_fatal() {
        let mut timeline = timeline_with_layer("l1");
        timeline.layers[0].clips.push(Clip {
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
        });
        let mutation = ProposedMutation::AddClip {
            layer_id: "l1".to_string(),
            clip: ClipInput {
                asset_id: None,
                start_ms: 500,
                duration_ms: 1000,
                in_point_ms: 0,
                out_point_ms: None,
                transform: Transform::default(),
                effects: ClipEffects::default(),
                text_content: Some("hi".to_string()),
                text_style: None,
                shape: None,
                crop: None,
                group_id: None,
            },
        };
        let result = validate(&timeline, &mutation, &no_assets()).unwrap();
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn duration_change_is_negative_delta_when_deleting_last_clip() {
        let mut timeline = timeline_with_layer("l1");
        timeline.layers[0].clips.push(Clip {
            id: "c1".to_string(),
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
        });
        timeline.recompute_duration();
        let mutation = ProposedMutation::DeleteClip {
            clip_id: "c1".to_string(),
        };
        let result = validate(&timeline, &mutation, &no_assets()).unwrap();
        assert_eq!(result.would_affect.duration_change_ms, -1000);
    }
}
