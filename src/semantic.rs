//! High-level editing gestures named in spec.md §6's route list
//! (`projects/{id}/semantic`) but left undefined by §4.4's primitive
//! operation table.
//!
//! Grounded on the original's composition style: each gesture computes a
//! parameter (a snap target, a gap width, a trigger track) and then either
//! delegates to a primitive handler in `dispatcher` — inheriting that
//! primitive's rollback support — or, for the two gestures that touch more
//! than one entity or a field no primitive op covers, builds its own
//! `DispatchOutcome` directly.

use crate::config::CoreConfig;
use crate::dispatcher::{self, resolve_layer_id, resolve_track_id, ChangeDetail, DispatchOutcome, EntityKind, OperationInput, RollbackData};
use crate::error::{CoreError, ErrorCode};
use crate::model::{Ducking, Timeline};

/// Move a clip so its start immediately follows the end of the previous
/// clip on its layer (ordered by `start_ms`). Delegates to `move_clip`, so
/// it shares that primitive's overlap check and rollback support.
pub fn snap_to_previous(timeline: &mut Timeline, clip_id: &str, config: &CoreConfig) -> Result<DispatchOutcome, CoreError> {
    let location = timeline
        .find_clip(clip_id)
        .ok_or_else(|| CoreError::new(ErrorCode::ClipNotFound, format!("clip {clip_id} not found")))?;
    let layer = &timeline.layers[location.layer_index];
    let target = &layer.clips[location.clip_index];
    let target_start = target.start_ms;
    let canonical_clip_id = target.id.clone();

    let previous_end = layer
        .clips
        .iter()
        .filter(|c| c.id != canonical_clip_id && c.end_ms() <= target_start)
        .map(|c| c.end_ms())
        .max();

    let Some(new_start_ms) = previous_end else {
        return Err(CoreError::new(
            ErrorCode::SemanticOperationFailed,
            "no previous clip on this layer to snap to",
        ));
    };

    dispatcher::apply(
        timeline,
        &OperationInput::ClipMove {
            clip_id: canonical_clip_id,
            new_start_ms,
            new_layer_id: None,
        },
        config,
    )
}

/// Move a clip so its end immediately abuts the start of the next clip on
/// its layer, closing any gap or overlap between the two without touching
/// the next clip. Delegates to `move_clip`.
pub fn snap_to_next(timeline: &mut Timeline, clip_id: &str, config: &CoreConfig) -> Result<DispatchOutcome, CoreError> {
    let location = timeline
        .find_clip(clip_id)
        .ok_or_else(|| CoreError::new(ErrorCode::ClipNotFound, format!("clip {clip_id} not found")))?;
    let layer = &timeline.layers[location.layer_index];
    let target = &layer.clips[location.clip_index];
    let target_end = target.end_ms();
    let duration_ms = target.duration_ms;
    let canonical_clip_id = target.id.clone();

    let next_start = layer
        .clips
        .iter()
        .filter(|c| c.id != canonical_clip_id && c.start_ms >= target_end)
        .map(|c| c.start_ms)
        .min();

    let Some(next_start) = next_start else {
        return Err(CoreError::new(
            ErrorCode::SemanticOperationFailed,
            "no next clip on this layer to snap to",
        ));
    };

    dispatcher::apply(
        timeline,
        &OperationInput::ClipMove {
            clip_id: canonical_clip_id,
            new_start_ms: next_start - duration_ms,
            new_layer_id: None,
        },
        config,
    )
}

/// Remove a specific gap `[gap_start_ms, gap_end_ms)` on `layer_id` by
/// shifting every clip that starts at or after `gap_end_ms` left by the
/// gap's width. Touches every such clip in one operation, so it is recorded
/// (and rolled back) as a single multi-entity record rather than one
/// `move_clip` per clip.
pub fn close_gap(timeline: &mut Timeline, layer_id: &str, gap_start_ms: i64, gap_end_ms: i64) -> Result<DispatchOutcome, CoreError> {
    if gap_end_ms <= gap_start_ms {
        return Err(CoreError::new(ErrorCode::InvalidTimeRange, "gap_end_ms must be > gap_start_ms").with_field("gap_end_ms"));
    }
    let canonical_layer_id = resolve_layer_id(timeline, layer_id)?;
    let width = gap_end_ms - gap_start_ms;

    let layer_index = timeline.find_layer_index(&canonical_layer_id).expect("resolved above");
    let layer = &timeline.layers[layer_index];

    let straddles_gap = layer.clips.iter().any(|c| c.start_ms < gap_end_ms && c.end_ms() > gap_start_ms);
    if straddles_gap {
        return Err(CoreError::new(
            ErrorCode::SemanticOperationFailed,
            "a clip overlaps the requested gap; nothing to close",
        ));
    }

    let mut changes = Vec::new();
    let mut original_starts = Vec::new();
    let mut affected_clips = Vec::new();
    let layer = &mut timeline.layers[layer_index];
    for clip in layer.clips.iter_mut().filter(|c| c.start_ms >= gap_end_ms) {
        let before = serde_json::to_value(&*clip).ok();
        original_starts.push((clip.id.clone(), clip.start_ms));
        clip.start_ms -= width;
        let after = serde_json::to_value(&*clip).ok();
        affected_clips.push(clip.id.clone());
        changes.push(ChangeDetail {
            entity_kind: EntityKind::Clip,
            entity_id: clip.id.clone(),
            before,
            after,
        });
    }

    if affected_clips.is_empty() {
        return Err(CoreError::new(
            ErrorCode::SemanticOperationFailed,
            "no clips after the gap to shift",
        ));
    }

    timeline.recompute_duration();

    Ok(DispatchOutcome {
        op_type: "close_gap",
        affected_clips,
        affected_layers: vec![canonical_layer_id.clone()],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![],
        changes,
        rollback: Some(RollbackData::CloseGap {
            layer_id: canonical_layer_id,
            original_starts,
        }),
    })
}

/// Configure ducking on `bgm_track_id` so it attenuates automatically
/// whenever `narration_track_id` plays, using the model's documented
/// defaults (`duck_to` 0.2, 200ms attack, 500ms release).
pub fn auto_duck_bgm(timeline: &mut Timeline, bgm_track_id: &str, narration_track_id: &str) -> Result<DispatchOutcome, CoreError> {
    let canonical_bgm_id = resolve_track_id(timeline, bgm_track_id)?;
    let canonical_narration_id = resolve_track_id(timeline, narration_track_id)?;
    if canonical_bgm_id == canonical_narration_id {
        return Err(CoreError::new(
            ErrorCode::SemanticOperationFailed,
            "a track cannot duck against itself",
        ));
    }

    let narration_has_clips = timeline
        .find_track(&canonical_narration_id)
        .map(|t| !t.clips.is_empty())
        .unwrap_or(false);
    if !narration_has_clips {
        return Err(CoreError::new(
            ErrorCode::SemanticOperationFailed,
            "narration track has no clips to trigger ducking",
        ));
    }

    let track_index = timeline.find_track_index(&canonical_bgm_id).expect("resolved above");
    let before_value = serde_json::to_value(&timeline.audio_tracks[track_index]).ok();
    let original_ducking = timeline.audio_tracks[track_index].ducking.clone();

    timeline.audio_tracks[track_index].ducking = Some(Ducking {
        enabled: true,
        duck_to: 0.2,
        attack_ms: 200,
        release_ms: 500,
        trigger_track: Some(canonical_narration_id.clone()),
    });
    let after_value = serde_json::to_value(&timeline.audio_tracks[track_index]).ok();

    Ok(DispatchOutcome {
        op_type: "auto_duck_bgm",
        affected_clips: vec![],
        affected_layers: vec![],
        affected_audio_clips: vec![],
        affected_audio_tracks: vec![canonical_bgm_id.clone()],
        changes: vec![ChangeDetail {
            entity_kind: EntityKind::AudioTrack,
            entity_id: canonical_bgm_id.clone(),
            before: before_value,
            after: after_value,
        }],
        rollback: Some(RollbackData::UpdateDucking {
            track_id: canonical_bgm_id,
            original_ducking,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AudioClip, AudioTrack, AudioTrackType, Clip, Layer, LayerType, Project};

    fn layer_with_clips(clips: Vec<Clip>) -> Layer {
        Layer {
            id: "layer-1".to_string(),
            name: "V1".to_string(),
            layer_type: LayerType::Video,
            visible: true,
            locked: false,
            clips,
            order: Some(0),
        }
    }

    fn clip(id: &str, start_ms: i64, duration_ms: i64) -> Clip {
        Clip {
            id: id.to_string(),
            asset_id: Some("asset-1".to_string()),
            start_ms,
            duration_ms,
            in_point_ms: 0,
            out_point_ms: None,
            transform: Default::default(),
            effects: Default::default(),
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

    fn timeline_with(layer: Layer) -> Timeline {
        let project = Project::new("proj-1".to_string(), "Test".to_string(), 1920, 1080, 30);
        let mut timeline = project.timeline_data;
        timeline.layers = vec![layer];
        timeline
    }

    #[test]
    fn snap_to_previous_moves_clip_flush_against_predecessor() {
        let mut timeline = timeline_with(layer_with_clips(vec![clip("a", 0, 1000), clip("b", 2000, 1000)]));
        let config = CoreConfig::default();
        snap_to_previous(&mut timeline, "b", &config).unwrap();
        let moved = timeline.find_clip("b").unwrap();
        let clip = &timeline.layers[moved.layer_index].clips[moved.clip_index];
        assert_eq!(clip.start_ms, 1000);
    }

    #[test]
    fn snap_to_previous_fails_for_first_clip() {
        let mut timeline = timeline_with(layer_with_clips(vec![clip("a", 500, 1000)]));
        let config = CoreConfig::default();
        let err = snap_to_previous(&mut timeline, "a", &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::SemanticOperationFailed);
    }

    #[test]
    fn snap_to_next_abuts_the_following_clip() {
        let mut timeline = timeline_with(layer_with_clips(vec![clip("a", 0, 500), clip("b", 3000, 1000)]));
        let config = CoreConfig::default();
        snap_to_next(&mut timeline, "a", &config).unwrap();
        let moved = timeline.find_clip("a").unwrap();
        let clip = &timeline.layers[moved.layer_index].clips[moved.clip_index];
        assert_eq!(clip.start_ms, 2000);
    }

    #[test]
    fn close_gap_shifts_every_clip_after_it_left_by_the_gap_width() {
        let mut timeline = timeline_with(layer_with_clips(vec![clip("a", 0, 1000), clip("b", 3000, 1000), clip("c", 5000, 500)]));
        close_gap(&mut timeline, "layer-1", 1000, 3000).unwrap();
        let b = timeline.find_clip("b").unwrap();
        let c = timeline.find_clip("c").unwrap();
        assert_eq!(timeline.layers[b.layer_index].clips[b.clip_index].start_ms, 1000);
        assert_eq!(timeline.layers[c.layer_index].clips[c.clip_index].start_ms, 3500);
    }

    #[test]
    fn close_gap_rejects_when_nothing_follows_the_gap() {
        let mut timeline = timeline_with(layer_with_clips(vec![clip("a", 0, 1000)]));
        let err = close_gap(&mut timeline, "layer-1", 1000, 3000).unwrap_err();
        assert_eq!(err.code, ErrorCode::SemanticOperationFailed);
    }

    #[test]
    fn auto_duck_bgm_sets_ducking_with_narration_as_trigger() {
        let mut timeline = timeline_with(layer_with_clips(vec![]));
        timeline.audio_tracks.push(AudioTrack {
            id: "bgm".to_string(),
            name: "Music".to_string(),
            track_type: AudioTrackType::Bgm,
            volume: 1.0,
            muted: false,
            ducking: None,
            clips: vec![],
        });
        timeline.audio_tracks.push(AudioTrack {
            id: "narration".to_string(),
            name: "VO".to_string(),
            track_type: AudioTrackType::Narration,
            volume: 1.0,
            muted: false,
            ducking: None,
            clips: vec![AudioClip {
                id: "vo-1".to_string(),
                asset_id: "asset-2".to_string(),
                start_ms: 0,
                duration_ms: 1000,
                in_point_ms: 0,
                out_point_ms: None,
                volume: 1.0,
                fade_in_ms: 0,
                fade_out_ms: 0,
                volume_keyframes: None,
                group_id: None,
            }],
        });

        auto_duck_bgm(&mut timeline, "bgm", "narration").unwrap();
        let bgm = timeline.find_track("bgm").unwrap();
        let ducking = bgm.ducking.as_ref().expect("ducking should be set");
        assert!(ducking.enabled);
        assert_eq!(ducking.trigger_track.as_deref(), Some("narration"));
    }

    #[test]
    fn auto_duck_bgm_rejects_narration_track_with_no_clips() {
        let mut timeline = timeline_with(layer_with_clips(vec![]));
        timeline.audio_tracks.push(AudioTrack {
            id: "bgm".to_string(),
            name: "Music".to_string(),
            track_type: AudioTrackType::Bgm,
            volume: 1.0,
            muted: false,
            ducking: None,
            clips: vec![],
        });
        timeline.audio_tracks.push(AudioTrack {
            id: "narration".to_string(),
            name: "VO".to_string(),
            track_type: AudioTrackType::Narration,
            volume: 1.0,
            muted: false,
            ducking: None,
            clips: vec![],
        });
        let err = auto_duck_bgm(&mut timeline, "bgm", "narration").unwrap_err();
        assert_eq!(err.code, ErrorCode::SemanticOperationFailed);
    }
}
