//! Pure read-side timeline quality analysis and suggestion generation (C9).
//!
//! Grounded almost method-for-method on
//! `examples/original_source/backend/src/services/timeline_analysis.py`'s
//! `TimelineAnalyzer`: gap/pacing/audio/section detection, a 0-100 quality
//! score with per-category breakdown, and a suggestion generator whose
//! `suggested_operation` shape an AI agent can execute with zero
//! modification. Nothing here mutates a timeline or appends history.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::CoreConfig;
use crate::model::{AudioTrackType, LayerType, Timeline};

const SHORT_CLIP_RATIO: f64 = 0.5;
const LONG_CLIP_RATIO: f64 = 0.3;
const SIGNIFICANT_GAP_SUGGESTION_MS: i64 = 1000;
const SIGNIFICANT_SILENCE_SUGGESTION_MS: i64 = 3000;

fn merged_coverage_ms(intervals: &mut Vec<(i64, i64)>) -> i64 {
    Timeline::coverage_intervals(intervals).iter().map(|(s, e)| e - s).sum()
}

fn pct(part_ms: i64, total_ms: i64) -> f64 {
    if total_ms > 0 {
        ((part_ms as f64 / total_ms as f64) * 1000.0).round() / 10.0
    } else {
        0.0
    }
}

fn intervals_overlap_any(a: &[(i64, i64)], b: &[(i64, i64)]) -> bool {
    a.iter().any(|&(a_start, a_end)| b.iter().any(|&(b_start, b_end)| crate::model::intervals_overlap(a_start, a_end, b_start, b_end)))
}

// ---------------------------------------------------------------------
// Gaps
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapInterval {
    pub start_ms: i64,
    pub end_ms: i64,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapContainerKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerGaps {
    pub layer_id: String,
    pub layer_name: String,
    pub kind: GapContainerKind,
    pub gaps: Vec<GapInterval>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapAnalysis {
    pub total_gaps: usize,
    pub total_gap_duration_ms: i64,
    pub layers: Vec<LayerGaps>,
}

/// Interior gaps only (sorted clips, consecutive pairs); leading/trailing
/// gaps are the caller's job since they need `project_duration_ms`.
fn interior_gaps(clips: &[(i64, i64)], floor_ms: i64) -> Vec<GapInterval> {
    if clips.is_empty() {
        return Vec::new();
    }
    let mut sorted = clips.to_vec();
    sorted.sort_by_key(|(start, _)| *start);

    let mut gaps = Vec::new();
    let mut current_end = sorted[0].1;
    for &(start, end) in &sorted[1..] {
        if start - current_end > floor_ms {
            gaps.push(GapInterval {
                start_ms: current_end,
                end_ms: start,
                duration_ms: start - current_end,
            });
        }
        current_end = current_end.max(end);
    }
    gaps
}

fn gaps_for_container(clips: &[(i64, i64)], project_duration_ms: i64, floor_ms: i64) -> Vec<GapInterval> {
    let mut gaps = interior_gaps(clips, floor_ms);
    if clips.is_empty() {
        return gaps;
    }
    let mut sorted = clips.to_vec();
    sorted.sort_by_key(|(start, _)| *start);

    let first_start = sorted[0].0;
    if first_start > floor_ms {
        gaps.insert(
            0,
            GapInterval {
                start_ms: 0,
                end_ms: first_start,
                duration_ms: first_start,
            },
        );
    }
    let last_end = sorted.iter().map(|(_, end)| *end).max().unwrap_or(0);
    if project_duration_ms > 0 && project_duration_ms - last_end > floor_ms {
        gaps.push(GapInterval {
            start_ms: last_end,
            end_ms: project_duration_ms,
            duration_ms: project_duration_ms - last_end,
        });
    }
    gaps
}

pub fn analyze_gaps(timeline: &Timeline, config: &CoreConfig) -> GapAnalysis {
    let project_duration_ms = timeline.duration_ms;
    let mut layers = Vec::new();
    let mut total_gaps = 0;
    let mut total_gap_duration_ms = 0;

    for layer in &timeline.layers {
        let clips: Vec<(i64, i64)> = layer.clips.iter().map(|c| (c.start_ms, c.end_ms())).collect();
        let gaps = gaps_for_container(&clips, project_duration_ms, config.gap_floor_ms);
        total_gaps += gaps.len();
        total_gap_duration_ms += gaps.iter().map(|g| g.duration_ms).sum::<i64>();
        layers.push(LayerGaps {
            layer_id: layer.id.clone(),
            layer_name: layer.name.clone(),
            kind: GapContainerKind::Video,
            gaps,
        });
    }

    for track in &timeline.audio_tracks {
        let clips: Vec<(i64, i64)> = track.clips.iter().map(|c| (c.start_ms, c.end_ms())).collect();
        let gaps = gaps_for_container(&clips, project_duration_ms, config.gap_floor_ms);
        total_gaps += gaps.len();
        total_gap_duration_ms += gaps.iter().map(|g| g.duration_ms).sum::<i64>();
        layers.push(LayerGaps {
            layer_id: track.id.clone(),
            layer_name: track.name.clone(),
            kind: GapContainerKind::Audio,
            gaps,
        });
    }

    GapAnalysis {
        total_gaps,
        total_gap_duration_ms,
        layers,
    }
}

// ---------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingClipRef {
    pub id: String,
    pub start_ms: i64,
    pub duration_ms: i64,
    pub layer_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingIssueKind {
    TooFast,
    TooSlow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingIssue {
    pub kind: PacingIssueKind,
    pub message: String,
    /// Set for `TooSlow`: the longest over-threshold clip, the natural
    /// split candidate for the suggestion generator's
    /// `POST .../clips/{clip_id}/split` mapping (spec.md §4.9's category
    /// table). `None` for `TooFast`, which has no executable fix.
    pub split_candidate: Option<PacingClipRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingAnalysis {
    pub avg_clip_duration_ms: f64,
    pub clip_count: usize,
    pub shortest_clip: Option<PacingClipRef>,
    pub longest_clip: Option<PacingClipRef>,
    pub pacing_issues: Vec<PacingIssue>,
}

pub fn analyze_pacing(timeline: &Timeline, config: &CoreConfig) -> PacingAnalysis {
    let all_clips: Vec<PacingClipRef> = timeline
        .layers
        .iter()
        .flat_map(|layer| {
            layer.clips.iter().map(move |clip| PacingClipRef {
                id: clip.id.clone(),
                start_ms: clip.start_ms,
                duration_ms: clip.duration_ms,
                layer_id: layer.id.clone(),
            })
        })
        .collect();

    if all_clips.is_empty() {
        return PacingAnalysis {
            avg_clip_duration_ms: 0.0,
            clip_count: 0,
            shortest_clip: None,
            longest_clip: None,
            pacing_issues: Vec::new(),
        };
    }

    let total: i64 = all_clips.iter().map(|c| c.duration_ms).sum();
    let avg = (total as f64 / all_clips.len() as f64 * 10.0).round() / 10.0;
    let shortest = all_clips.iter().min_by_key(|c| c.duration_ms).cloned();
    let longest = all_clips.iter().max_by_key(|c| c.duration_ms).cloned();

    let short_count = all_clips.iter().filter(|c| c.duration_ms < config.pacing_fast_threshold_ms).count();
    let long_count = all_clips.iter().filter(|c| c.duration_ms > config.pacing_slow_threshold_ms).count();
    let n = all_clips.len();

    let mut pacing_issues = Vec::new();
    if short_count as f64 / n as f64 > SHORT_CLIP_RATIO {
        pacing_issues.push(PacingIssue {
            kind: PacingIssueKind::TooFast,
            message: format!("too_fast: {short_count}/{n} clips are shorter than {}ms", config.pacing_fast_threshold_ms),
            split_candidate: None,
        });
    }
    if long_count as f64 / n as f64 > LONG_CLIP_RATIO {
        let split_candidate = all_clips
            .iter()
            .filter(|c| c.duration_ms > config.pacing_slow_threshold_ms)
            .max_by_key(|c| c.duration_ms)
            .cloned();
        pacing_issues.push(PacingIssue {
            kind: PacingIssueKind::TooSlow,
            message: format!("too_slow: {long_count}/{n} clips are longer than {}ms", config.pacing_slow_threshold_ms),
            split_candidate,
        });
    }

    PacingAnalysis {
        avg_clip_duration_ms: avg,
        clip_count: n,
        shortest_clip: shortest,
        longest_clip: longest,
        pacing_issues,
    }
}

// ---------------------------------------------------------------------
// Audio coverage
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioTrackCoverage {
    pub track_id: String,
    pub track_name: String,
    pub track_type: AudioTrackType,
    pub clip_count: usize,
    pub coverage_ms: i64,
    pub coverage_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilentInterval {
    pub start_ms: i64,
    pub end_ms: i64,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioAnalysis {
    pub tracks: Vec<AudioTrackCoverage>,
    pub narration_coverage_pct: f64,
    pub bgm_coverage_pct: f64,
    pub silent_intervals: Vec<SilentInterval>,
    pub issues: Vec<String>,
}

fn find_uncovered_intervals(intervals: &[(i64, i64)], total_duration_ms: i64, floor_ms: i64) -> Vec<SilentInterval> {
    if total_duration_ms <= 0 {
        return Vec::new();
    }
    if intervals.is_empty() {
        return vec![SilentInterval {
            start_ms: 0,
            end_ms: total_duration_ms,
            duration_ms: total_duration_ms,
        }];
    }
    let mut owned = intervals.to_vec();
    let merged = Timeline::coverage_intervals(&mut owned);

    let mut uncovered = Vec::new();
    let mut current = 0i64;
    for (start, end) in merged {
        if start > current && start - current > floor_ms {
            uncovered.push(SilentInterval {
                start_ms: current,
                end_ms: start,
                duration_ms: start - current,
            });
        }
        current = current.max(end);
    }
    if total_duration_ms > current && total_duration_ms - current > floor_ms {
        uncovered.push(SilentInterval {
            start_ms: current,
            end_ms: total_duration_ms,
            duration_ms: total_duration_ms - current,
        });
    }
    uncovered
}

pub fn analyze_audio(timeline: &Timeline, config: &CoreConfig) -> AudioAnalysis {
    let project_duration_ms = timeline.duration_ms;
    if project_duration_ms == 0 {
        return AudioAnalysis {
            tracks: Vec::new(),
            narration_coverage_pct: 0.0,
            bgm_coverage_pct: 0.0,
            silent_intervals: Vec::new(),
            issues: Vec::new(),
        };
    }

    let mut tracks = Vec::new();
    let mut narration_intervals = Vec::new();
    let mut bgm_intervals = Vec::new();
    let mut all_audio_intervals = Vec::new();

    for track in &timeline.audio_tracks {
        let intervals: Vec<(i64, i64)> = track.clips.iter().map(|c| (c.start_ms, c.end_ms())).collect();
        let mut owned = intervals.clone();
        let coverage_ms = merged_coverage_ms(&mut owned);
        tracks.push(AudioTrackCoverage {
            track_id: track.id.clone(),
            track_name: track.name.clone(),
            track_type: track.track_type,
            clip_count: track.clips.len(),
            coverage_ms,
            coverage_pct: pct(coverage_ms, project_duration_ms),
        });
        all_audio_intervals.extend(intervals.iter().copied());
        match track.track_type {
            AudioTrackType::Narration => narration_intervals.extend(intervals),
            AudioTrackType::Bgm => bgm_intervals.extend(intervals),
            AudioTrackType::Se => {}
        }
    }

    let mut narration_owned = narration_intervals.clone();
    let mut bgm_owned = bgm_intervals.clone();
    let narration_coverage_ms = merged_coverage_ms(&mut narration_owned);
    let bgm_coverage_ms = merged_coverage_ms(&mut bgm_owned);
    let narration_pct = pct(narration_coverage_ms, project_duration_ms);
    let bgm_pct = pct(bgm_coverage_ms, project_duration_ms);

    let silent_intervals = find_uncovered_intervals(&all_audio_intervals, project_duration_ms, config.gap_floor_ms);

    let mut issues = Vec::new();
    let narration_exists = timeline.audio_tracks.iter().any(|t| t.track_type == AudioTrackType::Narration);
    if narration_pct == 0.0 {
        if narration_exists {
            issues.push("Narration track exists but has no clips".to_string());
        }
    } else if narration_pct < 50.0 {
        issues.push(format!("Low narration coverage ({narration_pct}%). Lectures typically need >80%."));
    }

    let bgm_exists = timeline.audio_tracks.iter().any(|t| t.track_type == AudioTrackType::Bgm);
    if bgm_pct == 0.0 && bgm_exists {
        issues.push("BGM track exists but has no clips. Consider adding background music.".to_string());
    }

    if !silent_intervals.is_empty() {
        let total_silence: i64 = silent_intervals.iter().map(|s| s.duration_ms).sum();
        let silence_pct = pct(total_silence, project_duration_ms);
        if silence_pct > 10.0 {
            issues.push(format!(
                "{} silent intervals detected totaling {total_silence}ms ({silence_pct}% of timeline)",
                silent_intervals.len()
            ));
        }
    }

    AudioAnalysis {
        tracks,
        narration_coverage_pct: narration_pct,
        bgm_coverage_pct: bgm_pct,
        silent_intervals,
        issues,
    }
}

// ---------------------------------------------------------------------
// Audio balance
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeIssue {
    pub message: String,
    pub affected_clips: Vec<String>,
    pub suggested_fix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBalanceTrack {
    pub track_id: String,
    pub track_name: String,
    pub track_type: AudioTrackType,
    pub clip_count: usize,
    pub total_duration_ms: i64,
    pub coverage_pct: f64,
    pub avg_volume: f64,
    pub volume_range: VolumeRange,
    pub has_ducking: bool,
    pub issues: Vec<VolumeIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrossTrackIssue {
    NoBgm { message: String, start_ms: i64, end_ms: i64 },
    NarrationWithoutDucking { message: String, affected_tracks: Vec<String> },
    AudioVideoMisalignment { message: String, video_clip_id: String, time_ms: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBalance {
    pub tracks: Vec<AudioBalanceTrack>,
    pub cross_track_issues: Vec<CrossTrackIssue>,
    pub silent_intervals: Vec<SilentInterval>,
    pub recommendations: Vec<String>,
    pub audio_score: i64,
}

pub fn analyze_audio_balance(timeline: &Timeline, config: &CoreConfig) -> AudioBalance {
    let project_duration_ms = timeline.duration_ms;
    if project_duration_ms == 0 {
        return AudioBalance {
            tracks: Vec::new(),
            cross_track_issues: Vec::new(),
            silent_intervals: Vec::new(),
            recommendations: Vec::new(),
            audio_score: 0,
        };
    }

    let mut tracks_result = Vec::new();
    let mut all_audio_intervals = Vec::new();
    let mut narration_intervals = Vec::new();
    let mut bgm_intervals = Vec::new();
    let mut has_bgm_track = false;
    let mut has_bgm_clips = false;
    let mut bgm_ducking_enabled = false;
    let mut narration_has_clips = false;
    let mut audio_group_ids: std::collections::HashSet<String> = std::collections::HashSet::new();

    for track in &timeline.audio_tracks {
        let has_ducking = track.ducking.as_ref().map(|d| d.enabled).unwrap_or(false);
        match track.track_type {
            AudioTrackType::Narration => {
                if !track.clips.is_empty() {
                    narration_has_clips = true;
                }
            }
            AudioTrackType::Bgm => {
                has_bgm_track = true;
                bgm_ducking_enabled = has_ducking;
                if !track.clips.is_empty() {
                    has_bgm_clips = true;
                }
            }
            AudioTrackType::Se => {}
        }

        let volumes: Vec<f64> = track.clips.iter().map(|c| c.volume).collect();
        let intervals: Vec<(i64, i64)> = track.clips.iter().map(|c| (c.start_ms, c.end_ms())).collect();
        for clip in &track.clips {
            if let Some(group_id) = &clip.group_id {
                audio_group_ids.insert(group_id.clone());
            }
        }

        all_audio_intervals.extend(intervals.iter().copied());
        match track.track_type {
            AudioTrackType::Narration => narration_intervals.extend(intervals.iter().copied()),
            AudioTrackType::Bgm => bgm_intervals.extend(intervals.iter().copied()),
            AudioTrackType::Se => {}
        }

        let mut owned = intervals.clone();
        let coverage_ms = merged_coverage_ms(&mut owned);
        let coverage_pct = pct(coverage_ms, project_duration_ms);

        let avg_volume = if volumes.is_empty() {
            0.0
        } else {
            (volumes.iter().sum::<f64>() / volumes.len() as f64 * 100.0).round() / 100.0
        };
        let vol_min = volumes.iter().cloned().fold(f64::INFINITY, f64::min);
        let vol_max = volumes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let (vol_min, vol_max) = if volumes.is_empty() { (0.0, 0.0) } else { (vol_min, vol_max) };

        let mut issues = Vec::new();
        if volumes.len() >= 2 && (vol_max - vol_min) > 0.3 {
            let affected: Vec<String> = track
                .clips
                .iter()
                .filter(|c| (c.volume - avg_volume).abs() > 0.15)
                .map(|c| c.id.clone())
                .collect();
            issues.push(VolumeIssue {
                message: format!("Volume varies from {vol_min} to {vol_max} across clips"),
                affected_clips: affected,
                suggested_fix: format!("Normalize volume to {avg_volume} across all {} clips", track.name),
            });
        }

        tracks_result.push(AudioBalanceTrack {
            track_id: track.id.clone(),
            track_name: track.name.clone(),
            track_type: track.track_type,
            clip_count: track.clips.len(),
            total_duration_ms: coverage_ms,
            coverage_pct,
            avg_volume,
            volume_range: VolumeRange { min: vol_min, max: vol_max },
            has_ducking,
            issues,
        });
    }

    let mut cross_track_issues = Vec::new();
    if has_bgm_track && !has_bgm_clips {
        cross_track_issues.push(CrossTrackIssue::NoBgm {
            message: "No BGM track has any clips. Consider adding background music.".to_string(),
            start_ms: 0,
            end_ms: project_duration_ms,
        });
    } else if !has_bgm_track {
        cross_track_issues.push(CrossTrackIssue::NoBgm {
            message: "No BGM track exists. Consider adding a BGM track with background music.".to_string(),
            start_ms: 0,
            end_ms: project_duration_ms,
        });
    }

    if narration_has_clips && has_bgm_clips && !bgm_ducking_enabled && intervals_overlap_any(&narration_intervals, &bgm_intervals) {
        cross_track_issues.push(CrossTrackIssue::NarrationWithoutDucking {
            message: "Narration overlaps with BGM but auto-ducking is not enabled".to_string(),
            affected_tracks: vec!["narration".to_string(), "bgm".to_string()],
        });
    }

    for layer in &timeline.layers {
        for clip in &layer.clips {
            if let Some(group_id) = &clip.group_id {
                if !audio_group_ids.contains(group_id) {
                    cross_track_issues.push(CrossTrackIssue::AudioVideoMisalignment {
                        message: format!("Video clip at {}ms has no matching audio (no group_id link)", clip.start_ms),
                        video_clip_id: clip.id.clone(),
                        time_ms: clip.start_ms,
                    });
                }
            }
        }
    }

    let silent_intervals = find_uncovered_intervals(&all_audio_intervals, project_duration_ms, config.gap_floor_ms);

    let mut recommendations = Vec::new();
    if !has_bgm_clips {
        recommendations.push("Add BGM to fill silent intervals".to_string());
    }
    if narration_has_clips && has_bgm_clips && !bgm_ducking_enabled {
        recommendations.push("Enable auto-ducking on BGM track for narration clarity".to_string());
    }
    for track_info in &tracks_result {
        for issue in &track_info.issues {
            recommendations.push(format!("Normalize {} volume to {}", track_info.track_name, issue.suggested_fix));
        }
    }

    let mut narration_owned = narration_intervals.clone();
    let narration_coverage_ms = merged_coverage_ms(&mut narration_owned);
    let narration_pct_raw = if project_duration_ms > 0 {
        (narration_coverage_ms as f64 / project_duration_ms as f64) * 100.0
    } else {
        0.0
    };
    let narration_score = if narration_pct_raw >= 80.0 { 30 } else { ((narration_pct_raw / 80.0) * 30.0).round() as i64 };
    let bgm_score: i64 = if has_bgm_clips { 20 } else { 0 };
    let inconsistency_count = tracks_result.iter().filter(|t| !t.issues.is_empty()).count() as i64;
    let volume_score = if inconsistency_count == 0 { 25 } else { (25 - inconsistency_count * 10).max(0) };
    let ducking_score: i64 = if !has_bgm_clips {
        15
    } else if bgm_ducking_enabled {
        25
    } else {
        0
    };
    let audio_score = (narration_score + bgm_score + volume_score + ducking_score).clamp(0, 100);

    AudioBalance {
        tracks: tracks_result,
        cross_track_issues,
        silent_intervals,
        recommendations,
        audio_score,
    }
}

// ---------------------------------------------------------------------
// Layer coverage
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerCoverage {
    pub layer_id: String,
    pub layer_name: String,
    pub layer_type: LayerType,
    pub clip_count: usize,
    pub coverage_ms: i64,
    pub coverage_pct: f64,
}

pub fn analyze_layer_coverage(timeline: &Timeline) -> Vec<LayerCoverage> {
    let project_duration_ms = timeline.duration_ms;
    timeline
        .layers
        .iter()
        .map(|layer| {
            let mut intervals: Vec<(i64, i64)> = layer.clips.iter().map(|c| (c.start_ms, c.end_ms())).collect();
            let coverage_ms = merged_coverage_ms(&mut intervals);
            LayerCoverage {
                layer_id: layer.id.clone(),
                layer_name: layer.name.clone(),
                layer_type: layer.layer_type,
                clip_count: layer.clips.len(),
                coverage_ms,
                coverage_pct: pct(coverage_ms, project_duration_ms),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------
// Section detection
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub section_index: usize,
    pub name: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub duration_ms: i64,
    pub clip_ids: Vec<String>,
    pub has_narration: bool,
    pub has_background: bool,
    pub has_text: bool,
    pub suggested_improvements: Vec<String>,
}

fn build_section(timeline: &Timeline, index: usize, name: String, start_ms: i64, end_ms: i64, clip_ids: Vec<String>) -> Section {
    let overlaps = |c_start: i64, c_end: i64| c_start < end_ms && c_end > start_ms;

    let has_narration = timeline
        .audio_tracks
        .iter()
        .filter(|t| t.track_type == AudioTrackType::Narration)
        .any(|t| t.clips.iter().any(|c| overlaps(c.start_ms, c.end_ms())));
    let has_background = timeline
        .layers
        .iter()
        .filter(|l| l.layer_type == LayerType::Background)
        .any(|l| l.clips.iter().any(|c| overlaps(c.start_ms, c.end_ms())));
    let has_text = timeline
        .layers
        .iter()
        .filter(|l| l.layer_type == LayerType::Text)
        .any(|l| l.clips.iter().any(|c| overlaps(c.start_ms, c.end_ms())));

    let mut suggested_improvements = Vec::new();
    if !has_narration {
        suggested_improvements.push("Add narration for this section".to_string());
    }
    if !has_background {
        suggested_improvements.push("Add background for this section".to_string());
    }
    if !has_text {
        suggested_improvements.push("Add text overlay for this section".to_string());
    }

    Section {
        section_index: index,
        name,
        start_ms,
        end_ms,
        duration_ms: end_ms - start_ms,
        clip_ids,
        has_narration,
        has_background,
        has_text,
        suggested_improvements,
    }
}

pub fn detect_sections(timeline: &Timeline, config: &CoreConfig) -> Vec<Section> {
    let project_duration_ms = timeline.duration_ms;
    if project_duration_ms == 0 {
        return Vec::new();
    }

    let mut content_clips: Vec<(i64, i64)> = timeline
        .layers
        .iter()
        .filter(|l| l.layer_type == LayerType::Content)
        .flat_map(|l| l.clips.iter().map(|c| (c.start_ms, c.end_ms())))
        .collect();
    if content_clips.is_empty() {
        content_clips = timeline.layers.iter().flat_map(|l| l.clips.iter().map(|c| (c.start_ms, c.end_ms()))).collect();
    }
    if content_clips.is_empty() {
        return vec![build_section(timeline, 0, "Section 1".to_string(), 0, project_duration_ms, Vec::new())];
    }

    let mut sorted_clips = content_clips;
    sorted_clips.sort_by_key(|(start, _)| *start);

    let mut boundaries: Vec<i64> = Vec::new();
    let mut current_end = sorted_clips[0].1;
    for &(start, end) in &sorted_clips[1..] {
        if start - current_end > config.section_gap_floor_ms {
            boundaries.push(start);
        }
        current_end = current_end.max(end);
    }

    let mut marker_map: std::collections::HashMap<i64, String> = std::collections::HashMap::new();
    for marker in &timeline.markers {
        if marker.time_ms > 0 && marker.time_ms < project_duration_ms {
            boundaries.push(marker.time_ms);
            marker_map.insert(marker.time_ms, marker.name.clone());
        }
    }

    let mut bg_clips: Vec<(i64, i64)> = timeline
        .layers
        .iter()
        .filter(|l| l.layer_type == LayerType::Background)
        .flat_map(|l| l.clips.iter().map(|c| (c.start_ms, c.end_ms())))
        .collect();
    if bg_clips.len() > 1 {
        bg_clips.sort_by_key(|(start, _)| *start);
        for &(start, _) in &bg_clips[1..] {
            if start > 0 && start < project_duration_ms {
                boundaries.push(start);
            }
        }
    }

    let mut unique_boundaries: Vec<i64> = boundaries.into_iter().collect::<std::collections::BTreeSet<_>>().into_iter().collect();
    unique_boundaries.sort_unstable();

    let mut merged_boundaries: Vec<i64> = Vec::new();
    for b in unique_boundaries {
        match merged_boundaries.last() {
            Some(&last) if b - last <= config.section_gap_floor_ms => {
                if marker_map.contains_key(&b) && !marker_map.contains_key(&last) {
                    *merged_boundaries.last_mut().unwrap() = b;
                }
            }
            _ => merged_boundaries.push(b),
        }
    }

    let mut section_starts = vec![0i64];
    section_starts.extend(merged_boundaries.iter().copied());
    let mut section_ends = merged_boundaries.clone();
    section_ends.push(project_duration_ms);

    let mut sections = Vec::new();
    for (idx, (&s_start, &s_end)) in section_starts.iter().zip(section_ends.iter()).enumerate() {
        if s_end <= s_start {
            continue;
        }
        let mut name = marker_map.get(&s_start).cloned().unwrap_or_default();
        if name.is_empty() {
            if let Some((_, mname)) = marker_map.iter().find(|(&t, mname)| (t - s_start).abs() <= config.section_gap_floor_ms && !mname.is_empty()) {
                name = mname.clone();
            }
        }
        if name.is_empty() {
            name = format!("Section {}", idx + 1);
        }

        let clip_ids: Vec<String> = timeline
            .layers
            .iter()
            .flat_map(|l| l.clips.iter())
            .filter(|c| c.start_ms < s_end && c.end_ms() > s_start)
            .map(|c| c.id.clone())
            .collect();

        sections.push(build_section(timeline, idx, name, s_start, s_end, clip_ids));
    }

    sections
}

// ---------------------------------------------------------------------
// Quality score
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: i64,
    pub max: i64,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub background_coverage: CategoryScore,
    pub narration_coverage: CategoryScore,
    pub gap_free: CategoryScore,
    pub pacing: CategoryScore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScoreResult {
    pub score: i64,
    pub breakdown: QualityBreakdown,
    pub improvement_tips: Vec<String>,
}

pub fn calculate_quality_score(
    timeline: &Timeline,
    gap_analysis: &GapAnalysis,
    pacing_analysis: &PacingAnalysis,
    audio_analysis: &AudioAnalysis,
    layer_coverage: &[LayerCoverage],
) -> QualityScoreResult {
    let project_duration_ms = timeline.duration_ms;
    if project_duration_ms == 0 {
        let no_content = CategoryScore {
            score: 0,
            max: 25,
            detail: "No timeline content".to_string(),
        };
        return QualityScoreResult {
            score: 0,
            breakdown: QualityBreakdown {
                background_coverage: no_content.clone(),
                narration_coverage: no_content.clone(),
                gap_free: no_content.clone(),
                pacing: no_content,
            },
            improvement_tips: vec!["Add clips to the timeline to begin editing".to_string()],
        };
    }

    let mut tips = Vec::new();

    let bg_coverage = layer_coverage.iter().find(|l| l.layer_type == LayerType::Background).map(|l| l.coverage_pct).unwrap_or(0.0);
    let bg_score = ((bg_coverage / 100.0).min(1.0) * 25.0).round() as i64;
    let bg_detail = format!("{:.0}% coverage", bg_coverage);
    if bg_score < 25 {
        tips.push(format!("Extend background to cover remaining {:.0}% of timeline", 100.0 - bg_coverage));
    }

    let narration_pct = audio_analysis.narration_coverage_pct;
    let narr_score = if narration_pct >= 80.0 { 25 } else { ((narration_pct / 80.0) * 25.0).round() as i64 };
    let narr_detail = format!("{:.0}% coverage (>=80% for full score)", narration_pct);
    if narr_score < 25 {
        tips.push(format!("Add narration to cover {:.0}% more of the timeline (target: 80%)", (80.0 - narration_pct).max(0.0)));
    }

    let (gap_score, gap_detail) = if gap_analysis.total_gaps == 0 {
        (25, "No significant gaps".to_string())
    } else {
        let gap_ratio = if project_duration_ms > 0 {
            gap_analysis.total_gap_duration_ms as f64 / project_duration_ms as f64
        } else {
            1.0
        };
        let score = (25 - (gap_ratio * 50.0).round() as i64).max(0);
        tips.push(format!("Fill {} gap(s) ({}ms total) across layers", gap_analysis.total_gaps, gap_analysis.total_gap_duration_ms));
        (score, format!("{} gaps totaling {}ms", gap_analysis.total_gaps, gap_analysis.total_gap_duration_ms))
    };

    let (pacing_score, pacing_detail) = if pacing_analysis.pacing_issues.is_empty() {
        (25, "No pacing issues".to_string())
    } else {
        let deduction = pacing_analysis.pacing_issues.len() as i64 * 10;
        let score = (25 - deduction).max(0);
        let issue_types: Vec<&str> = pacing_analysis
            .pacing_issues
            .iter()
            .map(|i| match i.kind {
                PacingIssueKind::TooFast => "too_fast",
                PacingIssueKind::TooSlow => "too_slow",
            })
            .collect();
        if issue_types.contains(&"too_fast") {
            tips.push("Extend short clips or merge adjacent clips for better pacing".to_string());
        }
        if issue_types.contains(&"too_slow") {
            tips.push("Split long clips or add transitions to improve pacing".to_string());
        }
        (score, format!("{} issue(s): {}", pacing_analysis.pacing_issues.len(), issue_types.join(", ")))
    };

    let total_score = (bg_score + narr_score + gap_score + pacing_score).clamp(0, 100);

    QualityScoreResult {
        score: total_score,
        breakdown: QualityBreakdown {
            background_coverage: CategoryScore { score: bg_score, max: 25, detail: bg_detail },
            narration_coverage: CategoryScore { score: narr_score, max: 25, detail: narr_detail },
            gap_free: CategoryScore { score: gap_score, max: 25, detail: gap_detail },
            pacing: CategoryScore { score: pacing_score, max: 25, detail: pacing_detail },
        },
        improvement_tips: tips,
    }
}

// ---------------------------------------------------------------------
// Suggestions
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedOperation {
    pub description: String,
    pub endpoint: String,
    pub method: String,
    pub body: Value,
    pub headers: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub priority: Priority,
    pub category: String,
    pub message: String,
    pub suggested_operation: Option<SuggestedOperation>,
}

fn make_suggested_operation(project_id: Option<&str>, endpoint_template: &str, method: &str, body: Value, description: impl Into<String>) -> SuggestedOperation {
    make_suggested_operation_for_clip(project_id, None, endpoint_template, method, body, description)
}

fn make_suggested_operation_for_clip(
    project_id: Option<&str>,
    clip_id: Option<&str>,
    endpoint_template: &str,
    method: &str,
    body: Value,
    description: impl Into<String>,
) -> SuggestedOperation {
    let mut endpoint = match project_id {
        Some(id) => endpoint_template.replace("{project_id}", id),
        None => endpoint_template.to_string(),
    };
    if let Some(clip_id) = clip_id {
        endpoint = endpoint.replace("{clip_id}", clip_id);
    }
    let mut headers = std::collections::HashMap::new();
    headers.insert("Idempotency-Key".to_string(), uuid::Uuid::new_v4().to_string());
    SuggestedOperation {
        description: description.into(),
        endpoint,
        method: method.to_string(),
        body,
        headers,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn generate_suggestions(
    timeline: &Timeline,
    config: &CoreConfig,
    project_id: Option<&str>,
    gap_analysis: &GapAnalysis,
    pacing_analysis: &PacingAnalysis,
    audio_analysis: &AudioAnalysis,
    layer_coverage: &[LayerCoverage],
) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    for layer_info in &gap_analysis.layers {
        for gap in &layer_info.gaps {
            if gap.duration_ms <= SIGNIFICANT_GAP_SUGGESTION_MS {
                continue;
            }
            let priority = if gap.duration_ms >= 20_000 {
                Priority::High
            } else if gap.duration_ms >= 10_000 {
                Priority::Medium
            } else {
                Priority::Low
            };
            let kind = match layer_info.kind {
                GapContainerKind::Video => "video",
                GapContainerKind::Audio => "audio",
            };
            let endpoint = match layer_info.kind {
                GapContainerKind::Video => "POST /projects/{project_id}/clips",
                GapContainerKind::Audio => "POST /projects/{project_id}/audio-clips",
            };
            suggestions.push(Suggestion {
                priority,
                category: "gap".to_string(),
                message: format!("Gap of {}ms in {} ({kind}) from {}ms to {}ms", gap.duration_ms, layer_info.layer_name, gap.start_ms, gap.end_ms),
                suggested_operation: Some(make_suggested_operation(
                    project_id,
                    endpoint,
                    "POST",
                    json!({ "clip": { "layer_id": layer_info.layer_id, "start_ms": gap.start_ms, "duration_ms": gap.duration_ms }, "options": {} }),
                    "Add a clip to fill the gap",
                )),
            });
        }
    }

    for layer_info in layer_coverage {
        if layer_info.layer_type == LayerType::Background && layer_info.coverage_pct < 100.0 {
            let priority = if layer_info.coverage_pct < 90.0 { Priority::High } else { Priority::Medium };
            suggestions.push(Suggestion {
                priority,
                category: "missing_background".to_string(),
                message: format!(
                    "Background layer covers only {}% of the timeline. The full timeline should have a background.",
                    layer_info.coverage_pct
                ),
                suggested_operation: Some(make_suggested_operation(
                    project_id,
                    "POST /projects/{project_id}/clips",
                    "POST",
                    json!({ "clip": { "layer_id": layer_info.layer_id, "start_ms": 0, "duration_ms": timeline.duration_ms }, "options": {} }),
                    "Add or extend background clips to cover full timeline",
                )),
            });
        }
    }

    let sections = detect_sections(timeline, config);
    for section in &sections {
        if !section.has_text {
            suggestions.push(Suggestion {
                priority: Priority::High,
                category: "missing_text_section".to_string(),
                message: format!("Section '{}' ({}ms-{}ms) has no text overlay. Add subtitles or captions.", section.name, section.start_ms, section.end_ms),
                suggested_operation: Some(make_suggested_operation(
                    project_id,
                    "POST /projects/{project_id}/semantic",
                    "POST",
                    json!({ "operation": { "operation": "add_text_with_timing", "parameters": { "text": "Enter text", "position": "bottom", "start_ms": section.start_ms, "duration_ms": section.duration_ms } }, "options": {} }),
                    format!("Add text overlay for section '{}'", section.name),
                )),
            });
        }
        if !section.has_narration {
            suggestions.push(Suggestion {
                priority: Priority::High,
                category: "missing_narration_section".to_string(),
                message: format!("Section '{}' ({}ms-{}ms) has no narration. Add narration audio.", section.name, section.start_ms, section.end_ms),
                suggested_operation: Some(make_suggested_operation(
                    project_id,
                    "POST /projects/{project_id}/audio-clips",
                    "POST",
                    json!({ "clip": { "track_type": "narration", "start_ms": section.start_ms, "duration_ms": section.duration_ms }, "options": {} }),
                    format!("Add narration for section '{}'", section.name),
                )),
            });
        }
    }

    if audio_analysis.narration_coverage_pct > 0.0 && audio_analysis.narration_coverage_pct < 80.0 {
        suggestions.push(Suggestion {
            priority: Priority::High,
            category: "low_narration".to_string(),
            message: format!(
                "Narration covers only {}% of the timeline. Lectures typically require >80% narration coverage.",
                audio_analysis.narration_coverage_pct
            ),
            suggested_operation: Some(make_suggested_operation(
                project_id,
                "POST /projects/{project_id}/audio-clips",
                "POST",
                json!({ "clip": { "track_type": "narration" }, "options": {} }),
                "Add narration clips to uncovered intervals",
            )),
        });
    }

    if audio_analysis.bgm_coverage_pct == 0.0 && timeline.duration_ms > 0 {
        suggestions.push(Suggestion {
            priority: Priority::Low,
            category: "missing_bgm".to_string(),
            message: "No BGM detected. Consider adding background music for better engagement.".to_string(),
            suggested_operation: Some(make_suggested_operation(
                project_id,
                "POST /projects/{project_id}/audio-clips",
                "POST",
                json!({ "clip": { "track_type": "bgm", "start_ms": 0, "duration_ms": timeline.duration_ms }, "options": {} }),
                "Add a BGM clip spanning the full timeline",
            )),
        });
    }

    for silent in &audio_analysis.silent_intervals {
        if silent.duration_ms > SIGNIFICANT_SILENCE_SUGGESTION_MS {
            suggestions.push(Suggestion {
                priority: Priority::Medium,
                category: "silence".to_string(),
                message: format!(
                    "Silent interval of {}ms from {}ms to {}ms. Consider adding narration or BGM.",
                    silent.duration_ms, silent.start_ms, silent.end_ms
                ),
                suggested_operation: Some(make_suggested_operation(
                    project_id,
                    "POST /projects/{project_id}/audio-clips",
                    "POST",
                    json!({ "clip": { "start_ms": silent.start_ms, "duration_ms": silent.duration_ms }, "options": {} }),
                    "Add audio to fill silence",
                )),
            });
        }
    }

    for issue in &pacing_analysis.pacing_issues {
        match issue.kind {
            PacingIssueKind::TooFast => {
                suggestions.push(Suggestion {
                    priority: Priority::Medium,
                    category: "pacing".to_string(),
                    message: format!("Pacing issue: {}. Consider merging or extending short clips.", issue.message),
                    suggested_operation: None,
                });
            }
            PacingIssueKind::TooSlow => {
                let suggested_operation = issue.split_candidate.as_ref().map(|clip| {
                    let split_at_ms = clip.start_ms + clip.duration_ms / 2;
                    make_suggested_operation_for_clip(
                        project_id,
                        Some(&clip.id),
                        "POST /projects/{project_id}/clips/{clip_id}/split",
                        "POST",
                        json!({ "split_at_ms": split_at_ms }),
                        format!("Split clip {} at its midpoint", clip.id),
                    )
                });
                suggestions.push(Suggestion {
                    priority: Priority::Medium,
                    category: "pacing".to_string(),
                    message: format!("Pacing issue: {}. Consider splitting long clips.", issue.message),
                    suggested_operation,
                });
            }
        }
    }

    for layer_info in layer_coverage {
        if layer_info.layer_type == LayerType::Text && layer_info.clip_count == 0 {
            suggestions.push(Suggestion {
                priority: Priority::Low,
                category: "missing_text".to_string(),
                message: "No text/telop clips found. Consider adding subtitles or captions for better accessibility.".to_string(),
                suggested_operation: Some(make_suggested_operation(
                    project_id,
                    "POST /projects/{project_id}/semantic",
                    "POST",
                    json!({ "operation": { "operation": "add_text_with_timing" }, "options": {} }),
                    "Add text overlay clips",
                )),
            });
        }
    }

    suggestions.sort_by_key(|s| s.priority);
    suggestions
}

// ---------------------------------------------------------------------
// Top-level report
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub project_duration_ms: i64,
    pub gap_analysis: GapAnalysis,
    pub pacing_analysis: PacingAnalysis,
    pub audio_analysis: AudioAnalysis,
    pub audio_balance: AudioBalance,
    pub layer_coverage: Vec<LayerCoverage>,
    pub sections: Vec<Section>,
    pub quality_score: QualityScoreResult,
    pub suggestions: Vec<Suggestion>,
}

pub fn analyze_all(timeline: &Timeline, config: &CoreConfig, project_id: Option<&str>) -> AnalysisReport {
    let gap_analysis = analyze_gaps(timeline, config);
    let pacing_analysis = analyze_pacing(timeline, config);
    let audio_analysis = analyze_audio(timeline, config);
    let audio_balance = analyze_audio_balance(timeline, config);
    let layer_coverage = analyze_layer_coverage(timeline);
    let sections = detect_sections(timeline, config);
    let quality_score = calculate_quality_score(timeline, &gap_analysis, &pacing_analysis, &audio_analysis, &layer_coverage);
    let suggestions = generate_suggestions(timeline, config, project_id, &gap_analysis, &pacing_analysis, &audio_analysis, &layer_coverage);

    AnalysisReport {
        project_duration_ms: timeline.duration_ms,
        gap_analysis,
        pacing_analysis,
        audio_analysis,
        audio_balance,
        layer_coverage,
        sections,
        quality_score,
        suggestions,
    }
}
