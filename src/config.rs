//! Process-level knobs, generalized from the teacher's
//! `PreferenceManager::new` (load-from-disk-or-default) into
//! load-from-env-or-default: this crate has no filesystem footprint of its
//! own, so there's nothing to persist, only defaults a host process may
//! override.

use std::time::Duration;

/// Tunables spec.md fixes as constants. Kept here instead of inlined so
/// analysis and dispatch code doesn't repeat the numbers, and so a host
/// process can override them for testing (e.g. a shorter lock timeout).
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    /// I7: a lock is valid iff `locked_at + lock_timeout > now`.
    pub lock_timeout: Duration,
    /// C4: per-layer clip cap before `TOO_MANY_CLIPS`.
    pub max_clips_per_layer: usize,
    /// C4: per-project layer cap before `TOO_MANY_LAYERS`.
    pub max_layers_per_project: usize,
    /// C4: `DURATION_TOO_LONG` ceiling for a single clip, in milliseconds.
    pub max_clip_duration_ms: i64,
    /// C9 gaps: interior gaps at or below this are not reported.
    pub gap_floor_ms: i64,
    /// C9 sections: gaps above this delimit a new section.
    pub section_gap_floor_ms: i64,
    /// C9 pacing: clips shorter than this count toward `too_fast`.
    pub pacing_fast_threshold_ms: i64,
    /// C9 pacing: clips longer than this count toward `too_slow`.
    pub pacing_slow_threshold_ms: i64,
    /// C9 audio: silent intervals at or below this are not reported.
    pub silence_floor_ms: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(120),
            max_clips_per_layer: 500,
            max_layers_per_project: 50,
            max_clip_duration_ms: 3_600_000,
            gap_floor_ms: 100,
            section_gap_floor_ms: 500,
            pacing_fast_threshold_ms: 2_000,
            pacing_slow_threshold_ms: 15_000,
            silence_floor_ms: 100,
        }
    }
}

impl CoreConfig {
    /// Load defaults, overriding each field whose `VEDIT_*` environment
    /// variable is set and parses. An unset or unparsable variable falls
    /// back to the default silently, the same tolerance the teacher's
    /// preferences loader applies to a corrupt preferences file
    /// (`serde_json::from_str(&content).unwrap_or_default()`).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_u64("VEDIT_LOCK_TIMEOUT_SECS") {
            config.lock_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_usize("VEDIT_MAX_CLIPS_PER_LAYER") {
            config.max_clips_per_layer = v;
        }
        if let Some(v) = env_usize("VEDIT_MAX_LAYERS_PER_PROJECT") {
            config.max_layers_per_project = v;
        }
        if let Some(v) = env_i64("VEDIT_MAX_CLIP_DURATION_MS") {
            config.max_clip_duration_ms = v;
        }
        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = CoreConfig::default();
        assert_eq!(config.lock_timeout, Duration::from_secs(120));
        assert_eq!(config.gap_floor_ms, 100);
        assert_eq!(config.pacing_fast_threshold_ms, 2_000);
        assert_eq!(config.pacing_slow_threshold_ms, 15_000);
    }
}
