// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Top-level runtime configuration: everything the agent loop and the
/// effects pipeline read by name rather than taking as constructor
/// arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum reason-act iterations before the run aborts with
    /// `MaxIterationsExceeded`. `0` means unlimited.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Maximum delegation tree depth. A root agent (depth 0) may delegate
    /// while `depth < max_delegation_depth`; beyond that, orchestration
    /// tools are omitted from the child's toolbox entirely.
    #[serde(default = "default_max_delegation_depth")]
    pub max_delegation_depth: u32,

    #[serde(default)]
    pub effects: EffectsConfig,
}

fn default_max_iterations() -> u32 {
    // Generous enough for real multi-step tasks without letting a runaway
    // loop burn an unbounded number of provider calls.
    200
}

fn default_max_delegation_depth() -> u32 {
    4
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_delegation_depth: default_max_delegation_depth(),
            effects: EffectsConfig::default(),
        }
    }
}

/// Tunables for the seven built-in effects. Every field has a default
/// matching the reference behavior described for each effect; deployments
/// override only the knobs that matter to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectsConfig {
    // ── CompactEffect ─────────────────────────────────────────────────────
    /// Fraction of the provider's context window at which full
    /// summarization triggers.
    #[serde(default = "default_compact_threshold")]
    pub compact_threshold: f64,

    // ── TrimToolResultsEffect ─────────────────────────────────────────────
    /// Most-recent tool-role messages left untouched by incremental trimming.
    #[serde(default = "default_trim_preserve_recent")]
    pub trim_preserve_recent: usize,
    /// Tool-result bodies longer than this many characters get trimmed.
    #[serde(default = "default_trim_max_result_length")]
    pub trim_max_result_length: usize,

    // ── SlidingWindowEffect ───────────────────────────────────────────────
    #[serde(default = "default_sliding_window_threshold")]
    pub sliding_window_threshold: f64,
    #[serde(default = "default_sliding_window_recent")]
    pub sliding_window_recent: usize,
    #[serde(default = "default_sliding_window_medium")]
    pub sliding_window_medium: usize,
    #[serde(default = "default_sliding_window_trim_length")]
    pub sliding_window_trim_length: usize,

    // ── ObservationMaskEffect ─────────────────────────────────────────────
    #[serde(default = "default_mask_threshold")]
    pub mask_threshold: f64,
    #[serde(default = "default_mask_recent_window")]
    pub mask_recent_window: usize,

    // ── ReflectionEffect ──────────────────────────────────────────────────
    #[serde(default = "default_reflection_failure_threshold")]
    pub reflection_failure_threshold: usize,
    /// Directory reflection notes are written to and read from. `None`
    /// disables the on-disk side entirely (the in-memory injection prompt
    /// still fires).
    #[serde(default)]
    pub reflection_dir: Option<String>,
    #[serde(default = "default_reflection_max_files")]
    pub reflection_max_files: usize,
    #[serde(default = "default_reflection_max_bytes")]
    pub reflection_max_bytes: usize,

    // ── ProgressEffect ────────────────────────────────────────────────────
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u32,

    // ── LoopDetectEffect ──────────────────────────────────────────────────
    #[serde(default = "default_loop_detect_window_size")]
    pub loop_detect_window_size: usize,
    #[serde(default = "default_loop_detect_threshold")]
    pub loop_detect_threshold: usize,
}

fn default_compact_threshold() -> f64 {
    0.8
}
fn default_trim_preserve_recent() -> usize {
    4
}
fn default_trim_max_result_length() -> usize {
    500
}
fn default_sliding_window_threshold() -> f64 {
    0.7
}
fn default_sliding_window_recent() -> usize {
    10
}
fn default_sliding_window_medium() -> usize {
    10
}
fn default_sliding_window_trim_length() -> usize {
    200
}
fn default_mask_threshold() -> f64 {
    0.6
}
fn default_mask_recent_window() -> usize {
    10
}
fn default_reflection_failure_threshold() -> usize {
    2
}
fn default_reflection_max_files() -> usize {
    5
}
fn default_reflection_max_bytes() -> usize {
    32 * 1024
}
fn default_progress_interval() -> u32 {
    5
}
fn default_loop_detect_window_size() -> usize {
    10
}
fn default_loop_detect_threshold() -> usize {
    3
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            compact_threshold: default_compact_threshold(),
            trim_preserve_recent: default_trim_preserve_recent(),
            trim_max_result_length: default_trim_max_result_length(),
            sliding_window_threshold: default_sliding_window_threshold(),
            sliding_window_recent: default_sliding_window_recent(),
            sliding_window_medium: default_sliding_window_medium(),
            sliding_window_trim_length: default_sliding_window_trim_length(),
            mask_threshold: default_mask_threshold(),
            mask_recent_window: default_mask_recent_window(),
            reflection_failure_threshold: default_reflection_failure_threshold(),
            reflection_dir: None,
            reflection_max_files: default_reflection_max_files(),
            reflection_max_bytes: default_reflection_max_bytes(),
            progress_interval: default_progress_interval(),
            loop_detect_window_size: default_loop_detect_window_size(),
            loop_detect_threshold: default_loop_detect_threshold(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_thresholds() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.max_delegation_depth, 4);
        assert_eq!(cfg.effects.compact_threshold, 0.8);
        assert_eq!(cfg.effects.sliding_window_threshold, 0.7);
        assert_eq!(cfg.effects.mask_threshold, 0.6);
        assert_eq!(cfg.effects.reflection_failure_threshold, 2);
        assert_eq!(cfg.effects.progress_interval, 5);
        assert_eq!(cfg.effects.loop_detect_threshold, 3);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let cfg: RuntimeConfig = serde_yaml::from_str("max_iterations: 10").unwrap();
        assert_eq!(cfg.max_iterations, 10);
        assert_eq!(cfg.max_delegation_depth, default_max_delegation_depth());
        assert_eq!(cfg.effects.compact_threshold, default_compact_threshold());
    }

    #[test]
    fn partial_effects_yaml_fills_in_defaults() {
        let cfg: RuntimeConfig = serde_yaml::from_str("effects:\n  compact_threshold: 0.5").unwrap();
        assert_eq!(cfg.effects.compact_threshold, 0.5);
        assert_eq!(cfg.effects.trim_preserve_recent, default_trim_preserve_recent());
    }

    #[test]
    fn round_trips_through_yaml() {
        let cfg = RuntimeConfig::default();
        let text = serde_yaml::to_string(&cfg).unwrap();
        let back: RuntimeConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn reflection_dir_defaults_to_none() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.effects.reflection_dir.is_none());
    }
}
