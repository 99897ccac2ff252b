// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use loom_runtime::TaskBoard;

use crate::context::RunContext;
use crate::events::{EventFunc, EventNotifier};

/// Prompts for a continue-or-retry decision with a fixed set of choices,
/// returning the chosen option. Used only by [`crate::effects::CompactEffect`]'s
/// failure path; when absent, compaction failure is handled silently.
pub type AskFunc =
    Arc<dyn Fn(&RunContext, String, Vec<String>) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// Cross-cutting knobs snapshotted from parent to child whenever `delegate`
/// spawns sub-agents: notification hooks, the reflection-note directory, the
/// task board, and the delegation depth cap. An agent's own options never
/// change mid-run; `delegate` clones this bundle once per batch so later
/// mutation of the parent doesn't race with already-dispatched children.
#[derive(Clone)]
pub struct AgentOptions {
    pub event_notifier: Option<EventNotifier>,
    pub event_func: Option<EventFunc>,
    pub reflection_dir: Option<PathBuf>,
    /// Caps on `delegate`'s prior-reflections read path. Default to the
    /// on-disk format's documented contract (5 files, 32 KiB); a deployment
    /// may tighten or loosen them without changing the format itself.
    pub reflection_max_files: usize,
    pub reflection_max_bytes: usize,
    pub task_board: Option<Arc<dyn TaskBoard>>,
    pub max_delegation_depth: u32,
    pub ask: Option<AskFunc>,
}

impl AgentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a [`loom_config::EffectsConfig`]'s reflection-note
    /// settings (directory, file/byte caps), leaving the non-config fields
    /// (notifiers, task board, ask) at their defaults for the caller to
    /// fill in.
    pub fn from_effects_config(config: &loom_config::EffectsConfig) -> Self {
        Self {
            reflection_dir: config.reflection_dir.as_ref().map(std::path::PathBuf::from),
            reflection_max_files: config.reflection_max_files,
            reflection_max_bytes: config.reflection_max_bytes,
            ..Self::default()
        }
    }
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            event_notifier: None,
            event_func: None,
            reflection_dir: None,
            reflection_max_files: loom_runtime::REFLECTION_DEFAULT_MAX_FILES,
            reflection_max_bytes: loom_runtime::REFLECTION_DEFAULT_MAX_BYTES,
            task_board: None,
            max_delegation_depth: 0,
            ask: None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
