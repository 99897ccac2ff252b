// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use loom_model::{Part, Role};

use super::{category_for, truncate_tool_result, Effect, IterationContext, Phase};
use crate::context::RunContext;

/// Incrementally truncates old tool-result bodies, independent of token
/// usage. Runs `AfterComplete` so a just-produced tool result is never
/// trimmed in the same iteration it was created. Each result is truncated
/// according to its originating tool's declared output category, not a
/// single one-size-fits-all strategy.
pub struct TrimToolResultsEffect {
    preserve_recent: usize,
    max_result_length: usize,
}

impl TrimToolResultsEffect {
    pub fn new(preserve_recent: usize, max_result_length: usize) -> Self {
        Self { preserve_recent, max_result_length }
    }
}

#[async_trait]
impl Effect for TrimToolResultsEffect {
    async fn eval(&self, _ctx: &RunContext, iter: &mut IterationContext<'_>) -> anyhow::Result<()> {
        if iter.phase != Phase::AfterComplete || iter.iteration == 0 {
            return Ok(());
        }

        let mut msgs = iter.chat.messages().to_vec();
        let tool_indices: Vec<usize> =
            msgs.iter().enumerate().filter(|(_, m)| m.role == Role::Tool).map(|(i, _)| i).collect();
        let cutoff = tool_indices.len().saturating_sub(self.preserve_recent);

        // Pass 1: resolve each eligible part's category before taking any
        // mutable borrow, since the lookup scans the whole message list.
        let mut targets = Vec::new();
        for (pos, &idx) in tool_indices.iter().enumerate() {
            if pos >= cutoff || msgs[idx].metadata.get("trimmed").map(String::as_str) == Some("true") {
                continue;
            }
            for (pi, part) in msgs[idx].parts.iter().enumerate() {
                if let Part::ToolResult { tool_call_id, .. } = part {
                    targets.push((idx, pi, category_for(iter.toolboxes, &msgs, idx, tool_call_id)));
                }
            }
        }

        let mut changed = false;
        let mut touched_msgs = std::collections::HashSet::new();
        for (mi, pi, category) in targets {
            if truncate_tool_result(&mut msgs[mi].parts[pi], category, self.max_result_length) {
                changed = true;
            }
            touched_msgs.insert(mi);
        }
        for mi in touched_msgs {
            msgs[mi].metadata.insert("trimmed".to_string(), "true".to_string());
        }

        if changed {
            iter.chat.replace(msgs);
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
