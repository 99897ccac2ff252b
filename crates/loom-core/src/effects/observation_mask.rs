// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use loom_model::{Part, Role};

use super::{find_tool_name, Effect, IterationContext, Phase};
use crate::context::RunContext;

/// Replaces old, already-consumed tool-result bodies with a short marker
/// once usage crosses a threshold. Less aggressive than compaction or the
/// sliding window: it never drops or summarizes a message, only masks
/// content the model has presumably already acted on.
pub struct ObservationMaskEffect {
    threshold: f64,
    recent_window: usize,
}

impl ObservationMaskEffect {
    pub fn new(threshold: f64, recent_window: usize) -> Self {
        Self { threshold, recent_window }
    }
}

#[async_trait]
impl Effect for ObservationMaskEffect {
    async fn eval(&self, _ctx: &RunContext, iter: &mut IterationContext<'_>) -> anyhow::Result<()> {
        if iter.phase != Phase::BeforeComplete || iter.iteration == 0 {
            return Ok(());
        }
        let Some(reporter) = iter.provider.as_usage_reporter() else { return Ok(()) };
        let Some(usage) = reporter.last_usage() else { return Ok(()) };
        let Some(window) = reporter.context_window() else { return Ok(()) };
        if window == 0 {
            return Ok(());
        }
        if (usage.input_tokens as f64 / window as f64) < self.threshold {
            return Ok(());
        }

        let mut msgs = iter.chat.messages().to_vec();
        let total = msgs.len();
        let boundary = total.saturating_sub(self.recent_window);

        // Compute replacements first to avoid holding overlapping borrows of
        // `msgs` while also needing to look earlier in the same vector.
        let mut replacements: Vec<(usize, usize, String)> = Vec::new();
        for i in 0..boundary {
            if msgs[i].role != Role::Tool {
                continue;
            }
            if msgs[i].metadata.get("masked").map(String::as_str) == Some("true") {
                continue;
            }
            for (pi, part) in msgs[i].parts.iter().enumerate() {
                if let Part::ToolResult { tool_call_id, content, is_error } = part {
                    if *is_error {
                        continue;
                    }
                    let name = find_tool_name(&msgs, i, tool_call_id).unwrap_or_else(|| "unknown".to_string());
                    let preview: String = content.chars().take(80).collect();
                    replacements.push((i, pi, format!("[tool result for {name}: {preview}…]")));
                }
            }
        }

        if replacements.is_empty() {
            return Ok(());
        }

        let mut touched = std::collections::HashSet::new();
        for (mi, pi, new_content) in replacements {
            if let Part::ToolResult { content, .. } = &mut msgs[mi].parts[pi] {
                *content = new_content;
            }
            touched.insert(mi);
        }
        for mi in touched {
            msgs[mi].metadata.insert("masked".to_string(), "true".to_string());
        }
        iter.chat.replace(msgs);
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
