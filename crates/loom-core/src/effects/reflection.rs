// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Mutex;

use async_trait::async_trait;
use loom_model::{Message, Part, Role};

use super::{Effect, IterationContext, Phase, Resetter};
use crate::context::RunContext;

/// One reason-act "step": an assistant turn and the tool-role messages
/// immediately following it. `failed` is true only if the step produced at
/// least one error tool result and no successful one.
struct Step {
    has_tools: bool,
    failed: bool,
}

fn build_steps(msgs: &[Message]) -> Vec<Step> {
    let mut steps = Vec::new();
    let mut i = 0;
    while i < msgs.len() {
        match msgs[i].role {
            Role::User | Role::System => {
                steps.push(Step { has_tools: false, failed: false });
                i += 1;
            }
            Role::Tool => {
                i += 1; // orphaned tool message; ignore
            }
            Role::Assistant => {
                let mut j = i + 1;
                let mut any_err = false;
                let mut any_ok = false;
                let mut has_tools = false;
                while j < msgs.len() && msgs[j].role == Role::Tool {
                    has_tools = true;
                    for p in &msgs[j].parts {
                        if let Part::ToolResult { is_error, .. } = p {
                            if *is_error {
                                any_err = true;
                            } else {
                                any_ok = true;
                            }
                        }
                    }
                    j += 1;
                }
                steps.push(Step { has_tools, failed: has_tools && any_err && !any_ok });
                i = j;
            }
        }
    }
    steps
}

fn count_consecutive_failing_steps(msgs: &[Message]) -> usize {
    build_steps(msgs).iter().rev().take_while(|s| s.failed).count()
}

/// Injects a root-cause-analysis prompt once the tail of the transcript
/// shows a run of consecutively failing tool-call steps. Stops counting at
/// the first successful step or user/system message. Only re-injects once
/// the failure streak has grown past the last point it already nudged at,
/// so a single long streak doesn't repeat the same message every iteration.
pub struct ReflectionEffect {
    failure_threshold: usize,
    last_injected_at: Mutex<usize>,
}

impl ReflectionEffect {
    pub fn new(failure_threshold: usize) -> Self {
        Self { failure_threshold, last_injected_at: Mutex::new(0) }
    }
}

#[async_trait]
impl Effect for ReflectionEffect {
    async fn eval(&self, _ctx: &RunContext, iter: &mut IterationContext<'_>) -> anyhow::Result<()> {
        if iter.phase != Phase::BeforeComplete || iter.iteration == 0 {
            return Ok(());
        }
        let count = count_consecutive_failing_steps(iter.chat.messages());
        if count < self.failure_threshold {
            return Ok(());
        }
        {
            let mut last = self.last_injected_at.lock().unwrap();
            if count <= *last {
                return Ok(());
            }
            *last = count;
        }

        let mut msgs = iter.chat.messages().to_vec();
        msgs.push(Message::user(format!(
            "The last {count} steps have failed. Stop and analyze the root cause before trying \
             again: what assumption is wrong, and what tool or approach should change? Do not \
             repeat the same failing action unchanged."
        )));
        iter.chat.replace(msgs);
        Ok(())
    }

    fn as_resetter(&self) -> Option<&dyn Resetter> {
        Some(self)
    }
}

impl Resetter for ReflectionEffect {
    fn reset(&self) {
        *self.last_injected_at.lock().unwrap() = 0;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
