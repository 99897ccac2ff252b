// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use loom_model::{Message, Part, Role};

use super::{Effect, IterationContext, Phase, Resetter};
use crate::context::RunContext;

/// Identical tool name + arguments, used to detect a stuck loop.
fn call_key(name: &str, arguments: &str) -> String {
    format!("{name}\0{arguments}")
}

/// Collect the last `window_size` tool calls issued by assistant messages,
/// most-recent first.
fn recent_tool_calls(msgs: &[Message], window_size: usize) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(window_size);
    for m in msgs.iter().rev() {
        if m.role != Role::Assistant {
            continue;
        }
        for p in m.parts.iter().rev() {
            if let Part::ToolCall { name, arguments, .. } = p {
                out.push((name.clone(), arguments.clone()));
                if out.len() >= window_size {
                    return out;
                }
            }
        }
    }
    out
}

/// Detects a model stuck issuing the same tool call with the same arguments
/// repeatedly, and injects a warning once the repeat count crosses a
/// threshold. Tracks the last count it warned at per distinct call so a
/// long streak only produces one nudge per threshold crossing, not one per
/// iteration.
pub struct LoopDetectEffect {
    window_size: usize,
    threshold: usize,
    last_injected: Mutex<HashMap<String, usize>>,
}

impl LoopDetectEffect {
    pub fn new(window_size: usize, threshold: usize) -> Self {
        Self { window_size, threshold, last_injected: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl Effect for LoopDetectEffect {
    async fn eval(&self, _ctx: &RunContext, iter: &mut IterationContext<'_>) -> anyhow::Result<()> {
        if iter.phase != Phase::BeforeComplete || iter.iteration == 0 {
            return Ok(());
        }
        let calls = recent_tool_calls(iter.chat.messages(), self.window_size);
        let Some((name, args)) = calls.first() else { return Ok(()) };
        let key = call_key(name, args);
        let count = calls.iter().take_while(|(n, a)| call_key(n, a) == key).count();
        if count < self.threshold {
            return Ok(());
        }

        {
            let mut last = self.last_injected.lock().unwrap();
            let prev = last.get(&key).copied().unwrap_or(0);
            if count <= prev {
                return Ok(());
            }
            last.insert(key, count);
        }

        let mut msgs = iter.chat.messages().to_vec();
        msgs.push(Message::user(format!(
            "You have called `{name}` with the same arguments {count} times in a row. This is not \
             making progress; try a materially different approach."
        )));
        iter.chat.replace(msgs);
        Ok(())
    }

    fn as_resetter(&self) -> Option<&dyn Resetter> {
        Some(self)
    }
}

impl Resetter for LoopDetectEffect {
    fn reset(&self) {
        self.last_injected.lock().unwrap().clear();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
