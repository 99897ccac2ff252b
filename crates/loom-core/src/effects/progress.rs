// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use loom_model::Message;

use super::{Effect, IterationContext, Phase};
use crate::context::RunContext;

/// Every `interval` iterations, nudges the model to write a progress
/// checkpoint via a `write_note`-style tool if one is available. Stateless
/// and purely a function of the iteration counter; it does not check
/// whether such a tool is actually declared, so it's a silent no-op in an
/// agent that has none.
pub struct ProgressEffect {
    interval: u32,
}

impl ProgressEffect {
    pub fn new(interval: u32) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Effect for ProgressEffect {
    async fn eval(&self, _ctx: &RunContext, iter: &mut IterationContext<'_>) -> anyhow::Result<()> {
        if iter.phase != Phase::BeforeComplete || iter.iteration == 0 || self.interval == 0 {
            return Ok(());
        }
        if iter.iteration % self.interval != 0 {
            return Ok(());
        }
        let mut msgs = iter.chat.messages().to_vec();
        msgs.push(Message::user(
            "Checkpoint: briefly note your progress so far and any blockers, using a note-taking \
             tool if one is available, then continue the task.",
        ));
        iter.chat.replace(msgs);
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use loom_model::{Chat, ScriptedMockCompleter};

    use super::*;

    fn iter_ctx<'a>(chat: &'a mut Chat, completer: &'a ScriptedMockCompleter, iteration: u32) -> IterationContext<'a> {
        IterationContext { phase: Phase::BeforeComplete, iteration, chat, provider: completer, agent_name: "a", toolboxes: &[] }
    }

    #[tokio::test]
    async fn injects_on_interval_boundary() {
        let mut chat = Chat::new();
        chat.append(Message::user("start"));
        let completer = ScriptedMockCompleter::always_text("x");
        let effect = ProgressEffect::new(5);
        effect.eval(&RunContext::new("a"), &mut iter_ctx(&mut chat, &completer, 5)).await.unwrap();
        assert!(chat.messages().last().unwrap().text().contains("Checkpoint"));
    }

    #[tokio::test]
    async fn skips_non_boundary_iterations() {
        let mut chat = Chat::new();
        chat.append(Message::user("start"));
        let completer = ScriptedMockCompleter::always_text("x");
        let effect = ProgressEffect::new(5);
        let before = chat.len();
        effect.eval(&RunContext::new("a"), &mut iter_ctx(&mut chat, &completer, 3)).await.unwrap();
        assert_eq!(chat.len(), before);
    }

    #[tokio::test]
    async fn zero_interval_disables_the_effect() {
        let mut chat = Chat::new();
        chat.append(Message::user("start"));
        let completer = ScriptedMockCompleter::always_text("x");
        let effect = ProgressEffect::new(0);
        let before = chat.len();
        effect.eval(&RunContext::new("a"), &mut iter_ctx(&mut chat, &completer, 5)).await.unwrap();
        assert_eq!(chat.len(), before);
    }
}
