// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use loom_model::Message;

use super::{compaction_chat, render_transcript, Effect, IterationContext, Phase};
use crate::context::RunContext;
use crate::options::AskFunc;

/// Full-transcript summarization, triggered once usage crosses a fraction of
/// the provider's context window. The most aggressive of the three
/// usage-gated effects — the entire non-system transcript is replaced with a
/// single summary message, preserving only the system prompt.
///
/// Registered after [`super::TrimToolResultsEffect`] in
/// [`super::default_pipeline`] so a deployment running both sees tool
/// results shrink before the transcript is summarized away outright; see
/// `DESIGN.md` for why this realizes graduated compaction through ordering
/// rather than a single effect owning both behaviors.
pub struct CompactEffect {
    threshold: f64,
    ask: Option<AskFunc>,
}

impl CompactEffect {
    pub fn new(threshold: f64, ask: Option<AskFunc>) -> Self {
        Self { threshold, ask }
    }
}

#[async_trait]
impl Effect for CompactEffect {
    async fn eval(&self, ctx: &RunContext, iter: &mut IterationContext<'_>) -> anyhow::Result<()> {
        if iter.phase != Phase::BeforeComplete || iter.iteration == 0 {
            return Ok(());
        }
        let Some(reporter) = iter.provider.as_usage_reporter() else { return Ok(()) };
        let Some(usage) = reporter.last_usage() else { return Ok(()) };
        let Some(window) = reporter.context_window() else { return Ok(()) };
        if window == 0 {
            return Ok(());
        }
        let trigger = (window as f64 * self.threshold).floor() as u32;
        if usage.input_tokens < trigger {
            return Ok(());
        }

        let system_prompt = iter.chat.system_prompt().map(str::to_string);
        let transcript = render_transcript(iter.chat.messages());
        let summarize_chat = compaction_chat(&transcript);

        match iter.provider.complete(&summarize_chat, &[]).await {
            Ok(reply) => {
                let mut rebuilt = Vec::with_capacity(2);
                if let Some(sp) = system_prompt {
                    rebuilt.push(Message::system(sp));
                }
                rebuilt.push(Message::user(format!("<compacted_summary>\n{}\n</compacted_summary>", reply.text())));
                iter.chat.replace(rebuilt);
            }
            Err(e) => {
                if let Some(ask) = &self.ask {
                    let _ = ask(
                        ctx,
                        format!("Context compaction failed ({e}). The conversation will continue without compacting."),
                        vec!["continue".to_string()],
                    )
                    .await;
                }
                // Continue silently either way: compaction failure is
                // recoverable by simply not compacting this iteration.
            }
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use loom_model::{Chat, Role, ScriptedMockCompleter};

    use super::*;

    fn iter_ctx<'a>(chat: &'a mut Chat, completer: &'a ScriptedMockCompleter, iteration: u32) -> IterationContext<'a> {
        IterationContext { phase: Phase::BeforeComplete, iteration, chat, provider: completer, agent_name: "a", toolboxes: &[] }
    }

    #[tokio::test]
    async fn compacts_above_threshold_into_system_plus_summary() {
        let mut chat = Chat::new();
        chat.init_system_prompt("be helpful");
        for i in 0..10 {
            chat.append(Message::user(format!("turn {i}")));
        }
        let completer =
            ScriptedMockCompleter::new(vec![Message::assistant_text("Goal: ship it")]).with_usage(850, 1).with_context_window(1000);
        let effect = CompactEffect::new(0.8, None);
        effect.eval(&RunContext::new("a"), &mut iter_ctx(&mut chat, &completer, 1)).await.unwrap();

        assert_eq!(chat.len(), 2);
        assert_eq!(chat.get(0).unwrap().role, Role::System);
        assert_eq!(chat.get(0).unwrap().text(), "be helpful");
        assert!(chat.get(1).unwrap().text().contains("Goal: ship it"));
    }

    #[tokio::test]
    async fn no_op_below_threshold() {
        let mut chat = Chat::new();
        chat.init_system_prompt("be helpful");
        chat.append(Message::user("turn 0"));
        let completer = ScriptedMockCompleter::always_text("x").with_usage(100, 1).with_context_window(1000);
        let effect = CompactEffect::new(0.8, None);
        effect.eval(&RunContext::new("a"), &mut iter_ctx(&mut chat, &completer, 1)).await.unwrap();
        assert_eq!(chat.len(), 2);
    }

    #[tokio::test]
    async fn falls_back_silently_when_summarization_fails() {
        struct AlwaysFails;
        #[async_trait::async_trait]
        impl loom_model::Completer for AlwaysFails {
            async fn complete(&self, _chat: &Chat, _tools: &[loom_model::ToolDeclaration]) -> anyhow::Result<Message> {
                anyhow::bail!("down")
            }
            fn as_usage_reporter(&self) -> Option<&dyn loom_model::UsageReporter> {
                Some(self)
            }
        }
        impl loom_model::UsageReporter for AlwaysFails {
            fn last_usage(&self) -> Option<loom_model::Usage> {
                Some(loom_model::Usage { input_tokens: 900, output_tokens: 1 })
            }
            fn context_window(&self) -> Option<u32> {
                Some(1000)
            }
        }
        let mut chat = Chat::new();
        chat.init_system_prompt("be helpful");
        chat.append(Message::user("turn 0"));
        chat.append(Message::user("turn 1"));
        let before = chat.len();
        let provider = AlwaysFails;
        let mut iter = IterationContext { phase: Phase::BeforeComplete, iteration: 1, chat: &mut chat, provider: &provider, agent_name: "a", toolboxes: &[] };
        let effect = CompactEffect::new(0.8, None);
        effect.eval(&RunContext::new("a"), &mut iter).await.unwrap();
        assert_eq!(chat.len(), before);
    }

    #[tokio::test]
    async fn no_op_without_configured_usage() {
        let mut chat = Chat::new();
        chat.append(Message::user("hi"));
        let completer = ScriptedMockCompleter::always_text("x"); // no usage configured
        let effect = CompactEffect::new(0.8, None);
        effect.eval(&RunContext::new("a"), &mut iter_ctx(&mut chat, &completer, 1)).await.unwrap();
        assert_eq!(chat.len(), 1);
    }
}
