// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use loom_model::{Message, Part, Role};

use super::{category_for, incremental_summary_chat, render_transcript, truncate_tool_result, Effect, IterationContext, Phase, Resetter};
use crate::context::RunContext;

/// Splits the non-system chat into three zones by recency — recent
/// (untouched), medium (trimmed tool results), old (summarized away) — once
/// usage crosses a threshold. Maintains a running summary across
/// invocations so repeated eviction doesn't lose earlier context entirely.
///
/// More aggressive than [`super::TrimToolResultsEffect`] (it removes
/// messages, not just shrinks them) but cheaper than full
/// [`super::CompactEffect`] (it only ever summarizes the oldest zone, never
/// the whole transcript).
pub struct SlidingWindowEffect {
    threshold: f64,
    recent: usize,
    medium: usize,
    trim_length: usize,
    summary: Mutex<Option<String>>,
}

impl SlidingWindowEffect {
    pub fn new(threshold: f64, recent: usize, medium: usize, trim_length: usize) -> Self {
        Self { threshold, recent, medium, trim_length, summary: Mutex::new(None) }
    }
}

#[async_trait]
impl Effect for SlidingWindowEffect {
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
        if (usage.input_tokens as f64 / window as f64) < self.threshold {
            return Ok(());
        }
        let _ = ctx;

        let all = iter.chat.messages().to_vec();

        // Resolve each tool result's category up front, keyed by call id,
        // since the system/non-system partition below loses the original
        // indices `category_for`'s backward scan relies on.
        let mut categories: HashMap<String, super::OutputCategory> = HashMap::new();
        for (i, m) in all.iter().enumerate() {
            if m.role != Role::Tool {
                continue;
            }
            for part in &m.parts {
                if let Part::ToolResult { tool_call_id, .. } = part {
                    categories.insert(tool_call_id.clone(), category_for(iter.toolboxes, &all, i, tool_call_id));
                }
            }
        }

        let (system, non_system): (Vec<Message>, Vec<Message>) = all.into_iter().partition(|m| m.role == Role::System);
        let total = non_system.len();
        if total <= self.recent {
            return Ok(()); // everything is within the recent zone already
        }

        let recent_start = total.saturating_sub(self.recent);
        let medium_start = recent_start.saturating_sub(self.medium.min(recent_start));
        let old_zone = &non_system[..medium_start];
        let mut medium_zone = non_system[medium_start..recent_start].to_vec();
        let recent_zone = non_system[recent_start..].to_vec();

        if old_zone.is_empty() {
            return Ok(());
        }

        let transcript = render_transcript(old_zone);
        let existing_summary = self.summary.lock().unwrap().clone().unwrap_or_default();
        let summarize_chat = incremental_summary_chat(&existing_summary, &transcript);

        match iter.provider.complete(&summarize_chat, &[]).await {
            Ok(reply) => {
                let new_summary = reply.text();
                *self.summary.lock().unwrap() = Some(new_summary.clone());
                for m in medium_zone.iter_mut() {
                    if m.metadata.get("sw_trimmed").map(String::as_str) == Some("true") {
                        continue;
                    }
                    for part in m.parts.iter_mut() {
                        if let Part::ToolResult { tool_call_id, .. } = part {
                            let category = categories.get(tool_call_id).copied().unwrap_or_default();
                            truncate_tool_result(part, category, self.trim_length);
                        }
                    }
                    m.metadata.insert("sw_trimmed".to_string(), "true".to_string());
                }
                let mut rebuilt = system;
                rebuilt.push(Message::assistant_text(new_summary));
                rebuilt.extend(medium_zone);
                rebuilt.extend(recent_zone);
                iter.chat.replace(rebuilt);
            }
            Err(_) => {
                // Retain the old zone untouched and skip the medium-zone
                // trim this iteration; try again once usage is reassessed.
            }
        }
        Ok(())
    }

    fn as_resetter(&self) -> Option<&dyn Resetter> {
        Some(self)
    }
}

impl Resetter for SlidingWindowEffect {
    fn reset(&self) {
        *self.summary.lock().unwrap() = None;
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

    fn fill(chat: &mut Chat, n: usize) {
        for i in 0..n {
            chat.append(Message::user(format!("turn {i}")));
        }
    }

    #[tokio::test]
    async fn evicts_old_zone_into_a_summary() {
        let mut chat = Chat::new();
        chat.append(Message::system("rules"));
        fill(&mut chat, 30);
        let completer = ScriptedMockCompleter::new(vec![Message::assistant_text("Goal: test\nCompleted Work: a lot")])
            .with_usage(900, 1)
            .with_context_window(1000);
        let effect = SlidingWindowEffect::new(0.7, 10, 10, 200);
        effect.eval(&RunContext::new("a"), &mut iter_ctx(&mut chat, &completer, 1)).await.unwrap();

        assert_eq!(chat.messages()[0].role, Role::System);
        let has_summary = chat.messages().iter().any(|m| m.text().contains("Goal: test"));
        assert!(has_summary);
        // recent + medium + summary + system == 1 + 1 + 10 + 10
        assert_eq!(chat.len(), 22);
    }

    #[tokio::test]
    async fn medium_zone_trim_uses_tool_declared_category() {
        use loom_tools::{StaticToolBox, Tool, ToolBox, ToolCall, ToolOutput};
        use serde_json::{json, Value};
        use std::sync::Arc;

        struct HeadTailTool;
        #[async_trait]
        impl Tool for HeadTailTool {
            fn name(&self) -> &str {
                "run_shell"
            }
            fn description(&self) -> &str {
                "runs a shell command"
            }
            fn parameters_schema(&self) -> Value {
                json!({ "type": "object" })
            }
            fn output_category(&self) -> loom_tools::OutputCategory {
                loom_tools::OutputCategory::HeadTail
            }
            async fn execute(&self, call: &ToolCall) -> ToolOutput {
                ToolOutput::ok(&call.id, "ok")
            }
        }

        let mut chat = Chat::new();
        chat.append(Message::user("go"));
        chat.append(Message::assistant(vec![Part::tool_call("c0", "run_shell", "{}")]));
        chat.append(Message::tool(vec![Part::tool_result("c0", format!("{}{}", "a".repeat(30), "b".repeat(30)), false)]));
        fill(&mut chat, 19);

        let completer =
            ScriptedMockCompleter::new(vec![Message::assistant_text("summary")]).with_usage(900, 1).with_context_window(1000);
        let toolboxes: Vec<Arc<dyn ToolBox>> = vec![Arc::new(StaticToolBox::new(vec![Arc::new(HeadTailTool)]))];
        let mut iter = IterationContext {
            phase: Phase::BeforeComplete,
            iteration: 1,
            chat: &mut chat,
            provider: &completer,
            agent_name: "a",
            toolboxes: &toolboxes,
        };
        let effect = SlidingWindowEffect::new(0.7, 10, 10, 20);
        effect.eval(&RunContext::new("a"), &mut iter).await.unwrap();

        let trimmed = chat
            .messages()
            .iter()
            .find_map(|m| m.parts.iter().find_map(|p| if let Part::ToolResult { content, .. } = p { Some(content.clone()) } else { None }));
        let trimmed = trimmed.expect("tool result survives into the medium zone");
        assert!(trimmed.starts_with('a'), "head-tail truncation should keep the leading chars: {trimmed}");
        assert!(trimmed.trim_end().ends_with('b'), "head-tail truncation should keep the trailing chars: {trimmed}");
    }

    #[tokio::test]
    async fn no_op_when_everything_fits_in_recent_zone() {
        let mut chat = Chat::new();
        fill(&mut chat, 5);
        let completer = ScriptedMockCompleter::always_text("x").with_usage(900, 1).with_context_window(1000);
        let effect = SlidingWindowEffect::new(0.7, 10, 10, 200);
        effect.eval(&RunContext::new("a"), &mut iter_ctx(&mut chat, &completer, 1)).await.unwrap();
        assert_eq!(chat.len(), 5);
    }

    #[tokio::test]
    async fn retains_old_zone_on_summarization_failure() {
        struct AlwaysFails;
        #[async_trait::async_trait]
        impl loom_model::Completer for AlwaysFails {
            async fn complete(&self, _chat: &Chat, _tools: &[loom_model::ToolDeclaration]) -> anyhow::Result<Message> {
                anyhow::bail!("provider down")
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
        fill(&mut chat, 30);
        let before = chat.len();
        let provider = AlwaysFails;
        let mut iter = IterationContext { phase: Phase::BeforeComplete, iteration: 1, chat: &mut chat, provider: &provider, agent_name: "a", toolboxes: &[] };
        let effect = SlidingWindowEffect::new(0.7, 10, 10, 200);
        effect.eval(&RunContext::new("a"), &mut iter).await.unwrap();
        assert_eq!(chat.len(), before);
    }

    #[tokio::test]
    async fn reset_clears_running_summary() {
        let effect = SlidingWindowEffect::new(0.7, 10, 10, 200);
        *effect.summary.lock().unwrap() = Some("stale".to_string());
        effect.reset();
        assert!(effect.summary.lock().unwrap().is_none());
    }
}
