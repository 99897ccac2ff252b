// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The context-management effects pipeline.
//!
//! An [`Effect`] observes (and may rewrite) the chat at a fixed point in
//! every reason-act iteration. Effects are deployment-pluggable: the agent
//! runs whatever list it's built with, in list order, and each effect
//! decides for itself whether it has anything to do this iteration. None of
//! them are required; an agent built with an empty effects list behaves like
//! a bare reason-act loop with no context management at all.

mod compact;
mod loop_detect;
mod observation_mask;
mod progress;
mod reflection;
mod sliding_window;
mod trim;

use async_trait::async_trait;
use loom_model::{Chat, Completer, Message, Part, Role};
use loom_tools::{OutputCategory, ToolBox};

pub use compact::CompactEffect;
pub use loop_detect::LoopDetectEffect;
pub use observation_mask::ObservationMaskEffect;
pub use progress::ProgressEffect;
pub use reflection::ReflectionEffect;
pub use sliding_window::SlidingWindowEffect;
pub use trim::TrimToolResultsEffect;

use crate::context::RunContext;

/// Which half of a reason-act iteration an effect is being evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the provider is asked for the next message.
    BeforeComplete,
    /// After the provider's reply has been appended to the chat.
    AfterComplete,
}

/// Everything one effect needs to inspect or rewrite the chat for this
/// iteration. Effects mutate the chat via [`Chat::replace`] on an owned
/// copy, never through a held mutable alias — the copy-on-write discipline
/// the rest of the codebase follows.
pub struct IterationContext<'a> {
    pub phase: Phase,
    /// 0 on the very first iteration. Effects gated on accumulated state
    /// (usage, repeated tool calls, elapsed steps) skip iteration 0 — there
    /// is nothing yet to have accumulated.
    pub iteration: u32,
    pub chat: &'a mut Chat,
    pub provider: &'a dyn Completer,
    pub agent_name: &'a str,
    /// The toolboxes assembled for this run, so an effect that rewrites a
    /// tool result can look up the originating tool's declared
    /// [`OutputCategory`] rather than hard-truncating blindly.
    pub toolboxes: &'a [std::sync::Arc<dyn ToolBox>],
}

/// One pluggable context-management behavior.
#[async_trait]
pub trait Effect: Send + Sync {
    /// Runs once per iteration per phase. A no-op call (the effect's
    /// trigger condition wasn't met) returns `Ok(())` without touching
    /// `iter.chat`.
    async fn eval(&self, ctx: &RunContext, iter: &mut IterationContext<'_>) -> anyhow::Result<()>;

    /// Effects carrying iteration-spanning state (a running summary, a
    /// last-injected-at counter) implement [`Resetter`] so a fresh `Run`
    /// starts clean even when the same effect instance is reused across
    /// runs.
    fn as_resetter(&self) -> Option<&dyn Resetter> {
        None
    }
}

/// Clears an effect's internal state at the start of a `Run`.
pub trait Resetter: Send + Sync {
    fn reset(&self);
}

/// Reset every effect that carries state. Called once at the start of
/// [`crate::agent::Agent::run`], before the first iteration.
pub fn reset_all(effects: &[std::sync::Arc<dyn Effect>]) {
    for effect in effects {
        if let Some(r) = effect.as_resetter() {
            r.reset();
        }
    }
}

// ─── Shared rendering helpers ──────────────────────────────────────────────

/// Render messages as a plain-text transcript for summarization prompts.
/// System messages are skipped; tool-call arguments and tool-result bodies
/// are each truncated so one runaway part can't blow the compaction prompt's
/// own budget.
pub(crate) fn render_transcript(msgs: &[Message]) -> String {
    let mut out = String::new();
    for m in msgs {
        if m.role == Role::System {
            continue;
        }
        let role_label = role_label(m.role);
        for part in &m.parts {
            match part {
                Part::Text { text } => {
                    out.push_str(&format!("[{role_label}] {text}\n"));
                }
                Part::ToolCall { name, arguments, .. } => {
                    let args_trunc: String = arguments.chars().take(200).collect();
                    out.push_str(&format!("[{role_label}] called {name}({args_trunc})\n"));
                }
                Part::ToolResult { content, is_error, .. } => {
                    let label = if *is_error { "tool error" } else { "tool result" };
                    let body_trunc: String = content.chars().take(500).collect();
                    out.push_str(&format!("[{label}] {body_trunc}\n"));
                }
            }
        }
    }
    out
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Truncate a non-error tool-result part in place to `max_chars` using the
/// extraction strategy for `category`, unless it's already within budget.
/// Dispatching on [`OutputCategory`] rather than on the tool name keeps this
/// function independent of any concrete tool list; each tool declares its
/// own category via [`loom_tools::Tool::output_category`].
pub(crate) fn truncate_tool_result(part: &mut Part, category: OutputCategory, max_chars: usize) -> bool {
    if let Part::ToolResult { content, is_error, .. } = part {
        if *is_error || content.chars().count() <= max_chars {
            return false;
        }
        *content = smart_truncate(content, category, max_chars);
        return true;
    }
    false
}

/// Category-specific truncation: [`OutputCategory::HeadTail`] keeps a 3:2
/// head/tail split so both a command's preamble and final result survive;
/// [`OutputCategory::FileContent`] keeps an even head/tail split so both
/// imports and the most recent edits survive; [`OutputCategory::MatchList`]
/// keeps only the leading (highest-relevance) matches; [`OutputCategory::Generic`]
/// hard-truncates at `max_chars`.
fn smart_truncate(content: &str, category: OutputCategory, max_chars: usize) -> String {
    match category {
        OutputCategory::HeadTail => head_tail_chars(content, max_chars, 3, 2),
        OutputCategory::FileContent => head_tail_chars(content, max_chars, 1, 1),
        OutputCategory::MatchList => {
            let truncated: String = content.chars().take(max_chars).collect();
            format!("{truncated}… [trimmed; leading matches kept]")
        }
        OutputCategory::Generic => {
            let truncated: String = content.chars().take(max_chars).collect();
            format!("{truncated}… [trimmed]")
        }
    }
}

/// Keep a `head_ratio`:`tail_ratio` split of `max_chars`, joined by a
/// trimmed marker, so both the start and end of `content` survive.
fn head_tail_chars(content: &str, max_chars: usize, head_ratio: usize, tail_ratio: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    let head_budget = max_chars * head_ratio / (head_ratio + tail_ratio);
    let tail_budget = max_chars.saturating_sub(head_budget);
    let head: String = chars.iter().take(head_budget).collect();
    let tail: String = chars[chars.len().saturating_sub(tail_budget)..].iter().collect();
    format!("{head}\n… [trimmed] …\n{tail}")
}

/// Look up the [`OutputCategory`] a tool result's originating tool declared,
/// falling back to [`OutputCategory::Generic`] when the tool can no longer
/// be found (e.g. it was only ever available on a toolbox the agent has
/// since dropped).
pub(crate) fn category_for(toolboxes: &[std::sync::Arc<dyn ToolBox>], msgs: &[Message], before_index: usize, call_id: &str) -> OutputCategory {
    find_tool_name(msgs, before_index, call_id)
        .and_then(|name| loom_tools::lookup(toolboxes, &name))
        .map(|tool| tool.output_category())
        .unwrap_or_default()
}

/// Find the tool name a `ToolResult` correlates to, by scanning assistant
/// messages strictly before `before_index` in reverse for a `ToolCall` part
/// with a matching id.
pub(crate) fn find_tool_name(msgs: &[Message], before_index: usize, call_id: &str) -> Option<String> {
    for m in msgs[..before_index].iter().rev() {
        if m.role != Role::Assistant {
            continue;
        }
        for p in &m.parts {
            if let Part::ToolCall { id, name, .. } = p {
                if id == call_id {
                    return Some(name.clone());
                }
            }
        }
    }
    None
}

/// A structured, section-based prompt asking for a fresh summary.
pub(crate) fn compaction_chat(transcript: &str) -> Chat {
    let mut chat = Chat::new();
    chat.append(Message::system(
        "You are summarizing an agent's working transcript so it can be dropped from the live \
         context window. Produce a structured summary with these sections: Goal, Completed Work, \
         Files Touched, Key Decisions, Errors & Blockers, Current State, Next Steps. Be concise; \
         omit a section if it has nothing to report.",
    ));
    chat.append(Message::user(transcript.to_string()));
    chat
}

/// Like [`compaction_chat`], but merges an existing running summary with a
/// new transcript segment rather than summarizing from scratch.
pub(crate) fn incremental_summary_chat(existing_summary: &str, transcript: &str) -> Chat {
    let mut chat = Chat::new();
    chat.append(Message::system(
        "You maintain a running summary of an agent's working transcript as older messages are \
         evicted from the live context window. Merge the prior summary with the new transcript \
         segment into one updated structured summary, using these sections: Goal, Completed Work, \
         Files Touched, Key Decisions, Errors & Blockers, Current State, Next Steps. Be concise; \
         omit a section if it has nothing to report.",
    ));
    let body = if existing_summary.is_empty() {
        transcript.to_string()
    } else {
        format!("Prior summary:\n{existing_summary}\n\nNew transcript segment:\n{transcript}")
    };
    chat.append(Message::user(body));
    chat
}

/// Build the default seven-effect pipeline from configuration, in the order
/// this implementation registers them: trimming and the per-step behavioral
/// effects first, the two summarization-based effects last so a deployment
/// that enables both sees the cheaper, non-model-call trim happen before
/// either pays for a provider round trip. See `DESIGN.md` for the rationale.
pub fn default_pipeline(config: &loom_config::EffectsConfig, ask: Option<crate::options::AskFunc>) -> Vec<std::sync::Arc<dyn Effect>> {
    vec![
        std::sync::Arc::new(TrimToolResultsEffect::new(config.trim_preserve_recent, config.trim_max_result_length)),
        std::sync::Arc::new(LoopDetectEffect::new(config.loop_detect_window_size, config.loop_detect_threshold)),
        std::sync::Arc::new(ReflectionEffect::new(config.reflection_failure_threshold)),
        std::sync::Arc::new(ProgressEffect::new(config.progress_interval)),
        std::sync::Arc::new(ObservationMaskEffect::new(config.mask_threshold, config.mask_recent_window)),
        std::sync::Arc::new(SlidingWindowEffect::new(
            config.sliding_window_threshold,
            config.sliding_window_recent,
            config.sliding_window_medium,
            config.sliding_window_trim_length,
        )),
        std::sync::Arc::new(CompactEffect::new(config.compact_threshold, ask)),
    ]
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use loom_model::Role;

    use super::*;

    #[test]
    fn render_transcript_skips_system_messages() {
        let msgs = vec![Message::system("rules"), Message::user("hi")];
        let out = render_transcript(&msgs);
        assert!(!out.contains("rules"));
        assert!(out.contains("[user] hi"));
    }

    #[test]
    fn render_transcript_labels_tool_calls_and_results() {
        let msgs = vec![
            Message::assistant(vec![Part::tool_call("c1", "search", "{}")]),
            Message::tool(vec![Part::tool_result("c1", "match found", false)]),
        ];
        let out = render_transcript(&msgs);
        assert!(out.contains("called search"));
        assert!(out.contains("[tool result] match found"));
    }

    #[test]
    fn truncate_tool_result_skips_errors() {
        let mut part = Part::tool_result("c1", "x".repeat(10), true);
        assert!(!truncate_tool_result(&mut part, OutputCategory::Generic, 3));
    }

    #[test]
    fn truncate_tool_result_appends_marker() {
        let mut part = Part::tool_result("c1", "a".repeat(10), false);
        assert!(truncate_tool_result(&mut part, OutputCategory::Generic, 3));
        if let Part::ToolResult { content, .. } = part {
            assert_eq!(content, "aaa… [trimmed]");
        }
    }

    #[test]
    fn truncate_tool_result_under_budget_is_untouched() {
        let mut part = Part::tool_result("c1", "short", false);
        assert!(!truncate_tool_result(&mut part, OutputCategory::HeadTail, 100));
        if let Part::ToolResult { content, .. } = part {
            assert_eq!(content, "short");
        }
    }

    #[test]
    fn head_tail_category_preserves_both_ends() {
        let content = "a".repeat(30) + &"b".repeat(30);
        let mut part = Part::tool_result("c1", content, false);
        assert!(truncate_tool_result(&mut part, OutputCategory::HeadTail, 20));
        if let Part::ToolResult { content, .. } = part {
            assert!(content.starts_with('a'));
            assert!(content.trim_end().ends_with('b'));
        }
    }

    #[test]
    fn match_list_category_keeps_only_leading_matches() {
        let content = "a".repeat(30) + &"b".repeat(30);
        let mut part = Part::tool_result("c1", content, false);
        assert!(truncate_tool_result(&mut part, OutputCategory::MatchList, 10));
        if let Part::ToolResult { content, .. } = part {
            assert!(content.starts_with("aaaaaaaaaa"));
            assert!(!content.contains('b'));
        }
    }

    #[test]
    fn category_for_resolves_registered_tool_category() {
        use async_trait::async_trait;
        use loom_tools::{StaticToolBox, Tool, ToolCall, ToolOutput};
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
            fn output_category(&self) -> OutputCategory {
                OutputCategory::HeadTail
            }
            async fn execute(&self, call: &ToolCall) -> ToolOutput {
                ToolOutput::ok(&call.id, "ok")
            }
        }

        let toolboxes: Vec<Arc<dyn ToolBox>> = vec![Arc::new(StaticToolBox::new(vec![Arc::new(HeadTailTool)]))];
        let msgs = vec![
            Message::assistant(vec![Part::tool_call("c1", "run_shell", "{}")]),
            Message::tool(vec![Part::tool_result("c1", "out", false)]),
        ];
        assert_eq!(category_for(&toolboxes, &msgs, 1, "c1"), OutputCategory::HeadTail);
    }

    #[test]
    fn category_for_falls_back_to_generic_when_tool_unknown() {
        let msgs = vec![Message::tool(vec![Part::tool_result("c1", "out", false)])];
        assert_eq!(category_for(&[], &msgs, 1, "c1"), OutputCategory::Generic);
    }

    #[test]
    fn find_tool_name_scans_backward_for_matching_call() {
        let msgs = vec![
            Message::assistant(vec![Part::tool_call("c1", "search", "{}")]),
            Message::tool(vec![Part::tool_result("c1", "result", false)]),
        ];
        assert_eq!(find_tool_name(&msgs, 1, "c1"), Some("search".to_string()));
        assert_eq!(find_tool_name(&msgs, 0, "c1"), None);
    }

    #[test]
    fn default_pipeline_builds_seven_effects() {
        let cfg = loom_config::EffectsConfig::default();
        let pipeline = default_pipeline(&cfg, None);
        assert_eq!(pipeline.len(), 7);
    }

    #[test]
    fn role_label_covers_every_role() {
        assert_eq!(role_label(Role::System), "system");
        assert_eq!(role_label(Role::User), "user");
        assert_eq!(role_label(Role::Assistant), "assistant");
        assert_eq!(role_label(Role::Tool), "tool");
    }
}
