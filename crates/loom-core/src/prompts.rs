// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! System-prompt composition.
//!
//! The agent's system prompt is assembled from a fixed sequence of
//! optionally-present tagged sections. Sections that have nothing to
//! contribute are omitted entirely rather than emitted empty, so an agent
//! with no skills or sub-agents gets a short prompt rather than one padded
//! with empty tags.

use crate::registry::AgentRegistry;

/// An inline capability description injected into the system prompt. Skill
/// *discovery* (scanning a directory of skill files) is out of scope here;
/// callers that want it build the `Vec<Skill>` themselves and hand it to
/// [`crate::agent::AgentBuilder::skill`].
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: Option<String>,
    pub content: String,
}

/// Everything [`build_system_prompt`] needs that isn't already owned by the
/// agent's core fields (name/description/instructions).
pub struct PromptInputs<'a> {
    pub description: &'a str,
    pub instructions: &'a str,
    pub depth: u32,
    pub has_notes_tool: bool,
    pub behavioral_constraints_enabled: bool,
    pub project_context: Option<&'a str>,
    pub skills: &'a [Skill],
    pub registry: Option<&'a AgentRegistry>,
    pub self_config_name: &'a str,
}

const BEHAVIORAL_CONSTRAINTS: &str = "\
- Never fabricate a tool result; if a tool call fails, say so.
- Prefer the smallest change that satisfies the task.
- Ask for clarification only when truly blocked, not as a substitute for a reasonable default.";

const COMPLETION_PROTOCOL: &str = "\
When your task is finished, call `task_complete` exactly once with a `status` of `completed` or \
`failed`, a short `summary`, and any `files_modified`, `tests_run`, or `caveats` worth reporting. \
Do not call it more than once; only the first call is recorded.";

const NOTES_PROTOCOL: &str = "\
Use the notes tool to record anything a future agent working on a related task would benefit \
from knowing: what you tried, what worked, what didn't.";

/// Assemble the system prompt from its tagged sections, in a fixed order:
/// identity, completion protocol (depth > 0 only), notes protocol (only if
/// a notes tool is available), instructions, behavioral constraints, project
/// context, skills, available skills, available agents.
pub fn build_system_prompt(inputs: &PromptInputs) -> String {
    let mut sections = Vec::new();

    sections.push(tagged("identity", inputs.description));

    if inputs.depth > 0 {
        sections.push(tagged("completion_protocol", COMPLETION_PROTOCOL));
    }

    if inputs.has_notes_tool {
        sections.push(tagged("notes_protocol", NOTES_PROTOCOL));
    }

    if !inputs.instructions.is_empty() {
        sections.push(tagged("instructions", inputs.instructions));
    }

    if inputs.behavioral_constraints_enabled {
        sections.push(tagged("behavioral_constraints", BEHAVIORAL_CONSTRAINTS));
    }

    if let Some(ctx) = inputs.project_context {
        if !ctx.is_empty() {
            sections.push(tagged("project_context", ctx));
        }
    }

    let inline_skills: Vec<&Skill> = inputs.skills.iter().filter(|s| s.description.is_none()).collect();
    if !inline_skills.is_empty() {
        let body = inline_skills.iter().map(|s| format!("## {}\n{}", s.name, s.content)).collect::<Vec<_>>().join("\n\n");
        sections.push(tagged("skills", &body));
    }

    let described_skills: Vec<&Skill> = inputs.skills.iter().filter(|s| s.description.is_some()).collect();
    if !described_skills.is_empty() {
        let body = described_skills
            .iter()
            .map(|s| format!("- {}: {}", s.name, s.description.as_deref().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(tagged("available_skills", &body));
    }

    if let Some(registry) = inputs.registry {
        let entries: Vec<_> = registry.list().into_iter().filter(|e| !e.name.eq_ignore_ascii_case(inputs.self_config_name)).collect();
        if !entries.is_empty() {
            let body = entries.iter().map(|e| format!("- {}: {}", e.name, e.description)).collect::<Vec<_>>().join("\n");
            sections.push(tagged("available_agents", &body));
        }
    }

    sections.join("\n\n")
}

fn tagged(tag: &str, body: &str) -> String {
    format!("<{tag}>\n{body}\n</{tag}>")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
