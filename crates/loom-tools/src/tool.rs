// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model, forwarded verbatim into the
    /// correlated [`ToolOutput`].
    pub id: String,
    pub name: String,
    /// Raw JSON arguments, as emitted by the model.
    pub args: Value,
}

/// The result of executing a tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    // `call_id` takes `impl AsRef<str>` rather than `impl Into<String>` so
    // callers can pass `&call.id` directly without an extra `.clone()` —
    // every call site has a borrowed `&String` in hand, not an owned one.
    pub fn ok(call_id: impl AsRef<str>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.as_ref().to_string(), content: content.into(), is_error: false }
    }

    pub fn err(call_id: impl AsRef<str>, msg: impl Into<String>) -> Self {
        Self { call_id: call_id.as_ref().to_string(), content: msg.into(), is_error: true }
    }
}

/// Describes the shape of a tool's text output for context-aware truncation
/// by the effects pipeline. Each tool declares its own category; the
/// pipeline never hard-codes tool names to pick a truncation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputCategory {
    /// Terminal/process output: keep head + tail so both the command
    /// preamble and the final result survive truncation.
    HeadTail,
    /// Ordered match list: keep the leading matches, which are the most
    /// relevant.
    MatchList,
    /// File content: keep a head/tail window with a separator.
    FileContent,
    /// Generic text: hard-truncate at a character boundary.
    #[default]
    Generic,
}

/// Trait every tool handler implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema of the parameters object.
    fn parameters_schema(&self) -> Value;

    /// Describes the shape of this tool's output for context-aware
    /// truncation. Default is [`OutputCategory::Generic`] (hard truncation).
    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    /// Execute the tool. Errors are reported via [`ToolOutput::err`], not
    /// by returning a `Result` — a failed tool call is a normal outcome the
    /// model should see and react to, not a runtime-level failure.
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
