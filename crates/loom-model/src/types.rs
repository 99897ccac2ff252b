// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─── Content part types ───────────────────────────────────────────────────────

/// A single content part of a [`Message`].
///
/// Messages are multi-part so that one assistant turn can carry both
/// narration text and one or more tool calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        /// JSON-encoded argument object.
        arguments: String,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::ToolCall { id: id.into(), name: name.into(), arguments: arguments.into() }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self::ToolResult { tool_call_id: tool_call_id.into(), content: content.into(), is_error }
    }

    fn approx_tokens(&self) -> usize {
        let chars = match self {
            Part::Text { text } => text.len(),
            Part::ToolCall { name, arguments, .. } => name.len() + arguments.len(),
            Part::ToolResult { content, .. } => content.len(),
        };
        (chars / 4).max(1)
    }
}

// ─── Roles ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ─── Message ──────────────────────────────────────────────────────────────────

/// A single message in the conversation log.
///
/// `sender` names the agent instance that produced this message (used for
/// attributing assistant replies in multi-agent transcripts); it is empty
/// for user/system/tool messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub sender: String,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { sender: String::new(), role: Role::System, parts: vec![Part::text(text)], metadata: HashMap::new() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { sender: String::new(), role: Role::User, parts: vec![Part::text(text)], metadata: HashMap::new() }
    }

    pub fn assistant(parts: Vec<Part>) -> Self {
        Self { sender: String::new(), role: Role::Assistant, parts, metadata: HashMap::new() }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::assistant(vec![Part::text(text)])
    }

    pub fn tool(parts: Vec<Part>) -> Self {
        Self { sender: String::new(), role: Role::Tool, parts, metadata: HashMap::new() }
    }

    /// Concatenate every `Text` part with newlines; empty string if none.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every tool call requested by this message, in declaration order.
    pub fn tool_calls(&self) -> Vec<(&str, &str, &str)> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall { id, name, arguments } => Some((id.as_str(), name.as_str(), arguments.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::ToolCall { .. }))
    }

    /// 4-chars-per-token heuristic, consistent across all parts. Never zero
    /// for a non-empty message so empty-usage edge cases don't divide by zero
    /// downstream.
    pub fn approx_tokens(&self) -> usize {
        self.parts.iter().map(Part::approx_tokens).sum::<usize>().max(1)
    }
}

// ─── Chat ─────────────────────────────────────────────────────────────────────

/// The ordered message log for one agent run.
///
/// Message index 0 holds the system prompt, if any. The chat is owned
/// exclusively by the agent running it; effects mutate it via [`Chat::replace`]
/// rather than handing out mutable aliases to the underlying vector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chat {
    messages: Vec<Message>,
}

impl Chat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the entire log with `messages`.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// All messages from `index` (inclusive) to the end.
    pub fn since(&self, index: usize) -> &[Message] {
        if index >= self.messages.len() {
            &[]
        } else {
            &self.messages[index..]
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        match self.messages.first() {
            Some(m) if m.role == Role::System => Some(m.parts.first().and_then(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })?),
            _ => None,
        }
    }

    /// Insert or overwrite the system prompt at index 0. Idempotent: calling
    /// this repeatedly with the same text never duplicates the message.
    pub fn init_system_prompt(&mut self, text: impl Into<String>) {
        let text = text.into();
        match self.messages.first_mut() {
            Some(m) if m.role == Role::System => {
                m.parts = vec![Part::text(text)];
            }
            _ => self.messages.insert(0, Message::system(text)),
        }
    }

    pub fn approx_tokens(&self) -> usize {
        self.messages.iter().map(Message::approx_tokens).sum()
    }
}

// ─── Tool declarations & usage ───────────────────────────────────────────────

/// A tool schema as presented to the model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Token usage observed from the last provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_user_sets_role_and_text() {
        let m = Message::user("hello");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.text(), "hello");
    }

    #[test]
    fn message_assistant_text_concatenates_text_parts_only() {
        let m = Message::assistant(vec![
            Part::text("first"),
            Part::tool_call("c1", "echo", "{}"),
            Part::text("second"),
        ]);
        assert_eq!(m.text(), "first\nsecond");
        assert!(m.has_tool_calls());
    }

    #[test]
    fn tool_calls_preserves_declaration_order() {
        let m = Message::assistant(vec![
            Part::tool_call("a", "one", "{}"),
            Part::tool_call("b", "two", "{}"),
        ]);
        let calls = m.tool_calls();
        assert_eq!(calls, vec![("a", "one", "{}"), ("b", "two", "{}")]);
    }

    #[test]
    fn approx_tokens_minimum_is_one() {
        let m = Message::user("");
        assert_eq!(m.approx_tokens(), 1);
    }

    #[test]
    fn approx_tokens_divides_by_four() {
        let m = Message::user("12345678");
        assert_eq!(m.approx_tokens(), 2);
    }

    #[test]
    fn chat_init_system_prompt_is_idempotent() {
        let mut chat = Chat::new();
        chat.init_system_prompt("rules v1");
        chat.append(Message::user("hi"));
        chat.init_system_prompt("rules v2");
        assert_eq!(chat.len(), 2);
        assert_eq!(chat.system_prompt(), Some("rules v2"));
    }

    #[test]
    fn chat_system_prompt_none_when_first_message_is_not_system() {
        let mut chat = Chat::new();
        chat.append(Message::user("hi"));
        assert_eq!(chat.system_prompt(), None);
    }

    #[test]
    fn chat_since_out_of_bounds_returns_empty_slice() {
        let mut chat = Chat::new();
        chat.append(Message::user("hi"));
        assert!(chat.since(5).is_empty());
    }

    #[test]
    fn chat_replace_rebuilds_the_log() {
        let mut chat = Chat::new();
        chat.append(Message::user("a"));
        chat.append(Message::user("b"));
        chat.replace(vec![Message::user("only")]);
        assert_eq!(chat.len(), 1);
        assert_eq!(chat.get(0).unwrap().text(), "only");
    }

    #[test]
    fn message_serialises_and_deserialises() {
        let original = Message::user("payload");
        let json = serde_json::to_string(&original).unwrap();
        let decoded: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.role, Role::User);
        assert_eq!(decoded.text(), "payload");
    }
}
