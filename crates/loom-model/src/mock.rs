// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Chat, Completer, Message, ToolDeclaration, Usage, UsageReporter};

/// Deterministic test double for [`Completer`].
///
/// Holds a queue of canned replies; each [`complete`][Completer::complete]
/// call pops the next one. Once the queue is exhausted, a fixed fallback
/// reply is returned so a test with a longer loop than expected fails on an
/// assertion rather than a panic deep in the mock.
pub struct ScriptedMockCompleter {
    replies: Mutex<Vec<Message>>,
    calls: Mutex<usize>,
    usage: Mutex<Option<Usage>>,
    context_window: Option<u32>,
}

impl ScriptedMockCompleter {
    pub fn new(replies: Vec<Message>) -> Self {
        Self { replies: Mutex::new(replies), calls: Mutex::new(0), usage: Mutex::new(None), context_window: None }
    }

    /// Convenience: a provider that always returns the same plain-text reply.
    pub fn always_text(text: impl Into<String>) -> Self {
        Self::new(vec![Message::assistant_text(text)])
    }

    pub fn with_usage(self, input_tokens: u32, output_tokens: u32) -> Self {
        *self.usage.lock().unwrap() = Some(Usage { input_tokens, output_tokens });
        self
    }

    pub fn with_context_window(mut self, window: u32) -> Self {
        self.context_window = Some(window);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Completer for ScriptedMockCompleter {
    async fn complete(&self, _chat: &Chat, _tools: &[ToolDeclaration]) -> anyhow::Result<Message> {
        *self.calls.lock().unwrap() += 1;
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            Ok(Message::assistant_text("[scripted replies exhausted]"))
        } else {
            Ok(replies.remove(0))
        }
    }

    fn as_usage_reporter(&self) -> Option<&dyn UsageReporter> {
        Some(self)
    }
}

impl UsageReporter for ScriptedMockCompleter {
    fn last_usage(&self) -> Option<Usage> {
        *self.usage.lock().unwrap()
    }

    fn context_window(&self) -> Option<u32> {
        self.context_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Part;

    #[tokio::test]
    async fn always_text_replies_with_fixed_message() {
        let c = ScriptedMockCompleter::always_text("hello");
        let reply = c.complete(&Chat::new(), &[]).await.unwrap();
        assert_eq!(reply.text(), "hello");
    }

    #[tokio::test]
    async fn scripted_replies_pop_in_order() {
        let c = ScriptedMockCompleter::new(vec![
            Message::assistant(vec![Part::tool_call("c1", "echo", "{}")]),
            Message::assistant_text("done"),
        ]);
        let first = c.complete(&Chat::new(), &[]).await.unwrap();
        assert!(first.has_tool_calls());
        let second = c.complete(&Chat::new(), &[]).await.unwrap();
        assert_eq!(second.text(), "done");
        assert_eq!(c.call_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_queue_returns_fallback_reply() {
        let c = ScriptedMockCompleter::new(vec![]);
        let reply = c.complete(&Chat::new(), &[]).await.unwrap();
        assert!(reply.text().contains("exhausted"));
    }

    #[test]
    fn usage_reporter_returns_configured_usage() {
        let c = ScriptedMockCompleter::always_text("x").with_usage(100, 20);
        let usage = c.as_usage_reporter().unwrap().last_usage().unwrap();
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 20);
    }

    #[test]
    fn default_usage_reporter_is_none_value() {
        let c = ScriptedMockCompleter::always_text("x");
        assert!(c.as_usage_reporter().unwrap().last_usage().is_none());
    }
}
