// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{Chat, Message, ToolDeclaration, Usage};

/// A model-provider adapter.
///
/// Concrete adapters (OpenAI-compatible HTTP clients, local inference
/// servers, etc.) live outside this crate; this trait is the seam they
/// implement against. Streaming output and retry policy are deliberately
/// not part of the contract — a provider either returns a finished
/// [`Message`] or an error.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Send the chat and the currently declared tools, and return the
    /// model's next message. The returned message's `sender` field is
    /// overwritten by the caller; providers need not set it.
    async fn complete(&self, chat: &Chat, tools: &[ToolDeclaration]) -> anyhow::Result<Message>;

    /// Capability probe for usage reporting. Providers that track token
    /// counts override this to return `Some(self)`; effects that gate on
    /// usage treat `None` as "no usage available" and skip their trigger.
    fn as_usage_reporter(&self) -> Option<&dyn UsageReporter> {
        None
    }
}

/// Exposes the token usage observed on the most recent [`Completer::complete`]
/// call. Implemented by providers that can report it; probed dynamically via
/// [`Completer::as_usage_reporter`].
pub trait UsageReporter: Send + Sync {
    fn last_usage(&self) -> Option<Usage>;

    /// The provider's context window size in tokens, if known. Effects that
    /// gate on a fraction of the context window no-op when this is `None`.
    fn context_window(&self) -> Option<u32> {
        None
    }
}
