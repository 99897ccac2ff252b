// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// The per-`Run` bundle threaded through effects, tool execution, and
/// delegation. The Rust analogue of a cancellable, deadline-bearing
/// `context.Context`.
#[derive(Clone)]
pub struct RunContext {
    pub agent_name: String,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self { agent_name: agent_name.into(), cancel: CancellationToken::new() }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancelled(&self) -> impl std::future::Future<Output = ()> + '_ {
        self.cancel.cancelled()
    }

    /// Derive a child context bound to the same cancellation token (cancelling
    /// the parent cancels every child) but carrying a different agent name,
    /// for use in delegated sub-agent runs.
    pub fn child(&self, agent_name: impl Into<String>) -> Self {
        Self { agent_name: agent_name.into(), cancel: self.cancel.clone() }
    }

    /// Run `fut` with a deadline; cancels and returns `Err` if `duration`
    /// elapses first.
    pub async fn with_timeout<T>(
        &self,
        duration: Duration,
        fut: impl std::future::Future<Output = T>,
    ) -> Result<T, tokio::time::error::Elapsed> {
        tokio::time::timeout(duration, fut).await
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new("")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
