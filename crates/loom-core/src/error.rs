// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
/// Errors produced by [`crate::agent::Agent::run`] and the middleware chain
/// wrapping it.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The reason-act loop hit `max_iterations` without the model producing
    /// a tool-free reply or a `task_complete` call.
    #[error("exceeded maximum iterations without completing")]
    MaxIterationsExceeded,

    /// The run context was cancelled, either directly or by a parent's
    /// cancellation propagating down the delegation tree.
    #[error("run cancelled")]
    Cancelled,

    /// The run exceeded a middleware-imposed deadline.
    #[error("run timed out")]
    TimedOut,

    /// The model provider returned an error.
    #[error("provider error: {0}")]
    Provider(#[source] anyhow::Error),

    /// An effect's `eval` call returned an error.
    #[error("effect error: {0}")]
    Effect(#[source] anyhow::Error),

    /// A panic was caught by the recovery middleware.
    #[error("run panicked: {0}")]
    Panic(String),

    /// The output guardrail rejected the final message.
    #[error("output rejected: {0}")]
    OutputRejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
