// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Middleware wrapping an agent's `run`.
//!
//! A [`Runnable`] is anything with an async `run`; [`Agent`](crate::agent::Agent)
//! is the base case. Middleware wraps one `Runnable` in another, so
//! composition is a pure function of runner to runner. [`compose`] applies
//! the list so its first element ends up outermost — the first middleware a
//! caller names sees the call first and the return value last.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use loom_model::Message;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::error::RunError;

/// Anything that can run a task to completion given a [`RunContext`].
/// [`crate::agent::Agent`] implements this directly; middleware wraps a
/// boxed `Runnable` in another `Runnable`.
#[async_trait]
pub trait Runnable: Send {
    async fn run(&mut self, ctx: RunContext) -> Result<Message, RunError>;
}

#[async_trait]
impl Runnable for crate::agent::Agent {
    async fn run(&mut self, ctx: RunContext) -> Result<Message, RunError> {
        crate::agent::Agent::run(self, ctx).await
    }
}

/// A constructor that wraps an inner `Runnable` in a middleware layer. Built
/// by [`timeout`], [`recovery`], [`logger`], and [`output_guardrail`]; pass a
/// `Vec` of these to [`compose`].
pub type MiddlewareFn = Box<dyn FnOnce(Box<dyn Runnable>) -> Box<dyn Runnable> + Send>;

/// Apply `middleware` around `base`, first element outermost.
///
/// Folding in reverse means the last element wraps `base` first and the
/// first element is applied last, ending up as the outermost layer — so a
/// caller listing `[logger, recovery, timeout]` gets a logger that sees
/// every error, including ones recovery converted from a panic and timeout
/// converted from a deadline.
pub fn compose(base: Box<dyn Runnable>, middleware: Vec<MiddlewareFn>) -> Box<dyn Runnable> {
    middleware.into_iter().rev().fold(base, |acc, wrap| wrap(acc))
}

// ─── Timeout ────────────────────────────────────────────────────────────────

struct Timeout {
    inner: Box<dyn Runnable>,
    duration: Duration,
}

#[async_trait]
impl Runnable for Timeout {
    async fn run(&mut self, ctx: RunContext) -> Result<Message, RunError> {
        match ctx.with_timeout(self.duration, self.inner.run(ctx.clone())).await {
            Ok(result) => result,
            Err(_) => {
                ctx.cancel();
                Err(RunError::TimedOut)
            }
        }
    }
}

/// Bounds a run to `duration`; on expiry, cancels the context (so any
/// in-flight delegated children observe the cancellation too) and returns
/// [`RunError::TimedOut`].
pub fn timeout(duration: Duration) -> MiddlewareFn {
    Box::new(move |inner| Box::new(Timeout { inner, duration }))
}

// ─── Recovery ───────────────────────────────────────────────────────────────

struct Recovery {
    inner: Box<dyn Runnable>,
}

#[async_trait]
impl Runnable for Recovery {
    async fn run(&mut self, ctx: RunContext) -> Result<Message, RunError> {
        match AssertUnwindSafe(self.inner.run(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(RunError::Panic(panic_message(payload))),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Catches a panic from the wrapped `Runnable` and converts it to
/// [`RunError::Panic`] instead of unwinding past `run`.
pub fn recovery() -> MiddlewareFn {
    Box::new(|inner| Box::new(Recovery { inner }))
}

// ─── Logger ─────────────────────────────────────────────────────────────────

struct Logger {
    inner: Box<dyn Runnable>,
    name: String,
}

#[async_trait]
impl Runnable for Logger {
    async fn run(&mut self, ctx: RunContext) -> Result<Message, RunError> {
        let start = std::time::Instant::now();
        info!(agent = %self.name, "run started");
        let result = self.inner.run(ctx).await;
        match &result {
            Ok(_) => info!(agent = %self.name, elapsed_ms = start.elapsed().as_millis() as u64, "run finished"),
            Err(e) => warn!(agent = %self.name, elapsed_ms = start.elapsed().as_millis() as u64, error = %e, "run failed"),
        }
        result
    }
}

/// Logs run start/finish/failure via `tracing`, tagged with `name`.
pub fn logger(name: impl Into<String>) -> MiddlewareFn {
    let name = name.into();
    Box::new(move |inner| Box::new(Logger { inner, name }))
}

// ─── OutputGuardrail ────────────────────────────────────────────────────────

struct OutputGuardrail {
    inner: Box<dyn Runnable>,
    check: Box<dyn Fn(&Message) -> Result<(), String> + Send + Sync>,
}

#[async_trait]
impl Runnable for OutputGuardrail {
    async fn run(&mut self, ctx: RunContext) -> Result<Message, RunError> {
        let result = self.inner.run(ctx).await?;
        match (self.check)(&result) {
            Ok(()) => Ok(result),
            Err(reason) => Err(RunError::OutputRejected(reason)),
        }
    }
}

/// Validates the final message against `check`; a rejection becomes
/// [`RunError::OutputRejected`] instead of a returned [`Message`].
pub fn output_guardrail(check: impl Fn(&Message) -> Result<(), String> + Send + Sync + 'static) -> MiddlewareFn {
    Box::new(move |inner| Box::new(OutputGuardrail { inner, check: Box::new(check) }))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
