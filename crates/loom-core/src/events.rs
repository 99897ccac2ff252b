// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde_json::Value;

use crate::context::RunContext;

pub const AGENT_START: &str = "agent_start";
pub const AGENT_END: &str = "agent_end";
pub const TOOL_CALL_START: &str = "tool_call_start";
pub const TOOL_CALL_END: &str = "tool_call_end";
pub const MESSAGE_ADDED: &str = "message_added";

/// Notified on `agent_start`/`agent_end` with the child's display prefix.
/// Propagated to children by cloning the `Arc`.
pub type EventNotifier = Arc<dyn Fn(&RunContext, &str, &str, &Value) + Send + Sync>;

/// Notified on `tool_call_start`/`tool_call_end`/`message_added`.
/// Propagated to children by cloning the `Arc`.
pub type EventFunc = Arc<dyn Fn(&RunContext, &str, &Value) + Send + Sync>;
