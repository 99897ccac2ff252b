// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agent runtime: the reason-act loop, hierarchical delegation, and the
//! context-management effects pipeline built around a pluggable model
//! provider and tool set.

mod agent;
mod completion;
mod context;
mod effects;
mod error;
mod events;
mod middleware;
mod options;
mod orchestration;
mod prompts;
mod registry;

pub use agent::{Agent, AgentBuilder};
pub use completion::{CompletionCell, CompletionResult, CompletionStatus};
pub use context::RunContext;
pub use effects::{
    default_pipeline, CompactEffect, Effect, IterationContext, LoopDetectEffect, ObservationMaskEffect, Phase, ProgressEffect, ReflectionEffect,
    Resetter, SlidingWindowEffect, TrimToolResultsEffect,
};
pub use error::RunError;
pub use events::{EventFunc, EventNotifier, AGENT_END, AGENT_START, MESSAGE_ADDED, TOOL_CALL_END, TOOL_CALL_START};
pub use middleware::{compose, logger, output_guardrail, recovery, timeout, MiddlewareFn, Runnable};
pub use options::{AgentOptions, AskFunc};
pub use orchestration::{build_completion_toolbox, build_orchestration_toolbox, DelegateTool, ListAgentsTool, TaskCompleteTool};
pub use prompts::{build_system_prompt, PromptInputs, Skill};
pub use registry::{AgentRegistry, Entry};
