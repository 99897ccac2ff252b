// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The reason-act loop: [`Agent`] and its [`AgentBuilder`].
//!
//! An agent holds its own chat log, provider, toolboxes, and effects
//! pipeline. [`Agent::run`] drives one complete task to either a final
//! tool-free reply or a `task_complete` call, dispatching tool calls
//! concurrently and running the configured effects around every provider
//! round trip.

use std::sync::Arc;

use loom_model::{Chat, Completer, Message, Part, ToolDeclaration};
use loom_tools::{ToolBox, ToolCall};
use serde_json::Value;

use crate::completion::{CompletionCell, CompletionResult};
use crate::context::RunContext;
use crate::effects::{self, Effect, IterationContext, Phase};
use crate::error::RunError;
use crate::events::{MESSAGE_ADDED, TOOL_CALL_END, TOOL_CALL_START};
use crate::options::AgentOptions;
use crate::orchestration::{build_completion_toolbox, build_orchestration_toolbox};
use crate::prompts::{build_system_prompt, PromptInputs, Skill};
use crate::registry::AgentRegistry;

/// One agent instance: a provider, a chat log, a toolbox list, and the
/// effects pipeline that manages the chat around every provider call.
///
/// `name` is the unique instance identifier (`coder-3`); `config_name` is
/// the registry key it was spawned from (`coder`). The two are equal for a
/// root agent constructed directly by [`AgentBuilder::build`].
pub struct Agent {
    name: String,
    config_name: String,
    description: String,
    instructions: String,
    provider: Arc<dyn Completer>,
    chat: Chat,
    toolboxes: Vec<Arc<dyn ToolBox>>,
    registry: Option<AgentRegistry>,
    options: AgentOptions,
    depth: u32,
    completion: Arc<CompletionCell>,
    effects: Vec<Arc<dyn Effect>>,
    max_iterations: u32,
    behavioral_constraints_enabled: bool,
    project_context: Option<String>,
    skills: Vec<Skill>,
}

impl Agent {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config_name(&self) -> &str {
        &self.config_name
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    pub fn completion_result(&self) -> Option<CompletionResult> {
        self.completion.get()
    }

    /// Set by [`AgentRegistry::spawn`] immediately after constructing a
    /// fresh instance from its factory.
    pub fn set_config_name(&mut self, config_name: String) {
        self.config_name = config_name;
    }

    /// Set by [`AgentRegistry::spawn`] to the minted `config_name-N` instance
    /// identifier.
    pub fn set_instance_name(&mut self, instance_name: String) {
        self.name = instance_name;
    }

    pub fn set_depth(&mut self, depth: u32) {
        self.depth = depth;
    }

    pub fn set_registry(&mut self, registry: AgentRegistry) {
        self.registry = Some(registry);
    }

    /// Replace the agent's own toolbox list wholesale. Used by `delegate` to
    /// hand a freshly spawned child the parent's snapshot; the child builds
    /// its own orchestration/completion toolboxes fresh in `run` based on
    /// its own depth.
    pub fn set_toolboxes(&mut self, toolboxes: Vec<Arc<dyn ToolBox>>) {
        self.toolboxes = toolboxes;
    }

    pub fn set_options(&mut self, options: AgentOptions) {
        self.options = options;
    }

    /// Append a message to this agent's chat before the run starts (used by
    /// `delegate` to seed delegation context and the task itself).
    pub fn chat_append(&mut self, message: Message) {
        self.chat.append(message);
    }

    fn emit_message_added(&self, ctx: &RunContext) {
        if let Some(f) = &self.options.event_func {
            f(ctx, MESSAGE_ADDED, &Value::Null);
        }
    }

    fn emit_tool_event(&self, ctx: &RunContext, kind: &str, data: Value) {
        if let Some(f) = &self.options.event_func {
            f(ctx, kind, &data);
        }
    }

    /// Build the active toolbox list for this run: the agent's own
    /// toolboxes, plus a freshly built `list_agents`/`delegate` toolbox if
    /// a registry is attached and the depth cap allows further delegation,
    /// plus a freshly built `task_complete` toolbox below the root.
    fn assemble_toolboxes(&self, ctx: &RunContext) -> Vec<Arc<dyn ToolBox>> {
        let mut list = self.toolboxes.clone();

        if let Some(registry) = &self.registry {
            if self.options.max_delegation_depth > self.depth {
                let orchestration = build_orchestration_toolbox(
                    registry.clone(),
                    self.depth,
                    self.config_name.clone(),
                    self.toolboxes.clone(),
                    self.options.clone(),
                    ctx.clone(),
                );
                loom_tools::add_toolbox(&mut list, orchestration);
            }
        }

        if self.depth > 0 {
            let completion = build_completion_toolbox(self.completion.clone());
            loom_tools::add_toolbox(&mut list, completion);
        }

        list
    }

    /// Run the reason-act loop to completion: bind the agent's name to the
    /// context, ensure the system prompt, assemble tools, reset effects,
    /// then alternate provider calls with concurrent tool dispatch until the
    /// model produces a tool-free reply, `task_complete` is called, the
    /// context is cancelled, or `max_iterations` is exhausted.
    pub async fn run(&mut self, ctx: RunContext) -> Result<Message, RunError> {
        let mut ctx = ctx;
        ctx.agent_name = self.name.clone();

        let toolbox_list = self.assemble_toolboxes(&ctx);

        let has_notes_tool = loom_tools::lookup(&toolbox_list, "list_notes").is_some();
        let prompt_inputs = PromptInputs {
            description: &self.description,
            instructions: &self.instructions,
            depth: self.depth,
            has_notes_tool,
            behavioral_constraints_enabled: self.behavioral_constraints_enabled,
            project_context: self.project_context.as_deref(),
            skills: &self.skills,
            registry: self.registry.as_ref(),
            self_config_name: &self.config_name,
        };
        self.chat.init_system_prompt(build_system_prompt(&prompt_inputs));

        let tools = loom_tools::declarations(&toolbox_list);
        let tool_decls: Vec<ToolDeclaration> = tools
            .iter()
            .map(|t| ToolDeclaration { name: t.name().to_string(), description: t.description().to_string(), parameters: t.parameters_schema() })
            .collect();

        effects::reset_all(&self.effects);

        if ctx.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        let mut iteration: u32 = 0;
        loop {
            if self.max_iterations != 0 && iteration >= self.max_iterations {
                return Err(RunError::MaxIterationsExceeded);
            }
            if ctx.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            for effect in &self.effects {
                let mut iter_ctx =
                    IterationContext { phase: Phase::BeforeComplete, iteration, chat: &mut self.chat, provider: self.provider.as_ref(), agent_name: &self.name, toolboxes: &toolbox_list };
                effect.eval(&ctx, &mut iter_ctx).await.map_err(RunError::Effect)?;
            }

            let mut reply = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(RunError::Cancelled),
                result = self.provider.complete(&self.chat, &tool_decls) => result.map_err(RunError::Provider)?,
            };
            reply.sender = self.name.clone();
            self.chat.append(reply.clone());
            self.emit_message_added(&ctx);

            for effect in &self.effects {
                let mut iter_ctx =
                    IterationContext { phase: Phase::AfterComplete, iteration, chat: &mut self.chat, provider: self.provider.as_ref(), agent_name: &self.name, toolboxes: &toolbox_list };
                effect.eval(&ctx, &mut iter_ctx).await.map_err(RunError::Effect)?;
            }

            if !reply.has_tool_calls() {
                return Ok(reply);
            }

            let pending: Vec<(String, String, String)> =
                reply.tool_calls().into_iter().map(|(id, name, args)| (id.to_string(), name.to_string(), args.to_string())).collect();

            let mut tasks = Vec::with_capacity(pending.len());
            for (id, name, args) in &pending {
                self.emit_tool_event(&ctx, TOOL_CALL_START, serde_json::json!({ "id": id, "name": name }));
                let toolboxes = toolbox_list.clone();
                let id = id.clone();
                let name = name.clone();
                let args = args.clone();
                tasks.push(tokio::spawn(async move {
                    let parsed: Value = match serde_json::from_str(&args) {
                        Ok(v) => v,
                        Err(e) => return loom_tools::ToolOutput::err(&id, format!("invalid tool arguments JSON: {e}")),
                    };
                    let call = ToolCall { id, name, args: parsed };
                    loom_tools::execute(&toolboxes, &call).await
                }));
            }

            let mut outputs = Vec::with_capacity(tasks.len());
            for (i, task) in tasks.into_iter().enumerate() {
                let output = match task.await {
                    Ok(o) => o,
                    Err(e) => loom_tools::ToolOutput::err(&pending[i].0, format!("tool task panicked: {e}")),
                };
                self.emit_tool_event(&ctx, TOOL_CALL_END, serde_json::json!({ "id": output.call_id.clone(), "is_error": output.is_error }));
                outputs.push(output);
            }

            for output in outputs {
                self.chat.append(Message::tool(vec![Part::tool_result(output.call_id, output.content, output.is_error)]));
                self.emit_message_added(&ctx);
            }

            if ctx.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            if self.completion.is_set() {
                return Ok(reply);
            }

            iteration += 1;
        }
    }
}

/// Builds an [`Agent`]. The root agent's `config_name` equals its `name`;
/// [`AgentRegistry::spawn`] overwrites both for delegated children.
pub struct AgentBuilder {
    name: String,
    provider: Arc<dyn Completer>,
    description: String,
    instructions: String,
    toolboxes: Vec<Arc<dyn ToolBox>>,
    registry: Option<AgentRegistry>,
    options: AgentOptions,
    effects: Vec<Arc<dyn Effect>>,
    max_iterations: u32,
    behavioral_constraints_enabled: bool,
    project_context: Option<String>,
    skills: Vec<Skill>,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>, provider: Arc<dyn Completer>) -> Self {
        let name = name.into();
        Self {
            name,
            provider,
            description: String::new(),
            instructions: String::new(),
            toolboxes: Vec::new(),
            registry: None,
            options: AgentOptions::default(),
            effects: Vec::new(),
            max_iterations: loom_config::RuntimeConfig::default().max_iterations,
            behavioral_constraints_enabled: true,
            project_context: None,
            skills: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn toolbox(mut self, toolbox: Arc<dyn ToolBox>) -> Self {
        loom_tools::add_toolbox(&mut self.toolboxes, toolbox);
        self
    }

    pub fn toolboxes(mut self, toolboxes: impl IntoIterator<Item = Arc<dyn ToolBox>>) -> Self {
        for tb in toolboxes {
            loom_tools::add_toolbox(&mut self.toolboxes, tb);
        }
        self
    }

    pub fn registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn options(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn effect(mut self, effect: Arc<dyn Effect>) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn effects(mut self, effects: Vec<Arc<dyn Effect>>) -> Self {
        self.effects = effects;
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn behavioral_constraints(mut self, enabled: bool) -> Self {
        self.behavioral_constraints_enabled = enabled;
        self
    }

    pub fn project_context(mut self, context: impl Into<String>) -> Self {
        self.project_context = Some(context.into());
        self
    }

    pub fn skill(mut self, skill: Skill) -> Self {
        self.skills.push(skill);
        self
    }

    pub fn skills(mut self, skills: Vec<Skill>) -> Self {
        self.skills = skills;
        self
    }

    pub fn build(self) -> Agent {
        Agent {
            config_name: self.name.clone(),
            name: self.name,
            description: self.description,
            instructions: self.instructions,
            provider: self.provider,
            chat: Chat::new(),
            toolboxes: self.toolboxes,
            registry: self.registry,
            options: self.options,
            depth: 0,
            completion: Arc::new(CompletionCell::new()),
            effects: self.effects,
            max_iterations: self.max_iterations,
            behavioral_constraints_enabled: self.behavioral_constraints_enabled,
            project_context: self.project_context,
            skills: self.skills,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
