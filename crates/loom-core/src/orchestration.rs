// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The three orchestration tools every delegation-capable agent gets for
//! free: `list_agents`, `delegate`, and `task_complete`. Built fresh inside
//! [`crate::agent::Agent::run`] on every call, since they capture a snapshot
//! of the agent's toolboxes/options/context at assembly time (see
//! `DESIGN.md`) rather than reaching back into the live agent.

use std::sync::Arc;

use async_trait::async_trait;
use loom_model::Message;
use loom_tools::{StaticToolBox, Tool, ToolBox, ToolCall, ToolOutput};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::completion::{CompletionCell, CompletionResult, CompletionStatus};
use crate::context::RunContext;
use crate::error::RunError;
use crate::events::{AGENT_END, AGENT_START};
use crate::options::AgentOptions;
use crate::registry::AgentRegistry;

// ─── list_agents ────────────────────────────────────────────────────────────

pub struct ListAgentsTool {
    pub registry: AgentRegistry,
    pub self_config_name: String,
}

#[async_trait]
impl Tool for ListAgentsTool {
    fn name(&self) -> &str {
        "list_agents"
    }

    fn description(&self) -> &str {
        "List the sub-agents available for delegation, excluding yourself."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let entries: Vec<_> =
            self.registry.list().into_iter().filter(|e| !e.name.eq_ignore_ascii_case(&self.self_config_name)).collect();
        match serde_json::to_string(&entries) {
            Ok(s) => ToolOutput::ok(&call.id, s),
            Err(e) => ToolOutput::err(&call.id, format!("failed to serialize agent list: {e}")),
        }
    }
}

// ─── delegate ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TaskSpec {
    agent: String,
    task: String,
    #[serde(default)]
    context: String,
    #[serde(default)]
    task_id: Option<String>,
}

#[derive(Deserialize)]
struct DelegateInput {
    tasks: Vec<TaskSpec>,
}

#[derive(Serialize)]
struct DelegateResult {
    agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completion: Option<CompletionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

pub struct DelegateTool {
    pub registry: AgentRegistry,
    pub depth: u32,
    pub self_config_name: String,
    pub toolboxes_snapshot: Vec<Arc<dyn ToolBox>>,
    pub options_snapshot: AgentOptions,
    pub ctx: RunContext,
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max).collect();
    format!("{truncated}… [truncated]")
}

impl DelegateTool {
    async fn run_one(&self, spec: TaskSpec) -> DelegateResult {
        let (child, found) = self.registry.spawn(&spec.agent, self.depth + 1);
        let Some(mut child) = child.filter(|_| found) else {
            return DelegateResult {
                agent: spec.agent.clone(),
                result: None,
                completion: None,
                error: Some(format!("agent not found: {}", spec.agent)),
                warning: None,
            };
        };

        child.set_registry(self.registry.clone());
        child.set_toolboxes(self.toolboxes_snapshot.clone());
        child.set_options(self.options_snapshot.clone());

        if !spec.context.is_empty() {
            child.chat_append(Message::user(format!("<delegation_context>\n{}\n</delegation_context>", spec.context)));
        }
        if let Some(dir) = &self.options_snapshot.reflection_dir {
            for note in loom_runtime::read_relevant_reflections_capped(
                dir,
                &spec.task,
                self.options_snapshot.reflection_max_files,
                self.options_snapshot.reflection_max_bytes,
            ) {
                child.chat_append(Message::user(format!("<prior_reflections>\n{note}\n</prior_reflections>")));
            }
        }
        child.chat_append(Message::user(spec.task.clone()));

        if let (Some(task_id), Some(board)) = (&spec.task_id, &self.options_snapshot.task_board) {
            if let Err(e) = board.claim_task(task_id, child.name()).await {
                return DelegateResult {
                    agent: spec.agent.clone(),
                    result: None,
                    completion: None,
                    error: Some(format!("task claim failed: {e}")),
                    warning: None,
                };
            }
        }

        if let Some(notifier) = &self.options_snapshot.event_notifier {
            notifier(&self.ctx, AGENT_START, child.name(), &Value::Null);
        }
        let child_ctx = self.ctx.child(child.name().to_string());
        let run_result = child.run(child_ctx).await;
        if let Some(notifier) = &self.options_snapshot.event_notifier {
            notifier(&self.ctx, AGENT_END, child.name(), &Value::Null);
        }

        let mut warning = None;
        let completion = child.completion_result();
        let (reply_text, completion_out) = match run_result {
            Ok(msg) => (Some(msg.text()), completion),
            Err(RunError::MaxIterationsExceeded) => {
                let synthetic = CompletionResult {
                    status: CompletionStatus::Failed,
                    summary: "exhausted max iterations without calling task_complete".to_string(),
                    files_modified: None,
                    tests_run: None,
                    caveats: Some("Iteration limit reached before the agent called task_complete.".to_string()),
                };
                (None, Some(completion.unwrap_or(synthetic)))
            }
            Err(e) => {
                return DelegateResult { agent: spec.agent.clone(), result: None, completion: None, error: Some(e.to_string()), warning: None };
            }
        };

        // Step 13: CompletionResult summary wins, then status+caveats, then the
        // truncated reply text. Only a *failed* completion is worth a reflection
        // note (step 12) -- a synthesized iteration-exhaustion result is always
        // failed, so this also covers step 10 without a separate branch.
        let result_text = match &completion_out {
            Some(c) if !c.summary.trim().is_empty() => Some(c.summary.clone()),
            Some(c) => Some(match &c.caveats {
                Some(caveats) if !caveats.trim().is_empty() => format!("{}: {}", c.status, caveats),
                _ => c.status.to_string(),
            }),
            None => reply_text.map(|t| truncate_chars(&t, 2000)),
        };

        if let Some(c) = &completion_out {
            if c.status == CompletionStatus::Failed {
                if let Some(dir) = &self.options_snapshot.reflection_dir {
                    let note = loom_runtime::ReflectionNote {
                        agent: child.name().to_string(),
                        task: spec.task.clone(),
                        summary: c.summary.clone(),
                        caveats: c.caveats.clone(),
                        files_modified: c.files_modified.clone().unwrap_or_default(),
                    };
                    if let Err(e) = loom_runtime::write_reflection_note(dir, &note) {
                        warning = Some(format!("failed to write reflection note: {e}"));
                    }
                }
            }
        }

        if let (Some(task_id), Some(board)) = (&spec.task_id, &self.options_snapshot.task_board) {
            let status = completion_out.as_ref().map(|c| c.status.to_string()).unwrap_or_else(|| "completed".to_string());
            if let Err(e) = board.update_task_status(task_id, &status).await {
                warning = Some(match warning {
                    Some(w) => format!("{w}; task status update failed: {e}"),
                    None => format!("task status update failed: {e}"),
                });
            }
        }

        DelegateResult { agent: spec.agent, result: result_text, completion: completion_out, error: None, warning }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate"
    }

    fn description(&self) -> &str {
        "Delegate one or more tasks to named sub-agents. Tasks run concurrently; a failure in one \
         does not cancel the others."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "agent": { "type": "string" },
                            "task": { "type": "string" },
                            "context": { "type": "string" },
                            "task_id": { "type": "string" }
                        },
                        "required": ["agent", "task"]
                    }
                }
            },
            "required": ["tasks"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: DelegateInput = match serde_json::from_value(call.args.clone()) {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        if input.tasks.is_empty() {
            return ToolOutput::ok(&call.id, "[]");
        }
        if let Some(bad) = input.tasks.iter().find(|t| t.agent.eq_ignore_ascii_case(&self.self_config_name)) {
            return ToolOutput::err(&call.id, format!("self-delegation rejected: {} cannot delegate to itself", bad.agent));
        }
        if self.depth >= self.options_snapshot.max_delegation_depth {
            return ToolOutput::err(
                &call.id,
                format!("delegation depth limit reached: depth {} >= max {}", self.depth, self.options_snapshot.max_delegation_depth),
            );
        }

        let results = futures::future::join_all(input.tasks.into_iter().map(|spec| self.run_one(spec))).await;
        match serde_json::to_string(&results) {
            Ok(s) => ToolOutput::ok(&call.id, s),
            Err(e) => ToolOutput::err(&call.id, format!("failed to serialize delegation results: {e}")),
        }
    }
}

// ─── task_complete ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TaskCompleteInput {
    status: String,
    summary: String,
    #[serde(default)]
    files_modified: Option<Vec<String>>,
    #[serde(default)]
    tests_run: Option<Vec<String>>,
    #[serde(default)]
    caveats: Option<String>,
}

pub struct TaskCompleteTool {
    pub completion: Arc<CompletionCell>,
}

#[async_trait]
impl Tool for TaskCompleteTool {
    fn name(&self) -> &str {
        "task_complete"
    }

    fn description(&self) -> &str {
        "Report that the task is finished. Call exactly once, with a status of completed or failed \
         and a short summary."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": { "type": "string", "enum": ["completed", "failed"] },
                "summary": { "type": "string" },
                "files_modified": { "type": "array", "items": { "type": "string" } },
                "tests_run": { "type": "array", "items": { "type": "string" } },
                "caveats": { "type": "string" }
            },
            "required": ["status", "summary"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: TaskCompleteInput = match serde_json::from_value(call.args.clone()) {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        let status = match input.status.parse::<CompletionStatus>() {
            Ok(s) => s,
            Err(_) => return ToolOutput::err(&call.id, format!("invalid status `{}`: expected completed or failed", input.status)),
        };
        let result = CompletionResult {
            status,
            summary: input.summary,
            files_modified: input.files_modified,
            tests_run: input.tests_run,
            caveats: input.caveats,
        };
        if self.completion.set(result) {
            ToolOutput::ok(&call.id, "recorded")
        } else {
            ToolOutput::ok(&call.id, "ignored: task_complete was already called this run")
        }
    }
}

// ─── toolbox assembly ───────────────────────────────────────────────────────

pub fn build_orchestration_toolbox(
    registry: AgentRegistry,
    depth: u32,
    self_config_name: String,
    toolboxes_snapshot: Vec<Arc<dyn ToolBox>>,
    options_snapshot: AgentOptions,
    ctx: RunContext,
) -> Arc<dyn ToolBox> {
    let list_agents = Arc::new(ListAgentsTool { registry: registry.clone(), self_config_name: self_config_name.clone() }) as Arc<dyn Tool>;
    let delegate = Arc::new(DelegateTool { registry, depth, self_config_name, toolboxes_snapshot, options_snapshot, ctx }) as Arc<dyn Tool>;
    Arc::new(StaticToolBox::new(vec![list_agents, delegate]))
}

pub fn build_completion_toolbox(completion: Arc<CompletionCell>) -> Arc<dyn ToolBox> {
    Arc::new(StaticToolBox::new(vec![Arc::new(TaskCompleteTool { completion }) as Arc<dyn Tool>]))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
