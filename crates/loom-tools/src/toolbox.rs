// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{Tool, ToolCall, ToolOutput};

/// Opaque identity for a [`ToolBox`], used to deduplicate toolbox lists by
/// identity rather than by contents. Two clones of the same `Arc<dyn ToolBox>`
/// share an id; two independently constructed toolboxes never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToolBoxId(u64);

impl ToolBoxId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ToolBoxId {
    fn default() -> Self {
        Self::new()
    }
}

/// A named-tool-to-handler map held by an agent.
///
/// An agent holds an ordered, identity-deduplicated list of toolboxes.
/// Lookup during tool execution walks the list in order and returns the
/// first match; tool-declaration collection also walks in order but
/// de-duplicates by tool *name* rather than toolbox identity.
pub trait ToolBox: Send + Sync {
    fn id(&self) -> ToolBoxId;

    /// All tools in this toolbox, in a stable order.
    fn tools(&self) -> &[Arc<dyn Tool>];

    fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools().iter().find(|t| t.name() == name).cloned()
    }
}

/// A fixed list of tools wrapped in a single toolbox with a freshly
/// allocated identity.
pub struct StaticToolBox {
    id: ToolBoxId,
    tools: Vec<Arc<dyn Tool>>,
}

impl StaticToolBox {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { id: ToolBoxId::new(), tools }
    }
}

impl ToolBox for StaticToolBox {
    fn id(&self) -> ToolBoxId {
        self.id
    }

    fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }
}

/// Insert `toolbox` into `list` unless a toolbox with the same identity is
/// already present. Preserves the order of first appearance.
pub fn add_toolbox(list: &mut Vec<Arc<dyn ToolBox>>, toolbox: Arc<dyn ToolBox>) {
    if !list.iter().any(|t| t.id() == toolbox.id()) {
        list.push(toolbox);
    }
}

/// Look up `name` across `list`, first match wins.
pub fn lookup(list: &[Arc<dyn ToolBox>], name: &str) -> Option<Arc<dyn Tool>> {
    list.iter().find_map(|tb| tb.get(name))
}

/// Execute a call by walking `list` for the first matching tool.
pub async fn execute(list: &[Arc<dyn ToolBox>], call: &ToolCall) -> ToolOutput {
    match lookup(list, &call.name) {
        Some(tool) => tool.execute(call).await,
        None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
    }
}

/// Collect tool declarations by walking `list` in order, skipping duplicate
/// names (the second registration of a name never appears).
pub fn declarations(list: &[Arc<dyn ToolBox>]) -> Vec<Arc<dyn Tool>> {
    let mut seen = HashMap::new();
    let mut out = Vec::new();
    for toolbox in list {
        for tool in toolbox.tools() {
            if seen.insert(tool.name().to_string(), ()).is_none() {
                out.push(tool.clone());
            }
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
