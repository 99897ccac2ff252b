// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use loom_runtime::Shared;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;

/// A registry record: the name it is spawned under and a short description
/// surfaced to other agents via `list_agents`.
///
/// `list_agents`' JSON output uses PascalCase keys (`Name`/`Description`);
/// `rename_all` here keeps that wire shape without the fields themselves
/// reading oddly everywhere else `Entry` is used in Rust code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Entry {
    pub name: String,
    pub description: String,
}

type Factory = Arc<dyn Fn() -> Agent + Send + Sync>;

/// Thread-safe mapping from config-name to a factory producing fresh agent
/// instances. Shared across the whole delegation tree.
#[derive(Clone)]
pub struct AgentRegistry {
    entries: Shared<Entry>,
    factories: Arc<Mutex<HashMap<String, Factory>>>,
    instance_counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self { entries: Shared::empty(), factories: Arc::new(Mutex::new(HashMap::new())), instance_counters: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn register(&self, name: impl Into<String>, description: impl Into<String>, factory: impl Fn() -> Agent + Send + Sync + 'static) {
        let name = name.into();
        let description = description.into();
        self.factories.lock().unwrap().insert(name.clone(), Arc::new(factory));

        let mut entries: Vec<Entry> = self.entries.get().iter().filter(|e| e.name != name).cloned().collect();
        entries.push(Entry { name, description });
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        self.entries.set(entries);
    }

    pub fn get(&self, name: &str) -> Option<Entry> {
        self.entries.get().iter().find(|e| e.name == name).cloned()
    }

    /// All entries, sorted by name.
    pub fn list(&self) -> Vec<Entry> {
        self.entries.get().to_vec()
    }

    /// Monotonic per-config-name counter starting at 1, used to mint unique
    /// instance names (`coder-3`) while preserving the config-name.
    pub fn next_id(&self, config_name: &str) -> u64 {
        let mut counters = self.instance_counters.lock().unwrap();
        let counter = counters.entry(config_name.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Construct a new agent instance from the factory registered under
    /// `name`, at the given delegation `depth`. Returns `(None, false)` if
    /// no factory is registered under `name`.
    pub fn spawn(&self, name: &str, depth: u32) -> (Option<Agent>, bool) {
        let factory = {
            let factories = self.factories.lock().unwrap();
            match factories.get(name) {
                Some(f) => f.clone(),
                None => return (None, false),
            }
        };
        let mut agent = factory();
        let id = self.next_id(name);
        agent.set_config_name(name.to_string());
        agent.set_instance_name(format!("{name}-{id}"));
        agent.set_depth(depth);
        (Some(agent), true)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use loom_model::ScriptedMockCompleter;

    use super::*;
    use crate::agent::AgentBuilder;

    fn make_agent() -> Agent {
        AgentBuilder::new("coder", Arc::new(ScriptedMockCompleter::always_text("hi"))).build()
    }

    #[test]
    fn register_then_get_returns_entry() {
        let reg = AgentRegistry::new();
        reg.register("coder", "writes code", make_agent);
        assert_eq!(reg.get("coder").unwrap().description, "writes code");
    }

    #[test]
    fn list_is_sorted_by_name() {
        let reg = AgentRegistry::new();
        reg.register("zeta", "z", make_agent);
        reg.register("alpha", "a", make_agent);
        let names: Vec<String> = reg.list().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn re_registering_same_name_replaces_entry() {
        let reg = AgentRegistry::new();
        reg.register("coder", "v1", make_agent);
        reg.register("coder", "v2", make_agent);
        assert_eq!(reg.list().len(), 1);
        assert_eq!(reg.get("coder").unwrap().description, "v2");
    }

    #[test]
    fn next_id_is_monotonic_per_config_name() {
        let reg = AgentRegistry::new();
        assert_eq!(reg.next_id("coder"), 1);
        assert_eq!(reg.next_id("coder"), 2);
        assert_eq!(reg.next_id("reviewer"), 1);
        assert_eq!(reg.next_id("coder"), 3);
    }

    #[test]
    fn spawn_unknown_name_reports_not_found() {
        let reg = AgentRegistry::new();
        let (agent, found) = reg.spawn("ghost", 1);
        assert!(!found);
        assert!(agent.is_none());
    }

    #[test]
    fn spawn_mints_unique_instance_name_and_preserves_config_name() {
        let reg = AgentRegistry::new();
        reg.register("coder", "writes code", make_agent);
        let (first, found1) = reg.spawn("coder", 1);
        let (second, found2) = reg.spawn("coder", 1);
        assert!(found1 && found2);
        let first = first.unwrap();
        let second = second.unwrap();
        assert_ne!(first.name(), second.name());
        assert_eq!(first.config_name(), "coder");
        assert_eq!(second.config_name(), "coder");
        assert_eq!(first.depth(), 1);
    }
}
