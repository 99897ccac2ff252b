// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

/// External collaborator that tracks delegated task claims and their final
/// status. A non-nil claim error aborts that task's delegation before the
/// child even runs; a non-nil status-update error is recorded as a warning
/// on the delegation result but does not undo the child's completion.
#[async_trait]
pub trait TaskBoard: Send + Sync {
    async fn claim_task(&self, task_id: &str, agent_instance_name: &str) -> anyhow::Result<()>;
    async fn update_task_status(&self, task_id: &str, status: &str) -> anyhow::Result<()>;
}

/// In-process test double. Claims succeed unless the task id was already
/// claimed by a different agent instance; status updates are recorded and
/// retrievable for assertions.
#[derive(Default)]
pub struct InMemoryTaskBoard {
    claims: Mutex<HashMap<String, String>>,
    statuses: Mutex<HashMap<String, String>>,
}

impl InMemoryTaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_of(&self, task_id: &str) -> Option<String> {
        self.statuses.lock().unwrap().get(task_id).cloned()
    }

    pub fn claimant_of(&self, task_id: &str) -> Option<String> {
        self.claims.lock().unwrap().get(task_id).cloned()
    }
}

#[async_trait]
impl TaskBoard for InMemoryTaskBoard {
    async fn claim_task(&self, task_id: &str, agent_instance_name: &str) -> anyhow::Result<()> {
        let mut claims = self.claims.lock().unwrap();
        match claims.get(task_id) {
            Some(existing) if existing != agent_instance_name => {
                anyhow::bail!("task {task_id} already claimed by {existing}")
            }
            _ => {
                claims.insert(task_id.to_string(), agent_instance_name.to_string());
                Ok(())
            }
        }
    }

    async fn update_task_status(&self, task_id: &str, status: &str) -> anyhow::Result<()> {
        self.statuses.lock().unwrap().insert(task_id.to_string(), status.to_string());
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_then_update_round_trips() {
        let board = InMemoryTaskBoard::new();
        board.claim_task("t1", "worker-1").await.unwrap();
        board.update_task_status("t1", "completed").await.unwrap();
        assert_eq!(board.claimant_of("t1").as_deref(), Some("worker-1"));
        assert_eq!(board.status_of("t1").as_deref(), Some("completed"));
    }

    #[tokio::test]
    async fn reclaiming_by_same_agent_is_allowed() {
        let board = InMemoryTaskBoard::new();
        board.claim_task("t1", "worker-1").await.unwrap();
        assert!(board.claim_task("t1", "worker-1").await.is_ok());
    }

    #[tokio::test]
    async fn claiming_by_a_different_agent_fails() {
        let board = InMemoryTaskBoard::new();
        board.claim_task("t1", "worker-1").await.unwrap();
        let result = board.claim_task("t1", "worker-2").await;
        assert!(result.is_err());
    }
}
