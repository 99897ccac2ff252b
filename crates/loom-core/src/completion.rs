// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// The structured outcome of one agent run, reported by exactly one
/// `task_complete` tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResult {
    pub status: CompletionStatus,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_modified: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_run: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caveats: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Completed,
    Failed,
}

impl std::str::FromStr for CompletionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A write-once cell for [`CompletionResult`]. Tool calls within one
/// iteration run concurrently, so the single winning write must be safe
/// under concurrent attempts; every call after the first is a no-op.
#[derive(Default)]
pub struct CompletionCell(Mutex<Option<CompletionResult>>);

impl CompletionCell {
    pub fn new() -> Self {
        Self(Mutex::new(None))
    }

    /// Attempt to set the result. Returns `true` if this call won the race
    /// and the result was stored; `false` if a result was already present.
    pub fn set(&self, result: CompletionResult) -> bool {
        let mut guard = self.0.lock().unwrap();
        if guard.is_some() {
            false
        } else {
            *guard = Some(result);
            true
        }
    }

    pub fn get(&self) -> Option<CompletionResult> {
        self.0.lock().unwrap().clone()
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().unwrap().is_some()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: CompletionStatus) -> CompletionResult {
        CompletionResult { status, summary: "done".into(), files_modified: None, tests_run: None, caveats: None }
    }

    #[test]
    fn first_set_wins() {
        let cell = CompletionCell::new();
        assert!(cell.set(result(CompletionStatus::Completed)));
        assert!(!cell.set(result(CompletionStatus::Failed)));
        assert_eq!(cell.get().unwrap().status, CompletionStatus::Completed);
    }

    #[test]
    fn unset_cell_reports_not_set() {
        let cell = CompletionCell::new();
        assert!(!cell.is_set());
        assert!(cell.get().is_none());
    }

    #[test]
    fn status_parses_from_str() {
        assert_eq!("completed".parse::<CompletionStatus>().unwrap(), CompletionStatus::Completed);
        assert_eq!("failed".parse::<CompletionStatus>().unwrap(), CompletionStatus::Failed);
        assert!("bogus".parse::<CompletionStatus>().is_err());
    }

    #[test]
    fn set_is_safe_under_concurrent_attempts() {
        use std::sync::Arc;
        use std::thread;

        let cell = Arc::new(CompletionCell::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cell = cell.clone();
            handles.push(thread::spawn(move || {
                cell.set(CompletionResult {
                    status: CompletionStatus::Completed,
                    summary: format!("from {i}"),
                    files_modified: None,
                    tests_run: None,
                    caveats: None,
                })
            }));
        }
        let wins: usize = handles.into_iter().map(|h| h.join().unwrap() as usize).sum();
        assert_eq!(wins, 1);
    }
}
