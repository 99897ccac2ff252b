// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

/// Replace every character outside `[A-Za-z0-9_-]` with `-`, so an agent
/// name can never escape the configured reflection directory or collide
/// with filesystem-reserved characters.
fn sanitize(name: &str) -> String {
    name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' }).collect()
}

/// A single failed-delegation reflection note.
pub struct ReflectionNote {
    pub agent: String,
    pub task: String,
    pub summary: String,
    pub caveats: Option<String>,
    pub files_modified: Vec<String>,
}

/// Write one note to `dir`, named `<sanitized-agent>-YYYYMMDD-HHMMSS.md`.
/// Best-effort: callers treat a write failure as non-fatal to the
/// delegation that triggered it, but still surface the error for logging.
pub fn write_note(dir: &Path, note: &ReflectionNote) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let now = Utc::now();
    let filename = format!("{}-{}.md", sanitize(&note.agent), now.format("%Y%m%d-%H%M%S"));
    let path = dir.join(filename);

    let mut body = format!(
        "# Reflection: {}\n\n**Timestamp**: {}\n\n## Task\n{}\n\n## Summary\n{}\n",
        note.agent,
        now.to_rfc3339(),
        note.task,
        note.summary,
    );
    if let Some(caveats) = &note.caveats {
        body.push_str(&format!("\n## Caveats\n{caveats}\n"));
    }
    if !note.files_modified.is_empty() {
        body.push_str("\n## Files Modified\n");
        for f in &note.files_modified {
            body.push_str(&format!("- {f}\n"));
        }
    }

    std::fs::write(&path, body)?;
    Ok(path)
}

/// Default cap on the number of notes `read_relevant` returns, per the
/// on-disk reflection format's read-path contract.
pub const DEFAULT_MAX_FILES: usize = 5;
/// Default cap on total bytes `read_relevant` returns.
pub const DEFAULT_MAX_BYTES: usize = 32 * 1024;

/// Words of length >= 4, lowercased, used for the keyword-overlap heuristic.
fn significant_words(text: &str) -> std::collections::HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Read up to `DEFAULT_MAX_FILES` `.md` notes (capped at `DEFAULT_MAX_BYTES`
/// total) from `dir` whose text shares at least two significant words with
/// `task`, newest-first by modification time. Missing directories yield an
/// empty result rather than an error.
pub fn read_relevant(dir: &Path, task: &str) -> Vec<String> {
    read_relevant_capped(dir, task, DEFAULT_MAX_FILES, DEFAULT_MAX_BYTES)
}

/// As [`read_relevant`], but with caller-supplied caps — lets a deployment
/// tighten (or loosen) the read-path contract's default 5-file/32 KiB limit
/// without changing the on-disk format itself.
pub fn read_relevant_capped(dir: &Path, task: &str, max_files: usize, max_bytes: usize) -> Vec<String> {
    let task_words = significant_words(task);
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut candidates: Vec<(std::time::SystemTime, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("md"))
        .filter_map(|e| e.metadata().ok().and_then(|m| m.modified().ok()).map(|t| (t, e.path())))
        .collect();
    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    let mut out = Vec::new();
    let mut total_bytes = 0usize;
    for (_, path) in candidates {
        if out.len() >= max_files || total_bytes >= max_bytes {
            break;
        }
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read reflection note");
                continue;
            }
        };
        let overlap = significant_words(&text).intersection(&task_words).count();
        if overlap < 2 {
            continue;
        }
        let remaining = max_bytes.saturating_sub(total_bytes);
        let truncated: String = text.chars().take(remaining).collect();
        total_bytes += truncated.len();
        out.push(truncated);
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn note(agent: &str, task: &str, summary: &str) -> ReflectionNote {
        ReflectionNote { agent: agent.into(), task: task.into(), summary: summary.into(), caveats: None, files_modified: vec![] }
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize("coder/3 weird!"), "coder-3-weird-");
    }

    #[test]
    fn write_note_creates_markdown_file_with_sections() {
        let dir = tempfile::tempdir().unwrap();
        let n = note("coder", "fix the parser bug", "fixed it");
        let path = write_note(dir.path(), &n).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("# Reflection: coder"));
        assert!(text.contains("## Task"));
        assert!(text.contains("## Summary"));
        assert!(!text.contains("## Caveats"));
    }

    #[test]
    fn write_note_includes_caveats_and_files_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let mut n = note("coder", "task", "summary");
        n.caveats = Some("didn't run tests".into());
        n.files_modified = vec!["src/lib.rs".into()];
        let path = write_note(dir.path(), &n).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("## Caveats\ndidn't run tests"));
        assert!(text.contains("## Files Modified\n- src/lib.rs"));
    }

    #[test]
    fn read_relevant_matches_on_keyword_overlap() {
        let dir = tempfile::tempdir().unwrap();
        write_note(dir.path(), &note("coder", "fix the parser tokenizer bug", "done")).unwrap();
        let found = read_relevant(dir.path(), "investigate parser tokenizer regression");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn read_relevant_skips_notes_with_insufficient_overlap() {
        let dir = tempfile::tempdir().unwrap();
        write_note(dir.path(), &note("coder", "unrelated topic entirely", "done")).unwrap();
        let found = read_relevant(dir.path(), "investigate parser tokenizer regression");
        assert!(found.is_empty());
    }

    #[test]
    fn read_relevant_on_missing_dir_returns_empty() {
        let found = read_relevant(Path::new("/nonexistent/path/xyz"), "anything here");
        assert!(found.is_empty());
    }

    #[test]
    fn read_relevant_capped_honors_a_tighter_file_cap() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..8 {
            write_note(dir.path(), &note(&format!("coder{i}"), "parser tokenizer bug task", "done")).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let found = read_relevant_capped(dir.path(), "parser tokenizer bug task", 2, DEFAULT_MAX_BYTES);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn read_relevant_caps_at_max_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..8 {
            write_note(dir.path(), &note(&format!("coder{i}"), "parser tokenizer bug task", "done")).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let found = read_relevant(dir.path(), "parser tokenizer bug task");
        assert_eq!(found.len(), DEFAULT_MAX_FILES);
    }
}
