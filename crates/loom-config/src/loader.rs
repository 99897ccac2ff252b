// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::RuntimeConfig;

/// Load [`RuntimeConfig`] from a YAML file at `path`, if given. With `None`,
/// returns the default configuration.
pub fn load(path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    let Some(path) = path else {
        return Ok(RuntimeConfig::default());
    };
    debug!(path = %path.display(), "loading runtime config");
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let cfg: RuntimeConfig =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
