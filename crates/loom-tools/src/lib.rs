// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod tool;
pub mod toolbox;

pub use tool::{OutputCategory, Tool, ToolCall, ToolOutput};
pub use toolbox::{add_toolbox, declarations, execute, lookup, StaticToolBox, ToolBox, ToolBoxId};
