// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod reflection;
mod shared;
mod task_board;

pub use reflection::{
    read_relevant as read_relevant_reflections, read_relevant_capped as read_relevant_reflections_capped,
    write_note as write_reflection_note, ReflectionNote, DEFAULT_MAX_BYTES as REFLECTION_DEFAULT_MAX_BYTES,
    DEFAULT_MAX_FILES as REFLECTION_DEFAULT_MAX_FILES,
};
pub use shared::Shared;
pub use task_board::{InMemoryTaskBoard, TaskBoard};
