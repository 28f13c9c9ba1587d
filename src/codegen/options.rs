use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::memory::MemoryItem;

/// How the external scheduler lays out audio buffer processing.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BufferStrategy {
    #[default]
    Loop,
    Unrolled,
}

/// Options shared by every compiled code block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    pub starting_memory_word_address: u32,
    pub memory_size_bytes: u32,
    /// Memory published before compilation, keyed `module.name`.
    pub global_data_structures: BTreeMap<String, MemoryItem>,
    pub include_ast: bool,
    pub disable_shared_memory: bool,
    pub buffer_size: u32,
    pub buffer_strategy: BufferStrategy,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            starting_memory_word_address: 0,
            memory_size_bytes: 65536,
            global_data_structures: BTreeMap::new(),
            include_ast: false,
            disable_shared_memory: false,
            buffer_size: 128,
            buffer_strategy: BufferStrategy::Loop,
        }
    }
}
