//! Word-aligned memory allocator for module-scoped declarations.
//!
//! Addresses are handed out append-only, in declaration order,
//! and never change once assigned.

use serde::{Deserialize, Serialize};

use crate::common::{Value, ValueType};

use super::error::ErrorCode;

pub const WORD_SIZE_BYTES: u32 = 4;

/// One allocated memory declaration (scalar or buffer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    pub id: String,
    pub number_of_elements: u32,
    /// Width of a single element in bytes (1, 2, 4 or 8).
    pub element_word_size: u32,
    /// Words occupied, including alignment padding.
    pub word_aligned_size: u32,
    pub word_aligned_address: u32,
    pub byte_address: u32,
    pub is_integer: bool,
    pub is_float64: bool,
    pub is_pointer: bool,
    pub is_pointing_to_integer: bool,
    pub is_pointing_to_float64: bool,
    pub is_pointing_to_pointer: bool,
    pub is_unsigned: bool,
    pub default: Value,
}

impl MemoryItem {
    pub const fn value_type(&self) -> ValueType {
        if self.is_integer {
            ValueType::Int
        } else if self.is_float64 {
            ValueType::Float64
        } else {
            ValueType::Float
        }
    }

    pub const fn pointee_type(&self) -> ValueType {
        if self.is_pointing_to_integer {
            ValueType::Int
        } else if self.is_pointing_to_float64 {
            ValueType::Float64
        } else {
            ValueType::Float
        }
    }

    /// Byte address of the last element.
    pub const fn end_byte_address(&self) -> u32 {
        self.byte_address + self.number_of_elements.saturating_sub(1) * self.element_word_size
    }
}

/// Element layout derived from a declaration mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementKind {
    pub value_type: ValueType,
    pub width: u32,
    pub is_unsigned: bool,
    pub pointee: Option<Pointee>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pointee {
    pub value_type: ValueType,
    pub is_pointer: bool,
}

impl ElementKind {
    pub const fn scalar(value_type: ValueType) -> Self {
        Self {
            value_type,
            width: if value_type.is_float64() { 8 } else { 4 },
            is_unsigned: false,
            pointee: None,
        }
    }

    pub const fn narrow(width: u32, is_unsigned: bool) -> Self {
        Self {
            value_type: ValueType::Int,
            width,
            is_unsigned,
            pointee: None,
        }
    }

    pub const fn pointer(pointee: ValueType, is_pointing_to_pointer: bool) -> Self {
        Self {
            value_type: ValueType::Int,
            width: 4,
            is_unsigned: false,
            pointee: Some(Pointee {
                value_type: pointee,
                is_pointer: is_pointing_to_pointer,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryDeclaration {
    pub id: String,
    pub number_of_elements: u32,
    pub kind: ElementKind,
    pub default: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMap {
    starting_word_address: u32,
    items: Vec<MemoryItem>,
}

impl MemoryMap {
    pub const fn new(starting_word_address: u32) -> Self {
        Self {
            starting_word_address,
            items: Vec::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&MemoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn items(&self) -> &[MemoryItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<MemoryItem> {
        self.items
    }

    /// Words used by all allocations so far.
    pub fn word_size(&self) -> u32 {
        self.items.iter().map(|item| item.word_aligned_size).sum()
    }

    /// Assign the next free address to a declaration.
    ///
    /// 8-byte elements starting on an odd word get one padding word,
    /// charged to their `word_aligned_size`.
    pub fn allocate(
        &mut self,
        declaration: MemoryDeclaration,
        memory_size_bytes: u32,
    ) -> Result<&MemoryItem, ErrorCode> {
        let MemoryDeclaration {
            id,
            number_of_elements,
            kind,
            default,
        } = declaration;

        let word_aligned_address = self
            .starting_word_address
            .checked_add(self.word_size())
            .ok_or(ErrorCode::MemoryOutOfBounds)?;
        let data_bytes = number_of_elements
            .checked_mul(kind.width)
            .ok_or(ErrorCode::MemoryOutOfBounds)?;
        let data_words = data_bytes.div_ceil(WORD_SIZE_BYTES);
        let padding = u32::from(kind.width == 8 && word_aligned_address % 2 == 1);

        let byte_address = word_aligned_address
            .checked_add(padding)
            .and_then(|address| address.checked_mul(WORD_SIZE_BYTES))
            .ok_or(ErrorCode::MemoryOutOfBounds)?;
        let end = u64::from(byte_address) + u64::from(data_words) * u64::from(WORD_SIZE_BYTES);

        if end > u64::from(memory_size_bytes) {
            return Err(ErrorCode::MemoryOutOfBounds);
        }

        let pointee = kind.pointee;

        self.items.push(MemoryItem {
            id,
            number_of_elements,
            element_word_size: kind.width,
            word_aligned_size: data_words + padding,
            word_aligned_address,
            byte_address,
            is_integer: kind.value_type.is_integer(),
            is_float64: kind.value_type.is_float64(),
            is_pointer: pointee.is_some(),
            is_pointing_to_integer: pointee.is_some_and(|p| p.value_type.is_integer()),
            is_pointing_to_float64: pointee.is_some_and(|p| p.value_type.is_float64()),
            is_pointing_to_pointer: pointee.is_some_and(|p| p.is_pointer),
            is_unsigned: kind.is_unsigned,
            default: default.cast(kind.value_type),
        });

        self.items.last().ok_or(ErrorCode::MemoryOutOfBounds)
    }
}
