//! Abstract operand stack used for static validation.
//!
//! Items describe what is known about a runtime value at compile time:
//! its type and whether it is proven non-zero or a safe memory address.

use crate::common::ValueType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackItem {
    pub value_type: ValueType,
    pub is_non_zero: bool,
    pub is_safe_memory_address: bool,
}

impl StackItem {
    pub const fn of(value_type: ValueType) -> Self {
        Self {
            value_type,
            is_non_zero: false,
            is_safe_memory_address: false,
        }
    }

    pub const fn int() -> Self {
        Self::of(ValueType::Int)
    }

    pub const fn non_zero(self) -> Self {
        Self {
            is_non_zero: true,
            ..self
        }
    }

    pub const fn with_non_zero(self, is_non_zero: bool) -> Self {
        Self {
            is_non_zero,
            ..self
        }
    }

    pub const fn safe_address(self) -> Self {
        Self {
            is_safe_memory_address: true,
            ..self
        }
    }

    pub const fn is_integer(&self) -> bool {
        self.value_type.is_integer()
    }
}

impl std::fmt::Display for StackItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value_type)?;

        if self.is_non_zero {
            write!(f, " nonzero")?;
        }

        if self.is_safe_memory_address {
            write!(f, " safe")?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperandStack {
    items: Vec<StackItem>,
}

impl OperandStack {
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, item: StackItem) {
        self.items.push(item);
    }

    pub fn pop(&mut self) -> Option<StackItem> {
        self.items.pop()
    }

    /// Top `count` items without removing them, bottom first.
    pub fn peek(&self, count: usize) -> Option<&[StackItem]> {
        let start = self.items.len().checked_sub(count)?;
        Some(&self.items[start..])
    }

    pub fn top(&self) -> Option<&StackItem> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn truncate(&mut self, depth: usize) {
        self.items.truncate(depth);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &StackItem> {
        self.items.iter()
    }
}

impl Extend<StackItem> for OperandStack {
    fn extend<T: IntoIterator<Item = StackItem>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_is_bottom_first() {
        let mut stack = OperandStack::new();
        stack.push(StackItem::int());
        stack.push(StackItem::of(ValueType::Float));

        assert_eq!(
            stack.peek(2),
            Some(&[StackItem::int(), StackItem::of(ValueType::Float)][..])
        );
        assert_eq!(stack.peek(3), None);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_item_display() {
        assert_eq!(StackItem::int().non_zero().to_string(), "int nonzero");
        assert_eq!(StackItem::int().safe_address().to_string(), "int safe");
        assert_eq!(StackItem::of(ValueType::Float64).to_string(), "float64");
    }
}
