//! Common data & logic shared across the compiler
//! (e.g. AST, value types).
pub mod ast;

use serde::{Deserialize, Serialize};

/// Numeric type of an operand, local, constant or memory element.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    Int,
    Float,
    Float64,
}

impl ValueType {
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int)
    }

    pub const fn is_float(self) -> bool {
        !self.is_integer()
    }

    pub const fn is_float64(self) -> bool {
        matches!(self, Self::Float64)
    }
}

/// A compile-time known numeric value.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    Int(i32),
    Float(f32),
    Float64(f64),
}

impl Value {
    pub const fn value_type(self) -> ValueType {
        match self {
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Float64(_) => ValueType::Float64,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Self::Int(i) => i == 0,
            Self::Float(f) => f == 0.0,
            Self::Float64(f) => f == 0.0,
        }
    }

    /// Zero of the given type.
    pub const fn zero(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Int => Self::Int(0),
            ValueType::Float => Self::Float(0.0),
            ValueType::Float64 => Self::Float64(0.0),
        }
    }

    /// Convert the value to another type, the way a cast instruction would.
    #[allow(clippy::cast_possible_truncation)]
    pub fn cast(self, value_type: ValueType) -> Self {
        match (self, value_type) {
            (Self::Int(i), ValueType::Float) => Self::Float(i as f32),
            (Self::Int(i), ValueType::Float64) => Self::Float64(f64::from(i)),
            (Self::Float(f), ValueType::Int) => Self::Int(f as i32),
            (Self::Float(f), ValueType::Float64) => Self::Float64(f64::from(f)),
            (Self::Float64(f), ValueType::Int) => Self::Int(f as i32),
            (Self::Float64(f), ValueType::Float) => Self::Float(f as f32),
            (value, _) => value,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Int(0)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            // keep the fractional part so the text re-parses as a float
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Float64(v) => write!(f, "{v:?}f64"),
        }
    }
}
