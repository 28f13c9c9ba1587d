use serde::Serialize;
use thiserror::Error;

use crate::common::ast::AstLine;

use super::context::module::BlockType;

/// List of all errors that could possibly occur during code generation.
///
/// The discriminant is the stable numeric code reported to tooling.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::VariantArray,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum ErrorCode {
    InsufficientOperands,
    UnmatchingOperands,
    OnlyIntegers,
    OnlyFloats,
    MixedFloatWidth,
    MissingArgument,
    ExpectedIdentifier,
    ExpectedValue,
    UndeclaredIdentifier,
    DuplicateIdentifier,
    UnrecognisedInstruction,
    InstructionInvalidOutsideBlock,
    InstructionNotAllowedInConstantsBlock,
    InstructionNotAllowedInMapBlock,
    InvalidBlockNesting,
    MissingBlockStartInstruction,
    MissingBlockEndInstruction,
    MissingModuleId,
    StackExpectedZeroElements,
    DivisionByZero,
    DuplicateParameterName,
    ParamAfterFunctionBody,
    FunctionSignatureOverflow,
    InvalidType,
    TypeMismatch,
    UndeclaredFunction,
    MapKeyTypeMismatch,
    MissingElseBranch,
    DirectiveInvalidContext,
    MemoryOutOfBounds,
}

impl ErrorCode {
    pub const fn code(self) -> u16 {
        self as u16
    }
}

/// State of the compiler at the moment an error was raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub module: Option<String>,
    /// Operand stack, bottom first (e.g. `int nonzero`, `float64`).
    pub stack: Vec<String>,
    pub blocks: Vec<BlockType>,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code} ({number}){location}", number = .code.code(), location = describe_line(.line.as_ref()))]
pub struct CompileError {
    pub code: ErrorCode,
    /// Offending line; absent when the whole code block is at fault.
    pub line: Option<AstLine>,
    pub context: ContextSnapshot,
}

impl CompileError {
    pub fn line_number(&self) -> Option<usize> {
        self.line.as_ref().map(|line| line.line_number)
    }
}

fn describe_line(line: Option<&AstLine>) -> String {
    line.map_or_else(String::new, |line| {
        format!(" on line {}: `{line}`", line.line_number)
    })
}

pub type FallableAction = Result<(), CompileError>;

#[cfg(test)]
mod tests {
    use strum::VariantArray;

    use super::*;

    #[test]
    fn test_error_codes_are_numbered_in_order() {
        assert_eq!(ErrorCode::InsufficientOperands.code(), 0);
        assert_eq!(ErrorCode::DivisionByZero.code(), 19);
        assert_eq!(ErrorCode::MemoryOutOfBounds.code(), 29);

        assert!(ErrorCode::VARIANTS
            .iter()
            .enumerate()
            .all(|(index, code)| usize::from(code.code()) == index));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ErrorCode::StackExpectedZeroElements.to_string(),
            "STACK_EXPECTED_ZERO_ELEMENTS"
        );

        let error = CompileError {
            code: ErrorCode::DivisionByZero,
            line: Some(AstLine::internal(3, "div", vec![])),
            context: ContextSnapshot::default(),
        };

        assert_eq!(error.to_string(), "DIVISION_BY_ZERO (19) on line 3: `div`");
        assert_eq!(error.line_number(), Some(3));
    }
}
