//! Declarative per-instruction preconditions, checked before an
//! instruction is allowed to touch the context.

use crate::common::{ast::AstLine, ValueType};

use super::{
    context::{module::BlockType, ModuleContext},
    error::{ErrorCode, FallableAction},
    stack::StackItem,
};

/// Where an instruction may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// No block open at all.
    TopLevel,
    Module,
    Function,
    ModuleOrFunction,
    /// Inside a `block`, `loop` or `if`.
    Block,
    Constants,
    Map,
    Init,
}

impl Scope {
    fn is_satisfied(self, module_context: &ModuleContext) -> bool {
        let blocks = &module_context.blocks;

        match self {
            Self::TopLevel => blocks.is_empty(),
            Self::Module => blocks.contains(BlockType::Module),
            Self::Function => blocks.contains(BlockType::Function),
            Self::ModuleOrFunction => {
                blocks.contains(BlockType::Module) || blocks.contains(BlockType::Function)
            }
            Self::Block => {
                blocks.contains(BlockType::Block)
                    || blocks.contains(BlockType::Loop)
                    || blocks.contains(BlockType::Condition)
            }
            Self::Constants => blocks.contains(BlockType::Constants),
            Self::Map => blocks.contains(BlockType::Map),
            Self::Init => blocks.contains(BlockType::Init),
        }
    }

    const fn violation(self) -> ErrorCode {
        match self {
            Self::TopLevel => ErrorCode::InvalidBlockNesting,
            _ => ErrorCode::InstructionInvalidOutsideBlock,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Int,
    Float,
    Any,
}

/// Type rule applied to the checked operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandRule {
    Any,
    Int,
    Float,
    /// All integers, or all floats of the same width.
    Matching,
    /// One kind per operand, deepest first.
    Positional(&'static [OperandKind]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSpec {
    pub scope: Option<Scope>,
    pub min_arguments: usize,
    pub operands: usize,
    pub operand_rule: OperandRule,
    pub allowed_in_constants: bool,
    pub allowed_in_map: bool,
}

impl ValidationSpec {
    pub const NONE: Self = Self {
        scope: None,
        min_arguments: 0,
        operands: 0,
        operand_rule: OperandRule::Any,
        allowed_in_constants: false,
        allowed_in_map: false,
    };

    pub const fn scope(scope: Scope) -> Self {
        Self {
            scope: Some(scope),
            ..Self::NONE
        }
    }

    pub const fn arguments(self, min_arguments: usize) -> Self {
        Self {
            min_arguments,
            ..self
        }
    }

    pub const fn operands(self, operands: usize, operand_rule: OperandRule) -> Self {
        Self {
            operands,
            operand_rule,
            ..self
        }
    }

    pub const fn in_constants(self) -> Self {
        Self {
            allowed_in_constants: true,
            ..self
        }
    }

    pub const fn in_map(self) -> Self {
        Self {
            allowed_in_map: true,
            ..self
        }
    }
}

/// Check an instruction's preconditions without mutating anything.
pub fn validate(
    spec: &ValidationSpec,
    line: &AstLine,
    module_context: &ModuleContext,
) -> FallableAction {
    check(spec, line, module_context).map_err(|code| module_context.error(code, line))
}

fn check(
    spec: &ValidationSpec,
    line: &AstLine,
    module_context: &ModuleContext,
) -> Result<(), ErrorCode> {
    let blocks = &module_context.blocks;

    if blocks.contains(BlockType::Constants) && !spec.allowed_in_constants {
        return Err(ErrorCode::InstructionNotAllowedInConstantsBlock);
    }

    if blocks.contains(BlockType::Map) && !spec.allowed_in_map {
        return Err(ErrorCode::InstructionNotAllowedInMapBlock);
    }

    if let Some(scope) = spec.scope {
        if !scope.is_satisfied(module_context) {
            return Err(scope.violation());
        }
    }

    if line.arguments.len() < spec.min_arguments {
        return Err(ErrorCode::MissingArgument);
    }

    if spec.operands == 0 {
        return Ok(());
    }

    let operands = module_context
        .stack
        .peek(spec.operands)
        .ok_or(ErrorCode::InsufficientOperands)?;

    check_operands(operands, spec.operand_rule)
}

fn check_operands(operands: &[StackItem], rule: OperandRule) -> Result<(), ErrorCode> {
    match rule {
        OperandRule::Any => Ok(()),
        OperandRule::Int => operands
            .iter()
            .try_for_each(|item| check_kind(item, OperandKind::Int)),
        OperandRule::Float => operands
            .iter()
            .try_for_each(|item| check_kind(item, OperandKind::Float)),
        OperandRule::Matching => {
            let Some(first) = operands.first() else {
                return Ok(());
            };

            operands.iter().try_for_each(|item| {
                if item.is_integer() != first.is_integer() {
                    Err(ErrorCode::UnmatchingOperands)
                } else if item.value_type != first.value_type {
                    Err(ErrorCode::MixedFloatWidth)
                } else {
                    Ok(())
                }
            })
        }
        OperandRule::Positional(kinds) => operands
            .iter()
            .zip(kinds)
            .try_for_each(|(item, kind)| check_kind(item, *kind)),
    }
}

const fn check_kind(item: &StackItem, kind: OperandKind) -> Result<(), ErrorCode> {
    match kind {
        OperandKind::Int if !item.is_integer() => Err(ErrorCode::OnlyIntegers),
        OperandKind::Float if item.is_integer() => Err(ErrorCode::OnlyFloats),
        _ => Ok(()),
    }
}

/// Check that a value of type `actual` can be used where `expected` is required.
pub const fn expect_type(expected: ValueType, actual: ValueType) -> Result<(), ErrorCode> {
    match (expected, actual) {
        (ValueType::Int, ValueType::Int)
        | (ValueType::Float, ValueType::Float)
        | (ValueType::Float64, ValueType::Float64) => Ok(()),
        (ValueType::Int, _) => Err(ErrorCode::OnlyIntegers),
        (_, ValueType::Int) => Err(ErrorCode::OnlyFloats),
        _ => Err(ErrorCode::MixedFloatWidth),
    }
}
