//! The closed set of instructions, each with its validation
//! rules and its compiler.

use std::str::FromStr;

use tracing::trace;

use crate::common::{ast::AstLine, ValueType};

use super::{
    context::{ModuleContext, ProgramContext},
    error::{CompileError, ErrorCode, FallableAction},
    memory::ElementKind,
    validation::{self, OperandKind, OperandRule, Scope, ValidationSpec},
    wasm::Opcode,
};

mod arithmetic;
mod bitwise;
mod comparison;
mod consts;
mod control_flow;
mod conversion;
mod declarations;
mod functions;
mod map;
mod memory_access;
mod signals;
mod stack_ops;
mod structure;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::Display,
    strum::VariantArray,
)]
#[strum(serialize_all = "camelCase")]
pub enum Instruction {
    // region: structure
    Module,
    ModuleEnd,
    Function,
    Param,
    FunctionEnd,
    Call,
    Constants,
    ConstantsEnd,
    InitBlock,
    InitBlockEnd,
    SkipExecution,
    InitOnly,
    Wasm,
    // endregion

    // region: declarations
    Int,
    Float,
    #[strum(serialize = "float64")]
    Float64,
    #[strum(serialize = "int*")]
    IntPointer,
    #[strum(serialize = "int**")]
    IntPointerPointer,
    #[strum(serialize = "float*")]
    FloatPointer,
    #[strum(serialize = "float**")]
    FloatPointerPointer,
    #[strum(serialize = "float64*")]
    Float64Pointer,
    #[strum(serialize = "int[]")]
    IntBuffer,
    #[strum(serialize = "int8[]")]
    Int8Buffer,
    #[strum(serialize = "int8u[]")]
    Int8UnsignedBuffer,
    #[strum(serialize = "int16[]")]
    Int16Buffer,
    #[strum(serialize = "int16u[]")]
    Int16UnsignedBuffer,
    #[strum(serialize = "float[]")]
    FloatBuffer,
    #[strum(serialize = "float64[]")]
    Float64Buffer,
    #[strum(serialize = "int*[]")]
    IntPointerBuffer,
    #[strum(serialize = "float*[]")]
    FloatPointerBuffer,
    Local,
    LocalSet,
    // endregion

    // region: stack
    Push,
    Drop,
    Dup,
    Swap,
    ClearStack,
    // endregion

    // region: arithmetic, comparison, bitwise
    Add,
    Sub,
    Mul,
    Div,
    Remainder,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    GreaterOrEqualUnsigned,
    EqualToZero,
    And,
    Or,
    Xor,
    ShiftLeft,
    ShiftRight,
    ShiftRightUnsigned,
    Not,
    // endregion

    // region: conversion and math
    CastToInt,
    CastToFloat,
    #[strum(serialize = "castToFloat64")]
    CastToFloat64,
    Sqrt,
    Round,
    Abs,
    #[strum(serialize = "pow2")]
    Pow2,
    EnsureNonZero,
    // endregion

    // region: memory access
    Load,
    #[strum(serialize = "load8s")]
    Load8Signed,
    #[strum(serialize = "load8u")]
    Load8Unsigned,
    #[strum(serialize = "load16s")]
    Load16Signed,
    #[strum(serialize = "load16u")]
    Load16Unsigned,
    LoadFloat,
    #[strum(serialize = "loadFloat64")]
    LoadFloat64,
    Store,
    #[strum(serialize = "store8")]
    Store8,
    #[strum(serialize = "store16")]
    Store16,
    StoreBytes,
    // endregion

    // region: control flow
    Block,
    BlockEnd,
    Loop,
    LoopEnd,
    If,
    Else,
    IfEnd,
    Branch,
    BranchIfTrue,
    // endregion

    // region: signals
    RisingEdge,
    FallingEdge,
    HasChanged,
    BranchIfUnchanged,
    Cycle,
    // endregion

    // region: constants and maps
    Const,
    Use,
    MapBegin,
    Map,
    Default,
    MapEnd,
    // endregion
}

const MODULE: ValidationSpec = ValidationSpec::scope(Scope::Module);
const CODE: ValidationSpec = ValidationSpec::scope(Scope::ModuleOrFunction);
const TOP_LEVEL: ValidationSpec = ValidationSpec::scope(Scope::TopLevel);
const UNARY: ValidationSpec = CODE.operands(1, OperandRule::Any);
const UNARY_INT: ValidationSpec = CODE.operands(1, OperandRule::Int);
const BINARY_MATCHING: ValidationSpec = CODE.operands(2, OperandRule::Matching);
const BINARY_INT: ValidationSpec = CODE.operands(2, OperandRule::Int);

impl Instruction {
    #[allow(clippy::too_many_lines)]
    pub const fn validation(self) -> ValidationSpec {
        match self {
            Self::Module | Self::Function => TOP_LEVEL,
            Self::Constants => TOP_LEVEL.arguments(1),
            Self::ModuleEnd | Self::InitBlock | Self::SkipExecution | Self::InitOnly => MODULE,
            Self::Param => ValidationSpec::scope(Scope::Function).arguments(2),
            Self::FunctionEnd => ValidationSpec::scope(Scope::Function),
            Self::Call => CODE.arguments(1),
            Self::ConstantsEnd => ValidationSpec::scope(Scope::Constants).in_constants(),
            Self::InitBlockEnd => ValidationSpec::scope(Scope::Init),
            Self::Wasm | Self::ClearStack => CODE,

            Self::Int
            | Self::Float
            | Self::Float64
            | Self::IntPointer
            | Self::IntPointerPointer
            | Self::FloatPointer
            | Self::FloatPointerPointer
            | Self::Float64Pointer => MODULE,
            Self::IntBuffer
            | Self::Int8Buffer
            | Self::Int8UnsignedBuffer
            | Self::Int16Buffer
            | Self::Int16UnsignedBuffer
            | Self::FloatBuffer
            | Self::Float64Buffer
            | Self::IntPointerBuffer
            | Self::FloatPointerBuffer => MODULE.arguments(2),
            Self::Local => CODE.arguments(2),
            Self::LocalSet => UNARY.arguments(1),

            Self::Push => CODE.arguments(1),
            Self::Drop
            | Self::Dup
            | Self::EqualToZero
            | Self::CastToInt
            | Self::CastToFloat
            | Self::CastToFloat64
            | Self::Abs
            | Self::EnsureNonZero => UNARY,
            Self::Swap => CODE.operands(2, OperandRule::Any),

            Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Equal
            | Self::NotEqual
            | Self::GreaterThan
            | Self::GreaterOrEqual
            | Self::LessThan
            | Self::LessOrEqual => BINARY_MATCHING,
            Self::Remainder
            | Self::GreaterOrEqualUnsigned
            | Self::And
            | Self::Or
            | Self::Xor
            | Self::ShiftLeft
            | Self::ShiftRight
            | Self::ShiftRightUnsigned
            | Self::Store8
            | Self::Store16 => BINARY_INT,
            Self::Not
            | Self::Pow2
            | Self::Load
            | Self::Load8Signed
            | Self::Load8Unsigned
            | Self::Load16Signed
            | Self::Load16Unsigned
            | Self::LoadFloat
            | Self::LoadFloat64 => UNARY_INT,
            Self::Sqrt | Self::Round => CODE.operands(1, OperandRule::Float),
            Self::Store => CODE.operands(
                2,
                OperandRule::Positional(&[OperandKind::Int, OperandKind::Any]),
            ),
            Self::StoreBytes => CODE.arguments(1),

            Self::Block
            | Self::BlockEnd
            | Self::Loop
            | Self::LoopEnd
            | Self::Else
            | Self::IfEnd => CODE,
            Self::If => UNARY_INT,
            Self::Branch => ValidationSpec::scope(Scope::Block).arguments(1),
            Self::BranchIfTrue => ValidationSpec::scope(Scope::Block)
                .arguments(1)
                .operands(1, OperandRule::Int),

            Self::RisingEdge | Self::FallingEdge | Self::HasChanged => {
                MODULE.operands(1, OperandRule::Int)
            }
            Self::BranchIfUnchanged => MODULE.arguments(1).operands(1, OperandRule::Int),
            Self::Cycle => MODULE.operands(3, OperandRule::Int),

            Self::Const => ValidationSpec::NONE.arguments(2).in_constants(),
            Self::Use => ValidationSpec::NONE.arguments(1).in_constants(),
            Self::MapBegin => UNARY.arguments(1),
            Self::Map => ValidationSpec::scope(Scope::Map).arguments(2).in_map(),
            Self::Default => ValidationSpec::scope(Scope::Map).arguments(1).in_map(),
            Self::MapEnd => ValidationSpec::scope(Scope::Map).in_map(),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn compile(
        self,
        line: &AstLine,
        module_context: &mut ModuleContext,
        program_context: &mut ProgramContext,
    ) -> FallableAction {
        use ValueType::{Float, Float64, Int};

        let (mc, pc) = (module_context, program_context);

        match self {
            Self::Module => structure::module(line, mc),
            Self::ModuleEnd => structure::module_end(line, mc, pc),
            Self::Function => functions::function(line, mc),
            Self::Param => functions::param(line, mc),
            Self::FunctionEnd => functions::function_end(line, mc, pc),
            Self::Call => functions::call(line, mc, pc),
            Self::Constants => structure::constants(line, mc),
            Self::ConstantsEnd => structure::constants_end(line, mc, pc),
            Self::InitBlock => structure::init_block(mc),
            Self::InitBlockEnd => structure::init_block_end(line, mc),
            Self::SkipExecution => {
                mc.flags.skip_execution_in_cycle = true;
                Ok(())
            }
            Self::InitOnly => {
                mc.flags.init_only_execution = true;
                Ok(())
            }
            Self::Wasm => structure::wasm(line, mc, pc),

            Self::Int => declarations::memory(line, ElementKind::scalar(Int), mc, pc),
            Self::Float => declarations::memory(line, ElementKind::scalar(Float), mc, pc),
            Self::Float64 => declarations::memory(line, ElementKind::scalar(Float64), mc, pc),
            Self::IntPointer => {
                declarations::memory(line, ElementKind::pointer(Int, false), mc, pc)
            }
            Self::IntPointerPointer | Self::FloatPointerPointer => {
                declarations::memory(line, ElementKind::pointer(Int, true), mc, pc)
            }
            Self::FloatPointer => {
                declarations::memory(line, ElementKind::pointer(Float, false), mc, pc)
            }
            Self::Float64Pointer => {
                declarations::memory(line, ElementKind::pointer(Float64, false), mc, pc)
            }
            Self::IntBuffer => declarations::buffer(line, ElementKind::scalar(Int), mc, pc),
            Self::Int8Buffer => declarations::buffer(line, ElementKind::narrow(1, false), mc, pc),
            Self::Int8UnsignedBuffer => {
                declarations::buffer(line, ElementKind::narrow(1, true), mc, pc)
            }
            Self::Int16Buffer => declarations::buffer(line, ElementKind::narrow(2, false), mc, pc),
            Self::Int16UnsignedBuffer => {
                declarations::buffer(line, ElementKind::narrow(2, true), mc, pc)
            }
            Self::FloatBuffer => declarations::buffer(line, ElementKind::scalar(Float), mc, pc),
            Self::Float64Buffer => declarations::buffer(line, ElementKind::scalar(Float64), mc, pc),
            Self::IntPointerBuffer => {
                declarations::buffer(line, ElementKind::pointer(Int, false), mc, pc)
            }
            Self::FloatPointerBuffer => {
                declarations::buffer(line, ElementKind::pointer(Float, false), mc, pc)
            }
            Self::Local => declarations::local(line, mc),
            Self::LocalSet => declarations::local_set(line, mc),

            Self::Push => stack_ops::push(line, mc, pc),
            Self::Drop => stack_ops::drop(line, mc),
            Self::Dup => stack_ops::dup(line, mc, pc),
            Self::Swap => stack_ops::swap(line, mc, pc),
            Self::ClearStack => stack_ops::clear_stack(mc),

            Self::Add => {
                arithmetic::construct(line, Opcode::I32Add, Opcode::F32Add, Opcode::F64Add, mc)
            }
            Self::Sub => {
                arithmetic::construct(line, Opcode::I32Sub, Opcode::F32Sub, Opcode::F64Sub, mc)
            }
            Self::Mul => {
                arithmetic::construct(line, Opcode::I32Mul, Opcode::F32Mul, Opcode::F64Mul, mc)
            }
            Self::Div => {
                arithmetic::divide(line, Opcode::I32DivS, Opcode::F32Div, Opcode::F64Div, mc)
            }
            Self::Remainder => {
                arithmetic::divide(line, Opcode::I32RemS, Opcode::I32RemS, Opcode::I32RemS, mc)
            }

            Self::Equal => {
                comparison::construct(line, Opcode::I32Eq, Opcode::F32Eq, Opcode::F64Eq, mc)
            }
            Self::NotEqual => {
                comparison::construct(line, Opcode::I32Ne, Opcode::F32Ne, Opcode::F64Ne, mc)
            }
            Self::GreaterThan => {
                comparison::construct(line, Opcode::I32GtS, Opcode::F32Gt, Opcode::F64Gt, mc)
            }
            Self::GreaterOrEqual => {
                comparison::construct(line, Opcode::I32GeS, Opcode::F32Ge, Opcode::F64Ge, mc)
            }
            Self::LessThan => {
                comparison::construct(line, Opcode::I32LtS, Opcode::F32Lt, Opcode::F64Lt, mc)
            }
            Self::LessOrEqual => {
                comparison::construct(line, Opcode::I32LeS, Opcode::F32Le, Opcode::F64Le, mc)
            }
            Self::GreaterOrEqualUnsigned => bitwise::construct(line, Opcode::I32GeU, mc),
            Self::EqualToZero => comparison::equal_to_zero(line, mc),

            Self::And => bitwise::construct(line, Opcode::I32And, mc),
            Self::Or => bitwise::construct(line, Opcode::I32Or, mc),
            Self::Xor => bitwise::construct(line, Opcode::I32Xor, mc),
            Self::ShiftLeft => bitwise::construct(line, Opcode::I32Shl, mc),
            Self::ShiftRight => bitwise::construct(line, Opcode::I32ShrS, mc),
            Self::ShiftRightUnsigned => bitwise::construct(line, Opcode::I32ShrU, mc),
            Self::Not => bitwise::not(line, mc),

            Self::CastToInt => conversion::cast(line, Int, mc),
            Self::CastToFloat => conversion::cast(line, Float, mc),
            Self::CastToFloat64 => conversion::cast(line, Float64, mc),
            Self::Sqrt => conversion::float_math(line, Opcode::F32Sqrt, Opcode::F64Sqrt, mc),
            Self::Round => conversion::float_math(line, Opcode::F32Nearest, Opcode::F64Nearest, mc),
            Self::Abs => conversion::abs(line, mc, pc),
            Self::Pow2 => conversion::pow2(line, mc, pc),
            Self::EnsureNonZero => conversion::ensure_non_zero(line, mc, pc),

            Self::Load => memory_access::load(line, Opcode::I32Load, mc, pc),
            Self::Load8Signed => memory_access::load(line, Opcode::I32Load8S, mc, pc),
            Self::Load8Unsigned => memory_access::load(line, Opcode::I32Load8U, mc, pc),
            Self::Load16Signed => memory_access::load(line, Opcode::I32Load16S, mc, pc),
            Self::Load16Unsigned => memory_access::load(line, Opcode::I32Load16U, mc, pc),
            Self::LoadFloat => memory_access::load(line, Opcode::F32Load, mc, pc),
            Self::LoadFloat64 => memory_access::load(line, Opcode::F64Load, mc, pc),
            Self::Store => memory_access::store(line, mc),
            Self::Store8 => memory_access::store_narrow(line, Opcode::I32Store8, mc),
            Self::Store16 => memory_access::store_narrow(line, Opcode::I32Store16, mc),
            Self::StoreBytes => memory_access::store_bytes(line, mc, pc),

            Self::Block => control_flow::block(line, mc),
            Self::BlockEnd => control_flow::block_end(line, mc),
            Self::Loop => control_flow::loop_start(mc),
            Self::LoopEnd => control_flow::loop_end(line, mc),
            Self::If => control_flow::if_start(line, mc),
            Self::Else => control_flow::else_branch(line, mc),
            Self::IfEnd => control_flow::if_end(line, mc),
            Self::Branch => control_flow::branch(line, mc, pc),
            Self::BranchIfTrue => control_flow::branch_if_true(line, mc, pc),

            Self::RisingEdge => signals::edge(line, "risingEdge", "greaterThan", mc, pc),
            Self::FallingEdge => signals::edge(line, "fallingEdge", "lessThan", mc, pc),
            Self::HasChanged => signals::edge(line, "hasChanged", "notEqual", mc, pc),
            Self::BranchIfUnchanged => signals::branch_if_unchanged(line, mc, pc),
            Self::Cycle => signals::cycle(line, mc, pc),

            Self::Const => consts::constant(line, mc, pc),
            Self::Use => consts::use_namespace(line, mc, pc),
            Self::MapBegin => map::map_begin(line, mc),
            Self::Map => map::map_row(line, mc, pc),
            Self::Default => map::map_default(line, mc, pc),
            Self::MapEnd => map::map_end(line, mc, pc),
        }
    }
}

/// Validate and compile a single line.
pub fn compile_line(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let instruction = Instruction::from_str(&line.instruction)
        .map_err(|_| module_context.error(ErrorCode::UnrecognisedInstruction, line))?;

    validation::validate(&instruction.validation(), line, module_context)?;

    trace!(line = line.line_number, %instruction, depth = module_context.stack.len(), "compiling");

    instruction.compile(line, module_context, program_context)
}

/// Parse a type keyword argument (`int`, `float`, `float64`).
fn value_type_argument(
    line: &AstLine,
    index: usize,
    module_context: &ModuleContext,
) -> Result<ValueType, CompileError> {
    let argument = line
        .argument(index)
        .ok_or_else(|| module_context.error(ErrorCode::MissingArgument, line))?;

    argument
        .as_identifier()
        .and_then(|name| ValueType::from_str(name).ok())
        .ok_or_else(|| module_context.error(ErrorCode::InvalidType, line))
}

/// Optional block result type: absent or `void` means no result.
fn block_result_argument(
    line: &AstLine,
    module_context: &ModuleContext,
) -> Result<Option<ValueType>, CompileError> {
    match line.argument(0).and_then(|arg| arg.as_identifier()) {
        None if line.argument(0).is_none() => Ok(None),
        Some("void") => Ok(None),
        _ => value_type_argument(line, 0, module_context).map(Some),
    }
}

/// Identifier argument without sigils.
fn name_argument<'a>(
    line: &'a AstLine,
    index: usize,
    module_context: &ModuleContext,
) -> Result<&'a str, CompileError> {
    let argument = line
        .argument(index)
        .ok_or_else(|| module_context.error(ErrorCode::MissingArgument, line))?;

    argument
        .as_identifier()
        .filter(|name| is_plain_name(name))
        .ok_or_else(|| module_context.error(ErrorCode::ExpectedIdentifier, line))
}

fn is_plain_name(name: &str) -> bool {
    !name.starts_with(['&', '$', '%', '*', '#']) && !name.ends_with('&') && !name.contains('.')
}
