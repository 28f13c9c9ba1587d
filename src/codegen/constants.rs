//! Resolution of compile-time numeric values (literals and constants).

use crate::common::{
    ast::{decode_string, Argument, Reference},
    Value,
};

use super::{
    context::{ModuleContext, ProgramContext},
    error::ErrorCode,
};

/// Resolve an argument to a compile-time value.
///
/// Accepts numeric literals, single-character strings (as their code),
/// constants of this block, and dotted `namespace.NAME` references.
pub fn resolve_value(
    argument: &Argument,
    module_context: &ModuleContext,
    program_context: &ProgramContext,
) -> Result<Value, ErrorCode> {
    match argument {
        Argument::Literal(value) => Ok(*value),
        Argument::StringLiteral(text) => match decode_string(text).as_slice() {
            [byte] => Ok(Value::Int(i32::from(*byte))),
            _ => Err(ErrorCode::ExpectedValue),
        },
        Argument::Identifier(name) => match Reference::parse(name) {
            Reference::Plain(name) => resolve_constant(name, module_context, program_context)
                .ok_or(ErrorCode::UndeclaredIdentifier),
            _ => Err(ErrorCode::ExpectedValue),
        },
    }
}

pub fn resolve_constant(
    name: &str,
    module_context: &ModuleContext,
    program_context: &ProgramContext,
) -> Option<Value> {
    module_context
        .namespace
        .consts
        .get(name)
        .copied()
        .or_else(|| program_context.constant(name))
}

/// Resolve an argument that must be a strictly positive integer
/// (buffer sizes, byte counts).
pub fn resolve_count(
    argument: &Argument,
    module_context: &ModuleContext,
    program_context: &ProgramContext,
) -> Result<u32, ErrorCode> {
    match resolve_value(argument, module_context, program_context)? {
        Value::Int(count) if count > 0 => u32::try_from(count).map_err(|_| ErrorCode::ExpectedValue),
        _ => Err(ErrorCode::ExpectedValue),
    }
}
