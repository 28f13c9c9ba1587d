//! Lookup tables: `mapBegin type`, `map key value` rows, an optional
//! `default`, closed by `mapEnd`.

use crate::{
    codegen::{
        constants::resolve_value,
        context::{
            module::{BlockFrame, BlockType, MapState},
            ModuleContext, ProgramContext,
        },
        error::{CompileError, ErrorCode, FallableAction},
        lowering::lower,
        stack::StackItem,
        validation::expect_type,
    },
    common::{ast::AstLine, Value, ValueType},
};

use super::{control_flow::pop_frame, value_type_argument};

pub fn map_begin(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let input_type = value_type_argument(line, 0, module_context)?;

    let operand = module_context
        .stack
        .top()
        .map(|item| item.value_type)
        .ok_or_else(|| module_context.error(ErrorCode::InsufficientOperands, line))?;
    expect_type(input_type, operand).map_err(|code| module_context.error(code, line))?;

    let depth = module_context.stack.len();
    module_context.blocks.push(BlockFrame {
        map: Some(MapState::new(input_type)),
        ..BlockFrame::new(BlockType::Map, depth)
    });

    Ok(())
}

/// Run `action` against the open map's rows.
fn with_map_state<T>(
    line: &AstLine,
    module_context: &mut ModuleContext,
    action: impl FnOnce(&mut MapState) -> Result<T, ErrorCode>,
) -> Result<T, CompileError> {
    let result = module_context
        .blocks
        .top_mut()
        .and_then(|frame| frame.map.as_mut())
        .ok_or(ErrorCode::MissingBlockStartInstruction)
        .and_then(action);

    result.map_err(|code| module_context.error(code, line))
}

/// All values of a map share the type of the first one.
fn check_value(state: &mut MapState, value: Value) -> Result<(), ErrorCode> {
    match state.value_type {
        Some(value_type) if value_type != value.value_type() => Err(ErrorCode::TypeMismatch),
        _ => {
            state.value_type = Some(value.value_type());
            Ok(())
        }
    }
}

fn resolve_argument(
    line: &AstLine,
    index: usize,
    module_context: &ModuleContext,
    program_context: &ProgramContext,
) -> Result<Value, CompileError> {
    line.argument(index)
        .ok_or(ErrorCode::MissingArgument)
        .and_then(|arg| resolve_value(arg, module_context, program_context))
        .map_err(|code| module_context.error(code, line))
}

pub fn map_row(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &ProgramContext,
) -> FallableAction {
    let key = resolve_argument(line, 0, module_context, program_context)?;
    let value = resolve_argument(line, 1, module_context, program_context)?;

    with_map_state(line, module_context, |state| {
        match expect_type(state.input_type, key.value_type()) {
            Err(ErrorCode::OnlyIntegers | ErrorCode::OnlyFloats) => {
                return Err(ErrorCode::MapKeyTypeMismatch)
            }
            Err(code) => return Err(code),
            Ok(()) => {}
        }

        if state.rows.iter().any(|(existing, _)| *existing == key) {
            return Err(ErrorCode::DuplicateIdentifier);
        }

        check_value(state, value)?;
        state.rows.push((key, value));

        Ok(())
    })
}

pub fn map_default(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &ProgramContext,
) -> FallableAction {
    let value = resolve_argument(line, 0, module_context, program_context)?;

    with_map_state(line, module_context, |state| {
        if state.default.is_some() {
            return Err(ErrorCode::DuplicateIdentifier);
        }

        check_value(state, value)?;
        state.default = Some(value);

        Ok(())
    })
}

/// Replace the input operand with the looked-up value, as a chain of
/// conditionals falling through to the default.
pub fn map_end(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let state = pop_frame(line, BlockType::Map, module_context)?
        .map
        .ok_or_else(|| module_context.error(ErrorCode::MissingBlockStartInstruction, line))?;

    let value_type = state.value_type.unwrap_or(ValueType::Int);
    let default = state.default.unwrap_or(Value::zero(value_type));
    let is_non_zero = !default.is_zero() && state.rows.iter().all(|(_, value)| !value.is_zero());

    let mut snippet = Vec::new();

    if state.rows.is_empty() {
        snippet.push(String::from("drop"));
    } else {
        let key = module_context.fresh_name("map_key", line);
        let input_type = state.input_type;

        snippet.push(format!("local {input_type} {key}"));
        snippet.push(format!("localSet {key}"));

        for (row_key, row_value) in &state.rows {
            let row_key = module_context.bind_constant("map_row_key", *row_key, line);
            let row_value = module_context.bind_constant("map_row_value", *row_value, line);

            snippet.extend([
                format!("push {key}"),
                format!("push {row_key}"),
                String::from("equal"),
                format!("if {value_type}"),
                format!("push {row_value}"),
                String::from("else"),
            ]);
        }
    }

    let default = module_context.bind_constant("map_default", default, line);
    snippet.push(format!("push {default}"));
    snippet.extend(state.rows.iter().map(|_| String::from("ifEnd")));

    lower(
        &snippet,
        line,
        1,
        &[StackItem::of(value_type).with_non_zero(is_non_zero)],
        module_context,
        program_context,
    )
}

#[cfg(test)]
mod tests {
    use crate::{
        codegen::{error::ErrorCode, instructions::tests::*, stack::StackItem},
        common::ValueType,
    };

    #[test]
    fn test_map_lowering() {
        let source = "module m\npush 2\nmapBegin int\nmap 1 10\nmap 2 20\ndefault 5\nmapEnd";

        assert!(compile_source(source).is_ok_and(|(mc, _)| {
            let ifs = mc.code.main.windows(2).filter(|w| *w == [0x04, 0x7F]).count();
            let ends = mc.code.main.iter().filter(|byte| **byte == 0x0B).count();

            ifs == 2
                && ends == 2
                && mc.blocks.top().is_some_and(|frame| frame.map.is_none())
                && mc.stack.peek(1) == Some(&[StackItem::int().non_zero()][..])
        }));
    }

    #[test]
    fn test_map_without_rows() {
        assert!(compile_source("module m\npush 2\nmapBegin int\nmapEnd").is_ok_and(|(mc, _)| {
            mc.code.main == vec![0x41, 0x02, 0x1A, 0x41, 0x00]
                && mc.stack.peek(1) == Some(&[StackItem::int()][..])
        }));

        assert!(compile_source("module m\npush 2\nmapBegin int\ndefault 1.5\nmapEnd")
            .is_ok_and(|(mc, _)| {
                mc.stack.peek(1) == Some(&[StackItem::of(ValueType::Float).non_zero()][..])
            }));
    }

    #[test]
    fn test_float_keys() {
        assert!(compile_source("module m\npush 0.5\nmapBegin float\nmap 0.5 1\nmapEnd")
            .is_ok_and(|(mc, _)| mc.code.main.contains(&0x5B)));

        assert_eq!(
            error_code("module m\npush 0.5\nmapBegin float\nmap 1 1\nmapEnd"),
            Some(ErrorCode::MapKeyTypeMismatch)
        );
        assert_eq!(
            error_code("module m\npush 0.5\nmapBegin float\nmap 1f64 1\nmapEnd"),
            Some(ErrorCode::MixedFloatWidth)
        );
    }

    #[test]
    fn test_map_values_keep_exact_bits() {
        let infinity = f32::INFINITY.to_le_bytes();
        let source = "module m\npush 1\nmapBegin int\nmap 1 1e39\nmap 2 2.5\ndefault 1e39\nmapEnd";

        assert!(compile_source(source).is_ok_and(|(mc, _)| {
            mc.code
                .main
                .windows(5)
                .filter(|w| w[0] == 0x43 && w[1..] == infinity)
                .count()
                == 2
                && mc.stack.peek(1) == Some(&[StackItem::of(ValueType::Float).non_zero()][..])
        }));
    }

    #[test]
    fn test_map_errors() {
        assert_eq!(
            error_code("module m\npush 1\nmapBegin int\nmap 1 1\nmap 1 2"),
            Some(ErrorCode::DuplicateIdentifier)
        );
        assert_eq!(
            error_code("module m\npush 1\nmapBegin int\nmap 1 1\nmap 2 2.5"),
            Some(ErrorCode::TypeMismatch)
        );
        assert_eq!(
            error_code("module m\npush 1\nmapBegin int\ndefault 1\ndefault 2"),
            Some(ErrorCode::DuplicateIdentifier)
        );
        assert_eq!(
            error_code("module m\npush 1\nmapBegin int\npush 2"),
            Some(ErrorCode::InstructionNotAllowedInMapBlock)
        );
        assert_eq!(
            error_code("module m\npush 1.5\nmapBegin int"),
            Some(ErrorCode::OnlyIntegers)
        );
        assert_eq!(
            error_code("module m\nmap 1 1"),
            Some(ErrorCode::InstructionInvalidOutsideBlock)
        );
    }
}
