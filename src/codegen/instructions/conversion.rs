use crate::{
    codegen::{
        constants::resolve_value,
        context::{ModuleContext, ProgramContext},
        error::{ErrorCode, FallableAction},
        lowering::lower,
        stack::StackItem,
        wasm::{self, Opcode},
    },
    common::{ast::AstLine, Value, ValueType},
};

const fn cast_opcode(from: ValueType, to: ValueType) -> Option<Opcode> {
    match (from, to) {
        (ValueType::Int, ValueType::Float) => Some(Opcode::F32ConvertI32S),
        (ValueType::Int, ValueType::Float64) => Some(Opcode::F64ConvertI32S),
        (ValueType::Float, ValueType::Int) => Some(Opcode::I32TruncF32S),
        (ValueType::Float64, ValueType::Int) => Some(Opcode::I32TruncF64S),
        (ValueType::Float, ValueType::Float64) => Some(Opcode::F64PromoteF32),
        (ValueType::Float64, ValueType::Float) => Some(Opcode::F32DemoteF64),
        _ => None,
    }
}

/// Truncation to int may produce zero; widening keeps the non-zero flag.
pub fn cast(line: &AstLine, target: ValueType, module_context: &mut ModuleContext) -> FallableAction {
    let operand = module_context.pop_operand(line)?;

    let Some(opcode) = cast_opcode(operand.value_type, target) else {
        module_context.stack.push(operand);
        return Ok(());
    };

    let result = match target {
        ValueType::Int => StackItem::int(),
        _ => StackItem::of(target).with_non_zero(operand.is_non_zero),
    };

    module_context.stack.push(result);
    module_context.emit(&wasm::op(opcode));

    Ok(())
}

/// Single-opcode float operation (`sqrt`, `round`).
pub fn float_math(
    line: &AstLine,
    float: Opcode,
    float64: Opcode,
    module_context: &mut ModuleContext,
) -> FallableAction {
    let operand = module_context.pop_operand(line)?;
    let opcode = if operand.value_type == ValueType::Float64 {
        float64
    } else {
        float
    };

    module_context.stack.push(StackItem::of(operand.value_type));
    module_context.emit(&wasm::op(opcode));

    Ok(())
}

/// There is no integer abs opcode, so ints go through a conditional.
pub fn abs(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let operand = *module_context
        .stack
        .top()
        .ok_or_else(|| module_context.error(ErrorCode::InsufficientOperands, line))?;

    if operand.value_type != ValueType::Int {
        let opcode = Opcode::by_type(
            operand.value_type,
            Opcode::F32Abs,
            Opcode::F32Abs,
            Opcode::F64Abs,
        );
        module_context.emit(&wasm::op(opcode));
        return Ok(());
    }

    let value = module_context.fresh_name("abs", line);

    lower(
        &[
            format!("local int {value}"),
            format!("localSet {value}"),
            format!("push {value}"),
            String::from("push 0"),
            String::from("lessThan"),
            String::from("if int"),
            String::from("push 0"),
            format!("push {value}"),
            String::from("sub"),
            String::from("else"),
            format!("push {value}"),
            String::from("ifEnd"),
        ],
        line,
        1,
        &[StackItem::int().with_non_zero(operand.is_non_zero)],
        module_context,
        program_context,
    )
}

/// `1 << n`
pub fn pow2(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let exponent = module_context.fresh_name("pow2", line);

    lower(
        &[
            format!("local int {exponent}"),
            format!("localSet {exponent}"),
            String::from("push 1"),
            format!("push {exponent}"),
            String::from("shiftLeft"),
        ],
        line,
        1,
        &[StackItem::int().non_zero()],
        module_context,
        program_context,
    )
}

/// Replace a zero operand with a default (1 unless given), so the
/// result can be used as a divisor.
pub fn ensure_non_zero(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let value_type = module_context
        .stack
        .top()
        .map(|item| item.value_type)
        .ok_or_else(|| module_context.error(ErrorCode::InsufficientOperands, line))?;

    let default = match line.argument(0) {
        Some(argument) => resolve_value(argument, module_context, program_context)
            .map_err(|code| module_context.error(code, line))?,
        None => Value::Int(1),
    }
    .cast(value_type);

    if default.is_zero() {
        return Err(module_context.error(ErrorCode::ExpectedValue, line));
    }

    let value = module_context.fresh_name("ensureNonZero", line);
    let default = module_context.bind_constant("ensureNonZero_default", default, line);

    lower(
        &[
            format!("local {value_type} {value}"),
            format!("localSet {value}"),
            format!("push {value}"),
            String::from("equalToZero"),
            format!("if {value_type}"),
            format!("push {default}"),
            String::from("else"),
            format!("push {value}"),
            String::from("ifEnd"),
        ],
        line,
        1,
        &[StackItem::of(value_type).non_zero()],
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
    fn test_casts() {
        assert!(compile_source("module m\npush 3\ncastToFloat\ncastToFloat64\ncastToInt")
            .is_ok_and(|(mc, _)| {
                mc.code.main == vec![0x41, 0x03, 0xB2, 0xBB, 0xAA]
                    && mc.stack.peek(1) == Some(&[StackItem::int()][..])
            }));

        // identity casts emit nothing and keep flags
        assert!(compile_source("module m\npush 3\ncastToInt").is_ok_and(|(mc, _)| {
            mc.code.main == vec![0x41, 0x03]
                && mc.stack.peek(1) == Some(&[StackItem::int().non_zero()][..])
        }));
    }

    #[test]
    fn test_float_math() {
        assert!(compile_source("module m\npush 2f64\nsqrt\npush 2.5\nround")
            .is_ok_and(|(mc, _)| {
                mc.code.main.contains(&0x9F)
                    && mc.code.main.last() == Some(&0x90)
                    && mc.stack.peek(2)
                        == Some(
                            &[StackItem::of(ValueType::Float64), StackItem::of(ValueType::Float)][..],
                        )
            }));

        assert_eq!(
            error_code("module m\npush 2\nsqrt"),
            Some(ErrorCode::OnlyFloats)
        );
    }

    #[test]
    fn test_abs() {
        assert!(compile_source("module m\npush -2.5\nabs")
            .is_ok_and(|(mc, _)| mc.code.main.last() == Some(&0x8B)));

        assert!(compile_source("module m\npush -2\nabs").is_ok_and(|(mc, _)| {
            mc.namespace.local("__abs_3").is_some()
                && mc.code.main.contains(&0x04)
                && mc.stack.peek(1) == Some(&[StackItem::int().non_zero()][..])
        }));
    }

    #[test]
    fn test_pow2() {
        assert!(compile_source("module m\nlocal int n\npush n\npow2").is_ok_and(|(mc, _)| {
            mc.code.main.ends_with(&[0x41, 0x01, 0x20, 0x01, 0x74])
                && mc.stack.peek(1) == Some(&[StackItem::int().non_zero()][..])
        }));

        assert_eq!(
            error_code("module m\npush 1.5\npow2"),
            Some(ErrorCode::OnlyIntegers)
        );
    }

    #[test]
    fn test_ensure_non_zero_enables_division() {
        assert!(compile_source("module m\nlocal float d\npush 1.5\npush d\nensureNonZero 0.5\ndiv")
            .is_ok_and(|(mc, _)| {
                mc.stack.peek(1) == Some(&[StackItem::of(ValueType::Float)][..])
            }));

        assert_eq!(
            error_code("module m\nlocal int d\npush 1\npush d\ndiv"),
            Some(ErrorCode::DivisionByZero)
        );
        assert_eq!(
            error_code("module m\nlocal int d\npush d\nensureNonZero 0"),
            Some(ErrorCode::ExpectedValue)
        );
    }

    #[test]
    fn test_ensure_non_zero_keeps_infinite_default() {
        let infinity = f32::INFINITY.to_le_bytes();

        assert!(compile_source("module m\nlocal float d\npush d\nensureNonZero 1e39")
            .is_ok_and(|(mc, _)| {
                mc.code
                    .main
                    .windows(5)
                    .any(|w| w[0] == 0x43 && w[1..] == infinity)
                    && mc.stack.peek(1) == Some(&[StackItem::of(ValueType::Float).non_zero()][..])
            }));
    }
}
