use crate::{
    codegen::{
        context::ModuleContext,
        error::FallableAction,
        stack::StackItem,
        wasm::{self, Opcode},
    },
    common::{ast::AstLine, ValueType},
};

/// Comparison of two operands of matching type, always yielding an int.
pub fn construct(
    line: &AstLine,
    int: Opcode,
    float: Opcode,
    float64: Opcode,
    module_context: &mut ModuleContext,
) -> FallableAction {
    module_context.pop_operand(line)?;
    let operand = module_context.pop_operand(line)?;

    module_context.stack.push(StackItem::int());
    module_context.emit(&wasm::op(Opcode::by_type(
        operand.value_type,
        int,
        float,
        float64,
    )));

    Ok(())
}

pub fn equal_to_zero(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let operand = module_context.pop_operand(line)?;

    let bytes = match operand.value_type {
        ValueType::Int => wasm::op(Opcode::I32Eqz),
        ValueType::Float => [wasm::f32_const(0.0), wasm::op(Opcode::F32Eq)].concat(),
        ValueType::Float64 => [wasm::f64_const(0.0), wasm::op(Opcode::F64Eq)].concat(),
    };

    module_context.stack.push(StackItem::int());
    module_context.emit(&bytes);

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        codegen::{error::ErrorCode, instructions::tests::*},
        common::ValueType,
    };

    #[test]
    fn test_comparison_yields_int() {
        assert!(compile_source("module m\npush 1.5\npush 2.5\ngreaterThan").is_ok_and(|(mc, _)| {
            mc.code.main.last() == Some(&0x5E)
                && mc.stack.top().is_some_and(|item| item.value_type == ValueType::Int)
        }));

        assert!(compile_source("module m\npush 1\npush 2\nequal")
            .is_ok_and(|(mc, _)| mc.code.main.last() == Some(&0x46)));

        assert_eq!(
            error_code("module m\npush 1\npush 2.5\nequal"),
            Some(ErrorCode::UnmatchingOperands)
        );
    }

    #[test]
    fn test_equal_to_zero() {
        assert!(compile_source("module m\npush 3\nequalToZero")
            .is_ok_and(|(mc, _)| mc.code.main == vec![0x41, 0x03, 0x45]));

        assert!(compile_source("module m\npush 3.0\nequalToZero").is_ok_and(|(mc, _)| {
            mc.code.main.ends_with(&[0x43, 0, 0, 0, 0, 0x5B])
                && mc.stack.top().is_some_and(|item| item.value_type == ValueType::Int)
        }));
    }
}
