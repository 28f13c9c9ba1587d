use crate::{
    codegen::{
        context::ModuleContext,
        error::{ErrorCode, FallableAction},
        stack::StackItem,
        wasm::{self, Opcode},
    },
    common::ast::AstLine,
};

/// Binary arithmetic on two operands of matching type.
pub fn construct(
    line: &AstLine,
    int: Opcode,
    float: Opcode,
    float64: Opcode,
    module_context: &mut ModuleContext,
) -> FallableAction {
    module_context.pop_operand(line)?;
    let operand = module_context.pop_operand(line)?;
    let value_type = operand.value_type;

    module_context.stack.push(StackItem::of(value_type));
    module_context.emit(&wasm::op(Opcode::by_type(value_type, int, float, float64)));

    Ok(())
}

/// `div` and `remainder`: the divisor has to be proven non-zero.
pub fn divide(
    line: &AstLine,
    int: Opcode,
    float: Opcode,
    float64: Opcode,
    module_context: &mut ModuleContext,
) -> FallableAction {
    if !module_context
        .stack
        .top()
        .is_some_and(|divisor| divisor.is_non_zero)
    {
        return Err(module_context.error(ErrorCode::DivisionByZero, line));
    }

    construct(line, int, float, float64, module_context)
}
