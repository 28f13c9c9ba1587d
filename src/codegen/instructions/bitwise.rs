use crate::{
    codegen::{
        context::ModuleContext,
        error::FallableAction,
        stack::StackItem,
        wasm::{self, Opcode},
    },
    common::ast::AstLine,
};

/// Integer-only binary operation.
pub fn construct(
    line: &AstLine,
    opcode: Opcode,
    module_context: &mut ModuleContext,
) -> FallableAction {
    module_context.pop_operand(line)?;
    module_context.pop_operand(line)?;

    module_context.stack.push(StackItem::int());
    module_context.emit(&wasm::op(opcode));

    Ok(())
}

/// Logical negation (`i32.eqz`).
pub fn not(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    module_context.pop_operand(line)?;

    module_context.stack.push(StackItem::int());
    module_context.emit(&wasm::op(Opcode::I32Eqz));

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::codegen::{error::ErrorCode, instructions::tests::*};

    #[test]
    fn test_bitwise() {
        assert!(compile_source("module m\npush 6\npush 3\nand\npush 1\nshiftRightUnsigned\nnot")
            .is_ok_and(|(mc, _)| {
                mc.code.main
                    == vec![0x41, 0x06, 0x41, 0x03, 0x71, 0x41, 0x01, 0x76, 0x45]
            }));

        assert_eq!(
            error_code("module m\npush 1.0\npush 2.0\nxor"),
            Some(ErrorCode::OnlyIntegers)
        );
        assert_eq!(
            error_code("module m\npush 1.0\nnot"),
            Some(ErrorCode::OnlyIntegers)
        );
    }
}
