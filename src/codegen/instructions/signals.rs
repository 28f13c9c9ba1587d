//! Helpers for code run once per cycle, lowered onto plain instructions.

use crate::{
    codegen::{
        context::{ModuleContext, ProgramContext},
        error::{ErrorCode, FallableAction},
        lowering::lower,
        stack::StackItem,
    },
    common::ast::AstLine,
};

/// Compare the operand with its value from the previous cycle.
///
/// The previous value lives in a memory cell owned by the call site.
pub fn edge(
    line: &AstLine,
    purpose: &str,
    comparison: &str,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let previous = module_context.fresh_name(&format!("{purpose}_prev"), line);
    let current = module_context.fresh_name(purpose, line);

    lower(
        &[
            format!("int {previous}"),
            format!("local int {current}"),
            format!("localSet {current}"),
            format!("push {current}"),
            format!("push {previous}"),
            comparison.to_owned(),
            format!("push &{previous}"),
            format!("push {current}"),
            String::from("store"),
        ],
        line,
        1,
        &[StackItem::int()],
        module_context,
        program_context,
    )
}

pub fn branch_if_unchanged(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let depth = line
        .argument(0)
        .ok_or_else(|| module_context.error(ErrorCode::MissingArgument, line))?;

    lower(
        &[
            String::from("hasChanged"),
            String::from("equalToZero"),
            format!("branchIfTrue {depth}"),
        ],
        line,
        1,
        &[],
        module_context,
        program_context,
    )
}

/// `[cell, start, end] -> []`: step the pointer stored at `cell` by one
/// word, wrapping to `start` once it passes `end`.
pub fn cycle(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let end = module_context.fresh_name("cycle_end", line);
    let start = module_context.fresh_name("cycle_start", line);
    let cell = module_context.fresh_name("cycle_cell", line);
    let next = module_context.fresh_name("cycle_next", line);

    lower(
        &[
            format!("local int {end}"),
            format!("local int {start}"),
            format!("local int {cell}"),
            format!("local int {next}"),
            format!("localSet {end}"),
            format!("localSet {start}"),
            format!("localSet {cell}"),
            format!("push {cell}"),
            format!("push {cell}"),
            String::from("load"),
            String::from("push 4"),
            String::from("add"),
            format!("localSet {next}"),
            format!("push {next}"),
            format!("push {end}"),
            String::from("greaterThan"),
            String::from("if int"),
            format!("push {start}"),
            String::from("else"),
            format!("push {next}"),
            String::from("ifEnd"),
            String::from("store"),
        ],
        line,
        3,
        &[],
        module_context,
        program_context,
    )
}

#[cfg(test)]
mod tests {
    use crate::{
        codegen::{error::ErrorCode, instructions::tests::*, stack::StackItem},
        common::Value,
    };

    #[test]
    fn test_edges_keep_previous_value_in_memory() {
        let source = "module m\nlocal int x\npush x\nrisingEdge\npush x\nhasChanged\nadd\ndrop";

        assert!(compile_source(source).is_ok_and(|(mc, _)| {
            let memory = &mc.namespace.memory;

            memory
                .get("__risingEdge_prev_4")
                .is_some_and(|item| item.is_integer && item.default == Value::Int(0))
                && memory.get("__hasChanged_prev_6").is_some()
                && mc.namespace.local("__risingEdge_4").is_some()
                && mc.stack.is_empty()
        }));

        assert!(compile_source("module m\npush 1\nfallingEdge").is_ok_and(|(mc, _)| {
            // ends with the store of the current value
            mc.code.main.ends_with(&[0x36, 0x02, 0x00])
                && mc.stack.peek(1) == Some(&[StackItem::int()][..])
        }));

        assert_eq!(
            error_code("module m\npush 1.5\nrisingEdge"),
            Some(ErrorCode::OnlyIntegers)
        );
        assert_eq!(
            error_code("function f\npush 1\nhasChanged\nfunctionEnd int"),
            Some(ErrorCode::InstructionInvalidOutsideBlock)
        );
    }

    #[test]
    fn test_branch_if_unchanged() {
        assert!(compile_source("module m\nblock\npush 1\nbranchIfUnchanged 0\nblockEnd")
            .is_ok_and(|(mc, _)| {
                mc.code.main.ends_with(&[0x45, 0x0D, 0x00, 0x0B]) && mc.stack.is_empty()
            }));

        assert_eq!(
            error_code("module m\npush 1\nbranchIfUnchanged 0"),
            Some(ErrorCode::InstructionInvalidOutsideBlock)
        );
    }

    #[test]
    fn test_cycle() {
        let source = "module m\nint[] values 4\nint* cursor &values\npush &cursor\npush &values\npush values&\ncycle";

        assert!(compile_source(source).is_ok_and(|(mc, _)| {
            mc.stack.is_empty()
                && mc.namespace.local("__cycle_next_7").is_some()
                && mc.code.main.ends_with(&[0x36, 0x02, 0x00])
        }));

        assert_eq!(
            error_code("module m\npush 1\npush 2\ncycle"),
            Some(ErrorCode::InsufficientOperands)
        );
    }
}
