//! Compiling an instruction by expanding it into a fixed snippet of
//! other instructions and feeding those back through the compiler.
//!
//! Snippets never contain the instruction that produced them, so the
//! expansion always terminates. Generated names carry the source line
//! (see [`ModuleContext::fresh_name`]) to stay clear of user identifiers.

use tracing::trace;

use crate::{common::ast::AstLine, parser::parse_snippet};

use super::{
    context::{ModuleContext, ProgramContext},
    error::{ErrorCode, FallableAction},
    instructions::compile_line,
    stack::StackItem,
};

/// Compile `snippet` in place of `line`.
///
/// The top `consumed` operands are handed to the snippet; afterwards the
/// stack holds exactly `produced` in their place, whatever flags the
/// snippet's own instructions computed.
pub fn lower<S: AsRef<str>>(
    snippet: &[S],
    line: &AstLine,
    consumed: usize,
    produced: &[StackItem],
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let base = module_context
        .stack
        .len()
        .checked_sub(consumed)
        .ok_or_else(|| module_context.error(ErrorCode::InsufficientOperands, line))?;

    let lines = parse_snippet(snippet, line.line_number)
        .map_err(|_| module_context.error(ErrorCode::UnrecognisedInstruction, line))?;

    trace!(
        instruction = %line.instruction,
        line = line.line_number,
        expanded = lines.len(),
        "lowering"
    );

    for snippet_line in &lines {
        compile_line(snippet_line, module_context, program_context)?;
    }

    if module_context.stack.len() != base + produced.len() {
        return Err(module_context.error(ErrorCode::StackExpectedZeroElements, line));
    }

    module_context.stack.truncate(base);
    module_context.stack.extend(produced.iter().copied());

    Ok(())
}
