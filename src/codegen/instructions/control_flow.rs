use crate::{
    codegen::{
        constants::resolve_value,
        context::{
            module::{BlockFrame, BlockType},
            ModuleContext, ProgramContext,
        },
        error::{CompileError, ErrorCode, FallableAction},
        stack::StackItem,
        validation::expect_type,
        wasm::{self, BlockResult, Opcode},
    },
    common::{ast::AstLine, Value},
};

use super::block_result_argument;

// region: frame utilities

/// Pop the innermost frame, which has to be of `block_type`.
pub(super) fn pop_frame(
    line: &AstLine,
    block_type: BlockType,
    module_context: &mut ModuleContext,
) -> Result<BlockFrame, CompileError> {
    if !module_context
        .blocks
        .top()
        .is_some_and(|frame| frame.block_type == block_type)
    {
        return Err(module_context.error(ErrorCode::MissingBlockStartInstruction, line));
    }

    module_context
        .blocks
        .pop()
        .ok_or_else(|| module_context.error(ErrorCode::MissingBlockStartInstruction, line))
}

/// Check the stack against the frame's declared result: untouched
/// depth for void frames, exactly one value of the declared type
/// otherwise.
pub(super) fn check_result(
    line: &AstLine,
    frame: &BlockFrame,
    module_context: &ModuleContext,
) -> FallableAction {
    let depth = module_context.stack.len();
    let expected_depth = frame.stack_depth + usize::from(frame.expected_result.is_some());

    if depth < expected_depth {
        return Err(module_context.error(ErrorCode::InsufficientOperands, line));
    }

    if depth > expected_depth {
        return Err(module_context.error(ErrorCode::StackExpectedZeroElements, line));
    }

    match (frame.expected_result, module_context.stack.top()) {
        (Some(expected), Some(item)) => expect_type(expected, item.value_type)
            .map_err(|code| module_context.error(code, line)),
        _ => Ok(()),
    }
}

/// Close a `block` or `if` frame, leaving only its result on the stack.
fn close_structured(
    line: &AstLine,
    frame: &BlockFrame,
    module_context: &mut ModuleContext,
) -> FallableAction {
    check_result(line, frame, module_context)?;

    if let Some(result) = frame.expected_result {
        module_context.stack.truncate(frame.stack_depth);
        module_context.stack.push(StackItem::of(result));
    }

    module_context.emit(&wasm::op(Opcode::End));

    Ok(())
}

// endregion

pub fn block(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let result = block_result_argument(line, module_context)?;
    let depth = module_context.stack.len();

    module_context
        .blocks
        .push(BlockFrame::new(BlockType::Block, depth).with_result(result));
    module_context.emit(&wasm::structured(Opcode::Block, BlockResult::from(result)));

    Ok(())
}

pub fn block_end(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let frame = pop_frame(line, BlockType::Block, module_context)?;

    close_structured(line, &frame, module_context)
}

/// `loop` compiles to `block` + `loop`, so depth 0 continues
/// and depth 1 breaks out.
pub fn loop_start(module_context: &mut ModuleContext) -> FallableAction {
    let depth = module_context.stack.len();

    module_context
        .blocks
        .push(BlockFrame::new(BlockType::Loop, depth));
    module_context.emit(
        &[
            wasm::structured(Opcode::Block, BlockResult::Void),
            wasm::structured(Opcode::Loop, BlockResult::Void),
        ]
        .concat(),
    );

    Ok(())
}

pub fn loop_end(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let frame = pop_frame(line, BlockType::Loop, module_context)?;
    check_result(line, &frame, module_context)?;

    module_context.emit(
        &[
            wasm::br(0),
            wasm::op(Opcode::End),
            wasm::op(Opcode::End),
        ]
        .concat(),
    );

    Ok(())
}

pub fn if_start(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let result = block_result_argument(line, module_context)?;
    module_context.pop_operand(line)?;

    let depth = module_context.stack.len();
    module_context
        .blocks
        .push(BlockFrame::new(BlockType::Condition, depth).with_result(result));
    module_context.emit(&wasm::structured(Opcode::If, BlockResult::from(result)));

    Ok(())
}

pub fn else_branch(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let frame = match module_context.blocks.top() {
        Some(frame) if frame.block_type == BlockType::Condition && !frame.has_else => frame.clone(),
        _ => return Err(module_context.error(ErrorCode::MissingBlockStartInstruction, line)),
    };

    check_result(line, &frame, module_context)?;

    // the else branch starts from the depth the condition opened with
    module_context.stack.truncate(frame.stack_depth);
    if let Some(frame) = module_context.blocks.top_mut() {
        frame.has_else = true;
    }
    module_context.emit(&wasm::op(Opcode::Else));

    Ok(())
}

pub fn if_end(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let frame = pop_frame(line, BlockType::Condition, module_context)?;

    if frame.expected_result.is_some() && !frame.has_else {
        return Err(module_context.error(ErrorCode::MissingElseBranch, line));
    }

    close_structured(line, &frame, module_context)
}

/// Relative branch depth: a non-negative integer within the open blocks.
fn branch_depth(
    line: &AstLine,
    module_context: &ModuleContext,
    program_context: &ProgramContext,
) -> Result<u32, CompileError> {
    let targets = module_context.blocks.branch_targets();

    line.argument(0)
        .ok_or(ErrorCode::MissingArgument)
        .and_then(|arg| resolve_value(arg, module_context, program_context))
        .and_then(|value| match value {
            Value::Int(depth) => usize::try_from(depth)
                .ok()
                .filter(|depth| *depth < targets)
                .and_then(|depth| u32::try_from(depth).ok())
                .ok_or(ErrorCode::ExpectedValue),
            _ => Err(ErrorCode::ExpectedValue),
        })
        .map_err(|code| module_context.error(code, line))
}

pub fn branch(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &ProgramContext,
) -> FallableAction {
    let depth = branch_depth(line, module_context, program_context)?;
    module_context.emit(&wasm::br(depth));

    Ok(())
}

pub fn branch_if_true(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &ProgramContext,
) -> FallableAction {
    let depth = branch_depth(line, module_context, program_context)?;

    module_context.pop_operand(line)?;
    module_context.emit(&wasm::br_if(depth));

    Ok(())
}
