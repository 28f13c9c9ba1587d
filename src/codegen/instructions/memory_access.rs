use crate::{
    codegen::{
        constants::resolve_count,
        context::{ModuleContext, ProgramContext},
        error::{ErrorCode, FallableAction},
        lowering::lower,
        memory::MemoryItem,
        stack::StackItem,
        wasm::{self, Opcode},
    },
    common::{ast::AstLine, ValueType},
};

/// Opcode reading one element of a memory declaration.
pub const fn element_load(item: &MemoryItem) -> Opcode {
    match (item.element_word_size, item.is_unsigned) {
        (1, false) => Opcode::I32Load8S,
        (1, true) => Opcode::I32Load8U,
        (2, false) => Opcode::I32Load16S,
        (2, true) => Opcode::I32Load16U,
        (8, _) => Opcode::F64Load,
        _ if item.is_integer => Opcode::I32Load,
        _ => Opcode::F32Load,
    }
}

const fn loaded_type(opcode: Opcode) -> ValueType {
    match opcode {
        Opcode::F32Load => ValueType::Float,
        Opcode::F64Load => ValueType::Float64,
        _ => ValueType::Int,
    }
}

/// Load from the address on top of the stack.
///
/// Addresses not proven safe are first clamped to the memory bounds.
pub fn load(
    line: &AstLine,
    opcode: Opcode,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let is_safe = module_context
        .stack
        .top()
        .is_some_and(|address| address.is_safe_memory_address);

    if !is_safe {
        clamp_address(line, opcode.access_width(), module_context, program_context)?;
    }

    module_context.pop_operand(line)?;
    module_context.stack.push(StackItem::of(loaded_type(opcode)));
    module_context.emit(&wasm::memory(opcode));

    Ok(())
}

fn clamp_address(
    line: &AstLine,
    width: u32,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let max = module_context
        .options
        .memory_size_bytes
        .checked_sub(width)
        .and_then(|max| i32::try_from(max).ok())
        .ok_or_else(|| module_context.error(ErrorCode::MemoryOutOfBounds, line))?;
    let address = module_context.fresh_name("load_address", line);

    lower(
        &[
            format!("local int {address}"),
            format!("localSet {address}"),
            format!("push {address}"),
            String::from("push 0"),
            String::from("lessThan"),
            String::from("if int"),
            String::from("push 0"),
            String::from("else"),
            format!("push {address}"),
            format!("push {max}"),
            String::from("greaterThan"),
            String::from("if int"),
            format!("push {max}"),
            String::from("else"),
            format!("push {address}"),
            String::from("ifEnd"),
            String::from("ifEnd"),
        ],
        line,
        1,
        &[StackItem::int().safe_address()],
        module_context,
        program_context,
    )
}

/// `[int address, value] -> []`, store width taken from the value's type.
pub fn store(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let value = module_context.pop_operand(line)?;
    module_context.pop_operand(line)?;

    let opcode = Opcode::by_type(
        value.value_type,
        Opcode::I32Store,
        Opcode::F32Store,
        Opcode::F64Store,
    );
    module_context.emit(&wasm::memory(opcode));

    Ok(())
}

/// `store8` and `store16`.
pub fn store_narrow(
    line: &AstLine,
    opcode: Opcode,
    module_context: &mut ModuleContext,
) -> FallableAction {
    module_context.pop_operand(line)?;
    module_context.pop_operand(line)?;
    module_context.emit(&wasm::memory(opcode));

    Ok(())
}

/// `storeBytes N`: `[int address, int b0 .. int bN-1] -> []`.
///
/// Byte `i` lands at `address + i`; stores are emitted from the
/// highest offset down.
pub fn store_bytes(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let count = line
        .argument(0)
        .ok_or(ErrorCode::MissingArgument)
        .and_then(|arg| resolve_count(arg, module_context, program_context))
        .map_err(|code| module_context.error(code, line))?;
    let count = usize::try_from(count)
        .map_err(|_| module_context.error(ErrorCode::ExpectedValue, line))?;

    let operands = module_context
        .stack
        .peek(count + 1)
        .ok_or_else(|| module_context.error(ErrorCode::InsufficientOperands, line))?;

    if !operands.iter().all(StackItem::is_integer) {
        return Err(module_context.error(ErrorCode::OnlyIntegers, line));
    }

    let address = module_context.fresh_name("storeBytes_address", line);
    let bytes = (0..count)
        .map(|i| module_context.fresh_name(&format!("storeBytes_{i}"), line))
        .collect::<Vec<_>>();

    let mut snippet = vec![format!("local int {address}")];
    snippet.extend(bytes.iter().map(|name| format!("local int {name}")));
    snippet.extend(bytes.iter().rev().map(|name| format!("localSet {name}")));
    snippet.push(format!("localSet {address}"));

    for (offset, name) in bytes.iter().enumerate().rev() {
        snippet.extend([
            format!("push {address}"),
            format!("push {offset}"),
            String::from("add"),
            format!("push {name}"),
            String::from("store8"),
        ]);
    }

    lower(
        &snippet,
        line,
        count + 1,
        &[],
        module_context,
        program_context,
    )
}
