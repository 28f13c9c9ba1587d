use crate::{
    codegen::{
        constants::resolve_constant,
        context::{ModuleContext, ProgramContext},
        error::{ErrorCode, FallableAction},
        lowering::lower,
        memory::MemoryItem,
        stack::StackItem,
        wasm::{self, Opcode},
    },
    common::{
        ast::{decode_string, Argument, AstLine, Reference},
        Value, ValueType,
    },
};

use super::memory_access::element_load;

pub fn push(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    match line.argument(0) {
        Some(Argument::Literal(value)) => {
            push_value(*value, module_context);
            Ok(())
        }
        Some(Argument::StringLiteral(text)) => {
            for byte in decode_string(text) {
                push_value(Value::Int(i32::from(byte)), module_context);
            }
            Ok(())
        }
        Some(Argument::Identifier(name)) => {
            push_identifier(name, line, module_context, program_context)
        }
        None => Err(module_context.error(ErrorCode::MissingArgument, line)),
    }
}

fn push_value(value: Value, module_context: &mut ModuleContext) {
    module_context
        .stack
        .push(StackItem::of(value.value_type()).with_non_zero(!value.is_zero()));
    module_context.emit(&wasm::constant(value));
}

fn push_address(
    address: u32,
    line: &AstLine,
    module_context: &mut ModuleContext,
) -> FallableAction {
    let address = i32::try_from(address)
        .map_err(|_| module_context.error(ErrorCode::MemoryOutOfBounds, line))?;

    module_context.stack.push(
        StackItem::int()
            .safe_address()
            .with_non_zero(address != 0),
    );
    module_context.emit(&wasm::i32_const(address));

    Ok(())
}

fn push_identifier(
    name: &str,
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &ProgramContext,
) -> FallableAction {
    let undeclared = |module_context: &ModuleContext| {
        module_context.error(ErrorCode::UndeclaredIdentifier, line)
    };

    match Reference::parse(name) {
        Reference::Plain(name) => {
            if let Some((index, local)) = module_context.namespace.local(name) {
                let item = StackItem::of(local.value_type);
                module_context.stack.push(item);
                module_context.emit(&wasm::local_get(index));
                return Ok(());
            }

            if let Some(item) = module_context.namespace.memory.get(name).cloned() {
                return push_element(&item, line, module_context);
            }

            let value = resolve_constant(name, module_context, program_context)
                .ok_or_else(|| undeclared(module_context))?;
            push_value(value, module_context);

            Ok(())
        }
        Reference::Address { module, name } => {
            let item = memory_item(module, name, module_context, program_context)
                .ok_or_else(|| undeclared(module_context))?;
            push_address(item.byte_address, line, module_context)
        }
        Reference::EndAddress { module, name } => {
            let item = memory_item(module, name, module_context, program_context)
                .ok_or_else(|| undeclared(module_context))?;
            push_address(item.end_byte_address(), line, module_context)
        }
        Reference::ElementCount(name) => {
            let item = memory_item(None, name, module_context, program_context)
                .ok_or_else(|| undeclared(module_context))?;
            push_count(item.number_of_elements, line, module_context)
        }
        Reference::ElementWidth(name) => {
            let item = memory_item(None, name, module_context, program_context)
                .ok_or_else(|| undeclared(module_context))?;
            push_count(item.element_word_size, line, module_context)
        }
        Reference::Dereference(name) => {
            let item = memory_item(None, name, module_context, program_context)
                .ok_or_else(|| undeclared(module_context))?;
            push_dereferenced(&item, line, module_context)
        }
    }
}

fn memory_item(
    module: Option<&str>,
    name: &str,
    module_context: &ModuleContext,
    program_context: &ProgramContext,
) -> Option<MemoryItem> {
    match module {
        Some(module) => program_context.foreign_memory(module, name).cloned(),
        None => module_context.namespace.memory.get(name).cloned(),
    }
}

fn push_count(count: u32, line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let count = i32::try_from(count)
        .map_err(|_| module_context.error(ErrorCode::ExpectedValue, line))?;
    push_value(Value::Int(count), module_context);

    Ok(())
}

/// Load the first element of a memory declaration.
fn push_element(
    item: &MemoryItem,
    line: &AstLine,
    module_context: &mut ModuleContext,
) -> FallableAction {
    push_address(item.byte_address, line, module_context)?;
    module_context.stack.pop();

    module_context.stack.push(StackItem::of(item.value_type()));
    module_context.emit(&wasm::memory(element_load(item)));

    Ok(())
}

/// Load the value a pointer declaration points to.
fn push_dereferenced(
    item: &MemoryItem,
    line: &AstLine,
    module_context: &mut ModuleContext,
) -> FallableAction {
    if !item.is_pointer {
        return Err(module_context.error(ErrorCode::TypeMismatch, line));
    }

    push_element(item, line, module_context)?;
    module_context.stack.pop();

    let pointee = item.pointee_type();
    let opcode = Opcode::by_type(pointee, Opcode::I32Load, Opcode::F32Load, Opcode::F64Load);

    module_context.stack.push(StackItem::of(pointee));
    module_context.emit(&wasm::memory(opcode));

    Ok(())
}

pub fn drop(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    module_context.pop_operand(line)?;
    module_context.emit(&wasm::op(Opcode::Drop));

    Ok(())
}

pub fn clear_stack(module_context: &mut ModuleContext) -> FallableAction {
    let depth = module_context.stack.len();

    module_context.stack.clear();
    module_context.emit(&vec![Opcode::Drop.byte(); depth]);

    Ok(())
}

pub fn dup(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let item = *module_context
        .stack
        .top()
        .ok_or_else(|| module_context.error(ErrorCode::InsufficientOperands, line))?;
    let name = module_context.fresh_name("dup", line);
    let value_type = item.value_type;

    lower(
        &[
            format!("local {value_type} {name}"),
            format!("localSet {name}"),
            format!("push {name}"),
            format!("push {name}"),
        ],
        line,
        1,
        &[item, item],
        module_context,
        program_context,
    )
}

pub fn swap(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let (a, b) = match module_context.stack.peek(2) {
        Some(&[a, b]) => (a, b),
        _ => return Err(module_context.error(ErrorCode::InsufficientOperands, line)),
    };

    let name_a = module_context.fresh_name("swap_a", line);
    let name_b = module_context.fresh_name("swap_b", line);
    let (type_a, type_b): (ValueType, ValueType) = (a.value_type, b.value_type);

    lower(
        &[
            format!("local {type_a} {name_a}"),
            format!("local {type_b} {name_b}"),
            format!("localSet {name_b}"),
            format!("localSet {name_a}"),
            format!("push {name_b}"),
            format!("push {name_a}"),
        ],
        line,
        2,
        &[b, a],
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
    fn test_push_literals_and_strings() {
        assert!(compile_source("module m\npush -1\npush \"a\\0\"").is_ok_and(|(mc, _)| {
            mc.code.main == vec![0x41, 0x7F, 0x41, 0xE1, 0x00, 0x41, 0x00]
                && mc.stack.peek(3)
                    == Some(
                        &[
                            StackItem::int().non_zero(),
                            StackItem::int().non_zero(),
                            StackItem::int(),
                        ][..],
                    )
        }));
    }

    #[test]
    fn test_push_memory_forms() {
        let source =
            "module m\nint a 3\nint8[] buf 6\npush &buf\npush buf&\npush $buf\npush %buf\npush a";

        assert!(compile_source(source).is_ok_and(|(mc, _)| {
            mc.code.main
                == vec![
                    0x41, 0x04, // &buf
                    0x41, 0x09, // buf&
                    0x41, 0x06, // $buf
                    0x41, 0x01, // %buf
                    0x41, 0x00, 0x28, 0x02, 0x00, // a
                ]
                && mc.stack.iter().take(2).all(|item| item.is_safe_memory_address)
                && !mc.stack.top().is_some_and(|item| item.is_safe_memory_address)
        }));
    }

    #[test]
    fn test_push_dereferenced_pointer() {
        assert!(compile_source("module m\nfloat x\nfloat* p &x\npush *p").is_ok_and(|(mc, _)| {
            mc.code.main == vec![0x41, 0x04, 0x28, 0x02, 0x00, 0x2A, 0x02, 0x00]
                && mc.stack.top().is_some_and(|item| item.value_type == ValueType::Float)
        }));

        assert_eq!(
            error_code("module m\nint x\npush *x"),
            Some(ErrorCode::TypeMismatch)
        );
    }

    #[test]
    fn test_push_undeclared() {
        assert_eq!(
            error_code("module m\npush nothing"),
            Some(ErrorCode::UndeclaredIdentifier)
        );
        assert_eq!(
            error_code("module m\npush &other.thing"),
            Some(ErrorCode::UndeclaredIdentifier)
        );
    }

    #[test]
    fn test_dup_and_swap_preserve_flags() {
        assert!(compile_source("module m\nint x\npush &x\npush 2.5\nswap").is_ok_and(|(mc, _)| {
            mc.stack.peek(2)
                == Some(
                    &[
                        StackItem::of(ValueType::Float).non_zero(),
                        StackItem::int().safe_address(),
                    ][..],
                )
        }));

        assert!(compile_source("module m\npush 3\ndup").is_ok_and(|(mc, _)| {
            mc.stack.len() == 2
                && mc.stack.iter().all(|item| *item == StackItem::int().non_zero())
                // local.set 0, local.get 0, local.get 0
                && mc.code.main.ends_with(&[0x21, 0x00, 0x20, 0x00, 0x20, 0x00])
        }));
    }

    #[test]
    fn test_clear_stack() {
        assert!(compile_source("module m\npush 1\npush 2\nclearStack")
            .is_ok_and(|(mc, _)| mc.stack.is_empty() && mc.code.main.ends_with(&[0x1A, 0x1A])));
    }
}
