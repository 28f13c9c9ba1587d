use crate::{
    codegen::{
        constants::{resolve_count, resolve_value},
        context::{ModuleContext, ProgramContext},
        error::{CompileError, ErrorCode, FallableAction},
        memory::{ElementKind, MemoryDeclaration},
        validation::expect_type,
        wasm,
    },
    common::{
        ast::{Argument, AstLine, Reference},
        Value,
    },
};

use super::{name_argument, value_type_argument};

/// Scalar declaration: `int [name] [default]`.
///
/// Without a name the declaration is anonymous and named after its line.
pub fn memory(
    line: &AstLine,
    kind: ElementKind,
    module_context: &mut ModuleContext,
    program_context: &ProgramContext,
) -> FallableAction {
    let (id, default) = match line.argument(0) {
        Some(Argument::Identifier(name)) if matches!(Reference::parse(name), Reference::Plain(_)) => {
            (name.clone(), line.argument(1))
        }
        first => (module_context.fresh_name("anonymous", line), first),
    };

    declare(line, id, 1, kind, default, module_context, program_context)
}

/// Buffer declaration: `int[] name size [default]`.
pub fn buffer(
    line: &AstLine,
    kind: ElementKind,
    module_context: &mut ModuleContext,
    program_context: &ProgramContext,
) -> FallableAction {
    let id = name_argument(line, 0, module_context)?.to_owned();

    let size = line
        .argument(1)
        .ok_or(ErrorCode::MissingArgument)
        .and_then(|arg| resolve_count(arg, module_context, program_context))
        .map_err(|code| module_context.error(code, line))?;

    declare(
        line,
        id,
        size,
        kind,
        line.argument(2),
        module_context,
        program_context,
    )
}

fn declare(
    line: &AstLine,
    id: String,
    number_of_elements: u32,
    kind: ElementKind,
    default: Option<&Argument>,
    module_context: &mut ModuleContext,
    program_context: &ProgramContext,
) -> FallableAction {
    if module_context.namespace.memory.contains(&id) {
        return Err(module_context.error(ErrorCode::DuplicateIdentifier, line));
    }

    let default = match default {
        Some(argument) => resolve_default(argument, line, module_context, program_context)?,
        None => Value::zero(kind.value_type),
    };

    let memory_size_bytes = module_context.options.memory_size_bytes;
    let declaration = MemoryDeclaration {
        id,
        number_of_elements,
        kind,
        default,
    };

    module_context
        .namespace
        .memory
        .allocate(declaration, memory_size_bytes)
        .map(|_| ())
        .map_err(|code| module_context.error(code, line))
}

/// Default of a declaration: a value, or an address of declared memory.
fn resolve_default(
    argument: &Argument,
    line: &AstLine,
    module_context: &ModuleContext,
    program_context: &ProgramContext,
) -> Result<Value, CompileError> {
    let address = match argument {
        Argument::Identifier(name) => match Reference::parse(name) {
            Reference::Address { module, name } => {
                Some(memory_address(module, name, false, module_context, program_context))
            }
            Reference::EndAddress { module, name } => {
                Some(memory_address(module, name, true, module_context, program_context))
            }
            _ => None,
        },
        _ => None,
    };

    match address {
        Some(address) => address
            .and_then(|address| i32::try_from(address).ok())
            .map(Value::Int)
            .ok_or_else(|| module_context.error(ErrorCode::UndeclaredIdentifier, line)),
        None => resolve_value(argument, module_context, program_context)
            .map_err(|code| module_context.error(code, line)),
    }
}

fn memory_address(
    module: Option<&str>,
    name: &str,
    is_end: bool,
    module_context: &ModuleContext,
    program_context: &ProgramContext,
) -> Option<u32> {
    let item = match module {
        Some(module) => program_context.foreign_memory(module, name),
        None => module_context.namespace.memory.get(name),
    }?;

    Some(if is_end {
        item.end_byte_address()
    } else {
        item.byte_address
    })
}

/// `local type name`
pub fn local(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let value_type = value_type_argument(line, 0, module_context)?;
    let name = name_argument(line, 1, module_context)?;

    if module_context.namespace.local(name).is_some() {
        return Err(module_context.error(ErrorCode::DuplicateIdentifier, line));
    }

    module_context.namespace.add_local(name, value_type);

    Ok(())
}

/// `localSet name`: pop into a local of the same type.
pub fn local_set(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let name = name_argument(line, 0, module_context)?;

    let (index, value_type) = module_context
        .namespace
        .local(name)
        .map(|(index, local)| (index, local.value_type))
        .ok_or_else(|| module_context.error(ErrorCode::UndeclaredIdentifier, line))?;

    let operand = module_context
        .stack
        .top()
        .map(|item| item.value_type)
        .ok_or_else(|| module_context.error(ErrorCode::InsufficientOperands, line))?;

    expect_type(value_type, operand).map_err(|code| module_context.error(code, line))?;

    module_context.pop_operand(line)?;
    module_context.emit(&wasm::local_set(index));

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        codegen::{
            context::ProgramContext, error::ErrorCode, instructions::tests::*,
            options::CompileOptions,
        },
        common::Value,
    };

    #[test]
    fn test_scalar_declarations() {
        assert!(compile_source("module m\nint a 5\nfloat b\nint\nfloat64 d 2").is_ok_and(|(mc, _)| {
            let memory = &mc.namespace.memory;

            memory.get("a").is_some_and(|item| item.default == Value::Int(5))
                && memory.get("b").is_some_and(|item| item.default == Value::Float(0.0))
                && memory.get("__anonymous_4").is_some()
                && memory.get("d").is_some_and(|item| {
                    item.default == Value::Float64(2.0) && item.byte_address % 8 == 0
                })
        }));
    }

    #[test]
    fn test_buffer_declarations() {
        assert!(compile_source("module m\nconst SIZE 3\nint16u[] buf SIZE 7").is_ok_and(|(mc, _)| {
            mc.namespace.memory.get("buf").is_some_and(|item| {
                item.number_of_elements == 3
                    && item.element_word_size == 2
                    && item.is_unsigned
                    && item.word_aligned_size == 2
                    && item.default == Value::Int(7)
            })
        }));

        assert_eq!(
            error_code("module m\nint[] buf 0"),
            Some(ErrorCode::ExpectedValue)
        );
        assert_eq!(
            error_code("module m\nint[] buf"),
            Some(ErrorCode::MissingArgument)
        );
        assert_eq!(
            error_code("module m\nint[] &buf 2"),
            Some(ErrorCode::ExpectedIdentifier)
        );
    }

    #[test]
    fn test_duplicate_and_out_of_bounds() {
        assert_eq!(
            error_code("module m\nint a\nfloat a"),
            Some(ErrorCode::DuplicateIdentifier)
        );

        let options = CompileOptions {
            memory_size_bytes: 16,
            ..CompileOptions::default()
        };
        assert!(
            compile_source_with("module m\nint[] a 4\nint b", &options, ProgramContext::new())
                .is_err_and(|err| err.code == ErrorCode::MemoryOutOfBounds)
        );
    }

    #[test]
    fn test_address_defaults() {
        let mut program_context = ProgramContext::new();
        let (foreign, _) = compile_source("module other\nint pad\nint[] data 4")
            .expect("foreign module should compile");
        program_context.publish_memory("other", foreign.namespace.memory.items());

        let source = "module m\nint[] buf 2\nint* start &buf\nint* end buf&\nint* remote &other.data";

        assert!(
            compile_source_with(source, &CompileOptions::default(), program_context).is_ok_and(
                |(mc, _)| {
                    let memory = &mc.namespace.memory;
                    let default = |id: &str| memory.get(id).map(|item| item.default);

                    default("start") == Some(Value::Int(0))
                        && default("end") == Some(Value::Int(4))
                        && default("remote") == Some(Value::Int(4))
                        && memory.get("start").is_some_and(|item| item.is_pointer)
                }
            )
        );

        assert_eq!(
            error_code("module m\nint* p &missing"),
            Some(ErrorCode::UndeclaredIdentifier)
        );
    }

    #[test]
    fn test_memory_outside_module() {
        assert_eq!(
            error_code("function f\nint a\nfunctionEnd"),
            Some(ErrorCode::InstructionInvalidOutsideBlock)
        );
    }

    #[test]
    fn test_locals() {
        assert!(compile_source("module m\nlocal float x\npush 1.5\nlocalSet x")
            .is_ok_and(|(mc, _)| mc.code.main.ends_with(&[0x21, 0x00]) && mc.stack.is_empty()));

        assert_eq!(
            error_code("module m\nlocal float x\npush 1\nlocalSet x"),
            Some(ErrorCode::OnlyFloats)
        );
        assert_eq!(
            error_code("module m\nlocal int x\nlocal float x"),
            Some(ErrorCode::DuplicateIdentifier)
        );
        assert_eq!(
            error_code("module m\nlocal double x"),
            Some(ErrorCode::InvalidType)
        );
        assert_eq!(
            error_code("module m\npush 1\nlocalSet y"),
            Some(ErrorCode::UndeclaredIdentifier)
        );
    }
}
