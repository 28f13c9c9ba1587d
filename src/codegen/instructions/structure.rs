use crate::{
    codegen::{
        constants::resolve_value,
        context::{
            module::{BlockFrame, BlockType},
            ModuleContext, ProgramContext,
        },
        error::{CompileError, ErrorCode, FallableAction},
    },
    common::{
        ast::{AstLine, UnitKind},
        Value,
    },
};

use super::{
    control_flow::{check_result, pop_frame},
    name_argument,
};

/// Open a code block of the given kind, naming the namespace after it.
///
/// A code block holds exactly one module, function or constants block.
pub(super) fn open_unit(
    line: &AstLine,
    kind: UnitKind,
    block_type: BlockType,
    module_context: &mut ModuleContext,
) -> Result<String, CompileError> {
    if module_context.unit.is_some() {
        return Err(module_context.error(ErrorCode::InvalidBlockNesting, line));
    }

    if line.argument(0).is_none() {
        return Err(module_context.error(ErrorCode::MissingModuleId, line));
    }

    let id = name_argument(line, 0, module_context)?.to_owned();

    module_context.namespace.id = Some(id.clone());
    module_context.unit = Some(kind);
    module_context.blocks.push(BlockFrame::new(block_type, 0));

    Ok(id)
}

pub fn module(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    open_unit(line, UnitKind::Module, BlockType::Module, module_context).map(|_| ())
}

/// Close the module and publish its memory for modules compiled later.
pub fn module_end(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let frame = pop_frame(line, BlockType::Module, module_context)?;
    check_result(line, &frame, module_context)?;

    if let Some(id) = &module_context.namespace.id {
        program_context.publish_memory(id, module_context.namespace.memory.items());
    }

    Ok(())
}

pub fn constants(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    open_unit(line, UnitKind::Constants, BlockType::Constants, module_context).map(|_| ())
}

/// Publish the block's constants under its name.
pub fn constants_end(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    pop_frame(line, BlockType::Constants, module_context)?;

    if let Some(id) = &module_context.namespace.id {
        program_context
            .namespaces
            .insert(id.clone(), module_context.namespace.consts.clone());
    }

    Ok(())
}

pub fn init_block(module_context: &mut ModuleContext) -> FallableAction {
    let depth = module_context.stack.len();
    module_context
        .blocks
        .push(BlockFrame::new(BlockType::Init, depth));

    Ok(())
}

pub fn init_block_end(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let frame = pop_frame(line, BlockType::Init, module_context)?;

    check_result(line, &frame, module_context)
}

/// Raw bytecode: every argument is a byte value.
pub fn wasm(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &ProgramContext,
) -> FallableAction {
    let bytes = line
        .arguments
        .iter()
        .map(|arg| match resolve_value(arg, module_context, program_context) {
            Ok(Value::Int(byte)) => u8::try_from(byte).map_err(|_| ErrorCode::ExpectedValue),
            Ok(_) => Err(ErrorCode::ExpectedValue),
            Err(code) => Err(code),
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|code| module_context.error(code, line))?;

    module_context.emit(&bytes);

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        codegen::{error::ErrorCode, instructions::tests::*},
        common::{ast::UnitKind, Value},
    };

    #[test]
    fn test_module_frame() {
        assert!(compile_source("module osc\nint a\nmoduleEnd").is_ok_and(|(mc, pc)| {
            mc.namespace.id.as_deref() == Some("osc")
                && mc.unit == Some(UnitKind::Module)
                && mc.blocks.is_empty()
                && pc.foreign_memory("osc", "a").is_some()
        }));

        assert_eq!(error_code("module"), Some(ErrorCode::MissingModuleId));
        assert_eq!(
            error_code("module m\npush 1\nmoduleEnd"),
            Some(ErrorCode::StackExpectedZeroElements)
        );
        assert_eq!(
            error_code("module m\nblock\nmoduleEnd"),
            Some(ErrorCode::MissingBlockStartInstruction)
        );
    }

    #[test]
    fn test_nesting() {
        assert_eq!(
            error_code("module a\nmodule b"),
            Some(ErrorCode::InvalidBlockNesting)
        );
        assert_eq!(
            error_code("module a\nmoduleEnd\nmodule b"),
            Some(ErrorCode::InvalidBlockNesting)
        );
        assert_eq!(
            error_code("module a\nfunction f"),
            Some(ErrorCode::InvalidBlockNesting)
        );
        assert_eq!(
            error_code("moduleEnd"),
            Some(ErrorCode::InstructionInvalidOutsideBlock)
        );
    }

    #[test]
    fn test_constants_block() {
        assert!(compile_source("constants env\nconst RATE 2\nconst GAIN 0.5\nconstantsEnd")
            .is_ok_and(|(_, pc)| {
                pc.constant("env.RATE") == Some(Value::Int(2))
                    && pc.constant("env.GAIN") == Some(Value::Float(0.5))
            }));

        assert_eq!(
            error_code("constants env\npush 1\nconstantsEnd"),
            Some(ErrorCode::InstructionNotAllowedInConstantsBlock)
        );
        assert_eq!(
            error_code("module m\nconstantsEnd"),
            Some(ErrorCode::InstructionInvalidOutsideBlock)
        );
    }

    #[test]
    fn test_init_block_segment() {
        assert!(compile_source("module m\ninitBlock\npush 1\ndrop\ninitBlockEnd\npush 2\ndrop")
            .is_ok_and(|(mc, _)| {
                mc.code.init == vec![0x41, 0x01, 0x1A] && mc.code.main == vec![0x41, 0x02, 0x1A]
            }));

        assert_eq!(
            error_code("module m\ninitBlock\npush 1\ninitBlockEnd"),
            Some(ErrorCode::StackExpectedZeroElements)
        );
    }

    #[test]
    fn test_flags() {
        assert!(compile_source("module m\nskipExecution\ninitOnly").is_ok_and(|(mc, _)| {
            mc.flags.skip_execution_in_cycle && mc.flags.init_only_execution
        }));
    }

    #[test]
    fn test_raw_bytes() {
        assert!(compile_source("module m\nwasm 1 0x0B")
            .is_ok_and(|(mc, _)| mc.code.main == vec![0x01, 0x0B] && mc.stack.is_empty()));

        assert_eq!(error_code("module m\nwasm 256"), Some(ErrorCode::ExpectedValue));
        assert_eq!(error_code("module m\nwasm 1.5"), Some(ErrorCode::ExpectedValue));
    }
}
