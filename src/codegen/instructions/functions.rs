use std::str::FromStr;

use crate::{
    codegen::{
        context::{module::BlockType, ModuleContext, ProgramContext},
        error::{ErrorCode, FallableAction},
        functions::{FunctionBuilder, MAX_SIGNATURE_LENGTH},
        stack::StackItem,
        validation::expect_type,
        wasm,
    },
    common::{
        ast::{AstLine, UnitKind},
        ValueType,
    },
};

use super::{
    control_flow::pop_frame, name_argument, structure::open_unit, value_type_argument,
};

pub fn function(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let name = open_unit(line, UnitKind::Function, BlockType::Function, module_context)?;

    module_context.namespace.locals.clear();
    module_context.function = Some(FunctionBuilder::new(name));

    Ok(())
}

/// `param type name`, only directly after `function`.
pub fn param(line: &AstLine, module_context: &mut ModuleContext) -> FallableAction {
    let value_type = value_type_argument(line, 0, module_context)?;
    let name = name_argument(line, 1, module_context)?;

    let parameters = module_context
        .function
        .as_ref()
        .map(|builder| builder.parameters.as_slice())
        .unwrap_or_default();

    if module_context.namespace.locals.len() != parameters.len()
        || !module_context.code.main.is_empty()
    {
        return Err(module_context.error(ErrorCode::ParamAfterFunctionBody, line));
    }

    if parameters.iter().any(|(parameter, _)| parameter == name) {
        return Err(module_context.error(ErrorCode::DuplicateParameterName, line));
    }

    if parameters.len() >= MAX_SIGNATURE_LENGTH {
        return Err(module_context.error(ErrorCode::FunctionSignatureOverflow, line));
    }

    module_context.namespace.add_local(name, value_type);
    if let Some(builder) = module_context.function.as_mut() {
        builder.parameters.push((name.to_owned(), value_type));
    }

    Ok(())
}

/// `functionEnd types…`: the stack has to hold exactly the returned values.
pub fn function_end(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &mut ProgramContext,
) -> FallableAction {
    let returns = line
        .arguments
        .iter()
        .map(|arg| {
            arg.as_identifier()
                .and_then(|name| ValueType::from_str(name).ok())
                .ok_or_else(|| module_context.error(ErrorCode::InvalidType, line))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if returns.len() > MAX_SIGNATURE_LENGTH {
        return Err(module_context.error(ErrorCode::FunctionSignatureOverflow, line));
    }

    pop_frame(line, BlockType::Function, module_context)?;

    if module_context.stack.len() < returns.len() {
        return Err(module_context.error(ErrorCode::InsufficientOperands, line));
    }

    if module_context.stack.len() > returns.len() {
        return Err(module_context.error(ErrorCode::StackExpectedZeroElements, line));
    }

    if module_context
        .stack
        .iter()
        .zip(&returns)
        .any(|(item, expected)| item.value_type != *expected)
    {
        return Err(module_context.error(ErrorCode::TypeMismatch, line));
    }

    module_context.stack.clear();

    if let Some(builder) = module_context.function.as_mut() {
        builder.returns = Some(returns);
        program_context
            .functions
            .define(&builder.name, builder.signature());
    }

    Ok(())
}

/// `call name`: consume the parameters, push placeholders for the returns.
pub fn call(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &ProgramContext,
) -> FallableAction {
    let name = name_argument(line, 0, module_context)?;

    let entry = program_context
        .functions
        .get(name)
        .ok_or_else(|| module_context.error(ErrorCode::UndeclaredFunction, line))?;
    let parameters = &entry.signature.parameters;

    let operands = module_context
        .stack
        .peek(parameters.len())
        .ok_or_else(|| module_context.error(ErrorCode::InsufficientOperands, line))?;

    operands
        .iter()
        .zip(parameters)
        .try_for_each(|(item, expected)| expect_type(*expected, item.value_type))
        .map_err(|code| module_context.error(code, line))?;

    let depth = module_context.stack.len() - parameters.len();
    module_context.stack.truncate(depth);
    module_context.stack.extend(
        entry
            .signature
            .returns
            .iter()
            .map(|value_type| StackItem::of(*value_type)),
    );

    if let Some(index) = entry.index {
        module_context.emit(&wasm::call(index));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        codegen::{
            context::ProgramContext,
            error::ErrorCode,
            functions::{FunctionSignature, MAX_SIGNATURE_LENGTH},
            instructions::tests::*,
            options::CompileOptions,
            stack::StackItem,
        },
        common::ValueType,
    };

    #[test]
    fn test_function_signature() {
        let source = "function mix\nparam float a\nparam float b\npush a\npush b\nadd\nfunctionEnd float";

        assert!(compile_source(source).is_ok_and(|(mc, pc)| {
            mc.stack.is_empty()
                && mc.namespace.locals.len() == 2
                && pc.functions.get("mix").is_some_and(|entry| {
                    entry.index == Some(0)
                        && entry.signature
                            == FunctionSignature {
                                parameters: vec![ValueType::Float, ValueType::Float],
                                returns: vec![ValueType::Float],
                            }
                })
        }));
    }

    #[test]
    fn test_param_errors() {
        assert_eq!(
            error_code("function f\nparam int x\nparam int x\nfunctionEnd int"),
            Some(ErrorCode::DuplicateParameterName)
        );
        assert_eq!(
            error_code("function f\nlocal int y\nparam int x"),
            Some(ErrorCode::ParamAfterFunctionBody)
        );
        assert_eq!(
            error_code("function f\npush 1\ndrop\nparam int x"),
            Some(ErrorCode::ParamAfterFunctionBody)
        );
        assert_eq!(
            error_code("module m\nparam int x"),
            Some(ErrorCode::InstructionInvalidOutsideBlock)
        );

        let params = (0..=MAX_SIGNATURE_LENGTH)
            .map(|i| format!("param int p{i}"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(
            error_code(&format!("function f\n{params}")),
            Some(ErrorCode::FunctionSignatureOverflow)
        );
    }

    #[test]
    fn test_function_end_errors() {
        assert_eq!(
            error_code("function f\nfunctionEnd int"),
            Some(ErrorCode::InsufficientOperands)
        );
        assert_eq!(
            error_code("function f\npush 1\npush 2\nfunctionEnd int"),
            Some(ErrorCode::StackExpectedZeroElements)
        );
        assert_eq!(
            error_code("function f\npush 1\npush 2.5\nfunctionEnd float int"),
            Some(ErrorCode::TypeMismatch)
        );
        assert_eq!(
            error_code("function f\nfunctionEnd double"),
            Some(ErrorCode::InvalidType)
        );
        assert_eq!(
            error_code("function f\nblock\nfunctionEnd"),
            Some(ErrorCode::MissingBlockStartInstruction)
        );
    }

    #[test]
    fn test_return_list_limit() {
        let pushes = |count: usize| vec!["push 1"; count].join("\n");
        let returns = |count: usize| vec!["int"; count].join(" ");

        assert!(compile_source(&format!(
            "function f\n{}\nfunctionEnd {}",
            pushes(MAX_SIGNATURE_LENGTH),
            returns(MAX_SIGNATURE_LENGTH)
        ))
        .is_ok_and(|(mc, _)| mc.function.is_some_and(|builder| builder
            .returns
            .is_some_and(|returns| returns.len() == MAX_SIGNATURE_LENGTH))));

        assert_eq!(
            error_code(&format!(
                "function f\n{}\nfunctionEnd {}",
                pushes(MAX_SIGNATURE_LENGTH + 1),
                returns(MAX_SIGNATURE_LENGTH + 1)
            )),
            Some(ErrorCode::FunctionSignatureOverflow)
        );
    }

    #[test]
    fn test_call() {
        let mut program_context = ProgramContext::new();
        program_context.functions.pre_register(
            "mix",
            FunctionSignature {
                parameters: vec![ValueType::Int, ValueType::Float64],
                returns: vec![ValueType::Float64, ValueType::Int],
            },
        );

        assert!(compile_source_with(
            "module m\npush 1\npush 2f64\ncall mix",
            &CompileOptions::default(),
            program_context
        )
        .is_ok_and(|(mc, _)| {
            mc.code.main.ends_with(&[0x10, 0x00])
                && mc.stack.peek(2)
                    == Some(&[StackItem::of(ValueType::Float64), StackItem::int()][..])
        }));
    }

    #[test]
    fn test_call_errors() {
        let program_context = || {
            let mut program_context = ProgramContext::new();
            program_context.functions.pre_register(
                "half",
                FunctionSignature {
                    parameters: vec![ValueType::Float64],
                    returns: vec![ValueType::Float64],
                },
            );
            program_context
        };
        let compile = |source: &str| {
            compile_source_with(source, &CompileOptions::default(), program_context())
                .err()
                .map(|err| err.code)
        };

        assert_eq!(
            compile("module m\npush 1.5\ncall half"),
            Some(ErrorCode::MixedFloatWidth)
        );
        assert_eq!(
            compile("module m\ncall half"),
            Some(ErrorCode::InsufficientOperands)
        );
        assert_eq!(
            compile("module m\ncall whole"),
            Some(ErrorCode::UndeclaredFunction)
        );
    }
}
