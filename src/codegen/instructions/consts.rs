use crate::{
    codegen::{
        constants::resolve_value,
        context::{ModuleContext, ProgramContext},
        error::{ErrorCode, FallableAction},
    },
    common::ast::AstLine,
};

use super::name_argument;

/// `const NAME value`
pub fn constant(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &ProgramContext,
) -> FallableAction {
    let name = name_argument(line, 0, module_context)?;

    if module_context.namespace.consts.contains_key(name) {
        return Err(module_context.error(ErrorCode::DuplicateIdentifier, line));
    }

    let value = line
        .argument(1)
        .ok_or(ErrorCode::MissingArgument)
        .and_then(|arg| resolve_value(arg, module_context, program_context))
        .map_err(|code| module_context.error(code, line))?;

    module_context.namespace.consts.insert(name.to_owned(), value);

    Ok(())
}

/// `use namespace`: bring a published constants block into scope.
/// Later imports shadow earlier ones.
pub fn use_namespace(
    line: &AstLine,
    module_context: &mut ModuleContext,
    program_context: &ProgramContext,
) -> FallableAction {
    let name = name_argument(line, 0, module_context)?;

    let constants = program_context
        .namespaces
        .get(name)
        .ok_or_else(|| module_context.error(ErrorCode::UndeclaredIdentifier, line))?;

    module_context
        .namespace
        .consts
        .extend(constants.iter().map(|(key, value)| (key.clone(), *value)));
    module_context.namespace.imports.push(name.to_owned());

    Ok(())
}
