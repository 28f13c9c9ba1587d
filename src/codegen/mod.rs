//! Logic for converting parsed code blocks (_AST_) into
//! bytecode, memory layout and the function table.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::common::{
    ast::{Ast, UnitKind},
    Value,
};

use context::{module::Local, ModuleContext, ProgramContext};
use error::{CompileError, ContextSnapshot, ErrorCode};
use functions::{scan_signature, FunctionSignature};
use instructions::compile_line;
use memory::MemoryItem;
use options::CompileOptions;

pub mod constants;
pub mod context;
pub mod error;
pub mod functions;
pub mod instructions;
pub mod linker;
mod lowering;
pub mod memory;
pub mod options;
pub mod stack;
pub mod validation;
pub mod wasm;

// region: compiled units

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledModule {
    pub id: String,
    pub init_code: Vec<u8>,
    pub code: Vec<u8>,
    pub locals: Vec<Local>,
    pub memory_map: BTreeMap<String, MemoryItem>,
    pub word_aligned_size: u32,
    pub starting_word_address: u32,
    pub skip_execution_in_cycle: bool,
    pub init_only_execution: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ast: Option<Ast>,
}

impl CompiledModule {
    /// First word address after this module's memory.
    pub const fn end_word_address(&self) -> Option<u32> {
        self.starting_word_address.checked_add(self.word_aligned_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledFunction {
    pub id: String,
    /// Position in the function table.
    pub index: u32,
    pub signature: FunctionSignature,
    /// Locals in index order, parameters first.
    pub locals: Vec<Local>,
    pub code: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ast: Option<Ast>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledConstants {
    pub id: String,
    pub values: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CompiledUnit {
    Module(CompiledModule),
    Function(CompiledFunction),
    Constants(CompiledConstants),
}

impl CompiledUnit {
    pub fn id(&self) -> &str {
        match self {
            Self::Module(module) => &module.id,
            Self::Function(function) => &function.id,
            Self::Constants(constants) => &constants.id,
        }
    }
}

// endregion

/// Compile a single code block (module, function or constants block).
///
/// Memory and constants it publishes are added to `program_context`.
pub fn compile_module(
    ast: &Ast,
    options: &CompileOptions,
    program_context: &mut ProgramContext,
) -> Result<CompiledUnit, CompileError> {
    let mut module_context = ModuleContext::new(options);

    if !ast.directives.is_empty() && ast.unit_kind() != Some(UnitKind::Module) {
        return Err(module_context.unit_error(ErrorCode::DirectiveInvalidContext));
    }
    module_context.flags = ast.directives;

    for line in &ast.lines {
        compile_line(line, &mut module_context, program_context)?;
    }

    if !module_context.blocks.is_empty() {
        return Err(module_context.unit_error(ErrorCode::MissingBlockEndInstruction));
    }

    let (Some(unit), Some(id)) = (module_context.unit, module_context.namespace.id.clone()) else {
        return Err(module_context.unit_error(ErrorCode::MissingModuleId));
    };

    let ast = options.include_ast.then(|| ast.clone());

    let compiled = match unit {
        UnitKind::Module => CompiledUnit::Module(CompiledModule {
            word_aligned_size: module_context.namespace.memory.word_size(),
            starting_word_address: options.starting_memory_word_address,
            skip_execution_in_cycle: module_context.flags.skip_execution_in_cycle,
            init_only_execution: module_context.flags.init_only_execution,
            memory_map: module_context
                .namespace
                .memory
                .into_items()
                .into_iter()
                .map(|item| (item.id.clone(), item))
                .collect(),
            init_code: module_context.code.init,
            code: module_context.code.main,
            locals: module_context.namespace.locals,
            id,
            ast,
        }),
        UnitKind::Function => {
            let entry = program_context
                .functions
                .get(&id)
                .cloned()
                .ok_or_else(|| module_context.unit_error(ErrorCode::UndeclaredFunction))?;
            let index = entry
                .index
                .ok_or_else(|| module_context.unit_error(ErrorCode::UndeclaredFunction))?;

            CompiledUnit::Function(CompiledFunction {
                index,
                signature: entry.signature,
                locals: module_context.namespace.locals,
                code: module_context.code.main,
                id,
                ast,
            })
        }
        UnitKind::Constants => CompiledUnit::Constants(CompiledConstants {
            values: module_context.namespace.consts.into_iter().collect(),
            id,
        }),
    };

    debug!(unit = compiled.id(), "compiled code block");

    Ok(compiled)
}

// region: program

/// Every code block of a program, compiled in dependency order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub constants: Vec<CompiledConstants>,
    pub functions: Vec<CompiledFunction>,
    /// In execution (and memory) order.
    pub modules: Vec<CompiledModule>,
    /// Words of memory used by all modules, starting at word 0.
    pub memory_word_size: u32,
    pub options: CompileOptions,
}

/// Program-level metadata, without the compiled code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest<'a> {
    pub module_order: Vec<&'a str>,
    pub function_table: Vec<(&'a str, &'a FunctionSignature)>,
    pub constants: Vec<&'a str>,
    pub memory_word_size: u32,
    pub options: &'a CompileOptions,
}

impl Program {
    pub fn manifest(&self) -> Manifest<'_> {
        let mut function_table = self.functions.iter().collect::<Vec<_>>();
        function_table.sort_by_key(|function| function.index);

        Manifest {
            module_order: self.modules.iter().map(|m| m.id.as_str()).collect(),
            function_table: function_table
                .into_iter()
                .map(|function| (function.id.as_str(), &function.signature))
                .collect(),
            constants: self.constants.iter().map(|c| c.id.as_str()).collect(),
            memory_word_size: self.memory_word_size,
            options: &self.options,
        }
    }
}

/// Compile a whole program: constants blocks first, then functions,
/// then modules ordered by [`linker::sort_modules`], each module's memory
/// placed right after the previous one's.
pub fn compile_program(
    units: Vec<Ast>,
    options: &CompileOptions,
) -> Result<Program, CompileError> {
    let mut program_context = ProgramContext::with_options(options);

    for (name, signature) in units.iter().filter_map(scan_signature) {
        program_context.functions.pre_register(&name, signature);
    }

    let (constants, rest): (Vec<_>, Vec<_>) = units
        .into_iter()
        .partition(|ast| ast.unit_kind() == Some(UnitKind::Constants));
    let (functions, modules): (Vec<_>, Vec<_>) = rest
        .into_iter()
        .partition(|ast| ast.unit_kind() == Some(UnitKind::Function));
    let modules = linker::sort_modules(modules);

    let mut program = Program {
        constants: Vec::new(),
        functions: Vec::new(),
        modules: Vec::new(),
        memory_word_size: 0,
        options: options.clone(),
    };

    for ast in constants.iter().chain(&functions) {
        match compile_module(ast, options, &mut program_context)? {
            CompiledUnit::Constants(compiled) => program.constants.push(compiled),
            CompiledUnit::Function(compiled) => program.functions.push(compiled),
            CompiledUnit::Module(compiled) => program.modules.push(compiled),
        }
    }

    let mut next_word_address = options.starting_memory_word_address;

    for ast in &modules {
        let module_options = CompileOptions {
            starting_memory_word_address: next_word_address,
            ..options.clone()
        };

        match compile_module(ast, &module_options, &mut program_context)? {
            CompiledUnit::Module(compiled) => {
                next_word_address = compiled.end_word_address().ok_or_else(|| CompileError {
                    code: ErrorCode::MemoryOutOfBounds,
                    line: None,
                    context: ContextSnapshot {
                        module: Some(compiled.id.clone()),
                        ..ContextSnapshot::default()
                    },
                })?;
                program.modules.push(compiled);
            }
            CompiledUnit::Function(compiled) => program.functions.push(compiled),
            CompiledUnit::Constants(compiled) => program.constants.push(compiled),
        }
    }

    program.memory_word_size = next_word_address;

    info!(
        modules = program.modules.len(),
        functions = program.functions.len(),
        constants = program.constants.len(),
        memory_words = program.memory_word_size,
        "compiled program"
    );

    Ok(program)
}

// endregion


#[cfg(test)]
mod tests {
    use crate::parser::parse_unit;

    use super::{tests_support::Machine, *};

    fn ast(source: &str) -> Ast {
        parse_unit(source).expect("source should parse")
    }

    fn compile(source: &str) -> Result<CompiledUnit, CompileError> {
        compile_module(
            &ast(source),
            &CompileOptions::default(),
            &mut ProgramContext::new(),
        )
    }

    #[test]
    fn test_addition_end_to_end() {
        let source =
            "module m\nint a\nint b\nint c\npush &c\npush a\npush b\nadd\nstore\nmoduleEnd";

        let Ok(CompiledUnit::Module(module)) = compile(source) else {
            panic!("module should compile");
        };

        let address = |id: &str| module.memory_map[id].byte_address;
        let mut machine = Machine::new(64);
        machine.store(address("a"), 2);
        machine.store(address("b"), 2);

        assert_eq!(machine.run(&module.code, module.locals.len()), Ok(()));
        assert_eq!(machine.load(address("c")), 4);
    }

    #[test]
    fn test_lowered_dup_end_to_end() {
        let source = "module m\nint a\nint b\npush &b\npush a\ndup\nmul\nstore\nmoduleEnd";

        let Ok(CompiledUnit::Module(module)) = compile(source) else {
            panic!("module should compile");
        };

        let mut machine = Machine::new(64);
        machine.store(module.memory_map["a"].byte_address, 7);

        assert_eq!(machine.run(&module.code, module.locals.len()), Ok(()));
        assert_eq!(machine.load(module.memory_map["b"].byte_address), 49);
    }

    #[test]
    fn test_unit_errors() {
        assert!(compile("module m\nblock")
            .is_err_and(|err| err.code == ErrorCode::MissingBlockEndInstruction && err.line.is_none()));
        assert!(compile("").is_err_and(|err| err.code == ErrorCode::MissingModuleId));
        assert!(compile("#initOnly\nfunction f\nfunctionEnd")
            .is_err_and(|err| err.code == ErrorCode::DirectiveInvalidContext));
    }

    #[test]
    fn test_directives_and_flags_combine() {
        assert!(compile("#skipExecution\nmodule m\ninitOnly\nmoduleEnd").is_ok_and(|unit| {
            matches!(
                unit,
                CompiledUnit::Module(CompiledModule {
                    skip_execution_in_cycle: true,
                    init_only_execution: true,
                    ..
                })
            )
        }));
    }

    #[test]
    fn test_program_order_and_memory() {
        let units = vec![
            ast("module b\nint[] data 3 &a.value\nmoduleEnd"),
            ast("function twice\nparam int x\npush x\npush x\nadd\nfunctionEnd int"),
            ast("module a\nuse env\nint value RATE\npush 4\ncall twice\ndrop\nmoduleEnd"),
            ast("constants env\nconst RATE 48\nconstantsEnd"),
        ];

        let program = compile_program(units, &CompileOptions::default());

        assert!(program.is_ok_and(|program| {
            let order = program.modules.iter().map(|m| m.id.as_str()).collect::<Vec<_>>();
            let a = &program.modules[0];
            let b = &program.modules[1];

            order == vec!["a", "b"]
                && a.memory_map["value"].default == Value::Int(48)
                && a.code.windows(2).any(|w| w == [0x10, 0x00])
                && b.starting_word_address == 1
                && b.memory_map["data"].byte_address == 4
                && b.memory_map["data"].default == Value::Int(0)
                && program.memory_word_size == 4
                && program.functions.first().is_some_and(|f| f.index == 0)
                && program.manifest().module_order == vec!["a", "b"]
        }));
    }

    #[test]
    fn test_calls_reach_functions_declared_later() {
        let units = vec![
            ast("function first\npush 1\ncall second\nfunctionEnd int"),
            ast("function second\nparam int x\npush x\nfunctionEnd int"),
        ];

        assert!(
            compile_program(units, &CompileOptions::default()).is_ok_and(|program| {
                program.functions[0].code.ends_with(&[0x10, 0x01])
                    && program.manifest().function_table[1].0 == "second"
            })
        );
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let sources = [
            "module mixer\nint gain 3\nfloat level 0.5\nfloat64[] history 2\npush &gain\npush gain\npush 2\nmul\nstore\nmoduleEnd",
            "module meter\nint* input &mixer.gain\nlocal int peak\npush 1\nlocalSet peak\nmoduleEnd",
            "function scale\nparam float x\npush x\npush 2.0\nmul\nfunctionEnd float",
        ];
        let units = || sources.iter().map(|source| ast(source)).collect::<Vec<_>>();

        let first = compile_program(units(), &CompileOptions::default());
        let second = compile_program(units(), &CompileOptions::default());

        assert!(first.is_ok_and(|first| second.is_ok_and(|second| {
            first == second
                && first
                    .modules
                    .iter()
                    .zip(&second.modules)
                    .all(|(a, b)| a.code == b.code && a.memory_map == b.memory_map)
        })));
    }

    #[test]
    fn test_starting_address_overflow_is_reported() {
        let options = CompileOptions {
            starting_memory_word_address: u32::MAX,
            memory_size_bytes: u32::MAX,
            ..CompileOptions::default()
        };

        assert!(
            compile_program(vec![ast("module m\nfloat64 d\nmoduleEnd")], &options)
                .is_err_and(|err| err.code == ErrorCode::MemoryOutOfBounds)
        );
        assert!(
            compile_program(vec![ast("module m\nmoduleEnd")], &options)
                .is_ok_and(|program| program.memory_word_size == u32::MAX)
        );
    }

    #[test]
    fn test_include_ast() {
        let options = CompileOptions {
            include_ast: true,
            ..CompileOptions::default()
        };

        assert!(
            compile_module(&ast("module m\nmoduleEnd"), &options, &mut ProgramContext::new())
                .is_ok_and(|unit| matches!(unit, CompiledUnit::Module(module) if module.ast.is_some()))
        );
    }
}
