use std::collections::HashMap;

use serde::Serialize;

use crate::{
    codegen::{
        error::{CompileError, ContextSnapshot, ErrorCode},
        functions::FunctionBuilder,
        memory::MemoryMap,
        options::CompileOptions,
        stack::{OperandStack, StackItem},
    },
    common::{
        ast::{AstLine, Directives, UnitKind},
        Value, ValueType,
    },
};

// region: Context

/// Context information regarding the code block currently being compiled.
#[derive(Debug)]
pub struct Context {
    pub namespace: Namespace,
    pub stack: OperandStack,
    pub blocks: BlockStack,
    pub code: CodeSegments,
    pub options: CompileOptions,
    pub flags: Directives,
    /// Kind of the opened code block, set by its opening instruction.
    pub unit: Option<UnitKind>,
    pub function: Option<FunctionBuilder>,
}

impl Context {
    pub fn new(options: &CompileOptions) -> Self {
        Self {
            namespace: Namespace::new(options.starting_memory_word_address),
            stack: OperandStack::new(),
            blocks: BlockStack::new(),
            code: CodeSegments::default(),
            options: options.clone(),
            flags: Directives::default(),
            unit: None,
            function: None,
        }
    }

    /// Append bytecode to the active segment
    /// (init segment inside an `initBlock`, main segment otherwise).
    pub fn emit(&mut self, bytes: &[u8]) {
        if self.blocks.contains(BlockType::Init) {
            self.code.init.extend_from_slice(bytes);
        } else {
            self.code.main.extend_from_slice(bytes);
        }
    }

    pub fn error(&self, code: ErrorCode, line: &AstLine) -> CompileError {
        CompileError {
            code,
            line: Some(line.clone()),
            context: self.snapshot(),
        }
    }

    /// Error concerning the whole code block rather than a single line.
    pub fn unit_error(&self, code: ErrorCode) -> CompileError {
        CompileError {
            code,
            line: None,
            context: self.snapshot(),
        }
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            module: self.namespace.id.clone(),
            stack: self.stack.iter().map(ToString::to_string).collect(),
            blocks: self.blocks.frames.iter().map(|f| f.block_type).collect(),
        }
    }

    pub fn pop_operand(&mut self, line: &AstLine) -> Result<StackItem, CompileError> {
        self.stack
            .pop()
            .ok_or_else(|| self.error(ErrorCode::InsufficientOperands, line))
    }

    /// Name for a compiler-generated local or memory cell,
    /// unique within the code block and tied to the source line.
    pub fn fresh_name(&self, purpose: &str, line: &AstLine) -> String {
        let base = format!("__{purpose}_{}", line.line_number);
        let is_taken = |name: &str| {
            self.namespace.local(name).is_some()
                || self.namespace.memory.contains(name)
                || self.namespace.consts.contains_key(name)
        };

        if !is_taken(&base) {
            return base;
        }

        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|name| !is_taken(name))
            .unwrap_or(base)
    }

    /// Bind `value` to a fresh constant name, so lowered code can push
    /// it without going through its text form.
    pub fn bind_constant(&mut self, purpose: &str, value: Value, line: &AstLine) -> String {
        let name = self.fresh_name(purpose, line);
        self.namespace.consts.insert(name.clone(), value);

        name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeSegments {
    pub init: Vec<u8>,
    pub main: Vec<u8>,
}

// endregion

// region: Namespace

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Local {
    pub name: String,
    pub value_type: ValueType,
}

/// Identifiers declared by the code block being compiled.
#[derive(Debug)]
pub struct Namespace {
    pub id: Option<String>,
    /// Locals in index order (function parameters first).
    pub locals: Vec<Local>,
    pub memory: MemoryMap,
    pub consts: HashMap<String, Value>,
    /// Constant namespaces merged in with `use`.
    pub imports: Vec<String>,
}

impl Namespace {
    pub fn new(starting_word_address: u32) -> Self {
        Self {
            id: None,
            locals: Vec::new(),
            memory: MemoryMap::new(starting_word_address),
            consts: HashMap::new(),
            imports: Vec::new(),
        }
    }

    /// Look up a local, returning its index.
    pub fn local(&self, name: &str) -> Option<(u32, &Local)> {
        self.locals
            .iter()
            .enumerate()
            .find(|(_, local)| local.name == name)
            .and_then(|(index, local)| u32::try_from(index).ok().map(|index| (index, local)))
    }

    pub fn add_local(&mut self, name: &str, value_type: ValueType) -> u32 {
        self.locals.push(Local {
            name: name.to_owned(),
            value_type,
        });

        u32::try_from(self.locals.len() - 1).unwrap_or(u32::MAX)
    }
}

// endregion

// region: Blocks

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum BlockType {
    Module,
    Function,
    Loop,
    Condition,
    Block,
    Constants,
    Map,
    Init,
}

/// Rows collected between `mapBegin` and `mapEnd`.
#[derive(Debug, Clone, PartialEq)]
pub struct MapState {
    pub input_type: ValueType,
    pub rows: Vec<(Value, Value)>,
    pub default: Option<Value>,
    /// Type shared by every row value and the default.
    pub value_type: Option<ValueType>,
}

impl MapState {
    pub const fn new(input_type: ValueType) -> Self {
        Self {
            input_type,
            rows: Vec::new(),
            default: None,
            value_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockFrame {
    pub block_type: BlockType,
    pub expected_result: Option<ValueType>,
    /// Operand stack depth when the frame was opened.
    pub stack_depth: usize,
    pub has_else: bool,
    pub map: Option<MapState>,
}

impl BlockFrame {
    pub const fn new(block_type: BlockType, stack_depth: usize) -> Self {
        Self {
            block_type,
            expected_result: None,
            stack_depth,
            has_else: false,
            map: None,
        }
    }

    pub fn with_result(self, expected_result: Option<ValueType>) -> Self {
        Self {
            expected_result,
            ..self
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockStack {
    frames: Vec<BlockFrame>,
}

impl BlockStack {
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: BlockFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<BlockFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&BlockFrame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut BlockFrame> {
        self.frames.last_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether a frame of the given type is open anywhere in the stack.
    pub fn contains(&self, block_type: BlockType) -> bool {
        self.frames.iter().any(|f| f.block_type == block_type)
    }

    /// Number of frames that `br` can target.
    pub fn branch_targets(&self) -> usize {
        self.frames
            .iter()
            .map(|frame| match frame.block_type {
                // lowered to `block` + `loop`
                BlockType::Loop => 2,
                BlockType::Condition | BlockType::Block => 1,
                _ => 0,
            })
            .sum()
    }
}

// endregion
