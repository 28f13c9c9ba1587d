//! WebAssembly opcodes and immediate encodings emitted by the compiler.

use crate::common::{Value, ValueType};

// region: Opcode

/// Opcodes, using their WebAssembly byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Opcode {
    Block = 0x02,
    Loop = 0x03,
    If = 0x04,
    Else = 0x05,
    End = 0x0B,
    Br = 0x0C,
    BrIf = 0x0D,
    Call = 0x10,
    Drop = 0x1A,
    LocalGet = 0x20,
    LocalSet = 0x21,

    I32Load = 0x28,
    F32Load = 0x2A,
    F64Load = 0x2B,
    I32Load8S = 0x2C,
    I32Load8U = 0x2D,
    I32Load16S = 0x2E,
    I32Load16U = 0x2F,
    I32Store = 0x36,
    F32Store = 0x38,
    F64Store = 0x39,
    I32Store8 = 0x3A,
    I32Store16 = 0x3B,

    I32Const = 0x41,
    F32Const = 0x43,
    F64Const = 0x44,

    I32Eqz = 0x45,
    I32Eq = 0x46,
    I32Ne = 0x47,
    I32LtS = 0x48,
    I32GtS = 0x4A,
    I32LeS = 0x4C,
    I32GeS = 0x4E,
    I32GeU = 0x4F,
    F32Eq = 0x5B,
    F32Ne = 0x5C,
    F32Lt = 0x5D,
    F32Gt = 0x5E,
    F32Le = 0x5F,
    F32Ge = 0x60,
    F64Eq = 0x61,
    F64Ne = 0x62,
    F64Lt = 0x63,
    F64Gt = 0x64,
    F64Le = 0x65,
    F64Ge = 0x66,

    I32Add = 0x6A,
    I32Sub = 0x6B,
    I32Mul = 0x6C,
    I32DivS = 0x6D,
    I32RemS = 0x6F,
    I32And = 0x71,
    I32Or = 0x72,
    I32Xor = 0x73,
    I32Shl = 0x74,
    I32ShrS = 0x75,
    I32ShrU = 0x76,

    F32Abs = 0x8B,
    F32Nearest = 0x90,
    F32Sqrt = 0x91,
    F32Add = 0x92,
    F32Sub = 0x93,
    F32Mul = 0x94,
    F32Div = 0x95,
    F64Abs = 0x99,
    F64Nearest = 0x9E,
    F64Sqrt = 0x9F,
    F64Add = 0xA0,
    F64Sub = 0xA1,
    F64Mul = 0xA2,
    F64Div = 0xA3,

    I32TruncF32S = 0xA8,
    I32TruncF64S = 0xAA,
    F32ConvertI32S = 0xB2,
    F32DemoteF64 = 0xB6,
    F64ConvertI32S = 0xB7,
    F64PromoteF32 = 0xBB,
}

impl Opcode {
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Pick the variant matching the operand type.
    pub const fn by_type(value_type: ValueType, int: Self, float: Self, float64: Self) -> Self {
        match value_type {
            ValueType::Int => int,
            ValueType::Float => float,
            ValueType::Float64 => float64,
        }
    }

    /// Natural alignment (log2 of the access width) of a memory opcode.
    const fn natural_alignment(self) -> u32 {
        match self {
            Self::I32Load8S | Self::I32Load8U | Self::I32Store8 => 0,
            Self::I32Load16S | Self::I32Load16U | Self::I32Store16 => 1,
            Self::F64Load | Self::F64Store => 3,
            _ => 2,
        }
    }

    /// Number of bytes a memory opcode reads or writes.
    pub const fn access_width(self) -> u32 {
        1 << self.natural_alignment()
    }
}

// endregion

// region: Block types

/// Result type of a structured control instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockResult {
    Void,
    Value(ValueType),
}

impl BlockResult {
    pub const fn byte(self) -> u8 {
        match self {
            Self::Void => 0x40,
            Self::Value(ValueType::Int) => 0x7F,
            Self::Value(ValueType::Float) => 0x7D,
            Self::Value(ValueType::Float64) => 0x7C,
        }
    }
}

impl From<Option<ValueType>> for BlockResult {
    fn from(value_type: Option<ValueType>) -> Self {
        value_type.map_or(Self::Void, Self::Value)
    }
}

// endregion

// region: Instruction utility functions

/// Utility function for a single opcode without immediates.
pub fn op(opcode: Opcode) -> Vec<u8> {
    vec![opcode.byte()]
}

/// Utility function for the `i32.const` instruction.
pub fn i32_const(value: i32) -> Vec<u8> {
    let mut bytes = vec![Opcode::I32Const.byte()];
    write_leb128_i32(value, &mut bytes);
    bytes
}

/// Utility function for the `f32.const` instruction.
pub fn f32_const(value: f32) -> Vec<u8> {
    [vec![Opcode::F32Const.byte()], value.to_le_bytes().to_vec()].concat()
}

/// Utility function for the `f64.const` instruction.
pub fn f64_const(value: f64) -> Vec<u8> {
    [vec![Opcode::F64Const.byte()], value.to_le_bytes().to_vec()].concat()
}

/// Utility function for the `*.const` instruction matching the value's type.
pub fn constant(value: Value) -> Vec<u8> {
    match value {
        Value::Int(value) => i32_const(value),
        Value::Float(value) => f32_const(value),
        Value::Float64(value) => f64_const(value),
    }
}

/// Utility function for the `local.get` instruction.
pub fn local_get(index: u32) -> Vec<u8> {
    with_index(Opcode::LocalGet, index)
}

/// Utility function for the `local.set` instruction.
pub fn local_set(index: u32) -> Vec<u8> {
    with_index(Opcode::LocalSet, index)
}

/// Utility function for the `call` instruction.
pub fn call(function_index: u32) -> Vec<u8> {
    with_index(Opcode::Call, function_index)
}

/// Utility function for the `br` instruction.
pub fn br(depth: u32) -> Vec<u8> {
    with_index(Opcode::Br, depth)
}

/// Utility function for the `br_if` instruction.
pub fn br_if(depth: u32) -> Vec<u8> {
    with_index(Opcode::BrIf, depth)
}

/// Utility function for the `block`, `loop` and `if` instructions.
pub fn structured(opcode: Opcode, result: BlockResult) -> Vec<u8> {
    vec![opcode.byte(), result.byte()]
}

/// Utility function for loads and stores, with natural alignment and no offset.
pub fn memory(opcode: Opcode) -> Vec<u8> {
    let mut bytes = vec![opcode.byte()];
    write_leb128_u32(opcode.natural_alignment(), &mut bytes);
    write_leb128_u32(0, &mut bytes);
    bytes
}

fn with_index(opcode: Opcode, index: u32) -> Vec<u8> {
    let mut bytes = vec![opcode.byte()];
    write_leb128_u32(index, &mut bytes);
    bytes
}

// endregion

// region: LEB128

pub fn write_leb128_u32(value: u32, output: &mut Vec<u8>) {
    let mut value = value;
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        output.push(byte);
        if value == 0 {
            break;
        }
    }
}

pub fn write_leb128_i32(value: i32, output: &mut Vec<u8>) {
    let mut value = value;
    loop {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let byte = (value & 0x7F) as u8;
        value >>= 7;

        let done = (value == 0 && (byte & 0x40) == 0) || (value == -1 && (byte & 0x40) != 0);
        if done {
            output.push(byte);
            break;
        }
        output.push(byte | 0x80);
    }
}

// endregion
