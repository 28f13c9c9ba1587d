//! Function signatures and the program-wide function table.

use std::{collections::HashMap, str::FromStr};

use serde::Serialize;

use crate::common::{
    ast::{Ast, UnitKind},
    ValueType,
};

/// Maximum number of parameters, and separately of return values.
pub const MAX_SIGNATURE_LENGTH: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionSignature {
    pub parameters: Vec<ValueType>,
    pub returns: Vec<ValueType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionEntry {
    pub signature: FunctionSignature,
    /// Position in the function table, once assigned.
    pub index: Option<u32>,
}

#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionEntry>,
    next_index: u32,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.get(name)
    }

    /// Register a signature ahead of compilation, assigning the next table index.
    pub fn pre_register(&mut self, name: &str, signature: FunctionSignature) -> u32 {
        let index = self.allocate_index();

        self.functions.insert(
            name.to_owned(),
            FunctionEntry {
                signature,
                index: Some(index),
            },
        );

        index
    }

    /// Record the signature frozen at `functionEnd`.
    ///
    /// A pre-registered function keeps its index; otherwise the next one is assigned.
    pub fn define(&mut self, name: &str, signature: FunctionSignature) -> u32 {
        if let Some(index) = self.functions.get(name).and_then(|entry| entry.index) {
            self.functions.insert(
                name.to_owned(),
                FunctionEntry {
                    signature,
                    index: Some(index),
                },
            );

            return index;
        }

        self.pre_register(name, signature)
    }

    fn allocate_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }
}

/// Signature being accumulated between `function` and `functionEnd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBuilder {
    pub name: String,
    pub parameters: Vec<(String, ValueType)>,
    /// Set once `functionEnd` froze the signature.
    pub returns: Option<Vec<ValueType>>,
}

impl FunctionBuilder {
    pub const fn new(name: String) -> Self {
        Self {
            name,
            parameters: Vec::new(),
            returns: None,
        }
    }

    pub fn signature(&self) -> FunctionSignature {
        FunctionSignature {
            parameters: self.parameters.iter().map(|(_, t)| *t).collect(),
            returns: self.returns.clone().unwrap_or_default(),
        }
    }
}

/// Read a function's name and signature from its `param`/`functionEnd`
/// lines, without compiling it.
///
/// Malformed lines are skipped; compilation reports them properly.
pub fn scan_signature(ast: &Ast) -> Option<(String, FunctionSignature)> {
    if ast.unit_kind() != Some(UnitKind::Function) {
        return None;
    }

    let name = ast.id()?.to_owned();
    let mut signature = FunctionSignature::default();

    for line in &ast.lines {
        match line.instruction.as_str() {
            "param" => {
                if let Some(value_type) = line
                    .argument(0)
                    .and_then(|arg| arg.as_identifier())
                    .and_then(|t| ValueType::from_str(t).ok())
                {
                    signature.parameters.push(value_type);
                }
            }
            "functionEnd" => {
                signature.returns = line
                    .arguments
                    .iter()
                    .filter_map(|arg| arg.as_identifier())
                    .filter_map(|t| ValueType::from_str(t).ok())
                    .collect();
            }
            _ => {}
        }
    }

    Some((name, signature))
}
