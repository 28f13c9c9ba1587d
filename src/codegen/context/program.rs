use std::collections::HashMap;

use crate::{
    codegen::{functions::FunctionRegistry, memory::MemoryItem, options::CompileOptions},
    common::Value,
};

// region: Context

/// Context information regarding the entire program, across code blocks
/// (function table, published constant namespaces and memory).
///
/// Anything published here is read-only for code blocks compiled later.
#[derive(Debug, Default)]
pub struct Context {
    pub functions: FunctionRegistry,
    pub namespaces: HashMap<String, HashMap<String, Value>>,
    /// Memory of already compiled modules, keyed `module.name`.
    pub memory: HashMap<String, MemoryItem>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: &CompileOptions) -> Self {
        Self {
            memory: options
                .global_data_structures
                .iter()
                .map(|(key, item)| (key.clone(), item.clone()))
                .collect(),
            ..Self::default()
        }
    }

    /// Resolve a dotted `namespace.NAME` constant.
    pub fn constant(&self, path: &str) -> Option<Value> {
        let (namespace, name) = path.split_once('.')?;

        self.namespaces.get(namespace)?.get(name).copied()
    }

    pub fn foreign_memory(&self, module: &str, name: &str) -> Option<&MemoryItem> {
        self.memory.get(&format!("{module}.{name}"))
    }

    pub fn publish_memory<'a>(
        &mut self,
        module: &str,
        items: impl IntoIterator<Item = &'a MemoryItem>,
    ) {
        for item in items {
            self.memory.insert(format!("{module}.{}", item.id), item.clone());
        }
    }
}

// endregion

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_constant_lookup() {
        let mut context = Context::new();
        context.namespaces.insert(
            String::from("math"),
            HashMap::from([(String::from("PI"), Value::Float(2.5))]),
        );

        assert_eq!(context.constant("math.PI"), Some(Value::Float(2.5)));
        assert_eq!(context.constant("math.TAU"), None);
        assert_eq!(context.constant("PI"), None);
    }
}
