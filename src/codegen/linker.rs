//! Ordering of modules so that memory referenced across modules
//! (`&other.name`) is allocated before the module referencing it.
//!
//! This is a single pass over an alphabetical order, not a full
//! topological sort: chains spanning several modules or cycles are
//! not guaranteed to end up in dependency order.

use std::collections::{BTreeMap, BTreeSet};

use phf::phf_set;
use tracing::debug;

use crate::common::ast::{Argument, Ast, Reference};

/// Instructions whose arguments may reference another module's memory.
static REFERENCING_INSTRUCTIONS: phf::Set<&'static str> = phf_set! {
    "push",
    "int",
    "float",
    "float64",
    "int*",
    "int**",
    "float*",
    "float**",
    "float64*",
    "int[]",
    "int8[]",
    "int8u[]",
    "int16[]",
    "int16u[]",
    "float[]",
    "float64[]",
    "int*[]",
    "float*[]",
};

/// Ids of the other modules a module references.
pub fn dependencies(module: &Ast) -> BTreeSet<String> {
    module
        .lines
        .iter()
        .filter(|line| REFERENCING_INSTRUCTIONS.contains(line.instruction.as_str()))
        .flat_map(|line| &line.arguments)
        .filter_map(|argument| match argument {
            Argument::Identifier(name) => Reference::parse(name).foreign_module(),
            _ => None,
        })
        .filter(|foreign| module.id() != Some(*foreign))
        .map(ToOwned::to_owned)
        .collect()
}

/// Sort modules alphabetically by id, then move each module after the
/// last module it depends on, unless that module depends on it too.
pub fn sort_modules(mut modules: Vec<Ast>) -> Vec<Ast> {
    modules.sort_by(|a, b| a.id().cmp(&b.id()));

    let graph = modules
        .iter()
        .filter_map(|module| Some((module.id()?.to_owned(), dependencies(module))))
        .collect::<BTreeMap<_, _>>();

    let is_mutual = |a: &str, b: &str| {
        graph
            .get(b)
            .is_some_and(|dependencies| dependencies.contains(a))
    };

    for (id, dependencies) in &graph {
        let Some(position) = modules.iter().position(|m| m.id() == Some(id.as_str())) else {
            continue;
        };

        let target = modules
            .iter()
            .enumerate()
            .skip(position + 1)
            .filter_map(|(index, other)| Some((index, other.id()?)))
            .filter(|(_, other)| dependencies.contains(*other) && !is_mutual(id, other))
            .map(|(index, _)| index)
            .last();

        if let Some(target) = target {
            debug!(module = %id, after = ?modules[target].id(), "reordering module");

            let module = modules.remove(position);
            modules.insert(target, module);
        }
    }

    modules
}
