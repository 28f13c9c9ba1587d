//! `stackc` compiles a stack-based, block-structured instruction
//! language into WebAssembly-style bytecode, a word-aligned memory map
//! and a function table.
//!
//! Each source file holds one code block: a `module`, a `function` or a
//! `constants` block. [`compile_sources`] parses and compiles a whole
//! program; [`codegen::compile_module`] compiles a single block.

use std::path::PathBuf;

use thiserror::Error;

pub mod codegen;
pub mod common;
pub mod fileio;
pub mod parser;

use codegen::{error::CompileError, options::CompileOptions, Program};
use parser::ParseError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("unable to access `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("`{first}` and `{second}` would both be written to `{name}.json`")]
    OutputCollision {
        name: String,
        first: String,
        second: String,
    },
}

/// Parse every source (one code block each) and compile them as one program.
pub fn compile_sources<S: AsRef<str>>(
    sources: &[S],
    options: &CompileOptions,
) -> Result<Program, Error> {
    let units = sources
        .iter()
        .map(|source| parser::parse_unit(source.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(codegen::compile_program(units, options)?)
}
