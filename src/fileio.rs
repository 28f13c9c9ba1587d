//! Code regarding file input (reading source `.stk` files)
//! and output (writing compiled `.json` files) actions.
//!
//! ## Input
//! `stackc` expects to be run in the root directory of the project,
//! with all the `.stk` files placed in the `./src` directory
//! (nested directories are allowed). Each file holds one code block.
//!
//! ## Output
//! Every compiled module and function is written to its own file in a
//! `./bin` directory, next to `./src`, named after the block's id in
//! snake case. `program.json` holds the module order, function table
//! and memory size of the whole program.

use std::{io, path::Path};

/// Checks that the provided path to the root of the project directory
/// is in fact a valid path to an existing directory.
fn check_root_path(root_path: &Path) -> io::Result<()> {
    if root_path.is_dir() {
        Ok(())
    } else {
        Err(io::Error::other(
            "provided root path is not a valid directory",
        ))
    }
}

pub mod input {
    use std::{
        fs, io,
        path::{Path, PathBuf},
    };

    pub const SOURCE_EXTENSION: &str = "stk";

    pub struct SourceFile {
        pub path: PathBuf,
        pub content: String,
    }

    /// All source files under `root/src`, sorted by path.
    pub fn read_sources(root_path: &Path) -> io::Result<Vec<SourceFile>> {
        super::check_root_path(root_path)?;

        let mut paths = Vec::new();
        collect_paths(&root_path.join("src"), &mut paths)?;
        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                let content = fs::read_to_string(&path)?;
                Ok(SourceFile { path, content })
            })
            .collect()
    }

    fn collect_paths(directory: &Path, paths: &mut Vec<PathBuf>) -> io::Result<()> {
        for entry in fs::read_dir(directory)? {
            let path = entry?.path();

            if path.is_dir() {
                collect_paths(&path, paths)?;
            } else if path
                .extension()
                .is_some_and(|extension| extension == SOURCE_EXTENSION)
            {
                paths.push(path);
            }
        }

        Ok(())
    }
}

pub mod output {
    use std::{
        collections::BTreeMap,
        fs,
        io::{self, Write},
        path::{Path, PathBuf},
    };

    use heck::ToSnakeCase;
    use serde::Serialize;

    use crate::{codegen::Program, Error};

    pub const MANIFEST_NAME: &str = "program";

    pub struct OutputFile {
        name: String,
        content: String,
    }

    impl OutputFile {
        pub fn new(id: &str, content: String) -> Self {
            Self {
                name: id.to_snake_case(),
                content,
            }
        }

        pub fn json(id: &str, value: &impl Serialize) -> serde_json::Result<Self> {
            Ok(Self::new(id, serde_json::to_string_pretty(value)?))
        }

        pub fn name(&self) -> &str {
            &self.name
        }
    }

    /// One file per module and function, plus the program manifest.
    ///
    /// Fails when two blocks (or a block and the manifest) would be
    /// written to the same file.
    pub fn program_files(program: &Program) -> Result<Vec<OutputFile>, Error> {
        let modules = program
            .modules
            .iter()
            .map(|module| (module.id.as_str(), OutputFile::json(&module.id, module)));
        let functions = program
            .functions
            .iter()
            .map(|function| (function.id.as_str(), OutputFile::json(&function.id, function)));
        let manifest = std::iter::once((
            MANIFEST_NAME,
            OutputFile::json(MANIFEST_NAME, &program.manifest()),
        ));

        let mut owners = BTreeMap::new();
        let mut files = Vec::new();

        for (id, file) in modules.chain(functions).chain(manifest) {
            let file = file?;

            if let Some(first) = owners.insert(file.name.clone(), id) {
                return Err(Error::OutputCollision {
                    name: file.name,
                    first: first.to_owned(),
                    second: id.to_owned(),
                });
            }

            files.push(file);
        }

        Ok(files)
    }

    pub fn generate(root_path: &Path, output_file: OutputFile) -> io::Result<PathBuf> {
        super::check_root_path(root_path)?;

        let bin_path = ensure_bin_dir_exists(root_path)?;
        let file_path = bin_path.join(output_file.name).with_extension("json");

        fs::File::create(&file_path)?.write_all(output_file.content.as_bytes())?;

        Ok(file_path)
    }

    fn ensure_bin_dir_exists(root_path: &Path) -> io::Result<PathBuf> {
        let bin_path = root_path.join("bin");
        if !bin_path.is_dir() {
            fs::create_dir(&bin_path)?;
        }

        Ok(bin_path)
    }
}
