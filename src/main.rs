use std::{
    fs, io,
    path::{Path, PathBuf},
};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stackc::{
    codegen::{
        self,
        options::{BufferStrategy, CompileOptions},
    },
    fileio::{input, output},
    parser, Error,
};

#[derive(Parser, Debug)]
#[command(name = "stackc", about = "Compile stack-based modules into bytecode")]
struct Cli {
    /// Project root, containing the `src` directory
    #[arg(default_value = ".")]
    root: PathBuf,

    /// JSON file with compiler options; flags take precedence
    #[arg(long)]
    options: Option<PathBuf>,

    #[arg(long)]
    memory_size: Option<u32>,

    /// Word address of the first module's memory
    #[arg(long)]
    start_word: Option<u32>,

    #[arg(long)]
    buffer_size: Option<u32>,

    #[arg(long)]
    buffer_strategy: Option<BufferStrategy>,

    #[arg(long)]
    disable_shared_memory: bool,

    /// Embed each block's AST in its output file
    #[arg(long)]
    include_ast: bool,
}

impl Cli {
    fn compile_options(&self) -> Result<CompileOptions, Error> {
        let mut options = match &self.options {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(io_error(path))?;
                serde_json::from_str(&content)?
            }
            None => CompileOptions::default(),
        };

        if let Some(memory_size) = self.memory_size {
            options.memory_size_bytes = memory_size;
        }
        if let Some(start_word) = self.start_word {
            options.starting_memory_word_address = start_word;
        }
        if let Some(buffer_size) = self.buffer_size {
            options.buffer_size = buffer_size;
        }
        if let Some(buffer_strategy) = self.buffer_strategy {
            options.buffer_strategy = buffer_strategy;
        }
        options.disable_shared_memory |= self.disable_shared_memory;
        options.include_ast |= self.include_ast;

        Ok(options)
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "stackc=info".into()))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(error) = run(&cli) {
        error!("{error}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let options = cli.compile_options()?;

    let sources = input::read_sources(&cli.root).map_err(io_error(&cli.root))?;
    info!(files = sources.len(), root = %cli.root.display(), "compiling");

    let mut units = Vec::with_capacity(sources.len());
    for source in &sources {
        match parser::parse_unit(&source.content) {
            Ok(ast) => units.push(ast),
            Err(parse_error) => {
                error_report::parse_error(source, &parse_error);
                return Err(parse_error.into());
            }
        }
    }

    let ids = units
        .iter()
        .map(|ast| ast.id().map(ToOwned::to_owned))
        .collect::<Vec<_>>();

    let program = codegen::compile_program(units, &options).map_err(|compile_error| {
        let source = compile_error.context.module.as_ref().and_then(|module| {
            ids.iter()
                .position(|id| id.as_ref() == Some(module))
                .map(|index| &sources[index])
        });

        if let Some(source) = source {
            error_report::compile_error(source, &compile_error);
        }

        compile_error
    })?;

    for file in output::program_files(&program)? {
        let path = output::generate(&cli.root, file).map_err(io_error(&cli.root))?;
        info!(path = %path.display(), "written");
    }

    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

mod error_report {
    use std::ops::Range;

    use ariadne::{Label, Report, ReportKind, Source};
    use tracing::warn;

    use stackc::{codegen::error::CompileError, fileio::input::SourceFile, parser::ParseError};

    /// Byte range of a 1-based line within `content`.
    fn line_range(content: &str, line_number: usize) -> Range<usize> {
        let mut offset = 0;

        for (index, line) in content.split_inclusive('\n').enumerate() {
            let text = line.trim_end_matches(['\n', '\r']);
            if index + 1 == line_number {
                return offset..offset + text.len();
            }
            offset += line.len();
        }

        offset..offset
    }

    fn display(source: &SourceFile, span: Range<usize>, message: &str, label: &str) {
        let file_path = source.path.to_string_lossy();
        let file_path = file_path.as_ref();

        let printed = Report::build(ReportKind::Error, file_path, span.start)
            .with_message(message)
            .with_label(Label::new((file_path, span)).with_message(label))
            .finish()
            .eprint((file_path, Source::from(source.content.as_str())));

        if let Err(error) = printed {
            warn!("unable to print error report: {error}");
        }
    }

    pub fn parse_error(source: &SourceFile, error: &ParseError) {
        let line = line_range(&source.content, error.line_number());

        let (span, label) = match error {
            ParseError::Syntax { span, message, .. } => (
                line.start + span.start..(line.start + span.end).min(line.end).max(line.start),
                message.clone(),
            ),
            ParseError::TooManyArguments { .. } => (line, String::from("too many arguments")),
        };

        display(source, span, "Parser error", &label);
    }

    pub fn compile_error(source: &SourceFile, error: &CompileError) {
        let span = error.line_number().map_or(0..0, |line_number| {
            line_range(&source.content, line_number)
        });

        let stack = if error.context.stack.is_empty() {
            String::from("stack is empty")
        } else {
            format!("stack: [{}]", error.context.stack.join(", "))
        };

        display(
            source,
            span,
            &format!("{} ({})", error.code, error.code.code()),
            &stack,
        );
    }
}
