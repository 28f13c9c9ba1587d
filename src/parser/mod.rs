//! Logic for turning raw source lines into an AST.
//!
//! Every non-empty, non-comment, non-directive line becomes one
//! [`AstLine`]. Nothing is validated here beyond syntax.

use std::ops::Range;

use thiserror::Error;
use tracing::trace;

use crate::common::ast::{Ast, AstLine, Directives};

pub mod line;

use line::{Directive, ParsedLine};

/// Maximum number of arguments on an ordinary line.
pub const MAX_ARGUMENTS: usize = 7;

/// Instruction whose argument list is bounded by the signature rules
/// instead of [`MAX_ARGUMENTS`].
const UNBOUNDED_ARGUMENTS_INSTRUCTION: &str = "functionEnd";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(
        "syntax error on line {line_number}{expansion}: {message}",
        expansion = describe_expansion(.macro_id.as_deref())
    )]
    Syntax {
        line_number: usize,
        /// Byte range inside the line.
        span: Range<usize>,
        message: String,
        /// Macro the line was expanded from, if any.
        macro_id: Option<String>,
    },
    #[error(
        "line {line_number}: `{instruction}` takes at most {max} arguments, found {found}",
        max = MAX_ARGUMENTS
    )]
    TooManyArguments {
        line_number: usize,
        instruction: String,
        found: usize,
    },
}

fn describe_expansion(macro_id: Option<&str>) -> String {
    macro_id.map_or_else(String::new, |id| format!(" (in expansion of `{id}`)"))
}

impl ParseError {
    pub const fn line_number(&self) -> usize {
        match self {
            Self::Syntax { line_number, .. } | Self::TooManyArguments { line_number, .. } => {
                *line_number
            }
        }
    }
}

/// One line as delivered by the macro expander:
/// the text plus where its diagnostics should point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub text: String,
    pub call_site_line: Option<usize>,
    pub macro_id: Option<String>,
}

impl SourceLine {
    pub fn plain(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            call_site_line: None,
            macro_id: None,
        }
    }
}

/// Parse a whole code block given as plain text.
pub fn parse_unit(source: &str) -> Result<Ast, ParseError> {
    let lines = source.lines().map(SourceLine::plain).collect::<Vec<_>>();

    build_ast(&lines)
}

/// Build the AST from a flat, possibly macro-expanded list of lines.
///
/// Lines without call-site information get their 1-based physical index.
pub fn build_ast(lines: &[SourceLine]) -> Result<Ast, ParseError> {
    let mut ast_lines = Vec::new();
    let mut directives = Directives::default();

    for (index, source_line) in lines.iter().enumerate() {
        let line_number = source_line.call_site_line.unwrap_or(index + 1);

        match parse_line(source_line, line_number)? {
            ParsedLine::Blank => {}
            ParsedLine::Directive(Directive::SkipExecution) => {
                directives.skip_execution_in_cycle = true;
            }
            ParsedLine::Directive(Directive::InitOnly) => {
                directives.init_only_execution = true;
            }
            ParsedLine::Instruction {
                instruction,
                arguments,
            } => ast_lines.push(AstLine {
                line_number,
                instruction,
                arguments,
            }),
        }
    }

    trace!(lines = ast_lines.len(), "ast built");

    Ok(Ast {
        lines: ast_lines,
        directives,
    })
}

/// Parse compiler-generated lines that all report the same line number.
pub fn parse_snippet<S: AsRef<str>>(
    lines: &[S],
    line_number: usize,
) -> Result<Vec<AstLine>, ParseError> {
    let lines = lines
        .iter()
        .map(|text| SourceLine {
            text: text.as_ref().to_owned(),
            call_site_line: Some(line_number),
            macro_id: None,
        })
        .collect::<Vec<_>>();

    build_ast(&lines).map(|ast| ast.lines)
}

fn parse_line(source_line: &SourceLine, line_number: usize) -> Result<ParsedLine, ParseError> {
    let text = source_line.text.as_str();
    let parsed = line::parse(text).map_err(|errors| {
        let error = errors.into_iter().next();

        ParseError::Syntax {
            line_number,
            span: error.as_ref().map_or(0..text.len(), |e| e.span()),
            message: error.map_or_else(|| String::from("invalid line"), |e| e.to_string()),
            macro_id: source_line.macro_id.clone(),
        }
    })?;

    if let ParsedLine::Instruction {
        instruction,
        arguments,
    } = &parsed
    {
        if arguments.len() > MAX_ARGUMENTS && instruction != UNBOUNDED_ARGUMENTS_INSTRUCTION {
            return Err(ParseError::TooManyArguments {
                line_number,
                instruction: instruction.clone(),
                found: arguments.len(),
            });
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use crate::common::{ast::Argument, Value};

    use super::*;

    #[test]
    fn test_ast_line_numbers_skip_blank_lines() {
        let source = "module test\n\n; comment\nint foo 5\nmoduleEnd";

        let ast = parse_unit(source).expect("source should parse");

        let numbers = ast.lines.iter().map(|l| l.line_number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 4, 5]);

        assert_eq!(ast.lines[1].instruction, "int");
        assert_eq!(
            ast.lines[1].arguments,
            vec![Argument::identifier("foo"), Argument::Literal(Value::Int(5))]
        );
    }

    #[test]
    fn test_call_site_line_numbers() {
        let lines = vec![
            SourceLine::plain("module test"),
            SourceLine {
                text: String::from("push 1"),
                call_site_line: Some(7),
                macro_id: Some(String::from("inc")),
            },
            SourceLine::plain("moduleEnd"),
        ];

        let ast = build_ast(&lines).expect("lines should parse");

        let numbers = ast.lines.iter().map(|l| l.line_number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 7, 3]);
    }

    #[test]
    fn test_directives_are_extracted() {
        let ast = parse_unit("#skipExecution\nmodule test\nmoduleEnd").expect("should parse");

        assert!(ast.directives.skip_execution_in_cycle);
        assert!(!ast.directives.init_only_execution);
        assert_eq!(ast.lines.len(), 2);
    }

    #[test]
    fn test_too_many_arguments() {
        assert!(parse_unit("push 1 2 3 4 5 6 7 8")
            .is_err_and(|err| matches!(err, ParseError::TooManyArguments { found: 8, .. })));

        // return lists are bounded by the signature rules instead
        assert!(parse_unit("functionEnd int int int int int int int int int").is_ok());
    }

    #[test]
    fn test_syntax_error_reports_line() {
        assert!(parse_unit("module test\npush \"oops")
            .is_err_and(|err| matches!(err, ParseError::Syntax { line_number: 2, .. })));
    }

    #[test]
    fn test_syntax_error_names_macro() {
        let lines = vec![
            SourceLine::plain("module test"),
            SourceLine {
                text: String::from("push \"oops"),
                call_site_line: Some(4),
                macro_id: Some(String::from("envelope")),
            },
        ];

        assert!(build_ast(&lines).is_err_and(|err| {
            err.to_string().contains("in expansion of `envelope`")
                && matches!(
                    err,
                    ParseError::Syntax {
                        line_number: 4,
                        macro_id: Some(_),
                        ..
                    }
                )
        }));
        assert!(parse_unit("push \"oops")
            .is_err_and(|err| !err.to_string().contains("expansion")));
    }

    #[test]
    fn test_snippet_uses_call_site_line() {
        let snippet = parse_snippet(&["push 1", "push 2", "add"], 12).expect("should parse");

        assert!(snippet.iter().all(|line| line.line_number == 12));
        assert_eq!(snippet.len(), 3);
    }
}
