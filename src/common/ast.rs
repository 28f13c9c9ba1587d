//! Types representing the structure of a parsed code block
//! (a module, a function or a constants block).

use serde::Serialize;

use super::Value;

// region: non-terminals

/// One parsed code block, ready for compilation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ast {
    pub lines: Vec<AstLine>,
    pub directives: Directives,
}

impl Ast {
    /// Determine what kind of code block this is by its first instruction.
    pub fn unit_kind(&self) -> Option<UnitKind> {
        let first = self.lines.first()?;

        match first.instruction.as_str() {
            "module" => Some(UnitKind::Module),
            "function" => Some(UnitKind::Function),
            "constants" => Some(UnitKind::Constants),
            _ => None,
        }
    }

    /// Identifier declared by the opening instruction (e.g. `module foo` => `foo`).
    pub fn id(&self) -> Option<&str> {
        self.lines
            .first()
            .and_then(|line| line.arguments.first())
            .and_then(Argument::as_identifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitKind {
    Module,
    Function,
    Constants,
}

/// A single instruction line.
///
/// `line_number` is the line reported in diagnostics: the physical line,
/// or the call-site line for macro-expanded code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AstLine {
    pub line_number: usize,
    pub instruction: String,
    pub arguments: Vec<Argument>,
}

impl AstLine {
    /// Construct an internally used line
    /// (as opposed to a parsed one).
    ///
    /// Most commonly used in tests.
    pub fn internal(line_number: usize, instruction: &str, arguments: Vec<Argument>) -> Self {
        Self {
            line_number,
            instruction: instruction.to_owned(),
            arguments,
        }
    }

    pub fn argument(&self, index: usize) -> Option<&Argument> {
        self.arguments.get(index)
    }
}

impl std::fmt::Display for AstLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.instruction)?;

        for argument in &self.arguments {
            write!(f, " {argument}")?;
        }

        Ok(())
    }
}

/// Module-level flags extracted from `#directive` lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Directives {
    pub skip_execution_in_cycle: bool,
    pub init_only_execution: bool,
}

impl Directives {
    pub const fn is_empty(self) -> bool {
        !self.skip_execution_in_cycle && !self.init_only_execution
    }
}

// endregion

// region: terminals

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Argument {
    Identifier(String),
    Literal(Value),
    StringLiteral(String),
}

impl Argument {
    pub fn identifier(name: &str) -> Self {
        Self::Identifier(name.to_owned())
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Self::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

impl std::fmt::Display for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identifier(name) => write!(f, "{name}"),
            Self::Literal(value) => write!(f, "{value}"),
            Self::StringLiteral(text) => write!(f, "\"{text}\""),
        }
    }
}

/// Interpretation of the sigils an identifier argument may carry.
///
/// The parser keeps identifiers verbatim; consuming instructions
/// decide which of these forms they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    /// `name` (may be dotted, e.g. a namespaced constant `math.PI`)
    Plain(&'a str),
    /// `&name`, `&module.name`
    Address {
        module: Option<&'a str>,
        name: &'a str,
    },
    /// `name&`, `module.name&`
    EndAddress {
        module: Option<&'a str>,
        name: &'a str,
    },
    /// `$name`
    ElementCount(&'a str),
    /// `%name`
    ElementWidth(&'a str),
    /// `*name`
    Dereference(&'a str),
}

impl<'a> Reference<'a> {
    pub fn parse(identifier: &'a str) -> Self {
        fn split_module(path: &str) -> (Option<&str>, &str) {
            match path.split_once('.') {
                Some((module, name)) => (Some(module), name),
                None => (None, path),
            }
        }

        if let Some(path) = identifier.strip_prefix('&') {
            let (module, name) = split_module(path);
            return Self::Address { module, name };
        }

        if let Some(path) = identifier.strip_suffix('&') {
            let (module, name) = split_module(path);
            return Self::EndAddress { module, name };
        }

        if let Some(name) = identifier.strip_prefix('$') {
            return Self::ElementCount(name);
        }

        if let Some(name) = identifier.strip_prefix('%') {
            return Self::ElementWidth(name);
        }

        if let Some(name) = identifier.strip_prefix('*') {
            return Self::Dereference(name);
        }

        Self::Plain(identifier)
    }

    /// Module referenced by an intermodular (`&module.name`) form.
    pub const fn foreign_module(&self) -> Option<&'a str> {
        match self {
            Self::Address { module, .. } | Self::EndAddress { module, .. } => *module,
            _ => None,
        }
    }
}

/// Decode the escape sequences of a string literal into bytes.
///
/// String literals are stored verbatim by the parser; this is applied
/// only where a string is consumed as data.
pub fn decode_string(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        let decoded = if c == '\\' {
            match chars.next() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some('0') => '\0',
                Some(other) => other,
                None => '\\',
            }
        } else {
            c
        };

        let mut buffer = [0; 4];
        bytes.extend_from_slice(decoded.encode_utf8(&mut buffer).as_bytes());
    }

    bytes
}

// endregion

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_forms() {
        assert_eq!(Reference::parse("foo"), Reference::Plain("foo"));
        assert_eq!(
            Reference::parse("&foo"),
            Reference::Address {
                module: None,
                name: "foo"
            }
        );
        assert_eq!(
            Reference::parse("&osc.out"),
            Reference::Address {
                module: Some("osc"),
                name: "out"
            }
        );
        assert_eq!(
            Reference::parse("osc.buffer&"),
            Reference::EndAddress {
                module: Some("osc"),
                name: "buffer"
            }
        );
        assert_eq!(Reference::parse("$buf"), Reference::ElementCount("buf"));
        assert_eq!(Reference::parse("%buf"), Reference::ElementWidth("buf"));
        assert_eq!(Reference::parse("*ptr"), Reference::Dereference("ptr"));

        assert_eq!(Reference::parse("&osc.out").foreign_module(), Some("osc"));
        assert_eq!(Reference::parse("&out").foreign_module(), None);
    }

    #[test]
    fn test_decode_string() {
        assert_eq!(decode_string("ab"), vec![b'a', b'b']);
        assert_eq!(decode_string(r"a\nb"), vec![b'a', b'\n', b'b']);
        assert_eq!(decode_string(r#"\"\\"#), vec![b'"', b'\\']);
        assert_eq!(decode_string(r"\0"), vec![0]);
    }

    #[test]
    fn test_unit_kind() {
        let ast = Ast {
            lines: vec![
                AstLine::internal(1, "function", vec![Argument::identifier("f")]),
                AstLine::internal(2, "functionEnd", vec![]),
            ],
            directives: Directives::default(),
        };

        assert_eq!(ast.unit_kind(), Some(UnitKind::Function));
        assert_eq!(ast.id(), Some("f"));
    }
}
