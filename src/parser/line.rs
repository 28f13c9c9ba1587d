//! Parser for a single source line.

use chumsky::prelude::*;
use std::str::FromStr;

use crate::common::{ast::Argument, Value};

pub type LineParseError = Simple<char>;

/// Result of parsing one line, before it is turned into an AST leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// Empty or comment-only line.
    Blank,
    Directive(Directive),
    Instruction {
        instruction: String,
        arguments: Vec<Argument>,
    },
}

/// Recognised `#directive` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum Directive {
    SkipExecution,
    InitOnly,
}

pub fn parse(text: &str) -> Result<ParsedLine, Vec<LineParseError>> {
    line().parse(text).map(|parsed| match parsed {
        ParsedLine::Instruction {
            instruction,
            arguments,
        } => as_directive(&instruction, &arguments).unwrap_or(ParsedLine::Instruction {
            instruction,
            arguments,
        }),
        other => other,
    })
}

/// `#name` is a directive only when `name` is a known directive;
/// otherwise `#` is an ordinary token character.
fn as_directive(instruction: &str, arguments: &[Argument]) -> Option<ParsedLine> {
    let name = instruction.strip_prefix('#')?;

    if !arguments.is_empty() {
        return None;
    }

    Directive::from_str(name).ok().map(ParsedLine::Directive)
}

fn comment() -> impl Parser<char, (), Error = LineParseError> + Clone {
    just(';').then(any().repeated()).ignored()
}

fn token() -> impl Parser<char, String, Error = LineParseError> + Clone {
    filter(|c: &char| !c.is_whitespace() && *c != ';' && *c != '"')
        .repeated()
        .at_least(1)
        .collect::<String>()
}

fn string_literal() -> impl Parser<char, Argument, Error = LineParseError> + Clone {
    // escapes are kept verbatim, they only stop `\"` from closing the literal
    let character = none_of("\\\"")
        .map(|c| vec![c])
        .or(just('\\').chain(any()));

    just('"')
        .ignore_then(character.repeated().flatten().collect::<String>())
        .then_ignore(just('"').labelled("closing quote"))
        .map(Argument::StringLiteral)
}

fn argument() -> impl Parser<char, Argument, Error = LineParseError> + Clone {
    string_literal().or(token().map(|token| {
        parse_numeric(&token).map_or(Argument::Identifier(token), Argument::Literal)
    }))
}

fn line() -> impl Parser<char, ParsedLine, Error = LineParseError> {
    let blank = text::whitespace()
        .ignore_then(comment().or_not())
        .then_ignore(end())
        .to(ParsedLine::Blank);

    let instruction = token()
        .then(argument().padded().repeated())
        .then_ignore(text::whitespace())
        .then_ignore(comment().or_not())
        .padded()
        .then_ignore(end())
        .map(|(instruction, arguments)| ParsedLine::Instruction {
            instruction,
            arguments,
        });

    blank.or(instruction)
}

/// Classify a token as a numeric literal.
///
/// Accepts decimal integers, decimals with a fractional part or exponent
/// (floats), `0x` hex and `0b` binary integers, an optional leading `-`,
/// and an `f64` suffix marking a 64-bit float.
pub fn parse_numeric(token: &str) -> Option<Value> {
    let (negative, body) = token
        .strip_prefix('-')
        .map_or((false, token), |rest| (true, rest));

    if let Some(digits) = body.strip_prefix("0x") {
        return parse_radix(digits, 16, negative);
    }

    if let Some(digits) = body.strip_prefix("0b") {
        return parse_radix(digits, 2, negative);
    }

    let (body, is_float64) = body
        .strip_suffix("f64")
        .map_or((body, false), |rest| (rest, true));

    if !is_decimal(body) {
        return None;
    }

    let is_float = body.contains(['.', 'e', 'E']);
    let signed = if negative {
        format!("-{body}")
    } else {
        body.to_owned()
    };

    if is_float64 {
        return signed.parse::<f64>().ok().map(Value::Float64);
    }

    if is_float {
        return signed.parse::<f32>().ok().map(Value::Float);
    }

    let value = signed.parse::<i64>().ok()?;
    wrap_to_i32(value).map(Value::Int)
}

fn parse_radix(digits: &str, radix: u32, negative: bool) -> Option<Value> {
    if digits.is_empty() {
        return None;
    }

    let value = i64::from(u32::from_str_radix(digits, radix).ok()?);
    let value = if negative { -value } else { value };

    wrap_to_i32(value).map(Value::Int)
}

/// Values up to `u32::MAX` are accepted and wrap into the signed range.
#[allow(clippy::cast_possible_truncation)]
fn wrap_to_i32(value: i64) -> Option<i32> {
    if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
        return None;
    }

    Some(value as u32 as i32)
}

/// Digits with at most one `.` and an optional `e[+-]digits` exponent.
fn is_decimal(body: &str) -> bool {
    let (mantissa, exponent) = match body.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, Some(exponent)),
        None => (body, None),
    };

    let mantissa_ok = mantissa.chars().any(|c| c.is_ascii_digit())
        && mantissa.chars().all(|c| c.is_ascii_digit() || c == '.')
        && mantissa.matches('.').count() <= 1;

    let exponent_ok = exponent.map_or(true, |exponent| {
        let digits = exponent
            .strip_prefix(['-', '+'])
            .unwrap_or(exponent);

        !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    });

    mantissa_ok && exponent_ok
}
