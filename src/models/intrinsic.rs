// Intrinsic functions - the States.* expression language embedded in strings

//! # Intrinsic Function Expressions
//!
//! ASL lets certain string fields hold a call such as
//! `States.Format('Hello {}', $.name)`. This module defines the expression
//! tree ([`IntrinsicFunction`] / [`IntrinsicParam`]) and the recursive-descent
//! parser that builds it. Evaluation lives in
//! [`crate::engine::intrinsics`].
//!
//! ## Grammar
//!
//! ```text
//! Function := Name '(' Params? ')'
//! Params   := Param (',' Param)*
//! Param    := QuotedString | UnquotedLiteral | Path | Function
//! ```
//!
//! Unquoted literals are `null`, `true`, `false`, integers and decimals.
//! Paths start with `$` (input document) or `$$` (context document).
//!
//! ## Rust Learning Notes:
//!
//! ### Recursive Enums
//! `IntrinsicParam::Function` holds an `IntrinsicFunction`, which holds a
//! `Vec<IntrinsicParam>`. The `Vec` provides the indirection Rust needs to
//! give the recursive type a known size - no `Box` required.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::{Result, StatesLanguageError};

/// Maximum function nesting accepted by [`IntrinsicFunction::parse`]
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 32;

/// One argument of an intrinsic function call
#[derive(Debug, Clone, PartialEq)]
pub enum IntrinsicParam {
    /// The literal `null`
    Null,

    /// `true` or `false`
    Boolean(bool),

    /// A single-quoted string literal, with `\'` and `\\` already unescaped
    String(String),

    /// A base-10 integer literal
    Integer(i64),

    /// A decimal literal (sign, decimal point and exponent allowed)
    Decimal(f64),

    /// A `$` (input) or `$$` (context) path, kept as written
    Path(String),

    /// A nested call, evaluated before the enclosing function runs
    Function(IntrinsicFunction),
}

impl fmt::Display for IntrinsicParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntrinsicParam::Null => write!(f, "null"),
            IntrinsicParam::Boolean(value) => write!(f, "{}", value),
            IntrinsicParam::String(value) => {
                write!(f, "'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
            }
            IntrinsicParam::Integer(value) => write!(f, "{}", value),
            IntrinsicParam::Decimal(value) => write!(f, "{:?}", value),
            IntrinsicParam::Path(path) => write!(f, "{}", path),
            IntrinsicParam::Function(function) => write!(f, "{}", function),
        }
    }
}

/// A parsed intrinsic function call
///
/// ```rust
/// use states_language::models::{IntrinsicFunction, IntrinsicParam};
///
/// let function = IntrinsicFunction::parse("States.Format('{} {}', $.a, $$.b)").unwrap();
/// assert_eq!(function.name, "States.Format");
/// assert_eq!(function.params[1], IntrinsicParam::Path("$.a".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicFunction {
    /// Function name, e.g. `States.Format`
    pub name: String,

    /// Arguments in call order
    pub params: Vec<IntrinsicParam>,
}

impl IntrinsicFunction {
    /// Create a call from a name and already-built parameters
    pub fn new<S: Into<String>>(name: S, params: Vec<IntrinsicParam>) -> Self {
        IntrinsicFunction {
            name: name.into(),
            params,
        }
    }

    /// Parse with the default nesting limit
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with_depth_limit(text, DEFAULT_MAX_NESTING_DEPTH)
    }

    /// Parse, rejecting calls nested deeper than `max_depth`
    pub fn parse_with_depth_limit(text: &str, max_depth: usize) -> Result<Self> {
        let mut parser = IntrinsicParser::new(text, max_depth);
        parser.skip_whitespace();
        let function = parser.parse_function(0).map_err(|err| {
            debug!("Rejected intrinsic expression {:?}: {}", text, err);
            err
        })?;
        parser.skip_whitespace();
        if let Some(c) = parser.peek() {
            return Err(parser.error(format!(
                "unexpected character '{}' after closing ')' at position {}",
                c, parser.position
            )));
        }
        debug!("Parsed intrinsic function {}", function.name);
        Ok(function)
    }

    /// Cheap syntactic check used by the validator
    pub fn is_intrinsic_function(text: &str) -> bool {
        Self::parse(text).is_ok()
    }
}

impl FromStr for IntrinsicFunction {
    type Err = StatesLanguageError;

    fn from_str(s: &str) -> Result<Self> {
        IntrinsicFunction::parse(s)
    }
}

impl fmt::Display for IntrinsicFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")
    }
}

struct IntrinsicParser<'a> {
    source: &'a str,
    chars: Vec<char>,
    position: usize,
    max_depth: usize,
}

impl<'a> IntrinsicParser<'a> {
    fn new(source: &'a str, max_depth: usize) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            position: 0,
            max_depth,
        }
    }

    fn error(&self, reason: impl Into<String>) -> StatesLanguageError {
        StatesLanguageError::InvalidIntrinsicFunction {
            function: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.position += 1;
        }
    }

    /// Reads `Name '(' Params? ')'` with the cursor on the first name character
    fn parse_function(&mut self, depth: usize) -> Result<IntrinsicFunction> {
        let start = self.position;
        let name = self.read_unquoted_token()?;
        if name.is_empty() {
            return Err(self.error(format!("expected function name at position {}", start)));
        }
        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Err(self.error(format!(
                "expected '(' after function name at position {}",
                self.position
            )));
        }
        self.parse_call(name, depth)
    }

    /// Reads the parameter list with the cursor on `(`
    fn parse_call(&mut self, name: String, depth: usize) -> Result<IntrinsicFunction> {
        if depth >= self.max_depth {
            return Err(self.error(format!(
                "functions nested deeper than {} levels at position {}",
                self.max_depth, self.position
            )));
        }
        let open = self.position;
        self.position += 1;
        self.skip_whitespace();

        let mut params = Vec::new();
        if self.peek() == Some(')') {
            self.position += 1;
            return Ok(IntrinsicFunction::new(name, params));
        }

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => {
                    return Err(self.error(format!(
                        "missing ')' for parameter list opened at position {}",
                        open
                    )))
                }
                Some(',') | Some(')') => {
                    return Err(self.error(format!(
                        "expected parameter at position {}",
                        self.position
                    )))
                }
                Some(_) => params.push(self.parse_param(depth)?),
            }

            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.position += 1,
                Some(')') => {
                    self.position += 1;
                    return Ok(IntrinsicFunction::new(name, params));
                }
                None => {
                    return Err(self.error(format!(
                        "missing ')' for parameter list opened at position {}",
                        open
                    )))
                }
                Some(c) => {
                    return Err(self.error(format!(
                        "unexpected character '{}' at position {}",
                        c, self.position
                    )))
                }
            }
        }
    }

    fn parse_param(&mut self, depth: usize) -> Result<IntrinsicParam> {
        if self.peek() == Some('\'') {
            return self.read_quoted_string().map(IntrinsicParam::String);
        }

        let start = self.position;
        let token = self.read_unquoted_token()?;
        self.skip_whitespace();
        if self.peek() == Some('(') {
            if token.is_empty() {
                return Err(self.error(format!("expected function name at position {}", start)));
            }
            return self.parse_call(token, depth + 1).map(IntrinsicParam::Function);
        }

        match token.as_str() {
            "" => Err(self.error(format!("expected parameter at position {}", start))),
            "null" => Ok(IntrinsicParam::Null),
            "true" => Ok(IntrinsicParam::Boolean(true)),
            "false" => Ok(IntrinsicParam::Boolean(false)),
            _ if token.starts_with('$') => Ok(IntrinsicParam::Path(token)),
            _ => {
                if let Ok(value) = token.parse::<i64>() {
                    return Ok(IntrinsicParam::Integer(value));
                }
                if looks_numeric(&token) {
                    if let Ok(value) = token.parse::<f64>() {
                        return Ok(IntrinsicParam::Decimal(value));
                    }
                }
                Err(self.error(format!(
                    "unrecognized token '{}' at position {}",
                    token, start
                )))
            }
        }
    }

    /// Reads `'...'` with the cursor on the opening quote
    fn read_quoted_string(&mut self) -> Result<String> {
        let start = self.position;
        self.position += 1;
        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(self.error(format!(
                        "unterminated string starting at position {}",
                        start
                    )))
                }
                Some('\\') => match self.chars.get(self.position + 1).copied() {
                    Some(c @ ('\'' | '\\')) => {
                        value.push(c);
                        self.position += 2;
                    }
                    Some(c) => {
                        value.push('\\');
                        value.push(c);
                        self.position += 2;
                    }
                    None => {
                        return Err(self.error(format!(
                            "unterminated string starting at position {}",
                            start
                        )))
                    }
                },
                Some('\'') => {
                    self.position += 1;
                    return Ok(value);
                }
                Some(c) => {
                    value.push(c);
                    self.position += 1;
                }
            }
        }
    }

    /// Reads a bare token up to `,`, `(`, `)` or whitespace
    ///
    /// Characters inside `[...]` (including quoted member names) never end
    /// the token, so `$['a, b']` stays a single path.
    fn read_unquoted_token(&mut self) -> Result<String> {
        let mut token = String::new();
        let mut bracket_depth = 0usize;
        let mut quote: Option<char> = None;

        while let Some(c) = self.peek() {
            if c == '\\' {
                let escaped = self.chars.get(self.position + 1).copied().ok_or_else(|| {
                    self.error(format!("dangling escape at position {}", self.position))
                })?;
                if bracket_depth > 0 {
                    token.push('\\');
                }
                token.push(escaped);
                self.position += 2;
                continue;
            }

            if bracket_depth > 0 {
                match (quote, c) {
                    (Some(q), _) if c == q => quote = None,
                    (None, '\'' | '"') => quote = Some(c),
                    (None, '[') => bracket_depth += 1,
                    (None, ']') => bracket_depth -= 1,
                    _ => {}
                }
                token.push(c);
                self.position += 1;
                continue;
            }

            match c {
                ',' | '(' | ')' => break,
                _ if c.is_whitespace() => break,
                '\'' => {
                    return Err(self.error(format!(
                        "unexpected quote at position {}",
                        self.position
                    )))
                }
                '[' => {
                    bracket_depth += 1;
                    token.push(c);
                    self.position += 1;
                }
                _ => {
                    token.push(c);
                    self.position += 1;
                }
            }
        }

        if bracket_depth > 0 {
            return Err(self.error(format!(
                "unterminated '[' in token '{}'",
                token
            )));
        }
        Ok(token)
    }
}

fn looks_numeric(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn path(p: &str) -> IntrinsicParam {
        IntrinsicParam::Path(p.to_string())
    }

    fn string(s: &str) -> IntrinsicParam {
        IntrinsicParam::String(s.to_string())
    }

    #[test]
    fn test_parse_format_call() {
        let function = IntrinsicFunction::parse("States.Format('{} {}', $.a, $$.b)").unwrap();
        assert_eq!(function.name, "States.Format");
        assert_eq!(function.params, vec![string("{} {}"), path("$.a"), path("$$.b")]);
    }

    #[test]
    fn test_parse_literals() {
        let function =
            IntrinsicFunction::parse("States.Array(null, true, false, 42, -7, 1.5, 2e3, 'x')").unwrap();
        assert_eq!(
            function.params,
            vec![
                IntrinsicParam::Null,
                IntrinsicParam::Boolean(true),
                IntrinsicParam::Boolean(false),
                IntrinsicParam::Integer(42),
                IntrinsicParam::Integer(-7),
                IntrinsicParam::Decimal(1.5),
                IntrinsicParam::Decimal(2000.0),
                string("x"),
            ]
        );
    }

    #[test]
    fn test_parse_nested_functions() {
        let function =
            IntrinsicFunction::parse("States.Array(States.MathAdd(1, 2), States.UUID())").unwrap();
        assert_eq!(
            function.params,
            vec![
                IntrinsicParam::Function(IntrinsicFunction::new(
                    "States.MathAdd",
                    vec![IntrinsicParam::Integer(1), IntrinsicParam::Integer(2)]
                )),
                IntrinsicParam::Function(IntrinsicFunction::new("States.UUID", vec![])),
            ]
        );
    }

    #[test]
    fn test_whitespace_is_skipped_between_tokens() {
        let compact = IntrinsicFunction::parse("States.Array(1,$.a,'b')").unwrap();
        let spaced = IntrinsicFunction::parse("  States.Array (  1 ,\t$.a ,  'b'  )  ").unwrap();
        assert_eq!(compact, spaced);
    }

    #[test]
    fn test_quoted_string_escapes() {
        let function = IntrinsicFunction::parse(r"States.Format('it\'s \\ \{literal\}')").unwrap();
        assert_eq!(function.params, vec![string(r"it's \ \{literal\}")]);
    }

    #[test]
    fn test_bracketed_paths_keep_commas_and_spaces() {
        let function = IntrinsicFunction::parse("States.Array($['a, b'], $.c[0])").unwrap();
        assert_eq!(function.params, vec![path("$['a, b']"), path("$.c[0]")]);
    }

    #[test]
    fn test_escaped_function_name_characters() {
        let function = IntrinsicFunction::parse(r"My\(Fn\)(1)").unwrap();
        assert_eq!(function.name, "My(Fn)");
    }

    #[test]
    fn test_parse_failures() {
        let cases = [
            "States.Format('unterminated)",
            "States.Array(1, 2",
            "States.Array(,1)",
            "States.Array(1,)",
            "States.Array(1,,2)",
            "States.Array(bogus)",
            "States.Array(inf)",
            "States.Array(1) trailing",
            "States.Array",
            "(1)",
            "",
        ];
        for case in cases {
            assert!(
                matches!(
                    IntrinsicFunction::parse(case),
                    Err(StatesLanguageError::InvalidIntrinsicFunction { .. })
                ),
                "expected '{}' to be rejected",
                case
            );
        }
    }

    #[test]
    fn test_error_messages_include_position() {
        let err = IntrinsicFunction::parse("States.Array(1,,2)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid intrinsic function 'States.Array(1,,2)': expected parameter at position 15"
        );

        let err = IntrinsicFunction::parse("States.Format('abc").unwrap_err();
        assert!(err.to_string().ends_with("unterminated string starting at position 14"));
    }

    #[test]
    fn test_nesting_limit() {
        let mut text = String::from("1");
        for _ in 0..5 {
            text = format!("States.Array({})", text);
        }
        assert!(IntrinsicFunction::parse_with_depth_limit(&text, 5).is_ok());
        assert!(IntrinsicFunction::parse_with_depth_limit(&text, 4).is_err());
    }

    #[test]
    fn test_display_reparses() {
        let text = r"States.Format('it\'s {}', States.MathAdd($.a, -2), 1.5, null)";
        let function = IntrinsicFunction::parse(text).unwrap();
        let reparsed = IntrinsicFunction::parse(&function.to_string()).unwrap();
        assert_eq!(function, reparsed);
    }

    fn param_strategy() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            Just("null".to_string()),
            any::<bool>().prop_map(|b| b.to_string()),
            any::<i32>().prop_map(|i| i.to_string()),
            "[a-z {}]{0,8}".prop_map(|s| format!("'{}'", s)),
            "[a-z]{1,5}".prop_map(|s| format!("$.{}", s)),
            "[a-z]{1,5}".prop_map(|s| format!("$$.{}", s)),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop::collection::vec(inner, 0..4)
                .prop_map(|args| format!("States.Array({})", args.join(", ")))
        })
    }

    proptest! {
        #[test]
        fn prop_parsing_is_deterministic(args in prop::collection::vec(param_strategy(), 0..4)) {
            let text = format!("States.Array({})", args.join(","));
            let first = IntrinsicFunction::parse(&text).unwrap();
            let second = IntrinsicFunction::parse(&text).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
