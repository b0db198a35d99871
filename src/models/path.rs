// Reference paths - the constrained JSONPath subset used by ASL fields

//! # Reference Paths
//!
//! Several ASL fields (`ResultPath`, `ItemsPath`, `SecondsPath`, the `Variable`
//! of a choice rule, ...) hold a **reference path**: a JSONPath that can only
//! ever identify a single node of a JSON document.
//!
//! ## Grammar
//!
//! ```text
//! $                     the whole document
//! $.field               a named member (backslash escapes allowed)
//! $['field name']       a quoted member, either quote style
//! $[3]                  an array index
//! ```
//!
//! Anything that could select more than one node is rejected: the `..` scan
//! operator, wildcards, slices, unions and filter expressions.
//!
//! ## Rust Learning Notes:
//!
//! ### Parsing with a Cursor
//! The parser keeps the input as a `Vec<char>` and a `position` index. Each
//! helper consumes characters and leaves the cursor on the first character it
//! did not consume, so tokens are produced strictly left to right.
//!
//! ### `try_fold` for Walking a Document
//! [`ReferencePath::select`] walks the token list with `Iterator::try_fold`,
//! which stops at the first `None` - exactly the "missing path" semantics we
//! want without writing an explicit loop.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::{Result, StatesLanguageError};

/// One step of a parsed reference path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathToken {
    /// Object member access: `.name` or `['name']`
    Field(String),

    /// Array element access: `[3]`
    Index(usize),
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathToken::Field(name) => write!(f, "['{}']", name.replace('\\', "\\\\").replace('\'', "\\'")),
            PathToken::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// A parsed, validated reference path
///
/// Keeps the original text (so error messages and serialization can show what
/// the user wrote) alongside the token sequence produced by the parser.
///
/// ```rust
/// use states_language::models::{PathToken, ReferencePath};
///
/// let path = ReferencePath::parse("$.orders[0]['ship to']").unwrap();
/// assert_eq!(path.tokens(), &[
///     PathToken::Field("orders".to_string()),
///     PathToken::Index(0),
///     PathToken::Field("ship to".to_string()),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferencePath {
    path: String,
    tokens: Vec<PathToken>,
}

impl ReferencePath {
    /// Parse a reference path, failing with `InvalidReferencePath`
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = ReferencePathParser::new(text).parse()?;
        Ok(ReferencePath {
            path: text.to_string(),
            tokens,
        })
    }

    /// The root path `$`
    pub fn root() -> Self {
        ReferencePath {
            path: "$".to_string(),
            tokens: Vec::new(),
        }
    }

    /// The path as originally written
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Tokens in evaluation order
    pub fn tokens(&self) -> &[PathToken] {
        &self.tokens
    }

    /// `true` for a lone `$`
    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Select the node this path identifies, if it exists
    ///
    /// Field tokens only match objects and index tokens only match arrays;
    /// any other combination means the path does not exist in the document.
    pub fn select<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.tokens
            .iter()
            .try_fold(document, |current, token| match (token, current) {
                (PathToken::Field(name), Value::Object(map)) => map.get(name),
                (PathToken::Index(index), Value::Array(items)) => items.get(*index),
                _ => None,
            })
    }
}

impl FromStr for ReferencePath {
    type Err = StatesLanguageError;

    fn from_str(s: &str) -> Result<Self> {
        ReferencePath::parse(s)
    }
}

impl fmt::Display for ReferencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Best-effort single-node lookup used by conditions and intrinsic functions
///
/// Expressions outside the reference-path subset select nothing rather than
/// failing; callers treat "nothing" as a missing value.
pub fn select_token<'a>(document: &'a Value, expression: &str) -> Option<&'a Value> {
    ReferencePath::parse(expression).ok()?.select(document)
}

/// Lenient JSONPath syntax check for `InputPath`, `OutputPath` and `Variable`
///
/// Every reference path passes. Other expressions must start with `$`, keep
/// brackets and parentheses balanced, and close every quote.
pub fn is_valid_json_path(expression: &str) -> bool {
    if !expression.starts_with('$') {
        return false;
    }
    if ReferencePath::parse(expression).is_ok() {
        return true;
    }

    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in expression.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some(q) => {
                if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\\' => escaped = true,
                '\'' | '"' => quote = Some(c),
                '[' | '(' => depth += 1,
                ']' | ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return false;
                    }
                }
                _ => {}
            },
        }
    }

    depth == 0 && quote.is_none() && !escaped
}

struct ReferencePathParser<'a> {
    source: &'a str,
    chars: Vec<char>,
    position: usize,
}

impl<'a> ReferencePathParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            position: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> StatesLanguageError {
        StatesLanguageError::InvalidReferencePath {
            path: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn parse(mut self) -> Result<Vec<PathToken>> {
        if self.source.is_empty() {
            return Err(self.error("path is empty"));
        }
        if !self.source.starts_with('$') {
            return Err(self.error("path must start with '$'"));
        }
        if self.source.contains("..") {
            return Err(self.error("the '..' scan operator is not allowed"));
        }

        let mut tokens = Vec::new();
        self.position = 1;

        while let Some(&c) = self.chars.get(self.position) {
            match c {
                '.' => {
                    self.position += 1;
                    tokens.push(PathToken::Field(self.read_unquoted_field()?));
                }
                '[' => {
                    self.position += 1;
                    tokens.push(self.read_indexer()?);
                }
                other => {
                    return Err(self.error(format!(
                        "unexpected character '{}' at position {}",
                        other, self.position
                    )))
                }
            }
        }

        Ok(tokens)
    }

    fn read_unquoted_field(&mut self) -> Result<String> {
        let start = self.position;
        let mut name = String::new();

        while let Some(&c) = self.chars.get(self.position) {
            match c {
                '.' | '[' => break,
                '\\' => {
                    let escaped = *self.chars.get(self.position + 1).ok_or_else(|| {
                        self.error(format!("dangling escape at position {}", self.position))
                    })?;
                    name.push(escaped);
                    self.position += 2;
                }
                ']' | '*' | '?' => {
                    return Err(self.error(format!(
                        "invalid character '{}' in field name at position {}",
                        c, self.position
                    )))
                }
                '\'' | '"' => {
                    return Err(self.error(format!(
                        "unescaped quote in field name at position {}",
                        self.position
                    )))
                }
                _ => {
                    name.push(c);
                    self.position += 1;
                }
            }
        }

        if name.is_empty() {
            return Err(self.error(format!("empty field name at position {}", start)));
        }
        Ok(name)
    }

    fn read_indexer(&mut self) -> Result<PathToken> {
        match self.chars.get(self.position).copied() {
            Some(quote @ ('\'' | '"')) => {
                let start = self.position;
                self.position += 1;
                let mut name = String::new();
                loop {
                    match self.chars.get(self.position).copied() {
                        None => {
                            return Err(self.error(format!(
                                "unterminated quoted field name starting at position {}",
                                start
                            )))
                        }
                        Some('\\') => {
                            let escaped = *self.chars.get(self.position + 1).ok_or_else(|| {
                                self.error(format!("dangling escape at position {}", self.position))
                            })?;
                            name.push(escaped);
                            self.position += 2;
                        }
                        Some(c) if c == quote => {
                            self.position += 1;
                            break;
                        }
                        Some(c) => {
                            name.push(c);
                            self.position += 1;
                        }
                    }
                }
                if self.chars.get(self.position) != Some(&']') {
                    return Err(self.error(format!("expected ']' at position {}", self.position)));
                }
                self.position += 1;
                Ok(PathToken::Field(name))
            }
            Some(_) => {
                let start = self.position;
                let end = self.chars[start..]
                    .iter()
                    .position(|c| *c == ']')
                    .map(|offset| start + offset)
                    .ok_or_else(|| {
                        self.error(format!("unterminated indexer starting at position {}", start - 1))
                    })?;
                let content: String = self.chars[start..end].iter().collect();
                let content = content.trim();
                self.position = end + 1;

                if content.starts_with('?') {
                    return Err(self.error("filter expressions are not allowed"));
                }
                if content.contains('*') {
                    return Err(self.error("wildcards are not allowed"));
                }
                if content.contains(':') {
                    return Err(self.error("array slices are not allowed"));
                }
                if content.contains(',') {
                    return Err(self.error("unions are not allowed"));
                }
                content
                    .parse::<usize>()
                    .map(PathToken::Index)
                    .map_err(|_| self.error(format!("invalid array index '{}'", content)))
            }
            None => Err(self.error(format!(
                "unterminated indexer starting at position {}",
                self.position - 1
            ))),
        }
    }
}
