//! Directive source parsing
//!
//! A directive source is line-oriented text. Each non-blank line holds one
//! directive; `#` starts a comment anywhere outside a string literal.
//!
//! ```text
//! site_name = "DockerWiki"
//! secret_key ?= generate(64)
//! shared_tables += "actor"
//! load_skin "Vector"
//! ```

use crate::error::{Result, WikiconfError};
use regex::Regex;
use std::fmt;

const MAX_GENERATED_LENGTH: usize = 1024;

/// How a directive combines with the value already present for its key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveOp {
    /// `key = value`, later directives win
    Set,
    /// `key ?= value`, applied only when the key has no value yet
    SetIfAbsent,
    /// `key += value`, `load_skin`, `load_extension`
    Append,
}

impl DirectiveOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            DirectiveOp::Set => "=",
            DirectiveOp::SetIfAbsent => "?=",
            DirectiveOp::Append => "+=",
        }
    }
}

/// Piece of a string literal containing `${key}` references
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Reference(String),
}

/// Value as written in the source, before coercion
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    /// String literal with at least one `${key}` reference
    Template(Vec<Segment>),
    /// Unquoted word such as `none` or `mysql`
    Bare(String),
    Bool(bool),
    Int(i64),
    List(Vec<RawValue>),
    /// `generate(N)`: random secret of N hex characters
    Generate(usize),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Text(s) => write!(f, "{s:?}"),
            RawValue::Template(segments) => {
                let rendered: String = segments
                    .iter()
                    .map(|segment| match segment {
                        Segment::Literal(s) => s.clone(),
                        Segment::Reference(name) => format!("${{{name}}}"),
                    })
                    .collect();
                write!(f, "{rendered:?}")
            }
            RawValue::Bare(s) => write!(f, "{s}"),
            RawValue::Bool(b) => write!(f, "{b}"),
            RawValue::Int(i) => write!(f, "{i}"),
            RawValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            RawValue::Generate(length) => write!(f, "generate({length})"),
        }
    }
}

/// One key assignment from the source
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    /// 1-based source line
    pub line: usize,
    pub key: String,
    pub op: DirectiveOp,
    pub value: RawValue,
}

impl Directive {
    pub fn new<S: Into<String>>(line: usize, key: S, op: DirectiveOp, value: RawValue) -> Self {
        Self {
            line,
            key: key.into(),
            op,
            value,
        }
    }
}

/// Parse a directive source into directives, in source order
pub fn parse_directives(source: &str) -> Result<Vec<Directive>> {
    let name_pattern = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$")?;
    let mut directives = Vec::new();

    for (index, text) in source.lines().enumerate() {
        let line = index + 1;
        let mut cursor = Cursor::new(text, line, &name_pattern);

        cursor.skip_whitespace();
        if cursor.at_end_or_comment() {
            continue;
        }

        let name = cursor.word();
        if !name_pattern.is_match(&name) {
            return Err(cursor.error("expected a setting name"));
        }
        cursor.skip_whitespace();

        let (key, op) = match name.as_str() {
            "load_skin" => ("skins".to_string(), DirectiveOp::Append),
            "load_extension" => ("extensions".to_string(), DirectiveOp::Append),
            _ => {
                let op = cursor.operator()?;
                cursor.skip_whitespace();
                (name, op)
            }
        };

        let value = cursor.value()?;
        cursor.skip_whitespace();
        if !cursor.at_end_or_comment() {
            return Err(cursor.error("unexpected input after value"));
        }

        directives.push(Directive::new(line, key, op, value));
    }

    Ok(directives)
}

struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    name_pattern: &'a Regex,
}

impl<'a> Cursor<'a> {
    fn new(text: &str, line: usize, name_pattern: &'a Regex) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line,
            name_pattern,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn error(&self, message: &str) -> WikiconfError {
        let found = match self.peek() {
            Some(c) => format!("'{c}'"),
            None => "end of line".to_string(),
        };
        WikiconfError::parse(
            self.line,
            format!("{message} (column {}, found {found})", self.pos + 1),
        )
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn at_end_or_comment(&self) -> bool {
        matches!(self.peek(), None | Some('#'))
    }

    fn take_while<F: Fn(char) -> bool>(&mut self, accept: F) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if accept(c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn word(&mut self) -> String {
        self.take_while(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    fn operator(&mut self) -> Result<DirectiveOp> {
        let op = match self.peek() {
            Some('=') => DirectiveOp::Set,
            Some('?') => DirectiveOp::SetIfAbsent,
            Some('+') => DirectiveOp::Append,
            _ => return Err(self.error("expected '=', '?=' or '+='")),
        };
        self.pos += 1;
        if op != DirectiveOp::Set {
            if self.peek() != Some('=') {
                return Err(self.error("expected '=' to complete the operator"));
            }
            self.pos += 1;
        }
        Ok(op)
    }

    fn value(&mut self) -> Result<RawValue> {
        match self.peek() {
            Some('"') => self.string(),
            Some('[') => self.list(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.integer(),
            Some(c) if c.is_ascii_alphabetic() => self.word_value(),
            _ => Err(self.error("expected a value")),
        }
    }

    fn string(&mut self) -> Result<RawValue> {
        self.bump();
        let mut segments = Vec::new();
        let mut literal = String::new();

        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('"') => literal.push('"'),
                    Some('\\') => literal.push('\\'),
                    Some('n') => literal.push('\n'),
                    Some('t') => literal.push('\t'),
                    Some('$') => literal.push('$'),
                    _ => {
                        self.pos -= 1;
                        return Err(self.error("unknown escape sequence"));
                    }
                },
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    let name = self.take_while(|c| c != '}' && c != '"');
                    if self.bump() != Some('}') {
                        return Err(self.error("unterminated '${' reference"));
                    }
                    if !self.name_pattern.is_match(&name) {
                        return Err(WikiconfError::parse(
                            self.line,
                            format!("invalid reference name '{name}'"),
                        ));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Reference(name));
                }
                Some(c) => literal.push(c),
            }
        }

        if segments.is_empty() {
            return Ok(RawValue::Text(literal));
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(RawValue::Template(segments))
    }

    fn list(&mut self) -> Result<RawValue> {
        self.bump();
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some(']') {
                self.bump();
                break;
            }
            if self.peek() == Some('[') {
                return Err(self.error("nested lists are not supported"));
            }
            items.push(self.value()?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(']') => break,
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.error("expected ',' or ']' in list"));
                }
            }
        }

        Ok(RawValue::List(items))
    }

    fn integer(&mut self) -> Result<RawValue> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        let digits = self.take_while(|c| c.is_ascii_digit() || c == '_');
        let text: String = self.chars[start..self.pos].iter().collect();
        if digits.is_empty() {
            return Err(self.error("expected digits"));
        }
        text.replace('_', "")
            .parse::<i64>()
            .map(RawValue::Int)
            .map_err(|_| WikiconfError::parse(self.line, format!("integer out of range: {text}")))
    }

    fn word_value(&mut self) -> Result<RawValue> {
        let word = self.take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        match word.as_str() {
            "true" => Ok(RawValue::Bool(true)),
            "false" => Ok(RawValue::Bool(false)),
            "generate" if self.peek() == Some('(') => self.generate(),
            _ => Ok(RawValue::Bare(word)),
        }
    }

    fn generate(&mut self) -> Result<RawValue> {
        self.bump();
        self.skip_whitespace();
        let digits = self.take_while(|c| c.is_ascii_digit());
        self.skip_whitespace();
        if self.bump() != Some(')') {
            self.pos = self.pos.saturating_sub(1);
            return Err(self.error("expected ')' after generate length"));
        }
        let length = digits
            .parse::<usize>()
            .map_err(|_| WikiconfError::parse(self.line, "generate() needs a length"))?;
        if length == 0 || length > MAX_GENERATED_LENGTH {
            return Err(WikiconfError::parse(
                self.line,
                format!("generate() length must be between 1 and {MAX_GENERATED_LENGTH}"),
            ));
        }
        Ok(RawValue::Generate(length))
    }
}
