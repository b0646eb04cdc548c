use crate::range::Range;
use std::fmt;

/// 1-based line/column coordinates of a char offset, derived on demand from
/// the source text. Tokens themselves carry only [`Range`]s; coordinates
/// exist for error display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Coordinates of `offset` in `text`. Offsets are char counts, matching the
/// ranges the tokenizer records.
pub fn line_col_at(text: &str, offset: usize) -> LineCol {
    let mut line = 1;
    let mut column = 1;
    for (i, ch) in text.chars().enumerate() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    LineCol { line, column }
}

/// Parse error anchored to the offending source range.
#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub at: Option<Range>,
}

impl ParseError {
    pub fn new(message: String) -> Self {
        Self { message, at: None }
    }

    pub fn at_range(message: String, at: Range) -> Self {
        Self {
            message,
            at: Some(at),
        }
    }

    pub fn at_offset(message: String, offset: usize) -> Self {
        Self {
            message,
            at: Some(Range::new(offset, offset + 1)),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.at {
            Some(at) => write!(f, "{} at {}", self.message, at),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ParseError {}
