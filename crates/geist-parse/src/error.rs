use thiserror::Error;

use crate::lexer::Token;

/// Tokenizer failure: no rule matched at `offset`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct ParsingError {
    pub message: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

/// Grammar failure covering the character range `start..end` of the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    pub start: usize,
    pub end: usize,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            message: message.into(),
            start,
            end: end.max(start),
        }
    }

    /// Error spanning a single token.
    pub fn at(token: &Token, message: impl Into<String>) -> Self {
        Self::new(message, token.pos, token.end())
    }
}

impl From<ParsingError> for SyntaxError {
    fn from(e: ParsingError) -> Self {
        SyntaxError::new(e.message, e.offset, e.offset + 1)
    }
}
