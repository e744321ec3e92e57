use geist_parse::{ParsingError, SyntaxError};
use thiserror::Error;

/// Why a pattern or mask could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),
    #[error("unknown block `{0}`")]
    UnknownBlock(String),
    #[error("block `{block}` has no state `{state}`")]
    UnknownState { state: String, block: String },
    #[error("invalid value `{value}` for state `{state}` of `{block}`: {reason}")]
    InvalidStateValue {
        state: String,
        value: String,
        block: String,
        reason: String,
    },
    #[error("unknown flag `{0}`")]
    UnknownFlag(String),
    #[error("invalid json: {0}")]
    InvalidJson(String),
}

impl ParseError {
    pub fn is_syntax(&self) -> bool {
        matches!(self, ParseError::Syntax(_))
    }

    pub(crate) fn syntax(message: impl Into<String>, start: usize, end: usize) -> Self {
        ParseError::Syntax(SyntaxError::new(message, start, end))
    }
}

impl From<ParsingError> for ParseError {
    fn from(e: ParsingError) -> Self {
        ParseError::Syntax(e.into())
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        ParseError::InvalidJson(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Failure of `parse_args`, shaped for a command layer that points a caret
/// at the offending argument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("argument {idx}: {message}")]
pub struct ArgError {
    pub idx: usize,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub message: String,
    pub syntax: bool,
}

impl ArgError {
    pub fn is_syntax_error(&self) -> bool {
        self.syntax
    }

    pub fn missing(idx: usize, what: &str) -> Self {
        Self {
            idx,
            start: None,
            end: None,
            message: format!("expected {what}"),
            syntax: true,
        }
    }

    pub fn from_parse(idx: usize, e: ParseError) -> Self {
        match e {
            ParseError::Syntax(s) => Self {
                idx,
                start: Some(s.start),
                end: Some(s.end),
                message: s.message,
                syntax: true,
            },
            other => Self {
                idx,
                start: None,
                end: None,
                message: other.to_string(),
                syntax: false,
            },
        }
    }
}
