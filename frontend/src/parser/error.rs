use crate::lexer::{LexError, LexErrorReason};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl SourceLocation {
    /// Compute line and column (both 1-based) for a byte offset into `source`.
    pub fn from_offset(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = source.get(..offset).unwrap_or(source);
        let line = before.matches('\n').count() as u32 + 1;
        let column = match before.rfind('\n') {
            Some(nl) => before[nl + 1..].chars().count(),
            None => before.chars().count(),
        } as u32
            + 1;
        SourceLocation { line, column, offset: offset as u32 }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.line, self.column, self.offset)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParserErrorKind {
    #[error("expected {expected} but found {found}")]
    UnexpectedToken { expected: String, found: String },
    #[error("{0}")]
    Lex(LexErrorReason),
    #[error("expression nesting exceeds maximum depth of {max_depth}")]
    RecursionLimitExceeded { max_depth: usize },
    #[error("{message}")]
    InvalidSyntax { message: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{location}: {kind}")]
pub struct ParserError {
    pub kind: ParserErrorKind,
    pub location: SourceLocation,
}

pub type ParserResult<T> = Result<T, ParserError>;

impl ParserError {
    pub fn unexpected_token(location: SourceLocation, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            kind: ParserErrorKind::UnexpectedToken { expected: expected.into(), found: found.into() },
            location,
        }
    }

    pub fn lex_error(source: &str, error: LexError) -> Self {
        Self {
            kind: ParserErrorKind::Lex(error.reason),
            location: SourceLocation::from_offset(source, error.position),
        }
    }

    pub fn recursion_limit(location: SourceLocation, max_depth: usize) -> Self {
        Self { kind: ParserErrorKind::RecursionLimitExceeded { max_depth }, location }
    }

    pub fn invalid_syntax(location: SourceLocation, message: impl Into<String>) -> Self {
        Self { kind: ParserErrorKind::InvalidSyntax { message: message.into() }, location }
    }

    /// Byte offset of the offending token.
    pub fn position(&self) -> usize {
        self.location.offset as usize
    }

    pub fn expected(&self) -> Option<&str> {
        match &self.kind {
            ParserErrorKind::UnexpectedToken { expected, .. } => Some(expected),
            _ => None,
        }
    }

    pub fn found(&self) -> Option<&str> {
        match &self.kind {
            ParserErrorKind::UnexpectedToken { found, .. } => Some(found),
            _ => None,
        }
    }

    pub fn is_lex_error(&self) -> bool {
        matches!(self.kind, ParserErrorKind::Lex(_))
    }
}
