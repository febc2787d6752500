pub mod core;
pub mod expr;
pub mod token_source;

#[cfg(test)]
pub mod tests;
pub mod error;

pub use core::{Parser, MAX_RECURSION_DEPTH};
pub use error::{ParserError, ParserErrorKind, ParserResult, SourceLocation};
