pub mod ast;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod token;
pub mod visitor;

pub use ast::Ast;
pub use lexer::{tokenize, LexError, LexErrorReason};
pub use parser::{Parser, ParserError, ParserErrorKind, ParserResult, SourceLocation};

/// Lex and parse `source` into an AST.
pub fn parse(source: &str) -> ParserResult<Ast> {
    Parser::new(source).parse_expression()
}
