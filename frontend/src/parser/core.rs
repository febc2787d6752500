use crate::ast::*;
use crate::token::Kind;
use super::error::{ParserError, ParserResult, SourceLocation};
use super::token_source::{LexerTokenSource, TokenProvider};

use string_interner::DefaultStringInterner;

pub const MAX_RECURSION_DEPTH: usize = 256;

pub struct Parser<'a> {
    token_provider: TokenProvider<LexerTokenSource<'a>>,
    pub ast_builder: AstBuilder,
    pub string_interner: DefaultStringInterner,
    source: &'a str,
    recursion_depth: usize,
    max_recursion_depth: usize,
    prev_end: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let source = LexerTokenSource::new(input);
        Parser {
            token_provider: TokenProvider::with_buffer_capacity(source, 16),
            ast_builder: AstBuilder::with_capacity(64),
            string_interner: DefaultStringInterner::new(),
            source: input,
            recursion_depth: 0,
            max_recursion_depth: MAX_RECURSION_DEPTH,
            prev_end: 0,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_recursion_depth = max_depth;
        self
    }

    pub fn peek(&mut self) -> Option<&Kind> {
        self.token_provider.peek()
    }

    pub fn peek_n(&mut self, pos: usize) -> Option<&Kind> {
        self.token_provider.peek_at(pos)
    }

    pub fn peek_position_n(&mut self, pos: usize) -> Option<&std::ops::Range<usize>> {
        self.token_provider.peek_position_at(pos)
    }

    pub fn next(&mut self) {
        if let Some(token) = self.token_provider.advance() {
            self.prev_end = token.position.end;
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn line_count(&self) -> usize {
        self.token_provider.line_count()
    }

    /// Start offset of the current token.
    pub fn current_start(&mut self) -> usize {
        let fallback = self.prev_end;
        self.peek_position_n(0).map(|r| r.start).unwrap_or(fallback)
    }

    /// Span from `start` to the end of the last consumed token.
    pub fn node_from(&self, start: usize) -> Node {
        Node::new(start, self.prev_end.max(start))
    }

    pub fn current_source_location(&mut self) -> SourceLocation {
        let offset = self.current_start();
        SourceLocation::from_offset(self.source, offset)
    }

    pub fn expect(&mut self, accept: &Kind) -> ParserResult<()> {
        if self.peek() == Some(accept) {
            self.next();
            Ok(())
        } else {
            Err(self.unexpected(accept.describe()))
        }
    }

    /// Error for the current token; a parked lexing error takes precedence.
    pub fn unexpected(&mut self, expected: impl Into<String>) -> ParserError {
        if let Some(lex_error) = self.token_provider.lex_error().cloned() {
            return ParserError::lex_error(self.source, lex_error);
        }
        let found = self.peek().map(|k| k.describe()).unwrap_or_else(|| Kind::EOF.describe());
        let location = self.current_source_location();
        ParserError::unexpected_token(location, expected, found)
    }

    pub fn check_and_increment_recursion(&mut self) -> ParserResult<()> {
        if self.recursion_depth >= self.max_recursion_depth {
            let location = self.current_source_location();
            return Err(ParserError::recursion_limit(location, self.max_recursion_depth));
        }
        self.recursion_depth += 1;
        Ok(())
    }

    pub fn decrement_recursion(&mut self) {
        self.recursion_depth = self.recursion_depth.saturating_sub(1);
    }

    pub fn get_string_interner(&mut self) -> &mut DefaultStringInterner {
        &mut self.string_interner
    }

    /// Parse the whole input as one expression. Anything left after the
    /// expression is an error, and no partial tree is returned on failure.
    pub fn parse_expression(mut self) -> ParserResult<Ast> {
        let root = self.parse_expr_impl()?;
        match self.peek() {
            Some(Kind::EOF) => {}
            _ => return Err(self.unexpected(Kind::EOF.describe())),
        }
        Ok(Ast {
            root,
            expression: self.ast_builder.extract_pool(),
            string_interner: self.string_interner,
            source: self.source.to_string(),
        })
    }
}
