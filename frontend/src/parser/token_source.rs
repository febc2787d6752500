use crate::lexer::{LexError, Lexer};
use crate::token::{Kind, Token};
use std::collections::VecDeque;

/// Trait for token sources that can provide tokens to the parser
pub trait TokenSource {
    /// Next token, `Ok(None)` once the input is exhausted.
    fn next_token(&mut self) -> Result<Option<Token>, LexError>;

    fn line_count(&self) -> usize;
}

/// Couples a `TokenSource` with a lookahead queue.
///
/// Tokens are pulled lazily. The first lexing error is parked in the
/// provider and the token stream ends there; the parser turns the parked
/// error into its own error type when it runs out of tokens.
pub struct TokenProvider<T: TokenSource> {
    source: T,
    buffer: VecDeque<Token>,
    error: Option<LexError>,
    exhausted: bool,
    consumed: usize,
}

impl<T: TokenSource> TokenProvider<T> {
    pub fn new(source: T) -> Self {
        Self::with_buffer_capacity(source, 16)
    }

    pub fn with_buffer_capacity(source: T, capacity: usize) -> Self {
        TokenProvider {
            source,
            buffer: VecDeque::with_capacity(capacity),
            error: None,
            exhausted: false,
            consumed: 0,
        }
    }

    pub fn peek(&mut self) -> Option<&Kind> {
        self.peek_at(0)
    }

    pub fn peek_at(&mut self, relative_pos: usize) -> Option<&Kind> {
        self.fill(relative_pos);
        self.buffer.get(relative_pos).map(|t| &t.kind)
    }

    pub fn peek_position_at(&mut self, relative_pos: usize) -> Option<&std::ops::Range<usize>> {
        self.fill(relative_pos);
        self.buffer.get(relative_pos).map(|t| &t.position)
    }

    /// Consume the current token, returning it.
    pub fn advance(&mut self) -> Option<Token> {
        self.fill(0);
        let token = self.buffer.pop_front();
        if token.is_some() {
            self.consumed += 1;
        }
        token
    }

    fn fill(&mut self, relative_pos: usize) {
        while self.buffer.len() <= relative_pos && !self.exhausted {
            match self.source.next_token() {
                Ok(Some(token)) => self.buffer.push_back(token),
                Ok(None) => self.exhausted = true,
                Err(e) => {
                    self.error = Some(e);
                    self.exhausted = true;
                }
            }
        }
    }

    pub fn lex_error(&self) -> Option<&LexError> {
        self.error.as_ref()
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn line_count(&self) -> usize {
        self.source.line_count()
    }
}

/// Lexer wrapper that implements TokenSource
pub struct LexerTokenSource<'a> {
    lexer: Lexer<'a>,
    done: bool,
}

impl<'a> LexerTokenSource<'a> {
    pub fn new(input: &'a str) -> Self {
        LexerTokenSource { lexer: Lexer::new(input), done: false }
    }
}

impl TokenSource for LexerTokenSource<'_> {
    // The EOF token is handed out once so the parser can report its position.
    fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        if self.done {
            return Ok(None);
        }
        let token = self.lexer.yylex()?;
        if token.kind == Kind::EOF {
            self.done = true;
        }
        Ok(Some(token))
    }

    fn line_count(&self) -> usize {
        self.lexer.get_current_line_count()
    }
}
