use std::ops::Range;
use crate::token::{Kind, Token};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexErrorReason {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("invalid numeric literal '{0}'")]
    InvalidNumber(String),
    #[error("numeric literal '{0}' does not fit its type")]
    NumberOutOfRange(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("lex error at {position}: {reason}")]
pub struct LexError {
    pub position: usize,
    pub reason: LexErrorReason,
}

mod scanner {
    #![allow(dead_code, unused_imports)]
    include!(concat!(env!("OUT_DIR"), "/lexer.rs"));
}

/// Raw lexeme classes recognized by the generated scanner in `lexer.l`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lexeme {
    Token(Kind),
    Word,
    Hex,
    Integer,
    Real,
    Quoted,
    Unterminated,
    Stray,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Scanned {
    lexeme: Lexeme,
    span: Range<usize>,
}

/// Tokenizer over the expression source.
///
/// `yylex` hands out one token per call and keeps returning `EOF` once the
/// input is exhausted. The iterator form stops at `EOF` or after the first
/// error, so lexing the same text twice always yields the same sequence.
pub struct Lexer<'a> {
    input: &'a str,
    scanner: scanner::Scanner<'a>,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            scanner: scanner::Scanner::new(input, 1usize),
            failed: false,
        }
    }

    pub fn get_current_line_count(&self) -> usize {
        self.scanner.line_count()
    }

    fn error(&mut self, position: usize, reason: LexErrorReason) -> LexError {
        self.failed = true;
        LexError { position, reason }
    }

    pub fn yylex(&mut self) -> Result<Token, LexError> {
        let Scanned { lexeme, span } = match self.scanner.yylex() {
            Ok(scanned) => scanned,
            Err(scanner::Error::EOF) => {
                let end = self.input.len();
                return Ok(Token { kind: Kind::EOF, position: end..end });
            }
            Err(scanner::Error::Unmatch) => {
                let position = self.scanner.yybytepos().start;
                let c = self.input[position..].chars().next().unwrap_or('\0');
                return Err(self.error(position, LexErrorReason::UnexpectedCharacter(c)));
            }
        };
        let input = self.input;
        let text = &input[span.clone()];
        let kind = match lexeme {
            Lexeme::Token(kind) => kind,
            Lexeme::Word => keyword_or_identifier(text),
            Lexeme::Hex => hex_number(text).map_err(|reason| self.error(span.start, reason))?,
            Lexeme::Integer => integer_number(text).map_err(|reason| self.error(span.start, reason))?,
            Lexeme::Real => real_number(text).map_err(|reason| self.error(span.start, reason))?,
            Lexeme::Quoted => Kind::String(unquote(text)),
            Lexeme::Unterminated => return Err(self.error(span.start, LexErrorReason::UnterminatedString)),
            Lexeme::Stray => {
                let c = text.chars().next().unwrap_or('\0');
                return Err(self.error(span.start, LexErrorReason::UnexpectedCharacter(c)));
            }
        };
        Ok(Token { kind, position: span })
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.yylex() {
            Ok(Token { kind: Kind::EOF, .. }) => None,
            other => Some(other),
        }
    }
}

fn keyword_or_identifier(text: &str) -> Kind {
    match text.to_ascii_lowercase().as_str() {
        "true" => Kind::True,
        "false" => Kind::False,
        "null" => Kind::Null,
        "new" => Kind::New,
        "instanceof" => Kind::InstanceOf,
        "matches" => Kind::Matches,
        "between" => Kind::Between,
        "and" => Kind::DoubleAnd,
        "or" => Kind::DoubleOr,
        "not" => Kind::Not,
        "div" => Kind::Div,
        "mod" => Kind::Mod,
        "lt" => Kind::LT,
        "le" => Kind::LE,
        "gt" => Kind::GT,
        "ge" => Kind::GE,
        "eq" => Kind::DoubleEqual,
        "ne" => Kind::NotEqual,
        _ => Kind::Identifier(text.to_string()),
    }
}

// Quotes are escaped by doubling them: 'it''s'
fn unquote(text: &str) -> String {
    let quote = &text[..1];
    let body = &text[1..text.len() - 1];
    body.replace(&quote.repeat(2), quote)
}

fn split_suffix<'t>(text: &'t str, suffixes: &[char]) -> (&'t str, Option<char>) {
    match text.chars().last() {
        Some(c) if suffixes.contains(&c) => (&text[..text.len() - 1], Some(c.to_ascii_uppercase())),
        _ => (text, None),
    }
}

fn hex_number(text: &str) -> Result<Kind, LexErrorReason> {
    let (body, suffix) = split_suffix(text, &['L', 'l']);
    let digits = &body[2..];
    match suffix {
        Some(_) => i64::from_str_radix(digits, 16)
            .map(Kind::Long)
            .map_err(|_| LexErrorReason::NumberOutOfRange(format!("0x{digits}L"))),
        None => i32::from_str_radix(digits, 16)
            .map(Kind::Int)
            .map_err(|_| LexErrorReason::NumberOutOfRange(format!("0x{digits}"))),
    }
}

fn integer_number(text: &str) -> Result<Kind, LexErrorReason> {
    let (body, suffix) = split_suffix(text, &['L', 'l']);
    match suffix {
        Some(_) => body
            .parse::<i64>()
            .map(Kind::Long)
            .map_err(|_| LexErrorReason::NumberOutOfRange(format!("{body}L"))),
        None => body
            .parse::<i32>()
            .map(Kind::Int)
            .map_err(|_| LexErrorReason::NumberOutOfRange(body.to_string())),
    }
}

fn real_number(text: &str) -> Result<Kind, LexErrorReason> {
    let (body, suffix) = split_suffix(text, &['F', 'f', 'D', 'd']);
    let invalid = |_| LexErrorReason::InvalidNumber(body.to_string());
    match suffix {
        Some('F') => body.parse::<f32>().map(Kind::Float).map_err(invalid),
        _ => body.parse::<f64>().map(Kind::Double).map_err(invalid),
    }
}

/// Lex the whole source eagerly. The trailing `EOF` token is not included.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kinds(input: &str) -> Vec<Kind> {
        tokenize(input)
            .expect("lexing should succeed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[rstest]
    #[case("42", Kind::Int(42))]
    #[case("0x1F", Kind::Int(31))]
    #[case("42L", Kind::Long(42))]
    #[case("0xFFL", Kind::Long(255))]
    #[case("1.5", Kind::Double(1.5))]
    #[case("1e3", Kind::Double(1000.0))]
    #[case("2.5E-1", Kind::Double(0.25))]
    #[case("1.5f", Kind::Float(1.5))]
    #[case("3d", Kind::Double(3.0))]
    #[case("'it''s'", Kind::String("it's".to_string()))]
    #[case("\"say \"\"hi\"\"\"", Kind::String("say \"hi\"".to_string()))]
    #[case("TRUE", Kind::True)]
    #[case("null", Kind::Null)]
    fn lexer_literal_tests(#[case] input: &str, #[case] expected: Kind) {
        assert_eq!(kinds(input), vec![expected], "Input: '{input}'");
    }

    #[rstest]
    #[case("?.", Kind::SafeNavigation)]
    #[case("?:", Kind::Elvis)]
    #[case("?[", Kind::Select)]
    #[case("^[", Kind::SelectFirst)]
    #[case("$[", Kind::SelectLast)]
    #[case("![", Kind::Project)]
    #[case("!=", Kind::NotEqual)]
    #[case("==", Kind::DoubleEqual)]
    #[case("<=", Kind::LE)]
    #[case("&&", Kind::DoubleAnd)]
    #[case("and", Kind::DoubleAnd)]
    #[case("DIV", Kind::Div)]
    #[case("mod", Kind::Mod)]
    #[case("instanceof", Kind::InstanceOf)]
    fn lexer_symbol_tests(#[case] input: &str, #[case] expected: Kind) {
        assert_eq!(kinds(input), vec![expected], "Input: '{input}'");
    }

    #[test]
    fn lexer_sequence_with_positions() {
        let tokens = tokenize("a.b(1, 'x')").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                Kind::Identifier("a".to_string()),
                Kind::Dot,
                Kind::Identifier("b".to_string()),
                Kind::ParenOpen,
                Kind::Int(1),
                Kind::Comma,
                Kind::String("x".to_string()),
                Kind::ParenClose,
            ]
        );
        assert_eq!(tokens[2].position, 2..3);
        assert_eq!(tokens[6].position, 7..10);
    }

    #[test]
    fn lexer_integer_followed_by_method_call() {
        assert_eq!(
            kinds("1.toString()"),
            vec![
                Kind::Int(1),
                Kind::Dot,
                Kind::Identifier("toString".to_string()),
                Kind::ParenOpen,
                Kind::ParenClose,
            ]
        );
    }

    #[test]
    fn lexer_unterminated_string() {
        let err = tokenize("'abc").unwrap_err();
        assert_eq!(err.position, 0);
        assert_eq!(err.reason, LexErrorReason::UnterminatedString);
    }

    #[test]
    fn lexer_unexpected_character() {
        let err = tokenize("1 ~ 2").unwrap_err();
        assert_eq!(err.position, 2);
        assert_eq!(err.reason, LexErrorReason::UnexpectedCharacter('~'));
    }

    #[test]
    fn lexer_int_overflow_is_an_error() {
        let err = tokenize("2147483648").unwrap_err();
        assert!(matches!(err.reason, LexErrorReason::NumberOutOfRange(_)));
        assert_eq!(kinds("2147483648L"), vec![Kind::Long(2147483648)]);
    }

    #[test]
    fn lexer_is_restartable() {
        let source = "#x > 3 ? {1,2} : @bean.name";
        assert_eq!(tokenize(source).unwrap(), tokenize(source).unwrap());
    }

    #[rstest]
    #[case("'a''", 0)]
    #[case("1 + \"open", 4)]
    fn lexer_unterminated_cases(#[case] input: &str, #[case] position: usize) {
        let err = tokenize(input).unwrap_err();
        assert_eq!((err.position, err.reason), (position, LexErrorReason::UnterminatedString));
    }

    #[test]
    fn lexer_reports_non_ascii_stray() {
        let err = tokenize("a § b").unwrap_err();
        assert_eq!(err.position, 2);
        assert_eq!(err.reason, LexErrorReason::UnexpectedCharacter('§'));
    }

    #[test]
    fn lexer_positions_are_bytes() {
        let tokens = tokenize("'é' + x").unwrap();
        assert_eq!(tokens[0].position, 0..4);
        assert_eq!(tokens[2].position, 7..8);
    }

    #[test]
    fn lexer_keeps_returning_eof() {
        let mut lexer = Lexer::new("x");
        assert!(matches!(lexer.yylex().unwrap().kind, Kind::Identifier(_)));
        assert_eq!(lexer.yylex().unwrap().kind, Kind::EOF);
        assert_eq!(lexer.yylex().unwrap().kind, Kind::EOF);
    }

    #[test]
    fn lexer_counts_lines() {
        let mut lexer = Lexer::new("1 +\r\n 2\n");
        while lexer.next().is_some() {}
        assert_eq!(lexer.get_current_line_count(), 3);
    }
}
