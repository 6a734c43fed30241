//! Lexer for block-structured server configuration
//!
//! The scanner runs in two modes:
//! - *root*: between statements. Recognizes whitespace, newlines, comments,
//!   `}` and the identifier that starts a statement.
//! - *statement*: after an identifier. Recognizes expressions, quoted
//!   strings, whitespace, newlines, comments and the terminators `;`, `{`
//!   and `}`, each of which switches back to root mode.
//!
//! Nothing is skipped: every byte of the source belongs to exactly one
//! token, so the parser can keep all decoration around entries.

use logos::{Lexer, Logos, Span};
use std::fmt;

/// Source location for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub start: usize,
    pub end: usize,
    /// 1-based line of `start`
    pub line: usize,
}

impl Location {
    pub fn new(span: Span, line: usize) -> Self {
        Self {
            start: span.start,
            end: span.end,
            line,
        }
    }
}

/// A token with its location in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub value: T,
    pub span: Location,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: Location) -> Self {
        Self { value, span }
    }
}

/// Tokens recognized between statements
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum RootToken {
    #[regex(r"[ \t\r\f]+")]
    Whitespace,

    #[token("\n")]
    Newline,

    #[regex(r"#[^\n]*")]
    Comment,

    #[token("}")]
    BlockClose,

    #[regex(r#"[^ \t\r\n\f;{}#"']+"#)]
    Ident,
}

/// Tokens recognized inside a statement
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum StatementToken {
    #[regex(r"[ \t\r\f]+")]
    Whitespace,

    #[token("\n")]
    Newline,

    #[regex(r"#[^\n]*")]
    Comment,

    #[token(";")]
    Semicolon,

    #[token("{")]
    BlockOpen,

    #[token("}")]
    BlockClose,

    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r#"'([^'\\]|\\.)*'"#)]
    QuotedString,

    /// Anything up to whitespace or a terminator. `${var}` and `%{var}`
    /// references keep their braces inside the expression.
    #[regex(r#"([^ \t\r\n\f;{}#"'$%]|[$%]\{[^ \t\r\n\f;{}]*\}|[$%])([^ \t\r\n\f;{}#$%]|[$%]\{[^ \t\r\n\f;{}]*\}|[$%])*"#)]
    Expression,
}

/// Token kinds produced by [`tokenize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Whitespace,
    Newline,
    Comment,
    /// First word of a statement
    Ident,
    /// Unquoted argument
    Expression,
    /// Single or double quoted argument, quotes included
    QuotedString,
    Semicolon,
    BlockOpen,
    BlockClose,
}

impl Token {
    /// Whitespace, newlines and comments
    pub fn is_trivia(&self) -> bool {
        matches!(self, Token::Whitespace | Token::Newline | Token::Comment)
    }
}

impl From<RootToken> for Token {
    fn from(token: RootToken) -> Self {
        match token {
            RootToken::Whitespace => Token::Whitespace,
            RootToken::Newline => Token::Newline,
            RootToken::Comment => Token::Comment,
            RootToken::BlockClose => Token::BlockClose,
            RootToken::Ident => Token::Ident,
        }
    }
}

impl From<StatementToken> for Token {
    fn from(token: StatementToken) -> Self {
        match token {
            StatementToken::Whitespace => Token::Whitespace,
            StatementToken::Newline => Token::Newline,
            StatementToken::Comment => Token::Comment,
            StatementToken::Semicolon => Token::Semicolon,
            StatementToken::BlockOpen => Token::BlockOpen,
            StatementToken::BlockClose => Token::BlockClose,
            StatementToken::QuotedString => Token::QuotedString,
            StatementToken::Expression => Token::Expression,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Whitespace => write!(f, "whitespace"),
            Token::Newline => write!(f, "newline"),
            Token::Comment => write!(f, "comment"),
            Token::Ident => write!(f, "identifier"),
            Token::Expression => write!(f, "value"),
            Token::QuotedString => write!(f, "quoted string"),
            Token::Semicolon => write!(f, "';'"),
            Token::BlockOpen => write!(f, "'{{'"),
            Token::BlockClose => write!(f, "'}}'"),
        }
    }
}

/// Lexer result type
pub type LexResult = Result<Vec<Spanned<Token>>, LexError>;

/// Lexer error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("Unexpected character at line {line}, position {position}")]
    UnexpectedChar { line: usize, position: usize },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            LexError::UnexpectedChar { line, .. } => *line,
        }
    }

    pub fn position(&self) -> usize {
        match self {
            LexError::UnexpectedChar { position, .. } => *position,
        }
    }
}

enum Mode<'s> {
    Root(Lexer<'s, RootToken>),
    Statement(Lexer<'s, StatementToken>),
}

/// Tokenize configuration source
pub fn tokenize(source: &str) -> LexResult {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut mode = Mode::Root(RootToken::lexer(source));

    loop {
        mode = match mode {
            Mode::Root(mut lexer) => {
                let Some(result) = lexer.next() else { break };
                let token = result.map_err(|_| LexError::UnexpectedChar {
                    line,
                    position: lexer.span().start,
                })?;
                push(&mut tokens, token.into(), &lexer.span(), lexer.slice(), &mut line);

                if token == RootToken::Ident {
                    Mode::Statement(lexer.morph())
                } else {
                    Mode::Root(lexer)
                }
            }
            Mode::Statement(mut lexer) => {
                let Some(result) = lexer.next() else { break };
                let token = result.map_err(|_| LexError::UnexpectedChar {
                    line,
                    position: lexer.span().start,
                })?;
                push(&mut tokens, token.into(), &lexer.span(), lexer.slice(), &mut line);

                match token {
                    StatementToken::Semicolon
                    | StatementToken::BlockOpen
                    | StatementToken::BlockClose => Mode::Root(lexer.morph()),
                    _ => Mode::Statement(lexer),
                }
            }
        };
    }

    Ok(tokens)
}

/// Whether `text` lexes as exactly one unquoted value
pub fn is_bare_value(text: &str) -> bool {
    let mut lexer = StatementToken::lexer(text);
    matches!(lexer.next(), Some(Ok(StatementToken::Expression))) && lexer.span().end == text.len()
}

fn push(tokens: &mut Vec<Spanned<Token>>, token: Token, span: &Span, slice: &str, line: &mut usize) {
    tokens.push(Spanned::new(token, Location::new(span.clone(), *line)));
    // Quoted strings and newlines may both advance the line counter
    *line += slice.bytes().filter(|b| *b == b'\n').count();
}
