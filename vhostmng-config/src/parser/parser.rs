//! Configuration parser
//!
//! Recursive descent parser that turns the token stream into the lossless
//! [`Config`] tree. No token is dropped: each one ends up as part of an
//! entry, a value, or the decoration around them.

use crate::parser::ast::*;
use crate::parser::lexer::{tokenize, LexError, Location, Spanned, Token};
use std::ops::Range;
use std::path::Path;
use thiserror::Error;

/// Parser error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Lexer error: {0}")]
    Lex(#[from] LexError),

    #[error("Unexpected {found} at line {line}: expected {expected}")]
    UnexpectedToken {
        line: usize,
        position: usize,
        expected: String,
        found: String,
    },

    #[error("Unexpected end of input at line {line}, expected {expected}")]
    UnexpectedEof { line: usize, expected: String },

    #[error("Block '{name}' opened at line {line} is never closed")]
    UnclosedBlock {
        line: usize,
        position: usize,
        name: String,
    },
}

impl ParseError {
    /// 1-based line the error points at
    pub fn line(&self) -> usize {
        match self {
            ParseError::Lex(e) => e.line(),
            ParseError::UnexpectedToken { line, .. }
            | ParseError::UnexpectedEof { line, .. }
            | ParseError::UnclosedBlock { line, .. } => *line,
        }
    }

    /// Byte range the error points at, clamped to `source_len`
    pub fn span(&self, source_len: usize) -> Range<usize> {
        let start = match self {
            ParseError::Lex(e) => e.position(),
            ParseError::UnexpectedToken { position, .. } | ParseError::UnclosedBlock { position, .. } => *position,
            ParseError::UnexpectedEof { .. } => source_len,
        };
        let start = start.min(source_len);
        start..(start + 1).min(source_len).max(start)
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// Parser state
pub struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Spanned<Token>>,
    pos: usize,
}

impl<'s> Parser<'s> {
    /// Create a new parser from source text
    pub fn new(source: &'s str) -> ParseResult<Self> {
        let tokens = tokenize(source)?;
        Ok(Self {
            source,
            tokens,
            pos: 0,
        })
    }

    /// Parse the whole source into a tree for `path`
    pub fn parse(&mut self, path: &Path) -> ParseResult<Config> {
        let (entries, trailing) = self.parse_entries()?;

        if let Some(token) = self.current() {
            return Err(ParseError::UnexpectedToken {
                line: token.span.line,
                position: token.span.start,
                expected: "a statement".to_string(),
                found: token.value.to_string(),
            });
        }

        Ok(Config {
            path: path.to_path_buf(),
            entries,
            trailing,
        })
    }

    // ========================================
    // Entries
    // ========================================

    /// Parse entries until end of input or a `}` (left unconsumed).
    /// Returns the entries and the whitespace after the last one.
    fn parse_entries(&mut self) -> ParseResult<(Vec<Entry>, String)> {
        let mut entries = Vec::new();

        loop {
            let leading = self.take_while(|t| matches!(t, Token::Whitespace | Token::Newline));

            match self.peek() {
                None | Some(Token::BlockClose) => return Ok((entries, leading)),
                Some(Token::Comment) => {
                    let token = self.advance_spanned();
                    entries.push(Entry {
                        leading,
                        kind: EntryKind::Comment(self.text(&token).to_string()),
                        trailing: String::new(),
                        position: Some(token.span),
                    });
                }
                Some(Token::Ident) => {
                    let entry = self.parse_statement(leading)?;
                    entries.push(entry);
                }
                Some(_) => {
                    let token = self.advance_spanned();
                    return Err(ParseError::UnexpectedToken {
                        line: token.span.line,
                        position: token.span.start,
                        expected: "a statement".to_string(),
                        found: token.value.to_string(),
                    });
                }
            }
        }
    }

    /// Parse a simple or block directive starting at an identifier
    fn parse_statement(&mut self, leading: String) -> ParseResult<Entry> {
        let ident = self.advance_spanned();
        let name = self.text(&ident).to_string();
        let mut values = Vec::new();

        loop {
            let prefix = self.take_while(Token::is_trivia);

            match self.peek() {
                Some(Token::Expression) | Some(Token::QuotedString) => {
                    let token = self.advance_spanned();
                    values.push(Value {
                        prefix,
                        raw: self.text(&token).to_string(),
                    });
                }
                Some(Token::Semicolon) => {
                    self.advance();
                    return Ok(self.entry(leading, ident.span, EntryKind::Directive(Directive {
                        name,
                        values,
                        before_end: prefix,
                        terminated: true,
                    })));
                }
                Some(Token::BlockClose) => {
                    // The enclosing block consumes the `}`
                    return Ok(self.entry(leading, ident.span, EntryKind::Directive(Directive {
                        name,
                        values,
                        before_end: prefix,
                        terminated: false,
                    })));
                }
                Some(Token::BlockOpen) => {
                    self.advance();
                    let (entries, before_close) = self.parse_entries()?;
                    if self.peek() != Some(&Token::BlockClose) {
                        return Err(ParseError::UnclosedBlock {
                            line: ident.span.line,
                            position: ident.span.start,
                            name,
                        });
                    }
                    self.advance();
                    return Ok(self.entry(leading, ident.span, EntryKind::Block(BlockDirective {
                        name,
                        params: values,
                        before_open: prefix,
                        entries,
                        before_close,
                    })));
                }
                Some(token) => {
                    let token = token.to_string();
                    let span = self.current_span();
                    return Err(ParseError::UnexpectedToken {
                        line: span.line,
                        position: span.start,
                        expected: "a value, ';' or '{'".to_string(),
                        found: token,
                    });
                }
                None => {
                    return Err(ParseError::UnexpectedEof {
                        line: self.last_line(),
                        expected: format!("';' or '{{' after '{}'", name),
                    });
                }
            }
        }
    }

    fn entry(&self, leading: String, span: Location, kind: EntryKind) -> Entry {
        Entry {
            leading,
            kind,
            trailing: String::new(),
            position: Some(span),
        }
    }

    // ========================================
    // Helper methods
    // ========================================

    fn text(&self, token: &Spanned<Token>) -> &'s str {
        &self.source[token.span.start..token.span.end]
    }

    /// Concatenate the text of consecutive tokens matching `pred`
    fn take_while(&mut self, pred: impl Fn(&Token) -> bool) -> String {
        let mut text = String::new();
        while let Some(token) = self.current() {
            if !pred(&token.value) {
                break;
            }
            text.push_str(&self.source[token.span.start..token.span.end]);
            self.pos += 1;
        }
        text
    }

    fn current(&self) -> Option<&Spanned<Token>> {
        self.tokens.get(self.pos)
    }

    fn current_span(&self) -> Location {
        self.current()
            .map(|t| t.span)
            .unwrap_or(Location { start: self.source.len(), end: self.source.len(), line: self.last_line() })
    }

    fn last_line(&self) -> usize {
        1 + self.source.bytes().filter(|b| *b == b'\n').count()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.value)
    }

    fn advance(&mut self) -> Option<Token> {
        if self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].value;
            self.pos += 1;
            Some(token)
        } else {
            None
        }
    }

    /// Consume the current token; callers check it exists with `peek`
    fn advance_spanned(&mut self) -> Spanned<Token> {
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        token
    }
}

/// Parse source text into a tree with no file path
pub fn parse(source: &str) -> ParseResult<Config> {
    parse_config(Path::new(""), source)
}

/// Parse source text read from `path`
pub fn parse_config(path: &Path, source: &str) -> ParseResult<Config> {
    let mut parser = Parser::new(source)?;
    parser.parse(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directive() {
        let config = parse("listen 80 default_server;").unwrap();
        assert_eq!(config.entries.len(), 1);
        let directive = config.entries[0].as_directive().unwrap();
        assert_eq!(directive.name, "listen");
        assert_eq!(directive.value_texts(), vec!["80", "default_server"]);
    }

    #[test]
    fn test_parse_nested_blocks() {
        let source = "http {\n    server {\n        server_name example.com www.example.com;\n    }\n}\n";
        let config = parse(source).unwrap();
        let http = config.entries[0].as_block().unwrap();
        assert_eq!(http.name, "http");
        let server = http.entries[0].as_block().unwrap();
        assert_eq!(server.name, "server");
        let names = server.directives_named("server_name").next().unwrap();
        assert_eq!(names.value_texts(), vec!["example.com", "www.example.com"]);
        assert_eq!(config.trailing, "\n");
    }

    #[test]
    fn test_parse_comments_as_entries() {
        let config = parse("# top\nroot /srv; # inline\n").unwrap();
        assert_eq!(config.entries.len(), 3);
        assert!(config.entries[0].is_comment());
        assert!(config.entries[2].is_comment());
        assert_eq!(config.entries[2].leading, " ");
    }

    #[test]
    fn test_parse_block_params() {
        let config = parse("location ~ \\.php$ {\n}\n").unwrap();
        let block = config.entries[0].as_block().unwrap();
        assert_eq!(block.param_texts(), vec!["~", "\\.php$"]);
        assert!(block.entries.is_empty());
        assert_eq!(block.before_close, "\n");
    }

    #[test]
    fn test_statement_closed_by_brace() {
        let config = parse("events { worker_connections 1024 }").unwrap();
        let events = config.entries[0].as_block().unwrap();
        let directive = events.entries[0].as_directive().unwrap();
        assert!(!directive.terminated);
        assert_eq!(directive.before_end, " ");
    }

    #[test]
    fn test_directive_without_values() {
        let config = parse("upstream app { ip_hash; }").unwrap();
        let upstream = config.entries[0].as_block().unwrap();
        assert!(upstream.entries[0].as_directive().unwrap().values.is_empty());
    }

    #[test]
    fn test_positions() {
        let config = parse("a 1;\n\nserver {\n  b 2;\n}\n").unwrap();
        assert_eq!(config.entries[0].line(), Some(1));
        assert_eq!(config.entries[1].line(), Some(3));
        let server = config.entries[1].as_block().unwrap();
        assert_eq!(server.entries[0].line(), Some(4));
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("server {\n  listen 80;\n").unwrap_err();
        assert!(matches!(err, ParseError::UnclosedBlock { line: 1, .. }));
    }

    #[test]
    fn test_missing_terminator() {
        let err = parse("listen 80").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_stray_close() {
        let err = parse("listen 80;\n}\n").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { line: 2, .. }));
    }
}
