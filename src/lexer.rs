//! Tokenizer: turns source text into a lazy stream of positioned tokens.
//!
//! Whitespace, comments and punctuation are recognized with small `nom`
//! parsers over the remaining input. Strings and atoms are scanned by hand
//! through the [`Cursor`] so every character updates line and column.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::char,
    combinator::{recognize, value},
    sequence::pair,
};

use crate::{Error, Position, Result};

/// Walks text one character at a time tracking offset, line and column.
///
/// CR, LF and CRLF each count as a single line break.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    text: &'a str,
    offset: usize,
    line: usize,
    col: usize,
    after_cr: bool,
    last: Position,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Cursor {
            text,
            offset: 0,
            line: 1,
            col: 1,
            after_cr: false,
            last: Position::new(0, 1, 1),
        }
    }

    /// Position of the next character to be read.
    pub fn position(&self) -> Position {
        Position::new(self.offset, self.line, self.col)
    }

    /// Position of the most recently consumed character.
    pub fn last_position(&self) -> Position {
        self.last
    }

    pub fn rest(&self) -> &'a str {
        &self.text[self.offset..]
    }

    pub fn is_at_end(&self) -> bool {
        self.offset >= self.text.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.last = self.position();
        self.offset += c.len_utf8();
        match c {
            '\r' => {
                self.line += 1;
                self.col = 1;
                self.after_cr = true;
            }
            '\n' if self.after_cr => {
                self.after_cr = false;
            }
            '\n' => {
                self.line += 1;
                self.col = 1;
            }
            _ => {
                self.col += 1;
                self.after_cr = false;
            }
        }
        Some(c)
    }

    /// Consumes `len` bytes, which must end on a character boundary.
    pub fn advance(&mut self, len: usize) {
        let target = self.offset + len;
        while self.offset < target && self.bump().is_some() {}
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LPar,
    RPar,
    Quote,
    GetFunc,
    Comment,
    Integer,
    Float,
    String,
    Symbol,
}

/// A lexical token. `to` is the position of its last character.
///
/// For strings and symbols `text` holds the decoded value; for comments it
/// includes the leading `;`. `escaped` is set on atoms that contained a
/// backslash escape or a `|...|` run, which makes them symbols no matter
/// what their text spells.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub escaped: bool,
    pub from: Position,
    pub to: Position,
}

fn whitespace(input: &str) -> IResult<&str, &str> {
    take_while(char::is_whitespace)(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_till(|c| c == '\n' || c == '\r')))(input)
}

fn punctuation(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::LPar, char('(')),
        value(TokenKind::RPar, char(')')),
        value(TokenKind::GetFunc, tag("#'")),
        value(TokenKind::Quote, char('\'')),
    ))(input)
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | '\'')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AtomState {
    Integer,
    Float,
    Symbol,
}

/// Lazy token stream over a piece of source text.
///
/// After the first error the stream is exhausted.
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    origin: Option<&'a str>,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Lexer {
            cursor: Cursor::new(text),
            origin: None,
            failed: false,
        }
    }

    /// Tags diagnostics with a file name instead of `<STDIN>`.
    pub fn with_origin(text: &'a str, origin: &'a str) -> Self {
        Lexer {
            origin: Some(origin),
            ..Lexer::new(text)
        }
    }

    pub fn origin(&self) -> Option<&'a str> {
        self.origin
    }

    fn syntax_error(&self, position: Position, message: impl Into<String>) -> Error {
        Error::syntax(self.origin, position, message)
    }

    fn unterminated(&self, message: impl Into<String>) -> Error {
        Error::unterminated(self.origin, self.cursor.last_position(), message)
    }

    fn skip_whitespace(&mut self) {
        if let Ok((_, ws)) = whitespace(self.cursor.rest()) {
            self.cursor.advance(ws.len());
        }
    }

    fn token(&self, kind: TokenKind, text: String, from: Position) -> Token {
        Token {
            kind,
            text,
            escaped: false,
            from,
            to: self.cursor.last_position(),
        }
    }

    fn next_token(&mut self) -> Option<Result<Token>> {
        self.skip_whitespace();
        if self.cursor.is_at_end() {
            return None;
        }
        let from = self.cursor.position();
        let rest = self.cursor.rest();

        if let Ok((_, text)) = comment(rest) {
            self.cursor.advance(text.len());
            return Some(Ok(self.token(TokenKind::Comment, text.to_string(), from)));
        }
        if let Ok((remaining, kind)) = punctuation(rest) {
            let consumed = &rest[..rest.len() - remaining.len()];
            self.cursor.advance(consumed.len());
            return Some(Ok(self.token(kind, consumed.to_string(), from)));
        }
        if rest.starts_with('"') {
            return Some(self.read_string(from));
        }
        Some(self.read_atom(from))
    }

    fn read_string(&mut self, from: Position) -> Result<Token> {
        self.cursor.bump();
        let mut text = String::new();
        loop {
            match self.cursor.bump() {
                None => {
                    return Err(self.unterminated("Expected double quote at the end of the string"));
                }
                Some('"') => break,
                Some('\\') => {
                    let escaped = match self.cursor.bump() {
                        None => {
                            return Err(self.unterminated("Expected character after escape char"));
                        }
                        Some(c) => c,
                    };
                    match escaped {
                        '\\' => text.push('\\'),
                        '"' => text.push('"'),
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        other => {
                            return Err(self.syntax_error(
                                self.cursor.last_position(),
                                format!("Unexpected escaped char: {other}"),
                            ));
                        }
                    }
                }
                Some(c) => text.push(c),
            }
        }
        Ok(self.token(TokenKind::String, text, from))
    }

    fn read_atom(&mut self, from: Position) -> Result<Token> {
        let mut text = String::new();
        let mut state = AtomState::Integer;
        let mut has_dot = false;
        let mut has_exponent = false;
        let mut after_exponent = false;
        let mut escaped = false;

        while let Some(c) = self.cursor.peek() {
            if is_delimiter(c) {
                break;
            }
            self.cursor.bump();
            let follows_exponent = after_exponent;
            after_exponent = false;
            match c {
                '\\' => {
                    state = AtomState::Symbol;
                    escaped = true;
                    match self.cursor.bump() {
                        Some(escaped) => text.push(escaped),
                        None => return Err(self.unterminated("Expected character after escape char")),
                    }
                }
                '|' => {
                    state = AtomState::Symbol;
                    escaped = true;
                    self.read_pipe_run(&mut text)?;
                }
                '+' | '-' => {
                    if !(text.is_empty() || follows_exponent) {
                        state = AtomState::Symbol;
                    }
                    text.push(c);
                }
                '.' => {
                    if has_dot || has_exponent {
                        state = AtomState::Symbol;
                    } else if state == AtomState::Integer {
                        state = AtomState::Float;
                    }
                    has_dot = true;
                    text.push(c);
                }
                'e' | 'E' => {
                    if has_exponent {
                        state = AtomState::Symbol;
                    } else {
                        if state == AtomState::Integer {
                            state = AtomState::Float;
                        }
                        after_exponent = true;
                    }
                    has_exponent = true;
                    text.push(c);
                }
                '0'..='9' => text.push(c),
                _ => {
                    state = AtomState::Symbol;
                    text.push(c);
                }
            }
        }

        if text.is_empty() && self.cursor.position() == from {
            return Err(self.syntax_error(from, "Unexpected character"));
        }

        let kind = match state {
            AtomState::Integer if text.parse::<i64>().is_ok() => TokenKind::Integer,
            AtomState::Integer | AtomState::Float if text.parse::<f64>().is_ok() => TokenKind::Float,
            _ => TokenKind::Symbol,
        };
        Ok(Token {
            escaped,
            ..self.token(kind, text, from)
        })
    }

    /// Copies a `|...|` run verbatim, pipes and backslashes included. A
    /// backslash still keeps the next character from closing the run.
    fn read_pipe_run(&mut self, text: &mut String) -> Result<()> {
        text.push('|');
        loop {
            match self.cursor.bump() {
                None => return Err(self.unterminated("Expected pipe at the end of the identifier")),
                Some('|') => break,
                Some('\\') => match self.cursor.bump() {
                    Some(escaped) => {
                        text.push('\\');
                        text.push(escaped);
                    }
                    None => return Err(self.unterminated("Expected character after escape char")),
                },
                Some(c) => text.push(c),
            }
        }
        text.push('|');
        Ok(())
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.next_token();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

/// Tokenizes `text` lazily.
pub fn tokenize(text: &str) -> Lexer<'_> {
    Lexer::new(text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn kinds_and_text(input: &str) -> Vec<(TokenKind, String)> {
        tokenize(input)
            .map(|t| t.unwrap())
            .map(|t| (t.kind, t.text))
            .collect()
    }

    fn single(input: &str) -> (TokenKind, String) {
        let tokens = kinds_and_text(input);
        assert_eq!(tokens.len(), 1, "expected one token for {input:?}: {tokens:?}");
        tokens.into_iter().next().unwrap()
    }

    #[test]
    fn test_whitespace_and_comments() {
        assert!(kinds_and_text("").is_empty());
        assert!(kinds_and_text("  \n  \r  \t ").is_empty());
        assert_eq!(
            kinds_and_text("  ; some comment"),
            vec![(TokenKind::Comment, "; some comment".to_string())]
        );
        assert_eq!(
            kinds_and_text("1 ; trailing\n2"),
            vec![
                (TokenKind::Integer, "1".to_string()),
                (TokenKind::Comment, "; trailing".to_string()),
                (TokenKind::Integer, "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_atom_classification() {
        let cases = [
            ("1", TokenKind::Integer, "1"),
            ("+1", TokenKind::Integer, "+1"),
            ("-1", TokenKind::Integer, "-1"),
            ("+123", TokenKind::Integer, "+123"),
            ("1000000000", TokenKind::Integer, "1000000000"),
            ("1.2", TokenKind::Float, "1.2"),
            ("-1.2", TokenKind::Float, "-1.2"),
            (".45", TokenKind::Float, ".45"),
            ("1e5", TokenKind::Float, "1e5"),
            ("1.5E-3", TokenKind::Float, "1.5E-3"),
            ("a", TokenKind::Symbol, "a"),
            ("a.b", TokenKind::Symbol, "a.b"),
            ("1+", TokenKind::Symbol, "1+"),
            ("+$", TokenKind::Symbol, "+$"),
            ("file.rel.43", TokenKind::Symbol, "file.rel.43"),
            ("1.2.3", TokenKind::Symbol, "1.2.3"),
            ("1e5e5", TokenKind::Symbol, "1e5e5"),
            ("abc-def", TokenKind::Symbol, "abc-def"),
            (".", TokenKind::Symbol, "."),
            ("+", TokenKind::Symbol, "+"),
            ("-", TokenKind::Symbol, "-"),
            ("e", TokenKind::Symbol, "e"),
            ("1e", TokenKind::Symbol, "1e"),
        ];
        for (input, kind, text) in cases {
            assert_eq!(single(input), (kind, text.to_string()), "input {input:?}");
        }
    }

    #[test]
    fn test_symbol_escapes() {
        let cases = [
            ("\\+1", "+1"),
            ("+\\1", "+1"),
            ("a\\ b", "a b"),
            ("a\\nb", "anb"),
            ("\\(", "("),
            ("\\(\\)", "()"),
            ("\\frobboz", "frobboz"),
            ("3.14159265\\s0", "3.14159265s0"),
            ("|a b|", "|a b|"),
            ("|a\\ b|", "|a\\ b|"),
            ("|a\\|b|", "|a\\|b|"),
            ("foo|a b|bar", "foo|a b|bar"),
        ];
        for (input, text) in cases {
            assert_eq!(single(input), (TokenKind::Symbol, text.to_string()), "input {input:?}");
        }
    }

    #[test]
    fn test_escaped_flag() {
        let escaped = |input: &str| tokenize(input).next().unwrap().unwrap().escaped;
        for input in ["\\.", "\\nil", "|t|", "a\\|b", "\\1"] {
            assert!(escaped(input), "input {input:?}");
        }
        for input in [".", "nil", "t", "1", "\"s\\\"\""] {
            assert!(!escaped(input), "input {input:?}");
        }
    }

    #[test]
    fn test_strings() {
        let cases = [
            (r#""""#, ""),
            (r#""abcdef""#, "abcdef"),
            (r#""foo bar foobar""#, "foo bar foobar"),
            (r#""Hello \"World\"!""#, "Hello \"World\"!"),
            (r#""foo\tbar\nfoobar""#, "foo\tbar\nfoobar"),
            (r#""Hello \\World!""#, "Hello \\World!"),
            ("\"abc\ndef\"", "abc\ndef"),
        ];
        for (input, text) in cases {
            assert_eq!(single(input), (TokenKind::String, text.to_string()), "input {input:?}");
        }
    }

    #[test]
    fn test_lexical_errors() {
        let first_error = |input: &str| {
            tokenize(input)
                .find_map(|t| t.err())
                .unwrap_or_else(|| panic!("expected an error for {input:?}"))
        };

        assert!(first_error("\"abcdef").is_unterminated());
        assert!(first_error("\"abc\\").is_unterminated());
        assert!(first_error("|abcdef").is_unterminated());
        assert!(first_error("abc\\").is_unterminated());

        let err = first_error("\"abc\\a\"");
        assert!(err.is_syntax() && !err.is_unterminated());
        assert_eq!(err.position(), Some(Position::new(5, 1, 6)));
    }

    #[test]
    fn test_stream_stops_after_error() {
        let items: Vec<_> = tokenize("(1 \"oops").collect();
        assert_eq!(items.len(), 3);
        assert!(items[2].is_err());
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            kinds_and_text("('a #'b)"),
            vec![
                (TokenKind::LPar, "(".to_string()),
                (TokenKind::Quote, "'".to_string()),
                (TokenKind::Symbol, "a".to_string()),
                (TokenKind::GetFunc, "#'".to_string()),
                (TokenKind::Symbol, "b".to_string()),
                (TokenKind::RPar, ")".to_string()),
            ]
        );
    }

    #[test]
    fn test_positions() {
        let tokens: Vec<Token> = tokenize("(setq\r\n  foo \"a b\")\r(car foo)")
            .map(|t| t.unwrap())
            .collect();

        assert_eq!(tokens[0].from, Position::new(0, 1, 1));
        assert_eq!(tokens[1].text, "setq");
        assert_eq!(tokens[1].from, Position::new(1, 1, 2));
        assert_eq!(tokens[1].to, Position::new(4, 1, 5));

        // CRLF counts as one line break
        assert_eq!(tokens[2].text, "foo");
        assert_eq!(tokens[2].from, Position::new(9, 2, 3));

        assert_eq!(tokens[3].kind, TokenKind::String);
        assert_eq!(tokens[3].from, Position::new(13, 2, 7));
        assert_eq!(tokens[3].to, Position::new(17, 2, 11));

        // lone CR is a line break too
        assert_eq!(tokens[5].kind, TokenKind::LPar);
        assert_eq!(tokens[5].from, Position::new(20, 3, 1));
    }

    #[test]
    fn test_origin_in_errors() {
        let err = Lexer::with_origin("\"open", "boot.lisp")
            .find_map(|t| t.err())
            .unwrap();
        assert!(err.to_string().starts_with("boot.lisp:1:5 - error:"));
    }
}
