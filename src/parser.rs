//! S-expression parser.
//!
//! Tokens are folded into expressions with an explicit stack of open frames
//! (lists and pending quotes) so nesting depth never recurses on the native
//! stack. [`parse_all`] yields top-level forms lazily; [`parse`] expects at
//! most one.

use crate::ast::{Expr, Sugar};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::{Error, MAX_PARSE_DEPTH, Position, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    List,
    /// Waiting for the single expression a `'` or `#'` applies to
    Quote(Sugar),
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    items: Vec<Expr>,
    /// Index of the last bare `.` read directly into this list
    dot: Option<usize>,
    opened: Position,
}

/// Lazy stream of top-level expressions and the position each one starts at.
pub struct Parser<'a> {
    tokens: Lexer<'a>,
    last: Position,
    failed: bool,
}

impl<'a> Parser<'a> {
    pub fn new(text: &'a str) -> Self {
        Parser::from_lexer(Lexer::new(text))
    }

    pub fn with_origin(text: &'a str, origin: &'a str) -> Self {
        Parser::from_lexer(Lexer::with_origin(text, origin))
    }

    fn from_lexer(tokens: Lexer<'a>) -> Self {
        Parser {
            tokens,
            last: Position::new(0, 1, 1),
            failed: false,
        }
    }

    fn syntax_error(&self, position: Position, message: impl Into<String>) -> Error {
        Error::syntax(self.tokens.origin(), position, message)
    }

    fn unterminated(&self, position: Position, message: impl Into<String>) -> Error {
        Error::unterminated(self.tokens.origin(), position, message)
    }

    /// Next non-comment token.
    fn next_token(&mut self) -> Result<Option<Token>> {
        for token in self.tokens.by_ref() {
            let token = token?;
            self.last = token.to;
            if token.kind != TokenKind::Comment {
                return Ok(Some(token));
            }
        }
        Ok(None)
    }

    fn next_form(&mut self) -> Result<Option<(Expr, Position)>> {
        let mut stack: Vec<Frame> = Vec::new();
        loop {
            let Some(token) = self.next_token()? else {
                return match stack.last() {
                    None => Ok(None),
                    Some(frame) => Err(self.end_of_input_error(frame)),
                };
            };

            let mut is_dot = token.kind == TokenKind::Symbol && !token.escaped && token.text == ".";
            let (mut expr, mut start) = match token.kind {
                TokenKind::LPar | TokenKind::Quote | TokenKind::GetFunc => {
                    if stack.len() >= MAX_PARSE_DEPTH {
                        return Err(self.syntax_error(
                            token.from,
                            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                        ));
                    }
                    let kind = match token.kind {
                        TokenKind::LPar => FrameKind::List,
                        TokenKind::Quote => FrameKind::Quote(Sugar::Quote),
                        _ => FrameKind::Quote(Sugar::GetFunc),
                    };
                    stack.push(Frame {
                        kind,
                        items: Vec::new(),
                        dot: None,
                        opened: token.from,
                    });
                    continue;
                }
                TokenKind::RPar => match stack.pop() {
                    Some(Frame {
                        kind: FrameKind::List,
                        items,
                        dot,
                        opened,
                    }) => (self.close_list(items, dot, token.to)?, opened),
                    Some(Frame {
                        kind: FrameKind::Quote(sugar),
                        opened,
                        ..
                    }) => return Err(self.syntax_error(opened, missing_expression(sugar))),
                    None => {
                        return Err(self.syntax_error(
                            token.to,
                            "Found closing parenthesis without matching opening parenthesis",
                        ));
                    }
                },
                TokenKind::Comment => continue,
                _ => (self.atom(&token)?, token.from),
            };

            // Hand the finished expression to the innermost list, collapsing
            // any quote frames waiting for it.
            loop {
                match stack.last_mut() {
                    None => return Ok(Some((expr, start))),
                    Some(frame) => match frame.kind {
                        FrameKind::List => {
                            if is_dot {
                                frame.dot = Some(frame.items.len());
                            }
                            frame.items.push(expr);
                            break;
                        }
                        FrameKind::Quote(sugar) => {
                            is_dot = false;
                            start = frame.opened;
                            stack.pop();
                            expr = match sugar {
                                Sugar::GetFunc => Expr::get_func(expr),
                                _ => Expr::quoted(expr),
                            };
                        }
                    },
                }
            }
        }
    }

    fn end_of_input_error(&self, frame: &Frame) -> Error {
        match frame.kind {
            FrameKind::List => self.unterminated(self.last, "Unbalanced list expression"),
            FrameKind::Quote(sugar) => self.unterminated(frame.opened, missing_expression(sugar)),
        }
    }

    /// Builds a list, or a dotted pair when a bare `.` is the second-to-last
    /// item.
    fn close_list(&self, mut items: Vec<Expr>, dot: Option<usize>, closing: Position) -> Result<Expr> {
        let len = items.len();
        if len >= 2 && dot == Some(len - 2) {
            if len == 2 {
                return Err(self.syntax_error(closing, "left expression required for an assoc"));
            }
            let tail = items.pop().unwrap_or(Expr::Nil);
            items.pop();
            return Ok(Expr::list_with_tail(items, tail));
        }
        Ok(Expr::list(items))
    }

    fn atom(&self, token: &Token) -> Result<Expr> {
        let malformed = || self.syntax_error(token.from, format!("Malformed number: {}", token.text));
        match token.kind {
            TokenKind::Integer => match token.text.parse::<i64>() {
                Ok(n) => Ok(Expr::Integer(n)),
                Err(_) => token.text.parse::<f64>().map(Expr::Float).map_err(|_| malformed()),
            },
            TokenKind::Float => token.text.parse::<f64>().map(Expr::Float).map_err(|_| malformed()),
            TokenKind::String => Ok(Expr::string(&token.text)),
            _ if token.escaped => Ok(Expr::symbol(&token.text)),
            _ => Ok(match token.text.as_str() {
                "nil" => Expr::Nil,
                "t" => Expr::Bool(true),
                name => Expr::symbol(name),
            }),
        }
    }
}

fn missing_expression(sugar: Sugar) -> &'static str {
    match sugar {
        Sugar::GetFunc => "Missing expression after a getfunc",
        _ => "Missing expression after a quote",
    }
}

impl Iterator for Parser<'_> {
    type Item = Result<(Expr, Position)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_form() {
            Ok(form) => form.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Parses every top-level form in `text`, lazily.
pub fn parse_all(text: &str) -> Parser<'_> {
    Parser::new(text)
}

pub fn parse_all_with_origin<'a>(text: &'a str, origin: &'a str) -> Parser<'a> {
    Parser::with_origin(text, origin)
}

/// Parses text holding at most one expression. Empty input gives `nil`.
pub fn parse(text: &str) -> Result<Expr> {
    single(Parser::new(text))
}

pub fn parse_with_origin(text: &str, origin: &str) -> Result<Expr> {
    single(Parser::with_origin(text, origin))
}

fn single(mut parser: Parser<'_>) -> Result<Expr> {
    let Some(first) = parser.next() else {
        return Ok(Expr::Nil);
    };
    let (expr, _) = first?;
    match parser.next() {
        None => Ok(expr),
        Some(Err(err)) => Err(err),
        Some(Ok((_, position))) => {
            Err(parser.syntax_error(position, "Expected to have a single expression"))
        }
    }
}
