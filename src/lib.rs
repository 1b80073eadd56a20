//! # minilisp
//!
//! A small Lisp-family interpreter: text is tokenized, parsed into
//! s-expressions and evaluated against a chain of scopes with separate value
//! and function namespaces. Plain lambdas see the caller's bindings;
//! `(function (lambda ...))` captures the defining scope as a closure.
//!
//! ```lisp
//! (defun two-funs (x)
//!   (list (function (lambda () x))
//!         (function (lambda (y) (setq x y)))))
//! (setq funs (two-funs 6))
//! (funcall (cadr funs) 43)   ; => 43
//! (funcall (car funs))       ; => 43
//! ```
//!
//! ## Usage
//!
//! ```
//! use minilisp::{Evaluator, Expr};
//!
//! let mut evaluator = Evaluator::new();
//! let result = evaluator.eval_str("(+ 2 (+ 1 2) 4)").unwrap();
//! assert_eq!(result, Expr::Integer(9));
//! ```
//!
//! ## Errors
//!
//! Every failure is an [`Error`]. Syntax-class errors carry a source
//! [`Position`]; [`Error::UnterminatedExpression`] is kept apart so an
//! interactive front end can ask for more input instead of failing.

use std::fmt;
use thiserror::Error;

pub mod ast;
pub mod builtins;
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use ast::{Expr, Function};
pub use environment::Environment;
pub use evaluator::{EvalConfig, EvalStats, Evaluator, create_global_env};
pub use parser::{parse, parse_all};

/// Default cap on nested function calls before `StackOverflow` is raised.
pub const MAX_CALL_DEPTH: usize = 1000;

/// Maximum nesting of lists and quotes accepted by the parser.
pub const MAX_PARSE_DEPTH: usize = 1000;

/// Origin label used in diagnostics when the text has no file name.
pub const DEFAULT_ORIGIN: &str = "<STDIN>";

/// A location in source text. `line` and `col` are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, col: usize) -> Self {
        Position { offset, line, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Malformed token or grammar structure
    #[error("{origin}:{position} - error: {message}")]
    Syntax {
        origin: String,
        position: Position,
        message: String,
    },
    /// Input ended in the middle of a string, symbol, list or quote
    #[error("{origin}:{position} - error: {message}")]
    UnterminatedExpression {
        origin: String,
        position: Position,
        message: String,
    },
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),
    /// Argument count or argument type validation failure
    #[error("{message}")]
    Parameters { function: String, message: String },
    #[error("Stack overflow: call depth exceeded {depth}")]
    StackOverflow { depth: usize },
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    pub fn syntax(origin: Option<&str>, position: Position, message: impl Into<String>) -> Self {
        Error::Syntax {
            origin: origin.unwrap_or(DEFAULT_ORIGIN).to_string(),
            position,
            message: message.into(),
        }
    }

    pub fn unterminated(
        origin: Option<&str>,
        position: Position,
        message: impl Into<String>,
    ) -> Self {
        Error::UnterminatedExpression {
            origin: origin.unwrap_or(DEFAULT_ORIGIN).to_string(),
            position,
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(message.into())
    }

    pub fn parameters(function: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parameters {
            function: function.into(),
            message: message.into(),
        }
    }

    /// True for both syntax kinds.
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            Error::Syntax { .. } | Error::UnterminatedExpression { .. }
        )
    }

    pub fn is_unterminated(&self) -> bool {
        matches!(self, Error::UnterminatedExpression { .. })
    }

    /// True for every evaluation-time failure.
    pub fn is_runtime(&self) -> bool {
        !self.is_syntax()
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            Error::Syntax { position, .. } | Error::UnterminatedExpression { position, .. } => {
                Some(*position)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
