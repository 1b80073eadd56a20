//! Built-in operations registry.
//!
//! Every builtin is defined once as a [`BuiltinOp`] in one of the category
//! modules and installed into the root environment by
//! [`create_global_env`](crate::create_global_env) under its name and each
//! of its aliases.
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: receive evaluated arguments (e.g. `+`, `car`, `funcall`)
//! - **Special Forms**: receive the raw argument expressions and decide what
//!   to evaluate (e.g. `if`, `setq`, `function`)
//!
//! Both kinds go through the same call path in the evaluator; the only
//! difference is the `eval_args` flag on the installed [`Builtin`].
//!
//! ## Adding New Operations
//!
//! 1. Implement a [`BuiltinFn`] in the matching category module
//! 2. Add a `BuiltinOp` entry to that module's `OPS` table with its arity
//! 3. Add tests covering the edge cases and error messages

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;

use crate::ast::{Builtin, Expr, NativeFn};
use crate::evaluator::CallContext;
use crate::{Error, Result};

mod arithmetic;
mod forms;
mod io;
mod lists;
mod meta;
mod predicates;

/// Expected number of arguments for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments required
    Exact(usize),
    /// At least n arguments required
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
    /// Any number of arguments (0 or more)
    Any,
}

impl Arity {
    /// Checks `count` against this constraint, naming `function` in the error.
    pub fn validate(&self, function: &str, count: usize) -> Result<()> {
        let (min, max) = match *self {
            Arity::Exact(n) => (n, Some(n)),
            Arity::AtLeast(n) => (n, None),
            Arity::Range(min, max) => (min, Some(max)),
            Arity::Any => return Ok(()),
        };

        let message = if count < min {
            let qualifier = if max == Some(min) { "" } else { "at least " };
            format!(
                "{function}: too few arguments provided! Expected {qualifier}{min} but received {count}."
            )
        } else if let Some(max) = max
            && count > max
        {
            let qualifier = if max == min { "" } else { "at most " };
            format!(
                "{function}: too many arguments provided! Expected {qualifier}{max} but received {count}."
            )
        } else {
            return Ok(());
        };
        Err(Error::parameters(function, message))
    }
}

/// Native implementation shared by functions and special forms.
pub type BuiltinFn = fn(&[Expr], &mut CallContext<'_>) -> Result<Expr>;

/// How a builtin treats its arguments
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Arguments are evaluated before the call
    Function(BuiltinFn),
    /// Arguments are passed unevaluated
    SpecialForm(BuiltinFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// Primary name
    pub name: &'static str,
    /// Additional names resolving to the same callable
    pub aliases: &'static [&'static str],
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    pub fn func(&self) -> BuiltinFn {
        match self.op_kind {
            OpKind::Function(func) | OpKind::SpecialForm(func) => func,
        }
    }

    /// Primary name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

impl From<&'static BuiltinOp> for Builtin {
    fn from(op: &'static BuiltinOp) -> Self {
        let func: Rc<NativeFn> = Rc::new(op.func());
        Builtin {
            name: Rc::from(op.name),
            aliases: op.aliases.iter().map(|alias| Rc::from(*alias)).collect(),
            eval_args: !op.is_special_form(),
            arity: op.arity,
            func,
        }
    }
}

static BUILTIN_OPS: LazyLock<Vec<&'static BuiltinOp>> = LazyLock::new(|| {
    [
        forms::OPS,
        meta::OPS,
        arithmetic::OPS,
        predicates::OPS,
        lists::OPS,
        io::OPS,
    ]
    .into_iter()
    .flatten()
    .collect()
});

/// Lookup by primary name or alias
static BUILTIN_NAMES: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    BUILTIN_OPS
        .iter()
        .flat_map(|op| op.names().map(move |name| (name, *op)))
        .collect()
});

/// Every builtin operation, in registration order
pub fn builtin_ops() -> &'static [&'static BuiltinOp] {
    &BUILTIN_OPS
}

/// Finds an operation by its name or one of its aliases
pub fn find_builtin_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_NAMES.get(name).copied()
}
