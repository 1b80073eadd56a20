//! Console output and script loading.

use tracing::debug;

use super::{Arity, BuiltinOp, OpKind};
use crate::ast::Expr;
use crate::evaluator::CallContext;
use crate::{Error, Result};

pub(super) static OPS: &[BuiltinOp] = &[
    BuiltinOp {
        name: "print",
        aliases: &[],
        op_kind: OpKind::Function(print),
        arity: Arity::Any,
    },
    BuiltinOp {
        name: "load",
        aliases: &[],
        op_kind: OpKind::Function(load),
        arity: Arity::Exact(1),
    },
];

/// Printed forms of the arguments separated by spaces.
fn render(args: &[Expr]) -> String {
    args.iter()
        .map(|arg| arg.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn print(args: &[Expr], _ctx: &mut CallContext<'_>) -> Result<Expr> {
    println!("{}", render(args));
    Ok(args.last().cloned().unwrap_or(Expr::Nil))
}

/// Evaluates every form of a file in the global environment.
fn load(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let path = ctx.arg_string(args, 0)?;
    debug!(path, "loading script");
    let text = std::fs::read_to_string(path).map_err(|err| Error::Io(format!("{path}: {err}")))?;
    ctx.evaluator.load_and_eval_all(&text, path)
}
