//! Evaluation, function application, global assignment and instrumentation.

use std::time::Instant;

use super::{Arity, BuiltinOp, OpKind};
use crate::ast::Expr;
use crate::evaluator::CallContext;
use crate::{Error, Result};

pub(super) static OPS: &[BuiltinOp] = &[
    BuiltinOp {
        name: "eval",
        aliases: &[],
        op_kind: OpKind::Function(eval),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "apply",
        aliases: &[],
        op_kind: OpKind::Function(apply),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        name: "funcall",
        aliases: &[],
        op_kind: OpKind::Function(funcall),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: "type-of",
        aliases: &[],
        op_kind: OpKind::Function(type_of),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "symbol-function",
        aliases: &[],
        op_kind: OpKind::Function(symbol_function),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "set",
        aliases: &[],
        op_kind: OpKind::Function(set),
        arity: Arity::Any,
    },
    BuiltinOp {
        name: "debug-stats",
        aliases: &[],
        op_kind: OpKind::SpecialForm(debug_stats),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "debug-calls",
        aliases: &[],
        op_kind: OpKind::SpecialForm(debug_calls),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "elapsed-time",
        aliases: &[],
        op_kind: OpKind::SpecialForm(elapsed_time),
        arity: Arity::Exact(1),
    },
];

fn eval(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    ctx.eval(&args[0])
}

/// `(apply f a b '(c d))` calls `f` with `a b c d`.
fn apply(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let function = ctx.arg_function(args, 0)?;
    let last = args.len() - 1;
    let mut call_args = args[1..last].to_vec();
    call_args.extend(ctx.arg_list(args, last)?);
    ctx.call(&function, &call_args)
}

fn funcall(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let function = ctx.arg_function(args, 0)?;
    ctx.call(&function, &args[1..])
}

fn type_of(args: &[Expr], _ctx: &mut CallContext<'_>) -> Result<Expr> {
    Ok(Expr::symbol(args[0].type_name()))
}

fn symbol_function(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let name = ctx.arg_symbol(args, 0)?;
    ctx.env
        .lookup_function(name)
        .ok_or_else(|| Error::runtime(format!("Undefined function {name}")))
}

/// Like `setq`, but the names are evaluated too: `(set 'x 1)`.
fn set(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    if args.len() % 2 != 0 {
        return Err(ctx.error("odd number of arguments"));
    }
    let mut result = Expr::Nil;
    for i in (0..args.len()).step_by(2) {
        let name = ctx.arg_symbol(args, i)?;
        result = args[i + 1].clone();
        ctx.env.set(name, result.clone())?;
    }
    Ok(result)
}

/// Returns `(result stats)` where stats counts only this evaluation.
fn debug_stats(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let before = ctx.evaluator.stats();
    let result = ctx.eval(&args[0])?;
    let stats = ctx.evaluator.stats().diff(&before);
    Ok(Expr::list([result, stats.to_expr()]))
}

fn debug_calls(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let env = ctx.env;
    ctx.evaluator
        .with_call_tracing(|evaluator| evaluator.eval(&args[0], env))
}

/// Returns `(result milliseconds)`.
fn elapsed_time(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let start = Instant::now();
    let result = ctx.eval(&args[0])?;
    let millis = start.elapsed().as_secs_f64() * 1000.0;
    Ok(Expr::list([result, Expr::Float(millis)]))
}
