//! List construction and access.

use super::{Arity, BuiltinOp, OpKind};
use crate::Result;
use crate::ast::Expr;
use crate::evaluator::CallContext;

pub(super) static OPS: &[BuiltinOp] = &[
    BuiltinOp {
        name: "list",
        aliases: &[],
        op_kind: OpKind::Function(list),
        arity: Arity::Any,
    },
    BuiltinOp {
        name: "cons",
        aliases: &[],
        op_kind: OpKind::Function(cons),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        name: "car",
        aliases: &["first"],
        op_kind: OpKind::Function(car),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "cdr",
        aliases: &["rest"],
        op_kind: OpKind::Function(cdr),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "cadr",
        aliases: &["second"],
        op_kind: OpKind::Function(cadr),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "caddr",
        aliases: &["third"],
        op_kind: OpKind::Function(caddr),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "cadddr",
        aliases: &["fourth"],
        op_kind: OpKind::Function(cadddr),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "last",
        aliases: &[],
        op_kind: OpKind::Function(last),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "append",
        aliases: &[],
        op_kind: OpKind::Function(append),
        arity: Arity::Any,
    },
    BuiltinOp {
        name: "reverse",
        aliases: &[],
        op_kind: OpKind::Function(reverse),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "length",
        aliases: &[],
        op_kind: OpKind::Function(length),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "member",
        aliases: &[],
        op_kind: OpKind::Function(member),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        name: "nth",
        aliases: &[],
        op_kind: OpKind::Function(nth),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        name: "sort",
        aliases: &[],
        op_kind: OpKind::Function(sort),
        arity: Arity::Range(1, 2),
    },
];

fn list(args: &[Expr], _ctx: &mut CallContext<'_>) -> Result<Expr> {
    Ok(Expr::list(args.to_vec()))
}

fn cons(args: &[Expr], _ctx: &mut CallContext<'_>) -> Result<Expr> {
    Ok(Expr::cons(args[0].clone(), args[1].clone()))
}

/// Follows `skip` cdrs and takes the car. Running off the end gives `nil`.
fn nth_car(args: &[Expr], ctx: &CallContext<'_>, skip: usize) -> Result<Expr> {
    let mut current = &args[0];
    if !current.is_list() {
        return Err(ctx.expected(0, "a list", current));
    }
    for _ in 0..skip {
        match current {
            Expr::Pair(pair) => current = &pair.cdr,
            _ => return Ok(Expr::Nil),
        }
    }
    Ok(current.car().cloned().unwrap_or(Expr::Nil))
}

fn car(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    nth_car(args, ctx, 0)
}

fn cadr(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    nth_car(args, ctx, 1)
}

fn caddr(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    nth_car(args, ctx, 2)
}

fn cadddr(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    nth_car(args, ctx, 3)
}

fn cdr(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    match &args[0] {
        Expr::Pair(pair) => Ok(pair.cdr.clone()),
        other if other.is_nil() => Ok(Expr::Nil),
        other => Err(ctx.expected(0, "a list", other)),
    }
}

/// The last cons of a list, so `(last '(1 2 . 3))` is `(2 . 3)`.
fn last(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let mut current = &args[0];
    if !current.is_list() {
        return Err(ctx.expected(0, "a list", current));
    }
    while let Expr::Pair(pair) = current {
        if !pair.cdr.is_pair() {
            break;
        }
        current = &pair.cdr;
    }
    Ok(current.clone())
}

/// Copies every list but the last, which becomes the shared tail.
fn append(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let Some((tail, lists)) = args.split_last() else {
        return Ok(Expr::Nil);
    };
    let mut items = Vec::new();
    for index in 0..lists.len() {
        items.extend(ctx.arg_list(args, index)?);
    }
    Ok(Expr::list_with_tail(items, tail.clone()))
}

fn reverse(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let mut items = ctx.arg_list(args, 0)?;
    items.reverse();
    Ok(Expr::list(items))
}

/// Item count of a list, or character count of a string.
fn length(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let count = match &args[0] {
        Expr::String(text) => text.chars().count(),
        _ => ctx.arg_list(args, 0)?.len(),
    };
    Ok(Expr::Integer(count as i64))
}

/// The tail of the list starting at the first item equal to the argument.
fn member(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let mut current = &args[1];
    if !current.is_list() {
        return Err(ctx.expected(1, "a list", current));
    }
    while let Expr::Pair(pair) = current {
        if pair.car == args[0] {
            return Ok(current.clone());
        }
        current = &pair.cdr;
    }
    Ok(Expr::Nil)
}

fn nth(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let index = ctx.arg_integer(args, 0)?;
    let index = usize::try_from(index)
        .map_err(|_| ctx.error(format!("index must be non-negative but received {index}")))?;
    nth_car(&args[1..], ctx, index)
}

/// Sorts ascending with the natural ordering, or with a `(pred a b)`
/// function returning true when `a` goes before `b`. The sort is stable.
fn sort(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let items = ctx.arg_list(args, 0)?;
    let sorted = match args.get(1) {
        Some(_) => {
            let predicate = ctx.arg_function(args, 1)?;
            merge_sort(items, &mut |a: &Expr, b: &Expr| {
                Ok(ctx.call(&predicate, &[a.clone(), b.clone()])?.is_true())
            })?
        }
        None => merge_sort(items, &mut |a: &Expr, b: &Expr| match a.compare(b) {
            Some(ordering) => Ok(ordering.is_lt()),
            None => Err(ctx.error(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            ))),
        })?,
    };
    Ok(Expr::list(sorted))
}

fn merge_sort(
    mut items: Vec<Expr>,
    less: &mut dyn FnMut(&Expr, &Expr) -> Result<bool>,
) -> Result<Vec<Expr>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, less)?;
    let right = merge_sort(right, less)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        // Ties keep the left item first.
        let source = if less(b, a)? { &mut right } else { &mut left };
        merged.extend(source.next());
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}
