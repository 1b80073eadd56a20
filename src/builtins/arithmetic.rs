//! Numeric operators, comparisons and equality.
//!
//! Integer arithmetic is checked: overflow is an error rather than a silent
//! wrap. Any float operand promotes the whole operation to float, and integer
//! division that does not divide evenly yields a float.

use std::cmp::Ordering;

use super::{Arity, BuiltinOp, OpKind};
use crate::ast::Expr;
use crate::evaluator::CallContext;
use crate::{Error, Result};

pub(super) static OPS: &[BuiltinOp] = &[
    BuiltinOp {
        name: "+",
        aliases: &[],
        op_kind: OpKind::Function(add),
        arity: Arity::Any,
    },
    BuiltinOp {
        name: "-",
        aliases: &[],
        op_kind: OpKind::Function(sub),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: "*",
        aliases: &[],
        op_kind: OpKind::Function(mul),
        arity: Arity::Any,
    },
    BuiltinOp {
        name: "/",
        aliases: &[],
        op_kind: OpKind::Function(div),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: "1+",
        aliases: &[],
        op_kind: OpKind::Function(increment),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "1-",
        aliases: &[],
        op_kind: OpKind::Function(decrement),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "mod",
        aliases: &[],
        op_kind: OpKind::Function(modulo),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        name: "=",
        aliases: &["equal"],
        op_kind: OpKind::Function(equal),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: "/=",
        aliases: &[],
        op_kind: OpKind::Function(different),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: ">",
        aliases: &["greaterp"],
        op_kind: OpKind::Function(greater),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: ">=",
        aliases: &[],
        op_kind: OpKind::Function(greater_or_equal),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: "<",
        aliases: &["lessp"],
        op_kind: OpKind::Function(less),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: "<=",
        aliases: &[],
        op_kind: OpKind::Function(less_or_equal),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: "not",
        aliases: &["null"],
        op_kind: OpKind::Function(not),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "eql",
        aliases: &["eq"],
        op_kind: OpKind::Function(eql),
        arity: Arity::Exact(2),
    },
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(n) => n,
        }
    }
}

impl From<Number> for Expr {
    fn from(number: Number) -> Self {
        match number {
            Number::Int(n) => Expr::Integer(n),
            Number::Float(n) => Expr::Float(n),
        }
    }
}

fn number_arg(args: &[Expr], index: usize, ctx: &CallContext<'_>) -> Result<Number> {
    match &args[index] {
        Expr::Integer(n) => Ok(Number::Int(*n)),
        Expr::Float(n) => Ok(Number::Float(*n)),
        _ => ctx.arg_number(args, index).map(Number::Float),
    }
}

fn overflow(ctx: &CallContext<'_>) -> Error {
    Error::runtime(format!("{}: integer overflow", ctx.name))
}

/// Applies an integer op when both sides are integers, the float op otherwise.
fn combine(
    a: Number,
    b: Number,
    ctx: &CallContext<'_>,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Number> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => int_op(x, y).map(Number::Int).ok_or_else(|| overflow(ctx)),
        _ => Ok(Number::Float(float_op(a.as_f64(), b.as_f64()))),
    }
}

fn divide(a: Number, b: Number, ctx: &CallContext<'_>) -> Result<Number> {
    match (a, b) {
        (Number::Int(_), Number::Int(0)) => Err(Error::runtime(format!("{}: division by zero", ctx.name))),
        (Number::Int(x), Number::Int(y)) => match x.checked_rem(y) {
            Some(0) => x.checked_div(y).map(Number::Int).ok_or_else(|| overflow(ctx)),
            Some(_) => Ok(Number::Float(x as f64 / y as f64)),
            None => Err(overflow(ctx)),
        },
        _ => Ok(Number::Float(a.as_f64() / b.as_f64())),
    }
}

/// Left fold over every argument starting from `init`.
fn fold(
    args: &[Expr],
    ctx: &CallContext<'_>,
    init: Number,
    mut step: impl FnMut(Number, Number) -> Result<Number>,
) -> Result<Expr> {
    let mut acc = init;
    for index in 0..args.len() {
        acc = step(acc, number_arg(args, index, ctx)?)?;
    }
    Ok(acc.into())
}

fn add(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    fold(args, ctx, Number::Int(0), |a, b| {
        combine(a, b, ctx, i64::checked_add, |x, y| x + y)
    })
}

fn mul(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    fold(args, ctx, Number::Int(1), |a, b| {
        combine(a, b, ctx, i64::checked_mul, |x, y| x * y)
    })
}

/// `(- x)` negates; otherwise subtracts the rest from the first argument.
fn sub(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let first = number_arg(args, 0, ctx)?;
    if args.len() == 1 {
        return combine(Number::Int(0), first, ctx, i64::checked_sub, |x, y| x - y).map(Expr::from);
    }
    fold(&args[1..], ctx, first, |a, b| {
        combine(a, b, ctx, i64::checked_sub, |x, y| x - y)
    })
}

/// `(/ x)` is the reciprocal; otherwise divides the first argument by the rest.
fn div(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let first = number_arg(args, 0, ctx)?;
    if args.len() == 1 {
        return divide(Number::Int(1), first, ctx).map(Expr::from);
    }
    fold(&args[1..], ctx, first, |a, b| divide(a, b, ctx))
}

fn increment(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let n = number_arg(args, 0, ctx)?;
    combine(n, Number::Int(1), ctx, i64::checked_add, |x, y| x + y).map(Expr::from)
}

fn decrement(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let n = number_arg(args, 0, ctx)?;
    combine(n, Number::Int(1), ctx, i64::checked_sub, |x, y| x - y).map(Expr::from)
}

/// Remainder with the sign of the divisor.
fn modulo(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let a = number_arg(args, 0, ctx)?;
    let b = number_arg(args, 1, ctx)?;
    if b == Number::Int(0) {
        return Err(Error::runtime("mod: division by zero"));
    }
    let result = combine(
        a,
        b,
        ctx,
        |x, y| {
            let r = x.checked_rem(y)?;
            Some(if r != 0 && (r < 0) != (y < 0) { r + y } else { r })
        },
        |x, y| x - y * (x / y).floor(),
    )?;
    Ok(result.into())
}

/// True when `holds` is satisfied by every adjacent pair of arguments.
fn chain(args: &[Expr], mut holds: impl FnMut(&Expr, &Expr) -> Result<bool>) -> Result<Expr> {
    for window in args.windows(2) {
        if !holds(&window[0], &window[1])? {
            return Ok(Expr::Bool(false));
        }
    }
    Ok(Expr::Bool(true))
}

fn equal(args: &[Expr], _ctx: &mut CallContext<'_>) -> Result<Expr> {
    chain(args, |a, b| Ok(a == b))
}

fn different(args: &[Expr], _ctx: &mut CallContext<'_>) -> Result<Expr> {
    chain(args, |a, b| Ok(a != b))
}

fn ordered(args: &[Expr], ctx: &CallContext<'_>, accept: fn(Ordering) -> bool) -> Result<Expr> {
    chain(args, |a, b| match a.compare(b) {
        Some(ordering) => Ok(accept(ordering)),
        None => Err(ctx.error(format!(
            "cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        ))),
    })
}

fn greater(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    ordered(args, ctx, Ordering::is_gt)
}

fn greater_or_equal(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    ordered(args, ctx, Ordering::is_ge)
}

fn less(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    ordered(args, ctx, Ordering::is_lt)
}

fn less_or_equal(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    ordered(args, ctx, Ordering::is_le)
}

fn not(args: &[Expr], _ctx: &mut CallContext<'_>) -> Result<Expr> {
    Ok(Expr::Bool(args[0].is_nil()))
}

fn eql(args: &[Expr], _ctx: &mut CallContext<'_>) -> Result<Expr> {
    Ok(Expr::Bool(args[0].eql(&args[1])))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::{Error, Evaluator, Expr};

    fn eval_string(input: &str) -> crate::Result<Expr> {
        Evaluator::new().eval_all(input)
    }

    #[test]
    fn test_arithmetic_data_driven() {
        let cases = [
            ("(+)", Expr::Integer(0)),
            ("(+ 5)", Expr::Integer(5)),
            ("(+ 2 (+ 1 2) 4)", Expr::Integer(9)),
            ("(+ 1 2.5)", Expr::Float(3.5)),
            ("(- 10 3 2)", Expr::Integer(5)),
            ("(- 4)", Expr::Integer(-4)),
            ("(- 1.5)", Expr::Float(-1.5)),
            ("(*)", Expr::Integer(1)),
            ("(* 2 3 4)", Expr::Integer(24)),
            ("(* 2 0.5)", Expr::Float(1.0)),
            ("(/ 12 2 3)", Expr::Integer(2)),
            ("(/ 7 2)", Expr::Float(3.5)),
            ("(/ 4)", Expr::Float(0.25)),
            ("(/ 1.0 0)", Expr::Float(f64::INFINITY)),
            ("(1+ 41)", Expr::Integer(42)),
            ("(1- 0.5)", Expr::Float(-0.5)),
            ("(mod 7 3)", Expr::Integer(1)),
            ("(mod -7 3)", Expr::Integer(2)),
            ("(mod 7 -3)", Expr::Integer(-2)),
            ("(mod 7.5 2)", Expr::Float(1.5)),
        ];
        for (input, expected) in cases {
            let result = eval_string(input).unwrap();
            assert_eq!(result.type_name(), expected.type_name(), "input: {input}");
            assert_eq!(result, expected, "input: {input}");
        }
    }

    #[test]
    fn test_arithmetic_errors() {
        let runtime_cases = [
            ("(/ 1 0)", "Runtime error: /: division by zero"),
            ("(mod 1 0)", "Runtime error: mod: division by zero"),
            ("(+ 9223372036854775807 1)", "Runtime error: +: integer overflow"),
            ("(* 9223372036854775807 2)", "Runtime error: *: integer overflow"),
            ("(- -9223372036854775807 2)", "Runtime error: -: integer overflow"),
        ];
        for (input, expected) in runtime_cases {
            let err = eval_string(input).unwrap_err();
            assert!(matches!(err, Error::Runtime(_)), "{input}: {err:?}");
            assert_eq!(err.to_string(), expected);
        }

        let err = eval_string("(+ 1 \"two\")").unwrap_err();
        assert!(matches!(err, Error::Parameters { .. }));
        assert_eq!(err.to_string(), "+: expected arg #1 to be a number but received string");
        assert!(matches!(eval_string("(-)"), Err(Error::Parameters { .. })));
    }

    #[test]
    fn test_comparisons() {
        let cases = [
            ("(= 1 1)", "t"),
            ("(= 1 1.0)", "t"),
            ("(= 1 1 2)", "nil"),
            ("(equal '(1 (2 \"x\")) '(1 (2 \"x\")))", "t"),
            ("(= 'a 'a)", "t"),
            ("(/= 1 2 1)", "t"),
            ("(/= 1 1)", "nil"),
            ("(< 1 2 3)", "t"),
            ("(< 1 3 2)", "nil"),
            ("(lessp 1 2.5)", "t"),
            ("(> 3 2 1)", "t"),
            ("(greaterp 1 2)", "nil"),
            ("(>= 2 2 1)", "t"),
            ("(<= 1 1 0)", "nil"),
            ("(< \"abc\" \"abd\")", "t"),
            ("(> 'b 'a)", "t"),
            ("(< 5)", "t"),
            ("(not nil)", "t"),
            ("(not 0)", "nil"),
            ("(null '())", "t"),
            ("(eql 1 1)", "t"),
            ("(eql 1 1.0)", "nil"),
            ("(eql 'a 'a)", "t"),
            ("(eql '(1) '(1))", "nil"),
            ("(eq nil '())", "t"),
            ("(let ((x '(1))) (eql x x))", "t"),
        ];
        for (input, expected) in cases {
            assert_eq!(eval_string(input).unwrap().to_string(), expected, "input: {input}");
        }
    }

    #[test]
    fn test_incomparable_types() {
        let err = eval_string("(< 1 \"a\")").unwrap_err();
        assert_eq!(err.to_string(), "<: cannot compare integer with string");
        assert!(matches!(eval_string("(> '(1) '(2))"), Err(Error::Parameters { .. })));
    }
}
