//! Type and binding predicates. Each takes one argument and returns `t` or
//! `nil`.

use super::{Arity, BuiltinOp, OpKind};
use crate::Result;
use crate::ast::Expr;
use crate::evaluator::CallContext;

macro_rules! predicate {
    ($name:literal, $func:ident) => {
        BuiltinOp {
            name: $name,
            aliases: &[],
            op_kind: OpKind::Function($func),
            arity: Arity::Exact(1),
        }
    };
}

pub(super) static OPS: &[BuiltinOp] = &[
    predicate!("atom", atom),
    predicate!("listp", listp),
    predicate!("consp", consp),
    predicate!("numberp", numberp),
    predicate!("integerp", integerp),
    predicate!("floatp", floatp),
    predicate!("stringp", stringp),
    predicate!("symbolp", symbolp),
    predicate!("functionp", functionp),
    predicate!("zerop", zerop),
    predicate!("evenp", evenp),
    predicate!("oddp", oddp),
    predicate!("boundp", boundp),
    predicate!("fboundp", fboundp),
    predicate!("constantp", constantp),
];

// Generates a predicate over the argument value alone.
macro_rules! value_predicate {
    ($func:ident, |$expr:ident| $test:expr) => {
        fn $func(args: &[Expr], _ctx: &mut CallContext<'_>) -> Result<Expr> {
            let $expr = &args[0];
            Ok(Expr::Bool($test))
        }
    };
}

value_predicate!(atom, |expr| expr.is_atom());
value_predicate!(listp, |expr| expr.is_list());
value_predicate!(consp, |expr| expr.is_pair());
value_predicate!(numberp, |expr| expr.is_number());
value_predicate!(integerp, |expr| matches!(expr, Expr::Integer(_)));
value_predicate!(floatp, |expr| matches!(expr, Expr::Float(_)));
value_predicate!(stringp, |expr| matches!(expr, Expr::String(_)));
value_predicate!(symbolp, |expr| matches!(expr, Expr::Symbol(_)));
value_predicate!(functionp, |expr| matches!(expr, Expr::Function(_)));
// Non-numbers are simply not zero, even or odd.
value_predicate!(zerop, |expr| expr.as_number() == Some(0.0));
value_predicate!(evenp, |expr| matches!(expr, Expr::Integer(n) if n % 2 == 0));
value_predicate!(oddp, |expr| matches!(expr, Expr::Integer(n) if n % 2 != 0));

fn boundp(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let name = ctx.arg_symbol(args, 0)?;
    Ok(Expr::Bool(ctx.env.is_bound(name)))
}

fn fboundp(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let name = ctx.arg_symbol(args, 0)?;
    Ok(Expr::Bool(ctx.env.is_fbound(name)))
}

/// Non-symbol atoms are their own constants; symbols must name a `defconstant`.
fn constantp(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let constant = match &args[0] {
        Expr::Symbol(name) => ctx.env.is_constant(name),
        Expr::Pair(_) => false,
        _ => true,
    };
    Ok(Expr::Bool(constant))
}
