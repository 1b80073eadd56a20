//! Special forms: builtins that receive their argument expressions
//! unevaluated.

use std::rc::Rc;

use super::{Arity, BuiltinOp, OpKind};
use crate::Result;
use crate::ast::{Closure, Expr, Function, Lambda};
use crate::evaluator::CallContext;

pub(super) static OPS: &[BuiltinOp] = &[
    BuiltinOp {
        name: "quote",
        aliases: &[],
        op_kind: OpKind::SpecialForm(quote),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "function",
        aliases: &[],
        op_kind: OpKind::SpecialForm(function),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        name: "if",
        aliases: &[],
        op_kind: OpKind::SpecialForm(eval_if),
        arity: Arity::Range(2, 3),
    },
    BuiltinOp {
        name: "and",
        aliases: &[],
        op_kind: OpKind::SpecialForm(and),
        arity: Arity::Any,
    },
    BuiltinOp {
        name: "or",
        aliases: &[],
        op_kind: OpKind::SpecialForm(or),
        arity: Arity::Any,
    },
    BuiltinOp {
        name: "progn",
        aliases: &[],
        op_kind: OpKind::SpecialForm(progn),
        arity: Arity::Any,
    },
    BuiltinOp {
        name: "let",
        aliases: &[],
        op_kind: OpKind::SpecialForm(eval_let),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: "let*",
        aliases: &[],
        op_kind: OpKind::SpecialForm(eval_let_star),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: "setq",
        aliases: &[],
        op_kind: OpKind::SpecialForm(setq),
        arity: Arity::Any,
    },
    BuiltinOp {
        name: "defvar",
        aliases: &[],
        op_kind: OpKind::SpecialForm(defvar),
        arity: Arity::Range(1, 2),
    },
    BuiltinOp {
        name: "defparameter",
        aliases: &[],
        op_kind: OpKind::SpecialForm(defparameter),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        name: "defconstant",
        aliases: &[],
        op_kind: OpKind::SpecialForm(defconstant),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        name: "defun",
        aliases: &[],
        op_kind: OpKind::SpecialForm(defun),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        name: "lambda",
        aliases: &[],
        op_kind: OpKind::SpecialForm(lambda),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: "cond",
        aliases: &[],
        op_kind: OpKind::SpecialForm(cond),
        arity: Arity::Any,
    },
    BuiltinOp {
        name: "when",
        aliases: &[],
        op_kind: OpKind::SpecialForm(when),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        name: "unless",
        aliases: &[],
        op_kind: OpKind::SpecialForm(unless),
        arity: Arity::AtLeast(1),
    },
];

fn quote(args: &[Expr], _ctx: &mut CallContext<'_>) -> Result<Expr> {
    Ok(args[0].clone())
}

/// `(function name)` looks up the function namespace; `(function (lambda ...))`
/// captures the current scope in a closure.
fn function(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let target = if args[0].is_pair() {
        ctx.eval(&args[0])?
    } else {
        args[0].clone()
    };
    let func = ctx.arg_function(std::slice::from_ref(&target), 0)?;
    match &*func {
        Function::Lambda(lambda) => Ok(Expr::function(Function::Closure(Closure {
            lambda: lambda.clone(),
            env: ctx.env.clone(),
        }))),
        _ => Ok(Expr::Function(func)),
    }
}

fn eval_if(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    if ctx.eval(&args[0])?.is_true() {
        ctx.eval(&args[1])
    } else {
        match args.get(2) {
            Some(otherwise) => ctx.eval(otherwise),
            None => Ok(Expr::Nil),
        }
    }
}

fn and(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let mut result = Expr::Bool(true);
    for arg in args {
        result = ctx.eval(arg)?;
        if result.is_nil() {
            return Ok(Expr::Nil);
        }
    }
    Ok(result)
}

fn or(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    for arg in args {
        let value = ctx.eval(arg)?;
        if value.is_true() {
            return Ok(value);
        }
    }
    Ok(Expr::Nil)
}

fn progn(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let env = ctx.env.clone();
    ctx.eval_body(args, &env)
}

/// Splits one `let` binding into its name and optional init form.
/// Accepts `name`, `(name)` and `(name init)`.
fn let_binding<'e>(binding: &'e Expr, ctx: &CallContext<'_>) -> Result<(&'e str, Option<&'e Expr>)> {
    if let Some(name) = binding.as_symbol() {
        return Ok((name, None));
    }
    let malformed = || ctx.error(format!("malformed binding {binding}"));
    let pair = binding.as_pair().ok_or_else(malformed)?;
    let name = pair.car.as_symbol().ok_or_else(malformed)?;
    match &pair.cdr {
        Expr::Nil => Ok((name, None)),
        Expr::Pair(rest) if rest.cdr.is_nil() => Ok((name, Some(&rest.car))),
        _ => Err(malformed()),
    }
}

fn eval_let(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let bindings = ctx.arg_list(args, 0)?;
    let scope = ctx.env.child();
    // Every init form sees the outer scope only.
    for binding in &bindings {
        let (name, init) = let_binding(binding, ctx)?;
        let value = match init {
            Some(init) => ctx.eval(init)?,
            None => Expr::Nil,
        };
        scope.define(name, value)?;
    }
    ctx.eval_body(&args[1..], &scope)
}

fn eval_let_star(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let bindings = ctx.arg_list(args, 0)?;
    let mut scope = ctx.env.clone();
    for binding in &bindings {
        let (name, init) = let_binding(binding, ctx)?;
        let value = match init {
            Some(init) => ctx.eval_in(init, &scope)?,
            None => Expr::Nil,
        };
        scope = scope.child();
        scope.define(name, value)?;
    }
    let scope = scope.child();
    ctx.eval_body(&args[1..], &scope)
}

fn setq(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    if args.len() % 2 != 0 {
        return Err(ctx.error("odd number of arguments"));
    }
    let mut result = Expr::Nil;
    for i in (0..args.len()).step_by(2) {
        let name = ctx.arg_symbol(args, i)?;
        result = ctx.eval(&args[i + 1])?;
        ctx.env.set(name, result.clone())?;
    }
    Ok(result)
}

/// Binds a global only if it has no value yet.
fn defvar(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let name = ctx.arg_symbol(args, 0)?;
    let root = ctx.env.root();
    if let Some(init) = args.get(1)
        && !root.is_bound(name)
    {
        let value = ctx.eval(init)?;
        root.define(name, value)?;
    }
    Ok(args[0].clone())
}

fn defparameter(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let name = ctx.arg_symbol(args, 0)?;
    let value = ctx.eval(&args[1])?;
    ctx.env.root().define(name, value)?;
    Ok(args[0].clone())
}

fn defconstant(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let name = ctx.arg_symbol(args, 0)?;
    let value = ctx.eval(&args[1])?;
    ctx.env.root().define_constant(name, value)?;
    Ok(args[0].clone())
}

/// Reads a parameter list: `nil`/`()` or a proper list of symbols.
fn parameters(list: &Expr, ctx: &CallContext<'_>) -> Result<Vec<Rc<str>>> {
    let items = list
        .proper_list()
        .ok_or_else(|| ctx.error(format!("expected a parameter list but received {list}")))?;
    items
        .iter()
        .map(|item| match item {
            Expr::Symbol(name) => Ok(name.clone()),
            other => Err(ctx.error(format!(
                "expected parameter names to be symbols but received {}",
                other.type_name()
            ))),
        })
        .collect()
}

fn defun(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let name = ctx.arg_symbol(args, 0)?;
    let lambda = Lambda {
        name: Some(Rc::from(name)),
        params: parameters(&args[1], ctx)?,
        body: args[2..].to_vec(),
    };
    ctx.env
        .set_function(name, Expr::function(Function::User(Rc::new(lambda))))?;
    Ok(args[0].clone())
}

fn lambda(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    let lambda = Lambda {
        name: None,
        params: parameters(&args[0], ctx)?,
        body: args[1..].to_vec(),
    };
    Ok(Expr::function(Function::Lambda(Rc::new(lambda))))
}

fn cond(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    for clause in args {
        let forms = clause
            .proper_list()
            .filter(|forms| !forms.is_empty())
            .ok_or_else(|| ctx.error(format!("malformed clause {clause}")))?;
        let test = ctx.eval(&forms[0])?;
        if test.is_true() {
            if forms.len() == 1 {
                return Ok(test);
            }
            let env = ctx.env.clone();
            return ctx.eval_body(&forms[1..], &env);
        }
    }
    Ok(Expr::Nil)
}

fn eval_guarded(args: &[Expr], ctx: &mut CallContext<'_>, expected: bool) -> Result<Expr> {
    if ctx.eval(&args[0])?.is_true() != expected {
        return Ok(Expr::Nil);
    }
    let env = ctx.env.clone();
    ctx.eval_body(&args[1..], &env)
}

fn when(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    eval_guarded(args, ctx, true)
}

fn unless(args: &[Expr], ctx: &mut CallContext<'_>) -> Result<Expr> {
    eval_guarded(args, ctx, false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::{Error, Evaluator, Expr};

    fn eval_printed(input: &str) -> String {
        match Evaluator::new().eval_all(input) {
            Ok(value) => value.to_string(),
            Err(err) => panic!("{input}: {err}"),
        }
    }

    fn eval_err(input: &str) -> Error {
        Evaluator::new().eval_all(input).unwrap_err()
    }

    #[test]
    fn test_special_forms_data_driven() {
        let cases = [
            ("(quote a)", "a"),
            ("'(1 . 2)", "(1 . 2)"),
            ("(if t 1 2)", "1"),
            ("(if nil 1 2)", "2"),
            ("(if nil 1)", "nil"),
            ("(if '() 1 2)", "2"),
            ("(and)", "t"),
            ("(and 1 2 3)", "3"),
            ("(and 1 nil undefined)", "nil"),
            ("(or)", "nil"),
            ("(or nil 2 undefined)", "2"),
            ("(progn)", "nil"),
            ("(progn 1 2 3)", "3"),
            ("(let ((a 1) (b 2)) (+ a b))", "3"),
            ("(let (a (b)) (list a b))", "(nil nil)"),
            ("(let ((a 1)) (let ((a 2) (b a)) b))", "1"),
            ("(let* ((a 1) (b (+ a 1))) (list a b))", "(1 2)"),
            ("(let ())", "nil"),
            ("(setq a 1 b (+ a 1))", "2"),
            ("(setq)", "nil"),
            ("(defvar *x* 1) (defvar *x* 2) *x*", "1"),
            ("(defvar *x*)", "*x*"),
            ("(defparameter *x* 1) (defparameter *x* 2) *x*", "2"),
            ("(defconstant pi 3.14)", "pi"),
            ("(defun sq (x) (* x x))", "sq"),
            ("(defun sq (x) (* x x)) (sq 5)", "25"),
            ("(cond (nil 1) ((= 1 1) 2 3) (t 4))", "3"),
            ("(cond (nil 1) (7))", "7"),
            ("(cond (nil 1))", "nil"),
            ("(when t 1 2)", "2"),
            ("(when nil undefined)", "nil"),
            ("(unless nil 1)", "1"),
            ("(unless t 1)", "nil"),
            ("(function car)", "#<builtin-function car>"),
            ("#'if", "#<special-form if>"),
            ("(lambda (x) x)", "#<lambda>"),
            ("#'(lambda (x) x)", "#<closure>"),
            ("(defun f () 1) #'f", "#<function f>"),
        ];
        for (input, expected) in cases {
            assert_eq!(eval_printed(input), expected, "input: {input}");
        }
    }

    #[test]
    fn test_let_scopes_are_discarded() {
        let mut evaluator = Evaluator::new();
        evaluator.eval_all("(let ((inner 1)) inner)").unwrap();
        assert!(matches!(
            evaluator.eval_str("inner").unwrap_err(),
            Error::SymbolNotFound(name) if name == "inner"
        ));
    }

    #[test]
    fn test_setq_mutates_nearest_binding() {
        let input = "
            (setq x 1)
            (let ((x 2)) (setq x 3))
            x";
        assert_eq!(eval_printed(input), "1");
        assert_eq!(eval_printed("(let ((y 1)) (setq fresh 5)) fresh"), "5");
    }

    #[test]
    fn test_closure_counter_state_is_per_closure() {
        let input = "
            (defun make-counter ()
              (let ((n 0)) #'(lambda () (setq n (+ n 1)))))
            (setq a (make-counter))
            (setq b (make-counter))
            (funcall a) (funcall a) (funcall b)
            (list (funcall a) (funcall b))";
        assert_eq!(eval_printed(input), "(3 2)");
    }

    #[test]
    fn test_form_errors() {
        let cases = [
            ("(setq a)", "setq: odd number of arguments"),
            ("(setq 1 2)", "setq: expected arg #0 to be a symbol but received integer"),
            ("(defun 1 () 1)", "defun: expected arg #0 to be a symbol but received integer"),
            ("(defun f (1) 1)", "defun: expected parameter names to be symbols but received integer"),
            ("(lambda 5 1)", "lambda: expected a parameter list but received 5"),
            ("(let ((1 2)) 1)", "let: malformed binding (1 2)"),
            ("(let ((a 1 2)) a)", "let: malformed binding (a 1 2)"),
            ("(cond 1)", "cond: malformed clause 1"),
            ("(function 42)", "function: expected arg #0 to be a symbol or function object but received integer"),
            ("(function undefined)", "function: Undefined function undefined"),
            ("(if)", "if: too few arguments provided! Expected at least 2 but received 0."),
            ("(quote 1 2)", "quote: too many arguments provided! Expected 1 but received 2."),
        ];
        for (input, expected) in cases {
            let err = eval_err(input);
            assert!(matches!(err, Error::Parameters { .. }), "{input}: {err:?}");
            assert_eq!(err.to_string(), expected, "input: {input}");
        }
    }

    #[test]
    fn test_constants() {
        let err = eval_err("(defconstant limit 10) (setq limit 11)");
        assert_eq!(err, Error::runtime("Cannot modify constant limit"));
        assert_eq!(eval_printed("(defconstant limit 10) (let ((limit 1)) limit)"), "1");
        assert!(Evaluator::new().eval_all("(defconstant c 1) (defconstant c 2)").is_err());
    }

    #[test]
    fn test_defun_is_global_from_nested_scope() {
        let input = "
            (let ((x 1)) (defun inner-fn () 42))
            (inner-fn)";
        assert_eq!(Evaluator::new().eval_all(input).unwrap(), Expr::Integer(42));
    }
}
