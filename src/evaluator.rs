use std::rc::Rc;

use tracing::{info, trace};

use crate::ast::{Builtin, Expr, Function, Lambda};
use crate::builtins::{self, Arity};
use crate::environment::Environment;
use crate::parser::{Parser, parse_all};
use crate::{Error, MAX_CALL_DEPTH, Result};

/// Tracing target for verbose call logging.
pub const CALL_TRACE_TARGET: &str = "minilisp::calls";

/// Remaining native stack below which evaluation switches to a fresh segment.
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each extra stack segment.
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Evaluator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalConfig {
    /// Nested calls allowed before `Error::StackOverflow`
    pub max_call_depth: usize,
    /// Log every call and its result under [`CALL_TRACE_TARGET`]
    pub trace_calls: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_call_depth: MAX_CALL_DEPTH,
            trace_calls: false,
        }
    }
}

/// Cumulative evaluation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvalStats {
    pub evaluations: u64,
    pub symbol_lookups: u64,
    pub function_calls: u64,
    pub literals: u64,
}

impl EvalStats {
    /// Counters accumulated since `earlier` was snapshotted.
    pub fn diff(&self, earlier: &EvalStats) -> EvalStats {
        EvalStats {
            evaluations: self.evaluations.saturating_sub(earlier.evaluations),
            symbol_lookups: self.symbol_lookups.saturating_sub(earlier.symbol_lookups),
            function_calls: self.function_calls.saturating_sub(earlier.function_calls),
            literals: self.literals.saturating_sub(earlier.literals),
        }
    }

    /// The counters as an association list, e.g. `((evaluations . 3) ...)`.
    pub fn to_expr(&self) -> Expr {
        let entry = |name: &str, count: u64| {
            Expr::cons(Expr::symbol(name), Expr::Integer(count as i64))
        };
        Expr::list([
            entry("evaluations", self.evaluations),
            entry("symbol-lookups", self.symbol_lookups),
            entry("function-calls", self.function_calls),
            entry("literals", self.literals),
        ])
    }
}

/// Evaluates expressions against a global environment, tracking call depth
/// and statistics.
pub struct Evaluator {
    globals: Environment,
    stats: EvalStats,
    depth: usize,
    config: EvalConfig,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Evaluator::with_config(EvalConfig::default())
    }

    pub fn with_config(config: EvalConfig) -> Self {
        Evaluator::with_env(create_global_env(), config)
    }

    /// Uses an existing root environment instead of a fresh one.
    pub fn with_env(globals: Environment, config: EvalConfig) -> Self {
        Evaluator {
            globals,
            stats: EvalStats::default(),
            depth: 0,
            config,
        }
    }

    pub fn globals(&self) -> &Environment {
        &self.globals
    }

    pub fn stats(&self) -> EvalStats {
        self.stats
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EvalConfig {
        &mut self.config
    }

    /// Current call depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Registers a native function in the global function namespace.
    ///
    /// Fails when `name` is already bound to a constant.
    ///
    /// ```
    /// use minilisp::{Evaluator, Expr};
    /// use minilisp::builtins::Arity;
    ///
    /// let mut evaluator = Evaluator::new();
    /// evaluator
    ///     .register_builtin("double", Arity::Exact(1), |args, ctx| {
    ///         Ok(Expr::Integer(ctx.arg_integer(args, 0)? * 2))
    ///     })
    ///     .unwrap();
    /// assert_eq!(evaluator.eval_str("(double 21)").unwrap(), Expr::Integer(42));
    /// ```
    pub fn register_builtin<F>(&mut self, name: &str, arity: Arity, func: F) -> Result<()>
    where
        F: Fn(&[Expr], &mut CallContext<'_>) -> Result<Expr> + 'static,
    {
        let builtin = Builtin {
            name: Rc::from(name),
            aliases: Vec::new(),
            eval_args: true,
            arity,
            func: Rc::new(func),
        };
        self.globals
            .define_function(name, Expr::function(Function::Builtin(builtin)))
    }

    /// Evaluates an expression in `env`.
    ///
    /// The native stack grows on demand, so only `max_call_depth` bounds
    /// recursion regardless of the calling thread's stack size.
    pub fn eval(&mut self, expr: &Expr, env: &Environment) -> Result<Expr> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(expr, env))
    }

    fn eval_inner(&mut self, expr: &Expr, env: &Environment) -> Result<Expr> {
        self.stats.evaluations += 1;
        trace!(depth = self.depth, %expr, "eval");
        match expr {
            Expr::Symbol(name) => {
                self.stats.symbol_lookups += 1;
                env.lookup_value(name)
                    .ok_or_else(|| Error::SymbolNotFound(name.to_string()))
            }
            Expr::Pair(_) => self.eval_call(expr, env),
            _ => {
                self.stats.literals += 1;
                Ok(expr.clone())
            }
        }
    }

    /// Evaluates `body` in order, returning the last value (`nil` if empty).
    pub fn eval_body(&mut self, body: &[Expr], env: &Environment) -> Result<Expr> {
        let mut result = Expr::Nil;
        for expr in body {
            result = self.eval(expr, env)?;
        }
        Ok(result)
    }

    /// Parses and evaluates text holding a single expression in the global
    /// environment.
    pub fn eval_str(&mut self, text: &str) -> Result<Expr> {
        let expr = crate::parser::parse(text)?;
        let globals = self.globals.clone();
        self.eval(&expr, &globals)
    }

    /// Evaluates every top-level form in `text` and returns the last value.
    pub fn eval_all(&mut self, text: &str) -> Result<Expr> {
        self.run_forms(parse_all(text))
    }

    /// Like [`Evaluator::eval_all`], labelling syntax errors with `origin`.
    pub fn load_and_eval_all(&mut self, text: &str, origin: &str) -> Result<Expr> {
        self.run_forms(Parser::with_origin(text, origin))
    }

    fn run_forms(&mut self, forms: Parser<'_>) -> Result<Expr> {
        let globals = self.globals.clone();
        let mut result = Expr::Nil;
        for form in forms {
            let (expr, _) = form?;
            result = self.eval(&expr, &globals)?;
        }
        Ok(result)
    }

    fn eval_call(&mut self, call: &Expr, env: &Environment) -> Result<Expr> {
        let (head, tail) = match call {
            Expr::Pair(pair) => (&pair.car, &pair.cdr),
            _ => return Err(Error::runtime(format!("{call} is not a function call"))),
        };
        let function = self.resolve_function(head, env)?;
        let arg_exprs = tail.proper_list().ok_or_else(|| {
            Error::runtime(format!("function call arguments should be a proper list: {call}"))
        })?;

        let args = if function.eval_args() {
            arg_exprs
                .iter()
                .map(|arg| self.eval(arg, env))
                .collect::<Result<Vec<_>>>()?
        } else {
            arg_exprs
        };
        self.apply(&function, &args, env)
    }

    /// Resolves the head of a call form to a function.
    fn resolve_function(&mut self, head: &Expr, env: &Environment) -> Result<Rc<Function>> {
        match head {
            Expr::Symbol(name) => {
                self.stats.symbol_lookups += 1;
                match env.lookup_function(name) {
                    Some(Expr::Function(function)) => Ok(function),
                    Some(other) => Err(Error::runtime(format!(
                        "symbol '{name}' is bound to {other}, which is not a function"
                    ))),
                    None => Err(Error::runtime(format!("Undefined function {name}"))),
                }
            }
            Expr::Function(function) => Ok(function.clone()),
            Expr::Pair(_) => match self.eval(head, env)? {
                Expr::Function(function) => Ok(function),
                other => Err(Error::runtime(format!("{other} is not a function"))),
            },
            other => Err(Error::runtime(format!("{other} is not a function"))),
        }
    }

    /// Invokes `function` with arguments that are already in final form:
    /// evaluated for ordinary functions, raw for special forms.
    pub fn apply(&mut self, function: &Function, args: &[Expr], env: &Environment) -> Result<Expr> {
        if self.depth >= self.config.max_call_depth {
            return Err(Error::StackOverflow {
                depth: self.config.max_call_depth,
            });
        }
        self.stats.function_calls += 1;

        let tracing_calls = self.config.trace_calls;
        let indent = "  ".repeat(if tracing_calls { self.depth } else { 0 });
        if tracing_calls {
            let call: Vec<String> = std::iter::once(function.name().to_string())
                .chain(args.iter().map(|arg| arg.to_string()))
                .collect();
            info!(target: CALL_TRACE_TARGET, "{indent}-> ({})", call.join(" "));
        }

        self.depth += 1;
        let result = self.invoke(function, args, env);
        self.depth -= 1;

        if tracing_calls {
            match &result {
                Ok(value) => info!(target: CALL_TRACE_TARGET, "{indent}<- {value}"),
                Err(err) => info!(target: CALL_TRACE_TARGET, "{indent}<- error: {err}"),
            }
        }
        result
    }

    fn invoke(&mut self, function: &Function, args: &[Expr], env: &Environment) -> Result<Expr> {
        match function {
            Function::Builtin(builtin) => {
                builtin.arity.validate(&builtin.name, args.len())?;
                let mut ctx = CallContext {
                    evaluator: self,
                    env,
                    name: &builtin.name,
                };
                (builtin.func)(args, &mut ctx)
            }
            // Plain functions and lambdas extend the caller's scope chain.
            Function::User(lambda) | Function::Lambda(lambda) => {
                self.invoke_lambda(lambda, function.name(), args, env.child())
            }
            // Closures extend the scope captured when they were created.
            Function::Closure(closure) => {
                self.invoke_lambda(&closure.lambda, function.name(), args, closure.env.child())
            }
        }
    }

    fn invoke_lambda(
        &mut self,
        lambda: &Lambda,
        name: &str,
        args: &[Expr],
        scope: Environment,
    ) -> Result<Expr> {
        Arity::Exact(lambda.params.len()).validate(name, args.len())?;
        for (param, arg) in lambda.params.iter().zip(args) {
            scope.define(param, arg.clone())?;
        }
        self.eval_body(&lambda.body, &scope)
    }

    /// Runs `f` with call tracing switched on, restoring the previous setting.
    pub fn with_call_tracing<T>(&mut self, f: impl FnOnce(&mut Evaluator) -> T) -> T {
        let previous = self.config.trace_calls;
        self.config.trace_calls = true;
        let result = f(self);
        self.config.trace_calls = previous;
        result
    }
}

/// What a builtin sees when it is called: the evaluator, the caller's
/// environment and its own name for error messages.
pub struct CallContext<'a> {
    pub evaluator: &'a mut Evaluator,
    pub env: &'a Environment,
    pub name: &'a str,
}

impl CallContext<'_> {
    /// Evaluates `expr` in the caller's environment.
    pub fn eval(&mut self, expr: &Expr) -> Result<Expr> {
        self.evaluator.eval(expr, self.env)
    }

    pub fn eval_in(&mut self, expr: &Expr, env: &Environment) -> Result<Expr> {
        self.evaluator.eval(expr, env)
    }

    pub fn eval_body(&mut self, body: &[Expr], env: &Environment) -> Result<Expr> {
        self.evaluator.eval_body(body, env)
    }

    /// Calls `function` from inside a builtin, in the caller's environment.
    pub fn call(&mut self, function: &Function, args: &[Expr]) -> Result<Expr> {
        self.evaluator.apply(function, args, self.env)
    }

    /// A parameters error prefixed with this builtin's name.
    pub fn error(&self, message: impl std::fmt::Display) -> Error {
        Error::parameters(self.name, format!("{}: {message}", self.name))
    }

    pub(crate) fn expected(&self, index: usize, what: &str, got: &Expr) -> Error {
        self.error(format!(
            "expected arg #{index} to be {what} but received {}",
            got.type_name()
        ))
    }

    fn arg<'e>(&self, args: &'e [Expr], index: usize) -> Result<&'e Expr> {
        args.get(index)
            .ok_or_else(|| self.error(format!("missing arg #{index}")))
    }

    pub fn arg_symbol<'e>(&self, args: &'e [Expr], index: usize) -> Result<&'e str> {
        let arg = self.arg(args, index)?;
        arg.as_symbol()
            .ok_or_else(|| self.expected(index, "a symbol", arg))
    }

    pub fn arg_integer(&self, args: &[Expr], index: usize) -> Result<i64> {
        match self.arg(args, index)? {
            Expr::Integer(n) => Ok(*n),
            other => Err(self.expected(index, "an integer", other)),
        }
    }

    pub fn arg_number(&self, args: &[Expr], index: usize) -> Result<f64> {
        let arg = self.arg(args, index)?;
        arg.as_number()
            .ok_or_else(|| self.expected(index, "a number", arg))
    }

    pub fn arg_string<'e>(&self, args: &'e [Expr], index: usize) -> Result<&'e str> {
        match self.arg(args, index)? {
            Expr::String(text) => Ok(text),
            other => Err(self.expected(index, "a string", other)),
        }
    }

    /// Items of a list argument; `nil` is the empty list.
    pub fn arg_list(&self, args: &[Expr], index: usize) -> Result<Vec<Expr>> {
        let arg = self.arg(args, index)?;
        if !arg.is_list() {
            return Err(self.expected(index, "a list", arg));
        }
        arg.proper_list()
            .ok_or_else(|| self.expected(index, "a proper list", arg))
    }

    /// A function object, or a symbol naming one in the function namespace.
    pub fn arg_function(&self, args: &[Expr], index: usize) -> Result<Rc<Function>> {
        match self.arg(args, index)? {
            Expr::Function(function) => Ok(function.clone()),
            Expr::Symbol(name) => match self.env.lookup_function(name) {
                Some(Expr::Function(function)) => Ok(function),
                _ => Err(self.error(format!("Undefined function {name}"))),
            },
            other => Err(self.expected(index, "a symbol or function object", other)),
        }
    }
}

/// Creates the root environment with every builtin installed under its
/// name and aliases.
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    for op in builtins::builtin_ops() {
        let function = Expr::function(Function::Builtin(Builtin::from(*op)));
        for name in std::iter::once(&op.name).chain(op.aliases) {
            // The fresh root holds no constants, so this cannot fail.
            let _ = env.define_function(name, function.clone());
        }
    }
    env
}
