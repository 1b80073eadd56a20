use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::Result;
use crate::builtins::Arity;
use crate::environment::Environment;
use crate::evaluator::CallContext;

/// Core value type of the interpreter: every piece of code and data is an `Expr`.
///
/// `Nil` doubles as the empty list. `Bool(false)` behaves like `Nil` for
/// truthiness, printing and equality, but keeps its own tag.
#[derive(Debug, Clone)]
pub enum Expr {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Symbol(Rc<str>),
    /// Cons cell; lists are chains of pairs ending in `Nil`
    Pair(Rc<Pair>),
    /// Builtin, user-defined function, lambda or closure
    Function(Rc<Function>),
}

/// How a pair was written in source, so it prints back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sugar {
    #[default]
    Plain,
    /// `'x`, i.e. `(quote x)`
    Quote,
    /// `#'x`, i.e. `(function x)`
    GetFunc,
}

/// An immutable cons cell.
#[derive(Debug)]
pub struct Pair {
    pub car: Expr,
    pub cdr: Expr,
    pub sugar: Sugar,
}

impl Drop for Pair {
    // Unlink long cdr chains iteratively so dropping a big list can't blow the stack.
    fn drop(&mut self) {
        let mut next = std::mem::replace(&mut self.cdr, Expr::Nil);
        while let Expr::Pair(rc) = next {
            match Rc::try_unwrap(rc) {
                Ok(mut pair) => next = std::mem::replace(&mut pair.cdr, Expr::Nil),
                Err(_) => break,
            }
        }
    }
}

/// Signature of native builtin implementations.
pub type NativeFn = dyn Fn(&[Expr], &mut CallContext<'_>) -> Result<Expr>;

/// A native function registered under a name and optional aliases.
pub struct Builtin {
    pub name: Rc<str>,
    pub aliases: Vec<Rc<str>>,
    /// False for special forms, which receive their arguments unevaluated
    pub eval_args: bool,
    pub arity: Arity,
    pub func: Rc<NativeFn>,
}

/// Parameter list and body shared by named functions, lambdas and closures.
#[derive(Debug)]
pub struct Lambda {
    pub name: Option<Rc<str>>,
    pub params: Vec<Rc<str>>,
    pub body: Vec<Expr>,
}

/// A lambda together with the scope that was current when it was captured.
pub struct Closure {
    pub lambda: Rc<Lambda>,
    pub env: Environment,
}

pub enum Function {
    Builtin(Builtin),
    /// Named function created by `defun`
    User(Rc<Lambda>),
    Lambda(Rc<Lambda>),
    Closure(Closure),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Builtin(builtin) => &*builtin.name,
            Function::User(lambda) => lambda.name.as_deref().unwrap_or("lambda"),
            Function::Lambda(_) => "lambda",
            Function::Closure(_) => "closure",
        }
    }

    pub fn eval_args(&self) -> bool {
        match self {
            Function::Builtin(builtin) => builtin.eval_args,
            _ => true,
        }
    }

    pub fn is_special_form(&self) -> bool {
        !self.eval_args()
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Closures capture environments that may point back at themselves.
        write!(f, "{self}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Builtin(builtin) if builtin.eval_args => {
                write!(f, "#<builtin-function {}>", builtin.name)
            }
            Function::Builtin(builtin) => write!(f, "#<special-form {}>", builtin.name),
            Function::User(lambda) => write!(f, "#<function {}>", lambda.name.as_deref().unwrap_or("?")),
            Function::Lambda(_) => write!(f, "#<lambda>"),
            Function::Closure(_) => write!(f, "#<closure>"),
        }
    }
}

impl Expr {
    pub fn symbol(name: &str) -> Expr {
        Expr::Symbol(Rc::from(name))
    }

    pub fn string(text: &str) -> Expr {
        Expr::String(Rc::from(text))
    }

    pub fn cons(car: Expr, cdr: Expr) -> Expr {
        Expr::Pair(Rc::new(Pair {
            car,
            cdr,
            sugar: Sugar::Plain,
        }))
    }

    /// `(quote expr)`, printed as `'expr`
    pub fn quoted(expr: Expr) -> Expr {
        Expr::sugared(Sugar::Quote, "quote", expr)
    }

    /// `(function expr)`, printed as `#'expr`
    pub fn get_func(expr: Expr) -> Expr {
        Expr::sugared(Sugar::GetFunc, "function", expr)
    }

    fn sugared(sugar: Sugar, head: &str, expr: Expr) -> Expr {
        Expr::Pair(Rc::new(Pair {
            car: Expr::symbol(head),
            cdr: Expr::cons(expr, Expr::Nil),
            sugar,
        }))
    }

    pub fn function(function: Function) -> Expr {
        Expr::Function(Rc::new(function))
    }

    /// Builds a proper list.
    pub fn list<I>(items: I) -> Expr
    where
        I: IntoIterator<Item = Expr>,
        I::IntoIter: DoubleEndedIterator,
    {
        Expr::list_with_tail(items, Expr::Nil)
    }

    /// Builds a list whose last cdr is `tail`; an empty `items` yields `tail`.
    pub fn list_with_tail<I>(items: I, tail: Expr) -> Expr
    where
        I: IntoIterator<Item = Expr>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(tail, |acc, item| Expr::cons(item, acc))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Expr::Nil | Expr::Bool(false))
    }

    pub fn is_true(&self) -> bool {
        !self.is_nil()
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Expr::Pair(_))
    }

    pub fn is_atom(&self) -> bool {
        !self.is_pair()
    }

    /// `Nil` or a cons cell.
    pub fn is_list(&self) -> bool {
        self.is_nil() || self.is_pair()
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Expr::Integer(_) | Expr::Float(_))
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expr::Symbol(name) => Some(&**name),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<&Pair> {
        match self {
            Expr::Pair(pair) => Some(&**pair),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expr::Integer(n) => Some(*n as f64),
            Expr::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn car(&self) -> Option<&Expr> {
        self.as_pair().map(|pair| &pair.car)
    }

    pub fn cdr(&self) -> Option<&Expr> {
        self.as_pair().map(|pair| &pair.cdr)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Expr::Nil => "null",
            Expr::Bool(_) => "boolean",
            Expr::Integer(_) => "integer",
            Expr::Float(_) => "float",
            Expr::String(_) => "string",
            Expr::Symbol(_) => "symbol",
            Expr::Pair(_) => "cons",
            Expr::Function(_) => "function",
        }
    }

    /// Iterates list items. An improper tail is yielded as the last item and
    /// a non-list yields itself.
    pub fn iter(&self) -> ListIter<'_> {
        ListIter {
            current: Some(self),
        }
    }

    /// Flattens into a vector, improper tail included: `(1 2 . 3)` gives `[1, 2, 3]`.
    pub fn to_vec(&self) -> Vec<Expr> {
        self.iter().cloned().collect()
    }

    /// Items of a proper list, or `None` if the chain ends in a non-nil atom.
    pub fn proper_list(&self) -> Option<Vec<Expr>> {
        let mut items = Vec::new();
        let mut current = self;
        loop {
            match current {
                Expr::Pair(pair) => {
                    items.push(pair.car.clone());
                    current = &pair.cdr;
                }
                other if other.is_nil() => return Some(items),
                _ => return None,
            }
        }
    }

    /// Identity-style comparison: atoms of the same type and value, or the
    /// very same cons cell or function.
    pub fn eql(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Integer(a), Expr::Integer(b)) => a == b,
            (Expr::Float(a), Expr::Float(b)) => a == b,
            (Expr::String(a), Expr::String(b)) => a == b,
            (Expr::Symbol(a), Expr::Symbol(b)) => a == b,
            (Expr::Pair(a), Expr::Pair(b)) => Rc::ptr_eq(a, b),
            (Expr::Function(a), Expr::Function(b)) => Rc::ptr_eq(a, b),
            (Expr::Bool(true), Expr::Bool(true)) => true,
            (a, b) => a.is_nil() && b.is_nil(),
        }
    }

    /// Ordering used by `<`, `>` and `sort`: numbers by value, strings and
    /// symbols lexicographically. Anything else is incomparable.
    pub fn compare(&self, other: &Expr) -> Option<Ordering> {
        match (self, other) {
            (Expr::Integer(a), Expr::Integer(b)) => Some(a.cmp(b)),
            (Expr::String(a), Expr::String(b)) => Some(a.cmp(b)),
            (Expr::Symbol(a), Expr::Symbol(b)) => Some(a.cmp(b)),
            (a, b) => a.as_number()?.partial_cmp(&b.as_number()?),
        }
    }
}

impl PartialEq for Expr {
    /// Structural equality. Integers and floats compare numerically; the
    /// quote shorthand is ignored; functions compare by identity.
    fn eq(&self, other: &Expr) -> bool {
        let (mut a, mut b) = (self, other);
        loop {
            match (a, b) {
                (Expr::Pair(x), Expr::Pair(y)) => {
                    if Rc::ptr_eq(x, y) {
                        return true;
                    }
                    if x.car != y.car {
                        return false;
                    }
                    a = &x.cdr;
                    b = &y.cdr;
                }
                (Expr::Integer(x), Expr::Integer(y)) => return x == y,
                (Expr::Integer(_) | Expr::Float(_), Expr::Integer(_) | Expr::Float(_)) => {
                    return a.as_number() == b.as_number();
                }
                (Expr::String(x), Expr::String(y)) => return x == y,
                (Expr::Symbol(x), Expr::Symbol(y)) => return x == y,
                (Expr::Function(x), Expr::Function(y)) => return Rc::ptr_eq(x, y),
                (Expr::Bool(true), Expr::Bool(true)) => return true,
                (x, y) => return x.is_nil() && y.is_nil(),
            }
        }
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Bool(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Integer(value)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Float(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::string(value)
    }
}

pub struct ListIter<'a> {
    current: Option<&'a Expr>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Expr;

    fn next(&mut self) -> Option<&'a Expr> {
        match self.current? {
            Expr::Pair(pair) => {
                self.current = Some(&pair.cdr);
                Some(&pair.car)
            }
            Expr::Nil => {
                self.current = None;
                None
            }
            tail => {
                self.current = None;
                Some(tail)
            }
        }
    }
}

fn format_float(n: f64) -> String {
    let text = n.to_string();
    if text.contains(['.', 'e', 'i', 'N']) {
        text
    } else {
        format!("{text}.0")
    }
}

/// Writes a symbol so that reading it back yields the same name.
///
/// Characters the reader would split on are backslash-escaped. A complete
/// `|...|` run is written verbatim; a `|` that does not open one is escaped.
/// Names that would otherwise read as a number, `nil`, `t` or the dot of a
/// dotted pair get a leading backslash.
fn escape_symbol(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    let mut rest = name;
    while let Some(c) = rest.chars().next() {
        if c == '|'
            && let Some(len) = pipe_run_len(rest)
        {
            escaped.push_str(&rest[..len]);
            rest = &rest[len..];
            continue;
        }
        let at_start = escaped.is_empty();
        if c.is_whitespace()
            || matches!(c, '(' | ')' | '"' | '\'' | '\\' | '|')
            || (at_start && c == ';')
        {
            escaped.push('\\');
        }
        escaped.push(c);
        rest = &rest[c.len_utf8()..];
    }

    let reads_as_other = escaped == name
        && (name.parse::<f64>().is_ok() || matches!(name, "nil" | "t" | "."));
    if reads_as_other {
        escaped.insert(0, '\\');
    }
    escaped
}

/// Byte length of the `|...|` run at the start of `text`, if it is closed.
fn pipe_run_len(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '|' => return Some(i + 1),
            '\\' => {
                chars.next()?;
            }
            _ => {}
        }
    }
    None
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Sugar::Quote | Sugar::GetFunc, Expr::Pair(rest)) = (self.sugar, &self.cdr)
            && rest.cdr.is_nil()
        {
            let prefix = if self.sugar == Sugar::Quote { "'" } else { "#'" };
            return write!(f, "{prefix}{}", rest.car);
        }

        write!(f, "({}", self.car)?;
        let mut current = &self.cdr;
        loop {
            match current {
                Expr::Pair(pair) => {
                    write!(f, " {}", pair.car)?;
                    current = &pair.cdr;
                }
                tail if tail.is_nil() => break,
                tail => {
                    write!(f, " . {tail}")?;
                    break;
                }
            }
        }
        write!(f, ")")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Nil | Expr::Bool(false) => write!(f, "nil"),
            Expr::Bool(true) => write!(f, "t"),
            Expr::Integer(n) => write!(f, "{n}"),
            Expr::Float(n) => write!(f, "{}", format_float(*n)),
            Expr::String(s) => write!(f, "{}", serde_json::Value::from(&**s)),
            Expr::Symbol(name) => write!(f, "{}", escape_symbol(name)),
            Expr::Pair(pair) => write!(f, "{pair}"),
            Expr::Function(function) => write!(f, "{function}"),
        }
    }
}
