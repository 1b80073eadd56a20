use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::ast::Expr;
use crate::{Error, Result};

/// A name's slots. Values and functions live in separate namespaces.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    pub value: Option<Expr>,
    pub function: Option<Expr>,
    /// Set by `defconstant`; rejects later assignment to either slot
    pub read_only: bool,
}

#[derive(Default)]
struct Scope {
    bindings: HashMap<Rc<str>, Binding>,
    parent: Option<Environment>,
}

/// A shared handle to one scope in a chain of scopes.
///
/// Cloning the handle shares the scope: a closure holding a clone sees every
/// later mutation made through any other handle.
#[derive(Clone, Default)]
pub struct Environment(Rc<RefCell<Scope>>);

impl Environment {
    /// Creates an empty root scope.
    pub fn new() -> Self {
        Environment::default()
    }

    /// Creates a new scope whose parent is `self`.
    pub fn child(&self) -> Self {
        Environment(Rc::new(RefCell::new(Scope {
            bindings: HashMap::new(),
            parent: Some(self.clone()),
        })))
    }

    pub fn parent(&self) -> Option<Environment> {
        self.0.borrow().parent.clone()
    }

    pub fn is_root(&self) -> bool {
        self.0.borrow().parent.is_none()
    }

    pub fn root(&self) -> Environment {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Number of scopes above this one.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(scope) = current {
            depth += 1;
            current = scope.parent();
        }
        depth
    }

    pub fn same_scope(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Walks the chain from this scope outward, returning the first hit.
    fn find_map<T>(&self, mut f: impl FnMut(&Binding) -> Option<T>, name: &str) -> Option<T> {
        let mut current = self.clone();
        loop {
            let parent = {
                let scope = current.0.borrow();
                if let Some(found) = scope.bindings.get(name).and_then(&mut f) {
                    return Some(found);
                }
                scope.parent.clone()
            };
            current = parent?;
        }
    }

    pub fn lookup_value(&self, name: &str) -> Option<Expr> {
        self.find_map(|binding| binding.value.clone(), name)
    }

    pub fn lookup_function(&self, name: &str) -> Option<Expr> {
        self.find_map(|binding| binding.function.clone(), name)
    }

    /// The nearest binding for `name`, whichever slots it fills.
    pub fn lookup_binding(&self, name: &str) -> Option<Binding> {
        self.find_map(|binding| Some(binding.clone()), name)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.lookup_value(name).is_some()
    }

    pub fn is_fbound(&self, name: &str) -> bool {
        self.lookup_function(name).is_some()
    }

    pub fn is_constant(&self, name: &str) -> bool {
        self.lookup_binding(name).is_some_and(|binding| binding.read_only)
    }

    fn update_local(&self, name: &str, update: impl FnOnce(&mut Binding)) -> Result<()> {
        let mut scope = self.0.borrow_mut();
        let binding = scope.bindings.entry(Rc::from(name)).or_default();
        if binding.read_only {
            return Err(Error::runtime(format!("Cannot modify constant {name}")));
        }
        update(binding);
        Ok(())
    }

    /// Binds a value in this scope, shadowing outer bindings.
    pub fn define(&self, name: &str, value: Expr) -> Result<()> {
        self.update_local(name, |binding| binding.value = Some(value))
    }

    /// Binds a function in this scope.
    pub fn define_function(&self, name: &str, function: Expr) -> Result<()> {
        self.update_local(name, |binding| binding.function = Some(function))
    }

    /// Binds a read-only value in this scope.
    pub fn define_constant(&self, name: &str, value: Expr) -> Result<()> {
        self.update_local(name, |binding| {
            binding.value = Some(value);
            binding.read_only = true;
        })
    }

    /// Assigns to the nearest existing value binding, or creates a global
    /// one in the root scope when `name` is bound nowhere.
    pub fn set(&self, name: &str, value: Expr) -> Result<()> {
        let mut current = self.clone();
        loop {
            let parent = {
                let mut scope = current.0.borrow_mut();
                if let Some(binding) = scope.bindings.get_mut(name)
                    && binding.value.is_some()
                {
                    if binding.read_only {
                        return Err(Error::runtime(format!("Cannot modify constant {name}")));
                    }
                    binding.value = Some(value);
                    return Ok(());
                }
                scope.parent.clone()
            };
            match parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        debug!(name, "creating global variable");
        current.define(name, value)
    }

    /// Installs a global function in the root scope.
    pub fn set_function(&self, name: &str, function: Expr) -> Result<()> {
        self.root().define_function(name, function)
    }

    /// Names bound in this scope and every enclosing one, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(self.clone());
        while let Some(env) = current {
            let scope = env.0.borrow();
            names.extend(scope.bindings.keys().map(|name| name.to_string()));
            current = scope.parent.clone();
        }
        names.sort();
        names.dedup();
        names
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values are left out: closures can reach back into this scope.
        let scope = self.0.borrow();
        let mut names: Vec<&str> = scope.bindings.keys().map(|name| &**name).collect();
        names.sort_unstable();
        f.debug_struct("Environment")
            .field("depth", &self.depth())
            .field("names", &names)
            .finish()
    }
}
