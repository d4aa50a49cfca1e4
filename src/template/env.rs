//! The variable environment a template is expanded against. Each name is
//! bound to a [`Binding`]: either a plain value or one of the three callable
//! shapes templates can invoke. Environments are built fresh for every
//! expansion by layering configuration, request data and entry fields (later
//! layers win).

use super::Error;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A callable invoked with no arguments, e.g. `$now`.
pub type ThunkFn = dyn Fn() -> Result<Value, Error>;

/// A callable invoked with the environment and the rendering context when it
/// is referenced without arguments, e.g. `$entry_count`.
pub type ContextFn<C> = dyn Fn(&Environment<C>, &C) -> Result<Value, Error>;

/// A callable invoked with the rendering context, the environment and the
/// coerced argument list, e.g. `$link(title, "/archive")`.
pub type VariadicFn<C> = dyn Fn(&C, &Environment<C>, &[Value]) -> Result<Value, Error>;

/// The value bound to a template variable. `C` is the rendering context
/// handed to callables (the request, when rendering a blog).
pub enum Binding<C> {
    /// A plain value; expands to its text form.
    Literal(Value),

    /// A zero-argument callable.
    Thunk(Rc<ThunkFn>),

    /// A callable receiving `(environment, context)`.
    Context(Rc<ContextFn<C>>),

    /// A callable receiving `(context, environment, args)`.
    Variadic(Rc<VariadicFn<C>>),
}

impl<C> Binding<C> {
    pub fn literal(value: impl Into<Value>) -> Binding<C> {
        Binding::Literal(value.into())
    }

    pub fn thunk<F>(f: F) -> Binding<C>
    where
        F: Fn() -> Result<Value, Error> + 'static,
    {
        Binding::Thunk(Rc::new(f))
    }

    pub fn context<F>(f: F) -> Binding<C>
    where
        F: Fn(&Environment<C>, &C) -> Result<Value, Error> + 'static,
    {
        Binding::Context(Rc::new(f))
    }

    pub fn variadic<F>(f: F) -> Binding<C>
    where
        F: Fn(&C, &Environment<C>, &[Value]) -> Result<Value, Error> + 'static,
    {
        Binding::Variadic(Rc::new(f))
    }

    pub fn is_callable(&self) -> bool {
        !matches!(self, Binding::Literal(_))
    }

    /// Returns the bound value for [`Binding::Literal`]s.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Binding::Literal(value) => Some(value),
            _ => None,
        }
    }
}

impl<C> Clone for Binding<C> {
    fn clone(&self) -> Self {
        match self {
            Binding::Literal(value) => Binding::Literal(value.clone()),
            Binding::Thunk(f) => Binding::Thunk(Rc::clone(f)),
            Binding::Context(f) => Binding::Context(Rc::clone(f)),
            Binding::Variadic(f) => Binding::Variadic(Rc::clone(f)),
        }
    }
}

impl<C> fmt::Debug for Binding<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Binding::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Binding::Thunk(_) => f.write_str("Thunk(..)"),
            Binding::Context(_) => f.write_str("Context(..)"),
            Binding::Variadic(_) => f.write_str("Variadic(..)"),
        }
    }
}

impl<C> From<Value> for Binding<C> {
    fn from(value: Value) -> Binding<C> {
        Binding::Literal(value)
    }
}

impl<C> From<&str> for Binding<C> {
    fn from(value: &str) -> Binding<C> {
        Binding::Literal(Value::String(value.to_owned()))
    }
}

impl<C> From<String> for Binding<C> {
    fn from(value: String) -> Binding<C> {
        Binding::Literal(Value::String(value))
    }
}

impl<C> From<i64> for Binding<C> {
    fn from(value: i64) -> Binding<C> {
        Binding::Literal(Value::from(value))
    }
}

/// A mapping from variable names to [`Binding`]s.
pub struct Environment<C> {
    vars: HashMap<String, Binding<C>>,
}

impl<C> Environment<C> {
    pub fn new() -> Environment<C> {
        Environment {
            vars: HashMap::new(),
        }
    }

    /// Binds `key`, replacing any earlier binding.
    pub fn insert(&mut self, key: impl Into<String>, binding: impl Into<Binding<C>>) {
        self.vars.insert(key.into(), binding.into());
    }

    pub fn get(&self, key: &str) -> Option<&Binding<C>> {
        self.vars.get(key)
    }

    /// Returns the value of `key` if it is bound to a plain value.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.get(key).and_then(Binding::as_value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Binding<C>> {
        self.vars.remove(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Layers `vars` on top of the current bindings.
    pub fn merge<K, B>(&mut self, vars: impl IntoIterator<Item = (K, B)>)
    where
        K: Into<String>,
        B: Into<Binding<C>>,
    {
        for (key, binding) in vars {
            self.insert(key, binding);
        }
    }
}

impl<C> Default for Environment<C> {
    fn default() -> Self {
        Environment::new()
    }
}

impl<C> Clone for Environment<C> {
    fn clone(&self) -> Self {
        Environment {
            vars: self.vars.clone(),
        }
    }
}

impl<C> fmt::Debug for Environment<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.vars.iter()).finish()
    }
}

impl<C, K: Into<String>, B: Into<Binding<C>>> std::iter::FromIterator<(K, B)> for Environment<C> {
    fn from_iter<I: IntoIterator<Item = (K, B)>>(iter: I) -> Self {
        let mut env = Environment::new();
        env.merge(iter);
        env
    }
}

/// Converts an expanded value into the text spliced into the template.
/// Strings are used as-is, `null` is empty, numbers and booleans use their
/// display form and lists or mappings are rendered as JSON.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
