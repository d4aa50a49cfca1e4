//! Callback chains are how plugins hook into the engine. A chain is an
//! ordered list of [`Handler`]s registered under a name (`filelist`,
//! `story`, `preformat`, ...) in a [`Registry`]. Dispatching a chain calls
//! each handler in registration order with the current input; a *mapping*
//! function derives the next input from the last output, a *done* predicate
//! can stop the chain early, and a *default* function runs when no handler
//! satisfied the predicate.
//!
//! Handlers receive `&mut I`, so a handler may also edit the input it is
//! given; with [`pass_original`] the next handler sees those edits.

use log::{trace, warn};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// The signature of a handler function.
pub type HandlerFn<I, O> = dyn Fn(&mut I) -> Result<O, HandlerError>;

/// A named function registered on a chain. The name is what
/// [`Dispatch::exclude`] matches against; by convention it is the name of the
/// plugin that registered the handler.
pub struct Handler<I, O> {
    name: String,
    func: Rc<HandlerFn<I, O>>,
}

impl<I, O> Handler<I, O> {
    pub fn new<F>(name: impl Into<String>, func: F) -> Handler<I, O>
    where
        F: Fn(&mut I) -> Result<O, HandlerError> + 'static,
    {
        Handler {
            name: name.into(),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, input: &mut I) -> Result<O, HandlerError> {
        (self.func)(input)
    }
}

impl<I, O> Clone for Handler<I, O> {
    fn clone(&self) -> Self {
        Handler {
            name: self.name.clone(),
            func: Rc::clone(&self.func),
        }
    }
}

impl<I, O> fmt::Debug for Handler<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}

/// Mapping that hands every handler the same input.
pub fn pass_original<I, O>(_input: &mut I, _output: &O) {}

/// Mapping that makes each handler's output the next handler's input.
pub fn pass_mutated<T: Clone>(input: &mut T, output: &T) {
    *input = output.clone();
}

/// Predicate that lets every handler run.
pub fn never_done<O>(_output: &O) -> bool {
    false
}

/// Predicate that stops at the first truthy output.
pub fn done_when_true<O: Truthy>(output: &O) -> bool {
    output.is_truthy()
}

/// Values that can act as a "stop here" sentinel for [`done_when_true`].
pub trait Truthy {
    fn is_truthy(&self) -> bool;
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

impl<T> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.is_some()
    }
}

impl Truthy for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Truthy for Vec<T> {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }
}

/// How a chain run ended.
enum Outcome<O> {
    /// A handler's output satisfied the done predicate.
    Done(O),

    /// Every handler ran; holds the last output, if any handler ran at all.
    Exhausted(Option<O>),
}

fn execute<I, O, M, D>(
    handlers: &[Handler<I, O>],
    input: &mut I,
    mapping: &M,
    done: &D,
    exclude: &[&str],
) -> Result<Outcome<O>, HandlerError>
where
    M: Fn(&mut I, &O),
    D: Fn(&O) -> bool,
{
    let mut output = None;
    for handler in handlers.iter().filter(|h| !exclude.contains(&h.name())) {
        trace!("calling handler `{}`", handler.name());
        let result = handler.call(input)?;
        if done(&result) {
            return Ok(Outcome::Done(result));
        }
        mapping(input, &result);
        output = Some(result);
    }
    Ok(Outcome::Exhausted(output))
}

/// Runs `handlers` in order over `input`.
///
/// After each handler the `done` predicate is checked against its output;
/// the first output satisfying it is returned immediately. Otherwise the
/// next input is derived through `mapping`. When the chain is exhausted the
/// `default` function (if any) is applied to the final input, else the last
/// output is returned (`None` for an empty chain). Handlers named in
/// `exclude` are skipped. Handler failures are returned as they are.
pub fn run_callback<I, O, M, D, F>(
    handlers: &[Handler<I, O>],
    input: &mut I,
    mapping: M,
    done: D,
    default: Option<F>,
    exclude: &[&str],
) -> Result<Option<O>, HandlerError>
where
    M: Fn(&mut I, &O),
    D: Fn(&O) -> bool,
    F: FnOnce(&mut I) -> O,
{
    match execute(handlers, input, &mapping, &done, exclude)? {
        Outcome::Done(output) => Ok(Some(output)),
        Outcome::Exhausted(output) => Ok(match default {
            Some(default) => Some(default(input)),
            None => output,
        }),
    }
}

/// A chain run being configured; see [`Registry::dispatch`]. Defaults to
/// [`pass_original`], [`never_done`] and no exclusions.
pub struct Dispatch<'r, 'i, I, O, M, D> {
    chain: &'r str,
    handlers: &'r [Handler<I, O>],
    input: &'i mut I,
    mapping: M,
    done: D,
    exclude: &'r [&'r str],
}

impl<'r, 'i, I, O, M, D> Dispatch<'r, 'i, I, O, M, D>
where
    M: Fn(&mut I, &O),
    D: Fn(&O) -> bool,
{
    pub fn mapping<M2>(self, mapping: M2) -> Dispatch<'r, 'i, I, O, M2, D>
    where
        M2: Fn(&mut I, &O),
    {
        Dispatch {
            chain: self.chain,
            handlers: self.handlers,
            input: self.input,
            mapping,
            done: self.done,
            exclude: self.exclude,
        }
    }

    pub fn done<D2>(self, done: D2) -> Dispatch<'r, 'i, I, O, M, D2>
    where
        D2: Fn(&O) -> bool,
    {
        Dispatch {
            chain: self.chain,
            handlers: self.handlers,
            input: self.input,
            mapping: self.mapping,
            done,
            exclude: self.exclude,
        }
    }

    /// Skips the handlers registered under any of `names`.
    pub fn exclude(mut self, names: &'r [&'r str]) -> Self {
        self.exclude = names;
        self
    }

    /// Runs the chain without a default function.
    pub fn run(self) -> Result<Option<O>, HandlerError> {
        trace!("running chain `{}` ({} handlers)", self.chain, self.handlers.len());
        match execute(self.handlers, self.input, &self.mapping, &self.done, self.exclude)? {
            Outcome::Done(output) => Ok(Some(output)),
            Outcome::Exhausted(output) => Ok(output),
        }
    }

    /// Runs the chain, falling back to `default` over the final input when no
    /// handler satisfied the done predicate.
    pub fn run_or_else<F>(self, default: F) -> Result<O, HandlerError>
    where
        F: FnOnce(&mut I) -> O,
    {
        trace!("running chain `{}` ({} handlers)", self.chain, self.handlers.len());
        match execute(self.handlers, self.input, &self.mapping, &self.done, self.exclude)? {
            Outcome::Done(output) => Ok(output),
            Outcome::Exhausted(_) => Ok(default(self.input)),
        }
    }
}

/// The table of callback chains, keyed by chain name. Each chain carries one
/// input and one output type, fixed by its first registration.
#[derive(Default)]
pub struct Registry {
    chains: HashMap<String, Box<dyn Any>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Appends `handler` to `chain`.
    pub fn register<I: 'static, O: 'static>(
        &mut self,
        chain: &str,
        handler: Handler<I, O>,
    ) -> Result<(), RegistryError> {
        let handlers = self
            .chains
            .entry(chain.to_owned())
            .or_insert_with(|| Box::new(Vec::<Handler<I, O>>::new()));
        match handlers.downcast_mut::<Vec<Handler<I, O>>>() {
            Some(handlers) => {
                trace!("registered `{}` on chain `{}`", handler.name(), chain);
                handlers.push(handler);
                Ok(())
            }
            None => Err(RegistryError::TypeMismatch {
                chain: chain.to_owned(),
                handler: handler.name().to_owned(),
            }),
        }
    }

    /// Returns the handlers of `chain`. Unknown chains are empty.
    pub fn chain<I: 'static, O: 'static>(&self, chain: &str) -> &[Handler<I, O>] {
        match self.chains.get(chain) {
            None => &[],
            Some(handlers) => match handlers.downcast_ref::<Vec<Handler<I, O>>>() {
                Some(handlers) => handlers,
                None => {
                    warn!("chain `{}` was registered with other types; skipping it", chain);
                    &[]
                }
            },
        }
    }

    pub fn contains(&self, chain: &str) -> bool {
        self.chains.contains_key(chain)
    }

    /// The names of all chains with at least one registration, sorted.
    pub fn chain_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Starts a run of `chain` over `input`.
    #[allow(clippy::type_complexity)]
    pub fn dispatch<'r, 'i, I: 'static, O: 'static>(
        &'r self,
        chain: &'r str,
        input: &'i mut I,
    ) -> Dispatch<'r, 'i, I, O, fn(&mut I, &O), fn(&O) -> bool> {
        Dispatch {
            chain,
            handlers: self.chain(chain),
            input,
            mapping: pass_original,
            done: never_done,
            exclude: &[],
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Registry")
            .field("chains", &self.chain_names())
            .finish()
    }
}

/// Returned by a handler that failed.
#[derive(Debug)]
pub struct HandlerError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> HandlerError {
        HandlerError {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<E>(message: impl Into<String>, source: E) -> HandlerError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HandlerError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => self.message.fmt(f),
        }
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for HandlerError {
    /// Converts [`std::io::Error`]s into [`HandlerError`]. This allows
    /// handlers to use the `?` operator on I/O.
    fn from(err: std::io::Error) -> HandlerError {
        HandlerError::with_source("I/O error", err)
    }
}

impl From<crate::template::Error> for HandlerError {
    /// Converts template errors into [`HandlerError`]. This allows handlers
    /// to use the `?` operator when expanding templates.
    fn from(err: crate::template::Error) -> HandlerError {
        HandlerError::with_source("template error", err)
    }
}

/// Errors registering handlers.
#[derive(Debug)]
pub enum RegistryError {
    /// Returned when a handler's input or output type differs from the type
    /// the chain was first registered with.
    TypeMismatch { chain: String, handler: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegistryError::TypeMismatch { chain, handler } => write!(
                f,
                "Handler `{}` does not match the types of chain `{}`",
                handler, chain
            ),
        }
    }
}

impl std::error::Error for RegistryError {}
