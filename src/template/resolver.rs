//! Resolves a matched expression to the text that replaces it.

use super::env::{to_text, Binding, Environment};
use super::filters::Filter;
use super::matcher::{split_call, strip_wrapper};
use super::{Error, Result};
use log::trace;
use serde_json::Value;

/// Resolves expression tokens against an [`Environment`] on behalf of a
/// rendering context `C`.
pub struct Replacer<'a, C> {
    context: &'a C,
    env: &'a Environment<C>,
}

impl<'a, C> Replacer<'a, C> {
    pub fn new(context: &'a C, env: &'a Environment<C>) -> Replacer<'a, C> {
        Replacer { context, env }
    }

    /// Returns the replacement text for `token` (an expression without its
    /// leading `$`). Unknown names expand to the empty string; failures of
    /// bound functions, and arguments given to bindings that take none, are
    /// returned as [`Error::Call`].
    pub fn replace(&self, token: &str) -> Result<String> {
        let token = strip_wrapper(token);
        let (name, args) = match legacy_alias(token) {
            Some(call) => call,
            None => split_call(token),
        };
        // `$name()` behaves like a bare reference.
        let args = args.filter(|args| !args.is_empty());

        let value = match self.env.get(name) {
            Some(binding) => self.evaluate(name, binding, args)?,
            None => match Filter::from_name(name) {
                Some(filter) => Value::String(filter.call(&self.arguments(args)?)),
                None => {
                    trace!("`{}` is not bound; expanding to nothing", name);
                    return Ok(String::new());
                }
            },
        };
        Ok(to_text(&value))
    }

    fn evaluate(&self, name: &str, binding: &Binding<C>, args: Option<&str>) -> Result<Value> {
        let result = match (binding, args) {
            (Binding::Literal(value), _) => return Ok(value.clone()),
            (Binding::Variadic(f), args) => {
                let args = self.arguments(args)?;
                f(self.context, self.env, &args)
            }
            (Binding::Thunk(_), Some(args)) | (Binding::Context(_), Some(args)) => {
                Err(Error::Custom(format!("takes no arguments; given `{}`", args)))
            }
            (Binding::Thunk(f), None) => f(),
            (Binding::Context(f), None) => f(self.env, self.context),
        };
        result.map_err(|err| Error::Call {
            name: name.to_owned(),
            err: Box::new(err),
        })
    }

    fn arguments(&self, args: Option<&str>) -> Result<Vec<Value>> {
        commasplit(args)
            .iter()
            .map(|arg| self.coerce(arg))
            .collect()
    }

    /// Turns one raw argument into a value: digit strings become integers,
    /// quoted text loses its quotes, names (optionally `$`-prefixed) bound in
    /// the environment become their values and anything else is literal text.
    fn coerce(&self, raw: &str) -> Result<Value> {
        let arg = raw.trim();
        if !arg.is_empty() && arg.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = arg.parse::<u64>() {
                return Ok(Value::from(n));
            }
        }
        if arg.starts_with('\'') || arg.starts_with('"') {
            return Ok(Value::String(unquote(arg).to_owned()));
        }
        if let Some(binding) = self.env.get(arg) {
            return self.evaluate(arg, binding, None);
        }
        if let Some(key) = arg.strip_prefix('$') {
            if let Some(binding) = self.env.get(key) {
                return self.evaluate(key, binding, None);
            }
        }
        Ok(Value::String(arg.to_owned()))
    }
}

/// Rewrites `name_escaped` to `escape(name)` and `name_urlencoded` to
/// `urlencode(name)`.
fn legacy_alias(token: &str) -> Option<(&str, Option<&str>)> {
    if let Some(name) = token.strip_suffix("_escaped") {
        Some(("escape", Some(name)))
    } else if let Some(name) = token.strip_suffix("_urlencoded") {
        Some(("urlencode", Some(name)))
    } else {
        None
    }
}

/// Drops the first character and, if any remain, the last.
fn unquote(arg: &str) -> &str {
    let inner = &arg[1..];
    match inner.char_indices().last() {
        Some((i, _)) => &inner[..i],
        None => inner,
    }
}

/// Splits an argument list on commas that are not inside a quoted string.
/// Quotes and surrounding spaces are kept. `None` splits into nothing and the
/// empty string into a single empty argument.
pub fn commasplit(s: Option<&str>) -> Vec<String> {
    let s = match s {
        None => return Vec::new(),
        Some("") => return vec![String::new()],
        Some(s) => s,
    };

    let mut quote: Option<char> = None;
    let mut current = String::new();
    let mut parts = Vec::new();
    for c in s.chars() {
        if Some(c) == quote {
            quote = None;
            current.push(c);
        } else if c == '\'' || c == '"' {
            quote = Some(c);
            current.push(c);
        } else if quote.is_none() && c == ',' {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn env() -> Environment<()> {
        let mut env = Environment::new();
        env.insert("title", "a'b");
        env.insert("path", "dev/a b");
        env.insert("count", 3);
        env
    }

    fn replace(env: &Environment<()>, token: &str) -> String {
        match Replacer::new(&(), env).replace(token) {
            Ok(text) => text,
            Err(err) => panic!("replacing `{}`: {}", token, err),
        }
    }

    #[test]
    fn test_commasplit() {
        assert_eq!(Vec::<String>::new(), commasplit(None));
        assert_eq!(vec![""], commasplit(Some("")));
        assert_eq!(vec!["a"], commasplit(Some("a")));
        assert_eq!(vec!["a", " b", " c"], commasplit(Some("a, b, c")));
        // Quotes are kept here; `coerce` strips them (see DESIGN.md).
        assert_eq!(vec!["'a'", " 'b, c'"], commasplit(Some("'a', 'b, c'")));
        assert_eq!(vec!["'a'", " \"b, c\""], commasplit(Some("'a', \"b, c\"")));
        assert_eq!(vec!["a", ""], commasplit(Some("a,,")));
    }

    #[test]
    fn test_plain_values() {
        let env = env();
        assert_eq!("a'b", replace(&env, "title"));
        assert_eq!("a'b", replace(&env, "(title)"));
        assert_eq!("3", replace(&env, "count"));
        assert_eq!("", replace(&env, "missing"));
        assert_eq!("", replace(&env, "missing(1, 2)"));
    }

    #[test]
    fn test_legacy_suffixes() {
        let env = env();
        assert_eq!("a&apos;b", replace(&env, "title_escaped"));
        assert_eq!("dev/a%20b", replace(&env, "path_urlencoded"));
        // The rewrite to `escape(missing)` passes the unbound name as text.
        assert_eq!("missing", replace(&env, "missing_escaped"));
        assert_eq!("a%27b", replace(&env, "title_urlencoded"));
        assert_eq!("dev/a b", replace(&env, "(path_escaped)"));
    }

    #[test]
    fn test_builtin_filters_without_binding() {
        let env = env();
        assert_eq!("a&apos;b", replace(&env, "escape(title)"));
        assert_eq!("x%3Dy", replace(&env, "urlencode('x=y')"));
        assert_eq!("", replace(&env, "escape()"));
    }

    #[test]
    fn test_environment_overrides_filters() {
        let mut env = env();
        env.insert("escape", Binding::variadic(|_, _, _| Ok(json!("mine"))));
        assert_eq!("mine", replace(&env, "escape(title)"));
    }

    #[test]
    fn test_argument_coercion() {
        let mut env = env();
        env.insert(
            "show",
            Binding::variadic(|_, _, args: &[Value]| {
                let kinds: Vec<String> = args
                    .iter()
                    .map(|arg| match arg {
                        Value::Number(n) => format!("#{}", n),
                        other => to_text(other),
                    })
                    .collect();
                Ok(Value::String(kinds.join("|")))
            }),
        );
        assert_eq!(
            "#12|x, y|a'b|a'b|other",
            replace(&env, r#"show(12, "x, y", title, $title, other)"#)
        );
    }

    #[test]
    fn test_callable_arities() {
        let mut env = env();
        env.insert("now", Binding::thunk(|| Ok(json!("noon"))));
        env.insert(
            "size",
            Binding::context(|env: &Environment<()>, _: &()| Ok(json!(env.len()))),
        );
        assert_eq!("noon", replace(&env, "now"));
        assert_eq!("noon", replace(&env, "now()"));
        assert_eq!("5", replace(&env, "size"));
    }

    #[test]
    fn test_callable_arguments_are_expanded() {
        let mut env = env();
        env.insert("now", Binding::thunk(|| Ok(json!("noon"))));
        assert_eq!("noon", replace(&env, "escape(now)"));
    }

    #[test]
    fn test_arguments_to_argumentless_bindings_fail() {
        let mut env = env();
        env.insert("now", Binding::thunk(|| Ok(json!("noon"))));
        env.insert(
            "size",
            Binding::context(|env: &Environment<()>, _: &()| Ok(json!(env.len()))),
        );
        for token in &["now(1)", "size('a')", "(now(x, y))"] {
            match Replacer::new(&(), &env).replace(token) {
                Err(Error::Call { .. }) => {}
                other => panic!("wanted a call error for `{}`; found {:?}", token, other),
            }
        }
    }

    #[test]
    fn test_failures_propagate() {
        let mut env = env();
        env.insert(
            "broken",
            Binding::thunk(|| Err(Error::Custom("no clock".to_owned()))),
        );
        match Replacer::new(&(), &env).replace("broken") {
            Err(Error::Call { name, .. }) => assert_eq!("broken", name),
            other => panic!("wanted a call error; found {:?}", other),
        }
    }
}
