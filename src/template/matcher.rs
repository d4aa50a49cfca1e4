//! Finds variable expressions in template text.
//!
//! An expression is `$name`, `$name(args)`, `$(name)` or `$(name(args))`.
//! Names are made of word characters, hyphens and `::` followed by a word
//! character. The argument group is matched non-greedily, may not span lines
//! and ends at the first `)` that is not preceded by a backslash; its content
//! is opaque here and split later by the resolver. A `$` preceded by a
//! backslash never starts an expression.

use once_cell::sync::Lazy;
use regex::{CaptureMatches, Regex};

// The escaped-dollar alternative consumes `\$` so that the dollar sign cannot
// start a token; those matches are skipped by `Expressions`.
static VAR_REGEXP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \\\$
        |
        \$(?P<token>
            (?:\w|-|::\w)+
            (?:\((?:[^\\)\n]|\\+\)|\\+[^\\)\n])*?\))?
          |
            \(
            (?:\w|-|::\w)+
            (?:\((?:[^\\)\n]|\\+\)|\\+[^\\)\n])*?\))?
            \)
        )",
    )
    .unwrap()
});

/// A variable expression found in a template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Expression<'t> {
    token: &'t str,
    start: usize,
    end: usize,
}

impl<'t> Expression<'t> {
    /// The matched text without the leading `$`, e.g. `(title)` or
    /// `escape(title)`.
    pub fn token(&self) -> &'t str {
        self.token
    }

    /// Byte offset of the `$` in the template.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Byte offset just past the expression.
    pub fn end(&self) -> usize {
        self.end
    }

    /// The variable or function name.
    pub fn name(&self) -> &'t str {
        split_call(strip_wrapper(self.token)).0
    }

    /// The raw argument text, if the expression is a call.
    pub fn args(&self) -> Option<&'t str> {
        split_call(strip_wrapper(self.token)).1
    }
}

/// Iterator over the [`Expression`]s of a template, left to right.
pub struct Expressions<'t> {
    captures: CaptureMatches<'static, 't>,
}

impl<'t> Iterator for Expressions<'t> {
    type Item = Expression<'t>;

    fn next(&mut self) -> Option<Expression<'t>> {
        for captures in &mut self.captures {
            if let (Some(whole), Some(token)) = (captures.get(0), captures.name("token")) {
                return Some(Expression {
                    token: token.as_str(),
                    start: whole.start(),
                    end: whole.end(),
                });
            }
        }
        None
    }
}

/// Returns the expressions of `text` lazily, without overlap.
pub fn find_iter(text: &str) -> Expressions<'_> {
    Expressions {
        captures: VAR_REGEXP.captures_iter(text),
    }
}

/// Strips the parentheses of the `$(token)` form.
pub fn strip_wrapper(token: &str) -> &str {
    if token.len() >= 2 && token.starts_with('(') && token.ends_with(')') {
        &token[1..token.len() - 1]
    } else {
        token
    }
}

/// Splits `name(args)` into the name and the text between the first `(` and
/// the last `)`. Tokens without a call group have no arguments.
pub fn split_call(token: &str) -> (&str, Option<&str>) {
    match (token.find('('), token.rfind(')')) {
        (Some(open), Some(close)) if close > open => (&token[..open], Some(&token[open + 1..close])),
        _ => (token, None),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tokens(text: &str) -> Vec<&str> {
        find_iter(text).map(|e| e.token()).collect()
    }

    #[test]
    fn test_plain_and_wrapped_names() {
        assert_eq!(
            vec!["title", "(title)", "foo::bar", "blog-title"],
            tokens("$title $(title) $foo::bar $blog-title")
        );
    }

    #[test]
    fn test_call_forms() {
        let found: Vec<(&str, Option<&str>)> = find_iter("$escape(title) and $(urlencode(path))")
            .map(|e| (e.name(), e.args()))
            .collect();
        assert_eq!(
            vec![("escape", Some("title")), ("urlencode", Some("path"))],
            found
        );
    }

    #[test]
    fn test_escaped_dollar_is_not_a_token() {
        assert!(tokens(r"\$foo costs \$5").is_empty());
        assert_eq!(vec!["bar"], tokens(r"\$foo $bar"));
    }

    #[test]
    fn test_escaped_paren_does_not_close_arguments() {
        assert_eq!(vec![r"f(a\) b)"], tokens(r"$f(a\) b) tail"));
    }

    #[test]
    fn test_arguments_are_not_greedy() {
        assert_eq!(vec!["f(a)", "g(b)"], tokens("$f(a) x) $g(b)"));
    }

    #[test]
    fn test_arguments_do_not_span_lines() {
        assert_eq!(vec!["f"], tokens("$f(a\nb)"));
    }

    #[test]
    fn test_dangling_dollar() {
        assert!(tokens("costs 5$ or $ 6").is_empty());
    }

    #[test]
    fn test_offsets() {
        let e = find_iter("ab $cd ef").next();
        assert_eq!(Some((3, 6)), e.map(|e| (e.start(), e.end())));
    }

    #[test]
    fn test_split_call() {
        assert_eq!(("f", Some("a, (b)")), split_call("f(a, (b))"));
        assert_eq!(("f", Some("")), split_call("f()"));
        assert_eq!(("title", None), split_call("title"));
    }
}
