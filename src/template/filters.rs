//! The built-in filters templates can call as functions: `$escape(title)`
//! and `$urlencode(path)`. They are also reachable through the legacy
//! `$title_escaped` and `$path_urlencoded` spellings.

use super::env::{to_text, Binding, Environment};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

/// Characters left alone by [`urlencode_text`]: letters, digits, `_.-` and
/// the path separator.
const URL_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'/');

/// The filters every template can call.
pub const STANDARD_FILTERS: [Filter; 2] = [Filter::Escape, Filter::Urlencode];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Entity-escapes markup characters and both quote characters.
    Escape,

    /// Percent-encodes everything but unreserved characters and `/`.
    Urlencode,
}

impl Filter {
    pub fn from_name(name: &str) -> Option<Filter> {
        match name {
            "escape" => Some(Filter::Escape),
            "urlencode" => Some(Filter::Urlencode),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Filter::Escape => "escape",
            Filter::Urlencode => "urlencode",
        }
    }

    pub fn apply(self, s: &str) -> String {
        match self {
            Filter::Escape => escape_text(s),
            Filter::Urlencode => urlencode_text(s),
        }
    }

    /// Applies the filter to the first argument of a template call. A missing
    /// argument filters as empty text.
    pub fn call(self, args: &[Value]) -> String {
        match args.first() {
            Some(arg) => self.apply(&to_text(arg)),
            None => String::new(),
        }
    }

    /// Wraps the filter as a variadic template binding.
    pub fn binding<C>(self) -> Binding<C> {
        Binding::variadic(move |_, _, args| Ok(Value::String(self.call(args))))
    }
}

/// Binds the [`STANDARD_FILTERS`] in `env`.
pub fn install<C>(env: &mut Environment<C>) {
    for filter in STANDARD_FILTERS.iter() {
        env.insert(filter.name(), filter.binding());
    }
}

/// Escapes `&`, `<` and `>` as entities, `'` as `&apos;` and `"` as
/// `&quot;`. Empty input is returned unchanged.
pub fn escape_text(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Percent-encodes `s` for use in a URL path. Empty input is returned
/// unchanged.
pub fn urlencode_text(s: &str) -> String {
    utf8_percent_encode(s, URL_SAFE).to_string()
}
