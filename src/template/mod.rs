//! The template variable substitution engine. Templates are plain text in
//! which `$name`, `$name(args)`, `$(name)` and `$(name(args))` expressions are
//! replaced by values from an [`Environment`]:
//!
//! 1. [`matcher`] finds the expressions in one pass over the text.
//! 2. [`resolver`] turns each expression into replacement text, calling bound
//!    functions and the built-in [`filters`] where needed.
//! 3. [`parse`] stitches the replacements and the untouched text together.
//!
//! The engine knows nothing about blogs; the rendering context `C` handed to
//! bound functions is whatever the caller renders for.

pub mod env;
pub mod filters;
pub mod matcher;
pub mod resolver;

pub use env::{to_text, Binding, Environment};
pub use filters::{escape_text, urlencode_text, Filter, STANDARD_FILTERS};
pub use resolver::{commasplit, Replacer};

use serde::{Deserialize, Deserializer};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Expands every variable expression in `template`. Byte templates are
/// decoded with `encoding` first, invalid sequences becoming U+FFFD.
/// Escaped dollar signs (`\$`) are left escaped.
pub fn parse<'t, C>(
    context: &C,
    encoding: Encoding,
    env: &Environment<C>,
    template: impl Into<Source<'t>>,
) -> Result<String> {
    let text = match template.into() {
        Source::Text(text) => Cow::Borrowed(text),
        Source::Bytes(bytes) => encoding.decode(bytes),
    };

    let replacer = Replacer::new(context, env);
    let mut expanded = String::with_capacity(text.len());
    let mut last = 0;
    for expression in matcher::find_iter(&text) {
        expanded.push_str(&text[last..expression.start()]);
        expanded.push_str(&replacer.replace(expression.token())?);
        last = expression.end();
    }
    expanded.push_str(&text[last..]);
    Ok(expanded)
}

/// Template input: already-decoded text or raw bytes.
#[derive(Clone, Copy, Debug)]
pub enum Source<'t> {
    Text(&'t str),
    Bytes(&'t [u8]),
}

impl<'t> From<&'t str> for Source<'t> {
    fn from(text: &'t str) -> Source<'t> {
        Source::Text(text)
    }
}

impl<'t> From<&'t String> for Source<'t> {
    fn from(text: &'t String) -> Source<'t> {
        Source::Text(text)
    }
}

impl<'t> From<&'t [u8]> for Source<'t> {
    fn from(bytes: &'t [u8]) -> Source<'t> {
        Source::Bytes(bytes)
    }
}

impl<'t> From<&'t Vec<u8>> for Source<'t> {
    fn from(bytes: &'t Vec<u8>) -> Source<'t> {
        Source::Bytes(bytes)
    }
}

/// The character encoding of a blog's files and output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
    Ascii,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "iso-8859-1",
            Encoding::Ascii => "us-ascii",
        }
    }

    /// Decodes `bytes`, replacing undecodable input with U+FFFD.
    pub fn decode(self, bytes: &[u8]) -> Cow<'_, str> {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes),
            Encoding::Latin1 => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
            Encoding::Ascii => match std::str::from_utf8(bytes) {
                Ok(text) if text.is_ascii() => Cow::Borrowed(text),
                _ => Cow::Owned(
                    bytes
                        .iter()
                        .map(|&b| match b.is_ascii() {
                            true => char::from(b),
                            false => char::REPLACEMENT_CHARACTER,
                        })
                        .collect(),
                ),
            },
        }
    }

    /// Encodes `text`, replacing unrepresentable characters with `?`.
    pub fn encode(self, text: &str) -> Cow<'_, [u8]> {
        let limit = match self {
            Encoding::Utf8 => return Cow::Borrowed(text.as_bytes()),
            Encoding::Latin1 => 0xff,
            Encoding::Ascii => 0x7f,
        };
        if text.is_ascii() {
            return Cow::Borrowed(text.as_bytes());
        }
        Cow::Owned(
            text.chars()
                .map(|c| match c as u32 {
                    n if n <= limit => n as u8,
                    _ => b'?',
                })
                .collect(),
        )
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Utf8
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Encoding> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "utf8" => Ok(Encoding::Utf8),
            "iso88591" | "latin1" | "l1" | "cp819" => Ok(Encoding::Latin1),
            "ascii" | "usascii" => Ok(Encoding::Ascii),
            _ => Err(Error::UnknownEncoding(s.to_owned())),
        }
    }
}

impl<'de> Deserialize<'de> for Encoding {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Encoding, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error as _;
        String::deserialize(deserializer)?
            .parse::<Encoding>()
            .map_err(|e| D::Error::custom(format!("{}", e)))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while expanding templates.
#[derive(Debug)]
pub enum Error {
    /// Returned when a function bound in the environment fails.
    Call { name: String, err: Box<Error> },

    /// Returned by bound functions to report their own failures.
    Custom(String),

    /// Returned for encoding names we cannot decode.
    UnknownEncoding(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Call { name, err } => write!(f, "Calling `${}`: {}", name, err),
            Error::Custom(msg) => msg.fmt(f),
            Error::UnknownEncoding(name) => write!(f, "Unknown encoding `{}`", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Call { name: _, err } => Some(err.as_ref()),
            Error::Custom(_) => None,
            Error::UnknownEncoding(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::{json, Value};

    struct TestCase {
        template: &'static str,
        wanted: &'static str,
    }

    fn blog_env() -> Environment<()> {
        let mut env = Environment::new();
        env.insert("title", "a'b");
        env.insert("blog_title", "Notes");
        env.insert("path", "dev/rust");
        filters::install(&mut env);
        env
    }

    fn parse_test(test_case: &TestCase) -> Result<()> {
        let result = parse(&(), Encoding::Utf8, &blog_env(), test_case.template)?;
        assert_eq!(
            test_case.wanted, result,
            "wanted \"{}\"; found \"{}\"",
            test_case.wanted, result
        );
        Ok(())
    }

    #[test]
    fn test_parse_without_variables_is_identity() -> Result<()> {
        parse_test(&TestCase {
            template: "no variables (here), just 5 dollars",
            wanted: "no variables (here), just 5 dollars",
        })
    }

    #[test]
    fn test_parse_unknown_variable() -> Result<()> {
        parse_test(&TestCase {
            template: "[$nosuchkey]",
            wanted: "[]",
        })
    }

    #[test]
    fn test_parse_keeps_escaped_dollar() -> Result<()> {
        parse_test(&TestCase {
            template: r"\$title costs \$5",
            wanted: r"\$title costs \$5",
        })
    }

    #[test]
    fn test_parse_title_and_escape() -> Result<()> {
        parse_test(&TestCase {
            template: "$title: $escape(title)",
            wanted: "a'b: a&apos;b",
        })
    }

    #[test]
    fn test_parse_wrapped_forms() -> Result<()> {
        parse_test(&TestCase {
            template: "$(blog_title)s / $(urlencode(path))/",
            wanted: "Notess / dev/rust/",
        })
    }

    #[test]
    fn test_parse_legacy_suffixes() -> Result<()> {
        parse_test(&TestCase {
            template: "<a title=\"$title_escaped\" href=\"/$path_urlencoded\">",
            wanted: "<a title=\"a&apos;b\" href=\"/dev/rust\">",
        })
    }

    #[test]
    fn test_parse_variadic_receives_context() -> Result<()> {
        let mut env: Environment<String> = Environment::new();
        env.insert(
            "greet",
            Binding::variadic(|context: &String, _: &Environment<String>, args: &[Value]| {
                Ok(json!(format!("{} {}", context, to_text(&args[0]))))
            }),
        );
        let context = String::from("hello");
        assert_eq!(
            "hello world!",
            parse(&context, Encoding::Utf8, &env, "$greet('world')!")?
        );
        Ok(())
    }

    #[test]
    fn test_parse_bytes_with_replacement() -> Result<()> {
        let env = blog_env();
        let bytes: &[u8] = b"caf\xe9 $blog_title";
        assert_eq!("café Notes", parse(&(), Encoding::Latin1, &env, bytes)?);
        assert_eq!("caf\u{fffd} Notes", parse(&(), Encoding::Utf8, &env, bytes)?);
        Ok(())
    }

    #[test]
    fn test_parse_propagates_call_failures() {
        let mut env: Environment<()> = Environment::new();
        env.insert(
            "broken",
            Binding::thunk(|| Err(Error::Custom("no clock".to_owned()))),
        );
        assert!(parse(&(), Encoding::Utf8, &env, "it is $broken").is_err());
    }

    #[test]
    fn test_encoding_names() -> Result<()> {
        assert_eq!(Encoding::Utf8, "UTF-8".parse()?);
        assert_eq!(Encoding::Latin1, "iso-8859-1".parse()?);
        assert_eq!(Encoding::Latin1, "latin_1".parse()?);
        assert_eq!(Encoding::Ascii, "us-ascii".parse()?);
        assert!("ebcdic".parse::<Encoding>().is_err());
        Ok(())
    }

    #[test]
    fn test_encode_replaces_unrepresentable() {
        assert_eq!(&b"caf\xe9 ?"[..], &*Encoding::Latin1.encode("café €"));
        assert_eq!(&b"caf? ?"[..], &*Encoding::Ascii.encode("café €"));
        assert_eq!("café €".as_bytes(), &*Encoding::Utf8.encode("café €"));
    }
}
