//! The `genericwiki` plugin formats entries written in a small wiki markup:
//!
//! * `[http://example.org label]` is a labelled link; `mailto:` and `news:`
//!   addresses work too
//! * bare URLs become links
//! * `WikiWords` link to the wiki at `genericwiki_baseurl`, when set
//! * `'''strong'''`, `''emphasis''` and `----` rules
//! * blank lines separate paragraphs
//!
//! Entries opt in with `#parser genericwiki`.

use super::Plugin;
use crate::callback::{Handler, Registry, RegistryError};
use crate::entry::Preformat;
use crate::request::Request;
use log::warn;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const NAME: &str = "genericwiki";

/// The configuration key naming the URL prefix of WikiWord links.
pub const BASEURL_KEY: &str = "genericwiki_baseurl";

const WIKI_NAME: &str = r"\b((?:[A-Z]+[a-z]+){2,})\b";
const MAIL_URL: &str = r#"mailto:["\-_.\w]+@[\-_.\w]+\w"#;
const NEWS_URL: &str = r"news:(?:\w+\.)+\w+";
const FILE_URL: &str = r"(?:http|https|file|ftp):[/-_.\w-]+[/\w][?&+=%\w/-_.#]*";

static LABELLED_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\[({}|{}|{})\s+(.+?)\]", FILE_URL, MAIL_URL, NEWS_URL)).unwrap()
});
static BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("(?:{}|{}|{})", NEWS_URL, FILE_URL, MAIL_URL)).unwrap());
static WIKI_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(WIKI_NAME).unwrap());
static STRONG: Lazy<Regex> = Lazy::new(|| Regex::new(r"'''(.*?)'''").unwrap());
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"''(.*?)''").unwrap());
static RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n-{4,}\n").unwrap());
static PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

pub struct GenericWiki;

impl Plugin for GenericWiki {
    fn name(&self) -> &str {
        NAME
    }

    fn register(&self, registry: &mut Registry) -> Result<(), RegistryError> {
        registry.register(
            "preformat",
            Handler::new(NAME, |args: &mut Preformat| {
                if args.parser != NAME {
                    return Ok(None);
                }
                let config = args.request.config();
                let baseurl = config.extra.get(BASEURL_KEY).and_then(|v| v.as_str());
                Ok(Some(parse(&args.story.concat(), baseurl)))
            }),
        )
    }

    fn verify_installation(&self, request: &Request) -> bool {
        match request.config().extra.get(BASEURL_KEY) {
            Some(value) if value.as_str().is_none() => {
                warn!("`{}` must be a URL prefix", BASEURL_KEY);
                false
            }
            _ => true,
        }
    }
}

/// Converts wiki text to HTML. WikiWords are only linked when `baseurl` is
/// given.
pub fn parse(text: &str, baseurl: Option<&str>) -> String {
    let text = LABELLED_LINK.replace_all(text, r#"<a href="$1">$2</a>"#);

    // URLs right after a quote are already inside a link.
    let text = replace_unless_after(&BARE_URL, &text, &['"'], |url| {
        format!(r#"<a href="{0}">{0}</a>"#, url)
    });

    let text = match baseurl {
        Some(baseurl) => replace_unless_after(&WIKI_WORD, &text, &['?', '/', '='], |word| {
            format!(r#"<a href="{}{1}">{1}</a>"#, baseurl, word)
        }),
        None => text,
    };

    let text = STRONG.replace_all(&text, "<strong>$1</strong>");
    let text = EMPHASIS.replace_all(&text, "<em>$1</em>");
    let text = RULE.replace_all(&text, "<hr>");
    let text = PARAGRAPH.replace_all(&text, "</p>\n<p>");
    format!("<p>{}</p>", text)
}

/// Replaces the matches of `re` in `text` with `replace(match)`, leaving
/// matches that directly follow one of `not_after` alone.
fn replace_unless_after<F>(re: &Regex, text: &str, not_after: &[char], replace: F) -> String
where
    F: Fn(&str) -> String,
{
    re.replace_all(text, |caps: &Captures| {
        let found = &caps[0];
        let start = caps.get(0).map_or(0, |m| m.start());
        match text[..start].chars().next_back() {
            Some(c) if not_after.contains(&c) => found.to_owned(),
            _ => replace(found),
        }
    })
    .into_owned()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::entry::{default_extensions, parse_entry};
    use crate::request::{http_for, Data};
    use std::rc::Rc;

    struct TestCase {
        input: &'static str,
        baseurl: Option<&'static str>,
        wanted: &'static str,
    }

    #[test]
    fn test_parse() {
        for test_case in &[
            TestCase {
                input: "plain text",
                baseurl: None,
                wanted: "<p>plain text</p>",
            },
            TestCase {
                input: "a '''big''' and ''small'' word",
                baseurl: None,
                wanted: "<p>a <strong>big</strong> and <em>small</em> word</p>",
            },
            TestCase {
                input: "one\n\n\ntwo",
                baseurl: None,
                wanted: "<p>one</p>\n<p>two</p>",
            },
            TestCase {
                input: "above\n----\nbelow",
                baseurl: None,
                wanted: "<p>above<hr>below</p>",
            },
            TestCase {
                input: "see [http://example.org/a?b=c the site]",
                baseurl: None,
                wanted: "<p>see <a href=\"http://example.org/a?b=c\">the site</a></p>",
            },
            TestCase {
                input: "at http://example.org/x now",
                baseurl: None,
                wanted: "<p>at <a href=\"http://example.org/x\">http://example.org/x</a> now</p>",
            },
            TestCase {
                input: "write mailto:me@example.org",
                baseurl: None,
                wanted: "<p>write <a href=\"mailto:me@example.org\">mailto:me@example.org</a></p>",
            },
            TestCase {
                input: "WikiWiki is a wiki",
                baseurl: None,
                wanted: "<p>WikiWiki is a wiki</p>",
            },
            TestCase {
                input: "WikiWiki is a wiki",
                baseurl: Some("http://wiki.example.org/"),
                wanted: "<p><a href=\"http://wiki.example.org/WikiWiki\">WikiWiki</a> is a wiki</p>",
            },
            TestCase {
                input: "http://example.org/FrontPage",
                baseurl: Some("http://wiki.example.org/"),
                wanted: "<p><a href=\"http://example.org/FrontPage\">http://example.org/FrontPage</a></p>",
            },
        ] {
            let found = parse(test_case.input, test_case.baseurl);
            assert_eq!(
                test_case.wanted, found,
                "wanted \"{}\"; found \"{}\"",
                test_case.wanted, found
            );
        }
    }

    #[test]
    fn test_preformat_uses_configured_baseurl() -> Result<(), Box<dyn std::error::Error>> {
        let mut registry = Registry::new();
        GenericWiki.register(&mut registry)?;
        let config = Config::from_yaml("datadir: /blog\ngenericwiki_baseurl: \"http://w/\"\n")?;
        let mut data = Data::default();
        data.extensions = default_extensions();
        let request = Rc::new(Request::new(config, http_for("/", ""), data));
        assert!(GenericWiki.verify_installation(&request));

        let data = parse_entry("T\n#parser genericwiki\nFrontPage\n", &request, &registry, None)?;
        assert_eq!("<p><a href=\"http://w/FrontPage\">FrontPage</a>\n</p>", data.body);

        let data = parse_entry("T\nFrontPage\n", &request, &registry, None)?;
        assert_eq!("FrontPage\n", data.body);
        Ok(())
    }

    #[test]
    fn test_verify_installation() -> Result<(), Box<dyn std::error::Error>> {
        let config = Config::from_yaml("datadir: /blog\ngenericwiki_baseurl: [1, 2]\n")?;
        let request = Request::new(config, http_for("/", ""), Data::default());
        assert!(!GenericWiki.verify_installation(&request));
        Ok(())
    }
}
