//! The `markdown` plugin. Entries that ask for the `markdown` parser (with a
//! `#parser markdown` line, or through the `parser` configuration key) are
//! converted to HTML with pulldown-cmark, and `.md` files are read as
//! markdown entries.

use super::Plugin;
use crate::callback::{Handler, Registry, RegistryError};
use crate::entry::{self, read_entry, EntryData, EntryParser, Extensions, Preformat};
use crate::request::Request;
use pulldown_cmark::{html, Event, Options, Parser, Tag};
use std::path::Path;
use std::rc::Rc;

pub const NAME: &str = "markdown";

/// The file extension of markdown entries.
pub const EXTENSION: &str = "md";

pub struct Markdown;

impl Plugin for Markdown {
    fn name(&self) -> &str {
        NAME
    }

    fn register(&self, registry: &mut Registry) -> Result<(), RegistryError> {
        registry.register(
            "preformat",
            Handler::new(NAME, |args: &mut Preformat| {
                Ok(match args.parser == NAME {
                    true => Some(to_html(&args.story.concat())),
                    false => None,
                })
            }),
        )?;
        registry.register(
            "entryparser",
            Handler::new(NAME, |extensions: &mut Extensions| {
                let mut extensions = extensions.clone();
                let parser: EntryParser = Rc::new(read_markdown_entry);
                extensions.insert(String::from(EXTENSION), parser);
                Ok(extensions)
            }),
        )
    }
}

fn read_markdown_entry(
    path: &Path,
    request: &Rc<Request>,
    registry: &Registry,
) -> Result<EntryData, entry::Error> {
    read_entry(path, request, registry, Some(NAME))
}

/// Converts markdown to HTML.
pub fn to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, Parser::new_ext(markdown, options).map(demote_headings));
    output
}

// Entry headings sit below the blog title (h1), the date (h2) and the entry
// title (h3), so `#` becomes h4.
fn demote_headings(ev: Event) -> Event {
    match ev {
        Event::Start(Tag::Heading(level)) => Event::Start(Tag::Heading(demote(level))),
        Event::End(Tag::Heading(level)) => Event::End(Tag::Heading(demote(level))),
        _ => ev,
    }
}

fn demote(level: u32) -> u32 {
    std::cmp::min(level + 3, 6)
}
