//! The library code for the `blosxom` blog engine. Entries are plain files
//! below a data directory; a request's path info selects a category, a date
//! archive or a single entry, and the selected entries are rendered through
//! a flavour, a named set of templates such as `html` or `rss`.
//!
//! Handling a request goes through these steps:
//!
//! 1. Resolving the path info ([`crate::pathinfo`])
//! 2. Listing, sorting and cutting down the entries ([`crate::handler`],
//!    [`crate::walk`])
//! 3. Parsing the entry files ([`crate::entry`])
//! 4. Rendering head, stories and foot of the flavour ([`crate::renderer`],
//!    [`crate::flavour`]) with the `$variable` template language
//!    ([`crate::template`])
//!
//! Nearly every step runs a named callback chain first ([`crate::callback`]),
//! so plugins ([`crate::plugins`]) can take it over or adjust its result.
//! [`crate::blog::Blog`] ties the steps together and [`crate::build`] renders
//! the whole blog to static files.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod blog;
pub mod build;
pub mod callback;
pub mod config;
pub mod entry;
pub mod filestat;
pub mod flavour;
pub mod handler;
pub mod pathinfo;
pub mod plugins;
pub mod renderer;
pub mod request;
pub mod template;
pub mod util;
pub mod walk;

/// The engine version, exposed to templates as `blosxom_version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The engine name, exposed to templates as `blosxom_name`.
pub const NAME: &str = "blosxom";
