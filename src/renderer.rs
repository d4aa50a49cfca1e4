//! Renders a request's content through its flavour into the response.
//!
//! The page is assembled from the flavour templates in order: `head`, then
//! `story` for every entry (bracketed by `date_head`/`date_foot` whenever the
//! day changes), then `date_foot` and `foot`. Before each template is
//! expanded the chain of the same name runs, so plugins can rewrite the
//! template text or the variables it is expanded with.

use crate::callback::{HandlerError, Registry};
use crate::entry::Entry;
use crate::flavour::{self, load_flavour, Flavour};
use crate::request::{self, Request};
use crate::template::{self, Binding, Environment};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// What a response shows.
#[derive(Clone)]
pub enum Content {
    /// Entries, rendered one `story` each.
    Entries(Vec<Entry>),

    /// A single page (an error message, say) rendered with the `story`
    /// template. Its keys are template variables.
    Page(BTreeMap<String, String>),

    /// Text produced by a plugin, written as is.
    Callable(Rc<dyn Fn() -> String>),
}

impl Content {
    /// A [`Content::Page`] with a `title` and a `body`.
    pub fn page(title: &str, body: &str) -> Content {
        let mut page = BTreeMap::new();
        page.insert(String::from("title"), title.to_owned());
        page.insert(String::from("body"), body.to_owned());
        Content::Page(page)
    }

    fn is_empty(&self) -> bool {
        match self {
            Content::Entries(entries) => entries.is_empty(),
            Content::Page(page) => page.is_empty(),
            Content::Callable(_) => false,
        }
    }
}

/// The argument of the template chains (`head`, `story`, `date_head`,
/// `date_foot`, `foot`, `story_end`). Handlers may rewrite both the template
/// text and the variables.
pub struct TemplateArgs {
    pub request: Rc<Request>,
    pub entry: Environment<Request>,
    pub template: String,
}

pub struct Renderer<'r> {
    request: Rc<Request>,
    registry: &'r Registry,
    content: Option<Content>,
    flavour: Option<Flavour>,
    first_day: bool,
    needs_content_type: bool,
    rendered: bool,
}

impl<'r> Renderer<'r> {
    pub fn new(request: &Rc<Request>, registry: &'r Registry) -> Renderer<'r> {
        Renderer {
            request: Rc::clone(request),
            registry,
            content: None,
            flavour: None,
            first_day: true,
            needs_content_type: true,
            rendered: false,
        }
    }

    pub fn set_content(&mut self, content: Content) {
        self.content = Some(content);
    }

    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    /// Stops [`Renderer::render`] from adding a `Content-type` header.
    pub fn without_content_type(mut self) -> Renderer<'r> {
        self.needs_content_type = false;
        self
    }

    pub fn add_header(&self, key: &str, value: &str) -> Result<()> {
        Ok(self.request.response_mut().add_header(key, value)?)
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    /// Renders the content into the response. A request for a flavour that
    /// does not exist renders an explanation with the `error` flavour
    /// instead. Rendering twice is a no-op.
    pub fn render(&mut self, header: bool) -> Result<()> {
        if self.rendered {
            return Ok(());
        }

        let (taste, root_datadir) = {
            let data = self.request.data();
            (data.flavour.clone(), data.root_datadir.clone())
        };
        let config = self.request.config();
        let flavour = match load_flavour(config, &root_datadir, &taste) {
            Ok(flavour) => flavour,
            Err(flavour::Error::NoSuchFlavour(taste)) => {
                debug!("No `{}` flavour; rendering the error flavour", taste);
                let message = flavour::Error::NoSuchFlavour(taste).to_string();
                self.content = Some(Content::page("Flavour error", &message));
                load_flavour(config, &root_datadir, "error")?
            }
            Err(err) => return Err(err.into()),
        };

        let content_type = flavour.content_type().to_owned();
        self.request.data_mut().content_type = content_type.clone();
        if header && self.needs_content_type && !content_type.is_empty() {
            self.add_header("Content-type", &content_type)?;
        }
        self.flavour = Some(flavour);

        let content = self.content.take();
        if let Some(content) = &content {
            if !content.is_empty() {
                let mut parsevars = self.base_environment();
                if self.has_template("head") {
                    self.output_flavour(&mut parsevars, "head")?;
                }
                if self.has_template("story") {
                    self.process_content(content)?;
                }
                if self.has_template("date_foot") {
                    self.output_flavour(&mut parsevars, "date_foot")?;
                }
                if self.has_template("foot") {
                    self.output_flavour(&mut parsevars, "foot")?;
                }
            }
        }
        self.content = content;
        self.rendered = true;
        Ok(())
    }

    fn has_template(&self, name: &str) -> bool {
        self.flavour.as_ref().map_or(false, |f| f.contains(name))
    }

    fn template(&self, name: &str) -> String {
        self.flavour
            .as_ref()
            .and_then(|f| f.get(name))
            .unwrap_or("")
            .to_owned()
    }

    /// Configuration and request data, the first two variable layers.
    fn base_environment(&self) -> Environment<Request> {
        let mut env = Environment::new();
        env.merge(self.request.config().variables());
        env.merge(self.request.data().variables());
        env
    }

    fn write(&self, text: &str) {
        self.request.response_mut().write(text);
    }

    fn parse(&self, env: &Environment<Request>, template: &str) -> Result<String> {
        Ok(template::parse(
            self.request.as_ref(),
            self.request.encoding(),
            env,
            template,
        )?)
    }

    /// Runs the chain for `template_name` over `env` and `template`, giving
    /// `env` back with whatever the handlers did to it.
    fn run_template_chain(
        &self,
        template_name: &str,
        env: &mut Environment<Request>,
        template: String,
    ) -> Result<String> {
        let mut args = TemplateArgs {
            request: Rc::clone(&self.request),
            entry: std::mem::take(env),
            template,
        };
        let result = self
            .registry
            .dispatch::<TemplateArgs, ()>(template_name, &mut args)
            .run();
        *env = args.entry;
        result?;
        Ok(args.template)
    }

    /// Expands a page-level template. Escaped dollars stay escaped.
    fn output_flavour(&self, env: &mut Environment<Request>, template_name: &str) -> Result<()> {
        let template = self.run_template_chain(template_name, env, self.template(template_name))?;
        let text = self.parse(env, &template)?;
        self.write(&text);
        Ok(())
    }

    /// Expands an entry-level template, unescaping `\$`. With `override_name`
    /// the entry's `template_name` picks the template when the flavour has
    /// it.
    fn output_template(
        &self,
        output: &mut String,
        env: &mut Environment<Request>,
        template_name: &str,
        override_name: bool,
    ) -> Result<()> {
        let mut template = String::new();
        if override_name {
            if let Some(name) = env.value("template_name").map(template::to_text) {
                template = self.template(&name);
            }
        }
        if template.is_empty() {
            template = self.template(template_name);
        }
        let template = self.run_template_chain(template_name, env, template)?;
        if !template.is_empty() {
            output.push_str(&self.parse(env, &template)?.replace(r"\$", "$"));
        }
        Ok(())
    }

    fn process_content(&mut self, content: &Content) -> Result<()> {
        match content {
            Content::Callable(f) => self.write(&f()),
            Content::Page(page) => {
                let mut env = self.base_environment();
                env.merge(page.iter().map(|(k, v)| (k.clone(), v.clone())));
                let text = self.parse(&env, &self.template("story"))?;
                self.write(&text);
            }
            Content::Entries(entries) => {
                let mut current_date = String::new();
                let mut output = String::new();
                for entry in entries {
                    self.process_entry(&mut output, entry, &mut current_date)?;
                }
                self.write(&output);
            }
        }
        Ok(())
    }

    fn process_entry(&mut self, output: &mut String, entry: &Entry, current_date: &mut String) -> Result<()> {
        let mut env = self.base_environment();
        env.merge(entry.variables());
        if self.request.data().content_type == "text/plain" {
            let body = env.value("body").map(template::to_text).unwrap_or_default();
            env.insert("body", Binding::literal(Value::String(plain_text(&body))));
        }

        let date = entry.date();
        if !date.is_empty() && date != *current_date {
            *current_date = date;
            if !self.first_day {
                self.output_template(output, &mut env, "date_foot", false)?;
            }
            self.first_day = false;
            self.output_template(output, &mut env, "date_head", false)?;
        }

        self.output_template(output, &mut env, "story", true)?;

        let story_end = self.run_template_chain("story_end", &mut env, String::new())?;
        output.push_str(&story_end);
        Ok(())
    }
}

/// Strips markup from `html` and indents every line by two spaces.
pub fn plain_text(html: &str) -> String {
    TAG.replace_all(html, " ")
        .split('\n')
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

type Result<T> = std::result::Result<T, Error>;

/// Errors rendering a response.
#[derive(Debug)]
pub enum Error {
    /// Returned when the flavour (or the `error` flavour) cannot be loaded.
    Flavour(flavour::Error),

    /// Returned when a template chain handler fails.
    Handler(HandlerError),

    /// Returned when a template cannot be expanded.
    Template(template::Error),

    /// Returned for invalid response headers.
    Header(request::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Flavour(err) => err.fmt(f),
            Error::Handler(err) => err.fmt(f),
            Error::Template(err) => err.fmt(f),
            Error::Header(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Flavour(err) => Some(err),
            Error::Handler(err) => Some(err),
            Error::Template(err) => Some(err),
            Error::Header(err) => Some(err),
        }
    }
}

impl From<flavour::Error> for Error {
    /// Converts [`flavour::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: flavour::Error) -> Error {
        Error::Flavour(err)
    }
}

impl From<HandlerError> for Error {
    /// Converts [`HandlerError`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: HandlerError) -> Error {
        Error::Handler(err)
    }
}

impl From<template::Error> for Error {
    /// Converts [`template::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: template::Error) -> Error {
        Error::Template(err)
    }
}

impl From<request::Error> for Error {
    /// Converts [`request::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: request::Error) -> Error {
        Error::Header(err)
    }
}
