//! Exports [`Blog`], the engine object. A [`Blog`] owns the configuration
//! and the callback [`Registry`] the enabled plugins registered their
//! handlers in, and turns requests into [`Response`]s:
//!
//! 1. The request is initialized ([`Blog::initialize`]): `base_url` is
//!    derived when it isn't configured and plugins get to extend the entry
//!    parser table through the `entryparser` chain.
//! 2. The `start` chain runs.
//! 3. The `handle` chain runs; a handler answering `true` has answered the
//!    request. Otherwise the default handler ([`crate::handler`]) does.
//! 4. The `end` chain runs.
//!
//! This module also holds the installation check and the blog skeleton
//! generator of the command line tool.

use crate::callback::{done_when_true, pass_mutated, HandlerError, Registry, RegistryError, Truthy};
use crate::config::{Config, OPTIONAL_KEYS, REQUIRED_KEYS};
use crate::entry::{self, default_extensions, Extensions};
use crate::flavour::INCLUDED_FLAVOURS;
use crate::handler::handle_request;
use crate::plugins::{self, Plugin};
use crate::renderer;
use crate::request::{self, http_for, Data, Http, Request, RequestArgs, Response};
use crate::util::write_file;
use log::{debug, info, warn};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// The text of the first post of a new blog.
const FIRST_POST: &str = "First post!
<p>
  This is your first post!  If you can see this with a web-browser,
  then it's likely that everything's working nicely!
</p>
";

/// The blog engine.
pub struct Blog {
    config: Config,
    registry: Registry,
    plugins: Vec<Box<dyn Plugin>>,
}

impl Blog {
    /// Creates the engine with the built-in plugins named in `load_plugins`,
    /// registered in that order. Unknown names are skipped with a warning.
    pub fn new(config: Config) -> Result<Blog> {
        let mut enabled = Vec::with_capacity(config.load_plugins.len());
        for name in &config.load_plugins {
            match plugins::builtin(name) {
                Some(plugin) => enabled.push(plugin),
                None => warn!("Unknown plugin `{}`; skipping it", name),
            }
        }
        Blog::with_plugins(config, enabled)
    }

    /// Creates the engine with `plugins`, registered in order.
    pub fn with_plugins(config: Config, plugins: Vec<Box<dyn Plugin>>) -> Result<Blog> {
        let mut registry = Registry::new();
        for plugin in &plugins {
            debug!("Registering plugin `{}`", plugin.name());
            plugin.register(&mut registry)?;
        }
        Ok(Blog {
            config,
            registry,
            plugins,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The registry, for registering handlers that aren't packaged as
    /// plugins.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn plugins(&self) -> &[Box<dyn Plugin>] {
        &self.plugins
    }

    /// Builds the request for `http`. When `base_url` isn't configured and
    /// the environment has a `SCRIPT_NAME`, it is derived from the URL
    /// scheme, host and script name.
    pub fn initialize(&self, http: Http, is_static: bool) -> Result<Rc<Request>> {
        let mut config = self.config.clone();
        if config.base_url.is_none() {
            if let Some(script_name) = http.get("SCRIPT_NAME") {
                let scheme = http.get("wsgi.url_scheme").map_or("http", String::as_str);
                let host = http.get("HTTP_HOST").map_or("", String::as_str);
                config.base_url = Some(format!("{}://{}{}", scheme, host, script_name));
            }
        }
        let config = config.normalized();

        let mut extensions = default_extensions();
        self.registry
            .dispatch::<Extensions, Extensions>("entryparser", &mut extensions)
            .mapping(pass_mutated)
            .run()?;

        let data = Data {
            is_static,
            extensions,
            ..Data::default()
        };
        Ok(Rc::new(Request::new(config, http, data)))
    }

    /// Handles one request and returns its response.
    pub fn run(&self, http: Http, is_static: bool) -> Result<Response> {
        let request = self.initialize(http, is_static)?;
        let mut args = RequestArgs {
            request: Rc::clone(&request),
        };

        self.registry
            .dispatch::<RequestArgs, ()>("start", &mut args)
            .run()?;

        let handled = self
            .registry
            .dispatch::<RequestArgs, bool>("handle", &mut args)
            .done(done_when_true)
            .run()?;
        if handled != Some(true) {
            handle_request(&request, &self.registry)?;
        }

        self.registry
            .dispatch::<RequestArgs, ()>("end", &mut args)
            .run()?;
        Ok(request.take_response())
    }

    /// Renders `path_info` (with `query`) as if it were requested from
    /// `localhost`.
    pub fn render_url(&self, path_info: &str, query: &str) -> Result<Response> {
        self.run(http_for(path_info, query), false)
    }

    /// Runs the `chain` callback between `start` and `end`, outside of any
    /// page request. The first truthy handler result is returned.
    pub fn run_callback<O: Truthy + 'static>(&self, chain: &str) -> Result<Option<O>> {
        let request = self.initialize(Http::new(), false)?;
        let mut args = RequestArgs { request };

        self.registry
            .dispatch::<RequestArgs, ()>("start", &mut args)
            .run()?;
        let handled = self
            .registry
            .dispatch::<RequestArgs, O>(chain, &mut args)
            .done(done_when_true)
            .run()?;
        self.registry
            .dispatch::<RequestArgs, ()>("end", &mut args)
            .run()?;
        Ok(handled)
    }

    /// Checks the installation and writes a report to `out`: diagnostics,
    /// the configuration keys, the data directory and each plugin's own
    /// verification. Returns whether the blog can run.
    pub fn test_installation<W: Write>(&self, out: &mut W) -> Result<bool> {
        let io = |err| Error::Io {
            path: PathBuf::from("<output>"),
            err,
        };
        self.write_report(out).map_err(io)
    }

    fn write_report<W: Write>(&self, out: &mut W) -> std::io::Result<bool> {
        let config = &self.config;
        writeln!(out, "Welcome to {}'s installation verification system.", crate::NAME)?;
        writeln!(out, "------")?;
        writeln!(out, "]] printing diagnostics [[")?;
        writeln!(out, "{}:   {}", crate::NAME, crate::VERSION)?;
        writeln!(out, "os:        {}", std::env::consts::OS)?;
        writeln!(out, "arch:      {}", std::env::consts::ARCH)?;
        writeln!(out, "------")?;

        writeln!(out, "]] checking config file [[")?;
        writeln!(out, "config has {} properties set.", config.set_keys.len())?;
        let is_set = |key: &&str| config.set_keys.iter().any(|k| k == key);
        let missing_required: Vec<&str> =
            REQUIRED_KEYS.iter().copied().filter(|k| !is_set(k)).collect();
        let missing_optional: Vec<&str> =
            OPTIONAL_KEYS.iter().copied().filter(|k| !is_set(k)).collect();
        let unknown: Vec<&str> = config
            .set_keys
            .iter()
            .map(String::as_str)
            .filter(|k| !REQUIRED_KEYS.contains(k) && !OPTIONAL_KEYS.contains(k))
            .collect();

        if !missing_required.is_empty() {
            writeln!(out)?;
            writeln!(out, "Missing properties must be set in order for your blog to work.")?;
            writeln!(out)?;
            writeln!(out, "{}", wrap_keys(&missing_required))?;
            writeln!(out)?;
            writeln!(out, "This must be done before we can go further.  Exiting.")?;
            return Ok(false);
        }
        if !missing_optional.is_empty() {
            writeln!(out)?;
            writeln!(out, "You're missing optional properties.  These are not required,")?;
            writeln!(out, "but some of them may interest you.")?;
            writeln!(out)?;
            writeln!(out, "{}", wrap_keys(&missing_optional))?;
        }
        if !unknown.is_empty() {
            writeln!(out)?;
            writeln!(out, "These are properties {} doesn't know about.  They could be", crate::NAME)?;
            writeln!(out, "used by plugins or could be ones you've added.")?;
            writeln!(out)?;
            writeln!(out, "{}", wrap_keys(&unknown))?;
            writeln!(out)?;
        }
        writeln!(out, "PASS: config file is fine.")?;
        writeln!(out, "------")?;

        writeln!(out, "]] checking datadir [[")?;
        if !config.datadir.is_dir() {
            writeln!(out, "datadir '{}' does not exist.", config.datadir.display())?;
            writeln!(out, "You need to create your datadir and give it appropriate permissions.")?;
            writeln!(out)?;
            writeln!(out, "This must be done before we can go further.  Exiting.")?;
            return Ok(false);
        }
        writeln!(out, "PASS: datadir is there.")?;
        writeln!(out, "------")?;

        if self.plugins.is_empty() {
            writeln!(out, "You have chosen not to load any plugins.")?;
            return Ok(true);
        }
        writeln!(out, "Now we're going to verify your plugin configuration.")?;
        let request = Request::new(config.clone(), Http::new(), Data::default());
        let mut passed = true;
        for plugin in &self.plugins {
            writeln!(out, "=== plugin: '{}'", plugin.name())?;
            if plugin.verify_installation(&request) {
                writeln!(out, "    PASS")?;
            } else {
                writeln!(out, "    FAIL!!!")?;
                passed = false;
            }
        }
        Ok(passed)
    }
}

/// Lists `keys` sorted, joined with commas and a final "and", indented and
/// wrapped at 72 columns.
fn wrap_keys(keys: &[&str]) -> String {
    let mut keys = keys.to_vec();
    keys.sort_unstable();
    let joined = match keys.split_last() {
        None => String::new(),
        Some((last, [])) => (*last).to_owned(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
    };

    let mut lines = vec![String::new()];
    for word in joined.split(' ') {
        let line = lines.last_mut().map_or(0, |line| line.len());
        if line > 0 && line + 1 + word.len() > 72 {
            lines.push(String::new());
        }
        if let Some(line) = lines.last_mut() {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
    }
    lines
        .iter()
        .map(|line| format!("   {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Creates a new blog in `dir` (`.` means `./blog`): an `entries` data
/// directory holding a first post, the templates of the included flavours
/// in `flavours` and a `config.yaml` pointing at both. Refuses to touch an existing path.
/// Returns the directory created.
pub fn create_blog(dir: &Path) -> Result<PathBuf> {
    let dir = match dir == Path::new(".") {
        true => PathBuf::from("./blog"),
        false => dir.to_owned(),
    };
    if dir.exists() {
        return Err(Error::Exists(dir));
    }
    let io = |path: &Path| {
        let path = path.to_owned();
        move |err| Error::Io { path, err }
    };

    info!("Creating '{}'...", dir.display());
    let entries = dir.join("entries");
    std::fs::create_dir_all(&entries).map_err(io(&entries))?;

    for (name, templates) in INCLUDED_FLAVOURS {
        for (template, text) in templates.iter() {
            let path = dir.join("flavours").join(format!("{}.{}", template, name));
            info!("Creating '{}'...", path.display());
            write_file(&path, text.as_bytes()).map_err(io(&path))?;
        }
    }

    let config = dir.join(crate::config::CONFIG_FILE);
    info!("Creating '{}'...", config.display());
    write_file(&config, config_template().as_bytes()).map_err(io(&config))?;

    let first_post = entries.join("firstpost.txt");
    info!("Creating '{}'...", first_post.display());
    write_file(&first_post, FIRST_POST.as_bytes()).map_err(io(&first_post))?;
    Ok(dir)
}

fn config_template() -> String {
    format!(
        "# Configuration for {name}. Relative paths are resolved against the\n\
         # directory of this file.\n\
         datadir: entries\n\
         flavourdir: flavours\n\
         blog_title: My blog has no title!\n\
         blog_description: \"\"\n\
         blog_author: \"\"\n\
         blog_language: en\n\
         blog_encoding: utf-8\n\
         # base_url: http://example.org/blog\n\
         default_flavour: html\n\
         num_entries: 5\n\
         load_plugins: []\n\
         static_dir: static\n\
         static_flavours: [html, rss]\n\
         log_level: warning\n",
        name = crate::NAME
    )
}

/// The result of running the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for handling requests.
#[derive(Debug)]
pub enum Error {
    /// Returned when a plugin handler fails.
    Handler(HandlerError),

    /// Returned when a plugin registers a handler with the wrong types.
    Registry(RegistryError),

    /// Returned for errors reading entries.
    Entry(entry::Error),

    /// Returned for errors rendering the response.
    Render(renderer::Error),

    /// Returned when a response header is malformed.
    Header(request::Error),

    /// Returned when a new blog would overwrite an existing path.
    Exists(PathBuf),

    /// Returned for other I/O problems.
    Io { path: PathBuf, err: std::io::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Handler(err) => err.fmt(f),
            Error::Registry(err) => err.fmt(f),
            Error::Entry(err) => err.fmt(f),
            Error::Render(err) => err.fmt(f),
            Error::Header(err) => err.fmt(f),
            Error::Exists(path) => {
                write!(f, "Cannot create '{}': something is in the way", path.display())
            }
            Error::Io { path, err } => write!(f, "Writing '{}': {}", path.display(), err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Handler(err) => Some(err),
            Error::Registry(err) => Some(err),
            Error::Entry(err) => Some(err),
            Error::Render(err) => Some(err),
            Error::Header(err) => Some(err),
            Error::Exists(_) => None,
            Error::Io { path: _, err } => Some(err),
        }
    }
}

impl From<HandlerError> for Error {
    /// Converts [`HandlerError`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: HandlerError) -> Error {
        Error::Handler(err)
    }
}

impl From<RegistryError> for Error {
    /// Converts [`RegistryError`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: RegistryError) -> Error {
        Error::Registry(err)
    }
}

impl From<entry::Error> for Error {
    /// Converts [`entry::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: entry::Error) -> Error {
        Error::Entry(err)
    }
}

impl From<renderer::Error> for Error {
    /// Converts [`renderer::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: renderer::Error) -> Error {
        Error::Render(err)
    }
}

impl From<request::Error> for Error {
    /// Converts [`request::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: request::Error) -> Error {
        Error::Header(err)
    }
}
