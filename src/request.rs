//! The per-request state: the HTTP environment the request arrived with, the
//! data the engine and plugins accumulate while handling it, and the
//! [`Response`] being built.
//!
//! A [`Request`] is shared between the engine and the plugins' handlers as an
//! `Rc<Request>`; the mutable parts sit behind `RefCell`s. Never hold a
//! borrow of [`Request::data_mut`] across a chain dispatch.

use crate::config::Config;
use crate::entry::{Entry, Extensions};
use crate::template::Encoding;
use chrono::{DateTime, Local};
use serde_json::Value;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

/// The CGI-style request environment (`PATH_INFO`, `QUERY_STRING`,
/// `HTTP_HOST`, ...).
pub type Http = BTreeMap<String, String>;

/// The environment a request for `path_info` would arrive with on
/// `localhost`. Static rendering uses this.
pub fn http_for(path_info: &str, query: &str) -> Http {
    let mut http = Http::new();
    http.insert(String::from("HTTP_HOST"), String::from("localhost"));
    http.insert(String::from("HTTP_REFERER"), String::new());
    http.insert(String::from("PATH_INFO"), path_info.to_owned());
    http.insert(String::from("QUERY_STRING"), query.to_owned());
    http.insert(String::from("REMOTE_ADDR"), String::new());
    http.insert(String::from("REQUEST_METHOD"), String::from("GET"));
    http.insert(String::from("REQUEST_URI"), format!("{}?{}", path_info, query));
    http.insert(String::from("SCRIPT_NAME"), String::new());
    http
}

/// Whether the request resolved to a directory of entries or a single entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlogType {
    Dir,
    File,
}

impl BlogType {
    pub fn as_str(self) -> &'static str {
        match self {
            BlogType::Dir => "dir",
            BlogType::File => "file",
        }
    }
}

impl Default for BlogType {
    fn default() -> Self {
        BlogType::Dir
    }
}

/// What the engine knows about a request. Everything except the entry
/// list and the parser table is exposed to templates.
#[derive(Clone, Default)]
pub struct Data {
    /// The flavour the response is rendered in.
    pub flavour: String,

    /// The category part of the path info.
    pub pi_bl: String,
    pub pi_yr: String,
    pub pi_mo: String,
    pub pi_da: String,

    /// The directory (or entry file) the request resolved to.
    pub root_datadir: PathBuf,
    pub bl_type: BlogType,

    /// Whether the entry list is cut to `num_entries`.
    pub truncate: bool,

    /// The URL of the requested page.
    pub url: String,
    pub blog_title_with_path: String,

    /// The path info components left over after parsing.
    pub path_info: Vec<String>,

    /// The content type of the selected flavour.
    pub content_type: String,

    pub latest_date: String,
    pub latest_w3cdate: String,
    pub latest_rfc822date: String,
    pub timezone: String,

    /// Set while rendering the static site.
    pub is_static: bool,

    /// Entry parsers by file extension.
    pub extensions: Extensions,

    /// The entries selected for the response.
    pub entry_list: Vec<Entry>,

    /// Values plugins stash for templates and for each other.
    pub extra: BTreeMap<String, Value>,
}

impl Data {
    /// The request data as template variables.
    pub fn variables(&self) -> Vec<(String, Value)> {
        let text = |s: &str| Value::String(s.to_owned());
        let mut vars = vec![
            (String::from("blosxom_version"), text(crate::VERSION)),
            (String::from("blosxom_name"), text(crate::NAME)),
            (String::from("flavour"), text(&self.flavour)),
            (String::from("pi_bl"), text(&self.pi_bl)),
            (String::from("pi_yr"), text(&self.pi_yr)),
            (String::from("pi_mo"), text(&self.pi_mo)),
            (String::from("pi_da"), text(&self.pi_da)),
            (
                String::from("root_datadir"),
                text(&self.root_datadir.to_string_lossy()),
            ),
            (String::from("bl_type"), text(self.bl_type.as_str())),
            (String::from("truncate"), Value::Bool(self.truncate)),
            (String::from("url"), text(&self.url)),
            (
                String::from("blog_title_with_path"),
                text(&self.blog_title_with_path),
            ),
            (String::from("path_info"), text(&self.path_info.join("/"))),
            (String::from("content_type"), text(&self.content_type)),
            (String::from("content-type"), text(&self.content_type)),
            (String::from("latest_date"), text(&self.latest_date)),
            (String::from("latest_w3cdate"), text(&self.latest_w3cdate)),
            (String::from("latest_rfc822date"), text(&self.latest_rfc822date)),
            (String::from("timezone"), text(&self.timezone)),
            (String::from("STATIC"), Value::Bool(self.is_static)),
        ];
        vars.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }
}

/// One request being handled.
pub struct Request {
    config: Config,
    http: Http,
    data: RefCell<Data>,
    response: RefCell<Response>,
    filestat_cache: RefCell<HashMap<PathBuf, DateTime<Local>>>,
}

impl Request {
    pub fn new(config: Config, http: Http, data: Data) -> Request {
        let response = Response::new(config.blog_encoding);
        Request {
            config,
            http,
            data: RefCell::new(data),
            response: RefCell::new(response),
            filestat_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn http(&self) -> &Http {
        &self.http
    }

    pub fn encoding(&self) -> Encoding {
        self.config.blog_encoding
    }

    pub fn data(&self) -> Ref<'_, Data> {
        self.data.borrow()
    }

    pub fn data_mut(&self) -> RefMut<'_, Data> {
        self.data.borrow_mut()
    }

    pub fn response(&self) -> Ref<'_, Response> {
        self.response.borrow()
    }

    pub fn response_mut(&self) -> RefMut<'_, Response> {
        self.response.borrow_mut()
    }

    /// Takes the response built so far, leaving an empty one behind.
    pub fn take_response(&self) -> Response {
        self.response.replace(Response::new(self.encoding()))
    }

    /// The decoded `QUERY_STRING` pairs, in order.
    pub fn form(&self) -> Vec<(String, String)> {
        let query = self.http.get("QUERY_STRING").map_or("", String::as_str);
        url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect()
    }

    /// The first value of the query parameter `name`.
    pub fn form_value(&self, name: &str) -> Option<String> {
        self.form()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub(crate) fn filestat_cache(&self) -> RefMut<'_, HashMap<PathBuf, DateTime<Local>>> {
        self.filestat_cache.borrow_mut()
    }
}

/// The argument of the request-level chains (`start`, `handle`, `pathinfo`,
/// `prepare`, `end`, ...).
#[derive(Clone)]
pub struct RequestArgs {
    pub request: Rc<Request>,
}

/// The response to a request: a status line, headers and a body. The body
/// is encoded with the blog encoding when it is sent.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    status: String,
    headers: Vec<(String, String)>,
    body: String,
    encoding: Encoding,
}

impl Response {
    pub fn new(encoding: Encoding) -> Response {
        Response {
            status: String::from("200 OK"),
            headers: Vec::new(),
            body: String::new(),
            encoding,
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Sets header `key`, replacing an earlier value. A `status` key (in
    /// any case) sets the status line instead.
    pub fn add_header(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.trim();
        if key.is_empty() || key.contains(' ') || key.contains(':') {
            return Err(Error::InvalidHeader(key.to_owned()));
        }
        let value = value.trim();
        if key.eq_ignore_ascii_case("status") {
            self.set_status(value);
            return Ok(());
        }
        match self.headers.iter_mut().find(|(k, _)| k == key) {
            Some(header) => header.1 = value.to_owned(),
            None => self.headers.push((key.to_owned(), value.to_owned())),
        }
        Ok(())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The value of header `key`, compared case-insensitively.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn write(&mut self, text: &str) {
        self.body.push_str(text);
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// The body in the blog encoding.
    pub fn body_bytes(&self) -> Vec<u8> {
        self.encoding.encode(&self.body).into_owned()
    }

    /// Writes the status and header lines followed by a blank line.
    pub fn send_headers<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut lines = vec![format!("Status: {}", self.status)];
        lines.extend(self.headers.iter().map(|(k, v)| format!("{}: {}", k, v)));
        write!(out, "{}\n\n", lines.join("\n"))
    }

    pub fn send_body<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.encoding.encode(&self.body))
    }
}

/// Errors building a response.
#[derive(Debug)]
pub enum Error {
    /// Returned for header names containing spaces or colons.
    InvalidHeader(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidHeader(key) => {
                write!(f, "Header key `{}` may not contain spaces or colons", key)
            }
        }
    }
}

impl std::error::Error for Error {}
