//! Flavours are named template sets, one file per template:
//! `head.html`, `story.html`, `foot.html` and `content_type.html` make up
//! the `html` flavour. A blog can override a flavour per category by putting
//! template files in the category's directory below the flavour root.

use crate::config::Config;
use crate::template::Encoding;
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// The flavours compiled into the engine, used when the blog has no
/// templates of its own for a flavour.
pub const INCLUDED_FLAVOURS: &[(&str, &[(&str, &str)])] = &[
    (
        "html",
        &[
            ("content_type", include_str!("../flavours/html/content_type.html")),
            ("head", include_str!("../flavours/html/head.html")),
            ("date_head", include_str!("../flavours/html/date_head.html")),
            ("story", include_str!("../flavours/html/story.html")),
            ("date_foot", include_str!("../flavours/html/date_foot.html")),
            ("foot", include_str!("../flavours/html/foot.html")),
        ],
    ),
    (
        "rss",
        &[
            ("content_type", include_str!("../flavours/rss/content_type.rss")),
            ("head", include_str!("../flavours/rss/head.rss")),
            ("story", include_str!("../flavours/rss/story.rss")),
            ("foot", include_str!("../flavours/rss/foot.rss")),
        ],
    ),
    (
        "error",
        &[
            ("content_type", include_str!("../flavours/error/content_type.error")),
            ("head", include_str!("../flavours/error/head.error")),
            ("story", include_str!("../flavours/error/story.error")),
            ("foot", include_str!("../flavours/error/foot.error")),
        ],
    ),
];

/// A loaded template set.
#[derive(Clone, Debug, PartialEq)]
pub struct Flavour {
    name: String,
    templates: BTreeMap<String, String>,
}

impl Flavour {
    pub fn new<K, V>(name: &str, templates: impl IntoIterator<Item = (K, V)>) -> Flavour
    where
        K: Into<String>,
        V: Into<String>,
    {
        Flavour {
            name: name.to_owned(),
            templates: templates
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The compiled-in flavour called `name`.
    pub fn included(name: &str) -> Option<Flavour> {
        INCLUDED_FLAVOURS
            .iter()
            .find(|(flavour, _)| *flavour == name)
            .map(|(flavour, templates)| Flavour::new(flavour, templates.iter().copied()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, template: &str) -> Option<&str> {
        self.templates.get(template).map(String::as_str)
    }

    pub fn contains(&self, template: &str) -> bool {
        self.templates.contains_key(template)
    }

    /// The trimmed `content_type` template; empty when there is none.
    pub fn content_type(&self) -> &str {
        self.get("content_type").map_or("", str::trim)
    }

    pub fn templates(&self) -> impl Iterator<Item = (&str, &str)> {
        self.templates.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Finds the `taste` flavour for a request that resolved to
/// `root_datadir`. The directory of the request and each of its parents up
/// to the flavour root are searched, then the flavour root itself, then the
/// included flavours.
pub fn load_flavour(config: &Config, root_datadir: &Path, taste: &str) -> Result<Flavour> {
    let flavour_root = config.flavour_root();
    let mut dir = root_datadir;
    if dir.is_file() {
        dir = dir.parent().unwrap_or(dir);
    }
    let relative = dir.strip_prefix(&config.datadir).unwrap_or_else(|_| Path::new(""));

    let mut category = Some(relative);
    while let Some(current) = category {
        if current.as_os_str().is_empty() {
            break;
        }
        let files = template_files(&flavour_root.join(current), taste)?;
        if !files.is_empty() {
            return read_flavour(taste, &files, config.blog_encoding);
        }
        category = current.parent();
    }

    let files = template_files(flavour_root, taste)?;
    if !files.is_empty() {
        return read_flavour(taste, &files, config.blog_encoding);
    }

    debug!("Using the included `{}` flavour", taste);
    Flavour::included(taste).ok_or_else(|| Error::NoSuchFlavour(taste.to_owned()))
}

/// The files in `dir` ending in `.<taste>`. A missing directory has none.
fn template_files(dir: &Path, taste: &str) -> Result<Vec<PathBuf>> {
    let suffix = format!(".{}", taste);
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(Error::Io {
                path: dir.to_owned(),
                err,
            })
        }
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|err| Error::Io {
                path: dir.to_owned(),
                err,
            })?
            .path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.ends_with(&suffix) && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_flavour(taste: &str, files: &[PathBuf], encoding: Encoding) -> Result<Flavour> {
    let mut templates = Vec::with_capacity(files.len());
    for file in files {
        let bytes = std::fs::read(file).map_err(|err| Error::Io {
            path: file.clone(),
            err,
        })?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = name.split('.').next().unwrap_or_default().to_owned();
        templates.push((name, encoding.decode(&bytes).into_owned()));
    }
    debug!("Loaded the `{}` flavour from {} files", taste, files.len());
    Ok(Flavour::new(taste, templates))
}

type Result<T> = std::result::Result<T, Error>;

/// Errors loading flavours.
#[derive(Debug)]
pub enum Error {
    /// Returned when neither the blog nor the engine has the flavour.
    NoSuchFlavour(String),

    /// Returned for I/O problems reading template files.
    Io { path: PathBuf, err: std::io::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NoSuchFlavour(taste) => write!(f, "Flavour '{}' does not exist.", taste),
            Error::Io { path, err } => {
                write!(f, "Reading flavour templates `{}`: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NoSuchFlavour(_) => None,
            Error::Io { path: _, err } => Some(err),
        }
    }
}
