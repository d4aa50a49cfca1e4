//! The blog configuration, loaded from a YAML file (`config.yaml` by
//! default). Every key, including the ones the engine does not know about,
//! is also a template variable.

use crate::template::Encoding;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The name of the configuration file looked up when none is given.
pub const CONFIG_FILE: &str = "config.yaml";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The directory holding the entry files.
    pub datadir: PathBuf,

    /// The directory holding flavour templates. Defaults to [`Config::datadir`].
    #[serde(default)]
    pub flavourdir: Option<PathBuf>,

    #[serde(default = "default_blog_title")]
    pub blog_title: String,

    #[serde(default)]
    pub blog_description: String,

    #[serde(default)]
    pub blog_author: String,

    #[serde(default)]
    pub blog_email: String,

    #[serde(default = "default_blog_language")]
    pub blog_language: String,

    #[serde(default)]
    pub blog_rights: String,

    #[serde(default)]
    pub blog_icbm: String,

    /// The encoding of entry and template files, and of the output.
    #[serde(default)]
    pub blog_encoding: Encoding,

    /// The URL the blog is served from. Derived from the request when unset.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_flavour")]
    pub default_flavour: String,

    /// The number of entries shown on non-archive pages; `0` shows all.
    #[serde(default = "default_num_entries")]
    pub num_entries: usize,

    /// How many directory levels below the requested category are listed;
    /// `0` means all of them.
    #[serde(default)]
    pub depth: usize,

    /// Directory names (matched against the end of the path) that are never
    /// descended into.
    #[serde(default, deserialize_with = "one_or_many")]
    pub ignore_directories: Vec<String>,

    /// The parser name entries use unless they set `#parser`.
    #[serde(default = "default_parser")]
    pub parser: String,

    /// The built-in plugins to enable, in registration order.
    #[serde(default)]
    pub load_plugins: Vec<String>,

    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    #[serde(default = "default_static_flavours")]
    pub static_flavours: Vec<String>,

    #[serde(default = "default_true")]
    pub static_monthnames: bool,

    #[serde(default)]
    pub static_monthnumbers: bool,

    /// Extra URLs (optionally with a query string) rendered statically.
    #[serde(default)]
    pub static_urls: Vec<String>,

    /// `stderr` (the default), `NONE`, or a file to append log lines to.
    #[serde(default)]
    pub log_file: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Module paths whose log lines are kept; empty keeps everything.
    #[serde(default, deserialize_with = "one_or_many")]
    pub log_filter: Vec<String>,

    /// Keys the engine does not use; plugins and templates may.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,

    /// The keys the configuration source actually set.
    #[serde(skip)]
    pub set_keys: Vec<String>,
}

/// The keys a configuration must set.
pub const REQUIRED_KEYS: &[&str] = &["datadir"];

/// The keys the engine understands but that have defaults.
pub const OPTIONAL_KEYS: &[&str] = &[
    "flavourdir",
    "blog_title",
    "blog_description",
    "blog_author",
    "blog_email",
    "blog_language",
    "blog_rights",
    "blog_icbm",
    "blog_encoding",
    "base_url",
    "default_flavour",
    "num_entries",
    "depth",
    "ignore_directories",
    "parser",
    "load_plugins",
    "static_dir",
    "static_flavours",
    "static_monthnames",
    "static_monthnumbers",
    "static_urls",
    "log_file",
    "log_level",
    "log_filter",
];

fn default_blog_title() -> String {
    String::from("My blog has no title!")
}

fn default_blog_language() -> String {
    String::from("en")
}

fn default_flavour() -> String {
    String::from("html")
}

fn default_num_entries() -> usize {
    5
}

fn default_parser() -> String {
    String::from("plain")
}

fn default_static_flavours() -> Vec<String> {
    vec![String::from("html")]
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    String::from("warning")
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

impl Config {
    /// Loads the configuration file at `path`. A relative `datadir`,
    /// `flavourdir` or `static_dir` is resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Config> {
        use crate::util::open;
        use std::io::Read;
        let mut yaml = String::new();
        open(path, "configuration")?.read_to_string(&mut yaml)?;
        let config = Config::parse(&yaml)
            .map_err(|e| anyhow!("Parsing configuration `{}`: {}", path.display(), e))?;
        let root = match path.parent() {
            Some(root) => root,
            None => {
                return Err(anyhow!(
                    "Can't get parent directory for configuration file path '{:?}'",
                    path
                ))
            }
        };
        Ok(config.rooted_at(root).normalized())
    }

    /// Parses a configuration from YAML text; paths are used as written.
    pub fn from_yaml(yaml: &str) -> Result<Config> {
        Ok(Config::parse(yaml)?.normalized())
    }

    fn parse(yaml: &str) -> std::result::Result<Config, serde_yaml::Error> {
        let mut config: Config = serde_yaml::from_str(yaml)?;
        let keys: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(yaml)?;
        config.set_keys = keys.into_iter().map(|(key, _)| key).collect();
        Ok(config)
    }

    /// A configuration with defaults for everything but the data directory.
    pub fn with_datadir(datadir: impl Into<PathBuf>) -> Config {
        Config {
            datadir: datadir.into(),
            flavourdir: None,
            blog_title: default_blog_title(),
            blog_description: String::new(),
            blog_author: String::new(),
            blog_email: String::new(),
            blog_language: default_blog_language(),
            blog_rights: String::new(),
            blog_icbm: String::new(),
            blog_encoding: Encoding::default(),
            base_url: None,
            default_flavour: default_flavour(),
            num_entries: default_num_entries(),
            depth: 0,
            ignore_directories: Vec::new(),
            parser: default_parser(),
            load_plugins: Vec::new(),
            static_dir: None,
            static_flavours: default_static_flavours(),
            static_monthnames: true,
            static_monthnumbers: false,
            static_urls: Vec::new(),
            log_file: None,
            log_level: default_log_level(),
            log_filter: Vec::new(),
            extra: BTreeMap::new(),
            set_keys: vec![String::from("datadir")],
        }
    }

    fn rooted_at(mut self, root: &Path) -> Config {
        self.datadir = root.join(&self.datadir);
        self.flavourdir = self.flavourdir.map(|dir| root.join(dir));
        self.static_dir = self.static_dir.map(|dir| root.join(dir));
        self
    }

    /// Strips trailing slashes from `base_url` and `datadir`.
    pub fn normalized(mut self) -> Config {
        if let Some(base_url) = &mut self.base_url {
            while base_url.ends_with('/') {
                base_url.pop();
            }
        }
        let datadir = self.datadir.to_string_lossy().into_owned();
        if datadir.len() > 1 && (datadir.ends_with('/') || datadir.ends_with('\\')) {
            self.datadir = PathBuf::from(datadir.trim_end_matches(|c| c == '/' || c == '\\'));
        }
        self
    }

    /// The root directory flavour templates are looked up in.
    pub fn flavour_root(&self) -> &Path {
        self.flavourdir.as_deref().unwrap_or_else(|| self.datadir.as_path())
    }

    /// The configured `base_url`, or the empty string.
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or("")
    }

    /// The configuration as template variables.
    pub fn variables(&self) -> Vec<(String, Value)> {
        let path = |p: &Path| Value::String(p.to_string_lossy().into_owned());
        let mut vars = vec![
            (String::from("datadir"), path(&self.datadir)),
            (String::from("flavourdir"), path(self.flavour_root())),
            (String::from("blog_title"), Value::from(self.blog_title.as_str())),
            (
                String::from("blog_description"),
                Value::from(self.blog_description.as_str()),
            ),
            (String::from("blog_author"), Value::from(self.blog_author.as_str())),
            (String::from("blog_email"), Value::from(self.blog_email.as_str())),
            (String::from("blog_language"), Value::from(self.blog_language.as_str())),
            (String::from("blog_rights"), Value::from(self.blog_rights.as_str())),
            (String::from("blog_icbm"), Value::from(self.blog_icbm.as_str())),
            (String::from("blog_encoding"), Value::from(self.blog_encoding.name())),
            (String::from("base_url"), Value::from(self.base_url())),
            (String::from("default_flavour"), Value::from(self.default_flavour.as_str())),
            (String::from("num_entries"), Value::from(self.num_entries)),
            (String::from("depth"), Value::from(self.depth)),
            (String::from("parser"), Value::from(self.parser.as_str())),
            (String::from("log_level"), Value::from(self.log_level.as_str())),
        ];
        if let Some(static_dir) = &self.static_dir {
            vars.push((String::from("static_dir"), path(static_dir)));
        }
        for (key, value) in &self.extra {
            match serde_json::to_value(value) {
                Ok(value) => vars.push((key.clone(), value)),
                Err(e) => log::warn!("Configuration key `{}` is not usable in templates: {}", key, e),
            }
        }
        vars
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() -> Result<()> {
        let config = Config::from_yaml("datadir: /blog/entries/\n")?;
        assert_eq!(Path::new("/blog/entries"), config.datadir);
        assert_eq!(Path::new("/blog/entries"), config.flavour_root());
        assert_eq!("html", config.default_flavour);
        assert_eq!(5, config.num_entries);
        assert_eq!(Encoding::Utf8, config.blog_encoding);
        assert_eq!(vec!["html"], config.static_flavours);
        assert!(config.static_monthnames);
        assert!(!config.static_monthnumbers);
        assert_eq!("", config.base_url());
        Ok(())
    }

    #[test]
    fn test_values_and_extras() -> Result<()> {
        let config = Config::from_yaml(
            "datadir: /blog\n\
             base_url: http://example.org/blog/\n\
             blog_encoding: iso-8859-1\n\
             ignore_directories: CVS\n\
             load_plugins: [markdown]\n\
             sidebar: Links\n",
        )?;
        assert_eq!("http://example.org/blog", config.base_url());
        assert_eq!(Encoding::Latin1, config.blog_encoding);
        assert_eq!(vec!["CVS"], config.ignore_directories);
        assert_eq!(vec!["markdown"], config.load_plugins);
        assert!(config.set_keys.contains(&String::from("sidebar")));
        assert!(!config.set_keys.contains(&String::from("depth")));

        let vars = config.variables();
        assert!(vars.contains(&(String::from("sidebar"), Value::from("Links"))));
        assert!(vars.contains(&(String::from("blog_encoding"), Value::from("iso-8859-1"))));
        Ok(())
    }

    #[test]
    fn test_missing_datadir() {
        assert!(Config::from_yaml("blog_title: Nothing\n").is_err());
    }

    #[test]
    fn test_unknown_encoding() {
        assert!(Config::from_yaml("datadir: /blog\nblog_encoding: klingon\n").is_err());
    }

    #[test]
    fn test_from_file_resolves_relative_paths() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "datadir: entries\nstatic_dir: public\n")?;
        let config = Config::from_file(&path)?;
        assert_eq!(dir.path().join("entries"), config.datadir);
        assert_eq!(Some(dir.path().join("public")), config.static_dir);
        Ok(())
    }
}
