//! Blog entries. An entry file holds the title on its first line, then any
//! number of `#key value` metadata lines, then the body:
//!
//! ```text
//! My first post
//! #parser markdown
//! Hello *world*.
//! ```
//!
//! The body is turned into markup by the `preformat` chain (picked by the
//! `parser` the entry asks for) and then handed to the `postformat` chain.

use crate::callback::{done_when_true, HandlerError, Registry};
use crate::filestat::filestat;
use crate::request::Request;
use chrono::{DateTime, Local, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Reads the entry at a path.
pub type EntryParser = Rc<dyn Fn(&Path, &Rc<Request>, &Registry) -> Result<EntryData>>;

/// Entry parsers by file extension.
pub type Extensions = BTreeMap<String, EntryParser>;

/// The built-in parser table: `txt` files are read with [`read_entry`].
pub fn default_extensions() -> Extensions {
    let mut extensions = Extensions::new();
    let parser: EntryParser = Rc::new(read_text_entry);
    extensions.insert(String::from("txt"), parser);
    extensions
}

fn read_text_entry(path: &Path, request: &Rc<Request>, registry: &Registry) -> Result<EntryData> {
    read_entry(path, request, registry, None)
}

/// The parsed contents of an entry file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntryData {
    pub title: String,

    /// The formatted body.
    pub body: String,

    /// The `#key value` lines, without the `#`.
    pub metadata: BTreeMap<String, String>,
}

/// The argument of the `preformat` chain.
pub struct Preformat {
    pub request: Rc<Request>,

    /// The parser the entry asked for.
    pub parser: String,

    /// The body lines, each with its line ending.
    pub story: Vec<String>,
}

/// The argument of the `postformat` chain. Handlers edit `entry_data` in
/// place.
pub struct Postformat {
    pub request: Rc<Request>,
    pub entry_data: EntryData,
}

/// Reads and parses the entry file at `path`. The parser name defaults to
/// `default_parser`, then to the configured `parser`.
pub fn read_entry(
    path: &Path,
    request: &Rc<Request>,
    registry: &Registry,
    default_parser: Option<&str>,
) -> Result<EntryData> {
    let bytes = std::fs::read(path).map_err(|err| Error::Io {
        path: path.to_owned(),
        err,
    })?;
    let text = request.encoding().decode(&bytes);
    parse_entry(&text, request, registry, default_parser)
}

/// Parses entry text; see [`read_entry`].
pub fn parse_entry(
    text: &str,
    request: &Rc<Request>,
    registry: &Registry,
    default_parser: Option<&str>,
) -> Result<EntryData> {
    let mut lines = text.split_inclusive('\n').peekable();
    let title = match lines.next() {
        Some(line) => line.trim().to_owned(),
        None => return Ok(EntryData::default()),
    };

    let mut metadata = BTreeMap::new();
    while let Some(line) = lines.next_if(|line| line.starts_with('#')) {
        let meta = line[1..].trim();
        let (key, value) = match meta.split_once(' ') {
            Some((key, value)) => (key, value.trim()),
            None => (meta, ""),
        };
        metadata.insert(key.to_owned(), value.to_owned());
    }

    let parser = match metadata.get("parser") {
        Some(parser) => parser.clone(),
        None => default_parser
            .map(str::to_owned)
            .unwrap_or_else(|| request.config().parser.clone()),
    };
    let mut preformat = Preformat {
        request: Rc::clone(request),
        parser,
        story: lines.map(str::to_owned).collect(),
    };
    let body = registry
        .dispatch::<Preformat, Option<String>>("preformat", &mut preformat)
        .done(done_when_true)
        .run_or_else(|args| Some(args.story.concat()))?
        .unwrap_or_default();

    let mut postformat = Postformat {
        request: Rc::clone(request),
        entry_data: EntryData {
            title,
            body,
            metadata,
        },
    };
    registry
        .dispatch::<Postformat, ()>("postformat", &mut postformat)
        .run()?;
    Ok(postformat.entry_data)
}

/// An entry file, with its contents once [`Entry::load`] has run.
#[derive(Clone, Debug)]
pub struct Entry {
    path: PathBuf,
    datadir: PathBuf,
    mtime: DateTime<Local>,
    data: Option<EntryData>,
}

impl Entry {
    /// An entry for the file at `path` inside the blog at `datadir`.
    pub fn new(path: impl Into<PathBuf>, datadir: impl Into<PathBuf>, mtime: DateTime<Local>) -> Entry {
        Entry {
            path: path.into(),
            datadir: datadir.into(),
            mtime,
            data: None,
        }
    }

    /// An entry for `path` timestamped through [`filestat`].
    pub fn from_file(request: &Rc<Request>, registry: &Registry, path: &Path) -> Result<Entry> {
        let mtime = filestat(request, registry, path)?;
        Ok(Entry::new(path, &request.config().datadir, mtime))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mtime(&self) -> DateTime<Local> {
        self.mtime
    }

    pub fn data(&self) -> Option<&EntryData> {
        self.data.as_ref()
    }

    pub fn with_data(mut self, data: EntryData) -> Entry {
        self.data = Some(data);
        self
    }

    /// Parses the file with the parser registered for its extension. Loading
    /// twice is a no-op.
    pub fn load(&mut self, request: &Rc<Request>, registry: &Registry) -> Result<()> {
        if self.data.is_some() {
            return Ok(());
        }
        let extension = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Clone the parser out so no borrow of the request data is held
        // while it runs.
        let parser = request.data().extensions.get(&extension).cloned();
        match parser {
            Some(parser) => {
                self.data = Some(parser(&self.path, request, registry)?);
                Ok(())
            }
            None => Err(Error::UnknownExtension(self.path.clone())),
        }
    }

    /// The path relative to the data directory, without extension, with `/`
    /// separators.
    pub fn file_path(&self) -> String {
        let relative = self.path.strip_prefix(&self.datadir).unwrap_or(self.path.as_path());
        let relative = relative.with_extension("");
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The entry's category: the directory part of [`Entry::file_path`].
    pub fn category(&self) -> String {
        let file_path = self.file_path();
        match file_path.rfind('/') {
            Some(i) => file_path[..i].to_owned(),
            None => String::new(),
        }
    }

    /// The file name without directory or extension.
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The timestamp as `YYYYMMDDhhmmss`; archive requests match on its
    /// prefix.
    pub fn fulltime(&self) -> String {
        self.mtime.format("%Y%m%d%H%M%S").to_string()
    }

    /// The day the entry was written, formatted like `Sun, 14 Mar 2004`.
    pub fn date(&self) -> String {
        self.mtime.format("%a, %d %b %Y").to_string()
    }

    /// The flavour template the entry asks to be shown with.
    pub fn template_name(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.metadata.get("template_name"))
            .map(String::as_str)
    }

    /// The entry as template variables: its time fields, its location, its
    /// metadata and its contents.
    pub fn variables(&self) -> Vec<(String, Value)> {
        let text = |s: String| Value::String(s);
        let time = |fmt: &str| Value::String(self.mtime.format(fmt).to_string());
        let utc = self.mtime.with_timezone(&Utc);
        let mut vars = vec![
            (String::from("filename"), text(self.path.to_string_lossy().into_owned())),
            (String::from("file_path"), text(self.file_path())),
            (String::from("fn"), text(self.name())),
            (String::from("absolute_path"), text(self.category())),
            (String::from("path"), text(self.category())),
            (
                String::from("tb_id"),
                text(format!("_{}", self.file_path().replace('/', "_"))),
            ),
            (String::from("mtime"), Value::from(self.mtime.timestamp())),
            (String::from("ti"), time("%H:%M")),
            (String::from("hr"), time("%H")),
            (String::from("min"), time("%M")),
            (String::from("mo"), time("%b")),
            (String::from("mo_num"), time("%m")),
            (String::from("da"), time("%d")),
            (String::from("dw"), time("%A")),
            (String::from("yr"), time("%Y")),
            (String::from("fulltime"), text(self.fulltime())),
            (String::from("date"), text(self.date())),
            (String::from("timezone"), time("%Z")),
            (
                String::from("w3cdate"),
                text(utc.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            ),
            (
                String::from("rfc822date"),
                text(utc.format("%a, %d %b %Y %H:%M GMT").to_string()),
            ),
        ];
        if let Some(data) = &self.data {
            vars.extend(
                data.metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone()))),
            );
            vars.push((String::from("title"), text(data.title.clone())));
            vars.push((String::from("body"), text(data.body.clone())));
        }
        vars
    }
}

/// Newest first; equal timestamps fall back to the path, also descending.
pub fn sort_entries(mut entries: Vec<Entry>) -> Vec<Entry> {
    entries.sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| b.path.cmp(&a.path)));
    entries
}

type Result<T> = std::result::Result<T, Error>;

/// Errors reading entries.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems reading an entry file.
    Io { path: PathBuf, err: std::io::Error },

    /// Returned when no parser is registered for an entry's extension.
    UnknownExtension(PathBuf),

    /// Returned when a `preformat`, `postformat` or `filestat` handler fails.
    Handler(HandlerError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { path, err } => write!(f, "Reading entry `{}`: {}", path.display(), err),
            Error::UnknownExtension(path) => {
                write!(f, "No entry parser for `{}`", path.display())
            }
            Error::Handler(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { path: _, err } => Some(err),
            Error::UnknownExtension(_) => None,
            Error::Handler(err) => Some(err),
        }
    }
}

impl From<HandlerError> for Error {
    /// Converts [`HandlerError`]s into [`Error`]. This allows us to use the
    /// `?` operator on chain runs.
    fn from(err: HandlerError) -> Error {
        Error::Handler(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::callback::Handler;
    use crate::config::Config;
    use crate::request::{http_for, Data};
    use chrono::TimeZone;

    struct TestCase {
        text: &'static str,
        wanted: EntryData,
    }

    fn request() -> Rc<Request> {
        let mut data = Data::default();
        data.extensions = default_extensions();
        Rc::new(Request::new(Config::with_datadir("/blog"), http_for("/", ""), data))
    }

    fn metadata(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parse_test(test_case: &TestCase) -> Result<()> {
        let result = parse_entry(test_case.text, &request(), &Registry::new(), None)?;
        assert_eq!(
            test_case.wanted, result,
            "wanted \"{:?}\"; found \"{:?}\"",
            test_case.wanted, result
        );
        Ok(())
    }

    #[test]
    fn test_parse_entry() -> Result<()> {
        parse_test(&TestCase {
            text: "  Hello  \n#tags rust blog\n#draft\nLine one\n#not meta\n",
            wanted: EntryData {
                title: String::from("Hello"),
                body: String::from("Line one\n#not meta\n"),
                metadata: metadata(&[("tags", "rust blog"), ("draft", "")]),
            },
        })
    }

    #[test]
    fn test_parse_empty_entry() -> Result<()> {
        parse_test(&TestCase {
            text: "",
            wanted: EntryData::default(),
        })
    }

    #[test]
    fn test_parse_title_only() -> Result<()> {
        parse_test(&TestCase {
            text: "Just a title",
            wanted: EntryData {
                title: String::from("Just a title"),
                ..EntryData::default()
            },
        })
    }

    #[test]
    fn test_preformat_and_postformat_chains() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut registry = Registry::new();
        registry.register(
            "preformat",
            Handler::new("shout", |args: &mut Preformat| {
                Ok(match args.parser.as_str() {
                    "shout" => Some(args.story.concat().to_uppercase()),
                    _ => None,
                })
            }),
        )?;
        registry.register(
            "postformat",
            Handler::new("sign", |args: &mut Postformat| {
                args.entry_data.body.push_str("-- me");
                Ok(())
            }),
        )?;
        let request = request();
        let shouted = parse_entry("T\n#parser shout\nhi\n", &request, &registry, None)?;
        assert_eq!("HI\n-- me", shouted.body);
        let plain = parse_entry("T\nhi\n", &request, &registry, None)?;
        assert_eq!("hi\n-- me", plain.body);
        let defaulted = parse_entry("T\nhi\n", &request, &registry, Some("shout"))?;
        assert_eq!("HI\n-- me", defaulted.body);
        Ok(())
    }

    #[test]
    fn test_entry_paths_and_times() {
        let mtime = Local.with_ymd_and_hms(2004, 3, 14, 9, 5, 0).unwrap();
        let entry = Entry::new("/blog/dev/rust/first.txt", "/blog", mtime);
        assert_eq!("dev/rust/first", entry.file_path());
        assert_eq!("dev/rust", entry.category());
        assert_eq!("first", entry.name());
        assert_eq!("20040314090500", entry.fulltime());
        assert_eq!("Sun, 14 Mar 2004", entry.date());

        let top = Entry::new("/blog/first.txt", "/blog", mtime);
        assert_eq!("", top.category());
    }

    #[test]
    fn test_load_reads_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = crate::util::create_entry(
            dir.path(),
            "",
            "a.txt",
            "Title",
            &[("template_name", "special")],
            "Body\n",
            None,
        )?;
        let request = request();
        let mut entry = Entry::new(&path, dir.path(), Local::now());
        entry.load(&request, &Registry::new())?;
        assert_eq!(Some("special"), entry.template_name());
        let vars = entry.variables();
        assert!(vars.contains(&(String::from("title"), Value::from("Title"))));
        assert!(vars.contains(&(String::from("body"), Value::from("Body\n"))));

        let mut unknown = Entry::new(dir.path().join("b.xyz"), dir.path(), Local::now());
        assert!(unknown.load(&request, &Registry::new()).is_err());
        Ok(())
    }

    #[test]
    fn test_sort_entries() {
        let older = Local.with_ymd_and_hms(2004, 3, 14, 9, 5, 0).unwrap();
        let newer = Local.with_ymd_and_hms(2005, 1, 1, 0, 0, 0).unwrap();
        let sorted = sort_entries(vec![
            Entry::new("/blog/a.txt", "/blog", older),
            Entry::new("/blog/b.txt", "/blog", newer),
            Entry::new("/blog/c.txt", "/blog", older),
        ]);
        let names: Vec<String> = sorted.iter().map(Entry::name).collect();
        assert_eq!(vec!["b", "c", "a"], names);
    }
}
