//! Exports the [`build_site`] function which renders the whole blog into the
//! `static_dir`: every entry, every category index and every date archive
//! index in each of the `static_flavours`, plus the configured
//! `static_urls`. Plugins can add pages through the `staticrender_filelist`
//! chain.
//!
//! In incremental mode only entries newer than their rendered page are
//! rendered again, together with the category and date indexes they appear
//! on.

use crate::blog::{self, Blog};
use crate::callback::HandlerError;
use crate::entry::{self, Entry};
use crate::filestat::filestat;
use crate::pathinfo::num_to_month;
use crate::request::{http_for, Request};
use crate::util::write_file;
use crate::walk::walk;
use chrono::{DateTime, Local};
use log::{debug, info};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// The argument of the `staticrender_filelist` chain. Handlers push the
/// `(path info, query)` pairs they want rendered onto `filelist`.
pub struct StaticFileList {
    pub request: Rc<Request>,
    pub filelist: Vec<(String, String)>,
    pub flavours: Vec<String>,
}

/// Renders the blog into its `static_dir` and returns the number of pages
/// written.
pub fn build_site(blog: &Blog, incremental: bool) -> Result<usize> {
    let static_dir = blog.config().static_dir.clone().ok_or(Error::NoStaticDir)?;
    let request = blog.initialize(http_for("/", ""), true)?;
    let config = request.config();
    let flavours = config.static_flavours.clone();
    info!("Performing static rendering into '{}'", static_dir.display());
    if incremental {
        info!("Incremental is set.");
    }

    let mut renderme = Vec::new();
    let mut categories = BTreeSet::new();
    let mut dates = BTreeSet::new();
    for path in walk(&request, &config.datadir, 0) {
        let mtime = filestat(&request, blog.registry(), &path)?;
        let file_path = Entry::new(&path, &config.datadir, mtime).file_path();
        let stale = match (incremental, flavours.first()) {
            (true, Some(flavour)) => {
                let rendered = static_dir.join(format!("{}.{}", file_path, flavour));
                modified(&rendered).map_or(true, |smtime| smtime < mtime)
            }
            _ => true,
        };
        if !stale {
            debug!("'{}' is up to date", file_path);
            continue;
        }

        let mut category = String::new();
        categories.insert(category.clone());
        if let Some((parents, _)) = file_path.rsplit_once('/') {
            for part in parents.split('/') {
                category = format!("{}/{}", category, part);
                categories.insert(category.clone());
            }
        }
        dates.extend(date_paths(mtime, config.static_monthnames, config.static_monthnumbers));

        for flavour in &flavours {
            renderme.push((format!("/{}.{}", file_path, flavour), String::new()));
        }
    }
    info!("rendering {} entries.", renderme.len());

    info!("rendering {} category indexes.", categories.len());
    for category in &categories {
        for flavour in &flavours {
            renderme.push((format!("{}/index.{}", category, flavour), String::new()));
        }
    }

    info!("rendering {} date indexes.", dates.len());
    for date in &dates {
        for flavour in &flavours {
            renderme.push((format!("/{}/index.{}", date, flavour), String::new()));
        }
    }

    info!("rendering {} arbitrary urls.", config.static_urls.len());
    for url in &config.static_urls {
        let (url, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
        renderme.push((url.to_owned(), query.to_owned()));
    }

    let mut args = StaticFileList {
        request: Rc::clone(&request),
        filelist: renderme,
        flavours,
    };
    blog.registry()
        .dispatch::<StaticFileList, ()>("staticrender_filelist", &mut args)
        .run()?;

    info!("building {} files.", args.filelist.len());
    for (url, query) in &args.filelist {
        render_to(blog, &static_dir, url, query)?;
    }
    Ok(args.filelist.len())
}

/// The date archive paths an entry written at `mtime` shows up on.
fn date_paths(mtime: DateTime<Local>, monthnames: bool, monthnumbers: bool) -> Vec<String> {
    let year = mtime.format("%Y").to_string();
    let month = mtime.format("%m").to_string();
    let day = mtime.format("%d").to_string();

    let mut paths = vec![year.clone()];
    if monthnumbers {
        paths.push(format!("{}/{}", year, month));
        paths.push(format!("{}/{}/{}", year, month, day));
    }
    if monthnames {
        let name = num_to_month(&month);
        paths.push(format!("{}/{}", year, name));
        paths.push(format!("{}/{}/{}", year, name, day));
    }
    paths
}

fn modified(path: &Path) -> Option<DateTime<Local>> {
    let modified = std::fs::metadata(path).and_then(|meta| meta.modified()).ok()?;
    Some(DateTime::from(modified))
}

fn render_to(blog: &Blog, static_dir: &Path, url: &str, query: &str) -> Result<()> {
    info!("rendering '{}' ...", url);
    let response = blog
        .run(http_for(url, query), true)
        .map_err(|err| Error::Render {
            url: url.to_owned(),
            err,
        })?;
    let path = static_dir.join(url.trim_start_matches('/'));
    write_file(&path, &response.body_bytes()).map_err(|err| Error::Write { path, err })
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for rendering the static site.
#[derive(Debug)]
pub enum Error {
    /// Returned when no `static_dir` is configured.
    NoStaticDir,

    /// Returned for errors setting up the blog or listing its entries.
    Blog(blog::Error),

    /// Returned for errors rendering a page.
    Render { url: String, err: blog::Error },

    /// Returned for I/O problems writing a rendered page.
    Write { path: PathBuf, err: std::io::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NoStaticDir => write!(f, "You must set static_dir in your config file."),
            Error::Blog(err) => err.fmt(f),
            Error::Render { url, err } => write!(f, "Rendering '{}': {}", url, err),
            Error::Write { path, err } => {
                write!(f, "Writing static file '{}': {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NoStaticDir => None,
            Error::Blog(err) => Some(err),
            Error::Render { url: _, err } => Some(err),
            Error::Write { path: _, err } => Some(err),
        }
    }
}

impl From<blog::Error> for Error {
    /// Converts [`blog::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: blog::Error) -> Error {
        Error::Blog(err)
    }
}

impl From<entry::Error> for Error {
    /// Converts [`entry::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: entry::Error) -> Error {
        Error::Blog(blog::Error::Entry(err))
    }
}

impl From<HandlerError> for Error {
    /// Converts [`HandlerError`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: HandlerError) -> Error {
        Error::Blog(blog::Error::Handler(err))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::callback::Handler;
    use crate::config::Config;
    use crate::util::create_entry;
    use chrono::TimeZone;
    use std::time::SystemTime;

    fn at(year: i32, month: u32, day: u32) -> SystemTime {
        SystemTime::from(Local.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap())
    }

    fn blog(root: &Path) -> std::result::Result<Blog, Box<dyn std::error::Error>> {
        let datadir = root.join("entries");
        create_entry(&datadir, "", "one.txt", "One", &[], "1\n", Some(at(2004, 3, 1)))?;
        create_entry(&datadir, "dev", "two.txt", "Two", &[], "2\n", Some(at(2004, 3, 14)))?;
        std::fs::write(datadir.join("story.test"), "$title;")?;

        let mut config = Config::with_datadir(&datadir);
        config.static_dir = Some(root.join("static"));
        config.static_flavours = vec![String::from("test")];
        let mut blog = Blog::new(config)?;
        blog.registry_mut().register(
            "staticrender_filelist",
            Handler::new("feed", |args: &mut StaticFileList| {
                args.filelist.push((String::from("/dev/index.rss"), String::new()));
                Ok(())
            }),
        )?;
        Ok(blog)
    }

    fn read(path: PathBuf) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    #[test]
    fn test_build_site() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let blog = blog(dir.path())?;
        assert_eq!(9, build_site(&blog, false)?);

        let out = dir.path().join("static");
        assert_eq!("One;", read(out.join("one.test"))?);
        assert_eq!("Two;", read(out.join("dev/two.test"))?);
        assert_eq!("Two;One;", read(out.join("index.test"))?);
        assert_eq!("Two;", read(out.join("dev/index.test"))?);
        assert_eq!("Two;One;", read(out.join("2004/index.test"))?);
        assert_eq!("Two;One;", read(out.join("2004/Mar/index.test"))?);
        assert_eq!("One;", read(out.join("2004/Mar/01/index.test"))?);
        assert_eq!("Two;", read(out.join("2004/Mar/14/index.test"))?);
        assert!(read(out.join("dev/index.rss"))?.contains("<title>Two</title>"));
        Ok(())
    }

    #[test]
    fn test_incremental_build() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let blog = blog(dir.path())?;
        build_site(&blog, false)?;
        assert_eq!(1, build_site(&blog, true)?);

        let datadir = dir.path().join("entries");
        create_entry(&datadir, "dev", "three.txt", "Three", &[], "3\n", Some(at(2005, 1, 2)))?;
        // entry, `/` and `/dev` indexes, three date indexes, the feed
        assert_eq!(7, build_site(&blog, true)?);
        assert_eq!(
            "Three;",
            read(dir.path().join("static/2005/Jan/02/index.test"))?
        );
        Ok(())
    }

    #[test]
    fn test_date_paths() {
        let mtime = Local.with_ymd_and_hms(2004, 3, 14, 12, 0, 0).unwrap();
        assert_eq!(
            vec!["2004", "2004/03", "2004/03/14", "2004/Mar", "2004/Mar/14"],
            date_paths(mtime, true, true)
        );
        assert_eq!(vec!["2004"], date_paths(mtime, false, false));
    }

    #[test]
    fn test_requires_static_dir() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let blog = Blog::new(Config::with_datadir("/blog"))?;
        match build_site(&blog, false) {
            Err(Error::NoStaticDir) => Ok(()),
            other => panic!("wanted NoStaticDir; found {:?}", other),
        }
    }
}
