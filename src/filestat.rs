//! Entry timestamps. Plugins can supply them (from metadata, a database,
//! ...) through the `filestat` chain; otherwise the file's modification time
//! is used. Timestamps are cached for the lifetime of the request.

use crate::callback::{pass_mutated, Registry};
use crate::entry::Error;
use crate::request::Request;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// The argument and result of the `filestat` chain. A handler that knows
/// the timestamp of `filename` returns a copy with `mtime` set; the first
/// such result wins.
#[derive(Clone)]
pub struct FileStat {
    pub request: Rc<Request>,
    pub filename: PathBuf,
    pub mtime: Option<DateTime<Local>>,
}

/// Returns the timestamp of the entry file at `path`.
pub fn filestat(request: &Rc<Request>, registry: &Registry, path: &Path) -> Result<DateTime<Local>, Error> {
    if let Some(mtime) = request.filestat_cache().get(path) {
        return Ok(*mtime);
    }

    let mut args = FileStat {
        request: Rc::clone(request),
        filename: path.to_owned(),
        mtime: None,
    };
    let stat = registry
        .dispatch::<FileStat, FileStat>("filestat", &mut args)
        .mapping(pass_mutated)
        .done(|stat: &FileStat| stat.mtime.is_some())
        .run_or_else(|args| args.clone())?;

    let mtime = match stat.mtime {
        Some(mtime) => mtime,
        None => {
            let modified = std::fs::metadata(path)
                .and_then(|meta| meta.modified())
                .map_err(|err| Error::Io {
                    path: path.to_owned(),
                    err,
                })?;
            DateTime::<Local>::from(modified)
        }
    };
    request.filestat_cache().insert(path.to_owned(), mtime);
    Ok(mtime)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::callback::Handler;
    use crate::config::Config;
    use crate::request::{http_for, Data};
    use chrono::TimeZone;
    use std::cell::Cell;
    use std::time::{Duration, SystemTime};

    fn request() -> Rc<Request> {
        Rc::new(Request::new(
            Config::with_datadir("/blog"),
            http_for("/", ""),
            Data::default(),
        ))
    }

    #[test]
    fn test_filestat_uses_file_mtime() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_079_254_800);
        let path = crate::util::create_entry(dir.path(), "", "a.txt", "A", &[], "", Some(mtime))?;
        let found = filestat(&request(), &Registry::new(), &path)?;
        assert_eq!(1_079_254_800, found.timestamp());
        Ok(())
    }

    #[test]
    fn test_filestat_chain_and_cache() -> Result<(), Box<dyn std::error::Error>> {
        let calls = Rc::new(Cell::new(0));
        let mut registry = Registry::new();
        let counter = Rc::clone(&calls);
        registry.register(
            "filestat",
            Handler::new("fixed", move |args: &mut FileStat| {
                counter.set(counter.get() + 1);
                let mut stat = args.clone();
                stat.mtime = Some(Local.timestamp_opt(1_000_000_000, 0).unwrap());
                Ok(stat)
            }),
        )?;
        let request = request();
        let path = Path::new("/blog/not/on/disk.txt");
        assert_eq!(1_000_000_000, filestat(&request, &registry, path)?.timestamp());
        assert_eq!(1_000_000_000, filestat(&request, &registry, path)?.timestamp());
        assert_eq!(1, calls.get());
        Ok(())
    }

    #[test]
    fn test_filestat_missing_file() {
        let result = filestat(&request(), &Registry::new(), Path::new("/no/such/entry.txt"));
        assert!(result.is_err());
    }
}
