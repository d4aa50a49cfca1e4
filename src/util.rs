use anyhow::{anyhow, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub fn open(path: &Path, kind: &str) -> Result<File> {
    match File::open(path) {
        Err(e) => Err(anyhow!("Opening {} file `{}`: {}", kind, path.display(), e)),
        Ok(file) => Ok(file),
    }
}

/// Writes an entry file `<datadir>/<category>/<name>` with `title` on the
/// first line, one `#key value` line per `metadata` pair and then `body`.
/// Missing category directories are created. When `mtime` is given the
/// file's modification time is set to it.
pub fn create_entry(
    datadir: &Path,
    category: &str,
    name: &str,
    title: &str,
    metadata: &[(&str, &str)],
    body: &str,
    mtime: Option<SystemTime>,
) -> io::Result<PathBuf> {
    let dir = datadir.join(category.trim_matches('/'));
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(name);

    let mut contents = format!("{}\n", title);
    for (key, value) in metadata {
        contents.push_str(&format!("#{} {}\n", key, value));
    }
    contents.push_str(body);
    std::fs::write(&path, contents)?;

    if let Some(mtime) = mtime {
        OpenOptions::new()
            .write(true)
            .open(&path)?
            .set_modified(mtime)?;
    }
    Ok(path)
}

/// Writes `contents` to `path`, creating parent directories as needed.
pub fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)?.write_all(contents)
}
