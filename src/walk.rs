//! Finds entry files (or category directories) below a directory.

use crate::request::Request;
use log::warn;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A configured directory walk. Hidden directories, symlinked directories
/// and directories matching the ignore list are never descended into.
#[derive(Clone, Debug)]
pub struct Walker {
    root: PathBuf,
    depth: usize,
    pattern: Option<Regex>,
    ignore: Option<Regex>,
    folders: bool,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>) -> Walker {
        Walker {
            root: root.into(),
            depth: 0,
            pattern: None,
            ignore: None,
            folders: false,
        }
    }

    /// Limits the walk to `depth` levels below the root; `0` is unlimited.
    pub fn depth(mut self, depth: usize) -> Walker {
        self.depth = depth;
        self
    }

    /// Only yields names matching `pattern`. Without a pattern every name
    /// matches.
    pub fn pattern(mut self, pattern: Regex) -> Walker {
        self.pattern = Some(pattern);
        self
    }

    /// Only yields files whose extension is one of `extensions`.
    pub fn extensions<'e>(self, extensions: impl IntoIterator<Item = &'e str>) -> Walker {
        let alternatives: Vec<String> = extensions.into_iter().map(regex::escape).collect();
        match Regex::new(&format!(r"^.*\.(?:{})$", alternatives.join("|"))) {
            Ok(pattern) => self.pattern(pattern),
            Err(e) => {
                warn!("Building the extension pattern: {}", e);
                self
            }
        }
    }

    /// Skips directories whose path ends with any of `names`.
    pub fn ignore_directories(mut self, names: &[String]) -> Walker {
        if names.is_empty() {
            return self;
        }
        let alternatives: Vec<String> = names.iter().map(|n| regex::escape(n)).collect();
        match Regex::new(&format!(r"(?:{})$", alternatives.join("|"))) {
            Ok(ignore) => self.ignore = Some(ignore),
            Err(e) => warn!("Building the ignore pattern: {}", e),
        }
        self
    }

    /// Yields directories instead of files.
    pub fn folders(mut self, folders: bool) -> Walker {
        self.folders = folders;
        self
    }

    /// The matching paths, in file-name order within each directory. A root
    /// that is not a directory yields nothing.
    pub fn walk(&self) -> Vec<PathBuf> {
        if !self.root.is_dir() {
            return Vec::new();
        }
        let max_depth = match self.depth {
            0 => usize::MAX,
            depth => depth,
        };
        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || self.may_enter(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Walking `{}`: {}", self.root.display(), e);
                    None
                }
            })
            .filter(|entry| self.yields(entry))
            .map(DirEntry::into_path)
            .collect()
    }

    fn may_enter(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return true;
        }
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        !hidden && !self.ignored(entry.path())
    }

    fn ignored(&self, path: &Path) -> bool {
        match &self.ignore {
            Some(ignore) => ignore.is_match(&path.to_string_lossy()),
            None => false,
        }
    }

    fn yields(&self, entry: &DirEntry) -> bool {
        let matches = match &self.pattern {
            Some(pattern) => pattern.is_match(&entry.file_name().to_string_lossy()),
            None => true,
        };
        let path = entry.path();
        matches
            && match self.folders {
                true => path.is_dir() && !self.ignored(path),
                false => path.is_file(),
            }
    }
}

/// Lists the entry files below `root` for `request`: files with a
/// registered entry extension, skipping the configured ignore directories.
pub fn walk(request: &Request, root: &Path, depth: usize) -> Vec<PathBuf> {
    let extensions: Vec<String> = request.data().extensions.keys().cloned().collect();
    if extensions.is_empty() {
        return Vec::new();
    }
    Walker::new(root)
        .depth(depth)
        .extensions(extensions.iter().map(String::as_str))
        .ignore_directories(&request.config().ignore_directories)
        .walk()
}
