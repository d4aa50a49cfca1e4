//! Works out what a request's path info asks for. A path info can name:
//!
//! * a category directory: `/dev/rust/`
//! * a single entry, with or without flavour: `/dev/rust/first.html`
//! * a category in another flavour: `/dev/rust/index.rss`
//! * a date archive, optionally below a category: `/dev/2004/Mar/14`
//!
//! The results land in the request [`Data`](crate::request::Data).

use crate::request::{BlogType, Request};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Month names and the two-digit numbers they map to.
pub const MONTHS: [(&str, &str); 12] = [
    ("Jan", "01"),
    ("Feb", "02"),
    ("Mar", "03"),
    ("Apr", "04"),
    ("May", "05"),
    ("Jun", "06"),
    ("Jul", "07"),
    ("Aug", "08"),
    ("Sep", "09"),
    ("Oct", "10"),
    ("Nov", "11"),
    ("Dec", "12"),
];

/// Whether `s` can stand in the month position of an archive path: a month
/// name, a number from `00` to `12`, or `nil`.
pub fn is_month(s: &str) -> bool {
    s == "nil"
        || MONTHS.iter().any(|(name, num)| *name == s || *num == s)
        || s == "00"
}

/// Maps a month name (or `nil`) to its number; anything else is returned
/// unchanged.
pub fn month_to_num(month: &str) -> &str {
    if month == "nil" {
        return "00";
    }
    MONTHS
        .iter()
        .find(|(name, _)| *name == month)
        .map_or(month, |(_, num)| *num)
}

/// Maps a month number to its name; anything else is returned unchanged.
pub fn num_to_month(num: &str) -> &str {
    MONTHS
        .iter()
        .find(|(_, n)| *n == num)
        .map_or(num, |(name, _)| *name)
}

fn is_year(s: &str) -> bool {
    s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_day(s: &str) -> bool {
    s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Returns the first of `extensions` for which `<base>.<ext>` is a file.
pub fn what_ext<'e>(extensions: &'e [String], base: &str) -> Option<&'e str> {
    extensions
        .iter()
        .find(|ext| Path::new(&format!("{}.{}", base, ext)).is_file())
        .map(String::as_str)
}

/// Splits `path` into the part before the extension of its last component
/// and the extension including its dot. Leading dots of a file name do not
/// start an extension.
pub fn splitext(path: &str) -> (&str, &str) {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    let name = &path[name_start..];
    let leading_dots = name.len() - name.trim_start_matches('.').len();
    match name[leading_dots..].rfind('.') {
        Some(i) => path.split_at(name_start + leading_dots + i),
        None => (path, ""),
    }
}

/// Resolves the request's `PATH_INFO` (and `flav` query parameter) into the
/// flavour, category, date and target directory or file of the request.
pub fn process_path_info(request: &Request) {
    let config = request.config();
    let datadir = config.datadir.to_string_lossy().into_owned();
    let extensions: Vec<String> = request.data().extensions.keys().cloned().collect();
    let raw = request.http().get("PATH_INFO").cloned().unwrap_or_default();

    let mut flavour = request
        .form_value("flav")
        .unwrap_or_else(|| config.default_flavour.clone());
    let mut pi_bl = raw.clone();
    let mut pi_yr = String::new();
    let mut pi_mo = String::new();
    let mut pi_da = String::new();
    let mut bl_type = BlogType::Dir;
    let mut root_datadir = PathBuf::from(&datadir);

    let mut path_info = raw.as_str();
    let (stem, ext) = splitext(path_info);
    if stem.ends_with("/index") && !ext.is_empty() {
        flavour = ext[1..].to_owned();
        path_info = stem;
    }
    let mut path_info = path_info.trim_start_matches('/').to_owned();
    let mut absolute = format!("{}/{}", datadir, path_info);
    let mut parts: VecDeque<String> = path_info.split('/').map(str::to_owned).collect();

    if Path::new(&absolute).is_dir() {
        root_datadir = PathBuf::from(&absolute);
    } else if absolute.ends_with("/index")
        && Path::new(&absolute[..absolute.len() - "/index".len()]).is_dir()
    {
        root_datadir = PathBuf::from(&absolute[..absolute.len() - "/index".len()]);
    } else {
        let mut found = what_ext(&extensions, &absolute).map(str::to_owned);
        if found.is_none() {
            let (stem, ext) = splitext(&absolute);
            if !ext.is_empty() {
                if let Some(entry_ext) = what_ext(&extensions, stem) {
                    flavour = ext[1..].to_owned();
                    found = Some(entry_ext.to_owned());
                    absolute = stem.to_owned();
                    path_info = splitext(&path_info).0.to_owned();
                    parts = path_info.split('/').map(str::to_owned).collect();
                }
            }
        }

        match found {
            Some(ext) => {
                bl_type = BlogType::File;
                root_datadir = PathBuf::from(format!("{}.{}", absolute, ext));
            }
            None => {
                // Everything up to the first year-like component is the
                // category.
                let mut category = String::new();
                while let Some(part) = parts.front() {
                    if is_year(part) {
                        break;
                    }
                    let part = parts.pop_front().unwrap_or_default();
                    category = match category.is_empty() {
                        true => part,
                        false => format!("{}/{}", category, part),
                    };
                }
                if !category.is_empty() {
                    root_datadir = PathBuf::from(format!("{}/{}", datadir, category));
                    pi_bl = category;
                }

                if let Some(mut item) = parts.pop_front() {
                    if is_year(&item) {
                        pi_yr = std::mem::take(&mut item);
                        if let Some(next) = parts.pop_front() {
                            item = next;
                            if is_month(&item) {
                                pi_mo = std::mem::take(&mut item);
                                if let Some(next) = parts.pop_front() {
                                    item = next;
                                    if is_day(&item) {
                                        pi_da = std::mem::take(&mut item);
                                        if let Some(next) = parts.pop_front() {
                                            item = next;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    if item == "index" {
                        item.clear();
                    }
                    if !item.is_empty() || !parts.is_empty() {
                        // Not an archive after all.
                        bl_type = BlogType::Dir;
                        root_datadir = PathBuf::from(&absolute);
                    }
                }
            }
        }
    }

    let blog_title_with_path = match pi_bl.is_empty() {
        true => config.blog_title.clone(),
        false => format!("{} : {}", config.blog_title, pi_bl),
    };
    let base_url = config.base_url();
    let url = match pi_bl.starts_with('/') {
        true => format!("{}{}", base_url, pi_bl),
        false => format!("{}/{}", base_url, pi_bl),
    };

    let mut data = request.data_mut();
    data.flavour = flavour;
    data.truncate = pi_yr.is_empty();
    data.pi_bl = pi_bl;
    data.pi_yr = pi_yr;
    data.pi_mo = pi_mo;
    data.pi_da = pi_da;
    data.bl_type = bl_type;
    data.root_datadir = root_datadir;
    data.blog_title_with_path = blog_title_with_path;
    data.url = url;
    data.path_info = parts.into_iter().collect();
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::entry::default_extensions;
    use crate::request::{http_for, Data};

    struct TestCase {
        path_info: &'static str,
        query: &'static str,
        flavour: &'static str,
        pi_bl: &'static str,
        date: (&'static str, &'static str, &'static str),
        bl_type: BlogType,
        root: &'static str,
    }

    fn blog() -> std::io::Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        crate::util::create_entry(dir.path(), "dev", "first.txt", "First", &[], "", None)?;
        crate::util::create_entry(dir.path(), "", "about.txt", "About", &[], "", None)?;
        Ok(dir)
    }

    fn path_info_test(datadir: &Path, test_case: &TestCase) {
        let mut config = Config::with_datadir(datadir);
        config.base_url = Some(String::from("http://example.org/blog"));
        config.blog_title = String::from("Notes");
        let mut data = Data::default();
        data.extensions = default_extensions();
        let request = Request::new(config, http_for(test_case.path_info, test_case.query), data);
        process_path_info(&request);

        let data = request.data();
        let wanted_root = datadir.join(test_case.root);
        let found = (
            data.flavour.as_str(),
            data.pi_bl.as_str(),
            (data.pi_yr.as_str(), data.pi_mo.as_str(), data.pi_da.as_str()),
            data.bl_type,
        );
        let wanted = (
            test_case.flavour,
            test_case.pi_bl,
            test_case.date,
            test_case.bl_type,
        );
        assert_eq!(wanted, found, "path info `{}`", test_case.path_info);
        assert_eq!(
            wanted_root.to_string_lossy().trim_end_matches('/'),
            data.root_datadir.to_string_lossy().trim_end_matches('/'),
            "path info `{}`",
            test_case.path_info
        );
    }

    #[test]
    fn test_process_path_info() -> std::io::Result<()> {
        let dir = blog()?;
        let none = ("", "", "");
        for test_case in &[
            TestCase {
                path_info: "",
                query: "",
                flavour: "html",
                pi_bl: "",
                date: none,
                bl_type: BlogType::Dir,
                root: "",
            },
            TestCase {
                path_info: "/dev/",
                query: "",
                flavour: "html",
                pi_bl: "/dev/",
                date: none,
                bl_type: BlogType::Dir,
                root: "dev",
            },
            TestCase {
                path_info: "/dev/index.rss",
                query: "",
                flavour: "rss",
                pi_bl: "/dev/index.rss",
                date: none,
                bl_type: BlogType::Dir,
                root: "dev",
            },
            TestCase {
                path_info: "/dev/first.rss",
                query: "",
                flavour: "rss",
                pi_bl: "/dev/first.rss",
                date: none,
                bl_type: BlogType::File,
                root: "dev/first.txt",
            },
            TestCase {
                path_info: "/about",
                query: "flav=rss",
                flavour: "rss",
                pi_bl: "/about",
                date: none,
                bl_type: BlogType::File,
                root: "about.txt",
            },
            TestCase {
                path_info: "/dev/2004/Mar/14",
                query: "",
                flavour: "html",
                pi_bl: "dev",
                date: ("2004", "Mar", "14"),
                bl_type: BlogType::Dir,
                root: "dev",
            },
            TestCase {
                path_info: "/2004/03/index.rss",
                query: "",
                flavour: "rss",
                pi_bl: "/2004/03/index.rss",
                date: ("2004", "03", ""),
                bl_type: BlogType::Dir,
                root: "",
            },
        ] {
            path_info_test(dir.path(), test_case);
        }
        Ok(())
    }

    #[test]
    fn test_url_and_title() -> std::io::Result<()> {
        let dir = blog()?;
        let mut config = Config::with_datadir(dir.path());
        config.base_url = Some(String::from("http://example.org/blog"));
        config.blog_title = String::from("Notes");
        let mut data = Data::default();
        data.extensions = default_extensions();
        let request = Request::new(config, http_for("/2004", ""), data);
        process_path_info(&request);
        let data = request.data();
        assert_eq!("http://example.org/blog/2004", data.url);
        assert_eq!("Notes : /2004", data.blog_title_with_path);
        assert!(!data.truncate);
        Ok(())
    }

    #[test]
    fn test_months() {
        assert!(is_month("Mar"));
        assert!(is_month("03"));
        assert!(is_month("nil"));
        assert!(!is_month("13"));
        assert_eq!("03", month_to_num("Mar"));
        assert_eq!("Mar", num_to_month("03"));
        assert_eq!("00", month_to_num("nil"));
        assert_eq!("99", month_to_num("99"));
    }

    #[test]
    fn test_splitext() {
        assert_eq!(("/dev/index", ".rss"), splitext("/dev/index.rss"));
        assert_eq!(("/dev/", ""), splitext("/dev/"));
        assert_eq!(("/a.b/c", ""), splitext("/a.b/c"));
        assert_eq!(("/.rss", ""), splitext("/.rss"));
    }
}
