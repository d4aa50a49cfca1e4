//! The default request handler. It resolves the path info, lists and sorts
//! the entries, cuts the list down, lets plugins prepare it and renders the
//! result. Each step is a chain plugins can take over.

use crate::blog::Error;
use crate::callback::{done_when_true, Registry};
use crate::entry::{sort_entries, Entry};
use crate::pathinfo::{month_to_num, process_path_info};
use crate::renderer::{Content, Renderer};
use crate::request::{BlogType, Request, RequestArgs};
use crate::walk::walk;
use chrono::{DateTime, Local, Utc};
use log::debug;
use std::rc::Rc;

/// The argument of the `sortlist` chain.
pub struct EntryList {
    pub request: Rc<Request>,
    pub entry_list: Vec<Entry>,
}

/// The argument of the `logrequest` chain, run once a request is answered.
pub struct LogRequest {
    pub request: Rc<Request>,

    /// The configured `log_file`, if any.
    pub filename: Option<String>,

    /// The status code of the response, e.g. `200`.
    pub return_code: String,
}

/// Handles `request` from path info to rendered response.
pub fn handle_request(request: &Rc<Request>, registry: &Registry) -> Result<(), Error> {
    request.data_mut().timezone = Local::now().format("%Z").to_string();
    let mut args = RequestArgs {
        request: Rc::clone(request),
    };

    let handled = registry
        .dispatch::<RequestArgs, bool>("pathinfo", &mut args)
        .done(done_when_true)
        .run()?;
    if handled != Some(true) {
        process_path_info(request);
    }

    let entries = match registry
        .dispatch::<RequestArgs, Option<Vec<Entry>>>("filelist", &mut args)
        .done(done_when_true)
        .run()?
    {
        Some(Some(entries)) => entries,
        _ => file_list(request, registry)?,
    };
    request.data_mut().entry_list = entries.clone();

    let mut sort_args = EntryList {
        request: Rc::clone(request),
        entry_list: entries,
    };
    let mut entries = match registry
        .dispatch::<EntryList, Option<Vec<Entry>>>("sortlist", &mut sort_args)
        .done(done_when_true)
        .run()?
    {
        Some(Some(entries)) => entries,
        _ => sort_entries(sort_args.entry_list),
    };

    let num_entries = request.config().num_entries;
    if num_entries > 0 && request.data().truncate {
        entries.truncate(num_entries);
    }

    let mtime = entries.first().map_or_else(Local::now, Entry::mtime);
    set_latest_dates(request, mtime);
    request.data_mut().entry_list = entries;

    registry
        .dispatch::<RequestArgs, ()>("prepare", &mut args)
        .run()?;

    let mut entries = std::mem::take(&mut request.data_mut().entry_list);
    for entry in &mut entries {
        entry.load(request, registry)?;
    }
    request.data_mut().entry_list = entries.clone();

    let mut renderer = Renderer::new(request, registry);
    let return_code = if entries.is_empty() {
        debug!("No entries for `{}`", request.data().pi_bl);
        renderer.add_header("Status", "404 Not Found")?;
        renderer.set_content(not_found(request));
        "404"
    } else {
        renderer.set_content(Content::Entries(entries));
        "200"
    };
    log_request(request, registry, return_code)?;
    renderer.render(true)?;
    Ok(())
}

/// The entries of the directory or file the request resolved to. Date
/// archives keep the entries written in the requested period only.
pub fn file_list(request: &Rc<Request>, registry: &Registry) -> Result<Vec<Entry>, Error> {
    let (bl_type, root) = {
        let data = request.data();
        (data.bl_type, data.root_datadir.clone())
    };
    let paths = match bl_type {
        BlogType::Dir => walk(request, &root, request.config().depth),
        BlogType::File => vec![root],
    };
    let mut entries = Vec::with_capacity(paths.len());
    for path in &paths {
        entries.push(Entry::from_file(request, registry, path)?);
    }

    let data = request.data();
    if !data.pi_yr.is_empty() {
        let prefix = format!("{}{}{}", data.pi_yr, month_to_num(&data.pi_mo), data.pi_da);
        entries.retain(|entry| entry.fulltime().starts_with(&prefix));
    }
    Ok(entries)
}

fn set_latest_dates(request: &Request, mtime: DateTime<Local>) {
    let utc = mtime.with_timezone(&Utc);
    let mut data = request.data_mut();
    data.latest_date = mtime.format("%a, %d %b %Y").to_string();
    data.latest_w3cdate = utc.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    data.latest_rfc822date = utc.format("%a, %d %b %Y %H:%M GMT").to_string();
}

fn not_found(request: &Request) -> Content {
    let config = request.config();
    Content::page(
        "The page you are looking for is not available",
        &format!(
            "Somehow I cannot find the page you want. Go Back to <a href=\"{}\">{}</a>?",
            config.base_url(),
            config.blog_title
        ),
    )
}

fn log_request(request: &Rc<Request>, registry: &Registry, return_code: &str) -> Result<(), Error> {
    let mut args = LogRequest {
        request: Rc::clone(request),
        filename: request.config().log_file.clone(),
        return_code: return_code.to_owned(),
    };
    registry
        .dispatch::<LogRequest, ()>("logrequest", &mut args)
        .run()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::callback::Handler;
    use crate::config::Config;
    use crate::entry::default_extensions;
    use crate::request::{http_for, Data};
    use crate::util::create_entry;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::path::Path;
    use std::time::SystemTime;

    fn at(year: i32, month: u32, day: u32) -> SystemTime {
        SystemTime::from(Local.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap())
    }

    fn blog() -> std::io::Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        create_entry(root, "", "one.txt", "One", &[], "1\n", Some(at(2004, 3, 1)))?;
        create_entry(root, "dev", "two.txt", "Two", &[], "2\n", Some(at(2004, 3, 14)))?;
        create_entry(root, "dev", "three.txt", "Three", &[], "3\n", Some(at(2005, 1, 2)))?;
        std::fs::write(root.join("story.test"), "$title;")?;
        std::fs::write(root.join("content_type.test"), "text/plain")?;
        Ok(dir)
    }

    fn request(datadir: &Path, path_info: &str) -> Rc<Request> {
        let mut config = Config::with_datadir(datadir);
        config.default_flavour = String::from("test");
        config.num_entries = 2;
        let mut data = Data::default();
        data.extensions = default_extensions();
        Rc::new(Request::new(config, http_for(path_info, ""), data))
    }

    fn titles(request: &Request) -> Vec<String> {
        request
            .data()
            .entry_list
            .iter()
            .filter_map(Entry::data)
            .map(|data| data.title.clone())
            .collect()
    }

    #[test]
    fn test_handle_directory() -> Result<(), Box<dyn std::error::Error>> {
        let dir = blog()?;
        let request = request(dir.path(), "/");
        handle_request(&request, &Registry::new())?;
        assert_eq!(vec!["Three", "Two"], titles(&request));
        assert_eq!("Three;Two;", request.response().body());
        assert_eq!("200 OK", request.response().status());
        Ok(())
    }

    #[test]
    fn test_handle_archive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = blog()?;
        let request = request(dir.path(), "/2004/Mar");
        handle_request(&request, &Registry::new())?;
        assert_eq!(vec!["Two", "One"], titles(&request));
        let data = request.data();
        assert_eq!("Sun, 14 Mar 2004", data.latest_date);
        Ok(())
    }

    #[test]
    fn test_handle_missing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = blog()?;
        let request = request(dir.path(), "/nothing/here");
        let codes = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::new();
        let seen = Rc::clone(&codes);
        registry.register(
            "logrequest",
            Handler::new("log", move |args: &mut LogRequest| {
                seen.borrow_mut().push(args.return_code.clone());
                Ok(())
            }),
        )?;
        handle_request(&request, &registry)?;
        assert_eq!("404 Not Found", request.response().status());
        assert_eq!(
            "The page you are looking for is not available;",
            request.response().body()
        );
        assert_eq!(vec!["404"], *codes.borrow());
        Ok(())
    }

    #[test]
    fn test_plugin_file_list_and_sort() -> Result<(), Box<dyn std::error::Error>> {
        let dir = blog()?;
        let request = request(dir.path(), "/");
        let mut registry = Registry::new();
        let only = dir.path().join("one.txt");
        registry.register(
            "filelist",
            Handler::new("single", move |args: &mut RequestArgs| {
                let mtime = Local.with_ymd_and_hms(2004, 3, 1, 12, 0, 0).unwrap();
                let datadir = args.request.config().datadir.clone();
                Ok(Some(vec![Entry::new(&only, datadir, mtime)]))
            }),
        )?;
        registry.register(
            "sortlist",
            Handler::new("keep", |args: &mut EntryList| {
                Ok(Some(args.entry_list.clone()))
            }),
        )?;
        handle_request(&request, &registry)?;
        assert_eq!(vec!["One"], titles(&request));
        Ok(())
    }
}
