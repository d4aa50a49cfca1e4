use anyhow::{anyhow, Context, Result};
use blosxom::blog::{create_blog, Blog};
use blosxom::build::build_site;
use blosxom::config::{Config, CONFIG_FILE};
use clap::{App, Arg, ArgMatches};
use log::LevelFilter;
use percent_encoding::percent_decode_str;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use url::Url;

fn main() -> Result<()> {
    let matches = App::new(blosxom::NAME)
        .version(blosxom::VERSION)
        .about("Renders a file-based blog")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .takes_value(true)
                .help("The configuration file [default: ./config.yaml]"),
        )
        .arg(
            Arg::with_name("render")
                .short("r")
                .long("render")
                .value_name("URL")
                .takes_value(true)
                .help("Renders a single url of the blog to stdout"),
        )
        .arg(
            Arg::with_name("headers")
                .short("H")
                .long("headers")
                .help("With --render, prints the response headers too"),
        )
        .arg(
            Arg::with_name("static")
                .short("s")
                .long("static")
                .value_name("incremental")
                .takes_value(true)
                .min_values(0)
                .help("Renders the whole blog into static_dir"),
        )
        .arg(
            Arg::with_name("test")
                .short("t")
                .long("test")
                .help("Checks the installation (the default action)"),
        )
        .arg(
            Arg::with_name("create")
                .short("C")
                .long("create")
                .value_name("DIR")
                .takes_value(true)
                .help("Creates a new blog in DIR"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .help("Prints nothing but the requested output"),
        )
        .get_matches();
    let quiet = matches.is_present("quiet");

    if let Some(dir) = matches.value_of("create") {
        init_logging(None, quiet);
        let dir = create_blog(Path::new(dir))?;
        if !quiet {
            println!("Created a new blog in '{}'.", dir.display());
        }
        return Ok(());
    }

    let config_file = Path::new(matches.value_of("config").unwrap_or(CONFIG_FILE));
    let config = Config::from_file(config_file)
        .with_context(|| format!("Loading {}", config_file.display()))?;
    init_logging(Some(&config), quiet);
    let blog = Blog::new(config)?;

    run(&blog, &matches, quiet)
}

fn run(blog: &Blog, matches: &ArgMatches, quiet: bool) -> Result<()> {
    if matches.is_present("static") {
        let incremental = matches
            .value_of("static")
            .map_or(false, |mode| mode.starts_with("incr"));
        let written = build_site(blog, incremental)?;
        if !quiet {
            println!("Wrote {} files.", written);
        }
        return Ok(());
    }

    if let Some(url) = matches.value_of("render") {
        let (path_info, query) = split_url(blog.config().base_url(), url)?;
        if !quiet {
            eprintln!("Rendering '{}'", path_info);
        }
        let response = blog.render_url(&path_info, &query)?;
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        if matches.is_present("headers") {
            response.send_headers(&mut out)?;
        }
        response.send_body(&mut out)?;
        out.flush()?;
        return Ok(());
    }

    let stdout = std::io::stdout();
    blog.test_installation(&mut stdout.lock())?;
    Ok(())
}

/// Splits a URL of the blog into decoded path info and query string. A
/// leading `base_url` is dropped.
fn split_url(base_url: &str, url: &str) -> Result<(String, String)> {
    let relative = match base_url.is_empty() {
        true => url,
        false => url.strip_prefix(base_url).unwrap_or(url),
    };
    let base = Url::parse("http://localhost/")?;
    let parsed = base
        .join(relative)
        .map_err(|e| anyhow!("Parsing url `{}`: {}", url, e))?;
    let path_info = percent_decode_str(parsed.path()).decode_utf8_lossy().into_owned();
    Ok((path_info, parsed.query().unwrap_or("").to_owned()))
}

/// Installs the logger. The configured `log_level` applies to the modules in
/// `log_filter` (to everything when it is empty); `RUST_LOG` overrides it.
fn init_logging(config: Option<&Config>, quiet: bool) {
    let level = match config.map(|c| c.log_level.as_str()) {
        Some("critical") | Some("error") => LevelFilter::Error,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        _ if quiet => LevelFilter::Warn,
        None => LevelFilter::Info,
        Some(_) => LevelFilter::Warn,
    };

    let mut builder = env_logger::Builder::new();
    match config.map(|c| c.log_filter.as_slice()) {
        Some(modules) if !modules.is_empty() => {
            for module in modules {
                builder.filter_module(module, level);
            }
        }
        _ => {
            builder.filter_level(level);
        }
    }
    builder.parse_env("RUST_LOG");

    match config.and_then(|c| c.log_file.as_deref()) {
        Some("NONE") => return,
        None | Some("stderr") => {}
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Opening log file `{}`: {}; logging to stderr", path, e),
        },
    }
    let _ = builder.try_init();
}
