use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use orgmap_core::config::{CONFIG_FILE_NAME, default_config_path, expand_path};
use orgmap_core::report::{ReportFormat, object_counts, render, save_report};
use orgmap_core::session::SessionContext;
use orgmap_core::sobjects::search_objects;
use orgmap_core::{AnalysisResult, AnalyzeOptions, MetadataCache, Settings};
use orgmap_scanner::{EventLog, MemoryCookieStore, build_http_client};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, warn};

/// Log level for the number of `-v` flags
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Logs go to stderr so reports on stdout stay clean
pub fn init_logging(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level_for(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

/// A directory argument gets the default file name appended
pub fn config_target(path: &str) -> PathBuf {
    let expanded = expand_path(path);
    if expanded.extension().is_some_and(|ext| ext == "toml") {
        expanded
    } else {
        expanded.join(CONFIG_FILE_NAME)
    }
}

/// Write the default settings to `path`
pub fn write_default_config(path: &Path, force: bool) -> Result<Settings> {
    let settings = Settings::default();
    settings
        .write(path, force)
        .with_context(|| format!("Could not write config to {}", path.display()))?;
    Ok(settings)
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    let raw_path = args
        .get_one::<String>("PATH")
        .map(String::as_str)
        .unwrap_or("~/.config/orgmap/");
    let force = args.get_flag("force");
    let path = config_target(raw_path);

    print_divider();
    println!("{}", "  ORGMAP INITIALIZATION".bright_white().bold());
    print_divider();
    println!();
    println!(
        "{} Target: {}",
        "→".blue(),
        path.display().to_string().bright_white()
    );
    if force && path.exists() {
        println!(
            "{} Overwriting existing config (force mode)",
            "→".yellow().bold()
        );
    }

    let settings = write_default_config(&path, force)?;

    println!(
        "{} Config written: {}",
        "✓".green().bold(),
        path.display().to_string().bright_white()
    );
    println!(
        "  {} max_depth = {}, tracked_objects = {}",
        "•".blue(),
        settings.max_depth.to_string().cyan(),
        settings.tracked_objects.join(", ").cyan()
    );
    println!(
        "  {} Set {} to your browser cookie export before running analyze",
        "ℹ".blue(),
        "cookies_path".bright_white()
    );
    println!();
    Ok(())
}

/// Settings given on the command line; unset values keep the file's
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub max_depth: Option<usize>,
    pub children_limit: Option<usize>,
    pub node_cap: Option<usize>,
    pub tracked_objects: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub cookies_path: Option<PathBuf>,
}

impl CliOverrides {
    /// Read whichever override flags the subcommand defines
    pub fn from_matches(args: &ArgMatches) -> Self {
        let get_usize = |id: &str| {
            args.try_get_one::<usize>(id)
                .ok()
                .flatten()
                .copied()
        };
        Self {
            max_depth: get_usize("depth"),
            children_limit: get_usize("children-limit"),
            node_cap: get_usize("node-cap"),
            tracked_objects: args
                .try_get_many::<String>("track")
                .ok()
                .flatten()
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
            timeout_secs: args.try_get_one::<u64>("timeout").ok().flatten().copied(),
            cookies_path: args.try_get_one::<PathBuf>("cookies").ok().flatten().cloned(),
        }
    }

    pub fn apply(self, mut settings: Settings) -> Settings {
        if let Some(depth) = self.max_depth {
            settings.max_depth = depth;
        }
        if let Some(limit) = self.children_limit {
            settings.children_limit = limit;
        }
        if let Some(cap) = self.node_cap {
            settings.node_cap = cap;
        }
        if !self.tracked_objects.is_empty() {
            settings.tracked_objects = self.tracked_objects;
        }
        if let Some(timeout) = self.timeout_secs {
            settings.timeout_secs = timeout;
        }
        if let Some(path) = self.cookies_path {
            settings.cookies_path = Some(path.to_string_lossy().into_owned());
        }
        settings
    }
}

/// Config file (from `--config` or the default location) merged with flags
pub fn load_settings(args: &ArgMatches) -> Result<Settings> {
    let path = args
        .try_get_one::<PathBuf>("config")
        .ok()
        .flatten()
        .cloned()
        .unwrap_or_else(default_config_path);
    let settings = Settings::load(&path)
        .with_context(|| format!("Could not load config from {}", path.display()))?;
    Ok(CliOverrides::from_matches(args).apply(settings))
}

pub fn load_cookie_store(path: Option<&Path>) -> Result<MemoryCookieStore> {
    let path = path.ok_or_else(|| {
        anyhow!("No cookie export given: pass --cookies or set cookies_path in the config file")
    })?;
    MemoryCookieStore::from_json_file(path)
        .with_context(|| format!("Could not read cookies from {}", path.display()))
}

/// The configured SQLite cache, or a memory-only cache when it cannot be opened
pub fn open_cache(settings: &Settings) -> Arc<MetadataCache> {
    let path = settings.cache_path();
    match MetadataCache::open(&path) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!("Cache at {} unavailable, using memory only: {}", path.display(), e);
            Arc::new(MetadataCache::in_memory())
        }
    }
}

pub fn parse_format(value: &str) -> Result<ReportFormat> {
    ReportFormat::from_str(value).ok_or_else(|| anyhow!("Unknown report format '{}'", value))
}

fn build_session(
    settings: &Settings,
    events: Arc<EventLog>,
) -> Result<SessionContext<MemoryCookieStore>> {
    let store = load_cookie_store(settings.cookies_path().as_deref())?;
    let http = build_http_client(settings.timeout_secs).context("Could not build HTTP client")?;
    Ok(SessionContext::new(store, http, open_cache(settings), events))
}

fn required_url(args: &ArgMatches) -> Result<&str> {
    args.get_one::<String>("URL")
        .map(String::as_str)
        .ok_or_else(|| anyhow!("A URL is required"))
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message.to_string());
    Ok(spinner)
}

pub fn print_events(events: &EventLog) {
    println!("{}", "EVENTS".bright_blue().bold());
    for event in events.snapshot() {
        println!(
            "  {} {} {}",
            event.ts.format("%H:%M:%S%.3f").to_string().dimmed(),
            event.event.cyan(),
            event.data
        );
    }
    println!();
}

pub async fn handle_session(args: &ArgMatches) -> Result<()> {
    let url = required_url(args)?;
    let settings = load_settings(args)?;
    let events = EventLog::shared();
    let session = build_session(&settings, events.clone())?;

    let details = session.session_details(url)?;
    println!("{} {}", "Host:".blue(), details.host.bright_white());
    if details.has_session_cookie {
        println!(
            "{} {} ({})",
            "Session:".blue(),
            "✓ found".green().bold(),
            details.token_hint.unwrap_or_default()
        );
    } else {
        println!("{} {}", "Session:".blue(), "✗ no session cookie".red().bold());
    }

    if args.get_flag("resolve") {
        let connection = session.resolve_connection(url).await?;
        println!(
            "{} {}",
            "API:".blue(),
            connection.base_endpoint().as_str().bright_white()
        );
        println!("{} {}", "Version:".blue(), connection.api_version().cyan());
    }
    Ok(())
}

fn print_summary(result: &AnalysisResult) {
    let graph = &result.graph;
    println!(
        "\n{} {} records, {} links from {} ({})\n",
        "✓".green().bold(),
        graph.nodes.len().to_string().cyan(),
        graph.edges.len().to_string().cyan(),
        graph.root.label.bright_white(),
        graph.root.object_name
    );
    for (object, count) in object_counts(graph) {
        println!("  {} {:<28} {}", "•".blue(), object, count);
    }
    println!();
}

pub async fn handle_analyze(args: &ArgMatches) -> Result<()> {
    let url = required_url(args)?;
    let settings = load_settings(args)?;
    let format = parse_format(
        args.get_one::<String>("format")
            .map(String::as_str)
            .unwrap_or("text"),
    )?;
    let output = args.get_one::<PathBuf>("output");
    let show_events = args.get_flag("show-events");
    let quiet = args.get_flag("quiet");

    let events = EventLog::shared();
    let progress = spinner("Resolving session...")?;
    let callback_bar = progress.clone();
    let session = build_session(&settings, events.clone())?
        .with_progress_callback(Arc::new(move |msg: String| callback_bar.set_message(msg)));

    let options = AnalyzeOptions::new(url)
        .with_tracked_objects(settings.tracked_objects.clone())
        .with_crawl_options(settings.crawl_options());
    let outcome = session.analyze(&options).await;
    progress.finish_and_clear();

    if show_events {
        print_events(&events);
    }
    let result = outcome.context("Analysis failed")?;
    if !quiet {
        print_summary(&result);
    }

    let report = render(&result, format)?;
    match output {
        Some(path) => {
            save_report(&report, path)
                .with_context(|| format!("Could not write report to {}", path.display()))?;
            println!(
                "{} Report saved: {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", report),
    }
    Ok(())
}

pub async fn handle_objects(args: &ArgMatches) -> Result<()> {
    let url = required_url(args)?;
    let settings = load_settings(args)?;
    let session = build_session(&settings, EventLog::shared())?;

    let progress = spinner("Loading object catalog...")?;
    let outcome = session.list_business_sobjects(url).await;
    progress.finish_and_clear();
    let objects = outcome.context("Could not list objects")?;

    let term = args.get_one::<String>("search").map(String::as_str);
    let shown = match term {
        Some(term) => search_objects(&objects, term),
        None => objects.iter().collect(),
    };
    if shown.is_empty() {
        bail!("No objects match '{}'", term.unwrap_or_default());
    }

    for object in &shown {
        let marker = if object.custom { "custom".yellow() } else { "".normal() };
        println!(
            "  {} {} {}",
            format!("{:<40}", object.name).bright_white(),
            object.label,
            marker
        );
    }
    println!("\n{} {} objects", "✓".green().bold(), shown.len());
    Ok(())
}
