use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use easel_core::cache::ListingCache;
use easel_core::pipeline::{ArchiveOptions, RunSummary, execute_archive};
use easel_core::report::{ReportFormat, generate_report, save_report};
use easel_core::settings::{Settings, expand_path};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use url::Url;

// Helper functions for the archive handler

/// Load URLs from either a file or a single URL argument
pub fn load_urls_from_source(
    url: Option<&Url>,
    urls_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(urls_file_path) = urls_file {
        load_urls_from_file(urls_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        Err("Either --url or --urls-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file, skipping blank lines and `#` comments
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let path = expand_path(path);
    let content = fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read URLs file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add https:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.contains(char::is_whitespace) {
        eprintln!("{} Skipping invalid URL '{}'", "⚠".yellow(), line);
        return None;
    }

    if let Ok(url) = Url::parse(line)
        && url.has_host()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("https://{}", line);
    if let Ok(url) = Url::parse(&with_scheme)
        && url.host_str().is_some_and(|host| host.contains('.'))
    {
        return Some(with_scheme);
    }

    eprintln!("{} Skipping invalid URL '{}'", "⚠".yellow(), line);
    None
}

fn flag(matches: &ArgMatches, id: &str) -> bool {
    matches
        .try_get_one::<bool>(id)
        .ok()
        .flatten()
        .copied()
        .unwrap_or(false)
}

fn value<'a, T>(matches: &'a ArgMatches, id: &str) -> Option<&'a T>
where
    T: std::any::Any + Clone + Send + Sync + 'static,
{
    matches.try_get_one::<T>(id).ok().flatten()
}

/// Build settings from an optional `--config` file and command-line overrides.
pub fn settings_from_matches(matches: &ArgMatches) -> Result<Settings> {
    let mut settings = match value::<PathBuf>(matches, "config") {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    if let Some(dir) = value::<PathBuf>(matches, "cache-dir") {
        settings.cache_dir = dir.clone();
    }
    if let Some(dir) = value::<PathBuf>(matches, "output") {
        settings.output_dir = dir.clone();
    }
    if let Some(workers) = value::<usize>(matches, "workers") {
        settings.workers = *workers;
    }
    if let Some(site) = value::<Url>(matches, "site") {
        settings.site_url = site.as_str().to_string();
    }
    if let Some(cookie) = value::<String>(matches, "cookie") {
        settings.session_cookie = Some(cookie.clone());
    }
    if let Some(timeout) = value::<u64>(matches, "timeout") {
        settings.timeout_secs = *timeout;
    }
    if let Some(max_pages) = value::<u32>(matches, "max-pages") {
        settings.max_pages = *max_pages;
    }

    let settings = settings.validated().context("Invalid settings")?;
    debug!("Effective settings: {:?}", settings);
    Ok(settings)
}

pub fn print_banner() {
    println!(
        "{} {}",
        "easel".bright_magenta().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black()
    );
    println!("{}", "catalog listings in, artworks out".bright_black());
    println!();
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> io::Result<Option<String>> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    if io::stdin().read_line(&mut response)? == 0 {
        return Ok(None);
    }
    Ok(Some(response.trim().to_string()))
}

pub fn print_run_summary(summary: &RunSummary) {
    if let Some(ref error) = summary.error {
        println!("{} {}: {}", "✗".red().bold(), summary.input_url, error);
        return;
    }

    let folder = summary.folder.as_deref().unwrap_or("?");
    let source = if summary.from_cache { " (cached listing)" } else { "" };
    println!(
        "{} {} {} {}",
        "✓".green().bold(),
        folder.bright_white().bold(),
        format!("{} artworks{}", summary.discovered, source).bright_black(),
        summary.input_url.bright_black()
    );
    println!(
        "  {} saved, {} skipped, {} failed",
        summary.saved().to_string().green(),
        summary.skipped().to_string().cyan(),
        (summary.resolve_failed() + summary.fetch_failed()).to_string().red()
    );

    for failure in summary.failures() {
        println!(
            "  {} {} ({}): {}",
            "•".yellow(),
            failure.record.title,
            failure.record.id,
            failure.result
        );
    }
}

fn write_report(summaries: &[RunSummary], path: &PathBuf, format: Option<&String>) -> Result<()> {
    let path = expand_path(path);
    let format = format
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or_else(|| ReportFormat::from_path(&path));

    let content = generate_report(summaries, format).context("Failed to render report")?;
    save_report(&content, &path)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    println!(
        "{} Report saved to {}",
        "✓".green().bold(),
        path.display().to_string().bright_white()
    );
    Ok(())
}

async fn archive_batch(urls: Vec<String>, settings: Settings, refresh: bool, quiet: bool) -> Result<Vec<RunSummary>> {
    let options = ArchiveOptions {
        urls,
        settings,
        refresh,
        show_progress_bars: !quiet,
    };

    let progress_callback = Arc::new(move |msg: String| {
        if !quiet {
            println!("{}", msg);
        }
    });

    let summaries = execute_archive(options, Some(progress_callback))
        .await
        .context("Archive run failed")?;

    println!();
    for summary in &summaries {
        print_run_summary(summary);
    }
    Ok(summaries)
}

pub async fn handle_archive(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let settings = settings_from_matches(sub_matches)?;
    let refresh = flag(sub_matches, "refresh");
    let url = value::<Url>(sub_matches, "url");
    let urls_file = value::<PathBuf>(sub_matches, "urls-file");

    if !quiet {
        print_divider();
        println!("{} {}", "Output:".blue(), settings.output_dir.display().to_string().bright_white());
        println!("{} {}", "Cache:".blue(), settings.cache_dir.display().to_string().bright_white());
        println!("{} {}", "Workers:".blue(), settings.workers.to_string().bright_white());
        if refresh {
            println!("{} {}", "Listings:".blue(), "refreshing".yellow());
        }
        print_divider();
        println!();
    }

    let summaries = if url.is_none() && urls_file.is_none() {
        run_interactive(settings, refresh, quiet).await?
    } else {
        let urls = load_urls_from_source(url, urls_file).map_err(anyhow::Error::msg)?;
        archive_batch(urls, settings, refresh, quiet).await?
    };

    if let Some(report_path) = value::<PathBuf>(sub_matches, "report") {
        write_report(&summaries, report_path, value::<String>(sub_matches, "format"))?;
    }

    if !summaries.is_empty() && summaries.iter().all(RunSummary::is_error) {
        bail!("No input could be archived");
    }
    Ok(())
}

/// Prompt for listing URLs one at a time until `exit` or end of input.
async fn run_interactive(settings: Settings, refresh: bool, quiet: bool) -> Result<Vec<RunSummary>> {
    let mut all = Vec::new();
    loop {
        let Some(line) = print_prompt("Enter a listing URL (or 'exit'):")? else {
            println!();
            break;
        };
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let Some(url) = parse_url_line(&line) else {
            continue;
        };
        let summaries = archive_batch(vec![url], settings.clone(), refresh, quiet).await?;
        all.extend(summaries);
        println!();
    }
    Ok(all)
}

pub fn handle_cache_list(sub_matches: &ArgMatches) -> Result<()> {
    let settings = settings_from_matches(sub_matches)?;
    let cache = ListingCache::new(settings.cache_dir);
    let entries = cache
        .entries()
        .with_context(|| format!("Failed to read cache directory {}", cache.dir().display()))?;

    if entries.is_empty() {
        println!("{} No cached listings in {}", "ℹ".blue(), cache.dir().display());
        return Ok(());
    }

    println!(
        "{} cached listing(s) in {}",
        entries.len().to_string().bright_white().bold(),
        cache.dir().display()
    );
    for entry in entries {
        println!(
            "  {:<14} {:<40} {:>6} records  {}",
            entry.page_type.to_string().cyan(),
            entry.key.bright_white(),
            entry.records,
            entry.stored_at.bright_black()
        );
    }
    Ok(())
}

pub fn handle_cache_clear(sub_matches: &ArgMatches) -> Result<()> {
    let settings = settings_from_matches(sub_matches)?;
    let cache = ListingCache::new(settings.cache_dir);

    if let Some(url) = value::<String>(sub_matches, "url") {
        let (page, removed) = cache
            .forget(url)
            .with_context(|| format!("Failed to forget cached listing for {}", url))?;
        if removed {
            println!("{} Removed cached {} listing '{}'", "✓".green().bold(), page.page_type, page.key);
        } else {
            println!("{} No cached {} listing '{}'", "ℹ".blue(), page.page_type, page.key);
        }
        return Ok(());
    }
    let removed = cache
        .clear()
        .with_context(|| format!("Failed to clear cache directory {}", cache.dir().display()))?;

    println!(
        "{} Removed {} cached listing(s) from {}",
        "✓".green().bold(),
        removed,
        cache.dir().display()
    );
    Ok(())
}
