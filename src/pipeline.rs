//! One end-to-end run: fetch, parse, classify, filter, sort, probe, export.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::Path;

use crate::config::Config;
use crate::playlist::{parse_playlist, write_failed_urls, Channel, Exporter, Status, UNCATEGORIZED};
use crate::probe::{build_client, SourceFetcher, SpeedProber};
use crate::template::{Classifier, ClassifierOptions, Template};
use crate::util::EntryList;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sources: usize,
    pub parsed: usize,
    pub uncategorized: usize,
    pub blacklisted: usize,
    pub duplicates: usize,
    pub probed: usize,
    pub online: usize,
    pub failed_urls: usize,
    pub files_written: usize,
    pub files_failed: usize,
}

/// Runs the whole pipeline once with the given configuration.
///
/// Fails only when the source list, template or an override list cannot be
/// read. Everything network-side degrades per source or per channel.
pub async fn run(config: &Config, show_progress: bool) -> Result<RunSummary> {
    let sources = load_sources(&config.paths.sources)?;
    let template = Template::compile(&config.paths.template)
        .with_context(|| format!("Failed to compile template {}", config.paths.template.display()))?;
    let whitelist = EntryList::load(&config.paths.whitelist).context("Failed to load whitelist")?;
    let blacklist = EntryList::load(&config.paths.blacklist).context("Failed to load blacklist")?;

    let client = build_client(&config.fetcher.user_agent).context("Failed to build HTTP client")?;
    let mut summary = RunSummary {
        sources: sources.len(),
        ..Default::default()
    };

    // Fetch
    let bar = stage_bar(show_progress, sources.len(), "Fetching sources");
    let fetcher = SourceFetcher::new(client.clone(), &config.fetcher);
    let contents = fetcher
        .fetch_all(&sources, |done, _| bar.set_position(done as u64))
        .await;
    bar.finish_and_clear();
    let fetched = contents.iter().filter(|c| !c.is_empty()).count();
    tracing::info!(fetched = fetched, total = sources.len(), "Fetched sources");

    // Parse
    let mut channels: Vec<Channel> = contents
        .iter()
        .flat_map(|content| parse_playlist(content, &config.url_filter.remove_params))
        .collect();
    summary.parsed = channels.len();
    tracing::info!(channels = channels.len(), "Parsed playlists");

    // Normalize and classify
    let mut classifier = Classifier::new(template, ClassifierOptions::from_config(config));
    for channel in &mut channels {
        channel.name = classifier.normalize(&channel.name);
    }
    let names: Vec<String> = {
        let mut seen = HashSet::new();
        channels
            .iter()
            .filter(|c| seen.insert(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect()
    };
    let categories = classifier.batch_match(&names).await;
    for channel in &mut channels {
        if let Some(category) = categories.get(&channel.name) {
            channel.category.clone_from(category);
        }
    }

    // Template filter
    let (mut matched, mut uncategorized): (Vec<Channel>, Vec<Channel>) = channels
        .into_iter()
        .partition(|c| classifier.is_in_template(&c.name));
    summary.uncategorized = uncategorized.len();
    if config.matcher.keep_uncategorized {
        matched.extend(uncategorized.iter().cloned());
    }
    tracing::info!(
        matched = matched.len(),
        uncategorized = uncategorized.len(),
        kept = config.matcher.keep_uncategorized,
        "Applied template filter"
    );

    // Blacklist
    let before = matched.len();
    matched.retain(|c| !blacklist.matches(&c.name, &c.url));
    uncategorized.retain(|c| !blacklist.matches(&c.name, &c.url));
    summary.blacklisted = before - matched.len();
    if summary.blacklisted > 0 {
        tracing::info!(removed = summary.blacklisted, "Applied blacklist");
    }

    // Sort, then drop repeated URLs so the first in template order survives
    let sorted = classifier.sort_by_template(matched, &whitelist);
    let mut channels = dedup_by_url(sorted);
    summary.duplicates = before - summary.blacklisted - channels.len();

    let stats = classifier.cache_stats();
    tracing::info!(
        hits = stats.hits,
        misses = stats.misses,
        normalize_entries = stats.normalize_entries,
        match_entries = stats.match_entries,
        "Classifier cache"
    );

    // Probe
    let bar = stage_bar(show_progress, channels.len(), "Testing streams");
    let prober = SpeedProber::new(client, &config.tester);
    let mut failed = HashSet::new();
    prober
        .probe(
            &mut channels,
            |done, _| bar.set_position(done as u64),
            &mut failed,
            &whitelist,
        )
        .await;
    bar.finish_and_clear();
    summary.probed = channels.len();
    summary.online = channels.iter().filter(|c| c.is_online()).count();
    summary.failed_urls = failed.len();

    match write_failed_urls(&config.paths.failed_urls, &failed) {
        Ok(true) => tracing::info!(
            path = %config.paths.failed_urls.display(),
            count = failed.len(),
            "Wrote failed URL report"
        ),
        Ok(false) => {}
        Err(e) => tracing::error!(error = %e, "Failed to write failed URL report"),
    }

    // Kept uncategorized channels were probed; report only the live ones
    if config.matcher.keep_uncategorized {
        uncategorized = channels
            .iter()
            .filter(|c| c.category == UNCATEGORIZED && c.status == Status::Online)
            .cloned()
            .collect();
    }

    // Export
    let exported = Exporter::from_config(config).export(&channels, &uncategorized);
    summary.files_written = exported.written.len();
    summary.files_failed = exported.failed;

    tracing::info!(
        online = summary.online,
        total = summary.probed,
        failed = summary.failed_urls,
        files = summary.files_written,
        "Run complete"
    );
    Ok(summary)
}

/// Reads the source list: one URL per line, blanks and `#` comments skipped.
fn load_sources(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source list {}", path.display()))?;
    let sources: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();
    if sources.is_empty() {
        anyhow::bail!("Source list {} contains no URLs", path.display());
    }
    tracing::info!(path = %path.display(), sources = sources.len(), "Loaded source list");
    Ok(sources)
}

fn dedup_by_url(channels: Vec<Channel>) -> Vec<Channel> {
    let mut seen = HashSet::new();
    channels
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

fn stage_bar(visible: bool, len: usize, message: &'static str) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{msg:>18} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(message);
    bar
}
