use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::types::{Channel, IpFamily, Status, UNCATEGORIZED};
use crate::config::{Config, PreferredProtocol};

/// What [`Exporter::export`] managed to write.
#[derive(Debug, Default)]
pub struct ExportSummary {
    pub written: Vec<PathBuf>,
    /// Files that could not be written (already logged).
    pub failed: usize,
}

impl ExportSummary {
    fn record(&mut self, path: &Path, result: Result<usize>) {
        match result {
            Ok(count) => {
                tracing::info!(path = %path.display(), channels = count, "Wrote playlist");
                self.written.push(path.to_path_buf());
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to write playlist");
                self.failed += 1;
            }
        }
    }
}

/// Writes the grouped playlist files.
///
/// Every output file is independent: one failing to write is logged and the
/// remaining ones are still produced.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    preferred: PreferredProtocol,
    epg_url: String,
    logo_url: String,
    m3u_filename: String,
    txt_filename: String,
    uncategorized_path: PathBuf,
}

impl Exporter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_dir: config.main.output_dir.clone(),
            preferred: config.main.preferred_protocol,
            epg_url: config.exporter.epg_url.clone(),
            logo_url: config.exporter.logo_url.clone(),
            m3u_filename: config.exporter.m3u_filename.clone(),
            txt_filename: config.exporter.txt_filename.clone(),
            uncategorized_path: config.paths.uncategorized.clone(),
        }
    }

    /// Writes `all`, `ipv4` and `ipv6` playlists from `channels` (already in
    /// template order) and the uncategorized listing from `uncategorized`.
    pub fn export(&self, channels: &[Channel], uncategorized: &[Channel]) -> ExportSummary {
        let mut summary = ExportSummary::default();

        if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
            tracing::error!(
                path = %self.output_dir.display(),
                error = %e,
                "Failed to create output directory"
            );
        }

        let (v4, v6): (Vec<&Channel>, Vec<&Channel>) = channels
            .iter()
            .partition(|c| c.ip_family() == IpFamily::V4);
        tracing::info!(ipv4 = v4.len(), ipv6 = v6.len(), "Split channels by address family");

        let all: Vec<&Channel> = match self.preferred {
            PreferredProtocol::Ipv6 => v6.iter().chain(v4.iter()).copied().collect(),
            PreferredProtocol::Ipv4 => v4.iter().chain(v6.iter()).copied().collect(),
            PreferredProtocol::Both => channels.iter().collect(),
        };

        self.write_pair(&all, &self.m3u_filename, &self.txt_filename, &mut summary);
        for (family, members) in [(IpFamily::V4, &v4), (IpFamily::V6, &v6)] {
            let stem = family.as_str();
            self.write_pair(members, &format!("{stem}.m3u"), &format!("{stem}.txt"), &mut summary);
        }

        match render_uncategorized(uncategorized) {
            Some((content, count)) => {
                let result = ensure_parent(&self.uncategorized_path)
                    .and_then(|_| write_atomic(&self.uncategorized_path, &content))
                    .map(|_| count);
                summary.record(&self.uncategorized_path, result);
            }
            None => tracing::debug!("No uncategorized channels to export"),
        }

        summary
    }

    fn write_pair(
        &self,
        channels: &[&Channel],
        m3u_name: &str,
        txt_name: &str,
        summary: &mut ExportSummary,
    ) {
        let m3u_path = self.output_dir.join(m3u_name);
        let (m3u, m3u_count) = render_m3u(channels, &self.epg_url, &self.logo_url);
        summary.record(&m3u_path, write_atomic(&m3u_path, &m3u).map(|_| m3u_count));

        let txt_path = self.output_dir.join(txt_name);
        let (txt, txt_count) = render_txt(channels);
        summary.record(&txt_path, write_atomic(&txt_path, &txt).map(|_| txt_count));
    }
}

/// Renders `Category,#genre#` groups of `Name,URL` lines.
///
/// Only online channels are written and each URL appears once (first wins).
pub(crate) fn render_txt(channels: &[&Channel]) -> (String, usize) {
    let mut out = String::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current: Option<&str> = None;
    let mut count = 0;

    for channel in channels {
        if channel.status != Status::Online || !seen.insert(channel.url.as_str()) {
            continue;
        }
        if current != Some(channel.category.as_str()) {
            if current.is_some() {
                out.push('\n');
            }
            out.push_str(&channel.category);
            out.push_str(",#genre#\n");
            current = Some(channel.category.as_str());
        }
        out.push_str(&channel.name);
        out.push(',');
        out.push_str(&channel.url);
        out.push('\n');
        count += 1;
    }

    (out, count)
}

pub(crate) fn render_m3u(channels: &[&Channel], epg_url: &str, logo_url: &str) -> (String, usize) {
    let mut out = format!(
        "#EXTM3U x-tvg-url=\"{epg_url}\" catchup=\"append\" catchup-source=\"?playseek=${{(b)yyyyMMddHHmmss}}-${{(e)yyyyMMddHHmmss}}\"\n"
    );
    let mut count = 0;

    for channel in channels.iter().filter(|c| c.is_online()) {
        let logo = logo_url.replace("{name}", &encode_component(&channel.name));
        out.push_str(&format!(
            "#EXTINF:-1 tvg-name=\"{name}\" group-title=\"{group}\" tvg-logo=\"{logo}\", {name}\n{url}\n",
            name = channel.name,
            group = channel.category,
            url = channel.url,
        ));
        count += 1;
    }

    (out, count)
}

/// Renders uncategorized channels grouped by the category their source used.
/// Offline channels are left out. Returns `None` when nothing qualifies.
pub(crate) fn render_uncategorized(channels: &[Channel]) -> Option<(String, usize)> {
    let mut groups: BTreeMap<&str, Vec<&Channel>> = BTreeMap::new();
    for channel in channels
        .iter()
        .filter(|c| c.category == UNCATEGORIZED && c.status != Status::Offline)
    {
        let group = if channel.original_category.is_empty() {
            UNCATEGORIZED
        } else {
            channel.original_category.as_str()
        };
        groups.entry(group).or_default().push(channel);
    }

    if groups.is_empty() {
        return None;
    }

    let mut out = String::from(
        "# Uncategorized channels, grouped by source category\n# These channels matched no template rule\n\n",
    );
    let mut count = 0;
    for (group, members) in &groups {
        out.push_str(group);
        out.push_str(",#genre#\n");
        for channel in members {
            // A comma in the name would split the line
            out.push_str(&channel.name.replace(',', "，"));
            out.push(',');
            out.push_str(&channel.url);
            out.push('\n');
            count += 1;
        }
        out.push('\n');
    }

    tracing::debug!(groups = groups.len(), channels = count, "Rendered uncategorized channels");
    Some((out, count))
}

/// Writes the failed-probe report, one URL per line, sorted.
///
/// Nothing is written for an empty set. Returns whether a file was written.
pub fn write_failed_urls(path: &Path, failed: &HashSet<String>) -> Result<bool> {
    if failed.is_empty() {
        return Ok(false);
    }
    let mut urls: Vec<&str> = failed.iter().map(String::as_str).collect();
    urls.sort_unstable();
    let mut content = urls.join("\n");
    content.push('\n');

    ensure_parent(path)?;
    write_atomic(path, &content)?;
    tracing::info!(path = %path.display(), urls = urls.len(), "Wrote failed URL report");
    Ok(true)
}

fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Write-to-temp-then-rename so readers never see a half-written playlist.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .with_context(|| {
            format!(
                "Failed to create temporary file '{}': check directory permissions",
                temp_path.display()
            )
        })?;

    file.write_all(content.as_bytes()).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!("Failed to write temporary file '{}'", temp_path.display())
    })?;

    file.sync_all().with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!("Failed to sync temporary file '{}' to disk", temp_path.display())
    })?;

    drop(file);

    std::fs::rename(&temp_path, path).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to rename '{}' to '{}'",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}
