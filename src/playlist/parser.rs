use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use super::types::{Channel, UNCATEGORIZED};

fn group_title_regex() -> &'static Regex {
    static GROUP_TITLE: OnceLock<Regex> = OnceLock::new();
    GROUP_TITLE.get_or_init(|| Regex::new(r#"group-title="([^"]+)""#).expect("valid regex"))
}

/// Parses M3U or `name,url` text playlists into channels.
///
/// Both layouts may be mixed in one source:
///
/// - `#EXTINF:...,Name` followed by a URL line. A `group-title="..."`
///   attribute sets the source category for this and later entries.
/// - `Name,http://...` lines.
/// - `Group,#genre#` lines set the source category for plain text sources.
///
/// URLs are cut at the first `$` (player hints) and stripped of the query
/// parameters in `remove_params`. Lines that fit none of the layouts are
/// ignored.
pub fn parse_playlist(content: &str, remove_params: &[String]) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut category: Option<String> = None;
    let mut pending_extinf: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("#EXTINF") {
            if let Some(caps) = group_title_regex().captures(line) {
                category = Some(caps[1].to_string());
            }
            pending_extinf = Some(line.to_string());
            continue;
        }

        if line.starts_with("http") {
            if let Some(extinf) = pending_extinf.take() {
                channels.push(build_channel(&extinf, line, category.as_deref(), remove_params));
            }
            continue;
        }

        if let Some(group) = line.strip_suffix(",#genre#") {
            category = Some(group.trim().to_string());
            pending_extinf = None;
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        if let Some((name, url)) = line.split_once(',') {
            let url = url.trim();
            if url.starts_with("http") {
                channels.push(build_channel(name, url, category.as_deref(), remove_params));
            }
        }
    }

    channels
}

fn build_channel(
    raw_name: &str,
    raw_url: &str,
    category: Option<&str>,
    remove_params: &[String],
) -> Channel {
    Channel::new(clean_name(raw_name), clean_url(raw_url, remove_params))
        .with_original_category(category.unwrap_or(UNCATEGORIZED))
}

/// The display name is whatever follows the last comma.
fn clean_name(raw: &str) -> String {
    raw.rsplit(',').next().unwrap_or(raw).trim().to_string()
}

fn clean_url(raw: &str, remove_params: &[String]) -> String {
    let url = raw.split('$').next().unwrap_or(raw).trim();
    if remove_params.is_empty() {
        return url.to_string();
    }

    match Url::parse(url) {
        Ok(mut parsed) if parsed.query().is_some() => {
            let kept: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| !remove_params.iter().any(|p| p == k.as_ref()))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            if kept.is_empty() {
                parsed.set_query(None);
            } else {
                parsed.query_pairs_mut().clear().extend_pairs(kept);
            }
            parsed.to_string()
        }
        Ok(_) => url.to_string(),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Failed to parse URL for parameter filtering");
            url.to_string()
        }
    }
}
