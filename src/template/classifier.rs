use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::compiler::Template;
use crate::config::Config;
use crate::playlist::{Channel, UNCATEGORIZED};
use crate::util::{clean_name, strip_suffixes, EntryList};

/// Tuning knobs for a [`Classifier`].
#[derive(Debug, Clone)]
pub struct ClassifierOptions {
    /// Clean names (trim, collapse whitespace, `_`/`-` → space) before use.
    pub clean_names: bool,
    /// Trace every match decision.
    pub debug: bool,
    /// Inputs smaller than this are matched sequentially.
    pub batch_threshold: usize,
    pub batch_size: usize,
    /// Upper bound on concurrently running batches.
    pub workers: usize,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            clean_names: true,
            debug: false,
            batch_threshold: 1000,
            batch_size: 2000,
            workers: 4,
        }
    }
}

impl ClassifierOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            clean_names: config.matcher.clean_names,
            debug: config.matcher.debug,
            batch_threshold: config.performance.batch_threshold,
            batch_size: config.performance.batch_size.max(1),
            workers: config.performance.workers.max(1),
        }
    }
}

/// Cache counters, reset on [`Classifier::reload`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub normalize_entries: usize,
    pub match_entries: usize,
}

/// Matches and normalizes channel names against a compiled [`Template`].
///
/// Both lookups are cached by the raw input name. The caches belong to this
/// instance and are only valid for its current template.
#[derive(Debug)]
pub struct Classifier {
    template: Arc<Template>,
    options: ClassifierOptions,
    match_cache: HashMap<String, String>,
    normalize_cache: HashMap<String, String>,
    hits: u64,
    misses: u64,
}

impl Classifier {
    pub fn new(template: Template, options: ClassifierOptions) -> Self {
        if options.clean_names {
            tracing::debug!("Channel name cleaning enabled");
        }
        Self {
            template: Arc::new(template),
            options,
            match_cache: HashMap::new(),
            normalize_cache: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Swaps in a recompiled template and drops every cached result.
    pub fn reload(&mut self, template: Template) {
        self.template = Arc::new(template);
        self.match_cache.clear();
        self.normalize_cache.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            normalize_entries: self.normalize_cache.len(),
            match_entries: self.match_cache.len(),
        }
    }

    /// Maps a raw channel name to its canonical template name.
    ///
    /// The name is cleaned and stripped of the template's suffixes, then
    /// looked up (lowercased) in the alias table. Names with no alias come
    /// back cleaned but otherwise unchanged. `normalize(normalize(x))` always
    /// equals `normalize(x)`.
    pub fn normalize(&mut self, raw: &str) -> String {
        if let Some(hit) = self.normalize_cache.get(raw) {
            self.hits += 1;
            return hit.clone();
        }
        self.misses += 1;

        let normalized = normalize_with(&self.template, raw, self.options.clean_names);
        self.normalize_cache
            .insert(raw.to_string(), normalized.clone());
        normalized
    }

    /// Returns the category of the first rule found in the cleaned name, or
    /// [`UNCATEGORIZED`].
    ///
    /// Categories are tried in template order and rules in declaration order
    /// within each category, so an earlier category always wins.
    pub fn match_category(&mut self, raw: &str) -> String {
        if let Some(hit) = self.match_cache.get(raw) {
            self.hits += 1;
            return hit.clone();
        }
        self.misses += 1;

        let category = match_with(
            &self.template,
            raw,
            self.options.clean_names,
            self.options.debug,
        );
        self.match_cache.insert(raw.to_string(), category.clone());
        category
    }

    pub fn is_in_template(&mut self, raw: &str) -> bool {
        self.match_category(raw) != UNCATEGORIZED
    }

    /// Matches many names at once.
    ///
    /// Small inputs go through [`match_category`](Self::match_category) one by
    /// one. Larger inputs are split into `batch_size` chunks that run on the
    /// blocking pool, at most `workers` at a time. Each batch builds its own
    /// map and the results are merged here, which also warms the match cache.
    pub async fn batch_match(&mut self, names: &[String]) -> HashMap<String, String> {
        let total = names.len();
        if total < self.options.batch_threshold {
            return names
                .iter()
                .map(|name| (name.clone(), self.match_category(name)))
                .collect();
        }

        let batch_size = self.options.batch_size.max(1);
        let workers = self.options.workers.max(1);
        tracing::info!(
            total = total,
            workers = workers,
            batch_size = batch_size,
            "Starting batch classification"
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        for batch in names.chunks(batch_size) {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let template = Arc::clone(&self.template);
            let batch = batch.to_vec();
            let clean = self.options.clean_names;
            let debug = self.options.debug;
            tasks.spawn_blocking(move || {
                let _permit = permit;
                batch
                    .into_iter()
                    .map(|name| {
                        let category = match_with(&template, &name, clean, debug);
                        (name, category)
                    })
                    .collect::<HashMap<String, String>>()
            });
        }

        let mut results: HashMap<String, String> = HashMap::with_capacity(total);
        let mut completed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(local) => {
                    completed += 1;
                    tracing::debug!(batch = completed, size = local.len(), "Batch classified");
                    // Every name a worker matched was a cache miss
                    self.misses += local.len() as u64;
                    results.extend(local);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Classification batch failed, retrying inline");
                }
            }
        }

        // Anything a failed batch left out is matched here.
        for name in names {
            if !results.contains_key(name) {
                let category = self.match_category(name);
                results.insert(name.clone(), category);
            }
        }
        for (name, category) in &results {
            self.match_cache
                .entry(name.clone())
                .or_insert_with(|| category.clone());
        }

        tracing::info!(total = results.len(), "Batch classification complete");
        results
    }

    /// Orders channels for probing and export.
    ///
    /// Whitelisted channels come first, in input order. The rest are grouped
    /// by category in template order; inside a category they follow the
    /// position of their normalized name in the category's canonical list,
    /// with unlisted names last. Channels whose category the template does
    /// not declare go at the very end. Ties keep input order.
    pub fn sort_by_template(&mut self, channels: Vec<Channel>, whitelist: &EntryList) -> Vec<Channel> {
        let template = Arc::clone(&self.template);
        let categories = template.categories();

        let (whitelisted, others): (Vec<Channel>, Vec<Channel>) = channels
            .into_iter()
            .partition(|c| whitelist.matches(&c.name, &c.url));

        let mut buckets: Vec<Vec<(usize, Channel)>> = vec![Vec::new(); categories.len()];
        let mut undeclared = Vec::new();
        for channel in others {
            match template.category_index(&channel.category) {
                Some(idx) => {
                    let normalized = self.normalize(&channel.name);
                    let order = &categories[idx].order;
                    let rank = order
                        .iter()
                        .position(|entry| entry.matches(&normalized))
                        .unwrap_or(order.len());
                    buckets[idx].push((rank, channel));
                }
                None => undeclared.push(channel),
            }
        }

        tracing::info!(
            whitelisted = whitelisted.len(),
            undeclared = undeclared.len(),
            "Sorted channels by template"
        );

        let mut sorted = whitelisted;
        for mut bucket in buckets {
            bucket.sort_by_key(|(rank, _)| *rank);
            sorted.extend(bucket.into_iter().map(|(_, c)| c));
        }
        sorted.extend(undeclared);
        sorted
    }
}

fn normalize_with(template: &Template, raw: &str, clean: bool) -> String {
    if let Some(canonical) = template.canonical_for(&raw.trim().to_lowercase()) {
        return canonical.to_string();
    }

    let cleaned = if clean {
        clean_name(raw)
    } else {
        raw.to_string()
    };
    let stripped = strip_suffixes(&cleaned, template.suffixes(), clean);
    // A name made only of suffixes keeps them
    let base = if stripped.trim().is_empty() {
        cleaned
    } else {
        stripped
    };

    match template.canonical_for(&base.trim().to_lowercase()) {
        Some(canonical) => canonical.to_string(),
        None => base,
    }
}

// Compiled `regex` patterns cannot fail at match time, so a lookup never
// aborts part way through.
fn match_with(template: &Template, raw: &str, clean: bool, debug: bool) -> String {
    let cleaned = if clean {
        clean_name(raw)
    } else {
        raw.to_string()
    };

    for category in template.categories() {
        if let Some(rule) = category.rules.iter().find(|r| r.is_match(&cleaned)) {
            if debug {
                tracing::debug!(
                    name = %raw,
                    cleaned = %cleaned,
                    category = %category.name,
                    rule = %rule.as_str(),
                    "Channel matched"
                );
            }
            return category.name.clone();
        }
    }

    if debug {
        tracing::debug!(name = %raw, cleaned = %cleaned, "Channel matched no rule");
    }
    UNCATEGORIZED.to_string()
}
