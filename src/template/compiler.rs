use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffixes stripped from channel names when no `#suffixes:` line overrides them.
pub const DEFAULT_SUFFIXES: [&str; 3] = ["HD", "高清", "综合"];

const GENRE_MARKER: &str = ",#genre#";
const SUFFIXES_DIRECTIVE: &str = "#suffixes:";

/// Fatal template errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read template file: {0}")]
    Io(#[from] std::io::Error),
}

/// A rule line that was skipped during compilation.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("line {line}: invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        line: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("line {line}: rule `{rule}` appears before any category header")]
    OrphanRule { line: usize, rule: String },

    #[error("line {line}: rule `{rule}` has no canonical name")]
    EmptyCanonical { line: usize, rule: String },
}

/// Canonical name slot used to order channels inside a category.
#[derive(Debug, Clone)]
pub(crate) struct OrderEntry {
    pub(crate) canonical: String,
    /// `^(?:canonical)$`, or `None` when the canonical is not a valid regex.
    pub(crate) full: Option<Regex>,
}

impl OrderEntry {
    fn new(canonical: &str) -> Self {
        Self {
            canonical: canonical.to_string(),
            full: Regex::new(&format!("^(?:{canonical})$")).ok(),
        }
    }

    pub(crate) fn matches(&self, name: &str) -> bool {
        match &self.full {
            Some(re) => re.is_match(name),
            None => self.canonical == name,
        }
    }
}

/// One `Name,#genre#` block of the template.
#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    /// Matching rules in declaration order.
    pub(crate) rules: Vec<Regex>,
    /// Canonical names in declaration order, for sorting only.
    pub(crate) order: Vec<OrderEntry>,
}

impl Category {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.as_str())
    }

    pub fn canonical_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|o| o.canonical.as_str())
    }
}

/// Compiled rule template.
///
/// Immutable once built; a [`Classifier`](super::Classifier) owns one and
/// caches results against it.
#[derive(Debug, Default)]
pub struct Template {
    categories: Vec<Category>,
    aliases: HashMap<String, String>,
    suffixes: Vec<String>,
    skipped: Vec<RuleError>,
}

impl Template {
    /// Reads and compiles a template file.
    ///
    /// # Errors
    ///
    /// [`TemplateError::NotFound`] when the file is absent. Bad rule lines
    /// are not errors; see [`Template::skipped`].
    pub fn compile(path: &Path) -> Result<Self, TemplateError> {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TemplateError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(TemplateError::Io(e)),
        };
        let template = Self::compile_str(&source);
        tracing::info!(
            path = %path.display(),
            categories = template.categories.len(),
            rules = template.rule_count(),
            aliases = template.alias_count(),
            skipped = template.skipped.len(),
            "Compiled category template"
        );
        Ok(template)
    }

    /// Compiles template text in a single pass over its lines.
    pub fn compile_str(source: &str) -> Self {
        let mut template = Template {
            suffixes: DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let mut suffixes_overridden = false;
        let mut current: Option<usize> = None;
        let mut canonicals: HashMap<String, String> = HashMap::new();
        let mut aliases: HashMap<String, String> = HashMap::new();

        for (idx, raw) in source.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(list) = line.strip_prefix(SUFFIXES_DIRECTIVE) {
                // First directive wins
                if !suffixes_overridden {
                    template.suffixes = list
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                    suffixes_overridden = true;
                }
                continue;
            }

            if line.starts_with('#') {
                continue;
            }

            if line.ends_with(GENRE_MARKER) {
                let name = line.split(',').next().unwrap_or_default().trim();
                current = Some(template.open_category(name));
                continue;
            }

            let Some(cat_idx) = current else {
                let err = RuleError::OrphanRule {
                    line: line_no,
                    rule: line.to_string(),
                };
                tracing::warn!(error = %err, "Skipping template rule");
                template.skipped.push(err);
                continue;
            };

            let mut segments = line.split('|').map(str::trim);
            let canonical = segments.next().unwrap_or_default();
            if canonical.is_empty() {
                let err = RuleError::EmptyCanonical {
                    line: line_no,
                    rule: line.to_string(),
                };
                tracing::warn!(error = %err, "Skipping template rule");
                template.skipped.push(err);
                continue;
            }

            let rule = match Regex::new(canonical) {
                Ok(re) => re,
                Err(source) => {
                    let err = RuleError::InvalidPattern {
                        line: line_no,
                        pattern: canonical.to_string(),
                        source,
                    };
                    tracing::warn!(error = %err, "Skipping template rule");
                    template.skipped.push(err);
                    continue;
                }
            };

            canonicals.insert(canonical.to_lowercase(), canonical.to_string());
            for alias in segments.filter(|s| !s.is_empty()) {
                aliases.insert(alias.to_lowercase(), canonical.to_string());
            }

            let category = &mut template.categories[cat_idx];
            category.rules.push(rule);
            category.order.push(OrderEntry::new(canonical));
        }

        // A canonical name always maps to itself, and every alias points at a
        // name that does, so normalizing a normalized name is a no-op.
        for (key, target) in aliases {
            if canonicals.contains_key(&key) {
                continue;
            }
            let resolved = canonicals
                .get(&target.to_lowercase())
                .cloned()
                .unwrap_or(target);
            template.aliases.insert(key, resolved);
        }
        template.aliases.extend(canonicals);

        if template.categories.is_empty() {
            tracing::warn!("Template declares no categories");
        }

        template
    }

    /// Returns the index of `name`, declaring it if new.
    fn open_category(&mut self, name: &str) -> usize {
        if let Some(idx) = self.categories.iter().position(|c| c.name == name) {
            return idx;
        }
        self.categories.push(Category::new(name));
        self.categories.len() - 1
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub(crate) fn category_index(&self, name: &str) -> Option<usize> {
        self.categories.iter().position(|c| c.name == name)
    }

    /// Canonical name registered for a lowercase alias.
    pub fn canonical_for(&self, lowercase_alias: &str) -> Option<&str> {
        self.aliases.get(lowercase_alias).map(String::as_str)
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    pub fn rule_count(&self) -> usize {
        self.categories.iter().map(|c| c.rules.len()).sum()
    }

    /// Rule lines dropped during compilation.
    pub fn skipped(&self) -> &[RuleError] {
        &self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
#suffixes:HD,4K
央视,#genre#
CCTV-1|CCTV1|中央一套
CCTV-2

卫视,#genre#
湖南卫视|湖南
";

    #[test]
    fn test_compile_categories_in_order() {
        let template = Template::compile_str(SAMPLE);
        let names: Vec<_> = template.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["央视", "卫视"]);
        assert_eq!(template.rule_count(), 3);
        assert!(template.skipped().is_empty());
    }

    #[test]
    fn test_only_canonical_compiled_all_segments_aliased() {
        let template = Template::compile_str(SAMPLE);
        let cctv = template.category("央视").unwrap();
        assert_eq!(cctv.rules().collect::<Vec<_>>(), vec!["CCTV-1", "CCTV-2"]);
        assert_eq!(template.canonical_for("cctv-1"), Some("CCTV-1"));
        assert_eq!(template.canonical_for("cctv1"), Some("CCTV-1"));
        assert_eq!(template.canonical_for("中央一套"), Some("CCTV-1"));
        assert_eq!(template.canonical_for("cctv-2"), Some("CCTV-2"));
        // Three canonicals plus cctv1, 中央一套 and 湖南
        assert_eq!(template.alias_count(), 6);
    }

    #[test]
    fn test_suffix_directive_overrides_defaults() {
        let template = Template::compile_str(SAMPLE);
        assert_eq!(template.suffixes(), &["HD".to_string(), "4K".to_string()]);

        let template = Template::compile_str("News,#genre#\nCNN\n");
        assert_eq!(template.suffixes(), &["HD", "高清", "综合"]);
    }

    #[test]
    fn test_orphan_rule_skipped() {
        let template = Template::compile_str("CCTV1\nNews,#genre#\nCNN\n");
        assert_eq!(template.rule_count(), 1);
        assert_eq!(template.skipped().len(), 1);
        assert!(matches!(
            template.skipped()[0],
            RuleError::OrphanRule { line: 1, .. }
        ));
        assert!(template.canonical_for("cctv1").is_none());
    }

    #[test]
    fn test_rule_without_canonical_reported() {
        let template = Template::compile_str("News,#genre#\n|cnn intl\nCNN\n");
        assert_eq!(template.rule_count(), 1);
        assert_eq!(template.skipped().len(), 1);
        assert!(matches!(
            &template.skipped()[0],
            RuleError::EmptyCanonical { line: 2, rule } if rule == "|cnn intl"
        ));
        assert!(template.canonical_for("cnn intl").is_none());
    }

    #[test]
    fn test_invalid_regex_skipped_compilation_continues() {
        let template = Template::compile_str("News,#genre#\nCNN(\nBBC\n");
        let news = template.category("News").unwrap();
        assert_eq!(news.rules().collect::<Vec<_>>(), vec!["BBC"]);
        assert!(matches!(
            template.skipped()[0],
            RuleError::InvalidPattern { line: 2, .. }
        ));
    }

    #[test]
    fn test_canonical_beats_earlier_alias() {
        let template = Template::compile_str("A,#genre#\nFoo|bar\nBar|baz\n");
        assert_eq!(template.canonical_for("bar"), Some("Bar"));
        assert_eq!(template.canonical_for("baz"), Some("Bar"));
        assert_eq!(template.canonical_for("foo"), Some("Foo"));
    }

    #[test]
    fn test_reopened_category_appends() {
        let template = Template::compile_str("A,#genre#\nx\nB,#genre#\ny\nA,#genre#\nz\n");
        assert_eq!(template.categories().len(), 2);
        let a = template.category("A").unwrap();
        assert_eq!(a.canonical_names().collect::<Vec<_>>(), vec!["x", "z"]);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = Template::compile(Path::new("/tmp/chanlist_no_such_template.txt")).unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(_)));
    }

    #[test]
    fn test_order_entry_full_string_match() {
        let entry = OrderEntry::new("CCTV-1");
        assert!(entry.matches("CCTV-1"));
        assert!(!entry.matches("CCTV-10"));

        let broken = OrderEntry::new("CNN(");
        assert!(broken.full.is_none());
        assert!(broken.matches("CNN("));
    }
}
