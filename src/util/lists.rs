use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListError {
    #[error("Failed to read list file: {0}")]
    Io(#[from] std::io::Error),
}

/// Operator override list (whitelist or blacklist).
///
/// Entries are compared case-insensitively: both the entry and the channel
/// fields are lowercased. An entry matches a channel when it is a substring
/// of the URL (which covers URL equality) or equals the channel name.
#[derive(Debug, Clone, Default)]
pub struct EntryList {
    entries: Vec<String>,
}

impl EntryList {
    /// Loads a list file. A missing file is an empty list.
    pub fn load(path: &Path) -> Result<Self, ListError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let list = Self::parse(&content);
                tracing::info!(path = %path.display(), entries = list.len(), "Loaded list file");
                Ok(list)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "List file not found, using empty list");
                Ok(Self::default())
            }
            Err(e) => Err(ListError::Io(e)),
        }
    }

    /// One entry per line; blank lines and `#` comments are skipped.
    pub fn parse(content: &str) -> Self {
        Self::from_entries(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.as_ref().trim().to_lowercase();
            if !entry.is_empty() && !list.contains(&entry) {
                list.push(entry);
            }
        }
        Self { entries: list }
    }

    pub fn matches(&self, name: &str, url: &str) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let name = name.to_lowercase();
        let url = url.to_lowercase();
        self.entries
            .iter()
            .any(|entry| url.contains(entry.as_str()) || name == *entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
