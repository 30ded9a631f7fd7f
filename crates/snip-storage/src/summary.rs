use parking_lot::RwLock;
use snip_core::{ShortToken, SummaryItem};
use std::collections::HashMap;

/// Per-owner listing of created mappings, kept by the in-memory and
/// append-log backends.
///
/// Entries are appended in store order. Anonymous owners (empty id) are
/// never indexed.
#[derive(Debug)]
pub struct UserSummaryIndex {
    base_url: String,
    entries: RwLock<HashMap<String, Vec<(ShortToken, String)>>>,
}

impl UserSummaryIndex {
    /// Creates an empty index whose listings are joined with `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn append(&self, owner_id: &str, token: &ShortToken, original_url: &str) {
        if owner_id.is_empty() {
            return;
        }

        self.entries
            .write()
            .entry(owner_id.to_owned())
            .or_default()
            .push((token.clone(), original_url.to_owned()));
    }

    /// Returns the owner's mappings with absolute short URLs.
    pub fn summary(&self, owner_id: &str) -> Vec<SummaryItem> {
        if owner_id.is_empty() {
            return Vec::new();
        }

        let entries = self.entries.read();
        entries
            .get(owner_id)
            .map(|items| {
                items
                    .iter()
                    .map(|(token, original_url)| SummaryItem {
                        short_url: token.to_url(&self.base_url),
                        original_url: original_url.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of owners with at least one entry.
    pub fn owners(&self) -> usize {
        self.entries.read().len()
    }
}
