use crate::backend::UrlRecord;
use crate::shortcode::ShortToken;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

type Result<T> = std::result::Result<T, crate::error::ShortenerError>;

/// Outcome of shortening a single URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shortened {
    /// The URL was stored under a freshly generated token.
    Created(ShortToken),
    /// The URL was already shortened; carries the existing token.
    Duplicate(ShortToken),
}

impl Shortened {
    pub fn token(&self) -> &ShortToken {
        match self {
            Shortened::Created(token) | Shortened::Duplicate(token) => token,
        }
    }
}

/// One URL of a batch submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Caller-chosen identifier echoed back in the result.
    pub correlation_id: String,
    /// The original URL to be shortened.
    pub original_url: String,
}

/// Shortened URL for one batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResultItem {
    pub correlation_id: String,
    pub short_url: String,
}

/// Outcome of a batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every item was stored and the batch committed.
    Created(Vec<BatchResultItem>),
    /// An item was already shortened; the batch was rolled back.
    Duplicate {
        correlation_id: String,
        short_url: String,
    },
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Shortens a URL on behalf of `owner_id`.
    async fn shorten(&self, owner_id: &str, original_url: &str) -> Result<Shortened>;

    /// Shortens several URLs as one atomic unit.
    async fn shorten_batch(&self, owner_id: &str, items: Vec<BatchItem>) -> Result<BatchOutcome>;

    /// Resolves a short token to its stored record.
    async fn resolve(&self, token: &ShortToken) -> Result<UrlRecord>;

    /// Lists the owner's URLs as a JSON array, or an empty string when
    /// there is nothing to list.
    async fn summary_json(&self, owner_id: &str) -> String;

    /// Schedules the owner's tokens for deletion.
    async fn delete(&self, owner_id: &str, tokens: Vec<ShortToken>);
}
