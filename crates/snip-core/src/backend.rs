use crate::error::StorageError;
use crate::shortcode::ShortToken;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A stored URL mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub short_token: ShortToken,
    /// The original URL that was shortened.
    pub original_url: String,
    /// The owner that created the mapping; empty for anonymous callers.
    pub owner_id: String,
    /// Advisory soft-delete flag. Lookups still resolve deleted records.
    pub deleted: bool,
    /// When the record was created, if the backend keeps track of it.
    pub created_at: Option<Timestamp>,
}

/// Result of a successful `store` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// A new mapping was persisted.
    Stored,
    /// The mapping already existed; carries the token already on record.
    Duplicate(ShortToken),
}

impl StoreOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreOutcome::Duplicate(_))
    }
}

/// One entry of an owner's summary listing.
///
/// `short_url` is already joined with the public base address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub short_url: String,
    pub original_url: String,
}

/// Batch scope for backends without transactional semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoopBatch;

/// The capability set every storage backend provides.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Explicit transaction scope returned by [`Backend::begin_transaction`].
    type Batch: Send;

    /// Persists a mapping outside of any batch.
    async fn store(
        &self,
        owner_id: &str,
        token: &ShortToken,
        original_url: &str,
    ) -> Result<StoreOutcome>;

    /// Opens a batch scope. Stores issued through it are committed or rolled
    /// back together by [`Backend::end_transaction`].
    async fn begin_transaction(&self) -> Result<Self::Batch>;

    /// Persists a mapping inside an open batch scope.
    async fn store_in(
        &self,
        batch: &mut Self::Batch,
        owner_id: &str,
        token: &ShortToken,
        original_url: &str,
    ) -> Result<StoreOutcome>;

    /// Commits the batch if no store inside it failed, rolls it back otherwise.
    async fn end_transaction(&self, batch: Self::Batch) -> Result<()>;

    /// Discards every store made through the batch.
    async fn rollback_transaction(&self, batch: Self::Batch) -> Result<()>;

    /// Resolves a token. Returns `Err(NotFound)` for unknown tokens; records
    /// marked deleted still resolve.
    async fn lookup(&self, token: &ShortToken) -> Result<UrlRecord>;

    /// Requests that the given tokens owned by `owner_id` be marked deleted.
    ///
    /// Fire-and-forget: failures are logged by the backend, never returned.
    async fn mark_deleted(&self, owner_id: &str, tokens: Vec<ShortToken>);

    /// Lists the mappings created by `owner_id`. Unknown or anonymous owners
    /// get an empty list.
    async fn summary(&self, owner_id: &str) -> Result<Vec<SummaryItem>>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Releases files, pools and background workers. Pending deletions are
    /// flushed before this returns.
    async fn finalize(&self) -> Result<()>;
}
