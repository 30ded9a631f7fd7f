use crate::summary::UserSummaryIndex;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jiff::Timestamp;
use snip_core::backend::Result;
use snip_core::{Backend, NoopBatch, ShortToken, StorageError, StoreOutcome, SummaryItem, UrlRecord};
use tracing::trace;

/// In-memory implementation of the [`Backend`] trait using DashMap.
///
/// Nothing survives a restart. Duplicates are detected by short token
/// collision, so two different URLs that happen to produce the same token
/// are reported as a duplicate of the first one.
#[derive(Debug)]
pub struct InMemoryBackend {
    storage: DashMap<String, UrlRecord>,
    summaries: UserSummaryIndex,
}

impl InMemoryBackend {
    /// Creates a new in-memory backend whose summaries use `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            storage: DashMap::new(),
            summaries: UserSummaryIndex::new(base_url),
        }
    }

    /// Creates a new in-memory backend with the specified capacity.
    pub fn with_capacity(base_url: impl Into<String>, capacity: usize) -> Self {
        Self {
            storage: DashMap::with_capacity(capacity),
            summaries: UserSummaryIndex::new(base_url),
        }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    type Batch = NoopBatch;

    async fn store(
        &self,
        owner_id: &str,
        token: &ShortToken,
        original_url: &str,
    ) -> Result<StoreOutcome> {
        match self.storage.entry(token.as_str().to_owned()) {
            Entry::Occupied(_) => {
                trace!(token = %token, "token already stored");
                return Ok(StoreOutcome::Duplicate(token.clone()));
            }
            Entry::Vacant(slot) => {
                slot.insert(UrlRecord {
                    short_token: token.clone(),
                    original_url: original_url.to_owned(),
                    owner_id: owner_id.to_owned(),
                    deleted: false,
                    created_at: Some(Timestamp::now()),
                });
            }
        }

        self.summaries.append(owner_id, token, original_url);
        Ok(StoreOutcome::Stored)
    }

    async fn begin_transaction(&self) -> Result<NoopBatch> {
        Ok(NoopBatch)
    }

    async fn store_in(
        &self,
        _batch: &mut NoopBatch,
        owner_id: &str,
        token: &ShortToken,
        original_url: &str,
    ) -> Result<StoreOutcome> {
        self.store(owner_id, token, original_url).await
    }

    async fn end_transaction(&self, _batch: NoopBatch) -> Result<()> {
        Ok(())
    }

    async fn rollback_transaction(&self, _batch: NoopBatch) -> Result<()> {
        Ok(())
    }

    async fn lookup(&self, token: &ShortToken) -> Result<UrlRecord> {
        self.storage
            .get(token.as_str())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(token.to_string()))
    }

    async fn mark_deleted(&self, owner_id: &str, tokens: Vec<ShortToken>) {
        // Nothing to flush; deletion is only tracked by the relational backend.
        trace!(owner_id, count = tokens.len(), "ignoring deletion request");
    }

    async fn summary(&self, owner_id: &str) -> Result<Vec<SummaryItem>> {
        Ok(self.summaries.summary(owner_id))
    }

    async fn finalize(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const BASE_URL: &str = "http://localhost:8080";

    fn token(s: &str) -> ShortToken {
        ShortToken::new_unchecked(s)
    }

    #[tokio::test]
    async fn store_and_lookup() {
        let backend = InMemoryBackend::new(BASE_URL);

        let outcome = backend
            .store("alice", &token("abc123"), "https://example.com")
            .await
            .unwrap();
        assert_eq!(outcome, StoreOutcome::Stored);

        let record = backend.lookup(&token("abc123")).await.unwrap();
        assert_eq!(record.original_url, "https://example.com");
        assert_eq!(record.owner_id, "alice");
        assert!(!record.deleted);
        assert!(record.created_at.is_some());
    }

    #[tokio::test]
    async fn lookup_unknown_is_not_found() {
        let backend = InMemoryBackend::new(BASE_URL);

        let err = backend.lookup(&token("unknown")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn token_collision_is_duplicate() {
        let backend = InMemoryBackend::new(BASE_URL);

        backend
            .store("alice", &token("abc123"), "https://example.com")
            .await
            .unwrap();
        let outcome = backend
            .store("bob", &token("abc123"), "https://other.com")
            .await
            .unwrap();

        assert_eq!(outcome, StoreOutcome::Duplicate(token("abc123")));
        let record = backend.lookup(&token("abc123")).await.unwrap();
        assert_eq!(record.original_url, "https://example.com");
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn same_url_under_different_tokens_is_not_duplicate() {
        // Duplicate detection here is by token, not by URL content.
        let backend = InMemoryBackend::new(BASE_URL);

        backend
            .store("alice", &token("aaa"), "https://example.com")
            .await
            .unwrap();
        let outcome = backend
            .store("alice", &token("bbb"), "https://example.com")
            .await
            .unwrap();

        assert_eq!(outcome, StoreOutcome::Stored);
        assert_eq!(backend.len(), 2);
    }

    #[tokio::test]
    async fn mark_deleted_is_a_no_op() {
        let backend = InMemoryBackend::new(BASE_URL);
        backend
            .store("alice", &token("abc123"), "https://example.com")
            .await
            .unwrap();

        backend.mark_deleted("alice", vec![token("abc123")]).await;

        let record = backend.lookup(&token("abc123")).await.unwrap();
        assert!(!record.deleted);
    }

    #[tokio::test]
    async fn summary_lists_owner_urls_only() {
        let backend = InMemoryBackend::new(BASE_URL);
        backend
            .store("alice", &token("aaa"), "https://a.com")
            .await
            .unwrap();
        backend
            .store("bob", &token("bbb"), "https://b.com")
            .await
            .unwrap();

        let summary = backend.summary("alice").await.unwrap();
        assert_eq!(
            summary,
            vec![SummaryItem {
                short_url: "http://localhost:8080/aaa".to_string(),
                original_url: "https://a.com".to_string(),
            }]
        );
        assert!(backend.summary("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_scope_is_a_no_op() {
        let backend = InMemoryBackend::new(BASE_URL);

        let mut batch = backend.begin_transaction().await.unwrap();
        backend
            .store_in(&mut batch, "alice", &token("aaa"), "https://a.com")
            .await
            .unwrap();
        backend.end_transaction(batch).await.unwrap();

        assert!(backend.lookup(&token("aaa")).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_access() {
        let backend = Arc::new(InMemoryBackend::with_capacity(BASE_URL, 16));
        let mut handles = vec![];

        for i in 0..10u64 {
            let backend = Arc::clone(&backend);
            handles.push(tokio::spawn(async move {
                let t = ShortToken::new_unchecked(format!("code-{:03}", i));
                backend
                    .store("alice", &t, &format!("https://example{}.com", i))
                    .await
                    .unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..10u64 {
            let t = ShortToken::new_unchecked(format!("code-{:03}", i));
            let record = backend.lookup(&t).await.unwrap();
            assert_eq!(record.original_url, format!("https://example{}.com", i));
        }
        assert_eq!(backend.summary("alice").await.unwrap().len(), 10);
    }
}
