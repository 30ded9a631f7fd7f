use async_trait::async_trait;
use snip_core::{
    Backend, BatchItem, BatchOutcome, BatchResultItem, ShortToken, Shortened, Shortener,
    ShortenerError, StoreOutcome, UrlRecord,
};
use snip_generator::Generator;
use std::sync::Arc;
use tracing::{debug, warn};

/// A concrete implementation of the `Shortener` trait.
///
/// This service wraps a `Backend` and a `Generator` to handle:
/// - URL validation
/// - Token derivation
/// - Batch submissions inside one transaction scope
///
/// Tokens are content-addressed, so shortening the same URL twice is
/// reported as a duplicate by the backend rather than retried.
#[derive(Debug)]
pub struct ShortenerService<B, G> {
    backend: Arc<B>,
    generator: Arc<G>,
    base_url: String,
}

impl<B, G> Clone for ShortenerService<B, G> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            generator: Arc::clone(&self.generator),
            base_url: self.base_url.clone(),
        }
    }
}

impl<B: Backend, G: Generator> ShortenerService<B, G> {
    /// Creates a service whose short URLs are joined with `base_url`.
    pub fn new(backend: B, generator: G, base_url: impl Into<String>) -> Self {
        Self {
            backend: Arc::new(backend),
            generator: Arc::new(generator),
            base_url: base_url.into(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Public URL of `token`.
    pub fn short_url(&self, token: &ShortToken) -> String {
        token.to_url(&self.base_url)
    }

    /// Checks that the backend is reachable.
    pub async fn ping(&self) -> Result<(), ShortenerError> {
        Ok(self.backend.ping().await?)
    }

    /// Flushes pending work and releases the backend.
    pub async fn finalize(&self) -> Result<(), ShortenerError> {
        Ok(self.backend.finalize().await?)
    }

    /// Validates that the URL is an absolute http(s) URL with a host.
    fn validate_url(url: &str) -> Result<(), ShortenerError> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        };

        let scheme = scheme.to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL scheme must be http or https: {}",
                scheme
            )));
        }

        let host = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default();
        if host.is_empty() {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a host: {}",
                url
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl<B: Backend, G: Generator> Shortener for ShortenerService<B, G> {
    async fn shorten(&self, owner_id: &str, original_url: &str) -> Result<Shortened, ShortenerError> {
        Self::validate_url(original_url)?;

        let token = self.generator.generate(original_url);
        let outcome = self.backend.store(owner_id, &token, original_url).await?;

        Ok(match outcome {
            StoreOutcome::Stored => Shortened::Created(token),
            StoreOutcome::Duplicate(existing) => Shortened::Duplicate(existing),
        })
    }

    async fn shorten_batch(
        &self,
        owner_id: &str,
        items: Vec<BatchItem>,
    ) -> Result<BatchOutcome, ShortenerError> {
        if items.is_empty() {
            return Err(ShortenerError::EmptyBatch);
        }
        for item in &items {
            Self::validate_url(&item.original_url)?;
        }

        let mut batch = self.backend.begin_transaction().await?;
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            let token = self.generator.generate(&item.original_url);
            let stored = self
                .backend
                .store_in(&mut batch, owner_id, &token, &item.original_url)
                .await;

            match stored {
                Ok(StoreOutcome::Stored) => results.push(BatchResultItem {
                    correlation_id: item.correlation_id,
                    short_url: self.short_url(&token),
                }),
                Ok(StoreOutcome::Duplicate(existing)) => {
                    if let Err(err) = self.backend.rollback_transaction(batch).await {
                        warn!(error = %err, "failed to roll back batch after duplicate");
                    }
                    debug!(correlation_id = %item.correlation_id, token = %existing, "batch stopped on duplicate");
                    return Ok(BatchOutcome::Duplicate {
                        correlation_id: item.correlation_id,
                        short_url: self.short_url(&existing),
                    });
                }
                Err(err) => {
                    if let Err(rollback_err) = self.backend.rollback_transaction(batch).await {
                        warn!(error = %rollback_err, "failed to roll back batch");
                    }
                    return Err(err.into());
                }
            }
        }

        self.backend.end_transaction(batch).await?;
        Ok(BatchOutcome::Created(results))
    }

    async fn resolve(&self, token: &ShortToken) -> Result<UrlRecord, ShortenerError> {
        Ok(self.backend.lookup(token).await?)
    }

    async fn summary_json(&self, owner_id: &str) -> String {
        let items = match self.backend.summary(owner_id).await {
            Ok(items) => items,
            Err(err) => {
                warn!(owner_id, error = %err, "failed to load summary");
                return String::new();
            }
        };
        if items.is_empty() {
            return String::new();
        }

        serde_json::to_string(&items).unwrap_or_else(|err| {
            warn!(owner_id, error = %err, "failed to encode summary");
            String::new()
        })
    }

    async fn delete(&self, owner_id: &str, tokens: Vec<ShortToken>) {
        if owner_id.is_empty() || tokens.is_empty() {
            return;
        }
        self.backend.mark_deleted(owner_id, tokens).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snip_core::backend::Result as StorageResult;
    use snip_core::{NoopBatch, StorageError, SummaryItem};
    use snip_generator::DigestGenerator;
    use snip_storage::InMemoryBackend;

    const BASE_URL: &str = "http://localhost:8080";

    fn test_service() -> ShortenerService<InMemoryBackend, DigestGenerator> {
        ShortenerService::new(
            InMemoryBackend::new(BASE_URL),
            DigestGenerator::default(),
            BASE_URL,
        )
    }

    fn item(correlation_id: &str, url: &str) -> BatchItem {
        BatchItem {
            correlation_id: correlation_id.to_string(),
            original_url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn shorten_creates_content_addressed_token() {
        let service = test_service();

        let outcome = service.shorten("alice", "https://example.com").await.unwrap();
        assert_eq!(outcome, Shortened::Created(ShortToken::new_unchecked("yYTQaq--")));
        assert_eq!(
            service.short_url(outcome.token()),
            "http://localhost:8080/yYTQaq--"
        );
    }

    #[tokio::test]
    async fn shorten_same_url_twice_is_duplicate() {
        let service = test_service();

        let first = service.shorten("alice", "https://a.com").await.unwrap();
        let second = service.shorten("bob", "https://a.com").await.unwrap();

        assert!(matches!(first, Shortened::Created(_)));
        assert_eq!(second, Shortened::Duplicate(first.token().clone()));
    }

    #[tokio::test]
    async fn shorten_with_invalid_url_fails() {
        let service = test_service();

        for url in [
            "",
            "not-a-valid-url",
            "ftp://example.com",
            "https://",
            "https:///path",
        ] {
            let err = service.shorten("alice", url).await.unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidUrl(_)), "{url}");
        }
        assert!(service.backend().is_empty());
    }

    #[tokio::test]
    async fn resolve_existing_url() {
        let service = test_service();

        let outcome = service.shorten("alice", "https://example.com").await.unwrap();
        let record = service.resolve(outcome.token()).await.unwrap();

        assert_eq!(record.original_url, "https://example.com");
        assert_eq!(record.owner_id, "alice");
    }

    #[tokio::test]
    async fn resolve_nonexistent_url() {
        let service = test_service();

        let err = service
            .resolve(&ShortToken::new_unchecked("nonexistent"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShortenerError::Storage(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn batch_returns_short_urls_in_order() {
        let service = test_service();

        let outcome = service
            .shorten_batch(
                "alice",
                vec![item("1", "https://a.com"), item("2", "https://foo.com")],
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BatchOutcome::Created(vec![
                BatchResultItem {
                    correlation_id: "1".to_string(),
                    short_url: "http://localhost:8080/Zsy0mb1J".to_string(),
                },
                BatchResultItem {
                    correlation_id: "2".to_string(),
                    short_url: "http://localhost:8080/qi4FELZu".to_string(),
                },
            ])
        );
        assert_eq!(service.backend().len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let service = test_service();

        let err = service.shorten_batch("alice", vec![]).await.unwrap_err();
        assert!(matches!(err, ShortenerError::EmptyBatch));
    }

    #[tokio::test]
    async fn batch_stops_on_duplicate() {
        let service = test_service();
        service.shorten("alice", "https://a.com").await.unwrap();

        let outcome = service
            .shorten_batch(
                "alice",
                vec![
                    item("first", "https://foo.com"),
                    item("second", "https://a.com"),
                    item("third", "https://example.com"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BatchOutcome::Duplicate {
                correlation_id: "second".to_string(),
                short_url: "http://localhost:8080/Zsy0mb1J".to_string(),
            }
        );
        // Nothing after the duplicate is stored.
        assert!(service
            .resolve(&ShortToken::new_unchecked("yYTQaq--"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn batch_with_invalid_url_stores_nothing() {
        let service = test_service();

        let err = service
            .shorten_batch(
                "alice",
                vec![item("1", "https://a.com"), item("2", "nope")],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ShortenerError::InvalidUrl(_)));
        assert!(service.backend().is_empty());
    }

    #[tokio::test]
    async fn summary_json_lists_owner_urls() {
        let service = test_service();
        service.shorten("alice", "https://a.com").await.unwrap();
        service.shorten("bob", "https://foo.com").await.unwrap();

        assert_eq!(
            service.summary_json("alice").await,
            r#"[{"short_url":"http://localhost:8080/Zsy0mb1J","original_url":"https://a.com"}]"#
        );
    }

    #[tokio::test]
    async fn summary_json_is_empty_without_entries() {
        let service = test_service();
        service.shorten("", "https://a.com").await.unwrap();

        assert_eq!(service.summary_json("alice").await, "");
        assert_eq!(service.summary_json("").await, "");
    }

    #[tokio::test]
    async fn delete_keeps_url_resolvable() {
        let service = test_service();
        let outcome = service.shorten("alice", "https://a.com").await.unwrap();

        service.delete("alice", vec![outcome.token().clone()]).await;
        service.delete("", vec![outcome.token().clone()]).await;

        assert!(service.resolve(outcome.token()).await.is_ok());
    }

    #[tokio::test]
    async fn ping_and_finalize() {
        let service = test_service();
        service.ping().await.unwrap();
        service.finalize().await.unwrap();
    }

    /// Backend whose every fallible operation fails.
    struct BrokenBackend;

    fn broken() -> StorageError {
        StorageError::Unavailable("backend is down".to_string())
    }

    #[async_trait]
    impl Backend for BrokenBackend {
        type Batch = NoopBatch;

        async fn store(&self, _: &str, _: &ShortToken, _: &str) -> StorageResult<StoreOutcome> {
            Err(broken())
        }

        async fn begin_transaction(&self) -> StorageResult<NoopBatch> {
            Ok(NoopBatch)
        }

        async fn store_in(
            &self,
            _: &mut NoopBatch,
            _: &str,
            _: &ShortToken,
            _: &str,
        ) -> StorageResult<StoreOutcome> {
            Err(broken())
        }

        async fn end_transaction(&self, _: NoopBatch) -> StorageResult<()> {
            Ok(())
        }

        async fn rollback_transaction(&self, _: NoopBatch) -> StorageResult<()> {
            Ok(())
        }

        async fn lookup(&self, _: &ShortToken) -> StorageResult<UrlRecord> {
            Err(broken())
        }

        async fn mark_deleted(&self, _: &str, _: Vec<ShortToken>) {}

        async fn summary(&self, _: &str) -> StorageResult<Vec<SummaryItem>> {
            Err(broken())
        }

        async fn ping(&self) -> StorageResult<()> {
            Err(broken())
        }

        async fn finalize(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let service = ShortenerService::new(BrokenBackend, DigestGenerator::default(), BASE_URL);

        let err = service.shorten("alice", "https://a.com").await.unwrap_err();
        assert!(matches!(err, ShortenerError::Storage(ref e) if e.is_backend_error()));

        let err = service
            .shorten_batch("alice", vec![item("1", "https://a.com")])
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenerError::Storage(_)));

        assert!(service.ping().await.is_err());
        assert_eq!(service.summary_json("alice").await, "");
    }
}
