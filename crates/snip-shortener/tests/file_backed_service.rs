use snip_core::{BatchItem, BatchOutcome, ShortToken, Shortened, Shortener, ShortenerError, StorageError};
use snip_generator::DigestGenerator;
use snip_shortener::ShortenerService;
use snip_storage::{Storage, StorageConfig};
use tempfile::TempDir;

async fn open_service(config: &StorageConfig) -> ShortenerService<Storage, DigestGenerator> {
    let storage = snip_storage::open(config).await.expect("open storage");
    let generator = DigestGenerator::new(config.token_length).expect("generator");
    ShortenerService::new(storage, generator, config.base_url.clone())
}

fn config(dir: &TempDir) -> StorageConfig {
    StorageConfig::builder()
        .file_path(dir.path().join("storage.dat"))
        .build()
}

#[tokio::test]
async fn shorten_resolve_and_duplicate() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&config(&dir)).await;

    let created = service.shorten("", "https://a.com").await.unwrap();
    assert_eq!(created, Shortened::Created(ShortToken::new_unchecked("Zsy0mb1J")));

    let again = service.shorten("", "https://a.com").await.unwrap();
    assert_eq!(again, Shortened::Duplicate(ShortToken::new_unchecked("Zsy0mb1J")));

    let record = service.resolve(created.token()).await.unwrap();
    assert_eq!(record.original_url, "https://a.com");

    let err = service
        .resolve(&ShortToken::new_unchecked("unknown"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShortenerError::Storage(StorageError::NotFound(_))
    ));

    service.finalize().await.unwrap();
}

#[tokio::test]
async fn mappings_and_summaries_survive_restart() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    {
        let service = open_service(&config).await;
        let outcome = service
            .shorten_batch(
                "alice",
                vec![
                    BatchItem {
                        correlation_id: "a".to_string(),
                        original_url: "https://a.com".to_string(),
                    },
                    BatchItem {
                        correlation_id: "b".to_string(),
                        original_url: "https://foo.com".to_string(),
                    },
                ],
            )
            .await
            .unwrap();
        assert!(matches!(outcome, BatchOutcome::Created(ref items) if items.len() == 2));
        service.finalize().await.unwrap();
    }

    let service = open_service(&config).await;
    assert_eq!(
        service.summary_json("alice").await,
        concat!(
            r#"[{"short_url":"http://localhost:8080/Zsy0mb1J","original_url":"https://a.com"},"#,
            r#"{"short_url":"http://localhost:8080/qi4FELZu","original_url":"https://foo.com"}]"#,
        )
    );
    assert_eq!(
        service.shorten("bob", "https://foo.com").await.unwrap(),
        Shortened::Duplicate(ShortToken::new_unchecked("qi4FELZu"))
    );
    service.finalize().await.unwrap();
}
