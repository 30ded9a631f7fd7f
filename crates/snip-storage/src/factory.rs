//! Storage factory: picks and opens the configured backend.

use crate::config::{BackendKind, StorageConfig};
use crate::file::AppendLogBackend;
use crate::memory::InMemoryBackend;
use crate::postgres::{PgBatch, PostgresBackend, PostgresOptions};
use async_trait::async_trait;
use snip_core::backend::Result;
use snip_core::{Backend, NoopBatch, ShortToken, StorageError, StoreOutcome, SummaryItem, UrlRecord};
use snip_generator::DigestGenerator;
use tracing::info;

/// One of the concrete backends, chosen at runtime.
#[derive(Debug)]
pub enum Storage {
    Memory(InMemoryBackend),
    File(AppendLogBackend),
    Postgres(PostgresBackend),
}

/// Batch scope of a [`Storage`].
#[derive(Debug)]
pub enum StorageBatch {
    Noop(NoopBatch),
    Postgres(PgBatch),
}

/// Opens the backend described by `config`.
///
/// # Errors
///
/// Returns `StorageError::Config` when the configuration is unusable: a
/// token length outside the generator's range, the postgres backend without
/// a DSN or an empty table name, or a database that cannot be reached.
pub async fn open(config: &StorageConfig) -> Result<Storage> {
    DigestGenerator::new(config.token_length)?;

    let storage = match config.backend {
        BackendKind::Memory => Storage::Memory(InMemoryBackend::new(config.base_url.clone())),
        BackendKind::File => {
            let path = config.file_path.clone();
            let base_url = config.base_url.clone();
            let backend = tokio::task::spawn_blocking(move || AppendLogBackend::open(path, base_url))
                .await
                .map_err(|e| StorageError::Io(format!("append log replay panicked: {e}")))??;
            Storage::File(backend)
        }
        BackendKind::Postgres => {
            let dsn = config
                .database_dsn
                .as_deref()
                .filter(|dsn| !dsn.trim().is_empty())
                .ok_or_else(|| {
                    StorageError::Config("postgres backend requires a database DSN".into())
                })?;
            if config.table_name.is_empty() {
                return Err(StorageError::Config("table name must not be empty".into()));
            }

            let options = PostgresOptions::builder()
                .table_name(config.table_name.clone())
                .token_length(config.token_length)
                .base_url(config.base_url.clone())
                .deletion(config.deletion.clone())
                .build();
            let backend = PostgresBackend::connect(dsn, options)
                .await
                .map_err(|e| match e {
                    StorageError::Config(_) => e,
                    other => StorageError::Config(format!("database is not available: {other}")),
                })?;
            Storage::Postgres(backend)
        }
    };

    info!(backend = %storage.kind(), "storage opened");
    Ok(storage)
}

impl Storage {
    pub fn kind(&self) -> BackendKind {
        match self {
            Storage::Memory(_) => BackendKind::Memory,
            Storage::File(_) => BackendKind::File,
            Storage::Postgres(_) => BackendKind::Postgres,
        }
    }
}

fn foreign_batch() -> StorageError {
    StorageError::Transaction("batch was opened by a different backend".into())
}

#[async_trait]
impl Backend for Storage {
    type Batch = StorageBatch;

    async fn store(
        &self,
        owner_id: &str,
        token: &ShortToken,
        original_url: &str,
    ) -> Result<StoreOutcome> {
        match self {
            Storage::Memory(b) => b.store(owner_id, token, original_url).await,
            Storage::File(b) => b.store(owner_id, token, original_url).await,
            Storage::Postgres(b) => b.store(owner_id, token, original_url).await,
        }
    }

    async fn begin_transaction(&self) -> Result<StorageBatch> {
        match self {
            Storage::Memory(b) => b.begin_transaction().await.map(StorageBatch::Noop),
            Storage::File(b) => b.begin_transaction().await.map(StorageBatch::Noop),
            Storage::Postgres(b) => b.begin_transaction().await.map(StorageBatch::Postgres),
        }
    }

    async fn store_in(
        &self,
        batch: &mut StorageBatch,
        owner_id: &str,
        token: &ShortToken,
        original_url: &str,
    ) -> Result<StoreOutcome> {
        match (self, batch) {
            (Storage::Memory(b), StorageBatch::Noop(batch)) => {
                b.store_in(batch, owner_id, token, original_url).await
            }
            (Storage::File(b), StorageBatch::Noop(batch)) => {
                b.store_in(batch, owner_id, token, original_url).await
            }
            (Storage::Postgres(b), StorageBatch::Postgres(batch)) => {
                b.store_in(batch, owner_id, token, original_url).await
            }
            _ => Err(foreign_batch()),
        }
    }

    async fn end_transaction(&self, batch: StorageBatch) -> Result<()> {
        match (self, batch) {
            (Storage::Memory(b), StorageBatch::Noop(batch)) => b.end_transaction(batch).await,
            (Storage::File(b), StorageBatch::Noop(batch)) => b.end_transaction(batch).await,
            (Storage::Postgres(b), StorageBatch::Postgres(batch)) => b.end_transaction(batch).await,
            _ => Err(foreign_batch()),
        }
    }

    async fn rollback_transaction(&self, batch: StorageBatch) -> Result<()> {
        match (self, batch) {
            (Storage::Memory(b), StorageBatch::Noop(batch)) => b.rollback_transaction(batch).await,
            (Storage::File(b), StorageBatch::Noop(batch)) => b.rollback_transaction(batch).await,
            (Storage::Postgres(b), StorageBatch::Postgres(batch)) => {
                b.rollback_transaction(batch).await
            }
            _ => Err(foreign_batch()),
        }
    }

    async fn lookup(&self, token: &ShortToken) -> Result<UrlRecord> {
        match self {
            Storage::Memory(b) => b.lookup(token).await,
            Storage::File(b) => b.lookup(token).await,
            Storage::Postgres(b) => b.lookup(token).await,
        }
    }

    async fn mark_deleted(&self, owner_id: &str, tokens: Vec<ShortToken>) {
        match self {
            Storage::Memory(b) => b.mark_deleted(owner_id, tokens).await,
            Storage::File(b) => b.mark_deleted(owner_id, tokens).await,
            Storage::Postgres(b) => b.mark_deleted(owner_id, tokens).await,
        }
    }

    async fn summary(&self, owner_id: &str) -> Result<Vec<SummaryItem>> {
        match self {
            Storage::Memory(b) => b.summary(owner_id).await,
            Storage::File(b) => b.summary(owner_id).await,
            Storage::Postgres(b) => b.summary(owner_id).await,
        }
    }

    async fn ping(&self) -> Result<()> {
        match self {
            Storage::Memory(b) => b.ping().await,
            Storage::File(b) => b.ping().await,
            Storage::Postgres(b) => b.ping().await,
        }
    }

    async fn finalize(&self) -> Result<()> {
        match self {
            Storage::Memory(b) => b.finalize().await,
            Storage::File(b) => b.finalize().await,
            Storage::Postgres(b) => b.finalize().await,
        }
    }
}
