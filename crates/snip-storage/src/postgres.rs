use crate::config::{DEFAULT_BASE_URL, DEFAULT_TABLE_NAME};
use crate::deletion::{DeletionConfig, DeletionPipeline, DeletionSink, DeletionTask};
use async_trait::async_trait;
use jiff::Timestamp;
use snip_core::backend::Result;
use snip_core::{Backend, ShortToken, StorageError, StoreOutcome, SummaryItem, UrlRecord};
use snip_generator::digest::DEFAULT_TOKEN_LENGTH;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use typed_builder::TypedBuilder;

/// Settings of a [`PostgresBackend`] beyond the connection itself.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PostgresOptions {
    #[builder(default = DEFAULT_TABLE_NAME.to_string(), setter(into))]
    pub table_name: String,
    /// Width of the short token column.
    #[builder(default = DEFAULT_TOKEN_LENGTH)]
    pub token_length: usize,
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    pub base_url: String,
    #[builder(default)]
    pub deletion: DeletionConfig,
    #[builder(default = 5)]
    pub max_connections: u32,
    #[builder(default = Duration::from_secs(5))]
    pub acquire_timeout: Duration,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// SQL statements rendered once for the configured table.
#[derive(Debug, Clone)]
struct Queries {
    create_table: String,
    insert: String,
    select_by_long_url: String,
    lookup: String,
    summary: String,
    mark_deleted: String,
}

impl Queries {
    fn new(table: &str, token_length: usize) -> Self {
        Self {
            create_table: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id SERIAL PRIMARY KEY,
                    userID TEXT NOT NULL,
                    longURL TEXT UNIQUE NOT NULL,
                    shortURL VARCHAR({token_length}) UNIQUE NOT NULL,
                    deletedFlag BOOLEAN NOT NULL DEFAULT FALSE,
                    created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
                )
                "#
            ),
            insert: format!(
                r#"
                INSERT INTO {table} (userID, longURL, shortURL)
                VALUES ($1, $2, $3)
                ON CONFLICT (longURL) DO NOTHING
                "#
            ),
            select_by_long_url: format!(
                "SELECT shortURL AS short_url FROM {table} WHERE longURL = $1 LIMIT 1"
            ),
            lookup: format!(
                r#"
                SELECT longURL AS long_url,
                       userID AS user_id,
                       deletedFlag AS deleted,
                       EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at
                FROM {table}
                WHERE shortURL = $1
                LIMIT 1
                "#
            ),
            summary: format!(
                r#"
                SELECT shortURL AS short_url, longURL AS long_url
                FROM {table}
                WHERE userID = $1
                ORDER BY id
                "#
            ),
            mark_deleted: format!(
                "UPDATE {table} SET deletedFlag = TRUE WHERE userID = $1 AND shortURL = ANY($2)"
            ),
        }
    }
}

/// Quotes `name` as a PostgreSQL identifier.
pub fn quote_identifier(name: &str) -> String {
    let name = name.split('\0').next().unwrap_or_default();
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn parse_created_at(seconds: Option<i64>) -> Result<Option<Timestamp>> {
    seconds
        .map(|value| {
            Timestamp::from_second(value).map_err(|e| {
                StorageError::InvalidData(format!("invalid created_at timestamp '{}': {e}", value))
            })
        })
        .transpose()
}

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::Configuration(_) => StorageError::Config(message),
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

/// Transaction scope of the relational backend.
///
/// `None` once the transaction has been rolled back after a failed store.
/// Dropping an un-ended batch rolls it back.
pub struct PgBatch {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgBatch {
    pub fn is_rolled_back(&self) -> bool {
        self.tx.is_none()
    }
}

impl std::fmt::Debug for PgBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgBatch")
            .field("rolled_back", &self.is_rolled_back())
            .finish()
    }
}

/// Flushes deletion batches with a single `UPDATE ... = ANY($2)` per owner.
struct PgDeletionSink {
    pool: PgPool,
    statement: String,
}

#[async_trait]
impl DeletionSink for PgDeletionSink {
    async fn mark_deleted(&self, owner_id: &str, tokens: &[String]) -> Result<u64> {
        let result = sqlx::query(&self.statement)
            .bind(owner_id)
            .bind(tokens)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

/// PostgreSQL implementation of the [`Backend`] contract.
///
/// The long URL column is unique, so storing a URL twice is reported as a
/// duplicate carrying the token already on record. A token already held by
/// another URL violates the short token constraint and fails as a query
/// error. Deletion is a soft
/// `deletedFlag` update applied in batches by a [`DeletionPipeline`];
/// lookups still resolve flagged rows and report them as deleted.
#[derive(Debug)]
pub struct PostgresBackend {
    pool: PgPool,
    table_name: String,
    base_url: String,
    queries: Queries,
    deletions: DeletionPipeline,
}

impl PostgresBackend {
    /// Opens a pool to `database_url` and prepares the table.
    pub async fn connect(database_url: &str, options: PostgresOptions) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Self::new(pool, options).await
    }

    /// Creates the backend on an existing pool, creating the table if it
    /// does not exist yet. Must be called within a tokio runtime.
    pub async fn new(pool: PgPool, options: PostgresOptions) -> Result<Self> {
        if options.table_name.is_empty() {
            return Err(StorageError::Config("table name must not be empty".into()));
        }
        if options.token_length == 0 {
            return Err(StorageError::Config("token length must be positive".into()));
        }

        let queries = Queries::new(&quote_identifier(&options.table_name), options.token_length);
        sqlx::query(&queries.create_table)
            .execute(&pool)
            .await
            .map_err(map_sqlx_error)?;

        let sink = Arc::new(PgDeletionSink {
            pool: pool.clone(),
            statement: queries.mark_deleted.clone(),
        });
        let deletions = DeletionPipeline::spawn(sink, options.deletion);

        info!(table = %options.table_name, token_length = options.token_length, "postgres backend ready");

        Ok(Self {
            pool,
            table_name: options.table_name,
            base_url: options.base_url,
            queries,
            deletions,
        })
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn store_on(
        &self,
        conn: &mut PgConnection,
        owner_id: &str,
        token: &ShortToken,
        original_url: &str,
    ) -> Result<StoreOutcome> {
        let inserted = sqlx::query(&self.queries.insert)
            .bind(owner_id)
            .bind(original_url)
            .bind(token.as_str())
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        if inserted > 0 {
            debug!(token = %token, "stored url");
            return Ok(StoreOutcome::Stored);
        }

        let existing: Option<String> = sqlx::query_scalar(&self.queries.select_by_long_url)
            .bind(original_url)
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        // A conflicting row that is gone by now was deleted concurrently.
        let Some(existing) = existing else {
            return Err(StorageError::Query(format!(
                "insert of '{original_url}' conflicted but no row holds it"
            )));
        };
        let existing = ShortToken::new_unchecked(existing);
        trace!(token = %existing, "url already stored");
        Ok(StoreOutcome::Duplicate(existing))
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    type Batch = PgBatch;

    async fn store(
        &self,
        owner_id: &str,
        token: &ShortToken,
        original_url: &str,
    ) -> Result<StoreOutcome> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        self.store_on(&mut conn, owner_id, token, original_url).await
    }

    async fn begin_transaction(&self) -> Result<PgBatch> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(PgBatch { tx: Some(tx) })
    }

    async fn store_in(
        &self,
        batch: &mut PgBatch,
        owner_id: &str,
        token: &ShortToken,
        original_url: &str,
    ) -> Result<StoreOutcome> {
        let Some(tx) = batch.tx.as_mut() else {
            return Err(StorageError::Transaction(
                "batch was already rolled back".into(),
            ));
        };

        let err = match self.store_on(tx, owner_id, token, original_url).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) => err,
        };

        if let Some(tx) = batch.tx.take() {
            if let Err(rollback_err) = tx.rollback().await {
                return Err(StorageError::Transaction(format!(
                    "failed to insert url: {err}, rollback: {rollback_err}"
                )));
            }
        }
        warn!(token = %token, error = %err, "store failed, batch rolled back");
        Err(err)
    }

    async fn end_transaction(&self, mut batch: PgBatch) -> Result<()> {
        let Some(tx) = batch.tx.take() else {
            return Ok(());
        };
        tx.commit()
            .await
            .map_err(|e| StorageError::Transaction(format!("commit failed: {e}")))
    }

    async fn rollback_transaction(&self, mut batch: PgBatch) -> Result<()> {
        let Some(tx) = batch.tx.take() else {
            return Ok(());
        };
        tx.rollback()
            .await
            .map_err(|e| StorageError::Transaction(format!("rollback failed: {e}")))
    }

    async fn lookup(&self, token: &ShortToken) -> Result<UrlRecord> {
        let row = sqlx::query(&self.queries.lookup)
            .bind(token.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(token.to_string()));
        };

        let original_url: String = row.try_get("long_url").map_err(map_sqlx_error)?;
        let owner_id: String = row.try_get("user_id").map_err(map_sqlx_error)?;
        let deleted: bool = row.try_get("deleted").map_err(map_sqlx_error)?;
        let created_at_raw: Option<i64> = row.try_get("created_at").map_err(map_sqlx_error)?;

        Ok(UrlRecord {
            short_token: token.clone(),
            original_url,
            owner_id,
            deleted,
            created_at: parse_created_at(created_at_raw)?,
        })
    }

    async fn mark_deleted(&self, owner_id: &str, tokens: Vec<ShortToken>) {
        if owner_id.is_empty() || tokens.is_empty() {
            return;
        }

        self.deletions
            .enqueue(DeletionTask {
                owner_id: owner_id.to_owned(),
                short_tokens: tokens.into_iter().map(ShortToken::into_inner).collect(),
            })
            .await;
    }

    async fn summary(&self, owner_id: &str) -> Result<Vec<SummaryItem>> {
        if owner_id.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&self.queries.summary)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let short_token: String = row.try_get("short_url").map_err(map_sqlx_error)?;
                let original_url: String = row.try_get("long_url").map_err(map_sqlx_error)?;
                Ok(SummaryItem {
                    short_url: ShortToken::new_unchecked(short_token).to_url(&self.base_url),
                    original_url,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn finalize(&self) -> Result<()> {
        self.deletions.shutdown().await;
        self.pool.close().await;
        info!(table = %self.table_name, "postgres backend closed");
        Ok(())
    }
}
