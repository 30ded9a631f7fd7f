use crate::summary::UserSummaryIndex;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use snip_core::backend::Result;
use snip_core::{Backend, NoopBatch, ShortToken, StorageError, StoreOutcome, SummaryItem, UrlRecord};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// One line of the append log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LogEntry {
    item_id: String,
    user_id: String,
    short_url: String,
    original_url: String,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    original_url: String,
    owner_id: String,
}

/// Durable backend writing newline-delimited JSON records to a file.
///
/// The whole log is replayed on open to rebuild the token index and the
/// per-owner summaries. Every store is flushed before it returns; the write
/// runs on the blocking pool. Like the in-memory backend, duplicates are
/// detected by token collision, checked before anything is written.
#[derive(Debug)]
pub struct AppendLogBackend {
    path: PathBuf,
    index: RwLock<HashMap<String, IndexEntry>>,
    writer: Arc<Mutex<Option<BufWriter<File>>>>,
    store_gate: tokio::sync::Mutex<()>,
    summaries: UserSummaryIndex,
}

impl AppendLogBackend {
    /// Opens (creating if needed) the log at `path` and replays it.
    pub fn open(path: impl AsRef<Path>, base_url: impl Into<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let summaries = UserSummaryIndex::new(base_url);
        let mut index = HashMap::new();
        let mut replayed = 0usize;

        let entries = serde_json::Deserializer::from_reader(BufReader::new(&file))
            .into_iter::<LogEntry>();
        for entry in entries {
            let entry = entry.map_err(|e| {
                StorageError::InvalidData(format!(
                    "corrupt record in '{}' after {} entries: {e}",
                    path.display(),
                    replayed
                ))
            })?;

            let token = ShortToken::new_unchecked(entry.short_url);
            summaries.append(&entry.user_id, &token, &entry.original_url);
            // Later records for the same token replace earlier ones.
            index.insert(
                token.into_inner(),
                IndexEntry {
                    original_url: entry.original_url,
                    owner_id: entry.user_id,
                },
            );
            replayed += 1;
        }

        info!(
            path = %path.display(),
            records = replayed,
            owners = summaries.owners(),
            "replayed append log"
        );

        Ok(Self {
            path,
            index: RwLock::new(index),
            writer: Arc::new(Mutex::new(Some(BufWriter::new(file)))),
            store_gate: tokio::sync::Mutex::new(()),
            summaries,
        })
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.writer.lock().is_none() {
            return Err(StorageError::Unavailable(format!(
                "append log '{}' is closed",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn append_entry(writer: &mut BufWriter<File>, entry: &LogEntry) -> Result<()> {
        serde_json::to_writer(&mut *writer, entry)
            .map_err(|e| StorageError::Io(format!("failed to encode record: {e}")))?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl Backend for AppendLogBackend {
    type Batch = NoopBatch;

    async fn store(
        &self,
        owner_id: &str,
        token: &ShortToken,
        original_url: &str,
    ) -> Result<StoreOutcome> {
        // Held across the blocking write so the duplicate check and the
        // append cannot interleave.
        let _guard = self.store_gate.lock().await;
        self.ensure_open()?;

        let item_id = {
            let index = self.index.read();
            if index.contains_key(token.as_str()) {
                trace!(token = %token, "token already logged");
                return Ok(StoreOutcome::Duplicate(token.clone()));
            }
            index.len() + 1
        };

        let entry = LogEntry {
            item_id: item_id.to_string(),
            user_id: owner_id.to_owned(),
            short_url: token.as_str().to_owned(),
            original_url: original_url.to_owned(),
        };
        let writer = Arc::clone(&self.writer);
        let entry = tokio::task::spawn_blocking(move || {
            let mut writer = writer.lock();
            let writer = writer
                .as_mut()
                .ok_or_else(|| StorageError::Unavailable("append log is closed".into()))?;
            Self::append_entry(writer, &entry)?;
            Ok::<_, StorageError>(entry)
        })
        .await
        .map_err(|e| StorageError::Io(format!("append task failed: {e}")))??;

        self.index.write().insert(
            entry.short_url,
            IndexEntry {
                original_url: entry.original_url,
                owner_id: entry.user_id,
            },
        );
        self.summaries.append(owner_id, token, original_url);

        debug!(token = %token, item_id, "appended record");
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
        let index = self.index.read();
        let entry = index
            .get(token.as_str())
            .ok_or_else(|| StorageError::NotFound(token.to_string()))?;

        Ok(UrlRecord {
            short_token: token.clone(),
            original_url: entry.original_url.clone(),
            owner_id: entry.owner_id.clone(),
            deleted: false,
            created_at: None,
        })
    }

    async fn mark_deleted(&self, owner_id: &str, tokens: Vec<ShortToken>) {
        // The log format has no deletion marker.
        trace!(owner_id, count = tokens.len(), "ignoring deletion request");
    }

    async fn summary(&self, owner_id: &str) -> Result<Vec<SummaryItem>> {
        Ok(self.summaries.summary(owner_id))
    }

    async fn finalize(&self) -> Result<()> {
        let _guard = self.store_gate.lock().await;
        let Some(mut writer) = self.writer.lock().take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || writer.flush())
            .await
            .map_err(|e| StorageError::Io(format!("flush task failed: {e}")))??;
        info!(path = %self.path.display(), "closed append log");
        Ok(())
    }
}
