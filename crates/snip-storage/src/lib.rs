//! Persistence backends for Snip.
//!
//! Three interchangeable implementations of [`snip_core::Backend`]:
//! - [`InMemoryBackend`]: volatile, for tests and throwaway runs;
//! - [`AppendLogBackend`]: newline-delimited JSON log replayed on open;
//! - [`PostgresBackend`]: relational storage with soft, batched deletion
//!   through the [`DeletionPipeline`].
//!
//! [`open`] picks one from a [`StorageConfig`].

pub mod config;
pub mod deletion;
pub mod factory;
pub mod file;
pub mod memory;
pub mod postgres;
pub mod summary;

pub use config::{BackendKind, StorageConfig};
pub use deletion::{DeletionConfig, DeletionPipeline, DeletionSink, DeletionTask};
pub use factory::{open, Storage, StorageBatch};
pub use file::AppendLogBackend;
pub use memory::InMemoryBackend;
pub use postgres::{PgBatch, PostgresBackend, PostgresOptions};
pub use snip_core::{Backend, StorageError, StoreOutcome, SummaryItem, UrlRecord};
pub use summary::UserSummaryIndex;
