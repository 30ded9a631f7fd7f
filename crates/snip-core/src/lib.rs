//! Core types and traits for the Snip URL shortener.
//!
//! This crate provides the shared vocabulary used by the storage backends
//! and the shortener service: short tokens, stored records, the backend
//! capability contract and the error taxonomy.

pub mod backend;
pub mod error;
pub mod shortcode;
pub mod shortener;

pub use backend::{Backend, NoopBatch, StoreOutcome, SummaryItem, UrlRecord};
pub use error::{CoreError, ShortenerError, StorageError};
pub use shortcode::ShortToken;
pub use shortener::{BatchItem, BatchOutcome, BatchResultItem, Shortened, Shortener};
