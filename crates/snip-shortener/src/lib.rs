//! URL shortener service implementation.
//!
//! This crate provides the shortener service on top of any storage
//! backend. Core types are re-exported from `snip_core`.

pub mod service;

pub use service::ShortenerService;
pub use snip_core::{
    BatchItem, BatchOutcome, BatchResultItem, Shortened, Shortener, ShortenerError,
};
