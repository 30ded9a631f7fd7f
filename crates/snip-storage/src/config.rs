use crate::deletion::DeletionConfig;
use snip_core::StorageError;
use snip_generator::digest::DEFAULT_TOKEN_LENGTH;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use typed_builder::TypedBuilder;

pub const DEFAULT_FILE_PATH: &str = "storage.dat";
pub const DEFAULT_TABLE_NAME: &str = "urls";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Which persistence backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    Memory,
    #[default]
    File,
    Postgres,
}

impl BackendKind {
    /// Backend used when none is named: postgres when a DSN is configured,
    /// the append log otherwise.
    pub fn infer(database_dsn: Option<&str>) -> Self {
        match database_dsn {
            Some(dsn) if !dsn.trim().is_empty() => BackendKind::Postgres,
            _ => BackendKind::File,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::File => "file",
            BackendKind::Postgres => "postgres",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "file" => Ok(BackendKind::File),
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            other => Err(StorageError::Config(format!(
                "unknown storage backend '{other}'"
            ))),
        }
    }
}

/// Everything the storage factory needs to open a backend.
#[derive(Debug, Clone, TypedBuilder)]
pub struct StorageConfig {
    #[builder(default)]
    pub backend: BackendKind,

    /// Append-log location, used by the file backend.
    #[builder(default = PathBuf::from(DEFAULT_FILE_PATH), setter(into))]
    pub file_path: PathBuf,

    /// Connection string, required by the postgres backend.
    #[builder(default, setter(strip_option, into))]
    pub database_dsn: Option<String>,

    #[builder(default = DEFAULT_TABLE_NAME.to_string(), setter(into))]
    pub table_name: String,

    #[builder(default = DEFAULT_TOKEN_LENGTH)]
    pub token_length: usize,

    /// Public address that short tokens are joined with in summaries.
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    pub base_url: String,

    #[builder(default)]
    pub deletion: DeletionConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
