use clap::{Parser, Subcommand, ValueEnum};
use snip_generator::digest::DEFAULT_TOKEN_LENGTH;
use snip_storage::config::{DEFAULT_BASE_URL, DEFAULT_FILE_PATH, DEFAULT_TABLE_NAME};
use snip_storage::{BackendKind, StorageConfig};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const STORAGE_BACKEND_ENV: &str = "SNIP_STORAGE_BACKEND";
pub const FILE_STORAGE_PATH_ENV: &str = "SNIP_FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "SNIP_DATABASE_DSN";
pub const DB_TABLE_NAME_ENV: &str = "SNIP_DB_TABLE_NAME";
pub const SHORT_URL_LEN_ENV: &str = "SNIP_SHORT_URL_LEN";
pub const BASE_URL_ENV: &str = "SNIP_BASE_URL";
pub const OWNER_ENV: &str = "SNIP_OWNER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "memory")]
    Memory,
    #[value(name = "file")]
    File,
    #[value(name = "postgres")]
    Postgres,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::Memory => write!(f, "memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
        }
    }
}

impl From<StorageBackendArg> for BackendKind {
    fn from(value: StorageBackendArg) -> Self {
        match value {
            StorageBackendArg::Memory => BackendKind::Memory,
            StorageBackendArg::File => BackendKind::File,
            StorageBackendArg::Postgres => BackendKind::Postgres,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "snip", about = "Shorten, resolve and delete URLs")]
pub struct CLI {
    /// Storage backend. Defaults to postgres when a DSN is set, file otherwise.
    #[arg(long, env = STORAGE_BACKEND_ENV, value_enum)]
    pub storage: Option<StorageBackendArg>,

    #[arg(long, env = FILE_STORAGE_PATH_ENV, default_value = DEFAULT_FILE_PATH)]
    pub file_storage_path: PathBuf,

    #[arg(long, env = DATABASE_DSN_ENV, required_if_eq("storage", "postgres"))]
    pub database_dsn: Option<String>,

    #[arg(long, env = DB_TABLE_NAME_ENV, default_value = DEFAULT_TABLE_NAME)]
    pub table_name: String,

    #[arg(long, env = SHORT_URL_LEN_ENV, default_value_t = DEFAULT_TOKEN_LENGTH)]
    pub short_url_len: usize,

    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Owner the command acts for. Anonymous when unset.
    #[arg(long, env = OWNER_ENV)]
    pub owner: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten URLs; several URLs are stored as one batch.
    Shorten {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Print the URL behind a short token.
    Resolve { token: String },
    /// List the owner's URLs as JSON.
    Summary,
    /// Schedule the owner's tokens for deletion.
    Delete {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
    /// Check that the storage backend is reachable.
    Ping,
}

impl CLI {
    pub fn backend(&self) -> BackendKind {
        self.storage
            .map(BackendKind::from)
            .unwrap_or_else(|| BackendKind::infer(self.database_dsn.as_deref()))
    }

    pub fn owner(&self) -> &str {
        self.owner.as_deref().unwrap_or_default()
    }

    pub fn storage_config(&self) -> StorageConfig {
        let config = StorageConfig::builder()
            .backend(self.backend())
            .file_path(self.file_storage_path.clone())
            .table_name(self.table_name.clone())
            .token_length(self.short_url_len)
            .base_url(self.base_url.clone());

        match &self.database_dsn {
            Some(dsn) => config.database_dsn(dsn.clone()).build(),
            None => config.build(),
        }
    }
}
