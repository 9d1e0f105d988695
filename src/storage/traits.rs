//! Storage trait definitions
//!
//! Platform-agnostic key/blob store used by the recording engine. A store
//! holds two tables keyed by recording id and must apply a batch of writes
//! all-or-nothing.

use async_trait::async_trait;
use thiserror::Error;

/// Logical tables of the durable store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Recording metadata rows, no audio bytes
    Recordings,
    /// Audio rows keyed by the owning recording id
    Audio,
}

impl Table {
    pub const ALL: [Table; 2] = [Table::Recordings, Table::Audio];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Recordings => "recordings",
            Table::Audio => "audioData",
        }
    }
}

/// A single write inside a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        table: Table,
        key: String,
        value: Vec<u8>,
    },
    Delete {
        table: Table,
        key: String,
    },
    Clear {
        table: Table,
    },
}

impl WriteOp {
    pub fn put(table: Table, key: impl Into<String>, value: Vec<u8>) -> Self {
        WriteOp::Put {
            table,
            key: key.into(),
            value,
        }
    }

    pub fn delete(table: Table, key: impl Into<String>) -> Self {
        WriteOp::Delete {
            table,
            key: key.into(),
        }
    }

    pub fn table(&self) -> Table {
        match self {
            WriteOp::Put { table, .. } | WriteOp::Delete { table, .. } | WriteOp::Clear { table } => {
                *table
            }
        }
    }
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row {key} in {table}: {reason}")]
    Corrupt {
        table: &'static str,
        key: String,
        reason: String,
    },

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable two-table key/blob store
#[async_trait]
pub trait BlobKeyValueStore: Send + Sync {
    /// Read one row
    async fn get(&self, table: Table, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// List every key of a table
    async fn keys(&self, table: Table) -> StoreResult<Vec<String>>;

    /// Read every row of a table
    async fn get_all(&self, table: Table) -> StoreResult<Vec<(String, Vec<u8>)>>;

    /// Apply all writes or none of them
    async fn transaction(&self, ops: Vec<WriteOp>) -> StoreResult<()>;

    async fn put(&self, table: Table, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.transaction(vec![WriteOp::put(table, key, value)]).await
    }

    async fn delete(&self, table: Table, key: &str) -> StoreResult<()> {
        self.transaction(vec![WriteOp::delete(table, key)]).await
    }
}

/// Browser-style single-key string store holding the legacy representation
#[async_trait]
pub trait LegacyStore: Send + Sync {
    async fn get_item(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_item(&self, key: &str, value: String) -> StoreResult<()>;

    async fn remove_item(&self, key: &str) -> StoreResult<()>;
}
