//! In-memory stores
//!
//! Tab-lifetime storage: everything is lost when the process exits.

use super::traits::{BlobKeyValueStore, LegacyStore, StoreResult, Table, WriteOp};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

type Tables = HashMap<Table, BTreeMap<String, Vec<u8>>>;

/// Two-table store kept in process memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobKeyValueStore for MemoryStore {
    async fn get(&self, table: Table, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .tables
            .read()
            .get(&table)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    async fn keys(&self, table: Table) -> StoreResult<Vec<String>> {
        Ok(self
            .tables
            .read()
            .get(&table)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_all(&self, table: Table) -> StoreResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .tables
            .read()
            .get(&table)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn transaction(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
        // Writes cannot fail individually, so holding the write lock for the
        // whole batch is enough to make it atomic to readers.
        let mut tables = self.tables.write();
        for op in ops {
            match op {
                WriteOp::Put { table, key, value } => {
                    tables.entry(table).or_default().insert(key, value);
                }
                WriteOp::Delete { table, key } => {
                    if let Some(rows) = tables.get_mut(&table) {
                        rows.remove(&key);
                    }
                }
                WriteOp::Clear { table } => {
                    tables.remove(&table);
                }
            }
        }
        Ok(())
    }
}

/// String key/value store standing in for browser local storage
#[derive(Default)]
pub struct MemoryLegacyStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryLegacyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items<I, K, V>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            items: RwLock::new(
                items
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl LegacyStore for MemoryLegacyStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> StoreResult<()> {
        self.items.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StoreResult<()> {
        self.items.write().remove(key);
        Ok(())
    }
}
