//! Directory-backed stores
//!
//! Layout of a store directory:
//! - recordings/<key>.row: metadata rows
//! - audioData/<key>.row: audio rows
//!
//! Keys are percent-encoded into file names. A transaction first stages every
//! put into a temp file next to its target, then swaps the files in one by one
//! while keeping the previous contents aside. If any swap fails the applied
//! steps are undone in reverse order. Readers share a lock the transaction
//! holds exclusively, so they only ever see a transaction fully applied or
//! not at all.

use super::traits::{BlobKeyValueStore, LegacyStore, StoreError, StoreResult, Table, WriteOp};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

const ROW_EXTENSION: &str = "row";

/// Two-table store persisted under a directory
#[derive(Clone)]
pub struct FsStore {
    root: Arc<PathBuf>,
    // Shared by readers, exclusive for transactions.
    rows_lock: Arc<RwLock<()>>,
}

impl FsStore {
    /// Open (and create if needed) a store directory
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for table in Table::ALL {
            fs::create_dir_all(root.join(table.name()))?;
        }
        tracing::info!("Opened recording store at {:?}", root);
        Ok(Self {
            root: Arc::new(root),
            rows_lock: Arc::new(RwLock::new(())),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path, &RwLock<()>) -> StoreResult<T> + Send + 'static,
    {
        let root = self.root.clone();
        let lock = self.rows_lock.clone();
        tokio::task::spawn_blocking(move || f(root.as_path(), &*lock))
            .await
            .map_err(|e| StoreError::Backend(format!("Store task failed: {}", e)))?
    }
}

fn table_dir(root: &Path, table: Table) -> PathBuf {
    root.join(table.name())
}

fn row_path(root: &Path, table: Table, key: &str) -> PathBuf {
    table_dir(root, table).join(format!("{}.{}", urlencoding::encode(key), ROW_EXTENSION))
}

fn list_rows(root: &Path, table: Table) -> StoreResult<BTreeMap<String, PathBuf>> {
    let dir = table_dir(root, table);
    let mut rows = BTreeMap::new();
    if !dir.exists() {
        return Ok(rows);
    }

    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ROW_EXTENSION) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match urlencoding::decode(stem) {
            Ok(key) => {
                rows.insert(key.into_owned(), path);
            }
            Err(e) => tracing::warn!("Skipping undecodable row file {:?}: {}", path, e),
        }
    }
    Ok(rows)
}

fn read_row(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

enum Staged {
    Put { target: PathBuf, file: NamedTempFile },
    Delete { target: PathBuf },
}

struct Undo {
    target: PathBuf,
    backup: Option<PathBuf>,
    placed: bool,
}

fn stage(root: &Path, ops: Vec<WriteOp>) -> StoreResult<Vec<Staged>> {
    let mut staged = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            WriteOp::Put { table, key, value } => {
                let dir = table_dir(root, table);
                fs::create_dir_all(&dir)?;
                let mut file = NamedTempFile::new_in(&dir)?;
                file.write_all(&value)?;
                file.as_file().sync_all()?;
                staged.push(Staged::Put {
                    target: row_path(root, table, &key),
                    file,
                });
            }
            WriteOp::Delete { table, key } => staged.push(Staged::Delete {
                target: row_path(root, table, &key),
            }),
            WriteOp::Clear { table } => {
                for (_, target) in list_rows(root, table)? {
                    staged.push(Staged::Delete { target });
                }
            }
        }
    }
    Ok(staged)
}

fn commit_step(step: Staged, backup_tag: &str, undo: &mut Vec<Undo>) -> std::io::Result<()> {
    let target = match &step {
        Staged::Put { target, .. } | Staged::Delete { target } => target.clone(),
    };

    let backup = if target.exists() {
        let backup = target.with_extension(format!("bak-{}-{}", backup_tag, undo.len()));
        fs::rename(&target, &backup)?;
        Some(backup)
    } else {
        None
    };
    undo.push(Undo {
        target: target.clone(),
        backup,
        placed: false,
    });

    if let Staged::Put { file, .. } = step {
        file.persist(&target).map_err(|e| e.error)?;
        if let Some(last) = undo.last_mut() {
            last.placed = true;
        }
    }
    Ok(())
}

fn rollback(undo: Vec<Undo>) {
    for step in undo.into_iter().rev() {
        if step.placed {
            if let Err(e) = fs::remove_file(&step.target) {
                tracing::error!("Rollback could not remove {:?}: {}", step.target, e);
            }
        }
        if let Some(backup) = step.backup {
            if let Err(e) = fs::rename(&backup, &step.target) {
                tracing::error!("Rollback could not restore {:?}: {}", step.target, e);
            }
        }
    }
}

fn apply_transaction(root: &Path, ops: Vec<WriteOp>) -> StoreResult<()> {
    commit(stage(root, ops)?)
}

/// Swap staged rows into place, all or nothing
fn commit(staged: Vec<Staged>) -> StoreResult<()> {
    let backup_tag = uuid::Uuid::new_v4().simple().to_string();

    let mut undo = Vec::with_capacity(staged.len());
    for step in staged {
        if let Err(e) = commit_step(step, &backup_tag, &mut undo) {
            tracing::warn!("Transaction failed, rolling back {} step(s): {}", undo.len(), e);
            rollback(undo);
            return Err(StoreError::TransactionFailed(e.to_string()));
        }
    }

    for step in undo {
        if let Some(backup) = step.backup {
            let _ = fs::remove_file(backup);
        }
    }
    Ok(())
}

#[async_trait]
impl BlobKeyValueStore for FsStore {
    async fn get(&self, table: Table, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = key.to_string();
        self.blocking(move |root, lock| {
            let _guard = lock.read();
            read_row(&row_path(root, table, &key))
        })
        .await
    }

    async fn keys(&self, table: Table) -> StoreResult<Vec<String>> {
        self.blocking(move |root, lock| {
            let _guard = lock.read();
            Ok(list_rows(root, table)?.into_keys().collect())
        })
        .await
    }

    async fn get_all(&self, table: Table) -> StoreResult<Vec<(String, Vec<u8>)>> {
        self.blocking(move |root, lock| {
            let _guard = lock.read();
            let mut rows = Vec::new();
            for (key, path) in list_rows(root, table)? {
                if let Some(data) = read_row(&path)? {
                    rows.push((key, data));
                }
            }
            Ok(rows)
        })
        .await
    }

    async fn transaction(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
        self.blocking(move |root, lock| {
            let _guard = lock.write();
            apply_transaction(root, ops)
        })
        .await
    }
}

/// Legacy string store persisted as one JSON object file
#[derive(Clone)]
pub struct FileLegacyStore {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl FileLegacyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Run a read-modify-write of the items file off the async runtime
    async fn with_items<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut BTreeMap<String, String>) -> (T, bool) + Send + 'static,
    {
        let path = self.path.clone();
        let lock = self.lock.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock();
            let mut items = read_legacy_items(&path)?;
            let (value, changed) = f(&mut items);
            if changed {
                write_legacy_items(&path, &items)?;
            }
            Ok(value)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("Legacy store task failed: {}", e)))?
    }
}

fn read_legacy_items(path: &Path) -> StoreResult<BTreeMap<String, String>> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_legacy_items(path: &Path, items: &BTreeMap<String, String>) -> StoreResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(serde_json::to_string(items)?.as_bytes())?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl LegacyStore for FileLegacyStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.with_items(move |items| (items.get(&key).cloned(), false))
            .await
    }

    async fn set_item(&self, key: &str, value: String) -> StoreResult<()> {
        let key = key.to_string();
        self.with_items(move |items| {
            items.insert(key, value);
            ((), true)
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        self.with_items(move |items| ((), items.remove(&key).is_some()))
            .await
    }
}
