//! In-memory database with snapshot reads and a single writer.
//!
//! Committed state is an immutable `Arc<Tables>`. Readers clone the `Arc`
//! and never block the writer. The writer works on its own copy (cloned on
//! first mutation) and swaps it in on commit. Nothing is written to disk;
//! see [`RedbDatabase`](crate::RedbDatabase) for that.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, ThreadId};

use crate::{
    Database, IndexEntry, IndexKey, ReadTransaction, ReadWriteTransaction, StoreError,
};

/// A stored value with the index entries it was written with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Record {
    pub(crate) value: Vec<u8>,
    pub(crate) index_entries: Vec<IndexEntry>,
}

/// Index names are global, so each index must only be fed by one collection.
#[derive(Debug, Clone, Default)]
struct Tables {
    collections: BTreeMap<String, BTreeMap<String, Record>>,
    indices: BTreeMap<String, BTreeMap<IndexKey, BTreeSet<String>>>,
}

impl Tables {
    fn get(&self, collection: &str, key: &str) -> Option<Vec<u8>> {
        self.collections
            .get(collection)
            .and_then(|c| c.get(key))
            .map(|r| r.value.clone())
    }

    fn keys(&self, collection: &str) -> Vec<String> {
        self.collections
            .get(collection)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn index_get(&self, index: &str, key: &IndexKey) -> Vec<String> {
        self.indices
            .get(index)
            .and_then(|i| i.get(key))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn index_prefix(&self, index: &str, prefix: &IndexKey) -> Vec<(IndexKey, String)> {
        let Some(entries) = self.indices.get(index) else {
            return Vec::new();
        };
        entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .flat_map(|(k, set)| set.iter().map(move |pk| (k.clone(), pk.clone())))
            .collect()
    }

    fn remove_record(&mut self, collection: &str, key: &str) -> bool {
        let Some(record) = self
            .collections
            .get_mut(collection)
            .and_then(|c| c.remove(key))
        else {
            return false;
        };
        for entry in &record.index_entries {
            if let Some(index) = self.indices.get_mut(&entry.index) {
                if let Some(set) = index.get_mut(&entry.key) {
                    set.remove(key);
                    if set.is_empty() {
                        index.remove(&entry.key);
                    }
                }
            }
        }
        true
    }

    fn put_record(&mut self, collection: &str, key: &str, record: Record) {
        self.remove_record(collection, key);
        for entry in &record.index_entries {
            self.indices
                .entry(entry.index.clone())
                .or_default()
                .entry(entry.key.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), record);
    }
}

/// In-memory snapshot-isolated database.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    committed: RwLock<Arc<Tables>>,
    writer: Mutex<()>,
    writer_thread: Mutex<Option<ThreadId>>,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Result<Arc<Tables>, StoreError> {
        self.committed
            .read()
            .map(|t| Arc::clone(&t))
            .map_err(|_| StoreError::Poisoned)
    }
}

impl Database for MemoryDatabase {
    type Read = MemoryReadTxn;
    type Write<'a> = MemoryWriteTxn<'a>;

    fn begin_read(&self) -> Result<MemoryReadTxn, StoreError> {
        Ok(MemoryReadTxn {
            tables: self.snapshot()?,
        })
    }

    fn begin_read_write(&self) -> Result<MemoryWriteTxn<'_>, StoreError> {
        let me = thread::current().id();
        {
            let holder = self.writer_thread.lock().map_err(|_| StoreError::Poisoned)?;
            if *holder == Some(me) {
                return Err(StoreError::WriteReentrancy);
            }
        }

        let guard = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        *self.writer_thread.lock().map_err(|_| StoreError::Poisoned)? = Some(me);

        Ok(MemoryWriteTxn {
            db: self,
            tables: self.snapshot()?,
            dirty: false,
            _guard: guard,
        })
    }
}

/// Snapshot read transaction of a [`MemoryDatabase`].
#[derive(Debug, Clone)]
pub struct MemoryReadTxn {
    tables: Arc<Tables>,
}

impl ReadTransaction for MemoryReadTxn {
    fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tables.get(collection, key))
    }

    fn keys(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.tables.keys(collection))
    }

    fn index_get(&self, index: &str, key: &IndexKey) -> Result<Vec<String>, StoreError> {
        Ok(self.tables.index_get(index, key))
    }

    fn index_prefix(
        &self,
        index: &str,
        prefix: &IndexKey,
    ) -> Result<Vec<(IndexKey, String)>, StoreError> {
        Ok(self.tables.index_prefix(index, prefix))
    }
}

/// Write transaction of a [`MemoryDatabase`].
///
/// Holds the writer lock until committed or dropped. Reads observe the
/// transaction's own uncommitted writes.
pub struct MemoryWriteTxn<'db> {
    db: &'db MemoryDatabase,
    tables: Arc<Tables>,
    dirty: bool,
    _guard: MutexGuard<'db, ()>,
}

impl std::fmt::Debug for MemoryWriteTxn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWriteTxn")
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl ReadTransaction for MemoryWriteTxn<'_> {
    fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tables.get(collection, key))
    }

    fn keys(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.tables.keys(collection))
    }

    fn index_get(&self, index: &str, key: &IndexKey) -> Result<Vec<String>, StoreError> {
        Ok(self.tables.index_get(index, key))
    }

    fn index_prefix(
        &self,
        index: &str,
        prefix: &IndexKey,
    ) -> Result<Vec<(IndexKey, String)>, StoreError> {
        Ok(self.tables.index_prefix(index, prefix))
    }
}

impl ReadWriteTransaction for MemoryWriteTxn<'_> {
    fn put(
        &mut self,
        collection: &str,
        key: &str,
        value: Vec<u8>,
        index_entries: Vec<IndexEntry>,
    ) -> Result<(), StoreError> {
        self.dirty = true;
        Arc::make_mut(&mut self.tables).put_record(
            collection,
            key,
            Record {
                value,
                index_entries,
            },
        );
        Ok(())
    }

    fn remove(&mut self, collection: &str, key: &str) -> Result<bool, StoreError> {
        if self.tables.get(collection, key).is_none() {
            return Ok(false);
        }
        self.dirty = true;
        Ok(Arc::make_mut(&mut self.tables).remove_record(collection, key))
    }

    fn commit(self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        let mut committed = self
            .db
            .committed
            .write()
            .map_err(|_| StoreError::Poisoned)?;
        *committed = Arc::clone(&self.tables);
        Ok(())
    }
}

impl Drop for MemoryWriteTxn<'_> {
    fn drop(&mut self) {
        if let Ok(mut holder) = self.db.writer_thread.lock() {
            *holder = None;
        }
    }
}
