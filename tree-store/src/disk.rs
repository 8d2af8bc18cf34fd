//! On-disk database backed by redb.
//!
//! Each collection is a table of MessagePack records keyed by primary key.
//! Each secondary index is a table keyed by the index key with the primary
//! key appended as a last component. redb provides the snapshot reads and
//! serializes writers.

use redb::{ReadableTable, TableDefinition, TableError};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::{self, ThreadId};
use tracing::{debug, info};

use crate::memory::Record;
use crate::{
    Database, IndexEntry, IndexKey, ReadTransaction, ReadWriteTransaction, StoreError,
};

type RecordTable<'n> = TableDefinition<'n, &'static str, &'static [u8]>;
type IndexTable<'n> = TableDefinition<'n, &'static str, &'static str>;

fn records_name(collection: &str) -> String {
    format!("records/{collection}")
}

fn index_name(index: &str) -> String {
    format!("index/{index}")
}

fn backend(err: impl Into<redb::Error>) -> StoreError {
    StoreError::Backend(err.into())
}

/// Stored key of one index entry.
fn entry_key(key: &IndexKey, primary: &str) -> IndexKey {
    key.clone().push(primary)
}

fn record_in<T>(table: &T, key: &str) -> Result<Option<Record>, StoreError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key).map_err(backend)? {
        Some(guard) => Ok(Some(rmp_serde::from_slice(guard.value())?)),
        None => Ok(None),
    }
}

fn keys_in<T>(table: &T) -> Result<Vec<String>, StoreError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut keys = Vec::new();
    for item in table.iter().map_err(backend)? {
        let (key, _) = item.map_err(backend)?;
        keys.push(key.value().to_string());
    }
    Ok(keys)
}

fn scan_in<T>(table: &T, prefix: &IndexKey) -> Result<Vec<(IndexKey, String)>, StoreError>
where
    T: ReadableTable<&'static str, &'static str>,
{
    let mut out = Vec::new();
    for item in table.range(prefix.as_str()..).map_err(backend)? {
        let (stored, primary) = item.map_err(backend)?;
        let stored = stored.value();
        if !stored.starts_with(prefix.as_str()) {
            break;
        }
        let primary = primary.value().to_string();
        let suffix = IndexKey::new().push(&primary);
        let key = stored.strip_suffix(suffix.as_str()).unwrap_or(stored);
        out.push((IndexKey::from_encoded(key), primary));
    }
    Ok(out)
}

fn exact(hits: Vec<(IndexKey, String)>, key: &IndexKey) -> Vec<String> {
    hits.into_iter()
        .filter(|(k, _)| k == key)
        .map(|(_, primary)| primary)
        .collect()
}

/// Persistent snapshot-isolated database.
pub struct RedbDatabase {
    db: redb::Database,
    writer_thread: Mutex<Option<ThreadId>>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbDatabase")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbDatabase {
    /// Open the database at `path`, creating it if needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let existed = path.exists();
        let db = redb::Database::create(path).map_err(backend)?;
        if existed {
            info!(path = %path.display(), "opened database");
        } else {
            info!(path = %path.display(), "created database");
        }
        Ok(Self {
            db,
            writer_thread: Mutex::new(None),
            path: path.to_path_buf(),
        })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Database for RedbDatabase {
    type Read = RedbReadTxn;
    type Write<'a> = RedbWriteTxn<'a>;

    fn begin_read(&self) -> Result<RedbReadTxn, StoreError> {
        Ok(RedbReadTxn {
            txn: self.db.begin_read().map_err(backend)?,
        })
    }

    fn begin_read_write(&self) -> Result<RedbWriteTxn<'_>, StoreError> {
        let me = thread::current().id();
        {
            let holder = self.writer_thread.lock().map_err(|_| StoreError::Poisoned)?;
            if *holder == Some(me) {
                return Err(StoreError::WriteReentrancy);
            }
        }

        let txn = self.db.begin_write().map_err(backend)?;
        *self.writer_thread.lock().map_err(|_| StoreError::Poisoned)? = Some(me);

        Ok(RedbWriteTxn {
            txn,
            _claim: WriterClaim(&self.writer_thread),
        })
    }
}

/// Clears the writer's thread when the write transaction ends.
struct WriterClaim<'db>(&'db Mutex<Option<ThreadId>>);

impl Drop for WriterClaim<'_> {
    fn drop(&mut self) {
        if let Ok(mut holder) = self.0.lock() {
            *holder = None;
        }
    }
}

/// Snapshot read transaction of a [`RedbDatabase`].
pub struct RedbReadTxn {
    txn: redb::ReadTransaction,
}

impl RedbReadTxn {
    fn records(
        &self,
        collection: &str,
    ) -> Result<Option<redb::ReadOnlyTable<&'static str, &'static [u8]>>, StoreError> {
        let name = records_name(collection);
        match self.txn.open_table(RecordTable::new(&name)) {
            Ok(table) => Ok(Some(table)),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(err) => Err(backend(err)),
        }
    }

    fn index(
        &self,
        index: &str,
    ) -> Result<Option<redb::ReadOnlyTable<&'static str, &'static str>>, StoreError> {
        let name = index_name(index);
        match self.txn.open_table(IndexTable::new(&name)) {
            Ok(table) => Ok(Some(table)),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(err) => Err(backend(err)),
        }
    }
}

impl ReadTransaction for RedbReadTxn {
    fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.records(collection)? {
            Some(table) => Ok(record_in(&table, key)?.map(|r| r.value)),
            None => Ok(None),
        }
    }

    fn keys(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        match self.records(collection)? {
            Some(table) => keys_in(&table),
            None => Ok(Vec::new()),
        }
    }

    fn index_get(&self, index: &str, key: &IndexKey) -> Result<Vec<String>, StoreError> {
        match self.index(index)? {
            Some(table) => Ok(exact(scan_in(&table, key)?, key)),
            None => Ok(Vec::new()),
        }
    }

    fn index_prefix(
        &self,
        index: &str,
        prefix: &IndexKey,
    ) -> Result<Vec<(IndexKey, String)>, StoreError> {
        match self.index(index)? {
            Some(table) => scan_in(&table, prefix),
            None => Ok(Vec::new()),
        }
    }
}

/// Write transaction of a [`RedbDatabase`].
///
/// Aborted when dropped without [`commit`](ReadWriteTransaction::commit).
pub struct RedbWriteTxn<'db> {
    txn: redb::WriteTransaction,
    _claim: WriterClaim<'db>,
}

impl std::fmt::Debug for RedbWriteTxn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbWriteTxn").finish_non_exhaustive()
    }
}

impl RedbWriteTxn<'_> {
    fn add_entries(&mut self, primary: &str, entries: &[IndexEntry]) -> Result<(), StoreError> {
        for entry in entries {
            let name = index_name(&entry.index);
            let mut table = self.txn.open_table(IndexTable::new(&name)).map_err(backend)?;
            table
                .insert(entry_key(&entry.key, primary).as_str(), primary)
                .map_err(backend)?;
        }
        Ok(())
    }

    fn drop_entries(&mut self, primary: &str, entries: &[IndexEntry]) -> Result<(), StoreError> {
        for entry in entries {
            let name = index_name(&entry.index);
            let mut table = self.txn.open_table(IndexTable::new(&name)).map_err(backend)?;
            table
                .remove(entry_key(&entry.key, primary).as_str())
                .map_err(backend)?;
        }
        Ok(())
    }
}

impl ReadTransaction for RedbWriteTxn<'_> {
    fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let name = records_name(collection);
        let table = self.txn.open_table(RecordTable::new(&name)).map_err(backend)?;
        Ok(record_in(&table, key)?.map(|r| r.value))
    }

    fn keys(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let name = records_name(collection);
        let table = self.txn.open_table(RecordTable::new(&name)).map_err(backend)?;
        keys_in(&table)
    }

    fn index_get(&self, index: &str, key: &IndexKey) -> Result<Vec<String>, StoreError> {
        let name = index_name(index);
        let table = self.txn.open_table(IndexTable::new(&name)).map_err(backend)?;
        Ok(exact(scan_in(&table, key)?, key))
    }

    fn index_prefix(
        &self,
        index: &str,
        prefix: &IndexKey,
    ) -> Result<Vec<(IndexKey, String)>, StoreError> {
        let name = index_name(index);
        let table = self.txn.open_table(IndexTable::new(&name)).map_err(backend)?;
        scan_in(&table, prefix)
    }
}

impl ReadWriteTransaction for RedbWriteTxn<'_> {
    fn put(
        &mut self,
        collection: &str,
        key: &str,
        value: Vec<u8>,
        index_entries: Vec<IndexEntry>,
    ) -> Result<(), StoreError> {
        let record = Record {
            value,
            index_entries,
        };
        let bytes = rmp_serde::to_vec(&record)?;
        let name = records_name(collection);
        let previous = {
            let mut table = self.txn.open_table(RecordTable::new(&name)).map_err(backend)?;
            let previous = record_in(&table, key)?;
            table.insert(key, bytes.as_slice()).map_err(backend)?;
            previous
        };

        if let Some(previous) = previous {
            self.drop_entries(key, &previous.index_entries)?;
        }
        self.add_entries(key, &record.index_entries)
    }

    fn remove(&mut self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let name = records_name(collection);
        let removed = {
            let mut table = self.txn.open_table(RecordTable::new(&name)).map_err(backend)?;
            let removed = table.remove(key).map_err(backend)?;
            let record: Option<Record> = match removed {
                Some(guard) => Some(rmp_serde::from_slice(guard.value())?),
                None => None,
            };
            record
        };

        match removed {
            Some(record) => {
                self.drop_entries(key, &record.index_entries)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn commit(self) -> Result<(), StoreError> {
        let Self { txn, _claim } = self;
        txn.commit().map_err(backend)?;
        debug!("committed write transaction");
        Ok(())
    }
}
