//! # tree-store
//!
//! Transaction provider for 0k-Tree.
//!
//! The treesystem managers never own data. Every query takes a transaction
//! and every write goes through a read-write transaction:
//!
//! - [`ReadTransaction`] - a consistent snapshot (point reads, key listing,
//!   exact and prefix secondary-index lookups)
//! - [`ReadWriteTransaction`] - serialized writer; records and their index
//!   entries are replaced together
//! - [`Database`] - opens transactions
//! - [`RedbDatabase`] - persistent implementation on a redb file
//! - [`MemoryDatabase`] - in-memory implementation for tests and scratch
//!   trees
//!
//! ## Example
//!
//! ```
//! use zerok_tree_store::{Database, IndexEntry, IndexKey, MemoryDatabase, ReadTransaction, ReadWriteTransaction};
//!
//! let db = MemoryDatabase::new();
//! let mut txn = db.begin_read_write().unwrap();
//! txn.put(
//!     "nodes",
//!     "n1",
//!     b"payload".to_vec(),
//!     vec![IndexEntry::new("by_name", IndexKey::of(["parent", "report.pdf"]))],
//! )
//! .unwrap();
//! txn.commit().unwrap();
//!
//! let read = db.begin_read().unwrap();
//! let hits = read.index_get("by_name", &IndexKey::of(["parent", "report.pdf"])).unwrap();
//! assert_eq!(hits, vec!["n1".to_string()]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod disk;
mod error;
mod index;
mod memory;

pub use disk::{RedbDatabase, RedbReadTxn, RedbWriteTxn};
pub use error::StoreError;
pub use index::{IndexEntry, IndexKey};
pub use memory::{MemoryDatabase, MemoryReadTxn, MemoryWriteTxn};

/// Read access to a consistent snapshot.
pub trait ReadTransaction {
    /// Get a record's value.
    fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// All primary keys of a collection, in key order.
    fn keys(&self, collection: &str) -> Result<Vec<String>, StoreError>;

    /// Primary keys stored under exactly `key` in `index`.
    fn index_get(&self, index: &str, key: &IndexKey) -> Result<Vec<String>, StoreError>;

    /// `(index key, primary key)` pairs whose index key starts with `prefix`,
    /// in index-key order.
    fn index_prefix(
        &self,
        index: &str,
        prefix: &IndexKey,
    ) -> Result<Vec<(IndexKey, String)>, StoreError>;
}

/// Serialized write access. Uncommitted changes are discarded on drop.
pub trait ReadWriteTransaction: ReadTransaction {
    /// Insert or replace a record together with its index entries.
    ///
    /// Index entries of a replaced record are removed first.
    fn put(
        &mut self,
        collection: &str,
        key: &str,
        value: Vec<u8>,
        index_entries: Vec<IndexEntry>,
    ) -> Result<(), StoreError>;

    /// Remove a record and its index entries. Returns whether it existed.
    fn remove(&mut self, collection: &str, key: &str) -> Result<bool, StoreError>;

    /// Make the changes visible to new read transactions.
    fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;
}

/// Opens transactions.
pub trait Database: Send + Sync {
    /// Snapshot read transaction.
    type Read: ReadTransaction;
    /// Write transaction.
    type Write<'a>: ReadWriteTransaction
    where
        Self: 'a;

    /// Begin a snapshot read.
    fn begin_read(&self) -> Result<Self::Read, StoreError>;

    /// Begin the (single) write transaction, waiting for the current writer.
    ///
    /// Fails with [`StoreError::WriteReentrancy`] if this thread already
    /// holds it.
    fn begin_read_write(&self) -> Result<Self::Write<'_>, StoreError>;
}
