//! The record-store adapter the duplication engine runs against.
//!
//! Any transactional store can back the engine by implementing
//! [`RecordStore`]. The bundled [`MemoryStore`] is a complete in-process
//! implementation with serializable transactions.

use crate::error::StoreError;
use crate::model::{EntityKind, Id, Record};

pub mod memory;
pub mod snapshot;

pub use memory::MemoryStore;
pub use snapshot::StoreSnapshot;

/// Read access to stored records.
pub trait RecordReader {
    /// Fetches one record of the given kind. `Ok(None)` means it does not exist.
    fn fetch_by_id(&self, kind: EntityKind, id: &Id) -> Result<Option<Record>, StoreError>;

    /// Whether any record of any kind uses `id`.
    fn exists(&self, id: &Id) -> Result<bool, StoreError>;

    /// Direct children of a node, ordered by their `order` field.
    fn children_of(&self, parent: &Id) -> Result<Vec<Id>, StoreError>;

    /// Identities of the records of `kind` owned by `node`.
    fn owned_by(&self, kind: EntityKind, node: &Id) -> Result<Vec<Id>, StoreError>;
}

/// A unit of atomic work. Dropping a transaction without committing it rolls it back.
pub trait Transaction: RecordReader {
    /// This transaction's read view, including its own uncommitted writes.
    fn as_reader(&self) -> &dyn RecordReader;

    /// Allocates the next duplication counter value for `base`.
    ///
    /// Values are strictly increasing per base identity and become durable
    /// only if the transaction commits.
    fn allocate_suffix_segment(&mut self, base: &Id) -> Result<u32, StoreError>;

    /// Stages new records of one kind. Fails with [`StoreError::UniqueViolation`]
    /// if any identity is already taken.
    fn insert_batch(&mut self, kind: EntityKind, records: Vec<Record>) -> Result<(), StoreError>;

    /// Clears the "last resolved" marker of a record. Returns whether one was set.
    fn clear_resolved_marker(&mut self, kind: EntityKind, id: &Id) -> Result<bool, StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// A store that hands out transactions and read-only views.
pub trait RecordStore: Send + Sync {
    fn begin_transaction(&self) -> Result<Box<dyn Transaction + '_>, StoreError>;

    /// A consistent read-only view of committed data.
    fn reader(&self) -> Result<Box<dyn RecordReader + '_>, StoreError>;
}
