use super::snapshot::StoreSnapshot;
use super::{RecordReader, RecordStore, Transaction};
use crate::error::{SnapshotError, StoreError};
use crate::lineage::strip_one_level;
use crate::model::{EntityKind, Id, Record};
use ahash::{AHashMap, AHashSet};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Committed contents of a [`MemoryStore`].
#[derive(Debug, Default, Clone)]
struct Tables {
    records: BTreeMap<EntityKind, BTreeMap<Id, Record>>,
    /// Which kind each identity belongs to.
    kinds: AHashMap<Id, EntityKind>,
    counters: BTreeMap<Id, u32>,
}

impl Tables {
    fn get(&self, kind: EntityKind, id: &Id) -> Result<Option<&Record>, StoreError> {
        match self.kinds.get(id) {
            None => Ok(None),
            Some(actual) if *actual != kind => Err(StoreError::KindMismatch {
                id: id.clone(),
                expected: kind,
                actual: *actual,
            }),
            Some(_) => Ok(self.records.get(&kind).and_then(|table| table.get(id))),
        }
    }

    fn table(&self, kind: EntityKind) -> impl Iterator<Item = &Record> {
        self.records.get(&kind).into_iter().flat_map(|t| t.values())
    }

    fn put(&mut self, record: Record) -> Result<(), StoreError> {
        let kind = record.kind();
        let id = record.id().clone();
        if let Some(existing) = self.kinds.get(&id) {
            return Err(StoreError::UniqueViolation {
                kind: *existing,
                id,
            });
        }
        self.kinds.insert(id.clone(), kind);
        self.records.entry(kind).or_default().insert(id, record);
        Ok(())
    }

    /// Highest `n` such that `base-n` is a stored identity.
    fn highest_derived_segment(&self, base: &Id) -> u32 {
        self.kinds
            .keys()
            .filter_map(strip_one_level)
            .filter(|(parent, _)| parent == base)
            .map(|(_, segment)| segment)
            .max()
            .unwrap_or(0)
    }
}

/// Uncommitted changes of one transaction.
#[derive(Debug, Default)]
struct TransactionBuffer {
    inserted: Vec<Record>,
    positions: AHashMap<Id, usize>,
    counters: AHashMap<Id, u32>,
    /// Committed records whose resolved marker this transaction cleared.
    cleared: AHashSet<Id>,
}

fn sort_children(children: &mut [(i32, Id)]) {
    children.sort_by(|(a_order, a_id), (b_order, b_id)| a_order.cmp(b_order).then(a_id.cmp(b_id)));
}

/// Reads committed tables with an optional transaction buffer layered on top.
fn read_record(
    tables: &Tables,
    buffer: Option<&TransactionBuffer>,
    kind: EntityKind,
    id: &Id,
) -> Result<Option<Record>, StoreError> {
    if let Some(buffer) = buffer {
        if let Some(&pos) = buffer.positions.get(id) {
            let record = &buffer.inserted[pos];
            if record.kind() != kind {
                return Err(StoreError::KindMismatch {
                    id: id.clone(),
                    expected: kind,
                    actual: record.kind(),
                });
            }
            return Ok(Some(record.clone()));
        }
    }
    let mut record = tables.get(kind, id)?.cloned();
    if let (Some(record), Some(buffer)) = (record.as_mut(), buffer) {
        if buffer.cleared.contains(id) {
            record.clear_resolved_marker();
        }
    }
    Ok(record)
}

fn read_children(
    tables: &Tables,
    buffer: Option<&TransactionBuffer>,
    parent: &Id,
) -> Vec<Id> {
    let staged = buffer.into_iter().flat_map(|b| b.inserted.iter());
    let mut children: Vec<(i32, Id)> = tables
        .table(EntityKind::Node)
        .chain(staged)
        .filter_map(Record::as_node)
        .filter(|node| node.parent_id.as_ref() == Some(parent))
        .map(|node| (node.order, node.id.clone()))
        .collect();
    sort_children(&mut children);
    children.into_iter().map(|(_, id)| id).collect()
}

fn read_owned(
    tables: &Tables,
    buffer: Option<&TransactionBuffer>,
    kind: EntityKind,
    node: &Id,
) -> Vec<Id> {
    let staged = buffer
        .into_iter()
        .flat_map(|b| b.inserted.iter())
        .filter(|record| record.kind() == kind);
    tables
        .table(kind)
        .chain(staged)
        .filter(|record| record.owner() == Some(node))
        .map(|record| record.id().clone())
        .collect()
}

/// An in-process record store with serializable transactions.
///
/// A transaction holds the store lock from `begin_transaction` until it is
/// committed, rolled back or dropped, so concurrent duplications run one
/// after the other and never observe each other's partial state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Tables>,
    injected_conflicts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a snapshot, rejecting duplicate identities.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, SnapshotError> {
        let mut tables = Tables {
            counters: snapshot.counters.clone(),
            ..Tables::default()
        };
        for record in snapshot.into_records() {
            let id = record.id().clone();
            tables
                .put(record)
                .map_err(|_| SnapshotError::DuplicateIdentity(id))?;
        }
        Ok(Self {
            state: Mutex::new(tables),
            injected_conflicts: AtomicUsize::new(0),
        })
    }

    /// Copies the committed contents into a snapshot.
    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let tables = self.lock()?;
        let mut snapshot = StoreSnapshot {
            counters: tables.counters.clone(),
            ..StoreSnapshot::default()
        };
        for kind in EntityKind::ALL {
            for record in tables.table(kind) {
                snapshot.push(record.clone());
            }
        }
        Ok(snapshot)
    }

    /// Inserts a record outside of any transaction, for seeding.
    pub fn insert(&self, record: impl Into<Record>) -> Result<(), StoreError> {
        self.lock()?.put(record.into())
    }

    pub fn get(&self, kind: EntityKind, id: &Id) -> Result<Option<Record>, StoreError> {
        Ok(self.lock()?.get(kind, id)?.cloned())
    }

    /// Number of committed records across all kinds.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.kinds.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Makes the next `count` commits fail with a transient [`StoreError::Conflict`].
    pub fn fail_next_commits(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl RecordStore for MemoryStore {
    fn begin_transaction(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            tables: self.lock()?,
            buffer: TransactionBuffer::default(),
        }))
    }

    fn reader(&self) -> Result<Box<dyn RecordReader + '_>, StoreError> {
        Ok(Box::new(MemoryReader {
            tables: self.lock()?,
        }))
    }
}

/// Read-only view over committed data.
struct MemoryReader<'a> {
    tables: MutexGuard<'a, Tables>,
}

impl RecordReader for MemoryReader<'_> {
    fn fetch_by_id(&self, kind: EntityKind, id: &Id) -> Result<Option<Record>, StoreError> {
        read_record(&self.tables, None, kind, id)
    }

    fn exists(&self, id: &Id) -> Result<bool, StoreError> {
        Ok(self.tables.kinds.contains_key(id))
    }

    fn children_of(&self, parent: &Id) -> Result<Vec<Id>, StoreError> {
        Ok(read_children(&self.tables, None, parent))
    }

    fn owned_by(&self, kind: EntityKind, node: &Id) -> Result<Vec<Id>, StoreError> {
        Ok(read_owned(&self.tables, None, kind, node))
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    tables: MutexGuard<'a, Tables>,
    buffer: TransactionBuffer,
}

impl RecordReader for MemoryTransaction<'_> {
    fn fetch_by_id(&self, kind: EntityKind, id: &Id) -> Result<Option<Record>, StoreError> {
        read_record(&self.tables, Some(&self.buffer), kind, id)
    }

    fn exists(&self, id: &Id) -> Result<bool, StoreError> {
        Ok(self.buffer.positions.contains_key(id) || self.tables.kinds.contains_key(id))
    }

    fn children_of(&self, parent: &Id) -> Result<Vec<Id>, StoreError> {
        Ok(read_children(&self.tables, Some(&self.buffer), parent))
    }

    fn owned_by(&self, kind: EntityKind, node: &Id) -> Result<Vec<Id>, StoreError> {
        Ok(read_owned(&self.tables, Some(&self.buffer), kind, node))
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn as_reader(&self) -> &dyn RecordReader {
        self
    }

    fn allocate_suffix_segment(&mut self, base: &Id) -> Result<u32, StoreError> {
        let counter = self
            .buffer
            .counters
            .get(base)
            .or_else(|| self.tables.counters.get(base))
            .copied()
            .unwrap_or(0);
        let next = counter
            .max(self.tables.highest_derived_segment(base))
            .checked_add(1)
            .ok_or_else(|| StoreError::CounterExhausted(base.clone()))?;
        self.buffer.counters.insert(base.clone(), next);
        Ok(next)
    }

    fn insert_batch(&mut self, kind: EntityKind, records: Vec<Record>) -> Result<(), StoreError> {
        // Validate the whole batch before staging any of it.
        let mut batch_ids = AHashSet::with_capacity(records.len());
        for record in &records {
            if record.kind() != kind {
                return Err(StoreError::KindMismatch {
                    id: record.id().clone(),
                    expected: kind,
                    actual: record.kind(),
                });
            }
            let id = record.id();
            if let Some(existing) = self.tables.kinds.get(id) {
                return Err(StoreError::UniqueViolation {
                    kind: *existing,
                    id: id.clone(),
                });
            }
            if let Some(&pos) = self.buffer.positions.get(id) {
                return Err(StoreError::UniqueViolation {
                    kind: self.buffer.inserted[pos].kind(),
                    id: id.clone(),
                });
            }
            if !batch_ids.insert(id.clone()) {
                return Err(StoreError::UniqueViolation {
                    kind,
                    id: id.clone(),
                });
            }
        }
        for record in records {
            self.buffer
                .positions
                .insert(record.id().clone(), self.buffer.inserted.len());
            self.buffer.inserted.push(record);
        }
        Ok(())
    }

    fn clear_resolved_marker(&mut self, kind: EntityKind, id: &Id) -> Result<bool, StoreError> {
        if let Some(&pos) = self.buffer.positions.get(id) {
            let record = &mut self.buffer.inserted[pos];
            if record.kind() != kind {
                return Err(StoreError::KindMismatch {
                    id: id.clone(),
                    expected: kind,
                    actual: record.kind(),
                });
            }
            return Ok(record.clear_resolved_marker());
        }
        let had_marker = self
            .tables
            .get(kind, id)?
            .and_then(Record::resolved_marker)
            .is_some()
            && !self.buffer.cleared.contains(id);
        if had_marker {
            self.buffer.cleared.insert(id.clone());
        }
        Ok(had_marker)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            store,
            mut tables,
            buffer,
        } = *self;

        if store.take_injected_conflict() {
            return Err(StoreError::Conflict(
                "injected commit conflict".to_string(),
            ));
        }

        // Apply to a copy first so a failure cannot leave a half-applied state.
        let mut next = tables.clone();
        for record in buffer.inserted {
            next.put(record)?;
        }
        for id in &buffer.cleared {
            if let Some(kind) = next.kinds.get(id).copied() {
                if let Some(record) = next.records.get_mut(&kind).and_then(|t| t.get_mut(id)) {
                    record.clear_resolved_marker();
                }
            }
        }
        for (base, value) in buffer.counters {
            next.counters.insert(base, value);
        }
        *tables = next;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Dropping the buffer discards every staged change.
        Ok(())
    }
}
