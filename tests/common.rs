//! Common test utilities for building form trees inside a `MemoryStore`.
#![allow(dead_code)]
use fukusei::model::{Condition, DataTable, Formula, Node, NumberBinding, ResolvedMarker, SelectBinding, Variable};
use fukusei::prelude::*;
use std::result::Result;

pub fn id(raw: &str) -> Id {
    Id::from(raw)
}

pub fn ids(raw: &[&str]) -> Vec<Id> {
    raw.iter().map(|s| Id::from(*s)).collect()
}

pub fn marker() -> Option<ResolvedMarker> {
    Some(ResolvedMarker {
        resolved_at: 1_700_000_000,
        value: Some("42".to_string()),
    })
}

pub fn node(raw_id: &str, parent: Option<&str>, order: i32) -> Node {
    Node {
        id: id(raw_id),
        parent_id: parent.map(id),
        order,
        label: format!("Label {}", raw_id),
        field_type: Some("text".to_string()),
        has_formula: false,
        has_condition: false,
        has_table: false,
        has_data: false,
        linked_formula_ids: Vec::new(),
        linked_condition_ids: Vec::new(),
        linked_table_ids: Vec::new(),
        linked_variable_ids: Vec::new(),
        active_table_id: None,
        shared_reference_ids: Vec::new(),
        copied_from_node_id: None,
        copy_suffix: None,
    }
}

pub fn variable(raw_id: &str, owner: &str, source: Option<&str>) -> Variable {
    Variable {
        id: id(raw_id),
        owner_node_id: id(owner),
        display_name: format!("Var {}", raw_id),
        unit: Some("mm".to_string()),
        precision: Some(2),
        source_ref: source.map(SourceRef::from),
        last_resolved: marker(),
    }
}

pub fn formula(raw_id: &str, owner: &str, linked: &[&str], tokens: &[&str]) -> Formula {
    Formula {
        id: id(raw_id),
        owner_node_id: id(owner),
        name: format!("Formula {}", raw_id),
        tokens: tokens.iter().map(|t| t.to_string()).collect(),
        linked_variable_ids: ids(linked),
        last_resolved: marker(),
    }
}

pub fn condition(raw_id: &str, owner: &str, linked: &[&str], set: &str) -> Condition {
    Condition {
        id: id(raw_id),
        owner_node_id: id(owner),
        name: format!("Condition {}", raw_id),
        condition_set: set.to_string(),
        linked_variable_ids: ids(linked),
        last_resolved: marker(),
    }
}

pub fn table(raw_id: &str, owner: &str) -> DataTable {
    DataTable {
        id: id(raw_id),
        owner_node_id: id(owner),
        name: format!("Table {}", raw_id),
        columns: vec!["key".to_string(), "label".to_string()],
        rows: vec![
            vec!["a".to_string(), "Alpha".to_string()],
            vec!["b".to_string(), "Beta".to_string()],
        ],
        last_resolved: marker(),
    }
}

pub fn select(raw_id: &str, owner: &str, table_ref: Option<&str>) -> SelectBinding {
    SelectBinding {
        id: id(raw_id),
        owner_node_id: id(owner),
        table_reference: table_ref.map(id),
        key_column: Some("key".to_string()),
        display_column: Some("label".to_string()),
        multiple: false,
    }
}

pub fn number(raw_id: &str, owner: &str) -> NumberBinding {
    NumberBinding {
        id: id(raw_id),
        owner_node_id: id(owner),
        min: Some(0.0),
        max: Some(100.0),
        step: Some(0.5),
        decimals: Some(1),
        unit: Some("kg".to_string()),
    }
}

pub fn seed(store: &MemoryStore, records: Vec<Record>) {
    for record in records {
        store.insert(record).expect("Failed to seed record");
    }
}

/// The reference scenario:
///
/// - `N` owns `V` (`sourceRef = "formula:F"`), `F` (`linkedVariableIds = [V]`)
///   and `S` (`tableReference = "T"`).
/// - `T` is a shared lookup table owned by `L`, a node outside `N`'s subtree.
pub fn scenario_store() -> MemoryStore {
    let store = MemoryStore::new();
    let mut n = node("N", None, 0);
    n.has_formula = true;
    n.linked_formula_ids = ids(&["F"]);
    n.linked_variable_ids = ids(&["V"]);
    seed(
        &store,
        vec![
            n.into(),
            node("L", None, 1).into(),
            variable("V", "N", Some("formula:F")).into(),
            formula("F", "N", &["V"], &["@value.V", "*", "2"]).into(),
            select("S", "N", Some("T")).into(),
            table("T", "L").into(),
        ],
    );
    store
}

/// A three-level section:
///
/// ```text
/// X (number NB, condition C on V1 and V2)
/// ├── A (variable V1 fixed, table TA active)
/// │   └── A1 (variable V3 -> table:TA, select SA -> TA)
/// └── B (variable V2 -> formula:FB, formula FB on V1 and V2)
/// ```
///
/// `G` is a global node with shared table `TG`, referenced from `B`. `B` also
/// lists `G` among its shared references.
pub fn section_store() -> MemoryStore {
    let store = MemoryStore::new();

    let mut x = node("X", None, 0);
    x.has_condition = true;
    x.linked_condition_ids = ids(&["C"]);

    let mut a = node("A", Some("X"), 0);
    a.has_table = true;
    a.linked_table_ids = ids(&["TA", "TG"]);
    a.active_table_id = Some(id("TA"));
    a.linked_variable_ids = ids(&["V1"]);

    let mut b = node("B", Some("X"), 1);
    b.has_formula = true;
    b.linked_formula_ids = ids(&["FB"]);
    b.linked_variable_ids = ids(&["V2", "V1"]);
    b.active_table_id = Some(id("TG"));
    b.shared_reference_ids = ids(&["G"]);

    seed(
        &store,
        vec![
            x.into(),
            a.into(),
            b.into(),
            node("A1", Some("A"), 0).into(),
            node("G", None, 5).into(),
            number("NB", "X").into(),
            condition(
                "C",
                "X",
                &["V1", "V2"],
                r#"{"when":"@value.V1 > 3","then":"@value.V2","else":"@value.VG"}"#,
            )
            .into(),
            variable("V1", "A", Some("A")).into(),
            table("TA", "A").into(),
            variable("V3", "A1", Some("table:TA")).into(),
            select("SA", "A1", Some("TA")).into(),
            variable("V2", "B", Some("formula:FB")).into(),
            formula("FB", "B", &["V1", "V2"], &["@value.V1", "+", "@value.V2", "+", "@table.TG"])
                .into(),
            table("TG", "G").into(),
            variable("VG", "G", Some("fixed:VG")).into(),
        ],
    );
    store
}

pub fn record(store: &MemoryStore, kind: EntityKind, raw_id: &str) -> Record {
    store
        .get(kind, &id(raw_id))
        .expect("Store read failed")
        .unwrap_or_else(|| panic!("{} '{}' is missing", kind, raw_id))
}

pub fn get_variable(store: &MemoryStore, raw_id: &str) -> Variable {
    match record(store, EntityKind::Variable, raw_id) {
        Record::Variable(v) => v,
        other => panic!("expected a variable, got {:?}", other),
    }
}

pub fn get_formula(store: &MemoryStore, raw_id: &str) -> Formula {
    match record(store, EntityKind::Formula, raw_id) {
        Record::Formula(f) => f,
        other => panic!("expected a formula, got {:?}", other),
    }
}

pub fn get_condition(store: &MemoryStore, raw_id: &str) -> Condition {
    match record(store, EntityKind::Condition, raw_id) {
        Record::Condition(c) => c,
        other => panic!("expected a condition, got {:?}", other),
    }
}

pub fn get_node(store: &MemoryStore, raw_id: &str) -> Node {
    match record(store, EntityKind::Node, raw_id) {
        Record::Node(n) => n,
        other => panic!("expected a node, got {:?}", other),
    }
}

pub fn get_select(store: &MemoryStore, raw_id: &str) -> SelectBinding {
    match record(store, EntityKind::SelectBinding, raw_id) {
        Record::SelectBinding(s) => s,
        other => panic!("expected a select binding, got {:?}", other),
    }
}

pub fn get_table(store: &MemoryStore, raw_id: &str) -> DataTable {
    match record(store, EntityKind::DataTable, raw_id) {
        Record::DataTable(t) => t,
        other => panic!("expected a data table, got {:?}", other),
    }
}

/// Wraps a `MemoryStore` and injects failures the in-memory adapter never produces.
pub struct FaultyStore {
    pub inner: MemoryStore,
    /// Transactions report this identity as missing.
    pub hidden: Option<Id>,
    /// Transactions reject every insert of this kind as already taken.
    pub rejected: Option<EntityKind>,
}

impl FaultyStore {
    pub fn hiding(inner: MemoryStore, raw_id: &str) -> Self {
        Self {
            inner,
            hidden: Some(id(raw_id)),
            rejected: None,
        }
    }

    pub fn rejecting(inner: MemoryStore, kind: EntityKind) -> Self {
        Self {
            inner,
            hidden: None,
            rejected: Some(kind),
        }
    }
}

impl RecordStore for FaultyStore {
    fn begin_transaction(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        Ok(Box::new(FaultyTransaction {
            inner: self.inner.begin_transaction()?,
            hidden: self.hidden.as_ref(),
            rejected: self.rejected,
        }))
    }

    fn reader(&self) -> Result<Box<dyn RecordReader + '_>, StoreError> {
        self.inner.reader()
    }
}

struct FaultyTransaction<'a> {
    inner: Box<dyn Transaction + 'a>,
    hidden: Option<&'a Id>,
    rejected: Option<EntityKind>,
}

impl RecordReader for FaultyTransaction<'_> {
    fn fetch_by_id(&self, kind: EntityKind, id: &Id) -> Result<Option<Record>, StoreError> {
        if self.hidden == Some(id) {
            return Ok(None);
        }
        self.inner.fetch_by_id(kind, id)
    }

    fn exists(&self, id: &Id) -> Result<bool, StoreError> {
        self.inner.exists(id)
    }

    fn children_of(&self, parent: &Id) -> Result<Vec<Id>, StoreError> {
        self.inner.children_of(parent)
    }

    fn owned_by(&self, kind: EntityKind, node: &Id) -> Result<Vec<Id>, StoreError> {
        self.inner.owned_by(kind, node)
    }
}

impl Transaction for FaultyTransaction<'_> {
    fn as_reader(&self) -> &dyn RecordReader {
        self
    }

    fn allocate_suffix_segment(&mut self, base: &Id) -> Result<u32, StoreError> {
        self.inner.allocate_suffix_segment(base)
    }

    fn insert_batch(&mut self, kind: EntityKind, records: Vec<Record>) -> Result<(), StoreError> {
        if self.rejected == Some(kind) {
            if let Some(first) = records.first() {
                return Err(StoreError::UniqueViolation {
                    kind,
                    id: first.id().clone(),
                });
            }
        }
        self.inner.insert_batch(kind, records)
    }

    fn clear_resolved_marker(&mut self, kind: EntityKind, id: &Id) -> Result<bool, StoreError> {
        self.inner.clear_resolved_marker(kind, id)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback()
    }
}
