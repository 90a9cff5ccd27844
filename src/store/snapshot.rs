use crate::error::SnapshotError;
use crate::model::{
    Condition, DataTable, Formula, Id, Node, NumberBinding, Record, SelectBinding, Variable,
};
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

/// The full contents of a record store, grouped by kind.
///
/// This is the on-disk exchange format used by the CLI and the data
/// generator. JSON field names match the records' camelCase wire names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub formulas: Vec<Formula>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub tables: Vec<DataTable>,
    #[serde(default)]
    pub select_bindings: Vec<SelectBinding>,
    #[serde(default)]
    pub number_bindings: Vec<NumberBinding>,
    /// Duplication counters per base identity.
    #[serde(default)]
    pub counters: BTreeMap<Id, u32>,
}

impl StoreSnapshot {
    pub fn push(&mut self, record: Record) {
        match record {
            Record::Node(r) => self.nodes.push(r),
            Record::Variable(r) => self.variables.push(r),
            Record::Formula(r) => self.formulas.push(r),
            Record::Condition(r) => self.conditions.push(r),
            Record::DataTable(r) => self.tables.push(r),
            Record::SelectBinding(r) => self.select_bindings.push(r),
            Record::NumberBinding(r) => self.number_bindings.push(r),
        }
    }

    pub fn into_records(self) -> impl Iterator<Item = Record> {
        let Self {
            nodes,
            variables,
            formulas,
            conditions,
            tables,
            select_bindings,
            number_bindings,
            counters: _,
        } = self;
        nodes
            .into_iter()
            .map(Record::from)
            .chain(variables.into_iter().map(Record::from))
            .chain(formulas.into_iter().map(Record::from))
            .chain(conditions.into_iter().map(Record::from))
            .chain(tables.into_iter().map(Record::from))
            .chain(select_bindings.into_iter().map(Record::from))
            .chain(number_bindings.into_iter().map(Record::from))
    }

    pub fn record_count(&self) -> usize {
        self.nodes.len()
            + self.variables.len()
            + self.formulas.len()
            + self.conditions.len()
            + self.tables.len()
            + self.select_bindings.len()
            + self.number_bindings.len()
    }

    /// Loads a snapshot from a JSON file.
    pub fn from_json_file(path: &str) -> Result<Self, SnapshotError> {
        let content = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes the snapshot as pretty-printed JSON.
    pub fn save_json(&self, path: &str) -> Result<(), SnapshotError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| SnapshotError::Io {
            path: path.to_string(),
            source,
        })
    }

    /// Writes the snapshot using the compact bincode format.
    pub fn save_binary(&self, path: &str) -> Result<(), SnapshotError> {
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).map_err(|source| SnapshotError::Io {
            path: path.to_string(),
            source,
        })
    }

    /// Loads a snapshot written by [`StoreSnapshot::save_binary`].
    pub fn from_binary_file(path: &str) -> Result<Self, SnapshotError> {
        let bytes = fs::read(path).map_err(|source| SnapshotError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(encode_to_vec(self, standard())?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        decode_from_slice(bytes, standard())
            .map(|(snapshot, _)| snapshot) // bincode 2 returns (value, bytes_read)
            .map_err(SnapshotError::from)
    }
}
