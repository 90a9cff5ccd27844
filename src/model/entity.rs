use super::id::Id;
use super::source_ref::SourceRef;
use crate::lineage::Suffix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every kind of record that takes part in a duplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Node,
    Variable,
    Formula,
    Condition,
    DataTable,
    SelectBinding,
    NumberBinding,
}

impl EntityKind {
    /// All kinds, in commit order: nodes first so that owners exist before
    /// anything that points at them.
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Node,
        EntityKind::Variable,
        EntityKind::Formula,
        EntityKind::Condition,
        EntityKind::DataTable,
        EntityKind::SelectBinding,
        EntityKind::NumberBinding,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Variable => "variable",
            EntityKind::Formula => "formula",
            EntityKind::Condition => "condition",
            EntityKind::DataTable => "dataTable",
            EntityKind::SelectBinding => "selectBinding",
            EntityKind::NumberBinding => "numberBinding",
        }
    }

    /// Whether records of this kind carry a "last resolved" cache marker.
    pub fn has_resolved_marker(self) -> bool {
        matches!(
            self,
            EntityKind::Variable | EntityKind::Formula | EntityKind::Condition | EntityKind::DataTable
        )
    }

    /// Descriptor kinds owned by a node, i.e. everything except `Node` itself.
    pub fn descriptors() -> impl Iterator<Item = EntityKind> {
        Self::ALL.into_iter().filter(|k| *k != EntityKind::Node)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque marker left by the lazy evaluator after it computed a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMarker {
    pub resolved_at: u64,
    pub value: Option<String>,
}

/// A field of the form tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: Id,
    #[serde(default)]
    pub parent_id: Option<Id>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub has_formula: bool,
    #[serde(default)]
    pub has_condition: bool,
    #[serde(default)]
    pub has_table: bool,
    #[serde(default)]
    pub has_data: bool,
    #[serde(default)]
    pub linked_formula_ids: Vec<Id>,
    #[serde(default)]
    pub linked_condition_ids: Vec<Id>,
    #[serde(default)]
    pub linked_table_ids: Vec<Id>,
    #[serde(default)]
    pub linked_variable_ids: Vec<Id>,
    #[serde(default)]
    pub active_table_id: Option<Id>,
    /// Shared nodes this field reuses. A copy drops them unless asked to keep them.
    #[serde(default)]
    pub shared_reference_ids: Vec<Id>,
    /// Set on clones: the node this one was copied from.
    #[serde(default)]
    pub copied_from_node_id: Option<Id>,
    /// Set on clones: the suffix the copy was made with.
    #[serde(default)]
    pub copy_suffix: Option<Suffix>,
}

impl Node {
    /// The original and suffix this node was copied with, if it is a clone.
    pub fn provenance(&self) -> Option<(&Id, &Suffix)> {
        self.copied_from_node_id.as_ref().zip(self.copy_suffix.as_ref())
    }
}

/// A named value binding owned by one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub id: Id,
    pub owner_node_id: Id,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub precision: Option<u8>,
    #[serde(default)]
    pub source_ref: Option<SourceRef>,
    #[serde(default)]
    pub last_resolved: Option<ResolvedMarker>,
}

/// An arithmetic expression attached to a node, stored as its token list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Formula {
    pub id: Id,
    pub owner_node_id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub linked_variable_ids: Vec<Id>,
    #[serde(default)]
    pub last_resolved: Option<ResolvedMarker>,
}

/// A condition tree attached to a node, stored as raw serialized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: Id,
    pub owner_node_id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub condition_set: String,
    #[serde(default)]
    pub linked_variable_ids: Vec<Id>,
    #[serde(default)]
    pub last_resolved: Option<ResolvedMarker>,
}

/// A lookup table attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTable {
    pub id: Id,
    pub owner_node_id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub last_resolved: Option<ResolvedMarker>,
}

/// Select-field configuration, at most one per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectBinding {
    pub id: Id,
    pub owner_node_id: Id,
    #[serde(default)]
    pub table_reference: Option<Id>,
    #[serde(default)]
    pub key_column: Option<String>,
    #[serde(default)]
    pub display_column: Option<String>,
    #[serde(default)]
    pub multiple: bool,
}

/// Numeric-format configuration, at most one per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberBinding {
    pub id: Id,
    pub owner_node_id: Id,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// One stored record of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Record {
    Node(Node),
    Variable(Variable),
    Formula(Formula),
    Condition(Condition),
    DataTable(DataTable),
    SelectBinding(SelectBinding),
    NumberBinding(NumberBinding),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Node(_) => EntityKind::Node,
            Record::Variable(_) => EntityKind::Variable,
            Record::Formula(_) => EntityKind::Formula,
            Record::Condition(_) => EntityKind::Condition,
            Record::DataTable(_) => EntityKind::DataTable,
            Record::SelectBinding(_) => EntityKind::SelectBinding,
            Record::NumberBinding(_) => EntityKind::NumberBinding,
        }
    }

    pub fn id(&self) -> &Id {
        match self {
            Record::Node(r) => &r.id,
            Record::Variable(r) => &r.id,
            Record::Formula(r) => &r.id,
            Record::Condition(r) => &r.id,
            Record::DataTable(r) => &r.id,
            Record::SelectBinding(r) => &r.id,
            Record::NumberBinding(r) => &r.id,
        }
    }

    pub fn set_id(&mut self, id: Id) {
        match self {
            Record::Node(r) => r.id = id,
            Record::Variable(r) => r.id = id,
            Record::Formula(r) => r.id = id,
            Record::Condition(r) => r.id = id,
            Record::DataTable(r) => r.id = id,
            Record::SelectBinding(r) => r.id = id,
            Record::NumberBinding(r) => r.id = id,
        }
    }

    /// The node owning this record; `None` for nodes themselves.
    pub fn owner(&self) -> Option<&Id> {
        match self {
            Record::Node(_) => None,
            Record::Variable(r) => Some(&r.owner_node_id),
            Record::Formula(r) => Some(&r.owner_node_id),
            Record::Condition(r) => Some(&r.owner_node_id),
            Record::DataTable(r) => Some(&r.owner_node_id),
            Record::SelectBinding(r) => Some(&r.owner_node_id),
            Record::NumberBinding(r) => Some(&r.owner_node_id),
        }
    }

    pub fn resolved_marker(&self) -> Option<&ResolvedMarker> {
        match self {
            Record::Variable(r) => r.last_resolved.as_ref(),
            Record::Formula(r) => r.last_resolved.as_ref(),
            Record::Condition(r) => r.last_resolved.as_ref(),
            Record::DataTable(r) => r.last_resolved.as_ref(),
            Record::Node(_) | Record::SelectBinding(_) | Record::NumberBinding(_) => None,
        }
    }

    /// Clears the "last resolved" marker. Returns whether a marker was present.
    pub fn clear_resolved_marker(&mut self) -> bool {
        let marker = match self {
            Record::Variable(r) => &mut r.last_resolved,
            Record::Formula(r) => &mut r.last_resolved,
            Record::Condition(r) => &mut r.last_resolved,
            Record::DataTable(r) => &mut r.last_resolved,
            Record::Node(_) | Record::SelectBinding(_) | Record::NumberBinding(_) => return false,
        };
        marker.take().is_some()
    }

    /// Appends `-<suffix>` to the human-readable name of nodes and variables.
    pub fn suffix_display_name(&mut self, suffix: &str) {
        match self {
            Record::Node(r) if !r.label.is_empty() => r.label = format!("{}-{}", r.label, suffix),
            Record::Variable(r) if !r.display_name.is_empty() => {
                r.display_name = format!("{}-{}", r.display_name, suffix)
            }
            _ => {}
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Record::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut Node> {
        match self {
            Record::Node(node) => Some(node),
            _ => None,
        }
    }
}

macro_rules! impl_into_record {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Record {
                fn from(value: $variant) -> Self {
                    Record::$variant(value)
                }
            }
        )*
    };
}

impl_into_record!(
    Node,
    Variable,
    Formula,
    Condition,
    DataTable,
    SelectBinding,
    NumberBinding
);
