use super::embedded;
use super::entity::{EntityKind, Record};
use super::id::Id;
use super::id_map::IdMap;
use super::source_ref::SourceRef;
use itertools::Itertools;
use serde::Serialize;
use std::fmt;

/// How a field points at other records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefShape {
    /// A single (possibly absent) identity.
    Direct,
    /// An ordered list of identities.
    IdArray,
    /// A `"<kind>:<id>"` tag, see [`SourceRef`].
    CompoundTag,
    /// Identities embedded in expression text, see [`embedded`].
    Embedded,
}

/// Borrowed view of one reference field.
#[derive(Debug, Clone, Copy)]
pub enum Slot<'a> {
    Id(&'a Id),
    OptId(&'a Option<Id>),
    Ids(&'a Vec<Id>),
    Tag(&'a Option<SourceRef>),
    Tokens(&'a Vec<String>),
    Text(&'a String),
}

/// Mutable view of one reference field.
#[derive(Debug)]
pub enum SlotMut<'a> {
    Id(&'a mut Id),
    OptId(&'a mut Option<Id>),
    Ids(&'a mut Vec<Id>),
    Tag(&'a mut Option<SourceRef>),
    Tokens(&'a mut Vec<String>),
    Text(&'a mut String),
}

/// Owned copy of a reference field's value, used for comparisons and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    Id(Id),
    OptId(Option<Id>),
    Ids(Vec<Id>),
    Tag(Option<SourceRef>),
    Tokens(Vec<String>),
    Text(String),
}

macro_rules! slot_shape {
    (Id) => {
        RefShape::Direct
    };
    (OptId) => {
        RefShape::Direct
    };
    (Ids) => {
        RefShape::IdArray
    };
    (Tag) => {
        RefShape::CompoundTag
    };
    (Tokens) => {
        RefShape::Embedded
    };
    (Text) => {
        RefShape::Embedded
    };
}

/// Declares every reference field of every entity kind.
///
/// Each row names the field variant, the record variant and struct field it
/// lives in, its slot type and its wire name. Everything that walks
/// references (rewriter, auditor) goes through the table generated here.
macro_rules! define_reference_fields {
    ( $( ($variant:ident, $record:ident . $field:ident, $slot:ident, $wire:literal) ),* $(,)? ) => {
        /// One reference-carrying field of one entity kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum ReferenceField {
            $( $variant, )*
        }

        impl ReferenceField {
            pub const ALL: &'static [ReferenceField] = &[ $( ReferenceField::$variant, )* ];

            /// The entity kind this field belongs to.
            pub fn kind(self) -> EntityKind {
                match self {
                    $( ReferenceField::$variant => EntityKind::$record, )*
                }
            }

            pub fn shape(self) -> RefShape {
                match self {
                    $( ReferenceField::$variant => slot_shape!($slot), )*
                }
            }

            /// The field's name as it appears in stored records.
            pub fn name(self) -> &'static str {
                match self {
                    $( ReferenceField::$variant => $wire, )*
                }
            }
        }

        impl Record {
            /// Borrows `field` from this record, or `None` if the field belongs to another kind.
            pub fn slot(&self, field: ReferenceField) -> Option<Slot<'_>> {
                match field {
                    $(
                        ReferenceField::$variant => match self {
                            Record::$record(r) => Some(Slot::$slot(&r.$field)),
                            _ => None,
                        },
                    )*
                }
            }

            pub fn slot_mut(&mut self, field: ReferenceField) -> Option<SlotMut<'_>> {
                match field {
                    $(
                        ReferenceField::$variant => match self {
                            Record::$record(r) => Some(SlotMut::$slot(&mut r.$field)),
                            _ => None,
                        },
                    )*
                }
            }
        }
    };
}

define_reference_fields! {
    (NodeParent, Node.parent_id, OptId, "parentId"),
    (NodeLinkedFormulas, Node.linked_formula_ids, Ids, "linkedFormulaIds"),
    (NodeLinkedConditions, Node.linked_condition_ids, Ids, "linkedConditionIds"),
    (NodeLinkedTables, Node.linked_table_ids, Ids, "linkedTableIds"),
    (NodeLinkedVariables, Node.linked_variable_ids, Ids, "linkedVariableIds"),
    (NodeActiveTable, Node.active_table_id, OptId, "activeTableId"),
    (NodeSharedReferences, Node.shared_reference_ids, Ids, "sharedReferenceIds"),

    (VariableOwner, Variable.owner_node_id, Id, "ownerNodeId"),
    (VariableSource, Variable.source_ref, Tag, "sourceRef"),

    (FormulaOwner, Formula.owner_node_id, Id, "ownerNodeId"),
    (FormulaLinkedVariables, Formula.linked_variable_ids, Ids, "linkedVariableIds"),
    (FormulaTokens, Formula.tokens, Tokens, "tokens"),

    (ConditionOwner, Condition.owner_node_id, Id, "ownerNodeId"),
    (ConditionLinkedVariables, Condition.linked_variable_ids, Ids, "linkedVariableIds"),
    (ConditionSet, Condition.condition_set, Text, "conditionSet"),

    (DataTableOwner, DataTable.owner_node_id, Id, "ownerNodeId"),

    (SelectOwner, SelectBinding.owner_node_id, Id, "ownerNodeId"),
    (SelectTableReference, SelectBinding.table_reference, OptId, "tableReference"),

    (NumberOwner, NumberBinding.owner_node_id, Id, "ownerNodeId"),
}

impl EntityKind {
    /// Reference fields declared for this kind, in declaration order.
    pub fn reference_fields(self) -> impl Iterator<Item = ReferenceField> {
        ReferenceField::ALL
            .iter()
            .copied()
            .filter(move |field| field.kind() == self)
    }
}

impl fmt::Display for ReferenceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind(), self.name())
    }
}

fn remap_tag(tag: &SourceRef, map: &IdMap) -> Option<SourceRef> {
    map.get(tag.target().as_str())
        .map(|mapped| tag.retarget(mapped.clone()))
}

fn remap_text(text: &str, map: &IdMap) -> Option<String> {
    embedded::rewrite(text, |id| map.get(id).map(Id::as_str))
}

impl Slot<'_> {
    pub fn shape(&self) -> RefShape {
        match self {
            Slot::Id(_) | Slot::OptId(_) => RefShape::Direct,
            Slot::Ids(_) => RefShape::IdArray,
            Slot::Tag(_) => RefShape::CompoundTag,
            Slot::Tokens(_) | Slot::Text(_) => RefShape::Embedded,
        }
    }

    pub fn to_value(&self) -> RefValue {
        match *self {
            Slot::Id(id) => RefValue::Id(id.clone()),
            Slot::OptId(id) => RefValue::OptId(id.clone()),
            Slot::Ids(ids) => RefValue::Ids(ids.clone()),
            Slot::Tag(tag) => RefValue::Tag(tag.clone()),
            Slot::Tokens(tokens) => RefValue::Tokens(tokens.clone()),
            Slot::Text(text) => RefValue::Text(text.clone()),
        }
    }
}

impl SlotMut<'_> {
    /// Applies the rewrite rule of this field's shape in place.
    ///
    /// Returns the number of individual references that were redirected.
    pub fn remap_in_place(self, map: &IdMap) -> usize {
        match self {
            SlotMut::Id(id) => match map.get(id.as_str()) {
                Some(mapped) => {
                    *id = mapped.clone();
                    1
                }
                None => 0,
            },
            SlotMut::OptId(slot) => match slot.as_ref().and_then(|id| map.get(id.as_str())) {
                Some(mapped) => {
                    *slot = Some(mapped.clone());
                    1
                }
                None => 0,
            },
            SlotMut::Ids(ids) => {
                let mut changed = 0;
                for id in ids.iter_mut() {
                    if let Some(mapped) = map.get(id.as_str()) {
                        *id = mapped.clone();
                        changed += 1;
                    }
                }
                changed
            }
            SlotMut::Tag(slot) => match slot.as_ref().and_then(|tag| remap_tag(tag, map)) {
                Some(tag) => {
                    *slot = Some(tag);
                    1
                }
                None => 0,
            },
            SlotMut::Tokens(tokens) => {
                let mut changed = 0;
                for token in tokens.iter_mut() {
                    if let Some(rewritten) = remap_text(token, map) {
                        *token = rewritten;
                        changed += 1;
                    }
                }
                changed
            }
            SlotMut::Text(text) => match remap_text(text, map) {
                Some(rewritten) => {
                    *text = rewritten;
                    1
                }
                None => 0,
            },
        }
    }
}

impl RefValue {
    /// The value this field must hold in a clone, given the duplication's id map.
    pub fn remap(&self, map: &IdMap) -> RefValue {
        match self {
            RefValue::Id(id) => RefValue::Id(map.remap(id)),
            RefValue::OptId(id) => RefValue::OptId(id.as_ref().map(|id| map.remap(id))),
            RefValue::Ids(ids) => RefValue::Ids(ids.iter().map(|id| map.remap(id)).collect()),
            RefValue::Tag(tag) => RefValue::Tag(
                tag.as_ref()
                    .map(|tag| remap_tag(tag, map).unwrap_or_else(|| tag.clone())),
            ),
            RefValue::Tokens(tokens) => RefValue::Tokens(
                tokens
                    .iter()
                    .map(|token| remap_text(token, map).unwrap_or_else(|| token.clone()))
                    .collect(),
            ),
            RefValue::Text(text) => {
                RefValue::Text(remap_text(text, map).unwrap_or_else(|| text.clone()))
            }
        }
    }
}

impl fmt::Display for RefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefValue::Id(id) => write!(f, "{}", id),
            RefValue::OptId(Some(id)) => write!(f, "{}", id),
            RefValue::OptId(None) | RefValue::Tag(None) => f.write_str("null"),
            RefValue::Ids(ids) => write!(f, "[{}]", ids.iter().join(", ")),
            RefValue::Tag(Some(tag)) => write!(f, "{}", tag),
            RefValue::Tokens(tokens) => write!(f, "[{}]", tokens.iter().join(" ")),
            RefValue::Text(text) => f.write_str(text),
        }
    }
}
