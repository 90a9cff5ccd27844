//! Read-only verification of a finished duplication.
//!
//! The auditor never looks at what the duplicator staged. It recomputes the
//! closure of the original root, derives every expected clone identity, and
//! checks each clone's reference fields against the rewrite rule applied to
//! the original's fields. Two fields are exceptions: shared references are
//! expected empty unless they were preserved, and the cloned root's parent is
//! expected to be the node it was placed under, when it was placed.

pub mod report;

pub use report::AuditFormatter;

use crate::closure::{ClosureResolver, DuplicationMode};
use crate::error::{DuplicationError, LineageError, Stage, StoreError};
use crate::lineage::{Suffix, derive, strip_one_level};
use crate::model::{EntityKind, Id, IdMap, RefValue, Record, ReferenceField};
use crate::store::{RecordReader, RecordStore};
use serde::Serialize;
use std::fmt;

/// Which part of a clone a warning is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AuditField {
    /// The clone record itself is missing or has the wrong kind.
    Record,
    Reference(ReferenceField),
    /// The copied-from node and suffix stamped on a cloned node.
    Provenance,
}

impl fmt::Display for AuditField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditField::Record => f.write_str("<record>"),
            AuditField::Reference(field) => f.write_str(field.name()),
            AuditField::Provenance => f.write_str("<provenance>"),
        }
    }
}

/// One reference that does not match the rewrite rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceIntegrityWarning {
    pub kind: EntityKind,
    pub original_id: Id,
    pub field: AuditField,
    pub expected: String,
    pub actual: String,
}

/// Outcome of one audit. An empty warning list means the clone is correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub root: Id,
    pub suffix: Suffix,
    pub mode: DuplicationMode,
    pub checked_objects: usize,
    pub checked_fields: usize,
    pub warnings: Vec<ReferenceIntegrityWarning>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

pub struct Auditor<'s> {
    store: &'s dyn RecordStore,
    preserve_shared_references: bool,
}

impl<'s> Auditor<'s> {
    pub fn new(store: &'s dyn RecordStore) -> Self {
        Self {
            store,
            preserve_shared_references: false,
        }
    }

    /// Expect cloned nodes to keep their shared references.
    pub fn preserve_shared_references(mut self, enabled: bool) -> Self {
        self.preserve_shared_references = enabled;
        self
    }

    /// Audits the clone of `root` produced with `suffix`.
    pub fn audit(
        &self,
        root: &Id,
        mode: DuplicationMode,
        suffix: &Suffix,
    ) -> Result<AuditReport, DuplicationError> {
        self.audit_with(root, mode, suffix, None)
    }

    /// Audits a clone whose root was attached under `parent`.
    pub fn audit_placed(
        &self,
        root: &Id,
        mode: DuplicationMode,
        suffix: &Suffix,
        parent: &Id,
    ) -> Result<AuditReport, DuplicationError> {
        self.audit_with(root, mode, suffix, Some(parent))
    }

    fn audit_with(
        &self,
        root: &Id,
        mode: DuplicationMode,
        suffix: &Suffix,
        placement: Option<&Id>,
    ) -> Result<AuditReport, DuplicationError> {
        let reader = self
            .store
            .reader()
            .map_err(DuplicationError::store(Stage::Audit))?;
        let closure = ClosureResolver::new(reader.as_ref()).resolve(root, mode)?;
        let id_map: IdMap = closure
            .members()
            .map(|(_, id)| (id.clone(), derive(id, suffix)))
            .collect();

        let mut report = AuditReport {
            root: root.clone(),
            suffix: suffix.clone(),
            mode,
            checked_objects: 0,
            checked_fields: 0,
            warnings: Vec::new(),
        };

        for (kind, id) in closure.members() {
            let original = reader
                .fetch_by_id(kind, id)
                .map_err(DuplicationError::store(Stage::Audit))?
                .ok_or_else(|| {
                    DuplicationError::integrity(
                        Stage::Audit,
                        kind,
                        id,
                        "closure member could not be fetched",
                    )
                })?;
            let clone_id = id_map.remap(id);
            let clone = match fetch_clone(reader.as_ref(), kind, &clone_id)? {
                Ok(clone) => clone,
                Err(actual) => {
                    report.warnings.push(ReferenceIntegrityWarning {
                        kind,
                        original_id: id.clone(),
                        field: AuditField::Record,
                        expected: clone_id.to_string(),
                        actual,
                    });
                    continue;
                }
            };

            report.checked_objects += 1;
            if let Some(node) = clone.as_node() {
                let expected = format!("{} (suffix {})", id, suffix);
                let actual = match node.provenance() {
                    Some((source, used)) => format!("{} (suffix {})", source, used),
                    None => "none".to_string(),
                };
                if expected != actual {
                    report.warnings.push(ReferenceIntegrityWarning {
                        kind,
                        original_id: id.clone(),
                        field: AuditField::Provenance,
                        expected,
                        actual,
                    });
                }
            }

            let placement = placement.filter(|_| id == root);
            for field in kind.reference_fields() {
                let (Some(before), Some(after)) = (original.slot(field), clone.slot(field)) else {
                    continue;
                };
                report.checked_fields += 1;
                let expected = self.expected_value(field, before.to_value(), &id_map, placement);
                let actual = after.to_value();
                if expected != actual {
                    report.warnings.push(ReferenceIntegrityWarning {
                        kind,
                        original_id: id.clone(),
                        field: AuditField::Reference(field),
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    });
                }
            }
        }

        for warning in &report.warnings {
            tracing::warn!(
                kind = %warning.kind,
                original = %warning.original_id,
                field = %warning.field,
                expected = %warning.expected,
                actual = %warning.actual,
                "Clone reference does not match its original"
            );
        }
        tracing::debug!(
            root = %root,
            suffix = %suffix,
            objects = report.checked_objects,
            fields = report.checked_fields,
            warnings = report.warnings.len(),
            "Audit finished"
        );
        Ok(report)
    }

    /// What a clone's field should hold, given the original's value.
    fn expected_value(
        &self,
        field: ReferenceField,
        original: RefValue,
        id_map: &IdMap,
        placement: Option<&Id>,
    ) -> RefValue {
        match (field, placement) {
            (ReferenceField::NodeParent, Some(parent)) => RefValue::OptId(Some(parent.clone())),
            (ReferenceField::NodeSharedReferences, _) if !self.preserve_shared_references => {
                RefValue::Ids(Vec::new())
            }
            _ => original.remap(id_map),
        }
    }

    /// Audits a clone given only its root identity, e.g. `X-1-2`.
    ///
    /// The original root (`X-1`) and suffix (`2`) come from the provenance
    /// stamped on the clone, or from stripping one suffix level when it carries
    /// none. The root is expected under whatever parent it now has.
    pub fn audit_lineage(
        &self,
        clone_root: &Id,
        mode: DuplicationMode,
    ) -> Result<AuditReport, DuplicationError> {
        let clone = {
            let reader = self
                .store
                .reader()
                .map_err(DuplicationError::store(Stage::Audit))?;
            match fetch_clone(reader.as_ref(), EntityKind::Node, clone_root)? {
                Ok(Record::Node(node)) => Some(node),
                _ => None,
            }
        };

        let provenance = clone
            .as_ref()
            .and_then(|node| node.provenance())
            .map(|(source, suffix)| (source.clone(), suffix.clone()));
        let (original, suffix) = match provenance {
            Some(found) => found,
            None => {
                let (original, segment) = strip_one_level(clone_root)
                    .ok_or_else(|| LineageError::NotDerived(clone_root.clone()))?;
                (original, Suffix::single(segment)?)
            }
        };
        let placement = clone.as_ref().and_then(|node| node.parent_id.as_ref());
        self.audit_with(&original, mode, &suffix, placement)
    }
}

/// Fetches an expected clone. The inner `Err` describes why it is unusable.
fn fetch_clone(
    reader: &dyn RecordReader,
    kind: EntityKind,
    id: &Id,
) -> Result<Result<Record, String>, DuplicationError> {
    match reader.fetch_by_id(kind, id) {
        Ok(Some(record)) => Ok(Ok(record)),
        Ok(None) => Ok(Err("missing".to_string())),
        Err(StoreError::KindMismatch { actual, .. }) => Ok(Err(format!("a {}", actual))),
        Err(error) => Err(DuplicationError::Transaction {
            stage: Stage::Audit,
            source: error,
        }),
    }
}
