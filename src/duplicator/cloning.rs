use crate::closure::Closure;
use crate::config::DuplicationOptions;
use crate::error::{DuplicationError, Stage};
use crate::lineage::{Suffix, derive};
use crate::model::{EntityKind, Id, IdMap, Node, Record};
use crate::store::RecordReader;

/// A clone waiting to be committed, with the identity it was copied from.
#[derive(Debug, Clone)]
pub struct StagedClone {
    pub original: Id,
    pub record: Record,
}

/// Every clone of one duplication, in commit order.
#[derive(Debug, Clone, Default)]
pub struct StagedClones {
    clones: Vec<StagedClone>,
}

impl StagedClones {
    pub fn len(&self) -> usize {
        self.clones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clones.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StagedClone> {
        self.clones.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StagedClone> {
        self.clones.iter_mut()
    }

    /// The staged clone of the node `original`.
    pub(super) fn node_mut(&mut self, original: &Id) -> Option<&mut Node> {
        self.clones
            .iter_mut()
            .find(|staged| &staged.original == original)
            .and_then(|staged| staged.record.as_node_mut())
    }

    /// The flat `original -> clone` map covering every staged clone.
    pub fn id_map(&self) -> IdMap {
        self.clones
            .iter()
            .map(|staged| (staged.original.clone(), staged.record.id().clone()))
            .collect()
    }

    /// Consumes the staging area, grouping records by kind in commit order.
    pub fn into_batches(self) -> Vec<(EntityKind, Vec<Record>)> {
        let mut batches: Vec<(EntityKind, Vec<Record>)> =
            EntityKind::ALL.iter().map(|kind| (*kind, Vec::new())).collect();
        for staged in self.clones {
            let kind = staged.record.kind();
            if let Some((_, batch)) = batches.iter_mut().find(|(k, _)| *k == kind) {
                batch.push(staged.record);
            }
        }
        batches.retain(|(_, batch)| !batch.is_empty());
        batches
    }
}

/// Copies every closure member under its derived identity.
///
/// Reference fields are copied verbatim here; the rewriter redirects them once
/// every clone is staged. Cloned nodes are stamped with the node and suffix they
/// were copied with, and lose their shared references unless told to keep them.
pub(super) struct CloningEngine<'a> {
    reader: &'a dyn RecordReader,
    suffix: &'a Suffix,
    suffix_labels: bool,
    preserve_shared_references: bool,
}

impl<'a> CloningEngine<'a> {
    pub(super) fn new(
        reader: &'a dyn RecordReader,
        suffix: &'a Suffix,
        options: &DuplicationOptions,
    ) -> Self {
        Self {
            reader,
            suffix,
            suffix_labels: options.suffix_labels,
            preserve_shared_references: options.preserve_shared_references,
        }
    }

    pub(super) fn stage(&self, closure: &Closure) -> Result<StagedClones, DuplicationError> {
        let suffix_text = self.suffix.to_string();
        let mut clones = Vec::with_capacity(closure.len());
        for (kind, id) in closure.members() {
            let mut record = self
                .reader
                .fetch_by_id(kind, id)
                .map_err(DuplicationError::store(Stage::Cloning))?
                .ok_or_else(|| {
                    DuplicationError::integrity(
                        Stage::Cloning,
                        kind,
                        id,
                        "closure member could not be fetched",
                    )
                })?;

            record.set_id(derive(id, self.suffix));
            if self.suffix_labels {
                record.suffix_display_name(&suffix_text);
            }
            if let Some(node) = record.as_node_mut() {
                node.copied_from_node_id = Some(id.clone());
                node.copy_suffix = Some(self.suffix.clone());
                if !self.preserve_shared_references {
                    node.shared_reference_ids.clear();
                }
            }
            clones.push(StagedClone {
                original: id.clone(),
                record,
            });
        }

        tracing::debug!(staged = clones.len(), suffix = %self.suffix, "Staged clones");
        Ok(StagedClones { clones })
    }
}
