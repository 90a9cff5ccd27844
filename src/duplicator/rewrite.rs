use super::cloning::StagedClones;
use crate::model::{IdMap, Record};

/// Redirects every reference field of staged clones through the id map.
///
/// References to records inside the closure are replaced by their clone's
/// identity; anything else passes through untouched.
pub struct ReferenceRewriter<'m> {
    id_map: &'m IdMap,
}

impl<'m> ReferenceRewriter<'m> {
    pub fn new(id_map: &'m IdMap) -> Self {
        Self { id_map }
    }

    /// Rewrites one record in place. Returns the number of redirected references.
    pub fn rewrite(&self, record: &mut Record) -> usize {
        let kind = record.kind();
        kind.reference_fields()
            .filter_map(|field| record.slot_mut(field).map(|slot| slot.remap_in_place(self.id_map)))
            .sum()
    }

    /// Rewrites every staged clone. Must only run once all clones are staged.
    pub fn rewrite_all(&self, staged: &mut StagedClones) -> usize {
        let redirected = staged
            .iter_mut()
            .map(|clone| self.rewrite(&mut clone.record))
            .sum();
        tracing::debug!(
            clones = staged.len(),
            redirected,
            "Rewrote clone references"
        );
        redirected
    }
}
