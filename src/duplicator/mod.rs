//! The `duplicate` entry point.
//!
//! A duplication runs in one store transaction:
//!
//! 1. resolve the closure of the root,
//! 2. allocate a collision-free suffix,
//! 3. stage a clone of every closure member under its derived identity,
//! 4. rewrite every reference field of every clone through the id map,
//!    then attach the cloned root under the requested parent, if any,
//! 5. insert all clones and clear their resolved markers, then commit.
//!
//! Any failure rolls the transaction back, so storage is either fully
//! updated or untouched.

mod cloning;
mod commit;
pub mod rewrite;

pub use cloning::{StagedClone, StagedClones};
pub use rewrite::ReferenceRewriter;

use crate::audit::{Auditor, ReferenceIntegrityWarning};
use crate::closure::{Closure, ClosureResolver, DuplicationMode, KindCounts};
use crate::config::DuplicationOptions;
use crate::error::{DuplicationError, Stage, StoreError};
use crate::lineage::{Suffix, derive, lineage_base};
use crate::model::{EntityKind, Id};
use crate::store::{RecordStore, Transaction};
use cloning::CloningEngine;
use commit::{commit_clones, rollback};
use serde::Serialize;

/// One duplication to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicationRequest {
    pub root: Id,
    pub mode: DuplicationMode,
    /// Use this suffix instead of allocating the next free one.
    pub suffix: Option<Suffix>,
    /// Attach the cloned root under this node instead of the original's parent.
    pub target_parent: Option<Id>,
}

impl DuplicationRequest {
    pub fn new(root: impl Into<Id>, mode: DuplicationMode) -> Self {
        Self {
            root: root.into(),
            mode,
            suffix: None,
            target_parent: None,
        }
    }

    pub fn with_suffix(mut self, suffix: Suffix) -> Self {
        self.suffix = Some(suffix);
        self
    }

    pub fn under(mut self, parent: impl Into<Id>) -> Self {
        self.target_parent = Some(parent.into());
        self
    }
}

/// What a successful duplication produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicationResult {
    pub original_root: Id,
    /// Identity of the cloned root node.
    pub root: Id,
    pub suffix: Suffix,
    pub mode: DuplicationMode,
    /// Parent of the cloned root.
    pub parent: Option<Id>,
    /// Number of clones per kind. Always equals the closure size per kind.
    pub counts: KindCounts,
    pub references_rewritten: usize,
    pub markers_cleared: usize,
    /// Mismatches found by the post-commit audit. Empty when the audit is off.
    pub warnings: Vec<ReferenceIntegrityWarning>,
}

impl DuplicationResult {
    pub fn cloned(&self) -> usize {
        self.counts.total()
    }
}

/// Everything staged before the commit step.
struct Prepared {
    closure: Closure,
    suffix: Suffix,
    staged: StagedClones,
    rewritten: usize,
    parent: Option<Id>,
}

/// Duplicates nodes and everything they own inside a [`RecordStore`].
pub struct Duplicator<'s> {
    store: &'s dyn RecordStore,
    options: DuplicationOptions,
}

impl<'s> Duplicator<'s> {
    pub fn new(store: &'s dyn RecordStore) -> Self {
        Self {
            store,
            options: DuplicationOptions::default(),
        }
    }

    pub fn builder(store: &'s dyn RecordStore) -> DuplicatorBuilder<'s> {
        DuplicatorBuilder::new(store)
    }

    pub fn options(&self) -> &DuplicationOptions {
        &self.options
    }

    /// Duplicates `root` under the next free suffix of its lineage.
    pub fn duplicate(
        &self,
        root: &Id,
        mode: DuplicationMode,
    ) -> Result<DuplicationResult, DuplicationError> {
        self.execute(&DuplicationRequest::new(root.clone(), mode))
    }

    /// Duplicates `root` under a caller-chosen suffix.
    ///
    /// Fails with [`DuplicationError::IdentityCollision`] if any derived
    /// identity is already taken.
    pub fn duplicate_with_suffix(
        &self,
        root: &Id,
        mode: DuplicationMode,
        suffix: &Suffix,
    ) -> Result<DuplicationResult, DuplicationError> {
        self.execute(&DuplicationRequest::new(root.clone(), mode).with_suffix(suffix.clone()))
    }

    /// Runs one duplication, retrying once on a transient store conflict.
    pub fn execute(
        &self,
        request: &DuplicationRequest,
    ) -> Result<DuplicationResult, DuplicationError> {
        match self.run(request) {
            Err(error) if error.is_transient() && self.options.retry_transient => {
                tracing::warn!(root = %request.root, %error, "Transient store conflict, retrying duplication once");
                self.run(request)
            }
            other => other,
        }
    }

    fn run(&self, request: &DuplicationRequest) -> Result<DuplicationResult, DuplicationError> {
        let root = &request.root;
        let mut tx = self
            .store
            .begin_transaction()
            .map_err(DuplicationError::store(Stage::Closure))?;

        let prepared = match self.prepare(tx.as_mut(), request) {
            Ok(prepared) => prepared,
            Err(error) => {
                rollback(tx);
                return Err(error);
            }
        };

        let Prepared {
            closure,
            suffix,
            staged,
            rewritten,
            parent,
        } = prepared;
        let outcome = commit_clones(tx, staged)?;

        let counts = closure.counts();
        tracing::info!(
            root = %root,
            clone = %derive(root, &suffix),
            suffix = %suffix,
            parent = ?parent,
            nodes = counts.nodes,
            variables = counts.variables,
            formulas = counts.formulas,
            conditions = counts.conditions,
            tables = counts.tables,
            select_bindings = counts.select_bindings,
            number_bindings = counts.number_bindings,
            inserted = outcome.inserted,
            "Duplication committed"
        );

        let warnings = if self.options.verify_after_commit {
            self.verify(request, &suffix)
        } else {
            Vec::new()
        };

        Ok(DuplicationResult {
            original_root: root.clone(),
            root: derive(root, &suffix),
            suffix,
            mode: request.mode,
            parent,
            counts,
            references_rewritten: rewritten,
            markers_cleared: outcome.markers_cleared,
            warnings,
        })
    }

    /// Closure, suffix, cloning and rewrite. Nothing is written yet.
    fn prepare(
        &self,
        tx: &mut dyn Transaction,
        request: &DuplicationRequest,
    ) -> Result<Prepared, DuplicationError> {
        let root = &request.root;
        let closure = ClosureResolver::new(tx.as_reader()).resolve(root, request.mode)?;
        if let Some(parent) = &request.target_parent {
            check_target_parent(tx, &closure, parent)?;
        }

        let suffix = match &request.suffix {
            Some(suffix) => {
                if let Some((kind, id)) = first_collision(tx, &closure, suffix)? {
                    return Err(DuplicationError::IdentityCollision { kind, id });
                }
                suffix.clone()
            }
            None => allocate_suffix(tx, &closure)?,
        };
        tracing::debug!(root = %root, suffix = %suffix, "Chose duplication suffix");

        let mut staged = CloningEngine::new(tx.as_reader(), &suffix, &self.options).stage(&closure)?;
        if staged.len() != closure.len() {
            return Err(DuplicationError::integrity(
                Stage::Cloning,
                EntityKind::Node,
                root,
                format!(
                    "staged {} clones for a closure of {}",
                    staged.len(),
                    closure.len()
                ),
            ));
        }

        let id_map = staged.id_map();
        let rewritten = ReferenceRewriter::new(&id_map).rewrite_all(&mut staged);

        let clone_root = staged.node_mut(root).ok_or_else(|| {
            DuplicationError::integrity(
                Stage::Cloning,
                EntityKind::Node,
                root,
                "the root was not staged",
            )
        })?;
        if let Some(target) = &request.target_parent {
            clone_root.parent_id = Some(target.clone());
        }
        let parent = clone_root.parent_id.clone();

        Ok(Prepared {
            closure,
            suffix,
            staged,
            rewritten,
            parent,
        })
    }

    fn verify(&self, request: &DuplicationRequest, suffix: &Suffix) -> Vec<ReferenceIntegrityWarning> {
        let root = &request.root;
        let auditor = Auditor::new(self.store)
            .preserve_shared_references(self.options.preserve_shared_references);
        let report = match &request.target_parent {
            Some(parent) => auditor.audit_placed(root, request.mode, suffix, parent),
            None => auditor.audit(root, request.mode, suffix),
        };
        match report {
            Ok(report) => report.warnings,
            Err(error) => {
                tracing::warn!(root = %root, suffix = %suffix, %error, "Post-commit audit could not run");
                Vec::new()
            }
        }
    }
}

/// The first closure member whose derived identity is already stored.
fn first_collision(
    tx: &dyn Transaction,
    closure: &Closure,
    suffix: &Suffix,
) -> Result<Option<(EntityKind, Id)>, DuplicationError> {
    for (kind, id) in closure.members() {
        let derived = derive(id, suffix);
        if tx
            .exists(&derived)
            .map_err(DuplicationError::store(Stage::Closure))?
        {
            return Ok(Some((kind, derived)));
        }
    }
    Ok(None)
}

/// The cloned root may hang under any existing node outside what is being copied.
fn check_target_parent(
    tx: &dyn Transaction,
    closure: &Closure,
    parent: &Id,
) -> Result<(), DuplicationError> {
    let invalid = |reason: &str| DuplicationError::InvalidTargetParent {
        parent: parent.clone(),
        reason: reason.to_string(),
    };
    match tx.fetch_by_id(EntityKind::Node, parent) {
        Ok(Some(_)) => {}
        Ok(None) => return Err(invalid("no such node")),
        Err(StoreError::KindMismatch { actual, .. }) => {
            return Err(invalid(&format!("it is a {}, not a node", actual)));
        }
        Err(source) => return Err(DuplicationError::store(Stage::Closure)(source)),
    }
    if closure.mode() == DuplicationMode::Subtree && closure.contains(parent) {
        return Err(invalid("it belongs to the subtree being copied"));
    }
    Ok(())
}

/// Draws segments from the lineage counter until one derives no taken identity.
///
/// The counter is keyed by the root's lineage base, so `X`, `X-1` and `X-1-2`
/// share it and every duplication of the family gets a fresh final segment.
fn allocate_suffix(tx: &mut dyn Transaction, closure: &Closure) -> Result<Suffix, DuplicationError> {
    let base = lineage_base(tx.as_reader(), closure.root())
        .map_err(DuplicationError::store(Stage::Closure))?;
    loop {
        let segment = tx
            .allocate_suffix_segment(&base)
            .map_err(DuplicationError::store(Stage::Closure))?;
        let suffix = Suffix::single(segment)?;
        match first_collision(tx, closure, &suffix)? {
            None => return Ok(suffix),
            Some((kind, id)) => {
                tracing::debug!(suffix = %suffix, %kind, taken = %id, "Suffix segment already in use, skipping");
            }
        }
    }
}

/// Builder for [`Duplicator`].
pub struct DuplicatorBuilder<'s> {
    store: &'s dyn RecordStore,
    options: DuplicationOptions,
}

impl<'s> DuplicatorBuilder<'s> {
    pub fn new(store: &'s dyn RecordStore) -> Self {
        Self {
            store,
            options: DuplicationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DuplicationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn suffix_labels(mut self, enabled: bool) -> Self {
        self.options.suffix_labels = enabled;
        self
    }

    pub fn verify_after_commit(mut self, enabled: bool) -> Self {
        self.options.verify_after_commit = enabled;
        self
    }

    pub fn retry_transient(mut self, enabled: bool) -> Self {
        self.options.retry_transient = enabled;
        self
    }

    pub fn preserve_shared_references(mut self, enabled: bool) -> Self {
        self.options.preserve_shared_references = enabled;
        self
    }

    pub fn build(self) -> Duplicator<'s> {
        Duplicator {
            store: self.store,
            options: self.options,
        }
    }
}
