use super::cloning::StagedClones;
use crate::error::{DuplicationError, Stage, StoreError};
use crate::model::{EntityKind, Id};
use crate::store::Transaction;

/// What a successful commit wrote.
#[derive(Debug, Clone, Default)]
pub(super) struct CommitOutcome {
    pub inserted: usize,
    pub markers_cleared: usize,
}

fn insert_error(error: StoreError) -> DuplicationError {
    match error {
        StoreError::UniqueViolation { kind, id } => DuplicationError::IdentityCollision { kind, id },
        other => DuplicationError::Transaction {
            stage: Stage::Commit,
            source: other,
        },
    }
}

/// Writes staged clones atomically, then clears their resolved markers.
///
/// On any failure the transaction is rolled back before the error is returned.
pub(super) fn commit_clones(
    mut tx: Box<dyn Transaction + '_>,
    staged: StagedClones,
) -> Result<CommitOutcome, DuplicationError> {
    let mut outcome = CommitOutcome::default();
    let mut marked: Vec<(EntityKind, Id)> = Vec::new();

    for (kind, batch) in staged.into_batches() {
        if kind.has_resolved_marker() {
            marked.extend(batch.iter().map(|record| (kind, record.id().clone())));
        }
        let count = batch.len();
        if let Err(error) = tx.insert_batch(kind, batch) {
            rollback(tx);
            return Err(insert_error(error));
        }
        outcome.inserted += count;
    }

    for (kind, id) in &marked {
        match tx.clear_resolved_marker(*kind, id) {
            Ok(true) => outcome.markers_cleared += 1,
            Ok(false) => {}
            Err(error) => {
                rollback(tx);
                return Err(DuplicationError::store(Stage::Commit)(error));
            }
        }
    }

    tx.commit().map_err(DuplicationError::store(Stage::Commit))?;
    Ok(outcome)
}

/// Rolls back after a failure. The original error is what the caller sees.
pub(super) fn rollback(tx: Box<dyn Transaction + '_>) {
    if let Err(error) = tx.rollback() {
        tracing::warn!(%error, "Rollback after failed duplication reported an error");
    }
}
