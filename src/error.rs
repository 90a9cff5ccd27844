use crate::model::{EntityKind, Id};
use std::fmt;
use thiserror::Error;

/// The stage of a duplication at which it aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Closure,
    Cloning,
    Commit,
    Audit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Closure => "closure",
            Stage::Cloning => "cloning",
            Stage::Commit => "commit",
            Stage::Audit => "audit",
        };
        f.write_str(name)
    }
}

/// Errors that abort a duplication. Every one of them leaves storage untouched.
#[derive(Error, Debug, Clone)]
pub enum DuplicationError {
    #[error("Duplication root '{0}' does not exist")]
    RootNotFound(Id),

    #[error("Closure member {kind} '{id}' is inconsistent during {stage}: {reason}")]
    ClosureIntegrity {
        stage: Stage,
        kind: EntityKind,
        id: Id,
        reason: String,
    },

    #[error("Derived identity '{id}' for a {kind} clone already exists")]
    IdentityCollision { kind: EntityKind, id: Id },

    #[error("Cannot attach the copy under '{parent}': {reason}")]
    InvalidTargetParent { parent: Id, reason: String },

    #[error("Store failure during {stage}: {source}")]
    Transaction {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error("Invalid duplication suffix: {0}")]
    Lineage(#[from] LineageError),
}

impl DuplicationError {
    pub(crate) fn integrity(
        stage: Stage,
        kind: EntityKind,
        id: &Id,
        reason: impl Into<String>,
    ) -> Self {
        Self::ClosureIntegrity {
            stage,
            kind,
            id: id.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn store(stage: Stage) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Transaction { stage, source }
    }

    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::RootNotFound(_) | Self::InvalidTargetParent { .. } | Self::Lineage(_) => {
                Stage::Closure
            }
            Self::IdentityCollision { .. } => Stage::Commit,
            Self::ClosureIntegrity { stage, .. } | Self::Transaction { stage, .. } => *stage,
        }
    }

    /// Whether retrying the whole duplication once may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transaction { source, .. } if source.is_transient())
    }
}

/// Errors reported by a record-store adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Identity '{id}' is already taken by a stored {kind}")]
    UniqueViolation { kind: EntityKind, id: Id },

    #[error("Record '{id}' is a {actual}, not a {expected}")]
    KindMismatch {
        id: Id,
        expected: EntityKind,
        actual: EntityKind,
    },

    #[error("Duplication counter for '{0}' is exhausted")]
    CounterExhausted(Id),

    #[error("Store lock poisoned by a panicking writer")]
    Poisoned,

    #[error("Store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Errors raised while parsing a duplication suffix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineageError {
    #[error("a suffix needs at least one segment")]
    Empty,

    #[error("suffix segments must be positive")]
    ZeroSegment,

    #[error("'{0}' is not a valid suffix segment")]
    InvalidSegment(String),

    #[error("'{0}' carries no duplication suffix")]
    NotDerived(Id),
}

/// Errors raised while loading or saving a store snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Could not access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary snapshot encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Binary snapshot decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Snapshot contains identity '{0}' more than once")]
    DuplicateIdentity(Id),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}
