//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the fukusei crate.
//! Import this module to get access to the core functionality without having to import
//! each type individually.
//!
//! # Example
//!
//! ```rust,no_run
//! use fukusei::prelude::*;
//!
//! # fn run_example() -> Result<()> {
//! let store = MemoryStore::from_snapshot(StoreSnapshot::from_binary_file("form.bin")?)?;
//! let result = Duplicator::new(&store).duplicate(&Id::from("N"), DuplicationMode::Node)?;
//! assert!(result.warnings.is_empty());
//! # Ok(())
//! # }
//! ```

// Duplication and verification
pub use crate::audit::{AuditFormatter, AuditReport, Auditor, ReferenceIntegrityWarning};
pub use crate::closure::{Closure, ClosureResolver, DuplicationMode, KindCounts};
pub use crate::config::DuplicationOptions;
pub use crate::duplicator::{DuplicationRequest, DuplicationResult, Duplicator};

// Identities and lineage
pub use crate::lineage::{Suffix, derive, strip_one_level};
pub use crate::model::{EntityKind, Id, Record, ReferenceField, SourceKind, SourceRef};

// Storage
pub use crate::store::{MemoryStore, RecordReader, RecordStore, StoreSnapshot, Transaction};

// Error types
pub use crate::error::{DuplicationError, SnapshotError, StoreError};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
