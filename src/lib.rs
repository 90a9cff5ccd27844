//! # Fukusei - Structural Duplication Engine
//!
//! **Fukusei** duplicates a node, or a whole node subtree, of a form tree
//! together with every computation descriptor the nodes own: variables,
//! formulas, conditions, data tables, select bindings and number bindings.
//! The copy is referentially self-consistent. Every reference between cloned
//! records points at the new copies, while references to records outside the
//! duplicated scope (shared lookup tables, for instance) are left untouched.
//!
//! ## Core Workflow
//!
//! 1.  **Back it with a store**: implement [`store::RecordStore`] for your
//!     persistence layer, or use the bundled [`store::MemoryStore`].
//! 2.  **Duplicate**: build a [`Duplicator`](duplicator::Duplicator) and call
//!     `duplicate(root, mode)`. The closure is resolved, every member is
//!     cloned under a derived identity (`id-<suffix>`), every reference field
//!     is rewritten, and everything commits in one transaction.
//! 3.  **Verify**: the [`Auditor`](audit::Auditor) re-derives what the clone
//!     must look like from the originals and reports every mismatch. It runs
//!     after each commit by default.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fukusei::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let store = MemoryStore::from_snapshot(StoreSnapshot::from_json_file("form.json")?)?;
//!
//!     let duplicator = Duplicator::builder(&store).suffix_labels(true).build();
//!     let result = duplicator.duplicate(&Id::from("section"), DuplicationMode::Subtree)?;
//!     println!("{}", AuditFormatter::format_result(&result));
//!
//!     // Duplicating the copy extends its lineage: section-1 -> section-1-2.
//!     let nested = duplicator.duplicate(&result.root, DuplicationMode::Subtree)?;
//!     let report = Auditor::new(&store).audit_lineage(&nested.root, DuplicationMode::Subtree)?;
//!     assert!(report.is_clean());
//!
//!     store.snapshot()?.save_json("form-duplicated.json")?;
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod closure;
pub mod config;
pub mod duplicator;
pub mod error;
pub mod lineage;
pub mod model;
pub mod prelude;
pub mod store;
