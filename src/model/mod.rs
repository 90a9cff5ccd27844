//! The reference model: entity kinds, their records, and the table of
//! reference fields every other component walks.

pub mod embedded;
pub mod entity;
pub mod id;
pub mod id_map;
pub mod reference;
pub mod source_ref;

pub use entity::*;
pub use id::Id;
pub use id_map::IdMap;
pub use reference::{RefShape, RefValue, ReferenceField, Slot, SlotMut};
pub use source_ref::{SourceKind, SourceRef};
