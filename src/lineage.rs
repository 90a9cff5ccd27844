//! Derived identities and duplication lineage.
//!
//! A clone's identity is its original's identity followed by `-<suffix>`,
//! where the suffix is one or more positive integers joined by `-`.
//! Duplicating a clone again appends one more segment, so `X-1` becomes
//! `X-1-2`. Cloned nodes record the node and suffix they were copied with,
//! and the chain is followed through that record rather than the id text.

use crate::error::{LineageError, StoreError};
use crate::model::{EntityKind, Id, Record};
use crate::store::RecordReader;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The lineage suffix applied by one duplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Suffix(Vec<u32>);

impl Suffix {
    pub fn new(segments: Vec<u32>) -> Result<Self, LineageError> {
        if segments.is_empty() {
            return Err(LineageError::Empty);
        }
        if segments.contains(&0) {
            return Err(LineageError::ZeroSegment);
        }
        Ok(Self(segments))
    }

    /// A one-segment suffix. `segment` must be positive.
    pub fn single(segment: u32) -> Result<Self, LineageError> {
        Self::new(vec![segment])
    }

    pub fn segments(&self) -> &[u32] {
        &self.0
    }
}

impl fmt::Display for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join("-"))
    }
}

impl FromStr for Suffix {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(LineageError::Empty);
        }
        let segments = trimmed
            .split('-')
            .map(|part| {
                part.bytes()
                    .all(|b| b.is_ascii_digit())
                    .then(|| part.parse::<u32>().ok())
                    .flatten()
                    .ok_or_else(|| LineageError::InvalidSegment(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(segments)
    }
}

impl TryFrom<String> for Suffix {
    type Error = LineageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Suffix> for String {
    fn from(value: Suffix) -> Self {
        value.to_string()
    }
}

/// `derive(id, suffix) = id + "-" + suffix`.
pub fn derive(original: &Id, suffix: &Suffix) -> Id {
    Id::from(format!("{}-{}", original, suffix))
}

/// Splits the trailing `-<integer>` off `id`.
///
/// Returns the immediate ancestor's identity and the removed segment, or
/// `None` when `id` carries no numeric suffix.
pub fn strip_one_level(id: &Id) -> Option<(Id, u32)> {
    let (head, tail) = id.as_str().rsplit_once('-')?;
    if head.is_empty() || tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let segment = tail.parse::<u32>().ok().filter(|n| *n > 0)?;
    Some((Id::from(head), segment))
}

/// The identity whose duplication counter a copy of `root` draws from.
///
/// Walks the provenance recorded on cloned nodes back to the first node that
/// is not itself a clone, so `X`, `X-1` and `X-1-2` share one counter while an
/// original whose id merely ends in digits keeps its own.
pub fn lineage_base(reader: &dyn RecordReader, root: &Id) -> Result<Id, StoreError> {
    let mut current = root.clone();
    loop {
        let Some(Record::Node(node)) = reader.fetch_by_id(EntityKind::Node, &current)? else {
            return Ok(current);
        };
        match node.provenance() {
            // Every step shortens the id, so the walk ends.
            Some((source, suffix)) if derive(source, suffix) == current => {
                current = source.clone();
            }
            _ => return Ok(current),
        }
    }
}
