use super::id::Id;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind half of a `"<kind>:<id>"` variable source tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Formula,
    Condition,
    Table,
    Select,
    Field,
    Fixed,
    /// Any other prefix, kept with its exact spelling (e.g. `node-formula`).
    Other(String),
}

impl SourceKind {
    pub fn parse(prefix: &str) -> Self {
        match prefix {
            "formula" => Self::Formula,
            "condition" => Self::Condition,
            "table" => Self::Table,
            "select" => Self::Select,
            "field" => Self::Field,
            "fixed" => Self::Fixed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Formula => "formula",
            Self::Condition => "condition",
            Self::Table => "table",
            Self::Select => "select",
            Self::Field => "field",
            Self::Fixed => "fixed",
            Self::Other(prefix) => prefix,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A variable's `sourceRef`, parsed once when the record is loaded.
///
/// The textual form is split on the first `:`. A value without any `:` is a
/// legacy primitive source and is carried as [`SourceRef::Bare`]; it refers to
/// the owning node directly. Parsing is lossless: `SourceRef::parse(s).to_string() == s`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceRef {
    Tagged { kind: SourceKind, id: Id },
    Bare(Id),
}

impl SourceRef {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((kind, id)) => Self::Tagged {
                kind: SourceKind::parse(kind),
                id: Id::from(id),
            },
            None => Self::Bare(Id::from(raw)),
        }
    }

    pub fn tagged(kind: SourceKind, id: impl Into<Id>) -> Self {
        Self::Tagged {
            kind,
            id: id.into(),
        }
    }

    /// The identity this tag points at.
    pub fn target(&self) -> &Id {
        match self {
            Self::Tagged { id, .. } => id,
            Self::Bare(id) => id,
        }
    }

    /// Returns the same tag pointing at `target`, keeping the kind untouched.
    pub fn retarget(&self, target: Id) -> Self {
        match self {
            Self::Tagged { kind, .. } => Self::Tagged {
                kind: kind.clone(),
                id: target,
            },
            Self::Bare(_) => Self::Bare(target),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tagged { kind, id } => write!(f, "{}:{}", kind, id),
            Self::Bare(id) => write!(f, "{}", id),
        }
    }
}

impl From<String> for SourceRef {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<SourceRef> for String {
    fn from(value: SourceRef) -> Self {
        value.to_string()
    }
}

impl From<&str> for SourceRef {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}
