use super::id::Id;
use ahash::AHashMap;

/// Flat translation table `original id -> clone id` for one duplication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap {
    entries: AHashMap<Id, Id>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mapping. Returns the previous target if `original` was already mapped.
    pub fn insert(&mut self, original: Id, clone: Id) -> Option<Id> {
        self.entries.insert(original, clone)
    }

    pub fn get(&self, original: &str) -> Option<&Id> {
        self.entries.get(original)
    }

    pub fn contains(&self, original: &str) -> bool {
        self.entries.contains_key(original)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Id, &Id)> {
        self.entries.iter()
    }

    /// Maps one direct reference: mapped when inside the closure, untouched otherwise.
    pub fn remap(&self, id: &Id) -> Id {
        self.get(id.as_str()).cloned().unwrap_or_else(|| id.clone())
    }
}

impl FromIterator<(Id, Id)> for IdMap {
    fn from_iter<T: IntoIterator<Item = (Id, Id)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
