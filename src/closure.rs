//! Computes the set of records a duplication has to clone.

use crate::error::{DuplicationError, Stage};
use crate::model::{EntityKind, Id};
use crate::store::RecordReader;
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// What to clone starting from the duplication root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DuplicationMode {
    /// The root node and the descriptors it owns. Its children are not cloned
    /// and keep pointing at the original node.
    Node,
    /// The root node, every descendant, and every descriptor they own.
    #[default]
    Subtree,
}

impl fmt::Display for DuplicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicationMode::Node => f.write_str("node"),
            DuplicationMode::Subtree => f.write_str("subtree"),
        }
    }
}

impl FromStr for DuplicationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(DuplicationMode::Node),
            "subtree" => Ok(DuplicationMode::Subtree),
            other => Err(format!("unknown duplication mode '{}'", other)),
        }
    }
}

/// Number of records per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindCounts {
    pub nodes: usize,
    pub variables: usize,
    pub formulas: usize,
    pub conditions: usize,
    pub tables: usize,
    pub select_bindings: usize,
    pub number_bindings: usize,
}

impl KindCounts {
    pub fn get(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Node => self.nodes,
            EntityKind::Variable => self.variables,
            EntityKind::Formula => self.formulas,
            EntityKind::Condition => self.conditions,
            EntityKind::DataTable => self.tables,
            EntityKind::SelectBinding => self.select_bindings,
            EntityKind::NumberBinding => self.number_bindings,
        }
    }

    fn slot(&mut self, kind: EntityKind) -> &mut usize {
        match kind {
            EntityKind::Node => &mut self.nodes,
            EntityKind::Variable => &mut self.variables,
            EntityKind::Formula => &mut self.formulas,
            EntityKind::Condition => &mut self.conditions,
            EntityKind::DataTable => &mut self.tables,
            EntityKind::SelectBinding => &mut self.select_bindings,
            EntityKind::NumberBinding => &mut self.number_bindings,
        }
    }

    pub fn add(&mut self, kind: EntityKind, count: usize) {
        *self.slot(kind) += count;
    }

    pub fn total(&self) -> usize {
        EntityKind::ALL.iter().map(|kind| self.get(*kind)).sum()
    }
}

/// The identities that must be cloned together, grouped by kind.
///
/// Nodes are kept in breadth-first order from the root, so a parent always
/// precedes its children. Descriptors follow their owner's order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    root: Id,
    mode: DuplicationMode,
    members: AHashMap<EntityKind, Vec<Id>>,
    index: AHashMap<Id, EntityKind>,
}

impl Closure {
    pub fn root(&self) -> &Id {
        &self.root
    }

    pub fn mode(&self) -> DuplicationMode {
        self.mode
    }

    /// Members of one kind, in traversal order.
    pub fn ids(&self, kind: EntityKind) -> &[Id] {
        self.members.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn nodes(&self) -> &[Id] {
        self.ids(EntityKind::Node)
    }

    /// Every member with its kind, nodes first.
    pub fn members(&self) -> impl Iterator<Item = (EntityKind, &Id)> {
        EntityKind::ALL
            .into_iter()
            .flat_map(move |kind| self.ids(kind).iter().map(move |id| (kind, id)))
    }

    pub fn kind_of(&self, id: &Id) -> Option<EntityKind> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn counts(&self) -> KindCounts {
        let mut counts = KindCounts::default();
        for kind in EntityKind::ALL {
            counts.add(kind, self.ids(kind).len());
        }
        counts
    }

    fn push(&mut self, kind: EntityKind, id: Id) -> Result<(), DuplicationError> {
        if let Some(existing) = self.index.get(&id) {
            return Err(DuplicationError::integrity(
                Stage::Closure,
                kind,
                &id,
                format!("identity already collected as a {}", existing),
            ));
        }
        self.index.insert(id.clone(), kind);
        self.members.entry(kind).or_default().push(id);
        Ok(())
    }
}

/// Resolves the closure of a duplication root against a record reader.
pub struct ClosureResolver<'r> {
    reader: &'r dyn RecordReader,
}

impl<'r> ClosureResolver<'r> {
    pub fn new(reader: &'r dyn RecordReader) -> Self {
        Self { reader }
    }

    pub fn resolve(&self, root: &Id, mode: DuplicationMode) -> Result<Closure, DuplicationError> {
        let store_err = DuplicationError::store(Stage::Closure);
        if self
            .reader
            .fetch_by_id(EntityKind::Node, root)
            .map_err(store_err)?
            .is_none()
        {
            return Err(DuplicationError::RootNotFound(root.clone()));
        }

        let mut closure = Closure {
            root: root.clone(),
            mode,
            members: AHashMap::new(),
            index: AHashMap::new(),
        };

        for node in self.collect_nodes(root, mode)? {
            closure.push(EntityKind::Node, node)?;
        }

        let nodes = closure.nodes().to_vec();
        for kind in EntityKind::descriptors() {
            for node in &nodes {
                let owned = self
                    .reader
                    .owned_by(kind, node)
                    .map_err(DuplicationError::store(Stage::Closure))?;
                if owned.len() > 1
                    && matches!(kind, EntityKind::SelectBinding | EntityKind::NumberBinding)
                {
                    return Err(DuplicationError::integrity(
                        Stage::Closure,
                        kind,
                        &owned[1],
                        format!("node '{}' owns more than one {}", node, kind),
                    ));
                }
                for id in owned {
                    closure.push(kind, id)?;
                }
            }
        }

        tracing::debug!(
            root = %root,
            mode = %mode,
            members = closure.len(),
            nodes = closure.nodes().len(),
            "Resolved duplication closure"
        );
        Ok(closure)
    }

    /// Breadth-first walk over parent -> children edges.
    fn collect_nodes(&self, root: &Id, mode: DuplicationMode) -> Result<Vec<Id>, DuplicationError> {
        if mode == DuplicationMode::Node {
            return Ok(vec![root.clone()]);
        }

        let mut visited: AHashSet<Id> = AHashSet::new();
        let mut ordered = Vec::new();
        let mut queue = VecDeque::from([root.clone()]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                return Err(DuplicationError::integrity(
                    Stage::Closure,
                    EntityKind::Node,
                    &current,
                    "node reached twice while walking the subtree (parent cycle)",
                ));
            }
            let children = self
                .reader
                .children_of(&current)
                .map_err(DuplicationError::store(Stage::Closure))?;
            queue.extend(children);
            ordered.push(current);
        }
        Ok(ordered)
    }
}
