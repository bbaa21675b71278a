//! MutationBatch: the mutations attached to one spin or reevaluation outcome

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mutation::{Mutation, MutationKind};

/// Which outcome a batch came with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOrigin {
    Spin,
    Reevaluation(u32),
}

impl fmt::Display for BatchOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spin => write!(f, "spin"),
            Self::Reevaluation(index) => write!(f, "reevaluation {index}"),
        }
    }
}

/// Stable identity of a mutation within a spin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MutationId {
    pub origin: BatchOrigin,
    /// Position in the wire array
    pub index: usize,
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.origin, self.index)
    }
}

/// A mutation with its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEntry {
    pub id: MutationId,
    pub mutation: Mutation,
}

impl MutationEntry {
    pub fn kind(&self) -> MutationKind {
        self.mutation.kind()
    }
}

/// Ordered collection of mutations for one outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationBatch {
    origin: BatchOrigin,
    entries: Vec<MutationEntry>,
}

impl MutationBatch {
    pub fn new(origin: BatchOrigin) -> Self {
        Self {
            origin,
            entries: Vec::new(),
        }
    }

    /// Batch from already-typed mutations, ids in iteration order
    pub fn from_mutations(origin: BatchOrigin, mutations: impl IntoIterator<Item = Mutation>) -> Self {
        let mut batch = Self::new(origin);
        for mutation in mutations {
            batch.push(mutation);
        }
        batch
    }

    pub fn origin(&self) -> BatchOrigin {
        self.origin
    }

    /// Append with the next index
    pub fn push(&mut self, mutation: Mutation) -> MutationId {
        let index = self.entries.last().map_or(0, |entry| entry.id.index + 1);
        self.push_at(index, mutation);
        MutationId {
            origin: self.origin,
            index,
        }
    }

    /// Append keeping the wire index (skipped elements leave gaps)
    pub(crate) fn push_at(&mut self, index: usize, mutation: Mutation) {
        self.entries.push(MutationEntry {
            id: MutationId {
                origin: self.origin,
                index,
            },
            mutation,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in batch order
    pub fn entries(&self) -> &[MutationEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &MutationEntry> {
        self.entries.iter()
    }

    pub fn get(&self, id: MutationId) -> Option<&MutationEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// All mutations of one kind, in batch order
    pub fn query(&self, kind: MutationKind) -> Vec<&MutationEntry> {
        self.entries.iter().filter(|entry| entry.kind() == kind).collect()
    }

    pub fn contains_kind(&self, kind: MutationKind) -> bool {
        self.entries.iter().any(|entry| entry.kind() == kind)
    }
}
