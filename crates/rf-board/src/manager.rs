//! MutationManager: per-spin mutation state
//!
//! Holds the spin batch and one batch per reevaluation, answers typed
//! queries, and guarantees that a mutation reaches the grid at most once
//! per spin.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::batch::{BatchOrigin, MutationBatch, MutationEntry, MutationId};
use crate::error::{BoardError, BoardResult};
use crate::grid::{Grid, MutateOptions, SymbolChange};
use crate::mutation::{self, MutationKind};

/// Mutation state of the current spin
#[derive(Debug, Clone, Default)]
pub struct MutationManager {
    spin: Option<MutationBatch>,
    reevaluations: BTreeMap<u32, MutationBatch>,
    applied: HashSet<MutationId>,
    parse_errors: Vec<BoardError>,
}

impl MutationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all batches and apply marks (start of a spin)
    pub fn reset(&mut self) {
        self.spin = None;
        self.reevaluations.clear();
        self.applied.clear();
        self.parse_errors.clear();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INGEST
    // ═══════════════════════════════════════════════════════════════════════════

    /// Parse and store the raw batch for `origin`, replacing any previous one
    ///
    /// Returns the per-element errors; the valid mutations are kept.
    pub fn ingest(&mut self, origin: BatchOrigin, raw: &Value) -> BoardResult<Vec<BoardError>> {
        let report = mutation::parse(raw, origin)?;
        self.parse_errors.extend(report.errors.iter().cloned());
        self.set_batch(report.batch);
        Ok(report.errors)
    }

    /// Store an already-typed batch under its origin
    pub fn set_batch(&mut self, batch: MutationBatch) {
        let origin = batch.origin();
        self.applied.retain(|id| id.origin != origin);
        match origin {
            BatchOrigin::Spin => self.spin = Some(batch),
            BatchOrigin::Reevaluation(index) => {
                self.reevaluations.insert(index, batch);
            }
        }
    }

    /// Parse errors collected since the last reset
    pub fn parse_errors(&self) -> &[BoardError] {
        &self.parse_errors
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERY
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn batch(&self, origin: BatchOrigin) -> Option<&MutationBatch> {
        match origin {
            BatchOrigin::Spin => self.spin.as_ref(),
            BatchOrigin::Reevaluation(index) => self.reevaluations.get(&index),
        }
    }

    pub fn spin_batch(&self) -> Option<&MutationBatch> {
        self.spin.as_ref()
    }

    pub fn reevaluation_batch(&self, index: u32) -> Option<&MutationBatch> {
        self.reevaluations.get(&index)
    }

    pub fn get(&self, id: MutationId) -> Option<&MutationEntry> {
        self.batch(id.origin)?.get(id)
    }

    /// Mutations of one kind in the batch for `origin` (owned copies)
    pub fn query(&self, origin: BatchOrigin, kind: MutationKind) -> Vec<MutationEntry> {
        self.batch(origin)
            .map(|batch| batch.query(kind).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Like [`query`](Self::query) but only mutations not yet applied
    pub fn pending(&self, origin: BatchOrigin, kind: MutationKind) -> Vec<MutationEntry> {
        self.query(origin, kind)
            .into_iter()
            .filter(|entry| !self.applied.contains(&entry.id))
            .collect()
    }

    pub fn is_applied(&self, id: MutationId) -> bool {
        self.applied.contains(&id)
    }

    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // APPLY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Reserve a mutation for application
    ///
    /// For staged presentation that writes cells over several steps: claim
    /// first, then write. A second claim in the same spin fails.
    pub fn claim(&mut self, id: MutationId) -> BoardResult<&MutationEntry> {
        if self.get(id).is_none() {
            return Err(BoardError::UnknownMutation(id));
        }
        if !self.applied.insert(id) {
            return Err(BoardError::AlreadyApplied(id));
        }
        self.get(id).ok_or(BoardError::UnknownMutation(id))
    }

    /// Release a claim whose apply could not start (target missing)
    pub fn release(&mut self, id: MutationId) {
        self.applied.remove(&id);
    }

    /// Apply a mutation to the grid exactly once this spin
    ///
    /// A missing target leaves the mutation unapplied and unmarked.
    pub fn apply(&mut self, grid: &mut Grid, id: MutationId, opts: MutateOptions) -> BoardResult<Vec<SymbolChange>> {
        let entry = self.claim(id)?.clone();
        match mutation::apply(grid, &entry.mutation, opts) {
            Ok(changes) => {
                log::debug!("Applied mutation {} ({})", id, entry.mutation.type_name());
                Ok(changes)
            }
            Err(err) => {
                self.release(id);
                Err(err)
            }
        }
    }
}
