//! Applying mutations to a grid
//!
//! Every apply resolves all of its targets before touching the grid, so a
//! mutation either lands completely or not at all.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::batch::{MutationBatch, MutationId};
use crate::error::{BoardError, BoardResult};
use crate::grid::{CellPos, Grid, MutateOptions, SymbolChange, SymbolRef};
use crate::mutation::Mutation;

/// Resolved targets of a grid mutation
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMutation {
    /// Cells to rewrite, in declaration order
    pub targets: Vec<SymbolRef>,
    /// Symbol written to every target
    pub symbol: Option<String>,
    /// Reel to lock
    pub lock_reel: Option<usize>,
}

/// Resolve every cell a mutation touches without changing the grid
///
/// `MeterEvent` and `FreeSpinAward` resolve to nothing. A cell listed twice
/// resolves once, at its first position.
pub fn resolve(grid: &Grid, mutation: &Mutation) -> BoardResult<ResolvedMutation> {
    let mut seen = HashSet::new();
    let targets = mutation
        .target_cells(grid.rows())
        .into_iter()
        .filter(|cell| seen.insert(*cell))
        .map(|cell| grid.resolve(cell))
        .collect::<BoardResult<Vec<_>>>()?;

    let lock_reel = match mutation {
        Mutation::ReelLock { reel, .. } => {
            if *reel >= grid.reels() {
                return Err(BoardError::MissingAnimationTarget {
                    cell: CellPos::new(*reel, 0),
                    reason: format!("reel {} outside {} reels", reel, grid.reels()),
                });
            }
            Some(*reel)
        }
        _ => None,
    };

    if let Mutation::TriggerReveal { trigger, .. } = mutation {
        grid.resolve(*trigger)?;
    }

    Ok(ResolvedMutation {
        targets,
        symbol: mutation.replacement().map(str::to_string),
        lock_reel,
    })
}

/// Apply one mutation in place, atomically
///
/// Not guarded against repeats; [`crate::MutationManager::apply`] is the
/// once-per-spin entry point.
pub fn apply(grid: &mut Grid, mutation: &Mutation, opts: MutateOptions) -> BoardResult<Vec<SymbolChange>> {
    let resolved = resolve(grid, mutation)?;
    commit(grid, &resolved, opts)
}

/// Write already-resolved targets
///
/// Fails only if a reference went stale between resolve and commit; the
/// references are re-checked first so nothing is written in that case.
pub fn commit(grid: &mut Grid, resolved: &ResolvedMutation, opts: MutateOptions) -> BoardResult<Vec<SymbolChange>> {
    for target in &resolved.targets {
        grid.check(target)?;
    }

    if let Some(reel) = resolved.lock_reel {
        grid.lock_reel(reel)?;
    }

    let mut changes = Vec::with_capacity(resolved.targets.len());
    if let Some(symbol) = &resolved.symbol {
        for target in &resolved.targets {
            changes.push(grid.mutate_to(target, symbol, opts)?);
        }
    }
    Ok(changes)
}

/// Pure form of [`apply`]: the grid with the mutation applied
pub fn applied(grid: &Grid, mutation: &Mutation, opts: MutateOptions) -> BoardResult<Grid> {
    let mut next = grid.clone();
    apply(&mut next, mutation, opts)?;
    Ok(next)
}

/// Outcome of [`apply_batch`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub applied: Vec<MutationId>,
    pub skipped: Vec<(MutationId, String)>,
}

/// Apply every grid mutation of a batch in batch order
///
/// A mutation whose target is missing is skipped; the rest still apply.
/// Overlapping mutations resolve last-write-wins.
pub fn apply_batch(grid: &mut Grid, batch: &MutationBatch, opts: MutateOptions) -> ApplyReport {
    let mut report = ApplyReport::default();
    for entry in batch.iter() {
        if !entry.kind().touches_grid() {
            continue;
        }
        match apply(grid, &entry.mutation, opts) {
            Ok(_) => report.applied.push(entry.id),
            Err(err) => {
                log::warn!("Skipping mutation {}: {}", entry.id, err);
                report.skipped.push((entry.id, err.to_string()));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchOrigin;

    fn replace(reel: usize, position: usize, symbol: &str) -> Mutation {
        Mutation::CellReplace {
            reel,
            position,
            layer: 0,
            symbol: symbol.into(),
        }
    }

    #[test]
    fn test_apply_is_atomic() {
        let mut grid = Grid::filled(5, 3, "A").unwrap();
        let bad = Mutation::MultiCellReplace {
            reel: 1,
            positions: vec![0, 1, 7],
            layer: 0,
            symbol: "WD".into(),
        };

        let err = apply(&mut grid, &bad, MutateOptions::animated()).unwrap_err();
        assert!(matches!(err, BoardError::MissingAnimationTarget { .. }));
        assert_eq!(grid.name_at(1, 0), Some("A"));
        assert_eq!(grid.name_at(1, 1), Some("A"));
        assert!(grid.changes().is_empty());
    }

    #[test]
    fn test_repeated_cell_is_written_once() {
        let mut grid = Grid::filled(5, 3, "A").unwrap();
        let multi = Mutation::MultiCellReplace {
            reel: 1,
            positions: vec![1, 2, 1],
            layer: 0,
            symbol: "WD".into(),
        };

        let resolved = resolve(&grid, &multi).unwrap();
        assert_eq!(resolved.targets.len(), 2);

        let changes = apply(&mut grid, &multi, MutateOptions::animated()).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(grid.changes().len(), 2);
    }

    #[test]
    fn test_reel_lock_with_symbol() {
        let mut grid = Grid::filled(5, 3, "A").unwrap();
        let lock = Mutation::ReelLock {
            reel: 2,
            symbol: Some("WD".into()),
        };

        let changes = apply(&mut grid, &lock, MutateOptions::animated()).unwrap();
        assert_eq!(changes.len(), 3);
        assert!(grid.is_locked(2));
        assert!((0..3).all(|position| grid.name_at(2, position) == Some("WD")));

        let out_of_range = Mutation::ReelLock {
            reel: 5,
            symbol: Some("WD".into()),
        };
        assert!(apply(&mut grid, &out_of_range, MutateOptions::animated()).is_err());
        assert!(!grid.is_locked(5));
    }

    #[test]
    fn test_trigger_reveal_needs_trigger_cell() {
        let grid = Grid::filled(5, 3, "A").unwrap();
        let reveal = Mutation::TriggerReveal {
            trigger: CellPos::new(9, 0),
            affected: vec![CellPos::new(0, 0)],
            symbol: Some("MYS".into()),
        };
        assert!(applied(&grid, &reveal, MutateOptions::animated()).is_err());
    }

    #[test]
    fn test_applied_is_pure() {
        let grid = Grid::filled(5, 3, "A").unwrap();
        let next = applied(&grid, &replace(0, 0, "WD"), MutateOptions::silent()).unwrap();
        assert_eq!(grid.name_at(0, 0), Some("A"));
        assert_eq!(next.name_at(0, 0), Some("WD"));
    }

    #[test]
    fn test_batch_last_write_wins() {
        let mut grid = Grid::filled(5, 3, "A").unwrap();
        let batch = MutationBatch::from_mutations(
            BatchOrigin::Spin,
            [
                replace(0, 0, "X"),
                replace(9, 0, "Y"),
                replace(0, 0, "Z"),
                Mutation::FreeSpinAward { count: 3 },
            ],
        );

        let report = apply_batch(&mut grid, &batch, MutateOptions::silent());
        assert_eq!(report.applied.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(grid.name_at(0, 0), Some("Z"));
    }

    #[test]
    fn test_batch_on_fresh_copies_matches() {
        let base = Grid::filled(5, 3, "A").unwrap();
        let batch = MutationBatch::from_mutations(
            BatchOrigin::Spin,
            [replace(0, 0, "WD"), replace(2, 1, "WD")],
        );

        let mut once = base.clone();
        apply_batch(&mut once, &batch, MutateOptions::silent());
        let mut again = base.clone();
        apply_batch(&mut again, &batch, MutateOptions::silent());

        assert_eq!(once.snapshot(), again.snapshot());
        assert_eq!(
            once.snapshot().diff(&base.snapshot()),
            vec![CellPos::new(0, 0), CellPos::new(2, 1)]
        );
    }
}
