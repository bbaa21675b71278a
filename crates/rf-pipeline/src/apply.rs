//! Staged presentation of mutations
//!
//! Writes mutations to the grid one visual step at a time, paced by the
//! module's delay policy. Every mutation is claimed first, so a mutation
//! another module already presented is skipped, never written twice.
//!
//! Cancellation (own cancel or slam-stop) never leaves the board half
//! written: from the first cancelled suspension on, the remaining cells and
//! mutations are written silently and without waiting.

use rf_board::mutation::{self, ResolvedMutation};
use rf_board::{BoardError, MutateOptions, Mutation, MutationEntry, MutationId, SymbolChange};
use rf_task::{TaskError, TaskResult};

use crate::context::ModuleContext;
use crate::diagnostics::DiagnosticKind;
use crate::services::EffectCue;

/// How a batch of mutations is presented
#[derive(Debug, Clone, PartialEq)]
pub struct PresentOptions {
    /// Flags for each written cell while not cancelled
    pub mutate: MutateOptions,
    /// Effect played on a reveal's trigger cell before it transforms
    pub reveal_effect: String,
}

impl Default for PresentOptions {
    fn default() -> Self {
        Self {
            mutate: MutateOptions::animated(),
            reveal_effect: "trigger_reveal".to_string(),
        }
    }
}

impl PresentOptions {
    /// Builder: set per-cell flags
    pub fn with_mutate(mut self, mutate: MutateOptions) -> Self {
        self.mutate = mutate;
        self
    }

    /// Builder: set the reveal effect name
    pub fn with_reveal_effect(mut self, name: impl Into<String>) -> Self {
        self.reveal_effect = name.into();
        self
    }
}

/// What a presentation did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Presentation {
    pub applied: Vec<MutationId>,
    pub skipped: Vec<(MutationId, String)>,
    pub changes: Vec<SymbolChange>,
    /// A suspension was cancelled; the rest was written silently
    pub cancelled: bool,
}

impl Presentation {
    /// Task result matching the presentation
    pub fn into_result(self) -> TaskResult {
        if self.cancelled {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Present `entries` in the policy's reel order
///
/// Waits the start delay, then the reel stagger whenever the reel changes.
pub async fn present_mutations(
    cx: &ModuleContext,
    entries: &[MutationEntry],
    options: &PresentOptions,
) -> Presentation {
    let policy = cx.timing().clone();
    let mut report = Presentation::default();

    if !entries.is_empty() {
        pause(cx, policy.start_delay(), &mut report).await;
    }

    let mut last_reel = None;
    for entry in policy.order_entries(entries) {
        if let Some(reel) = entry.mutation.primary_reel() {
            if last_reel.is_some_and(|last| last != reel) {
                pause(cx, policy.reel_stagger(), &mut report).await;
            }
            last_reel = Some(reel);
        }
        present_one(cx, &entry, options, &mut report).await;
    }

    log::debug!(
        "{} presented {} mutation(s), skipped {}{}",
        cx.module(),
        report.applied.len(),
        report.skipped.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    report
}

/// Present one mutation; outcome goes into `report`
pub async fn present_one(
    cx: &ModuleContext,
    entry: &MutationEntry,
    options: &PresentOptions,
    report: &mut Presentation,
) {
    let resolved = match claim(cx, entry) {
        Ok(resolved) => resolved,
        Err(err) => {
            skip(cx, entry.id, err, report);
            return;
        }
    };

    let result = match &entry.mutation {
        Mutation::MultiCellReplace { reel, .. } => {
            staged(cx, *reel, &resolved, options, report).await
        }
        Mutation::TriggerReveal { trigger, .. } => {
            if !report.cancelled {
                let cue = EffectCue::new(&options.reveal_effect, cx.timing().effect_duration())
                    .at(*trigger);
                if cx.play_effect_and_wait(&cue).await.is_err() {
                    report.cancelled = true;
                }
            }
            write(cx, &resolved, options, report)
        }
        _ => write(cx, &resolved, options, report),
    };

    match result {
        Ok(changes) => {
            report.changes.extend(changes);
            report.applied.push(entry.id);
        }
        Err(err) => skip(cx, entry.id, err, report),
    }
}

/// Claim and resolve in one step; the claim is released if resolve fails
fn claim(cx: &ModuleContext, entry: &MutationEntry) -> Result<ResolvedMutation, BoardError> {
    cx.spin().with_board_mut(|grid, mutations| {
        mutations.claim(entry.id)?;
        mutation::resolve(grid, &entry.mutation).inspect_err(|_| mutations.release(entry.id))
    })
}

fn skip(cx: &ModuleContext, id: MutationId, err: BoardError, report: &mut Presentation) {
    match &err {
        BoardError::AlreadyApplied(_) => {
            log::debug!("{}: mutation {} already presented", cx.module(), id);
        }
        BoardError::MissingAnimationTarget { .. } => {
            cx.diagnostic(
                DiagnosticKind::MissingAnimationTarget,
                format!("mutation {id}: {err}"),
            );
        }
        _ => log::warn!("{}: mutation {} skipped: {}", cx.module(), id, err),
    }
    report.skipped.push((id, err.to_string()));
}

fn flags(options: &PresentOptions, report: &Presentation) -> MutateOptions {
    if report.cancelled {
        MutateOptions::silent()
    } else {
        options.mutate
    }
}

/// Write every target at once
fn write(
    cx: &ModuleContext,
    resolved: &ResolvedMutation,
    options: &PresentOptions,
    report: &Presentation,
) -> Result<Vec<SymbolChange>, BoardError> {
    let opts = flags(options, report);
    cx.spin()
        .with_grid_mut(|grid| mutation::commit(grid, resolved, opts))
}

/// Write one cell per step in the reel's cell order
async fn staged(
    cx: &ModuleContext,
    reel: usize,
    resolved: &ResolvedMutation,
    options: &PresentOptions,
    report: &mut Presentation,
) -> Result<Vec<SymbolChange>, BoardError> {
    let mut positions: Vec<usize> = resolved.targets.iter().map(|t| t.cell.position).collect();
    cx.timing().cell_direction(reel).arrange(&mut positions);

    let mut changes = Vec::with_capacity(positions.len());
    for (step, position) in positions.into_iter().enumerate() {
        let Some(target) = resolved.targets.iter().find(|t| t.cell.position == position) else {
            continue;
        };
        if step > 0 {
            pause(cx, cx.timing().cell_step(), report).await;
        }
        let single = ResolvedMutation {
            targets: vec![*target],
            symbol: resolved.symbol.clone(),
            lock_reel: None,
        };
        changes.extend(write(cx, &single, options, report)?);
    }
    Ok(changes)
}

/// Wait unless already cancelled; a cancelled wait flips to silent mode
async fn pause(cx: &ModuleContext, ms: u64, report: &mut Presentation) {
    if report.cancelled {
        return;
    }
    if ms == 0 {
        report.cancelled = cx.checkpoint().is_err();
        return;
    }
    if cx.delay(ms).await.is_err() {
        report.cancelled = true;
    }
}
