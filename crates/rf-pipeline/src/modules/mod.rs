//! Built-in presentation modules
//!
//! | Module | Phases | Mutations |
//! |--------|--------|-----------|
//! | `symbol_replace` | reels stopped (+ reel stop with `on_reel_stop`) | `CellReplace`, `MultiCellReplace` |
//! | `trigger_reveal` | reels stopped | `TriggerReveal` |
//! | `reel_lock` | reels stopped | `ReelLock` |
//! | `meters` | game start, reels stopped | `MeterEvent` |
//! | `free_spins` | pre-spin, reels stopped, free-spin end | `FreeSpinAward` |
//!
//! "Reels stopped" means both `ReelsStoppedCallback` and
//! `ReevaluationReelsStoppedCallback`; each reads the batch of its own origin.

mod free_spins;
mod meters;
mod reel_lock;
mod symbol_replace;
mod trigger_reveal;

pub use free_spins::*;
pub use meters::*;
pub use reel_lock::*;
pub use symbol_replace::*;
pub use trigger_reveal::*;

use rf_board::{MutationEntry, MutationKind};
use rf_phase::{Phase, PhaseArgs};

use crate::config::PipelineConfig;
use crate::context::{SpinContext, batch_origin};
use crate::module::{BoxedModule, ModuleRegistry, RegistryError};

/// Phases at which a board has settled
pub(crate) const SETTLED: [Phase; 2] = [
    Phase::ReelsStoppedCallback,
    Phase::ReevaluationReelsStoppedCallback,
];

/// Every built-in module in default dispatch order
pub fn builtins() -> Vec<BoxedModule> {
    vec![
        Box::new(ReelLockModule::new()),
        Box::new(SymbolReplaceModule::new()),
        Box::new(TriggerRevealModule::new()),
        Box::new(MetersModule::new()),
        Box::new(FreeSpinsModule::new()),
    ]
}

/// Configure and register every built-in the config enables
///
/// Returns the number of modules registered.
pub fn register_builtins(
    registry: &mut ModuleRegistry,
    config: &PipelineConfig,
) -> Result<usize, RegistryError> {
    let mut registered = 0;
    for module in builtins() {
        if registry.register_configured(module, config)? {
            registered += 1;
        }
    }
    Ok(registered)
}

/// Unapplied mutations of `kinds` for this dispatch, in batch order
///
/// Per-reel dispatches only see mutations whose primary reel is theirs.
pub(crate) fn pending_for(
    spin: &SpinContext,
    args: &PhaseArgs,
    kinds: &[MutationKind],
) -> Vec<MutationEntry> {
    let origin = batch_origin(args);
    let mut entries: Vec<MutationEntry> = spin.with_mutations(|manager| {
        kinds
            .iter()
            .flat_map(|kind| manager.pending(origin, *kind))
            .collect()
    });
    if let Some(reel) = args.reel {
        entries.retain(|entry| entry.mutation.primary_reel() == Some(reel));
    }
    entries.sort_by_key(|entry| entry.id);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleConfig;

    #[test]
    fn test_register_builtins_respects_config() {
        let config = PipelineConfig::default()
            .with_module("meters", ModuleConfig { enabled: false, ..Default::default() })
            .with_module("free_spins", ModuleConfig::new().with_order(-1));

        let mut registry = ModuleRegistry::new();
        assert_eq!(register_builtins(&mut registry, &config).unwrap(), 4);

        let ids: Vec<_> = registry.ids().into_iter().map(|id| id.0).collect();
        assert_eq!(
            ids,
            vec!["free_spins", "reel_lock", "symbol_replace", "trigger_reveal"]
        );
    }
}
