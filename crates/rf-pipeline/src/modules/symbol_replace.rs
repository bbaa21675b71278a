//! Symbol replace: presents `CellReplace` and `MultiCellReplace`

use futures_util::FutureExt;
use rf_board::{MutateOptions, MutationKind};
use rf_phase::{Phase, PhaseArgs};

use super::{SETTLED, pending_for};
use crate::apply::{PresentOptions, present_mutations};
use crate::config::{ConfigError, ModuleConfig};
use crate::context::{ModuleContext, SpinContext};
use crate::module::{ModuleCategory, ModuleId, ModuleTask, PresentationModule};

const KINDS: [MutationKind; 2] = [MutationKind::CellReplace, MutationKind::MultiCellReplace];

/// Replaces symbols on the settled board, reel by reel
///
/// Params:
/// - `play_effect` (bool): play the replacement effect on each cell
/// - `on_reel_stop` (bool): also replace as each reel lands, instead of
///   waiting for all reels
pub struct SymbolReplaceModule {
    play_effect: bool,
    on_reel_stop: bool,
}

impl SymbolReplaceModule {
    pub fn new() -> Self {
        Self {
            play_effect: false,
            on_reel_stop: false,
        }
    }
}

impl Default for SymbolReplaceModule {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationModule for SymbolReplaceModule {
    fn id(&self) -> ModuleId {
        ModuleId::new("symbol_replace")
    }

    fn name(&self) -> &str {
        "Symbol Replace"
    }

    fn category(&self) -> ModuleCategory {
        ModuleCategory::Symbols
    }

    fn description(&self) -> &str {
        "Swaps symbols declared by cell and multi-cell replace mutations"
    }

    fn configure(&mut self, config: &ModuleConfig) -> Result<(), ConfigError> {
        self.play_effect = config.get_or("play_effect", false);
        self.on_reel_stop = config.get_or("on_reel_stop", false);
        Ok(())
    }

    fn phases(&self) -> Vec<Phase> {
        let mut phases = SETTLED.to_vec();
        if self.on_reel_stop {
            phases.extend([Phase::SpecificReelStop, Phase::ReevaluationSpecificReelStop]);
        }
        phases
    }

    fn wants(&self, _phase: Phase, args: &PhaseArgs, spin: &SpinContext) -> bool {
        !pending_for(spin, args, &KINDS).is_empty()
    }

    fn run(&mut self, _phase: Phase, args: &PhaseArgs, cx: ModuleContext) -> ModuleTask {
        let options = PresentOptions::default().with_mutate(if self.play_effect {
            MutateOptions::with_effect()
        } else {
            MutateOptions::animated()
        });
        let args = args.clone();

        async move {
            let entries = pending_for(cx.spin(), &args, &KINDS);
            present_mutations(&cx, &entries, &options).await.into_result()
        }
        .boxed_local()
    }
}
