//! Reel lock: holds reels through reevaluations

use futures_util::FutureExt;
use rf_board::MutationKind;
use rf_phase::{Phase, PhaseArgs};

use super::{SETTLED, pending_for};
use crate::apply::{PresentOptions, present_mutations};
use crate::context::{ModuleContext, SpinContext};
use crate::module::{ModuleCategory, ModuleId, ModuleTask, PresentationModule};

const KINDS: [MutationKind; 1] = [MutationKind::ReelLock];

/// Locks reels (and swaps their symbols when the mutation names one)
///
/// Locked reels keep their symbols when reevaluation stops land.
#[derive(Default)]
pub struct ReelLockModule;

impl ReelLockModule {
    pub fn new() -> Self {
        Self
    }
}

impl PresentationModule for ReelLockModule {
    fn id(&self) -> ModuleId {
        ModuleId::new("reel_lock")
    }

    fn name(&self) -> &str {
        "Reel Lock"
    }

    fn category(&self) -> ModuleCategory {
        ModuleCategory::Reels
    }

    fn phases(&self) -> Vec<Phase> {
        SETTLED.to_vec()
    }

    fn wants(&self, _phase: Phase, args: &PhaseArgs, spin: &SpinContext) -> bool {
        !pending_for(spin, args, &KINDS).is_empty()
    }

    fn run(&mut self, _phase: Phase, args: &PhaseArgs, cx: ModuleContext) -> ModuleTask {
        let args = args.clone();

        async move {
            let entries = pending_for(cx.spin(), &args, &KINDS);
            let presentation = present_mutations(&cx, &entries, &PresentOptions::default()).await;
            let locked = cx.spin().with_grid(|grid| grid.locked_reels());
            log::debug!("Locked reels after {}: {:?}", cx.phase(), locked);
            presentation.into_result()
        }
        .boxed_local()
    }
}
