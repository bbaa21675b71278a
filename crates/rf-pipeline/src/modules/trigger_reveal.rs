//! Trigger reveal: plays a reveal on the trigger cell, then transforms the affected cells

use futures_util::FutureExt;
use rf_board::MutationKind;
use rf_phase::{Phase, PhaseArgs};

use super::{SETTLED, pending_for};
use crate::apply::{PresentOptions, present_mutations};
use crate::config::{ConfigError, ModuleConfig};
use crate::context::{ModuleContext, SpinContext};
use crate::module::{ModuleCategory, ModuleId, ModuleTask, PresentationModule};

const KINDS: [MutationKind; 1] = [MutationKind::TriggerReveal];

pub struct TriggerRevealModule {
    effect: String,
}

impl TriggerRevealModule {
    pub fn new() -> Self {
        Self {
            effect: "trigger_reveal".to_string(),
        }
    }
}

impl Default for TriggerRevealModule {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationModule for TriggerRevealModule {
    fn id(&self) -> ModuleId {
        ModuleId::new("trigger_reveal")
    }

    fn name(&self) -> &str {
        "Trigger Reveal"
    }

    fn category(&self) -> ModuleCategory {
        ModuleCategory::Symbols
    }

    fn configure(&mut self, config: &ModuleConfig) -> Result<(), ConfigError> {
        let effect: String = config.get_or("effect", self.effect.clone());
        if effect.trim().is_empty() {
            return Err(ConfigError::InvalidValue("effect: empty name".into()));
        }
        self.effect = effect;
        Ok(())
    }

    fn phases(&self) -> Vec<Phase> {
        SETTLED.to_vec()
    }

    fn wants(&self, _phase: Phase, args: &PhaseArgs, spin: &SpinContext) -> bool {
        !pending_for(spin, args, &KINDS).is_empty()
    }

    fn run(&mut self, _phase: Phase, args: &PhaseArgs, cx: ModuleContext) -> ModuleTask {
        let options = PresentOptions::default().with_reveal_effect(self.effect.clone());
        let args = args.clone();

        async move {
            let entries = pending_for(cx.spin(), &args, &KINDS);
            present_mutations(&cx, &entries, &options).await.into_result()
        }
        .boxed_local()
    }
}
