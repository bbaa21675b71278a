//! Meters: jackpot/progressive meter events and win credits

use std::collections::BTreeMap;

use futures_util::FutureExt;
use rf_board::{MeterKind, Mutation, MutationEntry, MutationKind};
use rf_phase::{Phase, PhaseArgs};
use rf_task::TaskError;

use super::{SETTLED, pending_for};
use crate::config::{ConfigError, ModuleConfig};
use crate::context::{ModuleContext, SpinContext};
use crate::module::{ModuleCategory, ModuleId, ModuleTask, PresentationModule};
use crate::services::EffectCue;

const KINDS: [MutationKind; 1] = [MutationKind::MeterEvent];

/// Applies `MeterEvent`s to the meter bank
///
/// A `Win` hands the server-declared amount to the credit sink before the
/// celebration plays, so a slam-stop never loses credits.
///
/// Params:
/// - `seed` (map of meter → value): meter values set at `SlotGameStarted`
/// - `win_effect` (string): celebration played after a win
pub struct MetersModule {
    seed: BTreeMap<String, f64>,
    win_effect: String,
}

impl MetersModule {
    pub fn new() -> Self {
        Self {
            seed: BTreeMap::new(),
            win_effect: "jackpot_win".to_string(),
        }
    }
}

impl Default for MetersModule {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationModule for MetersModule {
    fn id(&self) -> ModuleId {
        ModuleId::new("meters")
    }

    fn name(&self) -> &str {
        "Meters"
    }

    fn category(&self) -> ModuleCategory {
        ModuleCategory::Jackpot
    }

    fn configure(&mut self, config: &ModuleConfig) -> Result<(), ConfigError> {
        if config.has("seed") {
            self.seed = config.require("seed")?;
        }
        if let Some((key, value)) = self.seed.iter().find(|(_, v)| !v.is_finite() || **v < 0.0) {
            return Err(ConfigError::InvalidValue(format!("seed.{key}: {value}")));
        }
        self.win_effect = config.get_or("win_effect", self.win_effect.clone());
        Ok(())
    }

    fn phases(&self) -> Vec<Phase> {
        let mut phases = vec![Phase::SlotGameStarted];
        phases.extend(SETTLED);
        phases
    }

    fn wants(&self, phase: Phase, args: &PhaseArgs, spin: &SpinContext) -> bool {
        match phase {
            Phase::SlotGameStarted => !self.seed.is_empty(),
            _ => !pending_for(spin, args, &KINDS).is_empty(),
        }
    }

    fn run(&mut self, phase: Phase, args: &PhaseArgs, cx: ModuleContext) -> ModuleTask {
        if phase == Phase::SlotGameStarted {
            let seed = self.seed.clone();
            return async move {
                cx.spin().with_meters_mut(|bank| {
                    for (key, value) in seed {
                        bank.set(key, value);
                    }
                });
                Ok(())
            }
            .boxed_local();
        }

        let win_effect = self.win_effect.clone();
        let args = args.clone();
        async move {
            let mut cancelled = false;
            for entry in pending_for(cx.spin(), &args, &KINDS) {
                let Some(kind) = record(&cx, &entry) else {
                    continue;
                };
                if kind == MeterKind::Win && !cancelled {
                    let cue = EffectCue::new(&win_effect, cx.timing().effect_duration());
                    cancelled = cx.play_effect_and_wait(&cue).await.is_err();
                }
            }
            if cancelled {
                Err(TaskError::Cancelled)
            } else {
                Ok(())
            }
        }
        .boxed_local()
    }
}

/// Claim one meter event, update the bank and credit wins
fn record(cx: &ModuleContext, entry: &MutationEntry) -> Option<MeterKind> {
    let Mutation::MeterEvent { key, kind, amount } = &entry.mutation else {
        return None;
    };
    if let Err(err) = cx.spin().with_mutations_mut(|m| m.claim(entry.id).map(|_| ())) {
        log::debug!("{}: meter event {} skipped: {}", cx.module(), entry.id, err);
        return None;
    }

    let update = cx
        .spin()
        .with_meters_mut(|bank| bank.apply(key, *kind, amount.unwrap_or(0.0)));
    if update.credited > 0.0 {
        cx.spin().credit(update.credited, &format!("{key} {}", kind.type_name()));
    }
    Some(*kind)
}
