//! Free spins: award tally shared between award, pre-spin and game end

use futures_util::FutureExt;
use rf_board::{Mutation, MutationKind};
use rf_phase::{Phase, PhaseArgs};
use rf_task::TaskError;
use serde::{Deserialize, Serialize};

use super::{SETTLED, pending_for};
use crate::config::{ConfigError, ModuleConfig};
use crate::context::{ModuleContext, SpinContext};
use crate::module::{ModuleCategory, ModuleId, ModuleTask, PresentationModule};
use crate::services::EffectCue;

const KINDS: [MutationKind; 1] = [MutationKind::FreeSpinAward];

/// Free-spin bookkeeping, published as a context slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSpinTally {
    /// Spins awarded since the free-spin game began
    pub awarded: u32,
    /// Spins left to play
    pub remaining: u32,
    /// Spins started inside the free-spin game
    pub played: u32,
}

/// Tracks awarded free spins and presents the award and summary
///
/// Params:
/// - `award_effect` (string)
/// - `summary_effect` (string)
pub struct FreeSpinsModule {
    award_effect: String,
    summary_effect: String,
}

impl FreeSpinsModule {
    pub fn new() -> Self {
        Self {
            award_effect: "free_spins_award".to_string(),
            summary_effect: "free_spins_summary".to_string(),
        }
    }
}

impl Default for FreeSpinsModule {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationModule for FreeSpinsModule {
    fn id(&self) -> ModuleId {
        ModuleId::new("free_spins")
    }

    fn name(&self) -> &str {
        "Free Spins"
    }

    fn category(&self) -> ModuleCategory {
        ModuleCategory::FreeSpins
    }

    fn configure(&mut self, config: &ModuleConfig) -> Result<(), ConfigError> {
        self.award_effect = config.get_or("award_effect", self.award_effect.clone());
        self.summary_effect = config.get_or("summary_effect", self.summary_effect.clone());
        Ok(())
    }

    fn phases(&self) -> Vec<Phase> {
        let mut phases = vec![Phase::PreSpin];
        phases.extend(SETTLED);
        phases.push(Phase::FreespinGameEnd);
        phases
    }

    fn wants(&self, phase: Phase, args: &PhaseArgs, spin: &SpinContext) -> bool {
        match phase {
            Phase::PreSpin => {
                spin.flags().in_free_spins
                    && spin
                        .slot_value::<FreeSpinTally>()
                        .is_some_and(|tally| tally.remaining > 0)
            }
            Phase::FreespinGameEnd => spin.slot_value::<FreeSpinTally>().is_some(),
            _ => !pending_for(spin, args, &KINDS).is_empty(),
        }
    }

    fn run(&mut self, phase: Phase, args: &PhaseArgs, cx: ModuleContext) -> ModuleTask {
        match phase {
            Phase::PreSpin => async move {
                cx.spin().with_slot(|tally: &mut FreeSpinTally| {
                    tally.remaining = tally.remaining.saturating_sub(1);
                    tally.played += 1;
                    log::info!("Free spin {} ({} left)", tally.played, tally.remaining);
                });
                Ok(())
            }
            .boxed_local(),

            Phase::FreespinGameEnd => {
                let effect = self.summary_effect.clone();
                async move {
                    let Some(tally) = cx.spin().slot_value::<FreeSpinTally>() else {
                        return Ok(());
                    };
                    log::info!(
                        "Free-spin game over: {} awarded, {} played",
                        tally.awarded,
                        tally.played
                    );
                    cx.spin().clear_slot::<FreeSpinTally>();
                    let cue = EffectCue::new(effect, cx.timing().effect_duration());
                    cx.play_effect_and_wait(&cue).await?;
                    Ok(())
                }
                .boxed_local()
            }

            _ => {
                let effect = self.award_effect.clone();
                let args = args.clone();
                async move {
                    let mut total = 0;
                    for entry in pending_for(cx.spin(), &args, &KINDS) {
                        let Mutation::FreeSpinAward { count } = entry.mutation else {
                            continue;
                        };
                        if cx.spin().with_mutations_mut(|m| m.claim(entry.id).is_err()) {
                            continue;
                        }
                        total += count;
                    }
                    if total == 0 {
                        return Ok(());
                    }

                    let spin = cx.spin();
                    if spin.slot_value::<FreeSpinTally>().is_none() {
                        spin.insert_slot(FreeSpinTally::default());
                    }
                    spin.with_slot(|tally: &mut FreeSpinTally| {
                        tally.awarded += total;
                        tally.remaining += total;
                    });
                    log::info!("{} free spin(s) awarded", total);

                    let cue = EffectCue::new(effect, cx.timing().effect_duration());
                    cx.play_effect_and_wait(&cue)
                        .await
                        .map_err(TaskError::from)
                }
                .boxed_local()
            }
        }
    }
}
