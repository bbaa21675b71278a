//! PhasePlan: The fixed phase order the spin driver walks once per spin

use serde::{Deserialize, Serialize};

use crate::args::PhaseArgs;
use crate::phase::Phase;

/// One step of a spin plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedPhase {
    pub phase: Phase,
    pub args: PhaseArgs,
}

impl PlannedPhase {
    pub fn new(phase: Phase, args: PhaseArgs) -> Self {
        Self { phase, args }
    }
}

/// Ordered phases for one spin after `PreSpin` and outcome ingest
///
/// ```text
/// PreReelsStopSpinning
///   for reel in reel_order: SpecificReelStopping, SpecificReelStop, ReelEndRollback
/// ReelsStoppedCallback
///   for each reevaluation:
///     ReevaluationSpinStart, ReevaluationPreReelsStopSpinning,
///     for reel in reel_order: ReevaluationSpecificReelStop
///     ReevaluationReelsStoppedCallback
/// BonusGameEnded   (if flagged)
/// FreespinGameEnd  (if flagged)
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhasePlan {
    pub steps: Vec<PlannedPhase>,
}

impl PhasePlan {
    /// Build the plan for a spin
    ///
    /// `reel_order` is the order the outer driver stops reels in; it is
    /// taken as given, never re-sorted here.
    pub fn for_spin(
        reel_order: &[usize],
        reevaluations: u32,
        bonus_game_ended: bool,
        freespin_game_ended: bool,
    ) -> Self {
        let mut steps = Vec::new();

        steps.push(PlannedPhase::new(Phase::PreReelsStopSpinning, PhaseArgs::none()));
        for &reel in reel_order {
            steps.push(PlannedPhase::new(Phase::SpecificReelStopping, PhaseArgs::reel(reel)));
            steps.push(PlannedPhase::new(Phase::SpecificReelStop, PhaseArgs::reel(reel)));
            steps.push(PlannedPhase::new(Phase::ReelEndRollback, PhaseArgs::reel(reel)));
        }
        steps.push(PlannedPhase::new(Phase::ReelsStoppedCallback, PhaseArgs::none()));

        for index in 0..reevaluations {
            steps.push(PlannedPhase::new(
                Phase::ReevaluationSpinStart,
                PhaseArgs::reevaluation(index),
            ));
            steps.push(PlannedPhase::new(
                Phase::ReevaluationPreReelsStopSpinning,
                PhaseArgs::reevaluation(index),
            ));
            for &reel in reel_order {
                steps.push(PlannedPhase::new(
                    Phase::ReevaluationSpecificReelStop,
                    PhaseArgs::reel(reel).in_reevaluation(index),
                ));
            }
            steps.push(PlannedPhase::new(
                Phase::ReevaluationReelsStoppedCallback,
                PhaseArgs::reevaluation(index),
            ));
        }

        if bonus_game_ended {
            steps.push(PlannedPhase::new(Phase::BonusGameEnded, PhaseArgs::none()));
        }
        if freespin_game_ended {
            steps.push(PlannedPhase::new(Phase::FreespinGameEnd, PhaseArgs::none()));
        }

        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlannedPhase> {
        self.steps.iter()
    }

    /// Count steps for a phase
    pub fn count(&self, phase: Phase) -> usize {
        self.steps.iter().filter(|s| s.phase == phase).count()
    }
}
