//! Phase: The closed enum of spin lifecycle points
//!
//! A Phase is NOT a frame callback, NOT an animation.
//! A Phase is the SEMANTIC MOMENT in the spin at which modules may act.

use serde::{Deserialize, Serialize};

use crate::args::PhaseArgs;

/// Canonical spin lifecycle phase
///
/// The spin driver advances through these in a fixed order once per spin
/// (and once per reevaluation for the `Reevaluation*` family).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    // ═══════════════════════════════════════════════════════════════════════
    // SESSION
    // ═══════════════════════════════════════════════════════════════════════
    /// Game finished loading, before the first spin
    SlotGameStarted,

    /// Player changed the wager
    WagerChange,

    // ═══════════════════════════════════════════════════════════════════════
    // SPIN LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════
    /// Spin requested; per-spin state is reset before modules run
    PreSpin,

    /// Outcome received, reels about to start stopping
    PreReelsStopSpinning,

    /// A specific reel begins its stop motion
    SpecificReelStopping,

    /// A specific reel landed
    SpecificReelStop,

    /// A specific reel finished its bounce-back
    ReelEndRollback,

    /// All reels stopped, board is settled
    ReelsStoppedCallback,

    // ═══════════════════════════════════════════════════════════════════════
    // REEVALUATION / RESPIN
    // ═══════════════════════════════════════════════════════════════════════
    /// A reevaluation spin begins
    ReevaluationSpinStart,

    /// Reevaluation outcome received, reels about to stop
    ReevaluationPreReelsStopSpinning,

    /// A specific reel landed during a reevaluation
    ReevaluationSpecificReelStop,

    /// All reels stopped for the reevaluation
    ReevaluationReelsStoppedCallback,

    // ═══════════════════════════════════════════════════════════════════════
    // FEATURE ENDINGS
    // ═══════════════════════════════════════════════════════════════════════
    /// A bonus game finished
    BonusGameEnded,

    /// The last free spin of a free-spin game finished
    FreespinGameEnd,
}

/// How the dispatcher runs the modules that opted into a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseExecution {
    /// Blocking; module N+1 starts only after module N is terminal
    Sequential,
    /// Blocking; all modules start together, the phase ends when all are terminal
    Concurrent,
    /// Fire-and-forget; the driver does not wait
    Advisory,
}

impl PhaseExecution {
    /// Does the driver wait for this phase?
    pub fn is_blocking(&self) -> bool {
        !matches!(self, Self::Advisory)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sequential => "Blocking (sequential)",
            Self::Concurrent => "Blocking (concurrent)",
            Self::Advisory => "Advisory",
        }
    }
}

/// Phase category for grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseCategory {
    Session,
    SpinLifecycle,
    Reel,
    Reevaluation,
    FeatureEnd,
}

impl PhaseCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Session => "Session",
            Self::SpinLifecycle => "Spin Lifecycle",
            Self::Reel => "Per-Reel",
            Self::Reevaluation => "Reevaluation",
            Self::FeatureEnd => "Feature End",
        }
    }
}

impl Phase {
    /// Every phase, in lifecycle order
    pub const ALL: [Phase; 14] = [
        Phase::SlotGameStarted,
        Phase::WagerChange,
        Phase::PreSpin,
        Phase::PreReelsStopSpinning,
        Phase::SpecificReelStopping,
        Phase::SpecificReelStop,
        Phase::ReelEndRollback,
        Phase::ReelsStoppedCallback,
        Phase::ReevaluationSpinStart,
        Phase::ReevaluationPreReelsStopSpinning,
        Phase::ReevaluationSpecificReelStop,
        Phase::ReevaluationReelsStoppedCallback,
        Phase::BonusGameEnded,
        Phase::FreespinGameEnd,
    ];

    /// Get the phase category for grouping
    pub fn category(&self) -> PhaseCategory {
        match self {
            Phase::SlotGameStarted | Phase::WagerChange => PhaseCategory::Session,

            Phase::PreSpin | Phase::PreReelsStopSpinning | Phase::ReelsStoppedCallback => {
                PhaseCategory::SpinLifecycle
            }

            Phase::SpecificReelStopping | Phase::SpecificReelStop | Phase::ReelEndRollback => {
                PhaseCategory::Reel
            }

            Phase::ReevaluationSpinStart
            | Phase::ReevaluationPreReelsStopSpinning
            | Phase::ReevaluationSpecificReelStop
            | Phase::ReevaluationReelsStoppedCallback => PhaseCategory::Reevaluation,

            Phase::BonusGameEnded | Phase::FreespinGameEnd => PhaseCategory::FeatureEnd,
        }
    }

    /// Get a simple string name for this phase
    pub fn type_name(&self) -> &'static str {
        match self {
            Phase::SlotGameStarted => "slot_game_started",
            Phase::WagerChange => "wager_change",
            Phase::PreSpin => "pre_spin",
            Phase::PreReelsStopSpinning => "pre_reels_stop_spinning",
            Phase::SpecificReelStopping => "specific_reel_stopping",
            Phase::SpecificReelStop => "specific_reel_stop",
            Phase::ReelEndRollback => "reel_end_rollback",
            Phase::ReelsStoppedCallback => "reels_stopped_callback",
            Phase::ReevaluationSpinStart => "reevaluation_spin_start",
            Phase::ReevaluationPreReelsStopSpinning => "reevaluation_pre_reels_stop_spinning",
            Phase::ReevaluationSpecificReelStop => "reevaluation_specific_reel_stop",
            Phase::ReevaluationReelsStoppedCallback => "reevaluation_reels_stopped_callback",
            Phase::BonusGameEnded => "bonus_game_ended",
            Phase::FreespinGameEnd => "freespin_game_end",
        }
    }

    /// Look a phase up by its type name (case-insensitive)
    pub fn from_type_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        Self::ALL.into_iter().find(|p| p.type_name() == lower)
    }

    /// Documented default execution policy
    pub fn default_execution(&self) -> PhaseExecution {
        match self {
            Phase::SlotGameStarted
            | Phase::PreReelsStopSpinning
            | Phase::ReevaluationPreReelsStopSpinning => PhaseExecution::Concurrent,

            // Later modules read Grid state written by earlier ones
            Phase::PreSpin
            | Phase::ReelsStoppedCallback
            | Phase::ReevaluationSpinStart
            | Phase::ReevaluationReelsStoppedCallback
            | Phase::BonusGameEnded
            | Phase::FreespinGameEnd => PhaseExecution::Sequential,

            Phase::WagerChange
            | Phase::SpecificReelStopping
            | Phase::SpecificReelStop
            | Phase::ReelEndRollback
            | Phase::ReevaluationSpecificReelStop => PhaseExecution::Advisory,
        }
    }

    /// Does the driver wait for this phase by default?
    pub fn is_blocking(&self) -> bool {
        self.default_execution().is_blocking()
    }

    /// Is this a per-reel phase (needs a reel index)?
    pub fn is_per_reel(&self) -> bool {
        matches!(
            self,
            Phase::SpecificReelStopping
                | Phase::SpecificReelStop
                | Phase::ReelEndRollback
                | Phase::ReevaluationSpecificReelStop
        )
    }

    /// Is this part of the reevaluation family (needs a reevaluation index)?
    pub fn is_reevaluation(&self) -> bool {
        self.category() == PhaseCategory::Reevaluation
    }

    /// Base-spin counterpart of a reevaluation phase
    pub fn base_phase(&self) -> Phase {
        match self {
            Phase::ReevaluationSpinStart => Phase::PreSpin,
            Phase::ReevaluationPreReelsStopSpinning => Phase::PreReelsStopSpinning,
            Phase::ReevaluationSpecificReelStop => Phase::SpecificReelStop,
            Phase::ReevaluationReelsStoppedCallback => Phase::ReelsStoppedCallback,
            other => *other,
        }
    }

    /// Check that the arguments carry what this phase needs
    pub fn validate_args(&self, args: &PhaseArgs) -> Result<(), PhaseError> {
        if self.is_per_reel() && args.reel.is_none() {
            return Err(PhaseError::MissingReel(*self));
        }
        if self.is_reevaluation() && args.reevaluation.is_none() {
            return Err(PhaseError::MissingReevaluation(*self));
        }
        Ok(())
    }

    /// Accept an execution override only if it keeps the phase's blocking-ness
    pub fn check_execution(&self, requested: PhaseExecution) -> Result<PhaseExecution, PhaseError> {
        if requested.is_blocking() == self.is_blocking() {
            Ok(requested)
        } else {
            Err(PhaseError::ExecutionMismatch {
                phase: *self,
                requested,
            })
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

impl std::str::FromStr for Phase {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_type_name(s).ok_or_else(|| PhaseError::UnknownPhase(s.to_string()))
    }
}

/// Phase errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseError {
    #[error("Unknown phase: {0}")]
    UnknownPhase(String),

    #[error("Phase {0} requires a reel index")]
    MissingReel(Phase),

    #[error("Phase {0} requires a reevaluation index")]
    MissingReevaluation(Phase),

    #[error("Phase {phase} cannot run as {requested:?}")]
    ExecutionMismatch {
        phase: Phase,
        requested: PhaseExecution,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&Phase::ReelsStoppedCallback).unwrap();
        assert_eq!(json, "\"reels_stopped_callback\"");

        let back: Phase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Phase::ReelsStoppedCallback);
    }

    #[test]
    fn test_type_names_match_serde() {
        for phase in Phase::ALL {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json.trim_matches('"'), phase.type_name());
            assert_eq!(Phase::from_type_name(phase.type_name()), Some(phase));
        }
        assert_eq!(Phase::from_type_name("PRE_SPIN"), Some(Phase::PreSpin));
        assert!("not_a_phase".parse::<Phase>().is_err());
    }

    #[test]
    fn test_default_execution() {
        assert_eq!(
            Phase::ReelsStoppedCallback.default_execution(),
            PhaseExecution::Sequential
        );
        assert_eq!(
            Phase::PreReelsStopSpinning.default_execution(),
            PhaseExecution::Concurrent
        );
        assert!(!Phase::SpecificReelStop.is_blocking());
        assert!(!Phase::WagerChange.is_blocking());
        assert!(Phase::PreSpin.is_blocking());
    }

    #[test]
    fn test_check_execution() {
        assert_eq!(
            Phase::ReelsStoppedCallback.check_execution(PhaseExecution::Concurrent),
            Ok(PhaseExecution::Concurrent)
        );
        assert!(Phase::ReelsStoppedCallback
            .check_execution(PhaseExecution::Advisory)
            .is_err());
        assert!(Phase::SpecificReelStop
            .check_execution(PhaseExecution::Sequential)
            .is_err());
    }

    #[test]
    fn test_category() {
        assert_eq!(Phase::WagerChange.category(), PhaseCategory::Session);
        assert_eq!(Phase::SpecificReelStop.category(), PhaseCategory::Reel);
        assert_eq!(
            Phase::ReevaluationSpecificReelStop.category(),
            PhaseCategory::Reevaluation
        );
        assert_eq!(Phase::FreespinGameEnd.category(), PhaseCategory::FeatureEnd);
    }

    #[test]
    fn test_validate_args() {
        assert_eq!(
            Phase::SpecificReelStop.validate_args(&PhaseArgs::none()),
            Err(PhaseError::MissingReel(Phase::SpecificReelStop))
        );
        assert!(Phase::SpecificReelStop.validate_args(&PhaseArgs::reel(2)).is_ok());

        assert_eq!(
            Phase::ReevaluationSpecificReelStop.validate_args(&PhaseArgs::reel(0)),
            Err(PhaseError::MissingReevaluation(
                Phase::ReevaluationSpecificReelStop
            ))
        );
        assert!(Phase::ReevaluationSpecificReelStop
            .validate_args(&PhaseArgs::reel(0).in_reevaluation(1))
            .is_ok());
        assert!(Phase::PreSpin.validate_args(&PhaseArgs::none()).is_ok());
    }

    #[test]
    fn test_base_phase() {
        assert_eq!(
            Phase::ReevaluationReelsStoppedCallback.base_phase(),
            Phase::ReelsStoppedCallback
        );
        assert_eq!(Phase::SpecificReelStop.base_phase(), Phase::SpecificReelStop);
    }
}
