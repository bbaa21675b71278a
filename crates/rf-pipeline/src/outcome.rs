//! Spin outcome: the read-only input a spin is presented from

use serde::{Deserialize, Serialize};

/// Feature flags carried by an outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeFlags {
    /// A bonus game finished with this spin
    pub bonus_game_ended: bool,
    /// The last free spin of a free-spin game finished with this spin
    pub freespin_game_ended: bool,
    /// This spin is played inside a free-spin game
    pub in_free_spins: bool,
    /// A jackpot was hit
    pub jackpot: bool,
}

/// A respin outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReevaluationOutcome {
    /// Landed symbols `[reel][position]`; locked reels are ignored
    pub stops: Option<Vec<Vec<String>>>,
    /// Raw mutation batch (array or `{"mutations": [...]}`)
    pub mutations: serde_json::Value,
}

/// One spin as received from the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinOutcome {
    /// Landed symbols `[reel][position]`
    pub stops: Option<Vec<Vec<String>>>,
    /// Raw mutation batch (array or `{"mutations": [...]}`)
    pub mutations: serde_json::Value,
    /// Respins triggered by this spin, in order
    pub reevaluations: Vec<ReevaluationOutcome>,
    pub flags: OutcomeFlags,
}

impl SpinOutcome {
    /// Outcome with only a mutation batch
    pub fn with_mutations(mutations: serde_json::Value) -> Self {
        Self {
            mutations,
            ..Default::default()
        }
    }

    /// Builder: set landed stops
    pub fn with_stops(mut self, stops: Vec<Vec<String>>) -> Self {
        self.stops = Some(stops);
        self
    }

    /// Builder: append a reevaluation
    pub fn with_reevaluation(mut self, reevaluation: ReevaluationOutcome) -> Self {
        self.reevaluations.push(reevaluation);
        self
    }

    /// Builder: set flags
    pub fn with_flags(mut self, flags: OutcomeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn reevaluation_count(&self) -> u32 {
        self.reevaluations.len() as u32
    }
}
