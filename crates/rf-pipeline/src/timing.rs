//! Delay policy: timing profiles and per-module staggering
//!
//! Modules never know about each other; they line up visually because each
//! one takes its delays from the same profile-scaled policy.

use std::collections::BTreeMap;

use rf_board::{CellDirection, MutationEntry, ReelDirection};
use serde::{Deserialize, Serialize};

/// Global pacing profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingProfile {
    /// Normal gameplay timing
    #[default]
    Normal,
    /// Fast/Turbo mode
    Turbo,
    /// Every delay collapses to zero (tests, instant replay)
    Instant,
}

impl TimingProfile {
    /// Multiplier applied to every configured delay
    pub fn speed_factor(&self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Turbo => 0.4,
            Self::Instant => 0.0,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Turbo => "Turbo",
            Self::Instant => "Instant",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "turbo" => Some(Self::Turbo),
            "instant" => Some(Self::Instant),
            _ => None,
        }
    }
}

/// Per-module timing (unscaled, ms)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleTiming {
    /// Wait before the module's first visual step
    pub start_delay_ms: u64,

    /// Extra wait between consecutive reels
    pub reel_stagger_ms: u64,

    /// Wait between cells of one multi-cell change
    pub cell_step_ms: u64,

    /// Length of the module's effect animation
    pub effect_ms: u64,

    /// Order in which reels are visited
    pub reel_direction: ReelDirection,

    /// Default order of cells within a reel
    pub cell_direction: CellDirection,

    /// Per-reel cell order overrides
    pub reel_cell_directions: BTreeMap<usize, CellDirection>,
}

impl Default for ModuleTiming {
    fn default() -> Self {
        Self {
            start_delay_ms: 0,
            reel_stagger_ms: 150,
            cell_step_ms: 100,
            effect_ms: 600,
            reel_direction: ReelDirection::LeftToRight,
            cell_direction: CellDirection::Declared,
            reel_cell_directions: BTreeMap::new(),
        }
    }
}

impl ModuleTiming {
    /// All delays zero
    pub fn immediate() -> Self {
        Self {
            reel_stagger_ms: 0,
            cell_step_ms: 0,
            effect_ms: 0,
            ..Default::default()
        }
    }

    /// Builder: set start delay
    pub fn with_start_delay(mut self, ms: u64) -> Self {
        self.start_delay_ms = ms;
        self
    }

    /// Builder: set reel stagger
    pub fn with_reel_stagger(mut self, ms: u64) -> Self {
        self.reel_stagger_ms = ms;
        self
    }

    /// Builder: set cell step
    pub fn with_cell_step(mut self, ms: u64) -> Self {
        self.cell_step_ms = ms;
        self
    }

    /// Builder: set effect length
    pub fn with_effect(mut self, ms: u64) -> Self {
        self.effect_ms = ms;
        self
    }

    /// Builder: set reel direction
    pub fn with_reel_direction(mut self, direction: ReelDirection) -> Self {
        self.reel_direction = direction;
        self
    }

    /// Builder: override the cell order of one reel
    pub fn with_reel_cell_direction(mut self, reel: usize, direction: CellDirection) -> Self {
        self.reel_cell_directions.insert(reel, direction);
        self
    }
}

/// Profile-scaled delays for one module
#[derive(Debug, Clone, PartialEq)]
pub struct DelayPolicy {
    profile: TimingProfile,
    timing: ModuleTiming,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new(TimingProfile::Normal, ModuleTiming::default())
    }
}

impl DelayPolicy {
    pub fn new(profile: TimingProfile, timing: ModuleTiming) -> Self {
        Self { profile, timing }
    }

    pub fn profile(&self) -> TimingProfile {
        self.profile
    }

    pub fn timing(&self) -> &ModuleTiming {
        &self.timing
    }

    /// Apply the profile's speed factor
    pub fn scale(&self, ms: u64) -> u64 {
        (ms as f64 * self.profile.speed_factor()).round() as u64
    }

    pub fn start_delay(&self) -> u64 {
        self.scale(self.timing.start_delay_ms)
    }

    pub fn reel_stagger(&self) -> u64 {
        self.scale(self.timing.reel_stagger_ms)
    }

    pub fn cell_step(&self) -> u64 {
        self.scale(self.timing.cell_step_ms)
    }

    pub fn effect_duration(&self) -> u64 {
        self.scale(self.timing.effect_ms)
    }

    pub fn reel_direction(&self) -> ReelDirection {
        self.timing.reel_direction
    }

    pub fn cell_direction(&self, reel: usize) -> CellDirection {
        self.timing
            .reel_cell_directions
            .get(&reel)
            .copied()
            .unwrap_or(self.timing.cell_direction)
    }

    /// Order entries by reel in this policy's direction (stable)
    pub fn order_entries(&self, entries: &[MutationEntry]) -> Vec<MutationEntry> {
        let mut ordered = entries.to_vec();
        let direction = self.reel_direction();
        ordered.sort_by_key(|entry| match entry.mutation.primary_reel() {
            Some(reel) => (0, direction.sort_key(reel)),
            None => (1, 0),
        });
        ordered
    }
}
