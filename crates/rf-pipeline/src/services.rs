//! Collaborators outside the pipeline: economy sink and effect playback
//!
//! The pipeline never computes payouts and never renders. It hands credit
//! amounts to a [`CreditSink`] and asks an [`EffectPlayer`] for an awaitable
//! [`Completion`] per effect.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rf_board::CellPos;
use rf_task::{Completion, Scheduler};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// ECONOMY
// ═══════════════════════════════════════════════════════════════════════════════

/// Receives credit amounts declared by the outcome
pub trait CreditSink {
    fn credit(&self, amount: f64, reason: &str);
}

/// One credit handed to the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditEntry {
    pub amount: f64,
    pub reason: String,
}

/// In-memory credit sink
#[derive(Debug, Default)]
pub struct CreditLedger {
    entries: RefCell<Vec<CreditEntry>>,
}

impl CreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<CreditEntry> {
        self.entries.borrow().clone()
    }

    pub fn total(&self) -> f64 {
        self.entries.borrow().iter().map(|entry| entry.amount).sum()
    }
}

impl CreditSink for CreditLedger {
    fn credit(&self, amount: f64, reason: &str) {
        log::info!("Credit {:.2} ({})", amount, reason);
        self.entries.borrow_mut().push(CreditEntry {
            amount,
            reason: reason.to_string(),
        });
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EFFECTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Request to play one effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectCue {
    /// Effect asset name
    pub name: String,
    /// Cell the effect plays on, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<CellPos>,
    /// Expected length (already profile-scaled)
    pub duration_ms: u64,
}

impl EffectCue {
    pub fn new(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            cell: None,
            duration_ms,
        }
    }

    /// Builder: play on a cell
    pub fn at(mut self, cell: CellPos) -> Self {
        self.cell = Some(cell);
        self
    }
}

/// Animation/sound playback, seen only as an awaitable completion
pub trait EffectPlayer {
    fn play(&self, scheduler: &Scheduler, cue: &EffectCue) -> Completion;
}

/// Effect player that completes each cue after its declared duration
///
/// Stands in for the renderer headlessly; per-name overrides model assets
/// whose real length differs from the module's expectation.
#[derive(Debug, Default)]
pub struct TimedEffectPlayer {
    overrides: HashMap<String, u64>,
    played: RefCell<Vec<EffectCue>>,
}

impl TimedEffectPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: fixed duration for one effect name
    pub fn with_duration(mut self, name: impl Into<String>, ms: u64) -> Self {
        self.overrides.insert(name.into(), ms);
        self
    }

    /// Every cue played so far
    pub fn played(&self) -> Vec<EffectCue> {
        self.played.borrow().clone()
    }
}

impl EffectPlayer for TimedEffectPlayer {
    fn play(&self, scheduler: &Scheduler, cue: &EffectCue) -> Completion {
        let duration = self
            .overrides
            .get(&cue.name)
            .copied()
            .unwrap_or(cue.duration_ms);
        log::debug!("Effect '{}' for {}ms", cue.name, duration);
        self.played.borrow_mut().push(cue.clone());
        scheduler.completion_after(duration)
    }
}

/// The collaborators a spin driver talks to
#[derive(Clone)]
pub struct Services {
    pub credits: Rc<dyn CreditSink>,
    pub effects: Rc<dyn EffectPlayer>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            credits: Rc::new(CreditLedger::new()),
            effects: Rc::new(TimedEffectPlayer::new()),
        }
    }
}

impl Services {
    /// Builder: set the credit sink
    pub fn with_credits(mut self, credits: Rc<dyn CreditSink>) -> Self {
        self.credits = credits;
        self
    }

    /// Builder: set the effect player
    pub fn with_effects(mut self, effects: Rc<dyn EffectPlayer>) -> Self {
        self.effects = effects;
        self
    }
}
