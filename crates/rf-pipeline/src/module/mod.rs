//! Presentation modules: units that hook into spin phases
//!
//! A module declares which phases it listens to, decides per dispatch
//! whether it wants to act, and returns a task body that the dispatcher
//! schedules. Modules never call each other; they coordinate only through
//! the shared [`SpinContext`](crate::SpinContext).
//!
//! ```rust,ignore
//! impl PresentationModule for BannerModule {
//!     fn id(&self) -> ModuleId { ModuleId::new("banner") }
//!     fn name(&self) -> &str { "Banner" }
//!     fn category(&self) -> ModuleCategory { ModuleCategory::Other }
//!     fn phases(&self) -> Vec<Phase> { vec![Phase::ReelsStoppedCallback] }
//!     fn wants(&self, _: Phase, _: &PhaseArgs, _: &SpinContext) -> bool { true }
//!     fn run(&mut self, _: Phase, _: &PhaseArgs, cx: ModuleContext) -> ModuleTask {
//!         async move {
//!             cx.delay(500).await?;
//!             Ok(())
//!         }
//!         .boxed_local()
//!     }
//! }
//! ```

mod registry;

pub use registry::*;

use futures_util::future::LocalBoxFuture;
use rf_phase::{Phase, PhaseArgs};
use rf_task::TaskResult;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ModuleConfig};
use crate::context::{ModuleContext, SpinContext};

/// Unique module identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Module category for grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleCategory {
    /// Symbol transformations on the board
    Symbols,
    /// Reel holds and respin presentation
    Reels,
    /// Jackpot and progressive meters
    Jackpot,
    /// Free-spin bookkeeping and summaries
    FreeSpins,
    /// Other/custom modules
    Other,
}

impl ModuleCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Symbols => "Symbols",
            Self::Reels => "Reels",
            Self::Jackpot => "Jackpot",
            Self::FreeSpins => "Free Spins",
            Self::Other => "Other",
        }
    }
}

/// Module information for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub name: String,
    pub category: ModuleCategory,
    pub description: String,
    pub phases: Vec<Phase>,
}

/// Task body returned by [`PresentationModule::run`]
pub type ModuleTask = LocalBoxFuture<'static, TaskResult>;

/// The interface every presentation module implements
pub trait PresentationModule {
    // ═══════════════════════════════════════════════════════════════════════════
    // IDENTITY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Unique module identifier
    fn id(&self) -> ModuleId;

    /// Human-readable name
    fn name(&self) -> &str;

    fn category(&self) -> ModuleCategory;

    fn description(&self) -> &str {
        ""
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIGURATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Configure from the module's entry in the pipeline config
    fn configure(&mut self, config: &ModuleConfig) -> Result<(), ConfigError> {
        let _ = config;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DISPATCH
    // ═══════════════════════════════════════════════════════════════════════════

    /// Phases this module listens to; other phases never reach it
    fn phases(&self) -> Vec<Phase>;

    /// Does the module want to act on this dispatch?
    ///
    /// Must be synchronous and cheap. Read shared state here, never write it.
    fn wants(&self, phase: Phase, args: &PhaseArgs, spin: &SpinContext) -> bool;

    /// Build the task body for this dispatch
    ///
    /// Called only after `wants` returned `true`. Anything the body needs
    /// from `self` has to be copied in; the future must not borrow the module.
    fn run(&mut self, phase: Phase, args: &PhaseArgs, cx: ModuleContext) -> ModuleTask;

    // ═══════════════════════════════════════════════════════════════════════════
    // INTROSPECTION
    // ═══════════════════════════════════════════════════════════════════════════

    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: self.id(),
            name: self.name().to_string(),
            category: self.category(),
            description: self.description().to_string(),
            phases: self.phases(),
        }
    }
}

/// Boxed module for dynamic dispatch
pub type BoxedModule = Box<dyn PresentationModule + 'static>;
