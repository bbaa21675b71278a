//! # rf-phase: ReelForge Spin Phase System
//!
//! Defines the lifecycle points presentation modules can hook into.
//! Modules never see engine callbacks or frame ticks, only PHASES.
//!
//! ## Philosophy
//!
//! Every spin passes through the same ordered phases:
//! - Spin starts → Reels stop one by one → Board settles → Reevaluations → Feature ends
//!
//! Each phase declares whether the spin driver must wait for the modules
//! that opted in (blocking) or may move on immediately (advisory).

pub mod args;
pub mod phase;
pub mod plan;

pub use args::*;
pub use phase::*;
pub use plan::*;
