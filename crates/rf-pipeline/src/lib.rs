//! # rf-pipeline: ReelForge Presentation Pipeline
//!
//! Lets independently written presentation modules hook into the phases of
//! a spin without knowing about each other.
//!
//! ## Architecture
//!
//! ```text
//! SpinOutcome ──▶ SpinDriver ──phase, args──▶ HookDispatcher ──wants?──▶ PresentationModule
//!                     │                            │                           │ run
//!                     │ ingest                     │ spawn / wait              ▼
//!                     ▼                            ▼                      ModuleTask
//!               SpinContext ◀──── grid, mutations, meters, slots ──── ModuleContext
//!                                                  │
//!                                            rf_task::Scheduler (virtual clock)
//! ```
//!
//! ## Error policy
//!
//! Malformed mutations, missing animation targets and module faults are
//! recovered where they happen and reported as [`Diagnostic`]s. Only a
//! blocking phase that can never finish ([`PipelineError::PhaseStalled`]) or
//! an exhausted poll budget stops the pipeline.

mod apply;
mod config;
mod context;
mod diagnostics;
mod dispatcher;
mod driver;
mod error;
pub mod module;
pub mod modules;
mod outcome;
mod services;
mod timing;
mod trace;

pub use apply::*;
pub use config::*;
pub use context::*;
pub use diagnostics::*;
pub use dispatcher::*;
pub use driver::*;
pub use error::*;
pub use module::{
    BoxedModule, ModuleCategory, ModuleId, ModuleInfo, ModuleRegistry, ModuleTask,
    PresentationModule, RegistryError,
};
pub use outcome::*;
pub use services::*;
pub use timing::*;
pub use trace::*;
