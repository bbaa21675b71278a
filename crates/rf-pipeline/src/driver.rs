//! SpinDriver: walks one spin through its phases
//!
//! ```text
//! play_spin(outcome)
//!     cancel leftovers ─▶ reset slam-stop ─▶ begin spin (epoch++)
//!     PreSpin
//!     ingest stops + mutations      (malformed → diagnostics)
//!     PhasePlan::for_spin(...)      (wait for advisory tasks before each blocking phase)
//!         ReevaluationSpinStart(i) ─▶ ingest reevaluation i
//!     wait for remaining advisory tasks
//! ```

use rf_board::{BatchOrigin, BoardError, Grid, GridSnapshot, MutationBatch};
use rf_phase::{Phase, PhaseArgs, PhasePlan};
use rf_task::Scheduler;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::context::SpinContext;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::dispatcher::{HookDispatcher, PhaseOutcome};
use crate::error::PipelineResult;
use crate::module::ModuleRegistry;
use crate::modules;
use crate::outcome::SpinOutcome;
use crate::services::Services;
use crate::trace::PhaseRecord;

/// What one spin did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinReport {
    /// 1-based spin index
    pub spin_index: u64,
    pub started_ms: u64,
    pub finished_ms: u64,
    /// Phase dispatches of this spin, in order
    pub phases: Vec<PhaseRecord>,
    /// Diagnostics recorded during this spin
    pub diagnostics: Vec<Diagnostic>,
    /// Board after the spin
    pub grid: GridSnapshot,
    pub slam_stopped: bool,
}

impl SpinReport {
    pub fn elapsed_ms(&self) -> u64 {
        self.finished_ms.saturating_sub(self.started_ms)
    }

    pub fn phase_sequence(&self) -> Vec<Phase> {
        self.phases.iter().map(|record| record.phase).collect()
    }
}

/// Drives spins through the dispatcher
pub struct SpinDriver {
    dispatcher: HookDispatcher,
}

impl SpinDriver {
    pub fn new(
        config: PipelineConfig,
        registry: ModuleRegistry,
        services: Services,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let grid = Grid::new(config.grid.clone())?;
        let scheduler = Scheduler::with_config(config.scheduler.clone());
        let spin = SpinContext::new(grid, services, Diagnostics::new());

        log::info!(
            "Spin driver ready: {}x{} grid, {} module(s), {} timing",
            config.grid.reels,
            config.grid.rows,
            registry.len(),
            config.timing.display_name()
        );
        Ok(Self {
            dispatcher: HookDispatcher::new(registry, scheduler, spin, config),
        })
    }

    /// Driver with every built-in module the config enables
    pub fn with_builtins(config: PipelineConfig, services: Services) -> PipelineResult<Self> {
        let mut registry = ModuleRegistry::new();
        modules::register_builtins(&mut registry, &config)?;
        Self::new(config, registry, services)
    }

    pub fn dispatcher(&self) -> &HookDispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut HookDispatcher {
        &mut self.dispatcher
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.dispatcher.scheduler()
    }

    pub fn spin(&self) -> &SpinContext {
        self.dispatcher.spin()
    }

    pub fn config(&self) -> &PipelineConfig {
        self.dispatcher.config()
    }

    pub fn now_ms(&self) -> u64 {
        self.scheduler().now_ms()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SESSION PHASES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Dispatch `SlotGameStarted`
    pub fn start_game(&mut self) -> PipelineResult<PhaseOutcome> {
        self.run_step(Phase::SlotGameStarted, PhaseArgs::none())
    }

    /// Record the wager and dispatch `WagerChange`
    pub fn change_wager(&mut self, wager: f64) -> PipelineResult<PhaseOutcome> {
        self.spin().set_wager(wager);
        self.run_step(Phase::WagerChange, PhaseArgs::wager(wager))
    }

    /// Slam-stop the current spin now
    pub fn slam_stop(&self) {
        log::info!("Slam-stop at {}ms", self.now_ms());
        self.scheduler().slam_stop();
    }

    /// Slam-stop when the virtual clock reaches `at_ms`
    pub fn schedule_slam_stop(&self, at_ms: u64) {
        self.scheduler().schedule_slam_stop(at_ms);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SPIN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Present one spin from start to settled board
    pub fn play_spin(&mut self, outcome: &SpinOutcome) -> PipelineResult<SpinReport> {
        self.dispatcher.cancel_outstanding()?;
        self.scheduler().reset_cancellation();

        let started_ms = self.now_ms();
        let first_record = self.dispatcher.trace().len();
        let first_diagnostic = self.spin().diagnostics().len();

        self.spin().begin_spin();
        self.spin().set_flags(outcome.flags.clone());
        log::info!(
            "Spin {} at {}ms ({} reevaluation(s))",
            self.spin().spin_index(),
            started_ms,
            outcome.reevaluation_count()
        );

        self.run_step(Phase::PreSpin, PhaseArgs::none())?;
        self.ingest(BatchOrigin::Spin, outcome.stops.as_deref(), &outcome.mutations)?;

        let plan = PhasePlan::for_spin(
            &self.config().reel_order(),
            outcome.reevaluation_count(),
            outcome.flags.bonus_game_ended,
            outcome.flags.freespin_game_ended,
        );
        for step in plan.iter() {
            self.run_step(step.phase, step.args.clone())?;
            if step.phase == Phase::ReevaluationSpinStart {
                if let Some(index) = step.args.reevaluation {
                    if let Some(reevaluation) = outcome.reevaluations.get(index as usize) {
                        self.ingest(
                            BatchOrigin::Reevaluation(index),
                            reevaluation.stops.as_deref(),
                            &reevaluation.mutations,
                        )?;
                    }
                }
            }
        }
        self.dispatcher.wait_for_outstanding()?;

        let diagnostics = self.spin().diagnostics().all();
        let report = SpinReport {
            spin_index: self.spin().spin_index(),
            started_ms,
            finished_ms: self.now_ms(),
            phases: self
                .dispatcher
                .trace()
                .records
                .get(first_record..)
                .map(<[_]>::to_vec)
                .unwrap_or_default(),
            diagnostics: diagnostics.get(first_diagnostic..).map(<[_]>::to_vec).unwrap_or_default(),
            grid: self.spin().snapshot(),
            slam_stopped: self.scheduler().is_slam_stopped(),
        };
        log::info!(
            "Spin {} settled after {}ms with {} diagnostic(s)",
            report.spin_index,
            report.elapsed_ms(),
            report.diagnostics.len()
        );
        Ok(report)
    }

    /// Drop every unfinished task (end of session)
    pub fn shutdown(&mut self) {
        if let Err(err) = self.dispatcher.cancel_outstanding() {
            log::warn!("Outstanding tasks did not unwind: {}", err);
        }
        self.scheduler().shutdown();
    }

    fn run_step(&mut self, phase: Phase, args: PhaseArgs) -> PipelineResult<PhaseOutcome> {
        if self.config().execution_for(phase).is_blocking() {
            self.dispatcher.wait_for_outstanding()?;
        }
        self.dispatcher.run_phase(phase, args)
    }

    /// Land stops and parse the mutation batch for `origin`
    ///
    /// Malformed mutations (or a batch that is not a list at all) become
    /// diagnostics; a stops array of the wrong shape is fatal.
    fn ingest(
        &mut self,
        origin: BatchOrigin,
        stops: Option<&[Vec<String>]>,
        raw: &serde_json::Value,
    ) -> PipelineResult<()> {
        let spin = self.spin().clone();
        if let Some(stops) = stops {
            spin.with_grid_mut(|grid| grid.load_stops(stops))?;
        }

        let errors = match spin.with_mutations_mut(|m| m.ingest(origin, raw)) {
            Ok(errors) => errors,
            Err(err @ BoardError::MalformedBatch(_)) => {
                spin.with_mutations_mut(|m| m.set_batch(MutationBatch::new(origin)));
                vec![err]
            }
            Err(err) => return Err(err.into()),
        };

        let now_ms = self.now_ms();
        for err in &errors {
            spin.diagnostics().push(Diagnostic::new(
                DiagnosticKind::MalformedMutation,
                format!("{origin}: {err}"),
                now_ms,
            ));
        }

        let count = spin.with_mutations(|m| m.batch(origin).map_or(0, MutationBatch::len));
        log::debug!("Ingested {} mutation(s) for {} ({} malformed)", count, origin, errors.len());
        Ok(())
    }
}

impl Drop for SpinDriver {
    // Task futures hold scheduler handles; dropping them breaks the cycle
    fn drop(&mut self) {
        self.scheduler().shutdown();
    }
}
