//! HookDispatcher: runs the modules that opted into a phase
//!
//! ```text
//! run_phase(phase, args)
//!     │
//!     ├── listeners = modules whose phases() contain `phase` (dispatch order)
//!     ├── wants()  → false / panic  → skipped (panic → PredicateFault)
//!     ├── run()    → task body      → spawned on the scheduler
//!     │
//!     ├── Sequential  one task at a time, each driven to a terminal state
//!     ├── Concurrent  all spawned, then driven until all are terminal
//!     └── Advisory    spawned, polled once, left outstanding
//! ```
//!
//! A faulted task is reported as a `ModuleFault` diagnostic and the phase
//! continues. Only a blocking phase that cannot finish is an error.

use std::panic::{self, AssertUnwindSafe};

use chrono::Utc;
use futures_util::FutureExt;
use rf_phase::{Phase, PhaseArgs, PhaseExecution};
use rf_task::{Scheduler, SchedulerError, Task, TaskError, TaskResult, TaskState, panic_message};

use crate::config::PipelineConfig;
use crate::context::{ModuleContext, SpinContext};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{PipelineError, PipelineResult};
use crate::module::{ModuleId, ModuleRegistry};
use crate::trace::{ModuleRunRecord, PhaseRecord, PhaseTrace};

/// Result of one phase dispatch
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub execution: PhaseExecution,
    /// Spawned tasks in dispatch order
    pub tasks: Vec<(ModuleId, Task)>,
    /// Listeners that did not run
    pub skipped: Vec<ModuleId>,
}

impl PhaseOutcome {
    pub fn state_of(&self, module: &str) -> Option<TaskState> {
        self.tasks
            .iter()
            .find(|(id, _)| id.as_str() == module)
            .map(|(_, task)| task.state())
    }

    pub fn faulted(&self) -> Vec<ModuleId> {
        self.tasks
            .iter()
            .filter(|(_, task)| task.state() == TaskState::Faulted)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn ran(&self) -> usize {
        self.tasks.len()
    }
}

/// Advisory task the driver has not waited for yet
struct Outstanding {
    phase: Phase,
    module: ModuleId,
    task: Task,
    trace_index: usize,
}

/// Dispatches phases to registered modules
pub struct HookDispatcher {
    registry: ModuleRegistry,
    scheduler: Scheduler,
    spin: SpinContext,
    config: PipelineConfig,
    outstanding: Vec<Outstanding>,
    trace: PhaseTrace,
}

impl HookDispatcher {
    pub fn new(
        registry: ModuleRegistry,
        scheduler: Scheduler,
        spin: SpinContext,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            scheduler,
            spin,
            config,
            outstanding: Vec::new(),
            trace: PhaseTrace::new(),
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn spin(&self) -> &SpinContext {
        &self.spin
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn trace(&self) -> &PhaseTrace {
        &self.trace
    }

    /// Remove and return the trace collected so far
    pub fn take_trace(&mut self) -> PhaseTrace {
        std::mem::take(&mut self.trace)
    }

    /// Advisory tasks not yet terminal
    pub fn outstanding_count(&self) -> usize {
        self.outstanding
            .iter()
            .filter(|o| !o.task.is_terminal())
            .count()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DISPATCH
    // ═══════════════════════════════════════════════════════════════════════════

    /// Run every module that wants `phase`
    ///
    /// Blocking phases return once all spawned tasks are terminal; advisory
    /// phases return after one poll round.
    pub fn run_phase(&mut self, phase: Phase, args: PhaseArgs) -> PipelineResult<PhaseOutcome> {
        phase.validate_args(&args)?;
        self.reap_outstanding();

        let execution = self.config.execution_for(phase);
        let started_ms = self.scheduler.now_ms();
        let (selected, skipped) = self.select(phase, &args);

        log::debug!(
            "Phase {} ({}) at {}ms: {} module(s), {} skipped",
            phase,
            execution.display_name(),
            started_ms,
            selected.len(),
            skipped.len()
        );

        let mut tasks = Vec::with_capacity(selected.len());
        match execution {
            PhaseExecution::Sequential => {
                for index in selected {
                    let (id, task) = self.start(index, phase, &args);
                    self.scheduler
                        .run_until_terminal(std::slice::from_ref(&task))
                        .map_err(|e| stalled(phase, e))?;
                    tasks.push((id, task));
                }
            }
            PhaseExecution::Concurrent => {
                for index in selected {
                    tasks.push(self.start(index, phase, &args));
                }
                let handles: Vec<Task> = tasks.iter().map(|(_, task)| task.clone()).collect();
                self.scheduler
                    .run_until_terminal(&handles)
                    .map_err(|e| stalled(phase, e))?;
            }
            PhaseExecution::Advisory => {
                for index in selected {
                    tasks.push(self.start(index, phase, &args));
                }
                self.scheduler.run_until_idle()?;
            }
        }

        let trace_index = self.trace.push(PhaseRecord {
            phase,
            args,
            execution,
            started_ms,
            finished_ms: self.scheduler.now_ms(),
            modules: tasks
                .iter()
                .map(|(id, task)| ModuleRunRecord::from_task(id.clone(), task))
                .collect(),
            skipped: skipped.clone(),
            recorded_at: Utc::now(),
        });

        for (id, task) in &tasks {
            if task.is_terminal() {
                self.report_fault(phase, id, task);
            } else {
                self.outstanding.push(Outstanding {
                    phase,
                    module: id.clone(),
                    task: task.clone(),
                    trace_index,
                });
            }
        }

        Ok(PhaseOutcome {
            phase,
            execution,
            tasks,
            skipped,
        })
    }

    /// Drive every outstanding advisory task to a terminal state
    pub fn wait_for_outstanding(&mut self) -> PipelineResult<()> {
        let Some(first) = self.outstanding.first() else {
            return Ok(());
        };
        let phase = first.phase;
        let handles: Vec<Task> = self.outstanding.iter().map(|o| o.task.clone()).collect();
        self.scheduler
            .run_until_terminal(&handles)
            .map_err(|e| stalled(phase, e))?;
        self.reap_outstanding();
        Ok(())
    }

    /// Cancel every outstanding advisory task and let it unwind
    pub fn cancel_outstanding(&mut self) -> PipelineResult<()> {
        if self.outstanding.is_empty() {
            return Ok(());
        }
        log::debug!("Cancelling {} outstanding task(s)", self.outstanding.len());
        for outstanding in &self.outstanding {
            outstanding.task.cancel();
        }
        self.wait_for_outstanding()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNALS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Split listeners into those that want the dispatch and those skipped
    fn select(&self, phase: Phase, args: &PhaseArgs) -> (Vec<usize>, Vec<ModuleId>) {
        let mut selected = Vec::new();
        let mut skipped = Vec::new();

        for index in self.registry.listeners(phase) {
            let module = self.registry.module_at(index);
            let id = module.id();
            match panic::catch_unwind(AssertUnwindSafe(|| module.wants(phase, args, &self.spin))) {
                Ok(true) => selected.push(index),
                Ok(false) => skipped.push(id),
                Err(payload) => {
                    self.spin.diagnostics().push(
                        Diagnostic::new(
                            DiagnosticKind::PredicateFault,
                            panic_message(payload.as_ref()),
                            self.scheduler.now_ms(),
                        )
                        .in_phase(phase)
                        .from_module(id.clone()),
                    );
                    skipped.push(id);
                }
            }
        }
        (selected, skipped)
    }

    /// Spawn one module's task for this dispatch
    fn start(&mut self, index: usize, phase: Phase, args: &PhaseArgs) -> (ModuleId, Task) {
        let spin = self.spin.clone();
        let module = self.registry.module_at_mut(index);
        let id = module.id();
        let policy = self.config.delay_policy(id.as_str());
        let context_id = id.clone();

        let task = self
            .scheduler
            .spawn(format!("{}:{}", id, phase), move |task_cx| {
                let cx = ModuleContext::new(task_cx, spin, context_id, phase, args.clone(), policy);
                match panic::catch_unwind(AssertUnwindSafe(|| module.run(phase, args, cx))) {
                    Ok(body) => body,
                    Err(payload) => {
                        let fault: TaskResult = Err(TaskError::fault(format!(
                            "run panicked: {}",
                            panic_message(payload.as_ref())
                        )));
                        async move { fault }.boxed_local()
                    }
                }
            });
        (id, task)
    }

    /// Forget terminal outstanding tasks, reporting their faults
    fn reap_outstanding(&mut self) {
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.outstanding)
            .into_iter()
            .partition(|o| o.task.is_terminal());
        self.outstanding = pending;

        for outstanding in done {
            self.trace
                .update(outstanding.trace_index, &outstanding.module, &outstanding.task);
            self.report_fault(outstanding.phase, &outstanding.module, &outstanding.task);
        }
    }

    fn report_fault(&self, phase: Phase, module: &ModuleId, task: &Task) {
        if let Some(fault) = task.fault() {
            self.spin.diagnostics().push(
                Diagnostic::new(
                    DiagnosticKind::ModuleFault,
                    fault,
                    task.finished_ms().unwrap_or_else(|| self.scheduler.now_ms()),
                )
                .in_phase(phase)
                .from_module(module.clone()),
            );
        }
    }
}

fn stalled(phase: Phase, err: SchedulerError) -> PipelineError {
    match err {
        SchedulerError::Stalled { now_ms, waiting } => PipelineError::PhaseStalled {
            phase,
            now_ms,
            waiting,
        },
        other => PipelineError::Scheduler(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SpinContext;
    use crate::diagnostics::Diagnostics;
    use crate::module::{ModuleCategory, ModuleTask, PresentationModule};
    use crate::services::Services;
    use rf_board::{Grid, GridSpec};
    use rf_task::Completion;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    #[derive(Clone, Copy)]
    enum Behavior {
        Wait(u64),
        Fault,
        PanicInRun,
        PanicInWants,
        Decline,
        Hang,
    }

    struct Scripted {
        id: &'static str,
        phases: Vec<Phase>,
        behavior: Behavior,
        log: Log,
    }

    impl PresentationModule for Scripted {
        fn id(&self) -> ModuleId {
            ModuleId::new(self.id)
        }
        fn name(&self) -> &str {
            self.id
        }
        fn category(&self) -> ModuleCategory {
            ModuleCategory::Other
        }
        fn phases(&self) -> Vec<Phase> {
            self.phases.clone()
        }
        fn wants(&self, _: Phase, _: &PhaseArgs, _: &SpinContext) -> bool {
            match self.behavior {
                Behavior::PanicInWants => panic!("predicate exploded"),
                Behavior::Decline => false,
                _ => true,
            }
        }
        fn run(&mut self, _: Phase, _: &PhaseArgs, cx: ModuleContext) -> ModuleTask {
            let id = self.id;
            let log = Rc::clone(&self.log);
            let behavior = self.behavior;
            if let Behavior::PanicInRun = behavior {
                panic!("run exploded");
            }
            async move {
                log.borrow_mut().push(format!("{id}:start@{}", cx.now_ms()));
                match behavior {
                    Behavior::Wait(ms) => cx.delay(ms).await?,
                    Behavior::Fault => return Err(TaskError::fault("boom")),
                    Behavior::Hang => {
                        let never = Completion::new();
                        cx.task().until(&never).await?;
                    }
                    _ => {}
                }
                log.borrow_mut().push(format!("{id}:end@{}", cx.now_ms()));
                Ok(())
            }
            .boxed_local()
        }
    }

    fn dispatcher(config: PipelineConfig, scripted: Vec<(&'static str, Vec<Phase>, Behavior)>) -> (HookDispatcher, Log) {
        let log: Log = Rc::default();
        let mut registry = ModuleRegistry::new();
        for (id, phases, behavior) in scripted {
            registry
                .register(Box::new(Scripted {
                    id,
                    phases,
                    behavior,
                    log: Rc::clone(&log),
                }))
                .unwrap();
        }
        let spin = SpinContext::new(
            Grid::new(GridSpec::new(5, 3)).unwrap(),
            Services::default(),
            Diagnostics::new(),
        );
        (
            HookDispatcher::new(registry, Scheduler::new(), spin, config),
            log,
        )
    }

    fn entries(log: &Log) -> Vec<String> {
        log.borrow().clone()
    }

    #[test]
    fn test_sequential_runs_one_after_another() {
        let phase = Phase::ReelsStoppedCallback;
        let (mut dispatcher, log) = dispatcher(
            PipelineConfig::default(),
            vec![
                ("a", vec![phase], Behavior::Wait(300)),
                ("b", vec![phase], Behavior::Wait(100)),
            ],
        );

        let outcome = dispatcher.run_phase(phase, PhaseArgs::none()).unwrap();
        assert_eq!(outcome.ran(), 2);
        assert_eq!(
            entries(&log),
            vec!["a:start@0", "a:end@300", "b:start@300", "b:end@400"]
        );
        assert_eq!(dispatcher.scheduler().now_ms(), 400);
    }

    #[test]
    fn test_concurrent_ends_with_slowest() {
        let phase = Phase::PreReelsStopSpinning;
        let (mut dispatcher, log) = dispatcher(
            PipelineConfig::default(),
            vec![
                ("a", vec![phase], Behavior::Wait(300)),
                ("b", vec![phase], Behavior::Wait(100)),
            ],
        );

        dispatcher.run_phase(phase, PhaseArgs::none()).unwrap();
        assert_eq!(
            entries(&log),
            vec!["a:start@0", "b:start@0", "b:end@100", "a:end@300"]
        );
        assert_eq!(dispatcher.scheduler().now_ms(), 300);
    }

    #[test]
    fn test_advisory_does_not_block() {
        let phase = Phase::SpecificReelStop;
        let (mut dispatcher, log) =
            dispatcher(PipelineConfig::default(), vec![("a", vec![phase], Behavior::Wait(250))]);

        let outcome = dispatcher.run_phase(phase, PhaseArgs::reel(2)).unwrap();
        assert_eq!(outcome.state_of("a"), Some(TaskState::Running));
        assert_eq!(dispatcher.scheduler().now_ms(), 0);
        assert_eq!(dispatcher.outstanding_count(), 1);

        dispatcher.wait_for_outstanding().unwrap();
        assert_eq!(entries(&log), vec!["a:start@0", "a:end@250"]);
        assert_eq!(dispatcher.outstanding_count(), 0);
        assert_eq!(
            dispatcher.trace().records[0].module_state("a"),
            Some(TaskState::Completed)
        );
    }

    #[test]
    fn test_only_listeners_are_asked() {
        let (mut dispatcher, log) = dispatcher(
            PipelineConfig::default(),
            vec![
                ("listener", vec![Phase::PreSpin], Behavior::Wait(0)),
                ("other", vec![Phase::BonusGameEnded], Behavior::Wait(0)),
                ("declines", vec![Phase::PreSpin], Behavior::Decline),
            ],
        );

        let outcome = dispatcher.run_phase(Phase::PreSpin, PhaseArgs::none()).unwrap();
        assert_eq!(outcome.ran(), 1);
        assert_eq!(outcome.skipped, vec![ModuleId::new("declines")]);
        assert_eq!(entries(&log), vec!["listener:start@0", "listener:end@0"]);
    }

    #[test]
    fn test_faults_are_isolated() {
        let phase = Phase::ReelsStoppedCallback;
        let (mut dispatcher, log) = dispatcher(
            PipelineConfig::default(),
            vec![
                ("faulty", vec![phase], Behavior::Fault),
                ("panics", vec![phase], Behavior::PanicInRun),
                ("predicate", vec![phase], Behavior::PanicInWants),
                ("healthy", vec![phase], Behavior::Wait(50)),
            ],
        );

        let outcome = dispatcher.run_phase(phase, PhaseArgs::none()).unwrap();
        assert_eq!(outcome.state_of("faulty"), Some(TaskState::Faulted));
        assert_eq!(outcome.state_of("panics"), Some(TaskState::Faulted));
        assert_eq!(outcome.state_of("healthy"), Some(TaskState::Completed));
        assert_eq!(outcome.skipped, vec![ModuleId::new("predicate")]);
        assert!(entries(&log).contains(&"healthy:end@50".to_string()));

        let diagnostics = dispatcher.spin().diagnostics();
        assert_eq!(diagnostics.of_kind(DiagnosticKind::ModuleFault).len(), 2);
        assert_eq!(diagnostics.of_kind(DiagnosticKind::PredicateFault).len(), 1);
    }

    #[test]
    fn test_blocking_stall_is_fatal() {
        let phase = Phase::ReelsStoppedCallback;
        let (mut dispatcher, _) =
            dispatcher(PipelineConfig::default(), vec![("hang", vec![phase], Behavior::Hang)]);

        let err = dispatcher.run_phase(phase, PhaseArgs::none()).unwrap_err();
        assert!(matches!(err, PipelineError::PhaseStalled { phase: p, .. } if p == phase));
    }

    #[test]
    fn test_missing_reel_argument() {
        let (mut dispatcher, _) = dispatcher(PipelineConfig::default(), vec![]);
        assert!(matches!(
            dispatcher.run_phase(Phase::SpecificReelStop, PhaseArgs::none()),
            Err(PipelineError::Phase(_))
        ));
    }

    #[test]
    fn test_cancel_outstanding() {
        let phase = Phase::WagerChange;
        let (mut dispatcher, log) =
            dispatcher(PipelineConfig::default(), vec![("a", vec![phase], Behavior::Wait(1000))]);

        dispatcher.run_phase(phase, PhaseArgs::wager(1.0)).unwrap();
        dispatcher.cancel_outstanding().unwrap();

        assert_eq!(dispatcher.outstanding_count(), 0);
        assert_eq!(entries(&log), vec!["a:start@0"]);
        assert_eq!(
            dispatcher.trace().records[0].module_state("a"),
            Some(TaskState::Cancelled)
        );
        assert!(dispatcher.spin().diagnostics().is_empty());
    }

    #[test]
    fn test_execution_override() {
        let phase = Phase::ReelsStoppedCallback;
        let config = PipelineConfig::default().with_phase_execution(phase, PhaseExecution::Concurrent);
        let (mut dispatcher, _) = dispatcher(
            config,
            vec![
                ("a", vec![phase], Behavior::Wait(200)),
                ("b", vec![phase], Behavior::Wait(200)),
            ],
        );

        let outcome = dispatcher.run_phase(phase, PhaseArgs::none()).unwrap();
        assert_eq!(outcome.execution, PhaseExecution::Concurrent);
        assert_eq!(dispatcher.scheduler().now_ms(), 200);
    }
}
