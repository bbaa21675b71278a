//! Shared spin state and the per-dispatch module context
//!
//! Everything here is single-threaded (`Rc` + `RefCell`). Access goes
//! through closures so a borrow can never be held across an `.await`.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use rf_board::{BatchOrigin, Grid, GridSnapshot, MeterBank, MutationManager};
use rf_phase::{Phase, PhaseArgs};
use rf_task::{Cancelled, Completion, Delay, Task, TaskContext, TaskResult};

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::module::ModuleId;
use crate::outcome::OutcomeFlags;
use crate::services::{CreditSink, EffectCue, EffectPlayer, Services};
use crate::timing::DelayPolicy;

struct SpinState {
    grid: RefCell<Grid>,
    mutations: RefCell<MutationManager>,
    meters: RefCell<MeterBank>,
    flags: RefCell<OutcomeFlags>,
    slots: RefCell<HashMap<TypeId, Box<dyn Any>>>,
    services: Services,
    diagnostics: Diagnostics,
    spin_index: Cell<u64>,
    wager: Cell<f64>,
}

/// State shared by every module of one game session
///
/// Grid, mutation manager and meters are the canonical board state. Typed
/// slots let modules publish values to each other without knowing each
/// other; they live for the whole session.
#[derive(Clone)]
pub struct SpinContext {
    inner: Rc<SpinState>,
}

impl SpinContext {
    pub fn new(grid: Grid, services: Services, diagnostics: Diagnostics) -> Self {
        Self {
            inner: Rc::new(SpinState {
                grid: RefCell::new(grid),
                mutations: RefCell::new(MutationManager::new()),
                meters: RefCell::new(MeterBank::new()),
                flags: RefCell::new(OutcomeFlags::default()),
                slots: RefCell::new(HashMap::new()),
                services,
                diagnostics,
                spin_index: Cell::new(0),
                wager: Cell::new(0.0),
            }),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BOARD
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn with_grid<R>(&self, f: impl FnOnce(&Grid) -> R) -> R {
        f(&self.inner.grid.borrow())
    }

    pub fn with_grid_mut<R>(&self, f: impl FnOnce(&mut Grid) -> R) -> R {
        f(&mut self.inner.grid.borrow_mut())
    }

    pub fn with_mutations<R>(&self, f: impl FnOnce(&MutationManager) -> R) -> R {
        f(&self.inner.mutations.borrow())
    }

    pub fn with_mutations_mut<R>(&self, f: impl FnOnce(&mut MutationManager) -> R) -> R {
        f(&mut self.inner.mutations.borrow_mut())
    }

    /// Grid and mutation manager together (for once-per-spin applies)
    pub fn with_board_mut<R>(&self, f: impl FnOnce(&mut Grid, &mut MutationManager) -> R) -> R {
        f(
            &mut self.inner.grid.borrow_mut(),
            &mut self.inner.mutations.borrow_mut(),
        )
    }

    pub fn with_meters_mut<R>(&self, f: impl FnOnce(&mut MeterBank) -> R) -> R {
        f(&mut self.inner.meters.borrow_mut())
    }

    pub fn meters(&self) -> MeterBank {
        self.inner.meters.borrow().clone()
    }

    pub fn snapshot(&self) -> GridSnapshot {
        self.inner.grid.borrow().snapshot()
    }

    pub fn flags(&self) -> OutcomeFlags {
        self.inner.flags.borrow().clone()
    }

    pub fn set_flags(&self, flags: OutcomeFlags) {
        *self.inner.flags.borrow_mut() = flags;
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SLOTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Publish a value under its type, replacing any previous one
    pub fn insert_slot<T: 'static>(&self, value: T) {
        self.inner
            .slots
            .borrow_mut()
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Mutate a published value; `None` when nothing of type `T` is published
    pub fn with_slot<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut slots = self.inner.slots.borrow_mut();
        slots
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
            .map(f)
    }

    /// Copy of a published value
    pub fn slot_value<T: Clone + 'static>(&self) -> Option<T> {
        self.inner
            .slots
            .borrow()
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn clear_slot<T: 'static>(&self) {
        self.inner.slots.borrow_mut().remove(&TypeId::of::<T>());
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SESSION
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn credits(&self) -> Rc<dyn CreditSink> {
        Rc::clone(&self.inner.services.credits)
    }

    pub fn effects(&self) -> Rc<dyn EffectPlayer> {
        Rc::clone(&self.inner.services.effects)
    }

    /// Hand a server-declared amount to the credit sink
    pub fn credit(&self, amount: f64, reason: &str) {
        self.inner.services.credits.credit(amount, reason);
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    /// 1-based index of the current spin; 0 before the first spin
    pub fn spin_index(&self) -> u64 {
        self.inner.spin_index.get()
    }

    pub fn wager(&self) -> f64 {
        self.inner.wager.get()
    }

    pub fn set_wager(&self, wager: f64) {
        self.inner.wager.set(wager);
    }

    /// Reset per-spin state
    ///
    /// Bumps the grid epoch (old symbol refs go stale), drops every batch
    /// and apply mark, and clears the outcome flags. Meters and slots survive.
    pub fn begin_spin(&self) {
        let index = self.inner.spin_index.get() + 1;
        self.inner.spin_index.set(index);
        self.inner.grid.borrow_mut().begin_spin();
        self.inner.mutations.borrow_mut().reset();
        *self.inner.flags.borrow_mut() = OutcomeFlags::default();
        log::debug!("Spin {} begins", index);
    }
}

impl std::fmt::Debug for SpinContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinContext")
            .field("spin_index", &self.spin_index())
            .field("wager", &self.wager())
            .finish()
    }
}

/// Batch a dispatch with these arguments reads from
pub fn batch_origin(args: &PhaseArgs) -> BatchOrigin {
    match args.reevaluation {
        Some(index) => BatchOrigin::Reevaluation(index),
        None => BatchOrigin::Spin,
    }
}

/// What a module's task body gets for one dispatch
#[derive(Clone, Debug)]
pub struct ModuleContext {
    task: TaskContext,
    spin: SpinContext,
    module: ModuleId,
    phase: Phase,
    args: PhaseArgs,
    timing: DelayPolicy,
}

impl ModuleContext {
    pub fn new(
        task: TaskContext,
        spin: SpinContext,
        module: ModuleId,
        phase: Phase,
        args: PhaseArgs,
        timing: DelayPolicy,
    ) -> Self {
        Self {
            task,
            spin,
            module,
            phase,
            args,
            timing,
        }
    }

    pub fn task(&self) -> &TaskContext {
        &self.task
    }

    pub fn spin(&self) -> &SpinContext {
        &self.spin
    }

    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn args(&self) -> &PhaseArgs {
        &self.args
    }

    pub fn timing(&self) -> &DelayPolicy {
        &self.timing
    }

    /// Batch the current dispatch reads from
    pub fn origin(&self) -> BatchOrigin {
        batch_origin(&self.args)
    }

    pub fn now_ms(&self) -> u64 {
        self.task.now_ms()
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        self.task.checkpoint()
    }

    /// Suspend for `ms` of (already scaled) virtual time
    pub fn delay(&self, ms: u64) -> Delay<'_> {
        self.task.delay(ms)
    }

    /// Start a child task owned by this dispatch
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, body: F) -> Task
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = TaskResult> + 'static,
    {
        self.task.spawn(name, body)
    }

    /// Start an effect without waiting for it
    pub fn play_effect(&self, cue: &EffectCue) -> Completion {
        self.spin.effects().play(self.task.scheduler(), cue)
    }

    /// Play an effect and wait for it to finish
    pub async fn play_effect_and_wait(&self, cue: &EffectCue) -> Result<(), Cancelled> {
        let completion = self.play_effect(cue);
        self.task.until(&completion).await
    }

    /// Record a recovered error against this module and phase
    pub fn diagnostic(&self, kind: DiagnosticKind, message: impl Into<String>) {
        self.spin.diagnostics().push(
            Diagnostic::new(kind, message, self.now_ms())
                .in_phase(self.phase)
                .from_module(self.module.clone()),
        );
    }
}
