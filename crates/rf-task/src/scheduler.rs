//! Scheduler: single-threaded cooperative executor on a virtual clock

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use futures_util::future::{FutureExt, LocalBoxFuture};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::context::TaskContext;
use crate::error::{SchedulerError, SchedulerResult, TaskError, TaskResult};
use crate::signal::{CancellationSignal, Completion};
use crate::task::{Task, TaskId, TaskState};

/// Scheduler limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum polls per run call before the run is aborted
    ///
    /// Guards against a task that keeps waking itself without ever
    /// reaching a suspension point that waits on time or another task.
    pub max_polls: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_polls: 1_000_000 }
    }
}

/// Statistics for one run call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Task polls performed
    pub polls: u64,
    /// Times the virtual clock jumped to a timer deadline
    pub timer_advances: u64,
    /// Virtual time when the run started (ms)
    pub start_ms: u64,
    /// Virtual time when the run ended (ms)
    pub end_ms: u64,
}

impl RunReport {
    pub fn elapsed_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

type ReadyQueue = Arc<Mutex<VecDeque<TaskId>>>;

struct TaskWaker {
    id: TaskId,
    ready: ReadyQueue,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let mut ready = self.ready.lock();
        if !ready.contains(&self.id) {
            ready.push_back(self.id);
        }
    }
}

enum TimerAction {
    Wake(Waker),
    Complete(Completion),
    SlamStop,
}

struct Core {
    config: SchedulerConfig,
    now_ms: Cell<u64>,
    next_task: Cell<u64>,
    next_timer: Cell<u64>,
    live: RefCell<BTreeMap<TaskId, Task>>,
    futures: RefCell<HashMap<TaskId, LocalBoxFuture<'static, TaskResult>>>,
    ready: ReadyQueue,
    timers: RefCell<BTreeMap<(u64, u64), TimerAction>>,
    cancellation: CancellationSignal,
    slam_observed: Cell<bool>,
}

/// Cooperative scheduler
///
/// Cheap to clone; clones drive the same task set. Not `Send`: the whole
/// pipeline lives on one logical thread and tasks interleave only at
/// suspension points.
///
/// Task bodies keep a handle to the scheduler, so call [`Scheduler::shutdown`]
/// when discarding a scheduler that may still hold unfinished tasks.
#[derive(Clone)]
pub struct Scheduler {
    core: Rc<Core>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a scheduler at virtual time 0
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            core: Rc::new(Core {
                config,
                now_ms: Cell::new(0),
                next_task: Cell::new(1),
                next_timer: Cell::new(0),
                live: RefCell::new(BTreeMap::new()),
                futures: RefCell::new(HashMap::new()),
                ready: Arc::new(Mutex::new(VecDeque::new())),
                timers: RefCell::new(BTreeMap::new()),
                cancellation: CancellationSignal::new(),
                slam_observed: Cell::new(false),
            }),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CLOCK & CANCELLATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Current virtual time (ms)
    pub fn now_ms(&self) -> u64 {
        self.core.now_ms.get()
    }

    /// The per-spin slam-stop signal
    pub fn cancellation(&self) -> CancellationSignal {
        self.core.cancellation.clone()
    }

    pub fn is_slam_stopped(&self) -> bool {
        self.core.cancellation.is_triggered()
    }

    /// Trigger slam-stop and wake every live task so it can unwind
    pub fn slam_stop(&self) {
        self.core.cancellation.trigger();
        self.observe_slam();
    }

    /// Trigger slam-stop when the clock reaches `at_ms`
    ///
    /// Stand-in for a player input arriving mid-spin.
    pub fn schedule_slam_stop(&self, at_ms: u64) {
        if at_ms <= self.now_ms() {
            self.slam_stop();
        } else {
            self.insert_timer(at_ms, TimerAction::SlamStop);
        }
    }

    /// Clear slam-stop for the next spin
    pub fn reset_cancellation(&self) {
        self.core.cancellation.reset();
        self.core.slam_observed.set(false);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SPAWNING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Start a task
    ///
    /// `body` is called immediately with the task's context; the returned
    /// future is first polled on the next run call. Statements execute in
    /// issue order up to the first suspension point.
    ///
    /// A task whose body returns while children are still running stays
    /// `Running` until every child is terminal.
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, body: F) -> Task
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = TaskResult> + 'static,
    {
        let id = TaskId(self.core.next_task.get());
        self.core.next_task.set(id.0 + 1);

        let task = Task::new(id, name.into());
        let waker = Waker::from(Arc::new(TaskWaker {
            id,
            ready: Arc::clone(&self.core.ready),
        }));
        task.set_waker(waker.clone());

        let body = body(TaskContext::new(self.clone(), task.clone()));
        let handle = task.clone();
        let wrapped = async move {
            let result = body.await;
            if result.is_err() {
                for child in handle.children() {
                    child.cancel();
                }
            }
            ChildrenSettled { task: handle }.await;
            result
        };

        self.core.futures.borrow_mut().insert(id, wrapped.boxed_local());
        self.core.live.borrow_mut().insert(id, task.clone());
        waker.wake();

        log::debug!("Spawned task {} '{}'", id, task.name());
        task
    }

    /// A task that completes once every given task is terminal
    ///
    /// Children that fault do not fault the join; inspect each child's
    /// state when that matters. Cancelling the join cancels the tasks.
    pub fn join_all(&self, name: impl Into<String>, tasks: Vec<Task>) -> Task {
        let members = tasks.clone();
        let joiner = self.spawn(name, move |cx| async move {
            cx.join_all(&members).await?;
            Ok(())
        });
        for task in tasks {
            joiner.adopt(task);
        }
        joiner
    }

    /// A completion signal that fires after `delay_ms` of virtual time
    ///
    /// Stand-in for an animation/sound of known length.
    pub fn completion_after(&self, delay_ms: u64) -> Completion {
        let completion = Completion::new();
        if delay_ms == 0 {
            completion.complete();
        } else {
            self.insert_timer(
                self.now_ms() + delay_ms,
                TimerAction::Complete(completion.clone()),
            );
        }
        completion
    }

    pub(crate) fn register_timer(&self, deadline_ms: u64, waker: &Waker) {
        self.insert_timer(deadline_ms, TimerAction::Wake(waker.clone()));
    }

    fn insert_timer(&self, deadline_ms: u64, action: TimerAction) {
        let seq = self.core.next_timer.get();
        self.core.next_timer.set(seq + 1);
        self.core.timers.borrow_mut().insert((deadline_ms, seq), action);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INSPECTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Number of non-terminal tasks
    pub fn live_count(&self) -> usize {
        self.core.live.borrow().len()
    }

    /// Handles of all non-terminal tasks, in spawn order
    pub fn live_tasks(&self) -> Vec<Task> {
        self.core.live.borrow().values().cloned().collect()
    }

    pub fn pending_timers(&self) -> usize {
        self.core.timers.borrow().len()
    }

    /// Earliest timer deadline, if any
    pub fn next_deadline(&self) -> Option<u64> {
        self.core.timers.borrow().keys().next().map(|(deadline, _)| *deadline)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RUNNING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Poll runnable tasks until none is runnable; the clock does not move
    pub fn run_until_idle(&self) -> SchedulerResult<u64> {
        let mut polls = 0;
        loop {
            self.observe_slam();
            let next = self.core.ready.lock().pop_front();
            let Some(id) = next else {
                break;
            };
            self.poll_task(id);
            polls += 1;
            if polls >= self.core.config.max_polls {
                return Err(SchedulerError::PollBudgetExhausted {
                    budget: self.core.config.max_polls,
                    now_ms: self.now_ms(),
                });
            }
        }
        Ok(polls)
    }

    /// Advance the clock by `delta_ms`, firing timers in deadline order
    ///
    /// For an outer frame loop. Never stalls: if nothing is due the clock
    /// simply moves.
    pub fn tick(&self, delta_ms: u64) -> SchedulerResult<RunReport> {
        let start_ms = self.now_ms();
        let target = start_ms + delta_ms;
        let mut report = RunReport {
            start_ms,
            ..Default::default()
        };

        report.polls += self.run_until_idle()?;
        while let Some(deadline) = self.next_deadline() {
            if deadline > target {
                break;
            }
            if deadline > self.now_ms() {
                self.core.now_ms.set(deadline);
                report.timer_advances += 1;
            }
            self.fire_due_timers();
            report.polls += self.run_until_idle()?;
        }
        self.core.now_ms.set(target);
        report.end_ms = target;
        Ok(report)
    }

    /// Jump the clock to the earliest timer and fire everything due
    ///
    /// Returns `false` when there is no timer.
    pub fn advance_to_next_timer(&self) -> bool {
        let Some(deadline) = self.next_deadline() else {
            return false;
        };
        if deadline > self.now_ms() {
            self.core.now_ms.set(deadline);
        }
        self.fire_due_timers() > 0
    }

    /// Run until `done` holds, auto-advancing virtual time
    ///
    /// Loop: run until idle → check `done` → jump to next timer. Fails with
    /// `Stalled` when `done` is false, nothing is runnable and no timer is
    /// pending (a task waits on an external signal nobody will complete).
    pub fn run_until<F>(&self, mut done: F) -> SchedulerResult<RunReport>
    where
        F: FnMut() -> bool,
    {
        let start_ms = self.now_ms();
        let mut report = RunReport {
            start_ms,
            ..Default::default()
        };

        loop {
            report.polls += self.run_until_idle()?;
            if done() {
                break;
            }
            if report.polls >= self.core.config.max_polls {
                return Err(SchedulerError::PollBudgetExhausted {
                    budget: self.core.config.max_polls,
                    now_ms: self.now_ms(),
                });
            }
            if !self.advance_to_next_timer() {
                return Err(SchedulerError::Stalled {
                    now_ms: self.now_ms(),
                    waiting: self.live_count(),
                });
            }
            report.timer_advances += 1;
        }

        report.end_ms = self.now_ms();
        Ok(report)
    }

    /// Run until every given task is terminal
    pub fn run_until_terminal(&self, tasks: &[Task]) -> SchedulerResult<RunReport> {
        self.run_until(|| tasks.iter().all(Task::is_terminal))
    }

    /// Run until no task is live
    pub fn run_to_quiescence(&self) -> SchedulerResult<RunReport> {
        self.run_until(|| self.live_count() == 0)
    }

    /// Request cancellation of every live task
    pub fn cancel_all(&self) {
        for task in self.live_tasks() {
            task.cancel();
        }
    }

    /// Drop every unfinished task without polling it again
    ///
    /// Live tasks end `Cancelled`; pending timers are discarded.
    pub fn shutdown(&self) {
        let tasks = self.live_tasks();
        let futures: Vec<_> = self.core.futures.borrow_mut().drain().collect();
        drop(futures);
        for task in &tasks {
            task.finish(Err(TaskError::Cancelled), self.now_ms());
        }
        self.core.live.borrow_mut().clear();
        self.core.timers.borrow_mut().clear();
        self.core.ready.lock().clear();
        if !tasks.is_empty() {
            log::debug!("Scheduler shut down with {} live task(s)", tasks.len());
        }
    }

    fn observe_slam(&self) {
        if self.core.cancellation.is_triggered() && !self.core.slam_observed.replace(true) {
            let tasks = self.live_tasks();
            log::info!("Slam-stop: waking {} live task(s)", tasks.len());
            for task in tasks {
                task.wake();
            }
        }
    }

    fn fire_due_timers(&self) -> usize {
        let now = self.now_ms();
        let mut due = Vec::new();
        {
            let mut timers = self.core.timers.borrow_mut();
            while let Some(entry) = timers.first_entry() {
                if entry.key().0 > now {
                    break;
                }
                due.push(entry.remove());
            }
        }
        for action in &due {
            match action {
                TimerAction::Wake(waker) => waker.wake_by_ref(),
                TimerAction::Complete(completion) => completion.complete(),
                TimerAction::SlamStop => self.slam_stop(),
            }
        }
        due.len()
    }

    fn poll_task(&self, id: TaskId) {
        let task = match self.core.live.borrow().get(&id) {
            Some(task) => task.clone(),
            None => return,
        };

        if task.state() == TaskState::Pending {
            if task.is_cancel_requested() {
                self.retire(&task, Err(TaskError::Cancelled));
                return;
            }
            task.mark_running(self.now_ms());
        }

        let Some(mut future) = self.core.futures.borrow_mut().remove(&id) else {
            return;
        };
        let Some(waker) = task.waker() else {
            return;
        };
        let mut cx = Context::from_waker(&waker);

        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
            Ok(Poll::Pending) => {
                self.core.futures.borrow_mut().insert(id, future);
            }
            Ok(Poll::Ready(result)) => {
                drop(future);
                self.retire(&task, result);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::warn!("Task {} '{}' panicked: {}", id, task.name(), message);
                drop(future);
                for child in task.children() {
                    child.cancel();
                }
                self.retire(&task, Err(TaskError::Fault(format!("panicked: {message}"))));
            }
        }
    }

    fn retire(&self, task: &Task, result: TaskResult) {
        if let Err(TaskError::Fault(message)) = &result {
            log::debug!("Task {} '{}' faulted: {}", task.id(), task.name(), message);
        }
        task.finish(result, self.now_ms());
        let removed = self.core.futures.borrow_mut().remove(&task.id());
        drop(removed);
        self.core.live.borrow_mut().remove(&task.id());
    }
}

/// Resolves once every child of `task` is terminal
struct ChildrenSettled {
    task: Task,
}

impl Future for ChildrenSettled {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.task.children_terminal() {
            return Poll::Ready(());
        }
        for child in self.task.children() {
            if !child.is_terminal() {
                child.add_waiter(cx.waker());
            }
        }
        Poll::Pending
    }
}

/// Text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
