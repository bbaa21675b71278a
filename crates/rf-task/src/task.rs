//! Task handles and the per-task state machine

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::task::Waker;

use serde::{Deserialize, Serialize};

use crate::error::{TaskError, TaskResult};

/// Unique task identifier (per scheduler)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Task execution state
///
/// `Pending → Running → (Completed | Cancelled | Faulted)`; terminal
/// states have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Spawned, not yet polled
    Pending,
    /// Polled at least once, not finished
    Running,
    /// Body returned `Ok`
    Completed,
    /// Cancelled before or during execution
    Cancelled,
    /// Body returned a fault or panicked
    Faulted,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Faulted)
    }

    fn can_transition_to(&self, next: TaskState) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending | Self::Running, n) => n.is_terminal(),
            _ => false,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Faulted => "Faulted",
        }
    }
}

struct TaskShared {
    id: TaskId,
    name: String,
    state: Cell<TaskState>,
    cancel_requested: Cell<bool>,
    fault: RefCell<Option<String>>,
    children: RefCell<Vec<Task>>,
    waiters: RefCell<Vec<Waker>>,
    waker: RefCell<Option<Waker>>,
    started_ms: Cell<Option<u64>>,
    finished_ms: Cell<Option<u64>>,
}

/// Handle to a scheduled task
///
/// Cheap to clone; all clones observe the same task. Inspecting a handle
/// never blocks.
#[derive(Clone)]
pub struct Task {
    shared: Rc<TaskShared>,
}

impl Task {
    pub(crate) fn new(id: TaskId, name: String) -> Self {
        Self {
            shared: Rc::new(TaskShared {
                id,
                name,
                state: Cell::new(TaskState::Pending),
                cancel_requested: Cell::new(false),
                fault: RefCell::new(None),
                children: RefCell::new(Vec::new()),
                waiters: RefCell::new(Vec::new()),
                waker: RefCell::new(None),
                started_ms: Cell::new(None),
                finished_ms: Cell::new(None),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> TaskState {
        self.shared.state.get()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Still pending or running
    pub fn is_running(&self) -> bool {
        !self.is_terminal()
    }

    /// Fault message, if the task faulted
    pub fn fault(&self) -> Option<String> {
        self.shared.fault.borrow().clone()
    }

    /// Has cancellation been requested for this task (directly or via a parent)?
    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel_requested.get()
    }

    /// Virtual time of the first poll
    pub fn started_ms(&self) -> Option<u64> {
        self.shared.started_ms.get()
    }

    /// Virtual time the task reached a terminal state
    pub fn finished_ms(&self) -> Option<u64> {
        self.shared.finished_ms.get()
    }

    /// Snapshot of the child handles
    pub fn children(&self) -> Vec<Task> {
        self.shared.children.borrow().clone()
    }

    /// Request cooperative cancellation of this task and its whole subtree
    ///
    /// Propagates top-down immediately. The task observes the request at its
    /// next suspension point; a task that was never polled ends `Cancelled`
    /// without running.
    pub fn cancel(&self) {
        if self.is_terminal() {
            return;
        }
        if !self.shared.cancel_requested.replace(true) {
            log::debug!("Cancel requested for task {} '{}'", self.id(), self.name());
        }
        self.wake();
        for child in self.children() {
            child.cancel();
        }
    }

    /// Do both handles refer to the same task?
    pub fn ptr_eq(&self, other: &Task) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn set_waker(&self, waker: Waker) {
        *self.shared.waker.borrow_mut() = Some(waker);
    }

    pub(crate) fn waker(&self) -> Option<Waker> {
        self.shared.waker.borrow().clone()
    }

    pub(crate) fn wake(&self) {
        if let Some(waker) = self.shared.waker.borrow().as_ref() {
            waker.wake_by_ref();
        }
    }

    /// Register a waker to be woken when this task becomes terminal
    pub(crate) fn add_waiter(&self, waker: &Waker) {
        let mut waiters = self.shared.waiters.borrow_mut();
        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
    }

    pub(crate) fn adopt(&self, child: Task) {
        if self.is_cancel_requested() {
            child.cancel();
        }
        self.shared.children.borrow_mut().push(child);
    }

    pub(crate) fn children_terminal(&self) -> bool {
        self.shared.children.borrow().iter().all(Task::is_terminal)
    }

    pub(crate) fn mark_running(&self, now_ms: u64) -> bool {
        if self.transition(TaskState::Running) {
            self.shared.started_ms.set(Some(now_ms));
            true
        } else {
            false
        }
    }

    /// Move to the terminal state matching `result` and wake waiters
    pub(crate) fn finish(&self, result: TaskResult, now_ms: u64) {
        let next = match &result {
            Ok(()) => TaskState::Completed,
            Err(TaskError::Cancelled) => TaskState::Cancelled,
            Err(TaskError::Fault(message)) => {
                *self.shared.fault.borrow_mut() = Some(message.clone());
                TaskState::Faulted
            }
        };
        if !self.transition(next) {
            return;
        }
        self.shared.finished_ms.set(Some(now_ms));

        let waiters: Vec<Waker> = self.shared.waiters.borrow_mut().drain(..).collect();
        for waker in waiters {
            waker.wake();
        }
        // Drop our own waker so the ready queue cannot resurrect this id
        self.shared.waker.borrow_mut().take();
    }

    fn transition(&self, next: TaskState) -> bool {
        let current = self.state();
        if current.can_transition_to(next) {
            self.shared.state.set(next);
            log::debug!(
                "Task {} '{}': {} -> {}",
                self.id(),
                self.name(),
                current.display_name(),
                next.display_name()
            );
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .field("cancel_requested", &self.is_cancel_requested())
            .finish()
    }
}
