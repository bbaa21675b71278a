//! TaskContext: what a running task can do
//!
//! Suspension points are futures borrowing the context. Each checks
//! cancellation before anything else and resolves to `Err(Cancelled)` if the
//! task (or the spin) was cancelled, so `?` unwinds the task body.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::{Cancelled, TaskResult};
use crate::scheduler::Scheduler;
use crate::signal::Completion;
use crate::task::{Task, TaskState};

/// Handle given to a task body
#[derive(Clone)]
pub struct TaskContext {
    scheduler: Scheduler,
    task: Task,
}

impl TaskContext {
    pub(crate) fn new(scheduler: Scheduler, task: Task) -> Self {
        Self { scheduler, task }
    }

    /// The task this context belongs to
    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn now_ms(&self) -> u64 {
        self.scheduler.now_ms()
    }

    /// Own cancel request or spin-wide slam-stop
    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancel_requested() || self.scheduler.is_slam_stopped()
    }

    /// Observe cancellation without suspending
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Start a child task
    ///
    /// Cancelling this task cancels the child; this task does not finish
    /// before the child is terminal.
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, body: F) -> Task
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = TaskResult> + 'static,
    {
        let child = self.scheduler.spawn(name, body);
        self.task.adopt(child.clone());
        child
    }

    /// Suspend for `ms` of virtual time
    pub fn delay(&self, ms: u64) -> Delay<'_> {
        Delay {
            cx: self,
            deadline_ms: self.now_ms().saturating_add(ms),
            registered: false,
        }
    }

    /// Suspend until `task` is terminal; resolves to its final state
    pub async fn wait(&self, task: &Task) -> Result<TaskState, Cancelled> {
        self.join_all(std::slice::from_ref(task)).await?;
        Ok(task.state())
    }

    /// Suspend until every task in `tasks` is terminal
    ///
    /// Resolves to the final states in input order. Faulted members do not
    /// fail the join.
    pub fn join_all<'a>(&'a self, tasks: &'a [Task]) -> JoinAll<'a> {
        JoinAll { cx: self, tasks }
    }

    /// Suspend until an external completion fires
    pub fn until<'a>(&'a self, completion: &'a Completion) -> Until<'a> {
        Until {
            cx: self,
            completion,
        }
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.task)
            .field("now_ms", &self.now_ms())
            .finish()
    }
}

/// Future returned by [`TaskContext::delay`]
#[must_use = "futures do nothing unless awaited"]
pub struct Delay<'a> {
    cx: &'a TaskContext,
    deadline_ms: u64,
    registered: bool,
}

impl Future for Delay<'_> {
    type Output = Result<(), Cancelled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.cx.is_cancelled() {
            return Poll::Ready(Err(Cancelled));
        }
        if this.cx.now_ms() >= this.deadline_ms {
            return Poll::Ready(Ok(()));
        }
        if !this.registered {
            this.cx.scheduler.register_timer(this.deadline_ms, cx.waker());
            this.registered = true;
        }
        Poll::Pending
    }
}

/// Future returned by [`TaskContext::join_all`]
#[must_use = "futures do nothing unless awaited"]
pub struct JoinAll<'a> {
    cx: &'a TaskContext,
    tasks: &'a [Task],
}

impl Future for JoinAll<'_> {
    type Output = Result<Vec<TaskState>, Cancelled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.cx.is_cancelled() {
            return Poll::Ready(Err(Cancelled));
        }
        let mut settled = true;
        for task in self.tasks {
            if !task.is_terminal() {
                task.add_waiter(cx.waker());
                settled = false;
            }
        }
        if settled {
            Poll::Ready(Ok(self.tasks.iter().map(Task::state).collect()))
        } else {
            Poll::Pending
        }
    }
}

/// Future returned by [`TaskContext::until`]
#[must_use = "futures do nothing unless awaited"]
pub struct Until<'a> {
    cx: &'a TaskContext,
    completion: &'a Completion,
}

impl Future for Until<'_> {
    type Output = Result<(), Cancelled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.cx.is_cancelled() {
            return Poll::Ready(Err(Cancelled));
        }
        if self.completion.is_complete() {
            return Poll::Ready(Ok(()));
        }
        self.completion.register(cx.waker());
        Poll::Pending
    }
}
