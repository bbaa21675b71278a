//! Cancellation signal and external completion signals

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;

/// Per-spin slam-stop flag
///
/// Any task observes it at its next suspension point. Shareable across
/// threads so an input handler can trigger it; the scheduler wakes every
/// live task the next time it runs.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    triggered: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request slam-stop
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }

    /// Has slam-stop been requested for the current spin?
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Clear the flag (start of a new spin)
    pub fn reset(&self) {
        self.triggered.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CompletionInner {
    done: Cell<bool>,
    waiters: RefCell<Vec<Waker>>,
}

/// One-shot external completion ("animation finished", "sound finished")
///
/// Created by the rendering/audio collaborator, completed by it when the
/// effect ends, awaited by tasks through `TaskContext::until`.
#[derive(Clone, Default)]
pub struct Completion {
    inner: Rc<CompletionInner>,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// An already-completed signal (effects that have nothing to play)
    pub fn done() -> Self {
        let completion = Self::new();
        completion.complete();
        completion
    }

    /// Mark as finished and wake every waiting task
    pub fn complete(&self) {
        if self.inner.done.replace(true) {
            return;
        }
        let waiters: Vec<Waker> = self.inner.waiters.borrow_mut().drain(..).collect();
        for waker in waiters {
            waker.wake();
        }
    }

    pub fn is_complete(&self) -> bool {
        self.inner.done.get()
    }

    pub(crate) fn register(&self, waker: &Waker) {
        let mut waiters = self.inner.waiters.borrow_mut();
        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("done", &self.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_signal() {
        let signal = CancellationSignal::new();
        let shared = signal.clone();
        assert!(!signal.is_triggered());

        shared.trigger();
        assert!(signal.is_triggered());

        signal.reset();
        assert!(!shared.is_triggered());
    }

    #[test]
    fn test_completion() {
        let completion = Completion::new();
        assert!(!completion.is_complete());
        completion.complete();
        completion.complete();
        assert!(completion.is_complete());
        assert!(Completion::done().is_complete());
    }
}
