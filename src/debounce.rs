//! Debounce: coalesce bursts of calls into one delayed invocation.
//!
//! Each `call` aborts the pending timer task and schedules a new one, so a
//! burst of calls closer together than `delay` runs the target once, with the
//! last call's arguments, `delay` after that last call. Dropping the handle
//! cancels whatever is still pending.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

/// Debounced wrapper around `f`. Must be called inside a tokio runtime.
pub struct Debounced<A> {
    f: Arc<dyn Fn(A) + Send + Sync>,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

/// Wrap `f` so it only runs after `delay` of quiet time.
pub fn debounce<A, F>(f: F, delay: Duration) -> Debounced<A>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    Debounced { f: Arc::new(f), delay, pending: Mutex::new(None) }
}

impl<A: Send + 'static> Debounced<A> {
    /// Reschedule with these arguments, replacing any pending call.
    pub fn call(&self, args: A) {
        let f = Arc::clone(&self.f);
        let delay = self.delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f(args);
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.replace(task) {
            previous.abort();
            trace!("debounced call superseded");
        }
    }

    /// Drop the pending call. Returns whether one was still waiting.
    pub fn cancel(&self) -> bool {
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match previous {
            Some(task) if !task.is_finished() => {
                task.abort();
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<A> Drop for Debounced<A> {
    fn drop(&mut self) {
        let pending = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = pending {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "debounce_test.rs"]
mod tests;
