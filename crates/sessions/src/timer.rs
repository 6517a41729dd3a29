//! Cancellable repeating timer driving the unread-message poller.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use {futures::future::BoxFuture, tokio::task::AbortHandle, tracing::trace};

/// Work run on every tick.
pub type TickCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Not scheduled.
    Idle,
    /// Waiting for the next tick.
    Armed,
    /// The callback is executing.
    Running,
}

struct Inner {
    state: TimerState,
    generation: u64,
    abort: Option<AbortHandle>,
}

type Shared = Arc<Mutex<Inner>>;

fn lock(inner: &Shared) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs a callback every `interval` after the previous run finished.
///
/// Stopping while the callback executes lets that run complete and
/// schedules nothing after it, so a callback may stop its own timer.
pub struct PollingTimer {
    interval: Duration,
    callback: TickCallback,
    inner: Shared,
}

impl PollingTimer {
    pub fn new(interval: Duration, callback: TickCallback) -> Self {
        Self {
            interval,
            callback,
            inner: Arc::new(Mutex::new(Inner {
                state: TimerState::Idle,
                generation: 0,
                abort: None,
            })),
        }
    }

    pub fn state(&self) -> TimerState {
        lock(&self.inner).state
    }

    /// Armed or running.
    pub fn is_running(&self) -> bool {
        self.state() != TimerState::Idle
    }

    /// Schedule ticks. No-op unless idle.
    pub fn start(&self) {
        let mut inner = lock(&self.inner);
        if inner.state != TimerState::Idle {
            return;
        }
        inner.generation += 1;
        inner.state = TimerState::Armed;
        let task = tokio::spawn(run(
            Arc::clone(&self.inner),
            inner.generation,
            self.interval,
            Arc::clone(&self.callback),
        ));
        inner.abort = Some(task.abort_handle());
    }

    /// Cancel the pending tick. A callback already running finishes.
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        let abort = inner.abort.take();
        match inner.state {
            TimerState::Idle => return,
            TimerState::Armed => {
                if let Some(abort) = abort {
                    abort.abort();
                }
            },
            TimerState::Running => {},
        }
        inner.generation += 1;
        inner.state = TimerState::Idle;
    }
}

impl Drop for PollingTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(inner: Shared, generation: u64, interval: Duration, callback: TickCallback) {
    loop {
        tokio::time::sleep(interval).await;
        {
            let mut state = lock(&inner);
            if state.generation != generation || state.state != TimerState::Armed {
                return;
            }
            state.state = TimerState::Running;
        }

        trace!(generation, "timer tick");
        callback().await;

        let mut state = lock(&inner);
        if state.generation != generation {
            return;
        }
        state.state = TimerState::Armed;
    }
}
