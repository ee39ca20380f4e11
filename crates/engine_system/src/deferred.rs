//! Deferred execution.
//!
//! Two ways to run an action after a delay:
//!
//! - **Asynchronous**: [`execute_after_delay`] suspends the calling task on a
//!   tokio timer. Only usable where a tokio runtime with timers is running.
//! - **Cooperative**: [`DeferredExecutor::execute_after_delay_sync`] hands the
//!   action to the [`CooperativeScheduler`] owned by the ticking entity. The
//!   delay is converted to a number of ticks at the scheduler's tick rate and
//!   the action runs once that many ticks have elapsed. This never completes
//!   inside the scheduling call; a zero delay resolves on the next tick.
//!
//! Cooperative tasks are plain local futures polled once per tick on the
//! driving thread, so they may hold `Rc`s and borrow-free handles to systems.
//! There is no cancellation: a scheduled task completes or is dropped with
//! its scheduler.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use futures::task::noop_waker_ref;
use tracing::{debug, trace};

use crate::error::DeferredError;

/// Tick rate used when a scheduler is created with a non-positive rate.
pub const DEFAULT_TICK_RATE: f64 = 60.0;

/// Suspend the current task for `delay`, then run `action`.
pub async fn execute_after_delay<F, R>(action: F, delay: Duration) -> R
where
    F: FnOnce() -> R,
{
    tokio::time::sleep(delay).await;
    action()
}

/// Identifies a cooperative task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

struct CoopTask {
    id: TaskId,
    future: LocalBoxFuture<'static, ()>,
}

struct SchedulerShared {
    tick: Cell<u64>,
    tick_rate: f64,
    next_task: Cell<u64>,
    /// Tasks scheduled since the last tick; merged before polling.
    incoming: RefCell<Vec<CoopTask>>,
}

impl SchedulerShared {
    fn ticks_for(&self, delay: Duration) -> u64 {
        (delay.as_secs_f64() * self.tick_rate).ceil() as u64
    }

    fn push(&self, future: LocalBoxFuture<'static, ()>) -> TaskId {
        let id = TaskId(self.next_task.get());
        self.next_task.set(id.0 + 1);
        self.incoming.borrow_mut().push(CoopTask { id, future });
        id
    }
}

/// Single-threaded task runner advanced by the host tick.
pub struct CooperativeScheduler {
    shared: Rc<SchedulerShared>,
    tasks: Vec<CoopTask>,
}

impl CooperativeScheduler {
    /// Create a scheduler that converts delays at `tick_rate` ticks per second.
    #[must_use]
    pub fn new(tick_rate: f64) -> Self {
        let tick_rate = if tick_rate > 0.0 {
            tick_rate
        } else {
            DEFAULT_TICK_RATE
        };
        Self {
            shared: Rc::new(SchedulerShared {
                tick: Cell::new(0),
                tick_rate,
                next_task: Cell::new(1),
                incoming: RefCell::new(Vec::new()),
            }),
            tasks: Vec::new(),
        }
    }

    /// An executor handle bound to this scheduler.
    #[must_use]
    pub fn executor(&self) -> DeferredExecutor {
        DeferredExecutor {
            scheduler: Some(Rc::downgrade(&self.shared)),
        }
    }

    /// Number of ticks advanced so far.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.shared.tick.get()
    }

    #[must_use]
    pub fn tick_rate(&self) -> f64 {
        self.shared.tick_rate
    }

    /// Number of tasks that have not completed yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len() + self.shared.incoming.borrow().len()
    }

    /// Advance one tick and poll every pending task once.
    ///
    /// Tasks scheduled while polling first run on the next tick. Returns the
    /// number of tasks that completed.
    pub fn tick(&mut self) -> usize {
        let tick = self.shared.tick.get() + 1;
        self.shared.tick.set(tick);

        let incoming = std::mem::take(&mut *self.shared.incoming.borrow_mut());
        self.tasks.extend(incoming);

        let mut cx = Context::from_waker(noop_waker_ref());
        let before = self.tasks.len();
        self.tasks.retain_mut(|task| match task.future.poll_unpin(&mut cx) {
            Poll::Ready(()) => {
                trace!(task = task.id.0, tick, "cooperative task completed");
                false
            }
            Poll::Pending => true,
        });

        let completed = before - self.tasks.len();
        if completed > 0 {
            debug!(tick, completed, pending = self.tasks.len(), "cooperative tick");
        }
        completed
    }
}

impl fmt::Debug for CooperativeScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CooperativeScheduler")
            .field("tick", &self.shared.tick.get())
            .field("tick_rate", &self.shared.tick_rate)
            .field("pending", &self.pending())
            .finish()
    }
}

/// A future that resolves once the scheduler reaches a given tick.
pub struct TickDelay {
    shared: Weak<SchedulerShared>,
    resume_at: u64,
}

impl TickDelay {
    /// The tick on which this delay resolves.
    #[must_use]
    pub fn resume_at(&self) -> u64 {
        self.resume_at
    }
}

impl Future for TickDelay {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        match self.shared.upgrade() {
            Some(shared) if shared.tick.get() < self.resume_at => Poll::Pending,
            _ => Poll::Ready(()),
        }
    }
}

impl fmt::Debug for TickDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickDelay")
            .field("resume_at", &self.resume_at)
            .finish()
    }
}

/// Handle for scheduling cooperative work on the ticking entity.
///
/// A detached executor, or one whose scheduler has been dropped, fails every
/// call with [`DeferredError::DriverUnavailable`].
#[derive(Clone, Default)]
pub struct DeferredExecutor {
    scheduler: Option<Weak<SchedulerShared>>,
}

impl DeferredExecutor {
    /// An executor with no ticking entity behind it.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    fn shared(&self) -> Result<Rc<SchedulerShared>, DeferredError> {
        self.scheduler
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(DeferredError::DriverUnavailable)
    }

    /// Returns `true` if a live scheduler is attached.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.shared().is_ok()
    }

    /// A future resolving after `ticks` more ticks.
    ///
    /// # Errors
    ///
    /// Returns [`DeferredError::DriverUnavailable`] without a scheduler.
    pub fn wait_ticks(&self, ticks: u64) -> Result<TickDelay, DeferredError> {
        let shared = self.shared()?;
        Ok(TickDelay {
            resume_at: shared.tick.get().saturating_add(ticks),
            shared: Rc::downgrade(&shared),
        })
    }

    /// A future resolving once `delay` worth of ticks has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`DeferredError::DriverUnavailable`] without a scheduler.
    pub fn wait(&self, delay: Duration) -> Result<TickDelay, DeferredError> {
        let ticks = self.shared()?.ticks_for(delay);
        self.wait_ticks(ticks)
    }

    /// Run a local future on the ticking entity, polled once per tick.
    ///
    /// # Errors
    ///
    /// Returns [`DeferredError::DriverUnavailable`] without a scheduler.
    pub fn execute_coroutine<Fut>(&self, coroutine: Fut) -> Result<TaskId, DeferredError>
    where
        Fut: Future<Output = ()> + 'static,
    {
        let shared = self.shared()?;
        Ok(shared.push(coroutine.boxed_local()))
    }

    /// Run `action` after `delay`, counted in ticks of the attached scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`DeferredError::DriverUnavailable`] without a scheduler.
    pub fn execute_after_delay_sync<F>(
        &self,
        action: F,
        delay: Duration,
    ) -> Result<TaskId, DeferredError>
    where
        F: FnOnce() + 'static,
    {
        let wait = self.wait(delay)?;
        debug!(
            delay_ms = delay.as_millis() as u64,
            resume_at = wait.resume_at(),
            "scheduled deferred action"
        );
        self.execute_coroutine(async move {
            wait.await;
            action();
        })
    }
}

impl fmt::Debug for DeferredExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredExecutor")
            .field("available", &self.is_available())
            .finish()
    }
}
