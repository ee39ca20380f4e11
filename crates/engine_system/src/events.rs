//! Lifecycle broadcasts.
//!
//! A [`Broadcast`] is a one-to-many notification delivered to its listeners in
//! subscription order. [`SystemEvents`] bundles the four lifecycle broadcasts
//! (ready, start, update, finish) that the driver fires.
//!
//! Listeners return `anyhow::Result<()>`. What happens when one fails is
//! decided by the [`ListenerFailurePolicy`]: `Abort` stops the broadcast at the
//! first failure, `Isolate` logs the failure and keeps delivering.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BroadcastError;

/// The lifecycle phase a broadcast belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// One-shot "all systems ready" notification.
    Ready,
    Start,
    Update,
    Finish,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::Start => "start",
            Self::Update => "update",
            Self::Finish => "finish",
        };
        f.write_str(s)
    }
}

/// Identifies a listener within its broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a broadcast reacts to a failing listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerFailurePolicy {
    /// Stop at the first failure; later listeners do not run.
    #[default]
    Abort,
    /// Log the failure and continue with the next listener.
    Isolate,
}

/// Per-tick data handed to update listeners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInfo {
    /// Monotonically increasing tick counter, starting at 1.
    pub tick_id: u64,
    /// Delta time since the last tick, in seconds.
    pub dt: f64,
}

type Listener<E> = Rc<RefCell<Box<dyn FnMut(&E) -> anyhow::Result<()>>>>;

/// A list of listeners for one event type.
///
/// Listeners are snapshotted when a broadcast starts: listeners subscribed
/// during delivery first run on the next broadcast, and listeners removed
/// during delivery still receive the current one.
pub struct Broadcast<E> {
    phase: Phase,
    policy: Cell<ListenerFailurePolicy>,
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> Broadcast<E> {
    /// Create an empty broadcast for `phase`.
    #[must_use]
    pub fn new(phase: Phase, policy: ListenerFailurePolicy) -> Self {
        Self {
            phase,
            policy: Cell::new(policy),
            next_id: Cell::new(1),
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// The phase this broadcast belongs to.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The current failure policy.
    #[must_use]
    pub fn policy(&self) -> ListenerFailurePolicy {
        self.policy.get()
    }

    pub fn set_policy(&self, policy: ListenerFailurePolicy) {
        self.policy.set(policy);
    }

    /// Append a listener. It runs after every listener already subscribed.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&E) -> anyhow::Result<()> + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let callback: Box<dyn FnMut(&E) -> anyhow::Result<()>> = Box::new(listener);
        self.listeners
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(callback))));
        id
    }

    /// Remove a listener. Returns `true` if it was subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of subscribed listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }

    /// Deliver `event` to every listener in subscription order.
    ///
    /// Returns the number of listeners that completed successfully.
    ///
    /// # Errors
    ///
    /// Under [`ListenerFailurePolicy::Abort`], returns the first listener
    /// failure; listeners after it are not invoked.
    pub fn emit(&self, event: &E) -> Result<usize, BroadcastError> {
        let snapshot: Vec<(ListenerId, Listener<E>)> = self.listeners.borrow().clone();
        let mut delivered = 0;

        for (id, listener) in snapshot {
            // A listener that re-enters its own broadcast is already borrowed.
            let Ok(mut callback) = listener.try_borrow_mut() else {
                warn!(phase = %self.phase, listener = %id, "skipping re-entrant listener");
                continue;
            };
            match (*callback)(event) {
                Ok(()) => delivered += 1,
                Err(source) => match self.policy.get() {
                    ListenerFailurePolicy::Abort => {
                        return Err(BroadcastError {
                            phase: self.phase,
                            listener: id,
                            source,
                        });
                    }
                    ListenerFailurePolicy::Isolate => {
                        warn!(phase = %self.phase, listener = %id, error = %source, "listener failed");
                    }
                },
            }
        }

        debug!(phase = %self.phase, delivered, "broadcast delivered");
        Ok(delivered)
    }
}

impl<E> fmt::Debug for Broadcast<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcast")
            .field("phase", &self.phase)
            .field("policy", &self.policy.get())
            .field("listeners", &self.len())
            .finish()
    }
}

/// The lifecycle broadcasts fired by the driver.
#[derive(Debug)]
pub struct SystemEvents {
    /// Fired once when setup completes, before `start`.
    pub ready: Broadcast<()>,
    pub start: Broadcast<()>,
    /// Fired on every tick once setup is complete.
    pub update: Broadcast<TickInfo>,
    pub finish: Broadcast<()>,
}

impl SystemEvents {
    /// Create the broadcasts with a shared failure policy.
    #[must_use]
    pub fn new(policy: ListenerFailurePolicy) -> Self {
        Self {
            ready: Broadcast::new(Phase::Ready, policy),
            start: Broadcast::new(Phase::Start, policy),
            update: Broadcast::new(Phase::Update, policy),
            finish: Broadcast::new(Phase::Finish, policy),
        }
    }

    /// Change the failure policy of all four broadcasts.
    pub fn set_policy(&self, policy: ListenerFailurePolicy) {
        self.ready.set_policy(policy);
        self.start.set_policy(policy);
        self.update.set_policy(policy);
        self.finish.set_policy(policy);
    }
}

impl Default for SystemEvents {
    fn default() -> Self {
        Self::new(ListenerFailurePolicy::default())
    }
}
