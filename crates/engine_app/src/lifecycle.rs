//! Lifecycle driver.
//!
//! The [`LifecycleDriver`] is the context object a host application talks to.
//! It owns the system registry, the "all systems setup done" flag, the
//! lifecycle broadcasts and the cooperative scheduler, and walks through a
//! single lifecycle:
//!
//! ```text
//! Uninitialized --build--> Building --setup_complete--> Running --teardown--> Terminated
//!                     \
//!                      `--build error--> Failed --teardown--> Terminated
//! ```
//!
//! - `build` runs the tree builder and fills the registry.
//! - `setup_complete` raises the flag, fires the one-shot ready notification,
//!   then the start broadcast.
//! - `tick` advances the cooperative scheduler and, while the flag is up,
//!   fires the update broadcast.
//! - `teardown` calls `finish` on every registered system in registry order,
//!   lowers the flag, fires the finish broadcast and empties the registry.
//!
//! A failed build is fatal: `Failed` only accepts `teardown`, which still
//! finishes the systems registered before the error.
//!
//! `Terminated` is final: ticks are ignored and the lifecycle cannot restart.

use std::fmt;

use tracing::{debug, info, warn};

use engine_system::{
    BroadcastError, CapabilityId, CooperativeScheduler, DeferredExecutor, ListenerFailurePolicy,
    LogLevel, LogSink, System, SystemError, SystemEvents, SystemHandle, SystemRegistry,
    SystemTemplate, SystemTreeBuilder, TickInfo, TracingSink, capability,
};

/// The phases of a driver's single lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    /// Built, waiting for the host's post-construction hook.
    Building,
    Running,
    /// The build returned an error. Only `teardown` is accepted.
    Failed,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Building => "building",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Errors raised by the driver.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// A hook was called in the wrong state.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        /// The hook that was called.
        action: &'static str,
        /// The state the driver was in.
        state: LifecycleState,
    },

    /// Building the system tree failed.
    #[error(transparent)]
    Build(#[from] SystemError),

    /// A broadcast listener failed.
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
}

/// Driver settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverConfig {
    /// Ticks per second, used to convert cooperative delays.
    pub tick_rate: f64,
    /// What a failing broadcast listener does to the rest of the broadcast.
    pub listener_failure_policy: ListenerFailurePolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            listener_failure_policy: ListenerFailurePolicy::Abort,
        }
    }
}

/// Owns the registry and drives the system lifecycle.
#[derive(Debug)]
pub struct LifecycleDriver {
    state: LifecycleState,
    /// The "all systems setup done" flag gating update broadcasts.
    setup_done: bool,
    registry: SystemRegistry,
    events: SystemEvents,
    scheduler: CooperativeScheduler,
    deferred: DeferredExecutor,
    /// Host ticks seen so far.
    tick_id: u64,
}

impl LifecycleDriver {
    /// Create a driver with the given settings.
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        let scheduler = CooperativeScheduler::new(config.tick_rate);
        let deferred = scheduler.executor();
        Self {
            state: LifecycleState::Uninitialized,
            setup_done: false,
            registry: SystemRegistry::new(),
            events: SystemEvents::new(config.listener_failure_policy),
            scheduler,
            deferred,
            tick_id: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns `true` between `setup_complete` and `teardown`.
    #[must_use]
    pub fn is_setup_done(&self) -> bool {
        self.setup_done
    }

    #[must_use]
    pub fn registry(&self) -> &SystemRegistry {
        &self.registry
    }

    /// The lifecycle broadcasts. Subscribe here to receive start, update and
    /// finish notifications.
    #[must_use]
    pub fn events(&self) -> &SystemEvents {
        &self.events
    }

    /// An executor scheduling onto this driver's ticks.
    #[must_use]
    pub fn deferred(&self) -> DeferredExecutor {
        self.deferred.clone()
    }

    #[must_use]
    pub fn scheduler(&self) -> &CooperativeScheduler {
        &self.scheduler
    }

    /// Host ticks seen so far.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    fn require(&self, expected: &[LifecycleState], action: &'static str) -> Result<(), LifecycleError> {
        if expected.contains(&self.state) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }

    /// Build the system tree from `roots` into the registry.
    ///
    /// Returns the number of registered systems.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] unless the driver is
    /// uninitialised, or [`LifecycleError::Build`] if a system fails to build.
    /// A failed build leaves the driver in [`LifecycleState::Failed`]: systems
    /// registered before the failure stay registered and are finished by
    /// `teardown`, but setup can no longer complete.
    pub fn build(&mut self, roots: &[SystemTemplate]) -> Result<usize, LifecycleError> {
        self.require(&[LifecycleState::Uninitialized], "build")?;
        self.state = LifecycleState::Building;
        info!(roots = roots.len(), "building systems");

        let built = SystemTreeBuilder::new(&self.events, &self.deferred).build(roots, &mut self.registry);
        if let Err(err) = built {
            self.state = LifecycleState::Failed;
            warn!(registered = self.registry.len(), error = %err, "system build failed");
            return Err(err.into());
        }
        Ok(self.registry.len())
    }

    /// Mark setup as complete and start the systems.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] unless the tree has been
    /// built, or [`LifecycleError::Broadcast`] if a ready or start listener
    /// fails under the abort policy.
    pub fn setup_complete(&mut self) -> Result<(), LifecycleError> {
        self.require(&[LifecycleState::Building], "complete setup")?;
        self.state = LifecycleState::Running;
        self.setup_done = true;
        info!(systems = self.registry.len(), "all systems setup done");

        self.events.ready.emit(&())?;
        self.events.start.emit(&())?;
        Ok(())
    }

    /// Advance one host tick.
    ///
    /// Cooperative tasks are polled on every tick; the update broadcast is
    /// only fired once setup is complete. Ticks after teardown do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] after a failed build, or
    /// [`LifecycleError::Broadcast`] if an update listener fails under the
    /// abort policy.
    pub fn tick(&mut self, dt: f64) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Terminated => return Ok(()),
            LifecycleState::Failed => {
                return Err(LifecycleError::InvalidTransition {
                    action: "tick",
                    state: self.state,
                });
            }
            _ => {}
        }
        self.tick_id += 1;
        self.scheduler.tick();

        if self.setup_done {
            self.events.update.emit(&TickInfo {
                tick_id: self.tick_id,
                dt,
            })?;
        } else {
            debug!(tick_id = self.tick_id, "tick before setup done, update skipped");
        }
        Ok(())
    }

    /// Finish every system and end the lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] if already terminated,
    /// or [`LifecycleError::Broadcast`] if a finish listener fails under the
    /// abort policy. The driver is terminated either way.
    pub fn teardown(&mut self) -> Result<(), LifecycleError> {
        self.require(
            &[
                LifecycleState::Uninitialized,
                LifecycleState::Building,
                LifecycleState::Running,
                LifecycleState::Failed,
            ],
            "tear down",
        )?;

        for system in self.registry.iter() {
            system.finish();
        }
        self.setup_done = false;
        self.state = LifecycleState::Terminated;

        let result = self.events.finish.emit(&());
        let finished = self.registry.drain().len();
        info!(systems = finished, "systems finished");
        result?;
        Ok(())
    }

    /// Initialise a child declared with auto-init off.
    ///
    /// The child and its auto-init descendants are built against this
    /// driver's broadcasts and scheduler. They are not registered, so
    /// `lookup` does not find them and `teardown` does not finish them.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] after teardown, or
    /// [`LifecycleError::Build`] if the child cannot be built.
    pub fn init_child(&self, parent: &SystemHandle, index: usize) -> Result<Vec<SystemHandle>, LifecycleError> {
        self.require(
            &[LifecycleState::Building, LifecycleState::Running],
            "initialise a child",
        )?;
        Ok(SystemTreeBuilder::new(&self.events, &self.deferred).init_child(parent, index)?)
    }

    /// First registered instance of `T`; logged and `None` on a miss.
    #[must_use]
    pub fn lookup<T: System>(&self) -> Option<SystemHandle> {
        self.registry.lookup::<T>()
    }

    /// First registered instance advertising `capability`.
    #[must_use]
    pub fn lookup_capability(&self, capability: CapabilityId) -> Option<SystemHandle> {
        self.registry.lookup_capability(capability)
    }

    /// Report a diagnostic message.
    ///
    /// Goes to the first registered system exposing a log sink, or to
    /// `tracing` when there is none.
    pub fn debug_log(&self, level: LogLevel, message: &str) {
        let sink = self
            .registry
            .iter()
            .find(|s| s.kind().has_capability(capability::LOG_SINK));

        let routed = sink.is_some_and(|system| {
            system.with_system(|system| match system.as_log_sink() {
                Some(sink) => {
                    sink.log(level, message);
                    true
                }
                None => false,
            })
        });
        if !routed {
            TracingSink.log(level, message);
        }
    }
}

impl Default for LifecycleDriver {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}
