//! Host tick loop.
//!
//! Drives a [`LifecycleDriver`] at a fixed timestep:
//!
//! 1. Advance the cooperative scheduler.
//! 2. Broadcast the update to every subscribed system (once setup is done).
//! 3. Sleep for the remainder of the tick budget.
//!
//! The loop stops after `max_ticks`, or on Ctrl-C in the async variant, and
//! leaves teardown to the caller.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::lifecycle::{LifecycleDriver, LifecycleError};

/// Configuration for the host tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    fn tick_duration(&self) -> Duration {
        let rate = if self.tick_rate > 0.0 { self.tick_rate } else { 60.0 };
        Duration::from_secs_f64(1.0 / rate)
    }

    fn done(&self, ticks: u64) -> bool {
        self.max_ticks > 0 && ticks >= self.max_ticks
    }
}

/// Fixed-timestep loop around a driver.
#[derive(Debug)]
pub struct TickLoop<'a> {
    config: TickConfig,
    driver: &'a mut LifecycleDriver,
    ticks: u64,
}

impl<'a> TickLoop<'a> {
    #[must_use]
    pub fn new(config: TickConfig, driver: &'a mut LifecycleDriver) -> Self {
        Self {
            config,
            driver,
            ticks: 0,
        }
    }

    /// Ticks run by this loop so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn step(&mut self, dt: f64) -> Result<(), LifecycleError> {
        self.driver.tick(dt)?;
        self.ticks += 1;
        debug!(tick_id = self.driver.tick_id(), dt, "tick");
        Ok(())
    }

    /// Run the loop for the configured number of ticks, or indefinitely.
    ///
    /// Blocks the current thread between ticks.
    ///
    /// # Errors
    ///
    /// Stops at the first failing update broadcast.
    pub fn run(&mut self) -> Result<(), LifecycleError> {
        let tick_duration = self.config.tick_duration();
        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();
            self.step(tick_duration.as_secs_f64())?;

            if self.config.done(self.ticks) {
                info!(ticks = self.ticks, "tick loop complete");
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.driver.tick_id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }

    /// Run the loop on a tokio interval until `max_ticks` or Ctrl-C.
    ///
    /// # Errors
    ///
    /// Stops at the first failing update broadcast.
    pub async fn run_async(&mut self) -> Result<(), LifecycleError> {
        let tick_duration = self.config.tick_duration();
        let mut interval = tokio::time::interval(tick_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(ticks = self.ticks, "shutdown requested");
                    return Ok(());
                }
                _ = interval.tick() => {
                    self.step(tick_duration.as_secs_f64())?;
                    if self.config.done(self.ticks) {
                        info!(ticks = self.ticks, "tick loop complete");
                        return Ok(());
                    }
                }
            }
        }
    }
}
