//! # engine_app
//!
//! Host side of the system lifecycle: the [`LifecycleDriver`] that owns the
//! registry and fires the lifecycle broadcasts, a fixed-timestep
//! [`TickLoop`] around it, JSON application settings and a handful of
//! built-in systems.

pub mod config;
pub mod lifecycle;
pub mod systems;
pub mod tick;

pub use config::{AppConfig, ConfigError};
pub use lifecycle::{DriverConfig, LifecycleDriver, LifecycleError, LifecycleState};
pub use tick::{TickConfig, TickLoop};
