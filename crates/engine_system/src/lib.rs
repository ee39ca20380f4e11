//! # engine_system
//!
//! System model and bootstrap plumbing for the engine.
//!
//! A *system* is a unit of long-lived functionality with an init/finish
//! lifecycle and optional child systems. This crate provides:
//!
//! - [`System`]: the trait every system implements.
//! - [`SystemTemplate`]: a shared or prototype descriptor with child templates.
//! - [`SystemTreeBuilder`]: builds a forest of templates into instances,
//!   registering roots and their auto-init descendants in discovery order.
//! - [`SystemRegistry`]: the flat list of active instances, with type and
//!   capability lookup.
//! - [`SystemEvents`]: ready/start/update/finish broadcasts.
//! - [`DeferredExecutor`]: delayed actions and coroutines, either on tokio
//!   timers or cooperatively on the host tick.
//! - [`SystemCatalog`]: turns JSON manifests into templates.
//!
//! ## Usage
//!
//! ```rust
//! use engine_system::{
//!     DeferredExecutor, InitContext, System, SystemEvents, SystemRegistry, SystemTemplate,
//!     SystemTreeBuilder,
//! };
//!
//! #[derive(Debug, Clone, Default)]
//! struct Audio;
//!
//! impl System for Audio {
//!     fn init(&mut self, _ctx: &InitContext<'_>) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let events = SystemEvents::default();
//! let deferred = DeferredExecutor::detached();
//! let mut registry = SystemRegistry::new();
//! SystemTreeBuilder::new(&events, &deferred)
//!     .build(&[SystemTemplate::prototype(Audio)], &mut registry)
//!     .unwrap();
//! assert!(registry.lookup::<Audio>().is_some());
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod deferred;
pub mod error;
pub mod events;
pub mod instance;
pub mod log;
pub mod registry;
pub mod system;
pub mod template;

pub use builder::SystemTreeBuilder;
pub use config::{SystemCatalog, SystemConfig};
pub use context::InitContext;
pub use deferred::{CooperativeScheduler, DeferredExecutor, TaskId, TickDelay, execute_after_delay};
pub use error::{BroadcastError, DeferredError, SystemError};
pub use events::{Broadcast, ListenerFailurePolicy, ListenerId, Phase, SystemEvents, TickInfo};
pub use instance::{ChildSlot, SystemHandle, SystemInstance};
pub use log::{LogLevel, LogSink, TracingSink};
pub use registry::SystemRegistry;
pub use system::{CapabilityId, System, SystemKind, capability};
pub use template::{SharedState, SystemTemplate};
