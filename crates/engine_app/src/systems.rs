//! Built-in systems shipped with the host.
//!
//! These are small, self-contained systems that exercise the lifecycle and
//! make the binary useful out of the box. [`catalog`] registers them under
//! their manifest kind names.

use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use engine_system::{
    CapabilityId, InitContext, LogLevel, LogSink, System, SystemCatalog, SystemConfig, capability,
};

/// Logs a heartbeat every `every_ticks` update ticks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Heartbeat {
    pub every_ticks: u64,
    #[serde(skip)]
    beats: u64,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            every_ticks: 60,
            beats: 0,
        }
    }
}

impl Heartbeat {
    /// Heartbeats logged so far.
    #[must_use]
    pub fn beats(&self) -> u64 {
        self.beats
    }
}

impl System for Heartbeat {
    fn init(&mut self, ctx: &InitContext<'_>) -> anyhow::Result<()> {
        ctx.on_update(|heartbeat: &mut Heartbeat, tick| {
            if heartbeat.every_ticks > 0 && tick.tick_id % heartbeat.every_ticks == 0 {
                heartbeat.beats += 1;
                info!(tick_id = tick.tick_id, beats = heartbeat.beats, "heartbeat");
            }
            Ok(())
        });
        Ok(())
    }

    fn finish(&mut self) {
        info!(beats = self.beats, "heartbeat stopped");
    }
}

/// Log sink writing diagnostics to stdout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Console {
    pub prefix: String,
}

impl Default for Console {
    fn default() -> Self {
        Self {
            prefix: "engine".to_string(),
        }
    }
}

impl LogSink for Console {
    fn log(&self, level: LogLevel, message: &str) {
        println!("[{}] {level}: {message}", self.prefix);
    }
}

impl System for Console {
    fn init(&mut self, _ctx: &InitContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn capabilities(&self) -> &'static [CapabilityId] {
        &[capability::LOG_SINK]
    }

    fn as_log_sink(&self) -> Option<&dyn LogSink> {
        Some(self)
    }
}

/// Logs `message` once, `delay_ms` after it is initialised.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Reminder {
    pub delay_ms: u64,
    pub message: String,
}

impl System for Reminder {
    fn init(&mut self, ctx: &InitContext<'_>) -> anyhow::Result<()> {
        let message = self.message.clone();
        ctx.deferred().execute_after_delay_sync(
            move || info!(message = message.as_str(), "reminder"),
            Duration::from_millis(self.delay_ms),
        )?;
        Ok(())
    }
}

/// A catalog with every built-in system registered.
#[must_use]
pub fn catalog() -> SystemCatalog {
    let mut catalog = SystemCatalog::new();
    catalog
        .register::<Heartbeat>("heartbeat")
        .register::<Console>("console")
        .register::<Reminder>("reminder");
    catalog
}

/// Manifest used when none is configured.
#[must_use]
pub fn default_manifest() -> Vec<SystemConfig> {
    vec![
        SystemConfig::new("console").shared("console"),
        SystemConfig::new("heartbeat").with_child(
            SystemConfig::new("reminder").with_settings(serde_json::json!({
                "delay_ms": 1000,
                "message": "one second in",
            })),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleDriver;

    #[test]
    fn test_default_manifest_builds() {
        let templates = catalog().templates(&default_manifest()).unwrap();
        let mut driver = LifecycleDriver::default();
        assert_eq!(driver.build(&templates).unwrap(), 3);
        assert!(driver.lookup::<Console>().is_some());
        assert!(driver.lookup_capability(capability::LOG_SINK).is_some());
        let names: Vec<_> = driver.registry().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["console", "heartbeat", "reminder"]);
    }

    #[test]
    fn test_heartbeat_counts_ticks() {
        let mut driver = LifecycleDriver::default();
        let templates = catalog()
            .templates(&[SystemConfig::new("heartbeat").with_settings(serde_json::json!({ "every_ticks": 2 }))])
            .unwrap();
        driver.build(&templates).unwrap();
        driver.setup_complete().unwrap();
        for _ in 0..5 {
            driver.tick(0.016).unwrap();
        }
        let heartbeat = driver.lookup::<Heartbeat>().unwrap();
        assert_eq!(heartbeat.borrow_as::<Heartbeat>().unwrap().beats(), 2);
    }

    #[test]
    fn test_reminder_needs_a_scheduler() {
        use engine_system::{
            DeferredExecutor, SystemError, SystemEvents, SystemRegistry, SystemTemplate,
            SystemTreeBuilder,
        };

        let events = SystemEvents::default();
        let deferred = DeferredExecutor::detached();
        let mut registry = SystemRegistry::new();
        let err = SystemTreeBuilder::new(&events, &deferred)
            .build(&[SystemTemplate::prototype(Reminder::default())], &mut registry)
            .unwrap_err();
        assert!(matches!(err, SystemError::Init { .. }));
    }

    #[test]
    fn test_reminder_fires_after_delay() {
        let mut driver = LifecycleDriver::default();
        let templates = catalog()
            .templates(&[SystemConfig::new("reminder").with_settings(serde_json::json!({ "delay_ms": 50 }))])
            .unwrap();
        driver.build(&templates).unwrap();
        assert_eq!(driver.scheduler().pending(), 1);
        // 50ms at 60Hz rounds up to 3 ticks.
        driver.tick(0.016).unwrap();
        driver.tick(0.016).unwrap();
        assert_eq!(driver.scheduler().pending(), 1);
        driver.tick(0.016).unwrap();
        assert_eq!(driver.scheduler().pending(), 0);
    }
}
