//! Error types for the system runtime.

use crate::events::{ListenerId, Phase};

/// Errors raised while configuring, building or initialising systems.
///
/// All of these are build-time configuration errors: the host is expected to
/// abort startup rather than run a partially initialised tree.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// A manifest entry names a kind no factory was registered for.
    #[error("unknown system kind: {0}")]
    UnknownKind(String),

    /// The `settings` of a manifest entry do not match the system type.
    #[error("invalid settings for system `{kind}`: {source}")]
    InvalidSettings {
        /// The kind whose settings failed to deserialise.
        kind: String,
        /// The underlying deserialisation error.
        #[source]
        source: serde_json::Error,
    },

    /// Two manifest entries name the same shared asset with different kinds.
    #[error("asset `{asset}` is a `{expected}` but was referenced as `{found}`")]
    AssetKindMismatch {
        /// The asset name.
        asset: String,
        /// Kind of the first entry naming the asset.
        expected: String,
        /// Kind of the conflicting entry.
        found: String,
    },

    /// A manifest document could not be parsed.
    #[error("failed to parse system manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// The user-defined `init` hook failed.
    #[error("system `{system}` failed to initialise: {source}")]
    Init {
        /// Name of the failing system.
        system: String,
        /// The error returned by the hook.
        #[source]
        source: anyhow::Error,
    },

    /// An instance was initialised a second time.
    #[error("system `{system}` is already initialised")]
    AlreadyInitialized {
        /// Name of the system.
        system: String,
    },

    /// A child index does not exist on the parent.
    #[error("system `{system}` has no child at index {index}")]
    NoSuchChild {
        /// Name of the parent system.
        system: String,
        /// The requested child index.
        index: usize,
    },

    /// A child slot already holds an initialised instance.
    #[error("child {index} of system `{system}` is already initialised")]
    ChildAlreadyInitialized {
        /// Name of the parent system.
        system: String,
        /// The child index.
        index: usize,
    },
}

/// A listener failed while a broadcast was being delivered.
#[derive(Debug, thiserror::Error)]
#[error("{phase} listener {listener} failed: {source}")]
pub struct BroadcastError {
    /// The broadcast that was being delivered.
    pub phase: Phase,
    /// The listener that failed.
    pub listener: ListenerId,
    /// The error returned by the listener.
    #[source]
    pub source: anyhow::Error,
}

/// Errors raised by the deferred executor.
#[derive(Debug, thiserror::Error)]
pub enum DeferredError {
    /// No ticking entity is available to drive cooperative tasks.
    #[error("cooperative driver unavailable: no ticking entity is attached")]
    DriverUnavailable,
}
