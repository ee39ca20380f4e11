//! System configuration manifests.
//!
//! A manifest is an ordered list of [`SystemConfig`] entries, the serialisable
//! shape an authoring tool produces:
//!
//! ```json
//! [
//!   {
//!     "kind": "audio",
//!     "requires_new_instance": false,
//!     "asset": "main_audio",
//!     "settings": { "volume": 0.8 },
//!     "children": [
//!       { "kind": "music", "auto_init_at_startup": false }
//!     ]
//!   }
//! ]
//! ```
//!
//! A [`SystemCatalog`] maps kind names to concrete system types and turns a
//! manifest into [`SystemTemplate`]s. Shared entries naming the same `asset`
//! resolve to one shared state; the first entry's settings win.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::SystemError;
use crate::system::System;
use crate::template::SystemTemplate;

fn default_true() -> bool {
    true
}

/// One system entry of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Catalog kind name.
    pub kind: String,
    /// Duplicate the template into a private instance on every build.
    #[serde(default = "default_true")]
    pub requires_new_instance: bool,
    /// Initialise automatically when the parent is built.
    #[serde(default = "default_true")]
    pub auto_init_at_startup: bool,
    /// Name identifying a shared asset across entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// Free-form settings deserialised into the system type.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub settings: Value,
    /// Child entries, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SystemConfig>,
}

impl SystemConfig {
    /// A prototype entry of `kind` with default settings.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            requires_new_instance: true,
            auto_init_at_startup: true,
            asset: None,
            settings: Value::Null,
            children: Vec::new(),
        }
    }

    /// Make this a shared entry named `asset`.
    #[must_use]
    pub fn shared(mut self, asset: impl Into<String>) -> Self {
        self.requires_new_instance = false;
        self.asset = Some(asset.into());
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn auto_init(mut self, auto_init_at_startup: bool) -> Self {
        self.auto_init_at_startup = auto_init_at_startup;
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: SystemConfig) -> Self {
        self.children.push(child);
        self
    }
}

type Factory = Box<dyn Fn(&Value, bool) -> Result<SystemTemplate, SystemError>>;

fn decode<T: DeserializeOwned>(kind: &str, settings: &Value) -> Result<T, SystemError> {
    let invalid = |source: serde_json::Error| SystemError::InvalidSettings {
        kind: kind.to_string(),
        source,
    };
    match T::deserialize(settings) {
        Ok(system) => Ok(system),
        // Missing settings mean "all defaults" for struct systems.
        Err(_) if settings.is_null() => T::deserialize(&Value::Object(Map::new())).map_err(invalid),
        Err(source) => Err(invalid(source)),
    }
}

/// Maps manifest kind names to system types.
#[derive(Default)]
pub struct SystemCatalog {
    factories: HashMap<String, Factory>,
}

impl SystemCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `kind`. A later registration replaces an earlier
    /// one with the same name.
    pub fn register<T>(&mut self, kind: impl Into<String>) -> &mut Self
    where
        T: System + Clone + DeserializeOwned,
    {
        let kind = kind.into();
        let name = kind.clone();
        let factory: Factory = Box::new(move |settings, requires_new_instance| {
            let system: T = decode(&name, settings)?;
            let template = if requires_new_instance {
                SystemTemplate::prototype(system)
            } else {
                SystemTemplate::shared(system)
            };
            Ok(template.named(name.clone()))
        });
        self.factories.insert(kind, factory);
        self
    }

    /// Returns `true` if `kind` is registered.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kind names, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Turn manifest entries into templates, keeping their order.
    ///
    /// # Errors
    ///
    /// Fails on unknown kinds, settings that do not match their type, and
    /// assets referenced with conflicting kinds.
    pub fn templates(&self, configs: &[SystemConfig]) -> Result<Vec<SystemTemplate>, SystemError> {
        let mut assets = HashMap::new();
        configs
            .iter()
            .map(|config| self.template_with(config, &mut assets))
            .collect()
    }

    /// Turn a single entry (and its children) into a template.
    ///
    /// # Errors
    ///
    /// See [`SystemCatalog::templates`].
    pub fn template(&self, config: &SystemConfig) -> Result<SystemTemplate, SystemError> {
        self.template_with(config, &mut HashMap::new())
    }

    /// Parse a JSON manifest and turn it into templates.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::Manifest`] for malformed JSON, or any error of
    /// [`SystemCatalog::templates`].
    pub fn load_json(&self, json: &str) -> Result<Vec<SystemTemplate>, SystemError> {
        let configs: Vec<SystemConfig> = serde_json::from_str(json)?;
        self.templates(&configs)
    }

    fn template_with(
        &self,
        config: &SystemConfig,
        assets: &mut HashMap<String, SystemTemplate>,
    ) -> Result<SystemTemplate, SystemError> {
        let template = match (&config.asset, config.requires_new_instance) {
            (Some(asset), false) => match assets.get(asset) {
                Some(existing) => {
                    if existing.name() != config.kind {
                        return Err(SystemError::AssetKindMismatch {
                            asset: asset.clone(),
                            expected: existing.name().to_string(),
                            found: config.kind.clone(),
                        });
                    }
                    debug!(asset = asset.as_str(), kind = config.kind.as_str(), "reusing shared asset");
                    match existing.shared_state() {
                        Some(state) => SystemTemplate::from_shared_state(existing.kind().clone(), state),
                        None => self.instantiate(config)?,
                    }
                }
                None => {
                    let template = self.instantiate(config)?;
                    assets.insert(asset.clone(), template.clone());
                    template
                }
            },
            _ => self.instantiate(config)?,
        };

        let children = config
            .children
            .iter()
            .map(|child| self.template_with(child, assets))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(template
            .auto_init(config.auto_init_at_startup)
            .with_children(children))
    }

    fn instantiate(&self, config: &SystemConfig) -> Result<SystemTemplate, SystemError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| SystemError::UnknownKind(config.kind.clone()))?;
        factory(&config.settings, config.requires_new_instance)
    }
}

impl fmt::Debug for SystemCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemCatalog")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::builder::SystemTreeBuilder;
    use crate::context::InitContext;
    use crate::deferred::DeferredExecutor;
    use crate::events::SystemEvents;
    use crate::registry::SystemRegistry;

    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(default)]
    struct Audio {
        volume: f32,
        muted: bool,
    }

    impl System for Audio {
        fn init(&mut self, _ctx: &InitContext<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    struct Music;

    impl System for Music {
        fn init(&mut self, _ctx: &InitContext<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn catalog() -> SystemCatalog {
        let mut catalog = SystemCatalog::new();
        catalog.register::<Audio>("audio").register::<Music>("music");
        catalog
    }

    #[test]
    fn test_config_defaults() {
        let config: SystemConfig = serde_json::from_str(r#"{ "kind": "audio" }"#).unwrap();
        assert_eq!(config, SystemConfig::new("audio"));
        assert!(config.requires_new_instance);
        assert!(config.auto_init_at_startup);
    }

    #[test]
    fn test_load_manifest() {
        let json = r#"[
            {
                "kind": "audio",
                "settings": { "volume": 0.5 },
                "children": [{ "kind": "music", "auto_init_at_startup": false }]
            },
            { "kind": "music", "requires_new_instance": false }
        ]"#;
        let templates = catalog().load_json(json).unwrap();

        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].name(), "audio");
        assert!(templates[0].requires_new_instance());
        assert!(!templates[0].children()[0].auto_init_at_startup());
        assert!(!templates[1].requires_new_instance());
    }

    #[test]
    fn test_settings_reach_the_system() {
        let config = SystemConfig::new("audio").with_settings(json!({ "volume": 0.25, "muted": true }));
        let template = catalog().template(&config).unwrap();

        let events = SystemEvents::default();
        let deferred = DeferredExecutor::detached();
        let mut registry = SystemRegistry::new();
        SystemTreeBuilder::new(&events, &deferred)
            .build(&[template], &mut registry)
            .unwrap();

        let audio = registry.lookup::<Audio>().unwrap();
        let audio = audio.borrow_as::<Audio>().unwrap();
        assert!((audio.volume - 0.25).abs() < f32::EPSILON);
        assert!(audio.muted);
    }

    #[test]
    fn test_unknown_kind() {
        let err = catalog().template(&SystemConfig::new("physics")).unwrap_err();
        assert!(matches!(err, SystemError::UnknownKind(kind) if kind == "physics"));
    }

    #[test]
    fn test_invalid_settings() {
        let config = SystemConfig::new("audio").with_settings(json!({ "volume": "loud" }));
        let err = catalog().template(&config).unwrap_err();
        assert!(matches!(err, SystemError::InvalidSettings { .. }));
    }

    #[test]
    fn test_malformed_manifest() {
        let err = catalog().load_json("[{ kind: audio }]").unwrap_err();
        assert!(matches!(err, SystemError::Manifest(_)));
    }

    #[test]
    fn test_named_asset_is_shared_across_entries() {
        let configs = vec![
            SystemConfig::new("audio").shared("main_audio"),
            SystemConfig::new("music").with_child(SystemConfig::new("audio").shared("main_audio")),
        ];
        let templates = catalog().templates(&configs).unwrap();

        let first = templates[0].shared_state().unwrap();
        let nested = templates[1].children()[0].shared_state().unwrap();
        assert!(std::rc::Rc::ptr_eq(&first, &nested));
    }

    #[test]
    fn test_asset_kind_mismatch() {
        let configs = vec![
            SystemConfig::new("audio").shared("main"),
            SystemConfig::new("music").shared("main"),
        ];
        let err = catalog().templates(&configs).unwrap_err();
        assert!(matches!(err, SystemError::AssetKindMismatch { .. }));
    }

    #[test]
    fn test_kinds_sorted() {
        assert_eq!(catalog().kinds(), vec!["audio", "music"]);
    }
}
