//! Registry orchestration.
//!
//! Translates add/update/delete/list operations into configuration document
//! mutations plus the lifecycle commands the change implies. Every mutation
//! persists the document before enqueuing commands: a crash between the two
//! leaves the declared configuration correct and the live set stale until the
//! next reconciling update.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::coordinator::{LifecycleCommand, LifecycleCoordinator};
use crate::store::{ConfigStore, Document, ProviderConfig};
use crate::types::{Error, Result};

/// Keys that never belong to a provider's configuration body.
const RESERVED_KEYS: [&str; 4] = ["name", "active", "tools", "errlogs"];

// =============================================================================
// Request parsing
// =============================================================================

/// How the caller supplied the configuration body.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderInput {
    /// Plain configuration fields alongside the name.
    Direct(Map<String, Value>),

    /// Bulk-import shape: the true record nested under a `mcpServers`
    /// sub-map. Only the first entry is used; multi-entry payloads are
    /// truncated with a warning.
    NestedSingleEntry {
        key: String,
        fields: Map<String, Value>,
    },
}

impl ProviderInput {
    /// Build the configuration record this input describes.
    ///
    /// A direct body carries the caller's `active` flag; a nested body is
    /// taken wholesale, its own `active` (default true) included.
    fn into_config(self, active: bool) -> Result<ProviderConfig> {
        match self {
            ProviderInput::Direct(extra) => Ok(ProviderConfig { active, extra }),
            ProviderInput::NestedSingleEntry { fields, .. } => {
                Ok(serde_json::from_value(Value::Object(fields))?)
            }
        }
    }
}

/// A parsed registry mutation request.
#[derive(Debug)]
pub struct ProviderRequest {
    /// Explicit `active` flag, when the caller sent one.
    pub active: Option<bool>,

    /// Configuration body, when the caller sent one. `None` means the
    /// request is activation-only.
    pub input: Option<ProviderInput>,
}

impl ProviderRequest {
    /// Parse raw request fields, stripping reserved keys.
    pub fn from_raw(raw: &Map<String, Value>) -> Self {
        let active = raw.get("active").and_then(Value::as_bool);

        if let Some(nested) = raw.get("mcpServers").and_then(Value::as_object) {
            if let Some((key, value)) = nested.iter().next() {
                if nested.len() > 1 {
                    warn!(
                        chosen = %key,
                        entries = nested.len(),
                        "multi-entry nested payload; only the first entry is used"
                    );
                }
                let fields = value.as_object().cloned().unwrap_or_default();
                return Self {
                    active,
                    input: Some(ProviderInput::NestedSingleEntry {
                        key: key.clone(),
                        fields,
                    }),
                };
            }
        }

        let direct: Map<String, Value> = raw
            .iter()
            .filter(|(key, _)| {
                !RESERVED_KEYS.contains(&key.as_str()) && key.as_str() != "mcpServers"
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let input = if direct.is_empty() {
            None
        } else {
            Some(ProviderInput::Direct(direct))
        };
        Self { active, input }
    }
}

// =============================================================================
// Views
// =============================================================================

/// One configured provider joined with its live runtime state.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderView {
    pub name: String,
    pub active: bool,

    /// Opaque configuration body, flattened into the view.
    #[serde(flatten)]
    pub config: Map<String, Value>,

    pub tools: Vec<String>,
    pub errlogs: Vec<String>,
}

// =============================================================================
// Registry
// =============================================================================

/// Orchestrates the configuration store and the lifecycle coordinator.
#[derive(Debug)]
pub struct ToolRegistry {
    store: ConfigStore,
    coordinator: LifecycleCoordinator,
}

impl ToolRegistry {
    pub fn new(store: ConfigStore, coordinator: LifecycleCoordinator) -> Self {
        Self { store, coordinator }
    }

    pub fn coordinator(&self) -> &LifecycleCoordinator {
        &self.coordinator
    }

    /// List every configured provider, joined with live tools and error logs
    /// where a connection exists.
    pub async fn list(&self) -> Vec<ProviderView> {
        let doc = self.store.load().await;
        let mut views = Vec::with_capacity(doc.providers.len());
        for (name, config) in &doc.providers {
            let live = self.coordinator.live_view(name).await.unwrap_or_default();
            views.push(ProviderView {
                name: name.clone(),
                active: config.active,
                config: config.extra.clone(),
                tools: live.tools,
                errlogs: live.error_log,
            });
        }
        views
    }

    /// Register a new provider and bring its connection up.
    pub async fn add(&self, name: &str, raw: &Map<String, Value>) -> Result<()> {
        if name.is_empty() {
            return Err(Error::validation("server name cannot be empty"));
        }

        let request = ProviderRequest::from_raw(raw);
        let input = request
            .input
            .ok_or_else(|| Error::validation("a usable server configuration is required"))?;
        let config = input.into_config(request.active.unwrap_or(true))?;

        let mut doc = self.store.load().await;
        if doc.providers.contains_key(name) {
            return Err(Error::validation(format!("server {name} already exists")));
        }
        doc.providers.insert(name.to_string(), config.clone());
        self.persist(&doc).await?;

        self.coordinator.enqueue(LifecycleCommand::Init {
            name: name.to_string(),
            config,
        })
    }

    /// Update a provider's configuration or activation state, reconciling the
    /// live connection with the declared delta.
    ///
    /// Activation-only requests preserve the stored body verbatim; a supplied
    /// body replaces the stored one wholesale (no field-level merge).
    pub async fn update(&self, name: &str, raw: &Map<String, Value>) -> Result<()> {
        if name.is_empty() {
            return Err(Error::validation("server name cannot be empty"));
        }

        let mut doc = self.store.load().await;
        let Some(current) = doc.providers.get(name).cloned() else {
            return Err(Error::not_found(format!("server {name} does not exist")));
        };

        let request = ProviderRequest::from_raw(raw);
        let activation_only = request.input.is_none();
        let active = request.active.unwrap_or(current.active);
        let config = match request.input {
            None => ProviderConfig {
                active,
                extra: current.extra,
            },
            Some(input) => input.into_config(active)?,
        };

        let was_live = self.coordinator.is_live(name).await;
        doc.providers.insert(name.to_string(), config.clone());
        self.persist(&doc).await?;

        if config.active {
            if was_live || !activation_only {
                // Safe reset: FIFO guarantees the init observes the
                // termination already applied.
                self.coordinator.enqueue(LifecycleCommand::Terminate {
                    name: name.to_string(),
                })?;
            }
            self.coordinator.enqueue(LifecycleCommand::Init {
                name: name.to_string(),
                config,
            })?;
        } else if was_live {
            self.coordinator.enqueue(LifecycleCommand::Terminate {
                name: name.to_string(),
            })?;
        }
        Ok(())
    }

    /// Remove a provider and tear down its connection if live.
    pub async fn delete(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::validation("server name cannot be empty"));
        }

        let mut doc = self.store.load().await;
        if doc.providers.remove(name).is_none() {
            return Err(Error::not_found(format!("server {name} does not exist")));
        }
        self.persist(&doc).await?;

        if self.coordinator.is_live(name).await {
            self.coordinator.enqueue(LifecycleCommand::Terminate {
                name: name.to_string(),
            })?;
        }
        Ok(())
    }

    /// A failed save aborts the mutation before any lifecycle command.
    async fn persist(&self, doc: &Document) -> Result<()> {
        self.store
            .save(doc)
            .await
            .map_err(|err| Error::persistence(format!("failed to save provider document: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{ToolConnection, ToolConnectionFactory};
    use crate::types::CoordinatorConfig;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeConnection {
        tools: Vec<String>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolConnection for FakeConnection {
        fn tool_names(&self) -> Vec<String> {
            self.tools.clone()
        }

        fn error_log(&self) -> Vec<String> {
            vec!["handshake retried once".to_string()]
        }

        async fn close(&mut self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeFactory {
        connects: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolConnectionFactory for FakeFactory {
        async fn connect(
            &self,
            name: &str,
            _config: &ProviderConfig,
        ) -> Result<Box<dyn ToolConnection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeConnection {
                tools: vec![format!("{name}_tool")],
                closes: self.closes.clone(),
            }))
        }
    }

    struct Harness {
        registry: ToolRegistry,
        store: ConfigStore,
        connects: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("mcp_server.json"));
        let connects = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let factory = Arc::new(FakeFactory {
            connects: connects.clone(),
            closes: closes.clone(),
        });
        let coordinator = LifecycleCoordinator::spawn(factory, &CoordinatorConfig::default());
        Harness {
            registry: ToolRegistry::new(store.clone(), coordinator),
            store,
            connects,
            closes,
            _dir: dir,
        }
    }

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_add_persists_and_initializes() {
        let h = harness();
        h.registry
            .add("search", &raw(json!({"url": "http://localhost:9000"})))
            .await
            .unwrap();
        h.registry.coordinator().flush().await.unwrap();

        let doc = h.store.load().await;
        assert_eq!(doc.providers["search"].extra["url"], "http://localhost:9000");
        assert!(doc.providers["search"].active);
        assert!(h.registry.coordinator().is_live("search").await);
        assert_eq!(h.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_add_empty_name_fails() {
        let h = harness();
        let err = h
            .registry
            .add("", &raw(json!({"url": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_add_without_config_fields_fails() {
        let h = harness();
        let err = h
            .registry
            .add("search", &raw(json!({"name": "search", "active": true})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_add_duplicate_fails_and_store_is_unchanged() {
        let h = harness();
        h.registry
            .add("search", &raw(json!({"url": "http://localhost:9000"})))
            .await
            .unwrap();

        let err = h
            .registry
            .add("search", &raw(json!({"url": "http://other"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let doc = h.store.load().await;
        assert_eq!(doc.providers["search"].extra["url"], "http://localhost:9000");
    }

    #[tokio::test]
    async fn test_add_nested_single_entry_payload() {
        let h = harness();
        h.registry
            .add(
                "imported",
                &raw(json!({
                    "mcpServers": {
                        "imported": {"active": false, "command": "npx imported-server"}
                    }
                })),
            )
            .await
            .unwrap();

        let doc = h.store.load().await;
        assert!(!doc.providers["imported"].active);
        assert_eq!(
            doc.providers["imported"].extra["command"],
            "npx imported-server"
        );
    }

    #[tokio::test]
    async fn test_unwritable_store_aborts_before_lifecycle_commands() {
        let dir = tempfile::tempdir().unwrap();
        // The document's parent is a regular file, so no save can succeed.
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "occupied").unwrap();
        let store = ConfigStore::new(blocker.join("mcp_server.json"));

        let connects = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let factory = Arc::new(FakeFactory {
            connects: connects.clone(),
            closes: closes.clone(),
        });
        let coordinator = LifecycleCoordinator::spawn(factory, &CoordinatorConfig::default());
        let registry = ToolRegistry::new(store, coordinator);

        let err = registry
            .add("search", &raw(json!({"url": "http://localhost:9000"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));

        // The aborted mutation never reached the queue.
        registry.coordinator().flush().await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        assert!(registry.coordinator().live_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_provider_fails() {
        let h = harness();
        let err = h
            .registry
            .update("ghost", &raw(json!({"active": false})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_activation_only_update_preserves_body() {
        let h = harness();
        h.registry
            .add("search", &raw(json!({"url": "http://localhost:9000"})))
            .await
            .unwrap();
        h.registry.coordinator().flush().await.unwrap();

        h.registry
            .update("search", &raw(json!({"active": false})))
            .await
            .unwrap();
        h.registry.coordinator().flush().await.unwrap();

        let doc = h.store.load().await;
        assert!(!doc.providers["search"].active);
        assert_eq!(doc.providers["search"].extra["url"], "http://localhost:9000");
        assert!(!h.registry.coordinator().is_live("search").await);
    }

    #[tokio::test]
    async fn test_full_update_replaces_body() {
        let h = harness();
        h.registry
            .add("search", &raw(json!({"url": "http://x", "token": "old"})))
            .await
            .unwrap();

        h.registry
            .update("search", &raw(json!({"url": "http://y"})))
            .await
            .unwrap();

        let doc = h.store.load().await;
        assert_eq!(doc.providers["search"].extra["url"], "http://y");
        assert!(doc.providers["search"].extra.get("token").is_none());
    }

    #[tokio::test]
    async fn test_update_live_provider_resets_connection() {
        let h = harness();
        h.registry
            .add("search", &raw(json!({"url": "http://x"})))
            .await
            .unwrap();
        h.registry.coordinator().flush().await.unwrap();

        h.registry
            .update("search", &raw(json!({"url": "http://y"})))
            .await
            .unwrap();
        h.registry.coordinator().flush().await.unwrap();

        // Terminate then init: the old connection closed, a fresh one live.
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
        assert_eq!(h.connects.load(Ordering::SeqCst), 2);
        assert!(h.registry.coordinator().is_live("search").await);
    }

    #[tokio::test]
    async fn test_reactivation_of_inactive_provider_enqueues_init_only() {
        let h = harness();
        h.registry
            .add("search", &raw(json!({"url": "http://x", "active": false})))
            .await
            .unwrap();
        h.registry.coordinator().flush().await.unwrap();
        // Inactive adds still enqueue their init; drop the connection to model
        // a provider that is declared but not live.
        h.registry
            .update("search", &raw(json!({"active": false})))
            .await
            .unwrap();
        h.registry.coordinator().flush().await.unwrap();
        assert!(!h.registry.coordinator().is_live("search").await);
        let connects_before = h.connects.load(Ordering::SeqCst);

        h.registry
            .update("search", &raw(json!({"active": true})))
            .await
            .unwrap();
        h.registry.coordinator().flush().await.unwrap();

        assert!(h.registry.coordinator().is_live("search").await);
        assert_eq!(h.connects.load(Ordering::SeqCst), connects_before + 1);

        let doc = h.store.load().await;
        assert_eq!(doc.providers["search"].extra["url"], "http://x");
    }

    #[tokio::test]
    async fn test_delete_missing_provider_fails() {
        let h = harness();
        let err = h.registry.delete("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_live_provider_terminates_exactly_once() {
        let h = harness();
        h.registry
            .add("search", &raw(json!({"url": "http://x"})))
            .await
            .unwrap();
        h.registry.coordinator().flush().await.unwrap();

        h.registry.delete("search").await.unwrap();
        h.registry.coordinator().flush().await.unwrap();

        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
        assert!(!h.registry.coordinator().is_live("search").await);
        let doc = h.store.load().await;
        assert!(doc.providers.is_empty());
    }

    #[tokio::test]
    async fn test_list_joins_live_state() {
        let h = harness();
        h.registry
            .add("search", &raw(json!({"url": "http://x"})))
            .await
            .unwrap();
        h.registry
            .add("offline", &raw(json!({"url": "http://y", "active": false})))
            .await
            .unwrap();
        h.registry.coordinator().flush().await.unwrap();
        h.registry
            .update("offline", &raw(json!({"active": false})))
            .await
            .unwrap();
        h.registry.coordinator().flush().await.unwrap();

        let views = h.registry.list().await;
        assert_eq!(views.len(), 2);

        let offline = views.iter().find(|v| v.name == "offline").unwrap();
        assert!(offline.tools.is_empty());
        assert!(offline.errlogs.is_empty());

        let search = views.iter().find(|v| v.name == "search").unwrap();
        assert_eq!(search.tools, vec!["search_tool"]);
        assert_eq!(search.errlogs, vec!["handshake retried once"]);
        assert_eq!(search.config["url"], "http://x");
    }

    #[test]
    fn test_request_parsing_strips_reserved_keys() {
        let request = ProviderRequest::from_raw(&raw(json!({
            "name": "search",
            "active": false,
            "tools": ["stale"],
            "errlogs": ["stale"],
            "url": "http://x"
        })));

        assert_eq!(request.active, Some(false));
        let ProviderInput::Direct(fields) = request.input.unwrap() else {
            panic!("expected direct input");
        };
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["url"], "http://x");
    }

    #[test]
    fn test_request_parsing_multi_entry_nested_uses_first() {
        let request = ProviderRequest::from_raw(&raw(json!({
            "mcpServers": {
                "first": {"url": "http://first"},
                "second": {"url": "http://second"}
            }
        })));

        let ProviderInput::NestedSingleEntry { key, fields } = request.input.unwrap() else {
            panic!("expected nested input");
        };
        assert_eq!(key, "first");
        assert_eq!(fields["url"], "http://first");
    }

    #[test]
    fn test_request_parsing_empty_nested_is_no_config() {
        let request = ProviderRequest::from_raw(&raw(json!({"mcpServers": {}})));
        assert!(request.input.is_none());
    }
}
