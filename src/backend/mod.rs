//! Resource back-ends: the contract the executor delegates to.
//!
//! A [`Backend`] performs the actual create/update/delete of one resource
//! kind within one account. Apply and destroy are streams so back-ends can
//! report intermediate status; the last apply item carries outputs and state.
//! The [`BackendRegistry`] maps `(account, kind)` to a back-end.

pub mod script;

use crate::core::config::EngineConfig;
use crate::core::error::{Error, Result};
use crate::core::planner::InputHasher;
use crate::core::types::{Action, StepState};
use crate::resources::{ResourceInputs, ResourceKind, ResourceOutputs};
use crate::tripwire::hasher;
use async_trait::async_trait;
use futures::stream::BoxStream;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub use script::ScriptBackend;

/// Errors raised by back-ends. The executor attributes them to a step.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0}")]
    Failed(String),

    #[error("{action} is not supported")]
    Unsupported { action: Action },

    #[error("invalid back-end response: {0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Per-invocation context handed to apply/destroy and hooks.
#[derive(Debug, Clone)]
pub struct ApplyContext {
    /// Step id, for logging and environment
    pub step: String,
    /// Dedicated working directory, created before the call
    pub work_dir: PathBuf,
    pub action: Action,
}

/// One item of an apply stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyUpdate {
    pub status: StepState,
    pub outputs: Option<ResourceOutputs>,
    pub state: Option<serde_json::Value>,
}

impl ApplyUpdate {
    pub fn status(status: StepState) -> Self {
        Self {
            status,
            outputs: None,
            state: None,
        }
    }

    pub fn finished(outputs: ResourceOutputs, state: Option<serde_json::Value>) -> Self {
        Self {
            status: StepState::Applying,
            outputs: Some(outputs),
            state,
        }
    }
}

/// Row returned by [`Backend::list`] and [`Backend::get`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRow {
    pub id: String,
    #[serde(flatten)]
    pub fields: IndexMap<String, serde_json::Value>,
}

/// Filter for [`Backend::list`]. Empty means everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListFilter {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, String>,
}

impl ListFilter {
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// A resource back-end for one kind within one account.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<ResourceRow>, BackendError>;

    async fn get(&self, id: &str) -> Result<Option<ResourceRow>, BackendError>;

    /// Create or update. Status items while running; the final item carries
    /// outputs and state.
    fn apply(
        &self,
        ctx: ApplyContext,
        inputs: ResourceInputs,
        state: Option<serde_json::Value>,
    ) -> BoxStream<'static, Result<ApplyUpdate, BackendError>>;

    /// Tear down what a previous apply created.
    fn destroy(
        &self,
        ctx: ApplyContext,
        inputs: ResourceInputs,
        state: Option<serde_json::Value>,
    ) -> BoxStream<'static, Result<StepState, BackendError>>;

    /// Runs after a module apply completes.
    async fn after_create(
        &self,
        _ctx: &ApplyContext,
        _outputs: Option<&ResourceOutputs>,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    /// Runs after a module destroy completes.
    async fn after_delete(&self, _ctx: &ApplyContext) -> Result<(), BackendError> {
        Ok(())
    }

    fn supports(&self, _action: Action) -> bool {
        true
    }

    /// Fingerprint of resolved inputs. Defaults to BLAKE3 over canonical JSON.
    fn hash(&self, inputs: &ResourceInputs) -> String {
        hasher::hash_inputs(inputs)
    }
}

/// The back-ends of one account, by resource kind.
#[derive(Clone, Default)]
pub struct Account {
    pub provider: Option<String>,
    backends: HashMap<ResourceKind, Arc<dyn Backend>>,
}

impl Account {
    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.backends.keys().copied()
    }
}

/// Accounts by name.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    accounts: IndexMap<String, Account>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build script back-ends for every account in the configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        for (name, account) in &config.accounts {
            let entry = registry.accounts.entry(name.clone()).or_default();
            entry.provider = account.provider.clone();
            for (kind, scripts) in &account.resources {
                let backend = ScriptBackend::new(*kind, scripts.clone())
                    .with_env(account.env.iter().map(|(k, v)| (k.clone(), v.clone())));
                entry.backends.insert(*kind, Arc::new(backend));
            }
        }
        registry
    }

    pub fn register(&mut self, account: &str, kind: ResourceKind, backend: Arc<dyn Backend>) {
        self.accounts
            .entry(account.to_string())
            .or_default()
            .backends
            .insert(kind, backend);
    }

    pub fn account(&self, name: &str) -> Option<&Account> {
        self.accounts.get(name)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&str, &Account)> {
        self.accounts.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn lookup(&self, inputs: &ResourceInputs) -> std::result::Result<&Arc<dyn Backend>, String> {
        let name = inputs.account();
        let account = self
            .accounts
            .get(name)
            .ok_or_else(|| format!("unknown account '{}'", name))?;
        account
            .backends
            .get(&inputs.kind())
            .ok_or_else(|| format!("account '{}' does not manage {}", name, inputs.kind()))
    }

    /// Resolve the back-end for a step, checking it supports `action`.
    pub fn backend_for(
        &self,
        step: &str,
        inputs: &ResourceInputs,
        action: Action,
    ) -> Result<Arc<dyn Backend>> {
        let backend = self.lookup(inputs).map_err(|message| Error::Configuration {
            step: step.to_string(),
            message,
        })?;
        if !backend.supports(action) {
            return Err(Error::Configuration {
                step: step.to_string(),
                message: format!(
                    "{} back-end of account '{}' does not support {}",
                    inputs.kind(),
                    inputs.account(),
                    action
                ),
            });
        }
        Ok(Arc::clone(backend))
    }
}

impl InputHasher for BackendRegistry {
    fn hash(&self, inputs: &ResourceInputs) -> String {
        match self.lookup(inputs) {
            Ok(backend) => backend.hash(inputs),
            Err(_) => hasher::hash_inputs(inputs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AccountConfig, ScriptConfig};
    use crate::core::reference::Template;
    use crate::resources::{SecretInputs, VpcInputs};
    use futures::stream::{self, StreamExt};

    struct ReadOnly;

    #[async_trait]
    impl Backend for ReadOnly {
        async fn list(&self, _filter: &ListFilter) -> Result<Vec<ResourceRow>, BackendError> {
            Ok(vec![])
        }

        async fn get(&self, _id: &str) -> Result<Option<ResourceRow>, BackendError> {
            Ok(None)
        }

        fn apply(
            &self,
            _ctx: ApplyContext,
            _inputs: ResourceInputs,
            _state: Option<serde_json::Value>,
        ) -> BoxStream<'static, Result<ApplyUpdate, BackendError>> {
            stream::empty().boxed()
        }

        fn destroy(
            &self,
            _ctx: ApplyContext,
            _inputs: ResourceInputs,
            _state: Option<serde_json::Value>,
        ) -> BoxStream<'static, Result<StepState, BackendError>> {
            stream::empty().boxed()
        }

        fn supports(&self, action: Action) -> bool {
            action != Action::Delete
        }

        fn hash(&self, _inputs: &ResourceInputs) -> String {
            "read-only".to_string()
        }
    }

    fn vpc(account: &str) -> ResourceInputs {
        ResourceInputs::Vpc(VpcInputs {
            account: account.to_string(),
            region: Template::literal("nyc1"),
            cidr: None,
            description: None,
        })
    }

    #[test]
    fn test_backend_for_registered() {
        let mut registry = BackendRegistry::new();
        registry.register("do", ResourceKind::Vpc, Arc::new(ReadOnly));
        assert!(registry.backend_for("vpc/a-blue", &vpc("do"), Action::Create).is_ok());
    }

    #[test]
    fn test_backend_for_unknown_account() {
        let registry = BackendRegistry::new();
        let err = registry
            .backend_for("vpc/a-blue", &vpc("aws"), Action::Create)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("unknown account 'aws'"));
        assert_eq!(err.step(), Some("vpc/a-blue"));
    }

    #[test]
    fn test_backend_for_unmanaged_kind() {
        let mut registry = BackendRegistry::new();
        registry.register("do", ResourceKind::Vpc, Arc::new(ReadOnly));
        let secret = ResourceInputs::Secret(SecretInputs {
            account: "do".to_string(),
            data: Template::literal("x"),
            namespace: None,
        });
        let err = registry
            .backend_for("secret/s-blue", &secret, Action::Create)
            .err()
            .unwrap();
        assert!(err.to_string().contains("does not manage secret"));
    }

    #[test]
    fn test_backend_for_unsupported_action() {
        let mut registry = BackendRegistry::new();
        registry.register("do", ResourceKind::Vpc, Arc::new(ReadOnly));
        let err = registry
            .backend_for("vpc/a-blue", &vpc("do"), Action::Delete)
            .err()
            .unwrap();
        assert!(err.to_string().contains("does not support delete"));
    }

    #[test]
    fn test_registry_hash_delegates() {
        let mut registry = BackendRegistry::new();
        registry.register("do", ResourceKind::Vpc, Arc::new(ReadOnly));
        assert_eq!(InputHasher::hash(&registry, &vpc("do")), "read-only");
        assert!(InputHasher::hash(&registry, &vpc("other")).starts_with("blake3:"));
    }

    #[test]
    fn test_from_config() {
        let mut account = AccountConfig {
            provider: Some("digitalocean".to_string()),
            ..AccountConfig::default()
        };
        account.resources.insert(
            ResourceKind::Vpc,
            ScriptConfig {
                apply: "true".to_string(),
                ..ScriptConfig::default()
            },
        );
        let mut config = EngineConfig::default();
        config.accounts.insert("do".to_string(), account);

        let registry = BackendRegistry::from_config(&config);
        let account = registry.account("do").unwrap();
        assert_eq!(account.provider.as_deref(), Some("digitalocean"));
        assert_eq!(account.kinds().collect::<Vec<_>>(), vec![ResourceKind::Vpc]);
        // no destroy script configured
        assert!(registry
            .backend_for("vpc/a-blue", &vpc("do"), Action::Delete)
            .is_err());
    }

    #[test]
    fn test_list_filter_builder() {
        let filter = ListFilter::default().field("region", "nyc1");
        assert_eq!(filter.fields["region"], "nyc1");
    }
}
