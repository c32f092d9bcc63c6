//! Engine configuration: directories, worker pool size, back-end accounts.
//!
//! Passed explicitly into the executor and the back-end registry; nothing
//! reads configuration from global state.

use crate::resources::ResourceKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level engine configuration (`tessera.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Where persisted pipelines and event logs live
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Root of per-step working directories
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Maximum steps executing at once
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Append apply/step events to `<state_dir>/<pipeline>/events.jsonl`
    #[serde(default)]
    pub event_log: bool,

    /// Back-end accounts by name
    #[serde(default)]
    pub accounts: IndexMap<String, AccountConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            work_dir: default_work_dir(),
            parallelism: default_parallelism(),
            event_log: false,
            accounts: IndexMap::new(),
        }
    }
}

impl EngineConfig {
    /// Resolve relative directories against `base` (the config file's dir).
    pub fn rooted_at(mut self, base: &Path) -> Self {
        if self.state_dir.is_relative() {
            self.state_dir = base.join(&self.state_dir);
        }
        if self.work_dir.is_relative() {
            self.work_dir = base.join(&self.work_dir);
        }
        self
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".tessera/work")
}

fn default_parallelism() -> usize {
    1
}

/// One back-end account: which resource kinds it manages and how.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Free-form provider label, shown in logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Extra environment for every script of this account
    #[serde(default)]
    pub env: IndexMap<String, String>,

    #[serde(default)]
    pub resources: IndexMap<ResourceKind, ScriptConfig>,
}

/// Shell scripts implementing a back-end for one resource kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptConfig {
    pub apply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destroy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_create: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_delete: Option<String>,
}
