//! Pipeline persistence: load, save (atomic), path derivation.
//!
//! The executor's final pipeline is the next plan's "before". A missing file
//! means nothing has been applied yet.

use super::error::{Error, Result};
use super::types::Pipeline;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SCHEMA: &str = "1.0";

/// On-disk wrapper around a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub schema: String,
    pub name: String,
    pub generated_at: String,
    pub generator: String,
    pub pipeline: Pipeline,
}

impl PipelineState {
    pub fn new(name: &str, pipeline: Pipeline) -> Self {
        use crate::tripwire::eventlog::now_iso8601;
        Self {
            schema: SCHEMA.to_string(),
            name: name.to_string(),
            generated_at: now_iso8601(),
            generator: format!("tessera {}", env!("CARGO_PKG_VERSION")),
            pipeline,
        }
    }
}

/// Derive the pipeline file path for a named pipeline within the state directory.
pub fn pipeline_path(state_dir: &Path, name: &str) -> PathBuf {
    state_dir.join(name).join("pipeline.yaml")
}

/// Load the persisted pipeline. Returns an empty pipeline if none exists.
pub fn load_pipeline(state_dir: &Path, name: &str) -> Result<Pipeline> {
    let path = pipeline_path(state_dir, name);
    if !path.exists() {
        return Ok(Pipeline::default());
    }
    let content = std::fs::read_to_string(&path).map_err(|e| Error::state("read", &path, e))?;
    let state: PipelineState = serde_yaml_ng::from_str(&content).map_err(|e| Error::Parse {
        path: path.clone(),
        message: e.to_string(),
    })?;
    if state.schema != SCHEMA {
        return Err(Error::Parse {
            path,
            message: format!("unsupported schema '{}'", state.schema),
        });
    }
    Ok(state.pipeline)
}

/// Save a pipeline atomically (write to temp, then rename).
pub fn save_pipeline(state_dir: &Path, name: &str, pipeline: &Pipeline) -> Result<()> {
    let path = pipeline_path(state_dir, name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::state("create", parent, e))?;
    }

    let state = PipelineState::new(name, pipeline.clone());
    let yaml = serde_yaml_ng::to_string(&state).map_err(|e| Error::state("serialize", &path, e))?;

    // Atomic write: temp file + rename
    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml).map_err(|e| Error::state("write", &tmp_path, e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| Error::state("rename", &tmp_path, e))?;

    tracing::debug!(path = %path.display(), steps = pipeline.steps.len(), "saved pipeline");
    Ok(())
}
