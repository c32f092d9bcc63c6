//! YAML loading and validation for graph and engine configuration files.
//!
//! Beyond the structural checks in [`super::graph`], validation here catches
//! configuration mistakes early:
//! - every `${{ id.key }}` reference names an existing node
//! - the referenced node is reachable through required edges
//! - every node's account exists and manages its resource kind
//! - parallelism is at least one

use super::config::EngineConfig;
use super::error::{Error, Result};
use super::types::Graph;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::state("read", path, e))
}

/// Parse a desired graph from disk.
pub fn parse_graph_file(path: &Path) -> Result<Graph> {
    let content = read(path)?;
    serde_yaml_ng::from_str(&content).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Parse a desired graph from a string.
pub fn parse_graph(yaml: &str) -> std::result::Result<Graph, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Parse engine configuration from disk. Relative directories are resolved
/// against the file's parent.
pub fn parse_config_file(path: &Path) -> Result<EngineConfig> {
    let content = read(path)?;
    let config: EngineConfig = serde_yaml_ng::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(config.rooted_at(base))
}

/// Validate engine configuration. Returns a list of errors (empty = valid).
pub fn validate_config(config: &EngineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if config.parallelism == 0 {
        errors.push(ValidationError {
            message: "parallelism must be at least 1".to_string(),
        });
    }
    for (name, account) in &config.accounts {
        for (kind, scripts) in &account.resources {
            if scripts.apply.trim().is_empty() {
                errors.push(ValidationError {
                    message: format!("account '{}' has an empty apply script for {}", name, kind),
                });
            }
        }
    }
    errors
}

/// Validate a graph against itself and the configured accounts.
pub fn validate_references(graph: &Graph, config: &EngineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let ids: HashSet<String> = graph.nodes.iter().map(|n| n.id()).collect();

    let mut requires: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in graph.edges.iter().filter(|e| e.required) {
        requires
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }

    for node in &graph.nodes {
        let id = node.id();
        let account = node.inputs.account();
        match config.accounts.get(account) {
            None => errors.push(ValidationError {
                message: format!("node '{}' uses unknown account '{}'", id, account),
            }),
            Some(a) if !a.resources.contains_key(&node.kind()) => errors.push(ValidationError {
                message: format!(
                    "node '{}': account '{}' does not manage {}",
                    id,
                    account,
                    node.kind()
                ),
            }),
            Some(_) => {}
        }

        let reachable = reachable_from(&id, &requires);
        for reference in node.inputs.references() {
            if !ids.contains(&reference.step) {
                errors.push(ValidationError {
                    message: format!(
                        "node '{}' references unknown node '{}'",
                        id, reference.step
                    ),
                });
            } else if !reachable.contains(reference.step.as_str()) {
                errors.push(ValidationError {
                    message: format!(
                        "node '{}' references '{}' without a required edge to it",
                        id, reference
                    ),
                });
            }
        }
    }
    errors
}

/// Every id reachable from `start` through required edges.
fn reachable_from<'a>(start: &str, requires: &HashMap<&str, Vec<&'a str>>) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    let mut stack: Vec<&str> = requires.get(start).cloned().unwrap_or_default();
    while let Some(id) = stack.pop() {
        if seen.insert(id) {
            if let Some(next) = requires.get(id) {
                stack.extend(next.iter().copied());
            }
        }
    }
    seen
}
