//! Error taxonomy for planning and execution.
//!
//! Structural and configuration errors are raised before any back-end call;
//! interpolation and execution errors abort an apply run but leave the
//! pipeline intact for persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// An edge references a step or node that does not exist.
    #[error("'{missing}' is missing but required by '{required_by}'")]
    Structural {
        missing: String,
        required_by: String,
    },

    /// Two steps or nodes share an id.
    #[error("duplicate id '{0}'")]
    DuplicateId(String),

    /// Unterminated steps remain but none can be scheduled.
    #[error("dependency cycle or unresolved dependency involving: {}", .0.join(", "))]
    Cycle(Vec<String>),

    /// A `${{ id.key }}` reference could not be resolved.
    #[error("step '{step}': {message}")]
    Interpolation { step: String, message: String },

    /// A back-end apply, destroy, or hook failed.
    #[error("step '{step}' failed: {message}")]
    Execution { step: String, message: String },

    /// Unknown account, resource kind, or unsupported action.
    #[error("step '{step}': {message}")]
    Configuration { step: String, message: String },

    /// Malformed reference template.
    #[error("invalid reference in '{input}': {message}")]
    Template { input: String, message: String },

    /// Engine configuration file problems.
    #[error("config error: {0}")]
    Config(String),

    /// Persistence failures.
    #[error("cannot {action} {}: {message}", .path.display())]
    State {
        action: &'static str,
        path: PathBuf,
        message: String,
    },

    /// Graph or pipeline documents that fail to deserialize.
    #[error("parse error in {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

impl Error {
    pub(crate) fn state(action: &'static str, path: &std::path::Path, e: impl ToString) -> Self {
        Self::State {
            action,
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    }

    /// Id of the step the error is attributed to, when there is one.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Interpolation { step, .. }
            | Self::Execution { step, .. }
            | Self::Configuration { step, .. } => Some(step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_message_names_both_ends() {
        let e = Error::Structural {
            missing: "b".to_string(),
            required_by: "a".to_string(),
        };
        assert_eq!(e.to_string(), "'b' is missing but required by 'a'");
    }

    #[test]
    fn test_cycle_message_lists_members() {
        let e = Error::Cycle(vec!["x".to_string(), "y".to_string()]);
        assert!(e.to_string().contains("x, y"));
    }

    #[test]
    fn test_step_attribution() {
        let e = Error::Execution {
            step: "vpc/main-blue".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(e.step(), Some("vpc/main-blue"));
        assert_eq!(Error::Config("x".to_string()).step(), None);
    }

    #[test]
    fn test_state_error_display() {
        let e = Error::state("read", std::path::Path::new("/s/p.yaml"), "denied");
        assert_eq!(e.to_string(), "cannot read /s/p.yaml: denied");
    }
}
