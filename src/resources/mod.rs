//! Resource kinds: closed unions of per-kind inputs and outputs.
//!
//! Every desired node carries one [`ResourceInputs`] variant and every applied
//! step one [`ResourceOutputs`] variant of the same kind. Back-ends are
//! registered per kind.

pub mod inputs;
pub mod outputs;

pub use inputs::*;
pub use outputs::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resource kind enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Vpc,
    KubernetesCluster,
    Namespace,
    Database,
    DatabaseUser,
    Deployment,
    Service,
    IngressRule,
    Secret,
    DnsRecord,
    Module,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 11] = [
        Self::Vpc,
        Self::KubernetesCluster,
        Self::Namespace,
        Self::Database,
        Self::DatabaseUser,
        Self::Deployment,
        Self::Service,
        Self::IngressRule,
        Self::Secret,
        Self::DnsRecord,
        Self::Module,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vpc => "vpc",
            Self::KubernetesCluster => "kubernetesCluster",
            Self::Namespace => "namespace",
            Self::Database => "database",
            Self::DatabaseUser => "databaseUser",
            Self::Deployment => "deployment",
            Self::Service => "service",
            Self::IngressRule => "ingressRule",
            Self::Secret => "secret",
            Self::DnsRecord => "dnsRecord",
            Self::Module => "module",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown resource type '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display_matches_serde() {
        for kind in ResourceKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(
            "kubernetesCluster".parse::<ResourceKind>().unwrap(),
            ResourceKind::KubernetesCluster
        );
        assert!("bucket".parse::<ResourceKind>().is_err());
    }
}
