//! Per-kind outputs produced by a successful apply.

use super::ResourceKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcOutputs {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesClusterOutputs {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vpc: String,
    #[serde(default)]
    pub kubernetes_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceOutputs {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseOutputs {
    pub id: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserOutputs {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOutputs {
    pub id: String,
    #[serde(default)]
    pub labels: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOutputs {
    pub id: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRuleOutputs {
    pub id: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_hostname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretOutputs {
    pub id: String,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecordOutputs {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
}

/// Module outputs are whatever the module declares.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleOutputs {
    #[serde(flatten)]
    pub values: IndexMap<String, serde_json::Value>,
}

/// Applied outputs, one variant per resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResourceOutputs {
    Vpc(VpcOutputs),
    KubernetesCluster(KubernetesClusterOutputs),
    Namespace(NamespaceOutputs),
    Database(DatabaseOutputs),
    DatabaseUser(DatabaseUserOutputs),
    Deployment(DeploymentOutputs),
    Service(ServiceOutputs),
    IngressRule(IngressRuleOutputs),
    Secret(SecretOutputs),
    DnsRecord(DnsRecordOutputs),
    Module(ModuleOutputs),
}

impl ResourceOutputs {
    /// Decode an untagged JSON object as outputs of `kind`.
    pub fn from_json(
        kind: ResourceKind,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let mut value = value;
        if let serde_json::Value::Object(ref mut map) = value {
            map.insert(
                "type".to_string(),
                serde_json::Value::String(kind.to_string()),
            );
        }
        serde_json::from_value(value)
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Vpc(_) => ResourceKind::Vpc,
            Self::KubernetesCluster(_) => ResourceKind::KubernetesCluster,
            Self::Namespace(_) => ResourceKind::Namespace,
            Self::Database(_) => ResourceKind::Database,
            Self::DatabaseUser(_) => ResourceKind::DatabaseUser,
            Self::Deployment(_) => ResourceKind::Deployment,
            Self::Service(_) => ResourceKind::Service,
            Self::IngressRule(_) => ResourceKind::IngressRule,
            Self::Secret(_) => ResourceKind::Secret,
            Self::DnsRecord(_) => ResourceKind::DnsRecord,
            Self::Module(_) => ResourceKind::Module,
        }
    }

    /// Look up an output by key. Dotted keys walk nested objects and arrays.
    pub fn lookup(&self, key: &str) -> Option<serde_json::Value> {
        let root = serde_json::to_value(self).ok()?;
        let mut current = &root;
        for part in key.split('.') {
            current = match current {
                serde_json::Value::Object(map) => map.get(part)?,
                serde_json::Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current.clone())
    }
}
