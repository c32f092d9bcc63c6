//! Per-kind desired inputs.
//!
//! String fields that may reference other steps are [`Template`]s; everything
//! else is literal. `account` names the back-end account that owns the
//! resource and is never a reference.

use super::ResourceKind;
use crate::core::error::Result;
use crate::core::reference::{OutputRef, OutputSource, Template};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcInputs {
    pub account: String,
    pub region: Template,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<Template>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Template>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    pub name: String,
    pub count: u32,
    pub node_size: Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesClusterInputs {
    pub account: String,
    pub region: Template,
    pub vpc: Template,
    pub kubernetes_version: Template,
    #[serde(default)]
    pub node_pools: Vec<NodePool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceInputs {
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<Template>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInputs {
    pub account: String,
    pub region: Template,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc: Option<Template>,
    pub database_type: Template,
    pub database_version: Template,
    pub database_size: Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserInputs {
    pub account: String,
    pub database: Template,
    pub username: Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInputs {
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Template>,
    pub image: Template,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default)]
    pub command: Vec<Template>,
    #[serde(default)]
    pub environment: IndexMap<String, Template>,
    #[serde(default)]
    pub labels: IndexMap<String, String>,
}

fn default_replicas() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInputs {
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Template>,
    pub target_deployment: Template,
    pub target_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "http".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRuleInputs {
    pub account: String,
    pub service: Template,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<Template>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Template>,
    #[serde(default)]
    pub internal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretInputs {
    pub account: String,
    pub data: Template,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Template>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecordInputs {
    pub account: String,
    pub dns_zone: Template,
    pub record_type: String,
    pub subdomain: Template,
    pub content: Template,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

/// A module executed through an infrastructure-as-code plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInputs {
    pub account: String,
    pub source: String,
    #[serde(default = "default_plugin")]
    pub plugin: String,
    #[serde(default)]
    pub inputs: IndexMap<String, Template>,
}

fn default_plugin() -> String {
    "opentofu".to_string()
}

/// Desired inputs, one variant per resource kind. Serialized adjacently
/// tagged so a node reads `{type: vpc, inputs: {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "inputs", rename_all = "camelCase")]
pub enum ResourceInputs {
    Vpc(VpcInputs),
    KubernetesCluster(KubernetesClusterInputs),
    Namespace(NamespaceInputs),
    Database(DatabaseInputs),
    DatabaseUser(DatabaseUserInputs),
    Deployment(DeploymentInputs),
    Service(ServiceInputs),
    IngressRule(IngressRuleInputs),
    Secret(SecretInputs),
    DnsRecord(DnsRecordInputs),
    Module(ModuleInputs),
}

impl ResourceInputs {
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

    /// Account that owns this resource.
    pub fn account(&self) -> &str {
        match self {
            Self::Vpc(i) => &i.account,
            Self::KubernetesCluster(i) => &i.account,
            Self::Namespace(i) => &i.account,
            Self::Database(i) => &i.account,
            Self::DatabaseUser(i) => &i.account,
            Self::Deployment(i) => &i.account,
            Self::Service(i) => &i.account,
            Self::IngressRule(i) => &i.account,
            Self::Secret(i) => &i.account,
            Self::DnsRecord(i) => &i.account,
            Self::Module(i) => &i.account,
        }
    }

    /// Every template field, in declaration order.
    pub fn templates(&self) -> Vec<&Template> {
        let mut out: Vec<&Template> = Vec::new();
        match self {
            Self::Vpc(i) => {
                out.push(&i.region);
                out.extend(i.cidr.iter());
                out.extend(i.description.iter());
            }
            Self::KubernetesCluster(i) => {
                out.extend([&i.region, &i.vpc, &i.kubernetes_version]);
                out.extend(i.node_pools.iter().map(|p| &p.node_size));
            }
            Self::Namespace(i) => out.extend(i.cluster.iter()),
            Self::Database(i) => {
                out.push(&i.region);
                out.extend(i.vpc.iter());
                out.extend([&i.database_type, &i.database_version, &i.database_size]);
            }
            Self::DatabaseUser(i) => out.extend([&i.database, &i.username]),
            Self::Deployment(i) => {
                out.extend(i.namespace.iter());
                out.push(&i.image);
                out.extend(i.command.iter());
                out.extend(i.environment.values());
            }
            Self::Service(i) => {
                out.extend(i.namespace.iter());
                out.push(&i.target_deployment);
            }
            Self::IngressRule(i) => {
                out.push(&i.service);
                out.extend(i.host.iter());
                out.extend(i.path.iter());
            }
            Self::Secret(i) => {
                out.push(&i.data);
                out.extend(i.namespace.iter());
            }
            Self::DnsRecord(i) => out.extend([&i.dns_zone, &i.subdomain, &i.content]),
            Self::Module(i) => out.extend(i.inputs.values()),
        }
        out
    }

    /// Mutable view of every template field, same order as [`Self::templates`].
    pub fn templates_mut(&mut self) -> Vec<&mut Template> {
        let mut out: Vec<&mut Template> = Vec::new();
        match self {
            Self::Vpc(i) => {
                out.push(&mut i.region);
                out.extend(i.cidr.iter_mut());
                out.extend(i.description.iter_mut());
            }
            Self::KubernetesCluster(i) => {
                out.push(&mut i.region);
                out.push(&mut i.vpc);
                out.push(&mut i.kubernetes_version);
                out.extend(i.node_pools.iter_mut().map(|p| &mut p.node_size));
            }
            Self::Namespace(i) => out.extend(i.cluster.iter_mut()),
            Self::Database(i) => {
                out.push(&mut i.region);
                out.extend(i.vpc.iter_mut());
                out.push(&mut i.database_type);
                out.push(&mut i.database_version);
                out.push(&mut i.database_size);
            }
            Self::DatabaseUser(i) => {
                out.push(&mut i.database);
                out.push(&mut i.username);
            }
            Self::Deployment(i) => {
                out.extend(i.namespace.iter_mut());
                out.push(&mut i.image);
                out.extend(i.command.iter_mut());
                out.extend(i.environment.values_mut());
            }
            Self::Service(i) => {
                out.extend(i.namespace.iter_mut());
                out.push(&mut i.target_deployment);
            }
            Self::IngressRule(i) => {
                out.push(&mut i.service);
                out.extend(i.host.iter_mut());
                out.extend(i.path.iter_mut());
            }
            Self::Secret(i) => {
                out.push(&mut i.data);
                out.extend(i.namespace.iter_mut());
            }
            Self::DnsRecord(i) => {
                out.push(&mut i.dns_zone);
                out.push(&mut i.subdomain);
                out.push(&mut i.content);
            }
            Self::Module(i) => out.extend(i.inputs.values_mut()),
        }
        out
    }

    /// All outgoing references.
    pub fn references(&self) -> Vec<&OutputRef> {
        self.templates().into_iter().flat_map(|t| t.refs()).collect()
    }

    /// Structural rewrite: point references at new ids.
    pub fn rewrite_ids(&mut self, ids: &HashMap<String, String>) {
        for t in self.templates_mut() {
            t.rewrite_ids(ids);
        }
    }

    /// Value substitution: a copy with every reference replaced by its output.
    pub fn interpolate(&self, referrer: &str, source: &dyn OutputSource) -> Result<Self> {
        let mut resolved = self.clone();
        for t in resolved.templates_mut() {
            *t = t.resolve(referrer, source)?;
        }
        Ok(resolved)
    }
}
