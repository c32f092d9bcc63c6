//! BLAKE3 fingerprints for step inputs.
//!
//! Input hashes must not depend on map insertion order, so values are
//! canonicalized through `serde_json::Value` (sorted object keys) first.

use crate::resources::ResourceInputs;
use serde::Serialize;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash any serializable value by its canonical JSON form.
pub fn hash_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_value(value)?;
    Ok(hash_string(&canonical.to_string()))
}

/// Default fingerprint of a step's inputs.
pub fn hash_inputs(inputs: &ResourceInputs) -> String {
    // Template and IndexMap serialization cannot fail
    hash_json(inputs).unwrap_or_else(|e| hash_string(&format!("unserializable:{}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reference::Template;
    use crate::resources::{DeploymentInputs, ResourceInputs};
    use indexmap::IndexMap;

    fn deployment(env: &[(&str, &str)]) -> ResourceInputs {
        ResourceInputs::Deployment(DeploymentInputs {
            account: "k8s".to_string(),
            namespace: None,
            image: Template::literal("nginx:1.25"),
            replicas: 2,
            command: vec![],
            environment: env
                .iter()
                .map(|(k, v)| (k.to_string(), Template::literal(*v)))
                .collect::<IndexMap<_, _>>(),
            labels: IndexMap::new(),
        })
    }

    #[test]
    fn test_hash_string() {
        let h1 = hash_string("hello");
        let h2 = hash_string("hello");
        let h3 = hash_string("world");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert!(h1.starts_with("blake3:"));
        assert_eq!(h1.len(), 7 + 64);
    }

    #[test]
    fn test_hash_inputs_ignores_map_order() {
        let a = deployment(&[("A", "1"), ("B", "2")]);
        let b = deployment(&[("B", "2"), ("A", "1")]);
        assert_eq!(hash_inputs(&a), hash_inputs(&b));
    }

    #[test]
    fn test_hash_inputs_detects_change() {
        let a = deployment(&[("A", "1")]);
        let b = deployment(&[("A", "2")]);
        assert_ne!(hash_inputs(&a), hash_inputs(&b));
    }
}
