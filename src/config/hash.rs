//! Declaration hashing for change detection.
//!
//! This module provides deterministic hashing of resource declarations to
//! detect changes between runs and enable idempotent re-application.

use sha2::{Digest, Sha256};

use super::spec::{DeployConfig, ResourceDecl};

/// Hasher for computing declaration snapshot hashes.
#[derive(Debug, Default)]
pub struct DeclHasher;

impl DeclHasher {
    /// Creates a new declaration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the entire deployment unit.
    ///
    /// This hash changes when any declaration or parameter changes.
    #[must_use]
    pub fn hash_config(&self, config: &DeployConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.project.name.as_bytes());
        hasher.update(config.project.environment.as_bytes());

        // Parameters participate: a changed parameter value must produce a
        // different unit hash even though declarations are untouched.
        for (key, value) in &config.parameters {
            hasher.update(key.as_bytes());
            hasher.update(value.to_string().as_bytes());
        }

        // Declarations hashed in name order, not file order.
        let mut decls: Vec<&ResourceDecl> = config.resources.iter().collect();
        decls.sort_by(|a, b| a.name.cmp(&b.name));
        for decl in decls {
            hasher.update(self.hash_decl(decl).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes the snapshot hash for a single declaration.
    ///
    /// This is the value stored in state records and compared during
    /// planning. Property keys are already sorted by `serde_json::Map`, so
    /// serializing the map is deterministic.
    #[must_use]
    pub fn hash_decl(&self, decl: &ResourceDecl) -> String {
        let mut hasher = Sha256::new();

        hasher.update(decl.name.as_bytes());
        hasher.update(decl.kind.as_bytes());
        hasher.update(
            serde_json::Value::Object(decl.properties.clone())
                .to_string()
                .as_bytes(),
        );

        let mut deps = decl.depends_on.clone();
        deps.sort();
        for dep in deps {
            hasher.update(dep.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, image: &str) -> ResourceDecl {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "kind": "compute-service",
            "properties": { "image": image, "cpu": 1024 },
        }))
        .expect("should deserialize")
    }

    #[test]
    fn test_decl_hash_deterministic() {
        let hasher = DeclHasher::new();
        let d = decl("svc", "n8nio/n8n:latest");
        assert_eq!(hasher.hash_decl(&d), hasher.hash_decl(&d));
    }

    #[test]
    fn test_property_change_changes_hash() {
        let hasher = DeclHasher::new();
        let before = decl("svc", "n8nio/n8n:1.0");
        let after = decl("svc", "n8nio/n8n:1.1");
        assert_ne!(hasher.hash_decl(&before), hasher.hash_decl(&after));
    }

    #[test]
    fn test_different_names_different_hash() {
        let hasher = DeclHasher::new();
        assert_ne!(
            hasher.hash_decl(&decl("svc-a", "img")),
            hasher.hash_decl(&decl("svc-b", "img"))
        );
    }

    #[test]
    fn test_depends_on_order_irrelevant() {
        let hasher = DeclHasher::new();
        let mut a = decl("svc", "img");
        a.depends_on = vec![String::from("db"), String::from("vpc")];
        let mut b = decl("svc", "img");
        b.depends_on = vec![String::from("vpc"), String::from("db")];
        assert_eq!(hasher.hash_decl(&a), hasher.hash_decl(&b));
    }

    #[test]
    fn test_short_hash() {
        let hasher = DeclHasher::new();
        assert_eq!(hasher.short_hash("abcdef1234567890"), "abcdef12");
    }
}
