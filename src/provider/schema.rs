//! Static schema table for known resource kinds.
//!
//! Each kind tag maps to a schema describing which property keys are
//! immutable. A change to an immutable key cannot be applied in place and
//! forces a replacement (delete-then-create).

/// Schema for a single resource kind.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSchema {
    /// The kind tag.
    pub kind: &'static str,
    /// Property keys the provider cannot change in place.
    pub immutable: &'static [&'static str],
}

/// Known resource kinds and their immutable property keys.
pub const SCHEMAS: &[ResourceSchema] = &[
    ResourceSchema {
        kind: "network",
        immutable: &["cidr", "max_azs"],
    },
    ResourceSchema {
        kind: "static-address",
        immutable: &[],
    },
    ResourceSchema {
        kind: "security-group",
        immutable: &["network"],
    },
    ResourceSchema {
        kind: "secret",
        immutable: &["template", "generate_key"],
    },
    ResourceSchema {
        kind: "managed-database",
        immutable: &["engine", "network", "storage_encrypted", "database_name"],
    },
    ResourceSchema {
        kind: "container-cluster",
        immutable: &["network"],
    },
    ResourceSchema {
        kind: "compute-service",
        immutable: &["network", "cluster"],
    },
    ResourceSchema {
        kind: "load-balancer",
        immutable: &["network", "scheme"],
    },
    ResourceSchema {
        kind: "load-balancer-listener",
        immutable: &["load_balancer", "port"],
    },
    ResourceSchema {
        kind: "access-host",
        immutable: &["network"],
    },
];

/// Looks up the schema for a kind tag.
#[must_use]
pub fn lookup(kind: &str) -> Option<&'static ResourceSchema> {
    SCHEMAS.iter().find(|s| s.kind == kind)
}

/// Returns true if the given property key is immutable for the kind.
///
/// Unknown kinds report every key as mutable; the validator rejects unknown
/// kinds before planning.
#[must_use]
pub fn is_immutable(kind: &str, key: &str) -> bool {
    lookup(kind).is_some_and(|s| s.immutable.contains(&key))
}
