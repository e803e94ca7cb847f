//! Configuration specification types for a deployment unit.
//!
//! This module defines all the structs that map to the `stratus.deploy.yaml`
//! file. These types are declarative: they fully describe the desired set of
//! resources and carry no provisioning logic themselves.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Target of a parameter reference token (`${param.NAME}`).
pub const PARAMETER_TARGET: &str = "param";

/// The implicit output attribute carrying the provider-assigned identifier.
pub const ID_ATTRIBUTE: &str = "id";

/// The root configuration structure for a Stratus deployment unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Provider control-plane configuration.
    pub provider: ProviderConfig,
    /// Externally supplied parameters, referenced as `${param.NAME}`.
    ///
    /// Account-specific identifiers (certificate ARNs, pre-existing secret
    /// ARNs) belong here rather than inline in declarations.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// The resource declarations making up the deployment unit.
    pub resources: Vec<ResourceDecl>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the deployment unit.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// State backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// State directory path (defaults to `.stratus` next to the config file).
    #[serde(default)]
    pub path: Option<String>,
}

/// Provider control-plane configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Base URL of the provider control-plane API.
    pub endpoint: String,
    /// Request timeout in seconds.
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    /// Stabilization poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Stabilization timeout in seconds per action.
    #[serde(default = "default_stabilize_timeout")]
    pub stabilize_timeout_secs: u64,
}

/// A single resource declaration.
///
/// A declaration is inert: a logical name, a kind tag, a property mapping,
/// and references to other declarations embedded as `${name.attribute}`
/// tokens inside property strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceDecl {
    /// Stable logical name, unique within the deployment unit.
    pub name: String,
    /// Resource kind tag (e.g., "network", "managed-database").
    pub kind: String,
    /// Desired property mapping. Keys are sorted by `serde_json::Map`, which
    /// keeps snapshot hashing deterministic.
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// Additional ordering-only dependencies with no data flow.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A reference token of the form `${target.attribute}` found in a property
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// The referenced logical name, or [`PARAMETER_TARGET`].
    pub target: String,
    /// The referenced output attribute or parameter name.
    pub attribute: String,
}

impl Reference {
    /// Returns true if this token resolves a parameter rather than another
    /// resource's output.
    #[must_use]
    pub fn is_parameter(&self) -> bool {
        self.target == PARAMETER_TARGET
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${{{}.{}}}", self.target, self.attribute)
    }
}

/// Extracts all reference tokens from a string.
///
/// # Errors
///
/// Returns a description of the first malformed token encountered.
pub fn extract_references(s: &str) -> std::result::Result<Vec<Reference>, String> {
    let mut refs = Vec::new();
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(format!("unterminated reference token in '{s}'"));
        };
        let token = &after[..end];
        let Some((target, attribute)) = token.split_once('.') else {
            return Err(format!(
                "invalid reference token '${{{token}}}': expected TARGET.ATTRIBUTE"
            ));
        };
        if target.is_empty() || attribute.is_empty() {
            return Err(format!(
                "invalid reference token '${{{token}}}': empty target or attribute"
            ));
        }
        refs.push(Reference {
            target: target.to_string(),
            attribute: attribute.to_string(),
        });
        rest = &after[end + 1..];
    }

    Ok(refs)
}

/// Recursively collects reference tokens from a property value.
///
/// # Errors
///
/// Returns a description of the first malformed token encountered.
pub fn collect_references(
    value: &serde_json::Value,
    out: &mut Vec<Reference>,
) -> std::result::Result<(), String> {
    match value {
        serde_json::Value::String(s) => out.extend(extract_references(s)?),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_references(item, out)?;
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_references(item, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

impl ResourceDecl {
    /// Returns all reference tokens in this declaration's properties.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed token encountered.
    pub fn references(&self) -> std::result::Result<Vec<Reference>, String> {
        let mut refs = Vec::new();
        for value in self.properties.values() {
            collect_references(value, &mut refs)?;
        }
        Ok(refs)
    }

    /// Returns the logical names this declaration depends on: resource
    /// references plus explicit `depends_on` entries, deduplicated.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed token encountered.
    pub fn dependency_names(&self) -> std::result::Result<Vec<String>, String> {
        let mut names: Vec<String> = self
            .references()?
            .into_iter()
            .filter(|r| !r.is_parameter())
            .map(|r| r.target)
            .collect();
        names.extend(self.depends_on.iter().cloned());
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Returns the property keys whose values reference `target`.
    #[must_use]
    pub fn keys_referencing(&self, target: &str) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|(_, value)| {
                let mut refs = Vec::new();
                collect_references(value, &mut refs).is_ok()
                    && refs.iter().any(|r| r.target == target)
            })
            .map(|(key, _)| key.as_str())
            .collect()
    }
}

impl DeployConfig {
    /// Returns the fully qualified project name including environment.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }

    /// Returns the declarations keyed by logical name.
    ///
    /// Duplicate names are rejected by the validator; this method keeps the
    /// last occurrence.
    #[must_use]
    pub fn declarations(&self) -> BTreeMap<String, ResourceDecl> {
        self.resources
            .iter()
            .map(|decl| (decl.name.clone(), decl.clone()))
            .collect()
    }

    /// Returns declared logical names in file order.
    #[must_use]
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }
}

// Default value functions

fn default_environment() -> String {
    String::from("dev")
}

const fn default_provider_timeout() -> u64 {
    30
}

const fn default_poll_interval() -> u64 {
    5
}

const fn default_stabilize_timeout() -> u64 {
    600
}
