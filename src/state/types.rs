//! State types for tracking provisioned resources.
//!
//! These types represent the last-known provisioned state of a deployment
//! unit, used for diffing and idempotent re-application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum retained run history entries.
const MAX_HISTORY: usize = 100;

/// Serde default: state files without the field load as applied.
const fn default_stabilized() -> bool {
    true
}

/// The complete provisioned state of a deployment unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentUnitState {
    /// State format version.
    pub version: String,
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
    /// Hash of the last fully-applied configuration.
    pub config_hash: String,
    /// Records of provisioned resources, keyed by logical name.
    pub records: BTreeMap<String, ResourceRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Run history (recent entries).
    #[serde(default)]
    pub history: Vec<RunHistoryEntry>,
}

/// State record for a single provisioned resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Logical name (from the declaration).
    pub name: String,
    /// Resource kind tag.
    pub kind: String,
    /// Provider-assigned physical identifier.
    pub physical_id: String,
    /// Snapshot hash of the declaration when last applied.
    pub snapshot_hash: String,
    /// Raw property snapshot (reference tokens unresolved).
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// Output attributes reported by the provider.
    #[serde(default)]
    pub outputs: serde_json::Map<String, serde_json::Value>,
    /// Logical names this resource depended on when applied. Needed to
    /// order teardown after the declarations are gone.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether the provider confirmed the resource reached a ready state.
    /// A create committed before a failed stabilization keeps this false
    /// and is replaced on the next plan.
    #[serde(default = "default_stabilized")]
    pub stabilized: bool,
    /// When the resource was first provisioned.
    pub created_at: DateTime<Utc>,
    /// When the record was last committed.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Configuration hash at the time of the run.
    pub config_hash: String,
    /// Overall run status.
    pub status: RunStatus,
    /// Logical names touched by the run.
    pub resources: Vec<String>,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every action applied successfully.
    FullyApplied,
    /// Some actions applied, some failed or were skipped.
    PartiallyApplied,
    /// No action applied successfully.
    Failed,
    /// The plan contained no executable actions.
    NoOp,
}

impl DeploymentUnitState {
    /// Creates a new empty state.
    #[must_use]
    pub fn new(project: &str, environment: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            project: project.to_string(),
            environment: environment.to_string(),
            config_hash: String::new(),
            records: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a record by logical name.
    #[must_use]
    pub fn get_record(&self, name: &str) -> Option<&ResourceRecord> {
        self.records.get(name)
    }

    /// Adds or replaces a record.
    pub fn set_record(&mut self, record: ResourceRecord) {
        self.records.insert(record.name.clone(), record);
        self.last_updated = Utc::now();
    }

    /// Removes a record by logical name (tombstone commit).
    pub fn remove_record(&mut self, name: &str) -> Option<ResourceRecord> {
        let result = self.records.remove(name);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Adds a history entry, keeping the history bounded.
    pub fn add_history(&mut self, entry: RunHistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns all recorded logical names.
    #[must_use]
    pub fn record_names(&self) -> Vec<&str> {
        self.records.keys().map(String::as_str).collect()
    }
}

impl ResourceRecord {
    /// Creates a new record for a freshly provisioned resource.
    #[must_use]
    pub fn new(name: &str, kind: &str, physical_id: &str, snapshot_hash: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            physical_id: physical_id.to_string(),
            snapshot_hash: snapshot_hash.to_string(),
            properties: serde_json::Map::new(),
            outputs: serde_json::Map::new(),
            depends_on: Vec::new(),
            stabilized: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Looks up an output attribute. The implicit `id` attribute resolves to
    /// the physical identifier.
    #[must_use]
    pub fn output(&self, attribute: &str) -> Option<serde_json::Value> {
        if attribute == crate::config::ID_ATTRIBUTE {
            return Some(serde_json::Value::String(self.physical_id.clone()));
        }
        self.outputs.get(attribute).cloned()
    }

    /// Marks the record as re-committed now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl RunHistoryEntry {
    /// Creates a new history entry.
    #[must_use]
    pub fn new(status: RunStatus, config_hash: &str, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            config_hash: config_hash.to_string(),
            status,
            resources,
            error: None,
        }
    }

    /// Creates a failed history entry with an error message.
    #[must_use]
    pub fn failed(
        status: RunStatus,
        config_hash: &str,
        resources: Vec<String>,
        error: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            config_hash: config_hash.to_string(),
            status,
            resources,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::FullyApplied => "fully-applied",
            Self::PartiallyApplied => "partially-applied",
            Self::Failed => "failed",
            Self::NoOp => "no-op",
        };
        write!(f, "{status}")
    }
}
