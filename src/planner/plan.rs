//! Plan types.
//!
//! A plan is an ordered sequence of actions reconciling provisioned state
//! with the current declarations. Every action appears after all actions it
//! depends on; no-op resources are retained for visibility but excluded from
//! the executable sequence.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Provision a new resource.
    Create,
    /// Update an existing resource in place.
    Update,
    /// Tear down a resource.
    Delete,
}

/// A single property difference.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyChange {
    /// Property key.
    pub key: String,
    /// Previous value, if any.
    pub old: Option<serde_json::Value>,
    /// Desired value, if any.
    pub new: Option<serde_json::Value>,
}

/// A single planned action.
#[derive(Debug, Clone, Serialize)]
pub struct PlanAction {
    /// Action type.
    pub action_type: ActionType,
    /// Logical name of the resource.
    pub name: String,
    /// Resource kind tag.
    pub kind: String,
    /// Reason for this action.
    pub reason: String,
    /// Provider-assigned identifier (for delete/update).
    pub physical_id: Option<String>,
    /// Property-level diff (empty for pure deletes).
    pub changes: Vec<PropertyChange>,
    /// True if this action is one half of a replacement
    /// (delete-then-create of the same logical name).
    pub part_of_replacement: bool,
}

/// A complete plan for one run.
#[derive(Debug, Serialize)]
pub struct Plan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Configuration hash this plan is based on.
    pub config_hash: String,
    /// Executable actions in dependency order.
    pub actions: Vec<PlanAction>,
    /// Logical names with no changes (excluded from execution).
    pub unchanged: Vec<String>,
}

impl Plan {
    /// Creates an empty plan (no changes needed).
    #[must_use]
    pub fn empty(config_hash: &str) -> Self {
        Self {
            created_at: Utc::now(),
            config_hash: config_hash.to_string(),
            actions: vec![],
            unchanged: vec![],
        }
    }

    /// Returns true if the plan has no executable actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of executable actions.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of create actions.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.count(ActionType::Create)
    }

    /// Returns the number of update actions.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.count(ActionType::Update)
    }

    /// Returns the number of delete actions.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.count(ActionType::Delete)
    }

    fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }
}

impl PlanAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::Create => format!("Create {} '{}'", self.kind, self.name),
            ActionType::Update => format!("Update {} '{}'", self.kind, self.name),
            ActionType::Delete => format!("Delete {} '{}'", self.kind, self.name),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action_type, self.name)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(
            f,
            "Plan: {} to create, {} to update, {} to delete, {} unchanged",
            self.create_count(),
            self.update_count(),
            self.delete_count(),
            self.unchanged.len()
        )?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {}. {action}", i + 1)?;
        }

        Ok(())
    }
}
