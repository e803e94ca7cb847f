//! Capability interface for provider resource operations.
//!
//! A [`ResourceHandler`] implements the create/read/update/delete/status
//! operations for one resource kind. The executor is agnostic to how a
//! handler talks to its provider; it only relies on this trait and on the
//! status query for stabilization waits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A provisioned resource as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalResource {
    /// Provider-assigned identifier.
    pub id: String,
    /// Output attributes (e.g. a database's generated address).
    #[serde(default)]
    pub outputs: serde_json::Map<String, serde_json::Value>,
    /// Current lifecycle status.
    pub status: ResourceStatus,
}

/// Lifecycle status of a physical resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// The resource is transitioning toward its target state.
    Pending,
    /// The resource has stabilized and is operational.
    Ready,
    /// The resource entered a terminal failed state.
    Failed,
    /// The resource is being torn down.
    Deleting,
    /// The resource no longer exists.
    Gone,
}

impl ResourceStatus {
    /// Returns true if the status is terminal for a create/update wait.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Gone)
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
            Self::Gone => "gone",
        };
        write!(f, "{s}")
    }
}

/// Capability interface implemented once per resource kind tag.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// The kind tag this handler serves.
    fn kind(&self) -> &str;

    /// Creates a resource with the given resolved properties.
    async fn create(
        &self,
        name: &str,
        properties: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<PhysicalResource>;

    /// Updates an existing resource in place.
    async fn update(
        &self,
        physical_id: &str,
        properties: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<PhysicalResource>;

    /// Deletes a resource. Deleting an already-gone resource succeeds.
    async fn delete(&self, physical_id: &str) -> Result<()>;

    /// Reads a resource, returning `None` if it does not exist.
    async fn read(&self, physical_id: &str) -> Result<Option<PhysicalResource>>;

    /// Queries the lifecycle status, used for stabilization waits.
    async fn status(&self, physical_id: &str) -> Result<ResourceStatus>;
}
