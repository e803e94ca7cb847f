//! Provider integration: capability trait, HTTP implementation, registry,
//! and the static kind schema table.

mod handler;
mod http;
mod registry;
pub mod schema;

pub use handler::{PhysicalResource, ResourceHandler, ResourceStatus};
pub use http::{HttpHandler, ProviderClient};
pub use registry::ProviderRegistry;
