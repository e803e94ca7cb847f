//! Handler registry keyed by resource kind tag.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::{ConfigError, Result, StratusError};

use super::handler::ResourceHandler;
use super::http::{HttpHandler, ProviderClient};
use super::schema::SCHEMAS;

/// Registry of resource handlers, one per kind tag.
///
/// Dispatch over resource kinds happens here rather than through a type
/// hierarchy: the executor asks the registry for the handler matching an
/// action's kind tag.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Handlers keyed by kind tag.
    handlers: HashMap<String, Arc<dyn ResourceHandler>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Creates a registry with an HTTP handler for every known kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn http(config: &ProviderConfig, token: &str) -> Result<Self> {
        let client = ProviderClient::with_timeout(&config.endpoint, token, config.timeout_secs)?;

        let mut registry = Self::new();
        for schema in SCHEMAS {
            registry.register(Arc::new(HttpHandler::new(client.clone(), schema.kind)));
        }
        Ok(registry)
    }

    /// Registers a handler under its kind tag, replacing any existing one.
    pub fn register(&mut self, handler: Arc<dyn ResourceHandler>) {
        self.handlers.insert(handler.kind().to_string(), handler);
    }

    /// Returns the handler for a kind tag.
    ///
    /// # Errors
    ///
    /// Returns an error if no handler is registered for the kind.
    pub fn get(&self, kind: &str) -> Result<Arc<dyn ResourceHandler>> {
        self.handlers.get(kind).cloned().ok_or_else(|| {
            StratusError::Config(ConfigError::UnknownKind {
                name: String::new(),
                kind: kind.to_string(),
            })
        })
    }

    /// Returns the registered kind tags.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
