//! HTTP resource handler for a REST provider control plane.
//!
//! This is the production [`ResourceHandler`] implementation: one instance
//! per kind, all sharing a single HTTP client. The expected API shape is
//!
//! - `POST   {endpoint}/resources/{kind}`        create
//! - `PUT    {endpoint}/resources/{kind}/{id}`   update
//! - `DELETE {endpoint}/resources/{kind}/{id}`   delete
//! - `GET    {endpoint}/resources/{kind}/{id}`   read / status
//!
//! with bearer-token authentication and JSON bodies.

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ProviderError, Result, StratusError};

use super::handler::{PhysicalResource, ResourceHandler, ResourceStatus};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Shared HTTP transport for all kind handlers.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    /// HTTP client.
    client: Client,
    /// Base URL of the control-plane API.
    endpoint: String,
    /// Bearer token.
    token: String,
}

/// Request body for create operations.
#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    name: &'a str,
    properties: &'a serde_json::Map<String, serde_json::Value>,
}

/// Request body for update operations.
#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    properties: &'a serde_json::Map<String, serde_json::Value>,
}

/// Error body returned by the provider.
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl ProviderClient {
    /// Creates a new provider client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: &str, token: &str) -> Result<Self> {
        Self::with_timeout(endpoint, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(endpoint: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Builds the URL for a kind collection or a single resource.
    fn url(&self, kind: &str, physical_id: Option<&str>) -> String {
        physical_id.map_or_else(
            || format!("{}/resources/{kind}", self.endpoint),
            |id| format!("{}/resources/{kind}/{id}", self.endpoint),
        )
    }

    /// Executes a request with bounded retries on transient failures.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            trace!("{method} {url} (attempt {attempt})");

            let mut request = self
                .client
                .request(method.clone(), url)
                .header(header::AUTHORIZATION, format!("Bearer {}", self.token));
            if let Some(json) = &body {
                request = request.json(json);
            }

            let result = request.send().await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS && attempt <= MAX_RETRIES {
                        debug!("Rate limited by provider, retrying");
                        tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                            .await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) if attempt <= MAX_RETRIES && (e.is_timeout() || e.is_connect()) => {
                    debug!("Transient network error, retrying: {e}");
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                        .await;
                }
                Err(e) => {
                    return Err(StratusError::Provider(ProviderError::network(
                        e.to_string(),
                    )));
                }
            }
        }
    }

    /// Converts an error response into a typed provider error.
    async fn error_from_response(response: reqwest::Response) -> StratusError {
        let status = response.status();
        let message = response
            .json::<ApiError>()
            .await
            .map_or_else(|_| String::from("no error body"), |e| e.message);

        let error = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ProviderError::AuthenticationFailed { message }
            }
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                retry_after_secs: 30,
            },
            _ => ProviderError::api_error(status.as_u16(), message),
        };
        StratusError::Provider(error)
    }

    /// Parses a resource body.
    async fn parse_resource(response: reqwest::Response) -> Result<PhysicalResource> {
        response.json::<PhysicalResource>().await.map_err(|e| {
            StratusError::Provider(ProviderError::InvalidResponse {
                message: e.to_string(),
            })
        })
    }
}

/// HTTP handler for one resource kind.
#[derive(Debug, Clone)]
pub struct HttpHandler {
    /// Shared transport.
    client: ProviderClient,
    /// The kind tag this handler serves.
    kind: String,
}

impl HttpHandler {
    /// Creates a handler for the given kind sharing the given transport.
    #[must_use]
    pub fn new(client: ProviderClient, kind: impl Into<String>) -> Self {
        Self {
            client,
            kind: kind.into(),
        }
    }
}

#[async_trait]
impl ResourceHandler for HttpHandler {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn create(
        &self,
        name: &str,
        properties: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<PhysicalResource> {
        let url = self.client.url(&self.kind, None);
        let body = serde_json::to_value(CreateRequest { name, properties })
            .map_err(|e| StratusError::internal(format!("Failed to encode request: {e}")))?;

        let response = self.client.execute(Method::POST, &url, Some(body)).await?;
        if !response.status().is_success() {
            return Err(ProviderClient::error_from_response(response).await);
        }
        ProviderClient::parse_resource(response).await
    }

    async fn update(
        &self,
        physical_id: &str,
        properties: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<PhysicalResource> {
        let url = self.client.url(&self.kind, Some(physical_id));
        let body = serde_json::to_value(UpdateRequest { properties })
            .map_err(|e| StratusError::internal(format!("Failed to encode request: {e}")))?;

        let response = self.client.execute(Method::PUT, &url, Some(body)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StratusError::Provider(ProviderError::ResourceNotFound {
                physical_id: physical_id.to_string(),
            }));
        }
        if !response.status().is_success() {
            return Err(ProviderClient::error_from_response(response).await);
        }
        ProviderClient::parse_resource(response).await
    }

    async fn delete(&self, physical_id: &str) -> Result<()> {
        let url = self.client.url(&self.kind, Some(physical_id));
        let response = self.client.execute(Method::DELETE, &url, None).await?;

        // A missing resource is already deleted.
        if response.status() == StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(ProviderClient::error_from_response(response).await)
    }

    async fn read(&self, physical_id: &str) -> Result<Option<PhysicalResource>> {
        let url = self.client.url(&self.kind, Some(physical_id));
        let response = self.client.execute(Method::GET, &url, None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ProviderClient::error_from_response(response).await);
        }
        Ok(Some(ProviderClient::parse_resource(response).await?))
    }

    async fn status(&self, physical_id: &str) -> Result<ResourceStatus> {
        match self.read(physical_id).await? {
            Some(resource) => Ok(resource.status),
            None => Ok(ResourceStatus::Gone),
        }
    }
}
