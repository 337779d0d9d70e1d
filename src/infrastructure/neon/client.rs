//! Neon control-plane HTTP client.
//!
//! Thin typed wrapper over the v2 REST API. Every call maps transport and
//! status failures to [`ApiError`]; retrying is the caller's business.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::domain::errors::ApiError;
use crate::domain::models::{
    BranchListing, BranchRecord, BranchSpec, ConnectionUriRequest, CreatedBranch,
    DEFAULT_API_BASE_URL,
};
use crate::domain::ports::BranchingApi;

use super::types::{
    ConnectionUriResponse, CreateBranchRequest, CreateBranchResponse, GetBranchResponse,
    ListBranchesResponse,
};

/// Configuration for the Neon HTTP client
#[derive(Clone)]
pub struct NeonClientConfig {
    /// Neon API key
    pub api_key: String,

    /// Base URL including the `/api/v2` path
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl NeonClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for NeonClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeonClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// HTTP client for the Neon REST API v2.
#[derive(Clone)]
pub struct NeonClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl NeonClient {
    /// Create a client against the public Neon API.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_config(NeonClientConfig::new(api_key))
    }

    pub fn with_config(config: NeonClientConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .header("User-Agent", concat!("neon-testing/", env!("CARGO_PKG_VERSION")))
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(format!("{operation} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(operation, status = status.as_u16(), "Neon API call failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(operation: &str, response: Response) -> Result<T, ApiError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(format!("{operation}: {e}")))
    }
}

impl std::fmt::Debug for NeonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeonClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BranchingApi for NeonClient {
    #[instrument(skip(self, spec), fields(branch_name = %spec.name))]
    async fn create_branch(
        &self,
        project_id: &str,
        spec: &BranchSpec,
    ) -> Result<CreatedBranch, ApiError> {
        let body = CreateBranchRequest::from(spec);
        let response = self
            .send(
                "create_branch",
                self.request(Method::POST, &format!("/projects/{project_id}/branches"))
                    .json(&body),
            )
            .await?;

        let created: CreateBranchResponse = Self::decode("create_branch", response).await?;
        Ok(created.into())
    }

    #[instrument(skip(self, request), fields(branch_id = %request.branch_id))]
    async fn connection_uri(
        &self,
        project_id: &str,
        request: &ConnectionUriRequest,
    ) -> Result<String, ApiError> {
        let pooled = if request.pooled { "true" } else { "false" };
        let response = self
            .send(
                "connection_uri",
                self.request(Method::GET, &format!("/projects/{project_id}/connection_uri"))
                    .query(&[
                        ("branch_id", request.branch_id.as_str()),
                        ("database_name", request.database_name.as_str()),
                        ("role_name", request.role_name.as_str()),
                        ("pooled", pooled),
                    ]),
            )
            .await?;

        let uri: ConnectionUriResponse = Self::decode("connection_uri", response).await?;
        Ok(uri.uri)
    }

    #[instrument(skip(self))]
    async fn delete_branch(&self, project_id: &str, branch_id: &str) -> Result<(), ApiError> {
        self.send(
            "delete_branch",
            self.request(
                Method::DELETE,
                &format!("/projects/{project_id}/branches/{branch_id}"),
            ),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_branches(&self, project_id: &str) -> Result<BranchListing, ApiError> {
        let response = self
            .send(
                "list_branches",
                self.request(Method::GET, &format!("/projects/{project_id}/branches")),
            )
            .await?;

        let listing: ListBranchesResponse = Self::decode("list_branches", response).await?;
        Ok(listing.into())
    }

    #[instrument(skip(self))]
    async fn get_branch(
        &self,
        project_id: &str,
        branch_id: &str,
    ) -> Result<BranchRecord, ApiError> {
        let response = self
            .send(
                "get_branch",
                self.request(
                    Method::GET,
                    &format!("/projects/{project_id}/branches/{branch_id}"),
                ),
            )
            .await?;

        let branch: GetBranchResponse = Self::decode("get_branch", response).await?;
        Ok(branch.branch)
    }
}
