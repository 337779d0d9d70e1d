use async_trait::async_trait;

use crate::domain::errors::ApiError;
use crate::domain::models::{
    BranchListing, BranchRecord, BranchSpec, ConnectionUriRequest, CreatedBranch,
};

/// Control-plane operations the orchestrator needs from the branching service.
///
/// Implementations report every failure as an [`ApiError`]; callers decide
/// what is retryable (see [`ApiError::is_locked`]).
#[async_trait]
pub trait BranchingApi: Send + Sync {
    /// Create a branch with one read-write endpoint.
    async fn create_branch(
        &self,
        project_id: &str,
        spec: &BranchSpec,
    ) -> Result<CreatedBranch, ApiError>;

    /// Connection string for a role/database pair on a branch.
    async fn connection_uri(
        &self,
        project_id: &str,
        request: &ConnectionUriRequest,
    ) -> Result<String, ApiError>;

    async fn delete_branch(&self, project_id: &str, branch_id: &str) -> Result<(), ApiError>;

    /// All branches of the project with their annotation values.
    async fn list_branches(&self, project_id: &str) -> Result<BranchListing, ApiError>;

    async fn get_branch(&self, project_id: &str, branch_id: &str)
        -> Result<BranchRecord, ApiError>;
}
