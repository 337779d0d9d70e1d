//! Bulk removal of orphaned test branches.
//!
//! Safety net for runs that were interrupted before teardown: every branch
//! carrying the marker annotation is deleted, one at a time.

use tracing::{debug, info, instrument, warn};

use crate::domain::errors::ApiError;
use crate::domain::ports::BranchingApi;
use crate::infrastructure::retry::RetryPolicy;

/// Delete one branch, retrying while it is locked.
///
/// Returns `false` when the service no longer knows the branch, which
/// counts as already deleted.
pub async fn delete_branch(
    api: &dyn BranchingApi,
    project_id: &str,
    branch_id: &str,
    retry: RetryPolicy,
) -> Result<bool, ApiError> {
    match retry
        .execute(
            move || api.delete_branch(project_id, branch_id),
            ApiError::is_locked,
        )
        .await
    {
        Ok(()) => {
            debug!(project_id, branch_id, "Deleted branch");
            Ok(true)
        }
        Err(err) if err.status() == Some(404) => {
            warn!(project_id, branch_id, "Branch already gone");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Delete every marked branch in the project and return the deleted ids.
///
/// Running it when nothing is marked is a no-op.
#[instrument(skip(api, retry))]
pub async fn delete_marked_branches(
    api: &dyn BranchingApi,
    project_id: &str,
    retry: RetryPolicy,
) -> Result<Vec<String>, ApiError> {
    let listing = retry
        .execute(move || api.list_branches(project_id), ApiError::is_locked)
        .await?;

    let marked: Vec<String> = listing.marked().map(|b| b.id.clone()).collect();
    if marked.is_empty() {
        info!("No test branches to clean up");
        return Ok(Vec::new());
    }

    let mut deleted = Vec::with_capacity(marked.len());
    for branch_id in marked {
        if delete_branch(api, project_id, &branch_id, retry).await? {
            deleted.push(branch_id);
        }
    }

    info!(deleted = deleted.len(), "Cleaned up test branches");
    Ok(deleted)
}
