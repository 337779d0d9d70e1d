//! Branch request and response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prefix under which every generated branch name lives.
pub const BRANCH_NAME_PREFIX: &str = "test/";

/// Annotation key attached to every branch this crate creates.
pub const MARKER_ANNOTATION_KEY: &str = "integration-test";

/// Annotation value identifying branches owned by this crate.
pub const MARKER_ANNOTATION_VALUE: &str = "true";

/// Role the service creates as database owner on new projects.
pub const CONVENTIONAL_ROLE: &str = "neondb_owner";

/// Database the service creates by default on new projects.
pub const CONVENTIONAL_DATABASE: &str = "neondb";

/// How much of the parent the new branch copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BranchInit {
    /// Schema and data.
    #[default]
    ParentData,
    /// Schema only, no rows.
    SchemaOnly,
}

/// Which network path the published connection string uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Through the connection pooler.
    #[default]
    Pooler,
    /// Point-to-point to the compute endpoint.
    Direct,
}

impl EndpointKind {
    pub fn is_pooled(self) -> bool {
        matches!(self, Self::Pooler)
    }
}

/// Creation request for one ephemeral branch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSpec {
    pub name: String,
    pub parent_id: Option<String>,
    pub init: BranchInit,
    pub expires_at: Option<DateTime<Utc>>,
    pub annotation: (String, String),
}

impl BranchSpec {
    /// Build a spec with a fresh `test/<uuid>` name and the marker annotation.
    pub fn generate(
        parent_id: Option<String>,
        init: BranchInit,
        expires_in_seconds: Option<u32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: format!("{BRANCH_NAME_PREFIX}{}", uuid::Uuid::new_v4()),
            parent_id,
            init,
            expires_at: expires_in_seconds
                .map(|secs| now + chrono::Duration::seconds(i64::from(secs))),
            annotation: (
                MARKER_ANNOTATION_KEY.to_string(),
                MARKER_ANNOTATION_VALUE.to_string(),
            ),
        }
    }
}

/// Branch record as stored by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Everything needed to connect as one role to one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub uri: String,
    pub role: String,
    pub password: String,
    pub host: String,
    pub pooler_host: String,
    pub database: String,
}

/// Result of a successful create-branch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedBranch {
    pub branch: BranchRecord,
    pub connection_uris: Vec<ConnectionDescriptor>,
    pub roles: Vec<String>,
    pub databases: Vec<String>,
}

/// Connection string lookup parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUriRequest {
    pub branch_id: String,
    pub role_name: String,
    pub database_name: String,
    pub pooled: bool,
}

/// Branch list plus per-branch annotation values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchListing {
    pub branches: Vec<BranchRecord>,
    pub annotations: HashMap<String, HashMap<String, String>>,
}

impl BranchListing {
    /// Whether the branch carries the marker annotation set to `"true"`.
    pub fn is_marked(&self, branch_id: &str) -> bool {
        self.annotations
            .get(branch_id)
            .and_then(|values| values.get(MARKER_ANNOTATION_KEY))
            .is_some_and(|value| value == MARKER_ANNOTATION_VALUE)
    }

    /// Branches carrying the marker annotation.
    pub fn marked(&self) -> impl Iterator<Item = &BranchRecord> {
        self.branches.iter().filter(|b| self.is_marked(&b.id))
    }
}

/// Live handle to the branch owned by one suite activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub record: BranchRecord,
    pub roles: Vec<String>,
    pub databases: Vec<String>,
    pub connections: Vec<ConnectionDescriptor>,
    /// Role used for the published connection string.
    pub role: String,
    /// Database used for the published connection string.
    pub database: String,
    /// Connection string published to the environment.
    pub connection_uri: String,
}

impl Branch {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn project_id(&self) -> &str {
        &self.record.project_id
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.record.expires_at
    }
}
