//! Wire types for the Neon v2 control-plane API.
//!
//! Only the fields the orchestrator reads are modelled; unknown fields are
//! ignored on deserialization.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::{
    BranchInit, BranchListing, BranchRecord, BranchSpec, ConnectionDescriptor, CreatedBranch,
};

#[derive(Debug, Clone, Serialize)]
pub struct CreateBranchRequest {
    pub branch: BranchCreate,
    pub endpoints: Vec<EndpointCreate>,
    pub annotation_value: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub init_source: BranchInit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointCreate {
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&BranchSpec> for CreateBranchRequest {
    fn from(spec: &BranchSpec) -> Self {
        let (key, value) = spec.annotation.clone();
        Self {
            branch: BranchCreate {
                name: spec.name.clone(),
                parent_id: spec.parent_id.clone(),
                init_source: spec.init,
                expires_at: spec.expires_at,
            },
            endpoints: vec![EndpointCreate {
                kind: "read_write".to_string(),
            }],
            annotation_value: HashMap::from([(key, value)]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBranchResponse {
    pub branch: BranchRecord,
    #[serde(default)]
    pub connection_uris: Vec<ConnectionUriEntry>,
    #[serde(default)]
    pub roles: Vec<NamedEntry>,
    #[serde(default)]
    pub databases: Vec<NamedEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionUriEntry {
    pub connection_uri: String,
    pub connection_parameters: ConnectionParameters,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionParameters {
    pub database: String,
    pub password: String,
    pub role: String,
    pub host: String,
    pub pooler_host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedEntry {
    pub name: String,
}

impl From<CreateBranchResponse> for CreatedBranch {
    fn from(response: CreateBranchResponse) -> Self {
        Self {
            branch: response.branch,
            connection_uris: response
                .connection_uris
                .into_iter()
                .map(|entry| ConnectionDescriptor {
                    uri: entry.connection_uri,
                    role: entry.connection_parameters.role,
                    password: entry.connection_parameters.password,
                    host: entry.connection_parameters.host,
                    pooler_host: entry.connection_parameters.pooler_host,
                    database: entry.connection_parameters.database,
                })
                .collect(),
            roles: response.roles.into_iter().map(|r| r.name).collect(),
            databases: response.databases.into_iter().map(|d| d.name).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionUriResponse {
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetBranchResponse {
    pub branch: BranchRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListBranchesResponse {
    pub branches: Vec<BranchRecord>,
    #[serde(default)]
    pub annotations: HashMap<String, AnnotationEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationEntry {
    #[serde(default)]
    pub value: HashMap<String, String>,
}

impl From<ListBranchesResponse> for BranchListing {
    fn from(response: ListBranchesResponse) -> Self {
        Self {
            branches: response.branches,
            annotations: response
                .annotations
                .into_iter()
                .map(|(branch_id, entry)| (branch_id, entry.value))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_create_request_shape() {
        let spec = BranchSpec {
            name: "test/abc".to_string(),
            parent_id: None,
            init: BranchInit::SchemaOnly,
            expires_at: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 10, 0).unwrap()),
            annotation: ("integration-test".to_string(), "true".to_string()),
        };

        let body = serde_json::to_value(CreateBranchRequest::from(&spec)).unwrap();

        assert_eq!(body["branch"]["name"], "test/abc");
        assert!(body["branch"].get("parent_id").is_none());
        assert_eq!(body["branch"]["init_source"], "schema-only");
        assert_eq!(body["branch"]["expires_at"], "2026-01-01T00:10:00Z");
        assert_eq!(body["endpoints"][0]["type"], "read_write");
        assert_eq!(body["annotation_value"]["integration-test"], "true");
    }

    #[test]
    fn test_list_response_keeps_annotation_values() {
        let json = serde_json::json!({
            "branches": [
                {"id": "br-1", "project_id": "p", "name": "test/1", "created_at": "2026-01-01T00:00:00Z"}
            ],
            "annotations": {
                "br-1": {"object": {"type": "console/branch", "id": "br-1"}, "value": {"integration-test": "true"}}
            }
        });

        let listing: BranchListing = serde_json::from_value::<ListBranchesResponse>(json)
            .unwrap()
            .into();

        assert_eq!(listing.branches.len(), 1);
        assert!(listing.is_marked("br-1"));
    }
}
