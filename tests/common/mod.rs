//! Common test utilities for integration tests
//!
//! In-memory stand-ins for the Neon control plane and the WebSocket
//! connector, sharing one event log so tests can assert cross-component
//! ordering (connection closes before branch deletion, and so on).

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use neon_testing::domain::models::{
    BranchListing, BranchRecord, BranchSpec, ConnectionDescriptor, ConnectionUriRequest,
    CreatedBranch, MARKER_ANNOTATION_KEY,
};
use neon_testing::services::error_guard::{self, AsyncError, ScopeId};
use neon_testing::{
    ApiError, BranchingApi, ConnectionError, ConnectionFactory, NeonTestingOptions,
    RealtimeConnection, RetryConfig,
};

/// Ordered record of fake API calls and connection closes.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::default()
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Serializes tests that touch the process-wide error guard.
pub fn serial() -> &'static tokio::sync::Mutex<()> {
    static LOCK: OnceLock<tokio::sync::Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| tokio::sync::Mutex::new(()))
}

/// Options with fast retries and a test-specific environment variable.
pub fn test_options(env_var: &str) -> NeonTestingOptions {
    let mut options = NeonTestingOptions::new("napi_test_key", "proj-test");
    options.database_url_env = env_var.to_string();
    options.retry = RetryConfig {
        max_attempts: 4,
        base_delay_ms: 1,
    };
    options
}

pub fn status(code: u16) -> ApiError {
    ApiError::Status {
        status: code,
        body: format!("{{\"message\":\"status {code}\"}}"),
    }
}

#[derive(Default)]
struct FakeState {
    branches: Vec<BranchRecord>,
    annotations: HashMap<String, HashMap<String, String>>,
    specs: Vec<BranchSpec>,
    uri_requests: Vec<ConnectionUriRequest>,
    create_failures: VecDeque<ApiError>,
    delete_failures: VecDeque<ApiError>,
    next_id: u32,
}

/// In-memory branching control plane.
pub struct FakeBranchingApi {
    state: Mutex<FakeState>,
    roles: Vec<String>,
    databases: Vec<String>,
    log: EventLog,
}

impl FakeBranchingApi {
    pub fn new(log: EventLog) -> Self {
        Self {
            state: Mutex::default(),
            roles: vec!["neondb_owner".to_string()],
            databases: vec!["neondb".to_string()],
            log,
        }
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with_databases(mut self, databases: &[&str]) -> Self {
        self.databases = databases.iter().map(ToString::to_string).collect();
        self
    }

    /// Fail the next create calls with the given errors, in order.
    pub fn fail_creates(self, errors: impl IntoIterator<Item = ApiError>) -> Self {
        self.state.lock().unwrap().create_failures.extend(errors);
        self
    }

    pub fn fail_deletes(self, errors: impl IntoIterator<Item = ApiError>) -> Self {
        self.state.lock().unwrap().delete_failures.extend(errors);
        self
    }

    /// Add an existing branch, optionally carrying the marker annotation.
    pub fn seed_branch(&self, id: &str, marked: bool) {
        let mut state = self.state.lock().unwrap();
        state.branches.push(BranchRecord {
            id: id.to_string(),
            project_id: "proj-test".to_string(),
            name: id.to_string(),
            parent_id: None,
            created_at: Utc::now(),
            expires_at: None,
        });
        if marked {
            state.annotations.insert(
                id.to_string(),
                HashMap::from([(MARKER_ANNOTATION_KEY.to_string(), "true".to_string())]),
            );
        }
    }

    pub fn branch_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.branches.iter().map(|b| b.id.clone()).collect()
    }

    pub fn branch(&self, id: &str) -> Option<BranchRecord> {
        let state = self.state.lock().unwrap();
        state.branches.iter().find(|b| b.id == id).cloned()
    }

    pub fn specs(&self) -> Vec<BranchSpec> {
        self.state.lock().unwrap().specs.clone()
    }

    pub fn uri_requests(&self) -> Vec<ConnectionUriRequest> {
        self.state.lock().unwrap().uri_requests.clone()
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

#[async_trait]
impl BranchingApi for FakeBranchingApi {
    async fn create_branch(
        &self,
        project_id: &str,
        spec: &BranchSpec,
    ) -> Result<CreatedBranch, ApiError> {
        self.record(format!("create:{project_id}"));
        let mut state = self.state.lock().unwrap();
        state.specs.push(spec.clone());
        if let Some(err) = state.create_failures.pop_front() {
            return Err(err);
        }

        state.next_id += 1;
        let record = BranchRecord {
            id: format!("br-{}", state.next_id),
            project_id: project_id.to_string(),
            name: spec.name.clone(),
            parent_id: Some(
                spec.parent_id
                    .clone()
                    .unwrap_or_else(|| "br-main".to_string()),
            ),
            created_at: Utc::now(),
            expires_at: spec.expires_at,
        };
        state.branches.push(record.clone());
        state.annotations.insert(
            record.id.clone(),
            HashMap::from([spec.annotation.clone()]),
        );

        let connection_uris = match (self.roles.first(), self.databases.first()) {
            (Some(role), Some(database)) => vec![ConnectionDescriptor {
                uri: format!("postgresql://{role}:pw@ep-{}.neon.tech/{database}", record.id),
                role: role.clone(),
                password: "pw".to_string(),
                host: format!("ep-{}.neon.tech", record.id),
                pooler_host: format!("ep-{}-pooler.neon.tech", record.id),
                database: database.clone(),
            }],
            _ => Vec::new(),
        };

        Ok(CreatedBranch {
            branch: record,
            connection_uris,
            roles: self.roles.clone(),
            databases: self.databases.clone(),
        })
    }

    async fn connection_uri(
        &self,
        project_id: &str,
        request: &ConnectionUriRequest,
    ) -> Result<String, ApiError> {
        self.record(format!("connection_uri:{project_id}"));
        self.state
            .lock()
            .unwrap()
            .uri_requests
            .push(request.clone());

        let host = if request.pooled {
            format!("ep-{}-pooler", request.branch_id)
        } else {
            format!("ep-{}", request.branch_id)
        };
        Ok(format!(
            "postgresql://{}:pw@{host}.us-east-2.aws.neon.tech/{}?sslmode=require",
            request.role_name, request.database_name
        ))
    }

    async fn delete_branch(&self, project_id: &str, branch_id: &str) -> Result<(), ApiError> {
        self.record(format!("delete:{branch_id}"));
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.delete_failures.pop_front() {
            return Err(err);
        }
        let before = state.branches.len();
        state
            .branches
            .retain(|b| !(b.id == branch_id && b.project_id == project_id));
        if state.branches.len() == before {
            return Err(status(404));
        }
        state.annotations.remove(branch_id);
        Ok(())
    }

    async fn list_branches(&self, _project_id: &str) -> Result<BranchListing, ApiError> {
        self.record("list".to_string());
        let state = self.state.lock().unwrap();
        Ok(BranchListing {
            branches: state.branches.clone(),
            annotations: state.annotations.clone(),
        })
    }

    async fn get_branch(
        &self,
        _project_id: &str,
        branch_id: &str,
    ) -> Result<BranchRecord, ApiError> {
        self.record(format!("get:{branch_id}"));
        self.branch(branch_id).ok_or_else(|| status(404))
    }
}

/// What a fake connection reports in the background when it is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseBehavior {
    Clean,
    /// The benign `Connection terminated unexpectedly` from the client.
    TerminatedUnexpectedly,
    /// Some unrelated background failure.
    Unrelated,
}

#[derive(Debug)]
pub struct FakeConnection {
    url: String,
    closed: watch::Sender<bool>,
    behavior: CloseBehavior,
    scope: Option<ScopeId>,
    log: EventLog,
}

#[async_trait]
impl RealtimeConnection for FakeConnection {
    fn url(&self) -> &str {
        &self.url
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn send_text(&self, _text: String) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }

    async fn next_text(&self) -> Option<String> {
        None
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.log.lock().unwrap().push(format!("close:{}", self.url));
        match self.behavior {
            CloseBehavior::Clean => {}
            CloseBehavior::TerminatedUnexpectedly => {
                let _ = error_guard::dispatch(
                    AsyncError::new("Connection terminated unexpectedly")
                        .with_frame("tokio_tungstenite::WebSocketStream::poll_next")
                        .with_scope(self.scope),
                );
            }
            CloseBehavior::Unrelated => {
                let _ = error_guard::dispatch(
                    AsyncError::new("relation \"users\" does not exist")
                        .with_frame("my_app::repository::users")
                        .with_scope(self.scope),
                );
            }
        }
        self.closed.send_replace(true);
        Ok(())
    }

    async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Connection factory handing out [`FakeConnection`]s.
pub struct FakeConnector {
    behavior: CloseBehavior,
    log: EventLog,
}

impl FakeConnector {
    pub fn new(log: EventLog, behavior: CloseBehavior) -> Self {
        Self { behavior, log }
    }
}

#[async_trait]
impl ConnectionFactory for FakeConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn RealtimeConnection>, ConnectionError> {
        Ok(Arc::new(FakeConnection {
            url: url.to_string(),
            closed: watch::channel(false).0,
            behavior: self.behavior,
            scope: error_guard::current_scope(),
            log: Arc::clone(&self.log),
        }))
    }
}
