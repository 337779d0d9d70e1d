//! Branch lifecycle controller.
//!
//! [`NeonTesting`] holds the factory-level options. Each call to
//! [`NeonTesting::activate`] resolves the suite's effective options,
//! registers a before-all hook that creates a branch and publishes its
//! connection string, and an after-all hook that drains tracked
//! connections and deletes the branch. The returned [`BranchHandle`] gives
//! test bodies the live branch.
//!
//! # Example
//! ```no_run
//! use neon_testing::{NeonTesting, NeonTestingOptions, Suite};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let neon = NeonTesting::new(NeonTestingOptions::new("napi_...", "proj-123"))?;
//!
//! let mut suite = Suite::new("users");
//! let branch = neon.activate(&mut suite, None)?;
//!
//! suite
//!     .run(|| async move {
//!         let url = std::env::var("DATABASE_URL")?;
//!         assert_eq!(url, branch.get()?.connection_uri);
//!         Ok(())
//!     })
//!     .await
//!     .into_result()
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{
    ApiError, ConfigError, LifecycleError, NeonTestingError, NeonTestingResult,
};
use crate::domain::models::{
    Branch, BranchSpec, ConnectionUriRequest, EffectiveOptions, NeonTestingOptions,
    SuiteOverrides, CONVENTIONAL_DATABASE, CONVENTIONAL_ROLE,
};
use crate::domain::ports::{BranchingApi, ConnectionFactory, SuiteHooks};
use crate::infrastructure::neon::{NeonClient, NeonClientConfig};
use crate::infrastructure::retry::RetryPolicy;
use crate::infrastructure::websocket::WebSocketConnector;
use crate::services::cleanup;
use crate::services::connection_tracker::{ConnectionTracker, DEFAULT_TRACKED_HOST_SUFFIX};
use crate::services::error_guard::{self, ErrorGuard};
use crate::services::options_resolver;

/// Factory for per-suite branch activations.
pub struct NeonTesting {
    options: NeonTestingOptions,
    api: Arc<dyn BranchingApi>,
    connector: Arc<dyn ConnectionFactory>,
    tracked_host_suffix: String,
    retry: RetryPolicy,
}

impl NeonTesting {
    /// Validate `options` and connect to the Neon API at `options.api_base_url`.
    pub fn new(options: NeonTestingOptions) -> NeonTestingResult<Self> {
        options_resolver::validate_base(&options)?;
        let client = NeonClient::with_config(NeonClientConfig {
            base_url: options.api_base_url.clone(),
            ..NeonClientConfig::new(options.api_key.clone())
        })?;
        Ok(Self::with_api(options, Arc::new(client))?)
    }

    /// Use a caller-supplied branching API instead of the HTTP client.
    pub fn with_api(
        options: NeonTestingOptions,
        api: Arc<dyn BranchingApi>,
    ) -> Result<Self, ConfigError> {
        options_resolver::validate_base(&options)?;
        let retry = RetryPolicy::from_config(&options.retry)?;
        Ok(Self {
            options,
            api,
            connector: Arc::new(WebSocketConnector),
            tracked_host_suffix: DEFAULT_TRACKED_HOST_SUFFIX.to_string(),
            retry,
        })
    }

    /// Replace the real-time connection factory wrapped by each activation.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn ConnectionFactory>) -> Self {
        self.connector = connector;
        self
    }

    #[must_use]
    pub fn with_tracked_host_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.tracked_host_suffix = suffix.into();
        self
    }

    pub fn options(&self) -> &NeonTestingOptions {
        &self.options
    }

    /// The underlying branching API client.
    pub fn api(&self) -> Arc<dyn BranchingApi> {
        Arc::clone(&self.api)
    }

    /// Register this suite's branch hooks and return its accessor.
    ///
    /// Overrides are resolved and validated here, before any hook runs, so a
    /// bad value fails the suite definition rather than its setup.
    pub fn activate<H>(
        &self,
        hooks: &mut H,
        overrides: Option<&SuiteOverrides>,
    ) -> Result<BranchHandle, ConfigError>
    where
        H: SuiteHooks + ?Sized,
    {
        let options = options_resolver::resolve(&self.options, overrides)?;
        let retry = RetryPolicy::from_config(&options.retry)?;
        let tracker = ConnectionTracker::new(Arc::clone(&self.connector))
            .with_host_suffix(self.tracked_host_suffix.clone());

        let activation = Arc::new(Activation {
            options,
            api: Arc::clone(&self.api),
            tracker: Arc::new(tracker),
            retry,
            state: Mutex::new(ActivationState::default()),
        });

        let setup = Arc::clone(&activation);
        hooks.before_all(Box::new(move || Box::pin(async move { setup.setup().await })));

        let teardown = Arc::clone(&activation);
        hooks.after_all(Box::new(move || {
            Box::pin(async move { teardown.teardown().await })
        }));

        debug!(
            project_id = %activation.options.project_id,
            env_var = %activation.options.database_url_env,
            "Registered branch lifecycle hooks"
        );
        Ok(BranchHandle { activation })
    }

    /// Delete every branch carrying the marker annotation. Returns the deleted ids.
    pub async fn delete_all_test_branches(&self) -> Result<Vec<String>, ApiError> {
        cleanup::delete_marked_branches(self.api.as_ref(), &self.options.project_id, self.retry)
            .await
    }
}

impl std::fmt::Debug for NeonTesting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeonTesting")
            .field("options", &self.options)
            .field("tracked_host_suffix", &self.tracked_host_suffix)
            .finish_non_exhaustive()
    }
}

/// Accessor for the branch owned by one activation.
#[derive(Clone)]
pub struct BranchHandle {
    activation: Arc<Activation>,
}

impl BranchHandle {
    /// The live branch. Fails before setup has completed and after teardown.
    pub fn get(&self) -> Result<Branch, LifecycleError> {
        let state = self.activation.lock();
        if let Some(branch) = &state.branch {
            return Ok(branch.clone());
        }
        if state.torn_down {
            let id = state.created.as_deref().unwrap_or("<never created>");
            return Err(LifecycleError::BranchUnavailable(id.to_string()));
        }
        Err(LifecycleError::BranchNotReady)
    }

    /// Connection factory tests should open real-time connections through.
    ///
    /// Connections opened here are tracked and drained at teardown when
    /// `auto_close_websockets` is on.
    pub fn connector(&self) -> Arc<dyn ConnectionFactory> {
        Arc::clone(&self.activation.tracker) as Arc<dyn ConnectionFactory>
    }

    /// Number of connections currently tracked for draining.
    pub fn tracked_connections(&self) -> usize {
        self.activation.tracker.tracked_count()
    }

    pub fn options(&self) -> &EffectiveOptions {
        &self.activation.options
    }

    /// Re-read the branch record from the service.
    pub async fn refresh(&self) -> NeonTestingResult<Branch> {
        let current = self.get()?;
        let api = self.activation.api.as_ref();
        let (project_id, branch_id) = (current.project_id(), current.id());
        let record = self
            .activation
            .retry
            .execute(
                move || api.get_branch(project_id, branch_id),
                ApiError::is_locked,
            )
            .await?;

        let mut state = self.activation.lock();
        let branch = state
            .branch
            .as_mut()
            .ok_or_else(|| LifecycleError::BranchUnavailable(record.id.clone()))?;
        branch.record = record;
        Ok(branch.clone())
    }
}

impl std::fmt::Debug for BranchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchHandle")
            .field("options", &self.activation.options)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct ActivationState {
    /// Id of the branch created by this activation, recorded as soon as the
    /// service confirms creation.
    created: Option<String>,
    branch: Option<Branch>,
    torn_down: bool,
}

struct Activation {
    options: EffectiveOptions,
    api: Arc<dyn BranchingApi>,
    tracker: Arc<ConnectionTracker>,
    retry: RetryPolicy,
    state: Mutex<ActivationState>,
}

impl Activation {
    fn lock(&self) -> MutexGuard<'_, ActivationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[instrument(skip(self), fields(project_id = %self.options.project_id))]
    async fn setup(&self) -> NeonTestingResult<()> {
        {
            let state = self.lock();
            if let (Some(id), false) = (&state.created, state.torn_down) {
                return Err(LifecycleError::BranchAlreadyLive(id.clone()).into());
            }
        }

        let options = &self.options;
        let spec = BranchSpec::generate(
            options.parent_branch_id.clone(),
            options.branch_init,
            options.expires_in_seconds,
            Utc::now(),
        );
        info!(name = %spec.name, expires_at = ?spec.expires_at, "Creating test branch");

        let api = self.api.as_ref();
        let project_id = options.project_id.as_str();
        let spec_ref = &spec;
        let created = self
            .retry
            .execute(
                move || api.create_branch(project_id, spec_ref),
                ApiError::is_locked,
            )
            .await?;
        let branch_id = created.branch.id.clone();
        self.lock().created = Some(branch_id.clone());

        let role = pick(
            &created.roles,
            options.role_name.as_deref(),
            CONVENTIONAL_ROLE,
            ConfigError::RoleNotFound,
            ConfigError::NoRoles,
        )?;
        let database = pick(
            &created.databases,
            options.database_name.as_deref(),
            CONVENTIONAL_DATABASE,
            ConfigError::DatabaseNotFound,
            ConfigError::NoDatabases,
        )?;

        let request = ConnectionUriRequest {
            branch_id: branch_id.clone(),
            role_name: role.clone(),
            database_name: database.clone(),
            pooled: options.endpoint.is_pooled(),
        };
        let request_ref = &request;
        let uri = self
            .retry
            .execute(
                move || api.connection_uri(project_id, request_ref),
                ApiError::is_locked,
            )
            .await?;

        std::env::set_var(&options.database_url_env, &uri);
        self.lock().branch = Some(Branch {
            record: created.branch,
            roles: created.roles,
            databases: created.databases,
            connections: created.connection_uris,
            role,
            database,
            connection_uri: uri,
        });

        if options.auto_close_websockets {
            self.tracker.install();
        }

        info!(
            branch_id = %branch_id,
            env_var = %options.database_url_env,
            pooled = request.pooled,
            "Test branch ready"
        );
        Ok(())
    }

    #[instrument(skip(self), fields(project_id = %self.options.project_id))]
    async fn teardown(&self) -> NeonTestingResult<()> {
        let options = &self.options;
        let created = {
            let mut state = self.lock();
            if state.torn_down {
                return Err(LifecycleError::NoLiveBranch.into());
            }
            state.branch = None;
            state.torn_down = true;
            state.created.clone()
        };
        std::env::remove_var(&options.database_url_env);

        // held until deletion settles
        let guard = options
            .auto_close_websockets
            .then(|| error_guard::activate_scoped(self.tracker.scope()));
        if options.auto_close_websockets {
            let drained = self.tracker.drain().await;
            self.tracker.restore();
            debug!(tracked = drained, "Drained tracked connections");
        }

        let result = match (&created, options.delete_branch) {
            (Some(branch_id), true) => {
                match cleanup::delete_branch(
                    self.api.as_ref(),
                    &options.project_id,
                    branch_id,
                    self.retry,
                )
                .await
                {
                    Ok(true) => {
                        info!(branch_id = %branch_id, "Deleted test branch");
                        Ok(())
                    }
                    Ok(false) => {
                        info!(branch_id = %branch_id, "Test branch already gone");
                        Ok(())
                    }
                    Err(err) => Err(NeonTestingError::from(err)),
                }
            }
            (Some(branch_id), false) => {
                info!(
                    branch_id = %branch_id,
                    expires_in_seconds = ?options.expires_in_seconds,
                    "Leaving test branch to expire"
                );
                Ok(())
            }
            (None, _) => {
                warn!("No branch was created in this activation, skipping deletion");
                Ok(())
            }
        };

        let unhandled = guard.map(ErrorGuard::release).unwrap_or_default();
        for err in &unhandled {
            error!(error = %err, "Unhandled background error from a test connection");
        }
        result?;
        if unhandled.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::UnhandledBackground(
                unhandled.iter().map(ToString::to_string).collect(),
            )
            .into())
        }
    }
}

/// Resolve a role or database name from what the created branch offers.
fn pick(
    available: &[String],
    requested: Option<&str>,
    conventional: &str,
    not_found: fn(String) -> ConfigError,
    none_available: ConfigError,
) -> Result<String, ConfigError> {
    if let Some(name) = requested {
        return if available.iter().any(|a| a == name) {
            Ok(name.to_string())
        } else {
            Err(not_found(name.to_string()))
        };
    }
    if available.iter().any(|a| a == conventional) {
        return Ok(conventional.to_string());
    }
    available.first().cloned().ok_or(none_available)
}
