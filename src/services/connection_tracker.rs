//! Tracks real-time connections opened against the ephemeral branch.
//!
//! The tracker is itself a [`ConnectionFactory`] wrapping the real one.
//! While installed, connections whose host matches the service's host
//! pattern are remembered by identity and forget themselves once closed.
//! Restoring the tracker turns it back into a plain pass-through.
//!
//! Tracked connections are opened inside the tracker's error scope, so the
//! background errors they report are attributed to this tracker's owner.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Url;
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::domain::errors::ConnectionError;
use crate::domain::ports::{ConnectionFactory, RealtimeConnection};
use crate::services::error_guard::{self, ScopeId};

/// How long a drained connection gets to confirm its close.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Host suffix of the managed service's endpoints.
pub const DEFAULT_TRACKED_HOST_SUFFIX: &str = "neon.tech";

struct Tracked {
    connection: Arc<dyn RealtimeConnection>,
    /// Task removing the entry once the connection reports closed.
    watcher: AbortHandle,
}

type TrackedSet = Mutex<HashMap<u64, Tracked>>;

/// Connection factory that remembers connections to the branch's host.
pub struct ConnectionTracker {
    inner: Arc<dyn ConnectionFactory>,
    host_suffix: String,
    close_timeout: Duration,
    installed: AtomicBool,
    next_id: AtomicU64,
    scope: ScopeId,
    tracked: Arc<TrackedSet>,
}

impl ConnectionTracker {
    pub fn new(inner: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            inner,
            host_suffix: DEFAULT_TRACKED_HOST_SUFFIX.to_string(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            installed: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            scope: ScopeId::next(),
            tracked: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn with_host_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.host_suffix = suffix.into();
        self
    }

    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Error scope tracked connections are opened in.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Start tracking newly opened connections.
    pub fn install(&self) {
        error_guard::open_scope(self.scope);
        self.installed.store(true, Ordering::SeqCst);
        debug!(host_suffix = %self.host_suffix, "Connection tracker installed");
    }

    /// Stop tracking; later connections pass straight through.
    pub fn restore(&self) {
        self.installed.store(false, Ordering::SeqCst);
        debug!("Connection tracker restored");
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    pub fn tracked_count(&self) -> usize {
        lock(&self.tracked).len()
    }

    /// Whether a URL points at the managed service.
    pub fn matches(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        parsed.host_str().is_some_and(|host| {
            host == self.host_suffix || host.ends_with(&format!(".{}", self.host_suffix))
        })
    }

    /// Close every tracked connection and clear the set.
    ///
    /// Each close gets at most the configured timeout to be confirmed; past
    /// that the connection is considered closed anyway and its watcher is
    /// stopped. Returns how many connections were drained.
    pub async fn drain(&self) -> usize {
        let drained: Vec<Tracked> = lock(&self.tracked).drain().map(|(_, t)| t).collect();
        let count = drained.len();

        join_all(drained.iter().map(|Tracked { connection, .. }| async move {
            if let Err(e) = connection.close().await {
                debug!(url = connection.url(), error = %e, "Close failed during drain");
            }
            if tokio::time::timeout(self.close_timeout, connection.closed())
                .await
                .is_err()
            {
                debug!(url = connection.url(), "Close not confirmed before timeout");
            }
        }))
        .await;

        for tracked in &drained {
            tracked.watcher.abort();
        }
        if count > 0 {
            info!(drained = count, "Closed tracked connections");
        }
        count
    }

    fn track(&self, connection: Arc<dyn RealtimeConnection>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, url = connection.url(), "Tracking connection");

        // held across the spawn so the watcher cannot remove before insert
        let mut set = lock(&self.tracked);
        let weak_set: Weak<TrackedSet> = Arc::downgrade(&self.tracked);
        let watched = Arc::clone(&connection);
        let watcher = tokio::spawn(async move {
            watched.closed().await;
            if let Some(tracked) = weak_set.upgrade() {
                lock(&tracked).remove(&id);
            }
        })
        .abort_handle();
        set.insert(id, Tracked { connection, watcher });
    }
}

impl Drop for ConnectionTracker {
    fn drop(&mut self) {
        for tracked in lock(&self.tracked).values() {
            tracked.watcher.abort();
        }
    }
}

fn lock(set: &TrackedSet) -> std::sync::MutexGuard<'_, HashMap<u64, Tracked>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ConnectionFactory for ConnectionTracker {
    async fn connect(&self, url: &str) -> Result<Arc<dyn RealtimeConnection>, ConnectionError> {
        if !(self.is_installed() && self.matches(url)) {
            return self.inner.connect(url).await;
        }
        let connection = error_guard::in_scope(self.scope, self.inner.connect(url)).await?;
        self.track(Arc::clone(&connection));
        Ok(connection)
    }
}

impl std::fmt::Debug for ConnectionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTracker")
            .field("host_suffix", &self.host_suffix)
            .field("close_timeout", &self.close_timeout)
            .field("installed", &self.is_installed())
            .field("tracked", &self.tracked_count())
            .finish_non_exhaustive()
    }
}
