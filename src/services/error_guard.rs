//! Process-wide filter for one benign asynchronous error.
//!
//! Closing WebSockets right before their branch is deleted makes the client
//! report `Connection terminated unexpectedly` from its background reader,
//! outside any call frame a test could catch. While at least one
//! [`ErrorGuard`] is alive, errors matching that signature are swallowed.
//! Anything else detaches the filter (so it cannot mask a second unrelated
//! error) and is returned to the reporter as unhandled.
//!
//! Unhandled errors are attributed through a [`ScopeId`]. Connections opened
//! inside [`in_scope`] capture the scope with [`current_scope`] and tag what
//! they report with it; the errors queue up under that scope until the
//! scoped guard is released, which hands them back to the teardown that
//! owns them. Errors without an open scope are only returned to the reporter.
//!
//! Guards are reference counted and released on drop, so every exit path of
//! a teardown removes its guard.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

/// Message fragment of the benign termination error.
pub const TERMINATED_UNEXPECTEDLY: &str = "Connection terminated unexpectedly";

/// Origin fragment identifying the WebSocket client's frames.
pub const CLIENT_ORIGIN: &str = "tokio_tungstenite";

/// Identifies the activation a background error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Allocate a process-unique scope id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

tokio::task_local! {
    static CURRENT_SCOPE: ScopeId;
}

/// Run `future` with `scope` visible to [`current_scope`].
pub async fn in_scope<F: Future>(scope: ScopeId, future: F) -> F::Output {
    CURRENT_SCOPE.scope(scope, future).await
}

/// Scope of the enclosing [`in_scope`] call, if any.
pub fn current_scope() -> Option<ScopeId> {
    CURRENT_SCOPE.try_with(|scope| *scope).ok()
}

/// An error surfaced outside any awaited call, with the frames it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncError {
    pub message: String,
    pub frames: Vec<String>,
    pub scope: Option<ScopeId>,
}

impl AsyncError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            frames: Vec::new(),
            scope: None,
        }
    }

    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.frames.push(frame.into());
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: Option<ScopeId>) -> Self {
        self.scope = scope;
        self
    }

    /// Both the message and an origin frame must match.
    pub fn is_benign(&self) -> bool {
        self.message.contains(TERMINATED_UNEXPECTEDLY)
            && self.frames.iter().any(|frame| frame.contains(CLIENT_ORIGIN))
    }
}

impl std::fmt::Display for AsyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AsyncError {}

struct GuardState {
    holders: usize,
    /// Bumped on every install and every detach; stale guards become no-ops.
    generation: u64,
    /// Unhandled errors per open scope.
    scopes: BTreeMap<ScopeId, Vec<AsyncError>>,
}

static STATE: Mutex<GuardState> = Mutex::new(GuardState {
    holders: 0,
    generation: 0,
    scopes: BTreeMap::new(),
});

fn with_state<R>(f: impl FnOnce(&mut GuardState) -> R) -> R {
    let mut state = STATE
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    f(&mut state)
}

/// Scoped registration of the process-wide filter. Dropping it releases it.
#[derive(Debug)]
#[must_use = "the filter is removed as soon as the guard is dropped"]
pub struct ErrorGuard {
    generation: u64,
    scope: Option<ScopeId>,
    released: bool,
}

impl ErrorGuard {
    /// Release the guard and collect the unhandled errors of its scope.
    ///
    /// The scope is closed: errors reported under it afterwards are no
    /// longer queued.
    pub fn release(mut self) -> Vec<AsyncError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Vec<AsyncError> {
        if self.released {
            return Vec::new();
        }
        self.released = true;

        with_state(|state| {
            if state.generation == self.generation && state.holders > 0 {
                state.holders -= 1;
                if state.holders == 0 {
                    debug!("Error suppression filter removed");
                }
            }
            self.scope
                .and_then(|scope| state.scopes.remove(&scope))
                .unwrap_or_default()
        })
    }
}

impl Drop for ErrorGuard {
    fn drop(&mut self) {
        for error in self.release_inner() {
            warn!(error = %error, "Unhandled background error dropped with its guard");
        }
    }
}

/// Start queueing unhandled errors reported under `scope`.
pub fn open_scope(scope: ScopeId) {
    with_state(|state| {
        state.scopes.entry(scope).or_default();
    });
}

/// Install the filter, or join the existing installation.
pub fn activate() -> ErrorGuard {
    install(None)
}

/// Like [`activate`], and releasing the guard closes `scope` and returns
/// its unhandled errors.
pub fn activate_scoped(scope: ScopeId) -> ErrorGuard {
    open_scope(scope);
    install(Some(scope))
}

fn install(scope: Option<ScopeId>) -> ErrorGuard {
    with_state(|state| {
        if state.holders == 0 {
            state.generation += 1;
            debug!("Error suppression filter installed");
        }
        state.holders += 1;
        ErrorGuard {
            generation: state.generation,
            scope,
            released: false,
        }
    })
}

pub fn is_active() -> bool {
    with_state(|state| state.holders > 0)
}

/// Route an asynchronous error through the filter.
///
/// Returns `Ok(())` when the error was swallowed. An unhandled error tagged
/// with an open scope is also queued for that scope's guard.
pub fn dispatch(error: AsyncError) -> Result<(), AsyncError> {
    with_state(|state| {
        if state.holders > 0 {
            if error.is_benign() {
                debug!(error = %error, "Suppressed benign connection termination");
                return Ok(());
            }
            warn!(error = %error, "Unrelated error while suppression was active, detaching filter");
            state.holders = 0;
            state.generation += 1;
        }
        if let Some(queue) = error.scope.and_then(|scope| state.scopes.get_mut(&scope)) {
            queue.push(error.clone());
        }
        Err(error)
    })
}
