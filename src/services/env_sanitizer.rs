//! Clears a stray connection string before a suite sets up its own.
//!
//! A developer shell or CI job may export a connection string pointing at a
//! real database. Registering the sanitizer first makes sure a suite that
//! forgot to activate a branch fails to connect instead of silently using it.

use tracing::debug;

use crate::domain::ports::SuiteHooks;

/// Unset `var` in the process environment.
pub fn clear_database_url(var: &str) {
    if std::env::var_os(var).is_some() {
        debug!(var, "Clearing pre-existing connection string");
    }
    std::env::remove_var(var);
}

/// Register a before-all hook that clears `var`.
///
/// Register it ahead of [`NeonTesting::activate`](crate::NeonTesting::activate)
/// so the branch's own connection string is published after the wipe.
pub fn register_env_sanitizer<H>(hooks: &mut H, var: impl Into<String>)
where
    H: SuiteHooks + ?Sized,
{
    let var = var.into();
    hooks.before_all(Box::new(move || {
        Box::pin(async move {
            clear_database_url(&var);
            Ok(())
        })
    }));
}
