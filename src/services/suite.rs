//! In-process suite runner implementing [`SuiteHooks`].
//!
//! Gives plain `#[tokio::test]` functions before-all / after-all semantics:
//! setup hooks run in registration order, the body runs only if all of them
//! succeeded, and every teardown hook runs afterwards no matter how the body
//! ended, panics included.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{error, info};

use crate::domain::errors::NeonTestingError;
use crate::domain::ports::{SuiteHook, SuiteHooks};

/// How the suite body ended.
#[derive(Debug)]
pub enum TestOutcome {
    Passed,
    Failed(anyhow::Error),
    Panicked(String),
    /// A setup hook failed, so the body never ran.
    NotRun,
}

/// Everything that happened during one suite run.
#[derive(Debug)]
pub struct SuiteReport {
    pub name: String,
    pub setup_error: Option<NeonTestingError>,
    pub outcome: TestOutcome,
    /// Includes background errors the suite's own connections left unhandled.
    pub teardown_errors: Vec<NeonTestingError>,
}

impl SuiteReport {
    pub fn is_success(&self) -> bool {
        self.setup_error.is_none()
            && matches!(self.outcome, TestOutcome::Passed)
            && self.teardown_errors.is_empty()
    }

    /// First failure in lifecycle order: setup, body, teardown.
    pub fn into_result(self) -> anyhow::Result<()> {
        let name = self.name;
        if let Some(err) = self.setup_error {
            return Err(anyhow::Error::new(err)
                .context(format!("suite `{name}`: before-all hook failed, no tests ran")));
        }
        match self.outcome {
            TestOutcome::Passed | TestOutcome::NotRun => {}
            TestOutcome::Failed(err) => {
                return Err(err.context(format!("suite `{name}`: test body failed")));
            }
            TestOutcome::Panicked(message) => {
                anyhow::bail!("suite `{name}`: test body panicked: {message}");
            }
        }
        if let Some(err) = self.teardown_errors.into_iter().next() {
            return Err(
                anyhow::Error::new(err).context(format!("suite `{name}`: after-all hook failed"))
            );
        }
        Ok(())
    }
}

/// One test file's worth of hooks plus a body.
pub struct Suite {
    name: String,
    before: Vec<SuiteHook>,
    after: Vec<SuiteHook>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the hooks around `body` and report what happened.
    pub async fn run<F, Fut>(self, body: F) -> SuiteReport
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let Self {
            name,
            before,
            after,
        } = self;

        let mut setup_error = None;
        for hook in before {
            if let Err(err) = hook().await {
                error!(suite = %name, error = %err, "before-all hook failed");
                setup_error = Some(err);
                break;
            }
        }

        let outcome = if setup_error.is_some() {
            TestOutcome::NotRun
        } else {
            match AssertUnwindSafe(async move { body().await })
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => TestOutcome::Passed,
                Ok(Err(err)) => TestOutcome::Failed(err),
                Err(payload) => TestOutcome::Panicked(panic_message(payload.as_ref())),
            }
        };

        let mut teardown_errors = Vec::new();
        for hook in after {
            if let Err(err) = hook().await {
                error!(suite = %name, error = %err, "after-all hook failed");
                teardown_errors.push(err);
            }
        }

        let report = SuiteReport {
            name,
            setup_error,
            outcome,
            teardown_errors,
        };
        info!(suite = %report.name, success = report.is_success(), "Suite finished");
        report
    }
}

impl SuiteHooks for Suite {
    fn before_all(&mut self, hook: SuiteHook) {
        self.before.push(hook);
    }

    fn after_all(&mut self, hook: SuiteHook) {
        self.after.push(hook);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::LifecycleError;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn record(log: &Log, entry: &'static str) -> SuiteHook {
        let log = Arc::clone(log);
        Box::new(move || {
            Box::pin(async move {
                log.lock().unwrap().push(entry);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_hooks_wrap_the_body() {
        let log: Log = Arc::default();
        let mut suite = Suite::new("ordering");
        suite.before_all(record(&log, "before"));
        suite.after_all(record(&log, "after"));

        let body_log = Arc::clone(&log);
        let report = suite
            .run(|| async move {
                body_log.lock().unwrap().push("body");
                Ok(())
            })
            .await;

        assert!(report.is_success());
        assert_eq!(*log.lock().unwrap(), vec!["before", "body", "after"]);
    }

    #[tokio::test]
    async fn test_after_hook_runs_when_body_panics() {
        let log: Log = Arc::default();
        let mut suite = Suite::new("panicking");
        suite.after_all(record(&log, "after"));

        let report = suite
            .run(|| async {
                assert_eq!(1 + 1, 3, "arithmetic is broken");
                Ok(())
            })
            .await;

        assert!(matches!(report.outcome, TestOutcome::Panicked(ref m) if m.contains("arithmetic")));
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
        assert!(report.into_result().is_err());
    }

    #[tokio::test]
    async fn test_failed_setup_skips_body_but_not_teardown() {
        let log: Log = Arc::default();
        let mut suite = Suite::new("broken setup");
        suite.before_all(Box::new(|| {
            Box::pin(async { Err(LifecycleError::BranchNotReady.into()) })
        }));
        suite.after_all(record(&log, "after"));

        let body_log = Arc::clone(&log);
        let report = suite
            .run(|| async move {
                body_log.lock().unwrap().push("body");
                Ok(())
            })
            .await;

        assert!(matches!(report.outcome, TestOutcome::NotRun));
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
        let err = report.into_result().unwrap_err();
        assert!(format!("{err:#}").contains("no tests ran"));
    }

    #[tokio::test]
    async fn test_teardown_failure_fails_passing_suite() {
        let mut suite = Suite::new("leaky");
        suite.after_all(Box::new(|| {
            Box::pin(async { Err(LifecycleError::NoLiveBranch.into()) })
        }));

        let report = suite.run(|| async { Ok(()) }).await;

        assert!(matches!(report.outcome, TestOutcome::Passed));
        assert_eq!(report.teardown_errors.len(), 1);
        assert!(!report.is_success());
    }
}
