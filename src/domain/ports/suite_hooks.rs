use futures::future::BoxFuture;

use crate::domain::errors::NeonTestingResult;

/// Future returned by a lifecycle hook.
pub type HookFuture = BoxFuture<'static, NeonTestingResult<()>>;

/// A one-shot asynchronous lifecycle callback.
pub type SuiteHook = Box<dyn FnOnce() -> HookFuture + Send>;

/// Lifecycle registration facility of a test runner.
///
/// Implementations must run every `before_all` hook before the first test
/// body, and every `after_all` hook after the last one, even when a test
/// body failed or panicked.
pub trait SuiteHooks {
    fn before_all(&mut self, hook: SuiteHook);

    fn after_all(&mut self, hook: SuiteHook);
}
