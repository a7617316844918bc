use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{info, warn};

/// Fire-and-forget status notification supplied by the caller of `create_task`
pub trait UpdateHook: Send + Sync {
    fn notify(&self, owner: &str, message: &str) -> anyhow::Result<()>;
}

impl<F> UpdateHook for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn notify(&self, owner: &str, message: &str) -> anyhow::Result<()> {
        self(owner, message);
        Ok(())
    }
}

/// Hook that only writes the update to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

impl UpdateHook for TracingHook {
    fn notify(&self, owner: &str, message: &str) -> anyhow::Result<()> {
        info!(owner = %owner, "📣 UPDATE: {message}");
        Ok(())
    }
}

/// Deliver an update without letting the hook fail the task.
///
/// Errors are logged. A panicking hook is caught and logged the same way.
pub fn notify_safely(hook: &dyn UpdateHook, owner: &str, message: &str) {
    match catch_unwind(AssertUnwindSafe(|| hook.notify(owner, message))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(owner = %owner, error = %err, "Update hook failed"),
        Err(_) => warn!(owner = %owner, "Update hook panicked"),
    }
}
