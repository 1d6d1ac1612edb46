use tokio::{runtime::Handle, task::JoinHandle};

use crate::error::ConfigError;

/// Handle of the runtime the caller is running in.
pub fn current_runtime() -> Result<Handle, ConfigError> {
    Handle::try_current().map_err(|_| ConfigError::NoRuntime)
}

/// Spawn a driver task on `handle`
pub fn spawn_task<F>(handle: &Handle, future: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    handle.spawn(future)
}
