use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::Instrument;

/// Spawns `future` inside a `task` span carrying its name.
pub fn spawn_named_task<F>(name: impl Into<String>, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let name = name.into();
    let span = tracing::info_span!("task", task_name = %name);
    tokio::spawn(future.instrument(span))
}

/// Like [`spawn_named_task`], but `future` only starts after `delay`.
pub fn spawn_delayed<F>(name: impl Into<String>, delay: Duration, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    spawn_named_task(name, async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        future.await
    })
}
