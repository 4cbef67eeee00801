//! Task spawning abstraction for the single-threaded endpoint runtime.

use std::future::Future;

/// Provider for spawning local tasks in a single-threaded context.
///
/// Endpoints, supervisors and liveness monitors are all `!Send` (they hold
/// `Rc` handles), so they must be spawned on the current thread's `LocalSet`.
pub trait TaskProvider: Clone {
    /// Spawn a named task that runs on the current thread.
    fn spawn_task<F>(&self, name: &str, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + 'static;
}

/// Tokio-based task provider using `spawn_local`.
///
/// Must be used from within a `tokio::task::LocalSet`.
#[derive(Clone, Debug, Default)]
pub struct TokioTaskProvider;

impl TaskProvider for TokioTaskProvider {
    fn spawn_task<F>(&self, name: &str, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + 'static,
    {
        let task_name = name.to_string();
        tokio::task::spawn_local(async move {
            tracing::trace!("Task {} starting", task_name);
            future.await;
            tracing::trace!("Task {} completed", task_name);
        })
    }
}
