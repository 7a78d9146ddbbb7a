//! Task spawning abstraction.
//!
//! Sessions spawn two kinds of background work: completion watchers (one
//! per `play`) and idle-disconnect timers. The relay spawns one pump per
//! track. All of it goes through [`TaskSpawner`] so the core does not reach
//! for a global runtime.

use std::future::Future;

use futures::future::BoxFuture;

/// A type-erased background task.
///
/// Sessions box the futures they spawn from inside their own async methods;
/// naming the concrete type there would make it recursive.
pub type BoxedTask = BoxFuture<'static, ()>;

/// Spawns background tasks. There is no join or cancel; timers and pumps
/// carry their own cancellation token.
pub trait TaskSpawner: Send + Sync {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Spawner bound to a Tokio runtime handle.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn boxed_task_runs_on_current_runtime() {
        let (tx, rx) = oneshot::channel();
        let task: BoxedTask = Box::pin(async move {
            let _ = tx.send("done");
        });

        TokioSpawner::current().spawn(task);

        assert_eq!(rx.await.unwrap(), "done");
    }

    #[test]
    fn spawner_can_be_used_from_outside_the_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let spawner = TokioSpawner::new(runtime.handle().clone());
        let (tx, rx) = oneshot::channel();

        std::thread::spawn(move || {
            spawner.spawn(async move {
                let _ = tx.send(7);
            });
        })
        .join()
        .unwrap();

        assert_eq!(runtime.block_on(rx).unwrap(), 7);
    }
}
