use std::{future::Future, pin::Pin, sync::Arc};

use tokio::sync::{mpsc, Semaphore};
use tracing::warn;

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Fixed-size worker pool fed by a queue.
///
/// Submissions enqueue without blocking the caller; at most `workers` tasks
/// run at once, the rest wait in the queue in submission order.
#[derive(Clone)]
pub struct WorkerPool {
    queue: mpsc::UnboundedSender<Task>,
}

impl WorkerPool {
    /// Spawn the pool runner on the current tokio runtime.
    pub fn new(workers: usize) -> Self {
        let (queue, mut rx) = mpsc::unbounded_channel::<Task>();
        let permits = Arc::new(Semaphore::new(workers));

        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let permit = match permits.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };
                tokio::spawn(async move {
                    task.await;
                    drop(permit);
                });
            }
        });

        Self { queue }
    }

    /// Enqueue a task. Returns false if the pool runner is gone.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let accepted = self.queue.send(Box::pin(task)).is_ok();
        if !accepted {
            warn!("worker pool is shut down; dropping task");
        }
        accepted
    }
}
