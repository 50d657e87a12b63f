//! Serialized background operations
//!
//! An [`OperationScheduler`] owns one worker task draining a bounded queue, so
//! tasks run strictly in submission order and never concurrently with each
//! other. A task that returns an error or panics is logged and counted; the
//! worker then moves on to the next task.
//!
//! Must be created from within a tokio runtime.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::errors::{Result, ServiceError};

/// Default number of queued tasks before `submit` waits
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

struct Job {
    label: String,
    task: BoxFuture<'static, anyhow::Result<()>>,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

/// Snapshot of scheduler counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct OperationScheduler {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl OperationScheduler {
    /// Spawn the worker for a scheduler named `name`
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run_worker(name.clone(), receiver, counters.clone()));
        debug!(scheduler = %name, capacity, "Operation scheduler started");

        Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            counters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn job<F>(label: impl Into<String>, task: F) -> Job
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Job {
            label: label.into(),
            task: task.boxed(),
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Job>> {
        self.sender
            .lock()
            .clone()
            .ok_or_else(|| ServiceError::send_failed(format!("scheduler {} is shut down", self.name)))
    }

    /// Queue a task, waiting for capacity if the queue is full
    pub async fn submit<F>(&self, label: impl Into<String>, task: F) -> Result<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let sender = self.sender()?;
        sender
            .send(Self::job(label, task))
            .await
            .map_err(|_| ServiceError::send_failed(format!("scheduler {} is shut down", self.name)))?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Queue a task without waiting; fails with `SendFailed` when full
    pub fn try_submit<F>(&self, label: impl Into<String>, task: F) -> Result<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let sender = self.sender()?;
        sender.try_send(Self::job(label, task)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => ServiceError::send_failed(format!(
                "scheduler {} queue is full, dropping {}",
                self.name, job.label
            )),
            mpsc::error::TrySendError::Closed(_) => {
                ServiceError::send_failed(format!("scheduler {} is shut down", self.name))
            }
        })?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting tasks and wait for the queued ones to finish
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(scheduler = %self.name, error = %e, "Scheduler worker ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for OperationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationScheduler")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

async fn run_worker(name: String, mut receiver: mpsc::Receiver<Job>, counters: Arc<Counters>) {
    while let Some(job) = receiver.recv().await {
        match AssertUnwindSafe(job.task).catch_unwind().await {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(scheduler = %name, task = %job.label, "Task completed");
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(scheduler = %name, task = %job.label, error = %e, "Task failed");
            }
            Err(panic) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    scheduler = %name,
                    task = %job.label,
                    panic = %panic_message(panic.as_ref()),
                    "Task panicked"
                );
            }
        }
    }
    info!(scheduler = %name, "Operation scheduler stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn test_tasks_run_in_order() {
        let scheduler = OperationScheduler::new("order", 8);
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        for i in 0..5 {
            let seen = seen.clone();
            scheduler
                .submit(format!("task-{}", i), async move {
                    seen.lock().await.push(i);
                    Ok(())
                })
                .await
                .unwrap();
        }
        scheduler.shutdown().await;
        assert_eq!(*seen.lock().await, vec![0, 1, 2, 3, 4]);
        assert_eq!(scheduler.stats().completed, 5);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let scheduler = OperationScheduler::new("closed", 1);
        scheduler.shutdown().await;
        assert!(!scheduler.is_running());
        let result = scheduler.submit("late", async { Ok(()) }).await;
        assert!(matches!(result, Err(ServiceError::SendFailed { .. })));
    }

    #[tokio::test]
    async fn test_try_submit_full_queue() {
        let scheduler = OperationScheduler::new("full", 1);
        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        scheduler
            .submit("blocker", async move {
                let _ = started_tx.send(());
                let _ = wait.await;
                Ok(())
            })
            .await
            .unwrap();
        started_rx.await.unwrap();

        scheduler.try_submit("queued", async { Ok(()) }).unwrap();
        let overflow = scheduler.try_submit("overflow", async { Ok(()) });
        assert!(matches!(overflow, Err(ServiceError::SendFailed { .. })));

        release.send(()).unwrap();
        scheduler.shutdown().await;
        assert_eq!(scheduler.stats(), SchedulerStats { submitted: 2, completed: 2, failed: 0 });
    }
}
