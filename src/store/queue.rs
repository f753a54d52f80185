//! # Execution Queues
//!
//! Each execution context runs its work on one serial queue.
//!
//! - [`MainQueue`] is a run-loop queue: jobs accumulate until the owning
//!   thread drains them with [`MainQueue::run_pending`]. It plays the role
//!   of the UI thread.
//! - [`BackgroundQueue`] owns one worker thread that runs jobs in FIFO order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::errors::{StoreError, StoreResult};

/// Unit of work dispatched to a queue
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A serial queue that work can be handed to
pub trait CompletionQueue: Send + Sync {
    /// Queue label for logs
    fn label(&self) -> &str;

    /// Enqueues `job`. Fails only if the queue has shut down.
    fn dispatch(&self, job: Job) -> StoreResult<()>;
}

/// Run-loop queue drained explicitly by its owner
pub struct MainQueue {
    label: String,
    sender: mpsc::UnboundedSender<Job>,
    receiver: Mutex<mpsc::UnboundedReceiver<Job>>,
    executed: AtomicU64,
}

impl MainQueue {
    pub fn new(label: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            label: label.into(),
            sender,
            receiver: Mutex::new(receiver),
            executed: AtomicU64::new(0),
        }
    }

    /// Runs queued jobs until the queue is empty, including jobs enqueued
    /// by the jobs themselves. Returns the number of jobs run.
    pub fn run_pending(&self) -> usize {
        let mut total = 0;
        loop {
            // Drain under the lock, run without it: jobs may dispatch again.
            let batch: Vec<Job> = {
                let mut receiver = self.receiver.lock();
                std::iter::from_fn(|| receiver.try_recv().ok()).collect()
            };
            if batch.is_empty() {
                break;
            }
            total += batch.len();
            for job in batch {
                job();
            }
        }
        if total > 0 {
            self.executed.fetch_add(total as u64, Ordering::Relaxed);
            debug!(queue = %self.label, jobs = total, "drained main queue");
        }
        total
    }

    /// Total jobs run since creation
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}

impl CompletionQueue for MainQueue {
    fn label(&self) -> &str {
        &self.label
    }

    fn dispatch(&self, job: Job) -> StoreResult<()> {
        self.sender
            .send(job)
            .map_err(|_| StoreError::ContextClosed(self.label.clone()))
    }
}

/// Serial queue backed by a dedicated worker thread
pub struct BackgroundQueue {
    label: String,
    sender: mpsc::UnboundedSender<Job>,
    worker: ThreadId,
}

impl BackgroundQueue {
    /// Starts the worker thread
    pub fn spawn(label: impl Into<String>) -> StoreResult<Self> {
        let label = label.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let handle = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    job();
                }
            })
            .map_err(|e| StoreError::ContextClosed(format!("cannot start worker: {}", e)))?;

        Ok(Self {
            label,
            sender,
            worker: handle.thread().id(),
        })
    }

    /// True when called from the worker thread itself
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker
    }

    /// Blocks until every job dispatched before this call has run.
    ///
    /// Returns immediately when called from the worker thread.
    pub fn wait_until_idle(&self) -> StoreResult<()> {
        if self.is_current() {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.dispatch(Box::new(move || {
            let _ = tx.send(());
        }))?;
        rx.blocking_recv()
            .map_err(|_| StoreError::ContextClosed(self.label.clone()))
    }
}

impl CompletionQueue for BackgroundQueue {
    fn label(&self) -> &str {
        &self.label
    }

    fn dispatch(&self, job: Job) -> StoreResult<()> {
        self.sender
            .send(job)
            .map_err(|_| StoreError::ContextClosed(self.label.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_main_queue_runs_only_when_drained() {
        let queue = MainQueue::new("main");
        let hits = Arc::new(AtomicU64::new(0));

        let h = hits.clone();
        queue
            .dispatch(Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(queue.run_pending(), 0);
    }

    #[test]
    fn test_main_queue_runs_nested_dispatch() {
        let queue = Arc::new(MainQueue::new("main"));
        let order = Arc::new(Mutex::new(Vec::new()));

        let (q, o) = (queue.clone(), order.clone());
        queue
            .dispatch(Box::new(move || {
                o.lock().push(1);
                let o2 = o.clone();
                q.dispatch(Box::new(move || o2.lock().push(2))).unwrap();
            }))
            .unwrap();

        assert_eq!(queue.run_pending(), 2);
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn test_background_queue_is_serial() {
        let queue = BackgroundQueue::spawn("worker").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let o = order.clone();
            queue.dispatch(Box::new(move || o.lock().push(i))).unwrap();
        }
        queue.wait_until_idle().unwrap();

        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
        assert!(!queue.is_current());
    }
}
