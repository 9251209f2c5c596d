//! Bounded-concurrency task queue.
//!
//! At most `concurrency` tasks run at once. Tasks beyond that wait in FIFO
//! order and are admitted one at a time as running tasks finish, whether
//! they succeed or fail. [`TaskQueue::clear`] rejects waiting tasks with
//! [`QueueCancelled`] but leaves running tasks alone.
//!
//! The queue does not spawn anything: `add` drives the task on the caller's
//! own task, so a batch of `add` futures joined together interleaves on one
//! logical thread.
//!
//! ```ignore
//! let queue = TaskQueue::new("provider", 3);
//! let candidates = queue.add(async { provider.search(&query).await }).await?;
//! ```

pub mod retry;

pub use retry::{RetryPolicy, retry};

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Notify, oneshot};

/// Returned to a caller whose waiting task was cleared.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Task cancelled: {reason}")]
pub struct QueueCancelled {
    pub reason: String,
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

type Admission = oneshot::Sender<Result<(), QueueCancelled>>;

#[derive(Default)]
struct QueueState {
    waiting: VecDeque<Admission>,
    running: usize,
    completed: usize,
    failed: usize,
}

struct Shared {
    name: String,
    concurrency: usize,
    state: Mutex<QueueState>,
    idle: Notify,
}

impl Shared {
    /// Hand freed slots to waiting tasks. Caller holds the lock.
    fn admit_waiting(&self, state: &mut QueueState) {
        while state.running < self.concurrency {
            let Some(ticket) = state.waiting.pop_front() else {
                break;
            };
            // A dropped receiver means the caller gave up; try the next one.
            if ticket.send(Ok(())).is_ok() {
                state.running += 1;
            }
        }
    }

    fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.running == 0 && state.waiting.is_empty()
    }

    /// Free a running slot, recording the outcome when there is one.
    fn release(&self, outcome: Option<bool>) {
        let mut state = self.state.lock();
        state.running -= 1;
        match outcome {
            Some(true) => state.completed += 1,
            Some(false) => state.failed += 1,
            None => {}
        }
        self.admit_waiting(&mut state);
        let idle = state.running == 0 && state.waiting.is_empty();
        drop(state);
        if idle {
            self.idle.notify_waiters();
        }
    }
}

/// Admission ticket held by a waiting caller.
///
/// If the caller is dropped after being admitted but before it started,
/// the slot it was granted is handed back.
struct Ticket<'a> {
    shared: &'a Shared,
    rx: oneshot::Receiver<Result<(), QueueCancelled>>,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.rx.close();
        if let Ok(Ok(())) = self.rx.try_recv() {
            self.shared.release(None);
        }
    }
}

/// Releases a running slot when the task finishes or its future is dropped.
struct Slot<'a> {
    shared: &'a Shared,
    succeeded: Option<bool>,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        // A task dropped mid-run counts as failed.
        self.shared.release(Some(self.succeeded.unwrap_or(false)));
    }
}

/// FIFO task runner with a fixed concurrency limit.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl TaskQueue {
    /// Create a queue. A concurrency of 0 is treated as 1.
    pub fn new(name: impl Into<String>, concurrency: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                concurrency: concurrency.max(1),
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn concurrency(&self) -> usize {
        self.shared.concurrency
    }

    /// Run `task` once a slot is free and return its result.
    ///
    /// Waits while the queue is full. If the queue is cleared before the task
    /// starts, the task is never polled and the caller gets the cancellation
    /// reason converted into `E`.
    pub async fn add<F, T, E>(&self, task: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<QueueCancelled>,
    {
        let ticket = {
            let mut state = self.shared.state.lock();
            if state.running < self.shared.concurrency && state.waiting.is_empty() {
                state.running += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiting.push_back(tx);
                Some(rx)
            }
        };

        if let Some(rx) = ticket {
            tracing::trace!(target: "queue", queue = %self.shared.name, "Task waiting for a slot");
            let mut ticket = Ticket {
                shared: &self.shared,
                rx,
            };
            match (&mut ticket.rx).await {
                Ok(Ok(())) => {}
                Ok(Err(cancelled)) => return Err(cancelled.into()),
                Err(_) => {
                    return Err(QueueCancelled {
                        reason: "queue dropped".to_string(),
                    }
                    .into());
                }
            }
        }

        let mut slot = Slot {
            shared: &self.shared,
            succeeded: None,
        };
        let result = task.await;
        slot.succeeded = Some(result.is_ok());
        result
    }

    /// Current counters.
    pub fn status(&self) -> QueueStatus {
        let state = self.shared.state.lock();
        QueueStatus {
            queued: state.waiting.len(),
            running: state.running,
            completed: state.completed,
            failed: state.failed,
        }
    }

    /// Reject every waiting task with `reason`. Running tasks continue.
    ///
    /// Returns how many tasks were cancelled.
    pub fn clear(&self, reason: impl Into<String>) -> usize {
        let reason = reason.into();
        let drained: Vec<Admission> = {
            let mut state = self.shared.state.lock();
            state.waiting.drain(..).collect()
        };

        let cancelled = drained
            .into_iter()
            .filter(|ticket| !ticket.is_closed())
            .map(|ticket| {
                ticket.send(Err(QueueCancelled {
                    reason: reason.clone(),
                }))
            })
            .filter(Result::is_ok)
            .count();

        if cancelled > 0 {
            tracing::info!(target: "queue", queue = %self.shared.name, cancelled, %reason, "Cleared waiting tasks");
        }
        if self.shared.is_idle() {
            self.shared.idle.notify_waiters();
        }
        cancelled
    }

    /// Resolve once nothing is running or waiting.
    pub async fn wait_for_all(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Cancelled(String),
        Failed,
    }

    impl From<QueueCancelled> for TestError {
        fn from(c: QueueCancelled) -> Self {
            TestError::Cancelled(c.reason)
        }
    }

    #[tokio::test]
    async fn test_runs_task_and_returns_result() {
        let queue = TaskQueue::new("test", 2);
        let value: Result<u32, TestError> = queue.add(async { Ok(42) }).await;
        assert_eq!(value, Ok(42));
        assert_eq!(
            queue.status(),
            QueueStatus {
                queued: 0,
                running: 0,
                completed: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_failed_task_is_counted() {
        let queue = TaskQueue::new("test", 1);
        let result: Result<(), TestError> = queue.add(async { Err(TestError::Failed) }).await;
        assert_eq!(result, Err(TestError::Failed));
        assert_eq!(queue.status().failed, 1);
    }

    #[tokio::test]
    async fn test_concurrency_bound_is_respected() {
        let queue = TaskQueue::new("test", 3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..12).map(|i| {
            let queue = queue.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                queue
                    .add(async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        if i % 4 == 0 {
                            Err(TestError::Failed)
                        } else {
                            Ok(i)
                        }
                    })
                    .await
            }
        });

        let results = join_all(tasks).await;
        assert_eq!(results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        let status = queue.status();
        assert_eq!(status.completed + status.failed, 12);
        assert_eq!(status.failed, 3);
        assert_eq!(status.running, 0);
    }

    #[tokio::test]
    async fn test_waiting_tasks_start_in_submission_order() {
        let queue = TaskQueue::new("test", 1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let tasks = (0..5).map(|i| {
            let queue = queue.clone();
            let order = Arc::clone(&order);
            async move {
                queue
                    .add(async move {
                        order.lock().push(i);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        Ok::<_, TestError>(())
                    })
                    .await
            }
        });
        join_all(tasks).await;

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_clear_rejects_waiting_but_not_running() {
        let queue = TaskQueue::new("test", 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let running = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .add(async move {
                        let _ = release_rx.await;
                        Ok::<_, TestError>("done")
                    })
                    .await
            })
        };
        let waiting: Vec<_> = (0..2)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.add(async { Ok::<_, TestError>("never") }).await })
            })
            .collect();

        // Let every spawned task reach the queue
        while queue.status().queued < 2 {
            tokio::task::yield_now().await;
        }

        assert_eq!(queue.clear("shutting down"), 2);
        for handle in waiting {
            assert_eq!(
                handle.await.unwrap(),
                Err(TestError::Cancelled("shutting down".to_string()))
            );
        }

        release_tx.send(()).unwrap();
        assert_eq!(running.await.unwrap(), Ok("done"));
        assert_eq!(queue.status().completed, 1);
    }

    #[tokio::test]
    async fn test_wait_for_all_resolves_when_drained() {
        let queue = TaskQueue::new("test", 2);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    queue
                        .add(async {
                            tokio::time::sleep(Duration::from_millis(2)).await;
                            Ok::<_, TestError>(())
                        })
                        .await
                })
            })
            .collect();

        while queue.status().running == 0 {
            tokio::task::yield_now().await;
        }
        queue.wait_for_all().await;
        assert_eq!(queue.status().completed, 4);
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_wait_for_all_on_empty_queue_returns() {
        TaskQueue::new("empty", 1).wait_for_all().await;
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        assert_eq!(TaskQueue::new("q", 0).concurrency(), 1);
    }
}
