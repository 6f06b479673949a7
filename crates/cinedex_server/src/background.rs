//! Detached background work with shutdown accounting.
//!
//! [`BackgroundTasks::spawn`] returns immediately. The outstanding counter is
//! incremented before the task is scheduled and decremented by a drop guard
//! when it ends, so a failing or panicking task still deregisters.
//! Shutdown calls [`BackgroundTasks::wait_timeout`] to let pending work
//! finish; tasks are never aborted.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

struct Inner {
    outstanding: AtomicUsize,
    idle: Notify,
    permits: Arc<Semaphore>,
}

/// Decrements the outstanding counter when dropped.
struct Registration {
    inner: Arc<Inner>,
}

impl Registration {
    fn new(inner: Arc<Inner>) -> Self {
        inner.outstanding.fetch_add(1, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.inner.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Coordinator for fire-and-forget tasks.
///
/// Clones share the same counter.
#[derive(Clone)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

impl BackgroundTasks {
    /// Creates a coordinator running at most `max_concurrent` tasks at once.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                outstanding: AtomicUsize::new(0),
                idle: Notify::new(),
                permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            }),
        }
    }

    /// Runs `task` detached from the caller.
    ///
    /// An `Err` result is logged at `error`; so is a panic, which is
    /// contained to the task.
    pub fn spawn<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let registration = Registration::new(Arc::clone(&self.inner));
        let permits = Arc::clone(&self.inner.permits);

        tokio::spawn(async move {
            let _registration = registration;
            let _permit = permits.acquire_owned().await.ok();

            match tokio::spawn(task).await {
                Ok(Ok(())) => tracing::debug!(task = name, "background task finished"),
                Ok(Err(err)) => tracing::error!(task = name, error = %err, "background task failed"),
                Err(join) if join.is_panic() => {
                    tracing::error!(task = name, "background task panicked");
                }
                Err(_) => tracing::warn!(task = name, "background task cancelled"),
            }
        });
    }

    /// Returns the number of tasks registered and not yet finished.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Waits until no task is outstanding.
    pub async fn wait(&self) {
        loop {
            let idle = self.inner.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Waits up to `limit` for outstanding tasks. Returns false on timeout.
    pub async fn wait_timeout(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn wait_covers_every_task_including_failures() {
        let tasks = BackgroundTasks::new(64);
        let completed = Arc::new(AtomicUsize::new(0));

        for i in 0..5u64 {
            let completed = Arc::clone(&completed);
            tasks.spawn("sleeper", async move {
                tokio::time::sleep(Duration::from_millis(100 * (i + 1))).await;
                if i == 2 {
                    panic!("task {i} exploded");
                }
                if i == 3 {
                    return Err(format!("task {i} failed"));
                }
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(tasks.outstanding(), 5);

        assert!(tasks.wait_timeout(Duration::from_secs(10)).await);
        assert_eq!(tasks.outstanding(), 0);
        assert_eq!(completed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_idle() {
        let tasks = BackgroundTasks::new(4);
        assert!(tasks.wait_timeout(Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_timeout_reports_stragglers() {
        let tasks = BackgroundTasks::new(4);
        tasks.spawn("slow", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), String>(())
        });
        assert!(!tasks.wait_timeout(Duration::from_secs(1)).await);
        assert_eq!(tasks.outstanding(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn semaphore_bounds_concurrency() {
        let tasks = BackgroundTasks::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            tasks.spawn("bounded", async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<(), String>(())
            });
        }

        tasks.wait().await;
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }
}
