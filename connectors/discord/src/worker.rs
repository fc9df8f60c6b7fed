//! Bounded worker pool for worker-dispatched handlers.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::DispatchConfig;

/// A unit of work for the pool.
pub type Job = BoxFuture<'static, ()>;

/// What happens to queued and running jobs on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// Stop accepting jobs, then wait for every queued job to finish.
    #[default]
    Drain,
    /// Stop accepting jobs and abort the workers.
    Abandon,
}

/// Why a job was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("worker queue is full")]
    Full,
    #[error("worker pool is shut down")]
    Closed,
}

enum PoolState {
    Idle,
    Running {
        tx: mpsc::Sender<Job>,
        workers: Vec<JoinHandle<()>>,
    },
    Closed,
}

/// Fixed set of worker tasks fed by a bounded queue.
///
/// Workers are spawned on the first submission, so a pool that only ever sees
/// synchronous handlers never touches the runtime.
pub struct WorkerPool {
    config: DispatchConfig,
    state: Mutex<PoolState>,
    depth: Arc<AtomicUsize>,
}

impl WorkerPool {
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState::Idle),
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a job without waiting.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Full`] when the queue is at capacity, [`SubmitError::Closed`]
    /// after shutdown.
    pub fn submit(&self, job: Job) -> Result<(), SubmitError> {
        let mut state = self.state.lock();
        if matches!(*state, PoolState::Idle) {
            *state = self.start();
        }

        match &*state {
            PoolState::Running { tx, .. } => {
                // Counted before the send so a worker never decrements first.
                let depth = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
                match tx.try_send(job) {
                    Ok(()) => {
                        dgw_telemetry::metrics::set_worker_queue_depth(depth);
                        Ok(())
                    }
                    Err(err) => {
                        self.depth.fetch_sub(1, Ordering::AcqRel);
                        match err {
                            TrySendError::Full(_) => Err(SubmitError::Full),
                            TrySendError::Closed(_) => Err(SubmitError::Closed),
                        }
                    }
                }
            }
            PoolState::Idle | PoolState::Closed => Err(SubmitError::Closed),
        }
    }

    /// Jobs queued but not yet picked up.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Stop the pool. Idempotent.
    pub async fn shutdown(&self, policy: DrainPolicy) {
        let previous = std::mem::replace(&mut *self.state.lock(), PoolState::Closed);
        let PoolState::Running { tx, workers } = previous else {
            return;
        };
        drop(tx);

        match policy {
            DrainPolicy::Drain => {
                debug!(workers = workers.len(), "Draining worker pool");
                for worker in workers {
                    let _ = worker.await;
                }
            }
            DrainPolicy::Abandon => {
                debug!(
                    workers = workers.len(),
                    queued = self.queue_depth(),
                    "Abandoning worker pool"
                );
                for worker in &workers {
                    worker.abort();
                }
                for worker in workers {
                    let _ = worker.await;
                }
            }
        }
    }

    fn start(&self) -> PoolState {
        let (tx, rx) = mpsc::channel::<Job>(self.config.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..self.config.workers.max(1))
            .map(|index| {
                let rx = Arc::clone(&rx);
                let depth = Arc::clone(&self.depth);
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else { break };
                        let remaining = depth.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
                        dgw_telemetry::metrics::set_worker_queue_depth(remaining);

                        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                            warn!(worker = index, "Worker job panicked");
                        }
                    }
                })
            })
            .collect();

        debug!(
            workers = self.config.workers,
            capacity = self.config.queue_capacity,
            "Worker pool started"
        );
        PoolState::Running { tx, workers }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use tokio::sync::{oneshot, Notify};

    use super::*;

    fn pool(workers: usize, queue_capacity: usize) -> WorkerPool {
        WorkerPool::new(DispatchConfig {
            workers,
            queue_capacity,
        })
    }

    #[tokio::test]
    async fn test_jobs_run_and_drain() {
        let pool = pool(2, 16);
        let count = Arc::new(AtomicU32::new(0));

        for _ in 0..10 {
            let count = Arc::clone(&count);
            pool.submit(
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    count.fetch_add(1, Ordering::SeqCst);
                }
                .boxed(),
            )
            .unwrap();
        }

        pool.shutdown(DrainPolicy::Drain).await;
        assert_eq!(count.load(Ordering::SeqCst), 10);
        assert_eq!(pool.submit(async {}.boxed()), Err(SubmitError::Closed));
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let pool = pool(1, 1);
        let gate = Arc::new(Notify::new());
        let (started_tx, started_rx) = oneshot::channel();

        // Occupy the single worker.
        let blocker = Arc::clone(&gate);
        pool.submit(
            async move {
                let _ = started_tx.send(());
                blocker.notified().await;
            }
            .boxed(),
        )
        .unwrap();
        started_rx.await.unwrap();

        // One slot in the queue, then full.
        pool.submit(async {}.boxed()).unwrap();
        assert_eq!(pool.submit(async {}.boxed()), Err(SubmitError::Full));
        assert_eq!(pool.queue_depth(), 1);

        gate.notify_one();
        pool.shutdown(DrainPolicy::Drain).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queue_depth_stays_within_capacity() {
        let pool = Arc::new(pool(4, 256));
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let sampler = tokio::spawn({
            let pool = Arc::clone(&pool);
            let done = Arc::clone(&done);
            async move {
                let mut peak = 0;
                while !done.load(Ordering::Acquire) {
                    peak = peak.max(pool.queue_depth());
                    tokio::task::yield_now().await;
                }
                peak
            }
        });

        for _ in 0..2_000 {
            while pool.submit(async {}.boxed()) == Err(SubmitError::Full) {
                tokio::task::yield_now().await;
            }
        }
        pool.shutdown(DrainPolicy::Drain).await;
        done.store(true, Ordering::Release);

        // One in-flight submit may be counted ahead of a rejected send.
        let peak = sampler.await.unwrap();
        assert!(peak <= 257, "queue depth reported {peak}");
        assert_eq!(pool.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_panic_does_not_kill_worker() {
        let pool = pool(1, 4);
        let (tx, rx) = oneshot::channel();

        pool.submit(async { panic!("handler exploded") }.boxed()).unwrap();
        pool.submit(
            async move {
                let _ = tx.send(42);
            }
            .boxed(),
        )
        .unwrap();

        assert_eq!(rx.await.unwrap(), 42);
        pool.shutdown(DrainPolicy::Drain).await;
    }

    #[tokio::test]
    async fn test_abandon_does_not_wait() {
        let pool = pool(1, 4);
        let finished = Arc::new(AtomicU32::new(0));
        let flag = Arc::clone(&finished);
        pool.submit(
            async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                flag.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        )
        .unwrap();
        tokio::task::yield_now().await;

        tokio::time::timeout(Duration::from_secs(1), pool.shutdown(DrainPolicy::Abandon))
            .await
            .expect("abandon should return promptly");
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_is_noop() {
        let pool = pool(2, 2);
        pool.shutdown(DrainPolicy::Drain).await;
        assert_eq!(pool.submit(async {}.boxed()), Err(SubmitError::Closed));
    }
}
