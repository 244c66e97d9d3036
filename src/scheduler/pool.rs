//! Skill Worker Pool
//!
//! Bounded priority queue of Skill jobs drained by a fixed set of workers.
//! Jobs leave the queue highest priority first, then in enqueue order, so a
//! batch enqueued for one event starts in dispatch order.

use super::executor::Executor;
use crate::config::SchedulerConfig;
use crate::context::InvocationContext;
use crate::descriptor::ComponentDescriptor;
use crate::error::RuntimeError;
use crate::registry::Snapshot;
use crate::report::{InvocationResult, InvocationStatus};
use crate::types::Priority;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One Skill dispatch waiting for a worker.
pub struct SkillJob {
    pub descriptor: Arc<ComponentDescriptor>,
    /// Snapshot the event was matched against
    pub snapshot: Arc<Snapshot>,
    pub prompt: String,
    pub timeout: Duration,
    pub max_depth: u32,
    /// Created at enqueue so a queued job can be cancelled before it starts
    pub cancel: CancellationToken,
}

struct QueuedJob {
    job: SkillJob,
    priority: Priority,
    sequence: u64,
    reply: oneshot::Sender<InvocationResult>,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedJob {}

impl Ord for QueuedJob {
    /// Higher priority first; for equal priority the earlier sequence number
    /// compares Greater so the max-heap pops it first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.priority.cmp(&other.priority) {
            std::cmp::Ordering::Equal => self.sequence.cmp(&other.sequence).reverse(),
            ordering => ordering,
        }
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Pool statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    /// Jobs that finished with a non-success status
    pub failed: usize,
}

pub struct SkillPool {
    queue: Arc<Mutex<BinaryHeap<QueuedJob>>>,
    notify: Arc<Notify>,
    workers: RwLock<Vec<tokio::task::JoinHandle<()>>>,
    executor: Arc<Executor>,
    worker_count: usize,
    max_queue_size: usize,
    sequence: AtomicU64,
    running: Arc<AtomicBool>,
    stats: Arc<RwLock<PoolStats>>,
}

impl SkillPool {
    pub fn new(executor: Arc<Executor>, config: &SchedulerConfig) -> Self {
        Self {
            queue: Arc::new(Mutex::new(BinaryHeap::new())),
            notify: Arc::new(Notify::new()),
            workers: RwLock::new(Vec::new()),
            executor,
            worker_count: config.max_concurrency.max(1),
            max_queue_size: config.max_queue_size,
            sequence: AtomicU64::new(0),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(RwLock::new(PoolStats::default())),
        }
    }

    /// Spawn the workers. Must be called inside a Tokio runtime.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut workers = self.workers.write();
        for worker_id in 0..self.worker_count {
            let queue = Arc::clone(&self.queue);
            let notify = Arc::clone(&self.notify);
            let executor = Arc::clone(&self.executor);
            let running = Arc::clone(&self.running);
            let stats = Arc::clone(&self.stats);

            workers.push(tokio::spawn(async move {
                Self::worker_loop(worker_id, queue, notify, executor, running, stats).await;
            }));
        }

        info!(worker_count = workers.len(), "Started skill worker pool");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Enqueue all jobs of one event atomically, in dispatch order. The
    /// whole batch is refused if it would overflow the queue.
    pub async fn enqueue_batch(
        &self,
        jobs: Vec<SkillJob>,
    ) -> Result<Vec<oneshot::Receiver<InvocationResult>>, RuntimeError> {
        if !self.is_running() {
            return Err(RuntimeError::ShutDown);
        }

        let batch_size = jobs.len();
        let mut queue = self.queue.lock().await;

        if queue.len() + batch_size > self.max_queue_size {
            warn!(
                queue_size = queue.len(),
                batch_size,
                max_size = self.max_queue_size,
                "Skill batch would exceed queue size limit"
            );
            return Err(RuntimeError::QueueFull(self.max_queue_size));
        }

        let mut receivers = Vec::with_capacity(batch_size);
        for job in jobs {
            let (reply, receiver) = oneshot::channel();
            let priority = job
                .descriptor
                .as_skill()
                .map(|spec| spec.priority)
                .unwrap_or_default();
            queue.push(QueuedJob {
                job,
                priority,
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                reply,
            });
            receivers.push(receiver);
        }
        drop(queue);

        self.stats.write().pending += batch_size;
        for _ in 0..batch_size.min(self.worker_count) {
            self.notify.notify_one();
        }

        debug!(batch_size, "Enqueued skill batch");
        Ok(receivers)
    }

    /// Stop the workers. Jobs still queued are answered with an error
    /// result instead of being run.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();

        let workers = std::mem::take(&mut *self.workers.write());
        for handle in workers {
            let _ = handle.await;
        }

        let drained: Vec<QueuedJob> = self.queue.lock().await.drain().collect();
        if !drained.is_empty() {
            warn!(count = drained.len(), "Dropping queued skills at shutdown");
        }
        for queued in drained {
            let descriptor = &queued.job.descriptor;
            let _ = queued.reply.send(InvocationResult::failed(
                Uuid::new_v4(),
                &descriptor.name,
                descriptor.tier(),
                InvocationStatus::Error,
                "runtime shut down before the skill started",
            ));
        }
        self.stats.write().pending = 0;

        info!("Stopped skill worker pool");
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.read().clone()
    }

    async fn worker_loop(
        worker_id: usize,
        queue: Arc<Mutex<BinaryHeap<QueuedJob>>>,
        notify: Arc<Notify>,
        executor: Arc<Executor>,
        running: Arc<AtomicBool>,
        stats: Arc<RwLock<PoolStats>>,
    ) {
        debug!(worker_id, "Worker started");

        while running.load(Ordering::SeqCst) {
            let next = queue.lock().await.pop();

            let Some(queued) = next else {
                // Wake on enqueue, or periodically to notice shutdown
                tokio::select! {
                    _ = notify.notified() => continue,
                    _ = sleep(Duration::from_millis(100)) => continue,
                }
            };

            {
                let mut stats = stats.write();
                stats.pending = stats.pending.saturating_sub(1);
                stats.running += 1;
            }

            let QueuedJob { job, reply, .. } = queued;
            let ctx = InvocationContext::root(
                &job.descriptor,
                job.snapshot,
                job.timeout,
                job.max_depth,
                job.cancel,
            );
            let result = executor.run_root(&job.descriptor, &ctx, job.prompt).await;

            {
                let mut stats = stats.write();
                stats.running = stats.running.saturating_sub(1);
                if result.status.is_success() {
                    stats.completed += 1;
                } else {
                    stats.failed += 1;
                }
            }

            if reply.send(result).is_err() {
                debug!(worker_id, "Skill result dropped; receiver gone");
            }
        }

        debug!(worker_id, "Worker stopped");
    }
}
