//! Background job worker executing queued tasks.
//!
//! Polls the SQLite task queue with:
//! - Atomic task claiming (prevents duplicate processing)
//! - Bounded concurrency
//! - Heartbeats while a task runs
//! - Stale task recovery for workers that died mid-task

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::tasks::{error_chain, run_task, TaskContext};
use crate::config::WorkerConfig;
use crate::db::QueuedTask;
use crate::error::{Error, Result};
use crate::models::JobKind;

/// How often to check for stale tasks (seconds)
const STALE_CHECK_INTERVAL_SECS: u64 = 60;

/// Background job worker service.
#[derive(Clone)]
pub struct JobWorker {
    inner: Arc<JobWorkerInner>,
}

struct JobWorkerInner {
    ctx: TaskContext,
    config: WorkerConfig,
    running: RwLock<bool>,
    active_jobs: RwLock<usize>,
    worker_id: String,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(ctx: TaskContext, config: WorkerConfig) -> Self {
        // Generate unique worker ID
        let worker_id = format!("worker-{}-{}", hostname(), nanoid::nanoid!(8));

        Self {
            inner: Arc::new(JobWorkerInner {
                ctx,
                config,
                running: RwLock::new(false),
                active_jobs: RwLock::new(0),
                worker_id,
            }),
        }
    }

    /// Get the worker ID.
    pub fn worker_id(&self) -> &str {
        &self.inner.worker_id
    }

    /// Start the job worker background loop.
    /// Returns a handle that can be used to stop the worker.
    pub async fn start(&self) -> JobWorkerHandle {
        *self.inner.running.write().await = true;

        let worker = self.clone();
        let main_handle = tokio::spawn(async move {
            worker.run_loop().await;
        });

        let recovery_worker = self.clone();
        tokio::spawn(async move {
            recovery_worker.run_stale_recovery_loop().await;
        });

        info!(
            worker_id = %self.inner.worker_id,
            concurrency = self.inner.config.concurrency,
            "Job worker started"
        );

        JobWorkerHandle {
            worker: self.clone(),
            _handle: main_handle,
        }
    }

    /// Run the main processing loop.
    async fn run_loop(&self) {
        let poll_interval = Duration::from_millis(self.inner.config.poll_interval_ms);

        loop {
            if !*self.inner.running.read().await {
                info!(worker_id = %self.inner.worker_id, "Job worker stopping");
                break;
            }

            let active = *self.inner.active_jobs.read().await;
            if active >= self.inner.config.concurrency {
                debug!(active, max = self.inner.config.concurrency, "At max concurrent jobs, waiting");
                sleep(poll_interval).await;
                continue;
            }

            match self.claim_and_spawn().await {
                Ok(true) => {}
                Ok(false) => sleep(poll_interval).await,
                Err(e) => {
                    error!(error = %e, "Error claiming task");
                    sleep(poll_interval).await;
                }
            }
        }
    }

    /// Run stale task recovery loop.
    async fn run_stale_recovery_loop(&self) {
        loop {
            if !*self.inner.running.read().await {
                break;
            }

            match self
                .inner
                .ctx
                .queue
                .recover_stale(self.inner.config.stale_after_secs)
                .await
            {
                Ok(recovered) if recovered > 0 => {
                    info!(count = recovered, "Recovered stale tasks");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Error recovering stale tasks"),
            }

            sleep(Duration::from_secs(STALE_CHECK_INTERVAL_SECS)).await;
        }
    }

    /// Claim one task and process it in the background.
    async fn claim_and_spawn(&self) -> Result<bool> {
        let task = match self.inner.ctx.queue.claim(&self.inner.worker_id).await? {
            Some(task) => task,
            None => return Ok(false),
        };

        *self.inner.active_jobs.write().await += 1;

        let worker = self.clone();
        tokio::spawn(async move {
            let heartbeat_worker = worker.clone();
            let heartbeat_task_id = task.id.clone();
            let heartbeat_handle = tokio::spawn(async move {
                heartbeat_worker.heartbeat_loop(&heartbeat_task_id).await;
            });

            worker.execute(&task).await;

            heartbeat_handle.abort();
            *worker.inner.active_jobs.write().await -= 1;
        });

        Ok(true)
    }

    /// Claim and execute a single task inline.
    ///
    /// Returns the id of the executed task, or None when the queue is empty.
    pub async fn run_once(&self) -> Result<Option<String>> {
        match self.inner.ctx.queue.claim(&self.inner.worker_id).await? {
            Some(task) => {
                self.execute(&task).await;
                Ok(Some(task.id))
            }
            None => Ok(None),
        }
    }

    /// Run a claimed task and store its outcome in the queue.
    async fn execute(&self, task: &QueuedTask) {
        let queue = &self.inner.ctx.queue;
        let start_time = Instant::now();

        let result = match JobKind::from_task_name(&task.task_name) {
            Some(kind) => {
                let kwargs: Value = task.kwargs_json();
                run_task(&self.inner.ctx, kind, &task.id, &kwargs).await
            }
            None => Err(Error::Internal(format!(
                "no task body registered for '{}'",
                task.task_name
            ))),
        };
        let duration_ms = start_time.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                info!(task_id = %task.id, task = %task.task_name, duration_ms, "Task completed successfully");
                if let Err(e) = queue.mark_success(&task.id, &value).await {
                    error!(task_id = %task.id, error = %e, "Failed to store task result");
                }
            }
            Err(e) => {
                error!(task_id = %task.id, task = %task.task_name, duration_ms, error = %e, "Task failed");
                let traceback = error_chain(&e);
                if let Err(store_err) = queue.mark_failure(&task.id, &e.to_string(), Some(&traceback)).await {
                    error!(task_id = %task.id, error = %store_err, "Failed to store task failure");
                }
            }
        }
    }

    /// Send periodic heartbeats for a running task.
    async fn heartbeat_loop(&self, task_id: &str) {
        let interval = Duration::from_secs(self.inner.config.heartbeat_secs.max(1));

        loop {
            sleep(interval).await;

            if !*self.inner.running.read().await {
                break;
            }

            match self.inner.ctx.queue.heartbeat(task_id, &self.inner.worker_id).await {
                Ok(true) => debug!(task_id, "Heartbeat sent"),
                Ok(false) => {
                    warn!(task_id, "Task no longer owned by this worker, stopping heartbeat");
                    break;
                }
                Err(e) => warn!(task_id, error = %e, "Failed to send heartbeat"),
            }
        }
    }

    /// Stop the worker loops after their current iteration.
    pub async fn stop(&self) {
        info!("Stopping job worker");
        *self.inner.running.write().await = false;
    }

    /// Get current job worker status.
    pub async fn status(&self) -> JobWorkerStatus {
        JobWorkerStatus {
            running: *self.inner.running.read().await,
            active_jobs: *self.inner.active_jobs.read().await,
            worker_id: self.inner.worker_id.clone(),
        }
    }
}

/// Handle for controlling a running job worker.
pub struct JobWorkerHandle {
    worker: JobWorker,
    _handle: tokio::task::JoinHandle<()>,
}

impl JobWorkerHandle {
    /// Stop the job worker.
    pub async fn stop(self) {
        self.worker.stop().await;
    }
}

/// Job worker status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobWorkerStatus {
    pub running: bool,
    pub active_jobs: usize,
    pub worker_id: String,
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
