//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use deepwiki::config::Config;
use deepwiki::db::{self, DbPool};
use deepwiki::models::RepositoryIdentity;
use deepwiki::services::{ContentFetcher, FetchError, JobWorker, PoolError, PoolTaskState, WorkerPool};
use deepwiki::AppState;
use serde_json::Value;
use tempfile::TempDir;

pub const WIDGETS_URL: &str = "https://github.com/acme/widgets";
pub const WIDGETS_README: &str = "# Widgets\nA widget library.";

/// Create an on-disk test database with the schema applied.
///
/// The returned directory must outlive the pool.
pub async fn setup_test_db() -> (DbPool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("deepwiki-test.db");
    let pool = db::init_pool(path.to_str().expect("temp path is UTF-8"))
        .await
        .expect("Failed to create test database");
    db::initialize_schema(&pool)
        .await
        .expect("Failed to initialize schema");
    (pool, dir)
}

/// Configuration with a fast-polling worker.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.worker.poll_interval_ms = 10;
    config.worker.heartbeat_secs = 1;
    config
}

/// Application state backed by a fresh database and the given fetcher.
pub async fn setup_state(fetcher: StubFetcher) -> (AppState, TempDir) {
    let (pool, dir) = setup_test_db().await;
    let state = AppState::from_parts(test_config(), pool, Arc::new(fetcher));
    (state, dir)
}

/// Job worker over the state's queue.
pub fn worker_for(state: &AppState) -> JobWorker {
    JobWorker::new(state.task_context(), test_config().worker)
}

/// Execute queued tasks until the queue is empty. Returns how many ran.
pub async fn drain(worker: &JobWorker) -> usize {
    let mut executed = 0;
    while worker.run_once().await.expect("Failed to claim task").is_some() {
        executed += 1;
    }
    executed
}

/// Content fetcher returning a canned outcome for every repository.
#[derive(Clone)]
pub struct StubFetcher {
    outcome: Result<String, FetchError>,
}

impl StubFetcher {
    pub fn readme(text: &str) -> Self {
        Self {
            outcome: Ok(text.to_string()),
        }
    }

    pub fn widgets() -> Self {
        Self::readme(WIDGETS_README)
    }

    pub fn failing(err: FetchError) -> Self {
        Self { outcome: Err(err) }
    }
}

#[async_trait]
impl ContentFetcher for StubFetcher {
    async fn fetch_primary_document(
        &self,
        _identity: &RepositoryIdentity,
    ) -> Result<String, FetchError> {
        self.outcome.clone()
    }
}

/// Worker pool whose broker cannot be reached.
pub struct UnreachablePool;

#[async_trait]
impl WorkerPool for UnreachablePool {
    fn is_registered(&self, _task_name: &str) -> bool {
        true
    }

    async fn submit(&self, _task_name: &str, _kwargs: Value) -> Result<String, PoolError> {
        Err(PoolError::Unavailable("connection refused".to_string()))
    }

    async fn query(&self, _task_id: &str) -> Result<PoolTaskState, PoolError> {
        Err(PoolError::Unavailable("connection refused".to_string()))
    }
}

/// Worker pool with no task bodies registered.
pub struct EmptyRegistryPool;

#[async_trait]
impl WorkerPool for EmptyRegistryPool {
    fn is_registered(&self, _task_name: &str) -> bool {
        false
    }

    async fn submit(&self, task_name: &str, _kwargs: Value) -> Result<String, PoolError> {
        Err(PoolError::NotRegistered(task_name.to_string()))
    }

    async fn query(&self, _task_id: &str) -> Result<PoolTaskState, PoolError> {
        Ok(PoolTaskState::pending())
    }
}
