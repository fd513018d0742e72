//! Application state for DeepWiki.
//!
//! Contains the shared state that is passed to all handlers and used to
//! build the job worker. Everything is constructed once at startup.

use std::sync::Arc;

use crate::config::Config;
use crate::db::DbPool;
use crate::services::{
    ContentFetcher, ContentQuerier, GitHubService, JobDispatcher, JobStatusReporter,
    MarkdownIndexer, MarkdownWikiGenerator, SectionQuerier, TaskContext, TaskQueue, WorkerPool,
};
use crate::Result;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Database connection pool.
    pub db: DbPool,
    /// README source.
    pub fetcher: Arc<dyn ContentFetcher>,
    /// Answers questions about indexed repositories.
    pub querier: Arc<dyn ContentQuerier>,
    /// Task queue executed by the job worker.
    pub queue: TaskQueue,
    pub dispatcher: JobDispatcher,
    pub reporter: JobStatusReporter,
}

impl AppState {
    /// Create a new application state, opening the database and the GitHub client.
    pub async fn new(config: Config) -> Result<Self> {
        let db = crate::db::init_pool(&config.database.path).await?;
        crate::db::initialize_schema(&db).await?;

        let fetcher: Arc<dyn ContentFetcher> = Arc::new(GitHubService::new(&config.github)?);

        Ok(Self::from_parts(config, db, fetcher))
    }

    /// Assemble state from an open database and a fetcher.
    pub fn from_parts(config: Config, db: DbPool, fetcher: Arc<dyn ContentFetcher>) -> Self {
        let queue = TaskQueue::new(db.clone());
        let pool: Arc<dyn WorkerPool> = Arc::new(queue.clone());

        Self {
            config: Arc::new(config),
            dispatcher: JobDispatcher::new(pool.clone(), db.clone()),
            reporter: JobStatusReporter::new(pool),
            db,
            fetcher,
            querier: Arc::new(SectionQuerier::default()),
            queue,
        }
    }

    /// Route dispatch and status polls through another worker pool.
    pub fn with_worker_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.dispatcher = JobDispatcher::new(pool.clone(), self.db.clone());
        self.reporter = JobStatusReporter::new(pool);
        self
    }

    /// Dependencies for the task bodies run by the job worker.
    pub fn task_context(&self) -> TaskContext {
        TaskContext {
            db: self.db.clone(),
            queue: self.queue.clone(),
            fetcher: self.fetcher.clone(),
            indexer: Arc::new(MarkdownIndexer),
            generator: Arc::new(MarkdownWikiGenerator::default()),
        }
    }
}
