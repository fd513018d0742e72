//! Service layer for DeepWiki.
//!
//! Contains the job lifecycle and its collaborators:
//! - GitHub (README fetching)
//! - Pipelines (markdown indexing, wiki generation and section queries)
//! - WorkerPool / TaskQueue (SQLite-backed task broker)
//! - Dispatcher (job submission)
//! - Reporter (job status polling)
//! - Tasks (index and wiki task bodies)
//! - JobWorker (task execution loop)

mod dispatcher;
mod github;
mod job_worker;
pub mod markdown;
mod pipelines;
mod reporter;
pub mod tasks;
mod worker_pool;

pub use dispatcher::JobDispatcher;
pub use github::{ContentFetcher, FetchError, GitHubService};
pub use job_worker::{JobWorker, JobWorkerHandle, JobWorkerStatus};
pub use pipelines::{
    ContentGenerator, ContentIndexer, ContentQuerier, IndexSummary, MarkdownIndexer,
    MarkdownWikiGenerator, QueryAnswer, SectionQuerier, SourceDocument,
};
pub use reporter::JobStatusReporter;
pub use tasks::TaskContext;
pub use worker_pool::{PoolError, PoolTaskState, TaskQueue, WorkerPool};
