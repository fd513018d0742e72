//! Data models for DeepWiki.
//!
//! Repository identities and the job vocabulary. Persisted records live
//! next to their queries in [`crate::db`].

mod identity;
mod job;

pub use identity::*;
pub use job::*;

use uuid::Uuid;

/// Generate a new UUID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
