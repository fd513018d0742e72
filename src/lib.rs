//! DeepWiki - repository to wiki backend
//!
//! Library exports for the server binary and integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
