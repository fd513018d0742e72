//! Configuration management for DeepWiki.
//!
//! Loads configuration from environment variables (and an optional `.env`
//! file). The resulting [`Config`] is built once in `main` and handed to the
//! application state and the job worker.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub github: GitHubConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests running longer than this are answered with 408
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// Base URL of the GitHub REST API
    pub api_url: String,
    /// Personal access token, sent as `Authorization: token <t>`
    pub token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Run the job worker inside the server process
    pub enabled: bool,
    /// Maximum tasks executed concurrently
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub heartbeat_secs: u64,
    /// Tasks without a heartbeat for this long are handed to another worker
    pub stale_after_secs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    pub format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                request_timeout_secs: 30,
            },
            database: DatabaseConfig {
                path: "./data/deepwiki.db".to_string(),
            },
            github: GitHubConfig::default(),
            worker: WorkerConfig::default(),
            logging: LoggingConfig {
                filter: "deepwiki=info,tower_http=info".to_string(),
                format: LogFormat::Text,
            },
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            timeout_secs: 10,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: 4,
            poll_interval_ms: 1000,
            heartbeat_secs: 30,
            stale_after_secs: 300,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl GitHubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Self {
            server: ServerConfig {
                host: env_or("HOST", &defaults.server.host),
                port: env_parse("PORT", defaults.server.port),
                request_timeout_secs: env_parse(
                    "REQUEST_TIMEOUT_SECS",
                    defaults.server.request_timeout_secs,
                ),
            },
            database: DatabaseConfig {
                path: env_or("DATABASE_PATH", &defaults.database.path),
            },
            github: GitHubConfig {
                api_url: env_or("GITHUB_API_URL", &defaults.github.api_url)
                    .trim_end_matches('/')
                    .to_string(),
                token: env::var("GITHUB_API_TOKEN")
                    .ok()
                    .filter(|t| !t.trim().is_empty()),
                timeout_secs: env_parse("GITHUB_TIMEOUT_SECS", defaults.github.timeout_secs),
            },
            worker: WorkerConfig {
                enabled: env_bool("WORKER_ENABLED", defaults.worker.enabled),
                concurrency: env_parse("WORKER_CONCURRENCY", defaults.worker.concurrency).max(1),
                poll_interval_ms: env_parse(
                    "WORKER_POLL_INTERVAL_MS",
                    defaults.worker.poll_interval_ms,
                ),
                heartbeat_secs: env_parse("WORKER_HEARTBEAT_SECS", defaults.worker.heartbeat_secs),
                stale_after_secs: env_parse(
                    "WORKER_STALE_AFTER_SECS",
                    defaults.worker.stale_after_secs,
                ),
            },
            logging: LoggingConfig {
                filter: env_or("RUST_LOG", &defaults.logging.filter),
                format: match env_or("LOG_FORMAT", "text").to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    _ => LogFormat::Text,
                },
            },
        }
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.github.timeout(), Duration::from_secs(10));
        assert_eq!(config.server.request_timeout(), Duration::from_secs(30));
        assert!(config.worker.enabled);
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        env::set_var("DEEPWIKI_TEST_PARSE", "not-a-number");
        assert_eq!(env_parse("DEEPWIKI_TEST_PARSE", 7u64), 7);
        env::set_var("DEEPWIKI_TEST_PARSE", " 42 ");
        assert_eq!(env_parse("DEEPWIKI_TEST_PARSE", 7u64), 42);
        env::remove_var("DEEPWIKI_TEST_PARSE");
    }

    #[test]
    fn test_env_bool() {
        env::set_var("DEEPWIKI_TEST_BOOL", "false");
        assert!(!env_bool("DEEPWIKI_TEST_BOOL", true));
        env::set_var("DEEPWIKI_TEST_BOOL", "on");
        assert!(env_bool("DEEPWIKI_TEST_BOOL", false));
        env::remove_var("DEEPWIKI_TEST_BOOL");
        assert!(env_bool("DEEPWIKI_TEST_BOOL", true));
    }
}
