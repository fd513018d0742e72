//! GitHub README fetching against a mock API server.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use deepwiki::config::GitHubConfig;
use deepwiki::models::RepositoryIdentity;
use deepwiki::services::{ContentFetcher, FetchError, GitHubService};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const README_PATH: &str = "/repos/acme/widgets/readme";

fn service(api_url: &str, token: Option<&str>, timeout_secs: u64) -> GitHubService {
    let config = GitHubConfig {
        api_url: api_url.to_string(),
        token: token.map(str::to_string),
        timeout_secs,
    };
    GitHubService::new(&config).expect("Failed to create GitHub service")
}

fn widgets() -> RepositoryIdentity {
    RepositoryIdentity::new("acme", "widgets").unwrap()
}

/// Base64 body wrapped at 60 columns the way the contents API returns it.
fn encoded_readme(text: &str) -> String {
    let encoded = STANDARD.encode(text);
    encoded
        .as_bytes()
        .chunks(60)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join("\n")
}

async fn mount_status(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(README_PATH))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_readme_decodes_content() {
    let mock_server = MockServer::start().await;
    let readme = "# Widgets\n\nA widget library with a README long enough to wrap across lines.";

    Mock::given(method("GET"))
        .and(path(README_PATH))
        .and(header("Accept", "application/vnd.github.v3+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "README.md",
            "encoding": "base64",
            "content": encoded_readme(readme),
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let github = service(&mock_server.uri(), None, 10);
    let text = github.fetch_primary_document(&widgets()).await.unwrap();

    assert_eq!(text, readme);
}

#[tokio::test]
async fn test_fetch_readme_sends_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(README_PATH))
        .and(header("Authorization", "token ghp_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "encoding": "base64",
            "content": encoded_readme("hello"),
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let github = service(&mock_server.uri(), Some("ghp_test"), 10);
    let text = github.get_readme("acme", "widgets").await.unwrap();

    assert_eq!(text, "hello");
}

#[tokio::test]
async fn test_missing_readme_is_not_found() {
    let mock_server = MockServer::start().await;
    mount_status(&mock_server, ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"}))).await;

    let err = service(&mock_server.uri(), None, 10)
        .fetch_primary_document(&widgets())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::NotFound(_)));
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_bad_token_is_unauthorized() {
    let mock_server = MockServer::start().await;
    mount_status(&mock_server, ResponseTemplate::new(401)).await;

    let err = service(&mock_server.uri(), Some("expired"), 10)
        .fetch_primary_document(&widgets())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "unauthorized");
}

#[tokio::test]
async fn test_forbidden_without_token_mentions_token() {
    let mock_server = MockServer::start().await;
    mount_status(&mock_server, ResponseTemplate::new(403)).await;

    let err = service(&mock_server.uri(), None, 10)
        .fetch_primary_document(&widgets())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "forbidden");
    assert!(err.to_string().contains("no GitHub token is configured"));
}

#[tokio::test]
async fn test_exhausted_quota_is_rate_limited() {
    let mock_server = MockServer::start().await;
    mount_status(
        &mock_server,
        ResponseTemplate::new(403).insert_header("x-ratelimit-remaining", "0"),
    )
    .await;

    let err = service(&mock_server.uri(), None, 10)
        .fetch_primary_document(&widgets())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "rate_limited");
}

#[tokio::test]
async fn test_too_many_requests_is_rate_limited() {
    let mock_server = MockServer::start().await;
    mount_status(&mock_server, ResponseTemplate::new(429)).await;

    let err = service(&mock_server.uri(), None, 10)
        .fetch_primary_document(&widgets())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::RateLimited(_)));
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let mock_server = MockServer::start().await;
    mount_status(
        &mock_server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"encoding": "base64", "content": encoded_readme("late")}))
            .set_delay(Duration::from_secs(3)),
    )
    .await;

    let err = service(&mock_server.uri(), None, 1)
        .fetch_primary_document(&widgets())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "timeout");
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_server_error_is_transport() {
    let mock_server = MockServer::start().await;
    mount_status(&mock_server, ResponseTemplate::new(502)).await;

    let err = service(&mock_server.uri(), None, 10)
        .fetch_primary_document(&widgets())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "transport");
}

#[tokio::test]
async fn test_non_json_body_is_malformed() {
    let mock_server = MockServer::start().await;
    mount_status(&mock_server, ResponseTemplate::new(200).set_body_string("<html>oops</html>")).await;

    let err = service(&mock_server.uri(), None, 10)
        .fetch_primary_document(&widgets())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "malformed");
}

#[tokio::test]
async fn test_connection_refused_is_transport() {
    let err = service("http://127.0.0.1:1", None, 5)
        .fetch_primary_document(&widgets())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "transport");
}
