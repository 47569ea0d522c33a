//! Integration tests for the HTTP client
//!
//! Checks request shapes and error classification against a mock server.

use crate::support::{
    nested_body, pull_requests_body, rate_limit_body, test_config, PrFixture, TOKEN,
};
use pr_harvest::github::{ErrorKind, GitHubClient, PullRequestApi, RateLimitSource, Resource};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_client(server: &MockServer) -> GitHubClient {
    let output = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(server, output.path());
    GitHubClient::new(&config.github, &config.repository, TOKEN).expect("Failed to build client")
}

#[tokio::test]
async fn test_rate_limit_snapshot_parsed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rate_limit_body(1234)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_client(&mock_server);
    let snapshot = client.rate_limit().await.expect("Failed to read quota");

    let budget = snapshot.budget(Resource::Graphql);
    assert_eq!(budget.limit, 5000);
    assert_eq!(budget.remaining, 1234);
    assert!(budget.reset_at > chrono::Utc::now());
}

#[tokio::test]
async fn test_pull_requests_sends_token_and_variables() {
    let mock_server = MockServer::start().await;
    let pr = PrFixture::new(7).with_comments(3);
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "variables": { "owner": "octo", "name": "widgets", "first": 25, "cursor": "abc" }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(pull_requests_body(&[&pr], 40, Some("def"), true)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_client(&mock_server);
    let page = client
        .pull_requests(25, Some("abc"))
        .await
        .expect("Failed to fetch pull requests");

    assert_eq!(page.total_count, 40);
    assert!(page.page_info.has_next_page);
    assert_eq!(page.page_info.end_cursor.as_deref(), Some("def"));
    assert_eq!(page.nodes.len(), 1);
    assert_eq!(page.nodes[0].number, 7);
    assert_eq!(page.nodes[0].comments.nodes.len(), 3);
}

#[tokio::test]
async fn test_nested_comments_page() {
    let mock_server = MockServer::start().await;
    let pr = PrFixture::new(9).with_comments(130);
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "number": 9, "cursor": "c100" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(nested_body(pr.comments_page(100))))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_client(&mock_server);
    let page = client
        .comments(9, Some("c100"))
        .await
        .expect("Failed to fetch comments");

    assert_eq!(page.total_count, 130);
    assert_eq!(page.nodes.len(), 30);
    assert!(!page.page_info.has_next_page);
}

#[tokio::test]
async fn test_thread_comments_page_by_node_id() {
    let mock_server = MockServer::start().await;
    let nodes: Vec<serde_json::Value> = (20..30)
        .map(|i| {
            json!({
                "id": format!("RC_{}", i),
                "author": { "login": "reviewer" },
                "body": format!("note {}", i),
                "path": "src/lib.rs",
                "createdAt": "2024-02-01T12:00:00Z",
            })
        })
        .collect();
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "id": "RT_1", "cursor": "t20" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "node": { "connection": {
                "totalCount": 30,
                "pageInfo": { "hasNextPage": false, "endCursor": "t30" },
                "nodes": nodes,
            } } }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_client(&mock_server);
    let page = client
        .thread_comments("RT_1", Some("t20"))
        .await
        .expect("Failed to fetch thread comments");

    assert_eq!(page.total_count, 30);
    assert_eq!(page.nodes.len(), 10);
    assert_eq!(page.nodes[0].id, "RC_20");
}

#[tokio::test]
async fn test_response_quota_headers_are_observed() {
    let mock_server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 600;
    let pr = PrFixture::new(3);
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-limit", "5000")
                .insert_header("x-ratelimit-remaining", "4870")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str())
                .insert_header("x-ratelimit-resource", "graphql")
                .set_body_json(pull_requests_body(&[&pr], 1, None, false)),
        )
        .mount(&mock_server)
        .await;

    let client = create_client(&mock_server);
    assert!(client.take_observed(Resource::Graphql).is_none());

    client
        .pull_requests(50, None)
        .await
        .expect("Failed to fetch pull requests");

    let budget = client
        .take_observed(Resource::Graphql)
        .expect("No budget observed");
    assert_eq!(budget.limit, 5000);
    assert_eq!(budget.remaining, 4870);
    assert_eq!(budget.reset_at.timestamp(), reset);
    // Taken once
    assert!(client.take_observed(Resource::Graphql).is_none());
    assert!(client.take_observed(Resource::Core).is_none());
}

#[tokio::test]
async fn test_missing_pull_request_is_permanent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "repository": { "pullRequest": null } }
        })))
        .mount(&mock_server)
        .await;

    let client = create_client(&mock_server);
    let err = client.commits(404, None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Permanent);
    assert!(err.to_string().contains("#404"));
}

#[tokio::test]
async fn test_commit_diff_requests_diff_media_type() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets/commits/abc123"))
        .and(header("accept", "application/vnd.github.v3.diff"))
        .respond_with(ResponseTemplate::new(200).set_body_string("diff --git a/x b/x\n"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_client(&mock_server);
    let diff = client.commit_diff("abc123").await.expect("Failed to fetch diff");

    assert_eq!(diff, "diff --git a/x b/x\n");
}

#[tokio::test]
async fn test_exhausted_quota_is_rate_limit() {
    let mock_server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 120;
    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets/commits/abc123"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str())
                .set_body_json(json!({ "message": "API rate limit exceeded" })),
        )
        .mount(&mock_server)
        .await;

    let client = create_client(&mock_server);
    let err = client.commit_diff("abc123").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimit);
    assert_eq!(err.reset_at().map(|t| t.timestamp()), Some(reset));
}

#[tokio::test]
async fn test_forbidden_without_quota_headers_is_permanent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets/commits/abc123"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({ "message": "Resource not accessible by integration" })),
        )
        .mount(&mock_server)
        .await;

    let client = create_client(&mock_server);
    let err = client.commit_diff("abc123").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Permanent);
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&mock_server)
        .await;

    let client = create_client(&mock_server);
    let err = client.pull_requests(10, None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transient);
}

#[tokio::test]
async fn test_graphql_rate_limited_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "type": "RATE_LIMITED", "message": "API rate limit exceeded for user" }]
        })))
        .mount(&mock_server)
        .await;

    let client = create_client(&mock_server);
    let err = client.review_threads(1, None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimit);
}

#[tokio::test]
async fn test_bad_credentials_flagged() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })),
        )
        .mount(&mock_server)
        .await;

    let client = create_client(&mock_server);
    let err = client.pull_requests(10, None).await.unwrap_err();

    assert!(err.is_auth());
    assert_eq!(err.kind(), ErrorKind::Permanent);
}
