//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the GitHub API and drive the full
//! crawl cycle end-to-end: enumeration, nested completion, diffs and resume.

use crate::support::{
    diff_text, mount_rate_limit, nested_body, pull_requests_body, snapshot, test_config,
    PrFixture, TOKEN,
};
use pr_harvest::crawler::run_crawl;
use pr_harvest::state::CrawlState;
use pr_harvest::storage::OutputLayout;
use pr_harvest::HarvestError;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENUMERATE: &str = "query PullRequests(";
const COMMENTS: &str = "query PullRequestComments(";

/// Three pull requests; #2 has a second page of comments and shares a commit with #1
fn fixtures() -> Vec<PrFixture> {
    vec![
        PrFixture::new(3).with_commits(&["aaa111"]),
        PrFixture::new(2)
            .with_comments(150)
            .with_commits(&["bbb222", "ddd444"]),
        PrFixture::new(1).with_commits(&["ccc333", "ddd444"]),
    ]
}

const OIDS: [&str; 4] = ["aaa111", "bbb222", "ccc333", "ddd444"];

async fn mount_enumeration_page(
    server: &MockServer,
    cursor: Option<&str>,
    body: Value,
    expected: u64,
) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains(ENUMERATE))
        .and(body_partial_json(json!({ "variables": { "cursor": cursor } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_second_comment_page(server: &MockServer, pr: &PrFixture, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains(COMMENTS))
        .and(body_partial_json(
            json!({ "variables": { "number": pr.number, "cursor": "c100" } }),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(nested_body(pr.comments_page(100))))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_diffs(server: &MockServer, oids: &[&str], expected: u64) {
    for &oid in oids {
        Mock::given(method("GET"))
            .and(path(format!("/repos/octo/widgets/commits/{}", oid)))
            .and(header("accept", "application/vnd.github.v3.diff"))
            .respond_with(ResponseTemplate::new(200).set_body_string(diff_text(oid)))
            .expect(expected)
            .mount(server)
            .await;
    }
}

fn read_record(layout: &OutputLayout, number: u64) -> Value {
    let text = std::fs::read_to_string(layout.records_dir().join(format!("pr-{}.json", number)))
        .expect("Failed to read record");
    serde_json::from_str(&text).expect("Record is not valid JSON")
}

fn read_checkpoint(layout: &OutputLayout) -> CrawlState {
    let text = std::fs::read_to_string(layout.checkpoint_path()).expect("Failed to read checkpoint");
    serde_json::from_str(&text).expect("Checkpoint is not valid JSON")
}

#[tokio::test]
async fn test_full_crawl_three_pull_requests() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().expect("Failed to create temp dir");
    let prs = fixtures();

    mount_rate_limit(&mock_server).await;
    let refs: Vec<&PrFixture> = prs.iter().collect();
    mount_enumeration_page(&mock_server, None, pull_requests_body(&refs, 3, Some("p1"), false), 1)
        .await;
    mount_second_comment_page(&mock_server, &prs[1], 1).await;
    mount_diffs(&mock_server, &OIDS, 1).await;

    let config = test_config(&mock_server, output.path());
    let report = run_crawl(config, TOKEN.to_string(), false)
        .await
        .expect("Crawl failed");

    assert!(report.is_complete());
    assert_eq!(report.total_items, 3);
    assert_eq!(report.processed_items, 3);
    assert_eq!(report.complete_total, 3);
    assert_eq!(report.pending_total, 0);
    let diffs = report.diffs.expect("Diffs were not fetched");
    assert_eq!(diffs.requested, 4);
    assert_eq!(diffs.fetched, 4);

    let layout = OutputLayout::new(output.path());
    for number in 1..=3 {
        let record = read_record(&layout, number);
        assert_eq!(record["number"], number);
    }

    let record = read_record(&layout, 2);
    assert_eq!(record["comments"]["totalCount"], 150);
    assert_eq!(record["comments"]["nodes"].as_array().map(Vec::len), Some(150));
    assert_eq!(record["comments"]["nodes"][149]["id"], "IC_2_149");

    let diffs = snapshot(&layout.diffs_dir());
    assert_eq!(diffs.len(), 4);
    assert_eq!(diffs["ddd444.diff"], diff_text("ddd444").into_bytes());

    let state = read_checkpoint(&layout);
    assert!(state.enumeration_complete);
    assert_eq!(state.completed_count(), 3);
    assert_eq!(state.pending_count(), 0);
    assert!(state.errors.is_empty());
}

#[tokio::test]
async fn test_rerun_makes_no_requests_and_keeps_files() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().expect("Failed to create temp dir");
    let prs = fixtures();
    let refs: Vec<&PrFixture> = prs.iter().collect();

    mount_rate_limit(&mock_server).await;
    mount_enumeration_page(&mock_server, None, pull_requests_body(&refs, 3, Some("p1"), false), 1)
        .await;
    mount_second_comment_page(&mock_server, &prs[1], 1).await;
    mount_diffs(&mock_server, &OIDS, 1).await;

    let config = test_config(&mock_server, output.path());
    run_crawl(config.clone(), TOKEN.to_string(), false)
        .await
        .expect("First crawl failed");

    let layout = OutputLayout::new(output.path());
    let records_before = snapshot(&layout.records_dir());
    let diffs_before = snapshot(&layout.diffs_dir());
    let checkpoint_before =
        std::fs::read(layout.checkpoint_path()).expect("Failed to read checkpoint");

    // Second run: every data endpoint must stay untouched
    mock_server.verify().await;
    mock_server.reset().await;
    mount_rate_limit(&mock_server).await;
    mount_enumeration_page(&mock_server, None, pull_requests_body(&refs, 3, Some("p1"), false), 0)
        .await;
    mount_second_comment_page(&mock_server, &prs[1], 0).await;
    mount_diffs(&mock_server, &OIDS, 0).await;

    let report = run_crawl(config, TOKEN.to_string(), false)
        .await
        .expect("Second crawl failed");

    assert!(report.is_complete());
    assert_eq!(report.recorded, 0);
    assert_eq!(report.completed, 0);
    assert_eq!(report.diffs.map(|d| d.skipped), Some(4));
    assert_eq!(snapshot(&layout.records_dir()), records_before);
    assert_eq!(snapshot(&layout.diffs_dir()), diffs_before);
    assert_eq!(
        std::fs::read(layout.checkpoint_path()).expect("Failed to read checkpoint"),
        checkpoint_before
    );
}

#[tokio::test]
async fn test_resume_after_enumeration_failure() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().expect("Failed to create temp dir");
    let prs = fixtures();

    mount_rate_limit(&mock_server).await;
    mount_enumeration_page(
        &mock_server,
        None,
        pull_requests_body(&[&prs[0], &prs[1]], 3, Some("p2"), true),
        1,
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains(ENUMERATE))
        .and(body_partial_json(json!({ "variables": { "cursor": "p2" } })))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut config = test_config(&mock_server, output.path());
    config.crawler.page_size = 2;

    let result = run_crawl(config.clone(), TOKEN.to_string(), false).await;
    assert!(matches!(result, Err(HarvestError::Enumeration(_))));

    let layout = OutputLayout::new(output.path());
    let state = read_checkpoint(&layout);
    assert_eq!(state.cursor.as_deref(), Some("p2"));
    assert_eq!(state.processed_items, 2);
    assert!(state.is_complete(3));
    assert!(state.pending_ids.contains(&2));
    assert!(!layout.records_dir().join("pr-1.json").exists());

    // Second run picks up at the saved cursor and never re-reads page one
    mock_server.verify().await;
    mock_server.reset().await;
    mount_rate_limit(&mock_server).await;
    mount_enumeration_page(
        &mock_server,
        None,
        pull_requests_body(&[&prs[0], &prs[1]], 3, Some("p2"), true),
        0,
    )
    .await;
    mount_enumeration_page(
        &mock_server,
        Some("p2"),
        pull_requests_body(&[&prs[2]], 3, Some("p3"), false),
        1,
    )
    .await;
    mount_second_comment_page(&mock_server, &prs[1], 1).await;
    mount_diffs(&mock_server, &OIDS, 1).await;

    let report = run_crawl(config, TOKEN.to_string(), false)
        .await
        .expect("Resumed crawl failed");

    assert!(report.is_complete());
    assert_eq!(report.recorded, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(report.processed_items, 3);

    let state = read_checkpoint(&layout);
    assert!(state.enumeration_complete);
    assert_eq!(state.completed_count(), 3);
    assert_eq!(
        read_record(&layout, 2)["comments"]["nodes"]
            .as_array()
            .map(Vec::len),
        Some(150)
    );
}

#[tokio::test]
async fn test_permanent_item_error_is_recorded() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().expect("Failed to create temp dir");
    let prs = fixtures();
    let refs: Vec<&PrFixture> = prs.iter().collect();

    mount_rate_limit(&mock_server).await;
    mount_enumeration_page(&mock_server, None, pull_requests_body(&refs, 3, Some("p1"), false), 1)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains(COMMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "type": "NOT_FOUND", "message": "Could not resolve to a PullRequest" }],
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    // Only completed items contribute commits
    mount_diffs(&mock_server, &["aaa111", "ccc333", "ddd444"], 1).await;

    let config = test_config(&mock_server, output.path());
    let report = run_crawl(config, TOKEN.to_string(), false)
        .await
        .expect("Crawl failed");

    assert!(!report.is_complete());
    assert_eq!(report.item_failures, 1);
    assert_eq!(report.pending_total, 1);
    assert_eq!(report.complete_total, 2);

    let layout = OutputLayout::new(output.path());
    let state = read_checkpoint(&layout);
    assert!(state.pending_ids.contains(&2));
    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].id, 2);

    // The partial record keeps the first page and the resume cursor
    let record = read_record(&layout, 2);
    assert_eq!(record["comments"]["nodes"].as_array().map(Vec::len), Some(100));
    assert_eq!(record["comments"]["endCursor"], "c100");
}

#[tokio::test]
async fn test_rate_limited_response_waits_for_reset() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().expect("Failed to create temp dir");
    let pr = PrFixture::new(1).with_commits(&["ccc333"]);

    mount_rate_limit(&mock_server).await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("retry-after", "1")
                .set_body_json(json!({ "message": "API rate limit exceeded" })),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_enumeration_page(&mock_server, None, pull_requests_body(&[&pr], 1, Some("p1"), false), 1)
        .await;

    let mut config = test_config(&mock_server, output.path());
    config.crawler.skip_diffs = true;

    let started = std::time::Instant::now();
    let report = run_crawl(config, TOKEN.to_string(), false)
        .await
        .expect("Crawl failed");

    assert!(report.is_complete());
    assert!(report.diffs.is_none());
    assert!(started.elapsed() >= std::time::Duration::from_millis(900));
}

#[tokio::test]
async fn test_unauthorized_aborts_crawl() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().expect("Failed to create temp dir");

    mount_rate_limit(&mock_server).await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = test_config(&mock_server, output.path());
    let result = run_crawl(config, TOKEN.to_string(), false).await;

    assert!(matches!(result, Err(HarvestError::Unauthorized(_))));
}
