//! Feed reader integration tests against a mock HTTP server.

use httpmock::prelude::*;
use namedex::feed::{FeedError, FeedReader};
use namedex::fetch::Fetcher;
use tempfile::TempDir;

#[test]
fn test_fetch_records_via_default_strategy() {
    // Whatever the probe found on this host (curl, wget, or the in-process
    // fallback), fetching a reachable URL succeeds.
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/feed.json");
        then.status(200)
            .body(r#"[{"name": "primus", "description": "realtime framework"}]"#);
    });

    let feed = FeedReader::new(
        server.url("/feed.json"),
        Fetcher::new(None).unwrap(),
        None,
    );
    let records = feed.fetch_records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "primus");
}

#[test]
fn test_non_success_status_is_unreachable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/feed.json");
        then.status(500);
    });

    let feed = FeedReader::new(
        server.url("/feed.json"),
        Fetcher::new(Some("http")).unwrap(),
        None,
    );
    assert!(matches!(
        feed.fetch_records(),
        Err(FeedError::Unreachable(_))
    ));
}

#[test]
fn test_snapshot_written_on_success_and_served_on_failure() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("allpackages.json");

    // First reader hits a healthy server and leaves a snapshot behind
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/feed.json");
        then.status(200)
            .body(r#"[{"name": "cached-name", "description": "from snapshot"}]"#);
    });

    let healthy = FeedReader::new(
        server.url("/feed.json"),
        Fetcher::new(Some("http")).unwrap(),
        Some(snapshot.clone()),
    );
    healthy.fetch_records().unwrap();
    assert!(snapshot.exists());

    // Second reader points at a dead endpoint but has the snapshot
    let stale = FeedReader::new(
        "http://127.0.0.1:1/feed.json".to_string(),
        Fetcher::new(Some("http")).unwrap(),
        Some(snapshot),
    );
    let records = stale.fetch_records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "cached-name");
}

#[test]
fn test_no_snapshot_means_failure_propagates() {
    let feed = FeedReader::new(
        "http://127.0.0.1:1/feed.json".to_string(),
        Fetcher::new(Some("http")).unwrap(),
        None,
    );
    assert!(matches!(
        feed.fetch_records(),
        Err(FeedError::Unreachable(_))
    ));
}

#[test]
fn test_invalid_snapshot_surfaces_parse_error() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("allpackages.json");
    std::fs::write(&snapshot, "corrupted {{{").unwrap();

    let feed = FeedReader::new(
        "http://127.0.0.1:1/feed.json".to_string(),
        Fetcher::new(Some("http")).unwrap(),
        Some(snapshot),
    );
    assert!(matches!(feed.fetch_records(), Err(FeedError::Invalid(_))));
}
