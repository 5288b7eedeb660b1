//! Fetcher integration tests against a mock HTTP server.

use httpmock::prelude::*;
use namedex::fetch::{FetchError, Fetcher};

#[test]
fn test_buffered_fetch_returns_payload() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/payload.json");
        then.status(200).body(r#"[{"name": "primus"}]"#);
    });

    let fetcher = Fetcher::new(Some("http")).unwrap();
    let body = fetcher.fetch(&server.url("/payload.json")).unwrap();
    assert_eq!(body, br#"[{"name": "primus"}]"#);
}

#[test]
fn test_buffered_fetch_surfaces_http_failure() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/payload.json");
        then.status(502);
    });

    let fetcher = Fetcher::new(Some("http")).unwrap();
    assert!(matches!(
        fetcher.fetch(&server.url("/payload.json")),
        Err(FetchError::Http(_))
    ));
}
