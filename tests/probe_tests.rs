//! Probe executor integration tests against local canned HTTP listeners.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use web_scan_rs::prober::probe_all;
use web_scan_rs::types::{FailureKind, ProbeConfig, ProbeOutcome, NO_CONTENT, NO_TITLE};

const TITLED_PAGE: &str =
    "<html><head><title>Synthetic Endpoint</title></head><body>ok</body></html>";
const UNTITLED_PAGE: &str = "<html><body>nothing to see</body></html>";

fn test_config(concurrency: usize) -> ProbeConfig {
    ProbeConfig {
        timeout: Duration::from_secs(5),
        verify_tls: false,
        follow_redirects: true,
        user_agent: "web-scan-rs test".into(),
        concurrency,
    }
}

async fn serve_once(mut stream: TcpStream, response: String) {
    // Drain the request head first so the client never sees an early close.
    let mut buf = [0u8; 4096];
    let _ = stream.read(&mut buf).await;
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn html_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

/// Spawn a listener that answers every connection with the same response.
async fn spawn_server(response: String) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_once(stream, response.clone()));
        }
    });
    addr
}

/// Addresses nothing listens on: hold all the listeners at once so the ports
/// are distinct, then drop them together.
async fn refused_addrs(n: usize) -> Vec<SocketAddr> {
    let mut listeners = Vec::with_capacity(n);
    for _ in 0..n {
        listeners.push(TcpListener::bind("127.0.0.1:0").await.expect("bind"));
    }
    listeners
        .iter()
        .map(|l| l.local_addr().expect("local addr"))
        .collect()
}

#[tokio::test]
async fn every_submitted_endpoint_gets_exactly_one_record() {
    let mut uris = BTreeSet::new();
    for _ in 0..26 {
        let addr = spawn_server(html_response(TITLED_PAGE)).await;
        uris.insert(format!("http://{addr}"));
    }
    for addr in refused_addrs(26).await {
        uris.insert(format!("http://{addr}"));
    }
    assert_eq!(uris.len(), 52, "synthetic endpoints must be distinct");

    let results = probe_all(&uris, &test_config(8)).await.expect("probe run");

    assert_eq!(results.submitted, 52);
    assert_eq!(results.completed, 52);
    assert_eq!(results.records.len(), 52, "no drops, no duplicates");
    for uri in &uris {
        assert!(results.records.contains_key(uri), "missing record for {uri}");
    }
}

#[tokio::test]
async fn refused_endpoint_does_not_disturb_siblings() {
    let good = spawn_server(html_response(TITLED_PAGE)).await;
    let bad = refused_addrs(1).await[0];
    let uris: BTreeSet<String> =
        [format!("http://{good}"), format!("http://{bad}")].into_iter().collect();

    let results = probe_all(&uris, &test_config(2)).await.expect("probe run");
    assert_eq!(results.records.len(), 2);
    assert_eq!(results.failures, 1);

    let good_record = &results.records[&format!("http://{good}")];
    assert!(
        matches!(good_record, ProbeOutcome::Page { title, .. } if title == "Synthetic Endpoint"),
        "sibling probe should have completed normally: {good_record:?}"
    );

    let bad_record = &results.records[&format!("http://{bad}")];
    assert_eq!(
        *bad_record,
        ProbeOutcome::Failed {
            kind: FailureKind::ConnectionRefused
        }
    );
}

#[tokio::test]
async fn empty_body_produces_sentinel_record_not_an_error() {
    let addr = spawn_server(
        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    )
    .await;
    let uris: BTreeSet<String> = [format!("http://{addr}")].into_iter().collect();

    let results = probe_all(&uris, &test_config(1)).await.expect("probe run");
    let record = &results.records[&format!("http://{addr}")];

    assert_eq!(*record, ProbeOutcome::EmptyBody { status: 200 });
    assert_eq!(record.title_field(), NO_TITLE);
    assert_eq!(record.hash_field(), NO_CONTENT);
}

#[tokio::test]
async fn missing_title_yields_sentinel_with_other_fields_intact() {
    let addr = spawn_server(html_response(UNTITLED_PAGE)).await;
    let uris: BTreeSet<String> = [format!("http://{addr}")].into_iter().collect();

    let results = probe_all(&uris, &test_config(1)).await.expect("probe run");
    match &results.records[&format!("http://{addr}")] {
        ProbeOutcome::Page {
            title,
            status,
            body_hash,
            redirect,
        } => {
            assert_eq!(title, NO_TITLE);
            assert_eq!(*status, 200);
            assert_eq!(body_hash.len(), 64, "sha-256 hex digest expected");
            assert!(redirect.is_none());
        }
        other => panic!("expected a page record, got {other:?}"),
    }
}

#[tokio::test]
async fn followed_redirect_is_noted_with_final_url() {
    let destination = spawn_server(html_response(TITLED_PAGE)).await;
    let redirecting = spawn_server(format!(
        "HTTP/1.1 302 Found\r\nLocation: http://{destination}/\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    ))
    .await;
    let uris: BTreeSet<String> = [format!("http://{redirecting}")].into_iter().collect();

    let results = probe_all(&uris, &test_config(1)).await.expect("probe run");
    match &results.records[&format!("http://{redirecting}")] {
        ProbeOutcome::Page { title, redirect, .. } => {
            assert_eq!(title, "Synthetic Endpoint");
            let note = redirect.as_deref().expect("redirect note expected");
            assert!(note.contains(&destination.to_string()));
        }
        other => panic!("expected a page record, got {other:?}"),
    }
}

#[tokio::test]
async fn direct_hit_carries_no_redirect_note() {
    let addr = spawn_server(html_response(TITLED_PAGE)).await;
    let uris: BTreeSet<String> = [format!("http://{addr}")].into_iter().collect();

    let results = probe_all(&uris, &test_config(1)).await.expect("probe run");
    match &results.records[&format!("http://{addr}")] {
        ProbeOutcome::Page { redirect, .. } => assert!(redirect.is_none()),
        other => panic!("expected a page record, got {other:?}"),
    }
}

#[tokio::test]
async fn identical_bodies_share_a_fingerprint() {
    let first = spawn_server(html_response(TITLED_PAGE)).await;
    let second = spawn_server(html_response(TITLED_PAGE)).await;
    let uris: BTreeSet<String> =
        [format!("http://{first}"), format!("http://{second}")].into_iter().collect();

    let results = probe_all(&uris, &test_config(2)).await.expect("probe run");
    let hashes: Vec<String> = results.records.values().map(|r| r.hash_field()).collect();
    assert_eq!(hashes.len(), 2);
    assert_eq!(hashes[0], hashes[1]);
}
