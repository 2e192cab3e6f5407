use std::collections::{BTreeMap, BTreeSet};
use std::error::Error as StdError;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::redirect;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::{FailureKind, ProbeConfig, ProbeOutcome, ScanResults, NO_TITLE};

/// Probe every endpoint in the canonical set with a bounded worker pool.
///
/// - Limits concurrent requests with a `Semaphore` sized to `config.concurrency`.
/// - Each probe is bounded by the configured timeout.
/// - Every submitted endpoint ends with exactly one record in the results:
///   transport failures are classified and recorded as data, never raised.
pub async fn probe_all(targets: &BTreeSet<String>, config: &ProbeConfig) -> Result<ScanResults> {
    probe_all_internal(targets, config, None).await
}

/// Variant that accepts a `CancellationToken`. Workers check it between
/// probes only; a probe already in flight runs to its own timeout or outcome.
pub async fn probe_all_with_cancel(
    targets: &BTreeSet<String>,
    config: &ProbeConfig,
    cancel: CancellationToken,
) -> Result<ScanResults> {
    probe_all_internal(targets, config, Some(cancel)).await
}

async fn probe_all_internal(
    targets: &BTreeSet<String>,
    config: &ProbeConfig,
    cancel_opt: Option<CancellationToken>,
) -> Result<ScanResults> {
    config.validate()?;
    let client = build_client(config).context("failed to build HTTP client")?;

    let records = Arc::new(Mutex::new(BTreeMap::new()));
    let completed = Arc::new(AtomicU64::new(0));
    let failures = Arc::new(AtomicU64::new(0));
    let sem = Arc::new(Semaphore::new(config.concurrency));
    let cancel = cancel_opt.unwrap_or_default();
    let mut set = JoinSet::new();

    for uri in targets {
        if cancel.is_cancelled() {
            break;
        }
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore in scope");
        let client = client.clone();
        let uri = uri.clone();
        let records = records.clone();
        let completed = completed.clone();
        let failures = failures.clone();
        let cancel = cancel.clone();
        let follow_redirects = config.follow_redirects;

        set.spawn(async move {
            let _permit = permit; // held until the probe finishes

            if cancel.is_cancelled() {
                return;
            }

            let outcome = probe_one(&client, &uri, follow_redirects).await;
            if outcome.is_failure() {
                failures.fetch_add(1, Ordering::Relaxed);
            }
            completed.fetch_add(1, Ordering::Relaxed);

            // Keys come from a deduplicated set, so inserts never collide.
            let mut guard = records.lock().await;
            guard.insert(uri, outcome);
        });
    }

    while set.join_next().await.is_some() {}

    let records = match Arc::try_unwrap(records) {
        Ok(mutex) => mutex.into_inner(),
        // Unreachable in practice: every task has been joined above.
        Err(arc) => arc.lock().await.clone(),
    };

    Ok(ScanResults {
        submitted: targets.len() as u64,
        completed: completed.load(Ordering::Relaxed),
        failures: failures.load(Ordering::Relaxed),
        records,
    })
}

fn build_client(config: &ProbeConfig) -> reqwest::Result<reqwest::Client> {
    let policy = if config.follow_redirects {
        redirect::Policy::limited(10)
    } else {
        redirect::Policy::none()
    };
    reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout)
        .connect_timeout(config.timeout)
        .danger_accept_invalid_certs(!config.verify_tls)
        .redirect(policy)
        .build()
}

/// Probe a single endpoint. Every path returns an outcome.
async fn probe_one(client: &reqwest::Client, uri: &str, follow_redirects: bool) -> ProbeOutcome {
    let resp = match client.get(uri).send().await {
        Ok(resp) => resp,
        Err(err) => return fail(uri, &err),
    };
    let status = resp.status().as_u16();
    let final_url = resp.url().clone();
    let body = match resp.bytes().await {
        Ok(body) => body,
        Err(err) => return fail(uri, &err),
    };

    if body.is_empty() {
        debug!(uri, status, "response had no body");
        return ProbeOutcome::EmptyBody { status };
    }

    let body_hash = format!("{:x}", Sha256::digest(&body));
    let title = extract_title(&body);
    if title == NO_TITLE {
        debug!(uri, "page has no usable title element");
    }
    let redirect = if follow_redirects && !is_same_endpoint(uri, &final_url) {
        Some(final_url.to_string())
    } else {
        None
    };

    ProbeOutcome::Page {
        title,
        status,
        body_hash,
        redirect,
    }
}

fn fail(uri: &str, err: &reqwest::Error) -> ProbeOutcome {
    let kind = classify_transport_error(err);
    debug!(uri, error = %err, "{}", kind.label());
    ProbeOutcome::Failed { kind }
}

/// A followed response counts as a redirect only when it landed somewhere
/// other than the requested endpoint (modulo URL normalization such as the
/// implicit root path or a default port).
fn is_same_endpoint(requested: &str, landed: &reqwest::Url) -> bool {
    match reqwest::Url::parse(requested) {
        Ok(requested) => requested == *landed,
        Err(_) => requested.trim_end_matches('/') == landed.as_str().trim_end_matches('/'),
    }
}

/// First `<title>` text of the document, or the sentinel when the element is
/// missing or empty. The document is parsed fresh per call; workers never
/// share parser state.
fn extract_title(body: &[u8]) -> String {
    let document = Html::parse_document(&String::from_utf8_lossy(body));
    let Ok(selector) = Selector::parse("title") else {
        return NO_TITLE.to_string();
    };
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string())
}

/// Map a transport-level error onto the closed failure taxonomy.
///
/// Inspection is structural: reqwest's own flags first, then the source chain
/// (io error kinds, TLS and HTTP-parse error types). `Other` catches the rest.
fn classify_transport_error(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        return if err.is_connect() {
            FailureKind::ConnectTimeout
        } else {
            FailureKind::ReadTimeout
        };
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => return FailureKind::ConnectionRefused,
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => {
                    return FailureKind::ConnectionReset
                }
                io::ErrorKind::TimedOut => return FailureKind::ConnectTimeout,
                _ => {}
            }
        }
        if cause.downcast_ref::<native_tls::Error>().is_some() {
            return FailureKind::TlsVerification;
        }
        if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
            if hyper_err.is_parse() || hyper_err.is_incomplete_message() {
                return FailureKind::MalformedResponse;
            }
        }
        source = cause.source();
    }
    FailureKind::Other
}
