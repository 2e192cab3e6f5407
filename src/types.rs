use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Sentinel title recorded when a page has no usable `<title>` element.
pub const NO_TITLE: &str = "<none>";

/// Sentinel fingerprint/note recorded when a response carried no body at all.
pub const NO_CONTENT: &str = "<no page content>";

/// User-Agent sent with probes unless the caller overrides it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/40.0.2214.85 Safari/537.36";

/// Closed set of transport-level probe failures.
///
/// Every probe that never produces an HTTP response is classified as exactly
/// one of these. `Other` is the catch-all, so classification stays total.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConnectTimeout,
    ReadTimeout,
    TlsVerification,
    MalformedResponse,
    ConnectionRefused,
    ConnectionReset,
    Other,
}

impl FailureKind {
    /// Human label projected into every report column for a failed endpoint.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::ConnectTimeout => "Connection timeout.",
            FailureKind::ReadTimeout => "Read timeout.",
            FailureKind::TlsVerification => "Certificate error.",
            FailureKind::MalformedResponse => "Malformed page.",
            FailureKind::ConnectionRefused => "Connection refused.",
            FailureKind::ConnectionReset => "Connection reset by peer.",
            FailureKind::Other => "Unhandled transport error.",
        }
    }
}

/// Outcome of probing a single endpoint URI.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The endpoint answered with a non-empty body.
    Page {
        title: String,
        status: u16,
        body_hash: String,
        /// Final URL, present only when a followed response landed somewhere
        /// other than the requested endpoint.
        redirect: Option<String>,
    },
    /// The endpoint answered but sent no body.
    EmptyBody { status: u16 },
    /// The request never produced a usable response.
    Failed { kind: FailureKind },
}

impl ProbeOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ProbeOutcome::Failed { .. })
    }

    /// Title column. Failures project their label so the table stays rectangular.
    pub fn title_field(&self) -> String {
        match self {
            ProbeOutcome::Page { title, .. } => title.clone(),
            ProbeOutcome::EmptyBody { .. } => NO_TITLE.to_string(),
            ProbeOutcome::Failed { kind } => kind.label().to_string(),
        }
    }

    /// Response-code column.
    pub fn status_field(&self) -> String {
        match self {
            ProbeOutcome::Page { status, .. } | ProbeOutcome::EmptyBody { status } => {
                status.to_string()
            }
            ProbeOutcome::Failed { kind } => kind.label().to_string(),
        }
    }

    /// Content-fingerprint column; also the grouping key for the by-content view.
    pub fn hash_field(&self) -> String {
        match self {
            ProbeOutcome::Page { body_hash, .. } => body_hash.clone(),
            ProbeOutcome::EmptyBody { .. } => NO_CONTENT.to_string(),
            ProbeOutcome::Failed { kind } => kind.label().to_string(),
        }
    }

    /// Redirect column. Only rendered when redirect following is enabled.
    pub fn redirect_field(&self) -> String {
        match self {
            ProbeOutcome::Page {
                redirect: Some(url),
                ..
            } => url.clone(),
            ProbeOutcome::Page { redirect: None, .. } => "No redirect.".to_string(),
            ProbeOutcome::EmptyBody { .. } => NO_CONTENT.to_string(),
            ProbeOutcome::Failed { kind } => kind.label().to_string(),
        }
    }
}

/// Immutable probe configuration broadcast to all workers.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Per-endpoint connect and read timeout.
    pub timeout: Duration,
    /// Verify TLS certificates instead of accepting anything.
    pub verify_tls: bool,
    /// Follow redirects and record where the response landed.
    pub follow_redirects: bool,
    pub user_agent: String,
    /// Size of the bounded worker pool.
    pub concurrency: usize,
}

impl ProbeConfig {
    /// Reject configurations that must fail before any probing starts.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            bail!("timeout must be greater than zero");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be greater than zero");
        }
        Ok(())
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            verify_tls: false,
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrency: 10,
        }
    }
}

/// One host from a scan export: an address plus its port states.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanHost {
    pub addr: String,
    pub ports: Vec<ScanPort>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanPort {
    pub port: u16,
    pub state: String,
}

impl ScanPort {
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }
}

/// Completed probe records and counters for one run.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanResults {
    /// Endpoints handed to the executor.
    pub submitted: u64,
    /// Probes that ran to an outcome (equals `submitted` unless cancelled).
    pub completed: u64,
    /// Subset of `completed` that ended as transport failures.
    pub failures: u64,
    /// One record per probed endpoint, keyed by canonical URI.
    pub records: BTreeMap<String, ProbeOutcome>,
}
