//! HTTP probe logic.
//!
//! Performs one GET against an endpoint with a per-attempt timeout and a
//! bounded number of retries on transport failure. Transport errors are
//! folded into the [`ErrorKind`] taxonomy; nothing is propagated to the
//! caller as a Rust error.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use upwatch_core::EngineConfig;
use upwatch_state::Endpoint;

/// Why a probe got no usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    ConnectionRefused,
    DnsFailure,
    Other,
}

impl ErrorKind {
    /// The message stored on a down check record.
    pub fn describe(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "connection timed out",
            ErrorKind::ConnectionRefused => "connection refused",
            ErrorKind::DnsFailure => "host name not resolved",
            ErrorKind::Other => "connection error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionRefused => "connection-refused",
            ErrorKind::DnsFailure => "dns-failure",
            ErrorKind::Other => "other",
        })
    }
}

/// Classify a transport error by its text.
pub fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_ascii_lowercase();
    if message.contains("timed out") || message.contains("timeout") {
        ErrorKind::Timeout
    } else if message.contains("connection refused") {
        ErrorKind::ConnectionRefused
    } else if [
        "dns error",
        "failed to lookup address",
        "could not resolve host",
        "name or service not known",
        "no such host",
    ]
    .iter()
    .any(|marker| message.contains(marker))
    {
        ErrorKind::DnsFailure
    } else {
        ErrorKind::Other
    }
}

fn classify_reqwest(err: &reqwest::Error) -> (ErrorKind, String) {
    // reqwest wraps the interesting part (io error, resolver error) a few
    // levels down the source chain.
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else {
        classify_message(&text)
    };
    (kind, text)
}

/// What to probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTarget {
    pub url: String,
    /// Applies to each attempt separately.
    pub timeout: Duration,
    /// When set, the body is read and searched for this substring.
    pub expected_content: Option<String>,
}

impl ProbeTarget {
    pub fn for_endpoint(endpoint: &Endpoint) -> Self {
        Self {
            url: endpoint.url.clone(),
            timeout: endpoint.timeout(),
            expected_content: endpoint.expected_content.clone(),
        }
    }
}

/// Result of a single probe, retries included.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// The HTTP layer returned a response, whatever its status.
    pub success: bool,
    pub status_code: Option<u16>,
    /// Wall time across all attempts.
    pub response_time_ms: Option<f64>,
    pub error_kind: Option<ErrorKind>,
    /// Raw transport error text, for logs.
    pub error_detail: Option<String>,
    /// `None` unless expected content was requested and a body was read.
    pub content_matched: Option<bool>,
    pub ssl_expires_at: Option<DateTime<Utc>>,
}

impl ProbeOutcome {
    pub fn responded(status_code: u16, response_time_ms: f64) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            response_time_ms: Some(response_time_ms),
            error_kind: None,
            error_detail: None,
            content_matched: None,
            ssl_expires_at: None,
        }
    }

    pub fn failed(kind: ErrorKind, detail: &str, response_time_ms: Option<f64>) -> Self {
        Self {
            success: false,
            status_code: None,
            response_time_ms,
            error_kind: Some(kind),
            error_detail: Some(detail.to_string()),
            content_matched: None,
            ssl_expires_at: None,
        }
    }

    pub fn with_content_match(mut self, matched: bool) -> Self {
        self.content_matched = Some(matched);
        self
    }

    pub fn with_ssl_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.ssl_expires_at = expires_at;
        self
    }
}

/// Something that can check a target over the network.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome;
}

/// Attempt result before retries are folded in.
enum Attempt {
    Response {
        status: u16,
        content_matched: Option<bool>,
        ssl_expires_at: Option<DateTime<Utc>>,
    },
    Transport(ErrorKind, String),
}

/// reqwest-backed prober.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    retries: u32,
    retry_delay: Duration,
}

impl HttpProber {
    pub fn new(user_agent: &str, retries: u32, retry_delay: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .tls_info(true)
            .build()?;
        Ok(Self {
            client,
            retries,
            retry_delay,
        })
    }

    pub fn from_config(engine: &EngineConfig) -> reqwest::Result<Self> {
        Self::new(&engine.user_agent, engine.probe_retries, engine.retry_delay())
    }

    async fn attempt(&self, target: &ProbeTarget) -> Attempt {
        let request = async {
            let response = self
                .client
                .get(&target.url)
                .timeout(target.timeout)
                .send()
                .await?;
            let status = response.status().as_u16();
            let ssl_expires_at = response
                .extensions()
                .get::<reqwest::tls::TlsInfo>()
                .and_then(|info| info.peer_certificate())
                .and_then(certificate_not_after);
            let content_matched = match &target.expected_content {
                Some(expected) => Some(response.text().await?.contains(expected.as_str())),
                None => None,
            };
            Ok::<_, reqwest::Error>(Attempt::Response {
                status,
                content_matched,
                ssl_expires_at,
            })
        };

        // reqwest enforces the timeout too; this bounds body reads and
        // anything the client does outside its own timer.
        match tokio::time::timeout(target.timeout, request).await {
            Ok(Ok(attempt)) => attempt,
            Ok(Err(e)) => {
                let (kind, detail) = classify_reqwest(&e);
                Attempt::Transport(kind, detail)
            }
            Err(_) => Attempt::Transport(
                ErrorKind::Timeout,
                format!("request timed out after {:?}", target.timeout),
            ),
        }
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        let started = Instant::now();
        let mut attempt_no = 0;

        loop {
            attempt_no += 1;
            match self.attempt(target).await {
                Attempt::Response {
                    status,
                    content_matched,
                    ssl_expires_at,
                } => {
                    let elapsed = elapsed_ms(started);
                    debug!(url = %target.url, status, elapsed_ms = elapsed, "probe responded");
                    let mut outcome =
                        ProbeOutcome::responded(status, elapsed).with_ssl_expiry(ssl_expires_at);
                    outcome.content_matched = content_matched;
                    return outcome;
                }
                Attempt::Transport(kind, detail) => {
                    if attempt_no > self.retries {
                        warn!(url = %target.url, %kind, error = %detail, attempts = attempt_no, "probe failed");
                        return ProbeOutcome::failed(kind, &detail, Some(elapsed_ms(started)));
                    }
                    debug!(url = %target.url, %kind, error = %detail, attempt = attempt_no, "probe attempt failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    let ms = started.elapsed().as_secs_f64() * 1000.0;
    (ms * 100.0).round() / 100.0
}

/// `notAfter` of a DER-encoded certificate.
pub fn certificate_not_after(der: &[u8]) -> Option<DateTime<Utc>> {
    use x509_parser::prelude::*;

    let (_, cert) = X509Certificate::from_der(der).ok()?;
    let not_after = cert.validity().not_after.to_datetime();
    DateTime::from_timestamp(not_after.unix_timestamp(), 0)
}
