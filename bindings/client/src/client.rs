use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use geo_tunnel_instruments::{ErrorKind, OutcomeKind, RequestOutcome};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::request::HttpRequest;

/// Applied to every request unless the workload sets its own.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A `reqwest` client that turns every request into a [RequestOutcome].
///
/// Cheap to clone, clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClientInstrumented {
    client: Client,
    timeout: Duration,
}

impl HttpClientInstrumented {
    /// Every request gets `timeout` as an absolute limit, covering connecting, sending and reading
    /// the response body.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Dispatch the request and classify the result.
    ///
    /// Never fails. A response with the expected status is a success, any other response is a
    /// failure and no usable response at all is an error. Requests are not retried.
    pub async fn send(&self, request: &HttpRequest) -> RequestOutcome {
        let issued_at = Utc::now();

        let url = match request.full_url() {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Invalid URL for [{}] request: {e:?}", request.label);
                return RequestOutcome::new(
                    &request.label,
                    OutcomeKind::Error {
                        kind: ErrorKind::Transport,
                    },
                    Duration::ZERO,
                    issued_at,
                );
            }
        };

        let mut builder = self.client.request(request.method.into(), url);
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let started = Instant::now();
        let response = match builder.send().await {
            // Read the body so that the connection can be reused and the latency includes it.
            Ok(response) => {
                let status = response.status().as_u16();
                response.bytes().await.map(|_| status)
            }
            Err(e) => Err(e),
        };
        let latency = started.elapsed();

        let kind = OutcomeKind::classify(
            response.map_err(|e| classify_error(&e)),
            request.expected_status,
        );
        match kind {
            OutcomeKind::Success { .. } => {}
            OutcomeKind::Failure { status } => log::debug!(
                "[{}] {} {} returned status {status}, expected {}",
                request.label,
                request.method,
                request.url,
                request.expected_status
            ),
            OutcomeKind::Error { kind } => log::debug!(
                "[{}] {} {} failed with a {kind} error",
                request.label,
                request.method,
                request.url
            ),
        }

        RequestOutcome::new(&request.label, kind, latency, issued_at)
    }
}

fn classify_error(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() {
        ErrorKind::Connect
    } else {
        ErrorKind::Transport
    }
}
