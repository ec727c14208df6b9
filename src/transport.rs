use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server answered HTTP {0}")]
    Status(u16),
    #[error("no response within {0:?}")]
    TimedOut(Duration),
    #[error("request failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<TransportError>,
    },
}

/// Something that can deliver a request body to the form server.
pub trait Transport: Send + Sync + 'static {
    fn post(&self, body: String) -> BoxFuture<'static, Result<String, TransportError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub attempts: u32,
    pub timeout: Duration,
}

impl From<&ClientConfig> for RetryPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            attempts: config.request_retries.max(1),
            timeout: config.request_timeout(),
        }
    }
}

/// Send `body` until it succeeds or the attempts run out. Every attempt sends
/// the same bytes and is bounded by the policy timeout.
pub async fn send_with_retry(
    transport: Arc<dyn Transport>,
    body: String,
    policy: RetryPolicy,
) -> Result<String, TransportError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.timeout, transport.post(body.clone())).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::TimedOut(policy.timeout)),
        };
        match outcome {
            Ok(response) => {
                debug!(target: "transport", attempt, bytes = response.len(), "response received");
                return Ok(response);
            }
            Err(err) if attempt < policy.attempts => {
                warn!(target: "transport", attempt, error = %err, "request failed, retrying");
            }
            Err(err) => {
                warn!(target: "transport", attempt, error = %err, "giving up");
                return Err(TransportError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
        }
    }
}

/// POSTs request bodies to the form server over HTTP.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
}

impl HttpTransport {
    pub fn new(url: Url) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn post(&self, body: String) -> BoxFuture<'static, Result<String, TransportError>> {
        let request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/xml")
            .body(body);
        async move {
            let response = request
                .send()
                .await
                .map_err(|err| TransportError::Network(err.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }
            response
                .text()
                .await
                .map_err(|err| TransportError::Network(err.to_string()))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Flaky {
        bodies: Mutex<Vec<String>>,
        failures: u32,
    }

    impl Transport for Flaky {
        fn post(&self, body: String) -> BoxFuture<'static, Result<String, TransportError>> {
            let mut bodies = self.bodies.lock().unwrap();
            bodies.push(body);
            let result = if bodies.len() as u32 <= self.failures {
                Err(TransportError::Status(503))
            } else {
                Ok("<event-response/>".to_string())
            };
            async move { result }.boxed()
        }
    }

    struct Silent;

    impl Transport for Silent {
        fn post(&self, _body: String) -> BoxFuture<'static, Result<String, TransportError>> {
            futures_util::future::pending().boxed()
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn retries_with_identical_body_then_succeeds() {
        let transport = Arc::new(Flaky {
            failures: 2,
            ..Flaky::default()
        });
        let result = send_with_retry(transport.clone(), "<body/>".into(), policy(3)).await;
        assert_eq!(result.unwrap(), "<event-response/>");
        let bodies = transport.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 3);
        assert!(bodies.iter().all(|b| b == "<body/>"));
    }

    #[tokio::test]
    async fn stops_after_configured_attempts() {
        let transport = Arc::new(Flaky {
            failures: u32::MAX,
            ..Flaky::default()
        });
        let err = send_with_retry(transport.clone(), "<body/>".into(), policy(3))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Exhausted {
                attempts: 3,
                last: Box::new(TransportError::Status(503)),
            }
        );
        assert_eq!(transport.bodies.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failed_attempt() {
        let err = send_with_retry(Arc::new(Silent), "<body/>".into(), policy(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Exhausted { attempts: 2, ref last } if matches!(**last, TransportError::TimedOut(_))
        ));
    }
}
