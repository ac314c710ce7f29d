//! Upstream client: drives the attempt loop and yields decoded chunks.
//!
//! Each call to [`UpstreamClient::fetch`] returns a lazy stream. Nothing is sent
//! until the stream is first polled, and dropping the stream drops the in-flight
//! response, which closes the upstream connection.
//!
//! The attempt loop is an explicit state machine:
//! ```text
//! Idle → Attempting(1) ─┬─ 200 ──────────────→ Succeeded
//!                       ├─ non-200 ──────────→ ProtocolError(status)
//!                       ├─ connect failure ──→ Attempting(n+1) … → ExhaustedRetries(n)
//!                       └─ body read failure or error line → Aborted(err)
//! ```
//! Only transport failures before a response head are retried.

use std::time::Duration;

use futures::Stream;
use tokio_stream::StreamExt;
use reqwest::StatusCode;
use tracing::{debug, error, info, warn};

use crate::config::UpstreamConfig;
use crate::upstream::ndjson::{error_message, LineDecoder};
use crate::upstream::{ChunkResult, GenerationRequest, UpstreamError};

/// Where a single fetch is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    /// Nothing sent yet.
    Idle,
    /// Sending attempt `n` (1-based).
    Attempting(u32),
    /// Body fully relayed.
    Succeeded,
    /// All `n` attempts failed to connect.
    ExhaustedRetries(u32),
    /// Upstream answered with a non-200 status.
    ProtocolError(u16),
    /// Failed in a way that is neither retried nor a status error.
    Aborted(UpstreamError),
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptState::Idle | AttemptState::Attempting(_))
    }

    /// The in-band error a terminal state ends the sequence with.
    pub fn terminal_error(&self) -> Option<UpstreamError> {
        match self {
            AttemptState::ExhaustedRetries(attempts) => Some(UpstreamError::ConnectionExhausted {
                attempts: *attempts,
            }),
            AttemptState::ProtocolError(status) => Some(UpstreamError::HttpStatus(*status)),
            AttemptState::Aborted(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Transition after attempt `attempt` failed to connect.
    pub fn after_connect_failure(attempt: u32, max_attempts: u32) -> Self {
        if attempt < max_attempts {
            AttemptState::Attempting(attempt + 1)
        } else {
            AttemptState::ExhaustedRetries(attempt)
        }
    }
}

/// HTTP client for the upstream generate endpoint.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    url: String,
    default_model: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl UpstreamClient {
    /// Build a client from explicit configuration.
    ///
    /// Idle connections are never kept, so every attempt dials a fresh
    /// connection that closes when its response is dropped.
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            http,
            url: config.generate_url(),
            default_model: config.default_model.clone(),
            max_attempts: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    /// Model used when a request does not name one.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Relay one generation request as a lazy chunk stream.
    ///
    /// The stream yields decoded chunks in upstream order and ends either
    /// normally or with exactly one `Err` item.
    pub fn fetch(
        &self,
        request: &GenerationRequest,
    ) -> impl Stream<Item = ChunkResult> + Send + 'static {
        let http = self.http.clone();
        let url = self.url.clone();
        let max_attempts = self.max_attempts;
        let retry_delay = self.retry_delay;
        let request = request.clone();

        async_stream::stream! {
            let mut state = AttemptState::Idle;

            while !state.is_terminal() {
                state = match state {
                    AttemptState::Idle => AttemptState::Attempting(1),

                    AttemptState::Attempting(attempt) => {
                        info!(
                            attempt,
                            max_attempts,
                            model = request.model(),
                            "Sending request to Ollama server"
                        );

                        match http.post(&url).json(&request).send().await {
                            Ok(response) if response.status() == StatusCode::OK => {
                                info!(attempt, "Successfully connected to Ollama server");

                                let mut decoder = LineDecoder::new();
                                let mut failure = None;
                                if request.stream() {
                                    let mut body = std::pin::pin!(response.bytes_stream());
                                    'body: while let Some(read) = body.next().await {
                                        let bytes = match read {
                                            Ok(bytes) => bytes,
                                            Err(e) => {
                                                failure = Some(UpstreamError::Interrupted(e.to_string()));
                                                break;
                                            }
                                        };
                                        for chunk in decoder.push(&bytes) {
                                            if let Some(message) = error_message(&chunk) {
                                                failure = Some(UpstreamError::Upstream(message.to_string()));
                                                break 'body;
                                            }
                                            yield Ok(chunk);
                                        }
                                    }
                                    if failure.is_none() {
                                        if let Some(chunk) = decoder.finish() {
                                            match error_message(&chunk).map(str::to_string) {
                                                Some(message) => failure = Some(UpstreamError::Upstream(message)),
                                                None => yield Ok(chunk),
                                            }
                                        }
                                    }
                                } else {
                                    match response.bytes().await {
                                        Ok(body) => {
                                            let mut chunks = decoder.push(&body);
                                            chunks.extend(decoder.finish());
                                            for chunk in chunks {
                                                if let Some(message) = error_message(&chunk) {
                                                    failure = Some(UpstreamError::Upstream(message.to_string()));
                                                    break;
                                                }
                                                yield Ok(chunk);
                                            }
                                        }
                                        Err(e) => failure = Some(UpstreamError::Interrupted(e.to_string())),
                                    }
                                }

                                if decoder.skipped() > 0 {
                                    warn!(skipped = decoder.skipped(), "Dropped malformed upstream lines");
                                }
                                match failure {
                                    Some(err) => AttemptState::Aborted(err),
                                    None => AttemptState::Succeeded,
                                }
                            }
                            Ok(response) => AttemptState::ProtocolError(response.status().as_u16()),
                            Err(e) if e.is_builder() => {
                                AttemptState::Aborted(UpstreamError::Request(e.to_string()))
                            }
                            Err(e) => {
                                let next = AttemptState::after_connect_failure(attempt, max_attempts);
                                if let AttemptState::Attempting(_) = next {
                                    warn!(attempt, "Connection error: {e}. Retrying...");
                                    tokio::time::sleep(retry_delay).await;
                                } else {
                                    error!(attempt, "Max retries reached. Connection error: {e}");
                                }
                                next
                            }
                        }
                    }

                    terminal => terminal,
                };
            }

            match state.terminal_error() {
                Some(err) => {
                    error!("{err}");
                    yield Err(err);
                }
                None => debug!(model = request.model(), "Upstream response complete"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failure_transitions() {
        assert_eq!(
            AttemptState::after_connect_failure(1, 3),
            AttemptState::Attempting(2)
        );
        assert_eq!(
            AttemptState::after_connect_failure(3, 3),
            AttemptState::ExhaustedRetries(3)
        );
        assert_eq!(
            AttemptState::after_connect_failure(1, 1),
            AttemptState::ExhaustedRetries(1)
        );
    }

    #[test]
    fn test_terminal_errors() {
        assert!(!AttemptState::Idle.is_terminal());
        assert!(!AttemptState::Attempting(2).is_terminal());
        assert!(AttemptState::Succeeded.is_terminal());
        assert_eq!(AttemptState::Succeeded.terminal_error(), None);
        assert_eq!(
            AttemptState::ProtocolError(503).terminal_error(),
            Some(UpstreamError::HttpStatus(503))
        );
        assert_eq!(
            AttemptState::ExhaustedRetries(3).terminal_error(),
            Some(UpstreamError::ConnectionExhausted { attempts: 3 })
        );
    }

    #[test]
    fn test_client_from_config() {
        let config = UpstreamConfig {
            host: "http://ollama.local".to_string(),
            port: 11435,
            max_retries: 0,
            ..UpstreamConfig::default()
        };
        let client = UpstreamClient::new(&config).unwrap();
        assert_eq!(client.url(), "http://ollama.local:11435/api/generate");
        assert_eq!(client.default_model(), config.default_model);
        assert_eq!(client.max_attempts, 1);
    }
}
