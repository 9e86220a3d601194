use rand::Rng;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Error classification for outbound request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Connection-level failure (DNS, reset, malformed body).
    Network,
    /// The per-attempt timeout fired.
    Timeout,
    /// The caller-supplied cancellation token fired. Never retried.
    Aborted,
    /// HTTP 429 or any 5xx.
    HttpRetriable,
    /// Any other non-2xx status. Fails on the first attempt.
    HttpNonRetriable,
}

impl ErrorClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClassification::Network => "network",
            ErrorClassification::Timeout => "timeout",
            ErrorClassification::Aborted => "aborted",
            ErrorClassification::HttpRetriable => "http_retriable",
            ErrorClassification::HttpNonRetriable => "http_non_retriable",
        }
    }

    pub fn retriable(&self) -> bool {
        matches!(
            self,
            ErrorClassification::Network
                | ErrorClassification::Timeout
                | ErrorClassification::HttpRetriable
        )
    }
}

/// Typed failure produced by [`RetryClient`] after classification and, for
/// retriable classes, retry exhaustion.
#[derive(Debug)]
pub struct RetryError {
    pub message: String,
    pub classification: ErrorClassification,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Parsed response body of the failing attempt, when one was readable.
    pub response_body: Option<Value>,
    /// Underlying transport error, stringified.
    pub source: Option<String>,
}

impl RetryError {
    fn http(message: String, classification: ErrorClassification, status: u16, body: Option<Value>) -> Self {
        Self {
            message,
            classification,
            status: Some(status),
            response_body: body,
            source: None,
        }
    }

    fn transport(message: String, classification: ErrorClassification, source: Option<String>) -> Self {
        Self {
            message,
            classification,
            status: None,
            response_body: None,
            source,
        }
    }

    pub fn retriable(&self) -> bool {
        self.classification.retriable()
    }
}

impl fmt::Display for RetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.classification.as_str())
    }
}

/// Per-call-site retry configuration. Each field is independently
/// overridable; defaults match the shared client contract.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Max retry attempts (excluding the initial request).
    pub max_retries: u32,
    /// Initial retry delay in ms; doubles per attempt before jitter.
    pub initial_delay_ms: u64,
    /// Per-attempt request timeout in ms.
    pub timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            timeout_ms: 10_000,
        }
    }
}

/// Backoff delay for a 1-indexed attempt: `initial * 2^(attempt-1)` scaled by
/// a jitter factor drawn uniformly from [0.5, 1.0). The randomized multiplier
/// spreads concurrent retries against the same endpoint.
pub fn backoff_delay_ms(attempt: u32, initial_delay_ms: u64) -> u64 {
    let base = initial_delay_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(32));
    let jitter = rand::thread_rng().gen_range(0.5..1.0);
    (base as f64 * jitter).round() as u64
}

/// Shared outbound HTTP client with timeout, retry, and exponential backoff.
///
/// HTTP 429 and 5xx responses plus transport failures are retried; other
/// non-2xx statuses fail immediately with the parsed response body attached.
/// Caller cancellation aborts the in-flight attempt and is never retried.
#[derive(Clone)]
pub struct RetryClient {
    client: reqwest::Client,
}

impl Default for RetryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// POST a JSON body and parse the JSON response, retrying per `config`.
    pub async fn post_json(
        &self,
        url: &str,
        bearer_token: Option<&str>,
        body: &Value,
        config: &RetryConfig,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, RetryError> {
        let total_attempts = config.max_retries + 1;

        for attempt in 1..=total_attempts {
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    return Err(RetryError::transport(
                        format!("Request aborted: {}", url),
                        ErrorClassification::Aborted,
                        None,
                    ));
                }
            }

            let mut request = self
                .client
                .post(url)
                .timeout(Duration::from_millis(config.timeout_ms))
                .json(body);
            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }

            let sent = request.send();
            let result = match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(RetryError::transport(
                                format!("Request aborted: {}", url),
                                ErrorClassification::Aborted,
                                None,
                            ));
                        }
                        r = sent => r,
                    }
                }
                None => sent.await,
            };

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.json::<Value>().await {
                            Ok(parsed) => return Ok(parsed),
                            Err(e) => {
                                // Unreadable 2xx body is a transport-level
                                // failure, retried like any network error
                                if attempt < total_attempts {
                                    self.log_retry(url, "network", attempt, total_attempts, config)
                                        .await;
                                    continue;
                                }
                                return Err(RetryError::transport(
                                    format!("Failed to parse response from {}", url),
                                    ErrorClassification::Network,
                                    Some(e.to_string()),
                                ));
                            }
                        }
                    }

                    let code = status.as_u16();
                    let retriable = code == 429 || status.is_server_error();
                    let parsed_body = response.json::<Value>().await.ok();

                    if retriable && attempt < total_attempts {
                        self.log_retry(
                            url,
                            &format!("HTTP {}", code),
                            attempt,
                            total_attempts,
                            config,
                        )
                        .await;
                        continue;
                    }

                    return Err(RetryError::http(
                        format!("HTTP {} from {}", code, url),
                        if retriable {
                            ErrorClassification::HttpRetriable
                        } else {
                            ErrorClassification::HttpNonRetriable
                        },
                        code,
                        parsed_body,
                    ));
                }
                Err(e) => {
                    let classification = if e.is_timeout() {
                        ErrorClassification::Timeout
                    } else {
                        ErrorClassification::Network
                    };

                    if attempt < total_attempts {
                        self.log_retry(
                            url,
                            classification.as_str(),
                            attempt,
                            total_attempts,
                            config,
                        )
                        .await;
                        continue;
                    }

                    return Err(RetryError::transport(
                        format!("Request to {} failed: {}", url, e),
                        classification,
                        Some(e.to_string()),
                    ));
                }
            }
        }

        // The loop always returns; this is the same terminal guard the
        // attempt counter makes unreachable.
        Err(RetryError::transport(
            format!("Exhausted retries for {}", url),
            ErrorClassification::Network,
            None,
        ))
    }

    async fn log_retry(
        &self,
        url: &str,
        reason: &str,
        attempt: u32,
        total_attempts: u32,
        config: &RetryConfig,
    ) {
        let delay = backoff_delay_ms(attempt, config.initial_delay_ms);
        tracing::warn!(
            "[retry_client] {} from {}, retrying in {}ms ({}/{})",
            reason,
            url,
            delay,
            attempt,
            total_attempts
        );
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_with_bounded_jitter() {
        for attempt in 1..=4u32 {
            let base = 1000u64 * (1 << (attempt - 1));
            for _ in 0..50 {
                let delay = backoff_delay_ms(attempt, 1000);
                assert!(delay >= base / 2, "delay {} below half base {}", delay, base);
                assert!(delay <= base, "delay {} above base {}", delay, base);
            }
        }
    }

    #[test]
    fn classification_retriability() {
        assert!(ErrorClassification::Network.retriable());
        assert!(ErrorClassification::Timeout.retriable());
        assert!(ErrorClassification::HttpRetriable.retriable());
        assert!(!ErrorClassification::Aborted.retriable());
        assert!(!ErrorClassification::HttpNonRetriable.retriable());
    }

    #[test]
    fn default_config_matches_contract() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.timeout_ms, 10_000);
    }
}
