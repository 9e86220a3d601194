use crate::retry_client::{RetryClient, RetryConfig};
use serde::Deserialize;
use serde_json::json;

/// Short budget and a single retry: the check sits on the interactive
/// form-submission path.
const TURNSTILE_TIMEOUT_MS: u64 = 5000;
const TURNSTILE_MAX_RETRIES: u32 = 1;

#[derive(Debug, Clone, Deserialize)]
pub struct TurnstileVerification {
    pub success: bool,
    #[serde(rename = "error-codes")]
    pub error_codes: Option<Vec<String>>,
}

/// Client for the Turnstile challenge-verification API.
pub struct TurnstileClient {
    retry: RetryClient,
    verify_url: String,
    retry_config: RetryConfig,
}

impl TurnstileClient {
    pub fn new(retry: RetryClient, verify_url: impl Into<String>) -> Self {
        Self {
            retry,
            verify_url: verify_url.into(),
            retry_config: RetryConfig {
                max_retries: TURNSTILE_MAX_RETRIES,
                timeout_ms: TURNSTILE_TIMEOUT_MS,
                ..RetryConfig::default()
            },
        }
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Verifies a challenge token against the server-held secret.
    ///
    /// Never fails to the caller: network errors, timeouts, and non-2xx
    /// responses all come back as `success: false` with the failure
    /// classification in `error_codes`.
    pub async fn verify(&self, token: &str, secret_key: &str) -> TurnstileVerification {
        let body = json!({ "secret": secret_key, "response": token });

        match self
            .retry
            .post_json(&self.verify_url, None, &body, &self.retry_config, None)
            .await
        {
            Ok(value) => match serde_json::from_value::<TurnstileVerification>(value) {
                Ok(verification) => verification,
                Err(e) => {
                    tracing::error!("Turnstile response unreadable: {}", e);
                    TurnstileVerification {
                        success: false,
                        error_codes: Some(vec!["unknown_error".to_string()]),
                    }
                }
            },
            Err(e) => {
                tracing::error!(
                    "Turnstile verification failed: {} {}",
                    e.classification.as_str(),
                    e.message
                );
                TurnstileVerification {
                    success: false,
                    error_codes: Some(vec![e.classification.as_str().to_string()]),
                }
            }
        }
    }
}
