use crate::errors::{AppError, ResultExt};
use crate::kv::KvStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_WINDOW_SECS: u64 = 60;
const DEFAULT_MAX_REQUESTS: u32 = 5;

/// Fixed-window limits. Defaults: 5 requests per 60s window.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Epoch seconds when the current window closes.
    pub reset_at: i64,
}

/// Stored counter, JSON-encoded under `rate_limit:<identifier>`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitCounter {
    count: u32,
    reset_at: i64,
}

/// KV-backed fixed-window rate limiter.
///
/// LIMITATION: the read-modify-write sequence is not atomic. Concurrent
/// requests for the same identifier can read a stale counter and each admit,
/// so the configured limit is soft under load. A strict limit needs a
/// store-side atomic increment or a per-identifier writer; callers accepting
/// the soft limit use this as-is.
///
/// Store read/write errors propagate to the caller. Rate-limiter failure is a
/// hard failure of the submission pipeline, never an implicit allow.
pub async fn check_rate_limit(
    store: &dyn KvStore,
    identifier: &str,
    config: &RateLimitConfig,
) -> Result<RateLimitDecision, AppError> {
    check_rate_limit_at(store, identifier, config, Utc::now().timestamp()).await
}

/// Clock-injected variant of [`check_rate_limit`] so tests can step time.
pub async fn check_rate_limit_at(
    store: &dyn KvStore,
    identifier: &str,
    config: &RateLimitConfig,
    now: i64,
) -> Result<RateLimitDecision, AppError> {
    let key = format!("rate_limit:{}", identifier);

    let stored = store
        .get(&key)
        .await
        .context(format!("rate limit read for {}", identifier))?
        .and_then(|raw| match serde_json::from_str::<RateLimitCounter>(&raw) {
            Ok(counter) => Some(counter),
            Err(e) => {
                // Corrupt counters reset the window; make that visible
                tracing::warn!(
                    "discarding malformed rate limit counter for {}: {}",
                    identifier,
                    e
                );
                None
            }
        });

    match stored {
        // Window still open
        Some(counter) if now < counter.reset_at => {
            if counter.count >= config.max_requests {
                return Ok(RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_at: counter.reset_at,
                });
            }

            let updated = RateLimitCounter {
                count: counter.count + 1,
                reset_at: counter.reset_at,
            };
            let ttl = Duration::from_secs((counter.reset_at - now).max(1) as u64);
            store
                .put(&key, encode(&updated)?, ttl)
                .await
                .context(format!("rate limit write for {}", identifier))?;

            Ok(RateLimitDecision {
                allowed: true,
                remaining: config.max_requests - counter.count - 1,
                reset_at: counter.reset_at,
            })
        }
        // Absent, expired, or unreadable: start a fresh window
        _ => {
            let reset_at = now + config.window_secs as i64;
            let fresh = RateLimitCounter { count: 1, reset_at };
            store
                .put(&key, encode(&fresh)?, Duration::from_secs(config.window_secs))
                .await
                .context(format!("rate limit write for {}", identifier))?;

            Ok(RateLimitDecision {
                allowed: true,
                remaining: config.max_requests - 1,
                reset_at,
            })
        }
    }
}

fn encode(counter: &RateLimitCounter) -> Result<String, AppError> {
    serde_json::to_string(counter)
        .map_err(|e| AppError::InternalError(format!("Failed to encode rate limit counter: {}", e)))
}
