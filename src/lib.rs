//! Lead Intake API Library
//!
//! Server-side core of a multi-locale B2B marketing site: validates contact
//! form input, verifies the Turnstile bot challenge, applies a fixed-window
//! rate limit, persists the lead, and sends best-effort notifications.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `kv`: Key-value store trait and implementations.
//! - `lead_store`: Lead persistence.
//! - `models`: Data model, form schema, and result types.
//! - `notifications`: Resend email and Airtable sync senders.
//! - `rate_limit`: Fixed-window rate limiter.
//! - `retry_client`: Shared outbound HTTP client with retry and backoff.
//! - `submission`: The lead-submission orchestrator.
//! - `turnstile`: Turnstile challenge-verification client.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod kv;
pub mod lead_store;
pub mod models;
pub mod notifications;
pub mod rate_limit;
pub mod retry_client;
pub mod submission;
pub mod turnstile;
