use serde::Deserialize;

/// Default Turnstile siteverify endpoint.
pub const DEFAULT_TURNSTILE_VERIFY_URL: &str =
    "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Default Resend email API endpoint.
pub const DEFAULT_RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Default Airtable API base (base id and table name are appended per request).
pub const DEFAULT_AIRTABLE_API_URL: &str = "https://api.airtable.com/v0";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Turnstile secret. Optional at load time: a missing secret surfaces as
    /// `server_error` on submission, not as a startup failure.
    pub turnstile_secret_key: Option<String>,
    pub turnstile_verify_url: String,
    pub resend_api_key: Option<String>,
    pub resend_from_email: Option<String>,
    pub resend_to_email: Option<String>,
    pub resend_api_url: String,
    pub airtable_api_key: Option<String>,
    pub airtable_base_id: Option<String>,
    pub airtable_table_name: Option<String>,
    pub airtable_api_url: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            turnstile_secret_key: std::env::var("TURNSTILE_SECRET_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            turnstile_verify_url: std::env::var("TURNSTILE_VERIFY_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TURNSTILE_VERIFY_URL.to_string()),
            resend_api_key: std::env::var("RESEND_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            resend_from_email: std::env::var("RESEND_FROM_EMAIL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            resend_to_email: std::env::var("RESEND_TO_EMAIL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            resend_api_url: std::env::var("RESEND_API_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_RESEND_API_URL.to_string()),
            airtable_api_key: std::env::var("AIRTABLE_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            airtable_base_id: std::env::var("AIRTABLE_BASE_ID")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            airtable_table_name: std::env::var("AIRTABLE_TABLE_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            airtable_api_url: std::env::var("AIRTABLE_API_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AIRTABLE_API_URL.to_string()),
            rate_limit_window_secs: std::env::var("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_WINDOW_SECS must be a valid number"))?,
            rate_limit_max_requests: std::env::var("RATE_LIMIT_MAX_REQUESTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_MAX_REQUESTS must be a valid number"))?,
        };

        if config.rate_limit_window_secs == 0 {
            anyhow::bail!("RATE_LIMIT_WINDOW_SECS must be greater than zero");
        }
        if config.rate_limit_max_requests == 0 {
            anyhow::bail!("RATE_LIMIT_MAX_REQUESTS must be greater than zero");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Server Port: {}", config.port);
        if config.turnstile_secret_key.is_none() {
            tracing::warn!("TURNSTILE_SECRET_KEY not set; submissions will fail with server_error");
        }
        if config.email_configured() {
            tracing::info!("Resend notification email configured");
        } else {
            tracing::warn!("Resend not fully configured; lead notifications disabled");
        }
        if config.airtable_configured() {
            tracing::info!("Airtable CRM sync configured");
        }
        tracing::debug!(
            "Rate limit: {} requests / {}s window",
            config.rate_limit_max_requests,
            config.rate_limit_window_secs
        );

        Ok(config)
    }

    /// True when all three Resend values (key, from, to) are present.
    pub fn email_configured(&self) -> bool {
        self.resend_api_key.is_some()
            && self.resend_from_email.is_some()
            && self.resend_to_email.is_some()
    }

    /// True when all three Airtable values (key, base, table) are present.
    pub fn airtable_configured(&self) -> bool {
        self.airtable_api_key.is_some()
            && self.airtable_base_id.is_some()
            && self.airtable_table_name.is_some()
    }
}
