use crate::models::Lead;
use crate::retry_client::{RetryClient, RetryConfig};
use chrono::{SecondsFormat, TimeZone, Utc};
use serde_json::{json, Map, Value};
use url::Url;

/// Email APIs are slower than the interactive path tolerates elsewhere.
const RESEND_TIMEOUT_MS: u64 = 15_000;
const AIRTABLE_TIMEOUT_MS: u64 = 10_000;

/// Result of a best-effort notification attempt. Senders never escalate
/// classified delivery failures; the orchestrator decides what to log.
#[derive(Debug, Clone)]
pub struct NotificationOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl NotificationOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }
}

/// Escapes user-supplied text before embedding it in notification HTML.
/// Security-relevant: every interpolated lead field goes through this.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

fn iso_timestamp(epoch_ms: i64) -> String {
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Pulls a nested `error.message` out of an API response body.
fn extract_api_error(body: Option<&Value>) -> Option<String> {
    body.and_then(|b| b.get("error"))
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

// ============ Resend email sender ============

/// Sends the new-lead notification email via the Resend API.
pub struct EmailNotifier {
    retry: RetryClient,
    api_url: String,
    api_key: String,
    from_email: String,
    to_email: String,
    retry_config: RetryConfig,
}

impl EmailNotifier {
    pub fn new(
        retry: RetryClient,
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from_email: impl Into<String>,
        to_email: impl Into<String>,
    ) -> Self {
        Self {
            retry,
            api_url: api_url.into(),
            api_key: api_key.into(),
            from_email: from_email.into(),
            to_email: to_email.into(),
            retry_config: RetryConfig {
                timeout_ms: RESEND_TIMEOUT_MS,
                ..RetryConfig::default()
            },
        }
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub async fn send(&self, lead: &Lead) -> NotificationOutcome {
        let subject = format!(
            "New Lead: {} from {}",
            lead.name,
            lead.company.as_deref().unwrap_or("N/A")
        );
        let body = json!({
            "from": self.from_email,
            "to": self.to_email,
            "subject": subject,
            "html": build_email_html(lead),
        });

        match self
            .retry
            .post_json(
                &self.api_url,
                Some(&self.api_key),
                &body,
                &self.retry_config,
                None,
            )
            .await
        {
            Ok(response) => match extract_api_error(Some(&response)) {
                Some(message) => NotificationOutcome::failed(message),
                None => NotificationOutcome::ok(),
            },
            Err(e) => {
                let message =
                    extract_api_error(e.response_body.as_ref()).unwrap_or_else(|| e.to_string());
                NotificationOutcome::failed(message)
            }
        }
    }
}

fn table_row(label: &str, value: &str) -> String {
    format!(
        "<tr><td style=\"padding: 8px; border: 1px solid #ddd;\"><strong>{}</strong></td><td style=\"padding: 8px; border: 1px solid #ddd;\">{}</td></tr>",
        label, value
    )
}

fn build_email_html(lead: &Lead) -> String {
    let email = escape_html(&lead.email);
    let rows = [
        table_row("Name", &escape_html(&lead.name)),
        table_row(
            "Email",
            &format!("<a href=\"mailto:{}\">{}</a>", email, email),
        ),
        table_row("Phone", &escape_html(lead.phone.as_deref().unwrap_or("-"))),
        table_row(
            "Company",
            &escape_html(lead.company.as_deref().unwrap_or("-")),
        ),
        table_row(
            "Inquiry Type",
            lead.inquiry_type.map(|t| t.as_str()).unwrap_or("-"),
        ),
        table_row(
            "Product",
            &escape_html(lead.product_name.as_deref().unwrap_or("-")),
        ),
        table_row(
            "Form Page",
            &escape_html(lead.form_page.as_deref().unwrap_or("-")),
        ),
        table_row("Locale", lead.locale.as_str()),
        table_row("Message", &escape_html(&lead.message).replace('\n', "<br>")),
    ];

    format!(
        "<h2>New Contact Form Submission</h2>\
         <table style=\"border-collapse: collapse; width: 100%;\">{}</table>\
         <p style=\"color: #666; font-size: 12px; margin-top: 16px;\">Lead ID: {} | Submitted at: {}</p>",
        rows.join(""),
        lead.id,
        iso_timestamp(lead.created_at)
    )
}

// ============ Airtable CRM sync ============

/// Syncs a lead into an Airtable base. Optional lead fields are omitted from
/// the payload entirely rather than sent as null or empty.
pub struct AirtableClient {
    retry: RetryClient,
    api_base: String,
    api_key: String,
    base_id: String,
    table_name: String,
    retry_config: RetryConfig,
}

impl AirtableClient {
    pub fn new(
        retry: RetryClient,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        base_id: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            retry,
            api_base: api_base.into(),
            api_key: api_key.into(),
            base_id: base_id.into(),
            table_name: table_name.into(),
            retry_config: RetryConfig {
                timeout_ms: AIRTABLE_TIMEOUT_MS,
                ..RetryConfig::default()
            },
        }
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Builds the per-base/table endpoint, percent-encoding the segments.
    fn endpoint(&self) -> Result<String, String> {
        let mut url =
            Url::parse(&self.api_base).map_err(|e| format!("invalid Airtable base URL: {}", e))?;
        url.path_segments_mut()
            .map_err(|_| "Airtable base URL cannot carry path segments".to_string())?
            .push(&self.base_id)
            .push(&self.table_name);
        Ok(url.to_string())
    }

    pub async fn sync(&self, lead: &Lead) -> NotificationOutcome {
        let url = match self.endpoint() {
            Ok(url) => url,
            Err(message) => return NotificationOutcome::failed(message),
        };
        let body = json!({ "fields": build_airtable_fields(lead) });

        match self
            .retry
            .post_json(&url, Some(&self.api_key), &body, &self.retry_config, None)
            .await
        {
            Ok(response) => match extract_api_error(Some(&response)) {
                Some(message) => NotificationOutcome::failed(message),
                None => NotificationOutcome::ok(),
            },
            Err(e) => {
                let message =
                    extract_api_error(e.response_body.as_ref()).unwrap_or_else(|| e.to_string());
                NotificationOutcome::failed(message)
            }
        }
    }
}

fn build_airtable_fields(lead: &Lead) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("Lead ID".to_string(), json!(lead.id.to_string()));
    fields.insert("Name".to_string(), json!(lead.name));
    fields.insert("Email".to_string(), json!(lead.email));
    fields.insert("Phone".to_string(), json!(lead.phone.as_deref().unwrap_or("")));
    fields.insert(
        "Company".to_string(),
        json!(lead.company.as_deref().unwrap_or("")),
    );
    fields.insert("Message".to_string(), json!(lead.message));
    fields.insert("Locale".to_string(), json!(lead.locale.as_str()));
    fields.insert("Status".to_string(), json!(lead.status.as_str()));
    fields.insert("Created At".to_string(), json!(iso_timestamp(lead.created_at)));

    if let Some(inquiry_type) = lead.inquiry_type {
        fields.insert("Inquiry Type".to_string(), json!(inquiry_type.as_str()));
    }
    if let Some(ref product_name) = lead.product_name {
        fields.insert("Product Name".to_string(), json!(product_name));
    }
    if let Some(ref product_slug) = lead.product_slug {
        fields.insert("Product Slug".to_string(), json!(product_slug));
    }
    if let Some(ref form_page) = lead.form_page {
        fields.insert("Form Page".to_string(), json!(form_page));
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InquiryType, LeadStatus, Locale};
    use uuid::Uuid;

    fn lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            locale: Locale::En,
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            phone: None,
            company: None,
            inquiry_type: None,
            product_slug: None,
            product_name: None,
            form_page: None,
            message: String::new(),
            created_at: 1_700_000_000_000,
            status: LeadStatus::Pending,
        }
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html("<script>alert(\"x&y\")</script>"),
            "&lt;script&gt;alert(&quot;x&amp;y&quot;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("O'Brien"), "O&#039;Brien");
    }

    #[test]
    fn email_html_escapes_user_fields() {
        let mut lead = lead();
        lead.name = "<b>Bob</b>".to_string();
        lead.message = "line one\nline two".to_string();
        let html = build_email_html(&lead);
        assert!(html.contains("&lt;b&gt;Bob&lt;/b&gt;"));
        assert!(!html.contains("<b>Bob</b>"));
        assert!(html.contains("line one<br>line two"));
        assert!(html.contains(&format!("Lead ID: {}", lead.id)));
    }

    #[test]
    fn email_html_dashes_absent_optionals() {
        let html = build_email_html(&lead());
        assert!(html.contains("<strong>Phone</strong>"));
        assert!(html.contains(">-</td>"));
    }

    #[test]
    fn airtable_fields_omit_absent_optionals() {
        let fields = build_airtable_fields(&lead());
        assert!(fields.contains_key("Lead ID"));
        assert_eq!(fields["Phone"], json!(""));
        assert!(!fields.contains_key("Inquiry Type"));
        assert!(!fields.contains_key("Product Name"));
        assert!(!fields.contains_key("Form Page"));
    }

    #[test]
    fn airtable_fields_include_present_optionals() {
        let mut lead = lead();
        lead.inquiry_type = Some(InquiryType::Agency);
        lead.product_slug = Some("smart-lock".to_string());
        let fields = build_airtable_fields(&lead);
        assert_eq!(fields["Inquiry Type"], json!("agency"));
        assert_eq!(fields["Product Slug"], json!("smart-lock"));
    }

    #[test]
    fn iso_timestamp_is_utc_millis() {
        assert_eq!(iso_timestamp(1_700_000_000_000), "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn extract_api_error_reads_nested_message() {
        let body = json!({ "error": { "message": "invalid from address" } });
        assert_eq!(
            extract_api_error(Some(&body)),
            Some("invalid from address".to_string())
        );
        assert_eq!(extract_api_error(Some(&json!({ "id": "ok" }))), None);
        assert_eq!(extract_api_error(None), None);
    }
}
