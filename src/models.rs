use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

// ============ Enumerations ============

/// Supported site locales. The locale attached to a submission comes from the
/// server's own locale resolution (the request path), never from client form
/// fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Zh,
    Es,
    Ar,
}

pub const SUPPORTED_LOCALES: [&str; 4] = ["en", "zh", "es", "ar"];

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Zh => "zh",
            Locale::Es => "es",
            Locale::Ar => "ar",
        }
    }
}

impl FromStr for Locale {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Locale::En),
            "zh" => Ok(Locale::Zh),
            "es" => Ok(Locale::Es),
            "ar" => Ok(Locale::Ar),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inquiry categories offered by the contact form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InquiryType {
    Product,
    Agency,
    Other,
}

impl InquiryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InquiryType::Product => "product",
            InquiryType::Agency => "agency",
            InquiryType::Other => "other",
        }
    }
}

impl FromStr for InquiryType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(InquiryType::Product),
            "agency" => Ok(InquiryType::Agency),
            "other" => Ok(InquiryType::Other),
            _ => Err(()),
        }
    }
}

/// Lifecycle of a persisted lead.
///
/// Starts at `Pending` on insert and transitions exactly once to `Processed`
/// or `Failed`. A lead whose status update was lost stays `Pending`; an
/// external reconciliation job is expected to sweep those.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    Pending,
    Processed,
    Failed,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Pending => "pending",
            LeadStatus::Processed => "processed",
            LeadStatus::Failed => "failed",
        }
    }
}

impl FromStr for LeadStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LeadStatus::Pending),
            "processed" => Ok(LeadStatus::Processed),
            "failed" => Ok(LeadStatus::Failed),
            _ => Err(()),
        }
    }
}

// ============ Lead Entity ============

/// A persisted sales inquiry.
///
/// Optional string fields are `None` when the submitter left them blank;
/// `message` is the one exception and is always a string (empty when absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Unique identifier, generated at insert time.
    pub id: Uuid,
    pub locale: Locale,
    pub name: String,
    /// Always lowercased before persistence.
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub inquiry_type: Option<InquiryType>,
    pub product_slug: Option<String>,
    pub product_name: Option<String>,
    pub form_page: Option<String>,
    /// Never null in storage; empty string when the submitter wrote nothing.
    pub message: String,
    /// Epoch milliseconds, set once at insert.
    pub created_at: i64,
    pub status: LeadStatus,
}

/// Validated, normalized input for `LeadStore::insert`. The bot token has
/// already been stripped; the email is already lowercased.
#[derive(Debug, Clone)]
pub struct LeadSubmission {
    pub locale: Locale,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub inquiry_type: Option<InquiryType>,
    pub product_slug: Option<String>,
    pub product_name: Option<String>,
    pub form_page: Option<String>,
    pub message: String,
}

// ============ Form Schema ============

/// Raw contact-form fields as posted by the client.
///
/// Every transport-level field is an optional string; required-ness is
/// enforced here by the validation rules, not by deserialization. `locale` is
/// filled in by the handler from the request path and is never read from the
/// client payload.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct LeadForm {
    #[validate(length(min = 2, max = 100, message = "name must be between 2 and 100 characters"))]
    pub name: String,

    #[validate(email(message = "invalid email address"))]
    pub email: String,

    #[validate(length(max = 20, message = "phone is too long"))]
    pub phone: String,

    #[validate(length(max = 200, message = "company is too long"))]
    pub company: String,

    #[validate(custom(function = "validate_inquiry_type"))]
    pub inquiry_type: String,

    #[validate(length(max = 200, message = "productSlug is too long"))]
    pub product_slug: String,

    #[validate(length(max = 200, message = "productName is too long"))]
    pub product_name: String,

    #[validate(length(max = 500, message = "formPage is too long"))]
    pub form_page: String,

    #[validate(length(max = 5000, message = "message is too long"))]
    pub message: String,

    /// Resolved server-side; not part of the client payload.
    #[serde(skip_deserializing)]
    #[validate(custom(function = "validate_locale"))]
    pub locale: String,

    #[serde(rename = "cf-turnstile-response")]
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
}

fn validate_locale(value: &str) -> Result<(), ValidationError> {
    if SUPPORTED_LOCALES.contains(&value) {
        return Ok(());
    }
    let mut err = ValidationError::new("locale");
    err.message = Some("unsupported locale".into());
    Err(err)
}

fn validate_inquiry_type(value: &str) -> Result<(), ValidationError> {
    // Empty is accepted as "absent"
    if value.is_empty() || InquiryType::from_str(value).is_ok() {
        return Ok(());
    }
    let mut err = ValidationError::new("inquiry_type");
    err.message = Some("inquiryType must be one of product, agency, other".into());
    Err(err)
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl LeadForm {
    /// Builds the normalized insert payload from a validated form.
    ///
    /// The email is lowercased into a fresh string; the form itself is left
    /// untouched. Optional fields collapse empty to `None`, except `message`
    /// which stays a (possibly empty) string.
    pub fn to_submission(&self) -> LeadSubmission {
        LeadSubmission {
            locale: Locale::from_str(&self.locale).unwrap_or(Locale::En),
            name: self.name.clone(),
            email: self.email.to_lowercase(),
            phone: non_empty(&self.phone),
            company: non_empty(&self.company),
            inquiry_type: InquiryType::from_str(&self.inquiry_type).ok(),
            product_slug: non_empty(&self.product_slug),
            product_name: non_empty(&self.product_name),
            form_page: non_empty(&self.form_page),
            message: self.message.clone(),
        }
    }
}

/// Wire name for a form field, as the client posted it and expects it back
/// in validation errors.
fn wire_name(field: &str) -> &str {
    match field {
        "inquiry_type" => "inquiryType",
        "product_slug" => "productSlug",
        "product_name" => "productName",
        "form_page" => "formPage",
        "token" => "turnstileToken",
        other => other,
    }
}

/// Flattens `validator` output into field-keyed message lists for the client.
/// Keys use the wire names so the client can map each message back to its
/// form control.
pub fn field_errors(errors: &ValidationErrors) -> HashMap<String, Vec<String>> {
    errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            (wire_name(field).to_string(), messages)
        })
        .collect()
}

// ============ Submission Result ============

/// Outcome vocabulary returned to the client. The UI renders a localized
/// string looked up by this code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Success,
    ValidationError,
    TurnstileFailed,
    RateLimited,
    ServerError,
}

/// Value returned to the caller for every submission; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub success: bool,
    pub message: SubmissionOutcome,
    /// Field-keyed validation messages, present only for `validation_error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, Vec<String>>>,
}

impl SubmissionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: SubmissionOutcome::Success,
            errors: None,
        }
    }

    pub fn rejected(message: SubmissionOutcome) -> Self {
        Self {
            success: false,
            message,
            errors: None,
        }
    }

    pub fn invalid(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            success: false,
            message: SubmissionOutcome::ValidationError,
            errors: Some(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> LeadForm {
        LeadForm {
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            locale: "en".to_string(),
            token: "test-token".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn valid_form_passes() {
        assert!(valid_form().validate().is_ok());
    }

    #[test]
    fn name_must_be_at_least_two_chars() {
        let mut form = valid_form();
        form.name = "A".to_string();
        let errors = form.validate().unwrap_err();
        assert!(field_errors(&errors).contains_key("name"));

        form.name = String::new();
        assert!(form.validate().is_err());
    }

    #[test]
    fn name_must_be_at_most_hundred_chars() {
        let mut form = valid_form();
        form.name = "x".repeat(101);
        assert!(form.validate().is_err());
        form.name = "x".repeat(100);
        assert!(form.validate().is_ok());
    }

    #[test]
    fn email_syntax_is_enforced() {
        let mut form = valid_form();
        form.email = "invalid-email".to_string();
        let errors = form.validate().unwrap_err();
        assert!(field_errors(&errors).contains_key("email"));

        form.email = String::new();
        assert!(form.validate().is_err());
    }

    #[test]
    fn token_is_required() {
        let mut form = valid_form();
        form.token = String::new();
        let errors = form.validate().unwrap_err();
        assert!(field_errors(&errors).contains_key("turnstileToken"));
    }

    #[test]
    fn field_errors_use_wire_names() {
        let mut form = valid_form();
        form.inquiry_type = "marketing".to_string();
        form.product_slug = "s".repeat(201);
        form.form_page = "/".repeat(501);
        let errors = field_errors(&form.validate().unwrap_err());

        assert!(errors.contains_key("inquiryType"));
        assert!(errors.contains_key("productSlug"));
        assert!(errors.contains_key("formPage"));
        assert!(!errors.contains_key("inquiry_type"));
        assert!(!errors.contains_key("product_slug"));
    }

    #[test]
    fn locale_must_be_supported() {
        let mut form = valid_form();
        form.locale = "fr".to_string();
        let errors = form.validate().unwrap_err();
        assert!(field_errors(&errors).contains_key("locale"));

        for locale in SUPPORTED_LOCALES {
            form.locale = locale.to_string();
            assert!(form.validate().is_ok(), "locale {} should be valid", locale);
        }
    }

    #[test]
    fn optional_fields_accept_empty() {
        let form = valid_form();
        assert!(form.phone.is_empty());
        assert!(form.validate().is_ok());
    }

    #[test]
    fn optional_field_length_limits() {
        let mut form = valid_form();
        form.phone = "1".repeat(21);
        assert!(form.validate().is_err());

        let mut form = valid_form();
        form.message = "m".repeat(5001);
        assert!(form.validate().is_err());

        let mut form = valid_form();
        form.form_page = "/".repeat(501);
        assert!(form.validate().is_err());
    }

    #[test]
    fn inquiry_type_is_restricted() {
        let mut form = valid_form();
        form.inquiry_type = "product".to_string();
        assert!(form.validate().is_ok());
        form.inquiry_type = "marketing".to_string();
        assert!(form.validate().is_err());
        form.inquiry_type = String::new();
        assert!(form.validate().is_ok());
    }

    #[test]
    fn submission_lowercases_email_without_mutating_form() {
        let mut form = valid_form();
        form.email = "Test@Example.COM".to_string();
        let submission = form.to_submission();
        assert_eq!(submission.email, "test@example.com");
        assert_eq!(form.email, "Test@Example.COM");
    }

    #[test]
    fn submission_normalizes_empty_optionals_to_none() {
        let form = valid_form();
        let submission = form.to_submission();
        assert_eq!(submission.phone, None);
        assert_eq!(submission.company, None);
        assert_eq!(submission.inquiry_type, None);
        assert_eq!(submission.product_slug, None);
        assert_eq!(submission.form_page, None);
        // message stays a string, never None
        assert_eq!(submission.message, "");
    }

    #[test]
    fn outcome_codes_serialize_snake_case() {
        let json = serde_json::to_string(&SubmissionOutcome::TurnstileFailed).unwrap();
        assert_eq!(json, "\"turnstile_failed\"");
        let json = serde_json::to_string(&SubmissionResult::ok()).unwrap();
        assert_eq!(json, "{\"success\":true,\"message\":\"success\"}");
    }
}
