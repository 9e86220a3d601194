use crate::models::{LeadForm, SubmissionResult};
use crate::submission::SubmissionPipeline;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Form, Json,
};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
pub struct AppState {
    /// The lead-submission pipeline with its external dependencies wired in.
    pub pipeline: SubmissionPipeline,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "lead-intake-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/:locale/leads
///
/// Accepts the contact-form fields as a form-encoded body and runs the
/// submission pipeline. The locale comes from the request path, never from
/// the client payload; an unsupported locale surfaces as a validation error.
/// Always responds 200 with a `SubmissionResult` body; the client renders a
/// localized string for the outcome code.
pub async fn submit_lead(
    State(state): State<Arc<AppState>>,
    Path(locale): Path<String>,
    Form(mut form): Form<LeadForm>,
) -> Json<SubmissionResult> {
    form.locale = locale;
    tracing::info!("POST /leads locale={}", form.locale);

    let result = state.pipeline.submit(&form).await;
    tracing::info!(
        "submission finished: success={} message={:?}",
        result.success,
        result.message
    );

    Json(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_service_metadata() {
        let (status, Json(body)) = health().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "lead-intake-api");
    }
}
