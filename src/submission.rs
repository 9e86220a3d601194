use crate::errors::AppError;
use crate::kv::KvStore;
use crate::lead_store::LeadStore;
use crate::models::{field_errors, LeadForm, LeadStatus, SubmissionOutcome, SubmissionResult};
use crate::notifications::{AirtableClient, EmailNotifier};
use crate::rate_limit::{check_rate_limit, RateLimitConfig};
use crate::turnstile::TurnstileClient;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Sequences a lead submission: validate, verify the bot challenge, rate
/// limit, persist, then best-effort notify.
///
/// Expected rejections (validation, failed challenge, rate limit) come back
/// as values. Infrastructure errors from the store or database are caught
/// once here, logged, and mapped to `server_error`; the lead, if one was
/// already inserted, is marked `failed` as a best-effort compensation.
///
/// Persistence runs before notification on purpose: a lead is never lost to
/// an email-provider outage, so a failed send leaves the submission
/// successful from the caller's point of view.
pub struct SubmissionPipeline {
    turnstile: TurnstileClient,
    turnstile_secret: Option<String>,
    kv: Option<Arc<dyn KvStore>>,
    leads: Arc<dyn LeadStore>,
    email: Option<EmailNotifier>,
    airtable: Option<AirtableClient>,
    rate_limit: RateLimitConfig,
}

impl SubmissionPipeline {
    pub fn new(turnstile: TurnstileClient, leads: Arc<dyn LeadStore>) -> Self {
        Self {
            turnstile,
            turnstile_secret: None,
            kv: None,
            leads,
            email: None,
            airtable: None,
            rate_limit: RateLimitConfig::default(),
        }
    }

    pub fn with_turnstile_secret(mut self, secret: impl Into<String>) -> Self {
        self.turnstile_secret = Some(secret.into());
        self
    }

    pub fn with_kv(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn with_email(mut self, email: EmailNotifier) -> Self {
        self.email = Some(email);
        self
    }

    pub fn with_airtable(mut self, airtable: AirtableClient) -> Self {
        self.airtable = Some(airtable);
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Runs one submission to a terminal result. Never fails: every error
    /// path maps to an outcome code the client can render.
    pub async fn submit(&self, form: &LeadForm) -> SubmissionResult {
        if let Err(errors) = form.validate() {
            return SubmissionResult::invalid(field_errors(&errors));
        }

        let Some(secret) = self.turnstile_secret.as_deref() else {
            tracing::error!("TURNSTILE_SECRET_KEY not configured");
            return SubmissionResult::rejected(SubmissionOutcome::ServerError);
        };

        let mut lead_id: Option<Uuid> = None;
        match self.run(form, secret, &mut lead_id).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("lead submission failed: {}", e);
                if let Some(id) = lead_id {
                    // Saga-style compensation: one attempt, secondary
                    // failures swallowed. A reconciliation job sweeps leads
                    // stuck in pending.
                    if let Err(update_err) = self.leads.update_status(id, LeadStatus::Failed).await
                    {
                        tracing::warn!("failed to mark lead {} as failed: {}", id, update_err);
                    }
                }
                SubmissionResult::rejected(SubmissionOutcome::ServerError)
            }
        }
    }

    async fn run(
        &self,
        form: &LeadForm,
        secret: &str,
        lead_id: &mut Option<Uuid>,
    ) -> Result<SubmissionResult, AppError> {
        let verification = self.turnstile.verify(&form.token, secret).await;
        if !verification.success {
            tracing::warn!(
                "turnstile rejected submission: {:?}",
                verification.error_codes
            );
            return Ok(SubmissionResult::rejected(SubmissionOutcome::TurnstileFailed));
        }

        let kv = self
            .kv
            .as_deref()
            .ok_or_else(|| AppError::InternalError("rate limit store not configured".to_string()))?;

        let identifier = format!("lead:{}", form.email.to_lowercase());
        let decision = check_rate_limit(kv, &identifier, &self.rate_limit).await?;
        if !decision.allowed {
            tracing::info!("rate limited submission for {}", identifier);
            return Ok(SubmissionResult::rejected(SubmissionOutcome::RateLimited));
        }

        let submission = form.to_submission();
        let id = self.leads.insert(&submission).await?;
        *lead_id = Some(id);
        tracing::info!("lead {} persisted", id);

        if let Some(lead) = self.leads.get_by_id(id).await? {
            let mut notified = false;

            if let Some(ref email) = self.email {
                let outcome = email.send(&lead).await;
                if !outcome.success {
                    tracing::error!(
                        "email notification failed for lead {}: {}",
                        id,
                        outcome.error.as_deref().unwrap_or("unknown")
                    );
                }
                notified = true;
            }

            if let Some(ref airtable) = self.airtable {
                let outcome = airtable.sync(&lead).await;
                if !outcome.success {
                    tracing::error!(
                        "airtable sync failed for lead {}: {}",
                        id,
                        outcome.error.as_deref().unwrap_or("unknown")
                    );
                }
                notified = true;
            }

            // The lead only leaves pending once a notification attempt
            // completed; with no senders configured it stays pending for the
            // reconciliation sweep.
            if notified {
                self.leads.update_status(id, LeadStatus::Processed).await?;
            }
        }

        Ok(SubmissionResult::ok())
    }
}
