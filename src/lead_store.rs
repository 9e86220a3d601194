use crate::errors::{AppError, ResultExt};
use crate::models::{InquiryType, Lead, LeadStatus, LeadSubmission, Locale};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Persistence seam for leads.
///
/// No operation retries internally: inserts are not idempotent-safe to replay
/// without a dedupe key, so store-level errors propagate verbatim.
/// `update_status` does not check the prior status; the pending-to-terminal
/// transition is the orchestrator's responsibility.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Inserts a lead with a fresh id, `created_at = now`, `status = pending`.
    async fn insert(&self, submission: &LeadSubmission) -> Result<Uuid, AppError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Lead>, AppError>;
    async fn update_status(&self, id: Uuid, status: LeadStatus) -> Result<(), AppError>;
}

/// Empty-or-absent optional fields are stored as NULL, never empty string.
fn to_nullable(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

// ============ Postgres implementation ============

pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct LeadRow {
    id: Uuid,
    locale: String,
    name: String,
    email: String,
    phone: Option<String>,
    company: Option<String>,
    inquiry_type: Option<String>,
    product_slug: Option<String>,
    product_name: Option<String>,
    form_page: Option<String>,
    message: Option<String>,
    created_at: i64,
    status: String,
}

impl LeadRow {
    fn into_lead(self) -> Result<Lead, AppError> {
        let locale = Locale::from_str(&self.locale).map_err(|_| {
            AppError::InternalError(format!("lead {} has unknown locale {}", self.id, self.locale))
        })?;
        let status = LeadStatus::from_str(&self.status).map_err(|_| {
            AppError::InternalError(format!("lead {} has unknown status {}", self.id, self.status))
        })?;

        Ok(Lead {
            id: self.id,
            locale,
            name: self.name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            inquiry_type: self
                .inquiry_type
                .as_deref()
                .and_then(|v| InquiryType::from_str(v).ok()),
            product_slug: self.product_slug,
            product_name: self.product_name,
            form_page: self.form_page,
            // message maps NULL to empty string, unlike the other optionals
            message: self.message.unwrap_or_default(),
            created_at: self.created_at,
            status,
        })
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn insert(&self, submission: &LeadSubmission) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now().timestamp_millis();

        sqlx::query(
            "INSERT INTO leads (id, locale, name, email, phone, company, message, inquiry_type, product_slug, product_name, form_page, created_at, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'pending')",
        )
        .bind(id)
        .bind(submission.locale.as_str())
        .bind(&submission.name)
        .bind(&submission.email)
        .bind(to_nullable(&submission.phone))
        .bind(to_nullable(&submission.company))
        .bind(&submission.message)
        .bind(submission.inquiry_type.map(|t| t.as_str()))
        .bind(to_nullable(&submission.product_slug))
        .bind(to_nullable(&submission.product_name))
        .bind(to_nullable(&submission.form_page))
        .bind(created_at)
        .execute(&self.pool)
        .await
        .context("insert lead")?;

        Ok(id)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        let row = sqlx::query_as::<_, LeadRow>("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context(format!("fetch lead {}", id))?;

        row.map(LeadRow::into_lead).transpose()
    }

    async fn update_status(&self, id: Uuid, status: LeadStatus) -> Result<(), AppError> {
        sqlx::query("UPDATE leads SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .context(format!("update status for lead {}", id))?;

        Ok(())
    }
}

// ============ In-memory fake for tests ============

/// In-memory lead store with the same normalization rules as the Postgres
/// store, plus failure injection for the pipeline error paths.
#[derive(Default)]
pub struct InMemoryLeadStore {
    leads: Mutex<HashMap<Uuid, Lead>>,
    fail_inserts: AtomicBool,
    fail_status_updates: AtomicBool,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_status_updates(&self, fail: bool) {
        self.fail_status_updates.store(fail, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.leads.lock().expect("lead mutex poisoned").len()
    }

    pub fn all(&self) -> Vec<Lead> {
        self.leads
            .lock()
            .expect("lead mutex poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn insert(&self, submission: &LeadSubmission) -> Result<Uuid, AppError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(sqlx::Error::PoolClosed));
        }

        let id = Uuid::new_v4();
        let lead = Lead {
            id,
            locale: submission.locale,
            name: submission.name.clone(),
            email: submission.email.clone(),
            phone: to_nullable(&submission.phone).map(str::to_string),
            company: to_nullable(&submission.company).map(str::to_string),
            inquiry_type: submission.inquiry_type,
            product_slug: to_nullable(&submission.product_slug).map(str::to_string),
            product_name: to_nullable(&submission.product_name).map(str::to_string),
            form_page: to_nullable(&submission.form_page).map(str::to_string),
            message: submission.message.clone(),
            created_at: Utc::now().timestamp_millis(),
            status: LeadStatus::Pending,
        };
        self.leads
            .lock()
            .expect("lead mutex poisoned")
            .insert(id, lead);
        Ok(id)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        Ok(self
            .leads
            .lock()
            .expect("lead mutex poisoned")
            .get(&id)
            .cloned())
    }

    async fn update_status(&self, id: Uuid, status: LeadStatus) -> Result<(), AppError> {
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(sqlx::Error::PoolClosed));
        }

        let mut leads = self.leads.lock().expect("lead mutex poisoned");
        match leads.get_mut(&id) {
            Some(lead) => {
                lead.status = status;
                Ok(())
            }
            None => Err(AppError::DatabaseError(sqlx::Error::RowNotFound)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> LeadSubmission {
        LeadSubmission {
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
        }
    }

    #[tokio::test]
    async fn insert_starts_pending_with_fresh_id() {
        let store = InMemoryLeadStore::new();
        let first = store.insert(&submission()).await.unwrap();
        let second = store.insert(&submission()).await.unwrap();
        assert_ne!(first, second);

        let lead = store.get_by_id(first).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Pending);
        assert!(lead.created_at > 0);
    }

    #[tokio::test]
    async fn empty_phone_round_trips_as_absent() {
        let store = InMemoryLeadStore::new();
        let mut sub = submission();
        sub.phone = Some(String::new());
        let id = store.insert(&sub).await.unwrap();
        let lead = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(lead.phone, None);
    }

    #[tokio::test]
    async fn absent_message_round_trips_as_empty_string() {
        let store = InMemoryLeadStore::new();
        let id = store.insert(&submission()).await.unwrap();
        let lead = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(lead.message, "");
    }

    #[tokio::test]
    async fn update_status_transitions_once() {
        let store = InMemoryLeadStore::new();
        let id = store.insert(&submission()).await.unwrap();
        store.update_status(id, LeadStatus::Processed).await.unwrap();
        let lead = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Processed);
    }

    #[tokio::test]
    async fn missing_lead_reads_as_none() {
        let store = InMemoryLeadStore::new();
        assert!(store.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[test]
    fn null_row_fields_map_back_to_entity() {
        let row = LeadRow {
            id: Uuid::new_v4(),
            locale: "en".to_string(),
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            phone: None,
            company: None,
            inquiry_type: Some("product".to_string()),
            product_slug: None,
            product_name: None,
            form_page: None,
            message: None,
            created_at: 1_700_000_000_000,
            status: "pending".to_string(),
        };
        let lead = row.into_lead().unwrap();
        assert_eq!(lead.phone, None);
        assert_eq!(lead.message, "");
        assert_eq!(lead.inquiry_type, Some(InquiryType::Product));
    }
}
