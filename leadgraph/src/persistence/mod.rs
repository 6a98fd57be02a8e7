//! Persisted relations (spec section 6.2): `submissions` and
//! `user_field_edits`, plus the connection/migration bootstrap shared by
//! every `sqlx`-backed store in this crate (`crate::cache::store` persists
//! `enrichment_sessions` and `stage_cache` through the generic
//! [`crate::cache::KvStore`] contract instead; see that module).
//!
//! Two traits ([`SubmissionRepo`], [`EditLedgerRepo`]) with a Postgres
//! implementation for production and an in-memory one for tests, the same
//! split `crate::cache::store` already uses for `KvStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::domain::{Submission, UserFieldEdit};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(String),

    #[error("submission {0} not found")]
    NotFound(i64),

    #[error("migration failed: {0}")]
    Migration(String),
}

/// Connects to Postgres and runs the embedded migrations, the same
/// connect-then-migrate convention `vantage::runtimes::checkpointer_sqlite`
/// uses for its own schema.
pub async fn connect(database_url: &str) -> Result<PgPool, PersistenceError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| PersistenceError::Migration(e.to_string()))?;
    Ok(pool)
}

/// CRUD surface over the `submissions` relation.
#[async_trait]
pub trait SubmissionRepo: Send + Sync {
    async fn insert(&self, submission: &Submission) -> Result<i64, PersistenceError>;
    async fn get(&self, id: i64) -> Result<Submission, PersistenceError>;
    async fn update(&self, submission: &Submission) -> Result<(), PersistenceError>;
    async fn list_recent(&self, limit: i64) -> Result<Vec<Submission>, PersistenceError>;
}

/// Append-only surface over the `user_field_edits` relation (C10's ledger).
#[async_trait]
pub trait EditLedgerRepo: Send + Sync {
    async fn record(&self, edit: &UserFieldEdit) -> Result<(), PersistenceError>;
    /// Count of edits ever recorded for `field_name`, across every session
    /// — the input to the confidence-penalty term in
    /// `crate::enrichment::orchestrator::score_observations`.
    async fn count_for_field(&self, field_name: &str) -> Result<u32, PersistenceError>;
}

struct SubmissionRow {
    id: i64,
    name: String,
    email: String,
    company: String,
    website: String,
    industry: String,
    challenge: String,
    enrichment_session_id: Option<uuid::Uuid>,
    processing_state: String,
    user_status: String,
    error_message: Option<String>,
    report_json: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SubmissionRow {
    fn into_domain(self) -> Result<Submission, PersistenceError> {
        use crate::domain::{Industry, ProcessingState, Report, UserStatus};

        let industry = match self.industry.as_str() {
            "technology" => Industry::Technology,
            "retail" => Industry::Retail,
            "healthcare" => Industry::Healthcare,
            "finance" => Industry::Finance,
            "manufacturing" => Industry::Manufacturing,
            "hospitality" => Industry::Hospitality,
            "education" => Industry::Education,
            "real_estate" => Industry::RealEstate,
            other => Industry::Other(other.to_string()),
        };
        let processing_state = match self.processing_state.as_str() {
            "queued" => ProcessingState::Queued,
            "data_gathering" => ProcessingState::DataGathering,
            "ai_analyzing" => ProcessingState::AiAnalyzing,
            "finalizing" => ProcessingState::Finalizing,
            "completed" => ProcessingState::Completed,
            _ => ProcessingState::Failed,
        };
        let user_status = match self.user_status.as_str() {
            "analyzing" => UserStatus::Analyzing,
            "ready" => UserStatus::Ready,
            "reviewed" => UserStatus::Reviewed,
            "sent_to_client" => UserStatus::SentToClient,
            "archived" => UserStatus::Archived,
            _ => UserStatus::Submitted,
        };
        let report = match self.report_json {
            Some(value) => {
                Some(serde_json::from_value::<Report>(value).map_err(|e| PersistenceError::Database(e.to_string()))?)
            }
            None => None,
        };

        Ok(Submission {
            id: self.id,
            contact_name: self.name,
            contact_email: self.email,
            company_name: self.company,
            website: self.website,
            industry,
            challenge: self.challenge,
            enrichment_session_id: self.enrichment_session_id,
            processing_state,
            user_status,
            error_message: self.error_message,
            report,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn industry_code(submission: &Submission) -> String {
    use crate::domain::Industry;
    match &submission.industry {
        Industry::Technology => "technology".to_string(),
        Industry::Retail => "retail".to_string(),
        Industry::Healthcare => "healthcare".to_string(),
        Industry::Finance => "finance".to_string(),
        Industry::Manufacturing => "manufacturing".to_string(),
        Industry::Hospitality => "hospitality".to_string(),
        Industry::Education => "education".to_string(),
        Industry::RealEstate => "real_estate".to_string(),
        Industry::Other(s) => s.clone(),
    }
}

fn processing_state_code(submission: &Submission) -> &'static str {
    use crate::domain::ProcessingState;
    match submission.processing_state {
        ProcessingState::Queued => "queued",
        ProcessingState::DataGathering => "data_gathering",
        ProcessingState::AiAnalyzing => "ai_analyzing",
        ProcessingState::Finalizing => "finalizing",
        ProcessingState::Completed => "completed",
        ProcessingState::Failed => "failed",
    }
}

fn user_status_code(submission: &Submission) -> &'static str {
    use crate::domain::UserStatus;
    match submission.user_status {
        UserStatus::Submitted => "submitted",
        UserStatus::Analyzing => "analyzing",
        UserStatus::Ready => "ready",
        UserStatus::Reviewed => "reviewed",
        UserStatus::SentToClient => "sent_to_client",
        UserStatus::Archived => "archived",
    }
}

/// Postgres-backed [`SubmissionRepo`] / [`EditLedgerRepo`].
pub struct SqlxRepo {
    pool: PgPool,
}

impl SqlxRepo {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionRepo for SqlxRepo {
    async fn insert(&self, submission: &Submission) -> Result<i64, PersistenceError> {
        let report_json = submission
            .report
            .as_ref()
            .map(|r| crate::cache::pre_serialize(&serde_json::to_value(r).unwrap_or_default()));
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO submissions \
             (name, email, company, website, industry, challenge, enrichment_session_id, \
              processing_state, user_status, error_message, report_json, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING id",
        )
        .bind(&submission.contact_name)
        .bind(&submission.contact_email)
        .bind(&submission.company_name)
        .bind(&submission.website)
        .bind(industry_code(submission))
        .bind(&submission.challenge)
        .bind(submission.enrichment_session_id)
        .bind(processing_state_code(submission))
        .bind(user_status_code(submission))
        .bind(&submission.error_message)
        .bind(report_json)
        .bind(submission.created_at)
        .bind(submission.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Ok(row.0)
    }

    async fn get(&self, id: i64) -> Result<Submission, PersistenceError> {
        let row = sqlx::query(
            "SELECT id, name, email, company, website, industry, challenge, \
                    enrichment_session_id, processing_state, user_status, error_message, \
                    report_json, created_at, updated_at \
             FROM submissions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?
        .ok_or(PersistenceError::NotFound(id))?;
        row_into_submission(&row)
    }

    async fn update(&self, submission: &Submission) -> Result<(), PersistenceError> {
        let report_json = submission
            .report
            .as_ref()
            .map(|r| crate::cache::pre_serialize(&serde_json::to_value(r).unwrap_or_default()));
        sqlx::query(
            "UPDATE submissions SET processing_state = $1, user_status = $2, error_message = $3, \
             report_json = $4, updated_at = $5 WHERE id = $6",
        )
        .bind(processing_state_code(submission))
        .bind(user_status_code(submission))
        .bind(&submission.error_message)
        .bind(report_json)
        .bind(submission.updated_at)
        .bind(submission.id)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Submission>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT id, name, email, company, website, industry, challenge, \
                    enrichment_session_id, processing_state, user_status, error_message, \
                    report_json, created_at, updated_at \
             FROM submissions ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?;
        rows.iter().map(row_into_submission).collect()
    }
}

fn row_into_submission(row: &PgRow) -> Result<Submission, PersistenceError> {
    SubmissionRow {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        company: row.get("company"),
        website: row.get("website"),
        industry: row.get("industry"),
        challenge: row.get("challenge"),
        enrichment_session_id: row.get("enrichment_session_id"),
        processing_state: row.get("processing_state"),
        user_status: row.get("user_status"),
        error_message: row.get("error_message"),
        report_json: row.get("report_json"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
    .into_domain()
}

#[async_trait]
impl EditLedgerRepo for SqlxRepo {
    async fn record(&self, edit: &UserFieldEdit) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO user_field_edits (session_id, field_name, source_value, user_value, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(edit.session_id)
        .bind(&edit.field_name)
        .bind(crate::cache::pre_serialize(&edit.source_value))
        .bind(crate::cache::pre_serialize(&edit.user_value))
        .bind(edit.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Ok(())
    }

    async fn count_for_field(&self, field_name: &str) -> Result<u32, PersistenceError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_field_edits WHERE field_name = $1")
            .bind(field_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Ok(u32::try_from(row.0).unwrap_or(u32::MAX))
    }
}

/// In-memory [`SubmissionRepo`] / [`EditLedgerRepo`] for tests, mirroring
/// [`crate::cache::InMemoryKvStore`]'s role for [`crate::cache::KvStore`].
#[derive(Default)]
pub struct InMemorySubmissionRepo {
    rows: Mutex<Vec<Submission>>,
}

#[async_trait]
impl SubmissionRepo for InMemorySubmissionRepo {
    async fn insert(&self, submission: &Submission) -> Result<i64, PersistenceError> {
        let mut rows = self.rows.lock();
        let id = i64::try_from(rows.len()).unwrap_or(0) + 1;
        let mut stored = submission.clone();
        stored.id = id;
        rows.push(stored);
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Submission, PersistenceError> {
        self.rows
            .lock()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(PersistenceError::NotFound(id))
    }

    async fn update(&self, submission: &Submission) -> Result<(), PersistenceError> {
        let mut rows = self.rows.lock();
        let Some(existing) = rows.iter_mut().find(|s| s.id == submission.id) else {
            return Err(PersistenceError::NotFound(submission.id));
        };
        *existing = submission.clone();
        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Submission>, PersistenceError> {
        let rows = self.rows.lock();
        let mut sorted = rows.clone();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sorted.truncate(limit.max(0) as usize);
        Ok(sorted)
    }
}

#[derive(Default)]
pub struct InMemoryEditLedger {
    edits: Mutex<Vec<UserFieldEdit>>,
}

impl InMemoryEditLedger {
    pub async fn count(&self) -> usize {
        self.edits.lock().len()
    }
}

#[async_trait]
impl EditLedgerRepo for InMemoryEditLedger {
    async fn record(&self, edit: &UserFieldEdit) -> Result<(), PersistenceError> {
        self.edits.lock().push(edit.clone());
        Ok(())
    }

    async fn count_for_field(&self, field_name: &str) -> Result<u32, PersistenceError> {
        Ok(u32::try_from(self.edits.lock().iter().filter(|e| e.field_name == field_name).count()).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Industry, Submission};
    use serde_json::json;

    fn sample() -> Submission {
        Submission::new(0, "Jane", "jane@acme.com", "Acme", "acme.com", Industry::Technology, "need help scaling", None)
            .unwrap()
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let repo = InMemorySubmissionRepo::default();
        let id = repo.insert(&sample()).await.unwrap();
        let fetched = repo.get(id).await.unwrap();
        assert_eq!(fetched.company_name, "Acme");
    }

    #[tokio::test]
    async fn update_persists_failure_transition() {
        let repo = InMemorySubmissionRepo::default();
        let id = repo.insert(&sample()).await.unwrap();
        let mut submission = repo.get(id).await.unwrap();
        submission.mark_failed("stage 3 exhausted retries");
        repo.update(&submission).await.unwrap();
        let fetched = repo.get(id).await.unwrap();
        assert!(fetched.error_message.is_some());
    }

    #[tokio::test]
    async fn ledger_counts_edits_per_field() {
        let ledger = InMemoryEditLedger::default();
        let edit = UserFieldEdit {
            session_id: uuid::Uuid::new_v4(),
            field_name: "name".to_string(),
            source_value: json!("Acme"),
            user_value: json!("Acme Corp"),
            created_at: Utc::now(),
        };
        ledger.record(&edit).await.unwrap();
        ledger.record(&edit).await.unwrap();
        assert_eq!(ledger.count_for_field("name").await.unwrap(), 2);
        assert_eq!(ledger.count_for_field("other").await.unwrap(), 0);
    }
}
