//! Core entities: `Submission`, `EnrichmentSession`, `SourceAttribution`,
//! `Report`, and the circuit breaker's persisted state shape.
//!
//! These are plain, serde-friendly structs — the workflow-level provenance
//! (which source said what, at what confidence) lives one layer down in
//! [`vantage::observation::FieldObservation`]; these types are the
//! longer-lived, persisted view built from that ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::DomainError;

/// System-owned lifecycle of a submission, advanced only by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Queued,
    DataGathering,
    AiAnalyzing,
    Finalizing,
    Completed,
    Failed,
}

/// Human-owned review lifecycle, independent of `ProcessingState`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Submitted,
    Analyzing,
    Ready,
    Reviewed,
    SentToClient,
    Archived,
}

impl Default for UserStatus {
    fn default() -> Self {
        Self::Submitted
    }
}

/// A lead's stated industry. Kept open-ended via `Other` since the intake
/// form is free text in practice; canonicalization happens downstream in
/// the analysis pipeline, not here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    Technology,
    Retail,
    Healthcare,
    Finance,
    Manufacturing,
    Hospitality,
    Education,
    RealEstate,
    Other(String),
}

/// User-supplied lead, as posted to `/api/submit`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub contact_name: String,
    pub contact_email: String,
    pub company_name: String,
    /// Normalized website URL — see [`crate::normalize::normalize_domain`].
    pub website: String,
    pub industry: Industry,
    pub challenge: String,
    pub enrichment_session_id: Option<Uuid>,
    pub processing_state: ProcessingState,
    pub user_status: UserStatus,
    pub error_message: Option<String>,
    pub report: Option<Report>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maximum length of the free-text challenge statement.
pub const CHALLENGE_MAX_LEN: usize = 2000;

impl Submission {
    /// Builds a fresh submission in the `queued`/`submitted` state.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ChallengeTooLong`] if `challenge` exceeds
    /// [`CHALLENGE_MAX_LEN`] characters.
    pub fn new(
        id: i64,
        contact_name: impl Into<String>,
        contact_email: impl Into<String>,
        company_name: impl Into<String>,
        website: impl Into<String>,
        industry: Industry,
        challenge: impl Into<String>,
        enrichment_session_id: Option<Uuid>,
    ) -> Result<Self, DomainError> {
        let challenge = challenge.into();
        if challenge.chars().count() > CHALLENGE_MAX_LEN {
            return Err(DomainError::ChallengeTooLong {
                len: challenge.chars().count(),
                max: CHALLENGE_MAX_LEN,
            });
        }
        let now = Utc::now();
        Ok(Self {
            id,
            contact_name: contact_name.into(),
            contact_email: contact_email.into(),
            company_name: company_name.into(),
            website: website.into(),
            industry,
            challenge,
            enrichment_session_id,
            processing_state: ProcessingState::Queued,
            user_status: UserStatus::default(),
            error_message: None,
            report: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Transitions to `failed`, attaching the reason. Enforces the
    /// `processing_state=failed ⇒ non-empty error_message` invariant.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.processing_state = ProcessingState::Failed;
        self.error_message = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Transitions to `completed`, attaching the finished report. Enforces
    /// the `processing_state=completed ⇒ non-empty report` invariant.
    pub fn mark_completed(&mut self, report: Report) {
        self.processing_state = ProcessingState::Completed;
        self.report = Some(report);
        self.updated_at = Utc::now();
    }
}

/// Provenance of one canonical field within an [`EnrichmentSession`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub source: String,
    pub layer: u8,
    pub raw_value: Value,
    pub normalized_value: Value,
    pub cost_usd: f64,
    pub extracted_at: DateTime<Utc>,
    pub success: bool,
}

/// One pass through the enrichment engine for a `(domain, requester_email)`
/// pair. Built by folding [`vantage::observation::FieldObservation`]s at
/// each layer boundary; see [`crate::orchestrator`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnrichmentSession {
    pub session_id: Uuid,
    pub cache_key: String,
    pub website_url: String,
    pub requester_email: String,
    pub fields: BTreeMap<String, Value>,
    pub attribution: BTreeMap<String, SourceAttribution>,
    pub confidence: BTreeMap<String, u8>,
    pub total_cost_usd: f64,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Complete,
    Aborted,
}

/// Default enrichment-session TTL: 30 days.
pub const ENRICHMENT_TTL_DAYS: i64 = 30;

impl EnrichmentSession {
    #[must_use]
    pub fn new(cache_key: impl Into<String>, website_url: impl Into<String>, requester_email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            cache_key: cache_key.into(),
            website_url: website_url.into(),
            requester_email: requester_email.into(),
            fields: BTreeMap::new(),
            attribution: BTreeMap::new(),
            confidence: BTreeMap::new(),
            total_cost_usd: 0.0,
            status: SessionStatus::InProgress,
            started_at: now,
            completed_at: None,
            expires_at: now + chrono::Duration::days(ENRICHMENT_TTL_DAYS),
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Invariant check: every field has exactly one attribution entry
    /// under the same key.
    #[must_use]
    pub fn attribution_is_consistent(&self) -> bool {
        self.fields.keys().all(|k| self.attribution.contains_key(k))
            && self.attribution.keys().all(|k| self.fields.contains_key(k))
    }
}

/// The six analysis-pipeline stage identifiers, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum StageId {
    Extraction = 1,
    GapAnalysis = 2,
    Strategy = 3,
    CompetitiveMatrix = 4,
    RiskAndPriority = 5,
    Polish = 6,
}

impl StageId {
    pub const ALL: [StageId; 6] = [
        StageId::Extraction,
        StageId::GapAnalysis,
        StageId::Strategy,
        StageId::CompetitiveMatrix,
        StageId::RiskAndPriority,
        StageId::Polish,
    ];

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            StageId::Extraction => "extraction",
            StageId::GapAnalysis => "gap_analysis",
            StageId::Strategy => "strategy",
            StageId::CompetitiveMatrix => "competitive_matrix",
            StageId::RiskAndPriority => "risk_and_priority",
            StageId::Polish => "polish",
        }
    }
}

/// Result of running one analysis-pipeline stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisStageResult {
    pub stage: StageId,
    pub output: Value,
    /// SHA-256 over the canonical JSON of the stage's inputs; the stage
    /// cache key is derived from this plus the stage id.
    pub input_fingerprint: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub cached: bool,
}

/// Ordered composition of stage outputs, keyed by stable section paths.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Report {
    pub stages: Vec<AnalysisStageResult>,
    pub sections: Value,
    pub total_cost_usd: f64,
    pub data_quality_tier: DataQualityTier,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    /// Invariant check: all six stages present, in order.
    #[must_use]
    pub fn has_all_stages_in_order(&self) -> bool {
        self.stages.len() == StageId::ALL.len()
            && self
                .stages
                .iter()
                .zip(StageId::ALL.iter())
                .all(|(s, expected)| s.stage == *expected)
    }
}

/// Enrichment-completeness tier, computed before stage 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQualityTier {
    Minimal,
    Partial,
    Good,
    Full,
    Legendary,
}

impl DataQualityTier {
    /// Whether stage 3 must emit `status=dados_insuficientes` for sections
    /// whose required inputs are absent, rather than invent numbers.
    #[must_use]
    pub fn requires_insufficient_data_guard(self) -> bool {
        matches!(self, Self::Minimal | Self::Partial)
    }

    /// Computed from the count of canonical fields with non-null values
    /// and their average confidence — a simple, auditable completeness
    /// score rather than a model-driven judgment call.
    #[must_use]
    pub fn from_session(session: &EnrichmentSession) -> Self {
        let populated = session.fields.values().filter(|v| !v.is_null()).count();
        let avg_confidence = if session.confidence.is_empty() {
            0
        } else {
            session.confidence.values().map(|&c| c as u32).sum::<u32>() / session.confidence.len() as u32
        };
        match (populated, avg_confidence) {
            (0, _) => Self::Minimal,
            (1..=3, _) => Self::Partial,
            (4..=6, c) if c < 70 => Self::Partial,
            (4..=6, _) => Self::Good,
            (7..=9, _) => Self::Full,
            _ => Self::Legendary,
        }
    }
}

/// A single entry in the user-edit ledger, recorded whenever
/// a submitted form value overrides a cached enrichment value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserFieldEdit {
    pub session_id: Uuid,
    pub field_name: String,
    pub source_value: Value,
    pub user_value: Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn challenge_over_limit_rejected() {
        let long = "x".repeat(CHALLENGE_MAX_LEN + 1);
        let err = Submission::new(1, "a", "a@b.com", "Acme", "acme.com", Industry::Other("x".into()), long, None)
            .unwrap_err();
        assert!(matches!(err, DomainError::ChallengeTooLong { .. }));
    }

    #[test]
    fn mark_failed_sets_error_message() {
        let mut s = Submission::new(1, "a", "a@b.com", "Acme", "acme.com", Industry::Technology, "help", None).unwrap();
        s.mark_failed("stage 3 exhausted retries");
        assert_eq!(s.processing_state, ProcessingState::Failed);
        assert!(s.error_message.is_some());
    }

    #[test]
    fn attribution_consistency_detects_missing_entry() {
        let mut session = EnrichmentSession::new("key", "acme.com", "a@b.com");
        session.fields.insert("name".into(), json!("Acme"));
        assert!(!session.attribution_is_consistent());
        session.attribution.insert(
            "name".into(),
            SourceAttribution {
                source: "metadata".into(),
                layer: 1,
                raw_value: json!("Acme"),
                normalized_value: json!("Acme"),
                cost_usd: 0.0,
                extracted_at: Utc::now(),
                success: true,
            },
        );
        assert!(session.attribution_is_consistent());
    }

    #[test]
    fn data_quality_tier_minimal_requires_guard() {
        let session = EnrichmentSession::new("k", "acme.com", "a@b.com");
        let tier = DataQualityTier::from_session(&session);
        assert_eq!(tier, DataQualityTier::Minimal);
        assert!(tier.requires_insufficient_data_guard());
    }
}
