//! Error taxonomy for the enrichment/analysis workspace.
//!
//! Every leaf error type here maps onto the ten public error codes
//! (`validation | not_found | rate_limited | source_failure | breaker_open |
//! cache_failure | llm_parse | llm_quota | timeout | internal`) and pairs
//! `thiserror` with `miette::Diagnostic`, the same convention `vantage`
//! uses for `NodeError`/`CheckpointerError`/`SchedulerError`.

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by domain-level invariant checks (`leadgraph::domain`).
#[derive(Debug, Error, Diagnostic)]
pub enum DomainError {
    #[error("processing_state=failed requires a non-empty error message")]
    #[diagnostic(code(leadgraph::domain::failed_without_message))]
    FailedWithoutMessage,

    #[error("processing_state=completed requires a non-empty report artifact")]
    #[diagnostic(code(leadgraph::domain::completed_without_report))]
    CompletedWithoutReport,

    #[error("confidence {0} is outside the valid range [0, 100]")]
    #[diagnostic(code(leadgraph::domain::confidence_out_of_range))]
    ConfidenceOutOfRange(i32),

    #[error("field {field:?} has {count} source attributions, expected exactly one")]
    #[diagnostic(code(leadgraph::domain::duplicate_attribution))]
    DuplicateAttribution { field: String, count: usize },

    #[error("challenge statement is {len} characters, exceeds the {max} character limit")]
    #[diagnostic(code(leadgraph::domain::challenge_too_long))]
    ChallengeTooLong { len: usize, max: usize },
}

/// A single adapter call's failure category.
///
/// `not_found` is intentionally excluded from breaker failure accounting;
/// see [`crate::breaker::CircuitBreaker::record_outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Timeout,
    RateLimited,
    Auth,
    NotFound,
    Parse,
    Network,
    Upstream5xx,
    BreakerOpen,
}

impl SourceErrorKind {
    /// Whether this outcome should count as a failure for breaker accounting.
    #[must_use]
    pub fn counts_as_failure(self) -> bool {
        !matches!(self, Self::NotFound | Self::BreakerOpen)
    }
}

impl std::fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::Parse => "parse",
            Self::Network => "network",
            Self::Upstream5xx => "upstream_5xx",
            Self::BreakerOpen => "breaker_open",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum SourceError {
    #[error("source {source_name} call failed: {kind}")]
    #[diagnostic(code(leadgraph::source::call_failed))]
    CallFailed {
        source_name: &'static str,
        kind: SourceErrorKind,
    },
}

#[derive(Debug, Error, Diagnostic)]
pub enum BreakerError {
    #[error("circuit breaker for {0} is open")]
    #[diagnostic(
        code(leadgraph::breaker::open),
        help("Wait for the recovery window to elapse; see CircuitBreaker defaults.")
    )]
    Open(String),
}

#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error("cache read failed: {0}")]
    #[diagnostic(code(leadgraph::cache::read))]
    Read(String),

    #[error("cache write failed: {0}")]
    #[diagnostic(code(leadgraph::cache::write))]
    Write(String),

    #[error("value could not be made JSON-safe for persistence: {0}")]
    #[diagnostic(
        code(leadgraph::cache::not_json_safe),
        help("Run the value through pre_serialize() before handing it to the store.")
    )]
    NotJsonSafe(String),
}

#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("llm call timed out after {after:?}")]
    #[diagnostic(code(leadgraph::llm::timeout))]
    Timeout { after: std::time::Duration, cost_usd: f64 },

    #[error("llm provider returned a 5xx upstream error: {message}")]
    #[diagnostic(code(leadgraph::llm::upstream_5xx))]
    Upstream5xx { message: String, cost_usd: f64 },

    #[error("llm provider rate-limited the request")]
    #[diagnostic(code(leadgraph::llm::rate_limited))]
    RateLimited { cost_usd: f64 },

    #[error("llm authentication failed: {message}")]
    #[diagnostic(code(leadgraph::llm::auth))]
    Auth { message: String, cost_usd: f64 },

    #[error("llm response failed structured-output validation: {message}")]
    #[diagnostic(
        code(leadgraph::llm::parse),
        help("One repair attempt is made automatically before this error is raised.")
    )]
    Parse { message: String, cost_usd: f64 },

    #[error("llm quota exhausted after {cost_usd:.6} USD spent")]
    #[diagnostic(code(leadgraph::llm::quota))]
    Quota { cost_usd: f64 },

    #[error("llm transport error: {message}")]
    #[diagnostic(code(leadgraph::llm::transport))]
    Transport { message: String, cost_usd: f64 },
}

impl LlmError {
    /// Whether this error is retryable per the C7 retry policy
    /// (`timeout | upstream_5xx | rate_limited` are retryable;
    /// `auth | parse | not_found` fail immediately).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Upstream5xx { .. } | Self::RateLimited { .. }
        )
    }

    /// The cost billed by the attempt that raised this error. Zero for every
    /// variant that can only occur before a completion response came back
    /// (timeout, transport failure, rate limiting, auth); the real per-call
    /// cost for [`Self::Parse`], where a completion did complete and get
    /// billed before failing structured-output validation — this is what
    /// lets a caller mark a submission failed "with cost so far" rather than
    /// silently losing the spend on a billed-but-unusable response.
    #[must_use]
    pub fn cost_usd(&self) -> f64 {
        match self {
            Self::Timeout { cost_usd, .. }
            | Self::Upstream5xx { cost_usd, .. }
            | Self::RateLimited { cost_usd }
            | Self::Auth { cost_usd, .. }
            | Self::Parse { cost_usd, .. }
            | Self::Quota { cost_usd }
            | Self::Transport { cost_usd, .. } => *cost_usd,
        }
    }

    /// Returns `self` with `extra` folded into its carried cost. Used when a
    /// later, already-billed step (e.g. a structured-output repair call)
    /// fails with a transport-level error of its own — the cost of the
    /// attempt that got us there must not be lost just because the retry
    /// failed too.
    #[must_use]
    pub fn with_added_cost(self, extra: f64) -> Self {
        match self {
            Self::Timeout { after, cost_usd } => Self::Timeout { after, cost_usd: cost_usd + extra },
            Self::Upstream5xx { message, cost_usd } => Self::Upstream5xx { message, cost_usd: cost_usd + extra },
            Self::RateLimited { cost_usd } => Self::RateLimited { cost_usd: cost_usd + extra },
            Self::Auth { message, cost_usd } => Self::Auth { message, cost_usd: cost_usd + extra },
            Self::Parse { message, cost_usd } => Self::Parse { message, cost_usd: cost_usd + extra },
            Self::Quota { cost_usd } => Self::Quota { cost_usd: cost_usd + extra },
            Self::Transport { message, cost_usd } => Self::Transport { message, cost_usd: cost_usd + extra },
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    #[error("stage {stage_id} failed after retries: {source}")]
    #[diagnostic(code(leadgraph::stage::failed))]
    Failed {
        stage_id: u8,
        #[source]
        source: LlmError,
    },
}

#[derive(Debug, Error, Diagnostic)]
pub enum SubmissionError {
    #[error("validation failed: {0}")]
    #[diagnostic(code(leadgraph::submission::validation))]
    Validation(String),

    #[error("submission {0} not found")]
    #[diagnostic(code(leadgraph::submission::not_found))]
    NotFound(i64),

    #[error("analysis pipeline failed at stage {stage_id}: {message}")]
    #[diagnostic(code(leadgraph::submission::pipeline_failed))]
    PipelineFailed { stage_id: u8, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),

    #[error("internal error: {0}")]
    #[diagnostic(code(leadgraph::submission::internal))]
    Internal(String),
}

/// Top-level error surfaced by HTTP handlers, carrying enough shape to
/// render the `{success, data?, error?, metadata?}` response envelope.
#[derive(Debug, Error, Diagnostic)]
pub enum ApiError {
    #[error("{0}")]
    #[diagnostic(code(leadgraph::api::validation))]
    Validation(String),

    #[error("not found")]
    #[diagnostic(code(leadgraph::api::not_found))]
    NotFound,

    #[error("rate limited")]
    #[diagnostic(code(leadgraph::api::rate_limited))]
    RateLimited { retry_after_secs: u64 },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Submission(#[from] SubmissionError),

    #[error("internal error")]
    #[diagnostic(code(leadgraph::api::internal))]
    Internal(String),
}

impl ApiError {
    /// The short machine-readable error code carried by every envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::Submission(SubmissionError::NotFound(_)) => "not_found",
            Self::Submission(_) => "internal",
            Self::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound | Self::Submission(SubmissionError::NotFound(_)) => 404,
            Self::RateLimited { .. } => 429,
            Self::Submission(_) | Self::Internal(_) => 500,
        }
    }
}
