//! Error taxonomy shared by every ClawDBot crate.
//!
//! The split follows how failures surface at the HTTP edge: validation → 400,
//! authorization → 403, rate limits → 429 with a retry hint, upstream
//! failures → retried then reported as partial results. `OverlapSkipped` is
//! informational — a scheduled run finding its predecessor still going is not
//! an error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BotError>;

#[derive(Debug, Error)]
pub enum BotError {
    /// Malformed or out-of-range input. Field-level messages, safe to echo.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Role/permission mismatch. Deliberately carries no detail.
    #[error("not authorized")]
    Authorization,

    /// Too many attempts for a rate-limit signature.
    #[error("too many attempts, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },

    /// AI provider or notification channel failure, after retries.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// A scheduled run was skipped because the previous run still holds the
    /// guard. Logged, never surfaced as a caller error.
    #[error("run skipped: '{0}' is already in progress")]
    OverlapSkipped(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// Whether a retry per the batch policy could help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BotError::Upstream(_) | BotError::Storage(_))
    }
}
