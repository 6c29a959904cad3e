use rust_decimal::Decimal;
use thiserror::Error;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

/// Failure taxonomy shared by every ledger operation.
#[derive(Debug, Error)]
pub(crate) enum LedgerError {
    #[error("{0}")]
    Validation(String),
    #[error("course '{course_id}' is not in the catalog")]
    InvalidCourse { course_id: String },
    #[error("no enrollment found for learner '{learner_id}' in course '{course_id}'")]
    EnrollmentNotFound { learner_id: String, course_id: String },
    #[error("quiz attempt '{attempt_id}' not found")]
    AttemptNotFound { attempt_id: String },
    #[error("compliance session '{session_id}' not found")]
    SessionNotFound { session_id: String },
    #[error("payment amount must be greater than zero, got {amount}")]
    InvalidAmount { amount: Decimal },
    #[error("retake limit reached for learner '{user_id}' in course '{course_id}' ({scope})")]
    RetakeLimitReached { user_id: String, course_id: String, scope: String },
    #[error("{0}")]
    Conflict(String),
    #[error("concurrent update detected: {0}")]
    Concurrency(String),
    #[error("database error: {0}")]
    Backend(#[source] sqlx::Error),
}

impl LedgerError {
    pub(crate) fn enrollment_not_found(learner_id: &str, course_id: &str) -> Self {
        Self::EnrollmentNotFound {
            learner_id: learner_id.to_string(),
            course_id: course_id.to_string(),
        }
    }

    pub(crate) fn attempt_not_found(attempt_id: &str) -> Self {
        Self::AttemptNotFound { attempt_id: attempt_id.to_string() }
    }

    pub(crate) fn session_not_found(session_id: &str) -> Self {
        Self::SessionNotFound { session_id: session_id.to_string() }
    }

    /// Whether repeating the whole operation may succeed.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Self::Concurrency(_) | Self::Backend(sqlx::Error::PoolTimedOut))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        let code = err.as_database_error().and_then(|db| db.code().map(|code| code.into_owned()));

        match code.as_deref() {
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                Self::Concurrency(err.to_string())
            }
            Some(UNIQUE_VIOLATION) => Self::Conflict(
                err.as_database_error()
                    .and_then(|db| db.constraint().map(|name| format!("duplicate record ({name})")))
                    .unwrap_or_else(|| "duplicate record".to_string()),
            ),
            Some(CHECK_VIOLATION) => Self::Validation(
                err.as_database_error()
                    .and_then(|db| db.constraint().map(|name| format!("constraint {name} violated")))
                    .unwrap_or_else(|| "constraint violated".to_string()),
            ),
            _ => Self::Backend(err),
        }
    }
}

pub(crate) type LedgerResult<T> = Result<T, LedgerError>;

/// Rejects blank identifiers before any I/O happens.
pub(crate) fn require_id(field: &str, value: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::Validation(format!("{field} must be a non-empty string")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_messages_carry_ids() {
        let err = LedgerError::enrollment_not_found("learner-1", "online-course");
        assert_eq!(
            err.to_string(),
            "no enrollment found for learner 'learner-1' in course 'online-course'"
        );
        assert!(LedgerError::attempt_not_found("a-1").to_string().contains("a-1"));
        assert!(LedgerError::session_not_found("s-1").to_string().contains("s-1"));
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(LedgerError::Concurrency("version moved".into()).is_retryable());
        assert!(!LedgerError::Validation("bad".into()).is_retryable());
        assert!(!LedgerError::Conflict("closed".into()).is_retryable());
        assert!(LedgerError::Backend(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!LedgerError::Backend(sqlx::Error::RowNotFound).is_retryable());
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert!(require_id("learner_id", "u-1").is_ok());
        let err = require_id("learner_id", "  ").expect_err("blank id");
        assert_eq!(err.to_string(), "learner_id must be a non-empty string");
    }

    #[test]
    fn non_database_errors_stay_backend() {
        let err = LedgerError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, LedgerError::Backend(_)));
    }
}
