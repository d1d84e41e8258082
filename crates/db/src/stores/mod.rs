use chrono::{DateTime, Utc};

use greenlight_core::store::StoreError;

pub mod delegation;
pub mod leave;
pub mod submission;

pub use delegation::SqlDelegationStore;
pub use leave::SqlLeaveLedger;
pub use submission::SqlSubmissionStore;

pub(crate) fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

pub(crate) fn insert_error(error: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if db.kind() == sqlx::error::ErrorKind::UniqueViolation {
            return StoreError::Conflict(format!("{what} already exists"));
        }
    }
    backend(error)
}

pub(crate) fn decode(message: impl Into<String>) -> StoreError {
    StoreError::Backend(message.into())
}

pub(crate) fn parse_datetime(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_optional_datetime(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
