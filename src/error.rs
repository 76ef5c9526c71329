use thiserror::Error;

use crate::keys::{Key, Kind};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not authorized")]
    NotAuthorized,

    #[error("not found: {0}")]
    NotFound(Key),

    #[error("this user is already a member")]
    AlreadyMember,

    #[error("this user is not a member")]
    NotMember,

    #[error("this user has already RSVP'd")]
    AlreadyRsvpd,

    #[error("this user has not RSVP'd")]
    NotRsvpd,

    #[error("this event has the maximum number of guests")]
    CapacityExceeded,

    #[error("you already have this contact")]
    AlreadyContact,

    #[error("you don't have this contact")]
    NotContact,

    #[error("you cannot add yourself as a contact")]
    CannotContactSelf,

    #[error("dangling reference: {0}")]
    DanglingReference(Key),

    #[error("expected {expected} entity, found {found}")]
    KindMismatch { expected: Kind, found: Kind },

    #[error("transaction conflict")]
    TransactionConflict,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Returns whether retrying the whole operation can succeed. Domain
    /// conflicts are terminal; only optimistic-concurrency failures and
    /// transient storage errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransactionConflict | AppError::Storage(_))
    }

    /// HTTP status code the routing layer maps this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::NotAuthorized => 403,
            AppError::NotFound(_) => 404,
            AppError::AlreadyMember
            | AppError::NotMember
            | AppError::AlreadyRsvpd
            | AppError::NotRsvpd
            | AppError::AlreadyContact
            | AppError::NotContact
            | AppError::CannotContactSelf => 409,
            AppError::CapacityExceeded => 409,
            AppError::TransactionConflict => 409,
            AppError::DanglingReference(_)
            | AppError::KindMismatch { .. }
            | AppError::Config(_)
            | AppError::Storage(_)
            | AppError::Serialization(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Kind;

    #[test]
    fn test_domain_conflicts_are_not_retryable() {
        assert!(!AppError::AlreadyMember.is_retryable());
        assert!(!AppError::CapacityExceeded.is_retryable());
        assert!(!AppError::NotFound(Key::new(Kind::User)).is_retryable());
        assert!(AppError::TransactionConflict.is_retryable());
        assert!(AppError::Storage("connection reset".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::NotFound(Key::new(Kind::Event)).status_code(), 404);
        assert_eq!(AppError::AlreadyRsvpd.status_code(), 409);
        assert_eq!(AppError::NotAuthorized.status_code(), 403);
        assert_eq!(AppError::Storage("io".into()).status_code(), 500);
    }
}
