//! Error types for permission assignment, registration and the request workflow.
//!
//! Denials are never errors: every "no" from the resolver is a plain `false`.
//! Only structurally invalid input, configuration mistakes and store failures
//! surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The assignment target is not a content type known to the store.
    #[error("{0} is not a registered model")]
    NotAModel(String),

    /// The assignment target is an instance without an identifier.
    #[error("{0} has not been saved yet")]
    UnsavedModelInstance(String),

    #[error("The permission {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    #[error("{subject} has already permission \"{codename}\" on {target}")]
    AlreadyHasPermission {
        subject: String,
        codename: String,
        target: String,
    },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Permission grant {0} not found")]
    GrantNotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Neither a user nor a group is bound to the resolver.
    #[error("No user or group bound to the resolver")]
    MissingSubject,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, AuthorityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AuthorityError::NotAModel("fail".to_string()).to_string(),
            "fail is not a registered model"
        );
        assert_eq!(
            AuthorityError::UnsavedModelInstance("auth.user".to_string()).to_string(),
            "auth.user has not been saved yet"
        );
        assert_eq!(
            AuthorityError::AlreadyHasPermission {
                subject: "jezdez".to_string(),
                codename: "flatpage_permission.top_secret".to_string(),
                target: "flatpages.flatpage:1".to_string(),
            }
            .to_string(),
            "jezdez has already permission \"flatpage_permission.top_secret\" on flatpages.flatpage:1"
        );
        assert_eq!(
            AuthorityError::MissingSubject.to_string(),
            "No user or group bound to the resolver"
        );
    }

    #[test]
    fn test_sqlx_error_converts() {
        let err: AuthorityError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AuthorityError::Database(_)));
    }
}
