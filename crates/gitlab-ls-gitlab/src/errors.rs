//! GitLab Integration Error Types

use std::time::Duration;

use gitlab_ls_http::{HttpError, StatusCode};
use thiserror::Error;

/// Errors raised while setting up GitLab access
#[derive(Debug, Error)]
pub enum GitLabError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP layer error
    #[error("HTTP client error: {0}")]
    Http(#[from] HttpError),
}

impl GitLabError {
    /// Create a new config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        GitLabError::ConfigError(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        GitLabError::InvalidInput(msg.into())
    }
}

/// Result type for GitLab setup operations
pub type Result<T> = std::result::Result<T, GitLabError>;

/// Outcome of a failed fetch of one project's items
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Token rejected
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Project path unknown to the instance
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited {
        /// How long the server asked us to wait
        retry_after: Option<Duration>,
    },

    /// Network, timeout or server-side failure
    #[error("Transient failure: {0}")]
    Transient(String),
}

impl FetchError {
    /// Whether the project's refresh cycle should stop for good
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Unauthorized(_) | FetchError::NotFound(_))
    }

    /// Server-provided wait hint
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<HttpError> for FetchError {
    fn from(err: HttpError) -> Self {
        match err.status() {
            Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN) => {
                FetchError::Unauthorized(err.to_string())
            }
            Some(StatusCode::NOT_FOUND) => FetchError::NotFound(err.to_string()),
            Some(StatusCode::TOO_MANY_REQUESTS) => FetchError::RateLimited {
                retry_after: err.retry_after(),
            },
            _ => FetchError::Transient(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: StatusCode, retry_after: Option<Duration>) -> HttpError {
        HttpError::HttpStatus {
            status,
            message: "body".to_string(),
            retry_after,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            FetchError::from(status_error(StatusCode::UNAUTHORIZED, None)),
            FetchError::Unauthorized(_)
        ));
        assert!(matches!(
            FetchError::from(status_error(StatusCode::FORBIDDEN, None)),
            FetchError::Unauthorized(_)
        ));
        assert!(matches!(
            FetchError::from(status_error(StatusCode::NOT_FOUND, None)),
            FetchError::NotFound(_)
        ));
        assert_eq!(
            FetchError::from(status_error(
                StatusCode::TOO_MANY_REQUESTS,
                Some(Duration::from_secs(3))
            )),
            FetchError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
        );
        assert!(matches!(
            FetchError::from(status_error(StatusCode::BAD_GATEWAY, None)),
            FetchError::Transient(_)
        ));
    }

    #[test]
    fn test_fatality() {
        assert!(FetchError::Unauthorized(String::new()).is_fatal());
        assert!(FetchError::NotFound(String::new()).is_fatal());
        assert!(!FetchError::Transient(String::new()).is_fatal());
        assert!(!FetchError::RateLimited { retry_after: None }.is_fatal());
    }

    #[test]
    fn test_invalid_url_is_transient() {
        let err = FetchError::from(HttpError::InvalidUrl("x".to_string()));
        assert!(matches!(err, FetchError::Transient(_)));
    }
}
