//! Error types for the n8n provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// n8n provider errors
#[derive(Error, Debug)]
pub enum N8nError {
    /// Credentials were rejected
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("n8n API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Workflow or folder not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Base URL is not usable
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// The restore configuration carries no HTTP client
    #[error("No HTTP client configured. Set one with .http_client() or enable desktop-shims.")]
    MissingHttpClient,

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for n8n operations
pub type Result<T> = std::result::Result<T, N8nError>;

impl From<N8nError> for BridgeError {
    fn from(error: N8nError) -> Self {
        match error {
            N8nError::AuthenticationFailed(msg) => BridgeError::Remote {
                status: 401,
                message: format!("Authentication failed: {}", msg),
            },
            N8nError::ApiError {
                status_code,
                message,
            } => BridgeError::Remote {
                status: status_code,
                message,
            },
            N8nError::NotFound(what) => BridgeError::Remote {
                status: 404,
                message: format!("Not found: {}", what),
            },
            N8nError::ParseError(msg) => BridgeError::Malformed(msg),
            N8nError::InvalidBaseUrl(msg) => {
                BridgeError::OperationFailed(format!("Invalid base URL: {}", msg))
            }
            N8nError::MissingHttpClient => BridgeError::NotAvailable("HttpClient".to_string()),
            N8nError::BridgeError(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = N8nError::ApiError {
            status_code: 500,
            message: "Internal error".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "n8n API error (status 500): Internal error"
        );
    }

    #[test]
    fn test_error_conversion_keeps_status() {
        let bridge_error: BridgeError = N8nError::NotFound("workflow wf1".to_string()).into();
        assert_eq!(bridge_error.status(), Some(404));

        let bridge_error: BridgeError = N8nError::ParseError("bad json".to_string()).into();
        assert!(matches!(bridge_error, BridgeError::Malformed(_)));
    }
}
