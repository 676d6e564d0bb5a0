//! Error types for the provider.

use thiserror::Error;

/// Errors surfaced by the Dynatrace configuration API adapter.
///
/// Each variant keeps the operation URL and, where available, the HTTP status
/// and vendor response body, so the cause stays retrievable for logs and
/// tooling while the rendered message stays short.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, TLS, connection refused).
    #[error("request to {url} failed: {source}")]
    Http {
        /// The request URL.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status.
    #[error("Dynatrace API returned {status} for {url}")]
    Status {
        /// The HTTP status code.
        status: reqwest::StatusCode,
        /// The request URL.
        url: String,
        /// The vendor error body, verbatim.
        body: String,
    },

    /// The response body could not be decoded into the expected struct.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// The request URL.
        url: String,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// The HTTP status of the failure, if the API produced one.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http { source, .. } => source.status(),
            Self::Decode { .. } => None,
        }
    }

    /// Whether the failure was a remote 404 for the requested entity.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(reqwest::StatusCode::NOT_FOUND)
    }
}

/// Errors that can occur while handling a provider operation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal provider error occurred.
    #[error("Provider error: {0}")]
    Internal(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred while writing state.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The Dynatrace API call failed.
    #[error("Unable to reach the Dynatrace environment or authenticate the API token: {0}")]
    Api(#[from] ApiError),
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => tonic::Status::not_found(msg),
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Internal(msg) => tonic::Status::internal(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::Transport(err) => {
                tonic::Status::unavailable(format!("Transport error: {}", err))
            },
            ProviderError::Api(err) => tonic::Status::unavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("resource-123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: resource-123");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::UnknownResource("custom_resource".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: custom_resource");
    }

    #[test]
    fn test_error_to_status() {
        let err = ProviderError::NotFound("test".to_string());
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let err = ProviderError::Validation("test".to_string());
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let err = ProviderError::Configuration("test".to_string());
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);
    }

    #[test]
    fn test_api_error_status_retrievable() {
        let err = ApiError::Status {
            status: reqwest::StatusCode::NOT_FOUND,
            url: "https://env.example.com/api/config/v1/managementZones/abc".to_string(),
            body: r#"{"error":{"code":404}}"#.to_string(),
        };
        assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
        assert!(err.is_not_found());

        let err = ApiError::Status {
            status: reqwest::StatusCode::UNAUTHORIZED,
            url: "https://env.example.com/api/config/v1/managementZones".to_string(),
            body: String::new(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_api_error_wraps_into_provider_error() {
        let api = ApiError::Status {
            status: reqwest::StatusCode::BAD_REQUEST,
            url: "https://env.example.com/api/config/v1/alertingProfiles".to_string(),
            body: "bad request".to_string(),
        };
        let err: ProviderError = api.into();
        let rendered = format!("{}", err);
        assert!(rendered.contains("Unable to reach the Dynatrace environment"));
        assert!(rendered.contains("400"));

        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }
}
