use thiserror::Error;

/// Error type for query and mutation operations.
///
/// Errors are stored on query state and shared between every observer of a
/// key, so the type is `Clone` and carries rendered messages rather than source
/// errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Fetch failed: {0}")]
    FetchError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    /// Non-2xx response without an application error body.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Non-2xx response whose body carried an error message.
    #[error("{message} (HTTP {status})")]
    Application { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Query '{0}' is disabled")]
    Disabled(String),

    #[error("Fetch task aborted: {0}")]
    Aborted(String),

    /// The key was removed from the cache while its fetch was in flight.
    #[error("Query '{0}' was cleared before its fetch settled")]
    Cleared(String),
}

impl QueryError {
    /// Transport-level or HTTP-status failure.
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::Http { .. })
    }

    /// The backend answered with an error payload.
    pub const fn is_application(&self) -> bool {
        matches!(self, Self::Application { .. })
    }

    /// HTTP status code, when the failure came from a response.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Application { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display() {
        let err = QueryError::FetchError("test error".to_string());
        assert_eq!(err.to_string(), "Fetch failed: test error");

        let err = QueryError::NetworkError("connection refused".to_string());
        assert_eq!(err.to_string(), "Network error: connection refused");

        let err = QueryError::Application {
            status: 422,
            message: "Property not found".to_string(),
        };
        assert_eq!(err.to_string(), "Property not found (HTTP 422)");
    }

    #[test]
    fn test_categories() {
        let http = QueryError::Http {
            status: 502,
            message: "Bad Gateway".to_string(),
        };
        assert!(http.is_network());
        assert!(!http.is_application());
        assert_eq!(http.status(), Some(502));

        let app = QueryError::Application {
            status: 400,
            message: "invalid".to_string(),
        };
        assert!(app.is_application());
        assert!(!app.is_network());

        assert_eq!(QueryError::Decode("eof".to_string()).status(), None);
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        assert!(matches!(QueryError::from(err), QueryError::Decode(_)));
    }
}
