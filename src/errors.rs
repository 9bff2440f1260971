use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// The document-text source could not produce text.
    DocumentReadError(String),
    /// The structured-completion call failed at the transport level
    /// (network, auth, quota, open circuit).
    CapabilityError(String),
    /// A completion result did not conform to the target shape.
    SchemaConformanceError {
        /// Stage that rejected the result ("extraction", "scoring").
        stage: String,
        /// One entry per offending field, prefixed with its path.
        violations: Vec<String>,
    },
    /// The external call timed out or was cancelled.
    Timeout(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Machine-readable kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::DocumentReadError(_) => "document_read",
            AppError::CapabilityError(_) => "capability",
            AppError::SchemaConformanceError { .. } => "schema_conformance",
            AppError::Timeout(_) => "timeout",
            AppError::BadRequest(_) => "bad_request",
            AppError::InternalError(_) => "internal",
            AppError::WithContext { source, .. } => source.kind(),
        }
    }

    /// Whether a completion stage may retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::CapabilityError(_)
            | AppError::SchemaConformanceError { .. }
            | AppError::Timeout(_) => true,
            AppError::WithContext { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Builds a conformance error for `stage`.
    pub fn conformance(stage: impl Into<String>, violations: Vec<String>) -> Self {
        AppError::SchemaConformanceError {
            stage: stage.into(),
            violations,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::DocumentReadError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::CapabilityError(_) | AppError::SchemaConformanceError { .. } => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::WithContext { source, .. } => source.status_code(),
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DocumentReadError(msg) => write!(f, "Document read error: {}", msg),
            AppError::CapabilityError(msg) => write!(f, "Completion service error: {}", msg),
            AppError::SchemaConformanceError { stage, violations } => write!(
                f,
                "Non-conformant {} result: {}",
                stage,
                violations.join("; ")
            ),
            AppError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Every body carries the machine-readable kind and a human-readable
    /// message. Upstream failures are logged at error level.
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AppError::BadRequest(msg) => tracing::warn!("Rejected request: {}", msg),
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source)
            }
            other => tracing::error!("{} error: {}", other.kind(), other),
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    ///
    /// Client-side timeouts stay distinguishable from other transport failures.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else {
            AppError::CapabilityError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalError(format!("JSON serialization failed: {}", err))
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Arguments
    ///
    /// * `context` - The context message to add.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Arguments
    ///
    /// * `f` - A closure that produces the context message.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_survives_context() {
        let err: Result<(), AppError> = Err(AppError::Timeout("slow".to_string()));
        let wrapped = err.context("Extraction attempt 3").unwrap_err();

        assert_eq!(wrapped.kind(), "timeout");
        assert!(wrapped.is_retryable());
        assert_eq!(wrapped.to_string(), "Extraction attempt 3: Timed out: slow");
    }

    #[test]
    fn test_document_errors_are_not_retryable() {
        assert!(!AppError::DocumentReadError("corrupt".to_string()).is_retryable());
        assert!(!AppError::BadRequest("empty".to_string()).is_retryable());
        assert!(AppError::conformance("scoring", vec!["credit_score".to_string()]).is_retryable());
    }

    #[test]
    fn test_conformance_message_lists_fields() {
        let err = AppError::conformance(
            "scoring",
            vec![
                "credit_score: 900 outside [300, 850]".to_string(),
                "risk_level: 'Severe' is not one of Low, Medium, High".to_string(),
            ],
        );

        let msg = err.to_string();
        assert!(msg.contains("scoring"));
        assert!(msg.contains("credit_score"));
        assert!(msg.contains("risk_level"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::DocumentReadError("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Timeout("x".into()).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::CapabilityError("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
