//! The structured-completion capability seam.
//!
//! Extraction and scoring both delegate their reasoning to an external
//! service that turns an instruction plus free text into JSON shaped like a
//! target schema. Implementations make no promise that the JSON actually
//! conforms; callers validate it.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AppError;

/// One structured-completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    /// Short identifier of the target shape ("slik_report", "credit_analysis").
    pub schema_name: &'a str,
    /// Fixed system instruction for the stage.
    pub instruction: &'a str,
    /// Per-call input text.
    pub input: &'a str,
    /// JSON Schema of the expected value.
    pub schema: &'a Value,
}

/// An external function that returns a value intended to conform to
/// `request.schema`.
///
/// Errors: `CapabilityError` for transport failures, `Timeout` when the call
/// did not finish in time, `SchemaConformanceError` when the reply is not
/// JSON at all.
#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Value, AppError>;
}
