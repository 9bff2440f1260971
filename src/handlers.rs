use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::document_source::DocumentUpload;
use crate::errors::AppError;
use crate::extraction::{review_report, Extraction};
use crate::models::{Analysis, SlikReport};
use crate::orchestrator::SlikService;
use crate::validation::ValidationWarning;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Document reading, extraction and scoring.
    pub service: Arc<SlikService>,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
}

/// Response of `POST /analyze-slik`.
#[derive(Debug, Serialize)]
pub struct AnalyzeSlikResponse {
    pub slik_data: SlikReport,
    pub analysis: Analysis,
    pub warnings: Vec<ValidationWarning>,
}

/// Builds the SLIK routes with their state.
///
/// Docs, rate limiting, tracing and CORS are layered on by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/process-slik", post(process_slik))
        .route("/analyze-slik", post(analyze_slik))
        .route("/analyze-json", post(analyze_json))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Health check endpoint.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-slik-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /
///
/// Lists the available endpoints.
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "SLIK iDeb extraction and credit scoring API",
        "endpoints": {
            "POST /process-slik": "Upload a SLIK PDF (multipart field 'file') and get the extracted report",
            "POST /analyze-slik": "Upload a SLIK PDF and get the extracted report with its credit analysis",
            "POST /analyze-json": "Score an already extracted report sent as {\"slik_data\": {...}}",
            "GET /health": "Health check",
            "GET /docs": "Swagger UI"
        }
    }))
}

/// Reads the `file` field of a multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<DocumentUpload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read uploaded file: {}", e)))?;

        return Ok(DocumentUpload::new(file_name, content_type, bytes.to_vec()));
    }

    Err(AppError::BadRequest(
        "Multipart field 'file' is required".to_string(),
    ))
}

/// POST /process-slik
///
/// Extracts a `SlikReport` from an uploaded iDeb document.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `multipart` - Multipart body with the document in field `file`.
///
/// # Returns
///
/// * `Result<Json<Extraction>, AppError>` - The report fields plus `warnings`, or an error.
pub async fn process_slik(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Extraction>, AppError> {
    let span = tracing::info_span!("process_slik", request_id = %Uuid::new_v4());
    async move {
        let upload = read_upload(multipart).await?;
        tracing::info!("POST /process-slik - {} bytes", upload.bytes.len());

        let extraction = state.service.process_document(&upload).await?;
        Ok(Json(extraction))
    }
    .instrument(span)
    .await
}

/// POST /analyze-slik
///
/// Extracts a `SlikReport` from an uploaded document and scores it.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `multipart` - Multipart body with the document in field `file`.
///
/// # Returns
///
/// * `Result<Json<AnalyzeSlikResponse>, AppError>` - Report, analysis and warnings, or an error.
pub async fn analyze_slik(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<AnalyzeSlikResponse>, AppError> {
    let span = tracing::info_span!("analyze_slik", request_id = %Uuid::new_v4());
    async move {
        let upload = read_upload(multipart).await?;
        tracing::info!("POST /analyze-slik - {} bytes", upload.bytes.len());

        let (extraction, analysis) = state.service.process_and_analyze_document(&upload).await?;
        Ok(Json(AnalyzeSlikResponse {
            slik_data: extraction.report,
            analysis,
            warnings: extraction.warnings,
        }))
    }
    .instrument(span)
    .await
}

/// POST /analyze-json
///
/// Scores a report that was extracted earlier. The report is normalized
/// and cross-checked again before scoring; a structurally invalid one is a
/// 400.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `body` - `{"slik_data": <SlikReport>}`.
///
/// # Returns
///
/// * `Result<Json<Analysis>, AppError>` - The analysis or an error.
pub async fn analyze_json(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Analysis>, AppError> {
    let span = tracing::info_span!("analyze_json", request_id = %Uuid::new_v4());
    async move {
        let slik_data = body
            .get("slik_data")
            .cloned()
            .ok_or_else(|| AppError::BadRequest("Field 'slik_data' is required".to_string()))?;
        let Extraction { report, warnings } = review_report(slik_data).map_err(|violations| {
            AppError::BadRequest(format!("Invalid slik_data: {}", violations.join("; ")))
        })?;
        tracing::info!(
            "POST /analyze-json - {} facilities, {} warnings",
            report.facilities.len(),
            warnings.len()
        );

        let analysis = state.service.analyze(&report).await?;
        Ok(Json(analysis))
    }
    .instrument(span)
    .await
}
