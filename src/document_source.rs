use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::errors::AppError;

/// An uploaded report document.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    /// Text uploads skip OCR.
    pub fn is_plain_text(&self) -> bool {
        let by_type = self
            .content_type
            .as_deref()
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with("text/plain"))
            .unwrap_or(false);
        by_type || self.file_name.to_ascii_lowercase().ends_with(".txt")
    }

    /// Short content hash used in logs instead of the document itself.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        hex::encode(&digest[..8])
    }
}

/// Converts an uploaded document into plain text.
#[async_trait]
pub trait DocumentTextSource: Send + Sync {
    async fn extract_text(&self, upload: &DocumentUpload) -> Result<String, AppError>;
}

/// Decodes a plain-text upload.
pub fn decode_plain_text(upload: &DocumentUpload) -> Result<String, AppError> {
    String::from_utf8(upload.bytes.clone()).map_err(|e| {
        AppError::DocumentReadError(format!("{} is not valid UTF-8: {}", upload.file_name, e))
    })
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    return_dict: ReturnDict,
}

#[derive(Debug, Deserialize)]
struct ReturnDict {
    result: ParseResult,
}

#[derive(Debug, Deserialize)]
struct ParseResult {
    #[serde(default)]
    blocks: Vec<LayoutBlock>,
}

#[derive(Debug, Deserialize)]
struct LayoutBlock {
    #[serde(default)]
    tag: String,
    #[serde(default)]
    sentences: Vec<String>,
    #[serde(default)]
    table_rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    cells: Vec<TableCell>,
    /// Present on `full_row` rows that span the table.
    cell_value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    cell_value: Option<Value>,
}

fn cell_text(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn flatten_blocks(blocks: &[LayoutBlock]) -> String {
    let mut lines = Vec::new();
    for block in blocks {
        if block.tag == "table" {
            for row in &block.table_rows {
                let line = if row.cells.is_empty() {
                    cell_text(&row.cell_value)
                } else {
                    row.cells
                        .iter()
                        .map(|cell| cell_text(&cell.cell_value))
                        .collect::<Vec<_>>()
                        .join(" | ")
                };
                if !line.trim().is_empty() {
                    lines.push(line);
                }
            }
        } else {
            let line = block.sentences.join(" ");
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
    }
    lines.join("\n")
}

/// Client for an LLMSherpa (nlm-ingestor) `parseDocument` endpoint.
pub struct LlmSherpaClient {
    client: reqwest::Client,
    api_url: String,
}

impl LlmSherpaClient {
    /// Creates a new `LlmSherpaClient`.
    ///
    /// # Arguments
    ///
    /// * `api_url` - The `parseDocument` URL, e.g. `http://localhost:5010/api/parseDocument?renderFormat=all`.
    pub fn new(api_url: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create LLMSherpa client: {}", e))
            })?;

        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl DocumentTextSource for LlmSherpaClient {
    async fn extract_text(&self, upload: &DocumentUpload) -> Result<String, AppError> {
        tracing::info!(
            "Parsing document {} ({} bytes) via LLMSherpa",
            upload.fingerprint(),
            upload.bytes.len()
        );

        let mut part = reqwest::multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone());
        if let Some(content_type) = &upload.content_type {
            part = part.mime_str(content_type).map_err(|e| {
                AppError::DocumentReadError(format!("Invalid content type '{}': {}", content_type, e))
            })?;
        }
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.api_url)
            .query(&[("applyOcr", "yes"), ("useNewIndentParser", "yes")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::DocumentReadError(format!("LLMSherpa request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::DocumentReadError(format!(
                "LLMSherpa returned {}: {}",
                status, error_text
            )));
        }

        let parsed: ParseResponse = response.json().await.map_err(|e| {
            AppError::DocumentReadError(format!("Failed to parse LLMSherpa response: {}", e))
        })?;

        let text = flatten_blocks(&parsed.return_dict.result.blocks);
        if text.trim().is_empty() {
            return Err(AppError::DocumentReadError(
                "LLMSherpa returned no text".to_string(),
            ));
        }

        tracing::info!(
            "✓ Document {} parsed: {} blocks, {} chars",
            upload.fingerprint(),
            parsed.return_dict.result.blocks.len(),
            text.len()
        );
        Ok(text)
    }
}
