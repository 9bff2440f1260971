use std::sync::Arc;
use tracing::Instrument;

use crate::completion::StructuredCompletion;
use crate::config::Config;
use crate::document_source::{decode_plain_text, DocumentTextSource, DocumentUpload, LlmSherpaClient};
use crate::errors::{AppError, ResultExt};
use crate::extraction::{Extraction, ExtractionPipeline};
use crate::llm_client::ChatCompletionClient;
use crate::models::{Analysis, SlikReport};
use crate::scoring::ScoringPipeline;
use crate::stage::RetryPolicy;

/// Composes document reading, extraction and scoring.
///
/// Stateless between calls; share it behind an `Arc`.
pub struct SlikService {
    documents: Arc<dyn DocumentTextSource>,
    extraction: ExtractionPipeline,
    scoring: ScoringPipeline,
}

impl SlikService {
    pub fn new(
        documents: Arc<dyn DocumentTextSource>,
        extraction: ExtractionPipeline,
        scoring: ScoringPipeline,
    ) -> Self {
        Self {
            documents,
            extraction,
            scoring,
        }
    }

    /// Wires the LLMSherpa source and the chat-completion clients from config.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let documents = Arc::new(LlmSherpaClient::new(config.llmsherpa_api_url.clone())?);

        let extraction_client: Arc<dyn StructuredCompletion> =
            Arc::new(ChatCompletionClient::new(&config.extraction)?);
        let scoring_client: Arc<dyn StructuredCompletion> =
            Arc::new(ChatCompletionClient::new(&config.scoring)?);

        Ok(Self::new(
            documents,
            ExtractionPipeline::new(extraction_client, RetryPolicy::from_config(&config.extraction)),
            ScoringPipeline::new(scoring_client, RetryPolicy::from_config(&config.scoring)),
        ))
    }

    /// Plain-text uploads are decoded directly; anything else goes through
    /// the document source.
    pub async fn read_document(&self, upload: &DocumentUpload) -> Result<String, AppError> {
        if upload.bytes.is_empty() {
            return Err(AppError::DocumentReadError(format!(
                "{} is empty",
                upload.file_name
            )));
        }
        if upload.is_plain_text() {
            tracing::debug!("Document {} is plain text, skipping OCR", upload.fingerprint());
            return decode_plain_text(upload);
        }
        self.documents
            .extract_text(upload)
            .await
            .with_context(|| format!("Reading {}", upload.file_name))
    }

    pub async fn extract(&self, raw_text: &str) -> Result<Extraction, AppError> {
        self.extraction.extract(raw_text).await
    }

    pub async fn analyze(&self, report: &SlikReport) -> Result<Analysis, AppError> {
        self.scoring.analyze(report).await
    }

    /// Extraction then scoring. An extraction failure is returned unchanged
    /// and scoring is never called.
    pub async fn process_and_analyze(
        &self,
        raw_text: &str,
    ) -> Result<(Extraction, Analysis), AppError> {
        let extraction = self.extract(raw_text).await?;
        let analysis = self.analyze(&extraction.report).await?;
        Ok((extraction, analysis))
    }

    pub async fn process_document(&self, upload: &DocumentUpload) -> Result<Extraction, AppError> {
        let span = tracing::info_span!("process_document", document = %upload.fingerprint());
        async {
            let text = self.read_document(upload).await?;
            self.extract(&text).await
        }
        .instrument(span)
        .await
    }

    pub async fn process_and_analyze_document(
        &self,
        upload: &DocumentUpload,
    ) -> Result<(Extraction, Analysis), AppError> {
        let span = tracing::info_span!("process_and_analyze_document", document = %upload.fingerprint());
        async {
            let text = self.read_document(upload).await?;
            self.process_and_analyze(&text).await
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl DocumentTextSource for Unreachable {
        async fn extract_text(&self, _upload: &DocumentUpload) -> Result<String, AppError> {
            Err(AppError::DocumentReadError("source unreachable".to_string()))
        }
    }

    #[async_trait]
    impl StructuredCompletion for Unreachable {
        async fn complete(
            &self,
            _request: crate::completion::CompletionRequest<'_>,
        ) -> Result<serde_json::Value, AppError> {
            Err(AppError::CapabilityError("unreachable".to_string()))
        }
    }

    fn service() -> SlikService {
        let capability = Arc::new(Unreachable);
        SlikService::new(
            capability.clone(),
            ExtractionPipeline::new(capability.clone(), RetryPolicy::immediate(0)),
            ScoringPipeline::new(capability, RetryPolicy::immediate(0)),
        )
    }

    #[tokio::test]
    async fn test_plain_text_bypasses_document_source() {
        let upload = DocumentUpload::new("ideb.txt", None, b"Nama Debitur: BUDI".to_vec());
        assert_eq!(service().read_document(&upload).await.unwrap(), "Nama Debitur: BUDI");
    }

    #[tokio::test]
    async fn test_pdf_goes_through_document_source() {
        let upload = DocumentUpload::new("ideb.pdf", Some("application/pdf".into()), b"%PDF".to_vec());
        let err = service().read_document(&upload).await.unwrap_err();
        assert_eq!(err.kind(), "document_read");
    }

    #[tokio::test]
    async fn test_empty_upload_is_document_read_error() {
        let upload = DocumentUpload::new("ideb.pdf", None, Vec::new());
        let err = service().process_document(&upload).await.unwrap_err();
        assert_eq!(err.kind(), "document_read");
    }

    #[tokio::test]
    async fn test_empty_text_never_reaches_capability() {
        let err = service().extract("   \n").await.unwrap_err();
        assert_eq!(err.kind(), "document_read");
    }
}
