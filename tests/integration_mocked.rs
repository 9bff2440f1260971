/// Integration tests with mocked external APIs
/// Exercises the completion and LLMSherpa clients without hitting real services
use rust_slik_api::completion::{CompletionRequest, StructuredCompletion};
use rust_slik_api::config::{CompletionConfig, ResponseFormat};
use rust_slik_api::document_source::{DocumentTextSource, DocumentUpload, LlmSherpaClient};
use rust_slik_api::extraction::ExtractionPipeline;
use rust_slik_api::llm_client::ChatCompletionClient;
use rust_slik_api::stage::RetryPolicy;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create test config
fn create_test_config(base_url: String) -> CompletionConfig {
    CompletionConfig {
        api_key: "sk-test".to_string(),
        base_url,
        model: "qwen-turbo".to_string(),
        temperature: 0.0,
        request_timeout: Duration::from_secs(5),
        max_retries: 0,
        retry_backoff: Duration::ZERO,
        response_format: ResponseFormat::JsonObject,
    }
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

fn request<'a>(schema: &'a serde_json::Value) -> CompletionRequest<'a> {
    CompletionRequest {
        schema_name: "slik_report",
        instruction: "Extract the report.",
        input: "Nama Debitur: BUDI",
        schema,
    }
}

#[tokio::test]
async fn test_completion_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "qwen-turbo",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_reply(r#"{"debtor_name": "BUDI"}"#)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ChatCompletionClient::new(&create_test_config(mock_server.uri())).unwrap();
    let schema = json!({"type": "object"});
    let value = client.complete(request(&schema)).await.unwrap();

    assert_eq!(value["debtor_name"], "BUDI");
}

#[tokio::test]
async fn test_completion_fenced_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
            "```json\n{\"debtor_name\": \"SITI\"}\n```",
        )))
        .mount(&mock_server)
        .await;

    let client = ChatCompletionClient::new(&create_test_config(mock_server.uri())).unwrap();
    let schema = json!({"type": "object"});
    let value = client.complete(request(&schema)).await.unwrap();

    assert_eq!(value["debtor_name"], "SITI");
}

#[tokio::test]
async fn test_completion_server_error_is_capability_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream overloaded"))
        .mount(&mock_server)
        .await;

    let client = ChatCompletionClient::new(&create_test_config(mock_server.uri())).unwrap();
    let schema = json!({"type": "object"});
    let err = client.complete(request(&schema)).await.unwrap_err();

    assert_eq!(err.kind(), "capability");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_completion_prose_is_conformance_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_reply("I'm sorry, the document is unreadable.")),
        )
        .mount(&mock_server)
        .await;

    let client = ChatCompletionClient::new(&create_test_config(mock_server.uri())).unwrap();
    let schema = json!({"type": "object"});
    let err = client.complete(request(&schema)).await.unwrap_err();

    assert_eq!(err.kind(), "schema_conformance");
}

#[tokio::test]
async fn test_completion_slow_response_is_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_reply("{}"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(mock_server.uri());
    config.request_timeout = Duration::from_millis(200);
    let client = ChatCompletionClient::new(&config).unwrap();
    let schema = json!({"type": "object"});
    let err = client.complete(request(&schema)).await.unwrap_err();

    assert_eq!(err.kind(), "timeout");
}

#[tokio::test]
async fn test_extraction_pipeline_over_http() {
    let mock_server = MockServer::start().await;

    let report = json!({
        "debtor_name": "BUDI SANTOSO",
        "total_plafond": "Rp 50,000,000",
        "facilities": [{"plafond": 50000000, "quality": "Lancar"}]
    });
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(&report.to_string())))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let client = Arc::new(ChatCompletionClient::new(&config).unwrap());
    let pipeline = ExtractionPipeline::new(client, RetryPolicy::from_config(&config));

    let result = pipeline.extract("Nama Debitur: BUDI SANTOSO").await.unwrap();

    assert_eq!(result.report.total_plafond, Some(50_000_000.0));
    assert_eq!(result.report.facilities[0].quality.map(|q| q.value()), Some(1));
}

#[tokio::test]
async fn test_llmsherpa_parse_document() {
    let mock_server = MockServer::start().await;

    let mock_response = json!({
        "status": 200,
        "return_dict": {"result": {"blocks": [
            {"tag": "header", "level": 0, "sentences": ["INFORMASI DEBITUR"]},
            {"tag": "para", "level": 1, "sentences": ["Nama Debitur: BUDI SANTOSO"]},
            {"tag": "table", "level": 1, "table_rows": [
                {"type": "table_data_row", "cells": [
                    {"cell_value": "Plafon"}, {"cell_value": "Rp 50.000.000"}
                ]}
            ]}
        ]}}
    });

    Mock::given(method("POST"))
        .and(path("/api/parseDocument"))
        .and(query_param("renderFormat", "all"))
        .and(query_param("applyOcr", "yes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = LlmSherpaClient::new(format!(
        "{}/api/parseDocument?renderFormat=all",
        mock_server.uri()
    ))
    .unwrap();
    let upload = DocumentUpload::new(
        "ideb.pdf",
        Some("application/pdf".to_string()),
        b"%PDF-1.4 test".to_vec(),
    );

    let text = client.extract_text(&upload).await.unwrap();

    assert_eq!(
        text,
        "INFORMASI DEBITUR\nNama Debitur: BUDI SANTOSO\nPlafon | Rp 50.000.000"
    );
}

#[tokio::test]
async fn test_llmsherpa_error_is_document_read_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/parseDocument"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = LlmSherpaClient::new(format!("{}/api/parseDocument", mock_server.uri())).unwrap();
    let upload = DocumentUpload::new("ideb.pdf", None, b"%PDF".to_vec());

    let err = client.extract_text(&upload).await.unwrap_err();

    assert_eq!(err.kind(), "document_read");
}

#[tokio::test]
async fn test_llmsherpa_empty_result_is_document_read_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/parseDocument"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"return_dict": {"result": {"blocks": []}}})),
        )
        .mount(&mock_server)
        .await;

    let client = LlmSherpaClient::new(format!("{}/api/parseDocument", mock_server.uri())).unwrap();
    let upload = DocumentUpload::new("scan.pdf", None, b"%PDF".to_vec());

    let err = client.extract_text(&upload).await.unwrap_err();

    assert_eq!(err.kind(), "document_read");
}
