//! SLIK iDeb Extraction and Scoring Library
//!
//! Turns Indonesian SLIK "iDeb" credit-bureau reports into a normalized,
//! schema-conformant [`models::SlikReport`] and scores that report into a
//! structured [`models::Analysis`]. Both steps delegate their reasoning to an
//! external structured-completion service and validate whatever it returns.
//!
//! # Modules
//!
//! - `api`: HTTP layer.
//! - `core`: Pipelines, models, normalization and validation.
//! - `integrations`: External service clients (completion service, LLMSherpa).
//! - `circuit_breaker`: Circuit breaker for completion calls.
//! - `completion`: Structured-completion capability trait.
//! - `config`: Configuration management.
//! - `document_source`: Document-to-text sources.
//! - `errors`: Error handling types.
//! - `extraction`: Raw text to `SlikReport`.
//! - `handlers`: HTTP request handlers.
//! - `llm_client`: OpenAI-compatible chat-completion client.
//! - `models`: Domain models and their JSON schemas.
//! - `normalization`: Currency, percentage, date and grade token rules.
//! - `orchestrator`: `SlikService`, composing the stages.
//! - `scoring`: `SlikReport` to `Analysis`.
//! - `stage`: Generic retrying structured-completion stage.
//! - `validation`: Cross-field consistency checks and warnings.

pub mod api;
pub mod core;
pub mod integrations;

pub mod circuit_breaker;
pub mod completion;
pub mod config;
pub mod document_source;
pub mod errors;
pub mod extraction;
pub mod handlers;
pub mod llm_client;
pub mod models;
pub mod normalization;
pub mod orchestrator;
pub mod scoring;
pub mod stage;
pub mod validation;
