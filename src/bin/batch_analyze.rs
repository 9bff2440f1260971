//! Extracts and scores a batch of SLIK reports already converted to text.
//!
//! Usage: `batch_analyze <report.txt>...`
//!
//! Prints one JSON document per input file, in argument order.

use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinSet;

use rust_slik_api::config::Config;
use rust_slik_api::orchestrator::SlikService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_slik_api=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        anyhow::bail!("usage: batch_analyze <report.txt>...");
    }

    let config = Config::from_env()?;
    let service = Arc::new(SlikService::from_config(&config)?);

    let mut tasks = JoinSet::new();
    for (idx, path) in paths.iter().cloned().enumerate() {
        let service = Arc::clone(&service);
        tasks.spawn(async move {
            let outcome = match tokio::fs::read_to_string(&path).await {
                Ok(text) => match service.process_and_analyze(&text).await {
                    Ok((extraction, analysis)) => json!({
                        "file": path,
                        "slik_data": extraction.report,
                        "analysis": analysis,
                        "warnings": extraction.warnings,
                    }),
                    Err(e) => json!({"file": path, "error": e.kind(), "message": e.to_string()}),
                },
                Err(e) => json!({"file": path, "error": "document_read", "message": e.to_string()}),
            };
            (idx, outcome)
        });
    }

    let mut results = Vec::with_capacity(paths.len());
    while let Some(joined) = tasks.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(idx, _)| *idx);

    let failures = results.iter().filter(|(_, r)| r.get("error").is_some()).count();
    for (_, result) in &results {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    tracing::info!(
        "Processed {} reports ({} failed)",
        results.len(),
        failures
    );

    Ok(())
}
