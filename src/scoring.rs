//! Scoring pipeline: a normalized [`SlikReport`] to an [`Analysis`].

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::completion::StructuredCompletion;
use crate::errors::AppError;
use crate::models::{Analysis, AnalysisPoint, RiskLevel, SlikReport, CREDIT_SCORE_RANGE};
use crate::normalization::json_type_name;
use crate::stage::{RetryPolicy, StageDefinition, StructuredCompletionStage};

pub const SCORING_STAGE: &str = "scoring";

const SCORING_INSTRUCTION: &str = r#"You are a credit analyst reviewing one Indonesian SLIK (iDeb) report.
The user message is the report as JSON. Amounts are IDR, interest rates are fractions, quality grades run from 1 (Lancar) to 5 (Macet).
Assess the debtor and return one JSON object with:
- credit_score: an integer between 300 and 850, higher meaning more creditworthy.
- risk_level: exactly one of "Low", "Medium", "High".
- key_strengths and key_concerns: lists of {"factor", "detail"} objects grounded in the report.
- payment_behavior: short label to observation, covering timeliness, days past due and grade trends.
- credit_utilization: short label to observation, covering outstanding versus plafond.
- recommendations: list of {"factor", "detail"} actions for the debtor or the lender.
- summary: a short paragraph.
Base every statement on the report data only."#;

/// Scores a report through the completion capability.
pub struct ScoringPipeline {
    stage: StructuredCompletionStage<SlikReport, Analysis>,
}

impl ScoringPipeline {
    pub fn new(capability: Arc<dyn StructuredCompletion>, retry: RetryPolicy) -> Self {
        let definition = StageDefinition {
            name: SCORING_STAGE,
            schema_name: "credit_analysis",
            instruction: SCORING_INSTRUCTION.to_string(),
            schema: Analysis::schema(),
            render: render_report,
            conform: conform_analysis,
        };
        Self {
            stage: StructuredCompletionStage::new(definition, capability, retry),
        }
    }

    pub async fn analyze(&self, report: &SlikReport) -> Result<Analysis, AppError> {
        tracing::info!(
            "Scoring SLIK report with {} facilities",
            report.facilities.len()
        );
        let analysis = self.stage.run(report).await?;
        tracing::info!(
            "✓ Credit score {} ({})",
            analysis.credit_score,
            analysis.risk_level
        );
        Ok(analysis)
    }
}

fn render_report(report: &SlikReport) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Full conformance of a scoring result. Every violation is collected so a
/// retry log names all of them at once.
pub fn conform_analysis(value: Value) -> Result<Analysis, Vec<String>> {
    let mut fields = match value {
        Value::Object(map) => map,
        other => {
            return Err(vec![format!(
                "analysis: expected object, got {}",
                json_type_name(&other)
            )])
        }
    };
    let mut violations = Vec::new();

    let credit_score = conform_score(fields.remove("credit_score"))
        .map_err(|e| violations.push(e))
        .ok();
    let risk_level = conform_risk_level(fields.remove("risk_level"))
        .map_err(|e| violations.push(e))
        .ok();
    let key_strengths = conform_points("key_strengths", fields.remove("key_strengths"), &mut violations);
    let key_concerns = conform_points("key_concerns", fields.remove("key_concerns"), &mut violations);
    let recommendations = conform_points("recommendations", fields.remove("recommendations"), &mut violations);
    let payment_behavior = conform_map("payment_behavior", fields.remove("payment_behavior"), &mut violations);
    let credit_utilization = conform_map("credit_utilization", fields.remove("credit_utilization"), &mut violations);
    let summary = match fields.remove("summary") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::String(_)) => {
            violations.push("summary: must not be empty".to_string());
            None
        }
        None | Some(Value::Null) => {
            violations.push("summary: missing".to_string());
            None
        }
        Some(other) => {
            violations.push(format!("summary: expected string, got {}", json_type_name(&other)));
            None
        }
    };

    let (Some(credit_score), Some(risk_level), Some(summary)) = (credit_score, risk_level, summary)
    else {
        return Err(violations);
    };
    if !violations.is_empty() {
        return Err(violations);
    }

    Ok(Analysis {
        credit_score,
        risk_level,
        key_strengths,
        key_concerns,
        payment_behavior,
        credit_utilization,
        recommendations,
        summary,
    })
}

fn conform_score(value: Option<Value>) -> Result<u16, String> {
    let score = match value {
        None | Some(Value::Null) => return Err("credit_score: missing".to_string()),
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Some(other) => {
            return Err(format!(
                "credit_score: expected integer, got {}",
                json_type_name(&other)
            ))
        }
    };
    let score = score.ok_or_else(|| "credit_score: expected integer, got fraction".to_string())?;

    if !CREDIT_SCORE_RANGE.contains(&score) {
        return Err(format!(
            "credit_score: {} outside [{}, {}]",
            score,
            CREDIT_SCORE_RANGE.start(),
            CREDIT_SCORE_RANGE.end()
        ));
    }
    u16::try_from(score).map_err(|_| format!("credit_score: {} does not fit", score))
}

fn conform_risk_level(value: Option<Value>) -> Result<RiskLevel, String> {
    match value {
        None | Some(Value::Null) => Err("risk_level: missing".to_string()),
        Some(Value::String(s)) => s.parse().map_err(|e| format!("risk_level: {}", e)),
        Some(other) => Err(format!(
            "risk_level: expected string, got {}",
            json_type_name(&other)
        )),
    }
}

/// Text under the first of `keys` that holds a non-empty string.
fn text_field(item: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

/// A list of `{factor, detail}` items. `{action, suggestion}` and
/// `{title, detail}` are accepted as aliases. Both halves must be present;
/// a missing list is a violation, an empty one is not.
fn conform_points(
    field: &str,
    value: Option<Value>,
    violations: &mut Vec<String>,
) -> Vec<AnalysisPoint> {
    let items = match value {
        None | Some(Value::Null) => {
            violations.push(format!("{}: missing", field));
            return Vec::new();
        }
        Some(Value::Array(items)) => items,
        Some(other) => {
            violations.push(format!("{}: expected array, got {}", field, json_type_name(&other)));
            return Vec::new();
        }
    };

    let mut points = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let map = match item {
            Value::Object(map) => map,
            other => {
                violations.push(format!(
                    "{}[{}]: expected object, got {}",
                    field,
                    idx,
                    json_type_name(&other)
                ));
                continue;
            }
        };
        let factor = text_field(&map, &["factor", "action", "title"]);
        let detail = text_field(&map, &["detail", "suggestion", "description"]);
        match (factor, detail) {
            (Some(factor), Some(detail)) => points.push(AnalysisPoint { factor, detail }),
            (None, _) => violations.push(format!("{}[{}]: missing factor", field, idx)),
            (_, None) => violations.push(format!("{}[{}]: missing detail", field, idx)),
        }
    }
    points
}

/// A label-to-text map. Numbers and booleans are stringified and null
/// entries dropped; a missing map is a violation.
fn conform_map(
    field: &str,
    value: Option<Value>,
    violations: &mut Vec<String>,
) -> BTreeMap<String, String> {
    let entries = match value {
        None | Some(Value::Null) => {
            violations.push(format!("{}: missing", field));
            return BTreeMap::new();
        }
        Some(Value::Object(map)) => map,
        Some(other) => {
            violations.push(format!("{}: expected object, got {}", field, json_type_name(&other)));
            return BTreeMap::new();
        }
    };

    let mut out = BTreeMap::new();
    for (key, value) in entries {
        match value {
            Value::Null => {}
            Value::String(s) => {
                out.insert(key, s);
            }
            Value::Number(n) => {
                out.insert(key, n.to_string());
            }
            Value::Bool(b) => {
                out.insert(key, b.to_string());
            }
            other => violations.push(format!(
                "{}.{}: expected string, got {}",
                field,
                key,
                json_type_name(&other)
            )),
        }
    }
    out
}
