//! Extraction pipeline: raw iDeb text to a normalized [`SlikReport`].
//!
//! The completion result is checked only for structure (objects and arrays
//! where the report shape needs them). Scalar fields go through the
//! normalization pass afterwards, where anything unusable becomes null and
//! is recorded as a [`ValidationWarning`].

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::completion::StructuredCompletion;
use crate::errors::AppError;
use crate::models::{CreditFacility, PaymentHistoryEntry, SlikReport};
use crate::normalization::{json_type_name, FieldNormalizer};
use crate::stage::{RetryPolicy, StageDefinition, StructuredCompletionStage};
use crate::validation::{check_consistency, ValidationWarning};

pub const EXTRACTION_STAGE: &str = "extraction";

const EXTRACTION_INSTRUCTION: &str = r#"You extract data from Indonesian SLIK (iDeb) debtor information reports.
The user message is the full text of one report, converted from PDF and possibly containing OCR noise.
Return one JSON object describing the report with these conventions:
- Monetary values are plain numbers in IDR: drop "Rp" and thousands separators.
- Interest rates are decimal fractions: 12.5% becomes 0.125.
- Dates use YYYY-MM-DD.
- Quality (Kualitas / Kolektibilitas) is an integer from 1 (Lancar) to 5 (Macet).
- Days past due (Jumlah Hari Tunggakan) is a non-negative integer.
- payment_history lists up to 12 months per facility, in the order printed on the report.
- worst_quality is the "Kualitas Terburuk" printed on the report; do not compute it.
- Any value not present in the text is null. Never invent data.
Keep each facility's payment history with that facility."#;

/// A normalized report and the data-quality findings made while building it.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    #[serde(flatten)]
    pub report: SlikReport,
    pub warnings: Vec<ValidationWarning>,
}

/// Structurally valid completion output, scalars still untyped.
#[derive(Debug, Clone)]
pub struct ReportDraft {
    fields: Map<String, Value>,
    facilities: Vec<FacilityDraft>,
}

#[derive(Debug, Clone)]
struct FacilityDraft {
    fields: Map<String, Value>,
    payment_history: Vec<Map<String, Value>>,
}

/// Turns raw report text into a [`SlikReport`] through the completion
/// capability, then normalizes and cross-checks it.
pub struct ExtractionPipeline {
    stage: StructuredCompletionStage<str, ReportDraft>,
}

impl ExtractionPipeline {
    pub fn new(capability: Arc<dyn StructuredCompletion>, retry: RetryPolicy) -> Self {
        let definition = StageDefinition {
            name: EXTRACTION_STAGE,
            schema_name: "slik_report",
            instruction: EXTRACTION_INSTRUCTION.to_string(),
            schema: SlikReport::schema(),
            render: |text: &str| Ok(text.to_string()),
            conform: conform_report,
        };
        Self {
            stage: StructuredCompletionStage::new(definition, capability, retry),
        }
    }

    /// Extracts one report. Empty text is a `DocumentReadError`; a result that
    /// stays structurally invalid after all retries is a
    /// `SchemaConformanceError`.
    pub async fn extract(&self, raw_text: &str) -> Result<Extraction, AppError> {
        if raw_text.trim().is_empty() {
            return Err(AppError::DocumentReadError(
                "Document produced no text".to_string(),
            ));
        }

        tracing::info!("Extracting SLIK report from {} chars of text", raw_text.len());
        let draft = self.stage.run(raw_text).await?;
        let Extraction { report, warnings } = finish_report(&draft);

        tracing::info!(
            "Extracted SLIK report: {} facilities, {} warnings",
            report.facilities.len(),
            warnings.len()
        );
        Ok(Extraction { report, warnings })
    }
}

/// Checks a report produced outside this pipeline, for example one a client
/// sends back for scoring. Structural violations are returned; scalar
/// problems become warnings exactly as they do after extraction.
pub fn review_report(value: Value) -> Result<Extraction, Vec<String>> {
    let draft = conform_report(value)?;
    Ok(finish_report(&draft))
}

fn finish_report(draft: &ReportDraft) -> Extraction {
    let (report, mut warnings) = normalize_report(draft);
    warnings.extend(check_consistency(&report));
    Extraction { report, warnings }
}

fn expect_object(path: String, value: Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("{}: expected object, got {}", path, json_type_name(&other))),
    }
}

/// Takes an array-valued field out of `fields`; missing or null is empty.
fn take_array(
    fields: &mut Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Vec<Value>, String> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(format!(
            "{}{}: expected array, got {}",
            path,
            key,
            json_type_name(&other)
        )),
    }
}

/// Structural conformance of an extraction result.
pub fn conform_report(value: Value) -> Result<ReportDraft, Vec<String>> {
    let mut fields = expect_object("report".to_string(), value).map_err(|e| vec![e])?;
    let mut violations = Vec::new();

    let items = take_array(&mut fields, "facilities", "").unwrap_or_else(|e| {
        violations.push(e);
        Vec::new()
    });

    let mut facilities = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let path = format!("facilities[{idx}]");
        let mut facility = match expect_object(path.clone(), item) {
            Ok(map) => map,
            Err(e) => {
                violations.push(e);
                continue;
            }
        };

        let entries = take_array(&mut facility, "payment_history", &format!("{path}."))
            .unwrap_or_else(|e| {
                violations.push(e);
                Vec::new()
            });
        let mut payment_history = Vec::with_capacity(entries.len());
        for (entry_idx, entry) in entries.into_iter().enumerate() {
            match expect_object(format!("{path}.payment_history[{entry_idx}]"), entry) {
                Ok(map) => payment_history.push(map),
                Err(e) => violations.push(e),
            }
        }

        facilities.push(FacilityDraft {
            fields: facility,
            payment_history,
        });
    }

    if violations.is_empty() {
        Ok(ReportDraft { fields, facilities })
    } else {
        Err(violations)
    }
}

/// Normalization pass over a structurally valid draft.
pub fn normalize_report(draft: &ReportDraft) -> (SlikReport, Vec<ValidationWarning>) {
    let mut n = FieldNormalizer::new();
    let f = &draft.fields;

    // A worst grade needs at least one facility to be the worst of.
    let mut worst_quality = n.quality("worst_quality", f.get("worst_quality"));
    if draft.facilities.is_empty() && worst_quality.is_some() {
        worst_quality = n.coerce(
            "worst_quality",
            "reported without any facility".to_string(),
        );
    }

    let report = SlikReport {
        report_number: n.text("report_number", f.get("report_number")),
        report_date: n.date("report_date", f.get("report_date")),
        reference_number: n.text("reference_number", f.get("reference_number")),
        operator: n.text("operator", f.get("operator")),
        debtor_name: n.text("debtor_name", f.get("debtor_name")),
        debtor_id: n.text("debtor_id", f.get("debtor_id")),
        gender: n.text("gender", f.get("gender")),
        birth_place: n.text("birth_place", f.get("birth_place")),
        birth_date: n.date("birth_date", f.get("birth_date")),
        address: n.text("address", f.get("address")),
        occupation: n.text("occupation", f.get("occupation")),
        workplace: n.text("workplace", f.get("workplace")),
        total_plafond: n.amount("total_plafond", f.get("total_plafond")),
        total_outstanding: n.amount("total_outstanding", f.get("total_outstanding")),
        worst_quality,
        facilities: draft
            .facilities
            .iter()
            .enumerate()
            .map(|(idx, facility)| normalize_facility(&mut n, idx, facility))
            .collect(),
    };

    (report, n.into_warnings())
}

fn normalize_facility(n: &mut FieldNormalizer, idx: usize, draft: &FacilityDraft) -> CreditFacility {
    let f = &draft.fields;
    let path = |key: &str| format!("facilities[{idx}].{key}");

    CreditFacility {
        reporter: n.text(&path("reporter"), f.get("reporter")),
        branch: n.text(&path("branch"), f.get("branch")),
        agreement_number: n.text(&path("agreement_number"), f.get("agreement_number")),
        facility_type: n.text(&path("facility_type"), f.get("facility_type")),
        plafond: n.amount(&path("plafond"), f.get("plafond")),
        outstanding: n.amount(&path("outstanding"), f.get("outstanding")),
        start_date: n.date(&path("start_date"), f.get("start_date")),
        due_date: n.date(&path("due_date"), f.get("due_date")),
        interest_rate: n.percentage(&path("interest_rate"), f.get("interest_rate")),
        interest_type: n.text(&path("interest_type"), f.get("interest_type")),
        usage_type: n.text(&path("usage_type"), f.get("usage_type")),
        quality: n.quality(&path("quality"), f.get("quality")),
        days_past_due: n.days(&path("days_past_due"), f.get("days_past_due")),
        payment_history: draft
            .payment_history
            .iter()
            .enumerate()
            .map(|(entry_idx, entry)| {
                let entry_path = |key: &str| format!("facilities[{idx}].payment_history[{entry_idx}].{key}");
                PaymentHistoryEntry {
                    month: n.text(&entry_path("month"), entry.get("month")),
                    quality: n.quality(&entry_path("quality"), entry.get("quality")),
                    days_past_due: n.days(&entry_path("days_past_due"), entry.get("days_past_due")),
                }
            })
            .collect(),
    }
}
