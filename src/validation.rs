//! Non-fatal data-quality findings and the cross-field consistency checks
//! that produce them.
//!
//! Nothing here rewrites a report. Checks only describe what looks wrong so
//! the caller can show it next to the extracted data.

use serde::{Deserialize, Serialize};

use crate::models::{SlikReport, MAX_PAYMENT_HISTORY_MONTHS};

/// Category of a [`ValidationWarning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A field had the wrong type or an out-of-range value and was set to null.
    CoercedToNull,
    /// `worst_quality` differs from the worst per-facility grade.
    InconsistentWorstQuality,
    /// A facility matures before it starts.
    DueDateBeforeStartDate,
    /// More than twelve months of payment history were reported.
    PaymentHistoryTooLong,
}

/// A recorded data-quality concern. Never aborts processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Path of the field, e.g. `facilities[0].outstanding`.
    pub field: String,
    pub kind: WarningKind,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(field: impl Into<String>, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Runs every cross-field check against a normalized report.
pub fn check_consistency(report: &SlikReport) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    warnings.extend(check_worst_quality(report));

    for (idx, facility) in report.facilities.iter().enumerate() {
        if let (Some(start), Some(due)) = (facility.start_date, facility.due_date) {
            if due < start {
                warnings.push(ValidationWarning::new(
                    format!("facilities[{idx}].due_date"),
                    WarningKind::DueDateBeforeStartDate,
                    format!("due date {due} is before start date {start}"),
                ));
            }
        }

        if facility.payment_history.len() > MAX_PAYMENT_HISTORY_MONTHS {
            warnings.push(ValidationWarning::new(
                format!("facilities[{idx}].payment_history"),
                WarningKind::PaymentHistoryTooLong,
                format!(
                    "{} entries reported, expected at most {}",
                    facility.payment_history.len(),
                    MAX_PAYMENT_HISTORY_MONTHS
                ),
            ));
        }
    }

    for warning in &warnings {
        tracing::warn!("⚠️  {}: {}", warning.field, warning.message);
    }
    warnings
}

/// Compares the reported worst grade with the worst facility grade.
///
/// Vacuous when no facility carries a grade. The reported value is left
/// untouched either way.
pub fn check_worst_quality(report: &SlikReport) -> Option<ValidationWarning> {
    let computed = report.computed_worst_quality()?;
    if report.worst_quality == Some(computed) {
        return None;
    }

    let reported = report
        .worst_quality
        .map(|g| g.to_string())
        .unwrap_or_else(|| "null".to_string());
    Some(ValidationWarning::new(
        "worst_quality",
        WarningKind::InconsistentWorstQuality,
        format!(
            "reported worst quality {} but worst facility quality is {}",
            reported, computed
        ),
    ))
}
