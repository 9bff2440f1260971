use chrono::NaiveDate;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Metadata, NumberValidation, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::normalization::{normalize_quality, whole_number};

/// Inclusive range every credit score must fall in.
pub const CREDIT_SCORE_RANGE: RangeInclusive<i64> = 300..=850;

/// Payment histories longer than this are flagged.
pub const MAX_PAYMENT_HISTORY_MONTHS: usize = 12;

// ============ Report Models ============

/// SLIK collectibility grade, 1 (Lancar) through 5 (Macet).
///
/// Higher is worse. Serialized as a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualityGrade(u8);

impl QualityGrade {
    pub const CURRENT: QualityGrade = QualityGrade(1);
    pub const WORST: QualityGrade = QualityGrade(5);

    /// Returns `None` outside 1..=5.
    pub fn new(value: u8) -> Option<Self> {
        (1..=5).contains(&value).then_some(QualityGrade(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Indonesian name of the grade as printed on iDeb reports.
    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "Lancar",
            2 => "Dalam Perhatian Khusus",
            3 => "Kurang Lancar",
            4 => "Diragukan",
            _ => "Macet",
        }
    }
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

impl Serialize for QualityGrade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for QualityGrade {
    /// Accepts integers and the textual forms found in iDeb exports
    /// (`"2"`, `"Kol 2"`, `"Lancar"`).
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let grade = match &raw {
            Value::Number(n) => whole_number(n)
                .and_then(|v| u8::try_from(v).ok())
                .and_then(QualityGrade::new),
            Value::String(s) => normalize_quality(s),
            _ => None,
        };
        grade.ok_or_else(|| {
            serde::de::Error::custom(format!("invalid quality grade {}, expected 1-5", raw))
        })
    }
}

impl JsonSchema for QualityGrade {
    fn schema_name() -> String {
        "QualityGrade".to_string()
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::Integer.into()),
            number: Some(Box::new(NumberValidation {
                minimum: Some(1.0),
                maximum: Some(5.0),
                ..Default::default()
            })),
            metadata: Some(Box::new(Metadata {
                description: Some(
                    "Collectibility grade: 1 Lancar, 2 Dalam Perhatian Khusus, 3 Kurang Lancar, 4 Diragukan, 5 Macet"
                        .to_string(),
                ),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}

/// One month of a facility's payment history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PaymentHistoryEntry {
    /// Month label as printed on the report (e.g. "Jan 2024").
    pub month: Option<String>,
    /// Collectibility grade for that month.
    pub quality: Option<QualityGrade>,
    /// Days past due as of that month.
    pub days_past_due: Option<u32>,
}

/// A credit or financing facility reported by one institution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreditFacility {
    /// Name of the reporting bank or financial institution.
    pub reporter: Option<String>,
    /// Branch name.
    pub branch: Option<String>,
    /// Credit agreement number.
    pub agreement_number: Option<String>,
    /// Type of credit facility.
    pub facility_type: Option<String>,
    /// Credit limit in IDR.
    pub plafond: Option<f64>,
    /// Current outstanding balance in IDR.
    pub outstanding: Option<f64>,
    /// Start date of the facility (YYYY-MM-DD).
    pub start_date: Option<NaiveDate>,
    /// Maturity date of the facility (YYYY-MM-DD).
    pub due_date: Option<NaiveDate>,
    /// Interest rate as a fraction (0.125 for 12.5%).
    pub interest_rate: Option<f64>,
    /// Interest rate type (e.g. Fixed, Floating).
    pub interest_type: Option<String>,
    /// Usage type (e.g. Konsumsi, Modal Kerja).
    pub usage_type: Option<String>,
    /// Current collectibility grade.
    pub quality: Option<QualityGrade>,
    /// Current days past due.
    pub days_past_due: Option<u32>,
    /// Up to 12 months of payment history in report order.
    #[serde(default)]
    pub payment_history: Vec<PaymentHistoryEntry>,
}

/// A parsed SLIK iDeb debtor information report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SlikReport {
    /// SLIK report number.
    pub report_number: Option<String>,
    /// Date the report was issued (YYYY-MM-DD).
    pub report_date: Option<NaiveDate>,
    /// Reference number.
    pub reference_number: Option<String>,
    /// Operator who requested the report.
    pub operator: Option<String>,
    /// Name of the debtor.
    pub debtor_name: Option<String>,
    /// National ID (NIK) of the debtor.
    pub debtor_id: Option<String>,
    /// Gender of the debtor.
    pub gender: Option<String>,
    /// Place of birth.
    pub birth_place: Option<String>,
    /// Date of birth (YYYY-MM-DD).
    pub birth_date: Option<NaiveDate>,
    /// Complete address.
    pub address: Option<String>,
    /// Occupation.
    pub occupation: Option<String>,
    /// Workplace name.
    pub workplace: Option<String>,
    /// Total effective plafond in IDR.
    pub total_plafond: Option<f64>,
    /// Total outstanding balance in IDR.
    pub total_outstanding: Option<f64>,
    /// Worst collectibility grade across facilities, as reported.
    pub worst_quality: Option<QualityGrade>,
    /// Credit facilities in report order.
    #[serde(default)]
    pub facilities: Vec<CreditFacility>,
}

impl SlikReport {
    /// JSON schema used as the extraction target shape.
    pub fn schema() -> Value {
        let schema = schemars::schema_for!(SlikReport);
        serde_json::to_value(&schema).expect("schema is serializable")
    }

    /// Worst current grade across facilities, ignoring facilities without one.
    pub fn computed_worst_quality(&self) -> Option<QualityGrade> {
        self.facilities.iter().filter_map(|f| f.quality).max()
    }
}

// ============ Analysis Models ============

/// Overall risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            _ => Err(format!("'{}' is not one of Low, Medium, High", s)),
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A titled finding or recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisPoint {
    /// Short title of the factor or action.
    pub factor: String,
    /// Supporting detail referencing report data.
    pub detail: String,
}

/// Structured credit analysis of one `SlikReport`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Analysis {
    /// Credit score between 300 and 850.
    #[schemars(range(min = 300, max = 850))]
    pub credit_score: u16,
    /// Overall risk assessment.
    pub risk_level: RiskLevel,
    /// Key positive factors in the credit profile.
    pub key_strengths: Vec<AnalysisPoint>,
    /// Key risk factors or concerns.
    pub key_concerns: Vec<AnalysisPoint>,
    /// Payment patterns keyed by short category label.
    pub payment_behavior: BTreeMap<String, String>,
    /// Credit limit usage keyed by short category label.
    pub credit_utilization: BTreeMap<String, String>,
    /// Actionable recommendations.
    pub recommendations: Vec<AnalysisPoint>,
    /// Overall analysis summary.
    pub summary: String,
}

impl Analysis {
    /// JSON schema used as the scoring target shape.
    pub fn schema() -> Value {
        let schema = schemars::schema_for!(Analysis);
        serde_json::to_value(&schema).expect("schema is serializable")
    }
}
