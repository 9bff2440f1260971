//! Normalization of raw report tokens into canonical values.
//!
//! The token functions are total: malformed input yields `None`, never a
//! panic or an error. [`FieldNormalizer`] applies them to loosely typed
//! completion output and records a [`ValidationWarning`] for every value it
//! has to drop.

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Number, Value};
use std::sync::OnceLock;

use crate::models::QualityGrade;
use crate::validation::{ValidationWarning, WarningKind};

fn currency_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:rp\.?|idr)").expect("currency regex compiles"))
}

fn per_annum_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s*(?:p\.?\s*a\.?|per\s*(?:tahun|annum))\s*$")
            .expect("per-annum regex compiles")
    })
}

fn named_month_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})[\s\-/.]+([A-Za-z]+)\.?[\s\-/.,]+(\d{4})$")
            .expect("date regex compiles")
    })
}

fn quality_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:kol(?:ektibilitas)?|kualitas|col)?\s*[-.:]?\s*(\d+)\b")
            .expect("quality regex compiles")
    })
}

fn days_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\d+)\s*(?:hari|days?)?$").expect("days regex compiles"))
}

/// Currency token to amount: `"Rp 1,234,500"` -> `1234500.0`.
///
/// Strips `Rp`/`Rp.`/`IDR`, whitespace and a trailing `,-`, then resolves
/// grouping versus decimal separators. Returns `None` when no digits remain
/// or anything other than digits and separators is left over. Negative
/// amounts are returned as such; rejecting them is the caller's policy.
pub fn normalize_currency(token: &str) -> Option<f64> {
    let trimmed = token.trim();
    let without_symbol = currency_prefix_re().replace(trimmed, "");
    let compact: String = without_symbol
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let body = compact.trim_end_matches(",-").trim_end_matches(".-");

    let (negative, digits) = match body.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    if !digits.chars().any(|c| c.is_ascii_digit())
        || !digits
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return None;
    }

    let value: f64 = canonical_number(digits)?.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Rewrites digits with `.`/`,` separators into a plain `1234.5` form.
fn canonical_number(digits: &str) -> Option<String> {
    let dots = digits.matches('.').count();
    let commas = digits.matches(',').count();

    let decimal_sep = match (dots, commas) {
        (0, 0) => None,
        (_, 0) => single_kind_decimal(digits, '.'),
        (0, _) => single_kind_decimal(digits, ','),
        _ => {
            let last = digits.rfind(['.', ','])?;
            let sep = digits[last..].chars().next()?;
            if digits.matches(sep).count() > 1 {
                return None;
            }
            Some(sep)
        }
    };

    let mut out = String::with_capacity(digits.len() + 2);
    for c in digits.chars() {
        if c.is_ascii_digit() {
            out.push(c);
        } else if Some(c) == decimal_sep {
            out.push('.');
        }
    }
    if out.starts_with('.') {
        out.insert(0, '0');
    }
    if out.ends_with('.') {
        out.push('0');
    }
    Some(out)
}

/// Decides whether the only separator kind present is a decimal point.
fn single_kind_decimal(digits: &str, sep: char) -> Option<char> {
    if digits.matches(sep).count() > 1 {
        return None;
    }
    let idx = digits.find(sep)?;
    let integer = &digits[..idx];
    let fraction = &digits[idx + 1..];
    if fraction.len() == 3 && !integer.is_empty() && integer != "0" {
        None
    } else {
        Some(sep)
    }
}

/// Percentage token to fraction: `"12.5%"` -> `0.125`.
///
/// Without a `%` sign, values above 1 are read as percentage points and
/// values in `[0, 1]` as fractions already, so the canonical output
/// normalizes to itself. Negative rates and rates above 100% are `None`.
pub fn normalize_percentage(token: &str) -> Option<f64> {
    let trimmed = per_annum_re().replace(token.trim(), "");
    let trimmed = trimmed.trim();
    match trimmed.strip_suffix('%') {
        Some(body) => {
            let points = parse_plain_number(body.trim())?;
            (0.0..=100.0).contains(&points).then(|| points / 100.0)
        }
        None => percentage_from_number(parse_plain_number(trimmed)?),
    }
}

/// Canonicalizes a bare numeric rate with the same rule as
/// [`normalize_percentage`].
pub fn percentage_from_number(value: f64) -> Option<f64> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        None
    } else if value > 1.0 {
        Some(value / 100.0)
    } else {
        Some(value)
    }
}

fn parse_plain_number(token: &str) -> Option<f64> {
    if token.is_empty()
        || !token
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',' || c == '-')
    {
        return None;
    }
    let normalized = if token.contains('.') {
        token.replace(',', "")
    } else {
        token.replace(',', ".")
    };
    normalized.parse().ok()
}

/// Date token to calendar date.
///
/// Accepts ISO dates (optionally followed by a time), `DD/MM/YYYY`,
/// `DD-MM-YYYY`, `DD.MM.YYYY`, `YYYY/MM/DD`, `YYYYMMDD` and `DD <month> YYYY`
/// with Indonesian or English month names.
pub fn normalize_date(token: &str) -> Option<NaiveDate> {
    let t = token.trim();

    if t.len() >= 10 && t.is_char_boundary(10) {
        let (head, tail) = t.split_at(10);
        if tail.is_empty() || tail.starts_with(['T', ' ']) {
            if let Ok(date) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
                return Some(date);
            }
        }
    }

    for format in ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(t, format) {
            return Some(date);
        }
    }

    if t.len() == 8 && t.chars().all(|c| c.is_ascii_digit()) {
        let year: i32 = t[..4].parse().ok()?;
        let month: u32 = t[4..6].parse().ok()?;
        let day: u32 = t[6..].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let caps = named_month_date_re().captures(t)?;
    let day: u32 = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Indonesian and English month names or their common abbreviations.
fn month_number(name: &str) -> Option<u32> {
    const PREFIXES: [(&str, u32); 19] = [
        ("jan", 1),
        ("feb", 2),
        ("peb", 2),
        ("mar", 3),
        ("apr", 4),
        ("mei", 5),
        ("may", 5),
        ("jun", 6),
        ("jul", 7),
        ("agu", 8),
        ("ags", 8),
        ("agt", 8),
        ("aug", 8),
        ("sep", 9),
        ("okt", 10),
        ("oct", 10),
        ("nov", 11),
        ("des", 12),
        ("dec", 12),
    ];
    let lower = name.to_lowercase();
    if lower.len() < 3 {
        return None;
    }
    PREFIXES
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|(_, month)| *month)
}

/// Quality token to grade: `"2"`, `"Kol 2"`, `"1 - Lancar"`, `"Macet"`.
pub fn normalize_quality(token: &str) -> Option<QualityGrade> {
    let lower = token.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    if let Some(caps) = quality_code_re().captures(&lower) {
        return caps[1].parse::<u8>().ok().and_then(QualityGrade::new);
    }

    // "kurang lancar" must be tested before "lancar".
    const NAMES: [(&str, u8); 6] = [
        ("kurang lancar", 3),
        ("dalam perhatian khusus", 2),
        ("dpk", 2),
        ("diragukan", 4),
        ("macet", 5),
        ("lancar", 1),
    ];
    NAMES
        .iter()
        .find(|(name, _)| lower.contains(name))
        .and_then(|(_, grade)| QualityGrade::new(*grade))
}

/// Days-past-due token: `"15"`, `"15 hari"`.
pub fn normalize_days_past_due(token: &str) -> Option<u32> {
    let caps = days_re().captures(token.trim())?;
    caps[1].parse().ok()
}

/// Non-negative integer value of a JSON number, allowing `2.0`.
pub(crate) fn whole_number(n: &Number) -> Option<u64> {
    n.as_u64().or_else(|| {
        n.as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f < u64::MAX as f64)
            .map(|f| f as u64)
    })
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Applies the token rules to untyped field values, collecting a warning
/// for every value coerced to null.
#[derive(Debug, Default)]
pub struct FieldNormalizer {
    warnings: Vec<ValidationWarning>,
}

impl FieldNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<ValidationWarning> {
        self.warnings
    }

    /// Records `field` as coerced to null and returns the null.
    pub fn coerce<T>(&mut self, field: &str, reason: String) -> Option<T> {
        tracing::warn!("Coerced {} to null: {}", field, reason);
        self.warnings.push(ValidationWarning::new(
            field,
            WarningKind::CoercedToNull,
            reason,
        ));
        None
    }

    /// Free text. Numbers and booleans are stringified.
    pub fn text(&mut self, field: &str, value: Option<&Value>) -> Option<String> {
        match value? {
            Value::Null => None,
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => {
                let reason = format!("expected text, got {}", json_type_name(other));
                self.coerce(field, reason)
            }
        }
    }

    /// Non-negative IDR amount.
    pub fn amount(&mut self, field: &str, value: Option<&Value>) -> Option<f64> {
        let parsed = match value? {
            Value::Null => return None,
            Value::Number(n) => n.as_f64(),
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => match normalize_currency(s) {
                Some(v) => Some(v),
                None => {
                    let reason = format!("unparseable amount '{}'", s.trim());
                    return self.coerce(field, reason);
                }
            },
            other => {
                let reason = format!("expected amount, got {}", json_type_name(other));
                return self.coerce(field, reason);
            }
        }?;

        if parsed < 0.0 {
            let reason = format!("negative amount {}", parsed);
            return self.coerce(field, reason);
        }
        Some(parsed)
    }

    /// Interest rate as a fraction in `[0, 1]`.
    pub fn percentage(&mut self, field: &str, value: Option<&Value>) -> Option<f64> {
        let (parsed, raw) = match value? {
            Value::Null => return None,
            Value::Number(n) => (n.as_f64().and_then(percentage_from_number), n.to_string()),
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => (normalize_percentage(s), s.trim().to_string()),
            other => {
                let reason = format!("expected percentage, got {}", json_type_name(other));
                return self.coerce(field, reason);
            }
        };
        match parsed {
            Some(rate) => Some(rate),
            None => {
                let reason = format!("invalid percentage '{}'", raw);
                self.coerce(field, reason)
            }
        }
    }

    /// Calendar date.
    pub fn date(&mut self, field: &str, value: Option<&Value>) -> Option<NaiveDate> {
        match value? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => match normalize_date(s) {
                Some(date) => Some(date),
                None => {
                    let reason = format!("unparseable date '{}'", s.trim());
                    self.coerce(field, reason)
                }
            },
            other => {
                let reason = format!("expected date string, got {}", json_type_name(other));
                self.coerce(field, reason)
            }
        }
    }

    /// Collectibility grade 1..=5.
    pub fn quality(&mut self, field: &str, value: Option<&Value>) -> Option<QualityGrade> {
        let (parsed, raw) = match value? {
            Value::Null => return None,
            Value::String(s) if s.trim().is_empty() => return None,
            Value::Number(n) => (
                whole_number(n)
                    .and_then(|v| u8::try_from(v).ok())
                    .and_then(QualityGrade::new),
                n.to_string(),
            ),
            Value::String(s) => (normalize_quality(s), s.trim().to_string()),
            other => {
                let reason = format!("expected quality grade, got {}", json_type_name(other));
                return self.coerce(field, reason);
            }
        };
        match parsed {
            Some(grade) => Some(grade),
            None => {
                let reason = format!("quality '{}' is not a grade between 1 and 5", raw);
                self.coerce(field, reason)
            }
        }
    }

    /// Non-negative day count.
    pub fn days(&mut self, field: &str, value: Option<&Value>) -> Option<u32> {
        let (parsed, raw) = match value? {
            Value::Null => return None,
            Value::String(s) if s.trim().is_empty() => return None,
            Value::Number(n) => (
                whole_number(n).and_then(|v| u32::try_from(v).ok()),
                n.to_string(),
            ),
            Value::String(s) => (normalize_days_past_due(s), s.trim().to_string()),
            other => {
                let reason = format!("expected day count, got {}", json_type_name(other));
                return self.coerce(field, reason);
            }
        };
        match parsed {
            Some(days) => Some(days),
            None => {
                let reason = format!("invalid days past due '{}'", raw);
                self.coerce(field, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_currency_grouping_styles() {
        assert_eq!(normalize_currency("Rp 1,234,500"), Some(1_234_500.0));
        assert_eq!(normalize_currency("Rp. 1.234.500,00"), Some(1_234_500.0));
        assert_eq!(normalize_currency("IDR 50.000"), Some(50_000.0));
        assert_eq!(normalize_currency("Rp 12.500.000,-"), Some(12_500_000.0));
        assert_eq!(normalize_currency("1,234,500.50"), Some(1_234_500.5));
        assert_eq!(normalize_currency("12,5"), Some(12.5));
        assert_eq!(normalize_currency("0,125"), Some(0.125));
        assert_eq!(normalize_currency("750000"), Some(750_000.0));
    }

    #[test]
    fn test_currency_malformed_is_none() {
        assert_eq!(normalize_currency("N/A"), None);
        assert_eq!(normalize_currency("-"), None);
        assert_eq!(normalize_currency("Rp"), None);
        assert_eq!(normalize_currency(""), None);
        assert_eq!(normalize_currency("12 juta"), None);
        assert_eq!(normalize_currency("1.234.567,89,1"), None);
    }

    #[test]
    fn test_currency_negative_is_reported_as_negative() {
        assert_eq!(normalize_currency("-Rp 500"), None);
        assert_eq!(normalize_currency("Rp -500"), Some(-500.0));
    }

    #[test]
    fn test_percentage() {
        assert_eq!(normalize_percentage("12.5%"), Some(0.125));
        assert_eq!(normalize_percentage("12,5 %"), Some(0.125));
        assert_eq!(normalize_percentage("9.75% p.a."), Some(0.0975));
        assert_eq!(normalize_percentage("0.125"), Some(0.125));
        assert_eq!(normalize_percentage("12.5"), Some(0.125));
        assert_eq!(normalize_percentage("abc%"), None);
        assert_eq!(normalize_percentage("150%"), None);
        assert_eq!(normalize_percentage("-3%"), None);
    }

    #[test]
    fn test_dates() {
        let expected = NaiveDate::from_ymd_opt(2023, 1, 15);
        assert_eq!(normalize_date("2023-01-15"), expected);
        assert_eq!(normalize_date("2023-01-15T00:00:00"), expected);
        assert_eq!(normalize_date("15/01/2023"), expected);
        assert_eq!(normalize_date("15-01-2023"), expected);
        assert_eq!(normalize_date("20230115"), expected);
        assert_eq!(normalize_date("15 Januari 2023"), expected);
        assert_eq!(normalize_date("15 Jan 2023"), expected);
        assert_eq!(
            normalize_date("17 Agustus 2020"),
            NaiveDate::from_ymd_opt(2020, 8, 17)
        );
        assert_eq!(normalize_date("1 Mei 2022"), NaiveDate::from_ymd_opt(2022, 5, 1));
        assert_eq!(normalize_date("31/02/2023"), None);
        assert_eq!(normalize_date("sometime"), None);
    }

    #[test]
    fn test_quality_tokens() {
        assert_eq!(normalize_quality("1"), QualityGrade::new(1));
        assert_eq!(normalize_quality("Kol 2"), QualityGrade::new(2));
        assert_eq!(normalize_quality("3 - Kurang Lancar"), QualityGrade::new(3));
        assert_eq!(normalize_quality("Kurang Lancar"), QualityGrade::new(3));
        assert_eq!(normalize_quality("Lancar"), QualityGrade::new(1));
        assert_eq!(normalize_quality("DPK"), QualityGrade::new(2));
        assert_eq!(normalize_quality("Macet"), QualityGrade::new(5));
        assert_eq!(normalize_quality("7"), None);
        assert_eq!(normalize_quality("unknown"), None);
    }

    #[test]
    fn test_days_tokens() {
        assert_eq!(normalize_days_past_due("15"), Some(15));
        assert_eq!(normalize_days_past_due("15 hari"), Some(15));
        assert_eq!(normalize_days_past_due("-"), None);
        assert_eq!(normalize_days_past_due("-4"), None);
    }

    #[test]
    fn test_field_normalizer_records_coercions() {
        let mut n = FieldNormalizer::new();

        assert_eq!(n.amount("plafond", Some(&json!("Rp 50,000,000"))), Some(50_000_000.0));
        assert_eq!(n.amount("outstanding", Some(&json!(-10))), None);
        assert_eq!(n.amount("total_plafond", Some(&json!("N/A"))), None);
        assert_eq!(n.text("branch", Some(&json!(["a"]))), None);
        assert_eq!(n.text("agreement_number", Some(&json!(12345))), Some("12345".to_string()));
        assert_eq!(n.quality("quality", Some(&json!(9))), None);
        assert_eq!(n.quality("facilities[0].quality", Some(&json!(2.0))), QualityGrade::new(2));
        assert_eq!(n.quality("facilities[1].quality", Some(&json!(2.5))), None);
        assert_eq!(n.days("days_past_due", Some(&json!(15.0))), Some(15));
        assert_eq!(n.percentage("interest_rate", Some(&json!(12.5))), Some(0.125));
        assert_eq!(n.date("start_date", Some(&json!(20230115))), None);

        let fields: Vec<&str> = n.warnings().iter().map(|w| w.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "outstanding",
                "total_plafond",
                "branch",
                "quality",
                "facilities[1].quality",
                "start_date"
            ]
        );
        assert!(n
            .into_warnings()
            .iter()
            .all(|w| w.kind == WarningKind::CoercedToNull));
    }

    #[test]
    fn test_field_normalizer_missing_and_null_are_silent() {
        let mut n = FieldNormalizer::new();
        assert_eq!(n.amount("plafond", None), None);
        assert_eq!(n.date("due_date", Some(&Value::Null)), None);
        assert_eq!(n.text("branch", Some(&json!("   "))), None);
        assert!(n.warnings().is_empty());
    }
}
