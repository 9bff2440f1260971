/// Unit tests for the token rules as used on real iDeb values
use chrono::NaiveDate;
use rust_slik_api::models::QualityGrade;
use rust_slik_api::normalization::{
    normalize_currency, normalize_date, normalize_percentage, normalize_quality, FieldNormalizer,
};
use serde_json::json;

#[test]
fn test_currency_examples() {
    assert_eq!(normalize_currency("Rp 1,234,500"), Some(1_234_500.0));
    assert_eq!(normalize_currency("Rp1.234.500,00"), Some(1_234_500.0));
    assert_eq!(normalize_currency("IDR 250.000,-"), Some(250_000.0));
    assert_eq!(normalize_currency("N/A"), None);
    assert_eq!(normalize_currency("-"), None);
}

#[test]
fn test_percentage_examples() {
    assert_eq!(normalize_percentage("12.5%"), Some(0.125));
    assert_eq!(normalize_percentage("12,5 % p.a."), Some(0.125));
    assert_eq!(normalize_percentage("0.125"), Some(0.125));
    assert_eq!(normalize_percentage("150%"), None);
}

#[test]
fn test_date_examples() {
    let expected = NaiveDate::from_ymd_opt(2024, 3, 15);
    assert_eq!(normalize_date("2024-03-15"), expected);
    assert_eq!(normalize_date("15/03/2024"), expected);
    assert_eq!(normalize_date("15 Maret 2024"), expected);
    assert_eq!(normalize_date("15 Mar 2024"), expected);
    assert_eq!(normalize_date("31/02/2024"), None);
}

#[test]
fn test_quality_examples() {
    assert_eq!(normalize_quality("1"), QualityGrade::new(1));
    assert_eq!(normalize_quality("Kol 2"), QualityGrade::new(2));
    assert_eq!(normalize_quality("3 - Kurang Lancar"), QualityGrade::new(3));
    assert_eq!(normalize_quality("Macet"), QualityGrade::new(5));
    assert_eq!(normalize_quality("0"), None);
}

#[test]
fn test_field_normalizer_keeps_going_after_bad_values() {
    let mut normalizer = FieldNormalizer::new();

    assert_eq!(normalizer.amount("plafond", Some(&json!("Rp 50,000,000"))), Some(50_000_000.0));
    assert_eq!(normalizer.amount("outstanding", Some(&json!("lima juta"))), None);
    assert_eq!(normalizer.quality("quality", Some(&json!(9))), None);
    assert_eq!(normalizer.text("agreement_number", Some(&json!(123456))), Some("123456".to_string()));

    let fields: Vec<&str> = normalizer.warnings().iter().map(|w| w.field.as_str()).collect();
    assert_eq!(fields, vec!["outstanding", "quality"]);
}
