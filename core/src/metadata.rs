use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Applicant competition for an offer, ordered low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CompetitionLevel {
    #[serde(rename = "FAIBLE")]
    Faible,
    #[serde(rename = "MOYENNE")]
    Moyenne,
    #[serde(rename = "ÉLEVÉE")]
    Elevee,
}

impl CompetitionLevel {
    pub const ALL: [CompetitionLevel; 3] = [CompetitionLevel::Faible, CompetitionLevel::Moyenne, CompetitionLevel::Elevee];

    /// Ordinal assumed for records whose level is missing or unknown.
    pub const WORST_ORDINAL: u8 = 3;

    pub fn ordinal(self) -> u8 {
        match self {
            CompetitionLevel::Faible => 1,
            CompetitionLevel::Moyenne => 2,
            CompetitionLevel::Elevee => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CompetitionLevel::Faible => "FAIBLE",
            CompetitionLevel::Moyenne => "MOYENNE",
            CompetitionLevel::Elevee => "ÉLEVÉE",
        }
    }

    /// Matches a label after NFC normalization and uppercasing, so decomposed
    /// accents and lowercase input resolve. Unknown labels yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let norm = raw.trim().nfc().collect::<String>().to_uppercase();
        match norm.as_str() {
            "FAIBLE" => Some(CompetitionLevel::Faible),
            "MOYENNE" => Some(CompetitionLevel::Moyenne),
            "ÉLEVÉE" | "ELEVEE" => Some(CompetitionLevel::Elevee),
            _ => None,
        }
    }
}

impl fmt::Display for CompetitionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metadata attached to one corpus record.
///
/// Every field is optional; the filter and statistics modules each apply
/// their own default when a field is `None`. Integers that arrived as a
/// sentinel such as "non spécifié" are stored as `None`, while `start_date`
/// keeps the raw text so the lexicographic predicate sees it unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferMetadata {
    pub offer_reference: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub sector: Option<String>,
    pub duration_months: Option<i64>,
    pub salary_eur: Option<i64>,
    pub start_date: Option<String>,
    pub competition_level: Option<CompetitionLevel>,
    pub application_rate: Option<f64>,
    pub candidates_count: Option<i64>,
    pub views_count: Option<i64>,
    pub contact_email: Option<String>,
    pub chunk_type: Option<String>,
    pub chunk_id: Option<String>,
    /// Any other scalar field seen on ingest, stringified.
    pub extra: BTreeMap<String, String>,
}

/// A borrowed view of one metadata field, used by backends that address
/// fields by name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetaValue<'a> {
    Text(&'a str),
    Int(i64),
    Float(f64),
}

impl OfferMetadata {
    /// Builds metadata from the loose JSON object produced by the upstream chunker.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| RagError::invalid(format!("metadata must be a JSON object, got {value}")))?;
        let mut meta = OfferMetadata::default();
        for (key, v) in obj {
            match key.as_str() {
                "offer_reference" => meta.offer_reference = text(v),
                "title" => meta.title = text(v),
                "company" => meta.company = text(v),
                "country" => meta.country = text(v),
                "city" => meta.city = text(v),
                "sector" => meta.sector = text(v),
                "duration_months" => meta.duration_months = integer(v),
                "salary_eur" => meta.salary_eur = integer(v),
                "start_date" => meta.start_date = text(v),
                "competition_level" => meta.competition_level = text(v).and_then(|s| CompetitionLevel::parse(&s)),
                "application_rate" => meta.application_rate = number(v),
                "candidates_count" => meta.candidates_count = integer(v),
                "views_count" => meta.views_count = integer(v),
                "contact_email" => meta.contact_email = text(v),
                "chunk_type" => meta.chunk_type = text(v),
                "chunk_id" => meta.chunk_id = text(v),
                _ => {
                    if let Some(s) = text(v) {
                        meta.extra.insert(key.clone(), s);
                    }
                }
            }
        }
        Ok(meta)
    }

    /// Looks a field up by its metadata name. Unknown names fall through to `extra`.
    pub fn field(&self, name: &str) -> Option<MetaValue<'_>> {
        match name {
            "offer_reference" => text_field(&self.offer_reference),
            "title" => text_field(&self.title),
            "company" => text_field(&self.company),
            "country" => text_field(&self.country),
            "city" => text_field(&self.city),
            "sector" => text_field(&self.sector),
            "duration_months" => self.duration_months.map(MetaValue::Int),
            "salary_eur" => self.salary_eur.map(MetaValue::Int),
            "start_date" => text_field(&self.start_date),
            "competition_level" => self.competition_level.map(|c| MetaValue::Text(c.label())),
            "application_rate" => self.application_rate.map(MetaValue::Float),
            "candidates_count" => self.candidates_count.map(MetaValue::Int),
            "views_count" => self.views_count.map(MetaValue::Int),
            "contact_email" => text_field(&self.contact_email),
            "chunk_type" => text_field(&self.chunk_type),
            "chunk_id" => text_field(&self.chunk_id),
            other => self.extra.get(other).map(|v| MetaValue::Text(v.as_str())),
        }
    }
}

fn text_field(o: &Option<String>) -> Option<MetaValue<'_>> {
    o.as_deref().map(MetaValue::Text)
}

fn text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

// Sentinel text ("non spécifié", "unspecified", ...) becomes None.
fn integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn competition_level_parses_variants() {
        assert_eq!(CompetitionLevel::parse("ÉLEVÉE"), Some(CompetitionLevel::Elevee));
        // decomposed E + combining acute accent
        assert_eq!(CompetitionLevel::parse("E\u{301}LEVE\u{301}E"), Some(CompetitionLevel::Elevee));
        assert_eq!(CompetitionLevel::parse("moyenne"), Some(CompetitionLevel::Moyenne));
        assert_eq!(CompetitionLevel::parse("N/A"), None);
        assert!(CompetitionLevel::Faible < CompetitionLevel::Elevee);
    }

    #[test]
    fn from_json_handles_sentinels_and_extras() {
        let meta = OfferMetadata::from_json(&json!({
            "country": "ALLEMAGNE",
            "duration_months": "non spécifié",
            "salary_eur": 2850,
            "start_date": "2025-09-01T00:00:00",
            "competition_level": "Faible",
            "application_rate": "12.5%",
            "chunk_id": 7,
            "organization_type": "Grand groupe"
        }))
        .unwrap();
        assert_eq!(meta.country.as_deref(), Some("ALLEMAGNE"));
        assert_eq!(meta.duration_months, None);
        assert_eq!(meta.salary_eur, Some(2850));
        assert_eq!(meta.start_date.as_deref(), Some("2025-09-01T00:00:00"));
        assert_eq!(meta.competition_level, Some(CompetitionLevel::Faible));
        assert_eq!(meta.application_rate, Some(12.5));
        assert_eq!(meta.chunk_id.as_deref(), Some("7"));
        assert_eq!(meta.extra.get("organization_type").map(String::as_str), Some("Grand groupe"));
        assert_eq!(meta.field("organization_type"), Some(MetaValue::Text("Grand groupe")));
        assert_eq!(meta.field("salary_eur"), Some(MetaValue::Int(2850)));
    }

    #[test]
    fn from_json_rejects_non_objects() {
        assert!(matches!(OfferMetadata::from_json(&json!([1, 2])), Err(RagError::InvalidArgument(_))));
    }
}
