//! Structured predicates over record metadata.
//!
//! Two independent paths live here and are kept apart on purpose:
//!
//! * [`FilterSpec`] / [`filter`]: the generic spec path. Start dates are
//!   compared as raw strings, which is only correct for zero-padded
//!   `YYYY-MM-DD` prefixes.
//! * [`DateRange`] / [`filter_by_date_range`]: the corpus-level path. Start
//!   dates are parsed into calendar dates and records whose date does not
//!   parse are dropped.
//!
//! Missing metadata takes the worst-case default for each bound: it fails a
//! "min" bound and only passes a "max" bound that is at least as permissive as
//! the default.

use crate::corpus::{Corpus, GlobalIndex};
use crate::dates::parse_calendar_date;
use crate::error::{RagError, Result};
use crate::metadata::{CompetitionLevel, OfferMetadata};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::Date;

pub const MISSING_MAX_DURATION_MONTHS: i64 = 999;
pub const MISSING_MAX_SALARY_EUR: i64 = 999_999;
pub const MISSING_START_DATE_AFTER: &str = "1900-01-01";
pub const MISSING_START_DATE_BEFORE: &str = "2100-01-01";
pub const MISSING_MAX_APPLICATION_RATE: f64 = 100.0;

/// Declarative constraints narrowing the candidate set. Absent keys impose no
/// constraint; present keys combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_duration_months: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_months: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countries: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cities: Option<Vec<String>>,
    /// Substring match against the record's sector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sectors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_salary_eur: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_salary_eur: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_type: Option<String>,
    #[serde(default, deserialize_with = "competition_level", skip_serializing_if = "Option::is_none")]
    pub max_competition_level: Option<CompetitionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_application_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_application_rate: Option<f64>,
}

fn competition_level<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<CompetitionLevel>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    raw.map(|s| CompetitionLevel::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("unknown competition level {s:?}"))))
        .transpose()
}

impl FilterSpec {
    /// Parses a JSON object of filter keys. Unknown keys and wrongly typed
    /// values are rejected so a typo cannot silently disable a constraint.
    pub fn from_json(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Self::deserialize(value).map_err(|e| RagError::invalid(format!("filter specification: {e}")))
    }

    pub fn is_empty(&self) -> bool { *self == Self::default() }

    pub fn matches(&self, m: &OfferMetadata) -> bool {
        if let Some(min) = self.min_duration_months {
            if m.duration_months.unwrap_or(0) < min { return false; }
        }
        if let Some(max) = self.max_duration_months {
            if m.duration_months.unwrap_or(MISSING_MAX_DURATION_MONTHS) > max { return false; }
        }
        if !member(&self.countries, &m.country) || !member(&self.cities, &m.city) || !member(&self.companies, &m.company) {
            return false;
        }
        if let Some(sectors) = &self.sectors {
            let sector = m.sector.as_deref().unwrap_or("");
            if !sectors.iter().any(|s| sector.contains(s.as_str())) { return false; }
        }
        if let Some(min) = self.min_salary_eur {
            if m.salary_eur.unwrap_or(0) < min { return false; }
        }
        if let Some(max) = self.max_salary_eur {
            if m.salary_eur.unwrap_or(MISSING_MAX_SALARY_EUR) > max { return false; }
        }
        // raw string comparison, see module docs
        if let Some(after) = &self.start_date_after {
            if m.start_date.as_deref().unwrap_or(MISSING_START_DATE_AFTER) < after.as_str() { return false; }
        }
        if let Some(before) = &self.start_date_before {
            if m.start_date.as_deref().unwrap_or(MISSING_START_DATE_BEFORE) > before.as_str() { return false; }
        }
        if let Some(chunk_type) = &self.chunk_type {
            if m.chunk_type.as_deref() != Some(chunk_type.as_str()) { return false; }
        }
        if let Some(max) = self.max_competition_level {
            let level = m.competition_level.map_or(CompetitionLevel::WORST_ORDINAL, CompetitionLevel::ordinal);
            if level > max.ordinal() { return false; }
        }
        if let Some(min) = self.min_application_rate {
            if m.application_rate.unwrap_or(0.0) < min { return false; }
        }
        if let Some(max) = self.max_application_rate {
            if m.application_rate.unwrap_or(MISSING_MAX_APPLICATION_RATE) > max { return false; }
        }
        true
    }
}

fn member(set: &Option<Vec<String>>, value: &Option<String>) -> bool {
    match set {
        None => true,
        Some(set) => value.as_ref().map_or(false, |v| set.contains(v)),
    }
}

/// Inclusive calendar-date bounds on `start_date`, used by the parsed-date path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start_date_min: Option<Date>,
    pub start_date_max: Option<Date>,
}

/// Unparsed date bounds as they arrive from JSON or the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateBounds {
    #[serde(default)]
    pub start_date_min: Option<String>,
    #[serde(default)]
    pub start_date_max: Option<String>,
}

impl DateBounds {
    pub fn to_range(&self) -> Result<DateRange> {
        DateRange::parse(self.start_date_min.as_deref(), self.start_date_max.as_deref())
    }
}

impl DateRange {
    pub fn parse(min: Option<&str>, max: Option<&str>) -> Result<Self> {
        let bound = |raw: Option<&str>| {
            raw.map(|s| parse_calendar_date(s).map_err(|_| RagError::invalid(format!("malformed date bound {s:?}"))))
                .transpose()
        };
        Ok(Self { start_date_min: bound(min)?, start_date_max: bound(max)? })
    }

    pub fn is_unbounded(&self) -> bool { self.start_date_min.is_none() && self.start_date_max.is_none() }

    /// Records without a parsable start date never match a bounded range.
    pub fn contains(&self, m: &OfferMetadata) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(raw) = m.start_date.as_deref() else { return false };
        let date = match parse_calendar_date(raw) {
            Ok(d) => d,
            Err(err) => {
                tracing::debug!(%err, "excluding record with unparsable start date");
                return false;
            }
        };
        self.start_date_min.map_or(true, |min| date >= min) && self.start_date_max.map_or(true, |max| date <= max)
    }
}

/// Records that survived a filter, as views into the corpus in original order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredView<'a> {
    pub embeddings: Vec<&'a [f32]>,
    pub metadata: Vec<&'a OfferMetadata>,
    pub contents: Vec<&'a str>,
    /// Strictly increasing; same length as the three arrays above.
    pub global_indices: Vec<GlobalIndex>,
}

impl<'a> FilteredView<'a> {
    pub fn all(corpus: &'a Corpus) -> Self {
        Self::from_predicate(corpus, |_| true)
    }

    fn from_predicate(corpus: &'a Corpus, mut keep: impl FnMut(&OfferMetadata) -> bool) -> Self {
        let mut view = FilteredView::default();
        for r in corpus.iter() {
            if keep(r.metadata) {
                view.push(r.index, r.embedding, r.metadata, r.content);
            }
        }
        view
    }

    fn push(&mut self, index: GlobalIndex, embedding: &'a [f32], metadata: &'a OfferMetadata, content: &'a str) {
        self.embeddings.push(embedding);
        self.metadata.push(metadata);
        self.contents.push(content);
        self.global_indices.push(index);
    }

    pub fn len(&self) -> usize { self.global_indices.len() }

    pub fn is_empty(&self) -> bool { self.global_indices.is_empty() }

    /// Narrows the view further, keeping global indices intact.
    pub fn retain(self, mut keep: impl FnMut(&OfferMetadata) -> bool) -> Self {
        let mut out = FilteredView::default();
        for i in 0..self.len() {
            if keep(self.metadata[i]) {
                out.push(self.global_indices[i], self.embeddings[i], self.metadata[i], self.contents[i]);
            }
        }
        out
    }

    pub fn within_dates(self, range: &DateRange) -> Self {
        if range.is_unbounded() {
            return self;
        }
        self.retain(|m| range.contains(m))
    }
}

/// Applies a filter specification; an empty spec keeps every record.
pub fn filter<'a>(corpus: &'a Corpus, spec: &FilterSpec) -> FilteredView<'a> {
    let view = if spec.is_empty() { FilteredView::all(corpus) } else { FilteredView::from_predicate(corpus, |m| spec.matches(m)) };
    tracing::debug!(kept = view.len(), total = corpus.len(), "applied filter specification");
    view
}

/// Parsed-date path over the whole corpus.
pub fn filter_by_date_range<'a>(corpus: &'a Corpus, range: &DateRange) -> FilteredView<'a> {
    let view = FilteredView::from_predicate(corpus, |m| range.contains(m));
    tracing::debug!(kept = view.len(), total = corpus.len(), "applied start date range");
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> OfferMetadata { OfferMetadata::default() }

    #[test]
    fn missing_values_fail_min_and_strict_max_bounds() {
        let spec = FilterSpec { min_duration_months: Some(1), ..Default::default() };
        assert!(!spec.matches(&meta()));
        let spec = FilterSpec { max_duration_months: Some(24), ..Default::default() };
        assert!(!spec.matches(&meta()));
        let spec = FilterSpec { max_duration_months: Some(999), ..Default::default() };
        assert!(spec.matches(&meta()));
        let spec = FilterSpec { max_application_rate: Some(100.0), ..Default::default() };
        assert!(spec.matches(&meta()));
        let spec = FilterSpec { max_application_rate: Some(50.0), ..Default::default() };
        assert!(!spec.matches(&meta()));
    }

    #[test]
    fn cities_and_companies_need_exact_membership() {
        let m = OfferMetadata { city: Some("Berlin".into()), company: Some("Airbus".into()), ..meta() };
        let spec = FilterSpec { cities: Some(vec!["Munich".into(), "Berlin".into()]), ..Default::default() };
        assert!(spec.matches(&m));
        let spec = FilterSpec { cities: Some(vec!["Berl".into()]), ..Default::default() };
        assert!(!spec.matches(&m));
        let spec = FilterSpec { companies: Some(vec!["Airbus".into()]), ..Default::default() };
        assert!(spec.matches(&m));
        assert!(!spec.matches(&meta()));
        let spec = FilterSpec { cities: Some(vec!["Berlin".into()]), ..Default::default() };
        assert!(!spec.matches(&meta()));
    }

    #[test]
    fn chunk_type_is_exact() {
        let m = OfferMetadata { chunk_type: Some("mission_description".into()), ..meta() };
        let spec = FilterSpec { chunk_type: Some("mission_description".into()), ..Default::default() };
        assert!(spec.matches(&m));
        let spec = FilterSpec { chunk_type: Some("mission".into()), ..Default::default() };
        assert!(!spec.matches(&m));
        assert!(!spec.matches(&meta()));
    }

    #[test]
    fn salary_and_application_rate_bounds() {
        let m = OfferMetadata { salary_eur: Some(2800), application_rate: Some(35.5), ..meta() };
        let spec = FilterSpec { max_salary_eur: Some(3000), ..Default::default() };
        assert!(spec.matches(&m));
        // missing salary counts as 999 999 against a max bound
        assert!(!spec.matches(&meta()));
        let spec = FilterSpec { max_salary_eur: Some(MISSING_MAX_SALARY_EUR), ..Default::default() };
        assert!(spec.matches(&meta()));
        let spec = FilterSpec { min_application_rate: Some(30.0), ..Default::default() };
        assert!(spec.matches(&m));
        assert!(!spec.matches(&meta()));
        let spec = FilterSpec { min_application_rate: Some(40.0), ..Default::default() };
        assert!(!spec.matches(&m));
        let spec = FilterSpec { min_application_rate: Some(0.0), ..Default::default() };
        assert!(spec.matches(&meta()));
    }

    #[test]
    fn sectors_match_by_substring() {
        let m = OfferMetadata { sector: Some("Banque / Finance / Assurance".into()), ..meta() };
        let spec = FilterSpec { sectors: Some(vec!["Finance".into()]), ..Default::default() };
        assert!(spec.matches(&m));
        let spec = FilterSpec { sectors: Some(vec!["Industrie".into()]), ..Default::default() };
        assert!(!spec.matches(&m));
    }

    #[test]
    fn lexicographic_dates_compare_raw_strings() {
        let m = OfferMetadata { start_date: Some("2025-06-01T00:00:00".into()), ..meta() };
        let spec = FilterSpec { start_date_after: Some("2025-05-31".into()), ..Default::default() };
        assert!(spec.matches(&m));
        // "2025-06-01T..." sorts after "2025-06-01", so a same-day "before" bound rejects it
        let spec = FilterSpec { start_date_before: Some("2025-06-01".into()), ..Default::default() };
        assert!(!spec.matches(&m));
        // sentinel text sorts after digits and passes an "after" bound
        let sentinel = OfferMetadata { start_date: Some("non spécifié".into()), ..meta() };
        let spec = FilterSpec { start_date_after: Some("2030-01-01".into()), ..Default::default() };
        assert!(spec.matches(&sentinel));
    }

    #[test]
    fn from_json_rejects_typos_and_bad_types() {
        assert!(FilterSpec::from_json(&json!({"countrie": ["FR"]})).is_err());
        assert!(FilterSpec::from_json(&json!({"min_salary_eur": "lots"})).is_err());
        assert!(FilterSpec::from_json(&json!({"max_competition_level": "HAUTE"})).is_err());
        let spec = FilterSpec::from_json(&json!({"max_competition_level": "moyenne", "countries": ["FR"]})).unwrap();
        assert_eq!(spec.max_competition_level, Some(CompetitionLevel::Moyenne));
        assert!(FilterSpec::from_json(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn date_range_rejects_malformed_bounds() {
        assert!(matches!(DateRange::parse(Some("soon"), None), Err(RagError::InvalidArgument(_))));
        assert!(DateRange::parse(None, None).unwrap().is_unbounded());
    }
}
