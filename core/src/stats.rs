//! Descriptive statistics over a ranked result list.
//!
//! Known quirk, kept until product signs off on a change: a missing
//! `duration_months` or `salary_eur` counts as 0 in min, max and mean (which
//! drags the mean down), whereas a missing competition level is simply left
//! out of the histogram.

use crate::metadata::CompetitionLevel;
use crate::rank::RankedResult;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

pub const MISSING_LABEL: &str = "N/A";
pub const TOP_COMPANIES: usize = 5;

/// Value counts in descending order; equal counts keep first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable(Vec<(String, usize)>);

impl FrequencyTable {
    fn from_values<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut slot: HashMap<&'a str, usize> = HashMap::new();
        for v in values {
            match slot.get(v) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    slot.insert(v, counts.len());
                    counts.push((v.to_string(), 1));
                }
            }
        }
        // stable sort keeps first-seen order among ties
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        FrequencyTable(counts)
    }

    pub fn get(&self, key: &str) -> Option<usize> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, c)| *c)
    }

    pub fn entries(&self) -> &[(String, usize)] { &self.0 }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn top(&self, n: usize) -> FrequencyTable {
        FrequencyTable(self.0.iter().take(n).cloned().collect())
    }
}

// Serialized as a JSON object whose key order follows the table order.
impl Serialize for FrequencyTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericSummary {
    pub min: i64,
    pub max: i64,
    pub avg: f64,
}

impl NumericSummary {
    fn from_values(values: &[i64]) -> Self {
        if values.is_empty() {
            return Self { min: 0, max: 0, avg: 0.0 };
        }
        let min = values.iter().copied().min().unwrap_or(0);
        let max = values.iter().copied().max().unwrap_or(0);
        let avg = values.iter().map(|v| *v as f64).sum::<f64>() / values.len() as f64;
        Self { min, max, avg }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_results: usize,
    pub countries: FrequencyTable,
    pub sectors: FrequencyTable,
    pub companies: FrequencyTable,
    pub top_companies: FrequencyTable,
    pub duration: NumericSummary,
    pub salary: NumericSummary,
    /// Always the three known levels, low to high.
    pub competition: FrequencyTable,
}

/// Summarizes ranked results; `None` when there is nothing to summarize.
pub fn summarize(results: &[RankedResult]) -> Option<Statistics> {
    if results.is_empty() {
        return None;
    }
    let label = |v: &Option<String>| -> String { v.clone().unwrap_or_else(|| MISSING_LABEL.to_string()) };
    let countries: Vec<String> = results.iter().map(|r| label(&r.metadata.country)).collect();
    let sectors: Vec<String> = results.iter().map(|r| label(&r.metadata.sector)).collect();
    let companies: Vec<String> = results.iter().map(|r| label(&r.metadata.company)).collect();

    let durations: Vec<i64> = results.iter().map(|r| r.metadata.duration_months.unwrap_or(0)).collect();
    let salaries: Vec<i64> = results.iter().map(|r| r.metadata.salary_eur.unwrap_or(0)).collect();

    let mut histogram = [0usize; 3];
    for r in results {
        if let Some(level) = r.metadata.competition_level {
            histogram[level.ordinal() as usize - 1] += 1;
        }
    }
    let competition = FrequencyTable(
        CompetitionLevel::ALL
            .iter()
            .zip(histogram)
            .map(|(level, count)| (level.label().to_string(), count))
            .collect(),
    );

    let companies = FrequencyTable::from_values(companies.iter().map(String::as_str));
    Some(Statistics {
        total_results: results.len(),
        countries: FrequencyTable::from_values(countries.iter().map(String::as_str)),
        sectors: FrequencyTable::from_values(sectors.iter().map(String::as_str)),
        top_companies: companies.top(TOP_COMPANIES),
        companies,
        duration: NumericSummary::from_values(&durations),
        salary: NumericSummary::from_values(&salaries),
        competition,
    })
}
