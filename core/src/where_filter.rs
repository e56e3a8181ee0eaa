//! Metadata filter language of the collection backend, in the usual
//! vector-database shape:
//!
//! ```text
//! {"competition_level": "FAIBLE"}
//! {"salary_eur": {"$gte": 2500}}
//! {"$or": [{"country": "ALLEMAGNE"}, {"country": {"$in": ["ITALIE", "ESPAGNE"]}}]}
//! ```
//!
//! Several fields in one object combine with AND. Any comparison against a
//! field the record does not have is false, `$ne` and `$nin` included.

use crate::error::{RagError, Result};
use crate::metadata::{MetaValue, OfferMetadata};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(f64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(Scalar),
    Ne(Scalar),
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
    In(Vec<Scalar>),
    Nin(Vec<Scalar>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WhereFilter {
    And(Vec<WhereFilter>),
    Or(Vec<WhereFilter>),
    Field { field: String, cmp: Comparison },
}

impl WhereFilter {
    pub fn eq(field: impl Into<String>, value: Scalar) -> Self {
        WhereFilter::Field { field: field.into(), cmp: Comparison::Eq(value) }
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| RagError::invalid(format!("where clause must be an object, got {value}")))?;
        if obj.is_empty() {
            return Err(RagError::invalid("where clause must not be empty"));
        }
        let mut clauses = Vec::with_capacity(obj.len());
        for (key, v) in obj {
            clauses.push(match key.as_str() {
                "$and" => WhereFilter::And(sub_clauses(key, v)?),
                "$or" => WhereFilter::Or(sub_clauses(key, v)?),
                k if k.starts_with('$') => return Err(RagError::invalid(format!("unknown logical operator {k}"))),
                field => WhereFilter::Field { field: field.to_string(), cmp: comparison(field, v)? },
            });
        }
        Ok(if clauses.len() == 1 { clauses.remove(0) } else { WhereFilter::And(clauses) })
    }

    pub fn matches(&self, meta: &OfferMetadata) -> bool {
        match self {
            WhereFilter::And(all) => all.iter().all(|w| w.matches(meta)),
            WhereFilter::Or(any) => any.iter().any(|w| w.matches(meta)),
            WhereFilter::Field { field, cmp } => match meta.field(field) {
                Some(v) => cmp.holds(v),
                None => false,
            },
        }
    }
}

fn sub_clauses(op: &str, v: &Value) -> Result<Vec<WhereFilter>> {
    let arr = v.as_array().ok_or_else(|| RagError::invalid(format!("{op} expects an array")))?;
    if arr.is_empty() {
        return Err(RagError::invalid(format!("{op} expects at least one clause")));
    }
    arr.iter().map(WhereFilter::from_json).collect()
}

fn comparison(field: &str, v: &Value) -> Result<Comparison> {
    let Some(obj) = v.as_object() else { return Ok(Comparison::Eq(scalar(field, v)?)) };
    let (op, operand) = single_entry(field, obj)?;
    let number = || operand.as_f64().ok_or_else(|| RagError::invalid(format!("{field}: {op} expects a number")));
    let list = || -> Result<Vec<Scalar>> {
        operand
            .as_array()
            .ok_or_else(|| RagError::invalid(format!("{field}: {op} expects an array")))?
            .iter()
            .map(|s| scalar(field, s))
            .collect()
    };
    Ok(match op {
        "$eq" => Comparison::Eq(scalar(field, operand)?),
        "$ne" => Comparison::Ne(scalar(field, operand)?),
        "$gt" => Comparison::Gt(number()?),
        "$gte" => Comparison::Gte(number()?),
        "$lt" => Comparison::Lt(number()?),
        "$lte" => Comparison::Lte(number()?),
        "$in" => Comparison::In(list()?),
        "$nin" => Comparison::Nin(list()?),
        other => return Err(RagError::invalid(format!("{field}: unknown operator {other}"))),
    })
}

fn single_entry<'a>(field: &str, obj: &'a Map<String, Value>) -> Result<(&'a str, &'a Value)> {
    let mut it = obj.iter();
    match (it.next(), it.next()) {
        (Some((op, v)), None) => Ok((op.as_str(), v)),
        _ => Err(RagError::invalid(format!("{field}: expected exactly one operator"))),
    }
}

fn scalar(field: &str, v: &Value) -> Result<Scalar> {
    match v {
        Value::String(s) => Ok(Scalar::Text(s.clone())),
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        Value::Number(n) => n.as_f64().map(Scalar::Number).ok_or_else(|| RagError::invalid(format!("{field}: number out of range"))),
        other => Err(RagError::invalid(format!("{field}: expected a string, number or bool, got {other}"))),
    }
}

fn as_number(v: MetaValue<'_>) -> Option<f64> {
    match v {
        MetaValue::Int(i) => Some(i as f64),
        MetaValue::Float(f) => Some(f),
        MetaValue::Text(_) => None,
    }
}

fn scalar_eq(v: MetaValue<'_>, s: &Scalar) -> bool {
    match (v, s) {
        (MetaValue::Text(t), Scalar::Text(x)) => t == x,
        (MetaValue::Text(t), Scalar::Bool(b)) => t == if *b { "true" } else { "false" },
        (v, Scalar::Number(x)) => as_number(v) == Some(*x),
        _ => false,
    }
}

impl Comparison {
    fn holds(&self, v: MetaValue<'_>) -> bool {
        match self {
            Comparison::Eq(s) => scalar_eq(v, s),
            Comparison::Ne(s) => !scalar_eq(v, s),
            Comparison::Gt(x) => as_number(v).map_or(false, |n| n > *x),
            Comparison::Gte(x) => as_number(v).map_or(false, |n| n >= *x),
            Comparison::Lt(x) => as_number(v).map_or(false, |n| n < *x),
            Comparison::Lte(x) => as_number(v).map_or(false, |n| n <= *x),
            Comparison::In(set) => set.iter().any(|s| scalar_eq(v, s)),
            Comparison::Nin(set) => !set.iter().any(|s| scalar_eq(v, s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::CompetitionLevel;
    use serde_json::json;

    fn offer() -> OfferMetadata {
        OfferMetadata {
            country: Some("ALLEMAGNE".into()),
            salary_eur: Some(2800),
            competition_level: Some(CompetitionLevel::Faible),
            ..Default::default()
        }
    }

    #[test]
    fn equality_and_ranges() {
        let m = offer();
        assert!(WhereFilter::from_json(&json!({"competition_level": "FAIBLE"})).unwrap().matches(&m));
        assert!(WhereFilter::from_json(&json!({"salary_eur": {"$gte": 2800}})).unwrap().matches(&m));
        assert!(!WhereFilter::from_json(&json!({"salary_eur": {"$lt": 2000}})).unwrap().matches(&m));
        assert!(WhereFilter::from_json(&json!({"salary_eur": 2800})).unwrap().matches(&m));
    }

    #[test]
    fn logical_operators_and_implicit_and() {
        let m = offer();
        let w = WhereFilter::from_json(&json!({"$or": [{"country": "ITALIE"}, {"country": {"$in": ["ALLEMAGNE"]}}]})).unwrap();
        assert!(w.matches(&m));
        let w = WhereFilter::from_json(&json!({"country": "ALLEMAGNE", "salary_eur": {"$gt": 5000}})).unwrap();
        assert!(matches!(w, WhereFilter::And(_)));
        assert!(!w.matches(&m));
    }

    #[test]
    fn missing_fields_never_match() {
        let m = offer();
        assert!(!WhereFilter::from_json(&json!({"city": {"$ne": "Berlin"}})).unwrap().matches(&m));
        assert!(!WhereFilter::from_json(&json!({"duration_months": {"$nin": [6]}})).unwrap().matches(&m));
    }

    #[test]
    fn malformed_clauses_are_invalid_arguments() {
        for bad in [json!([]), json!({}), json!({"$xor": []}), json!({"salary_eur": {"$gt": "a"}}), json!({"x": {"$eq": 1, "$ne": 2}}), json!({"$and": []})] {
            assert!(matches!(WhereFilter::from_json(&bad), Err(RagError::InvalidArgument(_))), "{bad}");
        }
    }
}
