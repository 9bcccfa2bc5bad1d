//! Header and value matchers
//!
//! Both matchers are pure functions of (terms, profile). Their results are
//! merged into one weighted `MatchResult` per collection.

use crate::profiler::CollectionProfile;
use crate::terms::MIN_TERM_LENGTH;
use itertools::Itertools;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub collection_name: String,
    pub score: f64,
    pub matched_fields: BTreeSet<String>,
    pub matched_values: BTreeMap<String, Vec<String>>,
    pub rationale: String,
}

impl MatchResult {
    fn empty(collection_name: &str) -> Self {
        Self {
            collection_name: collection_name.to_string(),
            score: 0.0,
            matched_fields: BTreeSet::new(),
            matched_values: BTreeMap::new(),
            rationale: String::new(),
        }
    }
}

/// A term matches a field name when either contains the other.
/// Field names shorter than the term minimum only match by containing the term,
/// so `id` does not match `paid`.
fn header_matches(term: &str, field: &str) -> bool {
    field.contains(term) || (field.chars().count() >= MIN_TERM_LENGTH && term.contains(field))
}

/// Score = number of fields matched by at least one term.
pub fn match_headers(terms: &[String], profile: &CollectionProfile) -> MatchResult {
    let mut result = MatchResult::empty(&profile.name);
    let mut pairs = Vec::new();

    for field in &profile.fields {
        let field_lower = field.field_name.to_lowercase();
        let hits: Vec<&String> = terms
            .iter()
            .unique()
            .filter(|term| header_matches(term, &field_lower))
            .collect();
        if hits.is_empty() {
            continue;
        }
        result.score += 1.0;
        result.matched_fields.insert(field.field_name.clone());
        pairs.extend(hits.iter().map(|term| format!("'{}'→{}", term, field.field_name)));
    }

    if !pairs.is_empty() {
        result.rationale = format!("header matches: {}", pairs.join(", "));
    }
    result
}

/// Score = number of distinct representative values containing any term.
pub fn match_values(terms: &[String], profile: &CollectionProfile) -> MatchResult {
    let mut result = MatchResult::empty(&profile.name);

    for field in &profile.fields {
        let Some(values) = field.unique_values() else {
            continue;
        };
        for value in values {
            let value_lower = value.to_lowercase();
            if terms.iter().any(|term| value_lower.contains(term.as_str())) {
                result.score += 1.0;
                result
                    .matched_values
                    .entry(field.field_name.clone())
                    .or_default()
                    .push(value.clone());
            }
        }
    }

    if !result.matched_values.is_empty() {
        let listing = result
            .matched_values
            .iter()
            .map(|(field, values)| format!("{}=[{}]", field, values.join(", ")))
            .join("; ");
        result.rationale = format!("value matches: {}", listing);
    }
    result
}

/// combined = header * header_weight + value
pub fn combine(header: MatchResult, value: MatchResult, header_weight: f64) -> MatchResult {
    let rationale = [header.rationale.as_str(), value.rationale.as_str()]
        .iter()
        .filter(|r| !r.is_empty())
        .join("; ");

    let mut matched_fields = header.matched_fields;
    matched_fields.extend(value.matched_values.keys().cloned());

    MatchResult {
        collection_name: header.collection_name,
        score: header.score * header_weight + value.score,
        matched_fields,
        matched_values: value.matched_values,
        rationale: if rationale.is_empty() {
            "no matches".to_string()
        } else {
            rationale
        },
    }
}

/// Score every profile and order by score descending, then name ascending.
pub fn score_all(terms: &[String], profiles: &[CollectionProfile], header_weight: f64) -> Vec<MatchResult> {
    let mut results: Vec<MatchResult> = profiles
        .iter()
        .map(|p| combine(match_headers(terms, p), match_values(terms, p), header_weight))
        .collect();

    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.collection_name.cmp(&b.collection_name))
    });
    results
}
