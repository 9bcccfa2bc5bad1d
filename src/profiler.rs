//! Collection Profiler - field kinds and representative values per collection
//!
//! A profile is a read-only snapshot built per request. Kinds are decided from
//! the non-null values only: all numeric -> numeric, all calendar -> datetime,
//! anything else -> categorical. A field that is always null is `Unknown`.

use crate::config::ProfilerConfig;
use crate::error::Result;
use crate::policy::AccessPolicy;
use crate::store::{DocumentStore, FieldValue, Record};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Numeric,
    Datetime,
    Categorical,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KindStats {
    Numeric { min: f64, max: f64 },
    Datetime { min: NaiveDateTime, max: NaiveDateTime },
    Categorical { unique_values: BTreeSet<String> },
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldProfile {
    pub field_name: String,
    pub kind: FieldKind,
    pub stats: KindStats,
}

impl FieldProfile {
    /// Representative values usable for value matching.
    pub fn unique_values(&self) -> Option<&BTreeSet<String>> {
        match &self.stats {
            KindStats::Categorical { unique_values } => Some(unique_values),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionProfile {
    pub name: String,
    pub fields: Vec<FieldProfile>,
    pub document_count: usize,
}

impl CollectionProfile {
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.field_name.as_str()).collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldProfile> {
        self.fields.iter().find(|f| f.field_name == name)
    }
}

/// Running per-field state while scanning documents
#[derive(Default)]
struct FieldAccumulator {
    non_null: usize,
    numeric: usize,
    datetime: usize,
    num_min: Option<f64>,
    num_max: Option<f64>,
    dt_min: Option<NaiveDateTime>,
    dt_max: Option<NaiveDateTime>,
    values: BTreeSet<String>,
}

impl FieldAccumulator {
    fn observe(&mut self, value: &FieldValue, max_unique: usize) {
        // NaN and infinities carry no value; treat them like missing cells
        if value.is_null() || value.as_f64().is_some_and(|x| !x.is_finite()) {
            return;
        }
        self.non_null += 1;

        if let Some(x) = value.as_f64() {
            self.numeric += 1;
            self.num_min = Some(self.num_min.map_or(x, |m| m.min(x)));
            self.num_max = Some(self.num_max.map_or(x, |m| m.max(x)));
        } else if let Some(dt) = value.as_datetime() {
            self.datetime += 1;
            self.dt_min = Some(self.dt_min.map_or(dt, |m| m.min(dt)));
            self.dt_max = Some(self.dt_max.map_or(dt, |m| m.max(dt)));
        }

        if self.values.len() < max_unique {
            self.values.insert(value.to_string());
        }
    }

    fn finish(self, field_name: String) -> FieldProfile {
        let (kind, stats) = if self.non_null == 0 {
            (FieldKind::Unknown, KindStats::Unknown)
        } else if self.numeric == self.non_null {
            match (self.num_min, self.num_max) {
                (Some(min), Some(max)) => (FieldKind::Numeric, KindStats::Numeric { min, max }),
                _ => (FieldKind::Unknown, KindStats::Unknown),
            }
        } else if self.datetime == self.non_null {
            match (self.dt_min, self.dt_max) {
                (Some(min), Some(max)) => (FieldKind::Datetime, KindStats::Datetime { min, max }),
                _ => (FieldKind::Unknown, KindStats::Unknown),
            }
        } else {
            (
                FieldKind::Categorical,
                KindStats::Categorical {
                    unique_values: self.values,
                },
            )
        };

        FieldProfile {
            field_name,
            kind,
            stats,
        }
    }
}

/// Internal identifiers such as `_id` never take part in resolution.
pub fn is_internal_field(name: &str) -> bool {
    name.starts_with('_')
}

pub struct CollectionProfiler {
    config: ProfilerConfig,
}

impl CollectionProfiler {
    pub fn new(config: ProfilerConfig) -> Self {
        Self { config }
    }

    /// Profile an in-memory snapshot of records.
    pub fn profile_records(&self, name: &str, records: &[Record]) -> CollectionProfile {
        let limit = self.config.sample_limit.unwrap_or(records.len());
        let sample = &records[..limit.min(records.len())];

        let mut order: Vec<String> = Vec::new();
        let mut accumulators: HashMap<String, FieldAccumulator> = HashMap::new();

        for record in sample {
            for (field, value) in record {
                if is_internal_field(field) {
                    continue;
                }
                let acc = accumulators.entry(field.clone()).or_insert_with(|| {
                    order.push(field.clone());
                    FieldAccumulator::default()
                });
                acc.observe(value, self.config.max_unique_values);
            }
        }

        let fields = order
            .into_iter()
            .filter_map(|field| {
                accumulators
                    .remove(&field)
                    .map(|acc| acc.finish(field))
            })
            .collect();

        CollectionProfile {
            name: name.to_string(),
            fields,
            document_count: sample.len(),
        }
    }

    pub async fn profile(&self, store: &dyn DocumentStore, name: &str) -> Result<CollectionProfile> {
        let records = store.find_all(name).await?;
        let profile = self.profile_records(name, &records);
        debug!(
            "Profiled '{}': {} fields over {} documents",
            name,
            profile.fields.len(),
            profile.document_count
        );
        Ok(profile)
    }

    /// Profile every accessible collection. A collection that fails to load is skipped.
    pub async fn profile_all(
        &self,
        store: &dyn DocumentStore,
        policy: &dyn AccessPolicy,
    ) -> Result<Vec<CollectionProfile>> {
        let mut profiles = Vec::new();
        for name in store.list_collections().await? {
            if !policy.is_accessible(&name) {
                continue;
            }
            match self.profile(store, &name).await {
                Ok(profile) => profiles.push(profile),
                Err(e) => warn!("Skipping collection '{}': {}", name, e),
            }
        }
        Ok(profiles)
    }
}
