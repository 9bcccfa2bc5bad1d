//! Document store contract
//!
//! The permanent storage layer is an external collaborator. The pipeline only
//! needs to list collections and read every record of one collection; this
//! module defines that contract plus two implementations: an in-memory store
//! and a directory of JSON/CSV files (one file per collection).

use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Scalar stored in a record field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

pub type Record = BTreeMap<String, FieldValue>;

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Calendar value of this scalar, including ISO-8601 text.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            FieldValue::Date(d) => d.and_hms_opt(0, 0, 0),
            FieldValue::DateTime(dt) => Some(*dt),
            FieldValue::Text(s) => parse_calendar_text(s),
            _ => None,
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => n.as_f64().map(FieldValue::Float).unwrap_or(FieldValue::Null),
            },
            Value::String(s) => FieldValue::Text(s.clone()),
            other => FieldValue::Text(other.to_string()),
        }
    }

    /// Infer a scalar from a CSV cell.
    pub fn from_cell(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() {
            return FieldValue::Null;
        }
        if let Ok(i) = cell.parse::<i64>() {
            return FieldValue::Int(i);
        }
        if let Ok(f) = cell.parse::<f64>() {
            return FieldValue::Float(f);
        }
        match cell.to_ascii_lowercase().as_str() {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            _ => FieldValue::Text(cell.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

fn parse_calendar_text(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.naive_utc())
}

/// Read access to typed collections of records
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Names of every collection in the store
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Every record of the named collection
    async fn find_all(&self, collection: &str) -> Result<Vec<Record>>;
}

/// Store held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: BTreeMap<String, Vec<Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, records: Vec<Record>) {
        self.collections.insert(name.into(), records);
    }

    pub fn with_collection(mut self, name: impl Into<String>, records: Vec<Record>) -> Self {
        self.insert(name, records);
        self
    }

    /// Load a collection from a JSON array of objects.
    pub fn insert_json(&mut self, name: impl Into<String>, json: &Value) -> Result<()> {
        let records = records_from_json(json)?;
        self.insert(name, records);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.keys().cloned().collect())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Record>> {
        self.collections
            .get(collection)
            .cloned()
            .ok_or_else(|| AssistantError::Store(format!("Collection not found: {}", collection)))
    }
}

/// Store backed by a directory where each `*.json` or `*.csv` file is one collection
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn collection_files(&self) -> Result<BTreeMap<String, PathBuf>> {
        let mut files = BTreeMap::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_supported = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("json") || e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if !is_supported {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.entry(stem.to_string()).or_insert(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl DocumentStore for DirectoryStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collection_files()?.into_keys().collect())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Record>> {
        let files = self.collection_files()?;
        let path = files
            .get(collection)
            .ok_or_else(|| AssistantError::Store(format!("Collection not found: {}", collection)))?;
        debug!("Loading collection '{}' from {}", collection, path.display());

        let bytes = tokio::fs::read(path).await?;
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        if is_csv {
            records_from_csv(&bytes)
        } else {
            let json: Value = serde_json::from_slice(&bytes)?;
            records_from_json(&json)
        }
    }
}

/// Convert a JSON array of objects into records.
pub fn records_from_json(json: &Value) -> Result<Vec<Record>> {
    let rows = json
        .as_array()
        .ok_or_else(|| AssistantError::Store("Expected a JSON array of objects".to_string()))?;

    rows.iter()
        .map(|row| {
            let object = row
                .as_object()
                .ok_or_else(|| AssistantError::Store("Expected a JSON object per record".to_string()))?;
            Ok(object
                .iter()
                .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                .collect())
        })
        .collect()
}

/// Parse CSV bytes (header row first) into records.
pub fn records_from_csv(bytes: &[u8]) -> Result<Vec<Record>> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(h, cell)| (h.clone(), FieldValue::from_cell(cell)))
            .collect();
        records.push(record);
    }
    Ok(records)
}
