//! Tabular views of a collection
//!
//! Records are materialised into a polars `DataFrame` typed by the collection
//! profile, summarised for synthesis prompts, and rendered back to JSON rows
//! for downstream renderers.

use crate::error::Result;
use crate::profiler::{CollectionProfile, FieldKind, KindStats};
use crate::store::{FieldValue, Record};
use polars::prelude::*;
use serde_json::{Map, Number, Value};

/// Build a frame with one column per profiled field, in profile order.
pub fn records_to_frame(profile: &CollectionProfile, records: &[Record]) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(profile.fields.len());

    for field in &profile.fields {
        let name = field.field_name.as_str();
        let values = records.iter().map(|r| r.get(name).unwrap_or(&FieldValue::Null));

        let series = match field.kind {
            FieldKind::Numeric => {
                let data: Vec<Option<f64>> = values.map(|v| v.as_f64()).collect();
                Series::new(name, data)
            }
            FieldKind::Datetime => {
                let data: Vec<Option<i64>> = values
                    .map(|v| v.as_datetime().map(|dt| dt.and_utc().timestamp_millis()))
                    .collect();
                Series::new(name, data).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
            }
            FieldKind::Categorical | FieldKind::Unknown => {
                let data: Vec<Option<String>> = values
                    .map(|v| if v.is_null() { None } else { Some(v.to_string()) })
                    .collect();
                Series::new(name, data)
            }
        };
        columns.push(series);
    }

    Ok(DataFrame::new(columns)?)
}

/// Per-column facts given to the completion service before synthesis.
pub fn describe_frame(profile: &CollectionProfile, df: &DataFrame) -> String {
    let mut lines = vec![format!(
        "Table `df` ({} rows, {} columns):",
        df.height(),
        df.width()
    )];

    for series in df.get_columns() {
        let name = series.name();
        let mut facts = vec![
            format!("type={}", series.dtype()),
            format!("nulls={}", series.null_count()),
        ];
        if let Ok(distinct) = series.n_unique() {
            facts.push(format!("distinct={}", distinct));
        }

        if let Some(field) = profile.field(name) {
            match &field.stats {
                KindStats::Numeric { min, max } => facts.push(format!("min={} max={}", min, max)),
                KindStats::Datetime { min, max } => facts.push(format!("min={} max={}", min, max)),
                KindStats::Categorical { unique_values } => {
                    let sample: Vec<&str> = unique_values.iter().take(8).map(|s| s.as_str()).collect();
                    facts.push(format!("examples=[{}]", sample.join(", ")));
                }
                KindStats::Unknown => {}
            }
        }

        lines.push(format!("- {}: {}", name, facts.join(", ")));
    }

    lines.join("\n")
}

/// Render each row as a JSON object keyed by column name.
pub fn frame_to_json_rows(df: &DataFrame) -> Result<Vec<Value>> {
    let mut rows = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let mut row = Map::new();
        for series in df.get_columns() {
            row.insert(series.name().to_string(), any_value_to_json(series.get(idx)?));
        }
        rows.push(Value::Object(row));
    }
    Ok(rows)
}

fn any_value_to_json(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::Int8(i) => Value::from(i),
        AnyValue::Int16(i) => Value::from(i),
        AnyValue::Int32(i) => Value::from(i),
        AnyValue::Int64(i) => Value::from(i),
        AnyValue::UInt8(i) => Value::from(i),
        AnyValue::UInt16(i) => Value::from(i),
        AnyValue::UInt32(i) => Value::from(i),
        AnyValue::UInt64(i) => Value::from(i),
        AnyValue::Float32(f) => Number::from_f64(f as f64).map(Value::Number).unwrap_or(Value::Null),
        AnyValue::Float64(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        AnyValue::String(s) => Value::String(s.to_string()),
        other => Value::String(other.to_string()),
    }
}
