//! Response envelope handed to downstream renderers

use crate::error::Result;
use crate::table::frame_to_json_rows;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output kind of a report section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Chart,
    Description,
}

/// A table produced for one query against one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableAnswer {
    pub collection: String,
    pub rationale: String,
    /// True when no procedure succeeded and `rows` is the untransformed collection
    pub degraded: bool,
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
}

impl TableAnswer {
    pub fn from_frame(
        collection: impl Into<String>,
        rationale: impl Into<String>,
        degraded: bool,
        table: &DataFrame,
    ) -> Result<Self> {
        Ok(Self {
            collection: collection.into(),
            rationale: rationale.into(),
            degraded,
            columns: table.get_column_names().iter().map(|c| c.to_string()).collect(),
            rows: frame_to_json_rows(table)?,
        })
    }
}

/// One slot of a report. Exactly one of `answer` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub kind: SectionKind,
    pub sub_query: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<TableAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportSection {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AssistantResponse {
    Chart(TableAnswer),
    Description(TableAnswer),
    Report { sections: Vec<ReportSection> },
    Error { message: String },
}

impl AssistantResponse {
    pub fn error(message: impl Into<String>) -> Self {
        AssistantResponse::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AssistantResponse::Error { .. })
    }

    pub fn answer(&self) -> Option<&TableAnswer> {
        match self {
            AssistantResponse::Chart(answer) | AssistantResponse::Description(answer) => Some(answer),
            _ => None,
        }
    }
}
