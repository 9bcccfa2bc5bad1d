//! Prompt templates for every completion-service call.
//!
//! Each template pins down the response shape that the matching parser in
//! the calling module expects.

use crate::profiler::{CollectionProfile, FieldKind};
use crate::resolver::MatchResult;
use itertools::Itertools;

/// Name of the table the synthesized procedure reads from.
pub const TABLE_ALIAS: &str = "df";

fn kind_label(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Numeric => "numeric",
        FieldKind::Datetime => "datetime",
        FieldKind::Categorical => "categorical",
        FieldKind::Unknown => "unknown",
    }
}

/// One line per collection: `- name: field (kind), ...`
pub fn collection_listing(profiles: &[CollectionProfile]) -> String {
    profiles
        .iter()
        .map(|p| {
            let fields = p
                .fields
                .iter()
                .map(|f| format!("{} ({})", f.field_name, kind_label(f.kind)))
                .join(", ");
            format!("- {}: {}", p.name, fields)
        })
        .join("\n")
}

pub fn classification_prompt(query: &str) -> String {
    format!(
        r#"Classify the user's data request into exactly one category:
- chart: the user wants a visualisation (plot, graph, trend over time, comparison)
- description: the user wants a filtered table or a written summary of data
- report: the user wants several different analyses combined into one report
- error: the request cannot be answered from tabular data

Request: "{}"

Answer with the single category word only."#,
        query
    )
}

pub fn validation_prompt(normalized_query: &str) -> String {
    format!(
        r#"Decide whether this text is a meaningful request for analysing business data.
Text: "{}"

Return JSON only:
{{"is_valid": true|false, "reason": "short explanation shown to the user when invalid"}}"#,
        normalized_query
    )
}

pub fn arbitration_prompt(query: &str, candidates: &[MatchResult]) -> String {
    let listing = candidates
        .iter()
        .map(|c| {
            let values = c
                .matched_values
                .iter()
                .map(|(field, values)| format!("{}=[{}]", field, values.join(", ")))
                .join("; ");
            format!(
                "- {} (score {:.2}; fields: {}; values: {}; {})",
                c.collection_name,
                c.score,
                c.matched_fields.iter().join(", "),
                if values.is_empty() { "none".to_string() } else { values },
                c.rationale
            )
        })
        .join("\n");

    format!(
        r#"Several data collections plausibly answer the request. Pick the single best one.

Request: "{}"

Candidates:
{}

Respond in exactly this format:
collection: <one candidate name>
reason: <one sentence>
matching_fields: <comma-separated field names>"#,
        query, listing
    )
}

pub fn open_search_prompt(query: &str, profiles: &[CollectionProfile]) -> String {
    format!(
        r#"No collection matched the request by field names or values. Choose the collection that can answer it, or decline.

Request: "{}"

Collections:
{}

Respond in exactly this format:
collection: <collection name, or NONE if nothing fits>
reason: <one sentence>
matching_fields: <comma-separated field names>"#,
        query,
        collection_listing(profiles)
    )
}

pub fn synthesis_prompt(query: &str, summary: &str) -> String {
    format!(
        r#"Write one SQL SELECT statement that transforms the table `{alias}` to answer the request.

Request: "{query}"

{summary}

Rules:
- Read only from `{alias}`; CTEs are allowed. No joins and no UNION/INTERSECT/EXCEPT.
- Use only filtering (WHERE), sorting (ORDER BY), grouping and aggregation (GROUP BY with COUNT/SUM/AVG/MIN/MAX/MEDIAN), LIMIT, and simple scalar functions.
- Column names are case-sensitive; quote them with double quotes when they contain spaces.
- No table functions, no file access, no DDL or DML.

Return the statement inside a ```sql fenced block and nothing else."#,
        alias = TABLE_ALIAS,
        query = query,
        summary = summary
    )
}

pub fn correction_prompt(query: &str, failing_code: &str, error: &str, hint: &str) -> String {
    format!(
        r#"The SQL below failed while answering the request. Return a corrected statement.

Request: "{query}"

Failing SQL:
```sql
{code}
```

Error:
{error}

Hint: {hint}

The table is still named `{alias}` and the same rules apply. Return the corrected statement inside a ```sql fenced block and nothing else."#,
        query = query,
        code = failing_code,
        error = error,
        hint = hint,
        alias = TABLE_ALIAS
    )
}

pub fn decomposition_prompt(query: &str, profiles: &[CollectionProfile]) -> String {
    format!(
        r#"Break this reporting request into exactly three independent sub-questions.
Each sub-question targets ONE collection from the list and produces either a chart or a description.

Request: "{}"

Collections:
{}

Respond with exactly three lines in this format (no other text):
chart: <sub-question> | <collection>
description: <sub-question> | <collection>"#,
        query,
        collection_listing(profiles)
    )
}
