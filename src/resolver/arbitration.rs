//! Parsing of arbitration answers.
//!
//! Expected shape:
//! ```text
//! collection: sales
//! reason: it has revenue and channel
//! matching_fields: revenue, channel
//! ```

use crate::llm::ParseResult;

#[derive(Debug, Clone, PartialEq)]
pub struct ArbitrationChoice {
    /// `None` when the completion explicitly declined
    pub collection: Option<String>,
    pub reason: String,
    pub matching_fields: Vec<String>,
}

fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '*')
        .trim()
        .to_string()
}

fn is_decline(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "" | "none" | "null" | "n/a" | "no match" | "nothing"
    )
}

pub fn parse_arbitration(raw: &str) -> ParseResult<ArbitrationChoice> {
    let mut collection: Option<Option<String>> = None;
    let mut reason = String::new();
    let mut matching_fields = Vec::new();

    for line in raw.lines() {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().trim_matches('*').to_lowercase().replace([' ', '-'], "_");
        let value = clean_value(value);

        match key.as_str() {
            "collection" if collection.is_none() => {
                collection = Some(if is_decline(&value) { None } else { Some(value) });
            }
            "reason" => reason = value,
            "matching_fields" | "fields" => {
                matching_fields = value
                    .split(',')
                    .map(clean_value)
                    .filter(|f| !f.is_empty())
                    .collect();
            }
            _ => {}
        }
    }

    match collection {
        Some(collection) => ParseResult::Ok(ArbitrationChoice {
            collection,
            reason,
            matching_fields,
        }),
        None => ParseResult::Malformed(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_answer() {
        let raw = "collection: `sales`\nreason: revenue lives here\nmatching_fields: revenue, channel";
        let choice = parse_arbitration(raw).ok().unwrap();
        assert_eq!(choice.collection.as_deref(), Some("sales"));
        assert_eq!(choice.reason, "revenue lives here");
        assert_eq!(choice.matching_fields, vec!["revenue", "channel"]);
    }

    #[test]
    fn test_parse_markdown_keys() {
        let raw = "- **Collection**: orders\n- **Matching fields**: total";
        let choice = parse_arbitration(raw).ok().unwrap();
        assert_eq!(choice.collection.as_deref(), Some("orders"));
        assert_eq!(choice.matching_fields, vec!["total"]);
    }

    #[test]
    fn test_decline() {
        let choice = parse_arbitration("collection: NONE\nreason: nothing fits").ok().unwrap();
        assert_eq!(choice.collection, None);
    }

    #[test]
    fn test_missing_collection_is_malformed() {
        assert!(!parse_arbitration("I would pick sales").is_ok());
    }
}
