//! Query Validator
//!
//! Sequential checks, first failure wins:
//! 1. too short
//! 2. invalid patterns (blank, punctuation-only, greetings, test phrases)
//! 3. data-analysis keyword -> accepted without a completion call
//! 4. cached completion sanity check, failing open on any error

use crate::cache::{normalize_query, ResponseCache};
use crate::llm::{parse_json_response, CompletionService, ParseResult};
use crate::prompts;
use crate::terms::tokenize;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Always set when invalid; suitable as user-facing feedback
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

struct InvalidPattern {
    pattern: Regex,
    reason: &'static str,
}

lazy_static! {
    static ref INVALID_PATTERNS: Vec<InvalidPattern> = vec![
        InvalidPattern {
            pattern: Regex::new(r"^\s*$").unwrap(),
            reason: "The request is empty.",
        },
        InvalidPattern {
            pattern: Regex::new(r"^[\p{P}\p{S}\s]+$").unwrap(),
            reason: "The request contains only punctuation or symbols.",
        },
        InvalidPattern {
            pattern: Regex::new(r"(?i)^\s*(hi|hello|hey|hiya|yo|sup|howdy|greetings|good\s+(morning|afternoon|evening))\b[\s\p{P}]*(there|all|everyone)?[\s\p{P}]*$").unwrap(),
            reason: "That looks like a greeting. Ask a question about your data, for example \"show revenue by channel\".",
        },
        InvalidPattern {
            pattern: Regex::new(r"(?i)^\s*(test(ing)?|asdf+|qwerty|foo|bar|baz|lorem ipsum|123+|abc)[\s\p{P}\d]*$").unwrap(),
            reason: "That looks like a test message rather than a data question.",
        },
        InvalidPattern {
            pattern: Regex::new(r"(?i)^\s*(thanks|thank you|ok|okay|bye|goodbye|lol|yes|no)[\s\p{P}]*$").unwrap(),
            reason: "That is not a data question.",
        },
    ];

    static ref ANALYSIS_KEYWORDS: HashSet<&'static str> = [
        "show", "chart", "plot", "graph", "table", "list", "count", "total", "sum", "average",
        "mean", "median", "max", "maximum", "min", "minimum", "top", "bottom", "trend",
        "compare", "comparison", "distribution", "breakdown", "group", "filter", "sort",
        "revenue", "sales", "report", "summary", "summarize", "describe", "analyze", "analyse",
        "analysis", "per", "by", "growth", "percentage", "ratio", "forecast", "rank",
    ]
    .into_iter()
    .collect();
}

/// Minimum trimmed length, in characters
const MIN_QUERY_CHARS: usize = 2;

#[derive(Debug, Deserialize)]
struct ValidationVerdict {
    is_valid: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Parse `{is_valid, reason}` into a validation result.
pub fn parse_validation(raw: &str) -> ParseResult<ValidationResult> {
    match parse_json_response::<ValidationVerdict>(raw) {
        ParseResult::Ok(v) if v.is_valid => ParseResult::Ok(ValidationResult::valid()),
        ParseResult::Ok(v) => ParseResult::Ok(ValidationResult::invalid(
            v.reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "The request does not look like a data question.".to_string()),
        )),
        ParseResult::Malformed(raw) => ParseResult::Malformed(raw),
    }
}

/// Deterministic checks 1-3. `None` means a completion check is needed.
pub fn check_locally(query: &str) -> Option<ValidationResult> {
    let trimmed = query.trim();
    if trimmed.chars().count() < MIN_QUERY_CHARS {
        return Some(ValidationResult::invalid("too short"));
    }

    if let Some(hit) = INVALID_PATTERNS.iter().find(|p| p.pattern.is_match(trimmed)) {
        return Some(ValidationResult::invalid(hit.reason));
    }

    if tokenize(trimmed).iter().any(|t| ANALYSIS_KEYWORDS.contains(t.as_str())) {
        return Some(ValidationResult::valid());
    }

    None
}

pub struct QueryValidator {
    completion: Arc<dyn CompletionService>,
    cache: Arc<ResponseCache<ValidationResult>>,
}

impl QueryValidator {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        cache: Arc<ResponseCache<ValidationResult>>,
    ) -> Self {
        Self { completion, cache }
    }

    pub async fn validate(&self, query: &str) -> ValidationResult {
        if let Some(result) = check_locally(query) {
            return result;
        }

        let normalized = normalize_query(query);
        if let Some(cached) = self.cache.get(&normalized) {
            debug!("Validation cache hit for {:?}", normalized);
            return cached;
        }

        match self.completion.complete(&prompts::validation_prompt(&normalized)).await {
            Ok(raw) => match parse_validation(&raw) {
                ParseResult::Ok(result) => {
                    self.cache.insert(&normalized, result.clone());
                    result
                }
                ParseResult::Malformed(raw) => {
                    warn!("Unparseable validation response, accepting query: {:?}", raw);
                    ValidationResult::valid()
                }
            },
            Err(e) => {
                warn!("Validation check unavailable, accepting query: {}", e);
                ValidationResult::valid()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ReplayCompletion;

    fn validator(replay: &Arc<ReplayCompletion>) -> QueryValidator {
        QueryValidator::new(replay.clone(), Arc::new(ResponseCache::new(16)))
    }

    #[test]
    fn test_too_short() {
        assert_eq!(check_locally(" x "), Some(ValidationResult::invalid("too short")));
        assert_eq!(check_locally(""), Some(ValidationResult::invalid("too short")));
    }

    #[test]
    fn test_patterns() {
        for query in ["hi", "Hello!", "hey there", "?!?", "asdf", "test 123", "thanks"] {
            let result = check_locally(query).expect(query);
            assert!(!result.is_valid, "{} should be rejected", query);
            assert!(result.reason.is_some());
        }
    }

    #[test]
    fn test_keyword_fast_accept() {
        assert_eq!(check_locally("show revenue by channel"), Some(ValidationResult::valid()));
        assert_eq!(check_locally("Top customers"), Some(ValidationResult::valid()));
    }

    #[test]
    fn test_unknown_needs_completion() {
        assert_eq!(check_locally("purple elephants dancing"), None);
    }

    #[test]
    fn test_parse_validation() {
        assert_eq!(
            parse_validation(r#"{"is_valid": false, "reason": "Gibberish"}"#),
            ParseResult::Ok(ValidationResult::invalid("Gibberish"))
        );
        assert_eq!(
            parse_validation(r#"{"is_valid": true}"#),
            ParseResult::Ok(ValidationResult::valid())
        );
        let missing_reason = parse_validation(r#"{"is_valid": false}"#).ok().unwrap();
        assert!(missing_reason.reason.is_some());
        assert!(!parse_validation("valid").is_ok());
    }

    #[tokio::test]
    async fn test_completion_verdict_rejects_with_its_reason() {
        let replay = Arc::new(ReplayCompletion::new([r#"{"is_valid": false, "reason": "Not about any dataset"}"#]));
        let result = validator(&replay).validate("purple elephants dancing").await;
        assert_eq!(result, ValidationResult::invalid("Not about any dataset"));
        assert_eq!(replay.call_count(), 1);
        assert!(replay.prompts()[0].contains("purple elephants dancing"));
    }

    #[tokio::test]
    async fn test_malformed_verdict_fails_open() {
        let replay = Arc::new(ReplayCompletion::new(["looks fine to me"]));
        let result = validator(&replay).validate("purple elephants dancing").await;
        assert_eq!(result, ValidationResult::valid());
        assert_eq!(replay.call_count(), 1);
    }

    #[tokio::test]
    async fn test_service_failure_fails_open_and_is_not_cached() {
        let replay = Arc::new(ReplayCompletion::default());
        replay.push_failure("connection refused");
        replay.push_response(r#"{"is_valid": false, "reason": "Gibberish"}"#);
        let validator = validator(&replay);

        assert_eq!(validator.validate("purple elephants dancing").await, ValidationResult::valid());
        assert_eq!(
            validator.validate("purple elephants dancing").await,
            ValidationResult::invalid("Gibberish")
        );
        assert_eq!(replay.call_count(), 2);
    }

    #[tokio::test]
    async fn test_verdict_cached_by_normalized_text() {
        let replay = Arc::new(ReplayCompletion::new([r#"{"is_valid": false, "reason": "Gibberish"}"#]));
        let validator = validator(&replay);

        let first = validator.validate("Purple elephants dancing").await;
        let second = validator.validate("  purple   ELEPHANTS, dancing!! ").await;
        assert_eq!(first, second);
        assert!(!second.is_valid);
        assert_eq!(replay.call_count(), 1);
    }

    #[tokio::test]
    async fn test_local_decisions_make_no_call() {
        let replay = Arc::new(ReplayCompletion::default());
        let validator = validator(&replay);
        assert!(!validator.validate("hi").await.is_valid);
        assert!(validator.validate("show revenue by channel").await.is_valid);
        assert_eq!(replay.call_count(), 0);
    }
}
