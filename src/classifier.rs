//! Query Classifier
//!
//! Two stages: a deterministic keyword vote, then a completion fallback that is
//! only reached when the vote is tied or empty. The fallback answer is cached
//! by normalized query text.

use crate::cache::ResponseCache;
use crate::llm::{CompletionService, ParseResult};
use crate::prompts;
use crate::terms::tokenize;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryClassification {
    Chart,
    Description,
    Report,
    Error,
}

impl fmt::Display for QueryClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueryClassification::Chart => "chart",
            QueryClassification::Description => "description",
            QueryClassification::Report => "report",
            QueryClassification::Error => "error",
        };
        write!(f, "{}", label)
    }
}

lazy_static! {
    static ref CHART_WORDS: HashSet<&'static str> = [
        "chart", "charts", "plot", "plots", "graph", "graphs", "visualize", "visualise",
        "visualization", "visualisation", "histogram", "bar", "pie", "line", "scatter",
        "trend", "trends", "heatmap", "draw",
    ]
    .into_iter()
    .collect();
    static ref DESCRIPTION_WORDS: HashSet<&'static str> = [
        "describe", "description", "summary", "summarize", "summarise", "explain", "list",
        "table", "filter", "rows", "records", "which", "who", "detail", "details",
    ]
    .into_iter()
    .collect();
    static ref REPORT_WORDS: HashSet<&'static str> = [
        "report", "reports", "overview", "dashboard", "analysis", "analyses", "insights",
        "comprehensive", "full", "complete",
    ]
    .into_iter()
    .collect();
}

/// Per-category keyword counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeywordVote {
    pub chart: usize,
    pub description: usize,
    pub report: usize,
}

impl KeywordVote {
    pub fn count(query: &str) -> Self {
        let mut vote = Self::default();
        for token in tokenize(query) {
            let token = token.as_str();
            if CHART_WORDS.contains(token) {
                vote.chart += 1;
            }
            if DESCRIPTION_WORDS.contains(token) {
                vote.description += 1;
            }
            if REPORT_WORDS.contains(token) {
                vote.report += 1;
            }
        }
        vote
    }

    /// The category with a strictly-highest nonzero count, if any.
    pub fn winner(&self) -> Option<QueryClassification> {
        let tallies = [
            (QueryClassification::Chart, self.chart),
            (QueryClassification::Description, self.description),
            (QueryClassification::Report, self.report),
        ];
        let best = tallies.iter().map(|(_, n)| *n).max().unwrap_or(0);
        if best == 0 {
            return None;
        }
        let mut leaders = tallies.iter().filter(|(_, n)| *n == best);
        match (leaders.next(), leaders.next()) {
            (Some((class, _)), None) => Some(*class),
            _ => None,
        }
    }
}

/// Map a single-word completion answer onto a classification.
pub fn parse_classification(raw: &str) -> ParseResult<QueryClassification> {
    let word = raw
        .split(|c: char| !c.is_alphabetic())
        .find(|w| !w.is_empty())
        .map(|w| w.to_lowercase());

    match word.as_deref() {
        Some("chart") => ParseResult::Ok(QueryClassification::Chart),
        Some("description") => ParseResult::Ok(QueryClassification::Description),
        Some("report") => ParseResult::Ok(QueryClassification::Report),
        Some("error") => ParseResult::Ok(QueryClassification::Error),
        _ => ParseResult::Malformed(raw.to_string()),
    }
}

pub struct QueryClassifier {
    completion: Arc<dyn CompletionService>,
    cache: Arc<ResponseCache<QueryClassification>>,
}

impl QueryClassifier {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        cache: Arc<ResponseCache<QueryClassification>>,
    ) -> Self {
        Self { completion, cache }
    }

    pub async fn classify(&self, query: &str) -> QueryClassification {
        let vote = KeywordVote::count(query);
        if let Some(class) = vote.winner() {
            debug!("Keyword vote {:?} -> {}", vote, class);
            return class;
        }

        if let Some(cached) = self.cache.get(query) {
            debug!("Classification cache hit -> {}", cached);
            return cached;
        }

        let class = match self.completion.complete(&prompts::classification_prompt(query)).await {
            Ok(raw) => match parse_classification(&raw) {
                ParseResult::Ok(class) => class,
                ParseResult::Malformed(raw) => {
                    warn!("Unparseable classification response: {:?}", raw);
                    QueryClassification::Error
                }
            },
            Err(e) => {
                // Service failures are not cached so a later call can succeed
                warn!("Classification fallback failed: {}", e);
                return QueryClassification::Error;
            }
        };

        info!("Completion fallback classified query as {}", class);
        self.cache.insert(query, class);
        class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_single_winner() {
        assert_eq!(
            KeywordVote::count("plot revenue trend by month").winner(),
            Some(QueryClassification::Chart)
        );
        assert_eq!(
            KeywordVote::count("give me a full report").winner(),
            Some(QueryClassification::Report)
        );
    }

    #[test]
    fn test_vote_tie_or_empty_has_no_winner() {
        assert_eq!(KeywordVote::count("chart and describe sales").winner(), None);
        assert_eq!(KeywordVote::count("revenue by channel").winner(), None);
    }

    #[test]
    fn test_parse_classification() {
        assert_eq!(parse_classification(" Chart."), ParseResult::Ok(QueryClassification::Chart));
        assert_eq!(
            parse_classification("description\n"),
            ParseResult::Ok(QueryClassification::Description)
        );
        assert!(!parse_classification("I think a table").is_ok());
        assert!(!parse_classification("").is_ok());
    }
}
