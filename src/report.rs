//! Report Orchestrator
//!
//! A report request is split by the completion service into (kind, sub-query,
//! collection) lines. The parser is strict: malformed lines, unknown or
//! restricted collections and duplicate pairs are dropped, and at most three
//! sections survive. Sections run one after another; a failing section leaves
//! an error marker in its slot and the rest still run.

use crate::error::{AssistantError, Result};
use crate::llm::{CompletionService, ParseResult};
use crate::policy::{accessible_profiles, AccessPolicy};
use crate::profiler::CollectionProfile;
use crate::prompts;
use crate::response::{ReportSection, SectionKind, TableAnswer};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const MAX_SECTIONS: usize = 3;

lazy_static! {
    static ref SECTION_LINE: Regex = Regex::new(
        r"(?i)^\s*(?:[-*]|\d+[.)])?\s*\**(chart|description)\**\s*:\s*(.+?)\s*\|\s*`?([A-Za-z0-9_.\-]+)`?\s*$"
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQuery {
    pub kind: SectionKind,
    pub query: String,
    pub collection: String,
}

/// Parse a decomposition response against the collections that may be used.
///
/// `known` must already exclude restricted collections. Collection names are
/// matched case-insensitively and returned in their canonical spelling.
pub fn parse_decomposition(raw: &str, known: &[String]) -> ParseResult<Vec<SubQuery>> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut sub_queries = Vec::new();

    for line in raw.lines() {
        let Some(caps) = SECTION_LINE.captures(line) else {
            if !line.trim().is_empty() {
                debug!("Dropping malformed decomposition line: {:?}", line);
            }
            continue;
        };

        let kind = if caps[1].eq_ignore_ascii_case("chart") {
            SectionKind::Chart
        } else {
            SectionKind::Description
        };
        let query = caps[2].trim().trim_matches('"').trim().to_string();
        if query.is_empty() {
            continue;
        }

        let Some(collection) = known.iter().find(|k| k.eq_ignore_ascii_case(&caps[3])) else {
            debug!("Dropping sub-query for unknown collection '{}'", &caps[3]);
            continue;
        };

        if !seen.insert((query.to_lowercase(), collection.to_lowercase())) {
            continue;
        }

        sub_queries.push(SubQuery {
            kind,
            query,
            collection: collection.clone(),
        });
        if sub_queries.len() == MAX_SECTIONS {
            break;
        }
    }

    if sub_queries.is_empty() {
        ParseResult::Malformed(raw.to_string())
    } else {
        ParseResult::Ok(sub_queries)
    }
}

/// Answers one sub-query against its named collection.
#[async_trait]
pub trait SectionRunner: Send + Sync {
    async fn run_section(&self, sub_query: &SubQuery, profiles: &[CollectionProfile]) -> Result<TableAnswer>;
}

pub struct ReportOrchestrator {
    completion: Arc<dyn CompletionService>,
    policy: Arc<dyn AccessPolicy>,
}

impl ReportOrchestrator {
    pub fn new(completion: Arc<dyn CompletionService>, policy: Arc<dyn AccessPolicy>) -> Self {
        Self { completion, policy }
    }

    pub async fn decompose(&self, query: &str, profiles: &[CollectionProfile]) -> Result<Vec<SubQuery>> {
        let accessible = accessible_profiles(self.policy.as_ref(), profiles);
        if accessible.is_empty() {
            return Err(AssistantError::Report("no collections available".to_string()));
        }
        let known: Vec<String> = accessible.iter().map(|p| p.name.clone()).collect();

        let raw = self
            .completion
            .complete(&prompts::decomposition_prompt(query, &accessible))
            .await?;

        match parse_decomposition(&raw, &known) {
            ParseResult::Ok(sub_queries) => Ok(sub_queries),
            ParseResult::Malformed(raw) => {
                warn!("No usable sub-query in decomposition response: {:?}", raw);
                Err(AssistantError::Report("no usable sub-query".to_string()))
            }
        }
    }

    /// Decompose `query` and run every surviving sub-query through `runner`.
    pub async fn run(
        &self,
        query: &str,
        profiles: &[CollectionProfile],
        runner: &dyn SectionRunner,
    ) -> Result<Vec<ReportSection>> {
        let sub_queries = self.decompose(query, profiles).await?;
        info!("Report decomposed into {} sections", sub_queries.len());

        let mut sections = Vec::with_capacity(sub_queries.len());
        for sub_query in sub_queries {
            let outcome = runner.run_section(&sub_query, profiles).await;
            let (answer, error) = match outcome {
                Ok(answer) => (Some(answer), None),
                Err(e) => {
                    warn!("Section '{}' failed: {}", sub_query.query, e);
                    (None, Some(e.user_message()))
                }
            };
            sections.push(ReportSection {
                kind: sub_query.kind,
                sub_query: sub_query.query,
                collection: sub_query.collection,
                answer,
                error,
            });
        }
        Ok(sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        vec!["sales".to_string(), "Users".to_string()]
    }

    #[test]
    fn test_parse_keeps_well_formed_lines() {
        let raw = "Here is the plan:\n\
                   1. chart: revenue by channel | sales\n\
                   - Description: who are the admins | users\n";
        let parsed = parse_decomposition(raw, &known()).ok().unwrap();
        assert_eq!(
            parsed,
            vec![
                SubQuery {
                    kind: SectionKind::Chart,
                    query: "revenue by channel".to_string(),
                    collection: "sales".to_string(),
                },
                SubQuery {
                    kind: SectionKind::Description,
                    query: "who are the admins".to_string(),
                    collection: "Users".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_drops_unknown_duplicate_and_shapeless_lines() {
        let raw = "chart: revenue by channel | sales\n\
                   chart: Revenue by channel | SALES\n\
                   table: revenue | sales\n\
                   description: salaries | payroll\n\
                   description: spend without a collection\n\
                   description: ad spend trend | sales\n";
        let parsed = parse_decomposition(raw, &known()).ok().unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].query, "ad spend trend");
    }

    #[test]
    fn test_parse_caps_sections() {
        let raw = (0..5)
            .map(|i| format!("chart: metric {} | sales", i))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(parse_decomposition(&raw, &known()).ok().unwrap().len(), MAX_SECTIONS);
    }

    #[test]
    fn test_parse_nothing_usable_is_malformed() {
        assert!(!parse_decomposition("I can't help with that", &known()).is_ok());
        assert!(!parse_decomposition("chart: x | secrets", &known()).is_ok());
    }
}
