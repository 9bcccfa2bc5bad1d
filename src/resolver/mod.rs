//! Source Resolver
//!
//! Maps a query onto one collection with a three-tier policy:
//! 1. nothing scored -> open-ended completion search over every collection
//! 2. one candidate, no alternative within the ratio -> resolve directly
//! 3. primary plus alternatives -> completion arbitration among them, falling
//!    back to the primary when the answer is unusable
//!
//! Restricted collections are removed before scoring, so they can never score,
//! be arbitrated to, or be listed on failure.

pub mod arbitration;
pub mod matcher;

pub use arbitration::{parse_arbitration, ArbitrationChoice};
pub use matcher::{combine, match_headers, match_values, score_all, MatchResult};

use crate::config::ResolverConfig;
use crate::llm::{CompletionService, ParseResult};
use crate::policy::{accessible_profiles, AccessPolicy};
use crate::profiler::CollectionProfile;
use crate::prompts;
use crate::terms::extract_terms;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NO_MATCH_REASON: &str = "no matching collection found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMethod {
    /// Single dominant heuristic candidate
    Heuristic,
    /// Completion picked among close candidates
    Arbitrated,
    /// Completion searched all collections after heuristics found nothing
    Fallback,
    /// Collection named upstream and verified against the known set
    Hinted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResolutionOutcome {
    Resolved {
        collection_name: String,
        rationale: String,
        method: ResolutionMethod,
    },
    Failed {
        reason: String,
        candidates_considered: Vec<String>,
    },
}

impl ResolutionOutcome {
    pub fn collection_name(&self) -> Option<&str> {
        match self {
            ResolutionOutcome::Resolved { collection_name, .. } => Some(collection_name),
            ResolutionOutcome::Failed { .. } => None,
        }
    }
}

/// Heuristic shape of the ranked candidates, before any completion call
#[derive(Debug, Clone, PartialEq)]
pub enum CandidatePlan {
    NoCandidate,
    Single(MatchResult),
    Ambiguous {
        primary: MatchResult,
        alternatives: Vec<MatchResult>,
    },
}

/// Split ranked results into primary and alternatives.
pub fn plan_candidates(ranked: &[MatchResult], alternative_ratio: f64) -> CandidatePlan {
    let mut positive = ranked.iter().filter(|r| r.score > 0.0);
    let Some(primary) = positive.next() else {
        return CandidatePlan::NoCandidate;
    };

    let threshold = primary.score * alternative_ratio;
    let alternatives: Vec<MatchResult> = positive.filter(|r| r.score >= threshold).cloned().collect();

    if alternatives.is_empty() {
        CandidatePlan::Single(primary.clone())
    } else {
        CandidatePlan::Ambiguous {
            primary: primary.clone(),
            alternatives,
        }
    }
}

pub struct SourceResolver {
    config: ResolverConfig,
    completion: Arc<dyn CompletionService>,
    policy: Arc<dyn AccessPolicy>,
}

impl SourceResolver {
    pub fn new(
        config: ResolverConfig,
        completion: Arc<dyn CompletionService>,
        policy: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            config,
            completion,
            policy,
        }
    }

    fn accessible_profiles(&self, profiles: &[CollectionProfile]) -> Vec<CollectionProfile> {
        accessible_profiles(self.policy.as_ref(), profiles)
    }

    /// Ranked match results over accessible collections.
    pub fn score(&self, query: &str, profiles: &[CollectionProfile]) -> Vec<MatchResult> {
        let terms = extract_terms(query);
        score_all(&terms, &self.accessible_profiles(profiles), self.config.header_weight)
    }

    pub async fn resolve(&self, query: &str, profiles: &[CollectionProfile]) -> ResolutionOutcome {
        let accessible = self.accessible_profiles(profiles);
        let terms = extract_terms(query);
        let ranked = score_all(&terms, &accessible, self.config.header_weight);
        debug!(
            "Scores for {:?}: {:?}",
            terms,
            ranked.iter().map(|r| (&r.collection_name, r.score)).collect::<Vec<_>>()
        );

        match plan_candidates(&ranked, self.config.alternative_ratio) {
            CandidatePlan::Single(primary) => {
                info!("Resolved '{}' heuristically (score {:.2})", primary.collection_name, primary.score);
                ResolutionOutcome::Resolved {
                    collection_name: primary.collection_name,
                    rationale: primary.rationale,
                    method: ResolutionMethod::Heuristic,
                }
            }
            CandidatePlan::Ambiguous {
                primary,
                alternatives,
            } => self.arbitrate(query, primary, alternatives).await,
            CandidatePlan::NoCandidate => self.open_search(query, &accessible).await,
        }
    }

    async fn arbitrate(
        &self,
        query: &str,
        primary: MatchResult,
        alternatives: Vec<MatchResult>,
    ) -> ResolutionOutcome {
        let mut candidates = vec![primary.clone()];
        candidates.extend(alternatives);
        info!("Arbitrating between {} candidates", candidates.len());

        let prompt = prompts::arbitration_prompt(query, &candidates);
        let choice = match self.completion.complete(&prompt).await {
            Ok(raw) => parse_arbitration(&raw),
            Err(e) => {
                warn!("Arbitration call failed: {}", e);
                ParseResult::Malformed(String::new())
            }
        };

        let picked = choice.ok().and_then(|c| {
            let name = c.collection?;
            candidates
                .iter()
                .find(|cand| cand.collection_name.eq_ignore_ascii_case(name.trim()))
                .map(|cand| (cand.collection_name.clone(), c.reason))
        });

        match picked {
            Some((collection_name, reason)) => ResolutionOutcome::Resolved {
                rationale: if reason.is_empty() {
                    format!("arbitrated among {} candidates", candidates.len())
                } else {
                    reason
                },
                collection_name,
                method: ResolutionMethod::Arbitrated,
            },
            None => {
                warn!(
                    "Arbitration inconclusive, defaulting to primary '{}'",
                    primary.collection_name
                );
                ResolutionOutcome::Resolved {
                    collection_name: primary.collection_name,
                    rationale: format!("{} (arbitration inconclusive)", primary.rationale),
                    method: ResolutionMethod::Heuristic,
                }
            }
        }
    }

    async fn open_search(&self, query: &str, accessible: &[CollectionProfile]) -> ResolutionOutcome {
        let available: Vec<String> = accessible.iter().map(|p| p.name.clone()).collect();
        let failed = |available: Vec<String>| ResolutionOutcome::Failed {
            reason: NO_MATCH_REASON.to_string(),
            candidates_considered: available,
        };

        if accessible.is_empty() {
            return failed(available);
        }

        info!("No heuristic candidate; asking completion service to search {} collections", accessible.len());
        let raw = match self
            .completion
            .complete(&prompts::open_search_prompt(query, accessible))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Open search call failed: {}", e);
                return failed(available);
            }
        };

        let choice = match parse_arbitration(&raw) {
            ParseResult::Ok(choice) => choice,
            ParseResult::Malformed(raw) => {
                warn!("Unparseable open-search response: {:?}", raw);
                return failed(available);
            }
        };

        let known = choice.collection.as_deref().and_then(|name| {
            available
                .iter()
                .find(|a| a.eq_ignore_ascii_case(name.trim()))
                .cloned()
        });

        match known {
            Some(collection_name) => ResolutionOutcome::Resolved {
                collection_name,
                rationale: if choice.matching_fields.is_empty() {
                    choice.reason
                } else {
                    format!("{} (fields: {})", choice.reason, choice.matching_fields.join(", "))
                },
                method: ResolutionMethod::Fallback,
            },
            None => failed(available),
        }
    }

    /// Verify a collection named upstream (e.g. by report decomposition).
    pub fn resolve_hinted(&self, name: &str, profiles: &[CollectionProfile]) -> ResolutionOutcome {
        let accessible = self.accessible_profiles(profiles);
        match accessible.iter().find(|p| p.name.eq_ignore_ascii_case(name.trim())) {
            Some(profile) => ResolutionOutcome::Resolved {
                collection_name: profile.name.clone(),
                rationale: format!("collection '{}' named by request decomposition", profile.name),
                method: ResolutionMethod::Hinted,
            },
            None => ResolutionOutcome::Failed {
                reason: NO_MATCH_REASON.to_string(),
                candidates_considered: accessible.into_iter().map(|p| p.name).collect(),
            },
        }
    }
}
