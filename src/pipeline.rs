//! Resolution-and-execution pipeline
//!
//! validate -> classify -> { resolve -> synthesize | decompose -> N x (resolve -> synthesize) }
//!
//! Every failure is turned into an `AssistantResponse::Error` or a degraded
//! answer; nothing escapes `Pipeline::run`.

use crate::cache::ResponseCache;
use crate::classifier::{QueryClassification, QueryClassifier};
use crate::config::AssistantConfig;
use crate::error::{AssistantError, Result};
use crate::execution_loop::{PolarsSqlSandbox, Sandbox, SynthesisAttempt, SynthesisStatus, TransformSynthesizer};
use crate::llm::CompletionService;
use crate::policy::{AccessPolicy, DenyList};
use crate::profiler::{CollectionProfile, CollectionProfiler};
use crate::report::{ReportOrchestrator, SectionRunner, SubQuery};
use crate::resolver::{ResolutionOutcome, SourceResolver};
use crate::response::{AssistantResponse, SectionKind, TableAnswer};
use crate::store::DocumentStore;
use crate::table::{describe_frame, records_to_frame};
use crate::validator::{QueryValidator, ValidationResult};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Internal trace of one run. Carries generated code and raw errors, so it is
/// for logs and operators, never for end users.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub query_id: String,
    pub validation: Option<ValidationResult>,
    pub classification: Option<QueryClassification>,
    pub resolutions: Vec<ResolutionOutcome>,
    /// One entry per synthesis run, in execution order
    pub attempts: Vec<Vec<SynthesisAttempt>>,
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub response: AssistantResponse,
    pub diagnostics: Diagnostics,
}

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    policy: Arc<dyn AccessPolicy>,
    profiler: CollectionProfiler,
    validator: QueryValidator,
    classifier: QueryClassifier,
    resolver: SourceResolver,
    synthesizer: TransformSynthesizer,
    reports: ReportOrchestrator,
}

impl Pipeline {
    pub fn new(
        config: &AssistantConfig,
        store: Arc<dyn DocumentStore>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self::with_sandbox(config, store, completion, Arc::new(PolarsSqlSandbox))
    }

    pub fn with_sandbox(
        config: &AssistantConfig,
        store: Arc<dyn DocumentStore>,
        completion: Arc<dyn CompletionService>,
        sandbox: Arc<dyn Sandbox>,
    ) -> Self {
        let policy: Arc<dyn AccessPolicy> = Arc::new(DenyList::new(&config.restricted_collections));
        Self {
            store,
            profiler: CollectionProfiler::new(config.profiler.clone()),
            validator: QueryValidator::new(
                completion.clone(),
                Arc::new(ResponseCache::new(config.cache_capacity)),
            ),
            classifier: QueryClassifier::new(
                completion.clone(),
                Arc::new(ResponseCache::new(config.cache_capacity)),
            ),
            resolver: SourceResolver::new(config.resolver.clone(), completion.clone(), policy.clone()),
            synthesizer: TransformSynthesizer::new(completion.clone(), sandbox, config.synthesis.clone()),
            reports: ReportOrchestrator::new(completion, policy.clone()),
            policy,
        }
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    /// Fresh profiles of every accessible collection.
    pub async fn profiles(&self) -> Result<Vec<CollectionProfile>> {
        self.profiler.profile_all(self.store.as_ref(), self.policy.as_ref()).await
    }

    pub async fn run(&self, query: &str) -> PipelineRun {
        let query_id = Uuid::new_v4().to_string();
        let span = info_span!("query", id = %query_id);
        let mut diagnostics = Diagnostics {
            query_id,
            ..Diagnostics::default()
        };
        let response = self.run_inner(query, &mut diagnostics).instrument(span).await;
        PipelineRun { response, diagnostics }
    }

    async fn run_inner(&self, query: &str, diagnostics: &mut Diagnostics) -> AssistantResponse {
        info!("Processing query: {:?}", query);

        let validation = self.validator.validate(query).await;
        diagnostics.validation = Some(validation.clone());
        if !validation.is_valid {
            let reason = validation.reason.unwrap_or_else(|| "invalid query".to_string());
            info!("Query rejected: {}", reason);
            return AssistantResponse::error(AssistantError::Validation(reason).user_message());
        }

        let classification = self.classifier.classify(query).await;
        diagnostics.classification = Some(classification);
        info!("Classified as {}", classification);

        let kind = match classification {
            QueryClassification::Error => {
                return AssistantResponse::error(
                    AssistantError::Classification(query.to_string()).user_message(),
                )
            }
            QueryClassification::Report => None,
            QueryClassification::Chart => Some(SectionKind::Chart),
            QueryClassification::Description => Some(SectionKind::Description),
        };

        let profiles = match self.profiles().await {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!("Profiling failed: {}", e);
                return AssistantResponse::error(e.user_message());
            }
        };

        let Some(kind) = kind else {
            return self.run_report(query, &profiles, diagnostics).await;
        };

        let resolution = self.resolver.resolve(query, &profiles).await;
        diagnostics.resolutions.push(resolution.clone());

        let (collection_name, rationale) = match resolution {
            ResolutionOutcome::Resolved {
                collection_name,
                rationale,
                ..
            } => (collection_name, rationale),
            ResolutionOutcome::Failed {
                reason,
                candidates_considered,
            } => {
                warn!("Resolution failed: {} (available: {:?})", reason, candidates_considered);
                return AssistantResponse::error(
                    AssistantError::Resolution {
                        reason,
                        available: candidates_considered,
                    }
                    .user_message(),
                );
            }
        };

        match self
            .answer_from_collection(query, &collection_name, &rationale, &profiles)
            .await
        {
            Ok((answer, attempts)) => {
                diagnostics.attempts.push(attempts);
                match kind {
                    SectionKind::Chart => AssistantResponse::Chart(answer),
                    SectionKind::Description => AssistantResponse::Description(answer),
                }
            }
            Err(e) => {
                warn!("Could not answer from '{}': {}", collection_name, e);
                AssistantResponse::error(e.user_message())
            }
        }
    }

    async fn run_report(
        &self,
        query: &str,
        profiles: &[CollectionProfile],
        diagnostics: &mut Diagnostics,
    ) -> AssistantResponse {
        let runner = ReportSections {
            pipeline: self,
            trace: Mutex::new(Diagnostics::default()),
        };
        let result = self.reports.run(query, profiles, &runner).await;

        if let Ok(trace) = runner.trace.into_inner() {
            diagnostics.resolutions.extend(trace.resolutions);
            diagnostics.attempts.extend(trace.attempts);
        }

        match result {
            Ok(sections) => AssistantResponse::Report { sections },
            Err(e) => {
                warn!("Report failed: {}", e);
                AssistantResponse::error(e.user_message())
            }
        }
    }

    /// Load a resolved collection, synthesize a transform for it and package the table.
    async fn answer_from_collection(
        &self,
        query: &str,
        collection_name: &str,
        rationale: &str,
        profiles: &[CollectionProfile],
    ) -> Result<(TableAnswer, Vec<SynthesisAttempt>)> {
        let profile = profiles
            .iter()
            .find(|p| p.name == collection_name)
            .ok_or_else(|| AssistantError::Store(format!("no profile for '{}'", collection_name)))?;

        let records = self.store.find_all(collection_name).await?;
        let table = records_to_frame(profile, &records)?;
        let summary = describe_frame(profile, &table);

        let outcome = self.synthesizer.synthesize(query, &summary, &table).await;
        let degraded = outcome.status == SynthesisStatus::Degraded;
        let answer = TableAnswer::from_frame(collection_name, rationale, degraded, &outcome.table)?;
        Ok((answer, outcome.attempts))
    }
}

struct ReportSections<'a> {
    pipeline: &'a Pipeline,
    trace: Mutex<Diagnostics>,
}

impl ReportSections<'_> {
    fn record(&self, update: impl FnOnce(&mut Diagnostics)) {
        if let Ok(mut trace) = self.trace.lock() {
            update(&mut trace);
        }
    }
}

#[async_trait]
impl<'a> SectionRunner for ReportSections<'a> {
    async fn run_section(&self, sub_query: &SubQuery, profiles: &[CollectionProfile]) -> Result<TableAnswer> {
        let resolution = self.pipeline.resolver.resolve_hinted(&sub_query.collection, profiles);
        self.record(|trace| trace.resolutions.push(resolution.clone()));

        let (collection_name, rationale) = match resolution {
            ResolutionOutcome::Resolved {
                collection_name,
                rationale,
                ..
            } => (collection_name, rationale),
            ResolutionOutcome::Failed {
                reason,
                candidates_considered,
            } => {
                return Err(AssistantError::Resolution {
                    reason,
                    available: candidates_considered,
                })
            }
        };

        let (answer, attempts) = self
            .pipeline
            .answer_from_collection(&sub_query.query, &collection_name, &rationale, profiles)
            .await?;
        self.record(|trace| trace.attempts.push(attempts));
        Ok(answer)
    }
}
