//! Transform synthesis loop
//!
//! Bounded retry loop with error recovery: ask for a procedure, run it in the
//! sandbox, and on failure ask for a correction that carries the failing code
//! and the verbatim error. The synthesis prompt is sent once; only the code
//! changes between attempts. When the budget runs out the untouched input is
//! returned.

use crate::config::SynthesisConfig;
use crate::error::AssistantError;
use crate::execution_loop::error_classifier::ErrorClassifier;
use crate::execution_loop::sandbox::Sandbox;
use crate::llm::{extract_code_block, CompletionService, ParseResult};
use crate::prompts;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One procedure and how running it went. Internal diagnostics only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisAttempt {
    pub code: String,
    pub attempt_index: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisStatus {
    /// A procedure ran successfully; the table is its output
    Transformed,
    /// Retry budget exhausted; the table is the original input
    Degraded,
}

#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub table: DataFrame,
    pub status: SynthesisStatus,
    pub attempts: Vec<SynthesisAttempt>,
}

/// Candidate procedure, or the raw text and error that prevented getting one
type Candidate = std::result::Result<String, (String, AssistantError)>;

pub struct TransformSynthesizer {
    completion: Arc<dyn CompletionService>,
    sandbox: Arc<dyn Sandbox>,
    config: SynthesisConfig,
    error_classifier: ErrorClassifier,
}

impl TransformSynthesizer {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        sandbox: Arc<dyn Sandbox>,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            completion,
            sandbox,
            config,
            error_classifier: ErrorClassifier::new(),
        }
    }

    async fn request_code(&self, prompt: &str) -> Candidate {
        match self.completion.complete(prompt).await {
            Ok(raw) => match extract_code_block(&raw) {
                ParseResult::Ok(code) => Ok(code),
                ParseResult::Malformed(raw) => Err((
                    raw,
                    AssistantError::Synthesis("completion response has no ```sql fenced block".to_string()),
                )),
            },
            Err(e) => Err((String::new(), e)),
        }
    }

    /// Transform `input` to answer `query`; `summary` describes the input table.
    pub async fn synthesize(&self, query: &str, summary: &str, input: &DataFrame) -> SynthesisOutcome {
        let max_retries = self.config.max_retries;
        let mut attempts: Vec<SynthesisAttempt> = Vec::new();
        let mut candidate = self.request_code(&prompts::synthesis_prompt(query, summary)).await;

        for attempt_index in 0..=max_retries {
            let (code, error) = match candidate {
                Ok(code) => {
                    debug!(attempt_index, "Running procedure:\n{}", code);
                    match self.sandbox.run(&code, input.clone(), self.config.timeout).await {
                        Ok(table) => {
                            info!("Procedure succeeded on attempt {}", attempt_index);
                            attempts.push(SynthesisAttempt {
                                code,
                                attempt_index,
                                error: None,
                            });
                            return SynthesisOutcome {
                                table,
                                status: SynthesisStatus::Transformed,
                                attempts,
                            };
                        }
                        Err(e) => (code, e),
                    }
                }
                Err((raw, e)) => (raw, e),
            };

            let class = self.error_classifier.classify(&error);
            let message = error.to_string();
            debug!(attempt_index, %class, "Attempt failed: {}", message);
            attempts.push(SynthesisAttempt {
                code: code.clone(),
                attempt_index,
                error: Some(message.clone()),
            });

            if attempt_index == max_retries {
                break;
            }

            let prompt = prompts::correction_prompt(query, &code, &message, class.hint());
            candidate = self.request_code(&prompt).await;
        }

        warn!(
            "No procedure succeeded after {} attempts; returning the original table",
            attempts.len()
        );
        SynthesisOutcome {
            table: input.clone(),
            status: SynthesisStatus::Degraded,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution_loop::sandbox::PolarsSqlSandbox;
    use crate::llm::ReplayCompletion;
    use crate::error::Result;
    use async_trait::async_trait;
    use polars::prelude::*;
    use std::time::Duration;

    fn sales() -> DataFrame {
        df![
            "channel" => ["web", "store", "web"],
            "revenue" => [100.0, 40.0, 60.0]
        ]
        .unwrap()
    }

    fn fenced(sql: &str) -> String {
        format!("```sql\n{}\n```", sql)
    }

    fn synthesizer(replay: Arc<ReplayCompletion>, max_retries: usize) -> TransformSynthesizer {
        TransformSynthesizer::new(
            replay,
            Arc::new(PolarsSqlSandbox),
            SynthesisConfig {
                max_retries,
                timeout: Duration::from_secs(10),
            },
        )
    }

    #[tokio::test]
    async fn test_first_attempt_succeeds() {
        let replay = Arc::new(ReplayCompletion::new([fenced("SELECT * FROM df WHERE channel = 'web'")]));
        let outcome = synthesizer(replay.clone(), 5).synthesize("web sales", "summary", &sales()).await;

        assert_eq!(outcome.status, SynthesisStatus::Transformed);
        assert_eq!(outcome.table.height(), 2);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.attempts[0].error, None);
        assert_eq!(replay.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_attempt_feeds_error_into_one_correction() {
        let replay = Arc::new(ReplayCompletion::new([
            fenced("SELECT revnue FROM df"),
            fenced("SELECT revenue FROM df"),
        ]));
        let outcome = synthesizer(replay.clone(), 5).synthesize("revenue", "summary", &sales()).await;

        assert_eq!(outcome.status, SynthesisStatus::Transformed);
        assert_eq!(outcome.attempts.len(), 2);
        let first_error = outcome.attempts[0].error.clone().unwrap();

        let prompts = replay.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains(&first_error));
        assert!(prompts[1].contains("SELECT revnue FROM df"));
        assert!(!prompts[0].contains(&first_error));
    }

    #[tokio::test]
    async fn test_exhausted_budget_returns_original_table() {
        let replay = Arc::new(ReplayCompletion::new([
            fenced("SELECT nope FROM df"),
            "I cannot do that".to_string(),
            fenced("DROP TABLE df"),
            fenced("SELECT never_used FROM df"),
        ]));
        let input = sales();
        let outcome = synthesizer(replay.clone(), 2).synthesize("q", "summary", &input).await;

        assert_eq!(outcome.status, SynthesisStatus::Degraded);
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome.attempts.iter().all(|a| a.error.is_some()));
        assert_eq!(
            outcome.attempts.iter().map(|a| a.attempt_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(outcome.attempts[1].code, "I cannot do that");
        assert!(outcome.table.equals_missing(&input));
        assert_eq!(replay.call_count(), 3);
    }

    struct SlowSandbox;

    #[async_trait]
    impl Sandbox for SlowSandbox {
        async fn run(&self, _code: &str, input: DataFrame, timeout: Duration) -> Result<DataFrame> {
            match tokio::time::timeout(timeout, tokio::time::sleep(Duration::from_secs(60))).await {
                Err(_) => Err(AssistantError::ExecutionTimeout(timeout)),
                Ok(()) => Ok(input.head(Some(1))),
            }
        }
    }

    #[tokio::test]
    async fn test_timeouts_count_as_failures() {
        let replay = Arc::new(ReplayCompletion::new([
            fenced("SELECT * FROM df"),
            fenced("SELECT * FROM df LIMIT 1"),
        ]));
        let synthesizer = TransformSynthesizer::new(
            replay.clone(),
            Arc::new(SlowSandbox),
            SynthesisConfig {
                max_retries: 1,
                timeout: Duration::from_millis(20),
            },
        );
        let input = sales();
        let outcome = synthesizer.synthesize("q", "summary", &input).await;

        assert_eq!(outcome.status, SynthesisStatus::Degraded);
        assert_eq!(outcome.attempts.len(), 2);
        assert!(outcome.attempts[0].error.as_ref().unwrap().contains("timed out"));
        assert!(replay.prompts()[1].contains("ran too long"));
        assert!(outcome.table.equals_missing(&input));
    }
}
