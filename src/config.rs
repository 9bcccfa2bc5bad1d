//! Assistant configuration
//!
//! Every tunable of the pipeline lives here. Defaults mirror the reference
//! behaviour; `from_env` layers environment overrides on top (a `.env` file
//! is honoured through `dotenv`).

use crate::error::{AssistantError, Result};
use std::str::FromStr;
use std::time::Duration;

/// Completion-service connection settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

/// Scoring constants for the source resolver.
///
/// The weights are empirical; they are kept configurable rather than derived.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Multiplier applied to header (field-name) matches
    pub header_weight: f64,
    /// Fraction of the primary score at or above which another candidate is an alternative
    pub alternative_ratio: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            header_weight: 1.2,
            alternative_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub max_retries: usize,
    pub timeout: Duration,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    /// Cap on distinct values kept per categorical field
    pub max_unique_values: usize,
    /// Optional cap on documents sampled per collection (None = all)
    pub sample_limit: Option<usize>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            max_unique_values: 50,
            sample_limit: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub llm: LlmConfig,
    pub resolver: ResolverConfig,
    pub synthesis: SynthesisConfig,
    pub profiler: ProfilerConfig,
    /// Capacity of each completion-response cache
    pub cache_capacity: usize,
    /// Collections that must never be surfaced or resolved
    pub restricted_collections: Vec<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            resolver: ResolverConfig::default(),
            synthesis: SynthesisConfig::default(),
            profiler: ProfilerConfig::default(),
            cache_capacity: 128,
            restricted_collections: Vec::new(),
        }
    }
}

impl AssistantConfig {
    /// Build a config from defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.llm.api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        if let Some(model) = lookup("OPENAI_MODEL") {
            config.llm.model = model;
        }
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            config.llm.base_url = base_url;
        }

        if let Some(weight) = parse_var::<f64>(&lookup, "ASKDATA_HEADER_WEIGHT")? {
            config.resolver.header_weight = weight;
        }
        if let Some(ratio) = parse_var::<f64>(&lookup, "ASKDATA_ALTERNATIVE_RATIO")? {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(AssistantError::Config(format!(
                    "ASKDATA_ALTERNATIVE_RATIO must be within 0..=1, got {}",
                    ratio
                )));
            }
            config.resolver.alternative_ratio = ratio;
        }
        if let Some(retries) = parse_var::<usize>(&lookup, "ASKDATA_MAX_RETRIES")? {
            config.synthesis.max_retries = retries;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ASKDATA_EXEC_TIMEOUT_SECS")? {
            config.synthesis.timeout = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, "ASKDATA_CACHE_CAPACITY")? {
            config.cache_capacity = capacity;
        }
        if let Some(max_values) = parse_var::<usize>(&lookup, "ASKDATA_MAX_UNIQUE_VALUES")? {
            config.profiler.max_unique_values = max_values;
        }
        config.profiler.sample_limit = parse_var::<usize>(&lookup, "ASKDATA_SAMPLE_LIMIT")?;

        if let Some(restricted) = lookup("ASKDATA_RESTRICTED") {
            config.restricted_collections = split_list(&restricted);
        }

        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AssistantError::Config(format!("Invalid value for {}: '{}' ({})", key, raw, e))),
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_reference_constants() {
        let config = AssistantConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.resolver.header_weight, 1.2);
        assert_eq!(config.resolver.alternative_ratio, 0.7);
        assert_eq!(config.synthesis.max_retries, 5);
        assert_eq!(config.synthesis.timeout, Duration::from_secs(30));
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = AssistantConfig::from_lookup(lookup_from(&[
            ("ASKDATA_MAX_RETRIES", "2"),
            ("ASKDATA_RESTRICTED", "users, audit_log ,"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert_eq!(config.synthesis.max_retries, 2);
        assert_eq!(config.restricted_collections, vec!["users", "audit_log"]);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_malformed_value_is_config_error() {
        let err = AssistantConfig::from_lookup(lookup_from(&[("ASKDATA_HEADER_WEIGHT", "heavy")]))
            .unwrap_err();
        assert!(matches!(err, AssistantError::Config(_)));
    }
}
