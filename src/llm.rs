use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Text-completion capability: prompt in, free text out.
///
/// Implementations may fail, and nothing about the output format is
/// guaranteed; callers parse defensively through [`ParseResult`].
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Outcome of parsing a completion response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult<T> {
    Ok(T),
    Malformed(String),
}

impl<T> ParseResult<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            ParseResult::Ok(value) => Some(value),
            ParseResult::Malformed(_) => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ParseResult::Ok(_))
    }
}

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").unwrap();
}

/// Body of the first fenced code block, preferring a ```sql fence.
pub fn extract_code_block(raw: &str) -> ParseResult<String> {
    let blocks: Vec<(String, String)> = CODE_FENCE
        .captures_iter(raw)
        .map(|c| (c[1].to_lowercase(), c[2].trim().to_string()))
        .filter(|(_, body)| !body.is_empty())
        .collect();

    let chosen = blocks
        .iter()
        .find(|(lang, _)| lang == "sql")
        .or_else(|| blocks.iter().find(|(lang, _)| lang.is_empty()));

    match chosen {
        Some((_, body)) => ParseResult::Ok(body.clone()),
        None => ParseResult::Malformed(raw.to_string()),
    }
}

/// Parse a JSON object from a response, tolerating markdown fences and surrounding prose.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> ParseResult<T> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Ok(value) = serde_json::from_str::<T>(cleaned) {
        return ParseResult::Ok(value);
    }

    // Fall back to the outermost {...} span
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<T>(&cleaned[start..=end]) {
                return ParseResult::Ok(value);
            }
        }
    }

    ParseResult::Malformed(raw.to_string())
}

/// OpenAI-compatible chat-completions client
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            model,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        config
            .api_key
            .as_ref()
            .map(|key| Self::new(key.clone(), config.model.clone(), config.base_url.clone()))
    }

    pub async fn call_llm(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a careful data-analysis assistant. Follow the requested output format exactly."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
        });

        // Reasoning models spend tokens before answering
        if self.model.starts_with("gpt-5") || self.model.contains("o1") {
            body["max_completion_tokens"] = serde_json::json!(2000);
        } else {
            body["max_tokens"] = serde_json::json!(800);
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AssistantError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(error) = response_json.get("error") {
            return Err(AssistantError::Llm(format!("LLM API error: {}", error)));
        }

        let choice = response_json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| AssistantError::Llm("No choices in LLM response".to_string()))?;

        match choice.get("finish_reason").and_then(|r| r.as_str()) {
            Some("length") => warn!("LLM response was truncated due to length limit"),
            Some("content_filter") => {
                return Err(AssistantError::Llm(
                    "LLM response was filtered by content policy".to_string(),
                ))
            }
            _ => {}
        }

        let content = choice["message"]["content"]
            .as_str()
            .ok_or_else(|| AssistantError::Llm("No content in LLM response".to_string()))?;

        if content.trim().is_empty() {
            return Err(AssistantError::Llm("Empty content in LLM response".to_string()));
        }

        debug!("LLM returned {} chars", content.len());
        Ok(content.to_string())
    }
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.call_llm(prompt).await
    }
}

/// Stand-in used when no completion service is configured. Every call fails,
/// so the pipeline runs on its deterministic paths and fails safe elsewhere.
#[derive(Debug, Clone, Default)]
pub struct OfflineCompletion;

#[async_trait]
impl CompletionService for OfflineCompletion {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(AssistantError::Llm("completion service not configured".to_string()))
    }
}

/// Replays queued responses in order and records every prompt it receives.
///
/// Used for offline demos (`--replay`) and for driving the pipeline
/// deterministically. Once the queue is empty every call fails.
#[derive(Debug, Default)]
pub struct ReplayCompletion {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ReplayCompletion {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Parse a replay file: responses separated by lines containing only `---`.
    pub fn from_script(script: &str) -> Self {
        let mut responses = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for line in script.lines() {
            if line.trim() == "---" {
                responses.push(current.join("\n"));
                current.clear();
            } else {
                current.push(line);
            }
        }
        if !current.is_empty() {
            responses.push(current.join("\n"));
        }
        Self::new(responses)
    }

    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response.into()));
        }
    }

    /// Queue a service failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(message.into()));
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CompletionService for ReplayCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self
            .responses
            .lock()
            .map_err(|_| AssistantError::Llm("replay queue poisoned".to_string()))?
            .pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(AssistantError::Llm(message)),
            None => Err(AssistantError::Llm("replay script exhausted".to_string())),
        }
    }
}
