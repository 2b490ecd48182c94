use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::prompts;
use crate::config::EngineConfig;
use crate::memory::{CategorizedFact, CategorySelection, FactId, FactStore, RankedFact, ReconciliationDecision};
use crate::planner::TaskState;
use crate::services::{parse, CategoryRanker, Classifier, FactRanker, Planner, Reconciler, Responder, Route};

/// Every capability backed by one llama-server style completion endpoint.
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    base_url: String,
    n_predict: usize,
    temperature: f32,
}

#[derive(Serialize)]
struct CompletionRequest {
    prompt: String,
    stream: bool,
    n_predict: usize,
    temperature: f32,
    stop: Vec<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
}

impl LlmService {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            // Network-level bound; the engine applies its own per-call timeout on top.
            .timeout(config.capability_timeout() + Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: config.llm.base_url.trim_end_matches('/').to_string(),
            n_predict: config.llm.n_predict,
            temperature: config.llm.temperature,
        })
    }

    /// One-shot completion of `user_prompt` under the shared system prompt.
    pub async fn complete(&self, user_prompt: &str) -> Result<String> {
        let request_body = CompletionRequest {
            prompt: format!("System: {}\nUser: {}\nAssistant:", prompts::SYSTEM, user_prompt),
            stream: false,
            n_predict: self.n_predict,
            temperature: self.temperature,
            stop: vec!["User:".to_string(), "System:".to_string()],
        };

        let response = self
            .client
            .post(format!("{}/completion", self.base_url))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("LLM Server Error: {}", response.status()));
        }

        let resp_json: CompletionResponse = response.json().await?;
        debug!("Completion returned {} chars", resp_json.content.len());
        Ok(resp_json.content.trim().to_string())
    }
}

#[async_trait]
impl Classifier for LlmService {
    async fn classify(&self, text: &str) -> Result<Route> {
        let raw = self.complete(&prompts::classify(text)).await?;
        Ok(parse::route(&raw))
    }
}

#[async_trait]
impl Reconciler for LlmService {
    async fn propose(&self, text: &str, corpus: &[CategorizedFact]) -> Result<ReconciliationDecision> {
        let raw = self.complete(&prompts::reconcile(text, corpus)).await?;
        Ok(parse::decision(&raw))
    }
}

#[async_trait]
impl CategoryRanker for LlmService {
    async fn rank_categories(&self, text: &str, available: &FactStore) -> Result<Vec<String>> {
        if available.categories.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self.complete(&prompts::rank_categories(text, available)).await?;
        Ok(parse::categories(&raw))
    }
}

#[async_trait]
impl FactRanker for LlmService {
    async fn rank_facts(&self, text: &str, corpus: &[CategorizedFact]) -> Result<Vec<(FactId, f32)>> {
        if corpus.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self.complete(&prompts::rank_facts(text, corpus)).await?;
        Ok(parse::fact_ranking(&raw))
    }
}

#[async_trait]
impl Planner for LlmService {
    async fn advance(&self, state: &TaskState, facts: &CategorySelection, input: &str) -> Result<TaskState> {
        let raw = self.complete(&prompts::plan(state, facts, input)).await?;
        parse::task_state(&raw).map_err(anyhow::Error::new)
    }
}

#[async_trait]
impl Responder for LlmService {
    async fn respond(&self, text: &str, facts: &[RankedFact]) -> Result<String> {
        self.complete(&prompts::respond(text, facts)).await
    }
}
