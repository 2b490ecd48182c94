//! External capability providers.
//!
//! Each trait is a request/response contract. The engine never implements the
//! judgment behind them; it wraps every call in a timeout and turns failures
//! into `EngineError::CapabilityUnavailable`.

pub mod parse;
pub mod llm;

use crate::error::{EngineError, EngineResult};
use crate::memory::{CategorizedFact, CategorySelection, FactId, FactStore, RankedFact, ReconciliationDecision};
use crate::planner::types::TaskState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub use parse::MalformedOutput;

/// Classifier verdict for one piece of user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub needs_reconciliation: bool,
    pub direct_answer: bool,
}

impl Default for Route {
    /// No store mutation, answer directly.
    fn default() -> Self {
        Self {
            needs_reconciliation: false,
            direct_answer: true,
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> anyhow::Result<Route>;
}

#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn propose(&self, text: &str, corpus: &[CategorizedFact]) -> anyhow::Result<ReconciliationDecision>;
}

#[async_trait]
pub trait CategoryRanker: Send + Sync {
    /// Best-first category names. Callers use at most the first few.
    async fn rank_categories(&self, text: &str, available: &FactStore) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
pub trait FactRanker: Send + Sync {
    /// Best-first `(fact id, similarity)` pairs.
    async fn rank_facts(&self, text: &str, corpus: &[CategorizedFact]) -> anyhow::Result<Vec<(FactId, f32)>>;
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Candidate next state. An output that could not be read at all should be
    /// reported as a `MalformedOutput` error so the caller can coerce it.
    async fn advance(&self, state: &TaskState, facts: &CategorySelection, input: &str) -> anyhow::Result<TaskState>;
}

#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, text: &str, facts: &[RankedFact]) -> anyhow::Result<String>;
}

/// Run one capability call under `limit`. Only the timeout is mapped here;
/// the provider's own error is handed back untouched.
pub async fn timed<T, F>(capability: &'static str, limit: Duration, fut: F) -> EngineResult<anyhow::Result<T>>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        warn!("{} timed out after {:?}", capability, limit);
        EngineError::capability(capability, format!("timed out after {:?}", limit))
    })
}

/// Run one capability call under `limit`; any failure is `CapabilityUnavailable`.
pub async fn call<T, F>(capability: &'static str, limit: Duration, fut: F) -> EngineResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    timed(capability, limit, fut).await?.map_err(|e| unavailable(capability, e))
}

pub fn unavailable(capability: &'static str, e: anyhow::Error) -> EngineError {
    warn!("{} failed: {:#}", capability, e);
    EngineError::capability(capability, format!("{:#}", e))
}
