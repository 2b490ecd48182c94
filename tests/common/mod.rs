#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use persona::memory::{
    CategorizedFact, Category, CategorySelection, Fact, FactId, FactStore, RankedFact, ReconciliationDecision,
};
use persona::planner::{AnswerSource, FollowUp, TaskState};
use persona::services::{CategoryRanker, Classifier, FactRanker, MalformedOutput, Planner, Reconciler, Responder, Route};
use persona::Capabilities;

pub fn store_with(facts: &[(&str, &str, &str)]) -> FactStore {
    let mut store = FactStore::default();
    for (category, id, text) in facts {
        store
            .categories
            .entry(category.to_string())
            .or_insert_with(|| Category::new(category))
            .facts
            .push(Fact::new(*id, *text, "t0"));
    }
    store
}

pub fn write_store(path: &Path, store: &FactStore) {
    std::fs::write(path, store.to_json().unwrap()).unwrap();
}

/// What the canned planner does on a call.
#[derive(Clone)]
pub enum PlannerStep {
    State(TaskState),
    Malformed,
    Fail,
    Hang,
}

/// Canned provider for every capability. Planner steps are consumed in order;
/// an exhausted script fails the call.
pub struct Canned {
    pub route: Route,
    pub decision: ReconciliationDecision,
    pub categories: Vec<String>,
    pub ranking: Vec<(FactId, f32)>,
    pub reply: String,
    pub planner_steps: Mutex<VecDeque<PlannerStep>>,
    pub planner_inputs: Mutex<Vec<String>>,
    pub seen_selection: Mutex<Option<CategorySelection>>,
    pub seen_ranked: Mutex<Vec<RankedFact>>,
    pub seen_corpus: Mutex<Vec<CategorizedFact>>,
}

impl Default for Canned {
    fn default() -> Self {
        Self {
            route: Route::default(),
            decision: ReconciliationDecision::NoOp,
            categories: Vec::new(),
            ranking: Vec::new(),
            reply: "canned reply".to_string(),
            planner_steps: Mutex::new(VecDeque::new()),
            planner_inputs: Mutex::new(Vec::new()),
            seen_selection: Mutex::new(None),
            seen_ranked: Mutex::new(Vec::new()),
            seen_corpus: Mutex::new(Vec::new()),
        }
    }
}

impl Canned {
    pub fn with_planner(steps: Vec<PlannerStep>) -> Self {
        Self {
            planner_steps: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    pub fn into_capabilities(self) -> (Arc<Self>, Capabilities) {
        let shared = Arc::new(self);
        (shared.clone(), Capabilities::from_provider(shared))
    }
}

#[async_trait]
impl Classifier for Canned {
    async fn classify(&self, _text: &str) -> anyhow::Result<Route> {
        Ok(self.route)
    }
}

#[async_trait]
impl Reconciler for Canned {
    async fn propose(&self, _text: &str, corpus: &[CategorizedFact]) -> anyhow::Result<ReconciliationDecision> {
        *self.seen_corpus.lock().unwrap() = corpus.to_vec();
        Ok(self.decision.clone())
    }
}

#[async_trait]
impl CategoryRanker for Canned {
    async fn rank_categories(&self, _text: &str, _available: &FactStore) -> anyhow::Result<Vec<String>> {
        Ok(self.categories.clone())
    }
}

#[async_trait]
impl FactRanker for Canned {
    async fn rank_facts(&self, _text: &str, _corpus: &[CategorizedFact]) -> anyhow::Result<Vec<(FactId, f32)>> {
        Ok(self.ranking.clone())
    }
}

#[async_trait]
impl Planner for Canned {
    async fn advance(&self, _state: &TaskState, facts: &CategorySelection, input: &str) -> anyhow::Result<TaskState> {
        self.planner_inputs.lock().unwrap().push(input.to_string());
        *self.seen_selection.lock().unwrap() = Some(facts.clone());

        let step = self.planner_steps.lock().unwrap().pop_front();
        match step {
            Some(PlannerStep::State(state)) => Ok(state),
            Some(PlannerStep::Malformed) => Err(anyhow::Error::new(MalformedOutput {
                capability: "planner",
                reason: "no JSON value found".to_string(),
            })),
            Some(PlannerStep::Fail) | None => Err(anyhow::anyhow!("connection refused")),
            Some(PlannerStep::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(anyhow::anyhow!("unreachable"))
            }
        }
    }
}

#[async_trait]
impl Responder for Canned {
    async fn respond(&self, _text: &str, facts: &[RankedFact]) -> anyhow::Result<String> {
        *self.seen_ranked.lock().unwrap() = facts.to_vec();
        Ok(self.reply.clone())
    }
}

/// Replies from a fixed list and records every round of questions it saw.
#[derive(Default)]
pub struct ScriptedAnswers {
    pub replies: VecDeque<String>,
    pub asked: Vec<Vec<FollowUp>>,
}

impl ScriptedAnswers {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            asked: Vec::new(),
        }
    }
}

#[async_trait]
impl AnswerSource for ScriptedAnswers {
    async fn answer(&mut self, questions: &[FollowUp]) -> anyhow::Result<String> {
        self.asked.push(questions.to_vec());
        self.replies
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no more scripted replies"))
    }
}
