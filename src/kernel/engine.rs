use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::memory::{ApplyReport, RelevanceSelector, SharedFactStore};
use crate::planner::{AnswerSource, TaskResult, TaskStateMachine};
use crate::services::{self, CategoryRanker, Classifier, FactRanker, Planner, Reconciler, Responder, Route};
use crate::telemetry::{FactEventKind, Telemetry, TelemetryEvent};

/// Timestamp format written into fact histories.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// The external judgments the engine depends on.
#[derive(Clone)]
pub struct Capabilities {
    pub classifier: Arc<dyn Classifier>,
    pub reconciler: Arc<dyn Reconciler>,
    pub category_ranker: Arc<dyn CategoryRanker>,
    pub fact_ranker: Arc<dyn FactRanker>,
    pub planner: Arc<dyn Planner>,
    pub responder: Arc<dyn Responder>,
}

impl Capabilities {
    /// All six capabilities served by one provider.
    pub fn from_provider<P>(provider: Arc<P>) -> Self
    where
        P: Classifier + Reconciler + CategoryRanker + FactRanker + Planner + Responder + 'static,
    {
        Self {
            classifier: provider.clone(),
            reconciler: provider.clone(),
            category_ranker: provider.clone(),
            fact_ranker: provider.clone(),
            planner: provider.clone(),
            responder: provider,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Direct(String),
    Planned(TaskResult),
}

/// Everything one piece of user input produced.
#[derive(Debug)]
pub struct EngineOutcome {
    pub route: Route,
    pub reply: Reply,
    /// Present when the classifier flagged new personal information. A failed
    /// reconciliation does not fail the reply.
    pub reconciliation: Option<EngineResult<ApplyReport>>,
}

/// Routes user input between the fact store and the two answer paths.
pub struct Engine {
    capabilities: Capabilities,
    store: SharedFactStore,
    machine: TaskStateMachine,
    max_categories: usize,
    max_ranked_facts: usize,
    call_timeout: Duration,
    telemetry: Telemetry,
}

impl Engine {
    pub fn new(capabilities: Capabilities, store: SharedFactStore, config: &EngineConfig) -> Self {
        let telemetry = Telemetry::new();
        let machine = TaskStateMachine::new(capabilities.planner.clone(), config.machine())
            .with_telemetry(telemetry.clone());
        Self {
            capabilities,
            store,
            machine,
            max_categories: config.limits.max_categories,
            max_ranked_facts: config.limits.max_ranked_facts,
            call_timeout: config.capability_timeout(),
            telemetry,
        }
    }

    pub fn store(&self) -> &SharedFactStore {
        &self.store
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn machine(&self) -> &TaskStateMachine {
        &self.machine
    }

    /// Handle one user message end to end.
    ///
    /// Reconciliation (when flagged) runs alongside the reply path. The reply
    /// reads a snapshot, so it sees the store either before or after the
    /// reconciliation, never in between.
    pub async fn handle(
        &self,
        text: &str,
        answers: &mut dyn AnswerSource,
        cancel: &CancellationToken,
    ) -> EngineResult<EngineOutcome> {
        // 1. Route
        let route = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            route = services::call("classifier", self.call_timeout, self.capabilities.classifier.classify(text)) => route,
        };
        let route = route.inspect_err(|_| self.capability_failed("classifier"))?;

        info!(
            "Routed input: direct_answer={}, reconcile={}",
            route.direct_answer, route.needs_reconciliation
        );
        self.telemetry.record(TelemetryEvent::Routed {
            direct_answer: route.direct_answer,
            reconcile: route.needs_reconciliation,
        });

        // 2. Reconcile and answer
        let reconcile = async {
            if route.needs_reconciliation {
                Some(self.reconcile(text).await)
            } else {
                None
            }
        };
        let reply = async {
            if route.direct_answer {
                self.answer_directly(text, cancel).await.map(Reply::Direct)
            } else {
                self.plan(text, answers, cancel).await.map(Reply::Planned)
            }
        };

        let (reconciliation, reply) = tokio::join!(reconcile, reply);

        Ok(EngineOutcome {
            route,
            reply: reply?,
            reconciliation,
        })
    }

    /// Propose and apply a decision under the store's write lock, so the
    /// decision is applied to exactly the facts it was reasoned about.
    pub async fn reconcile(&self, text: &str) -> EngineResult<ApplyReport> {
        let span = info_span!("reconcile");
        async {
            let mut writer = self.store.writer().await;
            let corpus = writer.facts().flatten();

            let decision = services::call(
                "reconciler",
                self.call_timeout,
                self.capabilities.reconciler.propose(text, &corpus),
            )
            .await
            .inspect_err(|_| self.capability_failed("reconciler"))?;

            let report = writer.apply(&decision, &now_timestamp())?;
            self.record_report(&report);
            Ok::<_, EngineError>(report)
        }
        .instrument(span)
        .await
    }

    async fn answer_directly(&self, text: &str, cancel: &CancellationToken) -> EngineResult<String> {
        let snapshot = self.store.snapshot().await;
        let corpus = snapshot.flatten();

        let work = async {
            let ranking = services::call(
                "fact ranker",
                self.call_timeout,
                self.capabilities.fact_ranker.rank_facts(text, &corpus),
            )
            .await
            .inspect_err(|_| self.capability_failed("fact ranker"))?;

            let relevant = RelevanceSelector::by_ranked_facts(&corpus, &ranking, self.max_ranked_facts);
            info!("Answering directly with {} relevant fact(s)", relevant.len());

            services::call(
                "responder",
                self.call_timeout,
                self.capabilities.responder.respond(text, &relevant),
            )
            .await
            .inspect_err(|_| self.capability_failed("responder"))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            reply = work => reply,
        }
    }

    async fn plan(
        &self,
        text: &str,
        answers: &mut dyn AnswerSource,
        cancel: &CancellationToken,
    ) -> EngineResult<TaskResult> {
        let snapshot = self.store.snapshot().await;

        let names = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            names = services::call(
                "category ranker",
                self.call_timeout,
                self.capabilities.category_ranker.rank_categories(text, &snapshot),
            ) => names,
        };
        let names = names.inspect_err(|_| self.capability_failed("category ranker"))?;

        let selection = RelevanceSelector::by_category_names(&snapshot, &names, self.max_categories);
        if selection.is_empty() && !snapshot.categories.is_empty() {
            warn!("No known categories among {:?}", names);
        }
        info!("Planning with {} categor(ies)", selection.len());

        self.machine.run(text, &selection, answers, cancel).await
    }

    fn record_report(&self, report: &ApplyReport) {
        let fact_events = [
            (FactEventKind::Added, &report.added),
            (FactEventKind::Updated, &report.updated),
            (FactEventKind::Skipped, &report.skipped),
            (FactEventKind::Collision, &report.collisions),
        ];
        for (kind, ids) in fact_events {
            for fact_id in ids {
                self.telemetry.record(TelemetryEvent::FactEvent {
                    kind,
                    fact_id: fact_id.clone(),
                });
            }
        }
        for (_, minted) in &report.minted {
            self.telemetry.record(TelemetryEvent::FactEvent {
                kind: FactEventKind::Minted,
                fact_id: minted.clone(),
            });
        }
        if let Some(saved) = report.saved {
            self.telemetry.record(TelemetryEvent::StoreSaved {
                facts: saved.facts,
                categories: saved.categories,
            });
        }
    }

    fn capability_failed(&self, capability: &str) {
        self.telemetry.record(TelemetryEvent::CapabilityFailed {
            capability: capability.to_string(),
        });
    }
}
