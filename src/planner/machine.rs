use crate::error::{EngineError, EngineResult};
use crate::memory::CategorySelection;
use crate::planner::types::{FollowUp, NextStep, Priority, TaskPhase, TaskState};
use crate::services::{self, MalformedOutput, Planner};
use crate::telemetry::{ConversationOutcome, Telemetry, TelemetryEvent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const DEFAULT_MAX_TURNS: u32 = 8;

const RESTATE_FIELD: &str = "clarification";
const RESTATE_QUESTION: &str =
    "I could not work out the next step. Could you restate what you need, with any details that matter?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    /// Planner turns allowed per conversation.
    pub max_turns: u32,
    pub call_timeout: Duration,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            call_timeout: Duration::from_secs(60),
        }
    }
}

/// Where the user's replies come from: a console, a chat socket, a script.
#[async_trait]
pub trait AnswerSource: Send {
    /// Present `questions` (already in ask order) and return one reply.
    async fn answer(&mut self, questions: &[FollowUp]) -> anyhow::Result<String>;
}

/// Result of one planner turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    NeedsInput(Vec<FollowUp>),
    Completed(String),
}

/// Final payload of a finished conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub conversation_id: Uuid,
    pub result: String,
    pub summary: String,
    pub user_response: Option<String>,
    pub turns: u32,
}

/// One task's state across turns. Owned by exactly one driver.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: Uuid,
    state: TaskState,
    turns: u32,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: TaskState::seed(),
            turns: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn is_finished(&self) -> bool {
        self.turns > 0 && self.state.phase() == TaskPhase::Executing
    }

    fn outcome(&self) -> TurnOutcome {
        match self.state.phase() {
            TaskPhase::Executing => TurnOutcome::Completed(self.state.result.clone().unwrap_or_default()),
            TaskPhase::GatheringInput => TurnOutcome::NeedsInput(self.state.ordered_followups()),
        }
    }
}

/// Validate a planner candidate against the task-state invariant.
///
/// Returns the state to adopt and whether it had to be coerced. A coerced
/// state keeps gathering input with a single restate question, so it satisfies
/// the invariant itself.
pub fn validate(candidate: TaskState, previous: &TaskState) -> (TaskState, bool) {
    match candidate.check() {
        Ok(()) => {
            let mut state = candidate;
            let expected = if state.needs_more_input { NextStep::Ask } else { NextStep::Execute };
            if state.next_step != expected {
                warn!("Planner next step {:?} disagrees with needs_more_input, using {:?}", state.next_step, expected);
                state.next_step = expected;
            }
            (state, false)
        }
        Err(reason) => {
            error!("Rejected planner state: {}", reason);
            (coerce(Some(&candidate.task_summary), previous), true)
        }
    }
}

fn coerce(summary: Option<&str>, previous: &TaskState) -> TaskState {
    let summary = match summary {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => previous.task_summary.clone(),
    };
    let mut question = FollowUp::new(RESTATE_FIELD, RESTATE_QUESTION, Priority::Critical);
    question.reason = "The previous step produced no usable plan".to_string();
    TaskState::asking(summary, vec![question])
}

/// Drives conversations: planner call, validation, question ordering,
/// termination. Never touches the fact store.
#[derive(Clone)]
pub struct TaskStateMachine {
    planner: Arc<dyn Planner>,
    config: MachineConfig,
    telemetry: Telemetry,
}

impl TaskStateMachine {
    pub fn new(planner: Arc<dyn Planner>, config: MachineConfig) -> Self {
        Self {
            planner,
            config,
            telemetry: Telemetry::new(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// One turn. On error the conversation is left exactly as it was.
    pub async fn step(
        &self,
        conversation: &mut Conversation,
        input: &str,
        facts: &CategorySelection,
        cancel: &CancellationToken,
    ) -> EngineResult<TurnOutcome> {
        if conversation.is_finished() {
            return Ok(conversation.outcome());
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if conversation.turns >= self.config.max_turns {
            return Err(EngineError::MaxTurnsExceeded {
                limit: self.config.max_turns,
            });
        }

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            reply = services::timed(
                "planner",
                self.config.call_timeout,
                self.planner.advance(&conversation.state, facts, input),
            ) => reply,
        };

        let candidate = match reply {
            Ok(Ok(state)) => Some(state),
            Ok(Err(e)) if e.is::<MalformedOutput>() => {
                error!("{}", EngineError::MalformedTaskState(e.to_string()));
                None
            }
            Ok(Err(e)) => {
                self.capability_failed();
                return Err(services::unavailable("planner", e));
            }
            Err(e) => {
                self.capability_failed();
                return Err(e);
            }
        };

        let (next, coerced) = match candidate {
            Some(candidate) => validate(candidate, &conversation.state),
            None => (coerce(None, &conversation.state), true),
        };

        conversation.turns += 1;
        conversation.state = next;

        if coerced {
            self.telemetry.record(TelemetryEvent::StateCoerced {
                conversation_id: conversation.id,
                turn: conversation.turns,
            });
        }
        self.telemetry.record(TelemetryEvent::TurnCompleted {
            conversation_id: conversation.id,
            turn: conversation.turns,
            needs_input: conversation.state.needs_more_input,
        });

        Ok(conversation.outcome())
    }

    /// Loop until the planner produces a result, asking `answers` for every
    /// round of follow-ups.
    pub async fn run(
        &self,
        query: &str,
        facts: &CategorySelection,
        answers: &mut dyn AnswerSource,
        cancel: &CancellationToken,
    ) -> EngineResult<TaskResult> {
        let mut conversation = Conversation::new();
        let span = info_span!("conversation", id = %conversation.id);

        let result = self
            .drive(&mut conversation, query, facts, answers, cancel)
            .instrument(span)
            .await;

        let outcome = match &result {
            Ok(_) => ConversationOutcome::Completed,
            Err(EngineError::Cancelled) => ConversationOutcome::Cancelled,
            Err(EngineError::MaxTurnsExceeded { .. }) => ConversationOutcome::MaxTurns,
            Err(_) => ConversationOutcome::Failed,
        };
        self.telemetry.record(TelemetryEvent::ConversationEnded {
            conversation_id: conversation.id,
            turns: conversation.turns,
            outcome,
        });

        result
    }

    async fn drive(
        &self,
        conversation: &mut Conversation,
        query: &str,
        facts: &CategorySelection,
        answers: &mut dyn AnswerSource,
        cancel: &CancellationToken,
    ) -> EngineResult<TaskResult> {
        let mut input = query.to_string();

        loop {
            match self.step(conversation, &input, facts, cancel).await? {
                TurnOutcome::Completed(result) => {
                    info!("Task finished after {} turn(s)", conversation.turns);
                    return Ok(TaskResult {
                        conversation_id: conversation.id,
                        result,
                        summary: conversation.state.task_summary.clone(),
                        user_response: conversation.state.user_response.clone(),
                        turns: conversation.turns,
                    });
                }
                TurnOutcome::NeedsInput(questions) => {
                    if conversation.turns >= self.config.max_turns {
                        warn!("Turn limit {} reached with questions pending", self.config.max_turns);
                        return Err(EngineError::MaxTurnsExceeded {
                            limit: self.config.max_turns,
                        });
                    }
                    info!("Asking {} follow-up question(s)", questions.len());
                    input = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                        reply = answers.answer(&questions) => {
                            reply.map_err(|e| EngineError::capability("answer source", format!("{:#}", e)))?
                        }
                    };
                }
            }
        }
    }

    fn capability_failed(&self) {
        self.telemetry.record(TelemetryEvent::CapabilityFailed {
            capability: "planner".to_string(),
        });
    }
}
