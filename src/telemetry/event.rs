use crate::memory::types::FactId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Allowed: ids, counts, enums. Forbidden: user text, fact text, scores.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    FactEvent {
        kind: FactEventKind,
        fact_id: FactId,
    },

    StoreSaved {
        facts: usize,
        categories: usize,
    },

    Routed {
        direct_answer: bool,
        reconcile: bool,
    },

    TurnCompleted {
        conversation_id: Uuid,
        turn: u32,
        needs_input: bool,
    },

    StateCoerced {
        conversation_id: Uuid,
        turn: u32,
    },

    ConversationEnded {
        conversation_id: Uuid,
        turns: u32,
        outcome: ConversationOutcome,
    },

    CapabilityFailed {
        capability: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactEventKind {
    Added,
    Updated,
    /// Update target missing.
    Skipped,
    /// Add on an existing id, applied as update.
    Collision,
    Minted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationOutcome {
    Completed,
    Cancelled,
    MaxTurns,
    Failed,
}
