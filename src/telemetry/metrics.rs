use std::collections::VecDeque;
use super::event::{ConversationOutcome, FactEventKind, TelemetryEvent};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub fact_stats: FactStats,
    pub store_stats: StoreStats,
    pub route_stats: RouteStats,
    pub conversation_stats: ConversationStats,
    pub capability_failures: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactStats {
    pub added: u64,
    pub updated: u64,
    pub skipped: u64,
    pub collisions: u64,
    pub minted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub saves: u64,
    pub last_fact_count: usize,
    pub last_category_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteStats {
    pub direct: u64,
    pub planned: u64,
    pub reconciliations: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationStats {
    pub turns: u64,
    pub coerced: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub max_turns: u64,
    pub failed: u64,
    pub avg_turns_to_complete: f64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();
    let mut completed_turns = 0u64;

    for event in events {
        match event {
            TelemetryEvent::FactEvent { kind, .. } => match kind {
                FactEventKind::Added => snap.fact_stats.added += 1,
                FactEventKind::Updated => snap.fact_stats.updated += 1,
                FactEventKind::Skipped => snap.fact_stats.skipped += 1,
                FactEventKind::Collision => snap.fact_stats.collisions += 1,
                FactEventKind::Minted => snap.fact_stats.minted += 1,
            },
            TelemetryEvent::StoreSaved { facts, categories } => {
                snap.store_stats.saves += 1;
                snap.store_stats.last_fact_count = *facts;
                snap.store_stats.last_category_count = *categories;
            }
            TelemetryEvent::Routed { direct_answer, reconcile } => {
                if *direct_answer {
                    snap.route_stats.direct += 1;
                } else {
                    snap.route_stats.planned += 1;
                }
                if *reconcile {
                    snap.route_stats.reconciliations += 1;
                }
            }
            TelemetryEvent::TurnCompleted { .. } => snap.conversation_stats.turns += 1,
            TelemetryEvent::StateCoerced { .. } => snap.conversation_stats.coerced += 1,
            TelemetryEvent::ConversationEnded { turns, outcome, .. } => match outcome {
                ConversationOutcome::Completed => {
                    snap.conversation_stats.completed += 1;
                    completed_turns += u64::from(*turns);
                }
                ConversationOutcome::Cancelled => snap.conversation_stats.cancelled += 1,
                ConversationOutcome::MaxTurns => snap.conversation_stats.max_turns += 1,
                ConversationOutcome::Failed => snap.conversation_stats.failed += 1,
            },
            TelemetryEvent::CapabilityFailed { .. } => snap.capability_failures += 1,
        }
    }

    if snap.conversation_stats.completed > 0 {
        snap.conversation_stats.avg_turns_to_complete =
            completed_turns as f64 / snap.conversation_stats.completed as f64;
    }

    snap
}
