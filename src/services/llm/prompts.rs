use crate::memory::{CategorizedFact, CategorySelection, FactStore, RankedFact};
use crate::planner::TaskState;

pub const SYSTEM: &str = "You are a careful assistant that keeps a profile of facts about one user. \
When asked for JSON, reply with a single JSON value and nothing else.";

pub fn classify(text: &str) -> String {
    format!(
        "Classify the user's message along two axes.\n\
         needs_reconciliation: true if the message reveals new personal information \
         (preferences, constraints, companions, home, interests, dislikes) worth storing.\n\
         direct_answer: true if it can be answered directly; false if it asks for a \
         multi-step plan or itinerary.\n\
         Reply as {{\"needs_reconciliation\": bool, \"direct_answer\": bool}}.\n\n\
         Message: {}",
        text
    )
}

pub fn reconcile(text: &str, corpus: &[CategorizedFact]) -> String {
    let existing = serde_json::to_string_pretty(corpus).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Decide how the user's message changes the stored facts.\n\
         - Update a fact when the message revises it; keep its fact_id.\n\
         - Add a fact for information not yet stored. Use ids like travel_004, health_001, \
         pet_002 (prefixes: travel, health, family, pet, hobby, work, financial, education, \
         lifestyle, social, personality, values, preferences), continuing the highest \
         existing number.\n\
         - Each fact is one complete sentence about the user.\n\
         Reply with one of:\n\
         {{\"action\": \"add\", \"additions\": [{{\"fact_id\": \"...\", \"fact\": \"...\"}}]}}\n\
         {{\"action\": \"update\", \"updates\": [{{\"fact_id\": \"...\", \"fact\": \"...\"}}]}}\n\
         {{\"action\": \"both\", \"updates\": [...], \"additions\": [...]}}\n\
         {{\"action\": \"nothing\"}}\n\n\
         Existing facts:\n{}\n\nMessage: {}",
        existing, text
    )
}

pub fn rank_categories(text: &str, available: &FactStore) -> String {
    let listing: Vec<String> = available
        .categories
        .iter()
        .map(|(name, category)| format!("- {}: {}", name, category.description))
        .collect();
    format!(
        "Pick the profile categories most relevant to the user's request, best first.\n\
         Only use names from this list:\n{}\n\
         Reply as {{\"relevant_categories\": [\"...\"]}}.\n\n\
         Request: {}",
        listing.join("\n"),
        text
    )
}

pub fn rank_facts(text: &str, corpus: &[CategorizedFact]) -> String {
    let listing: Vec<String> = corpus
        .iter()
        .map(|c| format!("- {}: {}", c.fact.id, c.fact.text))
        .collect();
    format!(
        "Rank the stored facts by how relevant they are to the user's question, best first. \
         Score each between 0 and 1. Leave out facts that do not matter.\n\
         Reply as [{{\"fact_id\": \"...\", \"score\": 0.0}}].\n\n\
         Facts:\n{}\n\nQuestion: {}",
        listing.join("\n"),
        text
    )
}

pub fn plan(state: &TaskState, facts: &CategorySelection, input: &str) -> String {
    let state_json = serde_json::to_string_pretty(state).unwrap_or_else(|_| "{}".to_string());
    let facts_json = serde_json::to_string_pretty(facts).unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are planning a task for the user across several turns.\n\
         Merge the new input into the current state and decide the next step.\n\
         - If required details are missing, set needs_more_input to true, next_step to \"ask\", \
         list the questions in followups (priority: critical, important or optional) and leave \
         result empty.\n\
         - Otherwise set needs_more_input to false, next_step to \"execute\", followups to [] and \
         put the complete final answer in result.\n\
         Use the profile to avoid asking what is already known.\n\
         Reply as {{\"task_summary\": \"...\", \"needs_more_input\": bool, \"next_step\": \
         \"ask\"|\"execute\", \"followups\": [{{\"field\": \"...\", \"question\": \"...\", \
         \"priority\": \"critical\", \"reason\": \"...\"}}], \"result\": \"...\", \
         \"user_response\": \"...\"}}.\n\n\
         Profile:\n{}\n\nCurrent state:\n{}\n\nNew input: {}",
        facts_json, state_json, input
    )
}

pub fn respond(text: &str, facts: &[RankedFact]) -> String {
    let profile: Vec<String> = facts
        .iter()
        .map(|f| format!("- [{}] {}", f.category, f.fact.text))
        .collect();
    format!(
        "Answer the user's question. Use the profile only where it changes the answer, \
         and do only what is asked.\n\nProfile:\n{}\n\nQuestion: {}",
        profile.join("\n"),
        text
    )
}
