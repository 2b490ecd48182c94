use persona::memory::ReconciliationDecision;
use persona::planner::{NextStep, Priority};
use persona::services::{parse, Route};

#[test]
fn test_route_accepts_both_forms() {
    let modern = parse::route(r#"{"needs_reconciliation": true, "direct_answer": false}"#);
    assert_eq!(
        modern,
        Route {
            needs_reconciliation: true,
            direct_answer: false
        }
    );

    let legacy = parse::route("```json\n{\"action\": \"plan\", \"sim_update\": \"y\"}\n```");
    assert_eq!(legacy, modern);
}

#[test]
fn test_route_defaults_field_by_field() {
    assert_eq!(parse::route("I think you should plan this"), Route::default());

    // Valid action, garbage flag
    let partial = parse::route(r#"{"action": "plan", "sim_update": "maybe"}"#);
    assert!(!partial.direct_answer);
    assert!(!partial.needs_reconciliation);

    let partial = parse::route(r#"{"action": "dance", "sim_update": "y"}"#);
    assert!(partial.direct_answer);
    assert!(partial.needs_reconciliation);
}

#[test]
fn test_decision_falls_back_to_noop() {
    assert!(parse::decision("no idea").is_noop());
    assert!(parse::decision(r#"{"action": "explode"}"#).is_noop());

    let decision = parse::decision(
        "Here is the decision:\n{\"action\": \"add\", \"additions\": [{\"fact_id\": \"pet_001\", \"fact\": \"User has a cat.\"}]}",
    );
    assert!(matches!(decision, ReconciliationDecision::Add { ref additions } if additions.len() == 1));
}

#[test]
fn test_category_and_fact_rankings() {
    assert_eq!(
        parse::categories(r#"{"relevant_categories": ["Travel", " Pets ", 3, ""]}"#),
        vec!["Travel", "Pets"]
    );
    assert_eq!(parse::categories(r#"["Health"]"#), vec!["Health"]);
    assert!(parse::categories("none").is_empty());

    let ranking = parse::fact_ranking(
        r#"[{"fact_id": "pet_001", "score": 0.9}, ["travel_001", 0.5], {"similarity_score": 0.2}, "work_001"]"#,
    );
    let ids: Vec<&str> = ranking.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["pet_001", "travel_001", "work_001"]);
    assert!((ranking[0].1 - 0.9).abs() < 1e-6);
}

#[test]
fn test_task_state_legacy_planner_format() {
    let raw = r#"{
        "task_summary": "Trip to Tokyo in March",
        "followup_required": true,
        "action": "ask_followups",
        "followups": [
            {"field": "budget_usd", "question": "What is your budget?", "priority": "important"},
            {"field": "travelers", "question": "How many people?", "priority": "critical", "reason": "room size"}
        ],
        "answers": "",
        "user_response": "A few quick questions first."
    }"#;

    let state = parse::task_state(raw).unwrap();

    assert!(state.needs_more_input);
    assert_eq!(state.next_step, NextStep::Ask);
    assert!(state.result.is_none());
    assert_eq!(state.user_response.as_deref(), Some("A few quick questions first."));
    assert_eq!(state.ordered_followups()[0].priority, Priority::Critical);
    assert!(state.check().is_ok());
}

#[test]
fn test_task_state_final_answer_with_raw_newlines() {
    let raw = "{\"task_summary\": \"Tokyo\", \"needs_more_input\": false, \"next_step\": \"execute\", \
               \"followups\": [], \"result\": \"## Options\n1. Shinjuku\n2. Asakusa\"}";

    let state = parse::task_state(raw).unwrap();

    assert_eq!(state.next_step, NextStep::Execute);
    assert_eq!(state.result.as_deref(), Some("## Options\n1. Shinjuku\n2. Asakusa"));
    assert!(state.check().is_ok());
}

#[test]
fn test_task_state_unreadable_is_malformed() {
    let err = parse::task_state("Sorry, I cannot help with that.").unwrap_err();
    assert_eq!(err.capability, "planner");

    // Unknown priority tiers degrade to optional rather than failing
    let state = parse::task_state(
        r#"{"needs_more_input": true, "followups": [{"question": "When?", "priority": "urgent"}]}"#,
    )
    .unwrap();
    assert_eq!(state.followups[0].priority, Priority::Optional);
}

#[test]
fn test_priority_tiers_ignore_case() {
    let state = parse::task_state(
        r#"{"needs_more_input": true, "followups": [
            {"field": "a", "question": "?", "priority": "Optional"},
            {"field": "b", "question": "?", "priority": "Critical"},
            {"field": "c", "question": "?", "priority": " IMPORTANT "}
        ]}"#,
    )
    .unwrap();

    let followups = state.ordered_followups();
    let ordered: Vec<(&str, Priority)> = followups.iter().map(|f| (f.field.as_str(), f.priority)).collect();
    assert_eq!(
        ordered,
        vec![("b", Priority::Critical), ("c", Priority::Important), ("a", Priority::Optional)]
    );
}

#[test]
fn test_object_answers_skip_bracketed_preamble() {
    let route = parse::route(r#"Note [1]: {"needs_reconciliation": true, "direct_answer": false}"#);
    assert_eq!(
        route,
        Route {
            needs_reconciliation: true,
            direct_answer: false
        }
    );

    let decision = parse::decision(
        r#"See [ref 2] below. {"action": "update", "updates": [{"fact_id": "pet_001", "fact": "User has two cats."}]}"#,
    );
    assert!(matches!(decision, ReconciliationDecision::Update { ref updates } if updates.len() == 1));

    let state = parse::task_state(
        r#"Step [1/2]: {"task_summary": "Tokyo", "needs_more_input": false, "next_step": "execute", "result": "Go in spring."}"#,
    )
    .unwrap();
    assert_eq!(state.result.as_deref(), Some("Go in spring."));

    // Array-shaped answers still read the first bracket
    assert_eq!(parse::categories(r#"Top picks: ["Travel", "Pets"]"#), vec!["Travel", "Pets"]);
}
