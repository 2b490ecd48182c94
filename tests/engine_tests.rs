mod common;

use common::{store_with, write_store, Canned, PlannerStep, ScriptedAnswers};
use persona::memory::{FactProposal, FactStore, ReconciliationDecision};
use persona::planner::{FollowUp, Priority, TaskState};
use persona::services::Route;
use persona::{Engine, EngineConfig, EngineError, Reply, SharedFactStore};
use tokio_util::sync::CancellationToken;

fn seeded_store(dir: &tempfile::TempDir) -> SharedFactStore {
    let path = dir.path().join("facts.json");
    write_store(
        &path,
        &store_with(&[
            ("Travel", "travel_001", "User lives in Seattle."),
            ("Travel", "travel_002", "User prefers window seats."),
            ("Pets", "pet_001", "User has a dog named Miso."),
            ("Health", "health_001", "User is allergic to peanuts."),
        ]),
    );
    SharedFactStore::open(&path)
}

#[tokio::test]
async fn test_direct_answer_uses_top_ranked_facts() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    let canned = Canned {
        route: Route {
            needs_reconciliation: false,
            direct_answer: true,
        },
        ranking: vec![
            ("pet_001".to_string(), 0.9),
            ("ghost_999".to_string(), 0.8),
            ("travel_001".to_string(), 0.7),
            ("health_001".to_string(), 0.6),
            ("travel_002".to_string(), 0.5),
        ],
        reply: "Take Miso to the dog park.".to_string(),
        ..Canned::default()
    };
    let (canned, capabilities) = canned.into_capabilities();
    let engine = Engine::new(capabilities, store, &EngineConfig::default());

    let outcome = engine
        .handle("What should I do this weekend?", &mut ScriptedAnswers::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.reply, Reply::Direct("Take Miso to the dog park.".to_string()));
    assert!(outcome.reconciliation.is_none());
    let seen: Vec<String> = canned.seen_ranked.lock().unwrap().iter().map(|r| r.fact_id.clone()).collect();
    assert_eq!(seen, vec!["pet_001", "travel_001", "health_001"]);
}

#[tokio::test]
async fn test_planning_path_selects_categories_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    let mut canned = Canned::with_planner(vec![
        PlannerStep::State(TaskState::asking(
            "Trip to Japan",
            vec![FollowUp::new("dates", "When are you travelling?", Priority::Critical)],
        )),
        PlannerStep::State(TaskState::finished("Trip to Japan", "Day 1: Tokyo")),
    ]);
    canned.route = Route {
        needs_reconciliation: false,
        direct_answer: false,
    };
    canned.categories = vec!["Travel".to_string(), "Astrology".to_string(), "Pets".to_string()];
    let (canned, capabilities) = canned.into_capabilities();
    let engine = Engine::new(capabilities, store, &EngineConfig::default());
    let mut answers = ScriptedAnswers::new(&["In March"]);

    let outcome = engine
        .handle("Plan a trip to Japan", &mut answers, &CancellationToken::new())
        .await
        .unwrap();

    let Reply::Planned(task) = outcome.reply else {
        panic!("expected a planned reply");
    };
    assert_eq!(task.result, "Day 1: Tokyo");
    assert_eq!(task.turns, 2);

    let selection = canned.seen_selection.lock().unwrap().clone().unwrap();
    let names: Vec<&str> = selection.names().collect();
    assert_eq!(names, vec!["Travel", "Pets"]);

    let snapshot = engine.telemetry().snapshot();
    assert_eq!(snapshot.route_stats.planned, 1);
    assert_eq!(snapshot.conversation_stats.completed, 1);
}

#[tokio::test]
async fn test_reconciliation_runs_alongside_reply() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    let canned = Canned {
        route: Route {
            needs_reconciliation: true,
            direct_answer: true,
        },
        decision: ReconciliationDecision::Both {
            updates: vec![FactProposal::new("travel_001", "User lives in Portland.")],
            additions: vec![FactProposal::new("hobby_001", "User enjoys bouldering.")],
        },
        ..Canned::default()
    };
    let (canned, capabilities) = canned.into_capabilities();
    let engine = Engine::new(capabilities, store.clone(), &EngineConfig::default());

    let outcome = engine
        .handle(
            "I moved to Portland and started bouldering",
            &mut ScriptedAnswers::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let report = outcome.reconciliation.unwrap().unwrap();
    assert_eq!(report.updated, vec!["travel_001"]);
    assert_eq!(report.added, vec!["hobby_001"]);
    assert_eq!(report.saved.unwrap().facts, 5);

    // The reconciler reasoned over the full corpus
    assert_eq!(canned.seen_corpus.lock().unwrap().len(), 4);

    let on_disk = FactStore::load(store.path()).unwrap();
    let travel = &on_disk.categories["Travel"].facts[0];
    assert_eq!(travel.text, "User lives in Portland.");
    assert_eq!(travel.timestamps.len(), 2);
    assert!(on_disk.contains("hobby_001"));

    let snapshot = engine.telemetry().snapshot();
    assert_eq!(snapshot.fact_stats.updated, 1);
    assert_eq!(snapshot.fact_stats.added, 1);
    assert_eq!(snapshot.store_stats.saves, 1);
}

#[tokio::test]
async fn test_failed_reply_does_not_undo_reconciliation() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    // Planner script is empty, so the planning path fails
    let canned = Canned {
        route: Route {
            needs_reconciliation: true,
            direct_answer: false,
        },
        decision: ReconciliationDecision::Add {
            additions: vec![FactProposal::new("family_001", "User has two sisters.")],
        },
        categories: vec!["Travel".to_string()],
        ..Canned::default()
    };
    let (_canned, capabilities) = canned.into_capabilities();
    let engine = Engine::new(capabilities, store.clone(), &EngineConfig::default());

    let err = engine
        .handle("Plan a visit to my two sisters", &mut ScriptedAnswers::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::CapabilityUnavailable { capability: "planner", .. }));
    assert!(store.snapshot().await.contains("family_001"));
}

#[tokio::test]
async fn test_cancelled_before_routing() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    let before = store.snapshot().await;
    let (_canned, capabilities) = Canned::default().into_capabilities();
    let engine = Engine::new(capabilities, store.clone(), &EngineConfig::default());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine
        .handle("anything", &mut ScriptedAnswers::default(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(store.snapshot().await, before);
}

#[tokio::test]
async fn test_concurrent_reconciliations_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("facts.json");
    let store = SharedFactStore::open(&path);

    let make_engine = |id: &str, text: &str| {
        let canned = Canned {
            route: Route {
                needs_reconciliation: true,
                direct_answer: true,
            },
            decision: ReconciliationDecision::Add {
                additions: vec![FactProposal::new(id, text)],
            },
            ..Canned::default()
        };
        let (_canned, capabilities) = canned.into_capabilities();
        Engine::new(capabilities, SharedFactStore::open(&path), &EngineConfig::default())
    };
    let first = make_engine("hobby_001", "User plays chess.");
    let second = make_engine("social_001", "User volunteers on weekends.");

    let (a, b) = tokio::join!(first.reconcile("chess"), second.reconcile("volunteering"));
    a.unwrap();
    b.unwrap();

    let on_disk = FactStore::load(&path).unwrap();
    assert_eq!(on_disk.fact_count(), 2);
    assert_eq!(store.snapshot().await, on_disk);
}
