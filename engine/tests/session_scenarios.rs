//! End-to-end conversation scenarios against a scripted model and an
//! in-memory store.

mod common;

use common::{ana, coach, registry, MemoryStore, ScriptedGateway, OUT_OF_SCOPE};
use pt_engine::llm::{LLMError, Purpose};
use pt_engine::session::prompts::REFUSAL;
use pt_engine::session::{Session, TurnOutcome};
use sdk::{FactTable, SessionSnapshot};
use std::sync::Arc;

#[tokio::test]
async fn breakfast_question_is_answered_and_persisted() {
    let gateway = Arc::new(ScriptedGateway::healthy());
    let store = Arc::new(MemoryStore::default());
    let registry = registry(gateway, store.clone());

    let init = registry.open(&ana()).await.unwrap();
    assert!(init.messages.is_empty());
    assert!(init.responses.is_empty());
    assert_eq!(init.meal_plan, "");

    let reply = registry
        .chat(&ana(), "What should I eat for breakfast?", None)
        .await
        .unwrap();
    assert_eq!(reply.response, "Eat oats.");
    assert_eq!(reply.outcome, TurnOutcome::Answered);

    let report = registry.close(&ana()).await.unwrap();
    assert!(report.success, "{}", report.message);

    let stored = store.snapshot(&ana()).unwrap();
    assert_eq!(stored.messages, vec!["What should I eat for breakfast?"]);
    assert_eq!(stored.responses, vec!["Eat oats."]);
    assert_eq!(stored.summary, "User asks about breakfast.");
}

#[tokio::test]
async fn off_topic_message_is_refused_and_not_persisted() {
    let gateway = Arc::new(ScriptedGateway::healthy().always(Purpose::Guardrail, OUT_OF_SCOPE));
    let store = Arc::new(MemoryStore::default());
    let registry = registry(gateway.clone(), store.clone());

    registry.open(&ana()).await.unwrap();
    let reply = registry.chat(&ana(), "Tell me a joke", None).await.unwrap();

    assert_eq!(reply.response, REFUSAL);
    assert_eq!(reply.outcome, TurnOutcome::Rejected);
    assert_eq!(gateway.count(Purpose::Answer), 0);

    let report = registry.close(&ana()).await.unwrap();
    assert!(!report.success);
    assert_eq!(report.message, "No user data to save");
    assert_eq!(store.snapshot(&ana()).unwrap(), SessionSnapshot::default());
    assert_eq!(store.saves(), 0);
}

#[tokio::test]
async fn persisted_lists_are_capped_and_role_paired() {
    let gateway = Arc::new(ScriptedGateway::healthy());
    let store = Arc::new(MemoryStore::default());
    let registry = registry(gateway, store.clone());

    for turns in [3usize, 25] {
        registry.open(&ana()).await.unwrap();
        let already = store.snapshot(&ana()).unwrap().messages.len();
        for i in already..turns {
            registry
                .chat(&ana(), &format!("question {}", i), None)
                .await
                .unwrap();
        }
        registry.close(&ana()).await.unwrap();

        let stored = store.snapshot(&ana()).unwrap();
        let expected = turns.min(20);
        assert_eq!(stored.messages.len(), expected);
        assert_eq!(stored.responses.len(), expected);
        assert_eq!(
            stored.messages.last().map(String::as_str),
            Some(format!("question {}", turns - 1).as_str())
        );
    }
}

#[tokio::test]
async fn closing_twice_without_chat_keeps_the_snapshot() {
    let gateway = Arc::new(ScriptedGateway::healthy());
    let store = MemoryStore::default();
    let coach = coach(gateway);

    store.seed(
        &ana(),
        SessionSnapshot {
            messages: vec!["Hi".into()],
            responses: vec!["Hello, how can I help?".into()],
            ..SessionSnapshot::default()
        },
    );

    let mut session = Session::from_snapshot(ana(), store.snapshot(&ana()).unwrap());
    session.close(&coach, &store).await.unwrap();
    let first = store.snapshot(&ana()).unwrap();

    session.close(&coach, &store).await.unwrap();
    assert_eq!(store.snapshot(&ana()).unwrap(), first);
}

#[tokio::test]
async fn plan_is_untouched_when_check_says_false() {
    let gateway = Arc::new(ScriptedGateway::healthy());
    let coach = coach(gateway.clone());
    let mut session = Session::from_snapshot(
        ana(),
        SessionSnapshot {
            meal_plan: "Oats, salad, salmon.".into(),
            ..SessionSnapshot::default()
        },
    );

    for message in ["I'm vegetarian now", "What about lunch?", "And dinner?"] {
        let reply = session.chat(&coach, message, None).await;
        assert!(!reply.plan_revised);
        assert_eq!(reply.meal_plan, "Oats, salad, salmon.");
    }
    assert_eq!(gateway.count(Purpose::PlanRevise), 0);
}

#[tokio::test]
async fn plan_is_replaced_when_check_says_true() {
    let gateway = Arc::new(
        ScriptedGateway::healthy()
            .always(Purpose::PlanCheck, "True")
            .always(Purpose::PlanRevise, "Oats, lentil salad, tofu stir-fry."),
    );
    let coach = coach(gateway);
    let mut session = Session::from_snapshot(
        ana(),
        SessionSnapshot {
            meal_plan: "Oats, salad, salmon.".into(),
            ..SessionSnapshot::default()
        },
    );

    let reply = session.chat(&coach, "I'm vegetarian now", None).await;
    assert!(reply.plan_revised);
    assert_eq!(reply.meal_plan, "Oats, lentil salad, tofu stir-fry.");
    assert_eq!(session.meal_plan(), "Oats, lentil salad, tofu stir-fry.");
}

#[tokio::test]
async fn fact_failure_resets_the_table_without_failing_the_turn() {
    let gateway = Arc::new(
        ScriptedGateway::healthy().then(Purpose::Facts, Err(LLMError::Timeout)),
    );
    let coach = coach(gateway);
    let mut facts = FactTable::new();
    facts.insert("diet".into(), "vegetarian".into());
    let mut session = Session::from_snapshot(
        ana(),
        SessionSnapshot {
            key_facts: facts,
            ..SessionSnapshot::default()
        },
    );

    let reply = session.chat(&coach, "What should I eat?", None).await;
    assert_eq!(reply.outcome, TurnOutcome::Answered);
    assert_eq!(reply.response, "Eat oats.");
    assert!(session.facts().is_empty());
}

#[tokio::test]
async fn store_failure_keeps_the_session_live() {
    let gateway = Arc::new(ScriptedGateway::healthy());
    let store = Arc::new(MemoryStore::default());
    let registry = registry(gateway, store.clone());

    registry.open(&ana()).await.unwrap();
    registry.chat(&ana(), "Hello coach", None).await.unwrap();

    store.fail_writes(true);
    assert!(registry.close(&ana()).await.is_err());
    assert_eq!(registry.live_sessions().await, 1);

    store.fail_writes(false);
    assert!(registry.close(&ana()).await.unwrap().success);
    assert_eq!(registry.live_sessions().await, 0);
    assert_eq!(store.snapshot(&ana()).unwrap().messages, vec!["Hello coach"]);
}
