//! Session registry lifecycle: init, chat, close, history, feedback

mod common;

use common::{ana, registry, MemoryStore, ScriptedGateway};
use pt_engine::llm::{LLMError, ModelSpec, Purpose, DEGRADED_REPLY};
use pt_engine::session::TurnOutcome;
use sdk::{EngineError, SessionSnapshot, UserIdentity};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn healthy() -> (pt_engine::session::SessionRegistry, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    (
        registry(Arc::new(ScriptedGateway::healthy()), store.clone()),
        store,
    )
}

#[tokio::test]
async fn chat_without_init_is_unauthorized() {
    let (registry, _) = healthy();

    let err = registry.chat(&ana(), "Hello", None).await.unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));

    let err = registry.feedback(&ana(), &json!({"rating": 5})).await.unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));
}

#[tokio::test]
async fn close_without_init_is_not_found() {
    let (registry, _) = healthy();

    let err = registry.close(&ana()).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));
}

#[tokio::test]
async fn second_close_finds_no_session() {
    let (registry, _) = healthy();

    registry.open(&ana()).await.unwrap();
    registry.chat(&ana(), "Hi", None).await.unwrap();
    assert!(registry.close(&ana()).await.unwrap().success);

    let err = registry.close(&ana()).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));
}

#[tokio::test]
async fn reinit_flushes_the_previous_session() {
    let (registry, store) = healthy();

    registry.open(&ana()).await.unwrap();
    registry.chat(&ana(), "Hi", None).await.unwrap();

    let init = registry.open(&ana()).await.unwrap();
    assert_eq!(init.messages, vec!["Hi"]);
    assert_eq!(init.responses, vec!["Eat oats."]);
    assert_eq!(store.saves(), 1);
    assert_eq!(registry.live_sessions().await, 1);
}

#[tokio::test]
async fn init_returns_stored_conversation() {
    let (registry, store) = healthy();
    store.seed(
        &ana(),
        SessionSnapshot {
            messages: vec!["Can I run daily?".into()],
            responses: vec!["Yes, at an easy pace.".into()],
            meal_plan: "Porridge and fruit.".into(),
            ..SessionSnapshot::default()
        },
    );

    let init = registry.open(&ana()).await.unwrap();
    assert_eq!(init.messages, vec!["Can I run daily?"]);
    assert_eq!(init.responses, vec!["Yes, at an easy pace."]);
    assert_eq!(init.meal_plan, "Porridge and fruit.");
}

#[tokio::test]
async fn degraded_turn_is_not_recorded() {
    let store = Arc::new(MemoryStore::default());
    let gateway = ScriptedGateway::healthy().then(Purpose::Answer, Err(LLMError::Timeout));
    let registry = registry(Arc::new(gateway), store.clone());

    registry.open(&ana()).await.unwrap();
    let reply = registry.chat(&ana(), "Hi", None).await.unwrap();
    assert_eq!(reply.outcome, TurnOutcome::Degraded);
    assert_eq!(reply.response, DEGRADED_REPLY);

    let history = registry.history(&ana(), 10).await.unwrap();
    assert!(history.history.is_empty());
}

#[tokio::test]
async fn requested_model_reaches_the_answer_call() {
    let (registry, _) = healthy();
    let model: ModelSpec = "gemini:gemini-1.5-flash".parse().unwrap();

    registry.open(&ana()).await.unwrap();
    let reply = registry.chat(&ana(), "Hi", Some(&model)).await.unwrap();
    assert_eq!(reply.response, "Eat oats.");
}

#[tokio::test]
async fn history_prefers_live_session_then_store() {
    let (registry, _) = healthy();

    let err = registry.history(&ana(), 10).await.unwrap_err();
    assert!(matches!(err, EngineError::UserNotFound(_)));

    registry.open(&ana()).await.unwrap();
    registry.chat(&ana(), "first", None).await.unwrap();
    registry.chat(&ana(), "second", None).await.unwrap();

    let live = registry.history(&ana(), 1).await.unwrap();
    assert_eq!(live.history.len(), 1);
    assert_eq!(live.history[0].message, "second");
    assert_eq!(live.summary, "User asks about breakfast.");

    registry.close(&ana()).await.unwrap();
    let stored = registry.history(&ana(), 10).await.unwrap();
    assert_eq!(stored.history.len(), 2);
    assert_eq!(stored.history[0].message, "first");
}

#[tokio::test]
async fn feedback_is_stored_as_an_exchange() {
    let (registry, store) = healthy();

    registry.open(&ana()).await.unwrap();
    registry
        .feedback(&ana(), &json!({"rating": 5}))
        .await
        .unwrap();
    registry.close(&ana()).await.unwrap();

    let stored = store.snapshot(&ana()).unwrap();
    assert_eq!(stored.messages, vec![r#"Feedback: {"rating":5}"#]);
    assert_eq!(stored.responses, vec!["Thank you for your feedback!"]);
}

#[tokio::test]
async fn users_are_isolated_and_served_concurrently() {
    let (registry, store) = healthy();
    let registry = Arc::new(registry);
    let users: Vec<UserIdentity> = (0..8)
        .map(|i| UserIdentity::new(format!("User{}", i), "Test").unwrap())
        .collect();

    let mut handles = Vec::new();
    for user in users.clone() {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry.open(&user).await.unwrap();
            for i in 0..3 {
                registry
                    .chat(&user, &format!("{} message {}", user, i), None)
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(registry.live_sessions().await, users.len());
    assert_eq!(registry.close_all().await, users.len());
    assert_eq!(registry.live_sessions().await, 0);

    for user in &users {
        let stored = store.snapshot(user).unwrap();
        assert_eq!(stored.messages.len(), 3);
        assert!(stored.messages.iter().all(|m| m.starts_with(&user.to_string())));
    }
}

#[tokio::test]
async fn abandoned_turn_leaves_history_paired() {
    let gateway = ScriptedGateway::healthy().stall(Purpose::Answer, Duration::from_secs(10));
    let store = Arc::new(MemoryStore::default());
    let registry = registry(Arc::new(gateway), store.clone());
    registry.open(&ana()).await.unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        registry.chat(&ana(), "q0", None),
    )
    .await;
    assert!(abandoned.is_err());

    registry.chat(&ana(), "q1", None).await.unwrap();
    registry.chat(&ana(), "q2", None).await.unwrap();
    assert!(registry.close(&ana()).await.unwrap().success);

    let stored = store.snapshot(&ana()).unwrap();
    assert_eq!(stored.messages, vec!["q1", "q2"]);
    assert_eq!(stored.responses, vec!["Eat oats.", "Eat oats."]);
}

#[tokio::test]
async fn rejected_save_keeps_session_live() {
    let (registry, store) = healthy();
    registry.open(&ana()).await.unwrap();
    registry.chat(&ana(), "Hi", None).await.unwrap();
    store.forget(&ana());

    let report = registry.close(&ana()).await.unwrap();
    assert!(!report.success);
    assert_eq!(report.message, "User not found");
    assert_eq!(registry.live_sessions().await, 1);

    let history = registry.history(&ana(), 10).await.unwrap();
    assert_eq!(history.history.len(), 1);
    assert_eq!(history.history[0].message, "Hi");

    // re-init must not discard the unsaved dialogue either
    let err = registry.open(&ana()).await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    assert_eq!(registry.live_sessions().await, 1);
    assert!(registry.chat(&ana(), "Still there?", None).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_open_and_close_never_orphan_a_session() {
    let (registry, store) = healthy();
    let registry = Arc::new(registry);

    for round in 0..300 {
        registry.open(&ana()).await.unwrap();
        registry.chat(&ana(), "Hi", None).await.unwrap();
        let saves = store.saves();

        let closer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.close(&ana()).await })
        };
        let opener = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.open(&ana()).await })
        };
        let closed = closer.await.unwrap().unwrap();
        opener.await.unwrap().unwrap();

        // exactly one of the two flushed the dialogue
        assert_eq!(store.saves(), saves + 1, "round {}", round);

        // close won: open's fresh session must be reachable.
        // open won: close released open's empty session.
        let live = registry.live_sessions().await;
        assert_eq!(live == 1, closed.success, "round {}", round);
        assert_eq!(
            registry.chat(&ana(), "Hi", None).await.is_ok(),
            closed.success,
            "round {}",
            round
        );

        if closed.success {
            registry.close(&ana()).await.unwrap();
        }
        assert_eq!(registry.live_sessions().await, 0, "round {}", round);
    }
}
