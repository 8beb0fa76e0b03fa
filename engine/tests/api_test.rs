//! HTTP surface exercised through the router without binding a socket

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{registry, MemoryStore, ScriptedGateway};
use pt_engine::api::{router, AppState};
use pt_engine::llm::Purpose;
use pt_engine::config::{AnswerStrategy, Config, ServerConfig};
use pt_engine::session::{Coach, SessionRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let registry = registry(
        Arc::new(ScriptedGateway::healthy()),
        Arc::new(MemoryStore::default()),
    );
    let state = AppState {
        registry: Arc::new(registry),
    };
    router(state, &ServerConfig::default())
}

/// Router whose coach asks every candidate model and lets an evaluator pick
fn best_of_app(gateway: Arc<ScriptedGateway>) -> Router {
    let mut config = Config::default();
    config.answer.strategy = AnswerStrategy::BestOf;
    let coach = Coach::from_config(&config, gateway).unwrap();
    let state = AppState {
        registry: Arc::new(SessionRegistry::new(
            Arc::new(coach),
            Arc::new(MemoryStore::default()),
        )),
    };
    router(state, &ServerConfig::default())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn ana() -> Value {
    json!({"first_name": "Ana", "last_name": "Lee"})
}

#[tokio::test]
async fn heartbeat_is_ok() {
    let (status, body) = send(&app(), "GET", "/heartbeat", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn full_conversation_over_http() {
    let app = app();

    let (status, body) = send(&app, "POST", "/init", Some(ana())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"messages": [], "responses": [], "meal_plan": ""}));

    let chat = json!({
        "first_name": "Ana",
        "last_name": "Lee",
        "message": "What should I eat for breakfast?"
    });
    let (status, body) = send(&app, "POST", "/chat", Some(chat)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": "Eat oats.", "meal_plan": ""}));

    let feedback = json!({"first_name": "Ana", "last_name": "Lee", "feedback": {"helpful": true}});
    let (status, body) = send(&app, "POST", "/feedback", Some(feedback)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Feedback submitted successfully");

    let (status, body) = send(&app, "GET", "/history/Ana/Lee?limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"].as_array().unwrap().len(), 1);
    assert_eq!(body["history"][0]["response"], "Thank you for your feedback!");

    let (status, body) = send(&app, "POST", "/close", Some(ana())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (status, _) = send(&app, "POST", "/close", Some(ana())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_before_init_is_unauthorized() {
    let chat = json!({"first_name": "Ana", "last_name": "Lee", "message": "Hi"});
    let (status, body) = send(&app(), "POST", "/chat", Some(chat)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().is_some());
    assert!(body["hint"].as_str().is_some());
}

#[tokio::test]
async fn malformed_model_id_is_bad_request() {
    let app = app();
    send(&app, "POST", "/init", Some(ana())).await;

    let chat = json!({
        "first_name": "Ana",
        "last_name": "Lee",
        "message": "Hi",
        "model": "gpt-4o"
    });
    let (status, _) = send(&app, "POST", "/chat", Some(chat)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn blank_names_are_bad_request() {
    let (status, _) = send(
        &app(),
        "POST",
        "/init",
        Some(json!({"first_name": " ", "last_name": "Lee"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn history_for_unknown_user_is_not_found() {
    let (status, _) = send(&app(), "GET", "/history/Nobody/Here", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn best_of_chat_over_http() {
    let gateway = Arc::new(ScriptedGateway::healthy());
    let app = best_of_app(gateway.clone());

    let (status, _) = send(&app, "POST", "/init", Some(ana())).await;
    assert_eq!(status, StatusCode::OK);

    let chat = json!({
        "first_name": "Ana",
        "last_name": "Lee",
        "message": "What should I eat for breakfast?"
    });
    let (status, body) = send(&app, "POST", "/chat", Some(chat)).await;
    assert_eq!(status, StatusCode::OK);
    // the evaluator is unscripted, so the first candidate's answer stands
    assert_eq!(body["response"], "Eat oats.");
    assert_eq!(
        gateway.count(Purpose::Answer),
        Config::default().answer.candidates.len()
    );
    assert_eq!(gateway.count(Purpose::Evaluate), 1);
}
