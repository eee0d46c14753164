mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use echo_api::models::message::{Author, ChatMessage, ChatTarget};
use echo_api::AppState;

/// Store `count` world messages from `username`, ids starting at `first_id`.
async fn seed_messages(state: &AppState, username: &str, target: ChatTarget, first_id: i64, count: i64) {
    let author = Author {
        username: username.to_string(),
        avatar: "🌸".to_string(),
    };
    let start = Utc::now() - Duration::minutes(count);
    for i in 0..count {
        let message = ChatMessage::trusted(
            first_id + i,
            &author,
            target.clone(),
            format!("message {i}"),
            start + Duration::minutes(i),
        );
        state.messages.create_message(message).await.unwrap();
    }
}

#[tokio::test]
async fn history_requires_a_valid_token() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.get("/api/chat/world").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = server
        .get("/api/chat/world")
        .add_header(AUTHORIZATION, "Bearer nope")
        .await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<Value>()["error"]["message"], "Invalid token");
}

#[tokio::test]
async fn world_history_pages_backwards_in_chronological_order() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let (_, token) = common::seed_user(&state, "alice").await;
    seed_messages(&state, "alice", ChatTarget::World, 100, 5).await;

    let resp = server
        .get("/api/chat/world")
        .add_query_param("limit", 3)
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status_ok();
    let page: Value = resp.json();
    assert_eq!(page["has_more"], true);
    let ids: Vec<&str> = page["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["102", "103", "104"]);

    let resp = server
        .get("/api/chat/world")
        .add_query_param("limit", 3)
        .add_query_param("before", 102)
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    let page: Value = resp.json();
    assert_eq!(page["has_more"], false);
    assert_eq!(page["data"].as_array().unwrap().len(), 2);
    assert_eq!(page["data"][0]["id"], "100");
}

#[tokio::test]
async fn limit_is_clamped() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let (_, token) = common::seed_user(&state, "alice").await;
    seed_messages(&state, "alice", ChatTarget::World, 1, 3).await;

    let resp = server
        .get("/api/chat/world")
        .add_query_param("limit", 0)
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    let page: Value = resp.json();
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
    assert_eq!(page["has_more"], true);
}

#[tokio::test]
async fn stream_and_grotto_history_are_scoped() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let (_, alice) = common::seed_user(&state, "alice").await;
    let (_, carol) = common::seed_user(&state, "carol").await;

    seed_messages(&state, "alice", ChatTarget::Stream("peace".into()), 10, 2).await;
    seed_messages(&state, "alice", ChatTarget::Stream("focus".into()), 20, 1).await;
    seed_messages(&state, "alice", ChatTarget::grotto(["alice", "bob"]), 30, 2).await;

    let page: Value = server
        .get("/api/chat/streams/peace")
        .add_header(AUTHORIZATION, format!("Bearer {alice}"))
        .await
        .json();
    assert_eq!(page["data"].as_array().unwrap().len(), 2);
    assert_eq!(page["data"][0]["streamName"], "peace");

    let page: Value = server
        .get("/api/chat/grotto/bob")
        .add_header(AUTHORIZATION, format!("Bearer {alice}"))
        .await
        .json();
    assert_eq!(page["data"].as_array().unwrap().len(), 2);
    assert_eq!(page["data"][0]["chatType"], "grotto");

    // carol is not in the alice/bob grotto.
    let page: Value = server
        .get("/api/chat/grotto/bob")
        .add_header(AUTHORIZATION, format!("Bearer {carol}"))
        .await
        .json();
    assert!(page["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn reactions_toggle_per_user() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let (_, alice) = common::seed_user(&state, "alice").await;
    let (_, bob) = common::seed_user(&state, "bob").await;
    seed_messages(&state, "alice", ChatTarget::World, 7, 1).await;

    for token in [&alice, &bob] {
        server
            .post("/api/chat/messages/7/reactions")
            .add_header(AUTHORIZATION, format!("Bearer {token}"))
            .json(&json!({"emoji": "🔥"}))
            .await
            .assert_status_ok();
    }

    let resp = server
        .delete("/api/chat/messages/7/reactions/%F0%9F%94%A5")
        .add_header(AUTHORIZATION, format!("Bearer {alice}"))
        .await;
    resp.assert_status_ok();
    let message: Value = resp.json();
    assert_eq!(message["reactions"], json!([{"emoji": "🔥", "users": ["bob"]}]));

    let resp = server
        .post("/api/chat/messages/7/reactions")
        .add_header(AUTHORIZATION, format!("Bearer {alice}"))
        .json(&json!({"emoji": "  "}))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(resp.json::<Value>()["error"]["code"], "VALIDATION_ERROR");

    server
        .post("/api/chat/messages/999/reactions")
        .add_header(AUTHORIZATION, format!("Bearer {alice}"))
        .json(&json!({"emoji": "🔥"}))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_author_can_delete() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let (_, alice) = common::seed_user(&state, "alice").await;
    let (_, bob) = common::seed_user(&state, "bob").await;
    seed_messages(&state, "alice", ChatTarget::World, 42, 1).await;

    server
        .delete("/api/chat/messages/42")
        .add_header(AUTHORIZATION, format!("Bearer {bob}"))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    server
        .delete("/api/chat/messages/42")
        .add_header(AUTHORIZATION, format!("Bearer {alice}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let stored = state.messages.find(42).await.unwrap().unwrap();
    assert!(stored.is_deleted);
    assert_eq!(stored.deleted_by.as_deref(), Some("alice"));

    let page: Value = server
        .get("/api/chat/world")
        .add_header(AUTHORIZATION, format!("Bearer {alice}"))
        .await
        .json();
    assert!(page["data"].as_array().unwrap().is_empty());

    server
        .delete("/api/chat/messages/42")
        .add_header(AUTHORIZATION, format!("Bearer {alice}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_is_public() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.get("/health").await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>(), json!({"status": "ok"}));
}
