//! HTTP surface tests, driven through the full router with `oneshot`.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use encore_core::types::{QueueEntry, VenueId};
use encore_testing::TestQueue;
use encore_web::{AppState, CORRELATION_ID_HEADER, router};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

struct Api {
    app: Router,
    queue: TestQueue,
}

impl Api {
    fn new() -> Self {
        let queue = TestQueue::new();
        Self {
            app: router(AppState::new(queue.engine.clone())),
            queue,
        }
    }

    fn venue(&self) -> String {
        format!("/api/venues/{}", self.queue.venue_id)
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn post(&self, path: &str) -> (StatusCode, Value) {
        self.send(Method::POST, &format!("{}{path}", self.venue()), None)
            .await
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(Method::GET, &format!("{}{path}", self.venue()), None)
            .await
    }

    async fn submit(&self, requester: Uuid, title: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            &format!("{}/requests", self.venue()),
            Some(json!({
                "requester_id": requester,
                "song_title": title,
                "artist": "Test Artist",
            })),
        )
        .await
    }
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_singer_submission_joins_the_line() {
    let api = Api::new();

    let (status, entry) = api.submit(Uuid::new_v4(), "  Valerie ").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["song_title"], "Valerie");
    assert_eq!(entry["status"], "waiting");
    assert_eq!(entry["position"], 1);

    let (status, waiting) = api.get("/waiting").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(waiting[0]["id"], entry["id"]);
}

#[tokio::test]
async fn test_submission_while_paused_is_locked() {
    let api = Api::new();
    let (status, state) = api.post("/pause/toggle").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["paused"], true);

    let (status, body) = api.submit(Uuid::new_v4(), "Valerie").await;

    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["code"], "QUEUE_PAUSED");
    assert_eq!(
        body["message"],
        "The queue is paused; new requests are not being accepted right now."
    );
    let (_, waiting) = api.get("/waiting").await;
    assert_eq!(waiting, json!([]));
}

#[tokio::test]
async fn test_blank_title_is_unprocessable() {
    let api = Api::new();

    let (status, body) = api.submit(Uuid::new_v4(), "   ").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_operator_runs_a_song_through_the_queue() {
    let api = Api::new();
    let (_, entry) = api.submit(Uuid::new_v4(), "A").await;
    let id = id_of(&entry);

    let (status, changed) = api.post(&format!("/entries/{id}/promote")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(changed[0]["status"], "up_next");
    let (_, up_next) = api.get("/up-next").await;
    assert_eq!(up_next["id"], entry["id"]);

    api.post(&format!("/entries/{id}/start")).await;
    let (_, now) = api.get("/now-singing").await;
    assert_eq!(now["id"], entry["id"]);

    let (status, done) = api.post(&format!("/entries/{id}/complete")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done[0]["status"], "completed");
    assert!(!done[0]["completed_at"].is_null());

    let (_, now) = api.get("/now-singing").await;
    assert!(now.is_null());
}

#[tokio::test]
async fn test_invalid_transition_is_conflict() {
    let api = Api::new();
    let (_, entry) = api.submit(Uuid::new_v4(), "A").await;

    let (status, body) = api
        .post(&format!("/entries/{}/start", id_of(&entry)))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_second_up_next_is_conflict() {
    let api = Api::new();
    let (_, a) = api.submit(Uuid::new_v4(), "A").await;
    let (_, b) = api.submit(Uuid::new_v4(), "B").await;
    api.post(&format!("/entries/{}/promote", id_of(&a))).await;

    let (status, body) = api.post(&format!("/entries/{}/promote", id_of(&b))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVARIANT_VIOLATION");
}

#[tokio::test]
async fn test_entry_from_another_venue_is_not_found() {
    let api = Api::new();
    let (_, entry) = api.submit(Uuid::new_v4(), "A").await;

    let uri = format!(
        "/api/venues/{}/entries/{}/skip",
        VenueId::new(),
        id_of(&entry)
    );
    let (status, body) = api.send(Method::POST, &uri, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    // Untouched at its own venue
    let (_, waiting) = api.get("/waiting").await;
    assert_eq!(waiting[0]["status"], "waiting");
}

#[tokio::test]
async fn test_unknown_action_is_rejected() {
    let api = Api::new();
    let (_, entry) = api.submit(Uuid::new_v4(), "A").await;

    let (status, _) = api
        .post(&format!("/entries/{}/teleport", id_of(&entry)))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_swap_and_moves() {
    let api = Api::new();
    let (_, a) = api.submit(Uuid::new_v4(), "A").await;
    let (_, b) = api.submit(Uuid::new_v4(), "B").await;

    let (status, _) = api
        .send(
            Method::POST,
            &format!("{}/swap", api.venue()),
            Some(json!({ "a": a["id"], "b": b["id"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, waiting) = api.get("/waiting").await;
    assert_eq!(waiting[0]["id"], b["id"]);

    // B is now at the head
    let (status, body) = api.post(&format!("/entries/{}/move-up", id_of(&b))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = api.post(&format!("/entries/{}/move-down", id_of(&b))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, waiting) = api.get("/waiting").await;
    assert_eq!(waiting[0]["id"], a["id"]);
}

#[tokio::test]
async fn test_recently_skipped_window() {
    let api = Api::new();
    let (_, a) = api.submit(Uuid::new_v4(), "A").await;
    api.post(&format!("/entries/{}/skip", id_of(&a))).await;

    api.queue.clock.advance(Duration::from_secs(10 * 60));

    let (_, default_window) = api.get("/recently-skipped").await;
    assert_eq!(default_window[0]["id"], a["id"]);

    let (_, narrow) = api.get("/recently-skipped?minutes=5").await;
    assert_eq!(narrow, json!([]));

    let (_, snapshot) = api.get("/queue").await;
    assert_eq!(snapshot["recently_skipped"][0]["id"], a["id"]);

    let (status, back) = api.post(&format!("/entries/{}/reinstate", id_of(&a))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(back[0]["status"], "waiting");
}

#[tokio::test]
async fn test_recently_skipped_lookback_is_bounded() {
    let api = Api::new();
    let (_, a) = api.submit(Uuid::new_v4(), "A").await;
    api.post(&format!("/entries/{}/skip", id_of(&a))).await;

    let (status, day) = api.get("/recently-skipped?minutes=1440").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(day[0]["id"], a["id"]);

    let (status, body) = api
        .get(&format!("/recently-skipped?minutes={}", u64::MAX))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_singer_tracks_own_requests() {
    let api = Api::new();
    let singer = Uuid::new_v4();
    api.submit(Uuid::new_v4(), "Someone else").await;
    let (_, mine) = api.submit(singer, "Mine").await;

    let (status, requests) = api.get(&format!("/requests/{singer}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(requests.as_array().unwrap().len(), 1);
    assert_eq!(requests[0]["entry"]["id"], mine["id"]);
    assert_eq!(requests[0]["ahead"], 1);
}

#[tokio::test]
async fn test_set_paused_is_idempotent() {
    let api = Api::new();

    for _ in 0..2 {
        let (status, state) = api
            .send(
                Method::PUT,
                &format!("{}/pause", api.venue()),
                Some(json!({ "paused": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["paused"], true);
    }

    let (_, snapshot) = api.get("/queue").await;
    assert_eq!(snapshot["paused"], true);
}

#[tokio::test]
async fn test_storage_failure_is_generic_500() {
    let api = Api::new();
    api.queue.store.set_unavailable(true);

    let (status, body) = api.get("/queue").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "An internal error occurred");
}

#[tokio::test]
async fn test_health_and_readiness() {
    let api = Api::new();

    let (status, _) = api.send(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = api.send(Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    api.queue.store.set_unavailable(true);
    let (status, _) = api.send(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = api.send(Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_responses_carry_correlation_id() {
    let api = Api::new();
    let request = Request::builder()
        .uri(format!("{}/waiting", api.venue()))
        .body(Body::empty())
        .unwrap();

    let response = api.app.clone().oneshot(request).await.unwrap();

    assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
}

#[tokio::test]
async fn test_entries_deserialize_as_queue_entries() {
    let api = Api::new();
    api.submit(Uuid::new_v4(), "A").await;

    let (_, waiting) = api.get("/waiting").await;
    let entries: Vec<QueueEntry> = serde_json::from_value(waiting).unwrap();

    assert_eq!(entries[0].venue_id, api.queue.venue_id);
}
