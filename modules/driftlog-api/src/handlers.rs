use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use driftlog_common::{Ack, BulkPayload, Event, ListResponse, StreamRecord, TimeResponse};

use crate::storage::{user_subdir, StorageError};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    user: Option<String>,
}

/// The identifier carried in the payload wins; the `?user=` parameter is the fallback.
fn resolve_user(from_payload: Option<&str>, query: &UserQuery) -> String {
    let primary = user_subdir(from_payload.unwrap_or_default());
    if primary != "default" {
        return primary;
    }
    user_subdir(query.user.as_deref().unwrap_or_default())
}

fn server_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn bad_request(message: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

fn storage_failure(err: StorageError) -> Response {
    match err {
        StorageError::LimitReached => bad_request("storage limit reached"),
        other => {
            warn!(error = %other, "Storage failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "write error").into_response()
        }
    }
}

pub async fn stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
    body: Bytes,
) -> Response {
    let event: Event = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(_) => return bad_request("invalid json"),
    };
    let user = resolve_user(Some(event.user.as_str()), &query);
    let server_time = server_now();
    let record = StreamRecord {
        event,
        server_time: Some(server_time.clone()),
    };

    let _guard = state.write_lock.lock().await;
    if let Err(e) = state.files(&user).append_stream(&record).await {
        return storage_failure(e);
    }

    Json(Ack {
        ok: true,
        server_time: Some(server_time),
        saved_at: None,
    })
    .into_response()
}

pub async fn bulk(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
    body: Bytes,
) -> Response {
    let payload: BulkPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return bad_request("invalid json"),
    };
    if payload.events.is_empty() {
        return bad_request("no events");
    }
    let user = resolve_user(payload.events.first().map(|e| e.user.as_str()), &query);
    let count = payload.events.len();
    let saved_at = server_now();

    let _guard = state.write_lock.lock().await;
    let merged = match state.files(&user).merge_bulk(payload, saved_at.clone()).await {
        Ok(merged) => merged,
        Err(e) => return storage_failure(e),
    };
    info!(user = %user, count, total = merged.events.len(), "Bulk batch stored");

    Json(Ack {
        ok: true,
        server_time: None,
        saved_at: Some(saved_at),
    })
    .into_response()
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Json<ListResponse> {
    let files = state.files(&resolve_user(None, &query));
    Json(ListResponse {
        stream: files.read_stream().await,
        bulk: files.read_bulk().await,
    })
}

pub async fn reset(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Json<Ack> {
    let user = resolve_user(None, &query);
    let _guard = state.write_lock.lock().await;
    state.files(&user).clear().await;
    info!(user = %user, "User logs reset");
    Json(Ack {
        ok: true,
        ..Ack::default()
    })
}

pub async fn time() -> Json<TimeResponse> {
    Json(TimeResponse {
        server_time: server_now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use driftlog_common::{parse_millis, EventKind};
    use tower::ServiceExt;

    fn app(dir: &tempfile::TempDir) -> axum::Router {
        router(Arc::new(AppState::new(dir.path())))
    }

    fn event(seq: u64, user: &str) -> Event {
        Event {
            seq,
            kind: EventKind::WallHit,
            message: "top".into(),
            client_time: "2024-03-01T10:00:00.000Z".into(),
            user: user.into(),
        }
    }

    async fn call(app: &axum::Router, method: Method, uri: &str, body: Body) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn fetch_list(app: &axum::Router, user: &str) -> ListResponse {
        let (status, body) = call(app, Method::GET, &format!("/list?user={user}"), Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_str(&body).unwrap()
    }

    #[tokio::test]
    async fn stream_stamps_server_time() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        let body = serde_json::to_string(&event(1, "alice")).unwrap();
        let (status, ack) = call(&app, Method::POST, "/stream?user=alice", Body::from(body)).await;
        assert_eq!(status, StatusCode::OK);
        let ack: Ack = serde_json::from_str(&ack).unwrap();
        assert!(ack.ok);

        let list = fetch_list(&app, "alice").await;
        assert_eq!(list.stream.len(), 1);
        assert_eq!(list.stream[0].server_time, ack.server_time);
        assert!(list.stream[0].server_millis().is_some());
    }

    #[tokio::test]
    async fn stream_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = call(&app(&dir), Method::POST, "/stream", Body::from("{nope")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "invalid json");
    }

    #[tokio::test]
    async fn query_user_is_used_when_event_has_none() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        let body = serde_json::to_string(&event(1, "")).unwrap();
        call(&app, Method::POST, "/stream?user=bob", Body::from(body)).await;
        assert_eq!(fetch_list(&app, "bob").await.stream.len(), 1);
        assert!(fetch_list(&app, "alice").await.stream.is_empty());
    }

    #[tokio::test]
    async fn empty_bulk_is_refused_with_readable_message() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = call(
            &app(&dir),
            Method::POST,
            "/bulk?user=alice",
            Body::from(r#"{"events":[]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "no events");
    }

    #[tokio::test]
    async fn oversized_bulk_reports_storage_limit() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(Arc::new(AppState::new(dir.path()).with_max_file_bytes(64)));
        let batch = BulkPayload::new(vec![event(1, "alice"), event(2, "alice")]);
        let (status, body) = call(
            &app,
            Method::POST,
            "/bulk?user=alice",
            Body::from(serde_json::to_string(&batch).unwrap()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "storage limit reached");
        assert!(fetch_list(&app, "alice").await.bulk.events.is_empty());
    }

    #[tokio::test]
    async fn events_without_user_field_fall_back_to_query() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        let raw = r#"{"seq":1,"type":"hit","message":"top","clientTime":"2024-03-01T10:00:00.000Z"}"#;
        let (status, _) = call(&app, Method::POST, "/stream?user=carol", Body::from(raw)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(
            &app,
            Method::POST,
            "/bulk?user=carol",
            Body::from(format!(r#"{{"events":[{raw}]}}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let list = fetch_list(&app, "carol").await;
        assert_eq!(list.stream.len(), 1);
        assert_eq!(list.bulk.events.len(), 1);
    }

    #[tokio::test]
    async fn bulk_uploads_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        for seqs in [vec![1, 2], vec![3]] {
            let batch = BulkPayload::new(seqs.into_iter().map(|s| event(s, "alice")).collect());
            let (status, _) = call(
                &app,
                Method::POST,
                "/bulk?user=alice",
                Body::from(serde_json::to_string(&batch).unwrap()),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        let list = fetch_list(&app, "alice").await;
        let seqs: Vec<u64> = list.bulk.events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(list.bulk.saved_at.is_some());
    }

    #[tokio::test]
    async fn reset_clears_only_that_user() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        for user in ["alice", "bob"] {
            let body = serde_json::to_string(&event(1, user)).unwrap();
            call(&app, Method::POST, "/stream", Body::from(body)).await;
        }
        let (status, _) = call(&app, Method::POST, "/reset?user=alice", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(fetch_list(&app, "alice").await.stream.is_empty());
        assert_eq!(fetch_list(&app, "bob").await.stream.len(), 1);
    }

    #[tokio::test]
    async fn time_returns_parseable_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = call(&app(&dir), Method::GET, "/time?user=alice", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        let time: TimeResponse = serde_json::from_str(&body).unwrap();
        assert!(parse_millis(&time.server_time).is_some());
    }

    #[tokio::test]
    async fn wrong_method_is_405() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _) = call(&app(&dir), Method::GET, "/stream", Body::empty()).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
