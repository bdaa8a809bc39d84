use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use bytes::Bytes;
use parley_engine::{DeletionOutcome, Engine, InProcessHub, Upload};
use parley_shared::api::{
    AnswerCallRequest, BlockRequest, CallRequest, CallResponse, ChangedResponse, CountResponse,
    DeletionResponse, IceCandidateRequest, InitiateCallRequest, LoadMoreQuery, ProfileRequest,
    SearchQuery,
};
use parley_shared::types::{CallId, ConversationId, MessageId, UserId};
use parley_shared::views::{
    BlockedUser, CallSnapshot, ConversationSummary, MessageView, OpenedConversation, TimelinePage,
    UserSummary,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{actor_middleware, Actor};
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::ws;

type ApiResult<T> = Result<Json<T>, ServerError>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub hub: InProcessHub,
    pub blobs: Arc<BlobStore>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    // Multipart framing on top of the largest accepted attachment.
    let body_limit = state.config.max_attachment_size + 64 * 1024;

    let protected = Router::new()
        .route("/ws", get(ws::subscribe))
        // Conversations
        .route("/conversations", get(list_conversations))
        .route("/conversations/search", get(search_conversations))
        .route(
            "/conversations/:id",
            get(open_conversation).delete(delete_conversation),
        )
        .route("/conversations/:id/load-more", get(load_more))
        .route("/conversations/:id/calls/mark-seen", post(mark_calls_seen))
        // Messages
        .route("/messages", post(send_message))
        .route("/messages/:id/seen", post(mark_seen))
        .route("/messages/:id/delete-for-me", delete(delete_message_for_me))
        .route("/messages/:id/unsend", delete(unsend_message))
        // Calls
        .route("/calls/initiate", post(initiate_call))
        .route("/calls/answer", post(answer_call))
        .route("/calls/reject", post(reject_call))
        .route("/calls/end", post(end_call))
        .route("/calls/missed", post(mark_missed))
        .route("/calls/ice-candidate", post(ice_candidate))
        .route("/calls/:id/delete-for-me", delete(delete_call_for_me))
        // Users
        .route("/profile", post(update_profile))
        .route("/users/:id", get(get_user))
        .route("/users/block", post(block_user))
        .route("/users/unblock", post(unblock_user))
        .route("/blocked-users", get(blocked_users))
        .route("/files/*path", get(download_file))
        .route_layer(middleware::from_fn_with_state(state.clone(), actor_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the listener fails.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn deletion_response(outcome: DeletionOutcome) -> Json<DeletionResponse> {
    Json(DeletionResponse {
        hidden: outcome.hidden,
        purged: outcome.purged,
        new_last_message: outcome.new_last_message,
    })
}

fn call_response(outcome: parley_engine::CallOutcome) -> Json<CallResponse> {
    Json(CallResponse {
        changed: outcome.is_changed(),
        call: outcome.snapshot().clone(),
    })
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

async fn list_conversations(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
) -> ApiResult<Vec<ConversationSummary>> {
    Ok(Json(state.engine.list_conversations(actor).await?))
}

async fn search_conversations(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<ConversationSummary>> {
    Ok(Json(state.engine.search_conversations(actor, &query.q).await?))
}

async fn open_conversation(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<ConversationId>,
) -> ApiResult<OpenedConversation> {
    Ok(Json(state.engine.open_conversation(actor, id).await?))
}

async fn load_more(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<ConversationId>,
    Query(query): Query<LoadMoreQuery>,
) -> ApiResult<TimelinePage> {
    Ok(Json(state.engine.load_more(actor, id, query.before).await?))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<ConversationId>,
) -> ApiResult<CountResponse> {
    let count = state.engine.delete_conversation(actor, id).await?;
    Ok(Json(CountResponse { count }))
}

async fn mark_calls_seen(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<ConversationId>,
) -> ApiResult<CountResponse> {
    let count = state.engine.mark_calls_seen_in_conversation(actor, id).await?;
    Ok(Json(CountResponse { count }))
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

async fn send_message(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MessageView>), ServerError> {
    let mut receiver: Option<UserId> = None;
    let mut content: Option<String> = None;
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "receiver_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {e}")))?;
                receiver = Some(
                    text.parse()
                        .map_err(|_| ServerError::BadRequest("Invalid receiver_id".to_string()))?,
                );
            }
            "content" => {
                content = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {e}")))?,
                );
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {e}")))?;
                if !bytes.is_empty() {
                    upload = Some(Upload {
                        bytes,
                        file_name,
                        mime_type,
                    });
                }
            }
            _ => {}
        }
    }

    let receiver = receiver
        .ok_or_else(|| ServerError::BadRequest("Missing 'receiver_id' field".to_string()))?;
    let view = state
        .engine
        .send_message(actor, receiver, content, upload)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn mark_seen(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<MessageId>,
) -> ApiResult<ChangedResponse> {
    let changed = state.engine.mark_seen(actor, id).await?;
    Ok(Json(ChangedResponse { changed }))
}

async fn delete_message_for_me(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<MessageId>,
) -> ApiResult<DeletionResponse> {
    Ok(deletion_response(state.engine.delete_for_me(actor, id).await?))
}

async fn unsend_message(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<MessageId>,
) -> ApiResult<ChangedResponse> {
    let changed = state.engine.unsend(actor, id).await?;
    Ok(Json(ChangedResponse { changed }))
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

async fn initiate_call(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(req): Json<InitiateCallRequest>,
) -> Result<(StatusCode, Json<CallSnapshot>), ServerError> {
    let snapshot = state
        .engine
        .initiate_call(actor, req.receiver_id, req.call_type, req.offer)
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn answer_call(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(req): Json<AnswerCallRequest>,
) -> ApiResult<CallResponse> {
    let outcome = state.engine.answer_call(actor, req.call_id, req.answer).await?;
    Ok(call_response(outcome))
}

async fn reject_call(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(req): Json<CallRequest>,
) -> ApiResult<CallResponse> {
    Ok(call_response(state.engine.reject_call(actor, req.call_id).await?))
}

async fn end_call(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(req): Json<CallRequest>,
) -> ApiResult<CallResponse> {
    let outcome = state.engine.end_call(actor, req.call_id, req.duration).await?;
    Ok(call_response(outcome))
}

async fn mark_missed(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(req): Json<CallRequest>,
) -> ApiResult<CallResponse> {
    Ok(call_response(state.engine.mark_missed(actor, req.call_id).await?))
}

async fn ice_candidate(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(req): Json<IceCandidateRequest>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .share_ice_candidate(actor, req.receiver_id, req.candidate)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_call_for_me(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<CallId>,
) -> ApiResult<DeletionResponse> {
    Ok(deletion_response(state.engine.delete_call_for_me(actor, id).await?))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

async fn update_profile(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(req): Json<ProfileRequest>,
) -> ApiResult<UserSummary> {
    let user = state
        .engine
        .upsert_profile(actor, &req.name, req.avatar.as_deref())
        .await?;
    Ok(Json(user))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> ApiResult<UserSummary> {
    Ok(Json(state.engine.get_user(id).await?))
}

async fn block_user(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(req): Json<BlockRequest>,
) -> ApiResult<ChangedResponse> {
    let changed = state.engine.block(actor, req.user_id).await?;
    Ok(Json(ChangedResponse { changed }))
}

async fn unblock_user(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(req): Json<BlockRequest>,
) -> ApiResult<ChangedResponse> {
    let changed = state.engine.unblock(actor, req.user_id).await?;
    Ok(Json(ChangedResponse { changed }))
}

async fn blocked_users(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
) -> ApiResult<Vec<BlockedUser>> {
    Ok(Json(state.engine.list_blocked(actor).await?))
}

async fn download_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let data: Bytes = state.blobs.read(path.trim_start_matches('/')).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use parley_engine::BlobStorage;
    use parley_shared::constants::ACTOR_HEADER;
    use parley_shared::types::CallStatus;
    use parley_store::Database;
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    const BOUNDARY: &str = "parley-test-boundary";

    struct TestApp {
        state: AppState,
        _dir: TempDir,
    }

    impl TestApp {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let blobs = Arc::new(BlobStore::new(dir.path().to_path_buf()).await.unwrap());
            let hub = InProcessHub::new();
            let engine = Engine::new(
                Database::open_in_memory().unwrap(),
                Arc::new(hub.clone()),
                blobs.clone(),
            );
            let state = AppState {
                engine,
                hub,
                blobs,
                config: Arc::new(ServerConfig::default()),
            };
            Self { state, _dir: dir }
        }

        async fn send(&self, req: Request<Body>) -> (StatusCode, Bytes) {
            let response = build_router(self.state.clone()).oneshot(req).await.unwrap();
            let status = response.status();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, body)
        }

        async fn json<T: DeserializeOwned>(&self, req: Request<Body>) -> T {
            let (status, body) = self.send(req).await;
            assert!(
                status.is_success(),
                "unexpected {status}: {}",
                String::from_utf8_lossy(&body)
            );
            serde_json::from_slice(&body).unwrap()
        }

        async fn register(&self, id: i64, name: &str) {
            let _: UserSummary = self
                .json(post_json(id, "/profile", json!({ "name": name })))
                .await;
        }

        async fn send_text(&self, from: i64, to: i64, content: &str) -> MessageView {
            let body = format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"receiver_id\"\r\n\r\n{to}\r\n\
                 --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"content\"\r\n\r\n{content}\r\n\
                 --{BOUNDARY}--\r\n"
            );
            self.json(multipart(from, body.into_bytes())).await
        }
    }

    fn get_as(actor: i64, uri: &str) -> Request<Body> {
        Request::get(uri)
            .header(ACTOR_HEADER, actor.to_string())
            .body(Body::empty())
            .unwrap()
    }

    fn delete_as(actor: i64, uri: &str) -> Request<Body> {
        Request::delete(uri)
            .header(ACTOR_HEADER, actor.to_string())
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(actor: i64, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(ACTOR_HEADER, actor.to_string())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart(actor: i64, body: Vec<u8>) -> Request<Body> {
        Request::post("/messages")
            .header(ACTOR_HEADER, actor.to_string())
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_actor() {
        let app = TestApp::new().await;
        let (status, _) = app
            .send(Request::get("/health").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_actor_is_unauthorized() {
        let app = TestApp::new().await;
        let (status, body) = app
            .send(Request::get("/conversations").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(error["error"].is_string());
    }

    #[tokio::test]
    async fn message_flow_over_http() {
        let app = TestApp::new().await;
        app.register(1, "Alice").await;
        app.register(2, "Bob").await;
        let mut bob_events = app.state.hub.subscribe(UserId(2));

        let sent = app.send_text(1, 2, "hello bob").await;
        assert!(sent.is_mine);
        assert_eq!(sent.content.as_deref(), Some("hello bob"));
        assert_eq!(
            bob_events.recv().await.unwrap().payload.name(),
            "message.sent"
        );

        let inbox: Vec<ConversationSummary> = app.json(get_as(2, "/conversations")).await;
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].unread_count, 1);
        assert_eq!(inbox[0].other_user.name, "Alice");

        let opened: OpenedConversation = app
            .json(get_as(2, &format!("/conversations/{}", sent.conversation_id)))
            .await;
        assert_eq!(opened.page.items.len(), 1);
        assert!(!opened.is_blocked);

        let seen: ChangedResponse = app
            .json(post_json(2, &format!("/messages/{}/seen", sent.id), json!({})))
            .await;
        assert!(seen.changed);

        let found: Vec<ConversationSummary> =
            app.json(get_as(2, "/conversations/search?q=ALI")).await;
        assert_eq!(found.len(), 1);
        let none: Vec<ConversationSummary> =
            app.json(get_as(2, "/conversations/search?q=zed")).await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn outsiders_are_forbidden() {
        let app = TestApp::new().await;
        app.register(1, "Alice").await;
        app.register(2, "Bob").await;
        app.register(3, "Eve").await;
        let sent = app.send_text(1, 2, "private").await;

        let (status, _) = app
            .send(get_as(3, &format!("/conversations/{}", sent.conversation_id)))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .send(delete_as(2, &format!("/messages/{}/unsend", sent.id)))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.send(get_as(1, "/conversations/999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let app = TestApp::new().await;
        app.register(2, "Bob").await;
        let (status, _) = app
            .send(multipart(
                1,
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"receiver_id\"\r\n\r\n2\r\n\
                     --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"content\"\r\n\r\n   \r\n\
                     --{BOUNDARY}--\r\n"
                )
                .into_bytes(),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn attachment_upload_and_download() {
        let app = TestApp::new().await;
        app.register(1, "Alice").await;
        app.register(2, "Bob").await;

        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"receiver_id\"\r\n\r\n2\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"cat.png\"\r\n\
             Content-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(b"not-really-a-png");
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let sent: MessageView = app.json(multipart(1, body)).await;
        let attachment = sent.attachment.expect("attachment recorded");
        assert!(app.state.blobs.exists(&attachment.path).await.unwrap());

        let (status, data) = app
            .send(get_as(2, &format!("/files/{}", attachment.path)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&data[..], b"not-really-a-png");

        let (status, _) = app.send(get_as(2, "/files/missing.png")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_for_me_then_unsend() {
        let app = TestApp::new().await;
        app.register(1, "Alice").await;
        app.register(2, "Bob").await;
        let first = app.send_text(1, 2, "first").await;
        let second = app.send_text(1, 2, "second").await;

        let deleted: DeletionResponse = app
            .json(delete_as(1, &format!("/messages/{}/delete-for-me", second.id)))
            .await;
        assert!(deleted.hidden);
        assert!(!deleted.purged);
        assert_eq!(
            deleted.new_last_message.map(|p| p.content),
            Some("first".to_string())
        );

        let unsent: ChangedResponse = app
            .json(delete_as(1, &format!("/messages/{}/unsend", first.id)))
            .await;
        assert!(unsent.changed);
        let again: ChangedResponse = app
            .json(delete_as(1, &format!("/messages/{}/unsend", first.id)))
            .await;
        assert!(!again.changed);
    }

    #[tokio::test]
    async fn call_lifecycle_over_http() {
        let app = TestApp::new().await;
        app.register(1, "Alice").await;
        app.register(2, "Bob").await;

        let call: CallSnapshot = app
            .json(post_json(
                1,
                "/calls/initiate",
                json!({ "receiver_id": 2, "call_type": "video", "offer": { "sdp": "v=0" } }),
            ))
            .await;
        assert_eq!(call.status, CallStatus::Initiated);

        // Only the receiver may answer.
        let (status, _) = app
            .send(post_json(1, "/calls/answer", json!({ "call_id": call.id })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let answered: CallResponse = app
            .json(post_json(2, "/calls/answer", json!({ "call_id": call.id, "answer": {} })))
            .await;
        assert!(answered.changed);
        assert_eq!(answered.call.status, CallStatus::Answered);

        let (status, _) = app
            .send(post_json(
                2,
                "/calls/ice-candidate",
                json!({ "receiver_id": 1, "candidate": { "candidate": "a=1" } }),
            ))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let ended: CallResponse = app
            .json(post_json(1, "/calls/end", json!({ "call_id": call.id, "duration": 65 })))
            .await;
        assert_eq!(ended.call.status, CallStatus::Ended);
        assert_eq!(ended.call.duration, Some(65));

        let again: CallResponse = app
            .json(post_json(1, "/calls/end", json!({ "call_id": call.id })))
            .await;
        assert!(!again.changed);

        let deleted: DeletionResponse = app
            .json(delete_as(2, &format!("/calls/{}/delete-for-me", call.id)))
            .await;
        assert!(deleted.hidden);
    }

    #[tokio::test]
    async fn blocking_stops_calls() {
        let app = TestApp::new().await;
        app.register(1, "Alice").await;
        app.register(2, "Bob").await;

        let blocked: ChangedResponse = app
            .json(post_json(2, "/users/block", json!({ "user_id": 1 })))
            .await;
        assert!(blocked.changed);

        let list: Vec<BlockedUser> = app.json(get_as(2, "/blocked-users")).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].user.id, UserId(1));

        let (status, _) = app
            .send(post_json(
                1,
                "/calls/initiate",
                json!({ "receiver_id": 2, "call_type": "audio" }),
            ))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let unblocked: ChangedResponse = app
            .json(post_json(2, "/users/unblock", json!({ "user_id": 1 })))
            .await;
        assert!(unblocked.changed);
    }

    #[tokio::test]
    async fn profile_lookup() {
        let app = TestApp::new().await;
        app.register(7, "  Grace ").await;

        let user: UserSummary = app.json(get_as(1, "/users/7")).await;
        assert_eq!(user.name, "Grace");

        let (status, _) = app.send(get_as(1, "/users/8")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
