use super::{ApiError, AuthUser};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use image_queue_core::{Filter, Task, TaskId, TaskPayload, TaskStatus, User, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

const ENQUEUE_FAILED: &str = "Failed to enqueue task";

/// REST API routes; request bodies are capped at `max_body_bytes`
pub fn create_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/task", post(create_task))
        .route("/status/:task_id", get(task_status))
        .route("/result/:task_id", get(task_result))
        .route("/commit/:task_id", post(commit_task))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct TaskIdResponse {
    task_id: TaskId,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: TaskStatus,
}

#[derive(Debug, Serialize)]
struct ResultResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct CommitRequest {
    status: TaskStatus,
    #[serde(default)]
    result: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e.body_text())))
}

fn credentials(
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Credentials, ApiError> {
    let creds = body(payload)?;
    if creds.username.is_empty() || creds.password.is_empty() {
        return Err(ApiError::BadRequest("Username and password are required".to_string()));
    }
    Ok(creds)
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid task ID".to_string()))
}

/// Fetch a task the caller owns; 403 and 404 are kept apart
async fn owned_task(state: &AppState, user_id: UserId, raw_id: &str) -> Result<Task, ApiError> {
    let task_id = parse_task_id(raw_id)?;
    let task = state.storage().get_task(task_id).await?;
    if !task.is_owned_by(&user_id) {
        return Err(ApiError::Forbidden(
            "Forbidden: You are not the owner of this task".to_string(),
        ));
    }
    Ok(task)
}

/// Register a new user
async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let creds = credentials(payload)?;
    let user = User::new(creds.username, creds.password);
    state.storage().add_user(&user).await?;

    state.metrics().registrations_total.inc();
    info!(user_id = %user.id, "Registered user {}", user.login);
    Ok(StatusCode::CREATED)
}

/// Exchange credentials for a session token
async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let creds = credentials(payload)?;
    let token = state.storage().login(&creds.username, &creds.password).await?;

    state.metrics().logins_total.inc();
    Ok(Json(TokenResponse { token }))
}

/// Create a task and hand it to the queue
async fn create_task(
    AuthUser(user_id): AuthUser,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TaskPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskIdResponse>), ApiError> {
    let task = Task::new(user_id, body(payload)?);
    let task_id = task.id;
    state.storage().add_task(&task).await?;
    state.metrics().tasks_submitted_total.inc();

    match Filter::resolve(&task.payload.filter) {
        Err(reason) => {
            let reason = reason.to_string();
            warn!(task_id = %task_id, "Rejecting task: {}", reason);
            state.metrics().inc_rejected(&reason);
            state
                .storage()
                .update_task_status(task_id, TaskStatus::Failed, reason)
                .await?;
        }
        Ok(filter) => {
            if let Err(e) = state.producer().publish(&task).await {
                error!(task_id = %task_id, "Failed to publish task: {}", e);
                state.metrics().inc_rejected(ENQUEUE_FAILED);
                if let Err(e) = state
                    .storage()
                    .update_task_status(task_id, TaskStatus::Failed, ENQUEUE_FAILED.to_string())
                    .await
                {
                    error!(task_id = %task_id, "Failed to mark task as failed: {}", e);
                }
                return Err(ApiError::Internal(ENQUEUE_FAILED.to_string()));
            }
            info!(task_id = %task_id, filter = filter.name(), "Task queued");
        }
    }

    Ok((StatusCode::CREATED, Json(TaskIdResponse { task_id })))
}

async fn task_status(
    AuthUser(user_id): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let task = owned_task(&state, user_id, &task_id).await?;
    Ok(Json(StatusResponse { status: task.status }))
}

async fn task_result(
    AuthUser(user_id): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    let task = owned_task(&state, user_id, &task_id).await?;
    Ok(Json(ResultResponse { result: task.result }))
}

/// Record a worker's outcome for a task
async fn commit_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    payload: Result<Json<CommitRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let commit = body(payload)?;
    if !commit.status.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Cannot commit status {}",
            commit.status
        )));
    }

    // existence is checked first so every backend answers 404 the same way
    state.storage().get_task(task_id).await?;
    state
        .storage()
        .update_task_status(task_id, commit.status, commit.result)
        .await?;

    state.metrics().inc_commits(commit.status);
    info!(task_id = %task_id, status = %commit.status, "Committed task");
    Ok(StatusCode::OK)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let text = state
        .metrics()
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(CONTENT_TYPE, "text/plain; version=0.0.4")], text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_BODY_BYTES;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use futures::StreamExt;
    use image_queue_broker::{BrokerError, Consumer, MemoryBroker, Producer};
    use image_queue_client::GatewayClient;
    use image_queue_persistence::{MemoryStorage, Storage};
    use image_queue_worker::{CommitReporter, Outcome, ReportError, Reporter};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Harness {
        router: Router,
        storage: Arc<MemoryStorage>,
        broker: MemoryBroker,
    }

    fn harness() -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let broker = MemoryBroker::new();
        let state = AppState::new(storage.clone(), Arc::new(broker.clone())).unwrap();
        Harness {
            router: create_router(Arc::new(state), DEFAULT_MAX_BODY_BYTES),
            storage,
            broker,
        }
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get(router: &Router, uri: String, token: &str) -> (StatusCode, Value) {
        send(router, "GET", &uri, Some(token), None).await
    }

    async fn post(router: &Router, uri: &str, token: Option<&str>, body: Value) -> StatusCode {
        send(router, "POST", uri, token, Some(body)).await.0
    }

    async fn register_and_login(router: &Router, username: &str) -> String {
        let creds = json!({ "username": username, "password": "secret" });
        assert_eq!(post(router, "/register", None, creds.clone()).await, StatusCode::CREATED);
        let (status, body) = send(router, "POST", "/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    fn grayscale_task() -> Value {
        json!({ "filter": { "name": "Grayscale", "parameters": {} }, "image": "aGVsbG8=" })
    }

    async fn submit(router: &Router, token: &str, task: Value) -> TaskId {
        let (status, body) = send(router, "POST", "/task", Some(token), Some(task)).await;
        assert_eq!(status, StatusCode::CREATED);
        body["task_id"].as_str().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let h = harness();
        let token = register_and_login(&h.router, "alice").await;

        let user_id = h.storage.resolve_session(&token).await.unwrap();
        let expected = h.storage.validate_credentials("alice", "secret").await.unwrap();
        assert_eq!(user_id, expected);
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let h = harness();
        register_and_login(&h.router, "bob").await;

        let creds = json!({ "username": "bob", "password": "other" });
        let (status, body) = send(&h.router, "POST", "/register", None, Some(creds)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "User already exists");
        assert_eq!(h.storage.user_count(), 1);
    }

    #[tokio::test]
    async fn test_register_validates_body() {
        let h = harness();
        let status = post(&h.router, "/register", None, json!({ "username": "x" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let empty = json!({ "username": "", "password": "p" });
        let (status, body) = send(&h.router, "POST", "/register", None, Some(empty)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("required"));
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let h = harness();
        register_and_login(&h.router, "carol").await;

        let creds = json!({ "username": "carol", "password": "nope" });
        let (status, body) = send(&h.router, "POST", "/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Wrong username or password");
    }

    #[tokio::test]
    async fn test_task_requires_auth() {
        let h = harness();
        let status = post(&h.router, "/task", None, grayscale_task()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let status = post(&h.router, "/task", Some("bogus"), grayscale_task()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("GET")
            .uri(format!("/status/{}", Uuid::new_v4()))
            .header("Authorization", "Basic abc")
            .body(Body::empty())
            .unwrap();
        let response = h.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_task_publishes() {
        let h = harness();
        let token = register_and_login(&h.router, "dave").await;
        let task_id = submit(&h.router, &token, grayscale_task()).await;

        let (status, body) = get(&h.router, format!("/status/{}", task_id), &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "in_progress");

        let mut deliveries = h.broker.consume().await.unwrap();
        let delivery = deliveries.next().await.unwrap().unwrap();
        assert_eq!(delivery.task().unwrap().id, task_id);
    }

    #[tokio::test]
    async fn test_large_image_is_accepted() {
        let h = harness();
        let token = register_and_login(&h.router, "dora").await;
        let image = STANDARD.encode(vec![0x5a_u8; 3 * 1024 * 1024]);
        let task = json!({ "filter": { "name": "Negative" }, "image": image });

        let task_id = submit(&h.router, &token, task).await;
        assert_eq!(h.storage.task_count(), 1);
        let stored = h.storage.get_task(task_id).await.unwrap();
        assert_eq!(stored.payload.image.len(), image.len());
        assert_eq!(h.broker.len(), 1);
    }

    #[tokio::test]
    async fn test_body_over_limit_is_rejected() {
        let storage = Arc::new(MemoryStorage::new());
        let state = AppState::new(storage.clone(), Arc::new(MemoryBroker::new())).unwrap();
        let router = create_router(Arc::new(state), 1024);
        let token = register_and_login(&router, "dirk").await;

        let task = json!({ "filter": { "name": "Negative" }, "image": "A".repeat(4096) });
        let status = post(&router, "/task", Some(&token), task).await;
        assert!(status.is_client_error());
        assert_eq!(storage.task_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_filter_fails_fast() {
        let h = harness();
        let token = register_and_login(&h.router, "erin").await;
        let task = json!({ "filter": { "name": "Sepia" }, "image": "aGVsbG8=" });
        let task_id = submit(&h.router, &token, task).await;

        let (_, body) = get(&h.router, format!("/status/{}", task_id), &token).await;
        assert_eq!(body["status"], "failed");
        let (_, body) = get(&h.router, format!("/result/{}", task_id), &token).await;
        assert_eq!(body["result"], "Unknown filter");
        assert!(h.broker.is_empty());
    }

    #[tokio::test]
    async fn test_blur_without_sigma_fails_fast() {
        let h = harness();
        let token = register_and_login(&h.router, "fred").await;
        let task = json!({
            "filter": { "name": "Blur", "parameters": { "sigma": "high" } },
            "image": ""
        });
        let task_id = submit(&h.router, &token, task).await;

        let stored = h.storage.get_task(task_id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.result, "Invalid parameters");
    }

    #[tokio::test]
    async fn test_other_users_task_is_forbidden() {
        let h = harness();
        let owner = register_and_login(&h.router, "owner").await;
        let intruder = register_and_login(&h.router, "intruder").await;
        let task_id = submit(&h.router, &owner, grayscale_task()).await;

        let (status, _) = get(&h.router, format!("/status/{}", task_id), &intruder).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = get(&h.router, format!("/result/{}", task_id), &intruder).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_task_and_bad_id() {
        let h = harness();
        let token = register_and_login(&h.router, "gina").await;

        let (status, _) = get(&h.router, format!("/status/{}", Uuid::new_v4()), &token).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = get(&h.router, "/result/not-a-uuid".to_string(), &token).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid task ID");
    }

    #[tokio::test]
    async fn test_commit_lifecycle() {
        let h = harness();
        let token = register_and_login(&h.router, "hank").await;
        let task_id = submit(&h.router, &token, grayscale_task()).await;
        let uri = format!("/commit/{}", task_id);

        let status = post(&h.router, &uri, None, json!({ "status": "in_progress" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let done = json!({ "status": "ready", "result": "b64" });
        assert_eq!(post(&h.router, &uri, None, done.clone()).await, StatusCode::OK);
        assert_eq!(post(&h.router, &uri, None, done).await, StatusCode::CONFLICT);

        let (_, body) = get(&h.router, format!("/result/{}", task_id), &token).await;
        assert_eq!(body["result"], "b64");

        let missing = format!("/commit/{}", Uuid::new_v4());
        let status = post(&h.router, &missing, None, json!({ "status": "failed" })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_commit_reporter_against_gateway() {
        let h = harness();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, h.router).await.unwrap();
        });

        let task = Task::new(
            Uuid::new_v4(),
            TaskPayload {
                filter: image_queue_core::FilterSpec::new("Grayscale"),
                image: String::new(),
            },
        );
        h.storage.add_task(&task).await.unwrap();

        let client = GatewayClient::new(format!("http://{}", addr)).unwrap();
        let reporter = CommitReporter::new(client);
        let outcome = Outcome::ready("aGVsbG8=".to_string());
        reporter.report(task.id, &outcome).await.unwrap();

        let again = reporter.report(task.id, &outcome).await;
        assert!(matches!(again, Err(ReportError::AlreadyFinished(id)) if id == task.id));

        let stored = h.storage.get_task(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Ready);
        assert_eq!(stored.result, "aGVsbG8=");
    }

    /// Refuses every publish, remembering the last task it saw
    #[derive(Default)]
    struct FailingProducer {
        last: std::sync::Mutex<Option<TaskId>>,
    }

    #[async_trait]
    impl Producer for FailingProducer {
        async fn publish(&self, task: &Task) -> image_queue_broker::Result<()> {
            *self.last.lock().unwrap() = Some(task.id);
            Err(BrokerError::Closed)
        }
    }

    #[tokio::test]
    async fn test_publish_failure_marks_task_failed() {
        let storage = Arc::new(MemoryStorage::new());
        let producer = Arc::new(FailingProducer::default());
        let state = AppState::new(storage.clone(), producer.clone()).unwrap();
        let router = create_router(Arc::new(state), DEFAULT_MAX_BODY_BYTES);
        let token = register_and_login(&router, "ivan").await;

        let task = Some(grayscale_task());
        let (status, body) = send(&router, "POST", "/task", Some(&token), task).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], ENQUEUE_FAILED);
        assert_eq!(storage.task_count(), 1);

        let task_id = producer.last.lock().unwrap().unwrap();
        let stored = storage.get_task(task_id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.result, ENQUEUE_FAILED);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let h = harness();
        let (status, body) = send(&h.router, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        register_and_login(&h.router, "jane").await;
        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = h.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("iq_logins_total 1"));
    }
}
