use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::collector::ANALYTICS_PATH;
use crate::error::Error;
use crate::ingest::{self, BatchStore, IngestError};
use crate::types::StoredBatch;

const PROCESS_FAILED: &str = "Failed to process analytics data";
const RETRIEVE_FAILED: &str = "Failed to retrieve analytics data";

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn BatchStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn BatchStore>) -> Self {
        Self { store }
    }
}

/// HTTP error variants mapped to JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// The request body was rejected
    Ingest(IngestError),
    /// The store failed; `public` is what the client sees
    Store { public: &'static str, source: Error },
    /// A blocking store task panicked or was cancelled
    Internal(&'static str, String),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::Ingest(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            // Unparseable bodies are treated as a processing failure
            Self::Ingest(IngestError::Malformed(e)) => {
                tracing::error!(error = %e, "Malformed analytics body");
                (StatusCode::INTERNAL_SERVER_ERROR, PROCESS_FAILED.to_string())
            }
            Self::Ingest(e) => {
                tracing::debug!(error = %e, "Rejected analytics payload");
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            Self::Store { public, source } => {
                tracing::error!(error = %source, "Analytics store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, public.to_string())
            }
            Self::Internal(public, detail) => {
                tracing::error!(error = %detail, "Analytics handler failure");
                (StatusCode::INTERNAL_SERVER_ERROR, public.to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Query string for `GET /api/analytics`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct Accepted {
    success: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Build the Axum router with all handlers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(ANALYTICS_PATH, get(query_analytics).post(ingest_batch))
        .route("/health", get(health))
        .with_state(state)
}

/// Run a store operation on the blocking pool.
async fn with_store<T, F>(state: &AppState, public: &'static str, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn BatchStore) -> crate::error::Result<T> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| ApiError::Internal(public, e.to_string()))?
        .map_err(|source| ApiError::Store { public, source })
}

async fn ingest_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Accepted>, ApiError> {
    let batch = ingest::sanitize(ingest::parse_payload(&body)?);
    let events = batch.len();

    with_store(&state, PROCESS_FAILED, move |store| {
        store.append(StoredBatch::received_now(batch))
    })
    .await?;

    tracing::debug!(events, "Accepted analytics batch");
    Ok(Json(Accepted { success: true }))
}

async fn query_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Response, ApiError> {
    // An empty `sessionId` means no filter
    match query.session_id.filter(|id| !id.is_empty()) {
        Some(session_id) => {
            let batches = with_store(&state, RETRIEVE_FAILED, move |store| {
                store.batches_for_session(&session_id)
            })
            .await?;
            Ok(Json(batches).into_response())
        }
        None => {
            let summary = with_store(&state, RETRIEVE_FAILED, |store| store.summary()).await?;
            Ok(Json(summary).into_response())
        }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::MemoryStore;
    use crate::types::StoredBatch;
    use axum::body::{to_bytes, Body};
    use axum::http::header::CONTENT_TYPE;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn make_router() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let router = build_router(AppState::new(store.clone()));
        (router, store)
    }

    async fn response_json(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let json = serde_json::from_slice::<Value>(&bytes).expect("JSON body");
        (status, json)
    }

    async fn post(router: Router, body: impl Into<Body>) -> (StatusCode, Value) {
        response_json(
            router
                .oneshot(
                    Request::post(ANALYTICS_PATH)
                        .header(CONTENT_TYPE, "application/json")
                        .body(body.into())
                        .expect("post request"),
                )
                .await
                .expect("post call"),
        )
        .await
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        response_json(
            router
                .oneshot(Request::get(uri).body(Body::empty()).expect("get request"))
                .await
                .expect("get call"),
        )
        .await
    }

    fn payload(session: &str, types: &[&str], label: Option<&str>) -> Value {
        let events: Vec<Value> = types
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut event = json!({
                    "type": t,
                    "category": "test",
                    "action": format!("action-{i}"),
                    "timestamp": 1_700_000_000_000i64 + i as i64,
                    "sessionId": session
                });
                if let Some(label) = label {
                    event["label"] = json!(label);
                }
                event
            })
            .collect();

        json!({
            "events": events,
            "userAgent": "Mozilla/5.0",
            "language": "en-US",
            "timezone": "UTC",
            "screen": {"width": 1920, "height": 1080},
            "viewport": {"width": 1280, "height": 720}
        })
    }

    #[tokio::test]
    async fn post_valid_batch_is_stored() {
        let (router, store) = make_router();
        let (status, json) = post(
            router,
            payload("s-1", &["page_view", "interaction"], None).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({"success": true}));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn post_events_not_array_is_rejected() {
        let (router, store) = make_router();
        let (status, json) = post(router, json!({"events": "not-an-array"}).to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, json!({"error": "Invalid payload"}));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn post_malformed_json_is_server_error() {
        let (router, store) = make_router();
        let (status, json) = post(router, "{not json").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], PROCESS_FAILED);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn post_unknown_event_type_is_rejected() {
        let (router, store) = make_router();
        let (status, json) = post(router, payload("s-1", &["purchase"], None).to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid event at index 0"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn post_label_is_sanitized() {
        let (router, store) = make_router();
        let (status, _) = post(
            router,
            payload("s-1", &["interaction"], Some("<script>alert(1)</script>")).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let stored = store.all_batches().unwrap();
        assert_eq!(
            stored[0].batch.events[0].label.as_deref(),
            Some("scriptalert1script")
        );
    }

    #[tokio::test]
    async fn post_truncates_user_agent() {
        let (router, store) = make_router();
        let mut body = payload("s-1", &["page_view"], None);
        body["userAgent"] = json!("x".repeat(500));
        post(router, body.to_string()).await;

        let stored = store.all_batches().unwrap();
        assert_eq!(stored[0].batch.context.user_agent.chars().count(), 200);
    }

    #[tokio::test]
    async fn get_summary_counts_all_batches() {
        let (router, _store) = make_router();

        let first = ["page_view"; 4]
            .into_iter()
            .chain(["interaction"; 4])
            .collect::<Vec<_>>();
        let second = ["page_view"; 2]
            .into_iter()
            .chain(["custom"; 5])
            .collect::<Vec<_>>();
        post(router.clone(), payload("s-1", &first, None).to_string()).await;
        post(router.clone(), payload("s-2", &second, None).to_string()).await;

        let (status, json) = get_json(router, ANALYTICS_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            json!({
                "totalEvents": 15,
                "uniqueSessions": 2,
                "eventTypes": {"page_view": 6, "interaction": 4, "custom": 5},
                "dataPoints": 2
            })
        );
    }

    #[tokio::test]
    async fn get_by_session_returns_matching_batches() {
        let (router, _store) = make_router();
        post(router.clone(), payload("s-1", &["page_view"], None).to_string()).await;
        post(router.clone(), payload("s-2", &["page_view"], None).to_string()).await;
        post(router.clone(), payload("s-1", &["custom"], None).to_string()).await;

        let (status, json) = get_json(router.clone(), "/api/analytics?sessionId=s-1").await;
        assert_eq!(status, StatusCode::OK);
        let batches: Vec<StoredBatch> = serde_json::from_value(json).unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.batch.contains_session("s-1")));

        let (_, json) = get_json(router, "/api/analytics?sessionId=unknown").await;
        assert_eq!(json, json!([]));
    }

    #[tokio::test]
    async fn get_with_empty_session_id_returns_summary() {
        let (router, _store) = make_router();
        post(router.clone(), payload("s-1", &["page_view"], None).to_string()).await;

        let (status, json) = get_json(router, "/api/analytics?sessionId=").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["totalEvents"], 1);
        assert_eq!(json["dataPoints"], 1);
    }

    #[tokio::test]
    async fn get_summary_on_empty_store() {
        let (router, _store) = make_router();
        let (status, json) = get_json(router, ANALYTICS_PATH).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["totalEvents"], 0);
        assert_eq!(json["dataPoints"], 0);
        assert_eq!(json["eventTypes"], json!({}));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (router, _store) = make_router();
        let (status, json) = get_json(router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    struct FailingStore;

    impl BatchStore for FailingStore {
        fn append(&self, _batch: StoredBatch) -> crate::error::Result<()> {
            Err(Error::Storage("disk full".to_string()))
        }

        fn all_batches(&self) -> crate::error::Result<Vec<StoredBatch>> {
            Err(Error::Storage("disk gone".to_string()))
        }
    }

    #[tokio::test]
    async fn store_failures_map_to_500() {
        let router = build_router(AppState::new(Arc::new(FailingStore)));

        let (status, json) = post(
            router.clone(),
            payload("s-1", &["page_view"], None).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], PROCESS_FAILED);

        let (status, json) = get_json(router, ANALYTICS_PATH).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], RETRIEVE_FAILED);
    }
}
