use crate::registry_directory::RegisteredLocations;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SubsecRound, Utc};
use rtls_core::ingest_contracts::{IngestAck, IngestPayload, TagStateView, WhereResponse};
use rtls_core::registry_contracts::{
    ReaderCreate, ReaderRecord, TagCreate, TagRecord, UserCreate, UserRecord,
};
use rtls_locator::LocationEngine;
use rtls_storage::{NewUser, RegistryStore, StorageError};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LocationEngine>,
    pub registry: Arc<Mutex<RegistryStore>>,
    pub locations: Arc<RegisteredLocations>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/where/:tag_id", get(where_is))
        .route("/state/:tag_id", get(tag_state))
        .route("/readers", post(create_reader).get(list_readers))
        .route("/tags", post(create_tag).get(list_tags))
        .route("/users", post(create_user).get(list_users))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(code: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: code.replace('_', " "),
        }
    }

    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Duplicate { .. } => Self {
                status: StatusCode::CONFLICT,
                code: "duplicate",
                message: err.to_string(),
            },
            StorageError::Invalid(_) => Self {
                status: StatusCode::BAD_REQUEST,
                code: "invalid_input",
                message: err.to_string(),
            },
            other => {
                error!(event = "registry_error", error = %other);
                Self::internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "ok": false,
            "code": self.code,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

async fn ingest(
    State(state): State<AppState>,
    Json(mut payload): Json<IngestPayload>,
) -> Result<Json<IngestAck>, ApiError> {
    if payload.reader_id.trim().is_empty() {
        warn!(event = "ingest_rejected", reason = "missing_reader_id");
        return Err(ApiError::bad_request("missing_reader_id"));
    }
    let skipped = payload.retain_addressable();
    if skipped > 0 {
        warn!(
            event = "ingest_entries_skipped",
            reader_id = %payload.reader_id,
            reason = "missing_tag_id",
            skipped
        );
    }
    let now = Utc::now().trunc_subsecs(0);
    let report = state.engine.ingest(&payload, now);
    Ok(Json(IngestAck {
        ok: true,
        processed: report.processed,
        skipped,
    }))
}

async fn where_is(State(state): State<AppState>, Path(tag_id): Path<String>) -> Json<WhereResponse> {
    Json(state.engine.locate(&tag_id).to_response(&tag_id))
}

async fn tag_state(
    State(state): State<AppState>,
    Path(tag_id): Path<String>,
) -> Result<Json<TagStateView>, StatusCode> {
    state
        .engine
        .view(&tag_id, Utc::now().trunc_subsecs(0))
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_reader(
    State(state): State<AppState>,
    Json(body): Json<ReaderCreate>,
) -> Result<(StatusCode, Json<ReaderRecord>), ApiError> {
    let record = with_registry(&state, move |store| store.create_reader(&body)).await?;
    state.locations.remember(&record);
    info!(
        event = "reader_registered",
        reader_id = %record.reader_id,
        location_name = %record.location_name
    );
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_readers(State(state): State<AppState>) -> Result<Json<Vec<ReaderRecord>>, ApiError> {
    Ok(Json(with_registry(&state, |store| store.list_readers()).await?))
}

#[derive(Debug, Deserialize)]
struct TagQuery {
    #[serde(default)]
    q: Option<String>,
}

async fn create_tag(
    State(state): State<AppState>,
    Json(body): Json<TagCreate>,
) -> Result<(StatusCode, Json<TagRecord>), ApiError> {
    let record = with_registry(&state, move |store| store.create_tag(&body)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
) -> Result<Json<Vec<TagRecord>>, ApiError> {
    let tags = with_registry(&state, move |store| store.list_tags(query.q.as_deref())).await?;
    Ok(Json(tags))
}

async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserRecord>), ApiError> {
    let user = blocking(move || NewUser::prepare(&body)).await?;
    let record = with_registry(&state, move |store| store.create_user(&user)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserRecord>>, ApiError> {
    Ok(Json(with_registry(&state, |store| store.list_users()).await?))
}

// SQLite and password hashing block, so they run off the async workers.
async fn blocking<T, F>(op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?
        .map_err(ApiError::from)
}

async fn with_registry<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&RegistryStore) -> Result<T, StorageError> + Send + 'static,
{
    let registry = Arc::clone(&state.registry);
    blocking(move || {
        let store = registry.lock().unwrap_or_else(PoisonError::into_inner);
        op(&store)
    })
    .await
}
