//! HTTP server exposing a store to [`RemoteStore`](crate::store::RemoteStore) clients.
//!
//! Routes and payloads are described in [`crate::store::protocol`]. Store
//! calls are blocking, so each handler moves its work onto tokio's blocking
//! pool.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{VindexError, VindexResult};
use crate::store::VectorStore;
use crate::store::protocol::{
    EnsureCollectionRequest, ErrorBody, HealthResponse, InsertRequest, InsertResponse,
    SearchRequest, SearchResponse,
};
use crate::vector::CollectionInfo;

type SharedStore = Arc<dyn VectorStore>;

/// Error wrapper turning [`VindexError`] into a JSON envelope.
struct ApiError(VindexError);

impl From<VindexError> for ApiError {
    fn from(err: VindexError) -> Self {
        Self(err)
    }
}

fn status_for(err: &VindexError) -> StatusCode {
    match err {
        VindexError::CollectionNotFound { .. } | VindexError::PathNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        VindexError::DuplicateId { .. }
        | VindexError::CollectionDimensionMismatch { .. }
        | VindexError::CollectionMetricMismatch { .. } => StatusCode::CONFLICT,
        VindexError::Config { .. }
        | VindexError::DimensionMismatch { .. }
        | VindexError::Decode { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(ErrorBody::from_error(&self.0))).into_response()
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> VindexResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(VindexError::backend("server", e)))?
        .map_err(ApiError)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn ensure_collection(
    State(store): State<SharedStore>,
    Path(name): Path<String>,
    Json(request): Json<EnsureCollectionRequest>,
) -> Result<Json<CollectionInfo>, ApiError> {
    let info = blocking(move || store.ensure_collection(&name, request.dimension, request.metric)).await?;
    Ok(Json(info))
}

async fn describe_collection(
    State(store): State<SharedStore>,
    Path(name): Path<String>,
) -> Result<Json<CollectionInfo>, ApiError> {
    Ok(Json(blocking(move || store.describe(&name)).await?))
}

async fn drop_collection(
    State(store): State<SharedStore>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    blocking(move || store.drop_collection(&name)).await?;
    Ok(Json(serde_json::json!({ "dropped": true })))
}

async fn insert_records(
    State(store): State<SharedStore>,
    Path(name): Path<String>,
    Json(request): Json<InsertRequest>,
) -> Result<Json<InsertResponse>, ApiError> {
    let inserted = blocking(move || store.insert(&name, &request.records)).await?;
    Ok(Json(InsertResponse { inserted }))
}

async fn search_records(
    State(store): State<SharedStore>,
    Path(name): Path<String>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let results = blocking(move || {
        store.search(&name, &request.vector, request.top_k, request.threshold)
    })
    .await?;
    Ok(Json(SearchResponse { results }))
}

/// Router serving `store`, accepting request bodies up to `max_body_bytes`.
pub fn router(store: SharedStore, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/collections/{name}",
            put(ensure_collection)
                .get(describe_collection)
                .delete(drop_collection),
        )
        .route("/collections/{name}/records", post(insert_records))
        .route("/collections/{name}/search", post(search_records))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// Serves on an already bound listener until `shutdown` resolves.
pub async fn serve_on<S>(
    listener: tokio::net::TcpListener,
    store: SharedStore,
    max_body_bytes: usize,
    shutdown: S,
) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(store, max_body_bytes))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Binds `bind` and serves until Ctrl+C.
pub async fn serve(store: SharedStore, bind: &str, max_body_bytes: usize) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    info!(%addr, location = %store.location(), max_body_bytes, "vindex server listening");
    eprintln!("vindex server listening on http://{addr}");
    eprintln!("Press Ctrl+C to stop the server");

    serve_on(listener, store, max_body_bytes, async {
        if tokio::signal::ctrl_c().await.is_err() {
            // no signal handler available, wait forever
            std::future::pending::<()>().await;
        }
        eprintln!("Received shutdown signal");
    })
    .await?;

    eprintln!("Server shut down gracefully");
    Ok(())
}
