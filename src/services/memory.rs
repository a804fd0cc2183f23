use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{EmbedderConfig, FractalConfig, ServerConfig, StoreConfig};
use crate::memory::{
    FractalHit, IndexResponse, IngestReport, Metadata, OllamaEmbedder, RejectReason,
    SearchResponse, SemanticMemory, StoreStats, TreeSummary,
};

pub struct MemoryServerState {
    pub memory: SemanticMemory,
}

#[derive(Deserialize)]
struct IndexRequest {
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

fn default_top_k() -> usize {
    5
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    query: String,
    #[serde(default = "default_top_k", alias = "top_k")]
    top_k: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestRequest {
    #[serde(alias = "session_id")]
    session_id: String,
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    #[serde(alias = "session_id")]
    session_id: String,
    query: String,
    #[serde(default, alias = "top_k")]
    top_k: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: String,
    has_tree: bool,
    summary: Option<TreeSummary>,
}

struct ServerError(anyhow::Error);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Memory Server Error: {}", self.0),
        );
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl<E> From<E> for ServerError where E: Into<anyhow::Error> {
    fn from(err: E) -> Self { Self(err.into()) }
}

/// HTTP routes over a shared [`SemanticMemory`].
pub fn router(state: Arc<MemoryServerState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/store/index", post(index_handler))
        .route("/store/search", post(search_handler))
        .route("/store/stats", get(stats_handler))
        .route("/store/persist", post(persist_handler))
        .route("/fractal/ingest", post(ingest_handler))
        .route("/fractal/query", post(query_handler))
        .route("/fractal/sessions/{session_id}", get(session_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_memory_server() -> Result<()> {
    info!("🧠 Starting Semantic Memory Server...");

    let store_config = StoreConfig::from_env();
    let embedder_config = EmbedderConfig::from_env();
    let server_config = ServerConfig::from_env();

    info!(
        "Store at {:?} (max {} entries), embeddings via {} [{}]",
        store_config.path, store_config.max_entries, embedder_config.api_base, embedder_config.model
    );

    let embedder = Arc::new(OllamaEmbedder::new(embedder_config)?);
    let memory = SemanticMemory::open(store_config, FractalConfig::default(), embedder).await;
    let state = Arc::new(MemoryServerState { memory });

    let app = router(state.clone());

    let addr = format!("0.0.0.0:{}", server_config.port);
    info!("🚀 Memory Server listening at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, flushing vector store");
    state.memory.store().persist().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn index_handler(
    State(state): State<Arc<MemoryServerState>>,
    Json(payload): Json<IndexRequest>,
) -> (StatusCode, Json<IndexResponse>) {
    let response = state.memory.store_index(&payload.text, payload.metadata).await;
    let status = match response.rejection() {
        None => StatusCode::OK,
        Some(RejectReason::EmptyText) => StatusCode::BAD_REQUEST,
        Some(RejectReason::EmbeddingUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
        Some(RejectReason::Storage) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(response))
}

async fn search_handler(
    State(state): State<Arc<MemoryServerState>>,
    Json(payload): Json<SearchRequest>,
) -> Json<SearchResponse> {
    Json(state.memory.store_search(&payload.query, payload.top_k).await)
}

async fn stats_handler(State(state): State<Arc<MemoryServerState>>) -> Json<StoreStats> {
    Json(state.memory.store_stats().await)
}

async fn persist_handler(
    State(state): State<Arc<MemoryServerState>>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.memory.store().persist().await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn ingest_handler(
    State(state): State<Arc<MemoryServerState>>,
    Json(payload): Json<IngestRequest>,
) -> (StatusCode, Json<IngestReport>) {
    let report = state.memory.fractal_ingest(&payload.session_id, &payload.text).await;
    let status = if report.is_indexed() { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    (status, Json(report))
}

async fn query_handler(
    State(state): State<Arc<MemoryServerState>>,
    Json(payload): Json<QueryRequest>,
) -> Json<Vec<FractalHit>> {
    Json(
        state
            .memory
            .fractal_query(&payload.session_id, &payload.query, payload.top_k)
            .await,
    )
}

async fn session_handler(
    State(state): State<Arc<MemoryServerState>>,
    Path(session_id): Path<String>,
) -> Json<SessionResponse> {
    let summary = state.memory.fractal_describe(&session_id).await;
    Json(SessionResponse {
        has_tree: summary.is_some(),
        session_id,
        summary,
    })
}
