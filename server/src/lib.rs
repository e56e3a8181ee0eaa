use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use rag_core::{filter, rank, summarize, Corpus, CorpusStore, DateBounds, FilterSpec, OfferMetadata, RagError, RankedResult, Statistics};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const MAX_TOP_N: usize = 100;

#[derive(Deserialize)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    #[serde(default)]
    pub filters: Option<serde_json::Value>,
    #[serde(default)]
    pub date_range: Option<DateBounds>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}
fn default_top_n() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub total_candidates: usize,
    pub returned: usize,
    pub took_s: f64,
    pub results: Vec<RankedResult>,
    pub statistics: Option<Statistics>,
}

#[derive(Serialize)]
pub struct RecordResponse {
    pub index: usize,
    pub content: String,
    pub metadata: OfferMetadata,
}

#[derive(Clone)]
pub struct AppState {
    pub store: CorpusStore,
    pub corpus: Arc<RwLock<Corpus>>,
    pub admin_token: Option<String>,
}

/// JSON error body with a status derived from the error kind.
pub struct ApiError(StatusCode, String);

impl From<RagError> for ApiError {
    fn from(e: RagError) -> Self {
        let status = match &e {
            e if e.is_caller_error() => StatusCode::BAD_REQUEST,
            RagError::StorageUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

/// Builds the router. Admin routes refuse every call when `admin_token` is `None`.
pub fn build_app(corpus_path: String, admin_token: Option<String>) -> Result<Router> {
    let store = CorpusStore::new(&corpus_path);
    let corpus = store.load_or_empty()?;
    tracing::info!(path = %corpus_path, records = corpus.len(), "corpus loaded");
    let app_state = AppState { store, corpus: Arc::new(RwLock::new(corpus)), admin_token };

    // CORS_ALLOW_ORIGIN is a comma-separated list; unset or empty allows any origin
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", post(search_handler))
        .route("/record/:index", get(record_handler))
        .route("/admin/reload", post(reload_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

pub async fn search_handler(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let spec = match &req.filters {
        Some(v) => FilterSpec::from_json(v)?,
        None => FilterSpec::default(),
    };
    let range = req.date_range.unwrap_or_default().to_range()?;
    let top_n = req.top_n.min(MAX_TOP_N);

    let corpus = state.corpus.read();
    let view = filter(&corpus, &spec).within_dates(&range);
    let total_candidates = view.len();
    let results = rank(&req.vector, &view, top_n)?;
    drop(corpus);

    let statistics = summarize(&results);
    let elapsed = start.elapsed();
    tracing::debug!(total_candidates, returned = results.len(), took_s = elapsed.as_secs_f64(), "search served");
    Ok(Json(SearchResponse { total_candidates, returned: results.len(), took_s: elapsed.as_secs_f64(), results, statistics }))
}

pub async fn record_handler(State(state): State<AppState>, Path(index): Path<usize>) -> Result<Json<RecordResponse>, ApiError> {
    let corpus = state.corpus.read();
    match corpus.get(index) {
        Some(r) => Ok(Json(RecordResponse { index, content: r.content.to_string(), metadata: r.metadata.clone() })),
        None => Err(ApiError(StatusCode::NOT_FOUND, format!("no record at index {index}"))),
    }
}

async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    // load outside the lock so searches keep running against the old corpus
    let store = state.store.clone();
    let fresh = tokio::task::spawn_blocking(move || store.load())
        .await
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, format!("reload task failed: {e}")))??;
    let records = fresh.len();
    *state.corpus.write() = fresh;
    tracing::info!(records, "corpus reloaded");
    Ok(Json(serde_json::json!({ "records": records })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError(StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
