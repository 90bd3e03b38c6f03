use anyhow::{bail, Result};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use blogsearch_core::persist::{load_snapshot, save_snapshot, IndexPaths};
use blogsearch_core::{DocId, DocumentStore, EngineConfig, SearchEngine, SearchResult, Snapshot, DEFAULT_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 100;
const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { DEFAULT_LIMIT }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_ms: u128,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f32,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl From<SearchResult> for SearchHit {
    fn from(r: SearchResult) -> Self {
        Self { doc_id: r.doc_id, score: r.score, title: r.title, url: r.url, snippet: r.snippet }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub index_dir: PathBuf,
    /// Source store re-read by `/admin/reload`.
    pub store_path: Option<PathBuf>,
    pub admin_token: Option<String>,
}

/// Open the saved index in `index_dir`, or build one from `store_path` when none exists yet.
pub fn build_app(index_dir: String, store_path: Option<PathBuf>, config: EngineConfig) -> Result<Router> {
    let paths = IndexPaths::new(&index_dir);
    let snapshot = if paths.root.join("meta.json").exists() {
        load_snapshot(&paths, config)?
    } else if let Some(store_path) = &store_path {
        let snapshot = Snapshot::build(read_store(store_path)?, config);
        save_snapshot(&paths, &snapshot)?;
        snapshot
    } else {
        bail!("no index in {index_dir} and no --store to build one from");
    };
    let state = AppState {
        engine: Arc::new(SearchEngine::new(snapshot)),
        index_dir: PathBuf::from(&index_dir),
        store_path,
        admin_token: std::env::var("ADMIN_TOKEN").ok(),
    };
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(std::env::var("CORS_ALLOW_ORIGIN").ok().as_deref());
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/admin/reload", post(reload_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    // pin one snapshot for the whole request
    let snapshot = state.engine.snapshot();
    let k = params.k.clamp(1, MAX_K);
    let page = snapshot.search_page(&params.q, k).map_err(internal)?;

    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, total_hits = page.total_hits, "search");
    Ok(Json(SearchResponse {
        query: params.q,
        took_ms: elapsed.as_millis(),
        took_s: elapsed.as_secs_f64(),
        total_hits: page.total_hits,
        results: page.results.into_iter().map(SearchHit::from).collect(),
    }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let snapshot = state.engine.snapshot();
    match snapshot.store().get(doc_id) {
        Some(doc) => Ok(Json(serde_json::json!(doc))),
        None => Err((StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" })))),
    }
}

/// Re-read the store file, rebuild, persist and swap the snapshot. Requests already running keep
/// the snapshot they started with.
async fn reload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let Some(store_path) = state.store_path.clone() else {
        return Err((StatusCode::BAD_REQUEST, "server started without --store".into()));
    };
    let engine = state.engine.clone();
    let index_dir = state.index_dir.clone();
    let summary = tokio::task::spawn_blocking(move || -> Result<serde_json::Value> {
        let store = read_store(&store_path)?;
        engine.rebuild(store);
        let snapshot = engine.snapshot();
        save_snapshot(&IndexPaths::new(&index_dir), &snapshot)?;
        Ok(serde_json::json!({
            "num_docs": snapshot.index().num_docs(),
            "num_terms": snapshot.index().num_terms(),
            "rejected": snapshot.index().warnings().iter().map(|w| w.to_string()).collect::<Vec<_>>(),
        }))
    })
    .await
    .map_err(internal)?
    .map_err(internal)?;
    Ok(Json(summary))
}

fn read_store(path: &std::path::Path) -> Result<DocumentStore> {
    let text = std::fs::read_to_string(path)?;
    Ok(DocumentStore::from_store_text(&text)?)
}

fn internal<E: std::fmt::Display>(err: E) -> (StatusCode, String) {
    tracing::error!(error = %err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// Any origin unless `CORS_ALLOW_ORIGIN` names at least one valid origin (comma-separated).
fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> =
        allowed.unwrap_or("").split(',').filter_map(|s| s.trim().parse().ok()).collect();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err((StatusCode::UNAUTHORIZED, "reload disabled: ADMIN_TOKEN not set".into()));
    };
    match headers.get(ADMIN_TOKEN_HEADER).map(|v| v.as_bytes()) {
        Some(provided) if provided == expected.as_bytes() => Ok(()),
        _ => Err((StatusCode::UNAUTHORIZED, "invalid admin token".into())),
    }
}
