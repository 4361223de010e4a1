use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use sitesearch_core::persist::{load_or_default, save_store, StorePaths};
use sitesearch_core::{
    search_for, Indexer, Locale, PageInput, SearchError, SearchHit, SearchOptions, Store,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub indexer: Arc<Indexer>,
    pub store_dir: PathBuf,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default)]
    pub or: bool,
    #[serde(default)]
    pub fuzzy: bool,
    /// Comma-separated parent ids to scope the search to.
    #[serde(default)]
    pub pids: Option<String>,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub min_length: usize,
    #[serde(default)]
    pub locale: Option<String>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct IndexResponse {
    pub created: bool,
}

pub fn build_app(store_dir: String) -> Result<Router> {
    let paths = StorePaths::new(&store_dir);
    let store = Arc::new(load_or_default(&paths)?);
    let indexer = Arc::new(Indexer::new(store.clone()));
    let state = AppState {
        store,
        indexer,
        store_dir: PathBuf::from(&store_dir),
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/index", post(index_handler))
        .route("/remove", delete(remove_handler))
        .route("/commit", post(commit_handler))
        .with_state(state)
        .layer(cors);
    Ok(app)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();

    let locale = match &params.locale {
        Some(tag) => Locale::parse(tag).map_err(error_response)?,
        None => Locale::default(),
    };
    let pids = params
        .pids
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<i64>().ok())
        .collect();

    let options = SearchOptions {
        or_search: params.or,
        pids,
        limit: params.limit,
        offset: params.offset,
        fuzzy: params.fuzzy,
        min_length: params.min_length,
        locale,
    };
    let results = search_for(&state.store, &params.q, &options).map_err(error_response)?;

    Ok(Json(SearchResponse {
        query: params.q,
        took_s: start.elapsed().as_secs_f64(),
        total: results.total,
        results: results.hits,
    }))
}

pub async fn index_handler(
    State(state): State<AppState>,
    Json(page): Json<PageInput>,
) -> Result<Json<IndexResponse>, (StatusCode, String)> {
    let created = state.indexer.index_page(page).map_err(error_response)?;
    Ok(Json(IndexResponse { created }))
}

#[derive(Deserialize)]
pub struct RemoveParams {
    pub url: String,
}

pub async fn remove_handler(
    State(state): State<AppState>,
    Query(params): Query<RemoveParams>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .indexer
        .remove_entry(&params.url)
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn commit_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let paths = StorePaths::new(&state.store_dir);
    save_store(&paths, &state.store).map_err(error_response)?;
    Ok(Json(serde_json::json!({ "saved": true })))
}

fn error_response(err: SearchError) -> (StatusCode, String) {
    let status = match err {
        SearchError::EmptyQuery | SearchError::UnknownLocale(_) => StatusCode::BAD_REQUEST,
        SearchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}
