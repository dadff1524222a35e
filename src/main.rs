//! Org Roster - rebuilds reporting hierarchies from HR roster exports.

mod canonical;
mod chart;
mod config;
mod error;
mod export;
mod forest;
mod pipeline;
mod roster;
mod sheet_parser;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use canonical::CanonicalPerson;
use config::{ConfigStore, RosterConfig};
use error::ValidationError;
use forest::{DepartmentGroup, TreeNode};
use pipeline::{RosterBuild, RosterSummary};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type ApiError = (StatusCode, String);

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    builds: Arc<RwLock<HashMap<String, RosterBuild>>>,
    configs: Arc<ConfigStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "org_roster=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_dir = std::env::var("ROSTER_CONFIG_DIR").unwrap_or_else(|_| "configs".to_string());
    let configs = ConfigStore::load_or_default(std::path::Path::new(&config_dir))?;
    info!("Loaded {} configs: {:?} (default: {})", configs.list().len(), configs.list(), configs.default_name());

    let state = AppState {
        builds: Arc::new(RwLock::new(HashMap::new())),
        configs: Arc::new(configs),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/configs", get(list_configs))
        .route("/configs/:name", get(get_config))
        .route("/rosters", post(upload_roster))
        .route("/rosters/:id", get(get_roster))
        .route("/rosters/:id/people", get(get_people))
        .route("/rosters/:id/export.csv", get(export_csv))
        .route("/rosters/:id/tree", get(get_tree))
        .route("/rosters/:id/subtree/:person_id", get(get_subtree))
        .route("/rosters/:id/search", get(search_people))
        .route("/rosters/:id/departments", get(get_departments))
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024)) // 50MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = std::env::var("ROSTER_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

async fn list_configs(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.configs.list())
}

async fn get_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RosterConfig>, StatusCode> {
    state
        .configs
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(serde::Deserialize)]
struct UploadQuery {
    config: Option<String>,
    sheet: Option<String>,
}

/// Upload a roster export and build its hierarchy.
async fn upload_roster(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<RosterSummary>, ApiError> {
    let config = state
        .configs
        .resolve(query.config.as_deref())
        .cloned()
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("Unknown config: {:?}. Available: {:?}", query.config, state.configs.list()),
            )
        })?;

    let mut filename = String::new();
    let mut file_data = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("roster.csv").to_string();
            file_data = field.bytes().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?.to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }

    let sheet = query.sheet.clone();
    let build = tokio::task::spawn_blocking(move || {
        pipeline::build_from_file(&filename, &file_data, sheet.as_deref(), &config)
    })
    .await
    .map_err(|e| {
        error!("Build task failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Build task failed: {}", e))
    })?
    .map_err(|e| {
        let status = if e.downcast_ref::<ValidationError>().is_some() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::BAD_REQUEST
        };
        warn!("Roster build rejected: {:#}", e);
        (status, format!("{:#}", e))
    })?;

    let summary = build.summary();
    info!(
        "Roster build complete: {} ({} people, {} roots)",
        summary.id, summary.stats.people, summary.stats.roots
    );

    state
        .builds
        .write()
        .map_err(|_| lock_poisoned())?
        .insert(build.id.clone(), build);

    Ok(Json(summary))
}

async fn get_roster(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RosterSummary>, ApiError> {
    with_build(&state, &id, |build| build.summary()).map(Json)
}

async fn get_people(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CanonicalPerson>>, ApiError> {
    with_build(&state, &id, |build| build.people.clone()).map(Json)
}

/// Canonical tabular export as CSV.
async fn export_csv(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = with_build(&state, &id, |build| export::canonical_csv(&build.schema, &build.people))?
        .map_err(|e| {
            error!("Export failed for {}: {:#}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Export failed: {:#}", e))
        })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}_canonical.csv\"", id),
            ),
        ],
        bytes,
    ))
}

#[derive(serde::Deserialize)]
struct TreeQuery {
    #[serde(default)]
    chart: bool,
}

/// Nested forest. With `chart=true`, a single annotated chart root instead.
async fn get_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TreeQuery>,
) -> Result<Json<Vec<TreeNode>>, ApiError> {
    let configs = state.configs.clone();
    with_build(&state, &id, |build| {
        if !query.chart {
            return build.forest.trees();
        }
        let chart_config = configs
            .get(&build.config_name)
            .map(|c| c.chart.clone())
            .unwrap_or_default();
        chart::build_chart(&build.forest, &chart_config)
            .into_iter()
            .collect()
    })
    .map(Json)
}

#[derive(serde::Serialize)]
struct SubtreeResponse {
    members: Vec<String>,
    tree: TreeNode,
}

async fn get_subtree(
    State(state): State<AppState>,
    Path((id, person_id)): Path<(String, String)>,
) -> Result<Json<SubtreeResponse>, ApiError> {
    with_build(&state, &id, |build| {
        let tree = build.forest.tree(&person_id)?;
        let mut members: Vec<String> = build.forest.subtree_of(&person_id).into_iter().collect();
        members.sort();
        Some(SubtreeResponse { members, tree })
    })?
    .map(Json)
    .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Person not found: {}", person_id)))
}

#[derive(serde::Deserialize)]
struct SearchQuery {
    name: String,
}

async fn search_people(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<forest::ForestNode>>, ApiError> {
    with_build(&state, &id, |build| {
        build
            .forest
            .find_by_name(&query.name)
            .into_iter()
            .cloned()
            .collect()
    })
    .map(Json)
}

async fn get_departments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DepartmentGroup>>, ApiError> {
    with_build(&state, &id, |build| build.forest.departments()).map(Json)
}

// ============================================================================
// Helper functions
// ============================================================================

/// Run `f` against a stored build under the read lock.
fn with_build<T>(
    state: &AppState,
    id: &str,
    f: impl FnOnce(&RosterBuild) -> T,
) -> Result<T, ApiError> {
    let builds = state.builds.read().map_err(|_| lock_poisoned())?;
    builds
        .get(id)
        .map(f)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Roster not found: {}", id)))
}

fn lock_poisoned() -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, "Roster store lock poisoned".to_string())
}
