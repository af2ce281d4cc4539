// HTTP API routes (heroes, monsters, knowledge filters, battle, vision).

use std::convert::Infallible;
use std::path::PathBuf;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Json, Path as UrlPath, Query, State,
    },
    http::header,
    middleware,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Router,
};
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;

use crate::battle::{self, Combatant};
use crate::config::AssetConfig;
use crate::db::{Character, CharacterKind, Persistence};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::monsters::{defaults, image_sync};
use crate::openrag::{DocumentSearch, FilterError, FilterService};
use crate::vision::VisionService;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertHeroRequest {
    pub hero: Option<Character>,
    pub search_context: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertHeroesRequest {
    pub heroes: Option<Vec<Character>>,
    pub search_context: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertMonsterRequest {
    pub monster: Option<Character>,
    pub search_context: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertMonstersRequest {
    pub monsters: Option<Vec<Character>>,
    pub search_context: Option<String>,
}

#[derive(Deserialize)]
pub struct FilterSearchParams {
    pub query: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSearchRequest {
    #[serde(default)]
    pub query: String,
    pub limit: Option<u32>,
    pub score_threshold: Option<f64>,
    pub filter_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleStatusRequest {
    #[serde(default)]
    pub defeated_player: Option<String>,
    #[serde(default)]
    pub players: Vec<Combatant>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeImageRequest {
    #[serde(default)]
    pub image_path: String,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub store: Persistence,
    pub assets: AssetConfig,
    pub vision: VisionService,
    pub filters: FilterService,
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Heroes
        .route(
            "/api/heroes",
            get(list_heroes).post(upsert_hero).put(upsert_heroes),
        )
        // Monsters
        .route(
            "/api/monsters",
            get(list_monsters).post(upsert_monster).put(upsert_monsters),
        )
        .route("/api/monsters/load-defaults", post(load_default_monsters))
        .route("/api/monsters/sync-images", post(sync_monster_images))
        // Knowledge filters
        .route("/api/openrag/filters", get(search_filters))
        .route("/api/openrag/filters/{id}", get(get_filter))
        .route("/api/openrag/search", post(search_documents))
        // Battle
        .route("/api/battle/status", post(battle_status))
        // Vision
        .route("/api/vision/describe", post(describe_image))
        .route("/api/vision/describe/stream", post(describe_image_stream))
        .layer(middleware::from_fn(metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health / metrics ──────────────────────────────────────────────────

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "arena-backend",
        "persistence": state.store.database().is_ok(),
        "vision": state.vision.is_available(),
    }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

// ── Character handlers ────────────────────────────────────────────────

fn validate_name(kind: CharacterKind, character: &Character) -> AppResult<()> {
    if character.name.trim().is_empty() {
        let label = match kind {
            CharacterKind::Hero => "Hero",
            CharacterKind::Monster => "Monster",
        };
        return Err(AppError::BadRequest(format!("{label} name is required")));
    }
    Ok(())
}

async fn list_heroes(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let heroes = state.store.database()?.get_all_heroes().await?;
    Ok(Json(json!({ "success": true, "heroes": heroes })))
}

async fn list_monsters(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let monsters = state.store.database()?.get_all_monsters().await?;
    Ok(Json(json!({ "success": true, "monsters": monsters })))
}

async fn upsert_hero(
    State(state): State<AppState>,
    payload: Result<Json<UpsertHeroRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(req) = payload?;
    let hero = req
        .hero
        .ok_or_else(|| AppError::BadRequest("hero is required".to_string()))?;
    validate_name(CharacterKind::Hero, &hero)?;

    state
        .store
        .database()?
        .upsert_hero(&hero, req.search_context.as_deref())
        .await?;
    tracing::info!(name = %hero.name, "Hero saved");
    Ok(Json(json!({ "success": true, "message": format!("Hero {} saved", hero.name) })))
}

async fn upsert_heroes(
    State(state): State<AppState>,
    payload: Result<Json<UpsertHeroesRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(req) = payload?;
    let heroes = req
        .heroes
        .ok_or_else(|| AppError::BadRequest("heroes array is required".to_string()))?;
    if heroes.is_empty() {
        return Err(AppError::BadRequest("heroes array must not be empty".to_string()));
    }
    for hero in &heroes {
        validate_name(CharacterKind::Hero, hero)?;
    }

    state
        .store
        .database()?
        .upsert_heroes(&heroes, req.search_context.as_deref())
        .await?;
    tracing::info!(count = heroes.len(), "Heroes saved");
    Ok(Json(json!({ "success": true, "message": format!("Saved {} heroes", heroes.len()) })))
}

async fn upsert_monster(
    State(state): State<AppState>,
    payload: Result<Json<UpsertMonsterRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(req) = payload?;
    let monster = req
        .monster
        .ok_or_else(|| AppError::BadRequest("monster is required".to_string()))?;
    validate_name(CharacterKind::Monster, &monster)?;

    state
        .store
        .database()?
        .upsert_monster(&monster, req.search_context.as_deref())
        .await?;
    tracing::info!(name = %monster.name, "Monster saved");
    Ok(Json(json!({ "success": true, "message": format!("Monster {} saved", monster.name) })))
}

async fn upsert_monsters(
    State(state): State<AppState>,
    payload: Result<Json<UpsertMonstersRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(req) = payload?;
    let monsters = req
        .monsters
        .ok_or_else(|| AppError::BadRequest("monsters array is required".to_string()))?;
    if monsters.is_empty() {
        return Err(AppError::BadRequest("monsters array must not be empty".to_string()));
    }
    for monster in &monsters {
        validate_name(CharacterKind::Monster, monster)?;
    }

    state
        .store
        .database()?
        .upsert_monsters(&monsters, req.search_context.as_deref())
        .await?;
    tracing::info!(count = monsters.len(), "Monsters saved");
    Ok(Json(json!({ "success": true, "message": format!("Saved {} monsters", monsters.len()) })))
}

// ── Monster maintenance ───────────────────────────────────────────────

/// Always reports success once the fixture parses, whether or not the
/// store accepted the write.
async fn load_default_monsters(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let outcome = defaults::load_defaults(&state.store)
        .await
        .map_err(|e| AppError::Internal(format!("Default monster fixture is invalid: {e}")))?;

    Ok(Json(json!({
        "success": true,
        "count": outcome.monsters.len(),
        "monsters": outcome.monsters,
    })))
}

async fn sync_monster_images(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let db = state.store.database()?;
    let report = image_sync::sync_monster_images(db, &state.assets).await?;
    tracing::info!(
        updated = report.updated,
        skipped = report.skipped,
        not_found = report.not_found,
        failed = report.errors.len(),
        "Monster image sync finished"
    );

    Ok(Json(json!({
        "success": true,
        "updated": report.updated,
        "skipped": report.skipped,
        "notFound": report.not_found,
        "errors": report.errors,
    })))
}

// ── Knowledge filters ─────────────────────────────────────────────────

async fn search_filters(
    State(state): State<AppState>,
    params: Result<Query<FilterSearchParams>, QueryRejection>,
) -> AppResult<Json<Value>> {
    let Query(params) = params?;
    let query = params.query.as_deref().filter(|q| !q.trim().is_empty());

    match state.filters.search(query, params.limit).await {
        Ok(filters) => Ok(Json(json!({
            "success": true,
            "count": filters.len(),
            "filters": filters,
        }))),
        Err(FilterError::FeatureUnavailable) => {
            tracing::info!("Knowledge filters not available, returning none");
            Ok(Json(json!({ "success": true, "filters": [], "count": 0 })))
        }
        Err(e) => Err(e.into()),
    }
}

async fn get_filter(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> AppResult<Json<Value>> {
    match state.filters.get(&id).await? {
        Some(filter) => Ok(Json(json!({ "success": true, "filter": filter }))),
        None => Err(AppError::NotFound(format!("Filter {id} not found"))),
    }
}

async fn search_documents(
    State(state): State<AppState>,
    payload: Result<Json<DocumentSearchRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(req) = payload?;
    let query = req.query.trim();
    if query.is_empty() {
        return Err(AppError::BadRequest("query is required".to_string()));
    }
    if let Some(threshold) = req.score_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::BadRequest(
                "scoreThreshold must be between 0 and 1".to_string(),
            ));
        }
    }

    let search = DocumentSearch {
        query: query.to_string(),
        limit: req.limit,
        score_threshold: req.score_threshold,
        filter_id: req.filter_id.filter(|id| !id.trim().is_empty()),
    };
    match state.filters.search_documents(&search).await {
        Ok(results) => Ok(Json(json!({
            "success": true,
            "count": results.len(),
            "results": results,
        }))),
        Err(FilterError::FeatureUnavailable) => {
            tracing::info!("Document search not available, returning none");
            Ok(Json(json!({ "success": true, "results": [], "count": 0 })))
        }
        Err(e) => Err(e.into()),
    }
}

// ── Battle ────────────────────────────────────────────────────────────

async fn battle_status(
    payload: Result<Json<BattleStatusRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(req) = payload?;
    if req.players.is_empty() {
        return Err(AppError::BadRequest("players array is required".to_string()));
    }
    let players = battle::battle_status(req.defeated_player.as_deref(), &req.players);
    Ok(Json(json!({ "success": true, "players": players })))
}

// ── Vision ────────────────────────────────────────────────────────────

fn image_path(req: &DescribeImageRequest) -> AppResult<PathBuf> {
    let path = req.image_path.trim();
    if path.is_empty() {
        return Err(AppError::BadRequest("imagePath is required".to_string()));
    }
    Ok(PathBuf::from(path))
}

async fn describe_image(
    State(state): State<AppState>,
    payload: Result<Json<DescribeImageRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(req) = payload?;
    let path = image_path(&req)?;
    let description = state.vision.describe(&path).await;
    Ok(Json(json!({ "success": true, "description": description })))
}

/// Server-sent events: one `data` event per text chunk, then a `done`
/// event.
async fn describe_image_stream(
    State(state): State<AppState>,
    payload: Result<Json<DescribeImageRequest>, JsonRejection>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Json(req) = payload?;
    let path = image_path(&req)?;

    let chunks = ReceiverStream::new(state.vision.describe_stream(path))
        .map(|text| Ok(Event::default().data(text)));
    let done = stream::once(async { Ok(Event::default().event("done").data("")) });

    Ok(Sse::new(chunks.chain(done)).keep_alive(KeepAlive::default()))
}
