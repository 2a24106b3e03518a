//! # API REST
//!
//! Development REST server for EPR episodes.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI documentation
//! - REST-specific concerns (JSON serialisation, CORS)
//!
//! Episodes and patients are served from an in-memory [`EpisodeStore`]. Episode updates are
//! checked against the stored consistency token and rejected with `409 Conflict` when stale.

#![warn(rust_2018_idioms)]

pub mod store;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use epr_core::constants::{EPISODE_API_PATH, PATIENT_SEARCH_PATH};
use epr_core::RawAttributes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

pub use store::{EpisodeStore, SeedData, StoreError};

/// Application state for the REST API server
///
/// Shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EpisodeStore>,
}

/// Health check response body.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Query string of the patient search endpoint.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    pub hospital_number: Option<String>,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, get_episode, put_episode, search_patients),
    components(schemas(HealthRes))
)]
pub struct ApiDoc;

/// Builds the REST router.
pub fn router(state: AppState) -> Router {
    let episode_route = format!("{EPISODE_API_PATH}/:id/");

    Router::new()
        .route("/health", get(health))
        .route(&episode_route, get(get_episode).put(put_episode))
        .route(PATIENT_SEARCH_PATH, get(search_patients))
        .route("/api-docs/openapi.json", get(openapi))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn store_error(episode_id: i64, err: StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "Episode not found"),
        StoreError::Conflict(_) => (StatusCode::CONFLICT, "Episode has been changed"),
        e => {
            tracing::error!("Episode {} store error: {:?}", episode_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and by clients waiting for the server to come up.
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "EPR REST API is alive".into(),
    })
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/api/v0.1/episode/{id}/",
    params(("id" = i64, Path, description = "Episode id")),
    responses(
        (status = 200, description = "Raw episode payload"),
        (status = 404, description = "Episode not found")
    )
)]
/// Fetch one episode
///
/// # Errors
/// Returns `404 Not Found` if no episode has the given id.
async fn get_episode(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<RawAttributes>, (StatusCode, &'static str)> {
    state
        .store
        .episode(id)
        .map(Json)
        .map_err(|e| store_error(id, e))
}

#[utoipa::path(
    put,
    path = "/api/v0.1/episode/{id}/",
    params(("id" = i64, Path, description = "Episode id")),
    responses(
        (status = 200, description = "Updated episode payload"),
        (status = 404, description = "Episode not found"),
        (status = 409, description = "Consistency token is stale")
    )
)]
/// Update one episode
///
/// The body must carry the episode's current `consistency_token`. On success the response is
/// the updated episode with a new token.
///
/// # Errors
/// Returns:
/// - `404 Not Found` if no episode has the given id,
/// - `409 Conflict` if the supplied token is not the stored one.
async fn put_episode(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
    Json(update): Json<RawAttributes>,
) -> Result<Json<RawAttributes>, (StatusCode, &'static str)> {
    state
        .store
        .update(id, &update)
        .map(Json)
        .map_err(|e| store_error(id, e))
}

#[utoipa::path(
    get,
    path = "/search/patient/",
    params(SearchParams),
    responses(
        (status = 200, description = "Raw records of matching patients"),
        (status = 500, description = "Internal server error")
    )
)]
/// Search patients by hospital number
///
/// A missing or blank hospital number matches nobody.
async fn search_patients(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Value>>, (StatusCode, &'static str)> {
    let Some(hospital_number) = params
        .hospital_number
        .filter(|n| !n.trim().is_empty())
    else {
        return Ok(Json(Vec::new()));
    };

    match state.store.search(&hospital_number) {
        Ok(patients) => Ok(Json(patients)),
        Err(e) => {
            tracing::error!("Patient search error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}
