//! HTTP read API.
//!
//! Endpoints:
//!   GET /api/donnees?periode=&type=&idImmeuble=&date=  -> bucketed series (JSON)
//!   GET /api/dernieres-donnees?idImmeuble=             -> latest snapshot (JSON)
//!
//! Invalid requests get a 400 with a plain-text reason, store failures a 500.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::binner::bin;
use crate::latest::fetch_latest;
use crate::logging::{self, Component};
use crate::model::{BucketedSeries, BuildingId, LatestSnapshot, RequestError, StoreError};
use crate::planner::plan_request;
use crate::store::ReadingStore;

#[derive(Clone)]
struct AppState {
    store: Arc<dyn ReadingStore>,
}

#[derive(Debug, Deserialize)]
struct SeriesParams {
    #[serde(alias = "period")]
    periode: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "idImmeuble")]
    building: i64,
    date: String,
}

#[derive(Debug, Deserialize)]
struct LatestParams {
    #[serde(rename = "idImmeuble")]
    building: i64,
}

enum ApiError {
    Request(RequestError),
    /// The failure itself is logged where it happens; clients only see a 500.
    Store,
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        ApiError::Request(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Request(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            ApiError::Store => {
                (StatusCode::INTERNAL_SERVER_ERROR, "data store unavailable").into_response()
            }
        }
    }
}

pub fn router(store: Arc<dyn ReadingStore>) -> Router {
    Router::new()
        .route("/api/donnees", get(series))
        .route("/api/dernieres-donnees", get(latest))
        .with_state(AppState { store })
}

pub async fn serve_http(listener: TcpListener, store: Arc<dyn ReadingStore>) -> std::io::Result<()> {
    logging::info(
        Component::Http,
        None,
        &format!("read API listening on {}", listener.local_addr()?),
    );
    axum::serve(listener, router(store)).await
}

async fn series(
    State(state): State<AppState>,
    Query(params): Query<SeriesParams>,
) -> Result<Json<BucketedSeries>, ApiError> {
    let building = building_id(params.building)?;
    let plan = plan_request(&params.periode, &params.kind, &params.date).map_err(|e| {
        logging::debug(Component::Planner, Some(&building.to_string()), &format!("rejected: {}", e));
        e
    })?;

    let store = state.store.clone();
    let result = tokio::task::spawn_blocking(move || bin(store.as_ref(), &plan, building))
        .await
        .map_err(StoreError::from)
        .and_then(|r| r);

    match result {
        Ok(series) => Ok(Json(series)),
        Err(e) => {
            logging::log_store_failure(Component::Http, Some(&building.to_string()), "bucketed series", &e);
            Err(ApiError::Store)
        }
    }
}

async fn latest(
    State(state): State<AppState>,
    Query(params): Query<LatestParams>,
) -> Result<Json<LatestSnapshot>, ApiError> {
    let building = building_id(params.building)?;

    let store = state.store.clone();
    let result = tokio::task::spawn_blocking(move || fetch_latest(store.as_ref(), building))
        .await
        .map_err(StoreError::from)
        .and_then(|r| r);

    match result {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => {
            logging::log_store_failure(Component::Http, Some(&building.to_string()), "latest reading", &e);
            Err(ApiError::Store)
        }
    }
}

fn building_id(raw: i64) -> Result<BuildingId, RequestError> {
    BuildingId::new(raw).ok_or_else(|| RequestError::InvalidBuilding(raw.to_string()))
}
