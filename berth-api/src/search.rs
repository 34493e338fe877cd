use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use berth_core::search::{SearchQuery, TrainOption};
use berth_core::CoreError;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/trains/search", get(search_trains))
}

async fn search_trains(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<TrainOption>>, AppError> {
    let Query(query) = query.map_err(|e| CoreError::ValidationError(e.body_text()))?;
    let options = state.service.search(&query).await?;
    info!("Search {} -> {} on {}: {} trains", query.source, query.destination, query.date, options.len());
    Ok(Json(options))
}
