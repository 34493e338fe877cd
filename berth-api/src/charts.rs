use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use berth_core::CoreError;
use berth_order::ChartReport;
use chrono::NaiveDate;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/charts/{train}/{date}", post(prepare_chart))
}

/// Manual trigger; the worker charts runs on its own as their window opens.
async fn prepare_chart(
    State(state): State<AppState>,
    Path((train, date)): Path<(String, String)>,
) -> Result<Json<Vec<ChartReport>>, AppError> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| CoreError::ValidationError(format!("'{}' is not a YYYY-MM-DD date", date)))?;
    Ok(Json(state.service.prepare_chart(&train, date).await?))
}
