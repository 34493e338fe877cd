use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use berth_core::{CoreError, Pnr};
use berth_order::{AllocationReceipt, AllocationRequest, CancellationReceipt, PnrStatusView};
use serde::{de::DeserializeOwned, Deserialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    /// Empty cancels every passenger still on the PNR.
    #[serde(default)]
    pub passenger_ids: Vec<u32>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{pnr}", get(get_booking))
        .route("/v1/bookings/{pnr}/cancel", post(cancel_booking))
}

/// Decode a JSON body, reporting malformed input as a validation error.
fn parse_body<T: DeserializeOwned>(body: &Bytes, what: &str) -> Result<T, CoreError> {
    serde_json::from_slice(body).map_err(|e| CoreError::ValidationError(format!("malformed {}: {}", what, e)))
}

async fn create_booking(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<AllocationReceipt>), AppError> {
    let req: AllocationRequest = parse_body(&body, "booking request")?;
    let receipt = state.service.allocate(req).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(pnr): Path<String>,
) -> Result<Json<PnrStatusView>, AppError> {
    let pnr = Pnr::parse(&pnr)?;
    Ok(Json(state.service.pnr_status(&pnr).await?))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(pnr): Path<String>,
    body: Bytes,
) -> Result<Json<CancellationReceipt>, AppError> {
    let pnr = Pnr::parse(&pnr)?;
    // A bare POST cancels the whole booking.
    let req: CancelRequest = if body.is_empty() {
        CancelRequest::default()
    } else {
        parse_body(&body, "cancel request")?
    };
    Ok(Json(state.service.cancel(&pnr, &req.passenger_ids).await?))
}
