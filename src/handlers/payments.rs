use super::AppState;
use crate::{
    error::PayError,
    models::{ApiResponse, CreatePaymentRequest, PaymentSession},
};
use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<ApiResponse<PaymentSession>>, PayError> {
    let session = state
        .sessions
        .create(request.amount, request.message)
        .await?;
    Ok(Json(ApiResponse::ok(session)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentSession>>, PayError> {
    let machine = state.sessions.get(id).await?;
    Ok(Json(ApiResponse::ok(PaymentSession {
        id,
        snapshot: machine.snapshot(),
    })))
}

pub async fn reset_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentSession>>, PayError> {
    let session = state.sessions.reset(id).await?;
    Ok(Json(ApiResponse::ok(session)))
}

pub async fn generate_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<ApiResponse<PaymentSession>>, PayError> {
    let session = state
        .sessions
        .regenerate(id, request.amount, request.message)
        .await?;
    Ok(Json(ApiResponse::ok(session)))
}
