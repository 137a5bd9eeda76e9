use super::AppState;
use crate::{
    error::PayError,
    models::{ApiResponse, Pubkey, Signature, VerifiedTransfer, VerifyRequest},
    services::{validate_transfer, TransferCriteria},
};
use axum::{extract::State, Json};

/// One-shot check that `signature` pays the configured recipient.
pub async fn verify_transfer(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<ApiResponse<VerifiedTransfer>>, PayError> {
    let signature: Signature = request
        .signature
        .parse()
        .map_err(|e| PayError::InvalidRequest(format!("Invalid signature: {}", e)))?;
    if request.amount.is_sign_negative() {
        return Err(PayError::InvalidRequest("Amount must not be negative".to_string()));
    }
    let references = request
        .reference
        .iter()
        .map(|r| r.parse::<Pubkey>())
        .collect::<Result<Vec<_>, _>>()?;

    let config = state.sessions.config();
    let criteria = TransferCriteria::new(config.recipient, request.amount)
        .with_spl_token(config.spl_token)
        .with_references(references)
        .with_finality(request.finality.unwrap_or(config.finality));

    let result = validate_transfer(state.rpc.as_ref(), &signature, &criteria).await;
    state.analytics.record_verification(result.is_ok());
    let record = result?;

    tracing::info!(
        signature = %signature,
        amount = %request.amount,
        slot = record.slot,
        "Payment verified"
    );

    Ok(Json(ApiResponse::ok(VerifiedTransfer::from_record(
        &record,
        signature,
        criteria.recipient,
        criteria.amount,
        criteria.spl_token,
    ))))
}
