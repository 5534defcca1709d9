/// Credit endpoints used by clients and the usage-metering call site
use crate::{
    account::AccountStatus,
    api::extract::JsonBody,
    auth::AuthContext,
    context::AppContext,
    error::{MeterError, MeterResult},
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/credits/:id", get(get_credits))
        .route("/tick", post(tick))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreditsResponse {
    pub remaining: i64,
}

/// Remaining units for an account
async fn get_credits(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(account_id): Path<String>,
) -> MeterResult<Json<CreditsResponse>> {
    auth.require_owner_or_admin(&account_id)?;

    let remaining = ctx.ledger.get_balance(&account_id).await?;
    Ok(Json(CreditsResponse { remaining }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TickResponse {
    pub exhausted: bool,
    pub remaining: i64,
}

/// Consume one billing unit. The caller stops metering once `exhausted`.
async fn tick(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    JsonBody(req): JsonBody<TickRequest>,
) -> MeterResult<Json<TickResponse>> {
    auth.require_owner_or_admin(&req.user_id)?;

    let account = ctx.account_manager.get(&req.user_id).await?;
    if account.status != AccountStatus::Active {
        return Err(MeterError::Authorization(format!(
            "Account is {}, usage is not allowed",
            account.status.as_str()
        )));
    }

    // Checked again inside the decrement, so a block landing in between still wins
    let outcome = ctx.ledger.tick_active(&req.user_id).await?;
    Ok(Json(TickResponse {
        exhausted: outcome.exhausted,
        remaining: outcome.remaining,
    }))
}
