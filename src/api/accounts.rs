/// Self-service account endpoints
use crate::{
    account::Account,
    api::extract::OptionalJsonBody,
    auth::AuthContext,
    context::AppContext,
    error::MeterResult,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/accounts", post(register_account))
        .route("/accounts/me", get(get_own_account))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
}

/// Register the token holder's account. It starts `PENDING` until an
/// admin approves it.
async fn register_account(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    OptionalJsonBody(body): OptionalJsonBody<RegisterRequest>,
) -> MeterResult<(StatusCode, Json<Account>)> {
    let req = body.unwrap_or_default();
    let email = req.email.or(auth.email);

    let account = ctx.account_manager.register(&auth.account_id, email).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

#[derive(Debug, Serialize)]
pub struct AccountView {
    #[serde(flatten)]
    pub account: Account,
    pub remaining: i64,
}

/// The caller's account and remaining units
async fn get_own_account(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> MeterResult<Json<AccountView>> {
    let account = ctx.account_manager.get(&auth.account_id).await?;
    let remaining = ctx.ledger.get_balance(&auth.account_id).await?;

    Ok(Json(AccountView { account, remaining }))
}
