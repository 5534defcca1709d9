/// Admin API Endpoints
/// Credit grants, account approval and blocking, audit log
use crate::{
    account::{Account, AccountStatus},
    admin::{AdminAction, AuditLogEntry},
    api::extract::JsonBody,
    auth::AdminAuthContext,
    context::AppContext,
    error::MeterResult,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Build admin API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/add-credits", post(add_credits))
        .route("/admin/accounts", get(list_accounts))
        .route("/admin/accounts/:id/approve", post(approve_account))
        .route("/admin/accounts/:id/block", post(block_account))
        .route("/admin/audit-log", get(get_audit_log))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCreditsRequest {
    pub user_id: String,
    pub seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddCreditsResponse {
    pub message: String,
    pub remaining: i64,
}

/// Grant usage seconds to an account
async fn add_credits(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    JsonBody(req): JsonBody<AddCreditsRequest>,
) -> MeterResult<Json<AddCreditsResponse>> {
    let remaining = ctx.ledger.grant(&req.user_id, req.seconds).await?;

    info!(admin_id = %auth.admin_id, account_id = %req.user_id, seconds = req.seconds, "credits granted");
    ctx.account_manager
        .log_action(
            &auth.admin_id,
            AdminAction::GrantCredits,
            Some(&req.user_id),
            Some(req.seconds.to_string()),
        )
        .await;

    Ok(Json(AddCreditsResponse {
        message: format!("Added {} seconds to {}", req.seconds, req.user_id),
        remaining,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListAccountsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListAccountsResponse {
    pub accounts: Vec<Account>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// List accounts, optionally by status (e.g. the pending approval queue)
async fn list_accounts(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<ListAccountsQuery>,
) -> MeterResult<Json<ListAccountsResponse>> {
    let status = query
        .status
        .as_deref()
        .map(AccountStatus::from_str)
        .transpose()?;

    let page = ctx
        .account_manager
        .list(status, query.limit, query.cursor.as_deref())
        .await?;

    Ok(Json(ListAccountsResponse {
        accounts: page.accounts,
        cursor: page.cursor,
    }))
}

async fn approve_account(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(account_id): Path<String>,
) -> MeterResult<Json<Account>> {
    change_status(&ctx, &auth, &account_id, AccountStatus::Active).await
}

async fn block_account(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(account_id): Path<String>,
) -> MeterResult<Json<Account>> {
    change_status(&ctx, &auth, &account_id, AccountStatus::Blocked).await
}

async fn change_status(
    ctx: &AppContext,
    auth: &AdminAuthContext,
    account_id: &str,
    status: AccountStatus,
) -> MeterResult<Json<Account>> {
    let account = ctx
        .account_manager
        .set_status(account_id, status, &auth.admin_id)
        .await?;

    let action = match status {
        AccountStatus::Blocked => AdminAction::BlockAccount,
        _ => AdminAction::ApproveAccount,
    };
    ctx.account_manager
        .log_action(&auth.admin_id, action, Some(account_id), None)
        .await;

    Ok(Json(account))
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AuditLogResponse {
    pub entries: Vec<AuditLogEntry>,
}

async fn get_audit_log(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<AuditLogQuery>,
) -> MeterResult<Json<AuditLogResponse>> {
    let entries = ctx.account_manager.audit_log(query.limit).await?;
    Ok(Json(AuditLogResponse { entries }))
}
