/// API routes and handlers
pub mod accounts;
pub mod admin;
pub mod credits;
pub mod extract;
pub mod health;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(credits::routes())
        .merge(accounts::routes())
        .merge(admin::routes())
}
