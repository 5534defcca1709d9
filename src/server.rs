/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{MeterError, MeterResult},
    rate_limit::rate_limit_middleware,
};
use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::Json,
    Router,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(crate::api::routes())
        .fallback(not_found)
        .with_state(ctx.clone())
        .layer(middleware::from_fn_with_state(
            ctx.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server, then release storage once in-flight requests finish
pub async fn serve(ctx: AppContext) -> MeterResult<()> {
    let addr = ctx.listen_addr();

    info!("Credit Meter listening on {}", addr);

    let app = build_router(ctx.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MeterError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| MeterError::Internal(format!("Server error: {}", e)));

    ctx.shutdown().await;
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sign_token, test_context, ADMIN_ID};
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_and_unknown_route() {
        let (_dir, ctx) = test_context().await;
        let app = build_router(ctx);

        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(&app, Method::GET, "/health/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["storage"], "sqlite");

        let (status, body) = send(&app, Method::GET, "/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_requests_without_token_are_rejected() {
        let (_dir, ctx) = test_context().await;
        let app = build_router(ctx);

        let (status, body) = send(&app, Method::GET, "/credits/user-1", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "AuthenticationRequired");

        let (status, _) = send(&app, Method::GET, "/credits/user-1", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_full_metering_flow() {
        let (_dir, ctx) = test_context().await;
        let app = build_router(ctx);
        let user = sign_token("user-1", None);
        let admin = sign_token(ADMIN_ID, None);

        // Register: pending, zero balance
        let (status, body) = send(
            &app,
            Method::POST,
            "/accounts",
            Some(&user),
            Some(json!({ "email": "user@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "PENDING");

        let (status, body) = send(&app, Method::GET, "/credits/user-1", Some(&user), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["remaining"], 0);

        // Pending accounts cannot meter usage
        let (status, _) = send(
            &app,
            Method::POST,
            "/tick",
            Some(&user),
            Some(json!({ "userId": "user-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Pending queue shows the account
        let (status, body) =
            send(&app, Method::GET, "/admin/accounts?status=pending", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accounts"][0]["id"], "user-1");

        let (status, body) =
            send(&app, Method::POST, "/admin/accounts/user-1/approve", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ACTIVE");

        let (status, body) = send(
            &app,
            Method::POST,
            "/admin/add-credits",
            Some(&admin),
            Some(json!({ "userId": "user-1", "seconds": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["remaining"], 2);
        assert!(body["message"].as_str().unwrap().contains("user-1"));

        for expected in [1, 0] {
            let (status, body) = send(
                &app,
                Method::POST,
                "/tick",
                Some(&user),
                Some(json!({ "userId": "user-1" })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["exhausted"], false);
            assert_eq!(body["remaining"], expected);
        }

        let (status, body) = send(
            &app,
            Method::POST,
            "/tick",
            Some(&user),
            Some(json!({ "userId": "user-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exhausted"], true);

        let (status, body) = send(&app, Method::GET, "/accounts/me", Some(&user), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "user@example.com");
        assert_eq!(body["remaining"], 0);

        let (status, body) = send(&app, Method::GET, "/admin/audit-log", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let actions: Vec<&str> = body["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["action"].as_str().unwrap())
            .collect();
        assert_eq!(actions, vec!["credits.grant", "account.approve"]);
    }

    #[tokio::test]
    async fn test_admin_endpoints_require_admin() {
        let (_dir, ctx) = test_context().await;
        let app = build_router(ctx);
        let user = sign_token("user-1", None);

        let (status, body) = send(
            &app,
            Method::POST,
            "/admin/add-credits",
            Some(&user),
            Some(json!({ "userId": "user-1", "seconds": 100 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden");

        // Admin-scoped tokens from the identity provider are accepted too
        let scoped = sign_token("ops-bot", Some("admin"));
        let (status, _) = send(
            &app,
            Method::POST,
            "/admin/add-credits",
            Some(&scoped),
            Some(json!({ "userId": "user-1", "seconds": 100 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_client_error_mapping() {
        let (_dir, ctx) = test_context().await;
        let app = build_router(ctx);
        let admin = sign_token(ADMIN_ID, None);
        let user = sign_token("user-1", None);

        // Negative grant
        let (status, body) = send(
            &app,
            Method::POST,
            "/admin/add-credits",
            Some(&admin),
            Some(json!({ "userId": "user-1", "seconds": -5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidArgument");

        // Unknown balance
        let (status, _) = send(&app, Method::GET, "/credits/user-1", Some(&user), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Someone else's balance
        let (status, _) = send(&app, Method::GET, "/credits/user-2", Some(&user), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Duplicate registration
        let (status, _) = send(&app, Method::POST, "/accounts", Some(&user), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(&app, Method::POST, "/accounts", Some(&user), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Conflict");

        // Bad status filter
        let (status, _) =
            send(&app, Method::GET, "/admin/accounts?status=gone", Some(&admin), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_invalid_argument() {
        let (_dir, ctx) = test_context().await;
        let app = build_router(ctx.clone());
        let admin = sign_token(ADMIN_ID, None);
        let user = sign_token("user-1", None);

        let (status, body) = send(
            &app,
            Method::POST,
            "/admin/add-credits",
            Some(&admin),
            Some(json!({ "userId": "user-1", "seconds": "ten" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidArgument");
        assert!(!body["message"].as_str().unwrap().contains("i64"));
        assert!(matches!(
            ctx.ledger.get_balance("user-1").await,
            Err(MeterError::NotFound(_))
        ));

        let (status, body) =
            send(&app, Method::POST, "/tick", Some(&user), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidArgument");

        // No body and no content type
        let (status, body) = send(&app, Method::POST, "/tick", Some(&user), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidArgument");
    }

    #[tokio::test]
    async fn test_register_rejects_malformed_body_but_allows_none() {
        let (_dir, ctx) = test_context().await;
        let app = build_router(ctx.clone());
        let user = sign_token("user-1", None);

        let (status, body) = send(
            &app,
            Method::POST,
            "/accounts",
            Some(&user),
            Some(json!({ "email": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidArgument");
        assert!(matches!(
            ctx.account_manager.get("user-1").await,
            Err(MeterError::NotFound(_))
        ));

        let (status, body) = send(&app, Method::POST, "/accounts", Some(&user), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], "user-1");
        assert_eq!(body["email"], Value::Null);
    }

    #[tokio::test]
    async fn test_blocked_account_cannot_tick() {
        let (_dir, ctx) = test_context().await;
        ctx.account_manager.register("user-1", None).await.unwrap();
        ctx.account_manager
            .set_status("user-1", crate::account::AccountStatus::Active, ADMIN_ID)
            .await
            .unwrap();
        ctx.ledger.grant("user-1", 10).await.unwrap();
        let app = build_router(ctx.clone());
        let admin = sign_token(ADMIN_ID, None);
        let user = sign_token("user-1", None);

        let (status, body) =
            send(&app, Method::POST, "/admin/accounts/user-1/block", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "BLOCKED");

        let (status, _) = send(
            &app,
            Method::POST,
            "/tick",
            Some(&user),
            Some(json!({ "userId": "user-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(ctx.ledger.get_balance("user-1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (_dir, ctx) = test_context().await;
        ctx.ledger.grant("user-1", 1).await.unwrap();
        let app = build_router(ctx);

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("ledger_operations_total"));
    }
}
