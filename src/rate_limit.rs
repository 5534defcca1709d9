/// Rate Limiting System
use crate::{
    config::RateLimitSettings,
    error::{MeterError, MeterResult},
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter manager
///
/// Requests carrying something shaped like a bearer JWT share the
/// configured quota; everything else gets a fifth of it. The token is not
/// verified here, a forged one is rejected later by the auth extractors.
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let rps = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(settings.burst_size).unwrap_or(rps);
        let anon_rps = NonZeroU32::new(settings.requests_per_second / 5).unwrap_or(NonZeroU32::MIN);
        let anon_burst = NonZeroU32::new(settings.burst_size / 5).unwrap_or(anon_rps);

        Self {
            enabled: settings.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(
                Quota::per_second(rps).allow_burst(burst),
            )),
            unauthenticated: Arc::new(GovernorLimiter::direct(
                Quota::per_second(anon_rps).allow_burst(anon_burst),
            )),
        }
    }

    /// Check rate limit for a request with credentials
    pub fn check_authenticated(&self) -> MeterResult<()> {
        Self::check(self.enabled, &self.authenticated)
    }

    /// Check rate limit for an anonymous request
    pub fn check_unauthenticated(&self) -> MeterResult<()> {
        Self::check(self.enabled, &self.unauthenticated)
    }

    fn check(enabled: bool, limiter: &DirectLimiter) -> MeterResult<()> {
        if !enabled {
            return Ok(());
        }

        limiter.check().map_err(|_| MeterError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        })
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, MeterError> {
    if presents_bearer_token(request.headers()) {
        limiter.check_authenticated()?;
    } else {
        limiter.check_unauthenticated()?;
    }

    Ok(next.run(request).await)
}

/// `Authorization: Bearer <header>.<claims>.<signature>` with base64url segments
fn presents_bearer_token(headers: &HeaderMap) -> bool {
    let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    else {
        return false;
    };

    let segments: Vec<&str> = token.trim().split('.').collect();
    segments.len() == 3
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}
