/// Authentication extractors and utilities
///
/// Session tokens come from the external identity provider as HS256 JWTs;
/// the `sub` claim is the account id used everywhere else.
use crate::{config::AuthConfig, context::AppContext, error::MeterError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::{Deserialize, Serialize};

/// Claims read from identity-provider tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// `admin` marks an admin-only token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Authenticated context - extracts and validates the caller's token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: String,
    pub email: Option<String>,
    pub is_admin: bool,
}

impl AuthContext {
    /// Callers may act on their own account; admins on any
    pub fn require_owner_or_admin(&self, account_id: &str) -> Result<(), MeterError> {
        if self.account_id == account_id || self.is_admin {
            Ok(())
        } else {
            Err(MeterError::Authorization(
                "Cannot access another account".to_string(),
            ))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = MeterError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    MeterError::Authentication("Missing authorization header".to_string())
                })?;

        let claims = verify_jwt_token(bearer.token(), &state.config.authentication)?;
        let is_admin = state.config.is_admin(&claims.sub) || claims.scope.as_deref() == Some("admin");

        Ok(AuthContext {
            account_id: claims.sub,
            email: claims.email,
            is_admin,
        })
    }
}

/// Admin authentication context - requires admin rights
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub admin_id: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = MeterError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;

        if !auth.is_admin {
            tracing::warn!(account_id = %auth.account_id, "non-admin called an admin endpoint");
            return Err(MeterError::Authorization("Admin role required".to_string()));
        }

        Ok(AdminAuthContext {
            admin_id: auth.account_id,
        })
    }
}

/// Verify a JWT token with full validation
///
/// Checks the signature, expiry (with 5 minutes of clock skew) and, when
/// configured, the audience.
pub fn verify_jwt_token(token: &str, config: &AuthConfig) -> Result<Claims, MeterError> {
    use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 300;
    match &config.jwt_audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("JWT verification failed: {}", e);
            match e.kind() {
                ErrorKind::ExpiredSignature => {
                    MeterError::Authentication("Token has expired".to_string())
                }
                ErrorKind::InvalidSignature => {
                    MeterError::Authentication("Invalid token signature".to_string())
                }
                ErrorKind::InvalidAudience => {
                    MeterError::Authentication("Token audience mismatch".to_string())
                }
                _ => MeterError::Authentication(format!("Invalid token: {}", e)),
            }
        })
}
