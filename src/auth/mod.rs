//! Bearer-token validation. Authentication itself (login, refresh, session
//! management) is an external collaborator; this module only resolves the
//! caller's identity and permissions from a signed token.

use crate::{errors::ServiceError, AppState};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Permission strings used by the handlers.
pub mod consts {
    pub const ORDERS_READ: &str = "orders:read";
    pub const ORDERS_CREATE: &str = "orders:create";
    pub const PAYMENTS_VERIFY: &str = "payments:verify";
}

/// JWT claims issued by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// The authenticated caller, extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub permissions: Vec<String>,
}

impl AuthenticatedUser {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission || p == "*")
    }
}

fn validate_bearer(token: &str, state: &AppState) -> Result<AuthenticatedUser, ServiceError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[state.config.auth_issuer.as_str()]);
    validation.set_audience(&[state.config.auth_audience.as_str()]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))?;

    let user_id = Uuid::parse_str(&data.claims.sub)
        .map_err(|_| ServiceError::Unauthorized("token subject is not a user id".to_string()))?;

    Ok(AuthenticatedUser {
        user_id,
        email: data.claims.email,
        permissions: data.claims.permissions,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing authorization header".to_string()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ServiceError::Unauthorized("authorization header is not a bearer token".to_string())
            })?;

        validate_bearer(token, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_check_supports_wildcard() {
        let user = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: None,
            permissions: vec!["*".to_string()],
        };
        assert!(user.has_permission(consts::ORDERS_CREATE));
        assert!(user.has_permission(consts::PAYMENTS_VERIFY));
    }

    #[test]
    fn permission_check_is_exact_otherwise() {
        let user = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: None,
            permissions: vec![consts::ORDERS_READ.to_string()],
        };
        assert!(user.has_permission(consts::ORDERS_READ));
        assert!(!user.has_permission(consts::ORDERS_CREATE));
    }
}
