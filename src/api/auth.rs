//! Authentication collaborator
//!
//! Contract with the rest of the system: given an opaque bearer token,
//! produce `{user_id, role}` or a typed authentication error. Token
//! issuance lives with the external identity service; the issuing helper
//! here exists for tests and local runs.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::state::AppState;
use super::types::ApiError;
use crate::models::UserRole;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: String,
    exp: i64,
    iat: i64,
}

/// Authenticated caller identity, injected as a request extension.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: UserRole,
}

/// HS256 key pair derived from the configured secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for `user_id` valid for `ttl_hours`.
    pub fn issue(&self, user_id: Uuid, role: UserRole, ttl_hours: i64) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(ttl_hours)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| ApiError::internal(format!("token issuance failed: {err}")))
    }

    pub fn verify(&self, token: &str) -> Result<AuthContext, ApiError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| ApiError::unauthorized("invalid or expired token"))?;

        let user_id = data
            .claims
            .sub
            .parse::<Uuid>()
            .map_err(|_| ApiError::unauthorized("invalid token subject"))?;
        let role = UserRole::parse(&data.claims.role)
            .ok_or_else(|| ApiError::unauthorized("invalid token role"))?;

        Ok(AuthContext { user_id, role })
    }
}

/// Middleware: validate the `Authorization: Bearer` header and inject
/// [`AuthContext`]. Requests without a valid token never reach the core.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

    let context = state.jwt.verify(token)?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify_round_trip() {
        let keys = JwtKeys::from_secret("test-secret-at-least-32-characters!!");
        let user = Uuid::new_v4();

        let token = keys.issue(user, UserRole::Customer, 1).unwrap();
        let context = keys.verify(&token).unwrap();

        assert_eq!(context.user_id, user);
        assert_eq!(context.role, UserRole::Customer);
    }

    #[test]
    fn wrong_secret_rejected() {
        let keys = JwtKeys::from_secret("test-secret-at-least-32-characters!!");
        let other = JwtKeys::from_secret("another-secret-entirely-here!!!!!!!!");

        let token = keys.issue(Uuid::new_v4(), UserRole::Admin, 1).unwrap();
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let keys = JwtKeys::from_secret("test-secret-at-least-32-characters!!");
        let token = keys.issue(Uuid::new_v4(), UserRole::Customer, -1).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn garbage_token_rejected() {
        let keys = JwtKeys::from_secret("test-secret-at-least-32-characters!!");
        assert!(keys.verify("not-a-jwt").is_err());
    }
}
