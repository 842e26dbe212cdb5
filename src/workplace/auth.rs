//! Session tokens and caller identity.
//!
//! After the GitHub OAuth exchange the server issues an HS256 JWT. Handlers
//! take [`CurrentUser`] (identity required) or [`MaybeUser`] (identity
//! optional) to learn who is calling.

use anyhow::Result;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::api::{ApiError, SharedState};
use crate::errors::WorkplaceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// GitHub username.
    pub sub: String,
    pub id: i64,
    pub exp: usize,
    pub iat: usize,
}

pub fn generate(user_id: i64, username: &str, secret: &str, expiry_hours: u64) -> Result<String> {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: username.to_string(),
        id: user_id,
        exp: now + (expiry_hours as usize * 3600),
        iat: now,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

#[derive(Debug, Deserialize)]
struct UserIdQuery {
    user_id: Option<i64>,
}

/// Work out who is calling.
///
/// A bearer token wins and must be valid. Without one, the `user_id` query
/// parameter is accepted when `trust_query` is set.
pub fn resolve_identity(
    parts: &Parts,
    secret: &str,
    trust_query: bool,
) -> Result<Option<i64>, ApiError> {
    if let Some(header) = parts.headers.get("authorization") {
        let token = header
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Invalid authorization header".to_string()))?;
        let claims = verify(token.trim(), secret)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;
        return Ok(Some(claims.id));
    }

    if trust_query {
        let Query(query) = Query::<UserIdQuery>::try_from_uri(&parts.uri)
            .map_err(|_| ApiError::BadRequest("Invalid user_id".to_string()))?;
        return Ok(query.user_id);
    }

    Ok(None)
}

/// Extractor that requires a known caller.
pub struct CurrentUser(pub i64);

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let auth = &state.config.auth;
        resolve_identity(parts, &auth.jwt_secret, auth.trust_query_user_id)?
            .map(CurrentUser)
            .ok_or_else(|| WorkplaceError::Unauthenticated.into())
    }
}

/// Extractor for routes where anonymous callers are allowed.
pub struct MaybeUser(pub Option<i64>);

impl FromRequestParts<SharedState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let auth = &state.config.auth;
        resolve_identity(parts, &auth.jwt_secret, auth.trust_query_user_id).map(MaybeUser)
    }
}
