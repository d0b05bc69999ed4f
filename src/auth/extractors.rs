use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::jwt::{Claims, TokenKind};
use crate::{error::ApiError, state::AppState};

/// Validates `Authorization: Bearer <access token>` and stores the claims in
/// the request extensions.
/// Usage: `.route_layer(middleware::from_fn_with_state(state, require_access_token))`
pub async fn require_access_token(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            warn!("missing Authorization header");
            ApiError::unauthorized("missing authorization header")
        })?;

    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .ok_or_else(|| {
            warn!("invalid auth scheme");
            ApiError::unauthorized("invalid authorization header")
        })?;

    let claims = state.keys.verify(token, TokenKind::Access).map_err(|e| {
        warn!(error = %e, "access token rejected");
        ApiError::unauthorized("unauthorized")
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Claims of the authenticated caller, placed by [`require_access_token`].
pub struct AuthUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| ApiError::unauthorized("unauthorized"))
    }
}
