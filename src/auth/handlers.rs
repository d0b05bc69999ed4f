use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AccessTokenResponse, LoginRequest, LoginResponse, MessageResponse, RefreshRequest,
            RegisterRequest,
        },
        jwt::{TokenError, TokenKind},
        password::{hash_password, verify_password},
        repo_types::NewUser,
    },
    error::ApiError,
    state::AppState,
    storage::StoreError,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh))
}

fn invalid_body(rejection: JsonRejection) -> ApiError {
    debug!(error = %rejection.body_text(), "rejected request body");
    ApiError::bad_request("invalid body request")
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(mut payload) = payload.map_err(invalid_body)?;
    payload.email = payload.email.trim().to_lowercase();

    if payload.name.trim().is_empty() || payload.password.is_empty() {
        warn!("register with empty name or password");
        return Err(ApiError::bad_request("invalid body request"));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::bad_request("invalid body request"));
    }

    let password_hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        ApiError::internal("failed hash password")
    })?;

    let user = state
        .store
        .create_user(NewUser {
            name: payload.name.trim().to_string(),
            email: payload.email,
            password_hash,
        })
        .await
        .map_err(|e| {
            error!(error = %e, "create user failed");
            ApiError::internal("failed register user")
        })?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "register success".into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(mut payload) = payload.map_err(invalid_body)?;
    payload.email = payload.email.trim().to_lowercase();

    let user = match state.store.get_user(&payload.email).await {
        Ok(u) => u,
        Err(StoreError::NotFound) => {
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::unauthorized("invalid email or password"));
        }
        Err(e) => {
            error!(error = %e, "get_user failed");
            return Err(ApiError::internal("server error"));
        }
    };

    if !verify_password(&user.password_hash, &payload.password) {
        warn!(user_id = user.id, "login invalid password");
        return Err(ApiError::unauthorized("invalid email or password"));
    }

    let token_failed = |e: TokenError| {
        error!(error = %e, "jwt sign failed");
        ApiError::internal("failed to generate token")
    };
    let access_token = state.keys.sign_access(user.id).map_err(token_failed)?;
    let refresh_token = state.keys.sign_refresh(user.id).map_err(token_failed)?;

    info!(user_id = user.id, "user logged in");
    Ok(Json(LoginResponse {
        access_token,
        refresh_token,
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let Json(payload) = payload.map_err(invalid_body)?;

    let claims = state
        .keys
        .verify(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| {
            warn!(error = %e, "refresh token rejected");
            ApiError::unauthorized("unauthorized")
        })?;

    let access_token = state.keys.sign_access(claims.user_id).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        ApiError::internal("failed to generate token")
    })?;

    info!(user_id = claims.user_id, "access token refreshed");
    Ok(Json(AccessTokenResponse { access_token }))
}
