//! Login, token refresh and profile.
//!
//! Login answers an unknown email and a wrong password with the same 401
//! body, after the same amount of hashing work, so responses do not reveal
//! which accounts exist.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use tracing::{info, instrument, warn};

use super::util::verify_credentials;
use crate::error::{AppError, AppResult};
use crate::metrics::prometheus;
use crate::middleware::{AuthenticatedUser, ClientIdentity};
use crate::models::{LoginRequest, LoginResponse, UserResponse, UserSummary};
use crate::state::AppState;
use crate::store::StoreError;

/// Exchange email and password for a bearer token.
///
/// Each attempt, successful or not, counts against the caller's login
/// budget; an exhausted budget answers 429 before credentials are checked.
#[instrument(skip_all, fields(client_ip = %identity))]
pub async fn login(
    State(state): State<AppState>,
    identity: ClientIdentity,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    state.login_throttle.check(identity.as_str())?;

    let Json(request) = payload?;
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let user = match state.store.get_by_email(&request.email).await {
        Ok(user) => Some(user),
        Err(StoreError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };

    let verified = verify_credentials(
        state.tokens.clone(),
        user.as_ref().map(|u| u.password_hash.clone()),
        request.password,
    )
    .await?;

    let Some(user) = user.filter(|_| verified) else {
        warn!("Login failed");
        prometheus::record_login_failure();
        return Err(AppError::InvalidCredentials);
    };

    let (token, expires_at) = state
        .tokens
        .issue_token(user.id, &user.username, &user.email)?;

    info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        token,
        expires_at,
        user: UserSummary::from(&user),
    }))
}

/// Issue a fresh token for the authenticated caller.
///
/// The new token carries the identity from the presented one; the account
/// is not re-read from the store.
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<LoginResponse>> {
    let (token, expires_at) =
        state
            .tokens
            .issue_token(claims.user_id, &claims.username, &claims.email)?;

    info!(user_id = claims.user_id, "Token refreshed");

    Ok(Json(LoginResponse {
        token,
        expires_at,
        user: UserSummary {
            id: claims.user_id,
            username: claims.username,
            email: claims.email,
        },
    }))
}

/// Current account of the authenticated caller.
#[instrument(skip_all)]
pub async fn profile(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<UserResponse>> {
    let user = state.store.get_by_id(claims.user_id).await?;
    Ok(Json(user.into()))
}
