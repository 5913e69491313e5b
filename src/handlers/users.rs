use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use tracing::{info, instrument};

use super::util::{hash_password, user_id};
use crate::error::{AppError, AppResult};
use crate::models::{CreateUserRequest, NewUser, UpdateUserRequest, UserResponse};
use crate::state::AppState;
use crate::store::StoreError;
use crate::validation::{validate_email, validate_new_user, validate_password, validate_username};

/// Register a new account.
#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let Json(request) = payload?;
    validate_new_user(&request.username, &request.email, &request.password)?;

    let password_hash = hash_password(state.tokens.clone(), request.password).await?;
    let user = state
        .store
        .create(NewUser {
            username: request.username,
            email: request.email,
            password_hash,
        })
        .await?;

    info!(user_id = user.id, "User created");

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Get a user by id.
#[instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<UserResponse>> {
    let id = user_id(path)?;
    let user = state.store.get_by_id(id).await?;
    Ok(Json(user.into()))
}

/// Update a user. Fields that are absent or empty are left unchanged.
#[instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> AppResult<Json<UserResponse>> {
    let id = user_id(path)?;
    let Json(request) = payload?;

    let mut user = state.store.get_by_id(id).await?;

    if let Some(username) = request.username.filter(|u| !u.is_empty()) {
        validate_username(&username)?;
        user.username = username;
    }

    if let Some(email) = request.email.filter(|e| !e.is_empty()) {
        validate_email(&email)?;
        if email != user.email {
            match state.store.get_by_email(&email).await {
                Ok(other) if other.id != id => {
                    return Err(AppError::Conflict(
                        "User with this email already exists".to_string(),
                    ));
                }
                Ok(_) | Err(StoreError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }
        user.email = email;
    }

    if let Some(password) = request.password.filter(|p| !p.is_empty()) {
        validate_password(&password)?;
        user.password_hash = hash_password(state.tokens.clone(), password).await?;
    }

    user.updated_at = Utc::now();
    let user = state.store.update(user).await?;

    info!(user_id = id, "User updated");

    Ok(Json(user.into()))
}

/// Delete a user.
#[instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<StatusCode> {
    let id = user_id(path)?;
    state.store.delete(id).await?;

    info!(user_id = id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}
