//! Registration, login, and profile handlers under `/api/account`.

use crate::{errors::AppError, models::user::User, state::AppState};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default)]
    pub profile_pic_url: Option<String>,
}

/// `POST /api/account/register`
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .identities
        .register(&req.username, req.profile_pic_url)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /api/account/login`
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.identities.login(&req.username).await?))
}

/// `GET /api/account/users/{user_id}`
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.identities.get_user(&user_id).await?))
}

/// `PUT /api/account/users/{user_id}/profile`
pub async fn update_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    let user = state
        .identities
        .update_profile(&user_id, update.profile_pic_url)
        .await?;
    Ok(Json(user))
}
