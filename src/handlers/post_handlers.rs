//! Post, comment, and like handlers under `/api/posts`.
//!
//! Writes aimed at a missing post are silent no-ops: a like answers
//! `204 No Content` and a comment echoes the post id.

use crate::{
    errors::AppError,
    models::{
        comment::{Comment, NewComment},
        like::{Like, LikeStatus, Liker},
        post::{NewPost, Post, PostDetail, PostEdit},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeStatusResponse {
    pub post_id: String,
    pub user_id: String,
    pub status: LikeStatus,
    pub liked: bool,
}

/// `POST /api/posts`
pub async fn create_post(
    State(state): State<AppState>,
    Json(new_post): Json<NewPost>,
) -> Result<impl IntoResponse, AppError> {
    let post = state.posts.create_post(new_post).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// `GET /api/posts/{post_id}?userId=`
pub async fn get_post_detail(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Json<PostDetail>, AppError> {
    let detail = state
        .posts
        .post_detail(&post_id, viewer.user_id.as_deref())
        .await?;
    Ok(Json(detail))
}

/// `PUT /api/posts/{post_id}`
pub async fn edit_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(edit): Json<PostEdit>,
) -> Result<Json<Post>, AppError> {
    Ok(Json(state.posts.edit_post(&post_id, edit).await?))
}

/// `GET /api/posts/{post_id}/comments`
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<Vec<Comment>>, AppError> {
    Ok(Json(state.posts.list_comments(&post_id).await?))
}

/// `POST /api/posts/{post_id}/comments`
pub async fn add_comment(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(comment): Json<NewComment>,
) -> Result<Response, AppError> {
    let response = match state.posts.add_comment(&post_id, comment).await? {
        Some(comment) => (StatusCode::CREATED, Json(comment)).into_response(),
        None => Json(json!({ "postId": post_id })).into_response(),
    };
    Ok(response)
}

/// `GET /api/posts/{post_id}/likes`
pub async fn list_likes(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<Vec<Like>>, AppError> {
    Ok(Json(state.posts.list_likes(&post_id).await?))
}

/// `POST /api/posts/{post_id}/likes` toggles the caller's like.
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(liker): Json<Liker>,
) -> Result<Response, AppError> {
    let response = match state.posts.toggle_like(&post_id, &liker).await? {
        Some(outcome) => Json(outcome).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };
    Ok(response)
}

/// `GET /api/posts/{post_id}/likes/{user_id}`
pub async fn like_status(
    State(state): State<AppState>,
    Path((post_id, user_id)): Path<(String, String)>,
) -> Result<Json<LikeStatusResponse>, AppError> {
    let status = state.posts.like_status(&post_id, &user_id).await?;
    Ok(Json(LikeStatusResponse {
        post_id,
        user_id,
        status,
        liked: status.is_liked(),
    }))
}

/// `DELETE /api/posts/{post_id}/likes/{user_id}`
pub async fn remove_like(
    State(state): State<AppState>,
    Path((post_id, user_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let response = match state.posts.remove_like(&post_id, &user_id).await? {
        Some(outcome) => Json(outcome).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };
    Ok(response)
}
