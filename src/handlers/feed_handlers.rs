//! Upload, feed, and media handlers. Upload and download bodies are
//! streamed; neither side buffers a whole file.

use crate::{
    errors::AppError,
    models::post::PostView,
    services::{media_service::UploadRequest, object_store::StoredObject},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    pub user_id: Option<String>,
    pub page_number: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadQuery {
    pub file_name: String,
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

/// `POST /api/feeds/upload`
///
/// Text parts (`userId`, `userName`, `fileName`, `title`, `caption`) must
/// precede the `file` part, whose bytes are relayed as they arrive.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name != "file" {
            let value = field.text().await.map_err(multipart_error)?;
            match name.as_str() {
                "userId" => request.owner_user_id = value,
                "userName" => request.owner_username = value,
                "fileName" => request.file_name = value,
                "title" => request.title = Some(value),
                "caption" => request.caption = Some(value),
                other => debug!(field = other, "ignoring unknown upload field"),
            }
            continue;
        }

        if request.file_name.is_empty() {
            request.file_name = field.file_name().unwrap_or_default().to_string();
        }
        let stream = field.map(|chunk| chunk.map_err(io::Error::other));
        let cancel = state.shutdown.child_token();
        let receipt = state.media.upload(request, stream, &cancel).await?;
        return Ok((StatusCode::CREATED, Json(receipt)));
    }

    Err(AppError::bad_request("multipart body has no `file` part"))
}

/// `GET /api/feeds?userId=&pageNumber=&pageSize=`
pub async fn get_feed(
    State(state): State<AppState>,
    Query(q): Query<FeedQuery>,
) -> Result<Json<Vec<PostView>>, AppError> {
    let page = state
        .feed
        .get_feed(
            q.user_id.as_deref().filter(|id| !id.is_empty()),
            q.page_number.unwrap_or(1),
            q.page_size.unwrap_or(state.default_page_size),
        )
        .await?;
    Ok(Json(page))
}

/// `GET /api/feeds/download?fileName=` streams the object as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Query(q): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let object = state.media.download(&q.file_name).await?;
    Ok(object_response(object, true))
}

/// `GET /media/{name}` serves the object inline at its public URL.
pub async fn serve_media(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let object = state.media.download(&name).await?;
    Ok(object_response(object, false))
}

fn object_response(object: StoredObject, attachment: bool) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&object.content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.size_bytes));
    if attachment {
        let disposition = format!("attachment; filename=\"{}\"", object.name.replace('"', ""));
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }

    let body = Body::from_stream(ReaderStream::new(object.reader));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    *response.headers_mut() = headers;
    response
}
