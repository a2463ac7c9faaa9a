//! Defines routes for the feed backend.
//!
//! ## Structure
//! - **Account**
//!   - `POST /api/account/register`, `POST /api/account/login`
//!   - `GET  /api/account/users/{user_id}`, `PUT /api/account/users/{user_id}/profile`
//!
//! - **Feeds & media**
//!   - `POST /api/feeds/upload` (multipart, streamed)
//!   - `GET  /api/feeds?userId=&pageNumber=&pageSize=`
//!   - `GET  /api/feeds/download?fileName=`, `GET /media/{name}`
//!
//! - **Posts**
//!   - `POST /api/posts`, `GET|PUT /api/posts/{post_id}`
//!   - `GET|POST /api/posts/{post_id}/comments`
//!   - `GET|POST /api/posts/{post_id}/likes`
//!   - `GET|DELETE /api/posts/{post_id}/likes/{user_id}`

use crate::{
    handlers::{
        account_handlers::{get_user, login, register, update_profile},
        feed_handlers::{download, get_feed, serve_media, upload},
        health_handlers::{healthz, readyz},
        post_handlers::{
            add_comment, create_post, edit_post, get_post_detail, like_status, list_comments,
            list_likes, remove_like, toggle_like,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Build the router. `max_upload_bytes` caps the upload body only; other
/// routes keep axum's default limit.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Account
        .route("/api/account/register", post(register))
        .route("/api/account/login", post(login))
        .route("/api/account/users/{user_id}", get(get_user))
        .route("/api/account/users/{user_id}/profile", put(update_profile))
        // Feeds & media
        .route(
            "/api/feeds/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/feeds", get(get_feed))
        .route("/api/feeds/download", get(download))
        .route("/media/{name}", get(serve_media))
        // Posts
        .route("/api/posts", post(create_post))
        .route("/api/posts/{post_id}", get(get_post_detail).put(edit_post))
        .route(
            "/api/posts/{post_id}/comments",
            get(list_comments).post(add_comment),
        )
        .route(
            "/api/posts/{post_id}/likes",
            get(list_likes).post(toggle_like),
        )
        .route(
            "/api/posts/{post_id}/likes/{user_id}",
            get(like_status).delete(remove_like),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::test_state;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const BOUNDARY: &str = "feedtestboundary";

    async fn app() -> (Router, tempfile::TempDir) {
        let (state, dir) = test_state().await;
        (routes(1024 * 1024).with_state(state), dir)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn multipart_upload(fields: &[(&str, &str)], file: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"check.txt\"\r\nContent-Type: text/plain\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/feeds/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn duplicate_registration_is_conflict() {
        let (app, _dir) = app().await;

        let first = app
            .clone()
            .oneshot(json_request("POST", "/api/account/register", json!({"username": "alice"})))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .clone()
            .oneshot(json_request("POST", "/api/account/register", json!({"username": "ALICE "})))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(second).await["status"], 409);

        let login = app
            .oneshot(json_request("POST", "/api/account/login", json!({"username": "Alice"})))
            .await
            .unwrap();
        assert_eq!(login.status(), StatusCode::OK);
        assert_eq!(body_json(login).await["username"], "alice");
    }

    #[tokio::test]
    async fn upload_streams_checksum_then_serves_media() {
        let (app, _dir) = app().await;

        let response = app
            .clone()
            .oneshot(multipart_upload(
                &[
                    ("userId", "u1"),
                    ("userName", "carol"),
                    ("fileName", "check.txt"),
                    ("caption", "undefined"),
                ],
                b"123456789",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let receipt = body_json(response).await;
        assert_eq!(receipt["checksum"], "cbf43926");
        assert_eq!(receipt["bytes"], 9);

        let object_name = receipt["objectName"].as_str().unwrap().to_string();
        let media = app
            .clone()
            .oneshot(get_request(&format!("/media/{object_name}")))
            .await
            .unwrap();
        assert_eq!(media.status(), StatusCode::OK);
        assert_eq!(media.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(body_bytes(media).await, b"123456789");

        let download = app
            .clone()
            .oneshot(get_request(&format!("/api/feeds/download?fileName={object_name}")))
            .await
            .unwrap();
        assert!(
            download.headers()[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .starts_with("attachment")
        );

        let feed = app.oneshot(get_request("/api/feeds?userId=u1")).await.unwrap();
        let feed = body_json(feed).await;
        assert_eq!(feed[0]["postId"], receipt["postId"]);
        assert_eq!(feed[0]["caption"], "");
        assert_eq!(feed[0]["likedByViewer"], false);
    }

    #[tokio::test]
    async fn upload_without_owner_is_bad_request() {
        let (app, _dir) = app().await;
        let response = app
            .oneshot(multipart_upload(&[("fileName", "check.txt")], b"x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn like_flow_over_http() {
        let (app, _dir) = app().await;

        let created = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/posts",
                json!({"authorId": "c1", "authorUsername": "carol", "caption": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let post_id = body_json(created).await["postId"].as_str().unwrap().to_string();

        let liker = json!({"userId": "d1", "username": "dave"});
        let liked = app
            .clone()
            .oneshot(json_request("POST", &format!("/api/posts/{post_id}/likes"), liker.clone()))
            .await
            .unwrap();
        let liked = body_json(liked).await;
        assert_eq!(liked["status"], "Liked");
        assert_eq!(liked["likeCount"], 1);

        let status = app
            .clone()
            .oneshot(get_request(&format!("/api/posts/{post_id}/likes/d1")))
            .await
            .unwrap();
        assert_eq!(body_json(status).await["liked"], true);

        let removed = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/posts/{post_id}/likes/d1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(removed).await["likeCount"], 0);

        let missing = app
            .oneshot(json_request("POST", "/api/posts/ghost/likes", liker))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn comment_on_missing_post_echoes_id() {
        let (app, _dir) = app().await;
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/posts/ghost/comments",
                json!({"content": "hi", "authorId": "d1", "authorUsername": "dave"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["postId"], "ghost");

        let listed = app.oneshot(get_request("/api/posts/ghost/comments")).await.unwrap();
        assert_eq!(listed.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_endpoints_report_ok() {
        let (app, _dir) = app().await;
        let live = app.clone().oneshot(get_request("/healthz")).await.unwrap();
        assert_eq!(live.status(), StatusCode::OK);

        let ready = app.oneshot(get_request("/readyz")).await.unwrap();
        assert_eq!(ready.status(), StatusCode::OK);
        assert_eq!(body_json(ready).await["checks"]["documents"]["ok"], true);
    }
}
