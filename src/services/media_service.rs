//! src/services/media_service.rs
//!
//! Upload intake and media retrieval. An upload relays the request body
//! into the object store through the checksum relay, then records a post
//! pointing at the stored object. Cancelled or failed relays leave any
//! partial object in place and write no post.

use crate::{
    errors::{FeedError, FeedResult},
    models::post::NewPost,
    services::{
        checksum_relay::ChecksumRelay,
        object_store::{ObjectStore, StoredObject},
        post_aggregate::PostAggregate,
    },
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::{io, sync::Arc};
use tokio_util::{io::StreamReader, sync::CancellationToken};
use tracing::{info, warn};
use uuid::Uuid;

/// Metadata that accompanies an upload body.
#[derive(Clone, Debug, Default)]
pub struct UploadRequest {
    pub owner_user_id: String,
    pub owner_username: String,
    pub file_name: String,
    pub title: Option<String>,
    pub caption: Option<String>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub post_id: String,
    pub checksum: String,
    pub bytes: u64,
    pub media_url: String,
    pub object_name: String,
}

pub struct MediaService {
    objects: Arc<dyn ObjectStore>,
    posts: Arc<PostAggregate>,
    relay: ChecksumRelay,
}

impl MediaService {
    pub fn new(objects: Arc<dyn ObjectStore>, posts: Arc<PostAggregate>, relay: ChecksumRelay) -> Self {
        Self {
            objects,
            posts,
            relay,
        }
    }

    /// Stream `body` into a freshly named object and create its post.
    pub async fn upload<S>(
        &self,
        request: UploadRequest,
        body: S,
        cancel: &CancellationToken,
    ) -> FeedResult<UploadReceipt>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        if request.owner_user_id.trim().is_empty() {
            return Err(FeedError::ValidationFailed("userId is required".into()));
        }
        let object_name = object_name_for(&request.file_name)?;
        if self.objects.exists(&object_name).await? {
            return Err(FeedError::Conflict(format!("object `{object_name}` already exists")));
        }

        let sink = self.objects.writer(&object_name).await?;
        let outcome = match self.relay.relay(StreamReader::new(body), sink, cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    object_name = %object_name,
                    user_id = %request.owner_user_id,
                    error = %err,
                    "upload aborted; partial object left in place"
                );
                return Err(err.into());
            }
        };

        let media_url = self.objects.url(&object_name);
        let post = self
            .posts
            .create_post(NewPost {
                author_id: request.owner_user_id,
                author_username: request.owner_username,
                title: request.title.unwrap_or_default(),
                content: media_url.clone(),
                caption: normalize_caption(request.caption.as_deref()),
                checksum: Some(outcome.checksum.clone()),
            })
            .await?;

        info!(
            post_id = %post.post_id,
            object_name = %object_name,
            bytes = outcome.bytes,
            checksum = %outcome.checksum,
            "upload complete"
        );
        Ok(UploadReceipt {
            post_id: post.post_id,
            checksum: outcome.checksum,
            bytes: outcome.bytes,
            media_url,
            object_name,
        })
    }

    pub async fn download(&self, name: &str) -> FeedResult<StoredObject> {
        Ok(self.objects.open(name).await?)
    }
}

/// `{token}_{basename}` with a 22-char URL-safe token from a random UUID.
pub fn object_name_for(file_name: &str) -> FeedResult<String> {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .unwrap_or_default();
    if base.is_empty() {
        return Err(FeedError::ValidationFailed("fileName is required".into()));
    }
    let token = general_purpose::URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes());
    Ok(format!("{token}_{base}"))
}

/// Browsers send the literal string "undefined" for an unset caption.
pub fn normalize_caption(caption: Option<&str>) -> String {
    match caption.map(str::trim) {
        None | Some("undefined") => String::new(),
        Some(caption) => caption.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{memory_document_store, temp_object_store};
    use futures::stream;
    use tokio::io::AsyncReadExt;

    async fn service() -> (MediaService, Arc<PostAggregate>, tempfile::TempDir) {
        let (objects, dir) = temp_object_store();
        let posts = Arc::new(PostAggregate::new(memory_document_store().await));
        (MediaService::new(objects, posts.clone(), ChecksumRelay::new(4)), posts, dir)
    }

    fn request(file_name: &str) -> UploadRequest {
        UploadRequest {
            owner_user_id: "u1".into(),
            owner_username: "carol".into(),
            file_name: file_name.into(),
            title: Some("sunset".into()),
            caption: Some("undefined".into()),
        }
    }

    fn body(parts: &[&'static [u8]]) -> impl Stream<Item = io::Result<Bytes>> + Send {
        let chunks = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(*p)))
            .collect::<Vec<io::Result<Bytes>>>();
        stream::iter(chunks)
    }

    #[test]
    fn object_names_keep_basename_behind_token() {
        let name = object_name_for("C:\\photos\\cat.png").unwrap();
        let (token, base) = name.split_once('_').unwrap();
        assert_eq!(token.len(), 22);
        assert_eq!(base, "cat.png");
        assert_ne!(name, object_name_for("cat.png").unwrap());
        assert!(object_name_for("dir/").is_err());
        assert!(object_name_for("my..photo.jpg").unwrap().ends_with("_my..photo.jpg"));
    }

    #[test]
    fn undefined_caption_is_blank() {
        assert_eq!(normalize_caption(Some("undefined")), "");
        assert_eq!(normalize_caption(None), "");
        assert_eq!(normalize_caption(Some(" hi ")), "hi");
    }

    #[tokio::test]
    async fn upload_records_checksum_and_serves_bytes() {
        let (media, posts, _dir) = service().await;
        let cancel = CancellationToken::new();

        let receipt = media
            .upload(request("check.txt"), body(&[b"1234", b"56789"]), &cancel)
            .await
            .unwrap();
        assert_eq!(receipt.checksum, "cbf43926");
        assert_eq!(receipt.bytes, 9);
        assert_eq!(receipt.media_url, format!("/media/{}", receipt.object_name));

        let post = posts.get_post(&receipt.post_id).await.unwrap();
        assert_eq!(post.checksum.as_deref(), Some("cbf43926"));
        assert_eq!(post.content, receipt.media_url);
        assert_eq!(post.caption, "");
        assert_eq!(post.title, "sunset");

        let mut stored = media.download(&receipt.object_name).await.unwrap();
        assert_eq!(stored.content_type, "text/plain");
        let mut bytes = Vec::new();
        stored.reader.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(bytes, b"123456789");
    }

    #[tokio::test]
    async fn client_abort_is_cancelled_without_post() {
        let (media, _posts, _dir) = service().await;
        let broken = stream::iter(vec![
            Ok(Bytes::from_static(b"abcd")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ]);

        let err = media
            .upload(request("a.bin"), broken, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_stops_upload() {
        let (media, _posts, _dir) = service().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = media
            .upload(request("a.bin"), body(&[b"abcd"]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Cancelled { bytes: 0 }));
    }

    #[tokio::test]
    async fn missing_owner_is_validation_failure() {
        let (media, _posts, _dir) = service().await;
        let mut req = request("a.bin");
        req.owner_user_id = " ".into();
        let err = media
            .upload(req, body(&[b"x"]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn download_of_unknown_object_is_not_found() {
        let (media, _posts, _dir) = service().await;
        assert!(matches!(
            media.download("nope.png").await,
            Err(FeedError::NotFound(_))
        ));
    }
}
