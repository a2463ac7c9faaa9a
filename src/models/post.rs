//! Posts and the read models built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Document, DocumentKind, comment::Comment};

/// A post. Its id doubles as the partition key shared with its comments
/// and likes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub post_id: String,
    #[serde(default)]
    pub title: String,
    /// Public URL of the post's media, or free text for text-only posts.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub caption: String,
    pub author_id: String,
    pub author_username: String,
    #[serde(with = "super::timestamp")]
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub checksum: Option<String>,
}

impl Document for Post {
    const KIND: DocumentKind = DocumentKind::Post;

    fn id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> &str {
        &self.post_id
    }
}

/// Fields accepted when creating a post.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub author_id: String,
    pub author_username: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Editable post fields.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostEdit {
    pub title: String,
    pub content: String,
}

/// A feed entry: the post plus whether the viewer has liked it.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub liked_by_viewer: bool,
}

/// Everything the post page needs in one payload.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub comments: Vec<Comment>,
    pub liked_by_viewer: bool,
}
