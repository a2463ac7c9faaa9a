use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Document, DocumentKind};

/// A comment, co-located with its post.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub content: String,
    pub author_id: String,
    pub author_username: String,
    #[serde(default)]
    pub author_profile_url: Option<String>,
    #[serde(with = "super::timestamp")]
    pub date_created: DateTime<Utc>,
}

impl Document for Comment {
    const KIND: DocumentKind = DocumentKind::Comment;

    fn id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> &str {
        &self.post_id
    }
}

/// Request to append a comment to a post.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub content: String,
    pub author_id: String,
    pub author_username: String,
    #[serde(default)]
    pub author_profile_url: Option<String>,
}
