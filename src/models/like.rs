use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Document, DocumentKind};

/// A like, co-located with its post. The id is derived from the liker so a
/// post partition holds at most one like per user.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub user_profile_url: Option<String>,
    #[serde(with = "super::timestamp")]
    pub date_created: DateTime<Utc>,
}

impl Like {
    /// Like id for `user_id` inside any post partition.
    pub fn id_for(user_id: &str) -> String {
        format!("like_{user_id}")
    }
}

impl Document for Like {
    const KIND: DocumentKind = DocumentKind::Like;

    fn id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> &str {
        &self.post_id
    }
}

/// Whether a user currently likes a post.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikeStatus {
    NotLiked,
    Liked,
}

impl LikeStatus {
    pub fn is_liked(self) -> bool {
        matches!(self, LikeStatus::Liked)
    }
}

/// Who is liking a post.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Liker {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub user_profile_url: Option<String>,
}

/// Result of a like toggle.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    pub post_id: String,
    pub status: LikeStatus,
    pub like_count: u64,
}
