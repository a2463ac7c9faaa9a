//! Users and the username reservations that keep usernames unique.

use serde::{Deserialize, Serialize};

use super::{Document, DocumentKind, USERNAME_RESERVATION_PARTITION};

/// A registered account. Partitioned by its own id.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Primary id; always equal to `user_id`.
    pub id: String,

    pub user_id: String,

    /// Normalized (trimmed, lowercase) and immutable after registration.
    pub username: String,

    #[serde(default)]
    pub profile_pic_url: Option<String>,
}

impl User {
    pub fn new(user_id: String, username: String, profile_pic_url: Option<String>) -> Self {
        Self {
            id: user_id.clone(),
            user_id,
            username,
            profile_pic_url,
        }
    }
}

impl Document for User {
    const KIND: DocumentKind = DocumentKind::User;

    fn id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> &str {
        &self.user_id
    }
}

/// Claim on a username, stored in the shared reservation partition so the
/// partition's id uniqueness rejects a second claim.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsernameReservation {
    pub id: String,
    pub username: String,
}

impl UsernameReservation {
    pub fn new(username: &str) -> Self {
        Self {
            id: username.to_string(),
            username: username.to_string(),
        }
    }
}

impl Document for UsernameReservation {
    const KIND: DocumentKind = DocumentKind::UsernameReservation;

    fn id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> &str {
        USERNAME_RESERVATION_PARTITION
    }
}
