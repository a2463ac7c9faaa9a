//! Document models for the social-feed collection.
//!
//! Every entity lives in one logical collection and carries a `type`
//! discriminant. Posts, comments, and likes share the owning post's id as
//! their partition key; users are partitioned by their own id; username
//! reservations all live under [`USERNAME_RESERVATION_PARTITION`].

pub mod comment;
pub mod like;
pub mod post;
pub mod timestamp;
pub mod user;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Shared partition value for every username reservation.
pub const USERNAME_RESERVATION_PARTITION: &str = "unique_username";

/// The `type` discriminant stored on every document.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    User,
    UsernameReservation,
    Post,
    Comment,
    Like,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::User => "user",
            DocumentKind::UsernameReservation => "username-reservation",
            DocumentKind::Post => "post",
            DocumentKind::Comment => "comment",
            DocumentKind::Like => "like",
        }
    }
}

/// A typed entity that can be stored in the document collection.
pub trait Document: Serialize + DeserializeOwned {
    const KIND: DocumentKind;

    /// Primary id, unique within the document's partition.
    fn id(&self) -> &str;

    /// Partition key value the document is stored under.
    fn partition_key(&self) -> &str;

    /// Serialize into a JSON body with the `type` discriminant attached.
    fn to_body(&self) -> serde_json::Result<Value> {
        let mut body = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut body {
            map.insert("type".into(), Value::String(Self::KIND.as_str().into()));
        }
        Ok(body)
    }

    fn from_body(body: Value) -> serde_json::Result<Self> {
        serde_json::from_value(body)
    }
}
