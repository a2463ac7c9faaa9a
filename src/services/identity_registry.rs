//! src/services/identity_registry.rs
//!
//! Registration and login. Global username uniqueness rests on a
//! reservation document created in one shared partition before the user
//! document; the partition's id uniqueness rejects a second claim.

use crate::{
    errors::{FeedError, FeedResult},
    models::{
        DocumentKind,
        user::{User, UsernameReservation},
    },
    services::document_store::{DocumentQuery, DocumentStore, DocumentStoreError},
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub struct IdentityRegistry {
    docs: Arc<dyn DocumentStore>,
}

/// Trim and lowercase a username.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl IdentityRegistry {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    /// Reserve the normalized username, then create the user.
    ///
    /// The two writes land in different partitions. If the second fails
    /// the reservation stays behind with no user; nothing rolls it back.
    pub async fn register(&self, username: &str, profile_pic_url: Option<String>) -> FeedResult<User> {
        let username = normalize_username(username);
        if username.is_empty() {
            return Err(FeedError::ValidationFailed("username is required".into()));
        }

        let reservation = UsernameReservation::new(&username);
        match self.docs.create_doc(&reservation).await {
            Ok(()) => {}
            Err(DocumentStoreError::Conflict { .. }) => {
                info!(%username, "username already taken");
                return Err(FeedError::Conflict(format!(
                    "username `{username}` is already taken"
                )));
            }
            Err(err) => return Err(err.into()),
        }

        let user = User::new(Uuid::new_v4().to_string(), username, profile_pic_url);
        if let Err(err) = self.docs.create_doc(&user).await {
            error!(
                username = %user.username,
                user_id = %user.user_id,
                error = %err,
                "username reserved but user creation failed; reservation orphaned"
            );
            return Err(err.into());
        }

        info!(username = %user.username, user_id = %user.user_id, "registered user");
        Ok(user)
    }

    /// Find the single user with this username.
    pub async fn login(&self, username: &str) -> FeedResult<User> {
        let username = normalize_username(username);
        let query = DocumentQuery::new(DocumentKind::User).filter("username", username.as_str());
        let mut users = self.docs.query_docs::<User>(&query).await?;

        if users.len() > 1 {
            let ids: Vec<&str> = users.iter().map(|u| u.user_id.as_str()).collect();
            error!(%username, user_ids = ?ids, "multiple users share one username");
            return Err(FeedError::DataIntegrityViolation(format!(
                "{} users found for username `{username}`",
                users.len()
            )));
        }

        users
            .pop()
            .ok_or_else(|| FeedError::NotFound(format!("user `{username}`")))
    }

    pub async fn get_user(&self, user_id: &str) -> FeedResult<User> {
        self.docs
            .read_doc::<User>(user_id, user_id)
            .await?
            .ok_or_else(|| FeedError::NotFound(format!("user `{user_id}`")))
    }

    /// Replace profile fields; the username never changes.
    pub async fn update_profile(&self, user_id: &str, profile_pic_url: Option<String>) -> FeedResult<User> {
        let mut user = self.get_user(user_id).await?;
        user.profile_pic_url = profile_pic_url;
        self.docs.upsert_doc(&user).await?;
        Ok(user)
    }
}
