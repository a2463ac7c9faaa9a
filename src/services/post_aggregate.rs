//! src/services/post_aggregate.rs
//!
//! Posts with their comments and likes. A post, its comments, and its likes
//! share the post id as partition key, so every "child document + parent
//! counter" change is one [`PartitionBatch`] and commits atomically.
//!
//! Likes are keyed `like_{userId}` inside the post partition. The toggle
//! decides its direction from a point read, then submits a conditional
//! batch; a concurrent toggle that got there first makes the batch fail
//! (`Conflict` on create, `NotFound` on delete) and the toggle re-reads.
//! `likeCount` therefore always matches the like documents present.

use crate::{
    errors::{FeedError, FeedResult},
    models::{
        Document, DocumentKind,
        comment::{Comment, NewComment},
        like::{Like, LikeOutcome, LikeStatus, Liker},
        post::{NewPost, Post, PostDetail, PostEdit},
    },
    services::document_store::{
        DocumentQuery, DocumentStore, DocumentStoreError, PartitionBatch,
    },
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const LIKE_COUNT: &str = "likeCount";
const COMMENT_COUNT: &str = "commentCount";
const DATE_CREATED: &str = "dateCreated";
const TITLE: &str = "title";
const CONTENT: &str = "content";

/// Rounds a toggle may lose to concurrent toggles before giving up.
const LIKE_TOGGLE_ATTEMPTS: usize = 3;

pub struct PostAggregate {
    docs: Arc<dyn DocumentStore>,
}

impl PostAggregate {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    async fn find_post(&self, post_id: &str) -> FeedResult<Option<Post>> {
        Ok(self.docs.read_doc::<Post>(post_id, post_id).await?)
    }

    /// Write a new post with zero counters under a fresh id. Retrying
    /// creates another post.
    pub async fn create_post(&self, new_post: NewPost) -> FeedResult<Post> {
        if new_post.author_id.trim().is_empty() {
            return Err(FeedError::ValidationFailed("authorId is required".into()));
        }

        let post_id = Uuid::new_v4().to_string();
        let post = Post {
            id: post_id.clone(),
            post_id,
            title: new_post.title,
            content: new_post.content,
            caption: new_post.caption,
            author_id: new_post.author_id,
            author_username: new_post.author_username,
            date_created: Utc::now(),
            like_count: 0,
            comment_count: 0,
            checksum: new_post.checksum,
        };
        self.docs.create_doc(&post).await?;

        info!(post_id = %post.post_id, author_id = %post.author_id, "created post");
        Ok(post)
    }

    pub async fn get_post(&self, post_id: &str) -> FeedResult<Post> {
        self.find_post(post_id)
            .await?
            .ok_or_else(|| FeedError::NotFound(format!("post `{post_id}`")))
    }

    /// Overwrite title and content in place. Concurrent edits are last
    /// writer wins; counters are never rewritten from a stale read.
    pub async fn edit_post(&self, post_id: &str, edit: PostEdit) -> FeedResult<Post> {
        let batch = PartitionBatch::new(post_id)
            .set(post_id, TITLE, edit.title)
            .set(post_id, CONTENT, edit.content);
        match self.docs.execute_batch(&batch).await {
            Ok(()) => {}
            Err(DocumentStoreError::NotFound { .. }) => {
                return Err(FeedError::NotFound(format!("post `{post_id}`")));
            }
            Err(err) => return Err(err.into()),
        }
        debug!(%post_id, "edited post");
        self.get_post(post_id).await
    }

    /// Insert the comment and bump `commentCount` in one partition batch.
    ///
    /// Returns `Ok(None)` without writing anything when the post is absent.
    pub async fn add_comment(&self, post_id: &str, new_comment: NewComment) -> FeedResult<Option<Comment>> {
        if new_comment.content.trim().is_empty() {
            return Err(FeedError::ValidationFailed("comment content is required".into()));
        }
        if self.find_post(post_id).await?.is_none() {
            debug!(%post_id, "dropping comment for missing post");
            return Ok(None);
        }

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            content: new_comment.content,
            author_id: new_comment.author_id,
            author_username: new_comment.author_username,
            author_profile_url: new_comment.author_profile_url,
            date_created: Utc::now(),
        };
        let batch = PartitionBatch::new(post_id)
            .create(comment.to_body()?)
            .increment(post_id, COMMENT_COUNT, 1);

        match self.docs.execute_batch(&batch).await {
            Ok(()) => {
                debug!(%post_id, comment_id = %comment.id, "appended comment");
                Ok(Some(comment))
            }
            // Post deleted between the read and the batch.
            Err(DocumentStoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Flip the user's like on a post.
    ///
    /// `NotLiked -> Liked` inserts the like and increments `likeCount`;
    /// `Liked -> NotLiked` deletes it and decrements (never below zero).
    /// Returns `Ok(None)` when the post does not exist.
    pub async fn toggle_like(&self, post_id: &str, liker: &Liker) -> FeedResult<Option<LikeOutcome>> {
        require_user_id(&liker.user_id)?;
        if self.find_post(post_id).await?.is_none() {
            debug!(%post_id, "ignoring like for missing post");
            return Ok(None);
        }
        let like_id = Like::id_for(&liker.user_id);

        for attempt in 1..=LIKE_TOGGLE_ATTEMPTS {
            let existing = self.docs.point_read(&like_id, post_id).await?;
            let (batch, status) = match existing {
                Some(_) => (
                    PartitionBatch::new(post_id)
                        .delete(&like_id)
                        .increment(post_id, LIKE_COUNT, -1),
                    LikeStatus::NotLiked,
                ),
                None => {
                    let like = Like {
                        id: like_id.clone(),
                        post_id: post_id.to_string(),
                        user_id: liker.user_id.clone(),
                        username: liker.username.clone(),
                        user_profile_url: liker.user_profile_url.clone(),
                        date_created: Utc::now(),
                    };
                    (
                        PartitionBatch::new(post_id)
                            .create(like.to_body()?)
                            .increment(post_id, LIKE_COUNT, 1),
                        LikeStatus::Liked,
                    )
                }
            };

            match self.docs.execute_batch(&batch).await {
                Ok(()) => return self.like_outcome(post_id, status).await,
                Err(DocumentStoreError::Conflict { .. }) => {
                    warn!(%post_id, user_id = %liker.user_id, attempt, "like created concurrently, re-reading");
                }
                Err(DocumentStoreError::NotFound { ref id, .. }) if *id == like_id => {
                    warn!(%post_id, user_id = %liker.user_id, attempt, "like removed concurrently, re-reading");
                }
                Err(DocumentStoreError::NotFound { .. }) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }

        Err(FeedError::Internal(format!(
            "like toggle on post `{post_id}` did not settle after {LIKE_TOGGLE_ATTEMPTS} attempts"
        )))
    }

    /// Remove the user's like if present. Unliking an unliked post leaves
    /// `likeCount` untouched. Returns `Ok(None)` when the post is absent.
    pub async fn remove_like(&self, post_id: &str, user_id: &str) -> FeedResult<Option<LikeOutcome>> {
        require_user_id(user_id)?;
        if self.find_post(post_id).await?.is_none() {
            return Ok(None);
        }
        let like_id = Like::id_for(user_id);
        let batch = PartitionBatch::new(post_id)
            .delete(&like_id)
            .increment(post_id, LIKE_COUNT, -1);

        match self.docs.execute_batch(&batch).await {
            Ok(()) => {}
            Err(DocumentStoreError::NotFound { ref id, .. }) if *id == like_id => {
                debug!(%post_id, %user_id, "nothing to unlike");
            }
            Err(DocumentStoreError::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err.into()),
        }
        self.like_outcome(post_id, LikeStatus::NotLiked).await
    }

    async fn like_outcome(&self, post_id: &str, status: LikeStatus) -> FeedResult<Option<LikeOutcome>> {
        Ok(self.find_post(post_id).await?.map(|post| LikeOutcome {
            post_id: post.post_id,
            status,
            like_count: post.like_count,
        }))
    }

    /// Whether `user_id` has a like in the post's partition.
    pub async fn like_status(&self, post_id: &str, user_id: &str) -> FeedResult<LikeStatus> {
        let query = DocumentQuery::new(DocumentKind::Like)
            .in_partition(post_id)
            .filter("userId", user_id)
            .limit(1);
        let likes = self.docs.query(&query).await?;
        Ok(if likes.is_empty() {
            LikeStatus::NotLiked
        } else {
            LikeStatus::Liked
        })
    }

    /// Likes on a post, newest first.
    pub async fn list_likes(&self, post_id: &str) -> FeedResult<Vec<Like>> {
        self.get_post(post_id).await?;
        self.children::<Like>(post_id).await
    }

    /// Comments on a post, newest first.
    pub async fn list_comments(&self, post_id: &str) -> FeedResult<Vec<Comment>> {
        self.get_post(post_id).await?;
        self.children::<Comment>(post_id).await
    }

    /// Post, its comments, and whether `viewer_id` liked it.
    pub async fn post_detail(&self, post_id: &str, viewer_id: Option<&str>) -> FeedResult<PostDetail> {
        let post = self.get_post(post_id).await?;
        let comments = self.children::<Comment>(post_id).await?;
        let liked_by_viewer = match viewer_id {
            Some(viewer_id) => self.like_status(post_id, viewer_id).await?.is_liked(),
            None => false,
        };
        Ok(PostDetail {
            post,
            comments,
            liked_by_viewer,
        })
    }

    async fn children<T: Document>(&self, post_id: &str) -> FeedResult<Vec<T>> {
        let query = DocumentQuery::new(T::KIND)
            .in_partition(post_id)
            .newest_first(DATE_CREATED);
        Ok(self.docs.query_docs::<T>(&query).await?)
    }
}

fn require_user_id(user_id: &str) -> FeedResult<()> {
    if user_id.trim().is_empty() {
        return Err(FeedError::ValidationFailed("userId is required".into()));
    }
    Ok(())
}
