//! src/services/feed_assembler.rs
//!
//! Paginated post retrieval, per-viewer like enrichment, and engagement
//! ranking. Ranking is applied to the page the store returned, so order
//! is local to a page window rather than a global top-k.

use crate::{
    errors::{FeedError, FeedResult},
    models::{
        DocumentKind,
        post::{Post, PostView},
    },
    services::{
        document_store::{DocumentQuery, DocumentStore},
        post_aggregate::PostAggregate,
    },
};
use std::{cmp::Ordering, sync::Arc};
use tracing::debug;

pub struct FeedAssembler {
    docs: Arc<dyn DocumentStore>,
    posts: Arc<PostAggregate>,
    max_page_size: u64,
}

impl FeedAssembler {
    pub fn new(docs: Arc<dyn DocumentStore>, posts: Arc<PostAggregate>, max_page_size: u64) -> Self {
        Self {
            docs,
            posts,
            max_page_size: max_page_size.max(1),
        }
    }

    /// One page of the feed, newest posts first at the store, then ranked.
    ///
    /// A page beyond the data is an empty vector. Sizes above the configured
    /// maximum are clamped.
    pub async fn get_feed(
        &self,
        viewer_id: Option<&str>,
        page_number: u64,
        page_size: u64,
    ) -> FeedResult<Vec<PostView>> {
        if page_number == 0 || page_size == 0 {
            return Err(FeedError::ValidationFailed(
                "pageNumber and pageSize must be at least 1".into(),
            ));
        }
        let page_size = page_size.min(self.max_page_size);
        let offset = (page_number - 1).saturating_mul(page_size);

        let query = DocumentQuery::new(DocumentKind::Post)
            .newest_first("dateCreated")
            .offset(offset)
            .limit(page_size);
        let posts = self.docs.query_docs::<Post>(&query).await?;

        let mut page = Vec::with_capacity(posts.len());
        for post in posts {
            // One scoped lookup per post; pages are small.
            let liked_by_viewer = match viewer_id {
                Some(viewer_id) => self.posts.like_status(&post.post_id, viewer_id).await?.is_liked(),
                None => false,
            };
            page.push(PostView {
                post,
                liked_by_viewer,
            });
        }

        rank(&mut page);
        debug!(page_number, page_size, returned = page.len(), "assembled feed page");
        Ok(page)
    }
}

/// Sort by like count, then comment count, then creation time, all
/// descending.
pub fn rank(page: &mut [PostView]) {
    page.sort_by(|a, b| compare_engagement(&a.post, &b.post));
}

fn compare_engagement(a: &Post, b: &Post) -> Ordering {
    b.like_count
        .cmp(&a.like_count)
        .then_with(|| b.comment_count.cmp(&a.comment_count))
        .then_with(|| b.date_created.cmp(&a.date_created))
}
