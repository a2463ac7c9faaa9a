//! Shared handler state. Services are built once and shared by `Arc`.

use crate::{
    config::AppConfig,
    services::{
        checksum_relay::ChecksumRelay, document_store::DocumentStore,
        feed_assembler::FeedAssembler, identity_registry::IdentityRegistry,
        media_service::MediaService, object_store::ObjectStore, post_aggregate::PostAggregate,
    },
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub identities: Arc<IdentityRegistry>,
    pub posts: Arc<PostAggregate>,
    pub feed: Arc<FeedAssembler>,
    pub media: Arc<MediaService>,
    pub documents: Arc<dyn DocumentStore>,
    pub objects: Arc<dyn ObjectStore>,
    /// Cancelled on shutdown; uploads observe child tokens.
    pub shutdown: CancellationToken,
    pub default_page_size: u64,
}

impl AppState {
    pub fn new(cfg: &AppConfig, documents: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStore>) -> Self {
        let posts = Arc::new(PostAggregate::new(documents.clone()));
        let feed = FeedAssembler::new(documents.clone(), posts.clone(), cfg.max_page_size);
        let media = MediaService::new(
            objects.clone(),
            posts.clone(),
            ChecksumRelay::new(cfg.relay_buffer_bytes),
        );

        Self {
            identities: Arc::new(IdentityRegistry::new(documents.clone())),
            posts,
            feed: Arc::new(feed),
            media: Arc::new(media),
            documents,
            objects,
            shutdown: CancellationToken::new(),
            default_page_size: cfg.default_page_size,
        }
    }
}
