//! Fixtures shared by service and router tests.

use crate::{
    config::AppConfig,
    services::{
        document_store::{DocumentStore, SqliteDocumentStore, apply_schema},
        object_store::{LocalObjectStore, ObjectStore},
    },
    state::AppState,
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;

/// In-memory SQLite with the schema applied. One connection, since every
/// `sqlite::memory:` connection is its own database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    apply_schema(&pool).await.expect("apply schema");
    pool
}

pub async fn memory_document_store() -> Arc<dyn DocumentStore> {
    Arc::new(SqliteDocumentStore::new(Arc::new(memory_pool().await)))
}

/// File-backed SQLite in `dir` with several connections, so writers
/// really interleave.
pub async fn file_document_store(dir: &TempDir) -> Arc<dyn DocumentStore> {
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("feed.db"))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10));
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("open file-backed sqlite");
    apply_schema(&pool).await.expect("apply schema");
    Arc::new(SqliteDocumentStore::new(Arc::new(pool)))
}

pub fn temp_object_store() -> (Arc<dyn ObjectStore>, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = LocalObjectStore::new(dir.path(), "/media/");
    (Arc::new(store), dir)
}

/// Full application state over in-memory SQLite and a temp media directory.
pub async fn test_state() -> (AppState, TempDir) {
    let (objects, dir) = temp_object_store();
    let config = AppConfig {
        storage_dir: dir.path().display().to_string(),
        relay_buffer_bytes: 16,
        ..AppConfig::default()
    };
    let state = AppState::new(&config, memory_document_store().await, objects);
    (state, dir)
}
