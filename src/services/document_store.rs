//! src/services/document_store.rs
//!
//! Partitioned document store gateway. Documents are JSON bodies addressed
//! by `(partition_key, id)`; the only multi-document atomicity offered is a
//! [`PartitionBatch`] scoped to a single partition key. The SQLite backend
//! keeps every document in one `documents` table.

use crate::models::{Document, DocumentKind};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

/// Schema applied by `--migrate` and by test pools.
pub const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("document `{id}` already exists in partition `{partition_key}`")]
    Conflict { id: String, partition_key: String },
    #[error("document `{id}` not found in partition `{partition_key}`")]
    NotFound { id: String, partition_key: String },
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("document store unavailable after {attempts} attempt(s): {source}")]
    Transient { attempts: u32, source: sqlx::Error },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type DocumentResult<T> = Result<T, DocumentStoreError>;

/// A kind-scoped query, optionally restricted to one partition.
///
/// Filters are equality matches on top-level body fields.
#[derive(Clone, Debug)]
pub struct DocumentQuery {
    pub kind: DocumentKind,
    pub partition_key: Option<String>,
    pub filters: Vec<(String, Value)>,
    /// Field to sort on, largest first.
    pub newest_first: Option<String>,
    pub offset: u64,
    pub limit: Option<u64>,
}

impl DocumentQuery {
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            kind,
            partition_key: None,
            filters: Vec::new(),
            newest_first: None,
            offset: 0,
            limit: None,
        }
    }

    pub fn in_partition(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn newest_first(mut self, field: impl Into<String>) -> Self {
        self.newest_first = Some(field.into());
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One mutation inside a partition batch.
#[derive(Clone, Debug)]
pub enum BatchOp {
    /// Insert; the whole batch fails with `Conflict` if the id exists.
    Create(Value),
    Upsert(Value),
    /// Remove; the whole batch fails with `NotFound` if the id is absent.
    Delete { id: String },
    /// Add `delta` to an integer field, flooring the result at zero.
    Increment {
        id: String,
        field: String,
        delta: i64,
    },
    /// Overwrite one top-level field, leaving the rest of the body as stored.
    Set {
        id: String,
        field: String,
        value: Value,
    },
}

/// Ordered mutations applied all-or-nothing within one partition.
#[derive(Clone, Debug)]
pub struct PartitionBatch {
    pub partition_key: String,
    pub ops: Vec<BatchOp>,
}

impl PartitionBatch {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            ops: Vec::new(),
        }
    }

    pub fn create(mut self, body: Value) -> Self {
        self.ops.push(BatchOp::Create(body));
        self
    }

    pub fn upsert(mut self, body: Value) -> Self {
        self.ops.push(BatchOp::Upsert(body));
        self
    }

    pub fn delete(mut self, id: impl Into<String>) -> Self {
        self.ops.push(BatchOp::Delete { id: id.into() });
        self
    }

    pub fn increment(mut self, id: impl Into<String>, field: impl Into<String>, delta: i64) -> Self {
        self.ops.push(BatchOp::Increment {
            id: id.into(),
            field: field.into(),
            delta,
        });
        self
    }

    pub fn set(mut self, id: impl Into<String>, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(BatchOp::Set {
            id: id.into(),
            field: field.into(),
            value: value.into(),
        });
        self
    }
}

/// Capability interface over the partitioned document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Direct lookup by primary id and partition key.
    async fn point_read(&self, id: &str, partition_key: &str) -> DocumentResult<Option<Value>>;

    /// Insert a new document, failing with `Conflict` if the id is taken
    /// within the partition.
    async fn create(&self, partition_key: &str, body: &Value) -> DocumentResult<()>;

    async fn upsert(&self, partition_key: &str, body: &Value) -> DocumentResult<()>;

    async fn delete(&self, id: &str, partition_key: &str) -> DocumentResult<()>;

    async fn query(&self, query: &DocumentQuery) -> DocumentResult<Vec<Value>>;

    /// Apply every op of `batch` atomically, or none of them.
    async fn execute_batch(&self, batch: &PartitionBatch) -> DocumentResult<()>;

    /// Cheap connectivity probe for readiness checks.
    async fn ping(&self) -> DocumentResult<()>;
}

impl dyn DocumentStore {
    pub async fn read_doc<T: Document>(
        &self,
        id: &str,
        partition_key: &str,
    ) -> DocumentResult<Option<T>> {
        match self.point_read(id, partition_key).await? {
            Some(body) => Ok(Some(T::from_body(body)?)),
            None => Ok(None),
        }
    }

    pub async fn create_doc<T: Document + Sync>(&self, doc: &T) -> DocumentResult<()> {
        let body = doc.to_body()?;
        debug!(kind = T::KIND.as_str(), id = doc.id(), partition_key = doc.partition_key(), "create document");
        self.create(doc.partition_key(), &body).await
    }

    pub async fn upsert_doc<T: Document + Sync>(&self, doc: &T) -> DocumentResult<()> {
        let body = doc.to_body()?;
        debug!(kind = T::KIND.as_str(), id = doc.id(), partition_key = doc.partition_key(), "upsert document");
        self.upsert(doc.partition_key(), &body).await
    }

    pub async fn query_docs<T: Document>(&self, query: &DocumentQuery) -> DocumentResult<Vec<T>> {
        self.query(query)
            .await?
            .into_iter()
            .map(|body| T::from_body(body).map_err(DocumentStoreError::from))
            .collect()
    }
}

/// SQLite-backed document store.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    db: Arc<SqlitePool>,
}

impl SqliteDocumentStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    async fn try_point_read(&self, id: &str, partition_key: &str) -> DocumentResult<Option<Value>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body FROM documents WHERE partition_key = ? AND id = ?")
                .bind(partition_key)
                .bind(id)
                .fetch_optional(&*self.db)
                .await?;
        match row {
            Some((body,)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn try_create(&self, partition_key: &str, body: &Value) -> DocumentResult<()> {
        let (id, kind) = record_key(body)?;
        match sqlx::query("INSERT INTO documents (partition_key, id, kind, body) VALUES (?, ?, ?, ?)")
            .bind(partition_key)
            .bind(&id)
            .bind(kind)
            .bind(body.to_string())
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(DocumentStoreError::Conflict {
                id,
                partition_key: partition_key.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn try_upsert(&self, partition_key: &str, body: &Value) -> DocumentResult<()> {
        let (id, kind) = record_key(body)?;
        sqlx::query(
            "INSERT INTO documents (partition_key, id, kind, body) VALUES (?, ?, ?, ?)
             ON CONFLICT(partition_key, id) DO UPDATE SET
                kind = excluded.kind,
                body = excluded.body",
        )
        .bind(partition_key)
        .bind(&id)
        .bind(kind)
        .bind(body.to_string())
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn try_delete(&self, id: &str, partition_key: &str) -> DocumentResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE partition_key = ? AND id = ?")
            .bind(partition_key)
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DocumentStoreError::NotFound {
                id: id.to_string(),
                partition_key: partition_key.to_string(),
            });
        }
        Ok(())
    }

    async fn try_query(&self, query: &DocumentQuery) -> DocumentResult<Vec<Value>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT body FROM documents WHERE kind = ");
        builder.push_bind(query.kind.as_str());

        if let Some(partition_key) = &query.partition_key {
            builder.push(" AND partition_key = ");
            builder.push_bind(partition_key.clone());
        }

        for (field, value) in &query.filters {
            builder.push(" AND json_extract(body, ");
            builder.push_bind(json_path(field));
            builder.push(")");
            match value {
                Value::Null => {
                    builder.push(" IS NULL");
                }
                Value::Bool(flag) => {
                    builder.push(" = ");
                    builder.push_bind(i64::from(*flag));
                }
                Value::Number(number) => {
                    builder.push(" = ");
                    match number.as_i64() {
                        Some(int) => builder.push_bind(int),
                        None => builder.push_bind(number.as_f64().unwrap_or_default()),
                    };
                }
                Value::String(text) => {
                    builder.push(" = ");
                    builder.push_bind(text.clone());
                }
                Value::Array(_) | Value::Object(_) => {
                    return Err(DocumentStoreError::Malformed(format!(
                        "filter on `{field}` must be a scalar"
                    )));
                }
            }
        }

        if let Some(field) = &query.newest_first {
            builder.push(" ORDER BY json_extract(body, ");
            builder.push_bind(json_path(field));
            builder.push(") DESC, id ASC");
        }

        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
        builder.push(" LIMIT ");
        builder.push_bind(query.limit.map_or(-1, clamp_i64));
        builder.push(" OFFSET ");
        builder.push_bind(clamp_i64(query.offset));

        let rows: Vec<(String,)> = builder.build_query_as().fetch_all(&*self.db).await?;
        debug!(kind = query.kind.as_str(), rows = rows.len(), "document query");

        rows.into_iter()
            .map(|(body,)| serde_json::from_str(&body).map_err(DocumentStoreError::from))
            .collect()
    }

    async fn try_execute_batch(&self, batch: &PartitionBatch) -> DocumentResult<()> {
        let partition_key = batch.partition_key.as_str();
        let mut tx = self.db.begin().await?;

        for op in &batch.ops {
            match op {
                BatchOp::Create(body) => {
                    let (id, kind) = record_key(body)?;
                    let inserted = sqlx::query(
                        "INSERT INTO documents (partition_key, id, kind, body) VALUES (?, ?, ?, ?)",
                    )
                    .bind(partition_key)
                    .bind(&id)
                    .bind(kind)
                    .bind(body.to_string())
                    .execute(&mut *tx)
                    .await;
                    match inserted {
                        Ok(_) => {}
                        Err(err) if is_unique_violation(&err) => {
                            return Err(DocumentStoreError::Conflict {
                                id,
                                partition_key: partition_key.to_string(),
                            });
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                BatchOp::Upsert(body) => {
                    let (id, kind) = record_key(body)?;
                    sqlx::query(
                        "INSERT INTO documents (partition_key, id, kind, body) VALUES (?, ?, ?, ?)
                         ON CONFLICT(partition_key, id) DO UPDATE SET
                            kind = excluded.kind,
                            body = excluded.body",
                    )
                    .bind(partition_key)
                    .bind(&id)
                    .bind(kind)
                    .bind(body.to_string())
                    .execute(&mut *tx)
                    .await?;
                }
                BatchOp::Delete { id } => {
                    let result =
                        sqlx::query("DELETE FROM documents WHERE partition_key = ? AND id = ?")
                            .bind(partition_key)
                            .bind(id)
                            .execute(&mut *tx)
                            .await?;
                    if result.rows_affected() == 0 {
                        return Err(DocumentStoreError::NotFound {
                            id: id.clone(),
                            partition_key: partition_key.to_string(),
                        });
                    }
                }
                BatchOp::Increment { id, field, delta } => {
                    let path = json_path(field);
                    let result = sqlx::query(
                        "UPDATE documents
                         SET body = json_set(body, ?, MAX(0, COALESCE(json_extract(body, ?), 0) + ?))
                         WHERE partition_key = ? AND id = ?",
                    )
                    .bind(&path)
                    .bind(&path)
                    .bind(*delta)
                    .bind(partition_key)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                    if result.rows_affected() == 0 {
                        return Err(DocumentStoreError::NotFound {
                            id: id.clone(),
                            partition_key: partition_key.to_string(),
                        });
                    }
                }
                BatchOp::Set { id, field, value } => {
                    let result = sqlx::query(
                        "UPDATE documents
                         SET body = json_set(body, ?, json(?))
                         WHERE partition_key = ? AND id = ?",
                    )
                    .bind(json_path(field))
                    .bind(value.to_string())
                    .bind(partition_key)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                    if result.rows_affected() == 0 {
                        return Err(DocumentStoreError::NotFound {
                            id: id.clone(),
                            partition_key: partition_key.to_string(),
                        });
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn point_read(&self, id: &str, partition_key: &str) -> DocumentResult<Option<Value>> {
        with_retry("point_read", move || self.try_point_read(id, partition_key)).await
    }

    async fn create(&self, partition_key: &str, body: &Value) -> DocumentResult<()> {
        with_retry("create", move || self.try_create(partition_key, body)).await
    }

    async fn upsert(&self, partition_key: &str, body: &Value) -> DocumentResult<()> {
        with_retry("upsert", move || self.try_upsert(partition_key, body)).await
    }

    async fn delete(&self, id: &str, partition_key: &str) -> DocumentResult<()> {
        with_retry("delete", move || self.try_delete(id, partition_key)).await
    }

    async fn query(&self, query: &DocumentQuery) -> DocumentResult<Vec<Value>> {
        with_retry("query", move || self.try_query(query)).await
    }

    async fn execute_batch(&self, batch: &PartitionBatch) -> DocumentResult<()> {
        with_retry("execute_batch", move || self.try_execute_batch(batch)).await
    }

    async fn ping(&self) -> DocumentResult<()> {
        let value: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&*self.db).await?;
        if value != 1 {
            return Err(DocumentStoreError::Malformed(format!(
                "unexpected ping result: {value}"
            )));
        }
        Ok(())
    }
}

/// Apply the embedded schema one statement at a time.
pub async fn apply_schema(db: &SqlitePool) -> anyhow::Result<()> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

/// Retry transient SQLite failures (busy/locked database, pool timeouts)
/// with a linear backoff.
async fn with_retry<T, F, Fut>(op: &'static str, mut attempt_fn: F) -> DocumentResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DocumentResult<T>>,
{
    let mut attempt = 1;
    loop {
        match attempt_fn().await {
            Err(DocumentStoreError::Sqlx(err)) if is_transient(&err) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(DocumentStoreError::Transient {
                        attempts: attempt,
                        source: err,
                    });
                }
                warn!(op, attempt, error = %err, "transient document store error, retrying");
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Pull the `(id, type)` pair every stored document must carry.
fn record_key(body: &Value) -> DocumentResult<(String, &str)> {
    let id = body
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DocumentStoreError::Malformed("document has no `id`".into()))?;
    let kind = body
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DocumentStoreError::Malformed(format!("document `{id}` has no `type`")))?;
    Ok((id.to_string(), kind))
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', ""))
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_ascii_lowercase();
            message.contains("database is locked") || message.contains("database is busy")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::memory_document_store;
    use serde_json::json;

    fn comment(id: &str, post_id: &str, at: &str) -> Value {
        json!({ "id": id, "type": "comment", "postId": post_id, "dateCreated": at })
    }

    #[tokio::test]
    async fn create_conflicts_within_partition_only() {
        let store = memory_document_store().await;
        let doc = json!({ "id": "alice", "type": "username-reservation" });

        store.create("unique_username", &doc).await.unwrap();
        let err = store.create("unique_username", &doc).await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::Conflict { .. }));

        // Same id in another partition is a different document.
        store.create("elsewhere", &doc).await.unwrap();
    }

    #[tokio::test]
    async fn point_read_is_partition_scoped() {
        let store = memory_document_store().await;
        store
            .create("p1", &comment("c1", "p1", "2024-01-01T00:00:00.000000Z"))
            .await
            .unwrap();

        assert!(store.point_read("c1", "p1").await.unwrap().is_some());
        assert!(store.point_read("c1", "p2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_body_and_delete_reports_missing() {
        let store = memory_document_store().await;
        let mut doc = json!({ "id": "p1", "type": "post", "title": "old" });
        store.upsert("p1", &doc).await.unwrap();
        doc["title"] = json!("new");
        store.upsert("p1", &doc).await.unwrap();

        let read = store.point_read("p1", "p1").await.unwrap().unwrap();
        assert_eq!(read["title"], "new");

        store.delete("p1", "p1").await.unwrap();
        let err = store.delete("p1", "p1").await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn query_filters_orders_and_pages() {
        let store = memory_document_store().await;
        for (i, pid) in ["p1", "p1", "p1", "p2"].iter().enumerate() {
            let at = format!("2024-01-0{}T00:00:00.000000Z", i + 1);
            store
                .create(pid, &comment(&format!("c{i}"), pid, &at))
                .await
                .unwrap();
        }

        let query = DocumentQuery::new(DocumentKind::Comment)
            .in_partition("p1")
            .filter("postId", "p1")
            .newest_first("dateCreated");
        let ids: Vec<String> = store
            .query(&query)
            .await
            .unwrap()
            .iter()
            .map(|doc| doc["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["c2", "c1", "c0"]);

        let page = store.query(&query.clone().offset(1).limit(1)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["id"], "c1");
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = memory_document_store().await;
        let post = json!({ "id": "p1", "type": "post", "commentCount": 0 });
        store.create("p1", &post).await.unwrap();

        // Increment against a missing document fails the batch, so the
        // comment insert before it must not survive.
        let failing = PartitionBatch::new("p1")
            .create(comment("c1", "p1", "2024-01-01T00:00:00.000000Z"))
            .increment("missing", "commentCount", 1);
        let err = store.execute_batch(&failing).await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::NotFound { .. }));
        assert!(store.point_read("c1", "p1").await.unwrap().is_none());

        let ok = PartitionBatch::new("p1")
            .upsert(json!({ "id": "p1", "type": "post", "commentCount": 0, "title": "edited" }))
            .create(comment("c1", "p1", "2024-01-01T00:00:00.000000Z"))
            .increment("p1", "commentCount", 1);
        store.execute_batch(&ok).await.unwrap();
        let read = store.point_read("p1", "p1").await.unwrap().unwrap();
        assert_eq!(read["commentCount"], 1);
        assert_eq!(read["title"], "edited");
    }

    #[tokio::test]
    async fn increment_floors_at_zero() {
        let store = memory_document_store().await;
        store
            .create("p1", &json!({ "id": "p1", "type": "post", "likeCount": 0 }))
            .await
            .unwrap();

        let batch = PartitionBatch::new("p1").increment("p1", "likeCount", -1);
        store.execute_batch(&batch).await.unwrap();

        let read = store.point_read("p1", "p1").await.unwrap().unwrap();
        assert_eq!(read["likeCount"], 0);
    }

    #[tokio::test]
    async fn set_rewrites_one_field_only() {
        let store = memory_document_store().await;
        store
            .create("p1", &json!({ "id": "p1", "type": "post", "title": "a", "likeCount": 0 }))
            .await
            .unwrap();
        store
            .execute_batch(&PartitionBatch::new("p1").increment("p1", "likeCount", 1))
            .await
            .unwrap();

        let edit = PartitionBatch::new("p1").set("p1", "title", "b");
        store.execute_batch(&edit).await.unwrap();
        let read = store.point_read("p1", "p1").await.unwrap().unwrap();
        assert_eq!(read["title"], "b");
        assert_eq!(read["likeCount"], 1);

        let missing = PartitionBatch::new("p1").set("p2", "title", "c");
        assert!(matches!(
            store.execute_batch(&missing).await,
            Err(DocumentStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_documents_without_id() {
        let store = memory_document_store().await;
        let err = store
            .create("p1", &json!({ "type": "post" }))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::Malformed(_)));
    }
}
