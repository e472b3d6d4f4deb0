use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::statement::prepared::PreparedStatement;
use std::sync::Arc;

use super::{Document, DocumentStore, StoreError};
use crate::config::DocumentStoreConfig;

// ============================================================================
// ScyllaDB Document Store
// ============================================================================
//
// One row per document: `(id text PRIMARY KEY, document text)`. A CQL INSERT
// on an existing primary key replaces the row, so the upsert is idempotent and
// safe to race with a concurrent redelivery of the same order.
//
// Schema and prepared statements are set up once, when the store is built.
//
// ============================================================================

pub struct ScyllaDocumentStore {
    session: Arc<Session>,
    upsert: PreparedStatement,
    select: PreparedStatement,
}

impl ScyllaDocumentStore {
    pub async fn connect(config: &DocumentStoreConfig) -> Result<Self, StoreError> {
        let session = SessionBuilder::new()
            .known_nodes(&config.nodes)
            .build()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to ScyllaDB: {}", e)))?;

        Self::with_session(Arc::new(session), &config.database, &config.container).await
    }

    /// Ensure keyspace and table exist, then prepare the statements.
    pub async fn with_session(session: Arc<Session>, keyspace: &str, table: &str) -> Result<Self, StoreError> {
        ensure_identifier(keyspace)?;
        ensure_identifier(table)?;

        session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH REPLICATION = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}"
                ),
                &[],
            )
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to create keyspace: {}", e)))?;

        session
            .query_unpaged(
                format!("CREATE TABLE IF NOT EXISTS {keyspace}.{table} (id text PRIMARY KEY, document text)"),
                &[],
            )
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to create table: {}", e)))?;

        let mut upsert = session
            .prepare(format!("INSERT INTO {keyspace}.{table} (id, document) VALUES (?, ?)"))
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to prepare upsert: {}", e)))?;
        upsert.set_is_idempotent(true);

        let select = session
            .prepare(format!("SELECT document FROM {keyspace}.{table} WHERE id = ?"))
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to prepare select: {}", e)))?;

        tracing::info!(keyspace, table, "ScyllaDB document store ready");

        Ok(Self { session, upsert, select })
    }
}

#[async_trait]
impl DocumentStore for ScyllaDocumentStore {
    async fn upsert(&self, key: &str, document: &Document) -> Result<(), StoreError> {
        let body = serde_json::to_string(document)?;

        self.session
            .execute_unpaged(&self.upsert, (key, body.as_str()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("Upsert failed: {}", e)))?;

        tracing::debug!(key, "Document upserted");
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Document>, StoreError> {
        let result = self
            .session
            .execute_unpaged(&self.select, (key,))
            .await
            .map_err(|e| StoreError::Unavailable(format!("Select failed: {}", e)))?;

        let rows = result
            .into_rows_result()
            .map_err(|e| StoreError::Rejected(format!("Unexpected select result: {}", e)))?;
        let row = rows
            .maybe_first_row::<(String,)>()
            .map_err(|e| StoreError::Rejected(format!("Failed to parse row: {}", e)))?;

        match row {
            Some((body,)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}

/// Keyspace and table names are spliced into CQL text, so only plain
/// identifiers are accepted.
fn ensure_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if valid_start && name.len() <= 48 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::Config(format!("'{}' is not a valid CQL identifier", name)))
    }
}
