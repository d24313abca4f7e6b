//! Download request repository trait and implementation
//!
//! Rows live only while a transfer is in flight; reconciliation deletes them.

use crate::error::{OfflineError, Result};
use crate::models::{DownloadRequest, DownloadRequestRow};
use async_trait::async_trait;
use bridge_traits::TransferHandle;
use sqlx::{query, query_as, SqlitePool};

#[async_trait]
pub trait DownloadRequestRepository: Send + Sync {
    /// Persist a new request
    ///
    /// # Errors
    /// Returns error if a request with the same handle already exists
    async fn insert(&self, request: &DownloadRequest) -> Result<()>;

    async fn find(&self, handle: TransferHandle) -> Result<Option<DownloadRequest>>;

    /// # Returns
    /// - `Ok(true)` if the row was deleted
    /// - `Ok(false)` if it was already gone
    async fn delete(&self, handle: TransferHandle) -> Result<bool>;

    /// All persisted requests, oldest first
    async fn list(&self) -> Result<Vec<DownloadRequest>>;

    /// Move a request to the handle of a resubmitted transfer
    ///
    /// # Errors
    /// Returns `NotFound` if no request exists under `old`
    async fn rekey(&self, old: TransferHandle, new: TransferHandle) -> Result<()>;
}

/// SQLite implementation of DownloadRequestRepository
pub struct SqliteDownloadRequestRepository {
    pool: SqlitePool,
}

impl SqliteDownloadRequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DownloadRequestRepository for SqliteDownloadRequestRepository {
    async fn insert(&self, request: &DownloadRequest) -> Result<()> {
        query(
            r#"
            INSERT INTO download_requests
                (handle, url, title, resource_type, destination_path, started_at, wifi_only)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.handle.as_i64())
        .bind(&request.url)
        .bind(&request.title)
        .bind(request.resource_type.as_str())
        .bind(request.destination.to_string_lossy().as_ref())
        .bind(request.started_at.timestamp_millis())
        .bind(request.wifi_only)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, handle: TransferHandle) -> Result<Option<DownloadRequest>> {
        let row = query_as::<_, DownloadRequestRow>("SELECT * FROM download_requests WHERE handle = ?")
            .bind(handle.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(DownloadRequest::from))
    }

    async fn delete(&self, handle: TransferHandle) -> Result<bool> {
        let result = query("DELETE FROM download_requests WHERE handle = ?")
            .bind(handle.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<DownloadRequest>> {
        let rows = query_as::<_, DownloadRequestRow>(
            "SELECT * FROM download_requests ORDER BY started_at ASC, handle ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DownloadRequest::from).collect())
    }

    async fn rekey(&self, old: TransferHandle, new: TransferHandle) -> Result<()> {
        let result = query("UPDATE download_requests SET handle = ? WHERE handle = ?")
            .bind(new.as_i64())
            .bind(old.as_i64())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OfflineError::NotFound {
                entity_type: "DownloadRequest".to_string(),
                id: old.to_string(),
            });
        }

        Ok(())
    }
}
