//! Offline resource repository trait and implementation

use crate::error::Result;
use crate::models::{ResourceRow, TrackedResource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar, SqlitePool};

const SELECT_RESOURCES: &str = r#"
    SELECT r.url, r.local_path, r.resource_type, r.recorded_at,
           CASE WHEN p.url IS NULL THEN 0 ELSE 1 END AS is_priority
    FROM offline_resources r
    LEFT JOIN priority_urls p ON p.url = r.url
"#;

/// Persistence for the url → local file mapping and the priority pins.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Find the mapping for `url`
    ///
    /// # Returns
    /// - `Ok(Some(resource))` if a mapping exists
    /// - `Ok(None)` if not
    async fn find(&self, url: &str) -> Result<Option<TrackedResource>>;

    /// Insert or replace the mapping for `resource.url`.
    ///
    /// `resource.is_priority` is ignored; pins are managed separately.
    async fn upsert(&self, resource: &TrackedResource) -> Result<()>;

    /// Delete the mapping and any priority pin for `url`
    ///
    /// # Returns
    /// - `Ok(true)` if a mapping was deleted
    /// - `Ok(false)` if there was none
    async fn delete(&self, url: &str) -> Result<bool>;

    /// All mappings, oldest first
    async fn list(&self) -> Result<Vec<TrackedResource>>;

    /// Pin `url`; repeated calls keep the first timestamp
    async fn mark_priority(&self, url: &str, marked_at: DateTime<Utc>) -> Result<()>;

    async fn is_priority(&self, url: &str) -> Result<bool>;
}

/// SQLite implementation of ResourceRepository
pub struct SqliteResourceRepository {
    pool: SqlitePool,
}

impl SqliteResourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceRepository for SqliteResourceRepository {
    async fn find(&self, url: &str) -> Result<Option<TrackedResource>> {
        let sql = format!("{SELECT_RESOURCES} WHERE r.url = ?");
        let row = query_as::<_, ResourceRow>(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(TrackedResource::from))
    }

    async fn upsert(&self, resource: &TrackedResource) -> Result<()> {
        query(
            r#"
            INSERT INTO offline_resources (url, local_path, resource_type, recorded_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                local_path = excluded.local_path,
                resource_type = excluded.resource_type,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(&resource.url)
        .bind(resource.local_path.to_string_lossy().as_ref())
        .bind(resource.resource_type.as_str())
        .bind(resource.recorded_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let removed = query("DELETE FROM offline_resources WHERE url = ?")
            .bind(url)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        query("DELETE FROM priority_urls WHERE url = ?")
            .bind(url)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(removed > 0)
    }

    async fn list(&self) -> Result<Vec<TrackedResource>> {
        let sql = format!("{SELECT_RESOURCES} ORDER BY r.recorded_at ASC, r.url ASC");
        let rows = query_as::<_, ResourceRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(TrackedResource::from).collect())
    }

    async fn mark_priority(&self, url: &str, marked_at: DateTime<Utc>) -> Result<()> {
        query("INSERT INTO priority_urls (url, marked_at) VALUES (?, ?) ON CONFLICT(url) DO NOTHING")
            .bind(url)
            .bind(marked_at.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn is_priority(&self, url: &str) -> Result<bool> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM priority_urls WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::ResourceType;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn resource(url: &str, path: &str, ty: ResourceType, millis: i64) -> TrackedResource {
        TrackedResource {
            url: url.to_string(),
            local_path: PathBuf::from(path),
            resource_type: ty,
            is_priority: false,
            recorded_at: Utc.timestamp_millis_opt(millis).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let repo = SqliteResourceRepository::new(create_test_pool().await.unwrap());
        let item = resource("https://x/a.mp3", "/o/audios/a.mp3", ResourceType::Audio, 1_000);

        repo.upsert(&item).await.unwrap();

        let found = repo.find("https://x/a.mp3").await.unwrap().unwrap();
        assert_eq!(found, item);
        assert!(repo.find("https://x/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_last_write_wins() {
        let repo = SqliteResourceRepository::new(create_test_pool().await.unwrap());

        repo.upsert(&resource("https://x/a.jpg", "/one/a.jpg", ResourceType::Photo, 1))
            .await
            .unwrap();
        repo.upsert(&resource("https://x/a.jpg", "/two/a.jpg", ResourceType::Comic, 2))
            .await
            .unwrap();

        let found = repo.find("https://x/a.jpg").await.unwrap().unwrap();
        assert_eq!(found.local_path, PathBuf::from("/two/a.jpg"));
        assert_eq!(found.resource_type, ResourceType::Comic);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_priority_is_independent_of_presence() {
        let repo = SqliteResourceRepository::new(create_test_pool().await.unwrap());
        let now = Utc::now();

        repo.mark_priority("https://x/pinned.jpg", now).await.unwrap();
        repo.mark_priority("https://x/pinned.jpg", now).await.unwrap();
        assert!(repo.is_priority("https://x/pinned.jpg").await.unwrap());
        assert!(repo.find("https://x/pinned.jpg").await.unwrap().is_none());

        repo.upsert(&resource("https://x/pinned.jpg", "/o/p.jpg", ResourceType::Photo, 5))
            .await
            .unwrap();
        assert!(repo.find("https://x/pinned.jpg").await.unwrap().unwrap().is_priority);
    }

    #[tokio::test]
    async fn test_delete_clears_priority() {
        let repo = SqliteResourceRepository::new(create_test_pool().await.unwrap());

        repo.upsert(&resource("https://x/a.jpg", "/o/a.jpg", ResourceType::Photo, 1))
            .await
            .unwrap();
        repo.mark_priority("https://x/a.jpg", Utc::now()).await.unwrap();

        assert!(repo.delete("https://x/a.jpg").await.unwrap());
        assert!(!repo.is_priority("https://x/a.jpg").await.unwrap());
        assert!(!repo.delete("https://x/a.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_legacy_row_without_type() {
        let pool = create_test_pool().await.unwrap();
        sqlx::query(
            "INSERT INTO offline_resources (url, local_path, resource_type, recorded_at) \
             VALUES ('https://x/radio/audio/1', '/o/audios/1', NULL, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let repo = SqliteResourceRepository::new(pool);
        let found = repo.find("https://x/radio/audio/1").await.unwrap().unwrap();
        assert_eq!(found.resource_type, ResourceType::Audio);
    }
}
