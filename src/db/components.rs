//! Component overlay persistence
//!
//! Pure key-value semantics over path. The overlay never touches the files
//! table: deleting a component leaves the underlying scan record alone, and
//! a component may reference a path no record carries.

use crate::db::models::{Component, ReviewStatus};
use crate::Result;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Durable storage for user-authored components, keyed by path
#[derive(Clone)]
pub struct ComponentStore {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl ComponentStore {
    /// Wrap an already-initialized pool (shared with the record store)
    pub fn from_pool(pool: SqlitePool, path: Option<PathBuf>) -> ComponentStore {
        ComponentStore { pool, path }
    }

    /// Backing file path; `None` for in-memory stores
    pub fn file_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fetch the component for a path, if one exists
    pub async fn get(&self, path: &str) -> Result<Option<Component>> {
        let row = sqlx::query(
            r#"
            SELECT path, review_status, name, version, license_expression,
                   owner, copyright, homepage_url, notes
            FROM components
            WHERE path = ?
            "#,
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(component_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Create or wholesale-replace the component for a path
    ///
    /// Every field is overwritten; there is no partial-field merge.
    pub async fn upsert(&self, component: &Component) -> Result<()> {
        let status = component
            .review_status
            .map(|s| s.as_str())
            .unwrap_or("");

        sqlx::query(
            r#"
            INSERT INTO components
                (guid, path, review_status, name, version, license_expression,
                 owner, copyright, homepage_url, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            ON CONFLICT(path) DO UPDATE SET
                review_status = excluded.review_status,
                name = excluded.name,
                version = excluded.version,
                license_expression = excluded.license_expression,
                owner = excluded.owner,
                copyright = excluded.copyright,
                homepage_url = excluded.homepage_url,
                notes = excluded.notes,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&component.path)
        .bind(status)
        .bind(&component.name)
        .bind(&component.version)
        .bind(&component.license_expression)
        .bind(&component.owner)
        .bind(&component.copyright)
        .bind(&component.homepage_url)
        .bind(&component.notes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove the component for a path; no-op when none exists
    pub async fn remove(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM components WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All components, ordered by path
    pub async fn list_all(&self) -> Result<Vec<Component>> {
        let rows = sqlx::query(
            r#"
            SELECT path, review_status, name, version, license_expression,
                   owner, copyright, homepage_url, notes
            FROM components
            ORDER BY path
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut components = Vec::with_capacity(rows.len());
        for row in rows {
            components.push(component_from_row(&row)?);
        }

        Ok(components)
    }
}

fn component_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Component> {
    let status_str: String = row.get("review_status");

    Ok(Component {
        path: row.get("path"),
        review_status: ReviewStatus::parse(&status_str)?,
        name: row.get("name"),
        version: row.get("version"),
        license_expression: row.get("license_expression"),
        owner: row.get("owner"),
        copyright: row.get("copyright"),
        homepage_url: row.get("homepage_url"),
        notes: row.get("notes"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;

    async fn memory_store() -> ComponentStore {
        let pool = init_memory_database()
            .await
            .expect("failed to open in-memory database");
        ComponentStore::from_pool(pool, None)
    }

    #[tokio::test]
    async fn test_upsert_then_get_returns_component() {
        let store = memory_store().await;

        let mut component = Component::new("x/y".to_string());
        component.review_status = Some(ReviewStatus::Attention);
        component.owner = Some("nexB Inc.".to_string());
        store.upsert(&component).await.unwrap();

        let loaded = store.get("x/y").await.unwrap().unwrap();
        assert_eq!(loaded, component);
    }

    #[tokio::test]
    async fn test_upsert_replaces_wholesale() {
        let store = memory_store().await;

        let mut first = Component::new("x/y".to_string());
        first.review_status = Some(ReviewStatus::Analyzed);
        first.notes = Some("first pass".to_string());
        store.upsert(&first).await.unwrap();

        // Second upsert carries no notes; the old notes must not survive
        let mut second = Component::new("x/y".to_string());
        second.review_status = Some(ReviewStatus::Original);
        store.upsert(&second).await.unwrap();

        let loaded = store.get("x/y").await.unwrap().unwrap();
        assert_eq!(loaded.review_status, Some(ReviewStatus::Original));
        assert_eq!(loaded.notes, None);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_then_get_returns_none() {
        let store = memory_store().await;

        store
            .upsert(&Component::new("gone/soon".to_string()))
            .await
            .unwrap();
        store.remove("gone/soon").await.unwrap();

        assert!(store.get("gone/soon").await.unwrap().is_none());
        // Removing again is a no-op
        store.remove("gone/soon").await.unwrap();
    }

    #[tokio::test]
    async fn test_component_allowed_for_path_without_record() {
        let store = memory_store().await;

        // No scan record exists for this path; the overlay accepts it anyway
        let component = Component::new("not/scanned/yet".to_string());
        store.upsert(&component).await.unwrap();
        assert!(store.get("not/scanned/yet").await.unwrap().is_some());
    }
}
