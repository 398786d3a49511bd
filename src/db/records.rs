//! Scan record persistence

use crate::db::models::{FileType, FindingSet, PathRecord, ScanRecord};
use crate::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Durable keyed storage for scan records
///
/// One instance per loaded dataset. Cloning shares the underlying pool;
/// dropping the last clone releases the file.
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl RecordStore {
    /// Open (or create) a file-backed store
    pub async fn open(db_path: &Path) -> Result<RecordStore> {
        let pool = crate::db::init::init_database(db_path).await?;
        Ok(RecordStore {
            pool,
            path: Some(db_path.to_path_buf()),
        })
    }

    /// Open an in-memory store
    pub async fn open_in_memory() -> Result<RecordStore> {
        let pool = crate::db::init::init_memory_database().await?;
        Ok(RecordStore { pool, path: None })
    }

    /// Wrap an already-initialized pool (shared with the overlay store)
    pub fn from_pool(pool: SqlitePool, path: Option<PathBuf>) -> RecordStore {
        RecordStore { pool, path }
    }

    /// Backing file path; `None` for in-memory stores
    pub fn file_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert one ingest batch in a single transaction
    ///
    /// A fault mid-batch rolls back only this batch; earlier committed
    /// batches stay durable. Re-ingesting a path replaces its findings.
    pub async fn insert_batch(&self, records: &[ScanRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let findings = serde_json::to_string(&record.findings)?;
            sqlx::query(
                r#"
                INSERT INTO files (guid, path, type, findings, created_at, updated_at)
                VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
                ON CONFLICT(path) DO UPDATE SET
                    type = excluded.type,
                    findings = excluded.findings,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&record.path)
            .bind(record.file_type.as_str())
            .bind(findings)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(records = records.len(), "committed ingest batch");

        Ok(())
    }

    /// Load the path/type projection for tree building, ordered by path
    pub async fn load_path_records(&self) -> Result<Vec<PathRecord>> {
        let rows = sqlx::query("SELECT path, type FROM files ORDER BY path")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let type_str: String = row.get("type");
            records.push(PathRecord {
                path: row.get("path"),
                file_type: FileType::parse(&type_str)?,
            });
        }

        Ok(records)
    }

    /// Load all records with findings, ordered by path
    pub async fn load_all(&self) -> Result<Vec<ScanRecord>> {
        let rows = sqlx::query("SELECT path, type, findings FROM files ORDER BY path")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(record_from_row(&row)?);
        }

        Ok(records)
    }

    /// Load a single record by path
    pub async fn record_for_path(&self, path: &str) -> Result<Option<ScanRecord>> {
        let row = sqlx::query("SELECT path, type, findings FROM files WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(record_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Count file records (directories excluded)
    pub async fn count_files(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE type = 'file'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Count all records
    pub async fn count_records(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Persist producer metadata captured next to the `files` array
    pub async fn save_headers(
        &self,
        producer_version: &str,
        metadata: &BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO scan_headers (key, value) VALUES ('producer_version', ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(producer_version)
        .execute(&mut *tx)
        .await?;

        for (key, value) in metadata {
            sqlx::query(
                r#"
                INSERT INTO scan_headers (key, value) VALUES (?, ?)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(key)
            .bind(serde_json::to_string(value)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Read back one header value
    pub async fn header(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM scan_headers WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScanRecord> {
    let type_str: String = row.get("type");
    let findings_str: String = row.get("findings");
    let findings: FindingSet = serde_json::from_str(&findings_str)
        .map_err(|e| Error::Internal(format!("corrupt findings column: {}", e)))?;

    Ok(ScanRecord {
        path: row.get("path"),
        file_type: FileType::parse(&type_str)?,
        findings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::FindingKind;

    async fn memory_store() -> RecordStore {
        RecordStore::open_in_memory()
            .await
            .expect("failed to open in-memory store")
    }

    #[tokio::test]
    async fn test_insert_batch_and_load() {
        let store = memory_store().await;

        let mut record = ScanRecord::new("a/b.txt".to_string(), FileType::File);
        record
            .findings
            .insert(FindingKind::License, vec!["MIT".to_string()]);
        let dir = ScanRecord::new("a".to_string(), FileType::Directory);

        store.insert_batch(&[dir, record]).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        // Ordered by path: "a" before "a/b.txt"
        assert_eq!(all[0].path, "a");
        assert_eq!(all[1].findings.values(&FindingKind::License), ["MIT"]);

        assert_eq!(store.count_files().await.unwrap(), 1);
        assert_eq!(store.count_records().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reingest_replaces_findings() {
        let store = memory_store().await;

        let mut first = ScanRecord::new("x.c".to_string(), FileType::File);
        first
            .findings
            .insert(FindingKind::License, vec!["GPL-2.0".to_string()]);
        store.insert_batch(&[first]).await.unwrap();

        let mut second = ScanRecord::new("x.c".to_string(), FileType::File);
        second
            .findings
            .insert(FindingKind::License, vec!["Apache-2.0".to_string()]);
        store.insert_batch(&[second]).await.unwrap();

        let loaded = store.record_for_path("x.c").await.unwrap().unwrap();
        assert_eq!(
            loaded.findings.values(&FindingKind::License),
            ["Apache-2.0"]
        );
        assert_eq!(store.count_records().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_headers_round_trip() {
        let store = memory_store().await;

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "scancode_version".to_string(),
            serde_json::Value::String("2.2.1".to_string()),
        );
        store.save_headers("1.0.0", &metadata).await.unwrap();

        assert_eq!(
            store.header("producer_version").await.unwrap().as_deref(),
            Some("1.0.0")
        );
        assert_eq!(
            store.header("scancode_version").await.unwrap().as_deref(),
            Some("\"2.2.1\"")
        );
    }
}
