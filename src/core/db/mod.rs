mod scan;
mod state;

use std::{path::Path, sync::Arc};

use anyhow::Context;
use state::DbState;
use time::OffsetDateTime;

pub use scan::{NewScan, ScanRecord, ScanRepository};

/// SQLite-backed store of [`ScanRecord`]s.
#[derive(Debug, Clone)]
pub struct ScanDb {
    state: Arc<DbState>,
}

impl ScanDb {
    pub async fn open<P: AsRef<Path>>(db_file: P) -> anyhow::Result<Self> {
        Ok(Self {
            state: Arc::new(DbState::open(db_file).await?),
        })
    }

    /// Checkpoint and close the database. Further queries fail.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.state.close().await
    }
}

#[derive(sqlx::FromRow)]
struct ScanRow {
    id: i64,
    owner_id: i64,
    created_at: i64,
    mask_ref: String,
    contrast_ref: String,
    result_ref: Option<String>,
    edge_ref: Option<String>,
}

impl TryFrom<ScanRow> for ScanRecord {
    type Error = anyhow::Error;

    fn try_from(row: ScanRow) -> anyhow::Result<Self> {
        let created_at = OffsetDateTime::from_unix_timestamp_nanos(row.created_at as i128)
            .with_context(|| format!("Scan {} has an invalid timestamp", row.id))?;
        Ok(ScanRecord {
            id: row.id,
            owner_id: row.owner_id,
            created_at,
            mask_ref: row.mask_ref,
            contrast_ref: row.contrast_ref,
            result_ref: row.result_ref,
            edge_ref: row.edge_ref,
        })
    }
}

const SCAN_COLUMNS: &str =
    "id, owner_id, created_at, mask_ref, contrast_ref, result_ref, edge_ref";

fn timestamp_nanos(t: OffsetDateTime) -> anyhow::Result<i64> {
    i64::try_from(t.unix_timestamp_nanos())
        .with_context(|| format!("Timestamp {} is out of range", t))
}

impl ScanRepository for ScanDb {
    async fn record_scan(&self, scan: NewScan) -> anyhow::Result<ScanRecord> {
        let created_at = timestamp_nanos(scan.created_at)?;
        let id = sqlx::query(
            r#"INSERT INTO scan (owner_id, created_at, mask_ref, contrast_ref, result_ref, edge_ref)
            VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(scan.owner_id)
        .bind(created_at)
        .bind(&scan.mask_ref)
        .bind(&scan.contrast_ref)
        .bind(&scan.result_ref)
        .bind(&scan.edge_ref)
        .execute(self.state.pool())
        .await
        .with_context(|| format!("Failed to record scan for owner {}", scan.owner_id))?
        .last_insert_rowid();

        Ok(ScanRecord {
            id,
            owner_id: scan.owner_id,
            created_at: scan.created_at,
            mask_ref: scan.mask_ref,
            contrast_ref: scan.contrast_ref,
            result_ref: scan.result_ref,
            edge_ref: scan.edge_ref,
        })
    }

    async fn get_scan(&self, id: i64) -> anyhow::Result<Option<ScanRecord>> {
        let sql = format!("SELECT {} FROM scan WHERE id = $1", SCAN_COLUMNS);
        sqlx::query_as::<_, ScanRow>(&sql)
            .bind(id)
            .fetch_optional(self.state.pool())
            .await?
            .map(ScanRecord::try_from)
            .transpose()
    }

    async fn latest_scan(&self, owner_id: i64) -> anyhow::Result<Option<ScanRecord>> {
        let sql = format!(
            "SELECT {} FROM scan WHERE owner_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
            SCAN_COLUMNS
        );
        sqlx::query_as::<_, ScanRow>(&sql)
            .bind(owner_id)
            .fetch_optional(self.state.pool())
            .await?
            .map(ScanRecord::try_from)
            .transpose()
    }

    async fn list_scans(&self, owner_id: i64) -> anyhow::Result<Vec<ScanRecord>> {
        let sql = format!(
            "SELECT {} FROM scan WHERE owner_id = $1 ORDER BY created_at DESC, id DESC",
            SCAN_COLUMNS
        );
        sqlx::query_as::<_, ScanRow>(&sql)
            .bind(owner_id)
            .fetch_all(self.state.pool())
            .await?
            .into_iter()
            .map(ScanRecord::try_from)
            .collect()
    }

    async fn clear_results(&self, owner_id: i64) -> anyhow::Result<u64> {
        let cleared = sqlx::query(
            r#"UPDATE scan SET result_ref = NULL, edge_ref = NULL
            WHERE owner_id = $1 AND (result_ref IS NOT NULL OR edge_ref IS NOT NULL)"#,
        )
        .bind(owner_id)
        .execute(self.state.pool())
        .await
        .with_context(|| format!("Failed to clear results of owner {}", owner_id))?
        .rows_affected();
        Ok(cleared)
    }
}
