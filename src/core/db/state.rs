use anyhow::Context;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::{Path, PathBuf};

pub(super) struct DbState {
    db_file: PathBuf,
    pool: SqlitePool,
}

impl std::fmt::Debug for DbState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbState")
            .field("db_file", &self.db_file)
            .finish()
    }
}

impl DbState {
    /// Open (creating if missing) the database file and bring its schema up to date.
    pub(super) async fn open<P: AsRef<Path>>(db_file: P) -> anyhow::Result<Self> {
        let db_file = db_file.as_ref().to_path_buf();
        if let Some(parent) = db_file.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {:?}", parent))?;
            }
        }

        let connect_opts = SqliteConnectOptions::new()
            .filename(&db_file)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_opts)
            .await
            .with_context(|| format!("Failed to open scan database {:?}", db_file))?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::debug!(db = %db_file.display(), "scan database ready");
        Ok(Self { db_file, pool })
    }

    pub(super) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Flush the WAL into the main file and close all connections.
    pub(super) async fn close(&self) -> anyhow::Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
            .execute(&self.pool)
            .await?;
        self.pool.close().await;
        Ok(())
    }
}
