//! Schema creation for the build record store.
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::Result;
use crate::BuildStoreDb;
use tracing::info;

impl BuildStoreDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // Enable WAL mode for better concurrent access
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        // Nullable value columns: NULL means "never written" and is what the
        // COALESCE merge keys off.
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS build_records (
                environment TEXT NOT NULL,
                job_name TEXT NOT NULL,
                build_number INTEGER NOT NULL,
                process_name TEXT,
                start_time INTEGER,
                end_time INTEGER,
                status TEXT,
                log_content TEXT,
                report_content TEXT,
                output_content TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(environment, job_name, build_number)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_build_records_latest ON build_records(start_time DESC, build_number DESC)",
        )
        .execute(&self.pool)
        .await?;

        info!("Build store schema verified");
        Ok(())
    }
}
