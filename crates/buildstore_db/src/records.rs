//! Build record operations (merge-upsert and reads)

use crate::error::{Result, StoreError};
use crate::types::*;
use crate::xml;
use crate::BuildStoreDb;
use sqlx::Row;
use tracing::{debug, warn};

const RECORD_COLUMNS: &str = "environment, job_name, build_number, process_name, start_time, \
     end_time, status, log_content, report_content, output_content";

impl BuildStoreDb {
    // ========================================================================
    // Writes
    // ========================================================================

    /// Merge `partial` into the record for `key`, creating it if needed.
    ///
    /// Fields that are `None` in `partial` keep their stored value. `start_time`
    /// keeps the first value ever written; every other field takes the newest
    /// non-null value. The merge is one statement, so concurrent upserts on the
    /// same key serialize in the database and readers never see half of one.
    ///
    /// Malformed `output_content` is dropped from the merge; the remaining
    /// fields are still written and the call then returns
    /// [`StoreError::InvalidContent`].
    pub async fn upsert(&self, key: &BuildKey, partial: &PartialBuild) -> Result<()> {
        let mut rejected = None;
        let output_content = match partial.output_content.as_deref() {
            Some(content) => match xml::check_well_formed(content) {
                Ok(()) => Some(content),
                Err(reason) => {
                    warn!(build = %key, %reason, "Rejecting malformed output content");
                    rejected = Some(StoreError::invalid_content("output_content", reason));
                    None
                }
            },
            None => None,
        };

        let now = Self::now_millis();
        sqlx::query(
            r#"
            INSERT INTO build_records (
                environment, job_name, build_number, process_name, start_time, end_time,
                status, log_content, report_content, output_content, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (environment, job_name, build_number) DO UPDATE SET
                process_name = COALESCE(excluded.process_name, build_records.process_name),
                start_time = COALESCE(build_records.start_time, excluded.start_time),
                end_time = COALESCE(excluded.end_time, build_records.end_time),
                status = COALESCE(excluded.status, build_records.status),
                log_content = COALESCE(excluded.log_content, build_records.log_content),
                report_content = COALESCE(excluded.report_content, build_records.report_content),
                output_content = COALESCE(excluded.output_content, build_records.output_content),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&key.environment)
        .bind(&key.job_name)
        .bind(key.build_number)
        .bind(partial.process_name.as_deref())
        .bind(partial.start_time.map(|t| t.timestamp_millis()))
        .bind(partial.end_time.map(|t| t.timestamp_millis()))
        .bind(partial.status.as_deref())
        .bind(partial.log_content.as_deref())
        .bind(partial.report_content.as_deref())
        .bind(output_content)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(build = %key, "Build record upserted");

        match rejected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Get one record by key.
    pub async fn get(&self, key: &BuildKey) -> Result<Option<BuildRecord>> {
        let sql = format!(
            "SELECT {} FROM build_records WHERE environment = ? AND job_name = ? AND build_number = ?",
            RECORD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&key.environment)
            .bind(&key.job_name)
            .bind(key.build_number)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row_to_record(&row)).transpose()
    }

    /// The record with the latest `start_time`, ties broken by the highest
    /// build number. Records that never received a start time sort last.
    pub async fn get_latest(&self) -> Result<Option<BuildRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM build_records
            ORDER BY start_time IS NULL, start_time DESC, build_number DESC, environment, job_name
            LIMIT 1
            "#,
            RECORD_COLUMNS
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;

        row.map(|row| row_to_record(&row)).transpose()
    }

    /// Content of one artifact.
    ///
    /// `None` covers both a missing record and a field that was never written.
    pub async fn get_artifact(&self, key: &BuildKey, kind: ArtifactKind) -> Result<Option<String>> {
        let sql = format!(
            "SELECT {} FROM build_records WHERE environment = ? AND job_name = ? AND build_number = ?",
            kind.column()
        );
        let content: Option<Option<String>> = sqlx::query_scalar(&sql)
            .bind(&key.environment)
            .bind(&key.job_name)
            .bind(key.build_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(content.flatten())
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM build_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<BuildRecord> {
    let start_time: Option<i64> = row.try_get("start_time")?;
    let end_time: Option<i64> = row.try_get("end_time")?;
    let process_name: Option<String> = row.try_get("process_name")?;
    let status: Option<String> = row.try_get("status")?;

    Ok(BuildRecord {
        environment: row.try_get("environment")?,
        job_name: row.try_get("job_name")?,
        build_number: row.try_get("build_number")?,
        process_name: process_name.unwrap_or_default(),
        start_time: start_time.map(BuildStoreDb::millis_to_datetime),
        end_time: end_time.map(BuildStoreDb::millis_to_datetime),
        status: status.unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
        log_content: row.try_get("log_content")?,
        report_content: row.try_get("report_content")?,
        output_content: row.try_get("output_content")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn key(build: i64) -> BuildKey {
        BuildKey::new("prod", "nightly", build)
    }

    #[tokio::test]
    async fn test_upsert_creates_record_with_defaults() {
        let db = BuildStoreDb::open_memory().await.unwrap();
        db.upsert(&key(1), &PartialBuild::new()).await.unwrap();

        let record = db.get(&key(1)).await.unwrap().unwrap();
        assert_eq!(record.status, UNKNOWN_STATUS);
        assert_eq!(record.process_name, "");
        assert!(record.start_time.is_none());
        assert!(record.end_time.is_none());
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_absent_fields_do_not_erase() {
        let db = BuildStoreDb::open_memory().await.unwrap();
        let ended = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        db.upsert(
            &key(1),
            &PartialBuild::new()
                .with_status("SUCCESS")
                .with_end_time(ended)
                .with_artifact(ArtifactKind::Log, "<html>log</html>"),
        )
        .await
        .unwrap();
        db.upsert(&key(1), &PartialBuild::artifact(ArtifactKind::Report, "<html>r</html>"))
            .await
            .unwrap();

        let record = db.get(&key(1)).await.unwrap().unwrap();
        assert_eq!(record.status, "SUCCESS");
        assert_eq!(record.end_time, Some(ended));
        assert_eq!(record.log_content.as_deref(), Some("<html>log</html>"));
        assert_eq!(record.report_content.as_deref(), Some("<html>r</html>"));
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_start_time_keeps_first_value() {
        let db = BuildStoreDb::open_memory().await.unwrap();
        let first = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

        db.upsert(&key(1), &PartialBuild::new().with_start_time(first))
            .await
            .unwrap();
        db.upsert(&key(1), &PartialBuild::new().with_start_time(second))
            .await
            .unwrap();

        let record = db.get(&key(1)).await.unwrap().unwrap();
        assert_eq!(record.start_time, Some(first));
    }

    #[tokio::test]
    async fn test_invalid_output_is_rejected_but_other_fields_apply() {
        let db = BuildStoreDb::open_memory().await.unwrap();
        db.upsert(&key(1), &PartialBuild::artifact(ArtifactKind::Output, "<robot/>"))
            .await
            .unwrap();

        let err = db
            .upsert(
                &key(1),
                &PartialBuild::new()
                    .with_status("FAILURE")
                    .with_artifact(ArtifactKind::Output, "<robot><unclosed></robot>"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidContent {
                field: "output_content",
                ..
            }
        ));

        let record = db.get(&key(1)).await.unwrap().unwrap();
        assert_eq!(record.status, "FAILURE");
        assert_eq!(record.output_content.as_deref(), Some("<robot/>"));
    }

    #[tokio::test]
    async fn test_duplicate_attribute_output_is_not_stored() {
        let db = BuildStoreDb::open_memory().await.unwrap();

        let err = db
            .upsert(
                &key(1),
                &PartialBuild::artifact(ArtifactKind::Output, r#"<robot a="1" a="2"/>"#),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidContent { .. }));
        assert!(db
            .get_artifact(&key(1), ArtifactKind::Output)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_get_artifact_missing_field_and_missing_record_look_the_same() {
        let db = BuildStoreDb::open_memory().await.unwrap();
        db.upsert(&key(1), &PartialBuild::artifact(ArtifactKind::Log, "X"))
            .await
            .unwrap();

        assert_eq!(
            db.get_artifact(&key(1), ArtifactKind::Log).await.unwrap().as_deref(),
            Some("X")
        );
        assert!(db
            .get_artifact(&key(1), ArtifactKind::Report)
            .await
            .unwrap()
            .is_none());
        assert!(db
            .get_artifact(&key(2), ArtifactKind::Log)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_get_latest_empty() {
        let db = BuildStoreDb::open_memory().await.unwrap();
        assert!(db.get_latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_records_without_start_time_sort_last() {
        let db = BuildStoreDb::open_memory().await.unwrap();
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        db.upsert(&key(99), &PartialBuild::new().with_status("SUCCESS"))
            .await
            .unwrap();
        db.upsert(&key(1), &PartialBuild::new().with_start_time(t))
            .await
            .unwrap();

        let latest = db.get_latest().await.unwrap().unwrap();
        assert_eq!(latest.build_number, 1);
    }
}
