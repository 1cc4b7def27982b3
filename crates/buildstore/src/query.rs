//! Read side: latest build view and artifact content.

use buildstore_db::{ArtifactKind, BuildKey, BuildRecord, BuildStoreDb, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use url::form_urlencoded;

/// Latest build as served by `GET /latest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestBuildView {
    pub job_name: String,
    pub build_number: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: String,
    pub environment: String,
    #[serde(rename = "reportHtmlUrl", skip_serializing_if = "Option::is_none")]
    pub report_html_url: Option<String>,
    #[serde(rename = "outputXmlUrl", skip_serializing_if = "Option::is_none")]
    pub output_xml_url: Option<String>,
    #[serde(rename = "logHtmlUrl", skip_serializing_if = "Option::is_none")]
    pub log_html_url: Option<String>,
}

impl LatestBuildView {
    fn from_record(record: BuildRecord) -> Self {
        let key = record.key();
        let link = |kind| {
            if key.environment.is_empty() || key.job_name.is_empty() {
                None
            } else {
                Some(artifact_url(&key, kind))
            }
        };

        Self {
            report_html_url: link(ArtifactKind::Report),
            output_xml_url: link(ArtifactKind::Output),
            log_html_url: link(ArtifactKind::Log),
            job_name: record.job_name,
            build_number: record.build_number,
            start_time: record.start_time,
            end_time: record.end_time,
            result: record.status,
            environment: record.environment,
        }
    }
}

/// Artifact body plus the content type to serve it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactContent {
    pub content: String,
    pub media_type: &'static str,
}

/// Relative URL under which an artifact is served.
pub fn artifact_url(key: &BuildKey, kind: ArtifactKind) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("env", &key.environment)
        .append_pair("job", &key.job_name)
        .append_pair("build", &key.build_number.to_string())
        .append_pair("kind", &kind.code().to_string())
        .finish();
    format!("/artifact?{}", query)
}

#[derive(Clone)]
pub struct QueryService {
    db: BuildStoreDb,
}

impl QueryService {
    pub fn new(db: BuildStoreDb) -> Self {
        Self { db }
    }

    /// The latest build with links to its artifacts, `None` when nothing has
    /// been recorded yet.
    pub async fn get_latest_with_links(&self) -> Result<Option<LatestBuildView>, StoreError> {
        let latest = self.db.get_latest().await?;
        Ok(latest.map(LatestBuildView::from_record))
    }

    pub async fn get_artifact_content(
        &self,
        environment: &str,
        job_name: &str,
        build_number: i64,
        kind: ArtifactKind,
    ) -> Result<Option<ArtifactContent>, StoreError> {
        let key = BuildKey::new(environment, job_name, build_number);
        let content = self.db.get_artifact(&key, kind).await?;

        Ok(content.map(|content| ArtifactContent {
            content,
            media_type: kind.media_type(),
        }))
    }
}
