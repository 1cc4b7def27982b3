//! Build record types shared by the store, the ingestor and the query side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status reported for a build whose result is not known yet.
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

// ============================================================================
// Key
// ============================================================================

/// Identity of one build: (environment, job, build number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildKey {
    pub environment: String,
    pub job_name: String,
    pub build_number: i64,
}

impl BuildKey {
    /// Build a key, canonicalizing the environment.
    ///
    /// Start and completion events must produce the same key for the same
    /// build, so every constructor goes through [`canonical_environment`].
    pub fn new(environment: &str, job_name: impl Into<String>, build_number: i64) -> Self {
        Self {
            environment: canonical_environment(environment),
            job_name: job_name.into().trim().to_string(),
            build_number,
        }
    }
}

impl std::fmt::Display for BuildKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.environment, self.job_name, self.build_number)
    }
}

/// Canonical form of an environment name: surrounding whitespace and
/// leading/trailing path separators removed.
pub fn canonical_environment(raw: &str) -> String {
    raw.trim().trim_matches('/').to_string()
}

// ============================================================================
// Artifacts
// ============================================================================

/// The three artifact blobs stored per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Log,
    Report,
    Output,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [Self::Log, Self::Report, Self::Output];

    /// Numeric code used on the wire (`kind=` query parameter).
    pub fn code(&self) -> u8 {
        match self {
            Self::Log => 1,
            Self::Report => 2,
            Self::Output => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Log),
            2 => Some(Self::Report),
            3 => Some(Self::Output),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Report => "report",
            Self::Output => "output",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "log" => Some(Self::Log),
            "report" => Some(Self::Report),
            "output" => Some(Self::Output),
            _ => None,
        }
    }

    /// File name the execution host publishes this artifact under.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Log => "log.html",
            Self::Report => "report.html",
            Self::Output => "output.xml",
        }
    }

    /// Content type served for this artifact.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Log | Self::Report => "text/html",
            Self::Output => "application/xml",
        }
    }

    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Log => "log_content",
            Self::Report => "report_content",
            Self::Output => "output_content",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// Fields of a single upsert. `None` means "leave the stored value alone".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialBuild {
    pub process_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub log_content: Option<String>,
    pub report_content: Option<String>,
    pub output_content: Option<String>,
}

impl PartialBuild {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process_name(mut self, process_name: impl Into<String>) -> Self {
        self.process_name = Some(process_name.into());
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Set the content field for one artifact kind.
    pub fn with_artifact(mut self, kind: ArtifactKind, content: impl Into<String>) -> Self {
        let content = Some(content.into());
        match kind {
            ArtifactKind::Log => self.log_content = content,
            ArtifactKind::Report => self.report_content = content,
            ArtifactKind::Output => self.output_content = content,
        }
        self
    }

    /// Single-field update carrying only one artifact.
    pub fn artifact(kind: ArtifactKind, content: impl Into<String>) -> Self {
        Self::default().with_artifact(kind, content)
    }
}

/// One stored build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub environment: String,
    pub job_name: String,
    pub build_number: i64,
    /// Owning process/pipeline, empty until an event supplied it.
    pub process_name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Build result, [`UNKNOWN_STATUS`] until known.
    pub status: String,
    pub log_content: Option<String>,
    pub report_content: Option<String>,
    pub output_content: Option<String>,
}

impl BuildRecord {
    pub fn key(&self) -> BuildKey {
        BuildKey {
            environment: self.environment.clone(),
            job_name: self.job_name.clone(),
            build_number: self.build_number,
        }
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<&str> {
        match kind {
            ArtifactKind::Log => self.log_content.as_deref(),
            ArtifactKind::Report => self.report_content.as_deref(),
            ArtifactKind::Output => self.output_content.as_deref(),
        }
    }
}
