use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque unique job identifier. Generated once at creation, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the caller that submitted a job. Stamped on the record at
/// creation and checked on every status/result read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// What a job was submitted with. Each variant carries exactly the payload
/// its stage sequence needs, so the executor can match exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobKind {
    /// A remote video reference; audio is fetched from the best available
    /// audio-only encoding.
    SourceUrl { url: String },
    /// An already-local media file; the audio track is extracted from it.
    /// The file is deleted after the job reaches a terminal state.
    UploadedMedia { file_path: PathBuf },
    /// Raw article text; goes straight to generation.
    RawText { text: String },
}

impl JobKind {
    /// Short label for logging and status views.
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::SourceUrl { .. } => "source_url",
            JobKind::UploadedMedia { .. } => "uploaded_media",
            JobKind::RawText { .. } => "raw_text",
        }
    }

    /// Detects the MIME type of an uploaded media payload from its path.
    /// Returns `None` for non-upload kinds and unknown extensions.
    pub fn detect_mime_type(&self) -> Option<String> {
        match self {
            JobKind::UploadedMedia { file_path } => mime_from_path(file_path),
            _ => None,
        }
    }
}

fn mime_from_path(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first().map(|m| m.to_string())
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and Failed are terminal; no transition leaves either.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Qualitative engagement tier attached to a generated artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engagement {
    High,
    Medium,
    Low,
}

impl Engagement {
    /// Lenient parse for labels coming back from the remote model.
    /// Unknown labels land on Medium rather than failing the artifact.
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Engagement::High,
            "low" => Engagement::Low,
            _ => Engagement::Medium,
        }
    }
}

/// One generated content unit: a titled, ordered sequence of short text
/// segments plus an engagement label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub title: String,
    pub segments: Vec<String>,
    pub engagement: Engagement,
}

/// The data entity tracking one unit of work.
///
/// Mutated only by the executor that owns the job; readers go through the
/// store and see whole records, never partial updates.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub owner: OwnerId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<Vec<Artifact>>,
    pub error: Option<String>,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    /// Creates a fresh record in the Pending state with progress 0.
    pub fn new(owner: OwnerId, kind: JobKind) -> Self {
        let mime_type = kind.detect_mime_type();
        Self {
            id: JobId::generate(),
            owner,
            kind,
            status: JobStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            mime_type,
            created_at: Utc::now(),
        }
    }

    /// Fires the Pending -> Processing transition. A no-op once terminal.
    pub fn mark_processing(&mut self) {
        if !self.status.is_terminal() {
            self.status = JobStatus::Processing;
        }
    }

    /// Advances progress. Monotonic: a lower value than the current one is
    /// ignored, so readers always observe a non-decreasing sequence.
    pub fn advance_progress(&mut self, progress: u8) {
        if !self.status.is_terminal() {
            self.progress = self.progress.max(progress.min(100));
        }
    }

    /// Terminal transition to Completed. Pins progress to 100 and stores
    /// the artifacts; `error` stays unset.
    pub fn complete(&mut self, artifacts: Vec<Artifact>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(artifacts);
        self.error = None;
    }

    /// Terminal transition to Failed. No partial result is kept.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(error.into());
    }
}

/// Read-only view returned by status queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: JobId,
    pub kind: &'static str,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JobStatusView {
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            kind: record.kind.label(),
            status: record.status,
            progress: record.progress,
            error: record.error.clone(),
            created_at: record.created_at,
        }
    }
}
