use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThreadgenError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Credential verification failures, surfaced synchronously at the
/// submission boundary.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No credential provided")]
    MissingCredential,

    #[error("Invalid credential")]
    InvalidCredential,
}

/// Rejections raised by `Dispatcher::submit` before any record is created.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Invalid submission: {0}")]
    Validation(String),
}

/// Failures of the synchronous status/result query surface.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("Job not found")]
    NotFound,

    #[error("Job is owned by another caller")]
    Unauthorized,

    #[error("Job has not completed yet")]
    NotReady,
}

/// Fatal pipeline failures recorded on the job record.
///
/// The production generation chain degrades to a local generator instead
/// of failing; the `Generation` variant only surfaces for injected
/// generators without such a fallback.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Acquisition failed: {0}")]
    Acquisition(#[from] crate::stages::acquire::AcquireError),

    #[error("Audio extraction failed: {0}")]
    Extraction(#[from] crate::stages::acquire::ExtractError),

    #[error("Transcription failed: {0}")]
    Transcription(#[from] crate::stages::transcribe::TranscribeError),

    #[error("Generation failed: {0}")]
    Generation(#[from] crate::stages::generate::GenerateError),

    #[error("Stage '{stage}' timed out after {seconds}s")]
    Timeout { stage: &'static str, seconds: u64 },
}

pub type Result<T> = std::result::Result<T, ThreadgenError>;
