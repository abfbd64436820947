//! Pipeline stage adapters.
//!
//! Each stage is a trait seam so the executor can be driven by real
//! adapters (subprocess downloaders, remote APIs) in production and by
//! fakes in tests. Fallback policy lives in dedicated wrapper types:
//! [`transcribe::FallbackTranscriber`] is fatal once exhausted, while
//! [`generate::GracefulGenerator`] degrades to a local generator and never
//! fails the job.

pub mod acquire;
pub mod generate;
pub mod transcribe;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::job::record::Artifact;

pub use acquire::{AcquireError, CommandAcquirer, ExtractError};
pub use generate::{ChatCompletionGenerator, GenerateError, GracefulGenerator, OutlineGenerator};
pub use transcribe::{CliTranscriber, FallbackTranscriber, TranscribeError, WhisperApiTranscriber};

/// Maximum length of subprocess stderr or API error bodies kept in error
/// messages and logs.
const MAX_ERROR_DETAIL_LENGTH: usize = 200;

/// Truncates diagnostic text to a loggable length, cutting on a char
/// boundary.
pub(crate) fn truncate_detail(detail: &str) -> String {
    let detail = detail.trim();
    if detail.len() > MAX_ERROR_DETAIL_LENGTH {
        let cut = detail
            .char_indices()
            .take_while(|(i, _)| *i < MAX_ERROR_DETAIL_LENGTH)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}... (truncated)", &detail[..cut])
    } else {
        detail.to_string()
    }
}

/// A local audio payload produced by the acquisition stage, plus the source
/// title when the origin provides one.
#[derive(Debug, Clone)]
pub struct AcquiredAudio {
    pub path: PathBuf,
    pub title: Option<String>,
}

/// Acquires a local audio payload for a job.
#[async_trait]
pub trait MediaAcquirer: Send + Sync {
    /// Fetches audio for a remote source reference into `workdir`, trying
    /// a prioritized list of encodings.
    async fn fetch(&self, url: &str, workdir: &Path) -> Result<AcquiredAudio, AcquireError>;

    /// Extracts the audio track from an already-local media file into
    /// `workdir`, retrying once against a secondary target format.
    async fn extract(&self, media: &Path, workdir: &Path) -> Result<AcquiredAudio, ExtractError>;
}

/// Turns an audio payload into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<String, TranscribeError>;
}

/// Turns text (and an optional title) into thread artifacts.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        text: &str,
        title: Option<&str>,
    ) -> Result<Vec<Artifact>, GenerateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_detail_passes_short_text_through() {
        assert_eq!(truncate_detail("ffmpeg: no such file\n"), "ffmpeg: no such file");
    }

    #[test]
    fn test_truncate_detail_cuts_on_char_boundary() {
        let long = truncate_detail(&"ü".repeat(300));
        assert!(long.ends_with("... (truncated)"));
        assert!(long.len() <= MAX_ERROR_DETAIL_LENGTH + "ü".len() + "... (truncated)".len());
    }
}
