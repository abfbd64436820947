//! Speech-to-text stage: remote OpenAI-compatible API with a local CLI
//! fallback. Exhausting the chain is fatal to the job; there is no silent
//! empty-transcript continuation.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use super::{truncate_detail, Transcriber};
use crate::config::TranscriptionConfig;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("API key environment variable '{0}' is not set")]
    MissingApiKey(String),

    #[error("Failed to read audio file '{path}': {source}")]
    ReadAudio {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcription request failed: {0}")]
    RequestFailed(String),

    #[error("Transcription API returned {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Transcription produced an empty transcript")]
    EmptyTranscript,

    #[error("Failed to run local transcriber '{bin}': {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Local transcriber failed: {0}")]
    LocalFailed(String),

    #[error("All transcription backends failed; remote: {primary}; local: {fallback}")]
    Exhausted { primary: String, fallback: String },
}

/// Remote transcriber calling an OpenAI-compatible
/// `/audio/transcriptions` endpoint with a multipart upload.
pub struct WhisperApiTranscriber {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
}

impl WhisperApiTranscriber {
    pub fn new(config: &TranscriptionConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: std::env::var(&config.api_key_env).ok(),
            api_key_env: config.api_key_env.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperApiTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<String, TranscribeError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| TranscribeError::MissingApiKey(self.api_key_env.clone()))?;

        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| TranscribeError::ReadAudio {
                path: audio.to_path_buf(),
                source: e,
            })?;

        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("model", self.model.clone())
            .text("response_format", "text");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscribeError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscribeError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(TranscribeError::ApiError {
                status: status.as_u16(),
                body: truncate_detail(&body),
            });
        }

        let transcript = body.trim().to_string();
        if transcript.is_empty() {
            return Err(TranscribeError::EmptyTranscript);
        }

        debug!(chars = transcript.len(), "Remote transcription succeeded");
        Ok(transcript)
    }
}

/// Local fallback transcriber: runs a configured whisper-style CLI with the
/// audio path appended as the last argument and reads the transcript from
/// stdout.
pub struct CliTranscriber {
    command: Vec<String>,
}

impl CliTranscriber {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Transcriber for CliTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<String, TranscribeError> {
        let bin = self
            .command
            .first()
            .ok_or_else(|| TranscribeError::LocalFailed("empty command".to_string()))?;

        let output = tokio::process::Command::new(bin)
            .args(&self.command[1..])
            .arg(audio)
            .output()
            .await
            .map_err(|e| TranscribeError::Spawn {
                bin: bin.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(TranscribeError::LocalFailed(truncate_detail(
                &String::from_utf8_lossy(&output.stderr),
            )));
        }

        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if transcript.is_empty() {
            return Err(TranscribeError::EmptyTranscript);
        }

        debug!(chars = transcript.len(), "Local transcription succeeded");
        Ok(transcript)
    }
}

/// The transcription fallback chain: try the remote backend, then the local
/// one. Both failing is fatal to the job, unlike the generation stage.
pub struct FallbackTranscriber {
    primary: Box<dyn Transcriber>,
    fallback: Box<dyn Transcriber>,
}

impl FallbackTranscriber {
    pub fn new(primary: Box<dyn Transcriber>, fallback: Box<dyn Transcriber>) -> Self {
        Self { primary, fallback }
    }

    /// Builds the production chain from config: remote API then local CLI.
    pub fn from_config(config: &TranscriptionConfig) -> Self {
        Self::new(
            Box::new(WhisperApiTranscriber::new(config)),
            Box::new(CliTranscriber::new(config.local_command.clone())),
        )
    }
}

#[async_trait]
impl Transcriber for FallbackTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<String, TranscribeError> {
        let primary_err = match self.primary.transcribe(audio).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                warn!(error = %e, "Remote transcription failed, falling back to local");
                e
            }
        };

        match self.fallback.transcribe(audio).await {
            Ok(text) => Ok(text),
            Err(fallback_err) => Err(TranscribeError::Exhausted {
                primary: primary_err.to_string(),
                fallback: fallback_err.to_string(),
            }),
        }
    }
}
