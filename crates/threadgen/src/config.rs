//! Application configuration: JSON file with per-section defaults, so an
//! empty `{}` (or [`AppConfig::default`]) is a working offline setup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for the remote-fetch and audio-extraction stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcquisitionConfig {
    /// Downloader binary used for remote sources.
    pub downloader_bin: String,
    /// Audio extraction binary for uploaded media.
    pub ffmpeg_bin: String,
    /// Ordered encoding preferences tried until one is retrievable.
    pub format_preferences: Vec<String>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            downloader_bin: "yt-dlp".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            format_preferences: vec![
                "bestaudio[ext=m4a]".to_string(),
                "bestaudio".to_string(),
                "best[ext=mp4]".to_string(),
            ],
        }
    }
}

/// Settings for the speech-to-text stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptionConfig {
    /// Base URL of the OpenAI-compatible transcription API.
    pub api_base: String,
    /// Environment variable holding the API key. The key itself never
    /// lives in the config file.
    pub api_key_env: String,
    /// Remote model identifier.
    pub model: String,
    /// Local fallback command; the audio path is appended as the last
    /// argument and the transcript is read from stdout.
    pub local_command: Vec<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "whisper-1".to_string(),
            local_command: vec!["whisper-cli".to_string(), "--no-timestamps".to_string()],
        }
    }
}

/// Settings for the thread-generation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    /// Base URL of the OpenAI-compatible chat API.
    pub api_base: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Remote model identifier.
    pub model: String,
    /// How many threads the remote model is asked for.
    pub thread_count: usize,
    /// Upper bound on the length of a single segment, in characters.
    pub max_segment_chars: usize,
    /// How many sentences the deterministic fallback generator keeps from
    /// the input before building its outline thread.
    pub fallback_sentence_cap: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            thread_count: 2,
            max_segment_chars: 280,
            fallback_sentence_cap: 8,
        }
    }
}

/// Per-stage timeouts in seconds. A stage exceeding its budget fails the
/// job with a timeout error instead of stalling its executor forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutConfig {
    pub acquire_secs: u64,
    pub transcribe_secs: u64,
    pub generate_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            acquire_secs: 600,
            transcribe_secs: 900,
            generate_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub acquisition: AcquisitionConfig,
    pub transcription: TranscriptionConfig,
    pub generation: GenerationConfig,
    pub timeouts: TimeoutConfig,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.acquisition.format_preferences.is_empty() {
        return Err(ConfigError::Validation {
            message: "acquisition.formatPreferences must not be empty".to_string(),
        });
    }

    if config.transcription.local_command.is_empty() {
        return Err(ConfigError::Validation {
            message: "transcription.localCommand must not be empty".to_string(),
        });
    }

    if config.generation.thread_count == 0 {
        return Err(ConfigError::Validation {
            message: "generation.threadCount must be at least 1".to_string(),
        });
    }

    if config.generation.max_segment_chars == 0 {
        return Err(ConfigError::Validation {
            message: "generation.maxSegmentChars must be at least 1".to_string(),
        });
    }

    if config.generation.fallback_sentence_cap == 0 {
        return Err(ConfigError::Validation {
            message: "generation.fallbackSentenceCap must be at least 1".to_string(),
        });
    }

    for (name, secs) in [
        ("timeouts.acquireSecs", config.timeouts.acquire_secs),
        ("timeouts.transcribeSecs", config.timeouts.transcribe_secs),
        ("timeouts.generateSecs", config.timeouts.generate_secs),
    ] {
        if secs == 0 {
            return Err(ConfigError::Validation {
                message: format!("{} must be at least 1", name),
            });
        }
    }

    Ok(())
}
