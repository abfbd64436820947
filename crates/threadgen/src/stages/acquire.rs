//! Media acquisition: remote fetch via an external downloader and audio
//! extraction via ffmpeg. Both are opaque external operations; this module
//! only orchestrates them and applies the fallback policy.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{AcquiredAudio, MediaAcquirer};
use crate::config::AcquisitionConfig;

/// Fatal failures of the remote-fetch path.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("Failed to run '{bin}': {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No retrievable audio encoding for '{url}'")]
    NoPlayableStream { url: String },

    #[error("Downloader reported success but produced no audio file")]
    MissingOutput,
}

/// Fatal failures of the local-extraction path.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to run '{bin}': {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Audio extraction failed for both target formats: {stderr}")]
    AllFormatsFailed { stderr: String },
}

/// Decodes subprocess stderr and truncates it so error messages stay
/// loggable.
fn truncate_stderr(stderr: &[u8]) -> String {
    super::truncate_detail(&String::from_utf8_lossy(stderr))
}

/// Subprocess-backed acquirer: `yt-dlp` (or compatible) for remote
/// sources, `ffmpeg` for uploaded media.
pub struct CommandAcquirer {
    config: AcquisitionConfig,
}

impl CommandAcquirer {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self { config }
    }

    /// Finds the downloaded audio file in the workdir. The downloader is
    /// told to write `audio.<ext>` plus `audio.info.json`.
    fn find_audio_output(workdir: &Path) -> Option<PathBuf> {
        let entries = std::fs::read_dir(workdir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("audio.")
                && !name.ends_with(".info.json")
                && !name.ends_with(".part")
            {
                return Some(path);
            }
        }
        None
    }

    /// Reads the source title from the downloader's info JSON, if present.
    fn read_title(workdir: &Path) -> Option<String> {
        let raw = std::fs::read_to_string(workdir.join("audio.info.json")).ok()?;
        let info: serde_json::Value = serde_json::from_str(&raw).ok()?;
        info.get("title")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
    }

    async fn try_fetch_format(
        &self,
        url: &str,
        format: &str,
        workdir: &Path,
    ) -> Result<bool, AcquireError> {
        let output = Command::new(&self.config.downloader_bin)
            .arg("-f")
            .arg(format)
            .arg("--no-playlist")
            .arg("--write-info-json")
            .arg("-o")
            .arg("audio.%(ext)s")
            .arg(url)
            .current_dir(workdir)
            .output()
            .await
            .map_err(|e| AcquireError::Spawn {
                bin: self.config.downloader_bin.clone(),
                source: e,
            })?;

        if output.status.success() {
            Ok(true)
        } else {
            warn!(
                format,
                stderr = %truncate_stderr(&output.stderr),
                "Downloader failed for format, trying next preference"
            );
            Ok(false)
        }
    }

    async fn try_extract_format(
        &self,
        media: &Path,
        target: &Path,
    ) -> Result<Option<String>, ExtractError> {
        let output = Command::new(&self.config.ffmpeg_bin)
            .arg("-i")
            .arg(media)
            .arg("-ab")
            .arg("160k")
            .arg("-ac")
            .arg("2")
            .arg("-ar")
            .arg("44100")
            .arg("-vn")
            .arg(target)
            .arg("-y")
            .output()
            .await
            .map_err(|e| ExtractError::Spawn {
                bin: self.config.ffmpeg_bin.clone(),
                source: e,
            })?;

        if output.status.success() {
            Ok(None)
        } else {
            Ok(Some(truncate_stderr(&output.stderr)))
        }
    }
}

#[async_trait]
impl MediaAcquirer for CommandAcquirer {
    async fn fetch(&self, url: &str, workdir: &Path) -> Result<AcquiredAudio, AcquireError> {
        for format in &self.config.format_preferences {
            if self.try_fetch_format(url, format, workdir).await? {
                let path = Self::find_audio_output(workdir).ok_or(AcquireError::MissingOutput)?;
                let title = Self::read_title(workdir);
                debug!(format, path = %path.display(), "Fetched remote audio");
                return Ok(AcquiredAudio { path, title });
            }
        }

        Err(AcquireError::NoPlayableStream {
            url: url.to_string(),
        })
    }

    async fn extract(&self, media: &Path, workdir: &Path) -> Result<AcquiredAudio, ExtractError> {
        // Primary target format, then one retry against the secondary.
        let wav_target = workdir.join("extracted.wav");
        let primary_stderr = match self.try_extract_format(media, &wav_target).await? {
            None => {
                return Ok(AcquiredAudio {
                    path: wav_target,
                    title: None,
                })
            }
            Some(stderr) => stderr,
        };

        warn!(
            stderr = %primary_stderr,
            "WAV extraction failed, retrying as MP3"
        );

        let mp3_target = workdir.join("extracted.mp3");
        match self.try_extract_format(media, &mp3_target).await? {
            None => Ok(AcquiredAudio {
                path: mp3_target,
                title: None,
            }),
            Some(stderr) => Err(ExtractError::AllFormatsFailed { stderr }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Writes an executable shell script into `dir` and returns its path.
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{}", body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn acquirer_with(downloader: &Path, ffmpeg: &Path, formats: &[&str]) -> CommandAcquirer {
        CommandAcquirer::new(AcquisitionConfig {
            downloader_bin: downloader.to_string_lossy().to_string(),
            ffmpeg_bin: ffmpeg.to_string_lossy().to_string(),
            format_preferences: formats.iter().map(|f| f.to_string()).collect(),
        })
    }

    #[test]
    fn test_truncate_stderr() {
        let short = truncate_stderr(b"ffmpeg: no such file\n");
        assert_eq!(short, "ffmpeg: no such file");

        let long = truncate_stderr("x".repeat(500).as_bytes());
        assert!(long.ends_with("... (truncated)"));
        assert!(long.len() < 250);
    }

    #[test]
    fn test_find_audio_output_skips_metadata() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("audio.info.json"), "{}").unwrap();
        std::fs::write(dir.path().join("audio.m4a.part"), b"").unwrap();
        assert!(CommandAcquirer::find_audio_output(dir.path()).is_none());

        std::fs::write(dir.path().join("audio.m4a"), b"data").unwrap();
        let found = CommandAcquirer::find_audio_output(dir.path()).unwrap();
        assert!(found.to_string_lossy().ends_with("audio.m4a"));
    }

    #[tokio::test]
    async fn test_fetch_falls_back_through_formats() {
        let bin_dir = TempDir::new().unwrap();
        let workdir = TempDir::new().unwrap();

        // Fails for the first format, succeeds for the second.
        let downloader = write_script(
            bin_dir.path(),
            "fake-dl",
            r#"case "$2" in
  bestaudio)
    printf '{"title": "Test Video"}' > audio.info.json
    printf 'audio' > audio.m4a
    exit 0 ;;
  *)
    echo "format unavailable" >&2
    exit 1 ;;
esac"#,
        );
        let ffmpeg = write_script(bin_dir.path(), "fake-ffmpeg", "exit 0");

        let acquirer = acquirer_with(&downloader, &ffmpeg, &["bestaudio[ext=m4a]", "bestaudio"]);
        let audio = acquirer
            .fetch("https://example.com/watch?v=abc", workdir.path())
            .await
            .unwrap();

        assert!(audio.path.to_string_lossy().ends_with("audio.m4a"));
        assert_eq!(audio.title.as_deref(), Some("Test Video"));
    }

    #[tokio::test]
    async fn test_fetch_exhausted_preferences() {
        let bin_dir = TempDir::new().unwrap();
        let workdir = TempDir::new().unwrap();

        let downloader = write_script(bin_dir.path(), "fake-dl", "echo nope >&2; exit 1");
        let ffmpeg = write_script(bin_dir.path(), "fake-ffmpeg", "exit 0");

        let acquirer = acquirer_with(&downloader, &ffmpeg, &["bestaudio", "best"]);
        let result = acquirer
            .fetch("https://example.com/watch?v=abc", workdir.path())
            .await;

        assert!(matches!(
            result,
            Err(AcquireError::NoPlayableStream { url }) if url.contains("watch?v=abc")
        ));
    }

    #[tokio::test]
    async fn test_extract_retries_mp3_then_fails() {
        let bin_dir = TempDir::new().unwrap();
        let workdir = TempDir::new().unwrap();

        let downloader = write_script(bin_dir.path(), "fake-dl", "exit 0");
        let ffmpeg = write_script(bin_dir.path(), "fake-ffmpeg", "echo broken >&2; exit 1");

        let acquirer = acquirer_with(&downloader, &ffmpeg, &["bestaudio"]);
        let media = workdir.path().join("talk.mp4");
        std::fs::write(&media, b"video").unwrap();

        let result = acquirer.extract(&media, workdir.path()).await;
        assert!(matches!(
            result,
            Err(ExtractError::AllFormatsFailed { stderr }) if stderr.contains("broken")
        ));
    }

    #[tokio::test]
    async fn test_extract_secondary_format_succeeds() {
        let bin_dir = TempDir::new().unwrap();
        let workdir = TempDir::new().unwrap();

        let downloader = write_script(bin_dir.path(), "fake-dl", "exit 0");
        // Fails when the target ends in .wav, succeeds for .mp3. The target
        // path is the second-to-last argument (followed by -y).
        let ffmpeg = write_script(
            bin_dir.path(),
            "fake-ffmpeg",
            r#"for arg in "$@"; do
  case "$arg" in
    *.wav) echo "wav unsupported" >&2; exit 1 ;;
    *.mp3) touch "$arg"; exit 0 ;;
  esac
done
exit 1"#,
        );

        let acquirer = acquirer_with(&downloader, &ffmpeg, &["bestaudio"]);
        let media = workdir.path().join("talk.mov");
        std::fs::write(&media, b"video").unwrap();

        let audio = acquirer.extract(&media, workdir.path()).await.unwrap();
        assert!(audio.path.to_string_lossy().ends_with("extracted.mp3"));
        assert!(audio.title.is_none());
    }
}
