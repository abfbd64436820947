//! The pipeline executor: one instance runs one job from Processing to a
//! terminal state. All stage work happens here, inside the job's own task.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info_span, warn, Instrument};

use crate::config::{AppConfig, TimeoutConfig};
use crate::error::StageError;
use crate::job::record::{Artifact, JobId, JobKind};
use crate::job::store::JobStore;
use crate::stages::{
    AcquiredAudio, CommandAcquirer, ContentGenerator, FallbackTranscriber, GracefulGenerator,
    MediaAcquirer, Transcriber,
};

/// The three stage adapters the executor drives. Production wiring uses
/// the subprocess/remote implementations; tests inject fakes.
pub struct StageSet {
    pub acquirer: Box<dyn MediaAcquirer>,
    pub transcriber: Box<dyn Transcriber>,
    pub generator: Box<dyn ContentGenerator>,
}

impl StageSet {
    /// Production adapters: subprocess acquisition, remote transcription
    /// with a local CLI fallback, remote generation with an outline
    /// fallback.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            acquirer: Box::new(CommandAcquirer::new(config.acquisition.clone())),
            transcriber: Box::new(FallbackTranscriber::from_config(&config.transcription)),
            generator: Box::new(GracefulGenerator::from_config(&config.generation)),
        }
    }
}

/// Runs the ordered stage sequence for one job, updating progress and the
/// terminal state in the store. Exactly one executor task exists per job;
/// it is the only writer of that job's record.
pub struct Executor {
    store: Arc<JobStore>,
    stages: Arc<StageSet>,
    timeouts: TimeoutConfig,
}

impl Executor {
    pub fn new(store: Arc<JobStore>, stages: Arc<StageSet>, timeouts: TimeoutConfig) -> Self {
        Self {
            store,
            stages,
            timeouts,
        }
    }

    /// Runs the job to a terminal state. Infallible from the caller's
    /// perspective: every failure ends up on the record, never here.
    pub async fn run(&self, job_id: JobId) {
        let span = info_span!("pipeline", job_id = %job_id);
        self.run_inner(&job_id).instrument(span).await;
    }

    async fn run_inner(&self, job_id: &JobId) {
        let Some(record) = self.store.get(job_id) else {
            warn!("Executor started for unknown job");
            return;
        };
        let kind = record.kind.clone();

        self.store.update(job_id, |r| r.mark_processing());

        // Scoped workdir: dropping it at the end of this function is the
        // cleanup guarantee for downloaded and extracted audio, on success
        // and failure alike.
        let workdir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                self.store
                    .update(job_id, |r| r.fail(format!("Failed to create workdir: {e}")));
                return;
            }
        };

        let outcome = self.run_stages(job_id, &kind, workdir.path()).await;

        match outcome {
            Ok(artifacts) => {
                self.store.update(job_id, |r| r.complete(artifacts));
            }
            Err(e) => {
                warn!(error = %e, "Pipeline failed");
                self.store.update(job_id, |r| r.fail(e.to_string()));
            }
        }

        // The uploaded source file is released after the terminal
        // transition regardless of outcome.
        if let JobKind::UploadedMedia { file_path } = &kind {
            if let Err(e) = tokio::fs::remove_file(file_path).await {
                warn!(path = %file_path.display(), error = %e, "Failed to remove uploaded file");
            }
        }
    }

    /// The per-kind stage sequence with its progress milestones.
    async fn run_stages(
        &self,
        job_id: &JobId,
        kind: &JobKind,
        workdir: &Path,
    ) -> Result<Vec<Artifact>, StageError> {
        match kind {
            JobKind::SourceUrl { url } => {
                self.advance(job_id, 30);
                let audio = self.step_fetch(url, workdir).await?;
                self.advance(job_id, 60);
                let transcript = self.step_transcribe(&audio.path).await?;
                self.advance(job_id, 80);
                self.step_generate(&transcript, audio.title.as_deref())
                    .await
            }
            JobKind::UploadedMedia { file_path } => {
                self.advance(job_id, 40);
                let audio = self.step_extract(file_path, workdir).await?;
                self.advance(job_id, 60);
                let transcript = self.step_transcribe(&audio.path).await?;
                self.advance(job_id, 80);
                self.step_generate(&transcript, None).await
            }
            JobKind::RawText { text } => {
                self.advance(job_id, 50);
                self.step_generate(text, None).await
            }
        }
    }

    fn advance(&self, job_id: &JobId, progress: u8) {
        self.store.update(job_id, |r| r.advance_progress(progress));
    }

    async fn step_fetch(&self, url: &str, workdir: &Path) -> Result<AcquiredAudio, StageError> {
        bounded(
            self.timeouts.acquire_secs,
            "acquire",
            self.stages.acquirer.fetch(url, workdir),
        )
        .instrument(info_span!("acquire"))
        .await
    }

    async fn step_extract(
        &self,
        media: &Path,
        workdir: &Path,
    ) -> Result<AcquiredAudio, StageError> {
        bounded(
            self.timeouts.acquire_secs,
            "extract_audio",
            self.stages.acquirer.extract(media, workdir),
        )
        .instrument(info_span!("extract_audio"))
        .await
    }

    async fn step_transcribe(&self, audio: &Path) -> Result<String, StageError> {
        bounded(
            self.timeouts.transcribe_secs,
            "transcribe",
            self.stages.transcriber.transcribe(audio),
        )
        .instrument(info_span!("transcribe"))
        .await
    }

    async fn step_generate(
        &self,
        text: &str,
        title: Option<&str>,
    ) -> Result<Vec<Artifact>, StageError> {
        bounded(
            self.timeouts.generate_secs,
            "generate",
            self.stages.generator.generate(text, title),
        )
        .instrument(info_span!("generate"))
        .await
    }
}

/// Wraps a stage call in its configured timeout. A stage exceeding its
/// budget is a fatal timeout rather than an indefinitely stalled job.
async fn bounded<T, E>(
    secs: u64,
    stage: &'static str,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, StageError>
where
    StageError: From<E>,
{
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(StageError::Timeout {
            stage,
            seconds: secs,
        }),
    }
}
