//! The dispatcher: accepts submissions, owns the job store, launches one
//! executor task per job and serves the status/result query surface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::error::{QueryError, SubmitError};
use crate::job::record::{Artifact, JobId, JobKind, JobRecord, JobStatus, JobStatusView, OwnerId};
use crate::job::store::JobStore;
use crate::pipeline::{Executor, StageSet};

/// Accepts jobs and exposes their progress.
///
/// Submission never blocks on pipeline work: the record is created, an
/// executor task is spawned, and the id is returned. The task's
/// `JoinHandle` is retained so jobs can be awaited or aborted later.
pub struct Dispatcher {
    store: Arc<JobStore>,
    executor: Arc<Executor>,
    handles: Mutex<HashMap<JobId, JoinHandle<()>>>,
}

impl Dispatcher {
    /// Builds a dispatcher around an injected stage set. Tests use this
    /// with fake adapters.
    pub fn new(stages: StageSet, config: &AppConfig) -> Self {
        let store = Arc::new(JobStore::new());
        let executor = Arc::new(Executor::new(
            Arc::clone(&store),
            Arc::new(stages),
            config.timeouts.clone(),
        ));
        Self {
            store,
            executor,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Production wiring: subprocess downloader/ffmpeg, remote
    /// transcription with local fallback, remote generation with outline
    /// fallback.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(StageSet::from_config(config), config)
    }

    /// The job store, for embedders that need direct read access.
    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Validates the submission, creates the job record and spawns its
    /// executor. Returns the job id immediately; all pipeline work happens
    /// in the spawned task.
    ///
    /// Handles of finished tasks are pruned here, so the map only tracks
    /// live tasks even when callers never `wait` or `abort`. Records are
    /// kept regardless.
    pub fn submit(&self, owner: OwnerId, kind: JobKind) -> Result<JobId, SubmitError> {
        validate_submission(&kind)?;

        let record = JobRecord::new(owner, kind);
        let id = self.store.create(record);
        info!("Submitted job {}", id);

        let executor = Arc::clone(&self.executor);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            executor.run(task_id).await;
        });

        let mut handles = match self.handles.lock() {
            Ok(handles) => handles,
            Err(poisoned) => {
                log::warn!("Dispatcher handle map was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        handles.retain(|_, h| !h.is_finished());
        handles.insert(id.clone(), handle);

        Ok(id)
    }

    /// Status view for polling callers. Owner-checked.
    pub fn status(&self, id: &JobId, owner: &OwnerId) -> Result<JobStatusView, QueryError> {
        let record = self.store.get(id).ok_or(QueryError::NotFound)?;
        if &record.owner != owner {
            return Err(QueryError::Unauthorized);
        }
        Ok(JobStatusView::from_record(&record))
    }

    /// Final artifacts for a completed job. Owner-checked; `NotReady`
    /// until the job reaches Completed.
    pub fn result(&self, id: &JobId, owner: &OwnerId) -> Result<Vec<Artifact>, QueryError> {
        let record = self.store.get(id).ok_or(QueryError::NotFound)?;
        if &record.owner != owner {
            return Err(QueryError::Unauthorized);
        }
        if record.status != JobStatus::Completed {
            return Err(QueryError::NotReady);
        }
        record.result.ok_or(QueryError::NotReady)
    }

    /// Awaits a job's executor task. A no-op for unknown or already
    /// awaited ids. Mainly for embedders draining work at shutdown and
    /// for tests.
    pub async fn wait(&self, id: &JobId) {
        let handle = match self.handles.lock() {
            Ok(mut handles) => handles.remove(id),
            Err(poisoned) => poisoned.into_inner().remove(id),
        };
        if let Some(handle) = handle {
            // An aborted task is the only way this errs; the record
            // already carries the job's outcome either way.
            let _ = handle.await;
            debug!("Job {} task finished", id);
        }
    }

    /// Best-effort cancellation: aborts the executor task at its next
    /// suspension point. The job's workdir is still cleaned up by its
    /// scoped guard. Returns false for unknown or finished ids.
    pub fn abort(&self, id: &JobId) -> bool {
        let handle = match self.handles.lock() {
            Ok(mut handles) => handles.remove(id),
            Err(poisoned) => poisoned.into_inner().remove(id),
        };
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

/// Checks that the payload required by the kind is present and plausible.
/// Runs synchronously, before any record exists.
fn validate_submission(kind: &JobKind) -> Result<(), SubmitError> {
    match kind {
        JobKind::SourceUrl { url } => {
            if url.trim().is_empty() {
                return Err(SubmitError::Validation("Source URL required".to_string()));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(SubmitError::Validation(format!(
                    "Source URL must be http(s), got '{}'",
                    url
                )));
            }
        }
        JobKind::UploadedMedia { file_path } => {
            if !file_path.is_file() {
                return Err(SubmitError::Validation(format!(
                    "Uploaded file does not exist: {}",
                    file_path.display()
                )));
            }
        }
        JobKind::RawText { text } => {
            if text.trim().is_empty() {
                return Err(SubmitError::Validation("Article text required".to_string()));
            }
        }
    }
    Ok(())
}
