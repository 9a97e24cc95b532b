use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::entities::extraction_job::{
    ExtractionArtifacts, ExtractionJob, JobSnapshot, JobStatus,
};
use crate::helper::error_chain_fmt;
use crate::ports::progress_sink::ProgressSink;

/// In-memory registry of extraction jobs.
///
/// All state lives in this process: nothing survives a restart. Each job is
/// guarded by its own lock so status polls on one job never contend with
/// log appends on another.
pub struct JobInMemoryRepository {
    jobs: RwLock<HashMap<Uuid, Arc<JobHandle>>>,
    log_capacity: usize,
}

struct JobHandle {
    state: Mutex<ExtractionJob>,
    cancellation: CancellationToken,
    finished: tokio::sync::Notify,
}

impl JobHandle {
    // A poisoned job lock only means a panic mid-update; the job state
    // itself stays usable, so recover the guard instead of propagating.
    fn lock(&self) -> MutexGuard<'_, ExtractionJob> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl JobInMemoryRepository {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            log_capacity,
        }
    }

    fn handle(&self, job_id: Uuid) -> Result<Arc<JobHandle>, JobRegistryError> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .cloned()
            .ok_or(JobRegistryError::NotFound(job_id))
    }

    /// Registers a new job in `Pending` status and returns its snapshot
    pub fn create_job(&self) -> JobSnapshot {
        let job = ExtractionJob::new(self.log_capacity);
        let snapshot = job.snapshot();

        let handle = Arc::new(JobHandle {
            state: Mutex::new(job),
            cancellation: CancellationToken::new(),
            finished: tokio::sync::Notify::new(),
        });
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(snapshot.job_id, handle);

        snapshot
    }

    /// Moves a job from `Pending` to `Running` and hands back its
    /// cancellation token.
    ///
    /// At most one caller can win this transition, which is what keeps a job
    /// from being run twice.
    pub fn begin_run(&self, job_id: Uuid) -> Result<CancellationToken, JobRegistryError> {
        let handle = self.handle(job_id)?;
        let mut job = handle.lock();

        match job.status {
            JobStatus::Pending => {
                job.status = JobStatus::Running;
                Ok(handle.cancellation.clone())
            }
            JobStatus::Running => Err(JobRegistryError::AlreadyRunning(job_id)),
            _ => Err(JobRegistryError::AlreadyTerminal(job_id)),
        }
    }

    /// Wins the `Pending` to `Running` transition and spawns `work` as a
    /// background task with the job's cancellation token
    pub fn run<F, Fut>(&self, job_id: Uuid, work: F) -> Result<(), JobRegistryError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancellation = self.begin_run(job_id)?;
        tokio::spawn(work(cancellation));
        Ok(())
    }

    pub fn get_status(&self, job_id: Uuid) -> Result<JobSnapshot, JobRegistryError> {
        Ok(self.handle(job_id)?.lock().snapshot())
    }

    pub fn append_log(&self, job_id: Uuid, message: String) -> Result<(), JobRegistryError> {
        self.handle(job_id)?.lock().log.append(message);
        Ok(())
    }

    /// Flags the job for cooperative termination.
    ///
    /// The running extraction observes the flag at its next checkpoint; this
    /// call never interrupts an in-flight API request. Idempotent: a job that
    /// already finished stays untouched and its snapshot is returned, only an
    /// unknown id fails.
    pub fn request_termination(&self, job_id: Uuid) -> Result<JobSnapshot, JobRegistryError> {
        let handle = self.handle(job_id)?;
        let mut job = handle.lock();

        if job.status.is_terminal() {
            return Ok(job.snapshot());
        }

        job.cancel_requested = true;
        handle.cancellation.cancel();
        Ok(job.snapshot())
    }

    pub fn complete_job(
        &self,
        job_id: Uuid,
        artifacts: ExtractionArtifacts,
    ) -> Result<(), JobRegistryError> {
        self.finish(job_id, |job| {
            job.status = JobStatus::Completed;
            job.result = Some(artifacts);
        })
    }

    pub fn fail_job(&self, job_id: Uuid, error: String) -> Result<(), JobRegistryError> {
        self.finish(job_id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error);
        })
    }

    pub fn terminate_job(&self, job_id: Uuid) -> Result<(), JobRegistryError> {
        self.finish(job_id, |job| {
            job.status = JobStatus::Terminated;
        })
    }

    fn finish(
        &self,
        job_id: Uuid,
        apply: impl FnOnce(&mut ExtractionJob),
    ) -> Result<(), JobRegistryError> {
        let handle = self.handle(job_id)?;
        {
            let mut job = handle.lock();
            if job.status.is_terminal() {
                return Err(JobRegistryError::AlreadyTerminal(job_id));
            }
            apply(&mut job);
            job.finished_at = Some(Utc::now());
        }
        handle.finished.notify_waiters();
        Ok(())
    }

    /// Resolves once the job reaches a terminal status
    pub async fn wait_until_terminal(&self, job_id: Uuid) -> Result<JobSnapshot, JobRegistryError> {
        let handle = self.handle(job_id)?;
        loop {
            // Arm the notification before checking, so a transition between
            // the check and the await is not missed
            let notified = handle.finished.notified();
            {
                let job = handle.lock();
                if job.status.is_terminal() {
                    return Ok(job.snapshot());
                }
            }
            notified.await;
        }
    }

    /// Removes a finished job from the registry.
    ///
    /// Live jobs cannot be evicted: a running extraction still writes back
    /// through its handle.
    pub fn evict_job(&self, job_id: Uuid) -> Result<(), JobRegistryError> {
        let handle = self.handle(job_id)?;
        if !handle.lock().status.is_terminal() {
            return Err(JobRegistryError::StillLive(job_id));
        }

        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&job_id);
        Ok(())
    }

    /// A progress sink that appends into the given job's bounded log
    pub fn log_sink(&self, job_id: Uuid) -> Result<JobLogSink, JobRegistryError> {
        Ok(JobLogSink {
            handle: self.handle(job_id)?,
        })
    }
}

/// [`ProgressSink`] bound to one job of the registry
pub struct JobLogSink {
    handle: Arc<JobHandle>,
}

impl ProgressSink for JobLogSink {
    fn log(&self, message: String) {
        self.handle.lock().log.append(message);
    }
}

#[derive(thiserror::Error)]
pub enum JobRegistryError {
    #[error("No job registered with id {0}")]
    NotFound(Uuid),
    #[error("Job {0} is already running")]
    AlreadyRunning(Uuid),
    #[error("Job {0} already reached a terminal status")]
    AlreadyTerminal(Uuid),
    #[error("Job {0} has not finished and cannot be evicted")]
    StillLive(Uuid),
}

impl std::fmt::Debug for JobRegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
