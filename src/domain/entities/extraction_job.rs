use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle of an extraction job.
///
/// `Pending -> Running -> {Completed | Failed | Terminated}`, with no
/// transition out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Terminated,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Terminated
        )
    }
}

/// The two artifacts a completed extraction produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Flat (entity, field) metadata table
    Metadata,
    /// Diagram-tool-compatible relational table
    Relational,
}

/// Paths of the artifacts produced by a completed job
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionArtifacts {
    pub metadata_file: PathBuf,
    pub relational_file: PathBuf,
}

impl ExtractionArtifacts {
    pub fn path(&self, kind: ArtifactKind) -> &PathBuf {
        match kind {
            ArtifactKind::Metadata => &self.metadata_file,
            ArtifactKind::Relational => &self.relational_file,
        }
    }
}

/// One timestamped line of a job's log
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Append-only log with a bounded capacity: once full, the oldest
/// entries are evicted first.
#[derive(Debug, Clone)]
pub struct BoundedLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl BoundedLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn append(&mut self, message: String) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            at: Utc::now(),
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// One background extraction run, owned exclusively by the job registry.
///
/// The orchestrator only ever holds the job id and talks back to the
/// registry; it never mutates the job directly.
#[derive(Debug)]
pub struct ExtractionJob {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub log: BoundedLog,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<ExtractionArtifacts>,
    pub error: Option<String>,
    pub cancel_requested: bool,
}

impl ExtractionJob {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            status: JobStatus::Pending,
            log: BoundedLog::new(log_capacity),
            created_at: Utc::now(),
            finished_at: None,
            result: None,
            error: None,
            cancel_requested: false,
        }
    }

    /// Immutable copy handed out to status pollers
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id,
            status: self.status,
            log: self.log.to_vec(),
            created_at: self.created_at,
            finished_at: self.finished_at,
            result: self.result.clone(),
            error: self.error.clone(),
            cancel_requested: self.cancel_requested,
        }
    }
}

/// Point-in-time copy of a job's state, safe to hand across task boundaries
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub log: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<ExtractionArtifacts>,
    pub error: Option<String>,
    pub cancel_requested: bool,
}
