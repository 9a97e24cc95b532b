use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::configuration::{MetadataApiSettings, Settings};
use crate::domain::entities::extraction_job::{ArtifactKind, JobSnapshot, JobStatus};
use crate::helper::error_chain_fmt;
use crate::ports::metadata_client::MetadataClient;
use crate::repositories::artifact_file_repository::{
    ArtifactFileRepository, ArtifactFileRepositoryError,
};
use crate::repositories::job_in_memory_repository::{JobInMemoryRepository, JobRegistryError};
use crate::use_cases::run_extraction::run_extraction;

/// Holds the wired application: job registry, artifact store and the
/// metadata API settings shared by every extraction
pub struct Application {
    metadata_api_settings: MetadataApiSettings,
    job_registry: Arc<JobInMemoryRepository>,
    artifact_repository: Arc<ArtifactFileRepository>,
}

impl Application {
    #[tracing::instrument(name = "Building application", skip(settings))]
    pub async fn build(settings: Settings) -> Result<Self, ApplicationError> {
        let job_registry = Arc::new(JobInMemoryRepository::new(
            settings.application.max_log_entries,
        ));
        let artifact_repository = Arc::new(ArtifactFileRepository::new(
            &settings.application.output_dir,
        ));
        artifact_repository.ensure_output_dir().await?;

        Ok(Self {
            metadata_api_settings: settings.metadata_api,
            job_registry,
            artifact_repository,
        })
    }

    /// Allocates a job and spawns its extraction, returning the job id
    /// immediately.
    ///
    /// The client handle is owned by this one job; the caller authenticates
    /// and hands it over per extraction.
    #[tracing::instrument(name = "Starting extraction", skip(self, client))]
    pub fn start_extraction(
        &self,
        client: Arc<dyn MetadataClient>,
        namespace_filter: Option<String>,
    ) -> Result<Uuid, JobRegistryError> {
        let job_id = self.job_registry.create_job().job_id;

        let registry = Arc::clone(&self.job_registry);
        let artifact_repository = Arc::clone(&self.artifact_repository);
        let api_settings = self.metadata_api_settings.clone();

        self.job_registry.run(job_id, move |cancellation| {
            run_extraction(
                registry,
                job_id,
                client,
                api_settings,
                artifact_repository,
                namespace_filter,
                cancellation,
            )
        })?;

        Ok(job_id)
    }

    pub fn job_status(&self, job_id: Uuid) -> Result<JobSnapshot, JobRegistryError> {
        self.job_registry.get_status(job_id)
    }

    pub fn request_termination(&self, job_id: Uuid) -> Result<JobSnapshot, JobRegistryError> {
        self.job_registry.request_termination(job_id)
    }

    pub fn evict_job(&self, job_id: Uuid) -> Result<(), JobRegistryError> {
        self.job_registry.evict_job(job_id)
    }

    pub async fn wait_until_terminal(&self, job_id: Uuid) -> Result<JobSnapshot, JobRegistryError> {
        self.job_registry.wait_until_terminal(job_id).await
    }

    /// Path of one produced artifact, available once the job completed
    pub fn artifact_path(
        &self,
        job_id: Uuid,
        kind: ArtifactKind,
    ) -> Result<Option<PathBuf>, JobRegistryError> {
        let snapshot = self.job_registry.get_status(job_id)?;
        if snapshot.status != JobStatus::Completed {
            return Ok(None);
        }
        Ok(snapshot.result.map(|artifacts| artifacts.path(kind).clone()))
    }
}

#[derive(thiserror::Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Artifacts(#[from] ArtifactFileRepositoryError),
}

impl std::fmt::Debug for ApplicationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
