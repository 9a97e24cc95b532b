use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::configuration::MetadataApiSettings;
use crate::domain::entities::extraction_job::ExtractionArtifacts;
use crate::domain::services::export_encoder::{
    build_flat_rows, build_relational_rows, encode_flat_csv, encode_relational_csv,
};
use crate::domain::services::relationship_resolver::resolve_relationships;
use crate::helper::error_chain_fmt;
use crate::ports::metadata_client::{MetadataClient, MetadataClientError};
use crate::ports::progress_sink::ProgressSink;
use crate::repositories::artifact_file_repository::{
    ArtifactFileRepository, ArtifactFileRepositoryError,
};
use crate::repositories::job_in_memory_repository::{JobInMemoryRepository, JobRegistryError};
use crate::use_cases::fetch_entity_schemas::{fetch_entity_schemas, FetchEntitySchemasError};

/// Runs one extraction to its terminal status.
///
/// Spawned through the registry's `run`; everything that can go wrong is
/// absorbed here and written back to the job, so the spawned task itself
/// never fails.
#[tracing::instrument(
    name = "Running extraction job",
    skip(registry, client, api_settings, artifact_repository, cancellation)
)]
pub async fn run_extraction(
    registry: Arc<JobInMemoryRepository>,
    job_id: Uuid,
    client: Arc<dyn MetadataClient>,
    api_settings: MetadataApiSettings,
    artifact_repository: Arc<ArtifactFileRepository>,
    namespace_filter: Option<String>,
    cancellation: CancellationToken,
) {
    let outcome = execute(
        &registry,
        job_id,
        client.as_ref(),
        &api_settings,
        &artifact_repository,
        namespace_filter.as_deref(),
        &cancellation,
    )
    .await;

    let transition = match outcome {
        Ok(artifacts) => {
            info!(%job_id, "Extraction completed");
            let _ = registry.append_log(job_id, "Extraction completed".to_string());
            registry.complete_job(job_id, artifacts)
        }
        Err(RunExtractionError::Cancelled) => {
            info!(%job_id, "Extraction terminated on request");
            let _ = registry.append_log(job_id, "Extraction terminated on request".to_string());
            registry.terminate_job(job_id)
        }
        Err(e) => {
            error!(%job_id, error = ?e, "Extraction failed");
            let _ = registry.append_log(job_id, format!("Extraction failed: {}", e));
            registry.fail_job(job_id, e.to_string())
        }
    };

    if let Err(e) = transition {
        error!(%job_id, error = ?e, "Could not record the job's terminal status");
    }
}

async fn execute(
    registry: &JobInMemoryRepository,
    job_id: Uuid,
    client: &dyn MetadataClient,
    api_settings: &MetadataApiSettings,
    artifact_repository: &ArtifactFileRepository,
    namespace_filter: Option<&str>,
    cancellation: &CancellationToken,
) -> Result<ExtractionArtifacts, RunExtractionError> {
    let sink = registry.log_sink(job_id)?;
    sink.log("Starting extraction".to_string());

    let entities =
        fetch_entity_schemas(client, api_settings, namespace_filter, &sink, cancellation).await?;

    if cancellation.is_cancelled() {
        return Err(RunExtractionError::Cancelled);
    }

    let resolved = resolve_relationships(&entities);
    for unresolved in &resolved.unresolved_references {
        warn!(
            from_entity = %unresolved.from_entity,
            from_field = %unresolved.from_field,
            missing_target = %unresolved.missing_target,
            "Reference target is not part of the fetched set"
        );
        sink.log(format!(
            "Unresolvable reference {}.{} -> {}",
            unresolved.from_entity, unresolved.from_field, unresolved.missing_target
        ));
    }
    sink.log(format!(
        "Resolved {} relationships across {} entities",
        resolved.relationships.len(),
        entities.len()
    ));

    if cancellation.is_cancelled() {
        return Err(RunExtractionError::Cancelled);
    }

    let metadata_csv = encode_flat_csv(&build_flat_rows(&entities));
    let relational_csv =
        encode_relational_csv(&build_relational_rows(&entities, &resolved.relationships));

    let artifacts = artifact_repository
        .store(namespace_filter, &metadata_csv, &relational_csv)
        .await?;

    Ok(artifacts)
}

#[derive(thiserror::Error)]
pub enum RunExtractionError {
    #[error("Extraction was terminated on request")]
    Cancelled,
    #[error(transparent)]
    Client(#[from] MetadataClientError),
    #[error(transparent)]
    Artifacts(#[from] ArtifactFileRepositoryError),
    #[error(transparent)]
    Registry(#[from] JobRegistryError),
}

impl From<FetchEntitySchemasError> for RunExtractionError {
    fn from(error: FetchEntitySchemasError) -> Self {
        match error {
            FetchEntitySchemasError::Cancelled => RunExtractionError::Cancelled,
            FetchEntitySchemasError::Client(e) => RunExtractionError::Client(e),
        }
    }
}

impl std::fmt::Debug for RunExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
