use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::configuration::MetadataApiSettings;
use crate::domain::entities::entity_schema::{entity_in_namespace, EntitySchema};
use crate::domain::entities::field_descriptor::FieldDescriptor;
use crate::helper::error_chain_fmt;
use crate::ports::metadata_client::{MetadataClient, MetadataClientError};
use crate::ports::progress_sink::ProgressSink;

/// Fetches the full entity schema set from the metadata API.
///
/// Discovery first walks every listing page and applies the filters, so the
/// total is known before the first describe call; field-level describes then
/// run one entity at a time with progress lines through `progress`.
///
/// Each call re-executes pagination from the start; nothing is cached
/// between runs.
#[tracing::instrument(
    name = "Fetching entity schemas",
    skip(client, settings, progress, cancellation)
)]
pub async fn fetch_entity_schemas(
    client: &dyn MetadataClient,
    settings: &MetadataApiSettings,
    namespace_filter: Option<&str>,
    progress: &dyn ProgressSink,
    cancellation: &CancellationToken,
) -> Result<Vec<EntitySchema>, FetchEntitySchemasError> {
    let names = discover_entity_names(client, namespace_filter, cancellation).await?;
    let total = names.len();
    progress.log(format!("Discovered {} entities to describe", total));

    let mut schemas = Vec::with_capacity(total);
    for (index, name) in names.into_iter().enumerate() {
        if cancellation.is_cancelled() {
            return Err(FetchEntitySchemasError::Cancelled);
        }
        progress.log(format!("Processing entity {}/{}: {}", index + 1, total, name));

        match describe_with_retry(client, settings, &name, cancellation).await {
            Ok(fields) => schemas.push(EntitySchema::new(name, fields)),
            Err(DescribeOutcome::Cancelled) => return Err(FetchEntitySchemasError::Cancelled),
            Err(DescribeOutcome::Fatal(error)) => return Err(error.into()),
            Err(DescribeOutcome::Skipped(error)) => {
                warn!(?error, entity_name = %name, "Skipping entity after describe failure");
                progress.log(format!("Skipping entity {}: {}", name, error));
            }
        }
    }

    Ok(schemas)
}

/// Walks every listing page and keeps the names passing the filters.
///
/// Non-queryable entities and `__`-prefixed system names are dropped before
/// the namespace filter; an empty or absent namespace keeps everything.
async fn discover_entity_names(
    client: &dyn MetadataClient,
    namespace_filter: Option<&str>,
    cancellation: &CancellationToken,
) -> Result<Vec<String>, FetchEntitySchemasError> {
    let namespace = namespace_filter.filter(|namespace| !namespace.is_empty());

    let mut names = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        if cancellation.is_cancelled() {
            return Err(FetchEntitySchemasError::Cancelled);
        }

        let page = client.list_entities(cursor.as_deref()).await?;
        for stub in page.entities {
            if !stub.queryable || stub.name.starts_with("__") {
                continue;
            }
            if let Some(namespace) = namespace {
                if !entity_in_namespace(&stub.name, namespace) {
                    continue;
                }
            }
            names.push(stub.name);
        }

        match page.next_page {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(names)
}

enum DescribeOutcome {
    /// Retries exhausted or the failure is not worth retrying
    Skipped(MetadataClientError),
    /// Credentials rejected, the whole run must stop
    Fatal(MetadataClientError),
    Cancelled,
}

/// One describe call with bounded retry on transient failures.
///
/// The backoff doubles on each attempt, starting from the configured value,
/// and stays cancellation-aware while sleeping.
async fn describe_with_retry(
    client: &dyn MetadataClient,
    settings: &MetadataApiSettings,
    entity_name: &str,
    cancellation: &CancellationToken,
) -> Result<Vec<FieldDescriptor>, DescribeOutcome> {
    let mut backoff = settings.describe_retry_backoff();
    let mut remaining_retries = settings.max_describe_retries;

    loop {
        match client.describe_entity(entity_name).await {
            Ok(fields) => return Ok(fields),
            Err(error @ MetadataClientError::Authentication(_)) => {
                return Err(DescribeOutcome::Fatal(error));
            }
            Err(error @ MetadataClientError::Api(_)) => {
                return Err(DescribeOutcome::Skipped(error));
            }
            Err(error @ MetadataClientError::Transient(_)) => {
                if remaining_retries == 0 {
                    return Err(DescribeOutcome::Skipped(error));
                }
                remaining_retries -= 1;

                warn!(
                    ?error,
                    entity_name,
                    remaining_retries,
                    "Transient describe failure, retrying after backoff"
                );
                tokio::select! {
                    _ = cancellation.cancelled() => return Err(DescribeOutcome::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff *= 2;
            }
        }
    }
}

#[derive(thiserror::Error)]
pub enum FetchEntitySchemasError {
    #[error("Schema fetch was terminated on request")]
    Cancelled,
    #[error(transparent)]
    Client(#[from] MetadataClientError),
}

impl std::fmt::Debug for FetchEntitySchemasError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
