use async_trait::async_trait;

use crate::domain::entities::field_descriptor::FieldDescriptor;
use crate::helper::error_chain_fmt;

/// Discovery-time description of one entity, before any field-level call
#[derive(Debug, Clone)]
pub struct EntityStub {
    pub name: String,
    /// Whether the platform lets this entity be queried at all.
    /// Non-queryable system entities are dropped at discovery.
    pub queryable: bool,
}

/// One page of the entity listing.
///
/// `next_page` carries the opaque cursor of the following page; `None` means
/// the API signalled completion.
#[derive(Debug, Clone)]
pub struct EntityPage {
    pub entities: Vec<EntityStub>,
    pub next_page: Option<String>,
}

/// Error taxonomy of the metadata API, as the fetcher needs to tell them apart.
#[derive(thiserror::Error)]
pub enum MetadataClientError {
    /// Invalid or expired client handle: fatal for the whole run, no retry
    #[error("Authentication rejected by the metadata API: {0}")]
    Authentication(String),
    /// Rate limit, timeout or temporary network failure: retried with backoff
    #[error("Transient metadata API failure: {0}")]
    Transient(String),
    /// Any other API failure (malformed response, unexpected status)
    #[error("Metadata API request failed: {0}")]
    Api(String),
}

impl std::fmt::Debug for MetadataClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// An already-authenticated handle onto the remote metadata API.
///
/// The core never creates one of these: the caller owns authentication and
/// passes the handle in per extraction. The handle is not shared across jobs.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// One page of the entity listing; `page` is the cursor returned by the
    /// previous page, or `None` for the first call.
    async fn list_entities(&self, page: Option<&str>) -> Result<EntityPage, MetadataClientError>;

    /// Field descriptors of one entity
    async fn describe_entity(
        &self,
        entity_name: &str,
    ) -> Result<Vec<FieldDescriptor>, MetadataClientError>;
}
