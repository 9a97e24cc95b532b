use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use crate::configuration::MetadataApiSettings;
use crate::domain::entities::field_descriptor::{try_parsing_describe, FieldDescriptor};
use crate::helper::error_chain_fmt;
use crate::ports::metadata_client::{EntityPage, EntityStub, MetadataClient, MetadataClientError};

/// [`MetadataClient`] backed by the platform's REST describe endpoints.
///
/// Holds an already-issued access token for the lifetime of one extraction;
/// the token is never written out, only sent as a bearer header.
pub struct SchemaRestRepository {
    http_client: reqwest::Client,
    instance_url: String,
    access_token: Secret<String>,
    api_version: String,
    page_size: usize,
}

impl SchemaRestRepository {
    pub fn try_new(
        settings: &MetadataApiSettings,
        instance_url: String,
        access_token: Secret<String>,
    ) -> Result<Self, SchemaRestRepositoryError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| SchemaRestRepositoryError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http_client,
            instance_url: instance_url.trim_end_matches('/').to_string(),
            access_token,
            api_version: settings.api_version.clone(),
            page_size: settings.page_size,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, MetadataClientError> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MetadataClientError::Api(format!("malformed response body: {}", e)))
    }
}

/// Listing response: entity stubs plus the opaque cursor of the next page
#[derive(Debug, Deserialize)]
struct SobjectListResponse {
    sobjects: Vec<SobjectStub>,
    #[serde(default, rename = "nextRecordsUrl")]
    next_records_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SobjectStub {
    name: String,
    #[serde(default)]
    queryable: bool,
}

#[derive(Debug, Deserialize)]
struct DescribeResponse {
    fields: serde_json::Value,
}

#[async_trait]
impl MetadataClient for SchemaRestRepository {
    #[tracing::instrument(name = "Listing entities from the metadata API", skip(self))]
    async fn list_entities(&self, page: Option<&str>) -> Result<EntityPage, MetadataClientError> {
        // The cursor is a server-relative path echoed back verbatim
        let url = match page {
            Some(cursor) => format!("{}{}", self.instance_url, cursor),
            None => format!(
                "{}/services/data/{}/sobjects/?pageSize={}",
                self.instance_url, self.api_version, self.page_size
            ),
        };

        let payload: SobjectListResponse = self.get_json(&url).await?;

        Ok(EntityPage {
            entities: payload
                .sobjects
                .into_iter()
                .map(|stub| EntityStub {
                    name: stub.name,
                    queryable: stub.queryable,
                })
                .collect(),
            next_page: payload.next_records_url,
        })
    }

    #[tracing::instrument(name = "Describing entity fields", skip(self))]
    async fn describe_entity(
        &self,
        entity_name: &str,
    ) -> Result<Vec<FieldDescriptor>, MetadataClientError> {
        let url = format!(
            "{}/services/data/{}/sobjects/{}/describe/",
            self.instance_url, self.api_version, entity_name
        );

        let payload: DescribeResponse = self.get_json(&url).await?;

        try_parsing_describe(entity_name, &payload.fields)
            .map_err(|e| MetadataClientError::Api(e.to_string()))
    }
}

/// Sorts an HTTP failure status into the retry taxonomy
fn classify_status(status: StatusCode, body: &str) -> MetadataClientError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        MetadataClientError::Authentication(format!("status {}: {}", status, body))
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        MetadataClientError::Transient(format!("status {}: {}", status, body))
    } else {
        MetadataClientError::Api(format!("status {}: {}", status, body))
    }
}

fn transport_error(error: reqwest::Error) -> MetadataClientError {
    if error.is_timeout() || error.is_connect() {
        MetadataClientError::Transient(error.to_string())
    } else {
        MetadataClientError::Api(error.to_string())
    }
}

#[derive(thiserror::Error)]
pub enum SchemaRestRepositoryError {
    #[error("Could not build the HTTP client: {0}")]
    ClientBuild(String),
}

impl std::fmt::Debug for SchemaRestRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
