use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

use metadata_extraction_service::configuration::{
    ApplicationSettings, MetadataApiSettings, Settings,
};
use metadata_extraction_service::domain::entities::field_descriptor::{
    try_parsing_describe, FieldDescriptor,
};
use metadata_extraction_service::ports::metadata_client::{
    EntityPage, EntityStub, MetadataClient, MetadataClientError,
};
use metadata_extraction_service::startup::Application;
use metadata_extraction_service::telemetry::{get_tracing_subscriber, init_tracing_subscriber};

// Ensures that the `tracing` stack is only initialized once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_tracing_subscriber(subscriber);
    } else {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_tracing_subscriber(subscriber);
    };
});

pub struct TestApp {
    pub application: Application,
    /// Keeps the temporary output directory alive for the test's duration
    pub output_dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_log_capacity(100).await
}

/// Builds an application over a fresh temporary output directory
pub async fn spawn_app_with_log_capacity(max_log_entries: usize) -> TestApp {
    Lazy::force(&TRACING);

    let output_dir = tempfile::tempdir().expect("Failed to create a temporary output directory");
    let settings = Settings {
        application: ApplicationSettings {
            output_dir: output_dir.path().display().to_string(),
            max_log_entries,
        },
        metadata_api: MetadataApiSettings {
            api_version: "v53.0".to_string(),
            request_timeout_secs: 5,
            max_describe_retries: 2,
            describe_retry_backoff_ms: 1,
            page_size: 200,
        },
    };

    let application = Application::build(settings)
        .await
        .expect("Failed to build the application");

    TestApp {
        application,
        output_dir,
    }
}

/// Lets a test pause the fake client inside one call and resume it later
pub struct Gate {
    reached: Arc<Notify>,
    release: Arc<Semaphore>,
}

impl Gate {
    fn new() -> Self {
        Self {
            reached: Arc::new(Notify::new()),
            release: Arc::new(Semaphore::new(0)),
        }
    }

    pub async fn wait_reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.add_permits(1);
    }

    async fn pass(&self) {
        self.reached.notify_one();
        let permit = self
            .release
            .acquire()
            .await
            .expect("Gate semaphore closed");
        permit.forget();
    }
}

/// Scripted in-memory stand-in for the remote metadata API.
///
/// Entities are served in insertion order, split into pages with
/// `with_page_break`; describe failures are consumed one call at a time.
pub struct FakeMetadataClient {
    pages: Vec<Vec<EntityStub>>,
    fields_by_entity: HashMap<String, Vec<FieldDescriptor>>,
    describe_failures: Mutex<Vec<(String, MetadataClientError)>>,
    listing_gate: Option<Arc<Gate>>,
    describe_gates: HashMap<String, Arc<Gate>>,
    pub list_calls: AtomicUsize,
    pub describe_calls: AtomicUsize,
}

impl Default for FakeMetadataClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMetadataClient {
    pub fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            fields_by_entity: HashMap::new(),
            describe_failures: Mutex::new(Vec::new()),
            listing_gate: None,
            describe_gates: HashMap::new(),
            list_calls: AtomicUsize::new(0),
            describe_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_entity(mut self, name: &str, fields: serde_json::Value) -> Self {
        let descriptors =
            try_parsing_describe(name, &fields).expect("Invalid scripted describe payload");
        self.fields_by_entity.insert(name.to_string(), descriptors);
        self.push_stub(name, true);
        self
    }

    pub fn with_non_queryable_entity(mut self, name: &str) -> Self {
        self.push_stub(name, false);
        self
    }

    /// Ends the current listing page; following entities land on the next one
    pub fn with_page_break(mut self) -> Self {
        self.pages.push(Vec::new());
        self
    }

    /// Scripts one describe failure for `name`, consumed by the next call
    pub fn with_describe_failure(self, name: &str, error: MetadataClientError) -> Self {
        self.describe_failures
            .lock()
            .unwrap()
            .push((name.to_string(), error));
        self
    }

    /// The next listing call pauses until the returned gate is released
    pub fn hold_listing(&mut self) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        self.listing_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Describe calls for `name` pause until the returned gate is released
    pub fn hold_describe(&mut self, name: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        self.describe_gates.insert(name.to_string(), Arc::clone(&gate));
        gate
    }

    fn push_stub(&mut self, name: &str, queryable: bool) {
        // A page break always leaves a current page to push onto
        if let Some(page) = self.pages.last_mut() {
            page.push(EntityStub {
                name: name.to_string(),
                queryable,
            });
        }
    }
}

#[async_trait]
impl MetadataClient for FakeMetadataClient {
    async fn list_entities(&self, page: Option<&str>) -> Result<EntityPage, MetadataClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.listing_gate {
            gate.pass().await;
        }

        let index = match page {
            None => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|e| MetadataClientError::Api(e.to_string()))?,
        };
        let entities = self
            .pages
            .get(index)
            .cloned()
            .ok_or_else(|| MetadataClientError::Api(format!("unknown page cursor {}", index)))?;
        let next_page = if index + 1 < self.pages.len() {
            Some((index + 1).to_string())
        } else {
            None
        };

        Ok(EntityPage { entities, next_page })
    }

    async fn describe_entity(
        &self,
        entity_name: &str,
    ) -> Result<Vec<FieldDescriptor>, MetadataClientError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.describe_gates.get(entity_name) {
            gate.pass().await;
        }

        {
            let mut failures = self.describe_failures.lock().unwrap();
            if let Some(position) = failures.iter().position(|(name, _)| name == entity_name) {
                let (_, error) = failures.remove(position);
                return Err(error);
            }
        }

        self.fields_by_entity
            .get(entity_name)
            .cloned()
            .ok_or_else(|| MetadataClientError::Api(format!("unknown entity {}", entity_name)))
    }
}

/// Describe payload of a minimal entity: just the identifier field
pub fn identifier_only_fields() -> serde_json::Value {
    json!([
        { "name": "Id", "type": "id", "nillable": false },
    ])
}

/// The usual two-entity scenario: Account(Id) and Contact(Id, AccountId)
pub fn account_and_contact_client() -> FakeMetadataClient {
    FakeMetadataClient::new()
        .with_entity("Account", identifier_only_fields())
        .with_entity(
            "Contact",
            json!([
                { "name": "Id", "type": "id", "nillable": false },
                { "name": "AccountId", "type": "reference", "nillable": true,
                  "referenceTo": ["Account"], "relationshipName": "Account" },
            ]),
        )
}
