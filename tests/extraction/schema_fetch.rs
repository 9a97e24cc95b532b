use std::sync::atomic::Ordering;
use std::sync::Arc;

use metadata_extraction_service::domain::entities::extraction_job::{ArtifactKind, JobStatus};
use metadata_extraction_service::ports::metadata_client::MetadataClientError;

use crate::helpers::{identifier_only_fields, spawn_app, FakeMetadataClient};

#[tokio::test]
async fn discovery_follows_page_cursors_to_the_end() {
    let app = spawn_app().await;
    let client = FakeMetadataClient::new()
        .with_entity("Account", identifier_only_fields())
        .with_page_break()
        .with_entity("Contact", identifier_only_fields())
        .with_page_break()
        .with_entity("Lead", identifier_only_fields());
    let client = Arc::new(client);

    let job_id = app
        .application
        .start_extraction(client.clone(), None)
        .unwrap();
    let snapshot = app.application.wait_until_terminal(job_id).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(client.list_calls.load(Ordering::SeqCst), 3);
    assert!(snapshot
        .log
        .iter()
        .any(|entry| entry.message == "Discovered 3 entities to describe"));
}

#[tokio::test]
async fn non_queryable_and_system_entities_are_dropped_at_discovery() {
    let app = spawn_app().await;
    let client = FakeMetadataClient::new()
        .with_entity("Account", identifier_only_fields())
        .with_non_queryable_entity("AccountHistory")
        .with_entity("__InternalThing", identifier_only_fields());
    let client = Arc::new(client);

    let job_id = app
        .application
        .start_extraction(client.clone(), None)
        .unwrap();
    let snapshot = app.application.wait_until_terminal(job_id).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    // Only Account was described
    assert_eq!(client.describe_calls.load(Ordering::SeqCst), 1);

    let metadata_path = app
        .application
        .artifact_path(job_id, ArtifactKind::Metadata)
        .unwrap()
        .unwrap();
    let metadata = tokio::fs::read_to_string(metadata_path).await.unwrap();
    assert!(!metadata.contains("AccountHistory"));
    assert!(!metadata.contains("__InternalThing"));
}

#[tokio::test]
async fn progress_lines_count_entities_against_the_known_total() {
    let app = spawn_app().await;
    let client = FakeMetadataClient::new()
        .with_entity("Account", identifier_only_fields())
        .with_entity("Contact", identifier_only_fields());

    let job_id = app
        .application
        .start_extraction(Arc::new(client), None)
        .unwrap();
    let snapshot = app.application.wait_until_terminal(job_id).await.unwrap();

    let messages: Vec<&str> = snapshot
        .log
        .iter()
        .map(|entry| entry.message.as_str())
        .collect();
    assert!(messages.contains(&"Processing entity 1/2: Account"));
    assert!(messages.contains(&"Processing entity 2/2: Contact"));
}

#[tokio::test]
async fn transient_describe_failures_are_retried_without_failing_the_job() {
    let app = spawn_app().await;
    let client = FakeMetadataClient::new()
        .with_entity("Account", identifier_only_fields())
        .with_describe_failure(
            "Account",
            MetadataClientError::Transient("throttled".to_string()),
        );
    let client = Arc::new(client);

    let job_id = app
        .application
        .start_extraction(client.clone(), None)
        .unwrap();
    let snapshot = app.application.wait_until_terminal(job_id).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(client.describe_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_retries_skip_the_entity_but_complete_the_job() {
    let app = spawn_app().await;
    // One more failure than the configured retry budget of 2
    let mut client = FakeMetadataClient::new()
        .with_entity("Account", identifier_only_fields())
        .with_entity("Contact", identifier_only_fields());
    for _ in 0..3 {
        client = client.with_describe_failure(
            "Account",
            MetadataClientError::Transient("throttled".to_string()),
        );
    }

    let job_id = app
        .application
        .start_extraction(Arc::new(client), None)
        .unwrap();
    let snapshot = app.application.wait_until_terminal(job_id).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert!(snapshot
        .log
        .iter()
        .any(|entry| entry.message.starts_with("Skipping entity Account")));

    let metadata_path = app
        .application
        .artifact_path(job_id, ArtifactKind::Metadata)
        .unwrap()
        .unwrap();
    let metadata = tokio::fs::read_to_string(metadata_path).await.unwrap();
    assert!(metadata.contains("Contact,Id"));
    assert!(!metadata.contains("Account,Id"));
}
