use std::sync::Arc;

use serde_json::json;

use metadata_extraction_service::domain::entities::extraction_job::{ArtifactKind, JobStatus};

use crate::helpers::{
    account_and_contact_client, identifier_only_fields, spawn_app, FakeMetadataClient,
};

async fn run_to_completion(
    app: &crate::helpers::TestApp,
    client: FakeMetadataClient,
    namespace_filter: Option<&str>,
) -> uuid::Uuid {
    let job_id = app
        .application
        .start_extraction(Arc::new(client), namespace_filter.map(str::to_string))
        .expect("Failed to start the extraction");

    let snapshot = app
        .application
        .wait_until_terminal(job_id)
        .await
        .expect("Job disappeared before finishing");
    assert_eq!(snapshot.status, JobStatus::Completed, "{:?}", snapshot);

    job_id
}

async fn read_artifact(
    app: &crate::helpers::TestApp,
    job_id: uuid::Uuid,
    kind: ArtifactKind,
) -> String {
    let path = app
        .application
        .artifact_path(job_id, kind)
        .expect("Job disappeared")
        .expect("Completed job has no artifact");
    tokio::fs::read_to_string(path)
        .await
        .expect("Failed to read the artifact file")
}

#[tokio::test]
async fn account_and_contact_produce_the_expected_relational_rows() {
    let app = spawn_app().await;
    let job_id = run_to_completion(&app, account_and_contact_client(), None).await;

    let relational = read_artifact(&app, job_id, ArtifactKind::Relational).await;
    let lines: Vec<&str> = relational.lines().collect();

    let tables = lines.iter().filter(|l| l.starts_with("table,")).count();
    let columns = lines.iter().filter(|l| l.starts_with("column,")).count();
    let relationships: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|l| l.starts_with("relationship,"))
        .collect();

    assert_eq!(tables, 2);
    assert_eq!(columns, 3);
    assert_eq!(
        relationships,
        vec!["relationship,Contact,AccountId,,,,Account,Id,one-to-many"]
    );
}

#[tokio::test]
async fn every_entity_gets_exactly_one_primary_key_column() {
    let app = spawn_app().await;
    let job_id = run_to_completion(&app, account_and_contact_client(), None).await;

    let relational = read_artifact(&app, job_id, ArtifactKind::Relational).await;
    for entity in ["Account", "Contact"] {
        let primaries = relational
            .lines()
            .filter(|l| l.starts_with(&format!("column,{},", entity)) && l.contains(",primary,"))
            .count();
        assert_eq!(primaries, 1, "entity {}", entity);
    }
}

#[tokio::test]
async fn repeated_extractions_produce_byte_identical_exports() {
    let app = spawn_app().await;

    let first_job = run_to_completion(&app, account_and_contact_client(), None).await;
    let first_metadata = read_artifact(&app, first_job, ArtifactKind::Metadata).await;
    let first_relational = read_artifact(&app, first_job, ArtifactKind::Relational).await;

    let second_job = run_to_completion(&app, account_and_contact_client(), None).await;
    let second_metadata = read_artifact(&app, second_job, ArtifactKind::Metadata).await;
    let second_relational = read_artifact(&app, second_job, ArtifactKind::Relational).await;

    assert_eq!(first_metadata, second_metadata);
    assert_eq!(first_relational, second_relational);
}

#[tokio::test]
async fn namespace_filter_exports_a_prefixed_subset() {
    let app = spawn_app().await;
    let client = account_and_contact_client()
        .with_entity("cb2__Invoice__c", identifier_only_fields())
        .with_entity("cb2__Payment__c", identifier_only_fields());

    let job_id = run_to_completion(&app, client, Some("cb2")).await;
    let metadata = read_artifact(&app, job_id, ArtifactKind::Metadata).await;

    // Skips the header line
    let entities: Vec<&str> = metadata
        .lines()
        .skip(1)
        .map(|l| l.split(',').next().unwrap_or(""))
        .collect();

    assert!(!entities.is_empty());
    assert!(entities.iter().all(|name| name.starts_with("cb2__")));
    assert!(!metadata.contains("\nAccount,"));
}

#[tokio::test]
async fn filter_matching_nothing_completes_with_header_only_exports() {
    let app = spawn_app().await;
    let job_id = run_to_completion(&app, account_and_contact_client(), Some("cb2")).await;

    let metadata = read_artifact(&app, job_id, ArtifactKind::Metadata).await;
    let relational = read_artifact(&app, job_id, ArtifactKind::Relational).await;

    assert_eq!(metadata.lines().count(), 1);
    assert_eq!(relational.lines().count(), 1);
}

#[tokio::test]
async fn unresolvable_references_are_logged_and_kept_out_of_relationships() {
    let app = spawn_app().await;
    let client = FakeMetadataClient::new().with_entity(
        "Contact",
        json!([
            { "name": "Id", "type": "id", "nillable": false },
            { "name": "AccountId", "type": "reference", "nillable": true,
              "referenceTo": ["Account"] },
        ]),
    );

    let job_id = run_to_completion(&app, client, None).await;

    let snapshot = app.application.job_status(job_id).unwrap();
    assert!(snapshot
        .log
        .iter()
        .any(|entry| entry.message == "Unresolvable reference Contact.AccountId -> Account"));

    let relational = read_artifact(&app, job_id, ArtifactKind::Relational).await;
    assert_eq!(
        relational
            .lines()
            .filter(|l| l.starts_with("relationship,"))
            .count(),
        0
    );

    // The flat export keeps the field and its declared target
    let metadata = read_artifact(&app, job_id, ArtifactKind::Metadata).await;
    assert!(metadata.contains("Contact,AccountId,reference"));
    assert!(metadata.contains("Account"));
}

#[tokio::test]
async fn flat_export_carries_sizes_and_the_raw_type_labels() {
    let app = spawn_app().await;
    let client = FakeMetadataClient::new().with_entity(
        "cb2__Invoice__c",
        json!([
            { "name": "Id", "type": "id", "nillable": false },
            { "name": "Name", "type": "string", "nillable": true, "length": 80 },
            { "name": "cb2__Amount__c", "type": "currency", "nillable": true,
              "precision": 18, "scale": 2 },
            { "name": "cb2__Payload__c", "type": "anytype", "nillable": true },
        ]),
    );

    let job_id = run_to_completion(&app, client, None).await;
    let metadata = read_artifact(&app, job_id, ArtifactKind::Metadata).await;

    assert!(metadata.contains("cb2__Invoice__c,Name,string,false,80,,"));
    assert!(metadata.contains("cb2__Invoice__c,cb2__Amount__c,number,false,,18,2"));
    // Unknown wire types surface verbatim
    assert!(metadata.contains("cb2__Invoice__c,cb2__Payload__c,anytype"));
}
