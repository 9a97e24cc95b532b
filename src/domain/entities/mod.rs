pub mod entity_schema;
pub mod extraction_job;
pub mod field_descriptor;
pub mod relationship;
