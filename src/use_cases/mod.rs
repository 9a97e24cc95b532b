pub mod fetch_entity_schemas;
pub mod run_extraction;
