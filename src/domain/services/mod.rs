pub mod export_encoder;
pub mod relationship_resolver;
