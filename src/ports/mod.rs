pub mod metadata_client;
pub mod progress_sink;
