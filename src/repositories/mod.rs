pub mod artifact_file_repository;
pub mod job_in_memory_repository;
pub mod schema_rest_repository;
