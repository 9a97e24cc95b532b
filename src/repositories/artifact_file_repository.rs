use std::path::PathBuf;

use chrono::Utc;

use crate::domain::entities::extraction_job::ExtractionArtifacts;
use crate::helper::error_chain_fmt;

/// Writes export artifacts to the local filesystem.
///
/// File names are `{YYYY_MM_DD}_{label}_metadata.csv` and
/// `{YYYY_MM_DD}_{label}_relational.csv`, with the label segment omitted
/// when no label was given.
pub struct ArtifactFileRepository {
    output_dir: PathBuf,
}

impl ArtifactFileRepository {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub async fn ensure_output_dir(&self) -> Result<(), ArtifactFileRepositoryError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ArtifactFileRepositoryError::Io(e, self.output_dir.clone()))
    }

    #[tracing::instrument(name = "Writing export artifacts", skip(self, metadata_csv, relational_csv))]
    pub async fn store(
        &self,
        label: Option<&str>,
        metadata_csv: &str,
        relational_csv: &str,
    ) -> Result<ExtractionArtifacts, ArtifactFileRepositoryError> {
        let metadata_file = self.output_dir.join(artifact_file_name(label, "metadata"));
        let relational_file = self.output_dir.join(artifact_file_name(label, "relational"));

        tokio::fs::write(&metadata_file, metadata_csv)
            .await
            .map_err(|e| ArtifactFileRepositoryError::Io(e, metadata_file.clone()))?;
        tokio::fs::write(&relational_file, relational_csv)
            .await
            .map_err(|e| ArtifactFileRepositoryError::Io(e, relational_file.clone()))?;

        Ok(ExtractionArtifacts {
            metadata_file,
            relational_file,
        })
    }
}

fn artifact_file_name(label: Option<&str>, suffix: &str) -> String {
    let date = Utc::now().format("%Y_%m_%d");
    match label.map(sanitize_label).filter(|label| !label.is_empty()) {
        Some(label) => format!("{}_{}_{}.csv", date, label, suffix),
        None => format!("{}_{}.csv", date, suffix),
    }
}

/// Reduces a free-form label to a safe file name segment: alphanumerics,
/// dashes and underscores survive, whitespace becomes a single underscore,
/// everything else is dropped.
pub fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_was_separator = true;

    for c in label.chars() {
        if c.is_alphanumeric() || c == '-' {
            out.push(c);
            last_was_separator = false;
        } else if (c.is_whitespace() || c == '_') && !last_was_separator {
            out.push('_');
            last_was_separator = true;
        }
    }

    out.trim_end_matches('_').to_string()
}

#[derive(thiserror::Error)]
pub enum ArtifactFileRepositoryError {
    #[error("Could not write artifact at {1}: {0}")]
    Io(#[source] std::io::Error, PathBuf),
}

impl std::fmt::Debug for ArtifactFileRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
