use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub metadata_api: MetadataApiSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    /// Directory where the generated artifacts (CSV files) are written
    pub output_dir: String,
    /// Capacity of the bounded per-job log buffer
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_log_entries: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetadataApiSettings {
    /// Version segment of the metadata REST endpoints, ex: "v53.0"
    pub api_version: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_secs: u64,
    /// How many times a failed describe call is retried before the entity is skipped
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_describe_retries: u32,
    /// Initial backoff between describe retries, doubled on each attempt
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub describe_retry_backoff_ms: u64,
    /// Number of entities requested per discovery page
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub page_size: usize,
}

impl MetadataApiSettings {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn describe_retry_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.describe_retry_backoff_ms)
    }
}

/// Extracts app settings from configuration files and env variables
///
/// `base.yaml` should contain shared settings for all environments.
/// A specific env file should be created for each environment: `local.yaml` and `production.yaml`
/// The environment is set with the env var `APP_ENVIRONMENT`.
/// If `APP_ENVIRONMENT` is not set, `local.yaml` is the default.
///
/// Settings are also taken from environment variables: with a prefix of APP and '__' as separator
/// For ex: `APP_APPLICATION__MAX_LOG_ENTRIES=500` would set `Settings.application.max_log_entries`
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    // Detects the running environment.
    // Default to `local` if unspecified.
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT.");
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        // Adds in settings from environment variables (with a prefix of APP and '__' as separator)
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

/// The possible runtime environment for our application.
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}
