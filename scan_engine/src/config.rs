use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Body limit for image uploads and pushed camera frames.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    #[serde(default = "default_model_file")]
    pub model_file: String,
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_load_on_startup")]
    pub load_on_startup: bool,
}

fn default_model_file() -> String {
    "model.onnx".to_string()
}

fn default_metadata_file() -> String {
    "metadata.json".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_load_on_startup() -> bool {
    true
}

impl ModelConfig {
    pub fn get_model_url(&self) -> String {
        join_url(&self.base_url, &self.model_file)
    }

    pub fn get_metadata_url(&self) -> String {
        join_url(&self.base_url, &self.metadata_file)
    }

    pub fn get_request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn join_url(base: &str, file: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        file.trim_start_matches('/')
    )
}

#[derive(Clone, Deserialize, Debug)]
pub struct ScanConfig {
    #[serde(default = "default_scan_fps")]
    pub scan_fps: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_fps: default_scan_fps(),
        }
    }
}

fn default_scan_fps() -> u64 {
    30
}

fn fps_to_delay_ms(fps: u64) -> u64 {
    (1000.0 / fps.max(1) as f64).round() as u64
}

impl ScanConfig {
    pub fn get_scan_delay_ms(&self) -> u64 {
        fps_to_delay_ms(self.scan_fps)
    }

    pub fn get_scan_interval(&self) -> Duration {
        Duration::from_millis(self.get_scan_delay_ms())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    Memory,
    Rest,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default)]
    pub backend: HistoryBackend,
    #[serde(default)]
    pub rest_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_history_limit")]
    pub default_limit: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::default(),
            rest_url: None,
            api_key: None,
            default_limit: default_history_limit(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_history_limit() -> usize {
    50
}

impl HistoryConfig {
    pub fn get_request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.backend == HistoryBackend::Rest {
            if self.rest_url.as_deref().map_or(true, str::is_empty) {
                return Err("history.rest_url is required for the rest backend".to_string());
            }
            if self.api_key.as_deref().map_or(true, str::is_empty) {
                return Err("history.api_key is required for the rest backend".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
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

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("SCAN")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    if let Err(e) = config.history.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_to_delay() {
        assert_eq!(fps_to_delay_ms(30), 33);
        assert_eq!(fps_to_delay_ms(20), 50);
        assert_eq!(fps_to_delay_ms(0), 1000);
    }

    #[test]
    fn test_model_urls() {
        let model = ModelConfig {
            base_url: "https://models.example.com/skin/".to_string(),
            model_file: default_model_file(),
            metadata_file: default_metadata_file(),
            request_timeout_secs: 5,
            load_on_startup: true,
        };

        assert_eq!(
            model.get_model_url(),
            "https://models.example.com/skin/model.onnx"
        );
        assert_eq!(
            model.get_metadata_url(),
            "https://models.example.com/skin/metadata.json"
        );
    }

    #[test]
    fn test_rest_history_requires_credentials() {
        let mut history = HistoryConfig {
            backend: HistoryBackend::Rest,
            ..HistoryConfig::default()
        };
        assert!(history.validate().is_err());

        history.rest_url = Some("https://db.example.com/rest/v1".to_string());
        history.api_key = Some("anon".to_string());
        assert!(history.validate().is_ok());

        assert!(HistoryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(
            LogLevel::try_from("DEBUG".to_string()),
            Ok(LogLevel::Debug)
        ));
        assert!(LogLevel::try_from("trace".to_string()).is_err());
    }
}
