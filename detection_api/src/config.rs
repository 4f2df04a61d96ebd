use serde::Deserialize;
use std::path::PathBuf;

pub trait Validatable {
    fn get_path(&self) -> PathBuf;
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
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
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    20 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub onnx_file: String,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default)]
    pub intra_threads: Option<usize>,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_output_name")]
    pub output_name: String,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
    #[serde(default)]
    pub agnostic_nms: bool,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

fn default_input_size() -> u32 {
    640
}

fn default_output_name() -> String {
    "output0".to_string()
}

fn default_iou_threshold() -> f32 {
    0.7
}

fn default_max_detections() -> usize {
    300
}

impl ModelConfig {
    /// Checks everything except the model file, which `validate` adds on top.
    fn validate_parameters(&self) -> Result<(), String> {
        if self.num_instances == 0 {
            return Err("num_instances must be at least 1".to_string());
        }
        if self.input_size == 0 {
            return Err("input_size must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            ));
        }
        if self.max_detections == 0 {
            return Err("max_detections must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Validatable for ModelConfig {
    fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }

    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_path()));
        }
        self.validate_parameters()
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

#[derive(Debug, Deserialize, Clone, PartialEq)]
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
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config = config.try_deserialize::<Config>()?;

    if let Err(e) = config.model.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    const BASE_YAML: &str = r#"
log_level: DEBUG
server:
  host: 127.0.0.1
  port: 5000
model:
  model_dir: model
  onnx_file: food_waste_yolo.onnx
  num_instances: 2
"#;

    fn parse(yaml: &str) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Config>()
    }

    #[test]
    fn test_defaults_are_applied() {
        let config = parse(BASE_YAML).unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.server.get_address(), "127.0.0.1:5000");
        assert_eq!(config.server.max_body_bytes, 20 * 1024 * 1024);
        assert_eq!(config.model.num_instances, 2);
        assert_eq!(config.model.input_size, 640);
        assert_eq!(config.model.output_name, "output0");
        assert_eq!(config.model.iou_threshold, 0.7);
        assert_eq!(config.model.max_detections, 300);
        assert!(!config.model.agnostic_nms);
        assert_eq!(config.model.intra_threads, None);
        assert_eq!(
            config.model.get_path(),
            PathBuf::from("model").join("food_waste_yolo.onnx")
        );
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let yaml = BASE_YAML.replace("DEBUG", "trace");
        assert!(parse(&yaml).is_err());
    }

    #[test]
    fn test_environment_parsing() {
        assert!(matches!(
            Environment::try_from("Production".to_string()),
            Ok(Environment::Production)
        ));
        assert!(matches!(
            Environment::try_from("local".to_string()),
            Ok(Environment::Local)
        ));
        assert!(Environment::try_from("staging".to_string()).is_err());
    }

    #[test]
    fn test_missing_model_file_fails_validation() {
        let config = parse(BASE_YAML).unwrap();
        let err = config.model.validate().unwrap_err();
        assert!(err.contains("Model file not found"));
    }

    #[test]
    fn test_parameter_validation() {
        let mut model = parse(BASE_YAML).unwrap().model;
        assert!(model.validate_parameters().is_ok());

        model.iou_threshold = 1.5;
        assert!(model.validate_parameters().is_err());

        model.iou_threshold = 0.5;
        model.num_instances = 0;
        assert!(model.validate_parameters().is_err());

        model.num_instances = 1;
        model.max_detections = 0;
        assert!(model.validate_parameters().is_err());
    }
}
