use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub capture: CaptureConfig,
    pub scanner: ScannerConfig,
    pub transport: TransportConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
}

impl BackendConfig {
    pub fn get_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_manual_quality")]
    pub manual_quality: f32,
    #[serde(default = "default_manual_scale")]
    pub manual_scale: f32,
    #[serde(default = "default_stream_quality")]
    pub stream_quality: f32,
    #[serde(default = "default_stream_scale")]
    pub stream_scale: f32,
}

fn default_manual_quality() -> f32 {
    0.9
}

fn default_manual_scale() -> f32 {
    1.0
}

fn default_stream_quality() -> f32 {
    0.5
}

fn default_stream_scale() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    #[serde(
        default = "default_target_fps",
        deserialize_with = "deserialize_target_fps"
    )]
    pub target_fps: u64,
    #[serde(default = "default_feedback_sample_rate")]
    pub feedback_sample_rate: f32,
}

fn deserialize_target_fps<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let fps = u64::deserialize(deserializer)?;
    if fps == 0 {
        return Err(serde::de::Error::custom(
            "scanner.target_fps must be at least 1",
        ));
    }
    Ok(fps)
}

fn default_target_fps() -> u64 {
    15
}

fn default_feedback_sample_rate() -> f32 {
    0.2
}

fn fps_to_interval_ms(fps: u64) -> u64 {
    (1000.0 / fps as f64).round() as u64
}

impl ScannerConfig {
    pub fn get_target_interval_ms(&self) -> u64 {
        fps_to_interval_ms(self.target_fps)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    #[serde(default = "default_predict_timeout_ms")]
    pub predict_timeout_ms: u64,
    #[serde(default = "default_stream_timeout_ms")]
    pub stream_timeout_ms: u64,
}

fn default_predict_timeout_ms() -> u64 {
    15_000
}

fn default_stream_timeout_ms() -> u64 {
    5_000
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
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT");

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("WS")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_to_interval() {
        assert_eq!(fps_to_interval_ms(15), 67);
        assert_eq!(fps_to_interval_ms(10), 100);
    }

    #[test]
    fn zero_target_fps_is_rejected() {
        let err = serde_json::from_str::<ScannerConfig>(r#"{"target_fps": 0}"#).unwrap_err();
        assert!(err.to_string().contains("at least 1"));

        let config = serde_json::from_str::<ScannerConfig>(r#"{"target_fps": 15}"#).unwrap();
        assert_eq!(config.get_target_interval_ms(), 67);
    }
}
