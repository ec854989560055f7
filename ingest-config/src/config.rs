use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ingest_log::LogConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::byte_size::ByteSize;

/// Indicates config related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile(#[source] io::Error),
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml(#[source] serde_yaml::Error),
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson(#[source] serde_json::Error),
    /// A config value is out of range.
    #[error("invalid config value for {0}")]
    InvalidValue(&'static str),
}

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => write!(f, " (file {})", file_name.display()),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    origin: ConfigErrorSource,
}

impl ConfigError {
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            kind,
            origin: ConfigErrorSource::None,
        }
    }

    fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.origin = ConfigErrorSource::File(path.as_ref().to_path_buf());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.origin)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.kind.source()
    }
}

trait ConfigObject: DeserializeOwned {
    /// The basename of the config file, without the `yml` extension.
    fn name() -> &'static str;

    /// The full filename of the config file.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.yml", Self::name()))
    }

    /// Loads the config file from a file within the given directory location.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::new(ConfigErrorKind::CouldNotOpenFile(e)).file(&path))?;

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::new(ConfigErrorKind::BadYaml(e)).file(&path))
    }
}

/// Controls various limits.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Limits {
    /// The maximum size of a decompressed request body.
    max_request_size: ByteSize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_request_size: ByteSize::mebibytes(64),
        }
    }
}

/// Controls the object pools for buffers and parsing contexts.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Pools {
    /// The number of idle objects each pool keeps in its fast tier.
    ///
    /// Defaults to the number of logical CPU cores on the host.
    capacity: usize,
}

impl Default for Pools {
    fn default() -> Self {
        Self {
            capacity: num_cpus::get(),
        }
    }
}

/// Controls the DataDog protocol decoders.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Datadog {
    /// Rewrites metric names and tag keys into the `[0-9A-Za-z_.]` alphabet.
    ///
    /// Defaults to `true`.
    sanitize_metric_names: bool,
}

impl Default for Datadog {
    fn default() -> Self {
        Self {
            sanitize_metric_names: true,
        }
    }
}

/// Controls the JSON lines log decoder.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct Logs {
    /// Name of the field that is renamed to `_msg` in every log line.
    message_field: Option<String>,
}

/// Control the metrics.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Metrics {
    /// Hostname and port of the statsd server.
    ///
    /// Defaults to `None`.
    statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    ///
    /// Defaults to `"ingest"`.
    prefix: String,
    /// Default tags to apply to all metrics.
    default_tags: BTreeMap<String, String>,
    /// Emitted metrics will be buffered to optimize performance.
    ///
    /// Defaults to `true`.
    buffering: bool,
    /// Global sample rate for all emitted metrics between `0.0` and `1.0`.
    ///
    /// For example, a value of `0.3` means that only 30% of the emitted metrics will be sent.
    /// Defaults to `1.0` (100%).
    sample_rate: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: "ingest".into(),
            default_tags: BTreeMap::new(),
            buffering: true,
            sample_rate: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ConfigValues {
    #[serde(default)]
    limits: Limits,
    #[serde(default)]
    pools: Pools,
    #[serde(default)]
    datadog: Datadog,
    #[serde(default)]
    logs: Logs,
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    metrics: Metrics,
}

impl ConfigObject for ConfigValues {
    fn name() -> &'static str {
        "config"
    }
}

/// Config struct.
#[derive(Debug, Default)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl Config {
    /// Loads a config from a given config folder.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = std::env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let config = Config {
            values: ConfigValues::load(&path)?,
            path,
        };

        config.validate().map_err(|e| e.file(ConfigValues::path(&config.path)))?;
        Ok(config)
    }

    /// Creates a config from a YAML string.
    ///
    /// This is mostly useful for tests.
    pub fn from_yaml(yaml: &str) -> Result<Config, ConfigError> {
        let config = Config {
            values: serde_yaml::from_str(yaml)
                .map_err(|e| ConfigError::new(ConfigErrorKind::BadYaml(e)))?,
            path: PathBuf::new(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        let config = Config {
            values: serde_json::from_value(value)
                .map_err(|e| ConfigError::new(ConfigErrorKind::BadJson(e)))?,
            path: PathBuf::new(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let sample_rate = self.values.metrics.sample_rate;
        if !(0.0..=1.0).contains(&sample_rate) {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue(
                "metrics.sample_rate",
            )));
        }

        Ok(())
    }

    /// Returns the directory the config was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the maximum size of a decompressed request body.
    pub fn max_request_size(&self) -> ByteSize {
        self.values.limits.max_request_size
    }

    /// Returns the fast tier capacity of every object pool.
    pub fn pool_capacity(&self) -> usize {
        self.values.pools.capacity
    }

    /// Returns `true` if DataDog metric names and tag keys should be sanitized.
    pub fn sanitize_metric_names(&self) -> bool {
        self.values.datadog.sanitize_metric_names
    }

    /// Returns the name of the log field that becomes the log message.
    pub fn log_message_field(&self) -> Option<&str> {
        self.values.logs.message_field.as_deref()
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the socket addresses for statsd.
    ///
    /// If stats is disabled this returns `None`.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Return the prefix for statsd metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags for statsd metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns `true` if metrics should be buffered before sending them to statsd.
    pub fn metrics_buffering(&self) -> bool {
        self.values.metrics.buffering
    }

    /// Returns the global sample rate for all metrics.
    pub fn metrics_sample_rate(&self) -> f64 {
        self.values.metrics.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use ingest_log::{LogFormat, LogLevel};

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.max_request_size(), ByteSize::mebibytes(64));
        assert!(config.pool_capacity() > 0);
        assert!(config.sanitize_metric_names());
        assert_eq!(config.log_message_field(), None);
        assert_eq!(config.statsd_addr(), None);
        assert_eq!(config.metrics_prefix(), "ingest");
    }

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml(
            r#"
limits:
  max_request_size: 1MiB
pools:
  capacity: 3
datadog:
  sanitize_metric_names: false
logs:
  message_field: message
logging:
  level: trace
  format: json
metrics:
  statsd: 127.0.0.1:8125
  sample_rate: 0.5
"#,
        )
        .unwrap();

        assert_eq!(config.max_request_size().as_bytes(), 1_048_576);
        assert_eq!(config.pool_capacity(), 3);
        assert!(!config.sanitize_metric_names());
        assert_eq!(config.log_message_field(), Some("message"));
        assert_eq!(config.logging().level, LogLevel::Trace);
        assert_eq!(config.logging().format, LogFormat::Json);
        assert_eq!(config.statsd_addr(), Some("127.0.0.1:8125"));
        assert_eq!(config.metrics_sample_rate(), 0.5);
        assert!(config.metrics_buffering());
    }

    #[test]
    fn test_invalid_sample_rate() {
        let error = Config::from_json_value(serde_json::json!({
            "metrics": {"sample_rate": 2.0}
        }))
        .unwrap_err();

        insta::assert_snapshot!(error, @"invalid config value for metrics.sample_rate");
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("config.yml")).unwrap();
        writeln!(file, "limits:\n  max_request_size: 2048").unwrap();

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.max_request_size(), ByteSize::bytes(2048));
        assert_eq!(config.path(), dir.path());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = Config::from_path(dir.path()).unwrap_err();

        assert!(matches!(error.kind(), ConfigErrorKind::CouldNotOpenFile(_)));
        assert!(error.to_string().starts_with("could not open config file (file "));
    }
}
