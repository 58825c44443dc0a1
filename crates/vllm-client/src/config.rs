//! Client configuration and endpoint handling.
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Environment variables (`VLLM_CLIENT_*`)
//! 2. Config file (`~/.config/vllm-client/config.toml`)
//! 3. Default values

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use vllm_client_core::streaming::DEFAULT_BUFFER_CAPACITY;
use vllm_client_core::{Error, Result};

/// Path the generate API is served under, appended to the base URL.
pub const GENERATE_PATH: &str = "/generate";

/// Prefix of environment variables read by [`ClientConfig::load`].
pub const ENV_PREFIX: &str = "VLLM_CLIENT_";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the server, without the generate path.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Whole-request timeout in seconds, covering streamed bodies too.
    #[serde(default)]
    pub timeout_secs: Option<f64>,

    /// Connection timeout in seconds.
    #[serde(default)]
    pub connect_timeout_secs: Option<f64>,

    /// Initial capacity of the stream buffer in bytes.
    #[serde(default = "default_stream_buffer_capacity")]
    pub stream_buffer_capacity: usize,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_stream_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: None,
            connect_timeout_secs: None,
            stream_buffer_capacity: default_stream_buffer_capacity(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for `base_url` with default settings.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Sets the whole-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    /// Sets the initial stream buffer capacity.
    #[must_use]
    pub fn with_stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    /// Loads configuration from the default config file and environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a source is malformed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from `path` and the environment.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a source is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| {
                Error::configuration(format!("failed to load {}: {e}", path.display()))
            })?;

        tracing::debug!(
            path = %path.display(),
            base_url = %config.base_url,
            "Loaded client configuration"
        );
        Ok(config)
    }

    /// Returns the path to the config file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Returns the path to the config directory.
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vllm-client")
    }

    /// Parses the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the URL is not allowed.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.base_url)
    }

    /// Returns the whole-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the value is not a positive duration.
    pub fn timeout(&self) -> Result<Option<Duration>> {
        self.timeout_secs
            .map(|secs| seconds("timeout_secs", secs))
            .transpose()
    }

    /// Returns the connection timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the value is not a positive duration.
    pub fn connect_timeout(&self) -> Result<Option<Duration>> {
        self.connect_timeout_secs
            .map(|secs| seconds("connect_timeout_secs", secs))
            .transpose()
    }

    /// Checks every setting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the first bad setting.
    pub fn validate(&self) -> Result<()> {
        self.endpoint()?;
        self.timeout()?;
        self.connect_timeout()?;
        if self.stream_buffer_capacity == 0 {
            return Err(Error::configuration(
                "stream_buffer_capacity must be at least 1 byte",
            ));
        }
        Ok(())
    }
}

fn seconds(name: &str, secs: f64) -> Result<Duration> {
    if secs <= 0.0 {
        return Err(Error::configuration(format!(
            "{name} must be positive, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::configuration(format!("{name} is not a valid duration: {e}")))
}

/// Validated server location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
    generate_url: Url,
}

impl Endpoint {
    /// Parses a base URL, trimming trailing slashes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the URL is empty, unparsable,
    /// not http(s), or already ends in the generate path.
    pub fn parse(base_url: &str) -> Result<Self> {
        let base = base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(Error::configuration("base URL is empty"));
        }
        if base.ends_with(GENERATE_PATH) {
            return Err(Error::configuration(format!(
                "base URL '{base}' must not end with {GENERATE_PATH}; it is appended automatically"
            )));
        }

        let generate_url = Url::parse(&format!("{base}{GENERATE_PATH}"))
            .map_err(|e| Error::configuration(format!("invalid base URL '{base}': {e}")))?;
        if !matches!(generate_url.scheme(), "http" | "https") {
            return Err(Error::configuration(format!(
                "base URL '{base}' must use http or https"
            )));
        }

        Ok(Self {
            base: base.to_string(),
            generate_url,
        })
    }

    /// The base URL without trailing slashes.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The full URL of the generate API.
    #[must_use]
    pub fn generate_url(&self) -> &Url {
        &self.generate_url
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.generate_url)
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slashes() {
        let endpoint = Endpoint::parse("http://localhost:8000//").unwrap();
        assert_eq!(endpoint.base(), "http://localhost:8000");
        assert_eq!(
            endpoint.generate_url().as_str(),
            "http://localhost:8000/generate"
        );
    }

    #[test]
    fn test_endpoint_keeps_path_prefix() {
        let endpoint: Endpoint = "https://gateway.example.com/vllm/".parse().unwrap();
        assert_eq!(
            endpoint.generate_url().as_str(),
            "https://gateway.example.com/vllm/generate"
        );
    }

    #[test]
    fn test_endpoint_rejects_generate_suffix() {
        for url in ["http://localhost:8000/generate", "http://localhost:8000/generate/"] {
            let err = Endpoint::parse(url).unwrap_err();
            assert!(matches!(err, Error::Configuration { .. }), "{url}: {err}");
        }
    }

    #[test]
    fn test_endpoint_rejects_bad_urls() {
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("   /").is_err());
        assert!(Endpoint::parse("not a url").is_err());
        assert!(Endpoint::parse("ftp://localhost").is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout().unwrap(), None);
        assert_eq!(config.stream_buffer_capacity, DEFAULT_BUFFER_CAPACITY);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClientConfig::default()
            .with_stream_buffer_capacity(0)
            .validate()
            .is_err());

        let config = ClientConfig {
            timeout_secs: Some(-1.0),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(ClientConfig::new("http://localhost:8000/generate")
            .validate()
            .is_err());
    }

    #[test]
    fn test_timeouts() {
        let config = ClientConfig::default()
            .with_timeout(Duration::from_millis(1500))
            .with_connect_timeout(Duration::from_secs(2));
        assert_eq!(config.timeout().unwrap(), Some(Duration::from_millis(1500)));
        assert_eq!(config.connect_timeout().unwrap(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_load_layers_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    base_url = "http://gpu-box:8000"
                    stream_buffer_capacity = 1024
                    timeout_secs = 30.0
                "#,
            )?;
            jail.set_env("VLLM_CLIENT_TIMEOUT_SECS", "2.5");

            let config = ClientConfig::load_from(Path::new("config.toml"))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.base_url, "http://gpu-box:8000");
            assert_eq!(config.stream_buffer_capacity, 1024);
            assert_eq!(config.timeout_secs, Some(2.5));
            assert_eq!(config.connect_timeout_secs, None);
            Ok(())
        });
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = ClientConfig::load_from(Path::new("absent.toml"))
                .map_err(|e| e.to_string())?;
            assert_eq!(config, ClientConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_load_malformed_file_is_an_error() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", r#"stream_buffer_capacity = "lots""#)?;

            let err = ClientConfig::load_from(Path::new("config.toml")).unwrap_err();
            assert!(matches!(err, Error::Configuration { .. }));
            Ok(())
        });
    }
}
