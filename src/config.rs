// Configuration module - collector settings, file formats and validation
//
// This module is responsible for:
// 1. Describing the connection parameters of a single OpenLDAP target
// 2. Reading those parameters from JSON or YAML files (same field names in both)
// 3. Validating them before the collector touches the network

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Server queried when no URL is configured.
pub const DEFAULT_URL: &str = "ldap://127.0.0.1:389";

/// Connect and search timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 2.0;

/// Collection interval, in seconds.
pub const DEFAULT_UPDATE_EVERY: u64 = 1;

const LDAP_SCHEMES: [&str; 3] = ["ldap", "ldaps", "ldapi"];

/// Errors that can occur while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported config file extension: {0}")]
    UnsupportedFormat(String),

    #[error("missing required setting: {0}")]
    MissingRequiredSetting(&'static str),

    #[error("invalid setting: {0}")]
    InvalidSettings(String),
}

/// On-disk representation of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Picks the format from the file extension (`.json`, `.yaml`, `.yml`).
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match ext.as_str() {
            "json" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Connection settings for one OpenLDAP server.
///
/// # Example YAML
/// ```yaml
/// update_every: 5
/// url: ldaps://ldap.example.com:636
/// timeout: 2
/// username: cn=monitor,dc=example,dc=com
/// password: secret
/// tls_skip_verify: false
/// ```
///
/// Every field has a default, so partial files are accepted here and
/// rejected later by [`Config::validate`] if something required is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collection interval in seconds
    pub update_every: u64,

    /// Server URL (`ldap://`, `ldaps://` or `ldapi://`)
    pub url: String,

    /// Connect and per-search timeout in seconds (fractions allowed)
    pub timeout: f64,

    /// Bind DN used for the simple bind
    pub username: String,

    pub password: String,

    /// PEM file with the CA certificate(s) trusted for TLS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_ca: Option<PathBuf>,

    /// PEM client certificate, requires `tls_key`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cert: Option<PathBuf>,

    /// PEM (PKCS#8) client key, requires `tls_cert`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_key: Option<PathBuf>,

    /// Accept any server certificate
    pub tls_skip_verify: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            update_every: DEFAULT_UPDATE_EVERY,
            url: DEFAULT_URL.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
            username: String::new(),
            password: String::new(),
            tls_ca: None,
            tls_cert: None,
            tls_key: None,
            tls_skip_verify: false,
        }
    }
}

impl Config {
    /// Loads a configuration file, choosing the parser from its extension.
    ///
    /// The result is not validated; callers run [`Config::validate`] (the
    /// collector does so in `init`).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse(&contents, format)?;

        info!(
            "Loaded configuration from '{}': url={}, update_every={}s, timeout={}s",
            path.display(),
            config.url,
            config.update_every,
            config.timeout
        );

        Ok(config)
    }

    pub fn parse(contents: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        match format {
            ConfigFormat::Json => Ok(serde_json::from_str(contents)?),
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(contents)?),
        }
    }

    pub fn encode(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        match format {
            ConfigFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            ConfigFormat::Yaml => Ok(serde_yaml::to_string(self)?),
        }
    }

    /// Checks the settings without performing any network I/O.
    ///
    /// # Errors
    /// - empty `url` or `username`
    /// - `url` without an LDAP scheme
    /// - non-positive, non-finite or out-of-range `timeout`, zero `update_every`
    /// - `tls_cert` given without `tls_key` (or the reverse)
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingRequiredSetting("url"));
        }
        validate_url(&self.url)?;

        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingRequiredSetting("username"));
        }

        let representable = Duration::try_from_secs_f64(self.timeout).is_ok();
        if !representable || self.timeout <= 0.0 {
            return Err(ConfigError::InvalidSettings(format!(
                "timeout must be a positive number of seconds, got {}",
                self.timeout
            )));
        }

        if self.update_every == 0 {
            return Err(ConfigError::InvalidSettings(
                "update_every must be at least 1 second".to_string(),
            ));
        }

        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err(ConfigError::InvalidSettings(
                "tls_cert and tls_key must be set together".to_string(),
            ));
        }

        Ok(())
    }

    /// Falls back to the default only for configs that did not pass `validate`.
    pub fn timeout_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS))
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_every.max(1))
    }
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    let invalid = || {
        ConfigError::InvalidSettings(format!(
            "url '{}' must start with ldap://, ldaps:// or ldapi://",
            url
        ))
    };

    let (scheme, rest) = url.trim().split_once("://").ok_or_else(invalid)?;
    let scheme = scheme.to_ascii_lowercase();

    if !LDAP_SCHEMES.contains(&scheme.as_str()) {
        return Err(invalid());
    }

    // ldapi:// alone means the server's default socket path
    if rest.is_empty() && scheme != "ldapi" {
        return Err(ConfigError::InvalidSettings(format!(
            "url '{}' has no host",
            url
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_JSON: &str = include_str!("../testdata/config.json");
    const CONFIG_YAML: &str = include_str!("../testdata/config.yaml");

    fn valid_config() -> Config {
        Config {
            username: "cn=admin,dc=example,dc=org".to_string(),
            password: "secret".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config_fails_validation() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequiredSetting("username")));
    }

    #[test]
    fn test_empty_url_fails_validation() {
        for url in ["", "   "] {
            let config = Config {
                url: url.to_string(),
                ..valid_config()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::MissingRequiredSetting("url"))
            ));
        }
    }

    #[test]
    fn test_url_scheme_is_checked() {
        for url in ["http://127.0.0.1", "127.0.0.1:389", "ldap://"] {
            let config = Config {
                url: url.to_string(),
                ..valid_config()
            };
            assert!(config.validate().is_err(), "{url} should be rejected");
        }

        for url in ["ldap://localhost:389", "LDAPS://ldap.example.com", "ldapi://"] {
            let config = Config {
                url: url.to_string(),
                ..valid_config()
            };
            assert!(config.validate().is_ok(), "{url} should be accepted");
        }
    }

    #[test]
    fn test_timeout_and_interval_bounds() {
        let config = Config {
            timeout: 0.0,
            ..valid_config()
        };
        assert!(config.validate().is_err());

        let config = Config {
            timeout: f64::NAN,
            ..valid_config()
        };
        assert!(config.validate().is_err());

        // finite, but too large for a Duration
        let config = Config {
            timeout: 1e300,
            ..valid_config()
        };
        assert!(config.validate().is_err());

        let config = Config {
            update_every: 0,
            ..valid_config()
        };
        assert!(config.validate().is_err());

        let config = Config {
            timeout: 0.5,
            ..valid_config()
        };
        assert_eq!(config.timeout_duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_tls_cert_requires_key() {
        let config = Config {
            tls_cert: Some(PathBuf::from("/etc/ssl/client.pem")),
            ..valid_config()
        };
        assert!(config.validate().is_err());

        let config = Config {
            tls_cert: Some(PathBuf::from("/etc/ssl/client.pem")),
            tls_key: Some(PathBuf::from("/etc/ssl/client.key")),
            ..valid_config()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_and_yaml_fixtures_match() {
        let from_json = Config::parse(CONFIG_JSON, ConfigFormat::Json).unwrap();
        let from_yaml = Config::parse(CONFIG_YAML, ConfigFormat::Yaml).unwrap();

        assert_eq!(from_json, from_yaml);
        assert_eq!(from_json.update_every, 123);
        assert_eq!(from_json.timeout, 123.123);
        assert!(from_json.tls_skip_verify);
    }

    #[test]
    fn test_serialization_round_trip() {
        for format in [ConfigFormat::Json, ConfigFormat::Yaml] {
            let original = Config::parse(CONFIG_JSON, ConfigFormat::Json).unwrap();
            let encoded = original.encode(format).unwrap();
            let decoded = Config::parse(&encoded, format).unwrap();
            assert_eq!(original, decoded, "{format:?} round trip");
        }

        // JSON text decoded as YAML (JSON is a YAML subset) gives the same config
        let via_yaml = Config::parse(CONFIG_JSON, ConfigFormat::Yaml).unwrap();
        assert_eq!(via_yaml, Config::parse(CONFIG_JSON, ConfigFormat::Json).unwrap());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = Config::parse("url: ldap://example.org\n", ConfigFormat::Yaml).unwrap();
        assert_eq!(config.url, "ldap://example.org");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.update_every, DEFAULT_UPDATE_EVERY);
        assert!(config.tls_ca.is_none());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("openldap.json")).unwrap(),
            ConfigFormat::Json
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("/etc/openldap.YML")).unwrap(),
            ConfigFormat::Yaml
        );
        assert!(ConfigFormat::from_path(Path::new("openldap.toml")).is_err());
        assert!(ConfigFormat::from_path(Path::new("openldap")).is_err());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/openldap.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
