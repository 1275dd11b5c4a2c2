//! Configuration file and environment handling

use serde::Deserialize;
use std::path::Path;

use super::paths::config_path;
use super::{Error, Result};

/// Public MinIO playground, which only accepts its published demo keys
const PLAY_ENDPOINT: &str = "play.min.io";
const PLAY_ACCESS_KEY: &str = "Q3AM3UQ867SPQQA43P2F";
const PLAY_SECRET_KEY: &str = "zuf+tfteSlswRu7BJ86wekitnifILbZam1KYY3TG";

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Storage service connection settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Fixture generation settings
    #[serde(default)]
    pub fixtures: FixtureConfig,
}

/// Connection settings for the service under test
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Host and optional port, without scheme (e.g. "localhost:9000")
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub access_key: String,

    #[serde(default)]
    pub secret_key: String,

    /// Use HTTPS when talking to the endpoint
    #[serde(default = "default_secure")]
    pub secure: bool,

    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            access_key: String::new(),
            secret_key: String::new(),
            secure: default_secure(),
            region: default_region(),
        }
    }
}

fn default_endpoint() -> String {
    PLAY_ENDPOINT.to_string()
}
fn default_secure() -> bool {
    true
}
fn default_region() -> String {
    "us-east-1".to_string()
}

/// Fixture generation settings
#[derive(Debug, Deserialize, Clone)]
pub struct FixtureConfig {
    /// Size of the generated "large" payloads, in MiB
    #[serde(default = "default_large_object_mb")]
    pub large_object_mb: usize,

    /// Lifetime of presigned URLs and POST policies
    #[serde(default = "default_presign_expiry")]
    pub presign_expiry_secs: u64,

    /// Write size used when generating large fixture files, in KiB
    #[serde(default = "default_chunk_size")]
    pub chunk_size_kb: usize,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            large_object_mb: default_large_object_mb(),
            presign_expiry_secs: default_presign_expiry(),
            chunk_size_kb: default_chunk_size(),
        }
    }
}

fn default_large_object_mb() -> usize {
    16
}
fn default_presign_expiry() -> u64 {
    3600
}
fn default_chunk_size() -> usize {
    10
}

impl Config {
    /// Load configuration from `path`, or the default config file
    ///
    /// Environment overrides are applied on top. Returns defaults plus
    /// environment if no file exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Apply environment overrides using the given lookup
    ///
    /// Recognizes the variable names used by the mint test images as well as
    /// the older `S3_ADDRESS`/`S3_SECURE` pair.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("SERVER_ENDPOINT").or_else(|| lookup("S3_ADDRESS")) {
            self.server.endpoint = endpoint;
        }
        if let Some(key) = lookup("ACCESS_KEY") {
            self.server.access_key = key;
        }
        if let Some(key) = lookup("SECRET_KEY") {
            self.server.secret_key = key;
        }
        if let Some(secure) = lookup("ENABLE_HTTPS").or_else(|| lookup("S3_SECURE")) {
            self.server.secure = matches!(secure.trim(), "1" | "true" | "TRUE" | "True");
        }
        if let Some(region) = lookup("SERVER_REGION") {
            self.server.region = region;
        }

        if self.server.endpoint == PLAY_ENDPOINT {
            self.server.access_key = PLAY_ACCESS_KEY.to_string();
            self.server.secret_key = PLAY_SECRET_KEY.to_string();
            self.server.secure = true;
        }
    }

    /// Check that the connection settings are usable
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.server.endpoint.trim();
        if endpoint.is_empty() {
            return Err(Error::Config("server endpoint is empty".to_string()));
        }
        if endpoint.contains("://") {
            return Err(Error::Config(format!(
                "endpoint '{}' must not include a scheme; use ENABLE_HTTPS to select TLS",
                endpoint
            )));
        }
        if self.server.access_key.is_empty() || self.server.secret_key.is_empty() {
            return Err(Error::Config(
                "ACCESS_KEY and SECRET_KEY must be set".to_string(),
            ));
        }
        if self.fixtures.chunk_size_kb == 0 {
            return Err(Error::Config("chunk_size_kb must be positive".to_string()));
        }
        Ok(())
    }

    /// Full endpoint URL including scheme
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.server.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.server.endpoint.trim())
    }
}
