//! Client configuration.
//!
//! ```toml
//! address = "sirena.example.net:34323"
//! client_id = 1234
//! request_timeout_ms = 5000
//! rekey_interval_secs = 3600
//!
//! [keys]
//! dir = "/etc/sirena/keys"
//! client_private_key = "client.pem"
//! client_private_key_password = "secret"
//! server_public_key = "server.pub"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sirena client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server address (`host:port`)
    pub address: String,
    /// Client identifier issued by the Sirena operator
    pub client_id: u32,
    /// Reply timeout for each request, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Interval between session key refreshes, in seconds
    #[serde(default = "default_rekey_interval_secs")]
    pub rekey_interval_secs: u64,
    /// Key material locations
    pub keys: KeysConfig,
}

/// Key material configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Base directory for relative key paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Client RSA private key (PEM)
    pub client_private_key: PathBuf,
    /// Password protecting the client private key, empty if unencrypted
    #[serde(default)]
    pub client_private_key_password: String,
    /// Server RSA public key (PEM)
    pub server_public_key: PathBuf,
}

fn default_request_timeout_ms() -> u64 {
    crate::DEFAULT_REQUEST_TIMEOUT.as_millis() as u64
}

fn default_rekey_interval_secs() -> u64 {
    crate::DEFAULT_REKEY_INTERVAL.as_secs()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display()).into()))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is malformed or invalid.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string().into()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        validate_host_port(&self.address)?;

        if self.client_id == 0 {
            return Err(Error::Config("client_id must be non-zero".into()));
        }
        if self.keys.client_private_key.as_os_str().is_empty() {
            return Err(Error::Config("keys.client_private_key is empty".into()));
        }
        if self.keys.server_public_key.as_os_str().is_empty() {
            return Err(Error::Config("keys.server_public_key is empty".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be non-zero".into()));
        }
        if self.rekey_interval_secs == 0 {
            return Err(Error::Config("rekey_interval_secs must be non-zero".into()));
        }
        Ok(())
    }

    /// Reply timeout for each request
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Interval between session key refreshes
    #[must_use]
    pub fn rekey_interval(&self) -> Duration {
        Duration::from_secs(self.rekey_interval_secs)
    }

    /// Resolve a key path against `keys.dir`
    #[must_use]
    pub fn key_path(&self, path: &Path) -> PathBuf {
        match &self.keys.dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Read a key file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read.
    pub fn get_key_file(&self, path: &Path) -> Result<Vec<u8>> {
        let resolved = self.key_path(path);
        fs::read(&resolved)
            .map_err(|e| Error::Config(format!("reading key {}: {e}", resolved.display()).into()))
    }
}

fn validate_host_port(addr: &str) -> Result<()> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return Err(Error::Config(
            format!("address '{addr}' missing port (expected format: host:port)").into(),
        ));
    };

    let port: u16 = port
        .parse()
        .map_err(|_| Error::Config(format!("address '{addr}' has invalid port: {port}").into()))?;
    if port == 0 {
        return Err(Error::Config(format!("address '{addr}' has invalid port: 0").into()));
    }
    if host.is_empty() {
        return Err(Error::Config(format!("address '{addr}' has empty hostname").into()));
    }
    Ok(())
}
