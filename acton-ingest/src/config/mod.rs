//! Configuration management for acton-ingest
//!
//! Only the runtime wiring is configurable: where files are posted, where
//! security events go and how many transfers may run at once. The size limit,
//! the allow-lists and the signature table are compiled in (see
//! [`signatures`](crate::signatures)) and cannot be relaxed from a file.
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `ACTON_` prefix, `__` for nesting)
//! 2. `./config.toml` (development)
//! 3. `~/.config/acton-ingest/{service}/config.toml` (user config, XDG)
//! 4. `/etc/acton-ingest/{service}/config.toml` (system config)
//! 5. Hardcoded defaults (fallback)
//!
//! Example: `ACTON_COORDINATOR__MAX_CONCURRENT_TRANSFERS=8`
//!
//! # Example Configuration
//!
//! ```toml
//! [storage]
//! upload_url = "https://files.example.com/files/upload"
//!
//! [security_log]
//! endpoint = "https://files.example.com/api/security/log"
//! enabled = true
//! queue_capacity = 256
//!
//! [coordinator]
//! max_concurrent_transfers = 4
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Storage collaborator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Endpoint receiving `multipart/form-data` uploads
    pub upload_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            upload_url: "http://localhost:3000/files/upload".to_string(),
        }
    }
}

/// Security event logger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityLogSettings {
    /// Endpoint receiving JSON security events
    pub endpoint: String,

    /// Forward events to the endpoint (events are always logged locally)
    pub enabled: bool,

    /// Events buffered before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for SecurityLogSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/security/log".to_string(),
            enabled: true,
            queue_capacity: 256,
        }
    }
}

/// Upload coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Maximum number of records transmitting at the same time
    pub max_concurrent_transfers: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: 4,
        }
    }
}

impl CoordinatorSettings {
    /// Concurrency limit actually applied (never below 1)
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrent_transfers.max(1)
    }
}

/// Complete acton-ingest configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Storage collaborator settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Security event logger settings
    #[serde(default)]
    pub security_log: SecurityLogSettings,

    /// Upload coordinator settings
    #[serde(default)]
    pub coordinator: CoordinatorSettings,
}

impl IngestConfig {
    /// Load configuration for a specific service
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Default configuration cannot be serialized to TOML
    /// - A configuration file cannot be read or parsed
    /// - Configuration values fail type conversion
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use acton_ingest::config::IngestConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = IngestConfig::load_for_service("cloud-spaces")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn load_for_service(service_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::new().merge(Toml::string(&toml::to_string(&Self::default())?));

        let system_config = PathBuf::from("/etc/acton-ingest")
            .join(service_name)
            .join("config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        let user_config = Self::recommended_path(service_name);
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        let local_config = PathBuf::from("./config.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        figment = figment.merge(Env::prefixed("ACTON_").split("__").lowercase(true));

        Ok(figment.extract()?)
    }

    /// Load configuration from a specific file
    ///
    /// A missing file yields the defaults (plus environment overrides).
    ///
    /// # Errors
    ///
    /// Returns an error if the file contains invalid TOML or values of the wrong type.
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config = Figment::new()
            .merge(Toml::string(&toml::to_string(&Self::default())?))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ACTON_").split("__").lowercase(true))
            .extract()?;

        Ok(config)
    }

    /// Get the recommended XDG config path for a service
    ///
    /// # Example
    ///
    /// ```rust
    /// use acton_ingest::config::IngestConfig;
    ///
    /// let path = IngestConfig::recommended_path("cloud-spaces");
    /// // Returns: ~/.config/acton-ingest/cloud-spaces/config.toml
    /// assert!(path.ends_with("config.toml"));
    /// ```
    #[must_use]
    pub fn recommended_path(service_name: &str) -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./config.toml"),
            |config_dir| {
                config_dir
                    .join("acton-ingest")
                    .join(service_name)
                    .join("config.toml")
            },
        )
    }
}
