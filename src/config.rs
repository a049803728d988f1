// Configuration File Support
//
// This module reads the relay's YAML configuration document and turns its
// webhook definitions into registry entries.
// The file path comes from WEBHOOKER_CONFIG_PATH (or --config), falling back
// to ./webhooker.yml.

use crate::registry::{Registry, TargetEndpoint, WebhookName};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

/// Environment variable selecting the configuration file
pub const CONFIG_PATH_ENV: &str = "WEBHOOKER_CONFIG_PATH";

/// Configuration file used when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "./webhooker.yml";

pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";
pub const DEFAULT_LISTEN_PORT: u16 = 80;
pub const DEFAULT_LISTEN_PORT_SSL: u16 = 443;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Enable debug logging
    pub debug: bool,

    /// Relay listener
    pub listen: ListenConfig,

    /// Webhook definitions, in file order
    pub webhooks: Vec<WebhookConfig>,

    /// Metrics side server
    pub metrics: MetricsConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListenConfig {
    /// Bind host; empty means all interfaces
    pub host: String,

    /// Bind port; 0 means the scheme default
    pub port: u16,

    pub ssl: SslConfig,
}

/// TLS key and certificate paths
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SslConfig {
    /// Private key path (PEM)
    pub key: String,

    /// Certificate chain path (PEM)
    pub crt: String,
}

/// One webhook definition
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebhookConfig {
    pub name: String,
    pub targets: Vec<String>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to run the metrics server
    pub enabled: bool,

    /// Port for metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl Config {
    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// metrics section is invalid. Unlike targets, a broken file is never
    /// partially accepted.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read the configuration file {:?}", path))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse the configuration file {:?}", path))?;

        Ok(config)
    }

    /// Parse a configuration document and apply listener defaults
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        let config = config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Fill in zero values for the listener
    fn apply_defaults(mut self) -> Self {
        if self.listen.host.is_empty() {
            self.listen.host = DEFAULT_LISTEN_HOST.to_string();
        }

        if self.listen.port == 0 {
            self.listen.port = if self.ssl() {
                DEFAULT_LISTEN_PORT_SSL
            } else {
                DEFAULT_LISTEN_PORT
            };
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.metrics.enabled && self.metrics.port == 0 {
            anyhow::bail!("Metrics port must be > 0");
        }
        if self.metrics.enabled && self.metrics.port == self.listen.port {
            anyhow::bail!(
                "Metrics port {} collides with the listen port",
                self.metrics.port
            );
        }
        Ok(())
    }

    /// HTTPS is enabled only when both key and certificate are set
    pub fn ssl(&self) -> bool {
        !self.listen.ssl.key.is_empty() && !self.listen.ssl.crt.is_empty()
    }

    /// `host:port` the relay binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen.host, self.listen.port)
    }

    /// Insert every webhook definition into `registry`
    ///
    /// Targets that do not parse as URLs are dropped with a warning and the
    /// rest of the list is kept. Names are inserted without override, so a
    /// duplicate name fails the whole load.
    ///
    /// # Returns
    ///
    /// The number of webhook definitions registered.
    pub async fn register_webhooks(&self, registry: &Registry) -> Result<usize> {
        for webhook in &self.webhooks {
            let name = WebhookName::new(webhook.name.as_str())
                .context("Invalid webhook definition")?;

            let targets = valid_targets(&name, &webhook.targets);
            registry
                .set(name, targets, false)
                .await
                .context("Invalid webhook definition")?;
        }

        info!("Loaded {} webhook handlers", self.webhooks.len());
        Ok(self.webhooks.len())
    }
}

fn valid_targets(name: &WebhookName, targets: &[String]) -> Vec<TargetEndpoint> {
    targets
        .iter()
        .filter(|target| match Url::parse(target) {
            Ok(_) => true,
            Err(e) => {
                warn!(webhook = %name, url = %target, error = %e, "URL is invalid");
                false
            }
        })
        .map(|target| TargetEndpoint::new(target.as_str()))
        .collect()
}
