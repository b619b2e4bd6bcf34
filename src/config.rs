//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_BUS_HOST, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! Broker address, credentials and topic names are supplied here at startup; the
//! pipeline itself never reads the environment.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub classifier: ClassifierConfig,
    pub bus: BusConfig,
    pub storage: StorageConfig,
}

/// HTTP server settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: accept connections from the microphone nodes on the LAN
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// External inference service settings.
///
/// ## Fields:
/// - `endpoint_url`: HTTP endpoint of the inference service that scores waveforms
/// - `class_map_path`: CSV file mapping model class indices to display names
///   (YAMNet-style class map; open vocabulary, loaded at startup)
/// - `target_samples`: fixed waveform length the model accepts (16000 = 1s @ 16kHz)
/// - `timeout_secs`: bound on each classification call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub endpoint_url: String,
    pub class_map_path: String,
    pub target_samples: usize,
    pub timeout_secs: u64,
}

/// Message bus (MQTT broker) settings.
///
/// ## Fields:
/// - `event_topic`: topic classification events are published on
/// - `heartbeat_topic`: distinct topic for the periodic liveness signal
/// - `heartbeat_interval_secs`: heartbeat cadence, independent of request traffic
/// - `publish_timeout_secs`: bound on each publish before it counts as failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub event_topic: String,
    pub heartbeat_topic: String,
    pub heartbeat_interval_secs: u64,
    pub publish_timeout_secs: u64,
}

/// Local storage paths.
///
/// ## Fields:
/// - `results_path`: append-only CSV of classification outcomes
/// - `latest_capture_path`: scratch file holding the most recent raw upload,
///   overwritten on every /upload for offline inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub results_path: String,
    pub latest_capture_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5050,
            },
            classifier: ClassifierConfig {
                endpoint_url: "http://127.0.0.1:8501/v1/classify".to_string(),
                class_map_path: "class_map.csv".to_string(),
                target_samples: 16000, // 1 second at the model's 16kHz input rate
                timeout_secs: 10,
            },
            bus: BusConfig {
                host: "127.0.0.1".to_string(),
                port: 1883,
                username: String::new(),
                password: String::new(),
                client_id: "audio-relay-backend".to_string(),
                event_topic: "audio/prediction".to_string(),
                heartbeat_topic: "audio/heartbeat".to_string(),
                heartbeat_interval_secs: 60,
                publish_timeout_secs: 5,
            },
            storage: StorageConfig {
                results_path: "classification_log.csv".to_string(),
                latest_capture_path: "last_audio.raw".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, then config.toml, then APP_* environment
    /// variables, with `HOST`/`PORT` as deployment-platform overrides.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching configuration errors at startup prevents runtime failures and
    /// gives a clear message about what is wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.bus.port == 0 {
            return Err(anyhow::anyhow!("Bus port cannot be 0"));
        }

        if self.classifier.target_samples == 0 {
            return Err(anyhow::anyhow!("Classifier target_samples must be greater than 0"));
        }

        if self.bus.heartbeat_interval_secs == 0 {
            return Err(anyhow::anyhow!("Heartbeat interval must be greater than 0"));
        }

        if self.bus.publish_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Publish timeout must be greater than 0"));
        }

        if self.classifier.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Classifier timeout must be greater than 0"));
        }

        if self.bus.event_topic.is_empty() || self.bus.heartbeat_topic.is_empty() {
            return Err(anyhow::anyhow!("Bus topics cannot be empty"));
        }

        if self.storage.results_path.is_empty() {
            return Err(anyhow::anyhow!("Results path cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5050);
        assert_eq!(config.classifier.target_samples, 16000);
        assert_eq!(config.bus.heartbeat_interval_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_zero_target_samples() {
        let mut config = AppConfig::default();
        config.classifier.target_samples = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_empty_topic() {
        let mut config = AppConfig::default();
        config.bus.event_topic = String::new();
        assert!(config.validate().is_err());
    }
}
