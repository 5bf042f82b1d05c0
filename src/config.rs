//! Configuration for the sanitation publisher
//!
//! Every field has a default matching the fixed deployment constants, so the
//! publisher runs without a configuration file. A TOML file may override any of
//! them. Credentials never live in the file, only the names of the environment
//! variables that hold them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main publisher configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PublisherConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub tls: TlsSection,
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub table: TableSection,
}

/// MQTT broker section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker URL, must use the mqtts scheme
    #[serde(default = "default_broker_url")]
    pub url: String,
    /// MQTT client identifier (the IoT thing name)
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Topic every payload is published to
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// How long to wait for CONNACK before giving up
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_broker_url() -> String {
    "mqtts://a1amrksqm7ehvm-ats.iot.eu-north-1.amazonaws.com:8883".to_string()
}

fn default_client_id() -> String {
    "basicPubSub".to_string()
}

fn default_topic() -> String {
    "sdk/test/python".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            client_id: default_client_id(),
            topic: default_topic(),
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Mutual TLS material, all PEM files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsSection {
    #[serde(default = "default_ca_path")]
    pub ca_path: PathBuf,
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
}

fn default_ca_path() -> PathBuf {
    PathBuf::from("../root-CA.crt")
}

fn default_cert_path() -> PathBuf {
    PathBuf::from("../foodsurakhsha247.cert.pem")
}

fn default_key_path() -> PathBuf {
    PathBuf::from("../foodsurakhsha247.private.key")
}

impl Default for TlsSection {
    fn default() -> Self {
        Self {
            ca_path: default_ca_path(),
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

/// Spreadsheet input section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSection {
    #[serde(default = "default_spreadsheet")]
    pub spreadsheet: PathBuf,
    /// Directory the `Image` column is resolved against
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,
}

fn default_spreadsheet() -> PathBuf {
    PathBuf::from("../food_data.xlsx")
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("../images")
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            spreadsheet: default_spreadsheet(),
            images_dir: default_images_dir(),
        }
    }
}

/// Remote results table section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSection {
    #[serde(default = "default_table_name")]
    pub name: String,
    /// Primary key attribute used for deletes
    #[serde(default = "default_key_attribute")]
    pub key_attribute: String,
    /// Environment variable containing the access key id
    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,
    /// Environment variable containing the secret access key
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
    /// Environment variable containing the region
    #[serde(default = "default_region_env")]
    pub region_env: String,
}

fn default_table_name() -> String {
    "TestResults".to_string()
}

fn default_key_attribute() -> String {
    "id_number".to_string()
}

fn default_access_key_env() -> String {
    "AWS_ACCESS_KEY_DB".to_string()
}

fn default_secret_key_env() -> String {
    "AWS_SECRET_KEY_DB".to_string()
}

fn default_region_env() -> String {
    "AWS_REGION_DB".to_string()
}

impl Default for TableSection {
    fn default() -> Self {
        Self {
            name: default_table_name(),
            key_attribute: default_key_attribute(),
            access_key_env: default_access_key_env(),
            secret_key_env: default_secret_key_env(),
            region_env: default_region_env(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PublisherConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PublisherConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.client_id.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.client_id must not be empty".to_string(),
            ));
        }

        crate::protocol::validate_publish_topic(&self.broker.topic)
            .map_err(|e| ConfigError::InvalidConfig(format!("broker.topic: {e}")))?;

        if self.broker.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.table.name.trim().is_empty() || self.table.key_attribute.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "table.name and table.key_attribute must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
