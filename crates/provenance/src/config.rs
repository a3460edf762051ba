//! Service configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! data_dir = "/var/lib/provenance"
//! identity_name = "curator"
//! signing_algorithm = "schnorr-secp256k1"
//!
//! [seal]
//! max_records = 64
//! max_weight = 1000
//! max_open_ms = 3600000
//!
//! [relay]
//! endpoints = ["wss://relay.one", "wss://relay.two"]
//! min_success = 2
//! timeout_policy = "count_as_success"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use provenance_core::SealPolicy;
use provenance_identity::SignatureAlgorithm;
use provenance_relay::{parse_endpoint, BroadcastConfig, SubscriberConfig, TimeoutPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{ProvenanceError, Result};

/// Top-level configuration for [`Provenance`](crate::Provenance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvenanceConfig {
    /// Root directory for keys, the event log and the block database.
    pub data_dir: PathBuf,
    pub identity_name: String,
    /// Signing strategy selected for this deployment.
    pub signing_algorithm: SignatureAlgorithm,
    /// Event log file, relative to `data_dir` unless absolute.
    pub event_log_file: PathBuf,
    /// Sealed block database, relative to `data_dir` unless absolute.
    pub block_db_file: PathBuf,
    pub seal: SealPolicy,
    pub relay: RelaySettings,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("provenance-data"),
            identity_name: "default".to_string(),
            signing_algorithm: SignatureAlgorithm::SchnorrSecp256k1,
            event_log_file: PathBuf::from("events.jsonl"),
            block_db_file: PathBuf::from("blocks.db"),
            seal: SealPolicy::default(),
            relay: RelaySettings::default(),
        }
    }
}

/// Relay endpoints and broadcast behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub endpoints: Vec<String>,
    pub min_success: usize,
    pub connect_timeout_ms: u64,
    pub ack_timeout_ms: u64,
    pub timeout_policy: TimeoutPolicy,
    pub verify_inbound: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            min_success: 1,
            connect_timeout_ms: 5_000,
            ack_timeout_ms: 10_000,
            timeout_policy: TimeoutPolicy::CountAsSuccess,
            verify_inbound: true,
        }
    }
}

impl RelaySettings {
    pub fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            timeout_policy: self.timeout_policy,
        }
    }

    pub fn subscriber_config(&self) -> SubscriberConfig {
        SubscriberConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            verify_inbound: self.verify_inbound,
        }
    }
}

impl ProvenanceConfig {
    /// A default config rooted at `data_dir`.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ProvenanceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ProvenanceError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.identity_name.trim().is_empty() {
            return Err(ProvenanceError::Config("identity_name must not be empty".into()));
        }
        if self.seal.max_records == 0 || self.seal.max_weight == 0 || self.seal.max_open_ms == 0 {
            return Err(ProvenanceError::Config(
                "seal thresholds must be greater than zero".into(),
            ));
        }
        if self.relay.connect_timeout_ms == 0 || self.relay.ack_timeout_ms == 0 {
            return Err(ProvenanceError::Config("relay timeouts must be greater than zero".into()));
        }
        for endpoint in &self.relay.endpoints {
            parse_endpoint(endpoint).map_err(|e| ProvenanceError::Config(e.to_string()))?;
        }
        if !self.relay.endpoints.is_empty() && self.relay.min_success > self.relay.endpoints.len() {
            return Err(ProvenanceError::Config(format!(
                "min_success {} exceeds the {} configured endpoints",
                self.relay.min_success,
                self.relay.endpoints.len()
            )));
        }
        Ok(())
    }

    pub fn key_dir(&self) -> PathBuf {
        self.data_dir.join("keys")
    }

    pub fn event_log_path(&self) -> PathBuf {
        self.data_dir.join(&self.event_log_file)
    }

    pub fn block_db_path(&self) -> PathBuf {
        self.data_dir.join(&self.block_db_file)
    }
}
