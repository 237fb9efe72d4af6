//! Node configuration with TOML file support.

use std::path::Path;
use std::time::Duration;

use poha_consensus::{AuthorityConfig, ValidatorSet};
use poha_crypto::{generate_keypair, keypair_from_seed};
use poha_humanity::RegistryConfig;
use poha_network::NetworkConfig;
use poha_types::{Address, KeyPair};
use poha_utils::LogFormat;
use serde::{Deserialize, Serialize};

use crate::NodeError;

/// Configuration for a POHA node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the peer listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Address advertised to peers in discovery messages.
    #[serde(default)]
    pub public_addr: Option<String>,

    /// Peers dialed on startup.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,

    #[serde(default = "default_max_peers")]
    pub max_peers: usize,

    #[serde(default = "default_discovery_interval_secs")]
    pub discovery_interval_secs: u64,

    /// The authorized validator addresses.
    #[serde(default)]
    pub validators: Vec<String>,

    /// Hex-encoded 32-byte Ed25519 seed. A fresh key is generated when unset.
    #[serde(default)]
    pub key_seed: Option<String>,

    #[serde(default = "default_block_time_secs")]
    pub block_time_secs: u64,

    #[serde(default = "default_max_block_transactions")]
    pub max_block_transactions: usize,

    /// Start mining once the node is up.
    #[serde(default)]
    pub mine: bool,

    /// Check humanity through an out-of-process gateway.
    #[serde(default)]
    pub use_external_poh: bool,

    #[serde(default)]
    pub external_poh_base_url: Option<String>,

    #[serde(default)]
    pub external_poh_api_key: Option<String>,

    /// Run the local humanity simulator and verify against it.
    #[serde(default)]
    pub use_poh_simulator: bool,

    #[serde(default = "default_poh_simulator_port")]
    pub poh_simulator_port: u16,

    #[serde(default = "default_verification_ttl_secs")]
    pub verification_ttl_secs: u64,

    #[serde(default = "default_verification_sweep_secs")]
    pub verification_sweep_secs: u64,

    /// Development only: the node marks its own address verified at boot
    /// when the humanity registry is local.
    #[serde(default)]
    pub dev_auto_verify: bool,

    /// Serve Prometheus metrics on this address when set.
    #[serde(default)]
    pub metrics_addr: Option<String>,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Which humanity backend the node verifies against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifierMode {
    /// This node's own registry. Single-validator networks only: the registry
    /// never holds another validator's verification.
    Internal,
    Simulator { port: u16 },
    Remote {
        base_url: String,
        api_key: Option<String>,
    },
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_listen_addr() -> String {
    "0.0.0.0:7600".to_string()
}

fn default_max_peers() -> usize {
    50
}

fn default_discovery_interval_secs() -> u64 {
    30
}

fn default_block_time_secs() -> u64 {
    5
}

fn default_max_block_transactions() -> usize {
    500
}

fn default_poh_simulator_port() -> u16 {
    7700
}

fn default_verification_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_verification_sweep_secs() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// The node key: derived from `key_seed` when set, random otherwise.
    pub fn key_pair(&self) -> Result<KeyPair, NodeError> {
        let Some(seed) = self.key_seed.as_deref() else {
            return Ok(generate_keypair());
        };
        let bytes = hex::decode(seed.trim())
            .map_err(|e| NodeError::Config(format!("key_seed is not hex: {e}")))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            NodeError::Config(format!("key_seed must be 32 bytes, got {}", b.len()))
        })?;
        Ok(keypair_from_seed(&seed))
    }

    pub fn validator_addresses(&self) -> Vec<Address> {
        self.validators.iter().map(|v| Address::from(v.trim())).collect()
    }

    /// Resolve the humanity backend. The simulator implies an external
    /// gateway; `use_external_poh` alone selects the remote service.
    pub fn verifier_mode(&self) -> Result<VerifierMode, NodeError> {
        if self.use_poh_simulator {
            return Ok(VerifierMode::Simulator {
                port: self.poh_simulator_port,
            });
        }
        if !self.use_external_poh {
            check_internal_validators(&self.validator_addresses())?;
            return Ok(VerifierMode::Internal);
        }
        match self.external_poh_base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(VerifierMode::Remote {
                base_url: url.to_string(),
                api_key: self.external_poh_api_key.clone(),
            }),
            _ => Err(NodeError::Config(
                "use_external_poh requires external_poh_base_url".into(),
            )),
        }
    }

    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            listen_addr: self.listen_addr.clone(),
            public_addr: self.public_addr.clone(),
            max_peers: self.max_peers,
            discovery_interval: Duration::from_secs(self.discovery_interval_secs.max(1)),
            ..NetworkConfig::default()
        }
    }

    pub fn authority_config(&self) -> AuthorityConfig {
        AuthorityConfig {
            block_time: Duration::from_secs(self.block_time_secs.max(1)),
            max_block_transactions: self.max_block_transactions,
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            ttl: Duration::from_secs(self.verification_ttl_secs),
            sweep_interval: Duration::from_secs(self.verification_sweep_secs.max(1)),
        }
    }
}

/// The internal registry can vouch for at most one validator.
pub(crate) fn check_internal_validators(validators: &[Address]) -> Result<(), NodeError> {
    let count = ValidatorSet::new(validators.iter().cloned()).len();
    if count > 1 {
        return Err(NodeError::Config(format!(
            "the internal humanity registry supports one validator, got {count}; \
             use the simulator or an external service"
        )));
    }
    Ok(())
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            public_addr: None,
            bootstrap_peers: Vec::new(),
            max_peers: default_max_peers(),
            discovery_interval_secs: default_discovery_interval_secs(),
            validators: Vec::new(),
            key_seed: None,
            block_time_secs: default_block_time_secs(),
            max_block_transactions: default_max_block_transactions(),
            mine: false,
            use_external_poh: false,
            external_poh_base_url: None,
            external_poh_api_key: None,
            use_poh_simulator: false,
            poh_simulator_port: default_poh_simulator_port(),
            verification_ttl_secs: default_verification_ttl_secs(),
            verification_sweep_secs: default_verification_sweep_secs(),
            dev_auto_verify: false,
            metrics_addr: None,
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}
