//! Node configuration (C14 half): a `NodeConfig` deserialized from TOML/JSON,
//! validated field-by-field into a list of issues before startup rather than
//! failing on the first bad field — so `coc-node` can report everything
//! wrong with a config file in one pass (exit code 1, §6).

use serde::{Deserialize, Serialize};

/// `off|monitor|enforce`, shared by `signatureEnforcement` and `p2pInboundAuthMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    Off,
    Monitor,
    Enforce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: String,
    #[serde(default)]
    pub enable_pruning: bool,
    pub nonce_retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "leveldb".to_string(),
            enable_pruning: false,
            nonce_retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub chain_id: u32,
    pub rpc_port: u16,
    pub ws_port: u16,
    pub p2p_port: u16,
    pub ipfs_port: u16,
    pub validators: Vec<String>,
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
    #[serde(default = "default_finality_depth")]
    pub finality_depth: u64,
    #[serde(default = "default_max_tx_per_block")]
    pub max_tx_per_block: usize,
    #[serde(default)]
    pub min_gas_price_wei: u64,
    #[serde(default = "default_p2p_max_peers")]
    pub p2p_max_peers: usize,
    #[serde(default = "default_p2p_max_discovered_per_batch")]
    pub p2p_max_discovered_per_batch: usize,
    #[serde(default = "default_p2p_rate_limit_window_ms")]
    pub p2p_rate_limit_window_ms: u64,
    #[serde(default = "default_p2p_rate_limit_max_requests")]
    pub p2p_rate_limit_max_requests: u32,
    #[serde(default)]
    pub p2p_require_inbound_auth: bool,
    #[serde(default = "default_off")]
    pub p2p_inbound_auth_mode: EnforcementMode,
    #[serde(default = "default_p2p_auth_max_clock_skew_ms")]
    pub p2p_auth_max_clock_skew_ms: u64,
    #[serde(default)]
    pub storage: StorageConfig,
    pub pose_nonce_registry_path: String,
    #[serde(default = "default_pose_max_challenges_per_epoch")]
    pub pose_max_challenges_per_epoch: u32,
    #[serde(default = "default_off")]
    pub signature_enforcement: EnforcementMode,
    #[serde(default)]
    pub rpc_auth_token: Option<String>,
    #[serde(default)]
    pub enable_admin_rpc: bool,
}

fn default_block_time_ms() -> u64 {
    2_000
}
fn default_finality_depth() -> u64 {
    3
}
fn default_max_tx_per_block() -> usize {
    500
}
fn default_p2p_max_peers() -> usize {
    50
}
fn default_p2p_max_discovered_per_batch() -> usize {
    200
}
fn default_p2p_rate_limit_window_ms() -> u64 {
    60_000
}
fn default_p2p_rate_limit_max_requests() -> u32 {
    240
}
fn default_p2p_auth_max_clock_skew_ms() -> u64 {
    120_000
}
fn default_pose_max_challenges_per_epoch() -> u32 {
    10
}
fn default_off() -> EnforcementMode {
    EnforcementMode::Off
}

/// One field-level validation failure, collected rather than raised
/// immediately so all issues in a config file can be reported at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validates every field, returning every issue found rather than the
    /// first one (§6, §11 config-issue reporting).
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.chain_id == 0 {
            issues.push(ConfigIssue {
                field: "chainId",
                message: "must be non-zero".to_string(),
            });
        }
        for (field, port) in [
            ("rpcPort", self.rpc_port),
            ("wsPort", self.ws_port),
            ("p2pPort", self.p2p_port),
            ("ipfsPort", self.ipfs_port),
        ] {
            if port == 0 {
                issues.push(ConfigIssue {
                    field,
                    message: "port must be in 1..65535".to_string(),
                });
            }
        }
        if self.validators.is_empty() {
            issues.push(ConfigIssue {
                field: "validators",
                message: "must be a non-empty list of node ids".to_string(),
            });
        }
        for (i, v) in self.validators.iter().enumerate() {
            if !is_hex32(v) {
                issues.push(ConfigIssue {
                    field: "validators",
                    message: format!("entry {i} is not a 32-byte hex node id: {v}"),
                });
            }
        }
        if self.block_time_ms < 100 {
            issues.push(ConfigIssue {
                field: "blockTimeMs",
                message: "must be >= 100".to_string(),
            });
        }
        if self.finality_depth < 1 {
            issues.push(ConfigIssue {
                field: "finalityDepth",
                message: "must be >= 1".to_string(),
            });
        }
        if self.max_tx_per_block < 1 {
            issues.push(ConfigIssue {
                field: "maxTxPerBlock",
                message: "must be >= 1".to_string(),
            });
        }
        if self.p2p_rate_limit_window_ms < 100 {
            issues.push(ConfigIssue {
                field: "p2pRateLimitWindowMs",
                message: "must be >= 100".to_string(),
            });
        }
        if self.p2p_auth_max_clock_skew_ms < 1_000 {
            issues.push(ConfigIssue {
                field: "p2pAuthMaxClockSkewMs",
                message: "must be >= 1000".to_string(),
            });
        }
        if self.storage.backend != "leveldb" {
            issues.push(ConfigIssue {
                field: "storage.backend",
                message: format!("unsupported backend '{}', only 'leveldb' is recognized", self.storage.backend),
            });
        }
        if self.storage.nonce_retention_days < 1 {
            issues.push(ConfigIssue {
                field: "storage.nonceRetentionDays",
                message: "must be >= 1".to_string(),
            });
        }
        if self.pose_nonce_registry_path.trim().is_empty() {
            issues.push(ConfigIssue {
                field: "poseNonceRegistryPath",
                message: "must not be empty".to_string(),
            });
        }
        if self.pose_max_challenges_per_epoch < 1 {
            issues.push(ConfigIssue {
                field: "poseMaxChallengesPerEpoch",
                message: "must be >= 1".to_string(),
            });
        }
        if self.p2p_require_inbound_auth && self.p2p_inbound_auth_mode == EnforcementMode::Off {
            issues.push(ConfigIssue {
                field: "p2pInboundAuthMode",
                message: "cannot be 'off' while p2pRequireInboundAuth is true".to_string(),
            });
        }

        issues
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

fn is_hex32(s: &str) -> bool {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    stripped.len() == 64 && stripped.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> NodeConfig {
        NodeConfig {
            chain_id: 1337,
            rpc_port: 8545,
            ws_port: 8546,
            p2p_port: 30303,
            ipfs_port: 5001,
            validators: vec![format!("0x{}", "11".repeat(32))],
            block_time_ms: 2000,
            finality_depth: 3,
            max_tx_per_block: 500,
            min_gas_price_wei: 0,
            p2p_max_peers: 50,
            p2p_max_discovered_per_batch: 200,
            p2p_rate_limit_window_ms: 60_000,
            p2p_rate_limit_max_requests: 240,
            p2p_require_inbound_auth: false,
            p2p_inbound_auth_mode: EnforcementMode::Off,
            p2p_auth_max_clock_skew_ms: 120_000,
            storage: StorageConfig::default(),
            pose_nonce_registry_path: "./data/pose_nonces".to_string(),
            pose_max_challenges_per_epoch: 10,
            signature_enforcement: EnforcementMode::Off,
            rpc_auth_token: None,
            enable_admin_rpc: false,
        }
    }

    #[test]
    fn a_well_formed_config_has_no_issues() {
        assert!(valid_config().is_valid());
    }

    #[test]
    fn collects_every_issue_in_one_pass() {
        let mut cfg = valid_config();
        cfg.chain_id = 0;
        cfg.rpc_port = 0;
        cfg.validators = vec![];
        let issues = cfg.validate();
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn rejects_malformed_validator_ids() {
        let mut cfg = valid_config();
        cfg.validators = vec!["not-hex".to_string()];
        let issues = cfg.validate();
        assert!(issues.iter().any(|i| i.field == "validators"));
    }

    #[test]
    fn parses_toml() {
        let toml_src = r#"
chain_id = 1
rpc_port = 8545
ws_port = 8546
p2p_port = 30303
ipfs_port = 5001
validators = []
pose_nonce_registry_path = "./data"
"#;
        let cfg = NodeConfig::from_toml_str(toml_src).unwrap();
        assert_eq!(cfg.block_time_ms, 2000);
    }
}
