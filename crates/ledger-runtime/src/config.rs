//! # Runtime Configuration
//!
//! Loaded from the JSON file named by `RL_CONFIG` (if any), then overridden
//! by `RL_*` environment variables.
//!
//! ## Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `RL_DATA_DIR` | `data_dir` |
//! | `RL_STORAGE_BACKEND` | `storage_backend` (`memory`, `file`, `rocksdb`) |
//! | `RL_FEED_PATH` | `feed_path` (`-` for stdin) |
//! | `RL_LOG_LEVEL` | `log_level` |
//! | `RL_PAYOUT_ENABLED` | `payout.enabled` |
//! | `RL_PAYOUT_INTERVAL_SECS` | `payout.interval_secs` |
//! | `RL_FINALIZE_INTERVAL_SECS` | `finalize_interval_secs` |

use reward_ledger::{ConfirmationDepthPolicy, LedgerConfig, ShareMiningSchedule};
use serde::{Deserialize, Serialize};
use shared_types::{hex_bytes, Address, Amount, AmountError, BlockNumber, PoolName, RoundId};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },

    #[error("Malformed config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Unknown storage backend: {0}")]
    UnknownBackend(String),

    #[error("Storage backend {0} is not compiled in; rebuild with the `rocksdb` feature")]
    BackendUnavailable(StorageBackend),

    #[error("Round {round}: {reason}")]
    InvalidRound { round: RoundId, reason: String },

    #[error("Interval for {0} must be at least one second")]
    ZeroInterval(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    RocksDb,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            "rocksdb" => Ok(StorageBackend::RocksDb),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StorageBackend::Memory => "memory",
            StorageBackend::File => "file",
            StorageBackend::RocksDb => "rocksdb",
        };
        f.write_str(name)
    }
}

/// Share mining parameters of a round.
///
/// `reward_per_block` is split across `pools` in proportion to their
/// weights, rounding each share down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareMiningConfig {
    pub reward_per_block: Amount,
    pub pools: Vec<PoolConfig>,
}

/// A pool whose token holders share in a round's share mining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: PoolName,
    #[serde(with = "hex_bytes")]
    pub token: Address,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl ShareMiningConfig {
    /// Per-block reward of each pool, in pool order.
    pub fn pool_rewards(&self) -> Result<Vec<(&PoolConfig, Amount)>, AmountError> {
        let total: u64 = self.pools.iter().map(|p| u64::from(p.weight)).sum();
        let total = Amount::from_raw(i128::from(total));
        self.pools
            .iter()
            .map(|pool| {
                let weight = Amount::from_raw(i128::from(pool.weight));
                Ok((pool, self.reward_per_block.mul_div_down(weight, total)?))
            })
            .collect()
    }
}

/// One mining round as configured by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningRoundConfig {
    pub round: RoundId,
    pub begin_block: BlockNumber,
    pub end_block: BlockNumber,
    /// Blocks required on top of `end_block` before the round matures.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default)]
    pub share_mining: Option<ShareMiningConfig>,
}

fn default_confirmations() -> u64 {
    12
}

/// Payout cycle configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 60,
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory holding the store and the process lock.
    pub data_dir: PathBuf,
    pub storage_backend: StorageBackend,
    /// Newline-delimited JSON block feed; `-` reads stdin.
    pub feed_path: String,
    pub log_level: String,
    pub max_reorg_depth: u64,
    pub initial_nonce: u64,
    pub finalize_interval_secs: u64,
    pub payout: PayoutConfig,
    pub rounds: Vec<MiningRoundConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            storage_backend: StorageBackend::default(),
            feed_path: "-".to_string(),
            log_level: "info".to_string(),
            max_reorg_depth: LedgerConfig::default().max_reorg_depth,
            initial_nonce: 0,
            finalize_interval_secs: 30,
            payout: PayoutConfig::default(),
            rounds: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load from `RL_CONFIG` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("RL_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply `RL_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(dir) = lookup("RL_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup("RL_STORAGE_BACKEND") {
            self.storage_backend = backend.parse()?;
        }
        if let Some(feed) = lookup("RL_FEED_PATH") {
            self.feed_path = feed;
        }
        if let Some(level) = lookup("RL_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(enabled) = lookup("RL_PAYOUT_ENABLED") {
            self.payout.enabled = parse_env("RL_PAYOUT_ENABLED", enabled)?;
        }
        if let Some(secs) = lookup("RL_PAYOUT_INTERVAL_SECS") {
            self.payout.interval_secs = parse_env("RL_PAYOUT_INTERVAL_SECS", secs)?;
        }
        if let Some(secs) = lookup("RL_FINALIZE_INTERVAL_SECS") {
            self.finalize_interval_secs = parse_env("RL_FINALIZE_INTERVAL_SECS", secs)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.finalize_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval("finalization"));
        }
        if self.payout.enabled && self.payout.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval("payout"));
        }
        if self.storage_backend == StorageBackend::RocksDb && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::BackendUnavailable(StorageBackend::RocksDb));
        }

        let mut seen = HashSet::new();
        for round in &self.rounds {
            let invalid = |reason: &str| ConfigError::InvalidRound {
                round: round.round.clone(),
                reason: reason.to_string(),
            };
            if !seen.insert(&round.round) {
                return Err(invalid("configured more than once"));
            }
            if round.begin_block > round.end_block {
                return Err(invalid("begin_block is after end_block"));
            }
            if let Some(share) = &round.share_mining {
                if !share.reward_per_block.is_positive() {
                    return Err(invalid("reward_per_block must be positive"));
                }
                if share.pools.is_empty() {
                    return Err(invalid("share mining needs at least one pool"));
                }
                let mut names = HashSet::new();
                for pool in &share.pools {
                    if !names.insert(&pool.name) {
                        return Err(invalid("pool configured more than once"));
                    }
                    if pool.name.is_external() {
                        return Err(invalid("pool name is reserved for feed credits"));
                    }
                    if pool.weight == 0 {
                        return Err(invalid("pool weight must be positive"));
                    }
                }
            }
        }
        Ok(())
    }

    /// One share mining schedule per configured pool.
    pub fn ledger_config(&self) -> Result<LedgerConfig, ConfigError> {
        let mut config = LedgerConfig::new()
            .with_max_reorg_depth(self.max_reorg_depth)
            .with_initial_nonce(self.initial_nonce);
        for round in &self.rounds {
            let Some(share) = &round.share_mining else {
                continue;
            };
            let rewards = share.pool_rewards().map_err(|e| ConfigError::InvalidRound {
                round: round.round.clone(),
                reason: e.to_string(),
            })?;
            for (pool, reward_per_block) in rewards {
                config = config.with_share_mining(ShareMiningSchedule {
                    round: round.round.clone(),
                    pool: pool.name.clone(),
                    token: pool.token,
                    begin_block: round.begin_block,
                    end_block: round.end_block,
                    reward_per_block,
                });
            }
        }
        Ok(config)
    }

    /// Rounds mature `confirmations` blocks after their end block.
    pub fn finalization_policy(&self) -> ConfirmationDepthPolicy {
        self.rounds
            .iter()
            .fold(ConfirmationDepthPolicy::new(), |policy, round| {
                policy.with_round(round.round.clone(), round.end_block, round.confirmations)
            })
    }

    pub fn round_ids(&self) -> Vec<RoundId> {
        self.rounds.iter().map(|r| r.round.clone()).collect()
    }
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn round(id: &str, begin: u64, end: u64) -> MiningRoundConfig {
        MiningRoundConfig {
            round: RoundId::new(id).unwrap(),
            begin_block: begin,
            end_block: end,
            confirmations: 6,
            share_mining: None,
        }
    }

    #[test]
    fn test_json_with_defaults() {
        let json = r#"{
            "storage_backend": "memory",
            "rounds": [{
                "round": "2026-q1",
                "begin_block": 100,
                "end_block": 200,
                "share_mining": {
                    "reward_per_block": "2.5",
                    "pools": [{
                        "name": "amm",
                        "token": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
                    }]
                }
            }]
        }"#;
        let config: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.feed_path, "-");
        assert_eq!(config.rounds[0].confirmations, 12);
        config.validate().unwrap();

        let ledger = config.ledger_config().unwrap();
        assert_eq!(ledger.share_mining.len(), 1);
        assert_eq!(ledger.share_mining[0].pool.as_str(), "amm");
        assert_eq!(ledger.share_mining[0].token, [0xAA; 20]);
        assert_eq!(
            ledger.share_mining[0].reward_per_block,
            "2.5".parse::<Amount>().unwrap()
        );
    }

    fn pool(name: &str, token: u8, weight: u32) -> PoolConfig {
        PoolConfig {
            name: PoolName::new(name).unwrap(),
            token: [token; 20],
            weight,
        }
    }

    #[test]
    fn test_weighted_pools_split_reward() {
        let mut r1 = round("r1", 1, 100);
        r1.share_mining = Some(ShareMiningConfig {
            reward_per_block: Amount::from_whole(10),
            pools: vec![pool("amm", 0xAA, 3), pool("lp", 0xBB, 1)],
        });
        let config = RuntimeConfig {
            rounds: vec![r1],
            ..RuntimeConfig::default()
        };
        config.validate().unwrap();

        let ledger = config.ledger_config().unwrap();
        ledger.validate().unwrap();
        let rewards: Vec<(&str, Amount)> = ledger
            .share_mining
            .iter()
            .map(|s| (s.pool.as_str(), s.reward_per_block))
            .collect();
        assert_eq!(
            rewards,
            vec![
                ("amm", "7.5".parse().unwrap()),
                ("lp", "2.5".parse().unwrap()),
            ]
        );
    }

    #[test]
    fn test_validate_rejects_bad_pools() {
        let mut config = RuntimeConfig {
            rounds: vec![round("r1", 1, 100)],
            ..RuntimeConfig::default()
        };
        let cases = [
            vec![],
            vec![pool("amm", 0xAA, 1), pool("amm", 0xBB, 1)],
            vec![pool(PoolName::EXTERNAL, 0xAA, 1)],
            vec![pool("amm", 0xAA, 0)],
        ];
        for pools in cases {
            config.rounds[0].share_mining = Some(ShareMiningConfig {
                reward_per_block: Amount::from_whole(1),
                pools,
            });
            assert!(matches!(config.validate(), Err(ConfigError::InvalidRound { .. })));
        }
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RL_DATA_DIR", "/var/lib/ledger"),
            ("RL_STORAGE_BACKEND", "Memory"),
            ("RL_PAYOUT_ENABLED", "true"),
            ("RL_PAYOUT_INTERVAL_SECS", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = RuntimeConfig::default();
        config
            .apply_env(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ledger"));
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert!(config.payout.enabled);
        assert_eq!(config.payout.interval_secs, 5);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = RuntimeConfig::default();
        let result = config.apply_env(|var| {
            (var == "RL_FINALIZE_INTERVAL_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv {
                var: "RL_FINALIZE_INTERVAL_SECS",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_inconsistent_rounds() {
        let mut config = RuntimeConfig {
            rounds: vec![round("r1", 10, 5)],
            ..RuntimeConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRound { .. })));

        config.rounds = vec![round("r1", 1, 5), round("r1", 6, 9)];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRound { .. })));

        config.rounds = vec![round("r1", 1, 5)];
        config.finalize_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroInterval(_))));
    }

    #[test]
    fn test_finalization_policy_from_rounds() {
        use reward_ledger::{FinalizationPolicy, RoundRecord};

        let config = RuntimeConfig {
            rounds: vec![round("r1", 1, 100)],
            ..RuntimeConfig::default()
        };
        let policy = config.finalization_policy();
        let record = RoundRecord::open(RoundId::new("r1").unwrap(), 1);
        assert!(!policy.should_finalize(&record, Some(105)));
        assert!(policy.should_finalize(&record, Some(106)));
    }
}
