// ============ Configuration ============
// Script identities, wallet identity and planner knobs, loaded from JSON

use ickb_types::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// On-chain script identity plus the cell deps needed to run it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptInfo {
    #[serde(with = "hex_serde::byte32")]
    pub code_hash: Byte32,
    pub hash_type: HashType,
    #[serde(with = "hex_serde::bytes", default)]
    pub args: Vec<u8>,
    #[serde(default)]
    pub cell_deps: Vec<CellDep>,
}

impl ScriptInfo {
    pub fn script(&self) -> Script {
        Script::new(self.code_hash, self.hash_type, self.args.clone())
    }
}

/// The five scripts the iCKB protocol is built from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub dao: ScriptInfo,
    pub ickb_logic: ScriptInfo,
    pub owned_owner: ScriptInfo,
    pub limit_order: ScriptInfo,
    /// xUDT instance of the iCKB token
    pub ickb_udt: ScriptInfo,
}

impl ScriptConfig {
    pub fn dao(&self) -> Script {
        self.dao.script()
    }

    pub fn ickb_logic(&self) -> Script {
        self.ickb_logic.script()
    }

    pub fn owned_owner(&self) -> Script {
        self.owned_owner.script()
    }

    pub fn limit_order(&self) -> Script {
        self.limit_order.script()
    }

    pub fn ickb_udt(&self) -> Script {
        self.ickb_udt.script()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Mainnet,
    Testnet,
    Devnet,
}

fn default_lock_witness_size() -> usize {
    65
}

/// Caller identity; read-only for the planner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    pub chain: Chain,
    pub account_lock: Script,
    /// Cell deps of the account lock, e.g. the secp256k1 dep group
    #[serde(default)]
    pub account_cell_deps: Vec<CellDep>,
    /// Signature placeholder size in the account lock witness
    #[serde(default = "default_lock_witness_size")]
    pub lock_witness_size: usize,
    pub scripts: ScriptConfig,
}

/// Planner knobs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Limit orders give up `1 / order_fee_divisor` of the exchange ratio to matchers
    pub order_fee_divisor: u64,
    /// Network fees are rounded up to a multiple of this, in shannons
    pub fee_quantum: u64,
    /// Added to the node fee rate, in shannons per 1000 bytes
    pub fee_rate_bump: u64,
    pub max_outputs: usize,
    pub pool_sample_size: usize,
    pub pool_sample_divisor: usize,
    pub max_redeemable_deposits: usize,
    pub min_lock: Epoch,
    /// CKB kept out of `ckb_available`, in shannons
    pub ckb_reserve: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            order_fee_divisor: 1000,
            fee_quantum: 2000,
            fee_rate_bump: 1000,
            max_outputs: 64,
            pool_sample_size: 40,
            pool_sample_divisor: 180,
            max_redeemable_deposits: 30,
            min_lock: Epoch::new(0, 1, 4),
            ckb_reserve: 1000 * CKB,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub wallet: WalletConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.planner;
        if p.order_fee_divisor == 0 {
            return Err(ConfigError::Invalid("order_fee_divisor must be positive".into()));
        }
        if p.fee_quantum == 0 {
            return Err(ConfigError::Invalid("fee_quantum must be positive".into()));
        }
        if p.max_outputs == 0 || p.pool_sample_size == 0 || p.pool_sample_divisor == 0 {
            return Err(ConfigError::Invalid(
                "output and pool sampling limits must be positive".into(),
            ));
        }
        if p.min_lock.length == 0 {
            return Err(ConfigError::Invalid("min_lock epoch length must be positive".into()));
        }
        let scripts = &self.wallet.scripts;
        if self.wallet.account_lock == scripts.ickb_logic()
            || self.wallet.account_lock == scripts.owned_owner()
            || self.wallet.account_lock == scripts.limit_order()
        {
            return Err(ConfigError::Invalid(
                "account lock collides with a protocol lock".into(),
            ));
        }
        Ok(())
    }
}

// ============ Tests ============
