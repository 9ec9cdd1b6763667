// ============ iCKB SDK ============
// Plans CKB <-> iCKB conversions on Nervos CKB
// Classifies a wallet's cells, picks pool deposits, and builds unsigned transactions

pub mod cache;
pub mod chain;
pub mod change;
pub mod classify;
pub mod config;
pub mod convert;
pub mod history;
pub mod memory;
pub mod pool;
pub mod skeleton;
pub mod state;
pub mod txinfo;

#[cfg(test)]
mod fixtures;

pub use cache::ChainCache;
pub use chain::{ChainClient, ChainError, Page, TransactionView, TxCellRef, TxRecord};
pub use change::add_change;
pub use classify::{classify, Classified, Deposit, MyOrder, Receipt, WithdrawalGroup};
pub use config::{Chain, Config, ConfigError, PlannerConfig, ScriptConfig, ScriptInfo, WalletConfig};
pub use convert::{base, convert};
pub use history::{history, Event, EventKind, HistoryScanner};
pub use memory::{ChainSnapshot, MemoryChain};
pub use pool::{rank_pool, sample_pool, ExtendedDeposit};
pub use skeleton::{InputEntry, OutputEntry, TxSkeleton};
pub use state::{Direction, L1State, MaturityEntry};
pub use txinfo::{Asset, PlanError, TxInfo};
