// ============ L1 State ============
// Everything the wallet needs for one quote/build pass: balances, pending
// amounts, the ranked deposit pool and the base transaction. `plan` is
// synchronous once the state is loaded.

use crate::cache::ChainCache;
use crate::chain::{ChainClient, ChainError};
use crate::change::add_change;
use crate::classify::{classify, DeferredLookup, MyOrder, Receipt, ResolvedLookup, WithdrawalGroup};
use crate::config::{Config, PlannerConfig, WalletConfig};
use crate::convert::{base, convert};
use crate::pool::{random_seed, rank_pool, sample_pool, ExtendedDeposit};
use crate::txinfo::{count, PlanError, TxInfo};
use futures::future::try_join_all;
use ickb_math::epoch;
use ickb_types::*;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Page size used when scanning every iCKB cell on chain
const UDT_SCAN_PAGE: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    CkbToIckb,
    IckbToCkb,
    /// Only reclaim what is already claimable
    Melt,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ckb2ickb" => Ok(Direction::CkbToIckb),
            "ickb2ckb" => Ok(Direction::IckbToCkb),
            "melt" => Ok(Direction::Melt),
            other => Err(format!("unknown direction {:?}", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::CkbToIckb => write!(f, "ckb2ickb"),
            Direction::IckbToCkb => write!(f, "ickb2ckb"),
            Direction::Melt => write!(f, "melt"),
        }
    }
}

/// A withdrawal the caller is waiting on, or can already claim
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaturityEntry {
    pub owner: Cell,
    pub ckb_amount: u64,
    /// "matured" or a wait time such as "3 days"
    pub wait_time: String,
}

#[derive(Clone, Debug)]
pub struct L1State {
    pub tip: Header,
    /// Chain fee rate plus the configured bump
    pub fee_rate: u64,
    /// Unoccupied CKB held by every pool deposit
    pub ickb_dao_balance: u128,
    /// iCKB in circulation
    pub ickb_udt_pool_balance: u128,
    /// iCKB held by the account
    pub ickb_udt_balance: u128,
    pub ckb_balance: u128,
    /// `ckb_balance` minus the CKB reserve, in whole CKB
    pub ckb_available: u128,
    pub ckb_pending_balance: u128,
    pub ickb_pending_balance: u128,
    pub orders: Vec<MyOrder>,
    pub receipts: Vec<Receipt>,
    pub maturity: Vec<MaturityEntry>,
    pub has_matchable: bool,
    pub pool: Vec<ExtendedDeposit>,
    pub base: TxInfo,
    consumes_intermediate: bool,
    wallet: WalletConfig,
    planner: PlannerConfig,
}

impl L1State {
    pub async fn load(
        client: &dyn ChainClient,
        cache: &ChainCache,
        config: &Config,
    ) -> Result<Self, ChainError> {
        Self::load_with_seed(client, cache, config, &random_seed()).await
    }

    /// `load` with a fixed pool sampling seed
    pub async fn load_with_seed(
        client: &dyn ChainClient,
        cache: &ChainCache,
        config: &Config,
        seed: &[u8; 32],
    ) -> Result<Self, ChainError> {
        let wallet = &config.wallet;
        let planner = &config.planner;
        let scripts = &wallet.scripts;

        let locks = [
            wallet.account_lock.clone(),
            scripts.ickb_logic(),
            scripts.owned_owner(),
            scripts.limit_order(),
        ];
        let (fee_rate, tip, groups) = futures::try_join!(
            client.fee_rate(),
            client.tip_header(),
            try_join_all(locks.iter().map(|lock| client.cells_by_lock(lock))),
        )?;
        let mut seen = HashSet::new();
        let cells: Vec<Cell> = groups
            .into_iter()
            .flatten()
            .filter(|cell| seen.insert(cell.out_point))
            .collect();

        // Dry run to learn which headers and transactions are needed
        let mut deferred = DeferredLookup::default();
        classify(&cells, wallet, &mut deferred);
        let (headers, outputs) = futures::try_join!(
            cache.headers(client, wallet.chain, &deferred.headers),
            cache.transaction_outputs(client, wallet.chain, &deferred.transactions),
        )?;
        let mut resolved = ResolvedLookup::new(headers, outputs);
        let classified = classify(&cells, wallet, &mut resolved);
        debug!(cells = cells.len(), unresolved = resolved.unresolved, "resolved classification");

        let ickb_dao_balance: u128 = classified
            .deposits
            .iter()
            .map(|d| u128::from(d.unoccupied()))
            .sum();
        let (mature, not_mature): (Vec<WithdrawalGroup>, Vec<WithdrawalGroup>) = classified
            .withdrawal_groups
            .into_iter()
            .partition(|g| g.is_mature(&tip));
        let pool = sample_pool(rank_pool(&classified.deposits, &tip, planner.min_lock), planner, seed);

        let consumes_intermediate =
            !mature.is_empty() || !classified.receipts.is_empty() || !classified.orders.is_empty();
        let mut base_info = base(
            &classified.capacities,
            &classified.udts,
            &classified.receipts,
            &mature,
            &classified.orders,
            wallet,
        );

        let mut ckb_balance = base_info
            .tx()
            .map(|tx| u128::try_from(tx.ckb_delta()).unwrap_or(0))
            .unwrap_or(0);
        let ckb_available = (ckb_balance / u128::from(CKB))
            .saturating_sub(u128::from(planner.ckb_reserve / CKB))
            * u128::from(CKB);
        if !not_mature.is_empty() {
            ckb_balance += not_mature
                .iter()
                .map(|g| u128::from(g.withdraw_capacity))
                .sum::<u128>();
            let wait = epoch::max_wait_time(not_mature.iter().map(|g| g.maturity), &tip);
            base_info.steps.insert(
                0,
                format!(
                    "Excluding {} with maturity in {}",
                    count(not_mature.len(), "Withdrawal Request"),
                    wait
                ),
            );
        }

        let (ickb_udt_pool_balance, ickb_udt_balance) = udt_balances(client, wallet).await?;

        let mut ckb_pending_balance = 0u128;
        let mut ickb_pending_balance = 0u128;
        for order in classified.orders.iter().filter(|o| o.info.is_completed()) {
            if order.info.is_ckb_to_udt {
                ickb_pending_balance += order.info.udt_amount;
            } else {
                ckb_pending_balance += u128::from(order.info.ckb_amount);
            }
        }
        ickb_pending_balance += classified.receipts.iter().map(Receipt::ickb_value).sum::<u128>();

        let mut maturity = Vec::with_capacity(mature.len() + not_mature.len());
        for group in &mature {
            ckb_pending_balance += u128::from(group.withdraw_capacity);
            maturity.push(MaturityEntry {
                owner: group.owner.clone(),
                ckb_amount: group.withdraw_capacity,
                wait_time: "matured".to_string(),
            });
        }
        for group in &not_mature {
            maturity.push(MaturityEntry {
                owner: group.owner.clone(),
                ckb_amount: group.withdraw_capacity,
                wait_time: epoch::wait_time(group.maturity, &tip),
            });
        }

        let has_matchable = classified.orders.iter().any(|o| o.info.is_matchable);
        let fee_rate = fee_rate.saturating_add(planner.fee_rate_bump);
        info!(
            tip = tip.number,
            fee_rate,
            ckb_balance = %ckb_balance,
            ickb_udt_balance = %ickb_udt_balance,
            pool = pool.len(),
            orders = classified.orders.len(),
            receipts = classified.receipts.len(),
            "loaded L1 state"
        );

        Ok(Self {
            tip,
            fee_rate,
            ickb_dao_balance,
            ickb_udt_pool_balance,
            ickb_udt_balance,
            ckb_balance,
            ckb_available,
            ckb_pending_balance,
            ickb_pending_balance,
            orders: classified.orders,
            receipts: classified.receipts,
            maturity,
            has_matchable,
            pool,
            base: base_info,
            consumes_intermediate,
            wallet: wallet.clone(),
            planner: planner.clone(),
        })
    }

    /// Plan converting `amount` shannons of the source asset, or reclaiming
    /// claimable cells when `amount` is zero
    pub fn plan(&self, direction: Direction, amount: u128) -> TxInfo {
        let planned = match direction {
            Direction::CkbToIckb | Direction::IckbToCkb if amount > 0 => convert(
                &self.base,
                direction == Direction::CkbToIckb,
                amount,
                &self.pool,
                &self.tip,
                self.fee_rate,
                &self.wallet,
                &self.planner,
            ),
            _ if self.consumes_intermediate || direction == Direction::Melt => {
                add_change(self.base.clone(), self.fee_rate, &self.wallet, &self.planner)
            }
            _ => TxInfo::failed(self.base.steps.clone(), PlanError::NothingToConvert),
        };
        match planned.error() {
            Some(error) => info!(%direction, %error, "plan failed"),
            None => info!(%direction, fee = planned.fee, steps = planned.steps.len(), "plan ready"),
        }
        planned
    }

    pub fn wallet(&self) -> &WalletConfig {
        &self.wallet
    }
}

/// iCKB over every live token cell, and the part held by the account
async fn udt_balances(client: &dyn ChainClient, wallet: &WalletConfig) -> Result<(u128, u128), ChainError> {
    let udt = wallet.scripts.ickb_udt();
    let mut total = 0u128;
    let mut mine = 0u128;
    let mut cursor = None;
    loop {
        let page = client.cells_by_type(&udt, cursor, UDT_SCAN_PAGE).await?;
        for cell in &page.items {
            let amount = udt_amount(&cell.data).unwrap_or(0);
            total = total.saturating_add(amount);
            if *cell.lock() == wallet.account_lock {
                mine = mine.saturating_add(amount);
            }
        }
        match page.cursor {
            Some(next) if !page.items.is_empty() => cursor = Some(next),
            _ => break,
        }
    }
    Ok((total, mine))
}

// ============ Tests ============
