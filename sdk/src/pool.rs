// ============ Deposit Pool Ranker ============
// Orders pool deposits by estimated maturity and bounds the candidate set.
// Sampling spreads concurrent users over different deposits.

use crate::classify::Deposit;
use crate::config::PlannerConfig;
use ickb_math::{epoch, shuffle};
use ickb_types::*;
use rand::Rng;
use tracing::debug;

/// A pool deposit with its iCKB value and estimated maturity at the current tip
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedDeposit {
    pub deposit: Deposit,
    pub ickb_value: u128,
    pub maturity: Epoch,
}

/// Drop deposits maturing before `tip + min_lock`, then sort by maturity and out point
pub fn rank_pool(deposits: &[Deposit], tip: &Header, min_lock: Epoch) -> Vec<ExtendedDeposit> {
    let threshold = epoch::add(tip.epoch, min_lock);
    let mut ranked: Vec<ExtendedDeposit> = deposits
        .iter()
        .map(|d| ExtendedDeposit {
            deposit: d.clone(),
            ickb_value: d.ickb_value(),
            maturity: epoch::dao_maturity(d.header.epoch, tip.epoch),
        })
        .filter(|d| d.maturity >= threshold)
        .collect();
    ranked.sort_by(|a, b| {
        a.maturity
            .cmp(&b.maturity)
            .then_with(|| a.deposit.cell.out_point.cmp(&b.deposit.cell.out_point))
    });
    debug!(total = deposits.len(), eligible = ranked.len(), "ranked deposit pool");
    ranked
}

/// Keep at most `pool_sample_size` deposits drawn from a prefix of the ranking,
/// preserving their relative order
pub fn sample_pool(
    ranked: Vec<ExtendedDeposit>,
    config: &PlannerConfig,
    seed: &[u8; 32],
) -> Vec<ExtendedDeposit> {
    let size = config.pool_sample_size;
    if ranked.len() <= size {
        return ranked;
    }
    let divisor = config.pool_sample_divisor.max(1);
    let rounded = (ranked.len() + divisor / 2) / divisor;
    let prefix = rounded.max(size).min(ranked.len());

    let picked = shuffle::sample_indices(prefix, size, seed);
    let mut ranked: Vec<Option<ExtendedDeposit>> = ranked.into_iter().map(Some).collect();
    picked
        .into_iter()
        .filter_map(|i| ranked[i].take())
        .collect()
}

pub fn random_seed() -> [u8; 32] {
    rand::thread_rng().gen()
}

// ============ Tests ============
