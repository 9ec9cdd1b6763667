// ============ Conversion Planner ============
// Builds the base transaction from the caller's classified cells, then searches
// for the largest number of standard deposits (CKB to iCKB) or withdrawal requests
// (iCKB to CKB) that still leaves a feasible transaction. Any remainder becomes
// a limit order.

use crate::change::add_change;
use crate::classify::{MyOrder, Receipt, WithdrawalGroup};
use crate::config::{PlannerConfig, WalletConfig};
use crate::pool::ExtendedDeposit;
use crate::skeleton::{InputEntry, TxSkeleton};
use crate::txinfo::{count, PlanError, TxInfo};
use ickb_math::{binary_search, epoch, exchange, to_text};
use ickb_types::*;
use std::collections::HashMap;
use tracing::debug;

// ============ Base Transaction ============

/// Consume everything the caller can always claim: plain capacity, iCKB,
/// receipts, mature withdrawal requests and own orders
pub fn base(
    capacities: &[Cell],
    udts: &[Cell],
    receipts: &[Receipt],
    mature: &[WithdrawalGroup],
    orders: &[MyOrder],
    wallet: &WalletConfig,
) -> TxInfo {
    let mut tx = TxSkeleton::new();
    let mut steps = Vec::new();

    add_orders_melt(&mut tx, orders, wallet);
    let open = orders.iter().filter(|o| o.info.is_matchable).count();
    if open > 0 {
        steps.push(format!("Cancelling {}", count(open, "Open Order")));
    }
    let completed = orders.len() - open;
    if completed > 0 {
        steps.push(format!("Melting {}", count(completed, "Completed Order")));
    }

    for cell in capacities {
        tx.add_input(InputEntry::new(cell.clone()));
    }
    if !udts.is_empty() {
        tx.add_cell_deps(&wallet.scripts.ickb_udt.cell_deps);
    }
    for cell in udts {
        let amount = udt_amount(&cell.data).unwrap_or(0);
        tx.add_input(InputEntry::new(cell.clone()).with_udt(to_signed(amount)));
    }
    add_receipts(&mut tx, receipts, wallet);
    if !receipts.is_empty() {
        steps.push(format!("Converting {} to iCKB", count(receipts.len(), "Receipt")));
    }

    add_withdrawal_groups(&mut tx, mature, wallet);
    if !mature.is_empty() {
        steps.push(format!(
            "Withdrawing from {}",
            count(mature.len(), "Withdrawal Request")
        ));
    }

    TxInfo::new(tx, steps)
}

// ============ Conversion ============

/// A pool deposit that fits in the requested amount, with the running iCKB total
#[derive(Clone, Debug)]
struct Redeemable<'a> {
    deposit: &'a ExtendedDeposit,
    cumulative: u128,
}

/// Walk the ranked pool, skipping deposits that would overshoot `amount`
fn redeemable_prefix(pool: &[ExtendedDeposit], amount: u128, limit: usize) -> Vec<Redeemable<'_>> {
    let mut prefix = Vec::new();
    let mut cumulative = 0u128;
    for deposit in pool {
        if prefix.len() >= limit {
            break;
        }
        let next = cumulative.saturating_add(deposit.ickb_value);
        if next > amount {
            continue;
        }
        cumulative = next;
        prefix.push(Redeemable {
            deposit,
            cumulative,
        });
    }
    prefix
}

struct AttemptContext<'a> {
    base: &'a TxInfo,
    is_ckb_to_udt: bool,
    amount: u128,
    ratio: Ratio,
    deposit_amount: u64,
    redeemable: Vec<Redeemable<'a>>,
    tip: &'a Header,
    fee_rate: u64,
    wallet: &'a WalletConfig,
    planner: &'a PlannerConfig,
}

/// `attempt(n)` memoized by quantity; `n` skips that many units from the maximum
struct Attempts<'a> {
    ctx: AttemptContext<'a>,
    max_quantity: usize,
    cache: HashMap<usize, TxInfo>,
}

impl<'a> Attempts<'a> {
    fn get(&mut self, n: usize) -> &TxInfo {
        let quantity = self.max_quantity - n;
        let ctx = &self.ctx;
        self.cache.entry(quantity).or_insert_with(|| {
            let info = ctx.attempt(quantity);
            debug!(quantity, feasible = info.is_ok(), "conversion attempt");
            info
        })
    }

    /// Skip count of the chosen attempt.
    /// Feasibility is not monotone in the quantity: a full redemption needs no
    /// order cells, so it can fit where a partial one does not. The full
    /// quantity is tried first, then bisection, then a scan of every quantity
    /// that can fit in the output limit.
    fn search(&mut self) -> usize {
        if self.get(0).is_ok() {
            return 0;
        }
        let max_quantity = self.max_quantity;
        let n = binary_search(max_quantity, |n| self.get(n).is_ok());
        if self.get(n).is_ok() {
            return n;
        }
        let floor = max_quantity.saturating_sub(self.ctx.planner.max_outputs);
        (floor..=max_quantity)
            .find(|&n| self.get(n).is_ok())
            .unwrap_or(n)
    }

    fn take(mut self, n: usize) -> TxInfo {
        let quantity = self.max_quantity - n;
        match self.cache.remove(&quantity) {
            Some(info) => info,
            None => self.ctx.attempt(quantity),
        }
    }
}

/// Plan a conversion of `amount` (shannons of the source asset) on top of `base`
#[allow(clippy::too_many_arguments)]
pub fn convert(
    base: &TxInfo,
    is_ckb_to_udt: bool,
    amount: u128,
    pool: &[ExtendedDeposit],
    tip: &Header,
    fee_rate: u64,
    wallet: &WalletConfig,
    planner: &PlannerConfig,
) -> TxInfo {
    if !base.is_ok() {
        return base.clone();
    }
    let mut attempts = attempts(base, is_ckb_to_udt, amount, pool, tip, fee_rate, wallet, planner);
    let n = attempts.search();
    debug!(
        max_quantity = attempts.max_quantity,
        quantity = attempts.max_quantity - n,
        "conversion search done"
    );
    attempts.take(n)
}

#[allow(clippy::too_many_arguments)]
fn attempts<'a>(
    base: &'a TxInfo,
    is_ckb_to_udt: bool,
    amount: u128,
    pool: &'a [ExtendedDeposit],
    tip: &'a Header,
    fee_rate: u64,
    wallet: &'a WalletConfig,
    planner: &'a PlannerConfig,
) -> Attempts<'a> {
    let redeemable = if is_ckb_to_udt {
        Vec::new()
    } else {
        redeemable_prefix(pool, amount, planner.max_redeemable_deposits)
    };
    let deposit_amount = exchange::standard_deposit_amount(tip);
    let max_quantity = if is_ckb_to_udt {
        match amount.checked_div(u128::from(deposit_amount)) {
            Some(q) => usize::try_from(q).unwrap_or(usize::MAX - 1),
            None => 0,
        }
    } else {
        redeemable.len()
    };

    Attempts {
        ctx: AttemptContext {
            base,
            is_ckb_to_udt,
            amount,
            ratio: exchange::order_ratio(tip, is_ckb_to_udt, planner.order_fee_divisor),
            deposit_amount,
            redeemable,
            tip,
            fee_rate,
            wallet,
            planner,
        },
        max_quantity,
        cache: HashMap::new(),
    }
}

impl AttemptContext<'_> {
    fn attempt(&self, quantity: usize) -> TxInfo {
        let mut steps = self.base.steps.clone();
        let mut tx = match &self.base.state {
            Ok(tx) => tx.clone(),
            Err(_) => return self.base.clone(),
        };
        let mut amount = self.amount;

        if quantity > 0 {
            if self.is_ckb_to_udt {
                let used = u128::from(self.deposit_amount) * quantity as u128;
                if used > amount {
                    return TxInfo::failed(steps, PlanError::ReserveOvershoot);
                }
                amount -= used;
                let quantity = match u32::try_from(quantity) {
                    Ok(q) if quantity <= self.planner.max_outputs => q,
                    _ => {
                        return TxInfo::failed(
                            steps,
                            PlanError::OutputLimitExceeded {
                                outputs: quantity,
                                limit: self.planner.max_outputs,
                            },
                        )
                    }
                };
                add_deposits(&mut tx, quantity, self.deposit_amount, self.wallet);
                steps.push(format!(
                    "Creating {} (each amount is {} CKB) and {} Receipt",
                    count(quantity as usize, "standard deposit"),
                    to_text(self.deposit_amount.into()),
                    if quantity > 1 { "their" } else { "its" },
                ));
            } else {
                if self.redeemable.len() < quantity {
                    return TxInfo::failed(steps, PlanError::InsufficientReserve);
                }
                let chosen = &self.redeemable[..quantity];
                let used = chosen[quantity - 1].cumulative;
                if used > amount {
                    return TxInfo::failed(steps, PlanError::ReserveOvershoot);
                }
                amount -= used;
                add_withdrawal_requests(&mut tx, chosen.iter().map(|r| r.deposit), self.wallet);
                let wait = epoch::max_wait_time(chosen.iter().map(|r| r.deposit.maturity), self.tip);
                steps.push(format!(
                    "Requesting the Withdrawal from {} with maturity in {}",
                    count(quantity, "Deposit"),
                    wait
                ));
            }
        }

        if amount > 0 {
            add_limit_order(&mut tx, self.is_ckb_to_udt, amount, self.ratio, self.wallet);
            let fee = exchange::order_fee(amount, &self.ratio, self.tip, self.is_ckb_to_udt);
            steps.push(format!(
                "Creating a Limit Order for {}{} {}. Paying an extra Order Fee of {} CKB",
                if quantity > 0 { "the remaining " } else { "" },
                to_text(amount),
                if self.is_ckb_to_udt { "CKB" } else { "iCKB" },
                to_text(fee),
            ));
        }

        add_change(TxInfo::new(tx, steps), self.fee_rate, self.wallet, self.planner)
    }
}

// ============ Skeleton Builders ============

fn to_signed(amount: u128) -> i128 {
    i128::try_from(amount).unwrap_or(i128::MAX)
}

/// Consume orders together with their master cells
fn add_orders_melt(tx: &mut TxSkeleton, orders: &[MyOrder], wallet: &WalletConfig) {
    if orders.is_empty() {
        return;
    }
    tx.add_cell_deps(&wallet.scripts.limit_order.cell_deps);
    tx.add_cell_deps(&wallet.scripts.ickb_udt.cell_deps);
    for order in orders {
        tx.add_input(InputEntry::new(order.order.clone()).with_udt(to_signed(order.data.udt_amount)));
        tx.add_input(InputEntry::new(order.master.clone()));
    }
}

/// Consume receipts, minting their iCKB value
fn add_receipts(tx: &mut TxSkeleton, receipts: &[Receipt], wallet: &WalletConfig) {
    if receipts.is_empty() {
        return;
    }
    tx.add_cell_deps(&wallet.scripts.ickb_logic.cell_deps);
    tx.add_cell_deps(&wallet.scripts.ickb_udt.cell_deps);
    for receipt in receipts {
        tx.add_header_dep(receipt.header.hash);
        tx.add_input(InputEntry::new(receipt.cell.clone()).with_udt(to_signed(receipt.ickb_value())));
    }
}

/// Complete mature NervosDAO withdrawals
fn add_withdrawal_groups(tx: &mut TxSkeleton, groups: &[WithdrawalGroup], wallet: &WalletConfig) {
    if groups.is_empty() {
        return;
    }
    tx.add_cell_deps(&wallet.scripts.dao.cell_deps);
    tx.add_cell_deps(&wallet.scripts.owned_owner.cell_deps);
    for group in groups {
        let deposit_index = tx.add_header_dep(group.deposit_header.hash);
        tx.add_header_dep(group.request_header.hash);
        tx.add_input(InputEntry {
            cell: group.request.clone(),
            since: group.maturity.to_since(),
            ckb_value: group.withdraw_capacity,
            udt_value: 0,
            input_type: Some((deposit_index as u64).to_le_bytes().to_vec()),
        });
        tx.add_input(InputEntry::new(group.owner.clone()));
    }
}

/// Create `quantity` standard deposits and the receipt accounting for them
fn add_deposits(tx: &mut TxSkeleton, quantity: u32, deposit_amount: u64, wallet: &WalletConfig) {
    let scripts = &wallet.scripts;
    tx.add_cell_deps(&scripts.dao.cell_deps);
    tx.add_cell_deps(&scripts.ickb_logic.cell_deps);

    let deposit = CellOutput {
        capacity: 0,
        lock: scripts.ickb_logic(),
        type_: Some(scripts.dao()),
    };
    let capacity = deposit.occupied_capacity(DAO_DEPOSIT_DATA.len()) + deposit_amount;
    for _ in 0..quantity {
        let output = CellOutput {
            capacity,
            ..deposit.clone()
        };
        tx.add_output(output, DAO_DEPOSIT_DATA.to_vec(), 0);
    }

    let data = ReceiptData {
        deposit_quantity: quantity,
        deposit_amount,
    };
    let mut receipt = CellOutput {
        capacity: 0,
        lock: wallet.account_lock.clone(),
        type_: Some(scripts.ickb_logic()),
    };
    receipt.capacity = receipt.occupied_capacity(ReceiptData::SERIALIZED_SIZE);
    tx.add_output(receipt, data.serialize().to_vec(), 0);
}

/// Request the withdrawal of pool deposits, burning their iCKB value.
/// Every request gets an owner cell pointing back at it.
fn add_withdrawal_requests<'a>(
    tx: &mut TxSkeleton,
    deposits: impl Iterator<Item = &'a ExtendedDeposit>,
    wallet: &WalletConfig,
) {
    let scripts = &wallet.scripts;
    tx.add_cell_deps(&scripts.dao.cell_deps);
    tx.add_cell_deps(&scripts.ickb_logic.cell_deps);
    tx.add_cell_deps(&scripts.owned_owner.cell_deps);

    let mut requests = Vec::new();
    for d in deposits {
        tx.add_header_dep(d.deposit.header.hash);
        tx.add_input(InputEntry::new(d.deposit.cell.clone()).with_udt(-to_signed(d.ickb_value)));
        let request = CellOutput {
            capacity: d.deposit.cell.capacity(),
            lock: scripts.owned_owner(),
            type_: Some(scripts.dao()),
        };
        let data = d.deposit.cell.block_number.to_le_bytes().to_vec();
        requests.push(tx.add_output(request, data, 0));
    }

    for request_index in requests {
        let mut owner = CellOutput {
            capacity: 0,
            lock: wallet.account_lock.clone(),
            type_: Some(scripts.owned_owner()),
        };
        owner.capacity = owner.occupied_capacity(OwnerData::SERIALIZED_SIZE);
        let distance = request_index as i64 - tx.outputs.len() as i64;
        let data = OwnerData {
            owned_distance: distance as i32,
        };
        tx.add_output(owner, data.serialize().to_vec(), 0);
    }
}

/// Mint a limit order for `amount` of the source asset, plus its master cell
fn add_limit_order(
    tx: &mut TxSkeleton,
    is_ckb_to_udt: bool,
    amount: u128,
    ratio: Ratio,
    wallet: &WalletConfig,
) {
    let scripts = &wallet.scripts;
    tx.add_cell_deps(&scripts.limit_order.cell_deps);
    tx.add_cell_deps(&scripts.ickb_udt.cell_deps);

    let data = OrderData {
        udt_amount: if is_ckb_to_udt { 0 } else { amount },
        master: MasterRef::Relative(1),
        ckb_to_udt: if is_ckb_to_udt { ratio } else { Ratio::default() },
        udt_to_ckb: if is_ckb_to_udt { Ratio::default() } else { ratio },
        ckb_min_match_log: DEFAULT_CKB_MIN_MATCH_LOG,
    };
    let mut order = CellOutput {
        capacity: 0,
        lock: scripts.limit_order(),
        type_: Some(scripts.ickb_udt()),
    };
    order.capacity = order.occupied_capacity(OrderData::SERIALIZED_SIZE);
    if is_ckb_to_udt {
        order.capacity = order
            .capacity
            .saturating_add(u64::try_from(amount).unwrap_or(u64::MAX));
    }
    tx.add_output(order, data.serialize().to_vec(), data.udt_amount);

    let mut master = CellOutput {
        capacity: 0,
        lock: wallet.account_lock.clone(),
        type_: Some(scripts.limit_order()),
    };
    master.capacity = master.occupied_capacity(0);
    tx.add_output(master, Vec::new(), 0);
}

// ============ Tests ============
