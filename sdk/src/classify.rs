// ============ Value Classifier ============
// Partitions a flat cell set into the seven categories the planner works with.
// `classify` is pure over a `Lookup`: run it once with `DeferredLookup` to collect
// the headers and transactions it needs, fetch them in one batch, then run it again
// with `ResolvedLookup`.

use crate::config::WalletConfig;
use ickb_math::{epoch, exchange, DEPOSIT_USED_CAPACITY};
use ickb_types::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

// ============ Lookups ============

pub trait Lookup {
    fn header(&mut self, number: u64) -> Option<Header>;
    fn transaction_outputs(&mut self, tx_hash: &Byte32) -> Option<Arc<Vec<Cell>>>;
}

/// Records every request and resolves nothing
#[derive(Clone, Debug, Default)]
pub struct DeferredLookup {
    pub headers: BTreeSet<u64>,
    pub transactions: BTreeSet<Byte32>,
}

impl Lookup for DeferredLookup {
    fn header(&mut self, number: u64) -> Option<Header> {
        self.headers.insert(number);
        None
    }

    fn transaction_outputs(&mut self, tx_hash: &Byte32) -> Option<Arc<Vec<Cell>>> {
        self.transactions.insert(*tx_hash);
        None
    }
}

/// Serves prefetched data; anything missing leaves its cell unrelated
#[derive(Clone, Debug, Default)]
pub struct ResolvedLookup {
    headers: HashMap<u64, Header>,
    outputs: HashMap<Byte32, Arc<Vec<Cell>>>,
    pub unresolved: usize,
}

impl ResolvedLookup {
    pub fn new(headers: HashMap<u64, Header>, outputs: HashMap<Byte32, Arc<Vec<Cell>>>) -> Self {
        Self {
            headers,
            outputs,
            unresolved: 0,
        }
    }
}

impl Lookup for ResolvedLookup {
    fn header(&mut self, number: u64) -> Option<Header> {
        let header = self.headers.get(&number).cloned();
        if header.is_none() {
            self.unresolved += 1;
            warn!(block = number, "header not prefetched");
        }
        header
    }

    fn transaction_outputs(&mut self, tx_hash: &Byte32) -> Option<Arc<Vec<Cell>>> {
        let outputs = self.outputs.get(tx_hash).cloned();
        if outputs.is_none() {
            self.unresolved += 1;
            warn!(tx = %hex::encode(tx_hash), "transaction outputs not prefetched");
        }
        outputs
    }
}

// ============ Categories ============

/// Deposits made by the caller and not yet converted to iCKB
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub cell: Cell,
    pub header: Header,
    pub data: ReceiptData,
}

impl Receipt {
    pub fn ckb_amount(&self) -> u128 {
        u128::from(self.data.deposit_quantity) * u128::from(self.data.deposit_amount)
    }

    pub fn ickb_value(&self) -> u128 {
        u128::from(self.data.deposit_quantity)
            * exchange::deposit_ickb_value(self.data.deposit_amount, &self.header)
    }
}

/// A NervosDAO deposit held by the iCKB pool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deposit {
    pub cell: Cell,
    pub header: Header,
}

impl Deposit {
    pub fn unoccupied(&self) -> u64 {
        self.cell.capacity().saturating_sub(DEPOSIT_USED_CAPACITY)
    }

    pub fn ickb_value(&self) -> u128 {
        exchange::deposit_ickb_value(self.unoccupied(), &self.header)
    }
}

/// A withdrawal request and the caller's owner cell pointing at it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawalGroup {
    pub request: Cell,
    pub owner: Cell,
    pub deposit_header: Header,
    pub request_header: Header,
    pub maturity: Epoch,
    /// CKB released by the request, DAO interest included
    pub withdraw_capacity: u64,
}

impl WithdrawalGroup {
    pub fn is_mature(&self, tip: &Header) -> bool {
        epoch::is_mature(self.maturity, tip)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderInfo {
    pub is_ckb_to_udt: bool,
    /// Unoccupied CKB currently in the order
    pub ckb_amount: u64,
    /// iCKB currently in the order
    pub udt_amount: u128,
    /// Source amount the order was minted with
    pub abs_total: u128,
    /// Source amount already matched
    pub abs_progress: u128,
    pub is_matchable: bool,
}

impl OrderInfo {
    pub fn is_completed(&self) -> bool {
        self.abs_progress == self.abs_total
    }
}

/// A limit order whose master cell the caller holds
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MyOrder {
    pub order: Cell,
    pub master: Cell,
    pub data: OrderData,
    pub info: OrderInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Classified {
    pub capacities: Vec<Cell>,
    pub udts: Vec<Cell>,
    pub receipts: Vec<Receipt>,
    pub deposits: Vec<Deposit>,
    pub withdrawal_groups: Vec<WithdrawalGroup>,
    pub orders: Vec<MyOrder>,
    pub unrelated: Vec<Cell>,
}

impl Classified {
    pub fn len(&self) -> usize {
        self.capacities.len()
            + self.udts.len()
            + self.receipts.len()
            + self.deposits.len()
            + self.withdrawal_groups.len() * 2
            + self.orders.len() * 2
            + self.unrelated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============ Classification ============

pub fn classify(cells: &[Cell], wallet: &WalletConfig, lookup: &mut impl Lookup) -> Classified {
    let account = &wallet.account_lock;
    let dao = wallet.scripts.dao();
    let ickb_logic = wallet.scripts.ickb_logic();
    let owned_owner = wallet.scripts.owned_owner();
    let limit_order = wallet.scripts.limit_order();
    let udt = wallet.scripts.ickb_udt();

    let mut result = Classified::default();
    let mut owners = Vec::new();
    let mut requests = HashMap::new();
    let mut masters = HashMap::new();
    let mut orders = Vec::new();

    for cell in cells {
        let type_script = cell.type_script();
        if cell.lock() == account {
            match type_script {
                None if cell.data.is_empty() => result.capacities.push(cell.clone()),
                Some(t) if *t == udt => result.udts.push(cell.clone()),
                Some(t) if *t == ickb_logic => {
                    match (ReceiptData::deserialize(&cell.data), lookup.header(cell.block_number)) {
                        (Some(data), Some(header)) => result.receipts.push(Receipt {
                            cell: cell.clone(),
                            header,
                            data,
                        }),
                        _ => result.unrelated.push(cell.clone()),
                    }
                }
                Some(t) if *t == owned_owner => owners.push(cell),
                Some(t) if *t == limit_order => {
                    masters.insert(cell.out_point, cell);
                }
                _ => result.unrelated.push(cell.clone()),
            }
        } else if *cell.lock() == ickb_logic
            && type_script == Some(&dao)
            && cell.data == DAO_DEPOSIT_DATA
        {
            match lookup.header(cell.block_number) {
                Some(header) => result.deposits.push(Deposit {
                    cell: cell.clone(),
                    header,
                }),
                None => result.unrelated.push(cell.clone()),
            }
        } else if *cell.lock() == owned_owner
            && type_script == Some(&dao)
            && dao_request_block(&cell.data).is_some()
        {
            requests.insert(cell.out_point, cell);
        } else if *cell.lock() == limit_order && type_script == Some(&udt) {
            match OrderData::deserialize(&cell.data) {
                Some(data) => orders.push((cell, data)),
                None => result.unrelated.push(cell.clone()),
            }
        } else {
            result.unrelated.push(cell.clone());
        }
    }

    // Pair owners with the requests they point at
    let mut owned = HashSet::new();
    for owner in owners {
        let target = OwnerData::deserialize(&owner.data)
            .and_then(|d| owner.out_point.offset(d.owned_distance));
        let group = match target.and_then(|t| requests.get(&t).copied()) {
            Some(request) => withdrawal_group(request, owner, lookup),
            None => None,
        };
        match group {
            Some(group) => {
                owned.insert(group.request.out_point);
                result.withdrawal_groups.push(group);
            }
            None => result.unrelated.push(owner.clone()),
        }
    }
    for cell in cells {
        if requests.contains_key(&cell.out_point) && !owned.contains(&cell.out_point) {
            result.unrelated.push(cell.clone());
        }
    }

    // Pair orders with the caller's master cells
    let mut used_masters = HashSet::new();
    for (order, data) in orders {
        let master = data
            .master
            .resolve(&order.out_point)
            .and_then(|op| masters.get(&op).copied());
        let mine = match master {
            Some(master) => my_order(order, master, data, &limit_order, &udt, lookup),
            None => None,
        };
        match mine {
            Some(mine) => {
                used_masters.insert(mine.master.out_point);
                result.orders.push(mine);
            }
            None => result.unrelated.push(order.clone()),
        }
    }
    for cell in cells {
        if masters.contains_key(&cell.out_point) && !used_masters.contains(&cell.out_point) {
            result.unrelated.push(cell.clone());
        }
    }

    debug!(
        capacities = result.capacities.len(),
        udts = result.udts.len(),
        receipts = result.receipts.len(),
        deposits = result.deposits.len(),
        withdrawal_groups = result.withdrawal_groups.len(),
        orders = result.orders.len(),
        unrelated = result.unrelated.len(),
        "classified cells"
    );
    result
}

fn withdrawal_group(
    request: &Cell,
    owner: &Cell,
    lookup: &mut impl Lookup,
) -> Option<WithdrawalGroup> {
    let deposit_block = dao_request_block(&request.data)?;
    // Both lookups run so the deferred pass records both headers
    let request_header = lookup.header(request.block_number);
    let deposit_header = lookup.header(deposit_block);
    let (request_header, deposit_header) = (request_header?, deposit_header?);

    let maturity = epoch::dao_maturity(deposit_header.epoch, request_header.epoch);
    let withdraw_capacity = exchange::dao_withdraw_capacity(
        request.capacity(),
        request.occupied_capacity(),
        &deposit_header,
        &request_header,
    );
    Some(WithdrawalGroup {
        request: request.clone(),
        owner: owner.clone(),
        deposit_header,
        request_header,
        maturity,
        withdraw_capacity,
    })
}

fn my_order(
    order: &Cell,
    master: &Cell,
    data: OrderData,
    limit_order: &Script,
    udt: &Script,
    lookup: &mut impl Lookup,
) -> Option<MyOrder> {
    let origin = order_origin(order, &master.out_point, limit_order, udt, lookup)?;
    let info = order_info(order, &data, &origin)?;
    Some(MyOrder {
        order: order.clone(),
        master: master.clone(),
        data,
        info,
    })
}

/// The order cell as it was minted next to its master
fn order_origin(
    order: &Cell,
    master: &OutPoint,
    limit_order: &Script,
    udt: &Script,
    lookup: &mut impl Lookup,
) -> Option<Cell> {
    if order.out_point.tx_hash == master.tx_hash {
        return Some(order.clone());
    }
    let outputs = lookup.transaction_outputs(&master.tx_hash)?;
    outputs
        .iter()
        .find(|c| {
            c.lock() == limit_order
                && c.type_script() == Some(udt)
                && OrderData::deserialize(&c.data)
                    .and_then(|d| d.master.resolve(&c.out_point))
                    .as_ref()
                    == Some(master)
        })
        .cloned()
}

fn order_info(order: &Cell, data: &OrderData, origin: &Cell) -> Option<OrderInfo> {
    let origin_data = OrderData::deserialize(&origin.data)?;
    let is_ckb_to_udt = data.is_ckb_to_udt();
    let ckb_amount = order.free_capacity();
    let udt_amount = data.udt_amount;

    let (abs_total, remaining) = if is_ckb_to_udt {
        (u128::from(origin.free_capacity()), u128::from(ckb_amount))
    } else {
        (origin_data.udt_amount, udt_amount)
    };
    let abs_progress = abs_total.saturating_sub(remaining);

    Some(OrderInfo {
        is_ckb_to_udt,
        ckb_amount,
        udt_amount,
        abs_total,
        abs_progress,
        is_matchable: abs_progress < abs_total,
    })
}

// ============ Tests ============
