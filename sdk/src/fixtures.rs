// Cell and header builders shared by the unit tests

use crate::chain::TransactionView;
use crate::config::*;
use crate::memory::MemoryChain;
use ickb_math::AR_0;
use ickb_types::*;
use std::collections::BTreeMap;

fn info(tag: u8, hash_type: HashType) -> ScriptInfo {
    ScriptInfo {
        code_hash: [tag; 32],
        hash_type,
        args: Vec::new(),
        cell_deps: vec![CellDep {
            out_point: OutPoint::new([0xd0 + tag; 32], 0),
            dep_type: DepType::Code,
        }],
    }
}

pub fn wallet() -> WalletConfig {
    WalletConfig {
        chain: Chain::Devnet,
        account_lock: Script::new([0x77; 32], HashType::Type, vec![0x01; 20]),
        account_cell_deps: vec![CellDep {
            out_point: OutPoint::new([0xee; 32], 0),
            dep_type: DepType::DepGroup,
        }],
        lock_witness_size: 65,
        scripts: ScriptConfig {
            dao: info(0x01, HashType::Type),
            ickb_logic: info(0x02, HashType::Data1),
            owned_owner: info(0x03, HashType::Data1),
            limit_order: info(0x04, HashType::Data1),
            ickb_udt: info(0x05, HashType::Data1),
        },
    }
}

pub fn header(number: u64, epoch: Epoch, ar: u64) -> Header {
    let mut dao = [0u8; 32];
    dao[8..16].copy_from_slice(&ar.to_le_bytes());
    Header {
        hash: ckb_hash(&number.to_le_bytes()),
        number,
        epoch,
        timestamp: 1_700_000_000_000 + number * 10_000,
        dao,
    }
}

pub fn tip() -> Header {
    header(1_000_000, Epoch::new(1_000, 0, 1_000), AR_0)
}

fn cell(tx: u8, index: u32, lock: Script, type_: Option<Script>, data: Vec<u8>, free: u64, block: u64) -> Cell {
    let output = CellOutput {
        capacity: 0,
        lock,
        type_,
    };
    let capacity = output.occupied_capacity(data.len()) + free;
    Cell {
        out_point: OutPoint::new([tx; 32], index),
        output: CellOutput { capacity, ..output },
        data,
        block_number: block,
    }
}

pub fn capacity_cell(tx: u8, index: u32, capacity: u64) -> Cell {
    let mut c = cell(tx, index, wallet().account_lock, None, Vec::new(), 0, 1);
    c.output.capacity = capacity;
    c
}

pub fn udt_cell(tx: u8, index: u32, amount: u128) -> Cell {
    let w = wallet();
    cell(tx, index, w.account_lock, Some(w.scripts.ickb_udt()), amount.to_le_bytes().to_vec(), 0, 1)
}

pub fn receipt_cell(tx: u8, index: u32, quantity: u32, amount: u64, block: u64) -> Cell {
    let w = wallet();
    let data = ReceiptData {
        deposit_quantity: quantity,
        deposit_amount: amount,
    };
    cell(tx, index, w.account_lock, Some(w.scripts.ickb_logic()), data.serialize().to_vec(), 0, block)
}

pub fn deposit_cell(tx: u8, index: u32, unoccupied: u64, block: u64) -> Cell {
    let w = wallet();
    cell(
        tx,
        index,
        w.scripts.ickb_logic(),
        Some(w.scripts.dao()),
        DAO_DEPOSIT_DATA.to_vec(),
        unoccupied,
        block,
    )
}

/// Withdrawal request at `index`, its owner right after it
pub fn withdrawal_pair(tx: u8, index: u32, deposit_block: u64, capacity: u64, block: u64) -> (Cell, Cell) {
    let w = wallet();
    let mut request = cell(
        tx,
        index,
        w.scripts.owned_owner(),
        Some(w.scripts.dao()),
        deposit_block.to_le_bytes().to_vec(),
        0,
        block,
    );
    request.output.capacity = capacity;
    let owner = cell(
        tx,
        index + 1,
        w.account_lock,
        Some(w.scripts.owned_owner()),
        OwnerData { owned_distance: -1 }.serialize().to_vec(),
        0,
        block,
    );
    (request, owner)
}

/// Freshly minted order at `index`, its master right after it
pub fn order_pair(tx: u8, index: u32, is_ckb_to_udt: bool, ckb: u64, udt: u128) -> (Cell, Cell) {
    let w = wallet();
    let ratio = Ratio {
        ckb_multiplier: AR_0,
        udt_multiplier: AR_0,
    };
    let data = OrderData {
        udt_amount: udt,
        master: MasterRef::Relative(1),
        ckb_to_udt: if is_ckb_to_udt { ratio } else { Ratio::default() },
        udt_to_ckb: if is_ckb_to_udt { Ratio::default() } else { ratio },
        ckb_min_match_log: DEFAULT_CKB_MIN_MATCH_LOG,
    };
    let order = cell(
        tx,
        index,
        w.scripts.limit_order(),
        Some(w.scripts.ickb_udt()),
        data.serialize().to_vec(),
        ckb,
        1,
    );
    let master = cell(tx, index + 1, w.account_lock, Some(w.scripts.limit_order()), Vec::new(), 0, 1);
    (order, master)
}

/// A chain at `tip()` where every cell was created by a transaction named after
/// its out point; gaps in output indices get unrelated filler outputs
pub fn chain_with(cells: &[Cell], headers: &[Header]) -> MemoryChain {
    let mut chain = MemoryChain::new(tip(), 1_000);
    for h in headers {
        chain.insert_header(h.clone());
    }

    let mut by_tx: BTreeMap<Byte32, Vec<&Cell>> = BTreeMap::new();
    for c in cells {
        by_tx.entry(c.out_point.tx_hash).or_default().push(c);
    }
    let filler = CellOutput {
        capacity: 61 * CKB,
        lock: Script::new([0x99; 32], HashType::Type, Vec::new()),
        type_: None,
    };
    for (hash, group) in by_tx {
        let len = group.iter().map(|c| c.out_point.index as usize + 1).max().unwrap_or(0);
        let mut outputs = vec![filler.clone(); len];
        let mut outputs_data = vec![Vec::new(); len];
        for c in &group {
            outputs[c.out_point.index as usize] = c.output.clone();
            outputs_data[c.out_point.index as usize] = c.data.clone();
        }
        chain.commit(TransactionView {
            hash,
            block_number: group[0].block_number,
            inputs: Vec::new(),
            outputs,
            outputs_data,
        });
    }
    chain
}
