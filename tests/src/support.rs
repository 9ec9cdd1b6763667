// Wallet, header and ledger helpers shared by every scenario

use ickb_math::AR_0;
use ickb_sdk::*;
use ickb_types::*;

pub const FEE_RATE: u64 = 2_000;

fn info(tag: u8) -> ScriptInfo {
    ScriptInfo {
        code_hash: [tag; 32],
        hash_type: if tag == 1 { HashType::Type } else { HashType::Data1 },
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
            dao: info(1),
            ickb_logic: info(2),
            owned_owner: info(3),
            limit_order: info(4),
            ickb_udt: info(5),
        },
    }
}

pub fn config() -> Config {
    Config {
        wallet: wallet(),
        planner: PlannerConfig::default(),
    }
}

pub fn header(number: u64, epoch: Epoch) -> Header {
    let mut dao = [0u8; 32];
    dao[8..16].copy_from_slice(&AR_0.to_le_bytes());
    Header {
        hash: ckb_hash(&number.to_le_bytes()),
        number,
        epoch,
        timestamp: 1_700_000_000_000 + number * 10_000,
        dao,
    }
}

/// Tip at epoch 1000
pub fn tip() -> Header {
    header(1_000, Epoch::new(1_000, 0, 1_000))
}

pub fn output(lock: Script, type_: Option<Script>, data_len: usize, free: u64) -> CellOutput {
    let mut out = CellOutput {
        capacity: 0,
        lock,
        type_,
    };
    out.capacity = out.occupied_capacity(data_len) + free;
    out
}

pub fn capacity_output(ckb: u64) -> (CellOutput, Vec<u8>) {
    let out = CellOutput {
        capacity: ckb,
        lock: wallet().account_lock,
        type_: None,
    };
    (out, Vec::new())
}

pub fn udt_output(amount: u128) -> (CellOutput, Vec<u8>) {
    let w = wallet();
    (
        output(w.account_lock, Some(w.scripts.ickb_udt()), 16, 0),
        amount.to_le_bytes().to_vec(),
    )
}

/// Pool deposit with `unoccupied` CKB on top of its occupied capacity
pub fn deposit_output(unoccupied: u64) -> (CellOutput, Vec<u8>) {
    let w = wallet();
    (
        output(w.scripts.ickb_logic(), Some(w.scripts.dao()), 8, unoccupied),
        DAO_DEPOSIT_DATA.to_vec(),
    )
}

/// A transaction with no inputs creating `outputs` at `block`
pub fn mint(chain: &mut MemoryChain, hash: u8, block: u64, outputs: Vec<(CellOutput, Vec<u8>)>) {
    let (outputs, outputs_data) = outputs.into_iter().unzip();
    chain.commit(TransactionView {
        hash: [hash; 32],
        block_number: block,
        inputs: Vec::new(),
        outputs,
        outputs_data,
    });
}

/// Commit a planned transaction as if it had been signed and mined at `block`
pub fn commit_plan(chain: &mut MemoryChain, tx: &TxSkeleton, hash: u8, block: u64) {
    chain.commit(TransactionView {
        hash: [hash; 32],
        block_number: block,
        inputs: tx
            .inputs
            .iter()
            .map(|i| CellInput {
                previous_output: i.cell.out_point,
                since: i.since,
            })
            .collect(),
        outputs: tx.outputs.iter().map(|o| o.output.clone()).collect(),
        outputs_data: tx.outputs.iter().map(|o| o.data.clone()).collect(),
    });
}

pub async fn load(chain: &MemoryChain, cache: &ChainCache) -> L1State {
    L1State::load_with_seed(chain, cache, &config(), &[7; 32])
        .await
        .expect("state loads")
}

/// Every balance invariant a feasible plan must satisfy
pub fn assert_balanced(info: &TxInfo) {
    let tx = info.tx().expect("feasible plan");
    assert_eq!(tx.udt_delta(), 0, "iCKB must balance exactly");
    assert_eq!(tx.ckb_delta(), i128::from(info.fee), "CKB surplus is the fee");
    assert_eq!(info.fee % 2_000, 0, "fee is quantized");
    assert!(tx.outputs.len() <= 64);
    for o in &tx.outputs {
        assert!(o.output.capacity >= o.occupied_capacity());
    }
}

pub fn cell(tx: u8, index: u32, (output, data): (CellOutput, Vec<u8>), block: u64) -> Cell {
    Cell {
        out_point: OutPoint::new([tx; 32], index),
        output,
        data,
        block_number: block,
    }
}

/// Base transaction spending `ckb` plain capacity and `ickb` tokens
pub fn funded_base(ckb: u64, ickb: u128) -> TxInfo {
    let capacities = vec![cell(0x10, 0, capacity_output(ckb), 1)];
    let udts = if ickb > 0 {
        vec![cell(0x10, 1, udt_output(ickb), 1)]
    } else {
        Vec::new()
    };
    base(&capacities, &udts, &[], &[], &[], &wallet())
}

/// `count` pool deposits of `unoccupied` CKB made at `block` in `epoch`
pub fn pool_deposits(count: u32, unoccupied: u64, block: u64, epoch: Epoch) -> Vec<Deposit> {
    (0..count)
        .map(|i| Deposit {
            cell: cell(0x40, i, deposit_output(unoccupied), block),
            header: header(block, epoch),
        })
        .collect()
}
