// ============ Change Balancer ============
// Closes a planned transaction: returns leftover iCKB and CKB to the account
// and pays the network fee out of the CKB change.

use crate::config::{PlannerConfig, WalletConfig};
use crate::txinfo::{Asset, PlanError, TxInfo};
use ickb_math::{fee, to_text};
use ickb_types::*;
use tracing::debug;

/// Add the iCKB and CKB change cells and settle the fee.
/// Infeasible transactions pass through unchanged.
pub fn add_change(
    info: TxInfo,
    fee_rate: u64,
    wallet: &WalletConfig,
    planner: &PlannerConfig,
) -> TxInfo {
    let TxInfo { mut steps, state, .. } = info;
    let mut tx = match state {
        Ok(tx) => tx,
        Err(error) => return TxInfo::failed(steps, error),
    };

    let udt_delta = tx.udt_delta();
    if udt_delta < 0 {
        return TxInfo::failed(steps, PlanError::InsufficientBalance { asset: Asset::Ickb });
    }
    if udt_delta > 0 {
        let amount = udt_delta as u128;
        let mut output = CellOutput {
            capacity: 0,
            lock: wallet.account_lock.clone(),
            type_: Some(wallet.scripts.ickb_udt()),
        };
        let data = amount.to_le_bytes().to_vec();
        output.capacity = output.occupied_capacity(data.len());
        tx.add_cell_deps(&wallet.scripts.ickb_udt.cell_deps);
        tx.add_output(output, data, amount);
    }

    if tx.inputs.iter().any(|i| *i.cell.lock() == wallet.account_lock) {
        tx.add_cell_deps(&wallet.account_cell_deps);
    }

    // Capacity does not change the encoded size, so one pass settles the fee
    let change = tx.add_output(
        CellOutput {
            capacity: 0,
            lock: wallet.account_lock.clone(),
            type_: None,
        },
        Vec::new(),
        0,
    );
    let size = tx.serialized_size(wallet);
    let fee = fee::quantize_fee(fee::calculate_tx_fee(size, fee_rate), planner.fee_quantum);
    let free = tx.ckb_delta() - i128::from(fee);
    let occupied = tx.outputs[change].occupied_capacity();
    if free < i128::from(occupied) {
        debug!(size, fee, free = %free, "change below occupied capacity");
        return TxInfo::failed(steps, PlanError::InsufficientBalance { asset: Asset::Ckb });
    }
    tx.outputs[change].output.capacity = match u64::try_from(free) {
        Ok(capacity) => capacity,
        Err(_) => return TxInfo::failed(steps, PlanError::ChangeOverflow),
    };

    if tx.outputs.len() > planner.max_outputs {
        return TxInfo::failed(
            steps,
            PlanError::OutputLimitExceeded {
                outputs: tx.outputs.len(),
                limit: planner.max_outputs,
            },
        );
    }

    steps.push(format!("Paying an extra Network Fee of {} CKB", to_text(fee.into())));
    TxInfo {
        steps,
        fee,
        state: Ok(tx),
    }
}

// ============ Tests ============
