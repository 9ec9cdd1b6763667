// ============ iCKB Edge Case Tests ============
// Boundaries of the planner: nothing to do, exact fits, hard output limit,
// fee rounding around the change cell, and very large deposit pools.

use crate::support::*;
use ickb_math::fee::{calculate_tx_fee, quantize_fee};
use ickb_sdk::*;
use ickb_types::*;

fn ranked_pool(count: u32) -> Vec<ExtendedDeposit> {
    rank_pool(
        &pool_deposits(count, 100_000 * CKB, 5, Epoch::new(900, 0, 1)),
        &tip(),
        PlannerConfig::default().min_lock,
    )
}

fn plan(base: &TxInfo, is_ckb_to_udt: bool, amount: u128, pool: &[ExtendedDeposit]) -> TxInfo {
    convert(base, is_ckb_to_udt, amount, pool, &tip(), FEE_RATE, &wallet(), &PlannerConfig::default())
}

// ============ Amount Zero ============

#[tokio::test]
async fn test_zero_amount_without_claims_is_nothing_to_convert() {
    let mut chain = MemoryChain::new(tip(), 1_000);
    mint(&mut chain, 0x10, 1, vec![capacity_output(5_000 * CKB)]);
    let state = load(&chain, &ChainCache::new()).await;

    for direction in [Direction::CkbToIckb, Direction::IckbToCkb] {
        let info = state.plan(direction, 0);
        assert_eq!(info.error(), Some(&PlanError::NothingToConvert));
    }
    // Melting always consolidates into a single change cell
    let melt = state.plan(Direction::Melt, 0);
    assert_balanced(&melt);
    assert_eq!(melt.tx().unwrap().outputs.len(), 1);
}

// ============ Exact Redemption ============

#[test]
fn test_exact_redemption_emits_no_order() {
    let pool = ranked_pool(4);
    let info = plan(&funded_base(2_000 * CKB, 300_000 * CKB as u128), false, 300_000 * CKB as u128, &pool);
    assert_balanced(&info);

    let tx = info.tx().unwrap();
    assert!(info.steps[0].starts_with("Requesting the Withdrawal from 3 Deposits"));
    assert!(info.steps.iter().all(|s| !s.contains("Limit Order")));
    let limit_order = wallet().scripts.limit_order();
    assert!(tx.outputs.iter().all(|o| o.output.lock != limit_order));
    // 3 requests, 3 owners, CKB change
    assert_eq!(tx.outputs.len(), 7);
}

#[test]
fn test_empty_pool_falls_back_to_order() {
    let info = plan(&funded_base(2_000 * CKB, 300_000 * CKB as u128), false, 300_000 * CKB as u128, &[]);
    assert_balanced(&info);
    assert!(info.steps[0].starts_with("Creating a Limit Order for 300000 iCKB."));
}

#[test]
fn test_missing_ickb_is_reported() {
    let pool = ranked_pool(4);
    let info = plan(&funded_base(2_000 * CKB, 10 * CKB as u128), false, 300_000 * CKB as u128, &pool);
    assert_eq!(info.error(), Some(&PlanError::InsufficientBalance { asset: Asset::Ickb }));
}

// ============ Output Cap ============

#[test]
fn test_output_cap_limits_deposit_count() {
    let info = plan(&funded_base(8_000_000 * CKB, 0), true, 7_000_000 * CKB as u128, &[]);
    assert_balanced(&info);

    let tx = info.tx().unwrap();
    assert_eq!(tx.outputs.len(), 64);
    assert_eq!(
        info.steps[0],
        "Creating 60 standard deposits (each amount is 100000 CKB) and their Receipt"
    );
    assert!(info.steps[1].starts_with("Creating a Limit Order for the remaining 1000000 CKB."));
}

#[test]
fn test_output_cap_is_terminal() {
    let w = wallet();
    let mut tx = TxSkeleton::new();
    tx.add_input(InputEntry::new(cell(0x10, 0, capacity_output(100_000 * CKB), 1)));
    for _ in 0..70 {
        let (output, data) = capacity_output(61 * CKB);
        tx.add_output(output, data, 0);
    }
    let info = add_change(TxInfo::new(tx, Vec::new()), FEE_RATE, &w, &PlannerConfig::default());
    assert_eq!(
        info.error(),
        Some(&PlanError::OutputLimitExceeded { outputs: 71, limit: 64 })
    );
}

// ============ Fee Convergence ============

#[test]
fn test_fee_accounts_for_the_change_cell() {
    let w = wallet();
    let fee_rate = 1_000_000;
    let mut tx = TxSkeleton::new();
    tx.add_input(InputEntry::new(cell(0x10, 0, capacity_output(10_000 * CKB), 1)));
    let undershoot = quantize_fee(calculate_tx_fee(tx.serialized_size(&w), fee_rate), 2_000);

    let info = add_change(TxInfo::new(tx, Vec::new()), fee_rate, &w, &PlannerConfig::default());
    assert_balanced(&info);
    let final_size = info.tx().unwrap().serialized_size(&w);
    assert!(info.fee > undershoot);
    assert_eq!(info.fee, quantize_fee(calculate_tx_fee(final_size, fee_rate), 2_000));
}

// ============ Error Propagation ============

#[test]
fn test_failed_info_flows_through_unchanged() {
    let failed = TxInfo::failed(vec!["Step".to_string()], PlanError::ReserveOvershoot);
    let planner = PlannerConfig::default();
    assert_eq!(plan(&failed, true, 500_000 * CKB as u128, &[]), failed);
    assert_eq!(add_change(failed.clone(), FEE_RATE, &wallet(), &planner), failed);
}

// ============ Large Pools ============

#[test]
fn test_two_hundred_deposit_pool() {
    let deposits: Vec<Deposit> = (0..200u32)
        .map(|i| Deposit {
            cell: cell(0x40, i, deposit_output(100_000 * CKB), 5),
            header: header(5, Epoch::new(900, u64::from(i), 200)),
        })
        .collect();
    let planner = PlannerConfig::default();
    let ranked = rank_pool(&deposits, &tip(), planner.min_lock);
    assert_eq!(ranked.len(), 200);
    assert!(ranked.windows(2).all(|w| w[0].maturity <= w[1].maturity));

    for seed in 0..5u8 {
        let sampled = sample_pool(ranked.clone(), &planner, &[seed; 32]);
        // round(200 / 180) < 40, so the sample is the whole 40 deposit prefix
        assert_eq!(sampled, ranked[..40].to_vec());
    }
}

#[test]
fn test_huge_pool_samples_a_wider_prefix() {
    let deposits: Vec<Deposit> = (0..9_000u32)
        .map(|i| Deposit {
            cell: cell(0x41, i, deposit_output(100_000 * CKB), 5),
            header: header(5, Epoch::new(900, u64::from(i % 1_000), 1_000)),
        })
        .collect();
    let planner = PlannerConfig::default();
    let ranked = rank_pool(&deposits, &tip(), planner.min_lock);
    let sampled = sample_pool(ranked.clone(), &planner, &[3; 32]);

    assert_eq!(sampled.len(), 40);
    // round(9000 / 180) = 50
    let prefix = &ranked[..50];
    assert!(sampled.iter().all(|d| prefix.contains(d)));
    let positions: Vec<usize> = sampled
        .iter()
        .map(|d| prefix.iter().position(|p| p == d).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_deposits_about_to_mature_are_skipped() {
    let mut deposits = pool_deposits(2, 100_000 * CKB, 5, Epoch::new(900, 0, 1));
    // Matures exactly at the tip
    deposits.push(Deposit {
        cell: cell(0x42, 0, deposit_output(100_000 * CKB), 4),
        header: header(4, Epoch::new(820, 0, 1)),
    });
    let ranked = rank_pool(&deposits, &tip(), PlannerConfig::default().min_lock);
    assert_eq!(ranked.len(), 2);
    assert!(ranked.iter().all(|d| d.deposit.cell.block_number == 5));
}
