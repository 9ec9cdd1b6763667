// ============ iCKB Fuzz Tests ============
// Random wallets, pools and amounts driven by a fixed-seed LCG, so failures
// reproduce exactly.
//
// Properties:
// 1. Every feasible plan balances; every infeasible one names a short asset
// 2. With ample CKB the deposit count grows with the amount
// 3. The planner's binary search agrees with a linear scan
// 4. DAO maturity never precedes the reference and locks whole cycles
// 5. Pool samples are ordered subsets of the ranking prefix
// 6. Exact redemptions succeed on CKB that cannot fund a partial one

use crate::support::*;
use ickb_math::{binary_search, epoch};
use ickb_sdk::*;
use ickb_types::*;

// ============ Deterministic RNG ============

struct TestRng {
    state: u64,
}

impl TestRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state >> 16
    }

    /// Uniform in `[lo, hi)`
    fn range(&mut self, lo: u64, hi: u64) -> u64 {
        if hi <= lo {
            return lo;
        }
        lo + self.next_u64() % (hi - lo)
    }

    fn seed(&mut self) -> [u8; 32] {
        let mut seed = [0u8; 32];
        for chunk in seed.chunks_mut(8) {
            chunk.copy_from_slice(&self.next_u64().to_le_bytes());
        }
        seed
    }
}

fn random_pool(rng: &mut TestRng) -> Vec<ExtendedDeposit> {
    let count = rng.range(0, 8) as u32;
    let deposits: Vec<Deposit> = (0..count)
        .map(|i| Deposit {
            cell: cell(0x40, i, deposit_output(rng.range(1_000, 150_000) * CKB), 5),
            header: header(5, Epoch::new(900, 0, 1)),
        })
        .collect();
    rank_pool(&deposits, &tip(), PlannerConfig::default().min_lock)
}

fn deposit_count(info: &TxInfo) -> usize {
    let w = wallet();
    let dao = Some(w.scripts.dao());
    let logic = w.scripts.ickb_logic();
    info.tx().map_or(0, |tx| {
        tx.outputs
            .iter()
            .filter(|o| o.output.lock == logic && o.output.type_ == dao)
            .count()
    })
}

// ============ Property 1: Conservation ============

#[test]
fn fuzz_plans_balance_or_name_the_short_asset() {
    let mut rng = TestRng::new(42);
    let planner = PlannerConfig::default();

    for round in 0..150 {
        let ckb = rng.range(100, 2_000_000) * CKB;
        let ickb = u128::from(rng.range(0, 500_000)) * CKB as u128;
        let is_ckb_to_udt = rng.range(0, 2) == 0;
        let amount = u128::from(rng.range(1, 600_000)) * CKB as u128;
        let pool = random_pool(&mut rng);

        let base = funded_base(ckb, ickb);
        let info = convert(&base, is_ckb_to_udt, amount, &pool, &tip(), FEE_RATE, &wallet(), &planner);
        match info.error() {
            None => assert_balanced(&info),
            Some(error) => assert!(
                matches!(error, PlanError::InsufficientBalance { .. }),
                "round {}: unexpected {:?}",
                round,
                error
            ),
        }
    }
}

// ============ Property 2: Monotonicity ============

#[test]
fn fuzz_deposit_count_tracks_amount() {
    let mut rng = TestRng::new(7);
    let planner = PlannerConfig::default();
    let base = funded_base(100_000_000 * CKB, 0);

    let mut amounts: Vec<u128> = (0..40)
        .map(|_| u128::from(rng.range(1, 5_000_000)) * CKB as u128)
        .collect();
    amounts.sort_unstable();

    let mut previous = 0;
    for amount in amounts {
        let info = convert(&base, true, amount, &[], &tip(), FEE_RATE, &wallet(), &planner);
        assert_balanced(&info);
        let count = deposit_count(&info);
        assert_eq!(count as u128, amount / (100_000 * CKB as u128));
        assert!(count >= previous);
        previous = count;
    }
}

// ============ Property 3: Search ============

#[test]
fn fuzz_binary_search_matches_linear_scan() {
    let mut rng = TestRng::new(1234);

    for _ in 0..500 {
        let n = rng.range(0, 200) as usize;
        let threshold = rng.range(0, n as u64 + 1) as usize;
        let mut calls = 0;
        let found = binary_search(n, |i| {
            calls += 1;
            i >= threshold
        });
        let linear = (0..n).find(|&i| i >= threshold).unwrap_or(n);
        assert_eq!(found, linear);
        // ceil(log2(200)) + 1
        assert!(calls <= 9);
    }
}

// ============ Property 4: Maturity ============

#[test]
fn fuzz_dao_maturity_locks_whole_cycles() {
    let mut rng = TestRng::new(99);

    for _ in 0..1_000 {
        let length = rng.range(1, 1_800);
        let deposit = Epoch::new(rng.range(0, 5_000), rng.range(0, length), length);
        let ref_length = rng.range(1, 1_800);
        let reference = Epoch::new(
            deposit.number + rng.range(0, 1_000),
            rng.range(0, ref_length),
            ref_length,
        );
        if reference < deposit {
            continue;
        }

        let maturity = epoch::dao_maturity(deposit, reference);
        assert!(maturity >= reference, "{:?} before {:?}", maturity, reference);
        assert_eq!((maturity.number - deposit.number) % epoch::DAO_CYCLE_EPOCHS, 0);
        assert_eq!(maturity.index, deposit.index);
        assert_eq!(maturity.length, deposit.length);
    }
}

// ============ Property 5: Sampling ============

#[test]
fn fuzz_pool_sample_is_ordered_prefix_subset() {
    let mut rng = TestRng::new(2024);
    let planner = PlannerConfig::default();

    for _ in 0..20 {
        let count = rng.range(0, 120) as u32;
        let deposits: Vec<Deposit> = (0..count)
            .map(|i| {
                let length = rng.range(1, 1_000);
                Deposit {
                    cell: cell(0x40, i, deposit_output(100_000 * CKB), 5),
                    header: header(5, Epoch::new(rng.range(850, 999), rng.range(0, length), length)),
                }
            })
            .collect();
        let ranked = rank_pool(&deposits, &tip(), planner.min_lock);
        let sampled = sample_pool(ranked.clone(), &planner, &rng.seed());

        assert_eq!(sampled.len(), ranked.len().min(planner.pool_sample_size));
        let prefix = &ranked[..ranked.len().min(planner.pool_sample_size)];
        let mut last = None;
        for d in &sampled {
            let position = prefix.iter().position(|p| p == d);
            assert!(position.is_some());
            assert!(position > last);
            last = position;
        }
    }
}

// ============ Property 6: Exact Redemption on Thin CKB ============

#[test]
fn fuzz_exact_redemption_needs_no_order_capacity() {
    let mut rng = TestRng::new(31337);
    let planner = PlannerConfig::default();
    let w = wallet();
    let owner_lock = w.scripts.owned_owner();

    for _ in 0..30 {
        let k = rng.range(1, 6) as u32;
        let pool = rank_pool(
            &pool_deposits(k + rng.range(0, 3) as u32, 100_000 * CKB, 5, Epoch::new(900, 0, 1)),
            &tip(),
            planner.min_lock,
        );
        let amount = u128::from(k) * 100_000 * CKB as u128;
        // One owner cell per request plus change, nothing left for an order and its master
        let base = funded_base(u64::from(k) * 98 * CKB, amount);

        let info = convert(&base, false, amount, &pool, &tip(), FEE_RATE, &w, &planner);
        assert_balanced(&info);
        let requests = info
            .tx()
            .unwrap()
            .outputs
            .iter()
            .filter(|o| o.output.lock == owner_lock)
            .count();
        assert_eq!(requests, k as usize);
    }
}
