// ============ iCKB Integration Tests ============
// Plans are committed back into the in-memory chain and the wallet is reloaded,
// so every scenario crosses classification, planning, balancing and history.
//
// Test categories:
// 1. CKB -> iCKB: deposits, receipt and a resting order, then melt
// 2. iCKB -> CKB: withdrawal requests, maturity, then withdrawal
// 3. Cache reuse across reloads

use crate::support::*;
use futures::StreamExt;
use ickb_sdk::*;
use ickb_types::*;

const TX_FUNDING: u8 = 0x10;
const TX_POOL: u8 = 0x20;

fn ckb_wallet_chain() -> MemoryChain {
    let mut chain = MemoryChain::new(tip(), 1_000);
    mint(&mut chain, TX_FUNDING, 1, vec![capacity_output(300_000 * CKB)]);
    chain
}

fn ickb_wallet_chain() -> MemoryChain {
    let mut chain = MemoryChain::new(tip(), 1_000);
    chain.insert_header(header(5, Epoch::new(900, 0, 1)));
    mint(
        &mut chain,
        TX_FUNDING,
        1,
        vec![capacity_output(2_000 * CKB), udt_output(300_000 * CKB as u128)],
    );
    mint(
        &mut chain,
        TX_POOL,
        5,
        (0..3).map(|_| deposit_output(100_000 * CKB)).collect(),
    );
    chain
}

// ============ Test 1: CKB -> iCKB Lifecycle ============

#[tokio::test]
async fn test_ckb_to_ickb_then_melt() {
    let mut chain = ckb_wallet_chain();
    let state = load(&chain, &ChainCache::new()).await;
    assert_eq!(state.ckb_balance, 300_000 * CKB as u128);
    assert_eq!(state.ckb_available, 299_000 * CKB as u128);

    let plan = state.plan(Direction::CkbToIckb, 250_000 * CKB as u128);
    assert_balanced(&plan);
    assert_eq!(
        plan.steps[0],
        "Creating 2 standard deposits (each amount is 100000 CKB) and their Receipt"
    );
    assert!(plan.steps[1].starts_with("Creating a Limit Order for the remaining 50000 CKB."));

    commit_plan(&mut chain, plan.tx().unwrap(), 0xb1, 100);
    chain.insert_header(header(100, Epoch::new(900, 0, 1)));

    let state = load(&chain, &ChainCache::new()).await;
    assert_eq!(state.receipts.len(), 1);
    assert_eq!(state.receipts[0].data.deposit_quantity, 2);
    assert_eq!(state.orders.len(), 1);
    assert!(state.has_matchable);
    assert_eq!(state.orders[0].info.abs_total, 50_000 * CKB as u128);
    assert_eq!(state.pool.len(), 2);
    assert_eq!(state.ickb_dao_balance, 200_000 * CKB as u128);
    assert_eq!(state.ickb_pending_balance, 200_000 * CKB as u128);

    let melt = state.plan(Direction::Melt, 0);
    assert_balanced(&melt);
    assert_eq!(melt.steps[0], "Cancelling 1 Open Order");
    assert_eq!(melt.steps[1], "Converting 1 Receipt to iCKB");
    let minted: u128 = melt.tx().unwrap().outputs.iter().map(|o| o.udt_value).sum();
    assert_eq!(minted, 200_000 * CKB as u128);

    let cache = ChainCache::new();
    let w = wallet();
    let events: Vec<Event> = history(&chain, &w, &cache).map(|e| e.unwrap()).collect().await;
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::ReserveDeposit, EventKind::OrderOpen]);
    assert_eq!(events[0].amount, 200_000 * CKB as u128);
    assert_eq!(events[1].amount, 50_000 * CKB as u128);
    assert!(events.iter().all(|e| e.tx_hash == [0xb1; 32]));
}

// ============ Test 2: iCKB -> CKB Lifecycle ============

#[tokio::test]
async fn test_ickb_to_ckb_then_withdraw() {
    let mut chain = ickb_wallet_chain();
    let state = load(&chain, &ChainCache::new()).await;
    assert_eq!(state.pool.len(), 3);
    assert_eq!(state.ickb_udt_balance, 300_000 * CKB as u128);

    let plan = state.plan(Direction::IckbToCkb, 200_000 * CKB as u128);
    assert_balanced(&plan);
    assert!(plan.steps[0].starts_with("Requesting the Withdrawal from 2 Deposits with maturity in"));
    assert!(plan.steps.iter().all(|s| !s.contains("Limit Order")));

    commit_plan(&mut chain, plan.tx().unwrap(), 0xb2, 150);
    chain.insert_header(header(150, Epoch::new(1_000, 0, 1)));

    let state = load(&chain, &ChainCache::new()).await;
    assert_eq!(state.pool.len(), 1);
    assert_eq!(state.ickb_udt_balance, 100_000 * CKB as u128);
    assert_eq!(state.maturity.len(), 2);
    assert!(state.maturity.iter().all(|m| m.wait_time == "14 days"));
    assert_eq!(
        state.base.steps[0],
        "Excluding 2 Withdrawal Requests with maturity in 14 days"
    );

    // Eighty epochs later both requests can be withdrawn
    chain.set_tip(header(2_000, Epoch::new(1_100, 0, 1)));
    let state = load(&chain, &ChainCache::new()).await;
    assert!(state.maturity.iter().all(|m| m.wait_time == "matured"));
    assert_eq!(state.ckb_pending_balance, 2 * 100_082 * CKB as u128);

    let withdraw = state.plan(Direction::Melt, 0);
    assert_balanced(&withdraw);
    assert!(withdraw
        .steps
        .contains(&"Withdrawing from 2 Withdrawal Requests".to_string()));
    let tx = withdraw.tx().unwrap();
    let maturity = Epoch::new(1_080, 0, 1).to_since();
    assert_eq!(tx.inputs.iter().filter(|i| i.since == maturity).count(), 2);
    assert!(tx.header_deps.contains(&header(5, Epoch::new(900, 0, 1)).hash));
    assert!(tx.header_deps.contains(&header(150, Epoch::new(1_000, 0, 1)).hash));

    let w = wallet();
    let witnesses = tx.witnesses(&w);
    assert_eq!(witnesses.len(), tx.inputs.len());
}

// ============ Test 3: Cache Reuse ============

#[tokio::test]
async fn test_reload_reuses_cached_headers() {
    let chain = ickb_wallet_chain();
    let cache = ChainCache::new();
    load(&chain, &cache).await;
    assert_eq!(chain.header_requests(), 1);
    load(&chain, &cache).await;
    assert_eq!(chain.header_requests(), 1);
    assert_eq!(cache.cached_headers(), 1);
}
