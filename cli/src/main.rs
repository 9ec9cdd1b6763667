// ============ iCKB CLI ============
// Loads a wallet config and a chain snapshot, then prints the wallet state,
// a conversion plan, or the conversion history.
//
// Usage:
//   ickb --config wallet.json --snapshot chain.json state
//   ickb --config wallet.json --snapshot chain.json plan ckb2ickb 2500.5
//   ickb --config wallet.json --snapshot chain.json plan melt
//   ickb --config wallet.json --snapshot chain.json history
//
// Log verbosity follows RUST_LOG (default "info").

use anyhow::{anyhow, bail, Context, Result};
use futures::StreamExt;
use ickb_math::{from_text, to_text};
use ickb_sdk::{history, ChainCache, Config, Direction, EventKind, L1State, MemoryChain, TxInfo};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn flag(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Arguments left after removing `--flag value` pairs
fn positional(args: &[String]) -> Vec<String> {
    let mut rest = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            iter.next();
        } else {
            rest.push(arg.clone());
        }
    }
    rest
}

// ============ Main ============

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = flag(&args, "--config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("wallet.json"));
    let snapshot_path = flag(&args, "--snapshot")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("chain.json"));

    let config = Config::load(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let snapshot = tokio::fs::read_to_string(&snapshot_path)
        .await
        .with_context(|| format!("reading snapshot {}", snapshot_path.display()))?;
    let chain = MemoryChain::from_json(&snapshot).context("parsing snapshot")?;
    info!(snapshot = %snapshot_path.display(), chain = ?config.wallet.chain, "loaded wallet");
    let cache = ChainCache::new();

    println!("=== iCKB Wallet ===");
    println!("Chain:   {:?}", config.wallet.chain);
    println!("Account: 0x{}", hex::encode(config.wallet.account_lock.hash()));
    println!();

    let command = positional(&args);
    match command.first().map(String::as_str).unwrap_or("state") {
        "state" => {
            let state = L1State::load(&chain, &cache, &config).await?;
            print_state(&state);
        }
        "plan" => {
            let direction: Direction = command
                .get(1)
                .ok_or_else(|| anyhow!("plan needs a direction: ckb2ickb, ickb2ckb or melt"))?
                .parse()
                .map_err(|e: String| anyhow!(e))?;
            let amount = match command.get(2) {
                Some(text) => from_text(text).ok_or_else(|| anyhow!("invalid amount {:?}", text))?,
                None if direction == Direction::Melt => 0,
                None => bail!("plan {} needs an amount", direction),
            };
            let state = L1State::load(&chain, &cache, &config).await?;
            print_plan(&state.plan(direction, amount), &state)?;
        }
        "history" => {
            let events = history(&chain, &config.wallet, &cache);
            futures::pin_mut!(events);
            while let Some(event) = events.next().await {
                let event = event?;
                let label = match event.kind {
                    EventKind::ReserveDeposit => "deposit",
                    EventKind::ReserveWithdraw => "withdraw",
                    EventKind::OrderOpen => "order open",
                    EventKind::OrderClose => "order close",
                };
                println!(
                    "  #{:<10} {:<12} {:>20} {:<5} 0x{}",
                    event.block_number,
                    label,
                    to_text(event.amount),
                    event.asset,
                    hex::encode(event.tx_hash)
                );
            }
        }
        other => bail!("unknown command {:?}; expected state, plan or history", other),
    }
    Ok(())
}

fn print_state(state: &L1State) {
    println!("Tip:                 #{}", state.tip.number);
    println!("Fee rate:            {} shannons/KB", state.fee_rate);
    println!("CKB balance:         {}", to_text(state.ckb_balance));
    println!("CKB available:       {}", to_text(state.ckb_available));
    println!("CKB pending:         {}", to_text(state.ckb_pending_balance));
    println!("iCKB balance:        {}", to_text(state.ickb_udt_balance));
    println!("iCKB pending:        {}", to_text(state.ickb_pending_balance));
    println!("iCKB supply:         {}", to_text(state.ickb_udt_pool_balance));
    println!("Pool CKB:            {}", to_text(state.ickb_dao_balance));
    println!("Pool candidates:     {}", state.pool.len());
    println!("Open orders:         {}", state.has_matchable);
    println!();
    for entry in &state.maturity {
        println!(
            "  withdrawal {:>20} CKB  {}",
            to_text(entry.ckb_amount.into()),
            entry.wait_time
        );
    }
    for step in &state.base.steps {
        println!("  - {}", step);
    }
}

fn print_plan(info: &TxInfo, state: &L1State) -> Result<()> {
    for step in &info.steps {
        println!("  - {}", step);
    }
    let tx = match &info.state {
        Ok(tx) => tx,
        Err(e) => bail!("{}", e),
    };

    let summary = serde_json::json!({
        "inputs": tx.inputs.len(),
        "outputs": tx.outputs.len(),
        "cell_deps": tx.cell_deps.len(),
        "header_deps": tx.header_deps.len(),
        "size": tx.serialized_size(state.wallet()),
        "fee": to_text(info.fee.into()),
    });
    println!();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
