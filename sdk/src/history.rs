// ============ History Scanner ============
// Lazily turns the account's receipt, owner and master cell history into a
// time ordered event list. Receipt and owner histories are read up front;
// limit order history arrives newest first, so no event is yielded before
// its last page is merged.

use crate::cache::ChainCache;
use crate::chain::{ChainClient, ChainError, TxRecord};
use crate::config::WalletConfig;
use crate::txinfo::Asset;
use futures::stream::{self, Stream};
use ickb_types::*;
use std::collections::{BTreeSet, HashSet, VecDeque};
use tracing::debug;

const PAGE_SIZE: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    ReserveDeposit,
    ReserveWithdraw,
    OrderOpen,
    OrderClose,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Block timestamp in milliseconds
    pub timestamp: u64,
    pub block_number: u64,
    pub kind: EventKind,
    pub amount: u128,
    pub asset: Asset,
    pub tx_hash: Byte32,
}

enum Phase {
    Start,
    Orders {
        records: VecDeque<TxRecord>,
        cursor: Option<String>,
        exhausted: bool,
    },
    Drain,
    Done,
}

pub struct HistoryScanner<'a> {
    client: &'a dyn ChainClient,
    cache: &'a ChainCache,
    wallet: &'a WalletConfig,
    phase: Phase,
    /// Ascending by timestamp
    buffer: VecDeque<Event>,
}

impl<'a> HistoryScanner<'a> {
    pub fn new(client: &'a dyn ChainClient, cache: &'a ChainCache, wallet: &'a WalletConfig) -> Self {
        Self {
            client,
            cache,
            wallet,
            phase: Phase::Start,
            buffer: VecDeque::new(),
        }
    }

    /// Next event, `None` once history is exhausted. After an error the
    /// scanner is finished; start a new one to retry.
    pub async fn next(&mut self) -> Result<Option<Event>, ChainError> {
        match self.advance().await {
            Ok(event) => Ok(event),
            Err(e) => {
                self.phase = Phase::Done;
                self.buffer.clear();
                Err(e)
            }
        }
    }

    async fn advance(&mut self) -> Result<Option<Event>, ChainError> {
        loop {
            match &mut self.phase {
                Phase::Start => {
                    let scripts = &self.wallet.scripts;
                    for record in self.drain(&scripts.ickb_logic()).await? {
                        let events = self.deposit_events(&record).await?;
                        self.merge(events);
                    }
                    for record in self.drain(&scripts.owned_owner()).await? {
                        let events = self.withdraw_events(&record).await?;
                        self.merge(events);
                    }
                    debug!(buffered = self.buffer.len(), "reserve history loaded");
                    self.phase = Phase::Orders {
                        records: VecDeque::new(),
                        cursor: None,
                        exhausted: false,
                    };
                }
                Phase::Orders {
                    records,
                    cursor,
                    exhausted,
                } => {
                    if let Some(record) = records.pop_front() {
                        let events = self.order_events(&record).await?;
                        self.merge(events);
                    } else if *exhausted {
                        self.phase = Phase::Drain;
                    } else {
                        let page = self
                            .client
                            .transactions(
                                &self.wallet.account_lock,
                                &self.wallet.scripts.limit_order(),
                                cursor.take(),
                                PAGE_SIZE,
                            )
                            .await?;
                        *exhausted = page.cursor.is_none() || page.items.is_empty();
                        *cursor = page.cursor;
                        records.extend(page.items);
                    }
                }
                Phase::Drain => match self.buffer.pop_front() {
                    Some(event) => return Ok(Some(event)),
                    None => self.phase = Phase::Done,
                },
                Phase::Done => return Ok(None),
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Event, ChainError>> + 'a {
        stream::unfold(self, |mut scanner| async move {
            match scanner.next().await {
                Ok(Some(event)) => Some((Ok(event), scanner)),
                Ok(None) => None,
                Err(e) => Some((Err(e), scanner)),
            }
        })
    }

    fn merge(&mut self, events: Vec<Event>) {
        for event in events {
            let at = self.buffer.partition_point(|e| e.timestamp <= event.timestamp);
            self.buffer.insert(at, event);
        }
    }

    /// Every transaction touching the account's cells of type `filter`
    async fn drain(&self, filter: &Script) -> Result<Vec<TxRecord>, ChainError> {
        let mut records = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .client
                .transactions(&self.wallet.account_lock, filter, cursor, PAGE_SIZE)
                .await?;
            let done = page.cursor.is_none() || page.items.is_empty();
            records.extend(page.items);
            if done {
                return Ok(records);
            }
            cursor = page.cursor;
        }
    }

    async fn outputs(&self, tx_hash: Byte32) -> Result<std::sync::Arc<Vec<Cell>>, ChainError> {
        let wanted = BTreeSet::from([tx_hash]);
        self.cache
            .transaction_outputs(self.client, self.wallet.chain, &wanted)
            .await?
            .remove(&tx_hash)
            .ok_or(ChainError::MissingTransaction(tx_hash))
    }

    async fn event(
        &self,
        record: &TxRecord,
        kind: EventKind,
        amount: u128,
        asset: Asset,
    ) -> Result<Event, ChainError> {
        let header = self
            .cache
            .header(self.client, self.wallet.chain, record.block_number)
            .await?;
        Ok(Event {
            timestamp: header.timestamp,
            block_number: record.block_number,
            kind,
            amount,
            asset,
            tx_hash: record.tx_hash,
        })
    }

    /// One event per receipt created
    async fn deposit_events(&self, record: &TxRecord) -> Result<Vec<Event>, ChainError> {
        if !record.creates_cells() {
            return Ok(Vec::new());
        }
        let outputs = self.outputs(record.tx_hash).await?;
        let mut events = Vec::new();
        for r in record.cells.iter().filter(|c| !c.is_input) {
            let data = outputs
                .get(r.index as usize)
                .and_then(|cell| ReceiptData::deserialize(&cell.data));
            if let Some(data) = data {
                let amount = u128::from(data.deposit_quantity) * u128::from(data.deposit_amount);
                events.push(self.event(record, EventKind::ReserveDeposit, amount, Asset::Ckb).await?);
            }
        }
        Ok(events)
    }

    /// One event per withdrawal request created, measured by its unoccupied CKB
    async fn withdraw_events(&self, record: &TxRecord) -> Result<Vec<Event>, ChainError> {
        if !record.creates_cells() {
            return Ok(Vec::new());
        }
        let outputs = self.outputs(record.tx_hash).await?;
        let mut events = Vec::new();
        for r in record.cells.iter().filter(|c| !c.is_input) {
            let request = outputs
                .get(r.index as usize)
                .and_then(|owner| OwnerData::deserialize(&owner.data))
                .and_then(|d| usize::try_from(i64::from(r.index) + i64::from(d.owned_distance)).ok())
                .and_then(|i| outputs.get(i));
            if let Some(request) = request {
                events.push(
                    self.event(record, EventKind::ReserveWithdraw, request.free_capacity().into(), Asset::Ckb)
                        .await?,
                );
            }
        }
        Ok(events)
    }

    /// Orders minted along with a new master, or melted along with a consumed one
    async fn order_events(&self, record: &TxRecord) -> Result<Vec<Event>, ChainError> {
        let mut events = Vec::new();
        if record.creates_cells() {
            let outputs = self.outputs(record.tx_hash).await?;
            let masters: HashSet<OutPoint> = record
                .cells
                .iter()
                .filter(|c| !c.is_input)
                .map(|c| OutPoint::new(record.tx_hash, c.index))
                .collect();
            for cell in outputs.iter() {
                if let Some((amount, asset)) = self.order_amount(cell, &masters) {
                    events.push(self.event(record, EventKind::OrderOpen, amount, asset).await?);
                }
            }
            return Ok(events);
        }

        let tx = self
            .client
            .transaction(&record.tx_hash)
            .await?
            .ok_or(ChainError::MissingTransaction(record.tx_hash))?;
        let masters: HashSet<OutPoint> = record
            .cells
            .iter()
            .filter_map(|c| tx.inputs.get(c.index as usize))
            .map(|i| i.previous_output)
            .collect();
        let previous: BTreeSet<Byte32> = tx.inputs.iter().map(|i| i.previous_output.tx_hash).collect();
        let previous = self
            .cache
            .transaction_outputs(self.client, self.wallet.chain, &previous)
            .await?;
        for input in &tx.inputs {
            let consumed = previous
                .get(&input.previous_output.tx_hash)
                .and_then(|outputs| outputs.get(input.previous_output.index as usize));
            if let Some((amount, asset)) = consumed.and_then(|c| self.order_amount(c, &masters)) {
                events.push(self.event(record, EventKind::OrderClose, amount, asset).await?);
            }
        }
        Ok(events)
    }

    /// iCKB held by an order of ours, or its unoccupied CKB when it holds none
    fn order_amount(&self, cell: &Cell, masters: &HashSet<OutPoint>) -> Option<(u128, Asset)> {
        let scripts = &self.wallet.scripts;
        if *cell.lock() != scripts.limit_order() || cell.type_script() != Some(&scripts.ickb_udt()) {
            return None;
        }
        let data = OrderData::deserialize(&cell.data)?;
        if !masters.contains(&data.master.resolve(&cell.out_point)?) {
            return None;
        }
        if data.udt_amount > 0 {
            Some((data.udt_amount, Asset::Ickb))
        } else {
            Some((cell.free_capacity().into(), Asset::Ckb))
        }
    }
}

/// Events of `wallet`'s conversions, oldest reserve activity first
pub fn history<'a>(
    client: &'a dyn ChainClient,
    wallet: &'a WalletConfig,
    cache: &'a ChainCache,
) -> impl Stream<Item = Result<Event, ChainError>> + 'a {
    HistoryScanner::new(client, cache, wallet).into_stream()
}

// ============ Tests ============
