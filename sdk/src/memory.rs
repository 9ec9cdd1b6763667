// ============ In-Memory Chain ============
// A `ChainClient` over a list of committed transactions.
// Backs the CLI snapshot mode and every async test.

use crate::chain::*;
use async_trait::async_trait;
use ickb_types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// JSON form of a `MemoryChain`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub tip: Header,
    pub fee_rate: u64,
    #[serde(default)]
    pub headers: Vec<Header>,
    /// Committed transactions, oldest first
    #[serde(default)]
    pub transactions: Vec<TransactionView>,
}

#[derive(Debug)]
pub struct MemoryChain {
    tip: Header,
    fee_rate: u64,
    headers: BTreeMap<u64, Header>,
    transactions: Vec<TransactionView>,
    by_hash: HashMap<Byte32, usize>,
    header_requests: AtomicUsize,
    output_requests: AtomicUsize,
}

impl MemoryChain {
    pub fn new(tip: Header, fee_rate: u64) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(tip.number, tip.clone());
        Self {
            tip,
            fee_rate,
            headers,
            transactions: Vec::new(),
            by_hash: HashMap::new(),
            header_requests: AtomicUsize::new(0),
            output_requests: AtomicUsize::new(0),
        }
    }

    pub fn from_snapshot(snapshot: ChainSnapshot) -> Self {
        let mut chain = Self::new(snapshot.tip, snapshot.fee_rate);
        for header in snapshot.headers {
            chain.insert_header(header);
        }
        for tx in snapshot.transactions {
            chain.commit(tx);
        }
        chain
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_snapshot(serde_json::from_str(json)?))
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            tip: self.tip.clone(),
            fee_rate: self.fee_rate,
            headers: self.headers.values().cloned().collect(),
            transactions: self.transactions.clone(),
        }
    }

    pub fn insert_header(&mut self, header: Header) {
        self.headers.insert(header.number, header);
    }

    pub fn set_tip(&mut self, tip: Header) {
        self.insert_header(tip.clone());
        self.tip = tip;
    }

    pub fn set_fee_rate(&mut self, fee_rate: u64) {
        self.fee_rate = fee_rate;
    }

    /// Append a transaction; its inputs stop being live
    pub fn commit(&mut self, tx: TransactionView) {
        self.by_hash.insert(tx.hash, self.transactions.len());
        self.transactions.push(tx);
    }

    /// Number of `headers_by_number` calls served
    pub fn header_requests(&self) -> usize {
        self.header_requests.load(Ordering::Relaxed)
    }

    /// Number of `transaction_outputs` calls served
    pub fn output_requests(&self) -> usize {
        self.output_requests.load(Ordering::Relaxed)
    }

    fn resolve(&self, out_point: &OutPoint) -> Option<Cell> {
        let tx = &self.transactions[*self.by_hash.get(&out_point.tx_hash)?];
        tx.output_cell(out_point.index as usize)
    }

    fn live_cells(&self) -> Vec<Cell> {
        let consumed: HashSet<OutPoint> = self
            .transactions
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|i| i.previous_output))
            .collect();
        self.transactions
            .iter()
            .flat_map(TransactionView::output_cells)
            .filter(|cell| !consumed.contains(&cell.out_point))
            .collect()
    }

    fn matches(cell: &Cell, owner: &Script, filter: &Script) -> bool {
        cell.lock() == owner && cell.type_script() == Some(filter)
    }
}

fn parse_cursor(cursor: Option<String>) -> Result<usize, ChainError> {
    match cursor {
        None => Ok(0),
        Some(c) => c.parse().map_err(|_| ChainError::InvalidCursor(c)),
    }
}

fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> Page<T> {
    let end = offset.saturating_add(limit.max(1));
    let cursor = (end < items.len()).then(|| end.to_string());
    Page {
        items: items.into_iter().skip(offset).take(limit.max(1)).collect(),
        cursor,
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn fee_rate(&self) -> Result<u64, ChainError> {
        Ok(self.fee_rate)
    }

    async fn tip_header(&self) -> Result<Header, ChainError> {
        Ok(self.tip.clone())
    }

    async fn headers_by_number(
        &self,
        numbers: &BTreeSet<u64>,
    ) -> Result<HashMap<u64, Header>, ChainError> {
        self.header_requests.fetch_add(1, Ordering::Relaxed);
        Ok(numbers
            .iter()
            .filter_map(|n| self.headers.get(n).map(|h| (*n, h.clone())))
            .collect())
    }

    async fn transaction_outputs(
        &self,
        hashes: &BTreeSet<Byte32>,
    ) -> Result<HashMap<Byte32, Vec<Cell>>, ChainError> {
        self.output_requests.fetch_add(1, Ordering::Relaxed);
        Ok(hashes
            .iter()
            .filter_map(|h| {
                let tx = &self.transactions[*self.by_hash.get(h)?];
                Some((*h, tx.output_cells()))
            })
            .collect())
    }

    async fn cells_by_lock(&self, lock: &Script) -> Result<Vec<Cell>, ChainError> {
        Ok(self
            .live_cells()
            .into_iter()
            .filter(|cell| cell.lock() == lock)
            .collect())
    }

    async fn cells_by_type(
        &self,
        type_script: &Script,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<Page<Cell>, ChainError> {
        let offset = parse_cursor(cursor)?;
        let cells: Vec<Cell> = self
            .live_cells()
            .into_iter()
            .filter(|cell| cell.type_script() == Some(type_script))
            .collect();
        Ok(paginate(cells, offset, limit))
    }

    async fn transactions(
        &self,
        owner: &Script,
        filter: &Script,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<Page<TxRecord>, ChainError> {
        let offset = parse_cursor(cursor)?;
        let mut records = Vec::new();
        for tx in self.transactions.iter().rev() {
            let mut cells = Vec::new();
            for (i, input) in tx.inputs.iter().enumerate() {
                if let Some(cell) = self.resolve(&input.previous_output) {
                    if Self::matches(&cell, owner, filter) {
                        cells.push(TxCellRef { is_input: true, index: i as u32 });
                    }
                }
            }
            for cell in tx.output_cells() {
                if Self::matches(&cell, owner, filter) {
                    cells.push(TxCellRef { is_input: false, index: cell.out_point.index });
                }
            }
            if !cells.is_empty() {
                records.push(TxRecord {
                    tx_hash: tx.hash,
                    block_number: tx.block_number,
                    cells,
                });
            }
        }
        Ok(paginate(records, offset, limit))
    }

    async fn transaction(&self, hash: &Byte32) -> Result<Option<TransactionView>, ChainError> {
        Ok(self.by_hash.get(hash).map(|&i| self.transactions[i].clone()))
    }
}

// ============ Tests ============
