// ============ Chain Collaborator ============
// Everything the planner reads from the ledger goes through `ChainClient`

use async_trait::async_trait;
use ickb_types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("header of block {0} not found")]
    MissingHeader(u64),
    #[error("transaction 0x{} not found", hex::encode(.0))]
    MissingTransaction(Byte32),
    #[error("invalid cursor {0:?}")]
    InvalidCursor(String),
}

/// One page of an indexer query; `cursor` is `None` on the last page
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
}

/// A cell of interest touched by a transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCellRef {
    pub is_input: bool,
    /// Input or output index, depending on `is_input`
    pub index: u32,
}

/// Indexer transaction record: which of the queried cells a transaction touched
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    #[serde(with = "hex_serde::byte32")]
    pub tx_hash: Byte32,
    pub block_number: u64,
    pub cells: Vec<TxCellRef>,
}

impl TxRecord {
    pub fn creates_cells(&self) -> bool {
        self.cells.iter().any(|c| !c.is_input)
    }
}

/// A committed transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    #[serde(with = "hex_serde::byte32")]
    pub hash: Byte32,
    pub block_number: u64,
    #[serde(default)]
    pub inputs: Vec<CellInput>,
    pub outputs: Vec<CellOutput>,
    #[serde(with = "hex_serde::bytes_list", default)]
    pub outputs_data: Vec<Vec<u8>>,
}

impl TransactionView {
    pub fn output_cell(&self, index: usize) -> Option<Cell> {
        let output = self.outputs.get(index)?;
        Some(Cell {
            out_point: OutPoint::new(self.hash, index as u32),
            output: output.clone(),
            data: self.outputs_data.get(index).cloned().unwrap_or_default(),
            block_number: self.block_number,
        })
    }

    pub fn output_cells(&self) -> Vec<Cell> {
        (0..self.outputs.len()).filter_map(|i| self.output_cell(i)).collect()
    }
}

/// Read-only ledger access. Implementations own timeouts and retries.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Median fee rate in shannons per 1000 bytes
    async fn fee_rate(&self) -> Result<u64, ChainError>;

    async fn tip_header(&self) -> Result<Header, ChainError>;

    async fn headers_by_number(
        &self,
        numbers: &BTreeSet<u64>,
    ) -> Result<HashMap<u64, Header>, ChainError>;

    async fn transaction_outputs(
        &self,
        hashes: &BTreeSet<Byte32>,
    ) -> Result<HashMap<Byte32, Vec<Cell>>, ChainError>;

    /// Live cells locked by `lock`
    async fn cells_by_lock(&self, lock: &Script) -> Result<Vec<Cell>, ChainError>;

    /// Live cells typed by `type_script`, paginated
    async fn cells_by_type(
        &self,
        type_script: &Script,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<Page<Cell>, ChainError>;

    /// Transactions touching cells with lock `owner` and type `filter`, newest first
    async fn transactions(
        &self,
        owner: &Script,
        filter: &Script,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<Page<TxRecord>, ChainError>;

    async fn transaction(&self, hash: &Byte32) -> Result<Option<TransactionView>, ChainError>;
}
