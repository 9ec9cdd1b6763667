// ============ Chain Cache ============
// Session-scoped, append-only read-through cache of headers and transaction outputs.
// Committed headers and outputs never change, so entries are never invalidated.

use crate::chain::{ChainClient, ChainError};
use crate::config::Chain;
use ickb_types::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

#[derive(Debug, Default)]
pub struct ChainCache {
    headers: RwLock<HashMap<(Chain, u64), Header>>,
    outputs: RwLock<HashMap<(Chain, Byte32), Arc<Vec<Cell>>>>,
}

impl ChainCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_headers(&self) -> usize {
        self.headers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn cached_transactions(&self) -> usize {
        self.outputs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Headers for `wanted`, fetching only the ones not seen before in a single batch
    pub async fn headers(
        &self,
        client: &dyn ChainClient,
        chain: Chain,
        wanted: &BTreeSet<u64>,
    ) -> Result<HashMap<u64, Header>, ChainError> {
        let mut result = HashMap::with_capacity(wanted.len());
        let mut missing = BTreeSet::new();
        {
            let known = self.headers.read().unwrap_or_else(PoisonError::into_inner);
            for &number in wanted {
                match known.get(&(chain, number)) {
                    Some(header) => {
                        result.insert(number, header.clone());
                    }
                    None => {
                        missing.insert(number);
                    }
                }
            }
        }
        if missing.is_empty() {
            return Ok(result);
        }

        debug!(hits = result.len(), misses = missing.len(), "fetching headers");
        let fetched = client.headers_by_number(&missing).await?;
        for number in &missing {
            if !fetched.contains_key(number) {
                return Err(ChainError::MissingHeader(*number));
            }
        }

        let mut known = self.headers.write().unwrap_or_else(PoisonError::into_inner);
        for (number, header) in fetched {
            known.insert((chain, number), header.clone());
            result.insert(number, header);
        }
        Ok(result)
    }

    pub async fn header(
        &self,
        client: &dyn ChainClient,
        chain: Chain,
        number: u64,
    ) -> Result<Header, ChainError> {
        let wanted = BTreeSet::from([number]);
        self.headers(client, chain, &wanted)
            .await?
            .remove(&number)
            .ok_or(ChainError::MissingHeader(number))
    }

    /// Outputs of the `wanted` transactions, fetching only the unknown ones in a single batch
    pub async fn transaction_outputs(
        &self,
        client: &dyn ChainClient,
        chain: Chain,
        wanted: &BTreeSet<Byte32>,
    ) -> Result<HashMap<Byte32, Arc<Vec<Cell>>>, ChainError> {
        let mut result = HashMap::with_capacity(wanted.len());
        let mut missing = BTreeSet::new();
        {
            let known = self.outputs.read().unwrap_or_else(PoisonError::into_inner);
            for hash in wanted {
                match known.get(&(chain, *hash)) {
                    Some(outputs) => {
                        result.insert(*hash, Arc::clone(outputs));
                    }
                    None => {
                        missing.insert(*hash);
                    }
                }
            }
        }
        if missing.is_empty() {
            return Ok(result);
        }

        debug!(hits = result.len(), misses = missing.len(), "fetching transaction outputs");
        let fetched = client.transaction_outputs(&missing).await?;
        for hash in &missing {
            if !fetched.contains_key(hash) {
                return Err(ChainError::MissingTransaction(*hash));
            }
        }

        let mut known = self.outputs.write().unwrap_or_else(PoisonError::into_inner);
        for (hash, outputs) in fetched {
            let outputs = Arc::new(outputs);
            known.insert((chain, hash), Arc::clone(&outputs));
            result.insert(hash, outputs);
        }
        Ok(result)
    }
}
