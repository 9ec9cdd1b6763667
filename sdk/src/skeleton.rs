// ============ Transaction Skeleton ============
// Unsigned transaction under construction, with per-entry accounted values.
// Sizes follow the molecule encoding of a CKB `Transaction`.

use crate::config::WalletConfig;
use ickb_types::*;

/// A consumed cell and what consuming it is worth
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputEntry {
    pub cell: Cell,
    pub since: u64,
    /// CKB released, DAO interest included
    pub ckb_value: u64,
    /// iCKB released; negative when consuming the cell burns iCKB
    pub udt_value: i128,
    /// `WitnessArgs.input_type` the input's type script expects
    pub input_type: Option<Vec<u8>>,
}

impl InputEntry {
    pub fn new(cell: Cell) -> Self {
        Self {
            ckb_value: cell.capacity(),
            cell,
            since: 0,
            udt_value: 0,
            input_type: None,
        }
    }

    pub fn with_udt(mut self, udt_value: i128) -> Self {
        self.udt_value = udt_value;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputEntry {
    pub output: CellOutput,
    pub data: Vec<u8>,
    /// iCKB locked into the output
    pub udt_value: u128,
}

impl OutputEntry {
    pub fn occupied_capacity(&self) -> u64 {
        self.output.occupied_capacity(self.data.len())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxSkeleton {
    pub inputs: Vec<InputEntry>,
    pub outputs: Vec<OutputEntry>,
    pub cell_deps: Vec<CellDep>,
    pub header_deps: Vec<Byte32>,
}

impl TxSkeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, entry: InputEntry) {
        self.inputs.push(entry);
    }

    /// Returns the new output index
    pub fn add_output(&mut self, output: CellOutput, data: Vec<u8>, udt_value: u128) -> usize {
        self.outputs.push(OutputEntry {
            output,
            data,
            udt_value,
        });
        self.outputs.len() - 1
    }

    pub fn add_cell_deps(&mut self, deps: &[CellDep]) {
        for dep in deps {
            if !self.cell_deps.contains(dep) {
                self.cell_deps.push(*dep);
            }
        }
    }

    /// Returns the index of `hash` in the header deps
    pub fn add_header_dep(&mut self, hash: Byte32) -> usize {
        match self.header_deps.iter().position(|h| *h == hash) {
            Some(index) => index,
            None => {
                self.header_deps.push(hash);
                self.header_deps.len() - 1
            }
        }
    }

    pub fn has_input(&self, out_point: &OutPoint) -> bool {
        self.inputs.iter().any(|i| i.cell.out_point == *out_point)
    }

    /// CKB inputs minus outputs
    pub fn ckb_delta(&self) -> i128 {
        let inputs: i128 = self.inputs.iter().map(|i| i128::from(i.ckb_value)).sum();
        let outputs: i128 = self
            .outputs
            .iter()
            .map(|o| i128::from(o.output.capacity))
            .sum();
        inputs - outputs
    }

    /// iCKB inputs minus outputs
    pub fn udt_delta(&self) -> i128 {
        let inputs: i128 = self.inputs.iter().map(|i| i.udt_value).sum();
        let outputs: i128 = self
            .outputs
            .iter()
            .map(|o| i128::try_from(o.udt_value).unwrap_or(i128::MAX))
            .sum();
        inputs - outputs
    }

    /// Witnesses with a zeroed signature placeholder on the first account input
    pub fn witnesses(&self, wallet: &WalletConfig) -> Vec<Vec<u8>> {
        let signer = self
            .inputs
            .iter()
            .position(|i| *i.cell.lock() == wallet.account_lock);
        self.inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let args = WitnessArgs {
                    lock: (signer == Some(index)).then(|| vec![0u8; wallet.lock_witness_size]),
                    input_type: input.input_type.clone(),
                    output_type: None,
                };
                if args.is_empty() {
                    Vec::new()
                } else {
                    args.serialize()
                }
            })
            .collect()
    }

    /// Block space taken by the signed transaction
    pub fn serialized_size(&self, wallet: &WalletConfig) -> usize {
        fn dynvec(items: impl Iterator<Item = usize>) -> usize {
            items.fold(4, |total, size| total + 4 + size)
        }

        let outputs = dynvec(self.outputs.iter().map(|o| o.output.serialized_size()));
        let outputs_data = dynvec(self.outputs.iter().map(|o| 4 + o.data.len()));
        let raw = 4 + 6 * 4 // table header
            + 4 // version
            + 4 + self.cell_deps.len() * CellDep::SERIALIZED_SIZE
            + 4 + self.header_deps.len() * 32
            + 4 + self.inputs.len() * CellInput::SERIALIZED_SIZE
            + outputs
            + outputs_data;
        let witnesses = dynvec(self.witnesses(wallet).iter().map(|w| 4 + w.len()));

        // Table header, plus the offset the block spends on every transaction
        4 + 2 * 4 + raw + witnesses + 4
    }
}

// ============ Tests ============
