// ============ iCKB CKB Types ============
// Shared cell model for the math library, SDK and CLI
// Payload layouts mirror the molecule schemas of the iCKB v1 scripts

use core::cmp::Ordering;
use serde::{Deserialize, Serialize};

pub type Byte32 = [u8; 32];

// ============ Unit Constants ============

/// Shannons per CKB
pub const CKB: u64 = 100_000_000;

/// Default minimum partial match of a limit order, as log2 of shannons
pub const DEFAULT_CKB_MIN_MATCH_LOG: u8 = 33;

/// Absolute epoch flag of a `since` value
pub const SINCE_ABSOLUTE_EPOCH_FLAG: u64 = 0x2000_0000_0000_0000;

/// Data of a NervosDAO deposit cell
pub const DAO_DEPOSIT_DATA: [u8; 8] = [0u8; 8];

const CKB_HASH_PERSONALIZATION: &[u8] = b"ckb-default-hash";

// ============ Hashing ============

/// blake2b-256 with the CKB personalization
pub fn ckb_hash(data: &[u8]) -> Byte32 {
    let result = blake2b_simd::Params::new()
        .hash_length(32)
        .personal(CKB_HASH_PERSONALIZATION)
        .hash(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(result.as_bytes());
    hash
}

// ============ Scripts ============

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    Data,
    Type,
    Data1,
    Data2,
}

impl HashType {
    pub fn to_byte(self) -> u8 {
        match self {
            HashType::Data => 0,
            HashType::Type => 1,
            HashType::Data1 => 2,
            HashType::Data2 => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Script {
    #[serde(with = "hex_serde::byte32")]
    pub code_hash: Byte32,
    pub hash_type: HashType,
    #[serde(with = "hex_serde::bytes", default)]
    pub args: Vec<u8>,
}

impl Script {
    pub fn new(code_hash: Byte32, hash_type: HashType, args: Vec<u8>) -> Self {
        Self {
            code_hash,
            hash_type,
            args,
        }
    }

    /// Bytes counted towards a cell's occupied capacity
    pub fn occupied_size(&self) -> usize {
        32 + 1 + self.args.len()
    }

    /// Molecule table: header + code_hash + hash_type + args as Bytes
    pub fn serialized_size(&self) -> usize {
        16 + 32 + 1 + 4 + self.args.len()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let total = self.serialized_size();
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&(total as u32).to_le_bytes());
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&48u32.to_le_bytes());
        buf.extend_from_slice(&49u32.to_le_bytes());
        buf.extend_from_slice(&self.code_hash);
        buf.push(self.hash_type.to_byte());
        buf.extend_from_slice(&(self.args.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.args);
        buf
    }

    /// CKB script hash
    pub fn hash(&self) -> Byte32 {
        ckb_hash(&self.serialize())
    }
}

// ============ Out Points, Inputs and Deps ============

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    #[serde(with = "hex_serde::byte32")]
    pub tx_hash: Byte32,
    pub index: u32,
}

impl OutPoint {
    pub const SERIALIZED_SIZE: usize = 32 + 4;

    pub fn new(tx_hash: Byte32, index: u32) -> Self {
        Self { tx_hash, index }
    }

    /// Out point `distance` positions away inside the same transaction
    pub fn offset(&self, distance: i32) -> Option<Self> {
        let index = i64::from(self.index) + i64::from(distance);
        let index = u32::try_from(index).ok()?;
        Some(Self::new(self.tx_hash, index))
    }

    pub fn serialize(&self) -> [u8; Self::SERIALIZED_SIZE] {
        let mut buf = [0u8; Self::SERIALIZED_SIZE];
        buf[0..32].copy_from_slice(&self.tx_hash);
        buf[32..36].copy_from_slice(&self.index.to_le_bytes());
        buf
    }

    pub fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SERIALIZED_SIZE {
            return None;
        }
        Some(Self {
            tx_hash: data[0..32].try_into().ok()?,
            index: u32::from_le_bytes(data[32..36].try_into().ok()?),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInput {
    pub previous_output: OutPoint,
    #[serde(default)]
    pub since: u64,
}

impl CellInput {
    pub const SERIALIZED_SIZE: usize = 8 + OutPoint::SERIALIZED_SIZE;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepType {
    Code,
    DepGroup,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellDep {
    pub out_point: OutPoint,
    pub dep_type: DepType,
}

impl CellDep {
    pub const SERIALIZED_SIZE: usize = OutPoint::SERIALIZED_SIZE + 1;
}

// ============ Cells ============

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOutput {
    pub capacity: u64,
    pub lock: Script,
    #[serde(rename = "type", default)]
    pub type_: Option<Script>,
}

impl CellOutput {
    /// Occupied capacity in shannons for a cell carrying `data_len` bytes
    pub fn occupied_capacity(&self, data_len: usize) -> u64 {
        let type_size = self.type_.as_ref().map_or(0, Script::occupied_size);
        let bytes = 8 + self.lock.occupied_size() + type_size + data_len;
        bytes as u64 * CKB
    }

    pub fn serialized_size(&self) -> usize {
        let type_size = self.type_.as_ref().map_or(0, Script::serialized_size);
        16 + 8 + self.lock.serialized_size() + type_size
    }

    pub fn has_type(&self, script: &Script) -> bool {
        self.type_.as_ref() == Some(script)
    }
}

/// A live (or historical) cell as returned by the indexer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub out_point: OutPoint,
    pub output: CellOutput,
    #[serde(with = "hex_serde::bytes", default)]
    pub data: Vec<u8>,
    /// Block the cell was created in
    pub block_number: u64,
}

impl Cell {
    pub fn capacity(&self) -> u64 {
        self.output.capacity
    }

    pub fn lock(&self) -> &Script {
        &self.output.lock
    }

    pub fn type_script(&self) -> Option<&Script> {
        self.output.type_.as_ref()
    }

    pub fn occupied_capacity(&self) -> u64 {
        self.output.occupied_capacity(self.data.len())
    }

    /// Capacity above what the cell itself occupies
    pub fn free_capacity(&self) -> u64 {
        self.capacity().saturating_sub(self.occupied_capacity())
    }
}

// ============ Headers and Epochs ============

/// Rational epoch `number + index / length`
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Epoch {
    pub number: u64,
    pub index: u64,
    pub length: u64,
}

impl Epoch {
    pub const fn new(number: u64, index: u64, length: u64) -> Self {
        Self {
            number,
            index,
            length,
        }
    }

    /// Unpack `number (24 bits) | index (16 bits) << 24 | length (16 bits) << 40`
    pub fn from_packed(value: u64) -> Self {
        Self {
            number: value & 0xff_ffff,
            index: (value >> 24) & 0xffff,
            length: (value >> 40) & 0xffff,
        }
    }

    pub fn to_packed(&self) -> u64 {
        (self.number & 0xff_ffff) | ((self.index & 0xffff) << 24) | ((self.length & 0xffff) << 40)
    }

    /// Absolute epoch `since` for transaction inputs
    pub fn to_since(&self) -> u64 {
        SINCE_ABSOLUTE_EPOCH_FLAG | self.to_packed()
    }

    pub fn from_since(since: u64) -> Option<Self> {
        if since & 0xff00_0000_0000_0000 != SINCE_ABSOLUTE_EPOCH_FLAG {
            return None;
        }
        Some(Self::from_packed(since & 0x00ff_ffff_ffff_ffff))
    }

    fn denominator(&self) -> u128 {
        u128::from(self.length.max(1))
    }

    /// Numerator over `denominator()`
    fn numerator(&self) -> u128 {
        u128::from(self.number) * self.denominator() + u128::from(self.index)
    }
}

impl PartialEq for Epoch {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Epoch {}

impl PartialOrd for Epoch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Epoch {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.numerator() * other.denominator()).cmp(&(other.numerator() * self.denominator()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(with = "hex_serde::byte32")]
    pub hash: Byte32,
    pub number: u64,
    pub epoch: Epoch,
    /// Milliseconds since the unix epoch
    pub timestamp: u64,
    #[serde(with = "hex_serde::byte32")]
    pub dao: Byte32,
}

// ============ iCKB Payloads ============

/// Receipt cell data: per user, records deposits not yet converted to iCKB
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiptData {
    pub deposit_quantity: u32,
    pub deposit_amount: u64,
}

impl ReceiptData {
    pub const SERIALIZED_SIZE: usize = 4 + 8; // 12

    pub fn serialize(&self) -> [u8; Self::SERIALIZED_SIZE] {
        let mut buf = [0u8; Self::SERIALIZED_SIZE];
        buf[0..4].copy_from_slice(&self.deposit_quantity.to_le_bytes());
        buf[4..12].copy_from_slice(&self.deposit_amount.to_le_bytes());
        buf
    }

    pub fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SERIALIZED_SIZE {
            return None;
        }
        Some(Self {
            deposit_quantity: u32::from_le_bytes(data[0..4].try_into().ok()?),
            deposit_amount: u64::from_le_bytes(data[4..12].try_into().ok()?),
        })
    }
}

/// Owner cell data, pointing at the withdrawal request it owns
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OwnerData {
    pub owned_distance: i32,
}

impl OwnerData {
    pub const SERIALIZED_SIZE: usize = 4;

    pub fn serialize(&self) -> [u8; Self::SERIALIZED_SIZE] {
        self.owned_distance.to_le_bytes()
    }

    pub fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SERIALIZED_SIZE {
            return None;
        }
        Some(Self {
            owned_distance: i32::from_le_bytes(data[0..4].try_into().ok()?),
        })
    }
}

/// UDT amount stored in the first 16 bytes of a token cell
pub fn udt_amount(data: &[u8]) -> Option<u128> {
    if data.len() < 16 {
        return None;
    }
    Some(u128::from_le_bytes(data[0..16].try_into().ok()?))
}

/// Deposit block number stored in a NervosDAO withdrawal request
pub fn dao_request_block(data: &[u8]) -> Option<u64> {
    if data.len() != 8 {
        return None;
    }
    let block = u64::from_le_bytes(data.try_into().ok()?);
    (block != 0).then_some(block)
}

/// Exchange ratio `ckb * ckb_multiplier == udt * udt_multiplier`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    pub ckb_multiplier: u64,
    pub udt_multiplier: u64,
}

impl Ratio {
    pub const SERIALIZED_SIZE: usize = 8 + 8;

    pub fn is_empty(&self) -> bool {
        self.ckb_multiplier == 0 || self.udt_multiplier == 0
    }

    fn write(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.ckb_multiplier.to_le_bytes());
        buf[8..16].copy_from_slice(&self.udt_multiplier.to_le_bytes());
    }

    fn read(data: &[u8]) -> Option<Self> {
        Some(Self {
            ckb_multiplier: u64::from_le_bytes(data[0..8].try_into().ok()?),
            udt_multiplier: u64::from_le_bytes(data[8..16].try_into().ok()?),
        })
    }
}

/// Where a limit order's master cell lives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MasterRef {
    /// Same transaction, `distance` outputs away from the order
    Relative(i32),
    Absolute(OutPoint),
}

impl MasterRef {
    pub fn resolve(&self, order: &OutPoint) -> Option<OutPoint> {
        match self {
            MasterRef::Relative(distance) => order.offset(*distance),
            MasterRef::Absolute(out_point) => Some(*out_point),
        }
    }
}

/// Limit order cell data: UDT amount followed by the order info
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderData {
    pub udt_amount: u128,
    pub master: MasterRef,
    pub ckb_to_udt: Ratio,
    pub udt_to_ckb: Ratio,
    pub ckb_min_match_log: u8,
}

impl OrderData {
    pub const SERIALIZED_SIZE: usize = 16 + 1 + 36 + 16 + 16 + 1; // 86

    pub fn serialize(&self) -> [u8; Self::SERIALIZED_SIZE] {
        let mut buf = [0u8; Self::SERIALIZED_SIZE];
        let mut offset = 0;

        buf[offset..offset + 16].copy_from_slice(&self.udt_amount.to_le_bytes());
        offset += 16;

        match self.master {
            MasterRef::Relative(distance) => {
                buf[offset] = 0;
                buf[offset + 1..offset + 5].copy_from_slice(&distance.to_le_bytes());
            }
            MasterRef::Absolute(out_point) => {
                buf[offset] = 1;
                buf[offset + 1..offset + 37].copy_from_slice(&out_point.serialize());
            }
        }
        offset += 37;

        self.ckb_to_udt.write(&mut buf[offset..offset + 16]);
        offset += 16;
        self.udt_to_ckb.write(&mut buf[offset..offset + 16]);
        offset += 16;

        buf[offset] = self.ckb_min_match_log;

        buf
    }

    pub fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SERIALIZED_SIZE {
            return None;
        }
        let mut offset = 0;

        let udt_amount = u128::from_le_bytes(data[offset..offset + 16].try_into().ok()?);
        offset += 16;

        let master = match data[offset] {
            0 => MasterRef::Relative(i32::from_le_bytes(
                data[offset + 1..offset + 5].try_into().ok()?,
            )),
            1 => MasterRef::Absolute(OutPoint::deserialize(&data[offset + 1..offset + 37])?),
            _ => return None,
        };
        offset += 37;

        let ckb_to_udt = Ratio::read(&data[offset..offset + 16])?;
        offset += 16;
        let udt_to_ckb = Ratio::read(&data[offset..offset + 16])?;
        offset += 16;

        let order = Self {
            udt_amount,
            master,
            ckb_to_udt,
            udt_to_ckb,
            ckb_min_match_log: data[offset],
        };
        // Exactly one direction must be enabled
        if order.ckb_to_udt.is_empty() == order.udt_to_ckb.is_empty() {
            return None;
        }
        Some(order)
    }

    pub fn is_ckb_to_udt(&self) -> bool {
        !self.ckb_to_udt.is_empty()
    }
}

// ============ Witnesses ============

/// Molecule `WitnessArgs`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WitnessArgs {
    pub lock: Option<Vec<u8>>,
    pub input_type: Option<Vec<u8>>,
    pub output_type: Option<Vec<u8>>,
}

impl WitnessArgs {
    pub fn is_empty(&self) -> bool {
        self.lock.is_none() && self.input_type.is_none() && self.output_type.is_none()
    }

    fn field_size(field: &Option<Vec<u8>>) -> usize {
        field.as_ref().map_or(0, |b| 4 + b.len())
    }

    pub fn serialized_size(&self) -> usize {
        16 + Self::field_size(&self.lock)
            + Self::field_size(&self.input_type)
            + Self::field_size(&self.output_type)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let total = self.serialized_size();
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&(total as u32).to_le_bytes());

        let mut offset = 16usize;
        for field in [&self.lock, &self.input_type, &self.output_type] {
            buf.extend_from_slice(&(offset as u32).to_le_bytes());
            offset += Self::field_size(field);
        }
        for field in [&self.lock, &self.input_type, &self.output_type] {
            if let Some(bytes) = field {
                buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                buf.extend_from_slice(bytes);
            }
        }
        buf
    }
}

// ============ Hex Serde Helpers ============

pub mod hex_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn encode(bytes: &[u8]) -> String {
        format!("0x{}", hex::encode(bytes))
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(s.strip_prefix("0x").unwrap_or(s))
    }

    pub mod bytes {
        use super::*;

        #[allow(clippy::ptr_arg)]
        pub fn serialize<S: Serializer>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&encode(value))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
            let s = String::deserialize(deserializer)?;
            decode(&s).map_err(D::Error::custom)
        }
    }

    pub mod bytes_list {
        use super::*;
        use serde::ser::SerializeSeq;

        pub fn serialize<S: Serializer>(value: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(value.len()))?;
            for bytes in value {
                seq.serialize_element(&encode(bytes))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
            let strings = Vec::<String>::deserialize(deserializer)?;
            strings
                .iter()
                .map(|s| decode(s).map_err(D::Error::custom))
                .collect()
        }
    }

    pub mod byte32 {
        use super::*;

        pub fn serialize<S: Serializer>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&encode(value))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
            let s = String::deserialize(deserializer)?;
            let bytes = decode(&s).map_err(D::Error::custom)?;
            bytes
                .try_into()
                .map_err(|b: Vec<u8>| D::Error::custom(format!("expected 32 bytes, got {}", b.len())))
        }
    }
}

// ============ Tests ============
