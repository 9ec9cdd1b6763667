// ============ iCKB Math Library ============
// Exchange rate, NervosDAO epoch and fee arithmetic for the iCKB planner
// All arithmetic is integer-only; amounts are shannons (CKB) or iCKB base units

use ickb_types::{Epoch, Header, Ratio, CKB};
use sha2::{Digest, Sha256};

// ============ Constants ============

/// Accumulated rate of the genesis block
pub const AR_0: u64 = 10_000_000_000_000_000; // 1e16

/// iCKB soft cap per deposit
pub const ICKB_DEPOSIT_CAP: u128 = 100_000 * CKB as u128;

/// Occupied capacity of a pool deposit cell
pub const DEPOSIT_USED_CAPACITY: u64 = 82 * CKB;

/// Rate surcharge that accounts for a deposit cell's occupied capacity
pub const DEPOSIT_CAPACITY_DELTA: u64 =
    ((DEPOSIT_USED_CAPACITY as u128 * AR_0 as u128) / ICKB_DEPOSIT_CAP) as u64;

// ============ Exchange Module ============

pub mod exchange {
    use super::*;

    /// NervosDAO accumulated rate stored at bytes 8..16 of the header's dao field
    pub fn accumulated_rate(header: &Header) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&header.dao[8..16]);
        u64::from_le_bytes(buf)
    }

    /// Exchange ratio at `header`, optionally surcharged for deposit occupied capacity
    pub fn exchange_ratio(header: &Header, account_deposit_capacity: bool) -> Ratio {
        let ar = accumulated_rate(header);
        Ratio {
            ckb_multiplier: AR_0,
            udt_multiplier: if account_deposit_capacity {
                ar.saturating_add(DEPOSIT_CAPACITY_DELTA)
            } else {
                ar
            },
        }
    }

    pub fn ckb_to_ickb(ckb: u128, header: &Header, account_deposit_capacity: bool) -> u128 {
        let ratio = exchange_ratio(header, account_deposit_capacity);
        super::checked_mul_div(ckb, ratio.ckb_multiplier.into(), ratio.udt_multiplier.into())
            .unwrap_or(0)
    }

    pub fn ickb_to_ckb(udt: u128, header: &Header, account_deposit_capacity: bool) -> u128 {
        let ratio = exchange_ratio(header, account_deposit_capacity);
        super::checked_mul_div(udt, ratio.udt_multiplier.into(), ratio.ckb_multiplier.into())
            .unwrap_or(0)
    }

    /// iCKB value of a deposit's unoccupied capacity; 10% discount above the soft cap
    pub fn deposit_ickb_value(unoccupied: u64, deposit_header: &Header) -> u128 {
        let value = ckb_to_ickb(unoccupied.into(), deposit_header, false);
        if value > ICKB_DEPOSIT_CAP {
            value - (value - ICKB_DEPOSIT_CAP) / 10
        } else {
            value
        }
    }

    /// Unoccupied CKB of a standard deposit created at `tip`
    pub fn standard_deposit_amount(tip: &Header) -> u64 {
        u64::try_from(ickb_to_ckb(ICKB_DEPOSIT_CAP, tip, false)).unwrap_or(u64::MAX)
    }

    /// CKB released by a NervosDAO withdrawal, interest included
    pub fn dao_withdraw_capacity(
        capacity: u64,
        occupied: u64,
        deposit_header: &Header,
        request_header: &Header,
    ) -> u64 {
        let free = u128::from(capacity.saturating_sub(occupied));
        let ar_deposit = accumulated_rate(deposit_header);
        let ar_request = accumulated_rate(request_header);
        match super::checked_mul_div(free, ar_request.into(), ar_deposit.into()) {
            Some(grown) => u64::try_from(grown)
                .unwrap_or(u64::MAX)
                .saturating_add(capacity.min(occupied)),
            None => capacity,
        }
    }

    /// Limit order ratio nudged by `1 / fee_divisor` against the order's owner
    pub fn order_ratio(tip: &Header, is_ckb_to_udt: bool, fee_divisor: u64) -> Ratio {
        let base = exchange_ratio(tip, true);
        let fee = base.udt_multiplier.checked_div(fee_divisor).unwrap_or(0);
        Ratio {
            ckb_multiplier: base.ckb_multiplier,
            udt_multiplier: if is_ckb_to_udt {
                base.udt_multiplier.saturating_add(fee)
            } else {
                base.udt_multiplier.saturating_sub(fee)
            },
        }
    }

    /// CKB paid to the matcher compared to converting at the plain exchange ratio
    pub fn order_fee(amount: u128, ratio: &Ratio, tip: &Header, is_ckb_to_udt: bool) -> u128 {
        let ckb_m = u128::from(ratio.ckb_multiplier);
        let udt_m = u128::from(ratio.udt_multiplier);
        if is_ckb_to_udt {
            let udt = super::checked_mul_div(amount, ckb_m, udt_m).unwrap_or(0);
            amount.saturating_sub(ickb_to_ckb(udt, tip, true))
        } else {
            let ckb = super::checked_mul_div(amount, udt_m, ckb_m).unwrap_or(0);
            ickb_to_ckb(amount, tip, true).saturating_sub(ckb)
        }
    }
}

// ============ Epoch Module ============

pub mod epoch {
    use super::*;

    /// NervosDAO lock cycle
    pub const DAO_CYCLE_EPOCHS: u64 = 180;

    /// Nominal epoch duration: 4 hours
    pub const EPOCH_DURATION_MS: u64 = 4 * 60 * 60 * 1000;

    fn rational(e: &Epoch) -> (u128, u128) {
        let length = u128::from(e.length.max(1));
        (u128::from(e.number) * length + u128::from(e.index), length)
    }

    fn gcd(mut a: u64, mut b: u64) -> u64 {
        while b != 0 {
            let t = a % b;
            a = b;
            b = t;
        }
        a
    }

    pub fn add(a: Epoch, b: Epoch) -> Epoch {
        let la = a.length.max(1);
        let lb = b.length.max(1);
        let length = la / gcd(la, lb) * lb;
        let index = a.index * (length / la) + b.index * (length / lb);
        let number = a.number + b.number + index / length;
        let index = index % length;
        if index == 0 {
            return Epoch::new(number, 0, la);
        }
        let g = gcd(index, length);
        Epoch::new(number, index / g, length / g)
    }

    /// First NervosDAO cycle end at or after `reference` for a deposit made at `deposit`
    pub fn dao_maturity(deposit: Epoch, reference: Epoch) -> Epoch {
        let deposit_fraction = u128::from(deposit.index) * u128::from(reference.length.max(1));
        let reference_fraction = u128::from(reference.index) * u128::from(deposit.length.max(1));

        let mut elapsed = reference.number.saturating_sub(deposit.number);
        if reference.number >= deposit.number && reference_fraction > deposit_fraction {
            elapsed += 1;
        }
        let lock_epochs = elapsed.div_ceil(DAO_CYCLE_EPOCHS) * DAO_CYCLE_EPOCHS;

        Epoch::new(deposit.number + lock_epochs, deposit.index, deposit.length)
    }

    pub fn is_mature(maturity: Epoch, tip: &Header) -> bool {
        maturity <= tip.epoch
    }

    /// Milliseconds until `maturity` at nominal epoch duration
    pub fn wait_time_ms(maturity: Epoch, tip: &Header) -> u64 {
        if is_mature(maturity, tip) {
            return 0;
        }
        let (mn, md) = rational(&maturity);
        let (tn, td) = rational(&tip.epoch);
        let numerator = (mn * td - tn * md) * u128::from(EPOCH_DURATION_MS);
        let denominator = md * td;
        u64::try_from(numerator.div_ceil(denominator)).unwrap_or(u64::MAX)
    }

    fn plural(n: u64, unit: &str) -> String {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    }

    /// Human readable wait, e.g. "45 minutes", "5 hours", "12 days"
    pub fn wait_time(maturity: Epoch, tip: &Header) -> String {
        let minutes = wait_time_ms(maturity, tip).div_ceil(60_000);
        if minutes < 60 {
            return plural(minutes, "minute");
        }
        let hours = minutes.div_ceil(60);
        if hours < 48 {
            return plural(hours, "hour");
        }
        plural(hours.div_ceil(24), "day")
    }

    pub fn max_wait_time(maturities: impl IntoIterator<Item = Epoch>, tip: &Header) -> String {
        match maturities.into_iter().max() {
            Some(latest) => wait_time(latest, tip),
            None => plural(0, "minute"),
        }
    }
}

// ============ Fee Module ============

pub mod fee {
    /// Fee in shannons for `size` bytes at `fee_rate` shannons per 1000 bytes, rounded up
    pub fn calculate_tx_fee(size: usize, fee_rate: u64) -> u64 {
        let fee = (size as u128 * u128::from(fee_rate)).div_ceil(1000);
        u64::try_from(fee).unwrap_or(u64::MAX)
    }

    /// Round a fee up to the next multiple of `quantum`
    pub fn quantize_fee(fee: u64, quantum: u64) -> u64 {
        if quantum <= 1 {
            return fee;
        }
        fee.div_ceil(quantum).saturating_mul(quantum)
    }
}

// ============ Search Module ============

/// Smallest `i` in `[0, n)` with `predicate(i)`, or `n` if none.
/// `predicate` must be false-then-true over the range.
pub fn binary_search(n: usize, mut predicate: impl FnMut(usize) -> bool) -> usize {
    let mut low = 0;
    let mut high = n;
    while low < high {
        let mid = low + (high - low) / 2;
        if predicate(mid) {
            high = mid;
        } else {
            low = mid + 1;
        }
    }
    low
}

// ============ DeterministicShuffle Module ============

pub mod shuffle {
    use super::*;

    /// Fisher-Yates shuffle, deterministic given seed
    pub fn shuffle_indices(length: usize, seed: &[u8; 32]) -> Vec<usize> {
        if length == 0 {
            return Vec::new();
        }

        let mut shuffled: Vec<usize> = (0..length).collect();
        let mut current_seed = *seed;

        for i in (1..length).rev() {
            let mut hasher = Sha256::new();
            hasher.update(current_seed);
            hasher.update((i as u64).to_le_bytes());
            let result = hasher.finalize();
            current_seed.copy_from_slice(&result);

            let j = u256_mod_from_bytes(&current_seed, i + 1);
            shuffled.swap(i, j);
        }

        shuffled
    }

    /// `k` distinct indices from `0..length`, uniformly chosen, ascending
    pub fn sample_indices(length: usize, k: usize, seed: &[u8; 32]) -> Vec<usize> {
        let mut picked = shuffle_indices(length, seed);
        picked.truncate(k);
        picked.sort_unstable();
        picked
    }

    fn u256_mod_from_bytes(bytes: &[u8; 32], n: usize) -> usize {
        let mut head = [0u8; 8];
        head.copy_from_slice(&bytes[0..8]);
        (u64::from_le_bytes(head) % n as u64) as usize
    }
}

// ============ Fixed Point Text ============

/// Shannons as decimal CKB text, trailing zeros trimmed: 150_000_000 -> "1.5"
pub fn to_text(amount: u128) -> String {
    let unit = u128::from(CKB);
    let whole = amount / unit;
    let fraction = amount % unit;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{:08}", fraction);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

/// Parse decimal CKB text into shannons; at most 8 fractional digits
pub fn from_text(text: &str) -> Option<u128> {
    let text = text.trim();
    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if fraction.len() > 8 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let fraction: u128 = format!("{:0<8}", fraction).parse().ok()?;
    whole.checked_mul(u128::from(CKB))?.checked_add(fraction)
}

// ============ 256-bit Arithmetic Helpers ============

/// Multiply two u128 values, returning (hi, lo) as a 256-bit result.
pub fn wide_mul(a: u128, b: u128) -> (u128, u128) {
    let mask: u128 = u64::MAX as u128;
    let a_lo = a & mask;
    let a_hi = a >> 64;
    let b_lo = b & mask;
    let b_hi = b >> 64;

    let p0 = a_lo * b_lo;
    let p1 = a_lo * b_hi;
    let p2 = a_hi * b_lo;
    let p3 = a_hi * b_hi;

    let mid = (p0 >> 64) + (p1 & mask) + (p2 & mask);
    let lo = (p0 & mask) | ((mid & mask) << 64);
    let hi = p3 + (p1 >> 64) + (p2 >> 64) + (mid >> 64);

    (hi, lo)
}

fn wide_div(hi: u128, lo: u128, d: u128) -> u128 {
    if hi == 0 {
        return lo / d;
    }

    // Binary search for quotient q where q * d <= (hi << 128) | lo
    let mut low: u128 = 0;
    let mut high: u128 = u128::MAX;

    while low < high {
        let diff = high - low;
        let mid = low + diff / 2 + diff % 2;
        let (mh, ml) = wide_mul(mid, d);
        if mh > hi || (mh == hi && ml > lo) {
            high = mid - 1;
        } else {
            low = mid;
        }
    }
    low
}

/// (a * b) / c with a 256-bit intermediate; `None` when c is zero
pub fn checked_mul_div(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return None;
    }
    Some(match a.checked_mul(b) {
        Some(product) => product / c,
        None => {
            let (hi, lo) = wide_mul(a, b);
            wide_div(hi, lo, c)
        }
    })
}

// ============ Tests ============
