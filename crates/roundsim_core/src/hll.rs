//! HyperLogLog distinct-count sketch.
//!
//! Registers merge by element-wise maximum, which is associative, commutative
//! and idempotent; sketches that exchanged registers in any order converge to
//! the same state.

/// 32-bit FNV-1 offset basis.
const FNV_OFFSET: u32 = 0x811c_9dc5;
/// 32-bit FNV-1 prime.
const FNV_PRIME: u32 = 0x0100_0193;

const TWO_POW_32: f64 = 4_294_967_296.0;

/// 32-bit FNV-1 hash (multiply, then xor).
pub fn fnv1_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        hash.wrapping_mul(FNV_PRIME) ^ u32::from(b)
    })
}

/// Bias-correction constant for `m` registers.
fn alpha(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperLogLog {
    registers: Vec<u8>,
    index_bits: u32,
}

impl HyperLogLog {
    /// Create an empty sketch with `m` registers.
    ///
    /// # Panics
    /// Panics if `m` is not a power of two between 2 and 2^16.
    pub fn new(m: usize) -> Self {
        assert!(
            m.is_power_of_two() && (2..=1 << 16).contains(&m),
            "register count must be a power of two in [2, 65536], got {m}"
        );
        Self {
            registers: vec![0; m],
            index_bits: m.trailing_zeros(),
        }
    }

    /// Rebuild a sketch from a register vector (e.g. received from a peer).
    /// Returns `None` when the length is not a valid register count.
    pub fn from_registers(registers: Vec<u8>) -> Option<Self> {
        let m = registers.len();
        if !m.is_power_of_two() || !(2..=1 << 16).contains(&m) {
            return None;
        }
        Some(Self {
            index_bits: m.trailing_zeros(),
            registers,
        })
    }

    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    /// `true` until the first observation lands in any register.
    pub fn is_zero(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }

    /// Fold one observation into the sketch.
    pub fn add(&mut self, bytes: &[u8]) {
        self.add_hash(fnv1_32(bytes));
    }

    /// Fold a pre-computed 32-bit hash into the sketch.
    pub fn add_hash(&mut self, x: u32) {
        let b = self.index_bits;
        let index = (x >> (32 - b)) as usize;
        // Leading zeros of the remaining 32 - b bits, plus one. An all-zero
        // remainder saturates at 32 - b + 1.
        let rank = ((x << b).leading_zeros().min(32 - b) + 1) as u8;
        let slot = &mut self.registers[index];
        if rank > *slot {
            *slot = rank;
        }
    }

    /// Merge `other` into `self` by element-wise maximum. Returns `true` if
    /// any register increased.
    ///
    /// # Panics
    /// Panics if the register counts differ.
    pub fn merge(&mut self, other: &HyperLogLog) -> bool {
        merge_registers(&mut self.registers, &other.registers)
    }

    /// Estimated number of distinct observations.
    pub fn count(&self) -> u64 {
        let m = self.registers.len() as f64;
        let mut sum = 0.0;
        let mut zeros = 0usize;
        for &r in &self.registers {
            sum += 2f64.powi(-i32::from(r));
            if r == 0 {
                zeros += 1;
            }
        }
        let raw = alpha(self.registers.len()) * m * m / sum;

        let estimate = if raw <= 2.5 * m {
            if zeros > 0 {
                // linear counting
                m * (m / zeros as f64).ln()
            } else {
                raw
            }
        } else if raw <= TWO_POW_32 / 30.0 {
            raw
        } else {
            -TWO_POW_32 * (1.0 - raw / TWO_POW_32).ln()
        };
        estimate.round() as u64
    }
}

/// Element-wise maximum of `into` and `from`, written to `into`. Returns
/// `true` if any cell of `into` increased.
///
/// # Panics
/// Panics if the slices differ in length.
pub fn merge_registers<T: PartialOrd + Copy>(into: &mut [T], from: &[T]) -> bool {
    assert_eq!(into.len(), from.len(), "register vectors differ in length");
    let mut changed = false;
    for (mine, &theirs) in into.iter_mut().zip(from) {
        if theirs > *mine {
            *mine = theirs;
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observations(range: std::ops::Range<u32>) -> Vec<[u8; 4]> {
        range.map(u32::to_le_bytes).collect()
    }

    #[test]
    fn test_fnv1_reference_vectors() {
        assert_eq!(fnv1_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1_32(b"a"), 0x050c_5d7e);
        assert_eq!(fnv1_32(b"foobar"), 0x31f0_b262);
    }

    #[test]
    fn test_register_index_and_rank() {
        let mut h = HyperLogLog::new(32);
        // top 5 bits = 0b00011 -> register 3; remaining bits start with 001
        h.add_hash(0b00011_001 << 24);
        assert_eq!(h.registers()[3], 3);
        // all-zero remainder saturates at 28
        h.add_hash(0b11111 << 27);
        assert_eq!(h.registers()[31], 28);
    }

    #[test]
    fn test_add_is_deterministic() {
        let mut a = HyperLogLog::new(32);
        let mut b = HyperLogLog::new(32);
        for obs in observations(0..500) {
            a.add(&obs);
            b.add(&obs);
        }
        assert_eq!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn test_add_is_order_independent() {
        let obs = observations(1000..1400);
        let mut forward = HyperLogLog::new(32);
        let mut backward = HyperLogLog::new(32);
        for o in &obs {
            forward.add(o);
        }
        for o in obs.iter().rev() {
            backward.add(o);
        }
        assert_eq!(forward.registers(), backward.registers());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut a = HyperLogLog::new(32);
        let mut b = HyperLogLog::new(32);
        for o in observations(0..100) {
            a.add(&o);
        }
        for o in observations(50..300) {
            b.add(&o);
        }
        let mut ab = a.clone();
        ab.merge(&b);
        let mut again = a.clone();
        again.merge(&ab);
        assert_eq!(again, ab);
        assert!(!ab.clone().merge(&ab));
    }

    #[test]
    fn test_merge_matches_sketch_of_union() {
        let mut a = HyperLogLog::new(64);
        let mut b = HyperLogLog::new(64);
        let mut union = HyperLogLog::new(64);
        for o in observations(0..200) {
            a.add(&o);
            union.add(&o);
        }
        for o in observations(150..400) {
            b.add(&o);
            union.add(&o);
        }
        a.merge(&b);
        assert_eq!(a, union);
    }

    #[test]
    fn test_count_never_decreases_under_merge() {
        let mut a = HyperLogLog::new(32);
        for o in observations(0..40) {
            a.add(&o);
        }
        let mut merged = a.clone();
        for start in (40..2000).step_by(40) {
            let mut b = HyperLogLog::new(32);
            for o in observations(start..start + 40) {
                b.add(&o);
            }
            let before = merged.count();
            merged.merge(&b);
            assert!(merged.count() >= before);
            assert!(a.count() <= merged.count());
        }
    }

    #[test]
    fn test_empty_sketch_counts_zero() {
        assert_eq!(HyperLogLog::new(32).count(), 0);
    }

    #[test]
    fn test_estimate_is_in_the_right_ballpark() {
        let mut h = HyperLogLog::new(1024);
        for i in 0u32..10_000 {
            h.add(&i.wrapping_mul(2_654_435_761).to_le_bytes());
        }
        let estimate = h.count() as f64;
        assert!((estimate - 10_000.0).abs() < 1_500.0, "estimate {estimate}");
    }

    #[test]
    fn test_from_registers_validates_length() {
        assert!(HyperLogLog::from_registers(vec![0; 24]).is_none());
        let h = HyperLogLog::from_registers(vec![1; 16]).unwrap();
        assert_eq!(h.register_count(), 16);
    }

    #[test]
    fn test_fresh_sketch_is_zero_but_sized() {
        let mut h = HyperLogLog::new(32);
        assert_eq!(h.register_count(), 32);
        assert!(h.is_zero());
        assert_eq!(h.count(), 0);

        h.add(b"first");
        assert_eq!(h.register_count(), 32);
        assert!(!h.is_zero());
    }
}
