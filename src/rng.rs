//! Run-scoped randomness.
//!
//! One `XorShift64` value is created per run and threaded by `&mut` into
//! everything that draws from it (offset tables, shuffles). Nothing in the
//! crate reaches for ambient or global randomness, so a fixed seed replays
//! the exact scatter and permutations of a previous run.
//!
//! ## Design Choices
//!
//! **Generator**: xorshift64. The benchmark needs stride-breaking indices,
//! not cryptographic quality, and the generator itself must stay out of the
//! way of the measurement: a few register ops, no tables, no allocation.
//!
//! **Bounded sampling**: Lemire's multiply-high method, no division on the
//! hot path. Bucket sizes are frequently powers of two, which take the
//! bitmask fast path.
//!
//! **No `Copy`**: copying an RNG duplicates the stream and silently
//! correlates "independent" permutations. Use `Clone` explicitly if needed.

use std::time::{SystemTime, UNIX_EPOCH};

/// 2^64 / phi, the splitmix64 increment. Also serves as the replacement
/// seed for 0, which xorshift would otherwise never leave.
const GOLDEN_GAMMA: u64 = 0x9E3779B97F4A7C15;

/// Deterministic RNG for scatter tables and permutation shuffles.
///
/// NOT thread-safe, which is fine: the engine is single-threaded and owns
/// exactly one instance per run.
#[derive(Clone, Debug)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Seed the generator. Seed 0 is remapped; the all-zero state is a
    /// fixed point of the xorshift step.
    #[inline]
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { GOLDEN_GAMMA } else { seed },
        }
    }

    /// Seed from the wall clock, mixed through splitmix64.
    ///
    /// This is the default for a run: distinct invocations get distinct
    /// scatter patterns. Pass an explicit seed instead when a run must be
    /// replayable.
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self::new(splitmix64(nanos))
    }

    /// Next value of the raw 64-bit stream.
    ///
    /// Marsaglia's 13/7/17 shift triple; full period over the non-zero
    /// states.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform draw from `[0, upper)`. `upper` must be non-zero.
    #[inline]
    pub fn next_usize(&mut self, upper: usize) -> usize {
        debug_assert!(upper > 0, "upper bound must be > 0");

        if upper.is_power_of_two() {
            return (self.next_u64() as usize) & (upper - 1);
        }

        self.bounded_u64(upper as u64) as usize
    }

    /// Lemire's bounded draw: map the 64-bit stream onto `[0, upper)` by
    /// taking the high half of a 128-bit product, rejecting the rare values
    /// (fewer than `upper` in 2^64) that would bias the low end.
    #[inline]
    fn bounded_u64(&mut self, upper: u64) -> u64 {
        let threshold = upper.wrapping_neg() % upper;

        loop {
            let m = u128::from(self.next_u64()) * u128::from(upper);
            if (m as u64) >= threshold {
                return (m >> 64) as u64;
            }
        }
    }

    /// Uniform in-place Fisher-Yates shuffle. Every permutation of the
    /// slice is equally likely, fixed points included.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.next_usize(i + 1);
            slice.swap(i, j);
        }
    }
}

/// splitmix64 finalizer (Vigna). One round spreads every input bit across
/// the output, which is exactly what raw clock readings need: their low
/// bits churn and their high bits barely move.
#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(GOLDEN_GAMMA);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}
