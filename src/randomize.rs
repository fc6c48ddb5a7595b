//! Cache-resident index scattering for randomized access patterns.
//!
//! A full permutation table over the region would be as large as the region
//! itself, and walking it would add one extra miss per access, polluting the
//! measurement. `OffsetRandomizer` keeps all of its state in a fixed
//! 4096-entry table (32 KiB, resident in L1/L2) and still breaks sequential
//! striding: index `i` lands in bucket `i mod 4096`, at a per-bucket offset
//! that advances cyclically each time the sweep wraps the table.
//!
//! A full sweep of `0..slot_count` produces every slot exactly once, because
//! each bucket sees each of its positions once per cycle. The scheme is a
//! structured scatter, not a uniform permutation of arbitrary index ranges;
//! that approximation is the point, not a defect to fix.

use std::fmt;

use crate::rng::XorShift64;

/// Entries in the offset table. A power of two, so the bucket lookup is a
/// mask and the pass counter is a shift.
pub const TABLE_SIZE: usize = 1 << 12;

const TABLE_SHIFT: u32 = TABLE_SIZE.trailing_zeros();

/// Errors from [`OffsetRandomizer`] construction.
#[derive(Debug)]
pub enum RandomizeError {
    /// The slot count was zero.
    SlotCountZero,
    /// The slot count does not divide evenly into table buckets.
    NotDivisible {
        slot_count: usize,
        table_size: usize,
    },
}

impl fmt::Display for RandomizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotCountZero => write!(f, "slot count must be non-zero"),
            Self::NotDivisible {
                slot_count,
                table_size,
            } => write!(
                f,
                "slot count {slot_count} is not a multiple of the offset table size {table_size}"
            ),
        }
    }
}

impl std::error::Error for RandomizeError {}

/// Scatters indices across `[0, slot_count)` from a small randomized table.
///
/// Immutable after construction; `randomize` draws nothing from the RNG.
pub struct OffsetRandomizer {
    /// One starting offset per bucket, each in `[0, bucket_size)`.
    table: Box<[usize]>,
    bucket_size: usize,
}

impl OffsetRandomizer {
    /// Draw the offset table for a region of `slot_count` slots.
    ///
    /// # Errors
    /// - `SlotCountZero` if `slot_count == 0`.
    /// - `NotDivisible` if `slot_count` is not a multiple of [`TABLE_SIZE`];
    ///   the requirement is checked here, never silently truncated.
    pub fn new(slot_count: usize, rng: &mut XorShift64) -> Result<Self, RandomizeError> {
        if slot_count == 0 {
            return Err(RandomizeError::SlotCountZero);
        }
        if slot_count % TABLE_SIZE != 0 {
            return Err(RandomizeError::NotDivisible {
                slot_count,
                table_size: TABLE_SIZE,
            });
        }

        let bucket_size = slot_count / TABLE_SIZE;
        let table = (0..TABLE_SIZE)
            .map(|_| rng.next_usize(bucket_size))
            .collect();

        Ok(Self { table, bucket_size })
    }

    /// Scatter index `i` into `[0, slot_count)`.
    ///
    /// O(1), touching only the table: bucket `i mod TABLE_SIZE`, offset
    /// `(table[bucket] + i div TABLE_SIZE) mod bucket_size`. `i` must be
    /// below `slot_count`.
    #[inline]
    pub fn randomize(&self, i: usize) -> usize {
        debug_assert!(i < self.slot_count());
        let bucket = i & (TABLE_SIZE - 1);
        let pass = i >> TABLE_SHIFT;
        let within = (self.table[bucket] + pass) % self.bucket_size;
        bucket * self.bucket_size + within
    }

    /// Slots this randomizer scatters over.
    #[inline]
    pub fn slot_count(&self) -> usize {
        TABLE_SIZE * self.bucket_size
    }

    /// Slots per bucket.
    #[inline]
    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn randomizer(slot_count: usize, seed: u64) -> OffsetRandomizer {
        let mut rng = XorShift64::new(seed);
        OffsetRandomizer::new(slot_count, &mut rng).unwrap()
    }

    #[test]
    fn rejects_zero_slot_count() {
        let mut rng = XorShift64::new(1);
        assert!(matches!(
            OffsetRandomizer::new(0, &mut rng),
            Err(RandomizeError::SlotCountZero)
        ));
    }

    #[test]
    fn rejects_slot_counts_that_do_not_divide() {
        let mut rng = XorShift64::new(1);
        for slot_count in [1, TABLE_SIZE - 1, TABLE_SIZE + 1, 3 * TABLE_SIZE / 2] {
            assert!(
                matches!(
                    OffsetRandomizer::new(slot_count, &mut rng),
                    Err(RandomizeError::NotDivisible { .. })
                ),
                "slot_count {slot_count} should be rejected"
            );
        }
    }

    #[test]
    fn outputs_stay_in_range() {
        let randomizer = randomizer(4 * TABLE_SIZE, 7);
        for i in 0..randomizer.slot_count() {
            let out = randomizer.randomize(i);
            assert!(out < randomizer.slot_count(), "index {i} mapped to {out}");
        }
    }

    #[test]
    fn full_sweep_covers_every_slot_once() {
        let randomizer = randomizer(8 * TABLE_SIZE, 42);
        let mut seen = vec![false; randomizer.slot_count()];
        for i in 0..randomizer.slot_count() {
            let out = randomizer.randomize(i);
            assert!(!seen[out], "slot {out} produced twice");
            seen[out] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn each_bucket_position_is_visited_once_per_full_sweep() {
        let randomizer = randomizer(4 * TABLE_SIZE, 13);
        let bucket_size = randomizer.bucket_size();
        for bucket in [0usize, 1, 977, TABLE_SIZE - 1] {
            let mut seen = vec![false; bucket_size];
            // Indices congruent to `bucket` arrive once per table pass and
            // must walk every position in the bucket exactly once.
            for pass in 0..bucket_size {
                let i = pass * TABLE_SIZE + bucket;
                let out = randomizer.randomize(i);
                assert_eq!(out / bucket_size, bucket);
                let within = out % bucket_size;
                assert!(!seen[within], "position {within} revisited");
                seen[within] = true;
            }
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn consecutive_indices_change_buckets() {
        let randomizer = randomizer(16 * TABLE_SIZE, 3);
        for i in 0..(randomizer.slot_count() - 1) {
            let a = randomizer.randomize(i) / randomizer.bucket_size();
            let b = randomizer.randomize(i + 1) / randomizer.bucket_size();
            assert_ne!(a, b, "indices {i} and {} share a bucket", i + 1);
        }
    }

    #[test]
    fn unit_stride_pairs_are_rare() {
        let randomizer = randomizer(16 * TABLE_SIZE, 99);
        let n = randomizer.slot_count();
        let mut unit_strides = 0usize;
        let mut prev = randomizer.randomize(0);
        for i in 1..n {
            let out = randomizer.randomize(i);
            if out == prev + 1 {
                unit_strides += 1;
            }
            prev = out;
        }
        // A sequential sweep would produce n - 1 unit strides; the scatter
        // should leave only accidental adjacencies.
        assert!(unit_strides < n / 100, "{unit_strides} unit strides in {n}");
    }

    #[test]
    fn bucket_size_one_degenerates_to_identity() {
        let randomizer = randomizer(TABLE_SIZE, 1);
        assert_eq!(randomizer.bucket_size(), 1);
        for i in [0, 1, 17, TABLE_SIZE - 1] {
            assert_eq!(randomizer.randomize(i), i);
        }
    }
}
