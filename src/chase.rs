//! Dependent pointer chases over region-backed permutations.
//!
//! A chase array stores, in slot `i`'s payload, the index of the next slot
//! to visit, so every load's address depends on the previous load's value
//! and the hardware prefetcher has nothing to extrapolate. The traversal
//! order lives in the benchmarked memory itself; there is no side table to
//! consult and pollute the measurement.
//!
//! The permutation is a uniformly shuffled identity. Uniform shuffles
//! decompose into multiple cycles, so a walk that starts at slot 0 tours
//! the cycle containing slot 0, not necessarily every slot; what the chase
//! measures is dependent-load latency, not coverage.

use crate::region::{CacheLine, MemoryRegion, RegionError, CACHE_LINE_SIZE};
use crate::rng::XorShift64;

/// A region-backed bijection on `[0, len)`.
///
/// Every index in `[0, len)` appears exactly once as a payload. The backing
/// region rounds up to whole pages; only the first `len` slots carry the
/// permutation, and only those are exposed.
pub struct PermutationArray {
    region: MemoryRegion,
    len: usize,
}

impl PermutationArray {
    /// Build one shuffled-identity array of `len` slots.
    ///
    /// Writes the identity into the payloads, then Fisher-Yates shuffles the
    /// slots in place with the run's RNG.
    ///
    /// # Errors
    /// Propagates region allocation errors; `len == 0` is rejected as a
    /// zero-size region.
    pub fn build(len: usize, huge_pages: bool, rng: &mut XorShift64) -> Result<Self, RegionError> {
        let bytes = len
            .checked_mul(CACHE_LINE_SIZE)
            .ok_or(RegionError::InvalidLayout)?;
        let mut region = MemoryRegion::new(bytes, huge_pages)?;

        let slots = &mut region.as_slots_mut()[..len];
        for (i, slot) in slots.iter_mut().enumerate() {
            slot.value = i as u64;
        }
        rng.shuffle(slots);

        Ok(Self { region, len })
    }

    /// Slots in the permutation (not the page-rounded capacity).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The permutation slots, exactly `len` of them.
    #[inline]
    pub fn slots(&self) -> &[CacheLine] {
        &self.region.as_slots()[..self.len]
    }
}

/// Build `count` independent shuffled-identity arrays of `len` slots each.
///
/// Each array owns its own region; no two share storage. The arrays draw
/// from the same RNG stream but each shuffle is its own sequence of draws,
/// so the permutations are statistically independent.
pub fn build_permutations(
    len: usize,
    count: usize,
    huge_pages: bool,
    rng: &mut XorShift64,
) -> Result<Vec<PermutationArray>, RegionError> {
    let mut arrays = Vec::with_capacity(count);
    for _ in 0..count {
        arrays.push(PermutationArray::build(len, huge_pages, rng)?);
    }
    Ok(arrays)
}

/// Walk every chain `steps` times, one dependent load per chain per step.
///
/// All chains start at slot 0 of their own array. Within a step the loads
/// are mutually independent, so N chains give the memory system N misses to
/// overlap; along a chain each load still waits for the one before it.
///
/// With `prefetch`, each step first issues a hint for every chain's next
/// slot and only then performs the loads, the software analogue of the
/// overlap the extra chains buy.
///
/// Returns the sum of final cursors so the walk has an observable result.
pub fn chase_chains(arrays: &[PermutationArray], steps: usize, prefetch: bool) -> u64 {
    debug_assert!(arrays.iter().all(|array| !array.is_empty()));

    let views: Vec<&[CacheLine]> = arrays.iter().map(PermutationArray::slots).collect();
    let mut cursors = vec![0usize; views.len()];

    if prefetch {
        for _ in 0..steps {
            for (view, &cursor) in views.iter().zip(cursors.iter()) {
                prefetch_read(&view[cursor]);
            }
            for (view, cursor) in views.iter().zip(cursors.iter_mut()) {
                *cursor = view[*cursor].value as usize;
            }
        }
    } else {
        for _ in 0..steps {
            for (view, cursor) in views.iter().zip(cursors.iter_mut()) {
                *cursor = view[*cursor].value as usize;
            }
        }
    }

    cursors.iter().map(|&cursor| cursor as u64).sum()
}

/// Best-effort prefetch hint for the line holding `slot`.
///
/// A hint only. On targets without a stable prefetch intrinsic this is a
/// no-op, which keeps the prefetch and non-prefetch chase variants
/// comparable rather than unavailable.
#[inline(always)]
pub fn prefetch_read(slot: &CacheLine) {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: prefetch has no architectural side effects; any address is
    // acceptable.
    unsafe {
        std::arch::x86_64::_mm_prefetch(
            (slot as *const CacheLine).cast::<i8>(),
            std::arch::x86_64::_MM_HINT_T0,
        );
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = slot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutation_is_a_bijection() {
        let mut rng = XorShift64::new(11);
        let array = PermutationArray::build(1000, false, &mut rng).unwrap();

        let mut seen = vec![false; array.len()];
        for slot in array.slots() {
            let v = slot.value as usize;
            assert!(v < array.len());
            assert!(!seen[v], "payload {v} appears twice");
            seen[v] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn three_arrays_are_pairwise_distinct() {
        let mut rng = XorShift64::new(5);
        let arrays = build_permutations(100, 3, false, &mut rng).unwrap();
        assert_eq!(arrays.len(), 3);

        for i in 0..arrays.len() {
            for j in (i + 1)..arrays.len() {
                let identical = arrays[i]
                    .slots()
                    .iter()
                    .zip(arrays[j].slots())
                    .all(|(a, b)| a.value == b.value);
                assert!(!identical, "arrays {i} and {j} are identical");
            }
        }
    }

    #[test]
    fn length_is_independent_of_page_rounding() {
        let mut rng = XorShift64::new(9);
        // 100 slots = 6400 bytes; the region rounds up to 8192.
        let array = PermutationArray::build(100, false, &mut rng).unwrap();
        assert_eq!(array.len(), 100);
        assert_eq!(array.slots().len(), 100);
    }

    #[test]
    fn zero_length_is_rejected() {
        let mut rng = XorShift64::new(1);
        assert!(matches!(
            PermutationArray::build(0, false, &mut rng),
            Err(RegionError::SizeZero)
        ));
    }

    #[test]
    fn chase_matches_a_reference_walk() {
        let mut rng = XorShift64::new(77);
        let arrays = build_permutations(256, 2, false, &mut rng).unwrap();

        let expected: u64 = arrays
            .iter()
            .map(|array| {
                let mut cursor = 0usize;
                for _ in 0..1000 {
                    cursor = array.slots()[cursor].value as usize;
                }
                cursor as u64
            })
            .sum();

        assert_eq!(chase_chains(&arrays, 1000, false), expected);
    }

    #[test]
    fn prefetch_variant_visits_the_same_slots() {
        let mut rng = XorShift64::new(123);
        let arrays = build_permutations(512, 4, false, &mut rng).unwrap();
        assert_eq!(
            chase_chains(&arrays, 2048, false),
            chase_chains(&arrays, 2048, true)
        );
    }

    #[test]
    fn chase_over_no_chains_is_zero() {
        assert_eq!(chase_chains(&[], 100, false), 0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn built_arrays_are_bijections(len in 1usize..512, seed in any::<u64>()) {
            let mut rng = XorShift64::new(seed);
            let array = PermutationArray::build(len, false, &mut rng).unwrap();

            let mut seen = vec![false; len];
            for slot in array.slots() {
                let v = slot.value as usize;
                prop_assert!(v < len);
                prop_assert!(!seen[v]);
                seen[v] = true;
            }
        }

        #[test]
        fn walks_never_leave_the_array(
            len in 1usize..256,
            steps in 0usize..2048,
            seed in any::<u64>(),
        ) {
            let mut rng = XorShift64::new(seed);
            let arrays = build_permutations(len, 2, false, &mut rng).unwrap();
            // Indexing inside chase_chains would panic on any out-of-range
            // payload; reaching the sum means every hop stayed in bounds.
            let _ = chase_chains(&arrays, steps, false);
        }
    }
}
