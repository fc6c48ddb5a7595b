//! Non-temporal full-line writes.
//!
//! Streaming stores bypass the cache hierarchy and combine into full-line
//! transactions, so writing a region does not evict whatever the caches
//! held, and the write path skips the read-for-ownership a cached store
//! pays. On x86_64 with AVX2 each 64-byte slot is filled by two 32-byte
//! `_mm256_stream_si256` stores from a vector counter, fenced once at the
//! end. Everywhere else the kernel degrades to ordinary full-line writes,
//! which measure cached write bandwidth instead; the driver labels the
//! result accordingly.

use crate::region::CacheLine;

/// True when the non-temporal store path can run on this machine.
pub fn nontemporal_supported() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::is_x86_feature_detected!("avx2")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

/// Fill every slot's full 64 bytes, payload = slot index.
///
/// Takes the non-temporal path when the hardware supports it, the cached
/// fallback otherwise. Both paths leave `slots[i].value == i`.
pub fn streaming_write(slots: &mut [CacheLine]) {
    #[cfg(target_arch = "x86_64")]
    if std::is_x86_feature_detected!("avx2") {
        // SAFETY: guarded by runtime feature detection.
        unsafe { streaming_write_avx2(slots) };
        return;
    }

    streaming_write_fallback(slots);
}

/// Two 32-byte non-temporal stores per slot, all four lanes of each store
/// holding the slot index, then one store fence so every write is globally
/// visible before the timer stops.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn streaming_write_avx2(slots: &mut [CacheLine]) {
    use core::arch::x86_64::*;

    let one = _mm256_set1_epi64x(1);
    let mut counter = _mm256_setzero_si256();
    // Slots are 64-byte aligned, so both 32-byte halves meet the alignment
    // requirement of the streaming store.
    let mut dst = slots.as_mut_ptr().cast::<__m256i>();
    for _ in 0..slots.len() {
        _mm256_stream_si256(dst, counter);
        _mm256_stream_si256(dst.add(1), counter);
        dst = dst.add(2);
        counter = _mm256_add_epi64(counter, one);
    }
    _mm_sfence();
}

/// Cached fallback: ordinary full-line stores through the hierarchy.
fn streaming_write_fallback(slots: &mut [CacheLine]) {
    for (i, slot) in slots.iter_mut().enumerate() {
        *slot = CacheLine::new(i as u64);
    }
}
