//! Page-aligned benchmark regions and the cache-line slot type.
//!
//! # Scope
//! Every benchmark routine runs over a `MemoryRegion`: one contiguous,
//! page-aligned allocation viewed as an array of 64-byte `CacheLine` slots.
//! Alignment and length are made explicit here so the access-pattern kernels
//! can assume whole pages and whole lines without checking.
//!
//! # Invariants
//! - The start address is aligned to the active page size (4 KiB, or 2 MiB
//!   when huge pages are requested).
//! - The length is the request rounded up to a page multiple, so it is also
//!   a multiple of the slot size.
//! - The region is zero-initialized, and the allocation is released exactly
//!   once, in `Drop`.
//!
//! # Failure modes
//! - Zero-size requests and unrepresentable layouts are configuration
//!   violations, reported via `RegionError` at construction.
//! - Allocation failure is fatal to the run: no retry, no degraded fallback.
//! - The huge-page advisory is best-effort; a refusal changes the numbers a
//!   run reports, not its correctness.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;

/// Bytes per cache-line slot, the atomic unit every pattern reads or writes.
pub const CACHE_LINE_SIZE: usize = 64;

/// Page size assumed for normal allocations (4 KiB).
pub const NORMAL_PAGE_SIZE: usize = 1 << 12;

/// Transparent huge page size on x86_64 Linux (2 MiB).
pub const HUGE_PAGE_SIZE: usize = 1 << 21;

const _: () = {
    assert!(size_of::<CacheLine>() == CACHE_LINE_SIZE);
    assert!(align_of::<CacheLine>() == CACHE_LINE_SIZE);
    assert!(NORMAL_PAGE_SIZE % CACHE_LINE_SIZE == 0);
    assert!(HUGE_PAGE_SIZE % NORMAL_PAGE_SIZE == 0);
};

/// One cache line: a u64 payload padded out to 64 bytes.
///
/// The padding gives every slot its own line, so touching slot `i` never
/// drags slot `i + 1` into the cache as a side effect. Patterns that claim
/// to write "full lines" write the whole struct; partial writes touch only
/// `value`.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug)]
pub struct CacheLine {
    pub value: u64,
    pad: [u64; 7],
}

impl CacheLine {
    /// A fully initialized line carrying `value`.
    #[inline]
    pub fn new(value: u64) -> Self {
        Self { value, pad: [0; 7] }
    }
}

/// Errors from region allocation.
#[derive(Debug)]
pub enum RegionError {
    /// A zero-byte region was requested.
    SizeZero,
    /// The rounded size does not form a valid allocation layout.
    InvalidLayout,
    /// The allocation request could not be satisfied.
    OutOfMemory,
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeZero => write!(f, "region size must be non-zero"),
            Self::InvalidLayout => write!(f, "region size does not form a valid layout"),
            Self::OutOfMemory => write!(f, "allocator returned null for the requested region"),
        }
    }
}

impl std::error::Error for RegionError {}

/// An owned, page-aligned span of cache-line slots.
pub struct MemoryRegion {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
    page_size: usize,
}

impl MemoryRegion {
    /// Allocate a zeroed region of at least `requested_len` bytes.
    ///
    /// The length rounds up to a whole number of pages. With `huge_pages`
    /// the page size is 2 MiB, the start address is aligned accordingly, and
    /// the kernel is advised to back the span with transparent huge pages.
    ///
    /// # Errors
    /// - `SizeZero` if `requested_len == 0`.
    /// - `InvalidLayout` if the rounded size is not representable.
    /// - `OutOfMemory` if the allocator returns null.
    pub fn new(requested_len: usize, huge_pages: bool) -> Result<Self, RegionError> {
        if requested_len == 0 {
            return Err(RegionError::SizeZero);
        }

        let page_size = if huge_pages {
            HUGE_PAGE_SIZE
        } else {
            NORMAL_PAGE_SIZE
        };

        // Round up so the region always covers whole pages (and whole slots).
        let len = requested_len
            .checked_add(page_size - 1)
            .map(|n| n & !(page_size - 1))
            .ok_or(RegionError::InvalidLayout)?;
        let layout =
            Layout::from_size_align(len, page_size).map_err(|_| RegionError::InvalidLayout)?;

        // SAFETY: layout is valid and has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(RegionError::OutOfMemory)?;

        if huge_pages {
            advise_huge_pages(ptr.as_ptr(), len);
        }

        Ok(Self {
            ptr,
            len,
            layout,
            page_size,
        })
    }

    /// Usable length in bytes. Always a page multiple.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Regions are never empty; construction rejects zero sizes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Page size backing this region (4 KiB or 2 MiB).
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of cache-line slots in the region.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.len / CACHE_LINE_SIZE
    }

    /// Start address, for alignment checks and reporting.
    #[inline]
    pub fn start_addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// View the region as cache-line slots.
    #[inline]
    pub fn as_slots(&self) -> &[CacheLine] {
        // SAFETY: the allocation is live and zero-initialized, the start is
        // page-aligned (stricter than the slot alignment), and len is a
        // multiple of the slot size.
        unsafe {
            std::slice::from_raw_parts(self.ptr.as_ptr().cast::<CacheLine>(), self.slot_count())
        }
    }

    /// View the region as mutable cache-line slots.
    #[inline]
    pub fn as_slots_mut(&mut self) -> &mut [CacheLine] {
        // SAFETY: as in `as_slots`, and `&mut self` guarantees exclusivity.
        unsafe {
            std::slice::from_raw_parts_mut(self.ptr.as_ptr().cast::<CacheLine>(), self.slot_count())
        }
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        // SAFETY: ptr came from alloc_zeroed with this exact layout.
        unsafe {
            dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

/// Ask the kernel to back `len` bytes at `ptr` with transparent huge pages.
///
/// Advisory only: a failure is reported on stderr and the run continues on
/// normal pages.
#[cfg(target_os = "linux")]
fn advise_huge_pages(ptr: *mut u8, len: usize) {
    // SAFETY: ptr/len describe a live allocation owned by the caller.
    let rc = unsafe { libc::madvise(ptr.cast::<libc::c_void>(), len, libc::MADV_HUGEPAGE) };
    if rc != 0 {
        eprintln!(
            "WARN: madvise(MADV_HUGEPAGE) failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn advise_huge_pages(_ptr: *mut u8, _len: usize) {
    // Don't silently pretend: the caller asked for huge pages and should
    // know the numbers were measured without them.
    eprintln!("WARN: huge-page advisory is not supported on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_size() {
        assert!(matches!(
            MemoryRegion::new(0, false),
            Err(RegionError::SizeZero)
        ));
        assert!(matches!(
            MemoryRegion::new(0, true),
            Err(RegionError::SizeZero)
        ));
    }

    #[test]
    fn rounds_length_up_to_page_multiple() {
        let tiny = MemoryRegion::new(1, false).unwrap();
        assert_eq!(tiny.len(), NORMAL_PAGE_SIZE);

        let spill = MemoryRegion::new(NORMAL_PAGE_SIZE + 1, false).unwrap();
        assert_eq!(spill.len(), 2 * NORMAL_PAGE_SIZE);

        let exact = MemoryRegion::new(3 * NORMAL_PAGE_SIZE, false).unwrap();
        assert_eq!(exact.len(), 3 * NORMAL_PAGE_SIZE);
    }

    #[test]
    fn start_is_page_aligned() {
        let region = MemoryRegion::new(8 * NORMAL_PAGE_SIZE, false).unwrap();
        assert_eq!(region.start_addr() % NORMAL_PAGE_SIZE, 0);
    }

    #[test]
    fn huge_region_uses_huge_page_geometry() {
        // The advisory itself may be refused; the geometry must hold anyway.
        let region = MemoryRegion::new(HUGE_PAGE_SIZE + 1, true).unwrap();
        assert_eq!(region.page_size(), HUGE_PAGE_SIZE);
        assert_eq!(region.len(), 2 * HUGE_PAGE_SIZE);
        assert_eq!(region.start_addr() % HUGE_PAGE_SIZE, 0);
    }

    #[test]
    fn slots_cover_the_whole_region_and_start_zeroed() {
        let mut region = MemoryRegion::new(NORMAL_PAGE_SIZE, false).unwrap();
        assert_eq!(region.slot_count(), NORMAL_PAGE_SIZE / CACHE_LINE_SIZE);
        assert!(region.as_slots().iter().all(|slot| slot.value == 0));

        for (i, slot) in region.as_slots_mut().iter_mut().enumerate() {
            slot.value = i as u64;
        }
        assert_eq!(region.as_slots()[63].value, 63);
    }

    #[test]
    fn repeated_construction_yields_independent_regions() {
        let a = MemoryRegion::new(NORMAL_PAGE_SIZE, false).unwrap();
        let b = MemoryRegion::new(NORMAL_PAGE_SIZE, false).unwrap();
        assert_ne!(a.start_addr(), b.start_addr());
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn cache_line_is_exactly_one_line() {
        assert_eq!(size_of::<CacheLine>(), CACHE_LINE_SIZE);
        assert_eq!(align_of::<CacheLine>(), CACHE_LINE_SIZE);
    }
}
