//! Memory-subsystem benchmarking: bandwidth and latency under controlled
//! access patterns.
//!
//! ## Scope
//! This crate measures what a machine's memory system actually delivers,
//! not what the datasheet promises: sequential against randomized
//! addressing, partial against full cache-line writes, cached against
//! non-temporal stores, and single against many simultaneous dependent
//! pointer chases, optionally on huge-page-backed memory.
//!
//! ## Key invariants
//! - Every buffer is page-aligned and a whole number of pages long, viewed
//!   as 64-byte [`region::CacheLine`] slots ([`region`]).
//! - Randomized patterns draw their order from a cache-resident offset
//!   table, never from a region-sized side table ([`randomize`]).
//! - Pointer chases follow permutations stored in the benchmarked memory
//!   itself ([`chase`]).
//! - Each routine is timed exactly once, at microsecond resolution
//!   ([`timing`]); [`driver`] sequences the catalog and derives GB/s or
//!   ns/access.
//! - All randomness flows through one explicit [`rng::XorShift64`] value
//!   seeded per run; nothing reaches for ambient state.
//!
//! ## Engine flow (one run)
//! 1) Allocate the region (huge pages advised if requested).
//! 2) Time the five write patterns.
//! 3) Shuffle the region, then time the sequential and randomized reads.
//! 4) Build permutation arrays and time the chase matrix, doubling chain
//!    counts, with and without prefetch hints.
//!
//! The engine is strictly single-threaded; concurrency would measure the
//! scheduler, not the memory system.

pub mod affinity;
pub mod chase;
pub mod driver;
pub mod randomize;
pub mod region;
pub mod rng;
pub mod stream;
pub mod timing;

pub use driver::{BenchmarkDriver, DriverError, ReadPattern, RunConfig, WritePattern};
pub use region::{CacheLine, MemoryRegion, RegionError, CACHE_LINE_SIZE};
pub use timing::{BenchmarkResult, Metric};
