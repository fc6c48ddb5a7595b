//! Benchmark sequencing: one engine, a catalog of tagged pattern variants.
//!
//! # Scope
//! `BenchmarkDriver` owns the benchmarked region, the offset randomizer,
//! and the run RNG, and executes the pattern catalog in a fixed order:
//! the five write patterns, a full shuffle of the region, the two array
//! reads, then the pointer-chase matrix. Each routine is timed exactly once
//! by `timing::time_once`; bandwidth figures divide the full region byte
//! volume, chases report effective per-access latency.
//!
//! # Invariants
//! - The shuffle always runs between the write phase and the read phase, so
//!   sequential reads never inherit the write phase's slot ordering.
//! - Every read result surfaces its checksum.
//! - The chase matrix keeps total volume constant: `chains` arrays of
//!   `slot_count / chains` slots each, so every row walks the same number
//!   of slots and the single-chain row is directly comparable to the rest.
//!
//! # Failure modes
//! Allocation failures and configuration violations abort the run via
//! `DriverError`; there are no partial results.

use std::fmt;
use std::hint::black_box;

use crate::chase::{build_permutations, chase_chains};
use crate::randomize::{OffsetRandomizer, RandomizeError};
use crate::region::{CacheLine, MemoryRegion, RegionError};
use crate::rng::XorShift64;
use crate::stream;
use crate::timing::{time_once, BenchmarkResult, Metric};

/// Slots staged locally per blocked write.
pub const WRITE_BLOCK_SLOTS: usize = 16;

/// Write-side access patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WritePattern {
    /// Store each slot's payload in index order: 8 explicit bytes per line,
    /// but the memory system still moves whole lines.
    SequentialPartial,
    /// Overwrite each whole slot in index order.
    SequentialFull,
    /// Stage a block of slots in a local buffer, then copy it out per block.
    Blocked,
    /// Non-temporal full-line stores where the hardware supports them.
    Streaming,
    /// Whole-slot writes scattered through the offset randomizer.
    Randomized,
}

/// Read-side access patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadPattern {
    /// Sum payloads in index order.
    Sequential,
    /// Sum payloads scattered through the offset randomizer.
    Randomized,
    /// Dependent pointer chases over freshly built permutation arrays.
    PointerChase { chains: usize, prefetch: bool },
}

/// Run parameters. Positivity and range are the CLI's responsibility; the
/// driver checks only what it cannot function without.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// log2 of the region size in bytes.
    pub log2_bytes: u32,
    /// Highest simultaneous chain count; the chase matrix doubles up to it.
    pub max_chains: usize,
    /// Advise huge-page backing for every allocation in the run.
    pub huge_pages: bool,
    /// Fixed seed for a replayable run; `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            log2_bytes: 31,
            max_chains: 32,
            huge_pages: false,
            seed: None,
        }
    }
}

/// Errors that abort a run.
#[derive(Debug)]
pub enum DriverError {
    /// Region or permutation-array allocation failed.
    Region(RegionError),
    /// The offset randomizer rejected the region geometry.
    Randomize(RandomizeError),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Region(err) => write!(f, "region allocation failed: {err}"),
            Self::Randomize(err) => write!(f, "offset randomizer rejected the region: {err}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Region(err) => Some(err),
            Self::Randomize(err) => Some(err),
        }
    }
}

impl From<RegionError> for DriverError {
    fn from(err: RegionError) -> Self {
        Self::Region(err)
    }
}

impl From<RandomizeError> for DriverError {
    fn from(err: RandomizeError) -> Self {
        Self::Randomize(err)
    }
}

/// Owns the benchmarked memory and sequences the pattern catalog.
pub struct BenchmarkDriver {
    region: MemoryRegion,
    randomizer: OffsetRandomizer,
    rng: XorShift64,
    huge_pages: bool,
    max_chains: usize,
}

impl BenchmarkDriver {
    /// Allocate the region and derive the scatter table.
    ///
    /// The randomizer requires the slot count to divide by its table size;
    /// the CLI guarantees that by bounding `log2_bytes` from below, and the
    /// requirement is re-checked here rather than assumed.
    pub fn new(config: &RunConfig) -> Result<Self, DriverError> {
        debug_assert!(config.log2_bytes < usize::BITS);

        let mut rng = match config.seed {
            Some(seed) => XorShift64::new(seed),
            None => XorShift64::from_clock(),
        };
        let region = MemoryRegion::new(1usize << config.log2_bytes, config.huge_pages)?;
        let randomizer = OffsetRandomizer::new(region.slot_count(), &mut rng)?;

        Ok(Self {
            region,
            randomizer,
            rng,
            huge_pages: config.huge_pages,
            max_chains: config.max_chains.max(1),
        })
    }

    /// Bytes moved by every region-wide pattern: the full region.
    #[inline]
    pub fn region_bytes(&self) -> usize {
        self.region.len()
    }

    /// Cache-line slots in the region.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.region.slot_count()
    }

    /// Page size backing the region.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.region.page_size()
    }

    /// Time one write pattern over the whole region.
    pub fn run_write(&mut self, pattern: WritePattern) -> BenchmarkResult {
        let bytes = self.region.len();
        let label = write_label(pattern);

        let Self {
            region, randomizer, ..
        } = self;
        let slots = region.as_slots_mut();

        let ((), seconds) = match pattern {
            WritePattern::SequentialPartial => time_once(|| write_sequential_partial(slots)),
            WritePattern::SequentialFull => time_once(|| write_sequential_full(slots)),
            WritePattern::Blocked => time_once(|| write_blocked(slots)),
            WritePattern::Streaming => time_once(|| stream::streaming_write(slots)),
            WritePattern::Randomized => time_once(|| write_randomized(slots, randomizer)),
        };

        BenchmarkResult {
            label,
            seconds,
            metric: Metric::bandwidth(bytes, seconds),
            checksum: None,
        }
    }

    /// Time one read pattern. Array reads surface their payload sum; chases
    /// surface their cursor sum.
    pub fn run_read(&mut self, pattern: ReadPattern) -> Result<BenchmarkResult, DriverError> {
        match pattern {
            ReadPattern::Sequential => {
                let bytes = self.region.len();
                let slots = self.region.as_slots();
                let (sum, seconds) = time_once(|| black_box(read_sequential(slots)));
                Ok(BenchmarkResult {
                    label: "read/sequential".to_string(),
                    seconds,
                    metric: Metric::bandwidth(bytes, seconds),
                    checksum: Some(sum),
                })
            }
            ReadPattern::Randomized => {
                let bytes = self.region.len();
                let slots = self.region.as_slots();
                let randomizer = &self.randomizer;
                let (sum, seconds) = time_once(|| black_box(read_randomized(slots, randomizer)));
                Ok(BenchmarkResult {
                    label: "read/randomized".to_string(),
                    seconds,
                    metric: Metric::bandwidth(bytes, seconds),
                    checksum: Some(sum),
                })
            }
            ReadPattern::PointerChase { chains, prefetch } => self.run_chase(chains, prefetch),
        }
    }

    /// One row of the chase matrix: `chains` arrays sharing the region's
    /// slot count, each chain swept over its full array length.
    ///
    /// The arrays are built outside the timed section and dropped before
    /// returning, so a row's allocations never linger into the next.
    fn run_chase(&mut self, chains: usize, prefetch: bool) -> Result<BenchmarkResult, DriverError> {
        let chains = chains.max(1);
        let chain_len = self.slot_count() / chains;
        let arrays = build_permutations(chain_len, chains, self.huge_pages, &mut self.rng)?;

        let (sum, seconds) = time_once(|| black_box(chase_chains(&arrays, chain_len, prefetch)));

        let accesses = chain_len * chains;
        Ok(BenchmarkResult {
            label: chase_label(chains, prefetch),
            seconds,
            metric: Metric::latency(accesses, seconds),
            checksum: Some(sum),
        })
    }

    /// Shuffle the region's slots so reads that follow do not inherit the
    /// write phase's ordering.
    pub fn shuffle_slots(&mut self) {
        let Self { region, rng, .. } = self;
        rng.shuffle(region.as_slots_mut());
    }

    /// Execute the full catalog in its fixed order and collect the results.
    pub fn run_all(&mut self) -> Result<Vec<BenchmarkResult>, DriverError> {
        let mut results = Vec::new();

        for pattern in [
            WritePattern::SequentialPartial,
            WritePattern::SequentialFull,
            WritePattern::Blocked,
            WritePattern::Streaming,
            WritePattern::Randomized,
        ] {
            results.push(self.run_write(pattern));
        }

        self.shuffle_slots();

        results.push(self.run_read(ReadPattern::Sequential)?);
        results.push(self.run_read(ReadPattern::Randomized)?);

        let mut chains = 1;
        while chains <= self.max_chains {
            for prefetch in [false, true] {
                results.push(self.run_read(ReadPattern::PointerChase { chains, prefetch })?);
            }
            chains *= 2;
        }

        Ok(results)
    }
}

fn write_label(pattern: WritePattern) -> String {
    match pattern {
        WritePattern::SequentialPartial => "write/sequential partial".to_string(),
        WritePattern::SequentialFull => "write/sequential full".to_string(),
        WritePattern::Blocked => format!("write/blocked x{WRITE_BLOCK_SLOTS}"),
        WritePattern::Streaming if stream::nontemporal_supported() => {
            "write/streaming non-temporal".to_string()
        }
        WritePattern::Streaming => "write/streaming (cached fallback)".to_string(),
        WritePattern::Randomized => "write/randomized".to_string(),
    }
}

fn chase_label(chains: usize, prefetch: bool) -> String {
    let hint = if prefetch { "prefetch" } else { "no prefetch" };
    format!("read/chase x{chains} ({hint})")
}

fn write_sequential_partial(slots: &mut [CacheLine]) {
    for (i, slot) in slots.iter_mut().enumerate() {
        slot.value = i as u64;
    }
}

fn write_sequential_full(slots: &mut [CacheLine]) {
    for (i, slot) in slots.iter_mut().enumerate() {
        *slot = CacheLine::new(i as u64);
    }
}

fn write_blocked(slots: &mut [CacheLine]) {
    let mut staged = [CacheLine::new(0); WRITE_BLOCK_SLOTS];
    let mut base = 0usize;

    let mut blocks = slots.chunks_exact_mut(WRITE_BLOCK_SLOTS);
    for block in blocks.by_ref() {
        for (offset, line) in staged.iter_mut().enumerate() {
            *line = CacheLine::new((base + offset) as u64);
        }
        block.copy_from_slice(&staged);
        base += WRITE_BLOCK_SLOTS;
    }
    // Page-multiple regions divide evenly; keep partial tails correct anyway.
    for (offset, slot) in blocks.into_remainder().iter_mut().enumerate() {
        *slot = CacheLine::new((base + offset) as u64);
    }
}

fn write_randomized(slots: &mut [CacheLine], randomizer: &OffsetRandomizer) {
    debug_assert_eq!(slots.len(), randomizer.slot_count());
    for i in 0..slots.len() {
        slots[randomizer.randomize(i)] = CacheLine::new(i as u64);
    }
}

fn read_sequential(slots: &[CacheLine]) -> u64 {
    let mut sum = 0u64;
    for slot in slots {
        sum = sum.wrapping_add(slot.value);
    }
    sum
}

fn read_randomized(slots: &[CacheLine], randomizer: &OffsetRandomizer) -> u64 {
    debug_assert_eq!(slots.len(), randomizer.slot_count());
    let mut sum = 0u64;
    for i in 0..slots.len() {
        sum = sum.wrapping_add(slots[randomizer.randomize(i)].value);
    }
    sum
}
