//! Memory benchmark CLI.
//!
//! Allocates one page-aligned region and runs the full access-pattern
//! catalog over it: sequential, blocked, streaming, and randomized writes,
//! sequential and randomized reads, then pointer-chase rows with doubling
//! chain counts, each with and without prefetch hints.
//!
//! # Output Format
//!
//! One line per pattern on stdout: label, figure of merit (GB/s or
//! ns/access), elapsed seconds, and a checksum for read patterns.
//!
//! A summary is written to stderr upon completion:
//! `patterns=N mem_bytes=N slots=N max_chains=N huge_pages=BOOL seed=N elapsed_ms=N`
//!
//! # Exit Codes
//!
//! - `0`: the full catalog completed
//! - `1`: allocation failure or invalid region geometry
//! - `2`: invalid arguments

use std::env;
use std::process;
use std::time::Instant;

use membench_rs::affinity;
use membench_rs::driver::{BenchmarkDriver, RunConfig};
use membench_rs::region::CACHE_LINE_SIZE;
use membench_rs::rng::XorShift64;

/// Region sizes below 2^18 bytes leave fewer slots than the offset table
/// has buckets; sizes above 2^45 are beyond anything addressable in RAM.
const MEM_LOG2_MIN: u32 = 18;
const MEM_LOG2_MAX: u32 = 45;

const CHAINS_MAX: usize = 256;

fn print_usage(exe: &std::ffi::OsStr) {
    eprintln!(
        "usage: {} [OPTIONS]

Measure memory bandwidth and latency under a fixed catalog of access
patterns.

OPTIONS:
    --mem-log2=<N>      log2 of the region size in bytes
                        (default: 31 = 2 GiB, range {MEM_LOG2_MIN}-{MEM_LOG2_MAX})
    --chains=<N>        maximum simultaneous pointer-chase chains
                        (default: 32, range 1-{CHAINS_MAX})
    --huge-pages        advise 2 MiB transparent huge pages for all allocations
    --seed=<N>          fix the run RNG for a replayable scatter
                        (default: seeded from the clock)
    --pin-core=<N>      pin the process to a CPU core before measuring
                        (best effort)
    --help, -h          show this help message",
        exe.to_string_lossy()
    );
}

struct CliOptions {
    config: RunConfig,
    pin_core: Option<usize>,
}

fn parse_args() -> CliOptions {
    let mut args = env::args_os();
    let exe = args.next().unwrap_or_else(|| "membench-rs".into());

    let mut config = RunConfig::default();
    let mut pin_core: Option<usize> = None;

    for arg in args {
        let Some(flag) = arg.to_str() else {
            eprintln!("invalid argument: {}", arg.to_string_lossy());
            process::exit(2);
        };

        if let Some(value) = flag.strip_prefix("--mem-log2=") {
            let n: u32 = value.parse().unwrap_or_else(|_| {
                eprintln!("invalid --mem-log2 value: {value}");
                process::exit(2);
            });
            if !(MEM_LOG2_MIN..=MEM_LOG2_MAX).contains(&n) {
                eprintln!("--mem-log2 must be in {MEM_LOG2_MIN}..={MEM_LOG2_MAX}, got {n}");
                process::exit(2);
            }
            config.log2_bytes = n;
            continue;
        }
        if let Some(value) = flag.strip_prefix("--chains=") {
            let n: usize = value.parse().unwrap_or_else(|_| {
                eprintln!("invalid --chains value: {value}");
                process::exit(2);
            });
            if n == 0 || n > CHAINS_MAX {
                eprintln!("--chains must be in 1..={CHAINS_MAX}, got {n}");
                process::exit(2);
            }
            config.max_chains = n;
            continue;
        }
        if let Some(value) = flag.strip_prefix("--seed=") {
            let n: u64 = value.parse().unwrap_or_else(|_| {
                eprintln!("invalid --seed value: {value}");
                process::exit(2);
            });
            config.seed = Some(n);
            continue;
        }
        if let Some(value) = flag.strip_prefix("--pin-core=") {
            let n: usize = value.parse().unwrap_or_else(|_| {
                eprintln!("invalid --pin-core value: {value}");
                process::exit(2);
            });
            pin_core = Some(n);
            continue;
        }
        match flag {
            "--huge-pages" => {
                config.huge_pages = true;
            }
            "--help" | "-h" => {
                print_usage(&exe);
                process::exit(0);
            }
            _ => {
                eprintln!("unknown flag: {flag}");
                print_usage(&exe);
                process::exit(2);
            }
        }
    }

    CliOptions { config, pin_core }
}

fn main() {
    let opts = parse_args();

    if let Some(core) = opts.pin_core {
        // Best effort, like the huge-page advisory: warn and measure unpinned.
        if let Err(e) = affinity::pin_current_thread_to_core(core) {
            eprintln!("WARN: failed to pin to core {core}: {e}");
        }
    }

    // Resolve the seed here so the summary can report what the run used.
    let seed = opts.config.seed.unwrap_or_else(|| {
        let mut clock_rng = XorShift64::from_clock();
        clock_rng.next_u64()
    });
    let config = RunConfig {
        seed: Some(seed),
        ..opts.config
    };

    let start = Instant::now();

    let mut driver = match BenchmarkDriver::new(&config) {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("fatal: {e}");
            process::exit(1);
        }
    };

    println!(
        "region: {} bytes = {} slots of {} B (page size {} B)",
        driver.region_bytes(),
        driver.slot_count(),
        CACHE_LINE_SIZE,
        driver.page_size()
    );

    let results = match driver.run_all() {
        Ok(results) => results,
        Err(e) => {
            eprintln!("fatal: {e}");
            process::exit(1);
        }
    };

    for result in &results {
        println!("{result}");
    }

    eprintln!(
        "patterns={} mem_bytes={} slots={} max_chains={} huge_pages={} seed={} elapsed_ms={}",
        results.len(),
        driver.region_bytes(),
        driver.slot_count(),
        config.max_chains,
        config.huge_pages,
        seed,
        start.elapsed().as_millis()
    );
}
