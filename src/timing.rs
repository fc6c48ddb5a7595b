//! Single-shot wall timing and derived benchmark figures.
//!
//! The harness runs a routine exactly once: no warmup, no retries, no
//! repetition. Repeat trials, if wanted, belong to whoever invokes the run.
//! Elapsed time is truncated to whole microseconds before conversion, which
//! bounds how fine a figure any derivation can honestly report.

use std::fmt;
use std::time::Instant;

/// Smallest duration the harness resolves, in seconds.
///
/// Derivations clamp their divisor here so a sub-resolution routine reports
/// a floor instead of dividing by zero.
pub const TIMER_RESOLUTION_SECS: f64 = 1e-6;

/// Run `op` exactly once; return its output and the elapsed wall time in
/// seconds at microsecond resolution.
pub fn time_once<T>(op: impl FnOnce() -> T) -> (T, f64) {
    let start = Instant::now();
    let out = op();
    let micros = start.elapsed().as_micros();
    (out, micros as f64 / 1e6)
}

/// Figure of merit derived from one timed routine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Metric {
    /// Decimal gigabytes per second (bytes / 10^9 / seconds, never 2^30).
    BandwidthGbs(f64),
    /// Effective nanoseconds per dependent access.
    LatencyNs(f64),
}

impl Metric {
    /// Bandwidth for `bytes` moved in `seconds`.
    pub fn bandwidth(bytes: usize, seconds: f64) -> Self {
        Self::BandwidthGbs(bytes as f64 / (1e9 * seconds.max(TIMER_RESOLUTION_SECS)))
    }

    /// Per-access latency for `accesses` dependent loads in `seconds`.
    pub fn latency(accesses: usize, seconds: f64) -> Self {
        debug_assert!(accesses > 0, "latency needs at least one access");
        Self::LatencyNs(seconds.max(TIMER_RESOLUTION_SECS) * 1e9 / accesses as f64)
    }
}

/// Outcome of one benchmark routine.
///
/// `checksum` carries the accumulated payload sum for read routines. It is
/// part of the result on purpose: a sum that reaches the report cannot be
/// optimized away, and it doubles as a cheap cross-check between patterns
/// that claim to have moved the same payloads.
#[derive(Clone, Debug)]
pub struct BenchmarkResult {
    pub label: String,
    /// Elapsed wall time in seconds (microsecond resolution).
    pub seconds: f64,
    pub metric: Metric,
    pub checksum: Option<u64>,
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<36}", self.label)?;
        match self.metric {
            Metric::BandwidthGbs(gbs) => write!(f, "{gbs:>10.2} GB/s     ")?,
            Metric::LatencyNs(ns) => write!(f, "{ns:>10.1} ns/access")?,
        }
        write!(f, "  ({:.6} s)", self.seconds)?;
        if let Some(sum) = self.checksum {
            write!(f, "  checksum={sum:#018x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn time_once_measures_elapsed_wall_time() {
        let ((), seconds) = time_once(|| std::thread::sleep(Duration::from_millis(25)));
        assert!(seconds >= 0.025, "measured {seconds} s");
        assert!(seconds < 5.0, "measured {seconds} s");
    }

    #[test]
    fn time_once_passes_the_output_through() {
        let (out, _) = time_once(|| 40 + 2);
        assert_eq!(out, 42);
    }

    #[test]
    fn bandwidth_uses_decimal_gigabytes() {
        let Metric::BandwidthGbs(gbs) = Metric::bandwidth(2_000_000_000, 2.0) else {
            panic!("expected a bandwidth metric");
        };
        assert!((gbs - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sub_resolution_durations_clamp_instead_of_exploding() {
        let Metric::BandwidthGbs(gbs) = Metric::bandwidth(1_000_000, 0.0) else {
            panic!("expected a bandwidth metric");
        };
        assert!(gbs.is_finite());
        // 1 MB over the 1 us floor.
        assert!((gbs - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn latency_divides_across_accesses() {
        let Metric::LatencyNs(ns) = Metric::latency(1000, 0.001) else {
            panic!("expected a latency metric");
        };
        assert!((ns - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn display_includes_checksum_only_when_present() {
        let with = BenchmarkResult {
            label: "read/sequential".into(),
            seconds: 0.5,
            metric: Metric::bandwidth(1_000_000_000, 0.5),
            checksum: Some(0xABCD),
        };
        let without = BenchmarkResult {
            label: "write/sequential full".into(),
            seconds: 0.5,
            metric: Metric::bandwidth(1_000_000_000, 0.5),
            checksum: None,
        };
        assert!(with.to_string().contains("checksum=0x000000000000abcd"));
        assert!(!without.to_string().contains("checksum"));
        assert!(without.to_string().contains("GB/s"));
    }
}
