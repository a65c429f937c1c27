// SPDX-License-Identifier: AGPL-3.0-only

//! Size-sweep timing harness
//!
//! Every phase of every program is the same loop:
//!
//! ```text
//! for each size S in the sweep:
//!     endpoint.open(S)
//!     start timer
//!     repeat passes:
//!         for j in 0..floor(V / S):  endpoint.transfer(j * S, S)
//!         endpoint.finish_pass()
//!     stop timer → Measurement
//!     optional corruption check
//!     endpoint.close()
//!     corruption lines, result line
//! ```
//!
//! Only the endpoint differs between phases, so it is the one parameter.
//! Programs that time something other than a plain transfer (the
//! filesystem pipeline) plug a per-size step into [`run_sweep`] directly
//! and get the same printing and failure handling.
//!
//! ## Failure policy
//!
//! - `open` failing aborts the phase with the error (setup is not retried).
//! - `transfer` or `finish_pass` failing skips the rest of that size, prints
//!   a `[Fail]` line, and the sweep continues with the next size.
//!
//! The same rule applies to sequential and parallel phases.

use crate::config::BenchConfig;
use crate::report::Measurement;
use crate::verify;
use rayon::prelude::*;
use rayon::ThreadPool;
use smartssd_driver::{Result, SsdError};
use std::fmt;
use std::io::{self, Write};
use std::time::Instant;
use tracing::{debug, error, warn};

/// A transfer path exercised by a phase
///
/// Implementations borrow both sides of the transfer for the whole phase;
/// the harness only says when a size starts and ends, where to transfer,
/// and how much.
pub trait Transfer {
    /// Prepare for a new sweep size, e.g. (re)open the target
    ///
    /// # Errors
    ///
    /// Any error aborts the phase.
    fn open(&mut self, _size: usize) -> Result<()> {
        Ok(())
    }

    /// Move `len` bytes at byte `offset`, returning the bytes moved
    ///
    /// # Errors
    ///
    /// Any error aborts the current size.
    fn transfer(&mut self, offset: u64, len: usize) -> Result<usize>;

    /// Called after each complete pass over the volume
    ///
    /// # Errors
    ///
    /// Any error aborts the current size.
    fn finish_pass(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release whatever `open` acquired
    fn close(&mut self) {}

    /// Indices where the destination differs from the source
    ///
    /// Empty when intact or when the endpoint has nothing to compare.
    fn mismatches(&self) -> Vec<usize> {
        Vec::new()
    }
}

/// Transfers per pass at `size`: `floor(volume / size)`
pub const fn iterations(volume: usize, size: usize) -> usize {
    if size == 0 {
        0
    } else {
        volume / size
    }
}

/// Where a size stopped
#[derive(Debug)]
pub struct TransferFailure {
    /// Transfer size in bytes
    pub size: usize,
    /// Pass the failure happened in
    pub pass: usize,
    /// Iteration within the pass (`iterations` when `finish_pass` failed)
    pub iteration: usize,
    /// Underlying error
    pub error: SsdError,
}

/// Timing of one completed sweep size, printed as its result line
pub trait SizeTiming: fmt::Display {
    /// Transfer size in bytes
    fn size(&self) -> usize;

    /// Print the corrupted indices found at this size
    ///
    /// Only called when `corrupted` is non-empty.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying writer.
    fn report_corruption(&self, corrupted: &[usize], out: &mut impl Write) -> io::Result<()> {
        verify::report(out, corrupted)
    }
}

impl SizeTiming for Measurement {
    fn size(&self) -> usize {
        self.size
    }
}

/// Result of one sweep entry
#[derive(Debug)]
pub enum SizeOutcome<T = Measurement> {
    /// All passes ran
    Completed {
        /// Timing
        measurement: T,
        /// Corrupted indices, empty unless a comparison found some
        corrupted: Vec<usize>,
    },
    /// A transfer failed and the size was skipped
    Failed(TransferFailure),
}

impl<T: SizeTiming> SizeOutcome<T> {
    /// Transfer size in bytes
    pub fn size(&self) -> usize {
        match self {
            Self::Completed { measurement, .. } => measurement.size(),
            Self::Failed(failure) => failure.size,
        }
    }
}

/// Results of a phase, one per sweep entry in sweep order
#[derive(Debug)]
pub struct PhaseReport<T = Measurement> {
    /// Phase heading
    pub title: String,
    /// Per-size outcomes
    pub outcomes: Vec<SizeOutcome<T>>,
}

impl<T> PhaseReport<T> {
    /// Timings of the sizes that completed
    pub fn measurements(&self) -> impl Iterator<Item = &T> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            SizeOutcome::Completed { measurement, .. } => Some(measurement),
            SizeOutcome::Failed(_) => None,
        })
    }

    /// Sizes that were skipped
    pub fn failures(&self) -> impl Iterator<Item = &TransferFailure> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            SizeOutcome::Failed(failure) => Some(failure),
            SizeOutcome::Completed { .. } => None,
        })
    }

    /// Whether every size completed
    pub fn all_completed(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// What one sweep size produced: its timing and corrupted indices, or
/// where it stopped
pub type SizeStep<T> = std::result::Result<(T, Vec<usize>), TransferFailure>;

/// Run a phase with passes executed one after another
///
/// # Errors
///
/// Returns the error of a failed `open`, or of writing to `out`.
pub fn run_phase<E, W>(
    title: &str,
    config: &BenchConfig,
    endpoint: &mut E,
    out: &mut W,
) -> Result<PhaseReport>
where
    E: Transfer,
    W: Write,
{
    run_sweep(title, config, out, |size, iterations| {
        measure_transfers(endpoint, config, size, iterations, |endpoint| {
            let mut bytes = 0;
            for pass in 0..config.repeat {
                bytes += run_pass(endpoint, size, iterations, pass)?;
            }
            Ok(bytes)
        })
    })
}

/// Run a phase with passes spread over `pool`
///
/// Each worker drives its own clone of the opened endpoint, so the endpoint
/// must only share immutable state (e.g. a source buffer and a
/// positioned-I/O file descriptor).
///
/// # Errors
///
/// Returns the error of a failed `open`, or of writing to `out`.
pub fn run_phase_parallel<E, W>(
    title: &str,
    config: &BenchConfig,
    pool: &ThreadPool,
    endpoint: &mut E,
    out: &mut W,
) -> Result<PhaseReport>
where
    E: Transfer + Clone + Send + Sync,
    W: Write,
{
    run_sweep(title, config, out, |size, iterations| {
        measure_transfers(endpoint, config, size, iterations, |endpoint| {
            let template = &*endpoint;
            pool.install(|| {
                (0..config.repeat)
                    .into_par_iter()
                    .map_init(
                        || template.clone(),
                        |worker, pass| run_pass(worker, size, iterations, pass),
                    )
                    .try_reduce(|| 0, |a, b| Ok(a + b))
            })
        })
    })
}

/// Drive `step` over every size of the sweep and print its results
///
/// `step` gets the size and `floor(volume / size)`. An `Err` from it aborts
/// the sweep; an inner `Err(TransferFailure)` prints a `[Fail]` line and
/// the sweep moves on. Completed sizes print their corruption report (if
/// any) followed by the timing's result line. `step` must release whatever
/// it acquired before returning.
///
/// # Errors
///
/// Returns the error of `step`, or of writing to `out`.
pub fn run_sweep<T, W, S>(
    title: &str,
    config: &BenchConfig,
    out: &mut W,
    mut step: S,
) -> Result<PhaseReport<T>>
where
    T: SizeTiming,
    W: Write,
    S: FnMut(usize, usize) -> Result<SizeStep<T>>,
{
    writeln!(out, "{title}")?;
    let mut outcomes = Vec::with_capacity(config.sweep.len());

    for &size in config.sweep.sizes() {
        let iterations = iterations(config.volume, size);
        debug!("{title}: size {size} B, {iterations} iterations × {} passes", config.repeat);

        let outcome = match step(size, iterations)? {
            Ok((measurement, corrupted)) => {
                if !corrupted.is_empty() {
                    warn!("{title}: {} corrupted at size {size} B", corrupted.len());
                    measurement.report_corruption(&corrupted, out)?;
                }
                writeln!(out, "{measurement}")?;
                SizeOutcome::Completed {
                    measurement,
                    corrupted,
                }
            }
            Err(failure) => {
                error!(
                    "{title}: size {size} B failed at pass {} iteration {}: {}",
                    failure.pass, failure.iteration, failure.error
                );
                writeln!(
                    out,
                    "[Fail] {title} IO_Size : {size} B pass {} iteration {}: {}",
                    failure.pass, failure.iteration, failure.error
                )?;
                SizeOutcome::Failed(failure)
            }
        };
        outcomes.push(outcome);
    }

    Ok(PhaseReport {
        title: title.to_string(),
        outcomes,
    })
}

/// Open, time `passes`, collect mismatches, close
fn measure_transfers<E, P>(
    endpoint: &mut E,
    config: &BenchConfig,
    size: usize,
    iterations: usize,
    passes: P,
) -> Result<SizeStep<Measurement>>
where
    E: Transfer,
    P: FnOnce(&mut E) -> std::result::Result<u64, TransferFailure>,
{
    endpoint.open(size)?;
    let start = Instant::now();
    let moved = passes(endpoint);
    let elapsed = start.elapsed();

    let step = moved.map(|bytes| {
        let corrupted = if config.verify {
            endpoint.mismatches()
        } else {
            Vec::new()
        };
        let measurement = Measurement {
            size,
            iterations,
            passes: config.repeat,
            bytes,
            elapsed,
        };
        (measurement, corrupted)
    });
    endpoint.close();
    Ok(step)
}

fn run_pass<E: Transfer>(
    endpoint: &mut E,
    size: usize,
    iterations: usize,
    pass: usize,
) -> std::result::Result<u64, TransferFailure> {
    let mut moved = 0u64;
    for iteration in 0..iterations {
        let offset = (iteration * size) as u64;
        match endpoint.transfer(offset, size) {
            Ok(n) => moved += n as u64,
            Err(error) => {
                return Err(TransferFailure {
                    size,
                    pass,
                    iteration,
                    error,
                })
            }
        }
    }
    endpoint.finish_pass().map_err(|error| TransferFailure {
        size,
        pass,
        iteration: iterations,
        error,
    })?;
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Sweep, KIB};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory disk; `fail_at` injects an error at that transfer count
    #[derive(Debug, Default)]
    struct MemoryDisk {
        src: Vec<u8>,
        dst: Vec<u8>,
        opened: Vec<usize>,
        closed: usize,
        calls: usize,
        passes: usize,
        fail_open: bool,
        fail_at: Option<(usize, usize)>,
        corrupt: Vec<usize>,
    }

    impl MemoryDisk {
        fn new(volume: usize) -> Self {
            Self {
                src: (0..volume).map(|i| (i % 253) as u8).collect(),
                dst: vec![0; volume],
                ..Self::default()
            }
        }
    }

    impl Transfer for MemoryDisk {
        fn open(&mut self, size: usize) -> Result<()> {
            if self.fail_open {
                return Err(SsdError::transfer_failed("no such device"));
            }
            self.opened.push(size);
            self.calls = 0;
            self.dst.fill(0);
            Ok(())
        }

        fn transfer(&mut self, offset: u64, len: usize) -> Result<usize> {
            if self.fail_at == Some((len, self.calls)) {
                return Err(SsdError::transfer_failed("injected"));
            }
            self.calls += 1;
            let off = usize::try_from(offset).unwrap();
            SsdError::check_range(off, len, self.src.len())?;
            self.dst[off..off + len].copy_from_slice(&self.src[off..off + len]);
            for &i in &self.corrupt {
                if (off..off + len).contains(&i) {
                    self.dst[i] ^= 0x5A;
                }
            }
            Ok(len)
        }

        fn finish_pass(&mut self) -> Result<()> {
            self.passes += 1;
            Ok(())
        }

        fn close(&mut self) {
            self.closed += 1;
        }

        fn mismatches(&self) -> Vec<usize> {
            verify::mismatches(&self.src, &self.dst)
        }
    }

    /// Stateless endpoint for the parallel path
    #[derive(Debug, Clone)]
    struct CountingSink {
        calls: Arc<AtomicUsize>,
        fail: Option<(usize, u64)>,
    }

    impl Transfer for CountingSink {
        fn transfer(&mut self, offset: u64, len: usize) -> Result<usize> {
            if self.fail == Some((len, offset)) {
                return Err(SsdError::transfer_failed("injected"));
            }
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(len)
        }
    }

    fn config(volume: usize, repeat: usize, sizes: &[usize]) -> BenchConfig {
        BenchConfig::performance()
            .with_volume(volume)
            .with_repeat(repeat)
            .with_sweep(Sweep::custom(sizes))
    }

    fn result_lines(out: &[u8]) -> Vec<String> {
        String::from_utf8(out.to_vec())
            .unwrap()
            .lines()
            .filter(|l| l.starts_with("IO_Size"))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn iteration_count_is_floor() {
        assert_eq!(iterations(64 * KIB, 4 * KIB), 16);
        assert_eq!(iterations(64 * KIB, 48 * KIB), 1);
        assert_eq!(iterations(10_000, 4096), 2);
        assert_eq!(iterations(4096, 8192), 0);
        assert_eq!(iterations(4096, 0), 0);
    }

    #[test]
    fn round_trip_is_intact() {
        let cfg = config(64 * KIB, 2, &[4 * KIB, 16 * KIB]).with_verify(true);
        let mut disk = MemoryDisk::new(64 * KIB);
        let mut out = Vec::new();
        let report = run_phase("round trip", &cfg, &mut disk, &mut out).unwrap();

        assert_eq!(report.title, "round trip");
        for outcome in &report.outcomes {
            match outcome {
                SizeOutcome::Completed {
                    measurement,
                    corrupted,
                } => {
                    assert!(corrupted.is_empty());
                    assert_eq!(measurement.bytes, 2 * 64 * KIB as u64);
                    assert_eq!(measurement.passes, 2);
                }
                SizeOutcome::Failed(f) => panic!("unexpected failure: {f:?}"),
            }
        }
        assert_eq!(disk.dst, disk.src);
        assert_eq!(disk.opened, vec![4 * KIB, 16 * KIB]);
        assert_eq!(disk.closed, 2);
        assert_eq!(disk.passes, 4);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().next(), Some("round trip"));
        assert_eq!(result_lines(text.as_bytes()).len(), 2);
        assert!(!text.contains("Data corruption"));
    }

    #[test]
    fn corruption_reports_every_index() {
        let cfg = config(16 * KIB, 1, &[4 * KIB]).with_verify(true);
        let injected = vec![5, 4096, 9999, 16 * KIB - 1];
        let mut disk = MemoryDisk::new(16 * KIB);
        disk.corrupt = injected.clone();
        let mut out = Vec::new();
        let report = run_phase("corrupt", &cfg, &mut disk, &mut out).unwrap();

        let SizeOutcome::Completed { corrupted, .. } = &report.outcomes[0] else {
            panic!("size should complete");
        };
        assert_eq!(corrupted, &injected);
        let text = String::from_utf8(out).unwrap();
        for i in injected {
            assert!(text.contains(&format!("Data corruption : {i}\n")));
        }
        // corruption never changes control flow
        assert_eq!(result_lines(text.as_bytes()).len(), 1);
    }

    #[test]
    fn corruption_unchecked_without_verify() {
        let cfg = config(16 * KIB, 1, &[4 * KIB]);
        let mut disk = MemoryDisk::new(16 * KIB);
        disk.corrupt = vec![1];
        let mut out = Vec::new();
        let report = run_phase("unchecked", &cfg, &mut disk, &mut out).unwrap();
        assert!(matches!(
            &report.outcomes[0],
            SizeOutcome::Completed { corrupted, .. } if corrupted.is_empty()
        ));
    }

    #[test]
    fn failure_skips_size_and_continues() {
        let cfg = config(32 * KIB, 3, &[4 * KIB, 8 * KIB]);
        let mut disk = MemoryDisk::new(32 * KIB);
        // third transfer of the first pass at 4 KiB
        disk.fail_at = Some((4 * KIB, 2));
        let mut out = Vec::new();
        let report = run_phase("inject", &cfg, &mut disk, &mut out).unwrap();

        assert_eq!(disk.opened, vec![4 * KIB, 8 * KIB]);
        assert_eq!(disk.closed, 2);
        match &report.outcomes[0] {
            SizeOutcome::Failed(f) => {
                assert_eq!((f.size, f.pass, f.iteration), (4 * KIB, 0, 2));
                assert!(matches!(f.error, SsdError::TransferFailed { .. }));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(matches!(report.outcomes[1], SizeOutcome::Completed { .. }));
        assert_eq!(report.outcomes[1].size(), 8 * KIB);
        assert!(!report.all_completed());
        assert_eq!(report.measurements().count(), 1);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[Fail] inject IO_Size : 4096 B pass 0 iteration 2"));
        assert_eq!(result_lines(text.as_bytes()).len(), 1);
    }

    #[test]
    fn failed_pass_stops_remaining_passes() {
        let cfg = config(16 * KIB, 4, &[4 * KIB]);
        let mut disk = MemoryDisk::new(16 * KIB);
        // first transfer of the second pass
        disk.fail_at = Some((4 * KIB, 4));
        let mut out = Vec::new();
        let report = run_phase("stop", &cfg, &mut disk, &mut out).unwrap();

        let failure = report.failures().next().unwrap();
        assert_eq!((failure.pass, failure.iteration), (1, 0));
        assert_eq!(disk.passes, 1);
        assert_eq!(disk.calls, 4);
    }

    #[test]
    fn open_failure_aborts_phase() {
        let cfg = config(16 * KIB, 1, &[4 * KIB, 8 * KIB]);
        let mut disk = MemoryDisk::new(16 * KIB);
        disk.fail_open = true;
        let mut out = Vec::new();
        let err = run_phase("abort", &cfg, &mut disk, &mut out).unwrap_err();
        assert!(matches!(err, SsdError::TransferFailed { .. }));
        assert_eq!(disk.calls, 0);
        assert!(result_lines(&out).is_empty());
    }

    /// Accepts the title, refuses every result line
    struct RefusesResults(Vec<u8>);

    impl Write for RefusesResults {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.windows(7).any(|w| w == b"IO_Size") {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
            }
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_error_still_closes_endpoint() {
        let cfg = config(16 * KIB, 1, &[4 * KIB, 8 * KIB]).with_verify(true);
        let mut disk = MemoryDisk::new(16 * KIB);
        disk.corrupt = vec![3];
        let mut out = RefusesResults(Vec::new());

        let err = run_phase("broken pipe", &cfg, &mut disk, &mut out).unwrap_err();

        assert!(matches!(err, SsdError::Io { .. }));
        assert_eq!(disk.opened, vec![4 * KIB]);
        assert_eq!(disk.closed, 1);
        // the corruption line went out before the refused result line
        assert!(String::from_utf8(out.0).unwrap().contains("Data corruption : 3"));
    }

    #[test]
    fn custom_step_shares_printing_and_failure_policy() {
        #[derive(Debug)]
        struct Ticks(usize);

        impl fmt::Display for Ticks {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "IO_Size : {} B\tticks", self.0)
            }
        }

        impl SizeTiming for Ticks {
            fn size(&self) -> usize {
                self.0
            }

            fn report_corruption(&self, corrupted: &[usize], out: &mut impl Write) -> io::Result<()> {
                writeln!(out, "{} bad", corrupted.len())
            }
        }

        let cfg = config(16 * KIB, 1, &[4 * KIB, 8 * KIB, 16 * KIB]);
        let mut seen = Vec::new();
        let mut out = Vec::new();
        let report = run_sweep("custom", &cfg, &mut out, |size, iterations| {
            seen.push((size, iterations));
            Ok(match size {
                s if s == 8 * KIB => Err(TransferFailure {
                    size,
                    pass: 0,
                    iteration: 1,
                    error: SsdError::transfer_failed("injected"),
                }),
                s if s == 16 * KIB => Ok((Ticks(size), vec![0, 1])),
                _ => Ok((Ticks(size), Vec::new())),
            })
        })
        .unwrap();

        assert_eq!(seen, vec![(4 * KIB, 4), (8 * KIB, 2), (16 * KIB, 1)]);
        assert_eq!(report.measurements().count(), 2);
        assert_eq!(report.outcomes[1].size(), 8 * KIB);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[Fail] custom IO_Size : 8192 B pass 0 iteration 1"));
        assert!(text.contains("2 bad\nIO_Size : 16384 B\tticks"));
    }

    #[test]
    fn empty_sweep_does_nothing() {
        let cfg = config(16 * KIB, 5, &[]);
        let mut disk = MemoryDisk::new(16 * KIB);
        let mut out = Vec::new();
        let report = run_phase("empty", &cfg, &mut disk, &mut out).unwrap();
        assert!(disk.opened.is_empty());
        assert_eq!(disk.calls, 0);
        assert!(report.outcomes.is_empty());
        assert!(result_lines(&out).is_empty());
    }

    #[test]
    fn smallest_dividing_size_moves_exact_volume() {
        let volume = 96 * KIB;
        let cfg = config(volume, 1, &[4 * KIB]);
        let mut disk = MemoryDisk::new(volume);
        let mut out = Vec::new();
        let report = run_phase("exact", &cfg, &mut disk, &mut out).unwrap();
        let m = report.measurements().next().unwrap();
        assert_eq!(m.iterations, 24);
        assert_eq!(m.bytes, volume as u64);
    }

    #[test]
    fn parallel_byte_count_matches_sequential() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let volume = 64 * KIB;
        let cfg = config(volume, 8, &[4 * KIB, 32 * KIB]);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut sink = CountingSink {
            calls: Arc::clone(&calls),
            fail: None,
        };
        let mut out = Vec::new();

        let report = run_phase_parallel("parallel", &cfg, &pool, &mut sink, &mut out).unwrap();

        let bytes: Vec<u64> = report.measurements().map(|m| m.bytes).collect();
        assert_eq!(bytes, vec![8 * volume as u64, 8 * volume as u64]);
        assert_eq!(calls.load(Ordering::Relaxed), 8 * 16 + 8 * 2);
        assert_eq!(result_lines(&out).len(), 2);
    }

    #[test]
    fn parallel_failure_skips_size() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let cfg = config(16 * KIB, 4, &[4 * KIB, 8 * KIB]);
        let mut sink = CountingSink {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: Some((4 * KIB, 8 * KIB as u64)),
        };
        let mut out = Vec::new();

        let report = run_phase_parallel("parallel fail", &cfg, &pool, &mut sink, &mut out).unwrap();

        let failure = report.failures().next().unwrap();
        assert_eq!((failure.size, failure.iteration), (4 * KIB, 2));
        assert!(matches!(report.outcomes[1], SizeOutcome::Completed { .. }));
        assert_eq!(result_lines(&out).len(), 1);
    }
}
