//! `ssd_filesystem`: SSD → FPGA P2P → pass-through kernel
//!
//! A precondition pass writes the whole input to the target file once.
//! Then, for each size `S`, the file is reopened, two P2P buffer objects of
//! `S` bytes are allocated, and every `S`-byte chunk of the file is read
//! straight into the input buffer and pushed through the `bandwidth`
//! kernel. Open, read and kernel time are accumulated separately.
//!
//! The sweep itself, its result lines and the skip-size failure policy come
//! from [`harness::run_sweep`]; this module only supplies the per-size step.

use crate::config::BenchConfig;
use crate::harness::{self, PhaseReport, SizeStep, SizeTiming, TransferFailure};
use crate::report::{banner, Measurement};
use crate::verify;
use smartssd_driver::{
    sync_all_filesystems, Accelerator, AlignedBuffer, BufferKind, BufferObject, DirectFile,
    DirectOptions, Kernel, Result, SsdError,
};
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Kernel every chunk is pushed through
pub const KERNEL: &str = "bandwidth";

/// Heading of the per-size section, also the phase label of `[Fail]` lines
pub const PIPELINE_TITLE: &str = "SSD → FPGA P2P → Kernel";

/// Accumulated stage times of one size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    /// Transfer size in bytes
    pub size: usize,
    /// Chunks processed across all passes
    pub iterations: usize,
    /// Time to open the target
    pub open: Duration,
    /// Total `pread` time
    pub pread: Duration,
    /// Total kernel run time
    pub kernel: Duration,
}

impl StageTiming {
    #[allow(clippy::cast_precision_loss)]
    fn per_iteration_us(&self, total: Duration) -> Option<f64> {
        (self.iterations > 0).then(|| total.as_secs_f64() * 1e6 / self.iterations as f64)
    }

    /// Mean `pread` time per chunk in microseconds
    pub fn avg_pread_us(&self) -> Option<f64> {
        self.per_iteration_us(self.pread)
    }

    /// Mean kernel time per chunk in microseconds
    pub fn avg_kernel_us(&self) -> Option<f64> {
        self.per_iteration_us(self.kernel)
    }
}

struct Micros(Option<f64>);

impl fmt::Display for Micros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(us) => write!(f, "{us:.3} us"),
            None => f.write_str("n/a"),
        }
    }
}

impl fmt::Display for StageTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IO_Size : {} B\tFile open : {}\tPREAD : {}\tKernel : {}",
            self.size,
            Micros(Some(self.open.as_secs_f64() * 1e6)),
            Micros(self.avg_pread_us()),
            Micros(self.avg_kernel_us()),
        )
    }
}

impl SizeTiming for StageTiming {
    fn size(&self) -> usize {
        self.size
    }

    /// One count line instead of one line per chunk
    fn report_corruption(&self, corrupted: &[usize], out: &mut impl Write) -> io::Result<()> {
        writeln!(
            out,
            "Data corruption : {} of {} iterations",
            corrupted.len(),
            self.iterations
        )
    }
}

/// Everything a run printed
#[derive(Debug)]
pub struct PipelineReport {
    /// The initial whole-file write
    pub precondition: Measurement,
    /// Per-size outcomes; corrupted indices are chunk numbers
    /// (`pass * floor(V / S) + iteration`)
    pub sweep: PhaseReport<StageTiming>,
}

impl PipelineReport {
    /// Timings of the sizes that completed
    pub fn completed(&self) -> impl Iterator<Item = &StageTiming> {
        self.sweep.measurements()
    }
}

/// Write the input, then time open / P2P read / kernel per size
///
/// # Errors
///
/// Returns an error for an invalid configuration, accelerator setup
/// failure, a failed precondition write, a target that cannot be reopened,
/// or a failed buffer allocation. Read and kernel failures skip the size.
pub fn run_filesystem<A: Accelerator>(
    config: &BenchConfig,
    bitstream: &Path,
    device_index: u32,
    out: &mut impl Write,
) -> Result<PipelineReport> {
    config.validate()?;
    let mut device = A::open(device_index)?;
    run_pipeline(&mut device, config, bitstream, out)
}

/// Body of [`run_filesystem`] on an already opened device
fn run_pipeline<A: Accelerator>(
    device: &mut A,
    config: &BenchConfig,
    bitstream: &Path,
    out: &mut impl Write,
) -> Result<PipelineReport> {
    let id = device.load_bitstream(bitstream)?;
    let kernel = device.kernel(&id, KERNEL)?;
    info!("Loaded {} on {} ({})", bitstream.display(), device.info().name, id);

    let options = DirectOptions {
        direct: config.direct,
        create: false,
    };
    let precondition = precondition(config, options, out)?;

    banner(out, &format!("Test start {}", config.target.display()))?;
    let device = &*device;
    let sweep = harness::run_sweep(PIPELINE_TITLE, config, out, |size, per_pass| {
        run_size(device, &kernel, config, options, size, per_pass)
    })?;

    Ok(PipelineReport {
        precondition,
        sweep,
    })
}

fn precondition(
    config: &BenchConfig,
    options: DirectOptions,
    out: &mut impl Write,
) -> Result<Measurement> {
    banner(out, &format!("Precondition : {}", config.target.display()))?;
    let input = AlignedBuffer::filled(config.volume, config.pattern)?;

    let start = Instant::now();
    let file = DirectFile::open(&config.target, options.create())?;
    let written = file.write_at(&input, 0)?;
    sync_all_filesystems();
    drop(file);
    let elapsed = start.elapsed();

    if written != input.len() {
        return Err(SsdError::transfer_failed(format!(
            "precondition wrote {written} of {} bytes",
            input.len()
        )));
    }

    let measurement = Measurement {
        size: config.volume,
        iterations: 1,
        passes: 1,
        bytes: written as u64,
        elapsed,
    };
    writeln!(out, "{measurement}")?;
    Ok(measurement)
}

/// Outer error aborts the run; inner error skips the size
///
/// The file and both buffers are released when this returns.
fn run_size<A: Accelerator>(
    device: &A,
    kernel: &A::Kernel,
    config: &BenchConfig,
    options: DirectOptions,
    size: usize,
    per_pass: usize,
) -> Result<SizeStep<StageTiming>> {
    let n_elements = u32::try_from(size / 4)
        .map_err(|_| SsdError::invalid_config(format!("size {size} exceeds kernel element range")))?;

    let start = Instant::now();
    let file = DirectFile::open(&config.target, options)?;
    let open = start.elapsed();

    let mut bo_in = device.alloc(size, BufferKind::P2p, kernel.group_id(0)?)?;
    let mut bo_out = device.alloc(size, BufferKind::P2p, kernel.group_id(1)?)?;
    bo_in.map()?.fill(0);
    bo_out.map()?.fill(0);
    debug!("size {size} B: P2P buffers allocated");

    let mut timing = StageTiming {
        size,
        iterations: 0,
        open,
        pread: Duration::ZERO,
        kernel: Duration::ZERO,
    };
    let mut corrupted = Vec::new();

    for pass in 0..config.repeat {
        for iteration in 0..per_pass {
            let fail = |error: SsdError| TransferFailure {
                size,
                pass,
                iteration,
                error,
            };
            let offset = (iteration * size) as u64;

            let start = Instant::now();
            let read = bo_in.map().and_then(|map| file.read_at(map, offset));
            timing.pread += start.elapsed();
            match read {
                Ok(n) if n == size => {}
                Ok(n) => {
                    return Ok(Err(fail(SsdError::transfer_failed(format!(
                        "pread moved {n} of {size} bytes at offset {offset}"
                    )))))
                }
                Err(error) => return Ok(Err(fail(error))),
            }

            let start = Instant::now();
            let run = kernel.run(&bo_in, &mut bo_out, n_elements);
            timing.kernel += start.elapsed();
            if let Err(error) = run {
                return Ok(Err(fail(error)));
            }

            let input = bo_in.map()?;
            let output = bo_out.map()?;
            if !verify::mismatches(input, output).is_empty() {
                corrupted.push(pass * per_pass + iteration);
            }
            timing.iterations += 1;
        }
    }

    Ok(Ok((timing, corrupted)))
}
