//! Benchmark configuration
//!
//! Every knob the programs use is a field here; presets reproduce the
//! stock `ssd_performance` and `ssd_filesystem` runs and the CLI overrides
//! individual values.

use smartssd_driver::{Pattern, Result, SsdError};
use std::path::PathBuf;

/// One KiB
pub const KIB: usize = 1024;
/// One MiB
pub const MIB: usize = 1024 * KIB;

/// Ordered list of transfer sizes in bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sweep(Vec<usize>);

impl Sweep {
    /// 4 KiB doubling to 512 MiB (18 sizes)
    pub fn performance() -> Self {
        Self((2..=19).map(|shift| (1usize << shift) * KIB).collect())
    }

    /// 512 B, then 4 KiB doubling to 1 MiB (10 sizes)
    pub fn filesystem() -> Self {
        let mut sizes = vec![512];
        sizes.extend((2..=10).map(|shift| (1usize << shift) * KIB));
        Self(sizes)
    }

    /// Arbitrary sizes, kept in the given order
    pub fn custom(sizes: impl Into<Vec<usize>>) -> Self {
        Self(sizes.into())
    }

    /// Sizes in sweep order
    pub fn sizes(&self) -> &[usize] {
        &self.0
    }

    /// Drop sizes larger than `volume`
    #[must_use]
    pub fn clamped(mut self, volume: usize) -> Self {
        self.0.retain(|&size| size <= volume);
        self
    }

    /// Number of sizes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the sweep has no sizes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A selectable benchmark phase of `ssd_performance`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Host buffer → SSD (`pwrite`)
    HostToSsd,
    /// SSD → host buffer (`pread`)
    SsdToHost,
    /// FPGA P2P memory → SSD
    FpgaToSsd,
    /// SSD → FPGA P2P memory
    SsdToFpga,
    /// Host buffer → FPGA (buffer write + sync)
    HostToFpga,
    /// FPGA → host buffer (sync + buffer read)
    FpgaToHost,
}

impl PhaseKind {
    /// Every phase, in run order
    pub const ALL: [Self; 6] = [
        Self::HostToSsd,
        Self::SsdToHost,
        Self::FpgaToSsd,
        Self::SsdToFpga,
        Self::HostToFpga,
        Self::FpgaToHost,
    ];

    /// Heading printed above the phase's result lines
    pub const fn title(self) -> &'static str {
        match self {
            Self::HostToSsd => "Write Performance (Host to SSD)",
            Self::SsdToHost => "Read Performance (SSD to Host)",
            Self::FpgaToSsd => "Write Performance (FPGA to SSD)",
            Self::SsdToFpga => "Read Performance (SSD to FPGA)",
            Self::HostToFpga => "Write Performance (Host to FPGA (by bo::write))",
            Self::FpgaToHost => "Read Performance (FPGA to Host (by bo::read))",
        }
    }

    /// Whether the phase needs the accelerator
    pub const fn needs_fpga(self) -> bool {
        !matches!(self, Self::HostToSsd | Self::SsdToHost)
    }
}

/// Full configuration of one benchmark run
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// SSD block device or file to transfer against
    pub target: PathBuf,
    /// Bytes moved per pass at every size (V)
    pub volume: usize,
    /// Passes per size
    pub repeat: usize,
    /// Worker threads for parallel phases
    pub threads: usize,
    /// Transfer sizes
    pub sweep: Sweep,
    /// Compare buffers after round trips
    pub verify: bool,
    /// Open the target with `O_DIRECT`
    pub direct: bool,
    /// Fill pattern of the input buffer
    pub pattern: Pattern,
    /// Phases to run (performance program only)
    pub phases: Vec<PhaseKind>,
}

impl BenchConfig {
    /// Defaults of `ssd_performance`: 512 MiB × 5 passes on 16 threads
    pub fn performance() -> Self {
        Self {
            target: PathBuf::from("/dev/nvme0n1"),
            volume: 512 * MIB,
            repeat: 5,
            threads: 16,
            sweep: Sweep::performance(),
            verify: false,
            direct: true,
            pattern: Pattern::TextLines,
            phases: PhaseKind::ALL.to_vec(),
        }
    }

    /// Defaults of `ssd_filesystem`: 64 MiB, single pass
    pub fn filesystem() -> Self {
        Self {
            target: PathBuf::from("/mnt/smartssd/test.txt"),
            volume: 64 * MIB,
            repeat: 1,
            threads: 1,
            sweep: Sweep::filesystem(),
            verify: false,
            direct: true,
            pattern: Pattern::ByteRamp,
            phases: Vec::new(),
        }
    }

    /// Set the target path
    #[must_use]
    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = target.into();
        self
    }

    /// Set the per-pass volume
    #[must_use]
    pub fn with_volume(mut self, volume: usize) -> Self {
        self.volume = volume;
        self
    }

    /// Set the pass count
    #[must_use]
    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat;
        self
    }

    /// Set the worker count
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the sweep
    #[must_use]
    pub fn with_sweep(mut self, sweep: Sweep) -> Self {
        self.sweep = sweep;
        self
    }

    /// Enable or disable the corruption check
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Enable or disable `O_DIRECT`
    #[must_use]
    pub fn with_direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    /// Select the phases to run
    #[must_use]
    pub fn with_phases(mut self, phases: impl Into<Vec<PhaseKind>>) -> Self {
        self.phases = phases.into();
        self
    }

    /// Whether `phase` is selected
    pub fn runs(&self, phase: PhaseKind) -> bool {
        self.phases.contains(&phase)
    }

    /// Whether any selected phase needs the accelerator
    pub fn needs_fpga(&self) -> bool {
        self.phases.iter().any(|phase| phase.needs_fpga())
    }

    /// Reject configurations the harness cannot run
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero volume, pass count or worker
    /// count, or a sweep size that is zero or larger than the volume.
    pub fn validate(&self) -> Result<()> {
        if self.volume == 0 {
            return Err(SsdError::invalid_config("volume must be non-zero"));
        }
        if self.repeat == 0 {
            return Err(SsdError::invalid_config("repeat must be non-zero"));
        }
        if self.threads == 0 {
            return Err(SsdError::invalid_config("threads must be non-zero"));
        }
        if let Some(&size) = self.sweep.sizes().iter().find(|&&s| s == 0 || s > self.volume) {
            return Err(SsdError::invalid_config(format!(
                "sweep size {size} must be in 1..={}",
                self.volume
            )));
        }
        // The volume is truncated to u32 words when handed to a kernel.
        if self.volume / 4 > u32::MAX as usize {
            return Err(SsdError::invalid_config(format!(
                "volume {} exceeds the kernel element count range",
                self.volume
            )));
        }
        Ok(())
    }
}
