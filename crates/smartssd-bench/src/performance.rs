//! `ssd_performance`: six transfer phases over one sweep
//!
//! ```text
//! SSD Performance      host → SSD (parallel), SSD → host
//! P2P Performance      FPGA P2P → SSD (parallel), SSD → FPGA P2P
//! FPGA Performance     host → FPGA (bo write), FPGA → host (bo read)
//! ```
//!
//! The accelerator is only opened when an FPGA phase is selected.

use crate::config::{BenchConfig, PhaseKind};
use crate::endpoints::{BufferRead, BufferWrite, SsdRead, SsdWrite};
use crate::harness::{self, PhaseReport, Transfer};
use crate::report::banner;
use smartssd_driver::{
    Accelerator, AlignedBuffer, BitstreamId, BufferKind, BufferObject, DirectOptions, Kernel, Result,
    SsdError, SyncDirection,
};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Kernel the P2P buffers are grouped for
pub const P2P_KERNEL: &str = "read_bandwidth";
/// Pass-through kernel run before reading results back
pub const PASS_THROUGH_KERNEL: &str = "bandwidth";

/// Everything a run printed, in run order
#[derive(Debug)]
pub struct PerformanceReport {
    /// Loaded bitstream, if an FPGA phase ran
    pub bitstream: Option<BitstreamId>,
    /// Selected phases that ran
    pub phases: Vec<(PhaseKind, PhaseReport)>,
}

impl PerformanceReport {
    /// Report of `kind`, if it ran
    pub fn phase(&self, kind: PhaseKind) -> Option<&PhaseReport> {
        self.phases
            .iter()
            .find_map(|(k, report)| (*k == kind).then_some(report))
    }
}

/// Runs the pass-through kernel once per size, then reads the output back
#[derive(Debug)]
struct KernelThenRead<'a, K: Kernel> {
    kernel: &'a K,
    input: &'a K::Buffer,
    n_elements: u32,
    read: BufferRead<'a, K::Buffer>,
}

impl<K: Kernel> Transfer for KernelThenRead<'_, K> {
    fn open(&mut self, size: usize) -> Result<()> {
        self.kernel
            .run(self.input, self.read.buffer_mut(), self.n_elements)?;
        self.read.open(size)
    }

    fn transfer(&mut self, offset: u64, len: usize) -> Result<usize> {
        self.read.transfer(offset, len)
    }

    fn mismatches(&self) -> Vec<usize> {
        self.read.mismatches()
    }
}

/// Load the kernel input untimed when no host → FPGA phase wrote it
fn seed<B: BufferObject>(bo: &mut B, input: &[u8]) -> Result<()> {
    debug!("seeding {} B kernel input", input.len());
    bo.write(input, 0)?;
    bo.sync(SyncDirection::ToDevice, input.len(), 0)
}

/// Run every selected phase against `config.target`
///
/// # Errors
///
/// Returns an error for an invalid configuration, a failed buffer
/// allocation, accelerator setup failure, or an endpoint that cannot be
/// opened. Individual transfer failures are reported in the phase reports
/// instead.
pub fn run_performance<A: Accelerator>(
    config: &BenchConfig,
    bitstream: &Path,
    device_index: u32,
    out: &mut impl Write,
) -> Result<PerformanceReport> {
    config.validate()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .map_err(|e| SsdError::invalid_config(format!("worker pool: {e}")))?;

    let options = DirectOptions {
        direct: config.direct,
        create: false,
    };
    let input = AlignedBuffer::filled(config.volume, config.pattern)?;
    let mut output = AlignedBuffer::new(config.volume)?;
    let mut report = PerformanceReport {
        bitstream: None,
        phases: Vec::new(),
    };

    banner(out, &format!("SSD Performance {}", config.target.display()))?;

    if config.runs(PhaseKind::HostToSsd) {
        let kind = PhaseKind::HostToSsd;
        info!("Phase: {}", kind.title());
        let mut endpoint = SsdWrite::new(&config.target, options, &input);
        let phase = harness::run_phase_parallel(kind.title(), config, &pool, &mut endpoint, out)?;
        report.phases.push((kind, phase));
    }

    if config.runs(PhaseKind::SsdToHost) {
        let kind = PhaseKind::SsdToHost;
        info!("Phase: {}", kind.title());
        let mut endpoint = SsdRead::new(&config.target, options, &mut output).expecting(&input);
        let phase = harness::run_phase(kind.title(), config, &mut endpoint, out)?;
        report.phases.push((kind, phase));
    }

    if !config.needs_fpga() {
        return Ok(report);
    }

    let mut device = A::open(device_index)?;
    let id = device.load_bitstream(bitstream)?;
    info!("Loaded {} on {} ({})", bitstream.display(), device.info().name, id);
    report.bitstream = Some(id);

    banner(out, "P2P Performance")?;

    let p2p_kernel = device.kernel(&id, P2P_KERNEL)?;
    let group = p2p_kernel.group_id(0)?;
    let mut bo_in = device.alloc(config.volume, BufferKind::Normal, group)?;
    let mut bo_out = device.alloc(config.volume, BufferKind::Normal, group)?;
    let mut p2p = device.alloc(config.volume, BufferKind::P2p, group)?;
    let p2p_map = p2p.map()?;
    p2p_map.copy_from_slice(&input);

    if config.runs(PhaseKind::FpgaToSsd) {
        let kind = PhaseKind::FpgaToSsd;
        info!("Phase: {}", kind.title());
        let mut endpoint = SsdWrite::new(&config.target, options, &*p2p_map);
        let phase = harness::run_phase_parallel(kind.title(), config, &pool, &mut endpoint, out)?;
        report.phases.push((kind, phase));
    }

    if config.runs(PhaseKind::SsdToFpga) {
        let kind = PhaseKind::SsdToFpga;
        info!("Phase: {}", kind.title());
        p2p_map.fill(0);
        let mut endpoint = SsdRead::new(&config.target, options, &mut *p2p_map).expecting(&input);
        let phase = harness::run_phase(kind.title(), config, &mut endpoint, out)?;
        report.phases.push((kind, phase));
    }

    banner(out, &format!("FPGA Performance {id}"))?;

    if config.runs(PhaseKind::HostToFpga) {
        let kind = PhaseKind::HostToFpga;
        info!("Phase: {}", kind.title());
        let mut endpoint = BufferWrite::new(&mut bo_in, &input);
        let phase = harness::run_phase(kind.title(), config, &mut endpoint, out)?;
        report.phases.push((kind, phase));
    }

    if config.runs(PhaseKind::FpgaToHost) {
        let kind = PhaseKind::FpgaToHost;
        info!("Phase: {}", kind.title());
        if !config.runs(PhaseKind::HostToFpga) {
            seed(&mut bo_in, &input)?;
        }
        let kernel = device.kernel(&id, PASS_THROUGH_KERNEL)?;
        let n_elements = u32::try_from(config.volume / 4)
            .map_err(|_| SsdError::invalid_config("volume exceeds kernel element range"))?;
        output.fill(smartssd_driver::Pattern::Zero);
        let mut endpoint = KernelThenRead {
            kernel: &kernel,
            input: &bo_in,
            n_elements,
            read: BufferRead::new(&mut bo_out, &mut output).expecting(&input),
        };
        let phase = harness::run_phase(kind.title(), config, &mut endpoint, out)?;
        report.phases.push((kind, phase));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Sweep, KIB};
    use smartssd_driver::SoftwareAccelerator;

    fn small_config(target: &Path) -> BenchConfig {
        BenchConfig::performance()
            .with_target(target)
            .with_volume(64 * KIB)
            .with_repeat(2)
            .with_threads(2)
            .with_sweep(Sweep::custom([4 * KIB, 16 * KIB, 64 * KIB]))
            .with_direct(false)
            .with_verify(true)
    }

    #[test]
    fn ssd_only_phases_skip_accelerator() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nvme.img");
        std::fs::write(&target, b"").unwrap();
        let cfg = small_config(&target).with_phases([PhaseKind::HostToSsd, PhaseKind::SsdToHost]);

        let mut out = Vec::new();
        // no bitstream file exists, so touching the accelerator would fail
        let report = run_performance::<SoftwareAccelerator>(
            &cfg,
            &dir.path().join("missing.xclbin"),
            0,
            &mut out,
        )
        .unwrap();

        assert!(report.bitstream.is_none());
        assert_eq!(report.phases.len(), 2);
        for (_, phase) in &report.phases {
            assert!(phase.all_completed());
            assert_eq!(phase.outcomes.len(), 3);
        }
        assert_eq!(std::fs::metadata(&target).unwrap().len(), 64 * 1024);
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("P2P Performance"));
        assert!(!text.contains("Data corruption"));
    }

    #[test]
    fn fpga_to_host_alone_reads_back_intact() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nvme.img");
        std::fs::write(&target, b"").unwrap();
        let bitstream = dir.path().join("bandwidth.xclbin");
        std::fs::write(&bitstream, b"xclbin2\0emulated").unwrap();
        let cfg = small_config(&target)
            .with_volume(16 * KIB)
            .with_sweep(Sweep::custom([4 * KIB]))
            .with_phases([PhaseKind::FpgaToHost]);

        let mut out = Vec::new();
        let report = run_performance::<SoftwareAccelerator>(&cfg, &bitstream, 0, &mut out).unwrap();

        let phase = report.phase(PhaseKind::FpgaToHost).unwrap();
        assert!(report.phase(PhaseKind::HostToFpga).is_none());
        assert!(matches!(
            &phase.outcomes[0],
            harness::SizeOutcome::Completed { corrupted, .. } if corrupted.is_empty()
        ));
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("Data corruption"));
    }

    #[test]
    fn missing_target_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = small_config(&dir.path().join("absent")).with_phases([PhaseKind::HostToSsd]);
        let mut out = Vec::new();
        let err = run_performance::<SoftwareAccelerator>(&cfg, Path::new("x.xclbin"), 0, &mut out)
            .unwrap_err();
        assert!(matches!(err, SsdError::Io { .. }));
    }

    #[test]
    fn invalid_config_rejected_before_any_output() {
        let cfg = BenchConfig::performance().with_repeat(0);
        let mut out = Vec::new();
        assert!(run_performance::<SoftwareAccelerator>(&cfg, Path::new("x"), 0, &mut out).is_err());
        assert!(out.is_empty());
    }
}
