//! Both programs end to end against the emulated accelerator
//!
//! Targets are files in a temporary directory opened without `O_DIRECT`.

use smartssd_bench::{
    run_filesystem, run_performance, BenchConfig, PhaseKind, SizeOutcome, Sweep, KIB, PIPELINE_TITLE,
};
use smartssd_driver::SoftwareAccelerator;
use std::path::{Path, PathBuf};

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bandwidth.xclbin"), b"xclbin2\0emulated").unwrap();
        Self { dir }
    }

    fn bitstream(&self) -> PathBuf {
        self.dir.path().join("bandwidth.xclbin")
    }

    fn target(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn performance_config(target: &Path) -> BenchConfig {
    BenchConfig::performance()
        .with_target(target)
        .with_volume(128 * KIB)
        .with_repeat(2)
        .with_threads(4)
        .with_sweep(Sweep::custom([4 * KIB, 32 * KIB, 128 * KIB]))
        .with_direct(false)
        .with_verify(true)
}

#[test]
fn performance_runs_all_six_phases() {
    let fx = Fixture::new();
    let target = fx.target("nvme.img");
    std::fs::write(&target, b"").unwrap();
    let cfg = performance_config(&target);

    let mut out = Vec::new();
    let report = run_performance::<SoftwareAccelerator>(&cfg, &fx.bitstream(), 0, &mut out).unwrap();

    assert!(report.bitstream.is_some());
    let kinds: Vec<PhaseKind> = report.phases.iter().map(|(k, _)| *k).collect();
    assert_eq!(kinds, PhaseKind::ALL.to_vec());

    for (kind, phase) in &report.phases {
        assert_eq!(phase.title, kind.title());
        assert_eq!(phase.outcomes.len(), 3, "{}", kind.title());
        for outcome in &phase.outcomes {
            let SizeOutcome::Completed {
                measurement,
                corrupted,
            } = outcome
            else {
                panic!("{} failed: {outcome:?}", kind.title());
            };
            assert!(corrupted.is_empty(), "{} corrupted", kind.title());
            assert_eq!(measurement.bytes, 2 * 128 * 1024);
        }
    }

    let text = String::from_utf8(out).unwrap();
    let id = report.bitstream.unwrap().to_string();
    assert!(text.contains(&format!("SSD Performance {}", target.display())));
    assert!(text.contains("P2P Performance"));
    assert!(text.contains(&format!("FPGA Performance {id}")));
    assert_eq!(text.lines().filter(|l| l.starts_with("IO_Size : ")).count(), 18);
    assert!(!text.contains("Data corruption"));
    assert!(!text.contains("[Fail]"));
}

#[test]
fn p2p_read_back_matches_host_write() {
    let fx = Fixture::new();
    let target = fx.target("nvme.img");
    std::fs::write(&target, b"").unwrap();
    let cfg = performance_config(&target).with_phases([
        PhaseKind::HostToSsd,
        PhaseKind::SsdToFpga,
    ]);

    let mut out = Vec::new();
    let report = run_performance::<SoftwareAccelerator>(&cfg, &fx.bitstream(), 0, &mut out).unwrap();
    let ssd_to_fpga = report.phase(PhaseKind::SsdToFpga).unwrap();
    assert!(ssd_to_fpga.all_completed());
    assert!(report.phase(PhaseKind::FpgaToSsd).is_none());
}

#[test]
fn short_target_skips_sizes_without_aborting() {
    let fx = Fixture::new();
    let target = fx.target("short.img");
    // half the volume: every size reading past 64 KiB comes up short
    std::fs::write(&target, vec![b'a'; 64 * 1024]).unwrap();
    let cfg = performance_config(&target).with_phases([PhaseKind::SsdToHost]);

    let mut out = Vec::new();
    let report = run_performance::<SoftwareAccelerator>(&cfg, &fx.bitstream(), 0, &mut out).unwrap();
    let phase = report.phase(PhaseKind::SsdToHost).unwrap();
    assert_eq!(phase.failures().count(), 3);

    let first = phase.failures().next().unwrap();
    assert_eq!((first.size, first.pass, first.iteration), (4 * KIB, 0, 16));

    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().filter(|l| l.starts_with("[Fail]")).count(), 3);
}

#[test]
fn unknown_device_aborts() {
    let fx = Fixture::new();
    let target = fx.target("nvme.img");
    std::fs::write(&target, b"").unwrap();
    let cfg = performance_config(&target).with_phases([PhaseKind::HostToFpga]);

    let mut out = Vec::new();
    assert!(run_performance::<SoftwareAccelerator>(&cfg, &fx.bitstream(), 7, &mut out).is_err());
}

#[test]
fn filesystem_pipeline_passes_data_through_kernel() {
    let fx = Fixture::new();
    let target = fx.target("test.txt");
    let cfg = BenchConfig::filesystem()
        .with_target(&target)
        .with_volume(64 * KIB)
        .with_sweep(Sweep::filesystem().clamped(64 * KIB))
        .with_direct(false);

    let mut out = Vec::new();
    let report = run_filesystem::<SoftwareAccelerator>(&cfg, &fx.bitstream(), 0, &mut out).unwrap();

    assert_eq!(report.precondition.bytes, 64 * 1024);
    assert_eq!(std::fs::metadata(&target).unwrap().len(), 64 * 1024);
    assert_eq!(report.sweep.outcomes.len(), 6);
    for outcome in &report.sweep.outcomes {
        let SizeOutcome::Completed {
            measurement,
            corrupted,
        } = outcome
        else {
            panic!("size {} failed", outcome.size());
        };
        assert_eq!(measurement.iterations, 64 * KIB / measurement.size);
        assert!(corrupted.is_empty());
    }
    assert_eq!(report.completed().count(), 6);

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains(&format!("Precondition : {}", target.display())));
    assert!(text.contains(&format!("Test start {}", target.display())));
    assert!(text.contains(&format!("{PIPELINE_TITLE}\nIO_Size : 512 B\t")));
    let stages: Vec<&str> = text.lines().filter(|l| l.contains("File open : ")).collect();
    assert_eq!(stages.len(), 6);
    assert!(stages[0].starts_with("IO_Size : 512 B\t"));
    assert!(!text.contains("Data corruption"));
}

#[test]
fn filesystem_pipeline_counts_repeat_passes() {
    let fx = Fixture::new();
    let cfg = BenchConfig::filesystem()
        .with_target(fx.target("test.txt"))
        .with_volume(16 * KIB)
        .with_repeat(3)
        .with_sweep(Sweep::custom([4 * KIB]))
        .with_direct(false);

    let mut out = Vec::new();
    let report = run_filesystem::<SoftwareAccelerator>(&cfg, &fx.bitstream(), 0, &mut out).unwrap();
    let timing = report.completed().next().unwrap();
    assert_eq!(timing.iterations, 12);
    assert!(report.sweep.all_completed());
}

#[test]
fn filesystem_precondition_failure_aborts() {
    let fx = Fixture::new();
    let cfg = BenchConfig::filesystem()
        .with_target(fx.target("missing-dir/test.txt"))
        .with_volume(16 * KIB)
        .with_sweep(Sweep::custom([4 * KIB]))
        .with_direct(false);

    let mut out = Vec::new();
    assert!(run_filesystem::<SoftwareAccelerator>(&cfg, &fx.bitstream(), 0, &mut out).is_err());
    let text = String::from_utf8(out).unwrap();
    assert!(!text.contains("Test start"));
}
