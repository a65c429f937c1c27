// SPDX-License-Identifier: AGPL-3.0-only

//! `ssd_performance` - host / SSD / FPGA transfer bandwidth sweep.
//!
//! Usage:
//!   ssd_performance -x bandwidth.xclbin
//!   ssd_performance -x bandwidth.xclbin -f /dev/nvme1n1 --phases host-to-ssd,ssd-to-host
//!   ssd_performance -x bandwidth.xclbin --backend software -f /tmp/ssd.img --buffered

use anyhow::Result;
use clap::Parser;
use smartssd_bench::cli::{CommonArgs, PhaseArg};
use smartssd_bench::{run_performance, BenchConfig, PhaseKind};
use smartssd_driver::{BackendType, SoftwareAccelerator};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ssd_performance",
    about = "SmartSSD host, P2P and FPGA transfer bandwidth",
    version
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Worker threads for the SSD write phases
    #[arg(long, default_value_t = 16)]
    threads: usize,

    /// Phases to run, comma separated (default: all)
    #[arg(long, value_enum, value_delimiter = ',')]
    phases: Vec<PhaseArg>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();
    let mut config = cli
        .common
        .apply(BenchConfig::performance())
        .with_threads(cli.threads);
    if !cli.phases.is_empty() {
        let phases: Vec<PhaseKind> = cli.phases.iter().copied().map(PhaseKind::from).collect();
        config = config.with_phases(phases);
    }

    let mut out = std::io::stdout().lock();
    let bitstream = &cli.common.xclbin_file;
    let device = cli.common.device_id;

    let report = match cli.common.backend().resolve()? {
        BackendType::Software => {
            run_performance::<SoftwareAccelerator>(&config, bitstream, device, &mut out)?
        }
        #[cfg(feature = "xrt")]
        BackendType::Xrt => {
            run_performance::<smartssd_driver::XrtDevice>(&config, bitstream, device, &mut out)?
        }
        #[cfg(not(feature = "xrt"))]
        BackendType::Xrt => anyhow::bail!("built without the `xrt` feature"),
    };

    let failed: usize = report.phases.iter().map(|(_, p)| p.failures().count()).sum();
    if failed > 0 {
        tracing::warn!("{failed} sizes skipped after transfer failures");
    }
    Ok(())
}
