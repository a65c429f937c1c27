//! `ssd_filesystem` - file on the SSD → FPGA P2P → pass-through kernel.
//!
//! Usage:
//!   ssd_filesystem -x bandwidth.xclbin
//!   ssd_filesystem -x bandwidth.xclbin -f /mnt/nvme/test.txt --max-size-mib 16

use anyhow::Result;
use clap::Parser;
use smartssd_bench::cli::CommonArgs;
use smartssd_bench::{run_filesystem, BenchConfig};
use smartssd_driver::{BackendType, SoftwareAccelerator};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ssd_filesystem",
    about = "SmartSSD file read into FPGA P2P memory through a kernel",
    version
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();
    let config = cli.common.apply(BenchConfig::filesystem());

    let mut out = std::io::stdout().lock();
    let bitstream = &cli.common.xclbin_file;
    let device = cli.common.device_id;

    let report = match cli.common.backend().resolve()? {
        BackendType::Software => {
            run_filesystem::<SoftwareAccelerator>(&config, bitstream, device, &mut out)?
        }
        #[cfg(feature = "xrt")]
        BackendType::Xrt => {
            run_filesystem::<smartssd_driver::XrtDevice>(&config, bitstream, device, &mut out)?
        }
        #[cfg(not(feature = "xrt"))]
        BackendType::Xrt => anyhow::bail!("built without the `xrt` feature"),
    };

    let failed = report.sweep.failures().count();
    if failed > 0 {
        tracing::warn!("{failed} sizes skipped after transfer failures");
    }
    Ok(())
}
