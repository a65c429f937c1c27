//! Command-line switches shared by both programs

use crate::config::{BenchConfig, PhaseKind, MIB};
use clap::{Args, ValueEnum};
use smartssd_driver::BackendSelection;
use std::path::PathBuf;

/// Accelerator backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BackendArg {
    /// XRT when compiled in, otherwise the emulation
    #[default]
    Auto,
    /// In-process emulation
    Software,
    /// Xilinx runtime
    Xrt,
}

impl From<BackendArg> for BackendSelection {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => Self::Auto,
            BackendArg::Software => Self::Software,
            BackendArg::Xrt => Self::Xrt,
        }
    }
}

/// Phase names accepted by `--phases`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PhaseArg {
    /// Host buffer → SSD
    HostToSsd,
    /// SSD → host buffer
    SsdToHost,
    /// FPGA P2P memory → SSD
    FpgaToSsd,
    /// SSD → FPGA P2P memory
    SsdToFpga,
    /// Host buffer → FPGA buffer object
    HostToFpga,
    /// FPGA buffer object → host buffer
    FpgaToHost,
}

impl From<PhaseArg> for PhaseKind {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::HostToSsd => Self::HostToSsd,
            PhaseArg::SsdToHost => Self::SsdToHost,
            PhaseArg::FpgaToSsd => Self::FpgaToSsd,
            PhaseArg::SsdToFpga => Self::SsdToFpga,
            PhaseArg::HostToFpga => Self::HostToFpga,
            PhaseArg::FpgaToHost => Self::FpgaToHost,
        }
    }
}

/// Switches common to `ssd_performance` and `ssd_filesystem`
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Bitstream (xclbin) to program
    #[arg(short = 'x', long)]
    pub xclbin_file: PathBuf,

    /// Accelerator index
    #[arg(short = 'd', long, default_value_t = 0)]
    pub device_id: u32,

    /// SSD block device or file to transfer against
    #[arg(short = 'f', long)]
    pub input_file: Option<PathBuf>,

    /// Accelerator backend
    #[arg(long, value_enum, default_value_t = BackendArg::Auto)]
    pub backend: BackendArg,

    /// Bytes moved per pass, in MiB (larger sweep sizes are dropped)
    #[arg(long)]
    pub max_size_mib: Option<usize>,

    /// Passes per size
    #[arg(long)]
    pub repeat: Option<usize>,

    /// Print every corrupted byte after each round trip
    #[arg(long)]
    pub verify: bool,

    /// Open the target without O_DIRECT
    #[arg(long)]
    pub buffered: bool,
}

impl CommonArgs {
    /// Override `preset` with the given switches
    pub fn apply(&self, preset: BenchConfig) -> BenchConfig {
        let mut config = preset.with_verify(self.verify).with_direct(!self.buffered);
        if let Some(target) = &self.input_file {
            config = config.with_target(target);
        }
        if let Some(mib) = self.max_size_mib {
            let volume = mib.saturating_mul(MIB);
            let sweep = config.sweep.clone().clamped(volume);
            config = config.with_volume(volume).with_sweep(sweep);
        }
        if let Some(repeat) = self.repeat {
            config = config.with_repeat(repeat);
        }
        config
    }

    /// Backend to drive the accelerator with
    pub fn backend(&self) -> BackendSelection {
        self.backend.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        common: CommonArgs,
    }

    #[test]
    fn bitstream_is_required() {
        assert!(Cli::try_parse_from(["prog"]).is_err());
        let cli = Cli::try_parse_from(["prog", "-x", "bw.xclbin"]).unwrap();
        assert_eq!(cli.common.device_id, 0);
        assert_eq!(cli.common.backend(), BackendSelection::Auto);
    }

    #[test]
    fn overrides_apply_to_preset() {
        let cli = Cli::try_parse_from([
            "prog",
            "-x",
            "bw.xclbin",
            "-f",
            "/tmp/ssd.img",
            "-d",
            "2",
            "--backend",
            "software",
            "--max-size-mib",
            "1",
            "--repeat",
            "3",
            "--verify",
            "--buffered",
        ])
        .unwrap();
        let cfg = cli.common.apply(BenchConfig::performance());

        assert_eq!(cli.common.device_id, 2);
        assert_eq!(cli.common.backend(), BackendSelection::Software);
        assert_eq!(cfg.target, PathBuf::from("/tmp/ssd.img"));
        assert_eq!(cfg.volume, MIB);
        assert_eq!(cfg.repeat, 3);
        assert!(cfg.verify);
        assert!(!cfg.direct);
        assert_eq!(cfg.sweep.sizes().last(), Some(&MIB));
        cfg.validate().unwrap();
    }

    #[test]
    fn defaults_keep_preset() {
        let cli = Cli::try_parse_from(["prog", "--xclbin-file", "bw.xclbin"]).unwrap();
        let cfg = cli.common.apply(BenchConfig::filesystem());
        assert_eq!(cfg.volume, 64 * MIB);
        assert!(cfg.direct);
        assert!(!cfg.verify);
    }
}
