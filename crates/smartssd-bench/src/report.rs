//! Bandwidth / latency arithmetic and console formatting

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

const RULE: &str = "############################################################";

/// Timing of one sweep entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Transfer size in bytes
    pub size: usize,
    /// Transfers per pass, `floor(volume / size)`
    pub iterations: usize,
    /// Passes over the volume
    pub passes: usize,
    /// Bytes actually moved across all passes
    pub bytes: u64,
    /// Wall-clock time of all passes
    pub elapsed: Duration,
}

impl Measurement {
    /// Elapsed time in microseconds
    pub fn elapsed_us(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1e6
    }

    /// Bytes per microsecond, i.e. MB/s; `None` if no time elapsed
    #[allow(clippy::cast_precision_loss)]
    pub fn bandwidth_mb_s(&self) -> Option<f64> {
        let us = self.elapsed_us();
        (us > 0.0).then(|| self.bytes as f64 / us)
    }

    /// Mean time per transfer in microseconds; `None` if nothing was timed
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_latency_us(&self) -> Option<f64> {
        let us = self.elapsed_us();
        let transfers = self.iterations * self.passes;
        (us > 0.0 && transfers > 0).then(|| us / transfers as f64)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IO_Size : {} B\tBandwidth : ", self.size)?;
        match self.bandwidth_mb_s() {
            Some(bw) => write!(f, "{bw:.0} MB/s")?,
            None => f.write_str("n/a")?,
        }
        f.write_str("\tavg_latency : ")?;
        match self.avg_latency_us() {
            Some(lat) => write!(f, "{lat:.3} us")?,
            None => f.write_str("n/a")?,
        }
        write!(f, "\ttotal_time : {} us", self.elapsed.as_micros())
    }
}

/// Print a `#`-framed title
///
/// # Errors
///
/// Returns any error from the underlying writer.
pub fn banner(out: &mut impl Write, title: &str) -> io::Result<()> {
    writeln!(out, "{RULE}")?;
    writeln!(out, "                  {title}")?;
    writeln!(out, "{RULE}")
}
