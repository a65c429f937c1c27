//! Transfer benchmarks for a SmartSSD: host memory, the NVMe drive and the
//! FPGA behind it.
//!
//! Two programs share one size-sweep harness:
//!
//! - `ssd_performance`: host ↔ SSD, FPGA P2P ↔ SSD and host ↔ FPGA
//!   bandwidth and latency ([`performance`]).
//! - `ssd_filesystem`: SSD → FPGA P2P → pass-through kernel, timing open,
//!   read and kernel separately ([`pipeline`]).
//!
//! Each `ssd_performance` phase is a [`harness::Transfer`] endpoint driven
//! by [`harness::run_phase`] or [`harness::run_phase_parallel`]; the
//! filesystem pipeline plugs its per-size stage timing into
//! [`harness::run_sweep`].

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod cli;
pub mod config;
pub mod endpoints;
pub mod harness;
pub mod performance;
pub mod pipeline;
pub mod report;
pub mod verify;

pub use config::{BenchConfig, PhaseKind, Sweep, KIB, MIB};
pub use harness::{PhaseReport, SizeOutcome, SizeTiming, Transfer, TransferFailure};
pub use performance::{run_performance, PerformanceReport};
pub use pipeline::{run_filesystem, PipelineReport, StageTiming, PIPELINE_TITLE};
pub use report::Measurement;
