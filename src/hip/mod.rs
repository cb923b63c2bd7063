//! # Hippocampal Trial Machinery
//!
//! The EC / DG / CA3 / CA1 circuit, the four-quarter trial controller that
//! drives it, and the statistics taken from each trial.
//!
//! ## Layout
//!
//! - `topology`: network construction and typed handle resolution
//! - `alpha`: protocol variants and the quarter schedule
//! - `stats`: memory completion, SSE, correlations, epoch aggregation
//! - `observer`: read-only hooks refreshed at a chosen cadence

mod alpha;
mod observer;
mod stats;
mod topology;

pub use alpha::{AlphaCycle, AlphaParams, Protocol};
pub use observer::{CycleObserver, CycleRecorder, CycleSample, UpdateCadence};
pub use stats::{
    correlation, score_memory, sse, Ca3Correlations, EpochStats, EpochSummary, MemStats, TrialStats, BIN_THR,
    SSE_TOL,
};
pub use topology::{build_hippocampus, build_minimal, names, HipTopology};
