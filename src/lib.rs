//! # hipbench - Hippocampal Encode/Recall Benchmark
//!
//! A rate-coded hippocampus (EC, DG, CA3, CA1) trained on paired associates
//! with contrastive Hebbian learning inside a four-quarter alpha cycle.
//!
//! ## Core Components
//!
//! - **Network**: layers of rate-coded units with k-winner style inhibition,
//!   delta-based net input and sparse projections
//! - **Learning**: XCAL for cortical pathways, CHL for hippocampal ones
//! - **Alpha cycle**: per-quarter gating of mossy and Schaffer drive, CA1 input
//!   switching and layer clamps for each training protocol
//! - **Simulation**: pattern tables, epochs, runs, stopping and testing
//!
//! ## Protocols
//!
//! | Protocol | Learns | Output layer |
//! |----------|--------|--------------|
//! | encode/recall | all hippocampal pathways | Output |
//! | pretrain | EC <-> CA1 only | Output |
//! | retrieval practice | hippocampus from its own recall | ECout |
//! | restudy | hippocampus, autoencoder off | Output |
//! | autoencoder | autoencoder only | Auto |
//!
//! ## Example
//!
//! ```ignore
//! use hipbench::{SimConfig, Simulation};
//!
//! let mut sim = Simulation::new(SimConfig::small())?;
//! sim.pre_train()?;
//! if let Some(rec) = sim.train_run()? {
//!     println!("learned in {:?} epochs", rec.first_zero);
//! }
//! let test = sim.test_all()?;
//! println!("mem = {:.3}", test.mem);
//! ```

mod error;
pub use error::{HipError, Result};

pub mod synapse;
pub use synapse::Synapse;

pub mod learn;
pub use learn::{ChlParams, LearnParams, LearningRule, MinusPhase, XcalParams};

pub mod net;
pub use net::{Layer, LayerId, LayerKind, Network, ProjId, Projection, ProjectionSpec, Time};

pub mod config;
pub use config::{HipParams, HipPathways, ParamSet, PatParams, PathwayParams, RunParams, SimConfig, Vec2i};

pub mod hip;
pub use hip::{
    AlphaCycle, AlphaParams, CycleObserver, CycleRecorder, EpochSummary, HipTopology, MemStats, Protocol,
    TrialStats, UpdateCadence,
};

pub mod patterns;
pub use patterns::{PatternTable, Patterns, TrialPattern};

pub mod persist;
pub use persist::WeightsSnapshot;

pub mod sim;
pub use sim::{Phase, RunRecord, Simulation, TrialStep};
