//! # Learning Rules
//!
//! Per-pathway synaptic learning, selected at construction time.
//!
//! ## Rules
//!
//! | Rule | Used by | Minus phase |
//! |------|---------|-------------|
//! | `Standard` (XCAL) | cortex, autoencoder | running averages |
//! | `ContrastiveHebbian` | DG, CA3, CA1 and EC <-> CA1 pathways | ActM / Q1 / Q2 |
//!
//! ## Pipeline
//!
//! 1. Rule computes a raw per-synapse delta
//! 2. [`LearnParams::accumulate`] normalizes, adds momentum, scales by lrate
//! 3. [`LearnParams::apply`] folds the delta into the linear weight at the
//!    start of the next trial

mod chl;
mod shape;
mod xcal;

pub use chl::{ChlParams, MinusPhase, PhaseActs};
pub use shape::{LearnParams, MomentumParams, NormParams, WtSigParams};
pub use xcal::{AvgLParams, AvgParams, UnitAvgs, XcalParams};

use serde::{Deserialize, Serialize};

/// Learning rule of a pathway
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum LearningRule {
    /// Default error-driven rule
    Standard(XcalParams),
    /// Contrastive Hebbian learning
    ContrastiveHebbian(ChlParams),
}

impl Default for LearningRule {
    fn default() -> Self {
        LearningRule::Standard(XcalParams::default())
    }
}

impl LearningRule {
    /// CHL with the given Hebbian mix
    pub fn chl(hebb: f32) -> Self {
        LearningRule::ContrastiveHebbian(ChlParams::with_hebb(hebb))
    }

    pub fn is_chl(&self) -> bool {
        matches!(self, LearningRule::ContrastiveHebbian(_))
    }

    pub fn chl_params(&self) -> Option<&ChlParams> {
        match self {
            LearningRule::ContrastiveHebbian(p) => Some(p),
            LearningRule::Standard(_) => None,
        }
    }

    pub fn chl_params_mut(&mut self) -> Option<&mut ChlParams> {
        match self {
            LearningRule::ContrastiveHebbian(p) => Some(p),
            LearningRule::Standard(_) => None,
        }
    }

    /// CHL bounds its own terms; only the standard rule bounds at application
    pub fn soft_bound_on_apply(&self) -> bool {
        !self.is_chl()
    }
}
