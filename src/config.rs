//! Experiment configuration
//!
//! Typed, serde-backed parameter blocks. Every block has a `Default` that
//! carries the standard experiment values and a `validate()` that rejects
//! values the simulation cannot run with.
//!
//! ## Blocks
//!
//! | Block | Controls |
//! |-------|----------|
//! | [`HipParams`] | layer geometry, sparse connectivity, mossy-fiber deltas |
//! | [`HipPathways`] | per-pathway CHL mix, sending-average correction, learning rate |
//! | [`PatParams`] | list size and overlap of generated patterns |
//! | [`RunParams`] | seeds, epochs, cycles per quarter, memory threshold |
//! | [`SimConfig`] | all of the above, loadable from JSON |

use crate::error::{HipError, Result};
use crate::learn::{ChlParams, MinusPhase};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Two-dimensional size, rows then columns
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vec2i {
    pub y: usize,
    pub x: usize,
}

impl Vec2i {
    pub const fn new(y: usize, x: usize) -> Self {
        Self { y, x }
    }

    pub fn len(&self) -> usize {
        self.y * self.x
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hippocampal geometry and pathway strengths
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HipParams {
    /// Pools in each EC layer
    pub ec_size: Vec2i,
    /// Units per EC pool
    pub ec_pool: Vec2i,
    /// Units per CA1 pool (one CA1 pool per EC pool)
    pub ca1_pool: Vec2i,
    pub ca3_size: Vec2i,
    /// DG size relative to CA3, per dimension
    pub dg_ratio: f32,
    pub dg_pcon: f32,
    pub ca3_pcon: f32,
    pub mossy_pcon: f32,
    /// Fraction of EC units active in a pattern
    pub ec_pct_act: f32,
    /// Mossy relative-scale reduction during the first quarter
    pub mossy_del: f32,
    /// Mossy relative-scale reduction during test recall
    pub mossy_del_test: f32,
    pub cortex_size: Vec2i,
    /// Units per autoencoder hidden pool
    pub autohid_pool: Vec2i,
    pub pathways: HipPathways,
}

impl Default for HipParams {
    fn default() -> Self {
        Self {
            ec_size: Vec2i::new(2, 3),
            ec_pool: Vec2i::new(7, 7),
            ca1_pool: Vec2i::new(10, 10),
            ca3_size: Vec2i::new(20, 20),
            dg_ratio: 1.5,
            dg_pcon: 0.25,
            ca3_pcon: 0.25,
            mossy_pcon: 0.02,
            ec_pct_act: 0.2,
            mossy_del: 4.0,
            mossy_del_test: 3.0,
            cortex_size: Vec2i::new(20, 20),
            autohid_pool: Vec2i::new(15, 15),
            pathways: HipPathways::default(),
        }
    }
}

impl HipParams {
    /// Scaled-down geometry for quick experiments and tests
    pub fn small() -> Self {
        Self {
            ec_size: Vec2i::new(2, 3),
            ec_pool: Vec2i::new(3, 3),
            ca1_pool: Vec2i::new(3, 3),
            ca3_size: Vec2i::new(6, 6),
            mossy_pcon: 0.1,
            ec_pct_act: 0.34,
            cortex_size: Vec2i::new(5, 5),
            autohid_pool: Vec2i::new(3, 3),
            ..Default::default()
        }
    }

    /// DG dimensions derived from CA3 and `dg_ratio`
    pub fn dg_size(&self) -> Vec2i {
        Vec2i::new(
            (self.ca3_size.y as f32 * self.dg_ratio) as usize,
            (self.ca3_size.x as f32 * self.dg_ratio) as usize,
        )
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("ec_size", self.ec_size),
            ("ec_pool", self.ec_pool),
            ("ca1_pool", self.ca1_pool),
            ("ca3_size", self.ca3_size),
            ("cortex_size", self.cortex_size),
            ("autohid_pool", self.autohid_pool),
        ] {
            if v.is_empty() {
                return Err(HipError::Config(format!("{} must be non-empty, got {}x{}", name, v.y, v.x)));
            }
        }
        if self.dg_size().is_empty() {
            return Err(HipError::Config(format!("dg_ratio {} leaves DG empty", self.dg_ratio)));
        }
        for (name, v) in [
            ("dg_pcon", self.dg_pcon),
            ("ca3_pcon", self.ca3_pcon),
            ("mossy_pcon", self.mossy_pcon),
            ("ec_pct_act", self.ec_pct_act),
        ] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(HipError::Config(format!("{} {} outside (0, 1]", name, v)));
            }
        }
        if self.mossy_del < 0.0 || self.mossy_del_test < 0.0 {
            return Err(HipError::Config("mossy deltas must be non-negative".into()));
        }
        self.pathways.validate()
    }
}

/// Learning settings for one CHL pathway
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathwayParams {
    /// Hebbian share of the delta; the error share is `1 - hebb`
    pub hebb: f32,
    pub savg_cor: f32,
    pub savg_thr: f32,
    pub minus: MinusPhase,
    pub lrate: f32,
    pub norm: bool,
    pub momentum: bool,
}

impl Default for PathwayParams {
    fn default() -> Self {
        let chl = ChlParams::default();
        Self {
            hebb: chl.hebb(),
            savg_cor: chl.savg_cor,
            savg_thr: chl.savg_thr,
            minus: chl.minus,
            lrate: 0.1,
            norm: false,
            momentum: false,
        }
    }
}

impl PathwayParams {
    /// Pure error-driven learning against the quarter-1 snapshot
    pub fn encoder(lrate: f32) -> Self {
        let chl = ChlParams::encoder();
        Self {
            hebb: chl.hebb(),
            minus: chl.minus,
            lrate,
            ..Default::default()
        }
    }

    pub fn chl(&self) -> ChlParams {
        let mut p = ChlParams::with_hebb(self.hebb)
            .savg_cor(self.savg_cor)
            .minus_phase(self.minus);
        p.savg_thr = self.savg_thr;
        p
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        for (field, v) in [("hebb", self.hebb), ("savg_cor", self.savg_cor), ("savg_thr", self.savg_thr)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(HipError::Config(format!("{}.{} {} outside [0, 1]", name, field, v)));
            }
        }
        if !(self.lrate.is_finite() && self.lrate >= 0.0) {
            return Err(HipError::Config(format!("{}.lrate {} must be finite and non-negative", name, self.lrate)));
        }
        Ok(())
    }
}

/// Per-pathway learning for the hippocampal circuit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HipPathways {
    /// ECin -> CA1, CA1 -> ECout and ECout -> CA1
    pub ec_ca1: PathwayParams,
    /// ECin -> DG
    pub dg: PathwayParams,
    /// ECin -> CA3
    pub perforant: PathwayParams,
    /// CA3 -> CA3
    pub ca3_recurrent: PathwayParams,
    /// CA3 -> CA1; the retrieval-practice set overrides `minus` with Q2
    pub schaffer: PathwayParams,
    /// DG -> CA3, built with learning off
    pub mossy: PathwayParams,
}

impl Default for HipPathways {
    fn default() -> Self {
        Self {
            ec_ca1: PathwayParams::encoder(0.04),
            dg: PathwayParams {
                hebb: 0.2,
                savg_cor: 0.1,
                minus: MinusPhase::Q1,
                ..Default::default()
            },
            perforant: PathwayParams::encoder(0.15),
            ca3_recurrent: PathwayParams::encoder(0.05),
            schaffer: PathwayParams {
                hebb: 0.01,
                lrate: 0.05,
                ..Default::default()
            },
            mossy: PathwayParams {
                hebb: 0.01,
                ..Default::default()
            },
        }
    }
}

impl HipPathways {
    pub fn validate(&self) -> Result<()> {
        for (name, p) in [
            ("ec_ca1", &self.ec_ca1),
            ("dg", &self.dg),
            ("perforant", &self.perforant),
            ("ca3_recurrent", &self.ca3_recurrent),
            ("schaffer", &self.schaffer),
            ("mossy", &self.mossy),
        ] {
            p.validate(name)?;
        }
        Ok(())
    }
}

/// Named parameter overlays applied at network build time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamSet {
    #[default]
    Base,
    /// CA3 -> CA1 learns against the quarter-2 snapshot
    RetrievalPractice,
}

impl ParamSet {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "base" => Some(ParamSet::Base),
            "rp" | "retrieval-practice" => Some(ParamSet::RetrievalPractice),
            _ => None,
        }
    }
}

/// Pattern generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatParams {
    /// Items per list
    pub list_size: usize,
    /// Minimum pairwise difference between item pools, as a fraction of active bits
    pub min_diff_pct: f32,
    /// Drift contexts item to item instead of flipping bits off a prototype
    pub drift_ctxt: bool,
    /// Fraction of active bits flipped per context pattern
    pub ctxt_flip_pct: f32,
    /// Fraction of active bits that move per drift step
    pub drift_pct: f32,
}

impl Default for PatParams {
    fn default() -> Self {
        Self {
            list_size: 30,
            min_diff_pct: 0.5,
            drift_ctxt: false,
            ctxt_flip_pct: 0.5,
            drift_pct: 0.2,
        }
    }
}

impl PatParams {
    pub fn validate(&self) -> Result<()> {
        if self.list_size == 0 {
            return Err(HipError::Config("list_size must be positive".into()));
        }
        for (name, v) in [
            ("min_diff_pct", self.min_diff_pct),
            ("ctxt_flip_pct", self.ctxt_flip_pct),
            ("drift_pct", self.drift_pct),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(HipError::Config(format!("{} {} outside [0, 1]", name, v)));
            }
        }
        Ok(())
    }
}

/// Run control and statistics thresholds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParams {
    /// Base seed; run `n` uses `seed + n`
    pub seed: u64,
    pub runs: usize,
    pub max_epochs: usize,
    /// Stop after this many consecutive perfect test epochs; 0 disables
    pub n_zero_stop: usize,
    pub pre_train_epochs: usize,
    pub ae_train_epochs: usize,
    /// Test every N training epochs
    pub test_interval: Option<usize>,
    pub cyc_per_qtr: usize,
    /// Error rate below which a trial counts as remembered
    pub mem_thr: f64,
    /// Leading output pools scored for memory; 0 scores every unit
    pub mem_pools: usize,
    /// Silence the cortical route into Output
    pub hip_only: bool,
    pub param_set: ParamSet,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            seed: 2,
            runs: 10,
            max_epochs: 30,
            n_zero_stop: 1,
            pre_train_epochs: 3,
            ae_train_epochs: 3,
            test_interval: None,
            cyc_per_qtr: 25,
            mem_thr: 0.34,
            mem_pools: 2,
            hip_only: false,
            param_set: ParamSet::Base,
        }
    }
}

impl RunParams {
    pub fn validate(&self) -> Result<()> {
        if self.cyc_per_qtr == 0 {
            return Err(HipError::Config("cyc_per_qtr must be positive".into()));
        }
        if !(self.mem_thr > 0.0 && self.mem_thr <= 1.0) {
            return Err(HipError::Config(format!("mem_thr {} outside (0, 1]", self.mem_thr)));
        }
        if self.test_interval == Some(0) {
            return Err(HipError::Config("test_interval must be positive when set".into()));
        }
        Ok(())
    }
}

/// Complete simulation configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub hip: HipParams,
    pub pat: PatParams,
    pub run: RunParams,
}

impl SimConfig {
    /// Small network, short runs
    pub fn small() -> Self {
        Self {
            hip: HipParams::small(),
            pat: PatParams {
                list_size: 4,
                min_diff_pct: 0.3,
                ..Default::default()
            },
            run: RunParams {
                runs: 1,
                max_epochs: 3,
                pre_train_epochs: 1,
                ae_train_epochs: 1,
                cyc_per_qtr: 10,
                ..Default::default()
            },
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: SimConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.hip.validate()?;
        self.pat.validate()?;
        self.run.validate()
    }
}
