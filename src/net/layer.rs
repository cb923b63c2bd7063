//! Layers - named populations of rate-coded units
//!
//! Each unit is a leaky integrator of excitatory conductance with a
//! thresholded saturating (XX1) output. Inhibition is feed-forward plus
//! feedback (FFFB), computed per layer and/or per unit pool.
//!
//! ## Activation snapshots
//!
//! | Variable | Captured |
//! |----------|----------|
//! | `act_q0` | start of trial (previous plus phase) |
//! | `act_q1` | end of quarter 0 |
//! | `act_q2` | end of quarter 1 |
//! | `act_m`  | end of quarter 2 (minus phase) |
//! | `act_p`  | end of quarter 3 (plus phase) |

use crate::error::{HipError, Result};
use crate::learn::{AvgLParams, AvgParams, PhaseActs, UnitAvgs};
use serde::{Deserialize, Serialize};

/// Role of a layer with respect to external input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    /// Hard-clamped to external input
    Input,
    /// Free running
    Hidden,
    /// Clamped to target in the plus phase only
    Target,
    /// Holds targets for statistics, never clamped
    Compare,
}

/// Geometry: a grid of pools, each a grid of units
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub pools_y: usize,
    pub pools_x: usize,
    pub units_y: usize,
    pub units_x: usize,
}

impl Shape {
    /// Plain 2D layer (a single pool)
    pub fn grid(y: usize, x: usize) -> Self {
        Self {
            pools_y: 1,
            pools_x: 1,
            units_y: y,
            units_x: x,
        }
    }

    /// 4D layer of `py x px` pools of `uy x ux` units
    pub fn pooled(py: usize, px: usize, uy: usize, ux: usize) -> Self {
        Self {
            pools_y: py,
            pools_x: px,
            units_y: uy,
            units_x: ux,
        }
    }

    pub fn n_pools(&self) -> usize {
        self.pools_y * self.pools_x
    }

    pub fn pool_size(&self) -> usize {
        self.units_y * self.units_x
    }

    pub fn len(&self) -> usize {
        self.n_pools() * self.pool_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the layer has more than one pool
    pub fn is_pooled(&self) -> bool {
        self.n_pools() > 1
    }

    pub fn dims(&self) -> Vec<usize> {
        if self.is_pooled() {
            vec![self.pools_y, self.pools_x, self.units_y, self.units_x]
        } else {
            vec![self.units_y, self.units_x]
        }
    }
}

/// Feed-forward / feedback inhibition
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FffbParams {
    pub on: bool,
    /// Overall inhibition gain
    pub gi: f32,
    /// Feed-forward gain on average net input
    pub ff: f32,
    /// Feedback gain on average activation
    pub fb: f32,
    /// Feedback integration time constant
    pub fb_tau: f32,
    /// Net input offset for feed-forward
    pub ff0: f32,
}

impl Default for FffbParams {
    fn default() -> Self {
        Self {
            on: true,
            gi: 1.8,
            ff: 1.0,
            fb: 1.0,
            fb_tau: 1.4,
            ff0: 0.1,
        }
    }
}

impl FffbParams {
    pub fn with_gi(gi: f32) -> Self {
        Self {
            gi,
            ..Default::default()
        }
    }

    pub fn off() -> Self {
        Self {
            on: false,
            ..Default::default()
        }
    }

    /// Update feedback state and return the inhibitory conductance
    fn gi(&self, avg_net: f32, avg_act: f32, fbi: &mut f32) -> f32 {
        let ffi = self.ff * (avg_net - self.ff0).max(0.0);
        *fbi += (self.fb * avg_act - *fbi) / self.fb_tau;
        self.gi * (ffi + *fbi)
    }
}

/// Expected activity level, used for input scaling
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActAvgParams {
    pub init: f32,
    /// Use `init` forever instead of tracking
    pub fixed: bool,
    /// Time constant in trials
    pub tau: f32,
    pub adjust: f32,
}

impl Default for ActAvgParams {
    fn default() -> Self {
        Self {
            init: 0.15,
            fixed: false,
            tau: 100.0,
            adjust: 1.0,
        }
    }
}

/// Layer and pool inhibition
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InhibParams {
    pub layer: FffbParams,
    pub pool: FffbParams,
    pub act_avg: ActAvgParams,
}

impl Default for InhibParams {
    fn default() -> Self {
        Self {
            layer: FffbParams::default(),
            pool: FffbParams::off(),
            act_avg: ActAvgParams::default(),
        }
    }
}

impl InhibParams {
    /// Layer-level inhibition only
    pub fn layer(gi: f32, act_avg: f32) -> Self {
        Self {
            layer: FffbParams::with_gi(gi),
            pool: FffbParams::off(),
            act_avg: ActAvgParams {
                init: act_avg,
                ..Default::default()
            },
        }
    }

    /// Pool-level inhibition only
    pub fn pools(gi: f32, act_avg: f32) -> Self {
        Self {
            layer: FffbParams::off(),
            pool: FffbParams::with_gi(gi),
            act_avg: ActAvgParams {
                init: act_avg,
                ..Default::default()
            },
        }
    }
}

/// Rate-code activation parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActParams {
    pub gbar_e: f32,
    pub gbar_l: f32,
    pub gbar_i: f32,
    pub erev_e: f32,
    pub erev_l: f32,
    pub erev_i: f32,
    /// Membrane threshold for firing
    pub thr: f32,
    /// XX1 gain
    pub gain: f32,
    /// Activation integration time constant
    pub act_tau: f32,
    /// Net input integration time constant
    pub g_tau: f32,
    /// Upper bound on clamped activations
    pub clamp_max: f32,
}

impl Default for ActParams {
    fn default() -> Self {
        Self {
            gbar_e: 1.0,
            gbar_l: 0.1,
            gbar_i: 1.0,
            erev_e: 1.0,
            erev_l: 0.3,
            erev_i: 0.25,
            thr: 0.5,
            gain: 100.0,
            act_tau: 3.3,
            g_tau: 1.4,
            clamp_max: 0.95,
        }
    }
}

impl ActParams {
    /// Excitatory conductance at which the unit sits at threshold
    #[inline]
    fn ge_thr(&self, gi: f32) -> f32 {
        let gi = gi * self.gbar_i;
        (gi * (self.erev_i - self.thr) + self.gbar_l * (self.erev_l - self.thr)) / (self.thr - self.erev_e)
    }

    /// Steady-state activation for given conductances
    #[inline]
    pub fn act_from_g(&self, ge: f32, gi: f32) -> f32 {
        let x = self.gain * (ge * self.gbar_e - self.ge_thr(gi));
        if x > 0.0 {
            x / (x + 1.0)
        } else {
            0.0
        }
    }
}

/// All per-layer parameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerParams {
    pub act: ActParams,
    pub inhib: InhibParams,
    pub avgs: AvgParams,
    pub avg_l: AvgLParams,
}

impl LayerParams {
    pub fn with_inhib(inhib: InhibParams) -> Self {
        Self {
            inhib,
            ..Default::default()
        }
    }
}

/// Named per-unit variable
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActVar {
    Act,
    ActQ0,
    ActQ1,
    ActQ2,
    ActM,
    ActP,
    Targ,
    Ext,
}

/// Per-unit state
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Unit {
    pub act: f32,
    /// Integrated excitatory conductance
    pub net: f32,
    /// Raw excitatory input this cycle
    pub ge_raw: f32,
    pub gi: f32,
    pub ext: f32,
    pub targ: f32,
    pub has_ext: bool,
    pub has_targ: bool,
    /// Activation last propagated to receivers
    pub act_sent: f32,
    pub act_q0: f32,
    pub act_q1: f32,
    pub act_q2: f32,
    pub act_m: f32,
    pub act_p: f32,
    pub avg_ss: f32,
    pub avg_s: f32,
    pub avg_m: f32,
    pub avg_l: f32,
    pub avg_l_lrn: f32,
}

impl Unit {
    pub fn get(&self, var: ActVar) -> f32 {
        match var {
            ActVar::Act => self.act,
            ActVar::ActQ0 => self.act_q0,
            ActVar::ActQ1 => self.act_q1,
            ActVar::ActQ2 => self.act_q2,
            ActVar::ActM => self.act_m,
            ActVar::ActP => self.act_p,
            ActVar::Targ => self.targ,
            ActVar::Ext => self.ext,
        }
    }

    #[inline]
    pub fn phase_acts(&self) -> PhaseActs {
        PhaseActs {
            act_q1: self.act_q1,
            act_q2: self.act_q2,
            act_m: self.act_m,
            act_p: self.act_p,
        }
    }

    #[inline]
    pub fn avgs(&self) -> UnitAvgs {
        UnitAvgs {
            avg_s: self.avg_s,
            avg_m: self.avg_m,
            avg_l: self.avg_l,
            avg_l_lrn: self.avg_l_lrn,
        }
    }
}

/// A population of units
#[derive(Clone, Debug)]
pub struct Layer {
    name: String,
    kind: LayerKind,
    shape: Shape,
    pub params: LayerParams,
    units: Vec<Unit>,
    off: bool,
    layer_fbi: f32,
    pool_fbi: Vec<f32>,
    act_m_avg: f32,
    act_p_avg: f32,
    act_p_avg_run: f32,
    act_p_avg_eff: f32,
    cos_diff: f32,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: LayerKind, shape: Shape, params: LayerParams) -> Self {
        let init = params.inhib.act_avg.init;
        let mut ly = Self {
            name: name.into(),
            kind,
            shape,
            params,
            units: vec![Unit::default(); shape.len()],
            off: false,
            layer_fbi: 0.0,
            pool_fbi: vec![0.0; shape.n_pools()],
            act_m_avg: 0.0,
            act_p_avg: init,
            act_p_avg_run: init,
            act_p_avg_eff: init,
            cos_diff: 0.0,
        };
        ly.init_acts();
        ly
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    /// Change the role; already-applied values move between `ext` and `targ`
    pub fn set_kind(&mut self, kind: LayerKind) {
        let was_targ = matches!(self.kind, LayerKind::Target | LayerKind::Compare);
        let to_targ = matches!(kind, LayerKind::Target | LayerKind::Compare);
        self.kind = kind;
        if was_targ == to_targ {
            return;
        }
        for u in self.units.iter_mut() {
            if to_targ && u.has_ext {
                u.targ = u.ext;
                u.has_targ = true;
                u.ext = 0.0;
                u.has_ext = false;
            } else if !to_targ && u.has_targ {
                u.ext = u.targ;
                u.has_ext = true;
                u.targ = 0.0;
                u.has_targ = false;
            }
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn is_off(&self) -> bool {
        self.off
    }

    pub fn set_off(&mut self, off: bool) {
        self.off = off;
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut [Unit] {
        &mut self.units
    }

    /// Values of one named variable for every unit
    pub fn values(&self, var: ActVar) -> Vec<f32> {
        self.units.iter().map(|u| u.get(var)).collect()
    }

    /// Pool index of a unit
    pub fn pool_of(&self, unit: usize) -> usize {
        unit / self.shape.pool_size().max(1)
    }

    /// Plus-phase average activation of the last trial
    pub fn act_p_avg(&self) -> f32 {
        self.act_p_avg
    }

    /// Minus-phase average activation of the current trial
    pub fn act_m_avg(&self) -> f32 {
        self.act_m_avg
    }

    /// Running plus-phase average used for input scaling
    pub fn act_p_avg_eff(&self) -> f32 {
        self.act_p_avg_eff
    }

    /// Mean-centered cosine between plus and minus phase
    pub fn cos_diff(&self) -> f32 {
        self.cos_diff
    }

    /// Reset all dynamic state
    pub fn init_acts(&mut self) {
        let avg_l = self.params.avg_l;
        for u in self.units.iter_mut() {
            *u = Unit {
                avg_ss: self.params.inhib.act_avg.init,
                avg_s: self.params.inhib.act_avg.init,
                avg_m: self.params.inhib.act_avg.init,
                avg_l: avg_l.init,
                avg_l_lrn: avg_l.init_lrn(),
                ..Default::default()
            };
        }
        let init = self.params.inhib.act_avg.init;
        self.act_p_avg = init;
        self.act_p_avg_run = init;
        self.act_p_avg_eff = init;
        self.act_m_avg = 0.0;
        self.cos_diff = 0.0;
        self.layer_fbi = 0.0;
        self.pool_fbi.iter_mut().for_each(|f| *f = 0.0);
    }

    /// Clear external input and targets
    pub fn init_ext(&mut self) {
        for u in self.units.iter_mut() {
            u.ext = 0.0;
            u.targ = 0.0;
            u.has_ext = false;
            u.has_targ = false;
        }
    }

    /// Apply external values: targets for Target/Compare layers, clamps otherwise
    pub fn apply_ext(&mut self, values: &[f32]) -> Result<()> {
        if values.len() != self.units.len() {
            return Err(HipError::ShapeMismatch {
                expected: self.shape.dims(),
                actual: vec![values.len()],
            });
        }
        let to_targ = matches!(self.kind, LayerKind::Target | LayerKind::Compare);
        for (u, &v) in self.units.iter_mut().zip(values) {
            if to_targ {
                u.targ = v;
                u.has_targ = true;
            } else {
                u.ext = v;
                u.has_ext = true;
            }
        }
        Ok(())
    }

    /// Trial start: remember the last plus phase and decay to rest
    pub(crate) fn alpha_cycle_init(&mut self) {
        for u in self.units.iter_mut() {
            u.act_q0 = u.act_p;
            u.act = 0.0;
            u.net = 0.0;
            u.ge_raw = 0.0;
            u.gi = 0.0;
            u.act_sent = 0.0;
        }
        self.layer_fbi = 0.0;
        self.pool_fbi.iter_mut().for_each(|f| *f = 0.0);
    }

    /// Integrate net input from this cycle's raw excitation
    pub(crate) fn update_net(&mut self) {
        let dt = 1.0 / self.params.act.g_tau;
        for u in self.units.iter_mut() {
            u.net += dt * (u.ge_raw - u.net);
        }
    }

    /// FFFB inhibition at layer and pool level
    pub(crate) fn inhibit(&mut self) {
        let inhib = self.params.inhib;
        let n = self.units.len().max(1) as f32;

        let mut layer_gi = 0.0;
        if inhib.layer.on {
            let avg_net = self.units.iter().map(|u| u.net).sum::<f32>() / n;
            let avg_act = self.units.iter().map(|u| u.act).sum::<f32>() / n;
            layer_gi = inhib.layer.gi(avg_net, avg_act, &mut self.layer_fbi);
        }

        let psize = self.shape.pool_size().max(1);
        for (p, fbi) in self.pool_fbi.iter_mut().enumerate() {
            let pool = &mut self.units[p * psize..(p + 1) * psize];
            let mut gi = layer_gi;
            if inhib.pool.on {
                let pn = pool.len().max(1) as f32;
                let avg_net = pool.iter().map(|u| u.net).sum::<f32>() / pn;
                let avg_act = pool.iter().map(|u| u.act).sum::<f32>() / pn;
                gi = gi.max(inhib.pool.gi(avg_net, avg_act, fbi));
            }
            for u in pool.iter_mut() {
                u.gi = gi;
            }
        }
    }

    /// Activation update, including hard clamps
    pub(crate) fn update_acts(&mut self, plus_phase: bool) {
        let act = self.params.act;
        let avgs = self.params.avgs;
        let clamp_targ = plus_phase && self.kind == LayerKind::Target;
        let dt = 1.0 / act.act_tau;
        for u in self.units.iter_mut() {
            if u.has_ext {
                u.act = u.ext.clamp(0.0, act.clamp_max);
            } else if clamp_targ && u.has_targ {
                u.act = u.targ.clamp(0.0, act.clamp_max);
            } else {
                let nw = act.act_from_g(u.net, u.gi);
                u.act += dt * (nw - u.act);
            }
            avgs.update(u.act, &mut u.avg_ss, &mut u.avg_s, &mut u.avg_m);
        }
    }

    /// Capture the snapshot belonging to the quarter that just ended
    pub(crate) fn finalize_quarter(&mut self, quarter: usize) {
        for u in self.units.iter_mut() {
            match quarter {
                0 => u.act_q1 = u.act,
                1 => u.act_q2 = u.act,
                2 => u.act_m = u.act,
                _ => u.act_p = u.act,
            }
        }
        let n = self.units.len().max(1) as f32;
        match quarter {
            2 => {
                self.act_m_avg = self.units.iter().map(|u| u.act_m).sum::<f32>() / n;
            }
            3 => {
                self.act_p_avg = self.units.iter().map(|u| u.act_p).sum::<f32>() / n;
                let aa = self.params.inhib.act_avg;
                if aa.fixed {
                    self.act_p_avg_eff = aa.init;
                } else {
                    self.act_p_avg_run += (self.act_p_avg - self.act_p_avg_run) / aa.tau;
                    self.act_p_avg_eff = aa.adjust * self.act_p_avg_run;
                }
                self.cos_diff = self.cos_diff_from_acts();
                let avg_l = self.params.avg_l;
                for u in self.units.iter_mut() {
                    avg_l.update(u.avg_m, &mut u.avg_l, &mut u.avg_l_lrn);
                }
            }
            _ => {}
        }
    }

    fn cos_diff_from_acts(&self) -> f32 {
        let n = self.units.len().max(1) as f32;
        let avg_p = self.units.iter().map(|u| u.act_p).sum::<f32>() / n;
        let avg_m = self.units.iter().map(|u| u.act_m).sum::<f32>() / n;
        let (mut cos, mut ssm, mut ssp) = (0.0f32, 0.0f32, 0.0f32);
        for u in &self.units {
            let ap = u.act_p - avg_p;
            let am = u.act_m - avg_m;
            cos += ap * am;
            ssm += am * am;
            ssp += ap * ap;
        }
        let dist = (ssm * ssp).sqrt();
        if dist > 0.0 {
            cos / dist
        } else {
            0.0
        }
    }

    /// Test hook: overwrite plus-phase activations and the derived average
    #[cfg(test)]
    pub(crate) fn force_plus_phase(&mut self, act_p: f32) {
        for u in self.units.iter_mut() {
            u.act_p = act_p;
        }
        self.act_p_avg = act_p;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ec_layer(kind: LayerKind) -> Layer {
        Layer::new("EC", kind, Shape::pooled(1, 2, 2, 2), LayerParams::with_inhib(InhibParams::pools(2.0, 0.2)))
    }

    #[test]
    fn test_shape() {
        let s = Shape::pooled(2, 3, 7, 7);
        assert_eq!(s.len(), 294);
        assert_eq!(s.n_pools(), 6);
        assert_eq!(s.dims(), vec![2, 3, 7, 7]);
        assert_eq!(Shape::grid(20, 20).dims(), vec![20, 20]);
    }

    #[test]
    fn test_apply_ext_routes_by_kind() {
        let mut ly = ec_layer(LayerKind::Target);
        ly.apply_ext(&[1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        assert!(ly.units().iter().all(|u| u.has_targ && !u.has_ext));
        assert_eq!(ly.values(ActVar::Targ)[2], 1.0);

        let mut ly = ec_layer(LayerKind::Hidden);
        ly.apply_ext(&[0.5; 8]).unwrap();
        assert!(ly.units().iter().all(|u| u.has_ext));
    }

    #[test]
    fn test_apply_ext_shape_mismatch() {
        let mut ly = ec_layer(LayerKind::Input);
        let err = ly.apply_ext(&[1.0; 3]).unwrap_err();
        assert!(matches!(err, HipError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_set_kind_moves_applied_values() {
        let mut ly = ec_layer(LayerKind::Target);
        ly.apply_ext(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        ly.set_kind(LayerKind::Compare);
        assert!(ly.units()[0].has_targ, "target-like kinds keep targ");
        ly.set_kind(LayerKind::Input);
        assert!(ly.units()[0].has_ext && !ly.units()[0].has_targ);
        assert_eq!(ly.values(ActVar::Ext)[7], 1.0);
        ly.set_kind(LayerKind::Target);
        assert_eq!(ly.values(ActVar::Targ)[7], 1.0);
    }

    #[test]
    fn test_target_clamps_only_in_plus_phase() {
        let mut ly = ec_layer(LayerKind::Target);
        ly.apply_ext(&[1.0; 8]).unwrap();
        ly.update_acts(false);
        assert!(ly.units().iter().all(|u| u.act == 0.0), "no clamp in minus phase");
        ly.update_acts(true);
        assert!(ly.units().iter().all(|u| (u.act - 0.95).abs() < 1e-6));

        let mut cmp = ec_layer(LayerKind::Compare);
        cmp.apply_ext(&[1.0; 8]).unwrap();
        cmp.update_acts(true);
        assert!(cmp.units().iter().all(|u| u.act == 0.0), "compare never clamps");
    }

    #[test]
    fn test_act_from_g_threshold() {
        let a = ActParams::default();
        assert_eq!(a.act_from_g(0.0, 0.0), 0.0);
        assert!(a.act_from_g(0.5, 0.0) > 0.9);
        assert!(a.act_from_g(0.5, 2.0) < a.act_from_g(0.5, 0.5), "inhibition lowers output");
    }

    #[test]
    fn test_finalize_quarter_snapshots() {
        let mut ly = ec_layer(LayerKind::Hidden);
        for (q, v) in [(0, 0.1), (1, 0.2), (2, 0.3), (3, 0.4)] {
            ly.units_mut().iter_mut().for_each(|u| u.act = v);
            ly.finalize_quarter(q);
        }
        let u = ly.units()[0];
        assert_eq!((u.act_q1, u.act_q2, u.act_m, u.act_p), (0.1, 0.2, 0.3, 0.4));
        assert!((ly.act_p_avg() - 0.4).abs() < 1e-6);
        assert!((ly.act_m_avg() - 0.3).abs() < 1e-6);
        assert!(ly.act_p_avg_eff() > 0.2, "running average moves toward 0.4");
    }

    #[test]
    fn test_pool_inhibition_is_local() {
        let mut ly = ec_layer(LayerKind::Hidden);
        for (i, u) in ly.units_mut().iter_mut().enumerate() {
            u.net = if i < 4 { 1.0 } else { 0.0 };
        }
        ly.inhibit();
        assert!(ly.units()[0].gi > 0.0);
        assert_eq!(ly.units()[7].gi, 0.0);
        assert_eq!(ly.pool_of(5), 1);
    }
}
