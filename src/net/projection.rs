//! Projections - synapses between two layers
//!
//! Synapses are stored sender-major (CSR): `send_start[s]..send_start[s] +
//! send_n[s]` indexes both `recv_idx` and `syns`. Net input is propagated
//! as activation deltas from senders into the per-receiver `g_inc`
//! accumulator, scaled by the cached `g_scale`; a change of `WtScale`
//! therefore only takes effect once the network recomputes input scaling.

use super::connect::Pattern;
use super::layer::Layer;
use super::LayerId;
use crate::error::Result;
use crate::learn::{LearnParams, LearningRule};
use crate::synapse::Synapse;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Multipliers on a projection's contribution to receiver input
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WtScale {
    /// Absolute multiplier
    pub abs: f32,
    /// Relative share among the receiver's projections
    pub rel: f32,
}

impl Default for WtScale {
    fn default() -> Self {
        Self { abs: 1.0, rel: 1.0 }
    }
}

impl WtScale {
    /// Sender activity normalization: expected number of active senders
    pub fn send_act_scale(savg: f32, snu: f32, ncon: f32) -> f32 {
        const SEM_EXTRA: usize = 2;
        let ncon = ncon.max(1.0);
        let slay_act_n = ((savg * snu).round() as usize).max(1);
        if ncon == snu {
            return 1.0 / slay_act_n as f32;
        }
        let max_act_n = (ncon as usize).min(slay_act_n);
        let avg_act_n = ((savg * ncon).round() as usize).max(1);
        let exp_act_n = (avg_act_n + SEM_EXTRA).min(max_act_n).max(1);
        1.0 / exp_act_n as f32
    }
}

/// Initial weight distribution, uniform in `mean +/- var`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WtInit {
    pub mean: f32,
    pub var: f32,
}

impl Default for WtInit {
    fn default() -> Self {
        Self { mean: 0.5, var: 0.25 }
    }
}

impl WtInit {
    pub fn fixed(mean: f32) -> Self {
        Self { mean, var: 0.0 }
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> f32 {
        if self.var == 0.0 {
            return self.mean;
        }
        (self.mean + self.var * (2.0 * rng.gen::<f32>() - 1.0)).clamp(0.0, 1.0)
    }
}

/// Everything needed to construct a projection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSpec {
    pub pattern: Pattern,
    pub wt_scale: WtScale,
    pub wt_init: WtInit,
    pub learn: bool,
    pub rule: LearningRule,
    pub params: LearnParams,
}

impl Default for ProjectionSpec {
    fn default() -> Self {
        Self {
            pattern: Pattern::Full,
            wt_scale: WtScale::default(),
            wt_init: WtInit::default(),
            learn: true,
            rule: LearningRule::default(),
            params: LearnParams::default(),
        }
    }
}

impl ProjectionSpec {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            ..Default::default()
        }
    }

    /// Non-learning projection with fixed weights
    ///
    /// The learning rate is zero as well, so a protocol that switches
    /// `learn` on for its pathway group leaves these weights untouched.
    pub fn fixed(pattern: Pattern, wt: f32) -> Self {
        Self {
            pattern,
            wt_init: WtInit::fixed(wt),
            learn: false,
            params: LearnParams::with_lrate(0.0),
            ..Default::default()
        }
    }

    pub fn rule(mut self, rule: LearningRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn learn(mut self, on: bool) -> Self {
        self.learn = on;
        self
    }

    pub fn lrate(mut self, lrate: f32) -> Self {
        self.params.lrate = lrate;
        self
    }

    pub fn abs(mut self, abs: f32) -> Self {
        self.wt_scale.abs = abs;
        self
    }

    pub fn rel(mut self, rel: f32) -> Self {
        self.wt_scale.rel = rel;
        self
    }

    pub fn init(mut self, mean: f32, var: f32) -> Self {
        self.wt_init = WtInit { mean, var };
        self
    }

    /// Turn off normalization and momentum
    pub fn plain(mut self) -> Self {
        self.params.norm.on = false;
        self.params.momentum.on = false;
        self
    }
}

/// Synapses from one layer into another
#[derive(Clone, Debug)]
pub struct Projection {
    name: String,
    send: LayerId,
    recv: LayerId,
    pub wt_scale: WtScale,
    pub wt_init: WtInit,
    pub learn: bool,
    pub rule: LearningRule,
    pub params: LearnParams,
    send_start: Vec<usize>,
    send_n: Vec<usize>,
    recv_idx: Vec<usize>,
    syns: Vec<Synapse>,
    recv_con_n: Vec<usize>,
    g_scale: f32,
    g_inc: Vec<f32>,
}

impl Projection {
    pub(crate) fn build<R: Rng>(
        name: String,
        send: (LayerId, &Layer),
        recv: (LayerId, &Layer),
        spec: ProjectionSpec,
        rng: &mut R,
    ) -> Result<Self> {
        let cons = spec.pattern.connect(send.1.shape(), recv.1.shape(), rng)?;
        let mut send_start = Vec::with_capacity(cons.len());
        let mut send_n = Vec::with_capacity(cons.len());
        let mut recv_idx = Vec::new();
        let mut recv_con_n = vec![0; recv.1.len()];
        for c in &cons {
            send_start.push(recv_idx.len());
            send_n.push(c.len());
            for &ri in c {
                recv_con_n[ri] += 1;
            }
            recv_idx.extend_from_slice(c);
        }
        let mut params = spec.params;
        params.wt_sig.soft_bound = spec.rule.soft_bound_on_apply();
        Ok(Self {
            name,
            send: send.0,
            recv: recv.0,
            wt_scale: spec.wt_scale,
            wt_init: spec.wt_init,
            learn: spec.learn,
            rule: spec.rule,
            params,
            send_start,
            send_n,
            syns: vec![Synapse::default(); recv_idx.len()],
            recv_idx,
            recv_con_n,
            g_scale: 1.0,
            g_inc: vec![0.0; recv.1.len()],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send(&self) -> LayerId {
        self.send
    }

    pub fn recv(&self) -> LayerId {
        self.recv
    }

    pub fn syns(&self) -> &[Synapse] {
        &self.syns
    }

    pub fn syns_mut(&mut self) -> &mut [Synapse] {
        &mut self.syns
    }

    pub fn len(&self) -> usize {
        self.syns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syns.is_empty()
    }

    /// Synapse index range of one sending unit
    pub fn send_range(&self, si: usize) -> Range<usize> {
        self.send_start[si]..self.send_start[si] + self.send_n[si]
    }

    /// Receiving unit of a synapse index
    pub fn recv_index(&self, k: usize) -> usize {
        self.recv_idx[k]
    }

    /// Most connections any receiving unit has
    pub fn max_recv_con(&self) -> usize {
        self.recv_con_n.iter().copied().max().unwrap_or(0)
    }

    /// Cached input-scaling coefficient
    pub fn g_scale(&self) -> f32 {
        self.g_scale
    }

    pub(crate) fn set_g_scale(&mut self, g: f32) {
        self.g_scale = g;
    }

    pub(crate) fn g_inc(&self) -> &[f32] {
        &self.g_inc
    }

    pub(crate) fn init_g_inc(&mut self) {
        self.g_inc.iter_mut().for_each(|g| *g = 0.0);
    }

    /// Propagate a sender's activation change to its receivers
    #[inline]
    pub(crate) fn send_delta(&mut self, si: usize, delta: f32) {
        let scaled = self.g_scale * delta;
        for k in self.send_range(si) {
            self.g_inc[self.recv_idx[k]] += scaled * self.syns[k].wt;
        }
    }

    /// Draw initial weights
    pub fn init_weights<R: Rng>(&mut self, rng: &mut R) {
        let sig = self.params.wt_sig;
        for sy in self.syns.iter_mut() {
            let wt = self.wt_init.sample(rng);
            *sy = Synapse::new(wt, sig.lin_from_sig(wt));
        }
    }

    /// Re-derive effective weights after linear weights were loaded
    pub fn refresh_effective(&mut self) {
        let sig = self.params.wt_sig;
        for sy in self.syns.iter_mut() {
            sy.wt = sig.sig_from_lin(sy.lwt);
        }
    }

    /// Fold pending deltas into linear and effective weights
    ///
    /// Runs regardless of `learn`: the flag may have been lowered since the
    /// deltas were accumulated.
    pub fn wt_from_dwt(&mut self) {
        let params = self.params;
        for sy in self.syns.iter_mut() {
            params.apply(sy);
        }
    }

    /// Accumulate this trial's deltas
    pub fn dwt(&mut self, send: &Layer, recv: &Layer) {
        if !self.learn || send.is_off() || recv.is_off() {
            return;
        }
        match self.rule {
            LearningRule::ContrastiveHebbian(chl) => {
                if send.act_p_avg() < chl.savg_thr {
                    return;
                }
                let savg_cor = chl.savg_correction(send.act_p_avg_eff());
                let (sus, rus) = (send.units(), recv.units());
                for si in 0..self.send_n.len() {
                    let sa = sus[si].phase_acts();
                    let range = self.send_range(si);
                    for k in range.clone() {
                        let ra = rus[self.recv_idx[k]].phase_acts();
                        let raw = chl.synapse_dwt(&sa, &ra, savg_cor, self.syns[k].lwt);
                        self.params.accumulate(&mut self.syns[k], raw);
                    }
                    self.share_norm(range);
                }
            }
            LearningRule::Standard(xcal) => {
                let (sus, rus) = (send.units(), recv.units());
                for si in 0..self.send_n.len() {
                    let sa = sus[si].avgs();
                    let range = self.send_range(si);
                    for k in range.clone() {
                        let ra = rus[self.recv_idx[k]].avgs();
                        let raw = xcal.synapse_dwt(&sa, &ra);
                        self.params.accumulate(&mut self.syns[k], raw);
                    }
                    self.share_norm(range);
                }
            }
        }
    }

    /// Broadcast the largest norm of a sender's synapses to all of them
    fn share_norm(&mut self, range: Range<usize>) {
        if !self.params.norm.on || range.is_empty() {
            return;
        }
        let syns = &mut self.syns[range];
        let max = syns.iter().fold(0.0f32, |m, sy| m.max(sy.norm));
        for sy in syns.iter_mut() {
            sy.norm = max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::{ChlParams, MomentumParams, NormParams};
    use crate::net::layer::{LayerKind, LayerParams, Shape};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layers() -> (Layer, Layer) {
        let s = Layer::new("S", LayerKind::Hidden, Shape::grid(1, 4), LayerParams::default());
        let r = Layer::new("R", LayerKind::Hidden, Shape::grid(1, 3), LayerParams::default());
        (s, r)
    }

    fn chl_prjn(s: &Layer, r: &Layer, spec: ProjectionSpec) -> Projection {
        let mut rng = StdRng::seed_from_u64(3);
        let mut p = Projection::build("SToR".into(), (LayerId(0), s), (LayerId(1), r), spec, &mut rng).unwrap();
        p.init_weights(&mut rng);
        p
    }

    fn set_phases(ly: &mut Layer, m: f32, p: f32) {
        for u in ly.units_mut() {
            u.act_q1 = m;
            u.act_q2 = m;
            u.act_m = m;
            u.act_p = p;
        }
    }

    #[test]
    fn test_send_act_scale() {
        // Full connectivity: 1 / expected active senders
        assert!((WtScale::send_act_scale(0.25, 8.0, 8.0) - 0.5).abs() < 1e-6);
        // Sparse: expected active among connections, plus slack
        let sc = WtScale::send_act_scale(0.02, 400.0, 100.0);
        assert!((sc - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_build_counts() {
        let (s, r) = layers();
        let p = chl_prjn(&s, &r, ProjectionSpec::new(Pattern::Full));
        assert_eq!(p.len(), 12);
        assert_eq!(p.max_recv_con(), 4);
        assert_eq!(p.send_range(2), 6..9);
        assert_eq!(p.recv_index(7), 1);
    }

    #[test]
    fn test_chl_disables_apply_soft_bound() {
        let (s, r) = layers();
        let p = chl_prjn(&s, &r, ProjectionSpec::new(Pattern::Full).rule(LearningRule::chl(0.01)));
        assert!(!p.params.wt_sig.soft_bound);
        let p = chl_prjn(&s, &r, ProjectionSpec::new(Pattern::Full));
        assert!(p.params.wt_sig.soft_bound);
    }

    #[test]
    fn test_skip_below_savg_thr() {
        let (mut s, mut r) = layers();
        set_phases(&mut r, 0.2, 0.9);
        set_phases(&mut s, 0.0, 0.0);
        s.force_plus_phase(0.0005);
        let mut p = chl_prjn(&s, &r, ProjectionSpec::new(Pattern::Full).rule(LearningRule::chl(0.5)));
        p.dwt(&s, &r);
        assert!(p.syns().iter().all(|sy| sy.dwt == 0.0), "sender below threshold must not learn");

        s.force_plus_phase(0.8);
        p.dwt(&s, &r);
        assert!(p.syns().iter().any(|sy| sy.dwt != 0.0));
    }

    #[test]
    fn test_no_learning_when_disabled() {
        let (mut s, mut r) = layers();
        set_phases(&mut s, 0.1, 0.9);
        set_phases(&mut r, 0.1, 0.9);
        let mut p = chl_prjn(&s, &r, ProjectionSpec::fixed(Pattern::Full, 0.5).rule(LearningRule::chl(0.1)));
        p.dwt(&s, &r);
        assert!(p.syns().iter().all(|sy| sy.dwt == 0.0));
        s.force_plus_phase(0.9);
        p.dwt(&s, &r);
        assert!(p.syns().iter().all(|sy| sy.dwt == 0.0));
    }

    #[test]
    fn test_fixed_stays_frozen_when_learn_raised() {
        let (mut s, mut r) = layers();
        set_phases(&mut s, 0.1, 0.9);
        set_phases(&mut r, 0.1, 0.9);
        s.force_plus_phase(0.9);
        let mut p = chl_prjn(&s, &r, ProjectionSpec::fixed(Pattern::Full, 0.5).rule(LearningRule::chl(0.1)));
        p.learn = true;
        let before: Vec<f32> = p.syns().iter().map(|sy| sy.lwt).collect();
        p.dwt(&s, &r);
        p.wt_from_dwt();
        let after: Vec<f32> = p.syns().iter().map(|sy| sy.lwt).collect();
        assert_eq!(before, after, "fixed weights must not move even with learn on");
    }

    #[test]
    fn test_norm_shared_per_sender() {
        let (mut s, mut r) = layers();
        set_phases(&mut s, 0.2, 0.9);
        s.force_plus_phase(0.9);
        set_phases(&mut r, 0.1, 0.7);
        r.units_mut()[0].act_p = 0.1;
        let spec = ProjectionSpec::new(Pattern::Full).rule(LearningRule::chl(0.3));
        let mut p = chl_prjn(&s, &r, spec);
        p.dwt(&s, &r);
        for si in 0..4 {
            let norms: Vec<f32> = p.syns()[p.send_range(si)].iter().map(|sy| sy.norm).collect();
            assert!(norms.iter().all(|&n| n == norms[0]), "sender {} norms differ: {:?}", si, norms);
            assert!(norms[0] > 0.0);
        }
    }

    #[test]
    fn test_soft_bound_holds_under_extremes() {
        let (mut s, mut r) = layers();
        let mut spec = ProjectionSpec::new(Pattern::Full).rule(LearningRule::ContrastiveHebbian(ChlParams::with_hebb(0.5)));
        spec.params.lrate = 1.0;
        spec.params.norm = NormParams::off();
        spec.params.momentum = MomentumParams::off();
        let mut p = chl_prjn(&s, &r, spec);
        for i in 0..1000 {
            let (m, pl) = if i % 3 == 0 { (1.0, 0.0) } else { (0.0, 1.0) };
            set_phases(&mut s, m, pl);
            set_phases(&mut r, m, pl);
            s.force_plus_phase(pl.max(0.01));
            p.dwt(&s, &r);
            p.wt_from_dwt();
            for sy in p.syns() {
                assert!((0.0..=1.0).contains(&sy.lwt), "lwt {} escaped at iter {}", sy.lwt, i);
                assert!((0.0..=1.0).contains(&sy.wt));
                assert_eq!(sy.dwt, 0.0, "delta must be cleared by application");
            }
        }
    }

    #[test]
    fn test_send_delta_uses_scale() {
        let (s, r) = layers();
        let mut p = chl_prjn(&s, &r, ProjectionSpec::fixed(Pattern::Full, 0.5));
        p.set_g_scale(2.0);
        p.send_delta(0, 0.5);
        let expected = 2.0 * 0.5 * p.syns()[0].wt;
        assert!((p.g_inc()[0] - expected).abs() < 1e-6);
        p.init_g_inc();
        assert!(p.g_inc().iter().all(|&g| g == 0.0));
    }
}
