//! Delta shaping and weight application
//!
//! Shared by every learning rule: normalization by a slowly decaying
//! running max of |dwt|, momentum, learning rate, and the sigmoidal
//! contrast function that maps linear to effective weights.

use crate::synapse::Synapse;
use serde::{Deserialize, Serialize};

/// Running-max normalization of weight changes
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormParams {
    pub on: bool,
    /// Time constant of the running max decay
    pub decay_tau: f32,
    /// Floor on the normalization denominator
    pub norm_min: f32,
}

impl Default for NormParams {
    fn default() -> Self {
        Self {
            on: true,
            decay_tau: 1000.0,
            norm_min: 0.001,
        }
    }
}

impl NormParams {
    pub fn off() -> Self {
        Self {
            on: false,
            ..Default::default()
        }
    }

    /// Update the running max in `norm` and return the normalization factor
    #[inline]
    pub fn norm_from_abs_dwt(&self, norm: &mut f32, abs_dwt: f32) -> f32 {
        let decay = 1.0 - 1.0 / self.decay_tau;
        *norm = (decay * *norm).max(abs_dwt);
        if *norm == 0.0 {
            return 1.0;
        }
        1.0 / norm.max(self.norm_min)
    }
}

/// Momentum over successive weight changes
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumParams {
    pub on: bool,
    /// Time constant of momentum decay
    pub m_tau: f32,
    /// Learning-rate compensation for the momentum gain
    pub lr_comp: f32,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            on: true,
            m_tau: 10.0,
            lr_comp: 0.1,
        }
    }
}

impl MomentumParams {
    pub fn off() -> Self {
        Self {
            on: false,
            ..Default::default()
        }
    }

    /// Fold `dwt` into the accumulator and return the compensated momentum
    #[inline]
    pub fn moment_from_dwt(&self, moment: &mut f32, dwt: f32) -> f32 {
        let decay = 1.0 - 1.0 / self.m_tau;
        *moment = decay * *moment + dwt;
        self.lr_comp * *moment
    }
}

/// Sigmoidal contrast enhancement of linear weights
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WtSigParams {
    pub gain: f32,
    pub off: f32,
    /// Bound deltas by remaining range at application time
    pub soft_bound: bool,
}

impl Default for WtSigParams {
    fn default() -> Self {
        Self {
            gain: 6.0,
            off: 1.0,
            soft_bound: true,
        }
    }
}

impl WtSigParams {
    /// Effective weight from linear weight
    pub fn sig_from_lin(&self, lw: f32) -> f32 {
        if lw <= 0.0 {
            return 0.0;
        }
        if lw >= 1.0 {
            return 1.0;
        }
        1.0 / (1.0 + (self.off * (1.0 - lw) / lw).powf(self.gain))
    }

    /// Linear weight from effective weight
    pub fn lin_from_sig(&self, w: f32) -> f32 {
        if w <= 0.0 {
            return 0.0;
        }
        if w >= 1.0 {
            return 1.0;
        }
        1.0 / (1.0 + ((1.0 - w) / w).powf(1.0 / self.gain) / self.off)
    }
}

/// Pathway-level learning parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnParams {
    pub lrate: f32,
    pub norm: NormParams,
    pub momentum: MomentumParams,
    pub wt_sig: WtSigParams,
}

impl Default for LearnParams {
    fn default() -> Self {
        Self {
            lrate: 0.04,
            norm: NormParams::default(),
            momentum: MomentumParams::default(),
            wt_sig: WtSigParams::default(),
        }
    }
}

impl LearnParams {
    pub fn with_lrate(lrate: f32) -> Self {
        Self {
            lrate,
            ..Default::default()
        }
    }

    /// Normalize, add momentum, scale by lrate and accumulate into `sy.dwt`
    #[inline]
    pub fn accumulate(&self, sy: &mut Synapse, raw: f32) {
        let mut dwt = raw;
        let mut norm = 1.0;
        if self.norm.on {
            norm = self.norm.norm_from_abs_dwt(&mut sy.norm, dwt.abs());
        }
        if self.momentum.on {
            dwt = norm * self.momentum.moment_from_dwt(&mut sy.moment, dwt);
        } else {
            dwt *= norm;
        }
        sy.dwt += self.lrate * dwt;
    }

    /// Fold the pending delta into the linear weight and clear it
    pub fn apply(&self, sy: &mut Synapse) {
        if sy.dwt == 0.0 {
            return;
        }
        let mut dwt = sy.dwt;
        if self.wt_sig.soft_bound {
            if dwt > 0.0 {
                dwt *= 1.0 - sy.lwt;
            } else {
                dwt *= sy.lwt;
            }
        }
        sy.lwt = (sy.lwt + dwt).clamp(0.0, 1.0);
        sy.wt = self.wt_sig.sig_from_lin(sy.lwt);
        sy.dwt = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_fixed_points() {
        let s = WtSigParams::default();
        assert_eq!(s.sig_from_lin(0.0), 0.0);
        assert_eq!(s.sig_from_lin(1.0), 1.0);
        assert!((s.sig_from_lin(0.5) - 0.5).abs() < 1e-6);
        assert!(s.sig_from_lin(0.6) > 0.6, "contrast enhancement above midpoint");
    }

    #[test]
    fn test_sigmoid_inverse() {
        let s = WtSigParams::default();
        for w in [0.1f32, 0.3, 0.5, 0.8, 0.95] {
            let lw = s.lin_from_sig(w);
            assert!((s.sig_from_lin(lw) - w).abs() < 1e-4, "inverse failed at {}", w);
        }
    }

    #[test]
    fn test_norm_decays_slowly() {
        let n = NormParams::default();
        let mut acc = 0.0;
        let f = n.norm_from_abs_dwt(&mut acc, 0.5);
        assert_eq!(acc, 0.5);
        assert!((f - 2.0).abs() < 1e-6);
        n.norm_from_abs_dwt(&mut acc, 0.0);
        assert!(acc < 0.5 && acc > 0.499);

        let mut zero = 0.0;
        assert_eq!(n.norm_from_abs_dwt(&mut zero, 0.0), 1.0);
    }

    #[test]
    fn test_momentum_accumulates() {
        let m = MomentumParams::default();
        let mut acc = 0.0;
        let a = m.moment_from_dwt(&mut acc, 1.0);
        let b = m.moment_from_dwt(&mut acc, 1.0);
        assert!((a - 0.1).abs() < 1e-6);
        assert!((b - 0.19).abs() < 1e-6);
    }

    #[test]
    fn test_apply_clears_delta() {
        let p = LearnParams::default();
        let mut sy = Synapse::new(0.5, 0.5);
        sy.dwt = 0.2;
        p.apply(&mut sy);
        assert_eq!(sy.dwt, 0.0);
        assert!((sy.lwt - 0.6).abs() < 1e-6, "soft bound scales by 1 - lwt");
        assert_eq!(sy.wt, p.wt_sig.sig_from_lin(sy.lwt));
    }

    #[test]
    fn test_apply_hard_clamps_without_soft_bound() {
        let mut p = LearnParams::default();
        p.wt_sig.soft_bound = false;
        let mut sy = Synapse::new(0.5, 0.9);
        sy.dwt = 0.5;
        p.apply(&mut sy);
        assert_eq!(sy.lwt, 1.0);
        sy.dwt = -3.0;
        p.apply(&mut sy);
        assert_eq!(sy.lwt, 0.0);
    }

    #[test]
    fn test_accumulate_plain_lrate() {
        let p = LearnParams {
            lrate: 0.1,
            norm: NormParams::off(),
            momentum: MomentumParams::off(),
            ..Default::default()
        };
        let mut sy = Synapse::new(0.5, 0.5);
        p.accumulate(&mut sy, 0.4);
        p.accumulate(&mut sy, 0.4);
        assert!((sy.dwt - 0.08).abs() < 1e-6);
    }
}
