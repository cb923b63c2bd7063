//! Standard error-driven rule (XCAL)
//!
//! Checkmark-shaped function of short- vs medium-term coproduct of running
//! averages, plus a BCM-style term against the receiver's long-term average.

use serde::{Deserialize, Serialize};

/// Running averages a unit exposes to the standard rule
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UnitAvgs {
    pub avg_s: f32,
    pub avg_m: f32,
    pub avg_l: f32,
    pub avg_l_lrn: f32,
}

/// XCAL parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XcalParams {
    /// Multiplier on the medium-term (error-driven) component
    pub m_lrn: f32,
    /// Reversal point as a proportion of the threshold
    pub d_rev: f32,
    /// Minimum coproduct for any change
    pub d_thr: f32,
    /// Mix of medium into short-term average for learning
    pub lrn_m: f32,
}

impl Default for XcalParams {
    fn default() -> Self {
        Self {
            m_lrn: 1.0,
            d_rev: 0.1,
            d_thr: 0.0001,
            lrn_m: 0.1,
        }
    }
}

impl XcalParams {
    /// Checkmark function
    #[inline]
    pub fn xcal(&self, srval: f32, thr_p: f32) -> f32 {
        if srval < self.d_thr {
            0.0
        } else if srval > thr_p * self.d_rev {
            srval - thr_p
        } else {
            -srval * (1.0 - self.d_rev) / self.d_rev
        }
    }

    #[inline]
    fn avg_s_lrn(&self, u: &UnitAvgs) -> f32 {
        (1.0 - self.lrn_m) * u.avg_s + self.lrn_m * u.avg_m
    }

    /// Raw delta for one synapse, before shaping and lrate
    pub fn synapse_dwt(&self, send: &UnitAvgs, recv: &UnitAvgs) -> f32 {
        let srs = self.avg_s_lrn(recv) * self.avg_s_lrn(send);
        let srm = recv.avg_m * send.avg_m;
        let mdwt = self.xcal(srs, srm);
        let ldwt = recv.avg_l_lrn * self.xcal(srs, recv.avg_l);
        self.m_lrn * mdwt + ldwt
    }
}

/// Short/medium running-average time constants
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvgParams {
    pub ss_tau: f32,
    pub s_tau: f32,
    pub m_tau: f32,
}

impl Default for AvgParams {
    fn default() -> Self {
        Self {
            ss_tau: 2.0,
            s_tau: 2.0,
            m_tau: 10.0,
        }
    }
}

impl AvgParams {
    /// One cycle of cascaded averaging
    #[inline]
    pub fn update(&self, act: f32, avg_ss: &mut f32, avg_s: &mut f32, avg_m: &mut f32) {
        *avg_ss += (act - *avg_ss) / self.ss_tau;
        *avg_s += (*avg_ss - *avg_s) / self.s_tau;
        *avg_m += (*avg_s - *avg_m) / self.m_tau;
    }
}

/// Long-term average and its learning modulation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvgLParams {
    pub init: f32,
    pub gain: f32,
    pub min: f32,
    pub tau: f32,
    pub lrn_max: f32,
    pub lrn_min: f32,
}

impl Default for AvgLParams {
    fn default() -> Self {
        Self {
            init: 0.4,
            gain: 2.5,
            min: 0.2,
            tau: 10.0,
            lrn_max: 0.5,
            lrn_min: 0.0001,
        }
    }
}

impl AvgLParams {
    /// Once per trial, from the medium-term average
    pub fn update(&self, avg_m: f32, avg_l: &mut f32, avg_l_lrn: &mut f32) {
        *avg_l += (self.gain * avg_m - *avg_l) / self.tau;
        *avg_l = avg_l.max(self.min);
        let fact = (self.lrn_max - self.lrn_min) / (self.gain - self.min);
        *avg_l_lrn = self.lrn_min + fact * (*avg_l - self.min);
    }

    /// Initial learning modulation for `init`
    pub fn init_lrn(&self) -> f32 {
        let fact = (self.lrn_max - self.lrn_min) / (self.gain - self.min);
        self.lrn_min + fact * (self.init - self.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkmark_shape() {
        let x = XcalParams::default();
        assert_eq!(x.xcal(0.00001, 0.5), 0.0, "below d_thr");
        assert!(x.xcal(0.7, 0.5) > 0.0);
        assert!(x.xcal(0.3, 0.5) < 0.0);
        // Continuous at the reversal point
        let thr = 0.5;
        let at = thr * x.d_rev;
        let left = x.xcal(at, thr);
        let right = at - thr;
        assert!((left - right).abs() < 1e-5);
    }

    #[test]
    fn test_plus_phase_stronger_potentiates() {
        let x = XcalParams::default();
        let s = UnitAvgs { avg_s: 0.9, avg_m: 0.5, avg_l: 0.4, avg_l_lrn: 0.0 };
        let r = UnitAvgs { avg_s: 0.9, avg_m: 0.5, avg_l: 0.4, avg_l_lrn: 0.0 };
        assert!(x.synapse_dwt(&s, &r) > 0.0);
        let r_weak = UnitAvgs { avg_s: 0.1, ..r };
        assert!(x.synapse_dwt(&s, &r_weak) < 0.0);
    }

    #[test]
    fn test_avg_l_floor() {
        let p = AvgLParams::default();
        let mut l = p.init;
        let mut lrn = p.init_lrn();
        for _ in 0..100 {
            p.update(0.0, &mut l, &mut lrn);
        }
        assert_eq!(l, p.min);
        assert!((lrn - p.lrn_min).abs() < 1e-6);
    }
}
