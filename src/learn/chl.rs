//! Contrastive Hebbian Learning
//!
//! Per-synapse delta combining a sparsity-corrected Hebbian term with a
//! plus/minus contrastive error term:
//!
//! | Term | Formula |
//! |------|---------|
//! | Hebbian | `ract * (sact * (savg_cor - lwt) - (1 - sact) * lwt)` |
//! | Error | `ract_p * sact_p - ract_m * sact_m`, soft-bounded by `lwt` |
//! | Combined | `hebb * hebbian + err * error` |
//!
//! `err` is never stored independently: every path that changes `hebb`
//! goes through [`ChlParams::set_hebb`].

use serde::{Deserialize, Serialize};

/// Which activation snapshot serves as the minus phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MinusPhase {
    /// Settled minus-phase activation (end of quarter 2)
    #[default]
    ActM,
    /// Activation at end of quarter 0
    Q1,
    /// Activation at end of quarter 1
    Q2,
}

/// Activations a synapse reads from one of its units
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PhaseActs {
    pub act_q1: f32,
    pub act_q2: f32,
    pub act_m: f32,
    pub act_p: f32,
}

/// CHL parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "ChlConfig", into = "ChlConfig")]
pub struct ChlParams {
    hebb: f32,
    err: f32,
    /// Minus-phase snapshot selector
    pub minus: MinusPhase,
    /// Proportion of correction for sending-layer activity levels
    pub savg_cor: f32,
    /// Sending-layer plus-phase average below which no learning happens
    pub savg_thr: f32,
}

/// Serialized form: `err` is derived, never read from disk
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
struct ChlConfig {
    hebb: f32,
    minus: MinusPhase,
    savg_cor: f32,
    savg_thr: f32,
}

impl Default for ChlConfig {
    fn default() -> Self {
        let p = ChlParams::default();
        p.into()
    }
}

impl From<ChlConfig> for ChlParams {
    fn from(c: ChlConfig) -> Self {
        let mut p = ChlParams {
            hebb: 0.0,
            err: 1.0,
            minus: c.minus,
            savg_cor: c.savg_cor,
            savg_thr: c.savg_thr,
        };
        p.set_hebb(c.hebb);
        p
    }
}

impl From<ChlParams> for ChlConfig {
    fn from(p: ChlParams) -> Self {
        ChlConfig {
            hebb: p.hebb,
            minus: p.minus,
            savg_cor: p.savg_cor,
            savg_thr: p.savg_thr,
        }
    }
}

impl Default for ChlParams {
    fn default() -> Self {
        Self {
            hebb: 0.001,
            err: 0.999,
            minus: MinusPhase::ActM,
            savg_cor: 0.4,
            savg_thr: 0.001,
        }
    }
}

impl ChlParams {
    /// Default params with a given Hebbian mix
    pub fn with_hebb(hebb: f32) -> Self {
        let mut p = Self::default();
        p.set_hebb(hebb);
        p
    }

    /// Pure error-driven learning against the quarter-1 snapshot
    ///
    /// Used by the EC <-> CA1 encoder pathways.
    pub fn encoder() -> Self {
        let mut p = Self::with_hebb(0.0);
        p.minus = MinusPhase::Q1;
        p
    }

    /// Builder: minus-phase selector
    pub fn minus_phase(mut self, minus: MinusPhase) -> Self {
        self.minus = minus;
        self
    }

    /// Builder: sending-average correction
    pub fn savg_cor(mut self, savg_cor: f32) -> Self {
        self.savg_cor = savg_cor;
        self
    }

    /// Hebbian mixing weight
    pub fn hebb(&self) -> f32 {
        self.hebb
    }

    /// Error mixing weight, always `1 - hebb`
    pub fn err(&self) -> f32 {
        self.err
    }

    /// Set the Hebbian weight, clamped to [0, 1], and rederive `err`
    pub fn set_hebb(&mut self, hebb: f32) {
        self.hebb = hebb.clamp(0.0, 1.0);
        self.err = 1.0 - self.hebb;
    }

    /// Pick the configured minus-phase activation
    #[inline]
    pub fn minus_act(&self, acts: &PhaseActs) -> f32 {
        match self.minus {
            MinusPhase::Q1 => acts.act_q1,
            MinusPhase::Q2 => acts.act_q2,
            MinusPhase::ActM => acts.act_m,
        }
    }

    /// Correction factor from the sending layer's effective plus-phase average
    pub fn savg_correction(&self, act_p_avg_eff: f32) -> f32 {
        let savg = (0.5 + self.savg_cor * (act_p_avg_eff - 0.5)).max(self.savg_thr);
        0.5 / savg
    }

    /// Hebbian term
    #[inline]
    pub fn hebb_dwt(sact: f32, ract: f32, savg_cor: f32, lwt: f32) -> f32 {
        ract * (sact * (savg_cor - lwt) - (1.0 - sact) * lwt)
    }

    /// Soft-bounded contrastive error term
    #[inline]
    pub fn err_dwt(sact_p: f32, sact_m: f32, ract_p: f32, ract_m: f32, lwt: f32) -> f32 {
        let err = ract_p * sact_p - ract_m * sact_m;
        if err > 0.0 {
            err * (1.0 - lwt)
        } else {
            err * lwt
        }
    }

    /// Raw delta for one synapse, before normalization, momentum and lrate
    pub fn synapse_dwt(&self, send: &PhaseActs, recv: &PhaseActs, savg_cor: f32, lwt: f32) -> f32 {
        let hebb = Self::hebb_dwt(send.act_p, recv.act_p, savg_cor, lwt);
        let err = Self::err_dwt(
            send.act_p,
            self.minus_act(send),
            recv.act_p,
            self.minus_act(recv),
            lwt,
        );
        self.hebb * hebb + self.err * err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acts(q1: f32, q2: f32, m: f32, p: f32) -> PhaseActs {
        PhaseActs {
            act_q1: q1,
            act_q2: q2,
            act_m: m,
            act_p: p,
        }
    }

    #[test]
    fn test_err_tracks_hebb() {
        let mut p = ChlParams::default();
        for i in 0..=100 {
            let h = i as f32 / 100.0;
            p.set_hebb(h);
            assert_eq!(p.err(), 1.0 - p.hebb(), "err drifted at hebb={}", h);
        }
    }

    #[test]
    fn test_set_hebb_clamps() {
        let mut p = ChlParams::default();
        p.set_hebb(1.5);
        assert_eq!(p.hebb(), 1.0);
        assert_eq!(p.err(), 0.0);
        p.set_hebb(-0.2);
        assert_eq!(p.hebb(), 0.0);
        assert_eq!(p.err(), 1.0);
    }

    #[test]
    fn test_deserialize_derives_err() {
        let p: ChlParams = serde_json::from_str(r#"{"hebb": 0.25, "err": 0.9}"#).unwrap();
        assert_eq!(p.hebb(), 0.25);
        assert_eq!(p.err(), 0.75, "err must be derived, not read");
        assert_eq!(p.savg_cor, 0.4);

        let json = serde_json::to_string(&p).unwrap();
        assert!(!json.contains("\"err\""));
    }

    #[test]
    fn test_minus_act_selector() {
        let a = acts(0.1, 0.2, 0.3, 0.9);
        let mut p = ChlParams::default();
        assert_eq!(p.minus_act(&a), 0.3);
        p.minus = MinusPhase::Q1;
        assert_eq!(p.minus_act(&a), 0.1);
        p.minus = MinusPhase::Q2;
        assert_eq!(p.minus_act(&a), 0.2);
    }

    #[test]
    fn test_savg_correction_floor() {
        let p = ChlParams::default().savg_cor(1.0);
        // 0.5 + 1.0 * (0 - 0.5) = 0 -> clamped to savg_thr
        let c = p.savg_correction(0.0);
        assert!((c - 0.5 / p.savg_thr).abs() < 1e-3);
        assert!(c.is_finite());

        let p = ChlParams::default();
        let c = p.savg_correction(0.2);
        assert!((c - 0.5 / 0.38).abs() < 1e-6);
    }

    #[test]
    fn test_hebb_term_signs() {
        // Both active and weight below correction -> potentiation
        assert!(ChlParams::hebb_dwt(1.0, 1.0, 1.0, 0.3) > 0.0);
        // Sender silent, receiver active -> depression proportional to lwt
        let d = ChlParams::hebb_dwt(0.0, 1.0, 1.0, 0.3);
        assert!((d + 0.3).abs() < 1e-6);
        // Receiver silent -> nothing
        assert_eq!(ChlParams::hebb_dwt(1.0, 0.0, 1.0, 0.3), 0.0);
    }

    #[test]
    fn test_err_term_soft_bounds() {
        let up = ChlParams::err_dwt(1.0, 0.0, 1.0, 0.0, 0.8);
        assert!((up - 0.2).abs() < 1e-6, "room to grow is 1 - lwt");
        let down = ChlParams::err_dwt(0.0, 1.0, 0.0, 1.0, 0.8);
        assert!((down + 0.8).abs() < 1e-6, "room to shrink is lwt");
        assert_eq!(ChlParams::err_dwt(1.0, 0.0, 1.0, 0.0, 1.0), 0.0);
        assert_eq!(ChlParams::err_dwt(0.0, 1.0, 0.0, 1.0, 0.0), 0.0);
    }

    #[test]
    fn test_encoder_is_pure_error() {
        let p = ChlParams::encoder();
        let s = acts(0.2, 0.0, 0.0, 1.0);
        let r = acts(0.4, 0.0, 0.0, 1.0);
        let d = p.synapse_dwt(&s, &r, 1.0, 0.5);
        let expected = (1.0 - 0.2 * 0.4) * 0.5;
        assert!((d - expected).abs() < 1e-6);
    }
}
