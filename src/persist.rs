//! Weight persistence
//!
//! Linear weights of every projection, keyed by sender and receiver layer
//! names, stored as JSON. Effective weights are re-derived on load.

use crate::error::HipError;
use crate::net::Network;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Linear weights of one projection in sender-major synapse order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionWeights {
    pub send: String,
    pub recv: String,
    pub lwt: Vec<f32>,
}

/// All learned weights of a network
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightsSnapshot {
    pub network: String,
    pub projections: Vec<ProjectionWeights>,
}

impl WeightsSnapshot {
    pub fn capture(net: &Network) -> Self {
        let projections = net
            .projections()
            .iter()
            .map(|p| ProjectionWeights {
                send: net.layer(p.send()).name().to_string(),
                recv: net.layer(p.recv()).name().to_string(),
                lwt: p.syns().iter().map(|s| s.lwt).collect(),
            })
            .collect();
        Self {
            network: net.name().to_string(),
            projections,
        }
    }

    /// Write linear weights into `net` and refresh effective weights
    ///
    /// Pending deltas and learning accumulators are cleared. Projections in
    /// `net` without an entry keep their weights. Nothing is written unless
    /// every entry matches its projection and every weight lies in [0, 1].
    pub fn apply(&self, net: &mut Network) -> crate::error::Result<()> {
        let mut ids = Vec::with_capacity(self.projections.len());
        for pw in &self.projections {
            let id = net
                .projection_between(&pw.send, &pw.recv)
                .ok_or_else(|| HipError::missing_projection(&pw.send, &pw.recv))?;
            let n = net.projection(id).len();
            if n != pw.lwt.len() {
                return Err(HipError::ShapeMismatch {
                    expected: vec![n],
                    actual: vec![pw.lwt.len()],
                });
            }
            if let Some((i, lwt)) = pw.lwt.iter().enumerate().find(|(_, w)| !(0.0..=1.0).contains(*w)) {
                return Err(HipError::Config(format!(
                    "{}To{} weight {} is {}, outside [0, 1]",
                    pw.send, pw.recv, i, lwt
                )));
            }
            ids.push(id);
        }
        for (pw, id) in self.projections.iter().zip(ids) {
            let p = net.projection_mut(id);
            for (sy, &lwt) in p.syns_mut().iter_mut().zip(&pw.lwt) {
                sy.lwt = lwt;
                sy.reset_learning();
            }
            p.refresh_effective();
        }
        net.recompute_input_scaling();
        log::info!("[WTS] {}: loaded {} projections", net.name(), self.projections.len());
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string(self).context("Failed to serialize weights")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write weights to {}", path.display()))?;
        log::info!("[WTS] {}: saved to {}", self.network, path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read weights from {}", path.display()))?;
        serde_json::from_str(&text).context("Failed to parse weights file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HipParams, ParamSet};
    use crate::hip::build_hippocampus;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn net(seed: u64) -> Network {
        let mut rng = StdRng::seed_from_u64(seed);
        build_hippocampus(&HipParams::small(), ParamSet::Base, &mut rng).unwrap()
    }

    fn all_wts(net: &Network) -> Vec<(f32, f32)> {
        net.projections()
            .iter()
            .flat_map(|p| p.syns().iter().map(|s| (s.lwt, s.wt)))
            .collect()
    }

    #[test]
    fn test_save_load_restores_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wts.json");
        let src = net(1);
        WeightsSnapshot::capture(&src).save(&path).unwrap();

        // Same connectivity, different weights
        let mut dst = net(1);
        dst.init_weights(&mut StdRng::seed_from_u64(9));
        assert_ne!(all_wts(&src), all_wts(&dst), "reinitialized weights should differ");
        WeightsSnapshot::load(&path).unwrap().apply(&mut dst).unwrap();
        for ((sl, sw), (dl, dw)) in all_wts(&src).into_iter().zip(all_wts(&dst)) {
            assert_eq!(sl, dl);
            assert!((sw - dw).abs() < 1e-4, "effective weight {} vs {}", sw, dw);
        }
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let mut dst = net(1);
        let mut snap = WeightsSnapshot::capture(&dst);
        snap.projections[0].lwt.pop();
        let before = all_wts(&dst);
        match snap.apply(&mut dst) {
            Err(HipError::ShapeMismatch { .. }) => {}
            other => panic!("expected shape mismatch, got {:?}", other),
        }
        assert_eq!(all_wts(&dst), before, "failed load must not touch weights");
    }

    #[test]
    fn test_out_of_range_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        let mut dst = net(1);
        let mut snap = WeightsSnapshot::capture(&dst);
        let last = snap.projections.len() - 1;
        snap.projections[last].lwt[0] = 2.0;
        snap.save(&path).unwrap();

        let before = all_wts(&dst);
        let err = WeightsSnapshot::load(&path).unwrap().apply(&mut dst).unwrap_err();
        assert!(matches!(err, HipError::Config(ref m) if m.contains("outside [0, 1]")), "got {:?}", err);
        assert_eq!(all_wts(&dst), before, "rejected file must not touch any projection");
    }

    #[test]
    fn test_non_finite_weight_rejected() {
        let mut dst = net(1);
        let mut snap = WeightsSnapshot::capture(&dst);
        snap.projections[1].lwt[0] = f32::NAN;
        let before = all_wts(&dst);
        assert!(matches!(snap.apply(&mut dst), Err(HipError::Config(_))));
        assert_eq!(all_wts(&dst), before);

        snap.projections[1].lwt[0] = f32::NEG_INFINITY;
        assert!(matches!(snap.apply(&mut dst), Err(HipError::Config(_))));
    }

    #[test]
    fn test_unknown_projection_rejected() {
        let mut dst = net(1);
        let mut snap = WeightsSnapshot::capture(&dst);
        snap.projections[0].send = "Nowhere".into();
        assert!(matches!(snap.apply(&mut dst), Err(HipError::MissingProjection { .. })));
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = WeightsSnapshot::load(dir.path().join("absent.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read weights"));
    }
}
