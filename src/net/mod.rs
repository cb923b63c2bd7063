//! # Rate-Code Network Engine
//!
//! Layers of leaky-integrator units connected by projections, stepped one
//! cycle at a time.
//!
//! ## Cycle
//!
//! 1. Senders whose activation moved more than a small threshold propagate
//!    the change into each outgoing projection's `g_inc`
//! 2. Receivers sum `g_inc` over incoming projections and integrate net input
//! 3. FFFB inhibition per layer and pool
//! 4. Activation update (hard clamps for external input and plus-phase targets)
//!
//! ## Input scaling
//!
//! Each projection caches `g_scale` from its `WtScale` and the sender's
//! expected activity. [`Network::recompute_input_scaling`] must run after
//! any `WtScale` change and before the next cycle; it also clears all
//! `g_inc` so senders re-propagate at the new scale.

mod connect;
mod layer;
mod projection;
mod time;

pub use connect::Pattern;
pub use layer::{
    ActAvgParams, ActParams, ActVar, FffbParams, InhibParams, Layer, LayerKind, LayerParams, Shape, Unit,
};
pub use projection::{Projection, ProjectionSpec, WtInit, WtScale};
pub use time::Time;

use crate::error::{HipError, Result};
use rand::Rng;

/// Activation below this is sent as zero
const SEND_THR: f32 = 0.1;
/// Smallest activation change worth propagating
const DELTA_THR: f32 = 0.005;

/// Handle to a layer in a [`Network`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub(crate) usize);

impl LayerId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Handle to a projection in a [`Network`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjId(pub(crate) usize);

impl ProjId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Layers plus the projections between them
#[derive(Clone, Debug)]
pub struct Network {
    name: String,
    layers: Vec<Layer>,
    projections: Vec<Projection>,
    recv_prjns: Vec<Vec<ProjId>>,
    send_prjns: Vec<Vec<ProjId>>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layers: Vec::new(),
            projections: Vec::new(),
            recv_prjns: Vec::new(),
            send_prjns: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a layer; names must be unique
    pub fn add_layer(
        &mut self,
        name: &str,
        kind: LayerKind,
        shape: Shape,
        params: LayerParams,
    ) -> Result<LayerId> {
        if self.layer_by_name(name).is_some() {
            return Err(HipError::Config(format!("duplicate layer name {}", name)));
        }
        if shape.is_empty() {
            return Err(HipError::Config(format!("layer {} has no units", name)));
        }
        let id = LayerId(self.layers.len());
        self.layers.push(Layer::new(name, kind, shape, params));
        self.recv_prjns.push(Vec::new());
        self.send_prjns.push(Vec::new());
        Ok(id)
    }

    /// Connect two layers; the projection is named `{Send}To{Recv}`
    pub fn connect<R: Rng>(
        &mut self,
        send: LayerId,
        recv: LayerId,
        spec: ProjectionSpec,
        rng: &mut R,
    ) -> Result<ProjId> {
        let (sl, rl) = (&self.layers[send.0], &self.layers[recv.0]);
        if self.projection_between(sl.name(), rl.name()).is_some() {
            return Err(HipError::Config(format!(
                "duplicate projection {} -> {}",
                sl.name(),
                rl.name()
            )));
        }
        let name = format!("{}To{}", sl.name(), rl.name());
        let prjn = Projection::build(name, (send, sl), (recv, rl), spec, rng)?;
        let id = ProjId(self.projections.len());
        self.projections.push(prjn);
        self.send_prjns[send.0].push(id);
        self.recv_prjns[recv.0].push(id);
        Ok(id)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    pub fn layer(&self, id: LayerId) -> &Layer {
        &self.layers[id.0]
    }

    pub fn layer_mut(&mut self, id: LayerId) -> &mut Layer {
        &mut self.layers[id.0]
    }

    pub fn projection(&self, id: ProjId) -> &Projection {
        &self.projections[id.0]
    }

    pub fn projection_mut(&mut self, id: ProjId) -> &mut Projection {
        &mut self.projections[id.0]
    }

    pub fn layer_by_name(&self, name: &str) -> Option<LayerId> {
        self.layers.iter().position(|l| l.name() == name).map(LayerId)
    }

    pub fn projection_between(&self, send: &str, recv: &str) -> Option<ProjId> {
        let s = self.layer_by_name(send)?;
        let r = self.layer_by_name(recv)?;
        self.recv_prjns[r.0]
            .iter()
            .copied()
            .find(|p| self.projections[p.0].send() == s)
    }

    /// Projections received by a layer
    pub fn recv_projections(&self, id: LayerId) -> &[ProjId] {
        &self.recv_prjns[id.0]
    }

    pub fn init_weights<R: Rng>(&mut self, rng: &mut R) {
        for p in self.projections.iter_mut() {
            p.init_weights(rng);
        }
    }

    pub fn init_acts(&mut self) {
        for l in self.layers.iter_mut() {
            l.init_acts();
        }
        self.init_g_inc();
    }

    /// Clear every layer's external input and targets
    pub fn init_ext(&mut self) {
        for l in self.layers.iter_mut() {
            l.init_ext();
        }
    }

    pub fn apply_ext(&mut self, id: LayerId, values: &[f32]) -> Result<()> {
        self.layers[id.0].apply_ext(values)
    }

    /// Trial start: decay activity and rebuild input scaling
    pub fn alpha_cycle_init(&mut self) {
        for l in self.layers.iter_mut() {
            l.alpha_cycle_init();
        }
        self.recompute_input_scaling();
    }

    /// Rederive every `g_scale` from current `WtScale`s and reset accumulators
    pub fn recompute_input_scaling(&mut self) {
        let Network {
            layers,
            projections,
            recv_prjns,
            ..
        } = &mut *self;
        for (li, rps) in recv_prjns.iter().enumerate() {
            let recv_off = layers[li].is_off();
            let tot_rel: f32 = rps
                .iter()
                .map(|p| &projections[p.0])
                .filter(|p| !layers[p.send().0].is_off())
                .map(|p| p.wt_scale.rel)
                .sum();
            for pid in rps {
                let p = &mut projections[pid.0];
                let sl = &layers[p.send().0];
                if recv_off || sl.is_off() || tot_rel <= 0.0 {
                    p.set_g_scale(0.0);
                    continue;
                }
                let sc = WtScale::send_act_scale(sl.act_p_avg_eff(), sl.len() as f32, p.max_recv_con() as f32);
                p.set_g_scale(p.wt_scale.abs * p.wt_scale.rel * sc / tot_rel);
            }
        }
        self.init_g_inc();
    }

    /// Clear propagated input so all senders resend from scratch
    pub fn init_g_inc(&mut self) {
        for p in self.projections.iter_mut() {
            p.init_g_inc();
        }
        for l in self.layers.iter_mut() {
            for u in l.units_mut() {
                u.ge_raw = 0.0;
                u.act_sent = 0.0;
            }
        }
    }

    /// Advance every active layer one cycle
    pub fn step_cycle(&mut self, time: &Time) {
        let Network {
            layers,
            projections,
            recv_prjns,
            send_prjns,
            ..
        } = &mut *self;
        let off: Vec<bool> = layers.iter().map(|l| l.is_off()).collect();

        for (li, layer) in layers.iter_mut().enumerate() {
            if off[li] {
                continue;
            }
            for (si, u) in layer.units_mut().iter_mut().enumerate() {
                let act = if u.act > SEND_THR { u.act } else { 0.0 };
                let delta = act - u.act_sent;
                if delta.abs() <= DELTA_THR {
                    continue;
                }
                u.act_sent = act;
                for pid in &send_prjns[li] {
                    let p = &mut projections[pid.0];
                    if !off[p.recv().0] {
                        p.send_delta(si, delta);
                    }
                }
            }
        }

        let plus = time.plus_phase();
        for (li, layer) in layers.iter_mut().enumerate() {
            if off[li] {
                continue;
            }
            let rps: Vec<&Projection> = recv_prjns[li]
                .iter()
                .map(|p| &projections[p.0])
                .filter(|p| !off[p.send().0])
                .collect();
            for (ri, u) in layer.units_mut().iter_mut().enumerate() {
                u.ge_raw = rps.iter().map(|p| p.g_inc()[ri]).sum();
            }
            layer.update_net();
            layer.inhibit();
            layer.update_acts(plus);
        }
    }

    /// Capture the snapshots of the quarter in `time`
    pub fn finalize_quarter(&mut self, time: &Time) {
        for l in self.layers.iter_mut().filter(|l| !l.is_off()) {
            l.finalize_quarter(time.quarter);
        }
    }

    /// Accumulate weight deltas for every learning projection
    pub fn dwt(&mut self) {
        let Network {
            layers, projections, ..
        } = &mut *self;
        for p in projections.iter_mut() {
            p.dwt(&layers[p.send().0], &layers[p.recv().0]);
        }
    }

    /// Fold pending deltas into weights
    pub fn wt_from_dwt(&mut self) {
        for p in self.projections.iter_mut() {
            p.wt_from_dwt();
        }
    }
}
