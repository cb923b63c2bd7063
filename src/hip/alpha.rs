//! # Alpha-Cycle Controller
//!
//! Runs one trial as four quarters of network cycles and switches pathway
//! scales at quarter boundaries so CA1 alternates between encoding (driven
//! by ECin) and recall (driven by CA3).
//!
//! ## Base schedule
//!
//! | Quarter | CA1 driven by | Mossy rel |
//! |---------|---------------|-----------|
//! | 0 | ECin | base - `mossy_del` |
//! | 1, 2 | CA3 | base (train) / base - `mossy_del_test` (test) |
//! | 3 | ECin | unchanged |
//!
//! Every scale change is followed by input-scaling recomputation before
//! the next cycle. Memory statistics are taken right after quarter 2 is
//! finalized.
//!
//! ## Trial scope
//!
//! Scales, learn flags, layer off flags and layer kinds are captured before
//! a trial and restored after it. Scales come back before the learning
//! pass, everything else after it. Deltas from a training trial are folded
//! into weights at the start of the next training trial.

use super::observer::{CycleObserver, UpdateCadence};
use super::stats::{correlation, score_memory, sse, Ca3Correlations, MemStats, TrialStats};
use super::topology::{names, HipTopology};
use crate::config::SimConfig;
use crate::error::Result;
use crate::net::{ActVar, LayerId, LayerKind, Network, ProjId, Time, WtScale};
use serde::{Deserialize, Serialize};

/// Cycle within quarter 2 at which retrieval practice feeds ECout into Autoin
const RP_AUTOIN_CYCLE: usize = 25;

/// Trial protocol variant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// Encode in quarter 0, recall in 1-2, re-encode in 3
    EncodeRecall,
    /// DG, CA3 and cortex silent; trains the EC <-> CA1 encoder
    PreTrain,
    /// Recall-only practice; EC <-> CA1 frozen, autoencoder feeds ECout
    RetrievalPractice,
    /// Recall practice training only the autoencoder
    RetrievalPracticeAutoencoder,
    /// Encode-recall again with the cortex and autoencoder silent
    Restudy,
    /// Autoencoder alone
    Autoencoder,
}

impl Protocol {
    pub const ALL: [Protocol; 6] = [
        Protocol::EncodeRecall,
        Protocol::PreTrain,
        Protocol::RetrievalPractice,
        Protocol::RetrievalPracticeAutoencoder,
        Protocol::Restudy,
        Protocol::Autoencoder,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::EncodeRecall => "encode-recall",
            Protocol::PreTrain => "pretrain",
            Protocol::RetrievalPractice => "rp",
            Protocol::RetrievalPracticeAutoencoder => "rpae",
            Protocol::Restudy => "restudy",
            Protocol::Autoencoder => "ae",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Cycles in each quarter
    pub fn schedule(&self, cyc_per_qtr: usize) -> [usize; 4] {
        match self {
            Protocol::RetrievalPractice => [cyc_per_qtr, 25, 100, cyc_per_qtr],
            Protocol::RetrievalPracticeAutoencoder => [cyc_per_qtr, 50, 75, cyc_per_qtr],
            _ => [cyc_per_qtr; 4],
        }
    }

    /// Whether the CA3 snapshot correlations are taken after quarter 3
    pub fn tracks_ca3(&self) -> bool {
        matches!(
            self,
            Protocol::EncodeRecall | Protocol::PreTrain | Protocol::Restudy
        )
    }

    /// Fail when the topology lacks something this protocol drives
    pub fn check(&self, topo: &HipTopology) -> Result<()> {
        use names::*;
        match self {
            Protocol::RetrievalPractice => {
                HipTopology::layer(topo.autoin, AUTOIN)?;
                HipTopology::layer(topo.auto, AUTO)?;
                HipTopology::layer(topo.output, OUTPUT)?;
            }
            Protocol::RetrievalPracticeAutoencoder => {
                HipTopology::layer(topo.autohid, AUTOHID)?;
                HipTopology::prjn(topo.autohid_from_ec_out, EC_OUT, AUTOHID)?;
                HipTopology::prjn(topo.auto_from_autohid, AUTOHID, AUTO)?;
                HipTopology::prjn(topo.autohid_from_auto, AUTO, AUTOHID)?;
            }
            Protocol::Autoencoder => {
                HipTopology::layer(topo.autoin, AUTOIN)?;
                HipTopology::layer(topo.autohid, AUTOHID)?;
                HipTopology::layer(topo.auto, AUTO)?;
                HipTopology::prjn(topo.autohid_from_autoin, AUTOIN, AUTOHID)?;
                HipTopology::prjn(topo.auto_from_autohid, AUTOHID, AUTO)?;
                HipTopology::prjn(topo.autohid_from_auto, AUTO, AUTOHID)?;
            }
            Protocol::EncodeRecall | Protocol::PreTrain | Protocol::Restudy => {}
        }
        Ok(())
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Controller parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlphaParams {
    pub cyc_per_qtr: usize,
    pub mossy_del: f32,
    pub mossy_del_test: f32,
    /// Silence Cortex -> Output during encode-recall trials
    pub hip_only: bool,
    pub mem_thr: f64,
    /// Leading pools of the memory layer to score; 0 scores all units
    pub mem_pools: usize,
}

impl Default for AlphaParams {
    fn default() -> Self {
        Self {
            cyc_per_qtr: 25,
            mossy_del: 4.0,
            mossy_del_test: 3.0,
            hip_only: false,
            mem_thr: 0.34,
            mem_pools: 2,
        }
    }
}

impl AlphaParams {
    pub fn from_config(cfg: &SimConfig) -> Self {
        Self {
            cyc_per_qtr: cfg.run.cyc_per_qtr,
            mossy_del: cfg.hip.mossy_del,
            mossy_del_test: cfg.hip.mossy_del_test,
            hip_only: cfg.run.hip_only,
            mem_thr: cfg.run.mem_thr,
            mem_pools: cfg.run.mem_pools,
        }
    }
}

/// Trial-scoped network settings
struct TrialScope {
    scales: Vec<WtScale>,
    learn: Vec<bool>,
    off: Vec<bool>,
    kinds: Vec<LayerKind>,
}

impl TrialScope {
    fn capture(net: &Network) -> Self {
        Self {
            scales: net.projections().iter().map(|p| p.wt_scale).collect(),
            learn: net.projections().iter().map(|p| p.learn).collect(),
            off: net.layers().iter().map(|l| l.is_off()).collect(),
            kinds: net.layers().iter().map(|l| l.kind()).collect(),
        }
    }

    fn restore_scales(&self, net: &mut Network) {
        for (i, &sc) in self.scales.iter().enumerate() {
            net.projection_mut(ProjId(i)).wt_scale = sc;
        }
    }

    fn restore_flags(&self, net: &mut Network) {
        for (i, &learn) in self.learn.iter().enumerate() {
            net.projection_mut(ProjId(i)).learn = learn;
        }
        for (i, (&off, &kind)) in self.off.iter().zip(&self.kinds).enumerate() {
            let ly = net.layer_mut(LayerId(i));
            ly.set_off(off);
            ly.set_kind(kind);
        }
    }
}

fn set_learn(net: &mut Network, prjns: &[ProjId], on: bool) {
    for &p in prjns {
        net.projection_mut(p).learn = on;
    }
}

fn set_learn_opt(net: &mut Network, prjns: &[Option<ProjId>], on: bool) {
    for p in prjns.iter().flatten() {
        net.projection_mut(*p).learn = on;
    }
}

fn set_off(net: &mut Network, layers: &[Option<LayerId>], off: bool) {
    for l in layers.iter().flatten() {
        net.layer_mut(*l).set_off(off);
    }
}

fn set_kind(net: &mut Network, layer: Option<LayerId>, kind: LayerKind) {
    if let Some(l) = layer {
        net.layer_mut(l).set_kind(kind);
    }
}

/// Apply the current activations of `from` as external input to `to`
fn copy_acts(net: &mut Network, from: LayerId, to: Option<LayerId>) -> Result<()> {
    if let Some(to) = to {
        let acts = net.layer(from).values(ActVar::Act);
        net.apply_ext(to, &acts)?;
    }
    Ok(())
}

/// Four-quarter trial controller bound to one network topology
pub struct AlphaCycle {
    topo: HipTopology,
    protocol: Protocol,
    params: AlphaParams,
    time: Time,
    mem: MemStats,
    ca3_cor: Ca3Correlations,
    observers: Vec<Box<dyn CycleObserver>>,
}

impl AlphaCycle {
    /// Resolve the topology of `net` and check it against `protocol`
    pub fn new(net: &Network, protocol: Protocol, params: AlphaParams) -> Result<Self> {
        let topo = HipTopology::resolve(net)?;
        Self::with_topology(topo, protocol, params)
    }

    pub fn with_topology(topo: HipTopology, protocol: Protocol, params: AlphaParams) -> Result<Self> {
        protocol.check(&topo)?;
        Ok(Self {
            topo,
            protocol,
            time: Time::new(params.cyc_per_qtr),
            params,
            mem: MemStats::default(),
            ca3_cor: Ca3Correlations::default(),
            observers: Vec::new(),
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn set_protocol(&mut self, protocol: Protocol) -> Result<()> {
        protocol.check(&self.topo)?;
        self.protocol = protocol;
        Ok(())
    }

    pub fn topology(&self) -> &HipTopology {
        &self.topo
    }

    pub fn params(&self) -> &AlphaParams {
        &self.params
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    /// Memory statistics of the last trial
    pub fn mem_stats(&self) -> &MemStats {
        &self.mem
    }

    pub fn ca3_correlations(&self) -> &Ca3Correlations {
        &self.ca3_cor
    }

    pub fn add_observer(&mut self, observer: Box<dyn CycleObserver>) {
        self.observers.push(observer);
    }

    /// Clear per-run state: statistics and the cycle clock
    pub fn reset(&mut self) {
        self.mem = MemStats::default();
        self.ca3_cor = Ca3Correlations::default();
        self.time = Time::new(self.params.cyc_per_qtr);
    }

    /// Run one full alpha cycle; external inputs must already be applied
    pub fn run_trial(&mut self, net: &mut Network, train: bool) -> Result<()> {
        if train {
            net.wt_from_dwt();
        }
        let scope = TrialScope::capture(net);
        let base_mossy = self.setup(net, train);

        let schedule = self.protocol.schedule(self.params.cyc_per_qtr);
        net.alpha_cycle_init();
        self.time.cyc_per_qtr = self.params.cyc_per_qtr;
        self.time.alpha_cycle_start();
        for (qtr, &n_cyc) in schedule.iter().enumerate() {
            for cyc in 0..n_cyc {
                net.step_cycle(&self.time);
                self.mid_quarter(net, qtr, cyc, train)?;
                self.time.cycle_inc();
                self.notify(net, train, |c| c.on_cycle(cyc, n_cyc));
            }
            self.transition(net, qtr + 1, train, base_mossy)?;
            net.finalize_quarter(&self.time);
            if qtr + 1 == 3 {
                let judge_as_train = train || self.protocol == Protocol::Autoencoder;
                self.update_mem_stats(net, judge_as_train);
            }
            if qtr + 1 == 4 && self.protocol.tracks_ca3() {
                self.ca3_cor = self.ca3_correlations_of(net);
            }
            self.time.quarter_inc();
            self.notify(net, train, |c| c.on_quarter(qtr));
        }

        scope.restore_scales(net);
        if train {
            net.dwt();
        }
        scope.restore_flags(net);
        net.recompute_input_scaling();
        self.notify(net, train, |c| c == UpdateCadence::AlphaCycle);
        log::debug!(
            "[ALPHA] {}: {} trial done, mem={} fp={:.3} fn={:.3}",
            self.protocol,
            if train { "train" } else { "test" },
            self.mem.mem,
            self.mem.false_positive_rate(),
            self.mem.false_negative_rate(train),
        );
        Ok(())
    }

    /// Statistics of the trial just run
    pub fn trial_stats(&self, net: &Network, train: bool) -> TrialStats {
        let ec_out = net.layer(self.topo.ec_out);
        let (sse, avg_sse) = sse(&ec_out.values(ActVar::ActM), &ec_out.values(ActVar::Targ));
        TrialStats {
            sse,
            avg_sse,
            cos_diff: ec_out.cos_diff() as f64,
            mem: self.mem,
            train,
        }
    }

    fn notify(&mut self, net: &Network, train: bool, due: impl Fn(UpdateCadence) -> bool) {
        let time = self.time;
        for obs in self.observers.iter_mut() {
            if due(obs.cadence()) {
                obs.refresh(net, &time, train);
            }
        }
    }

    fn set_ca1_drive(&self, net: &mut Network, from_ec: bool) {
        let (ec, ca3) = if from_ec { (1.0, 0.0) } else { (0.0, 1.0) };
        net.projection_mut(self.topo.ca1_from_ec_in).wt_scale.abs = ec;
        net.projection_mut(self.topo.ca1_from_ca3).wt_scale.abs = ca3;
    }

    fn set_mossy(&self, net: &mut Network, base: Option<f32>, del: f32) {
        if let (Some(p), Some(base)) = (self.topo.ca3_from_dg, base) {
            net.projection_mut(p).wt_scale.rel = base - del;
        }
    }

    /// Per-trial flags, kinds and quarter-0 scales; returns the base mossy rel
    fn setup(&self, net: &mut Network, train: bool) -> Option<f32> {
        let t = &self.topo;
        let ec_ca1 = t.ec_ca1_prjns();
        let hippo = t.hippo_prjns();
        let auto_prjns = [t.autohid_from_autoin, t.auto_from_autohid, t.autohid_from_auto];
        let hip_layers = [Some(t.ca1), Some(t.ca3), t.dg, Some(t.ec_in)];
        let target_or_compare = if train { LayerKind::Target } else { LayerKind::Compare };
        let base_mossy = t.ca3_from_dg.map(|p| net.projection(p).wt_scale.rel);

        match self.protocol {
            Protocol::EncodeRecall => {
                set_learn(net, &ec_ca1, true);
                set_learn(net, &hippo, true);
                set_learn_opt(net, &auto_prjns, false);
                if let Some(p) = t.output_from_cortex {
                    net.projection_mut(p).wt_scale.rel = if self.params.hip_only { 0.0 } else { 0.5 };
                }
                set_off(net, &hip_layers, false);
                set_off(net, &[t.cortex], false);
                set_kind(net, Some(t.ec_out), target_or_compare);
                set_kind(net, t.output, LayerKind::Target);
            }
            Protocol::PreTrain => {
                set_learn(net, &ec_ca1, true);
                set_learn(net, &hippo, true);
                set_off(net, &[Some(t.ca1), Some(t.ec_in)], false);
                set_off(net, &[Some(t.ca3), t.dg, t.cortex], true);
                set_kind(net, Some(t.ec_out), target_or_compare);
            }
            Protocol::RetrievalPractice => {
                set_learn(net, &ec_ca1, false);
                set_learn(net, &hippo, true);
                set_learn_opt(net, &auto_prjns, false);
                if let Some(p) = t.autohid_from_autoin {
                    net.projection_mut(p).wt_scale.abs = 1.0;
                }
                set_off(net, &hip_layers, false);
                set_off(net, &[t.cortex], false);
                set_kind(net, Some(t.ec_out), target_or_compare);
                set_kind(net, t.output, target_or_compare);
            }
            Protocol::RetrievalPracticeAutoencoder => {
                set_learn(net, &ec_ca1, false);
                set_learn(net, &hippo, false);
                set_learn_opt(net, &[t.autohid_from_ec_out, t.auto_from_autohid, t.autohid_from_auto], true);
                if let Some(p) = t.autohid_from_ec_out {
                    net.projection_mut(p).wt_scale.abs = 0.0;
                }
                set_off(net, &hip_layers, false);
                set_off(net, &[t.cortex], false);
                set_kind(net, Some(t.ec_out), LayerKind::Compare);
                set_kind(net, t.output, LayerKind::Compare);
            }
            Protocol::Restudy => {
                set_learn(net, &ec_ca1, false);
                set_learn(net, &hippo, true);
                set_off(net, &hip_layers, false);
                set_off(net, &[t.cortex], true);
                for l in t.autoencoder_layers() {
                    net.layer_mut(l).set_off(true);
                }
                set_kind(net, Some(t.ec_out), target_or_compare);
            }
            Protocol::Autoencoder => {
                set_learn(net, &ec_ca1, false);
                set_learn(net, &hippo, false);
                set_learn_opt(net, &auto_prjns, true);
                set_off(net, &hip_layers, true);
                set_off(net, &[t.cortex], true);
                set_off(net, &[t.autohid, t.auto, Some(t.ec_out)], false);
                set_kind(net, t.autoin, LayerKind::Input);
                if !train {
                    set_kind(net, Some(t.ec_out), LayerKind::Input);
                }
                return base_mossy;
            }
        }

        self.set_ca1_drive(net, true);
        self.set_mossy(net, base_mossy, self.params.mossy_del);
        base_mossy
    }

    /// Clamps that land inside a quarter
    fn mid_quarter(&self, net: &mut Network, qtr: usize, cyc: usize, train: bool) -> Result<()> {
        if self.protocol == Protocol::RetrievalPractice && train && qtr == 2 && cyc == RP_AUTOIN_CYCLE {
            copy_acts(net, self.topo.ec_out, self.topo.autoin)?;
        }
        Ok(())
    }

    /// Changes made as quarter `next - 1` ends, before it is finalized
    fn transition(&self, net: &mut Network, next: usize, train: bool, base_mossy: Option<f32>) -> Result<()> {
        if self.protocol == Protocol::Autoencoder {
            return Ok(());
        }
        let t = &self.topo;
        let p = &self.params;
        match next {
            1 => {
                self.set_ca1_drive(net, false);
                let del = match self.protocol {
                    // Both modes recall at test strength
                    Protocol::RetrievalPractice | Protocol::RetrievalPracticeAutoencoder => p.mossy_del_test,
                    _ if train => 0.0,
                    _ => p.mossy_del_test,
                };
                self.set_mossy(net, base_mossy, del);
                net.recompute_input_scaling();
                log::trace!("[ALPHA] {}: CA1 switched to CA3 recall", self.protocol);
            }
            2 if self.protocol == Protocol::RetrievalPracticeAutoencoder => {
                if let Some(pj) = t.autohid_from_ec_out {
                    net.projection_mut(pj).wt_scale.abs = 1.0;
                }
                net.recompute_input_scaling();
            }
            3 => {
                match self.protocol {
                    Protocol::RetrievalPractice | Protocol::RetrievalPracticeAutoencoder => {
                        self.set_ca1_drive(net, false);
                    }
                    _ => self.set_ca1_drive(net, true),
                }
                net.recompute_input_scaling();
                if train {
                    match self.protocol {
                        Protocol::EncodeRecall => {
                            copy_acts(net, t.ec_in, Some(t.ec_out))?;
                            copy_acts(net, t.ec_in, t.output)?;
                        }
                        Protocol::PreTrain | Protocol::Restudy => {
                            copy_acts(net, t.ec_in, Some(t.ec_out))?;
                        }
                        Protocol::RetrievalPractice => {
                            copy_acts(net, t.ec_out, t.output)?;
                            if let Some(auto) = t.auto {
                                copy_acts(net, auto, Some(t.ec_out))?;
                            }
                        }
                        Protocol::RetrievalPracticeAutoencoder | Protocol::Autoencoder => {}
                    }
                }
                log::trace!("[ALPHA] {}: plus phase set up", self.protocol);
            }
            _ => {}
        }
        Ok(())
    }

    fn update_mem_stats(&mut self, net: &Network, train: bool) {
        let out = net.layer(self.topo.mem_layer());
        let shape = out.shape();
        let n = if self.params.mem_pools > 0 && shape.is_pooled() {
            (self.params.mem_pools * shape.pool_size()).min(out.len())
        } else {
            out.len()
        };
        let act_m = out.values(ActVar::ActM);
        let targ = out.values(ActVar::Targ);
        let cue = net.layer(self.topo.ec_in).values(ActVar::ActQ1);
        self.mem = score_memory(
            &act_m[..n],
            &targ[..n],
            &cue[..n.min(cue.len())],
            self.params.mem_thr,
            train,
            self.mem.mem,
        );
    }

    fn ca3_correlations_of(&self, net: &Network) -> Ca3Correlations {
        let ca3 = net.layer(self.topo.ca3);
        let q1 = ca3.values(ActVar::ActQ1);
        let q2 = ca3.values(ActVar::ActQ2);
        let m = ca3.values(ActVar::ActM);
        let p = ca3.values(ActVar::ActP);
        Ca3Correlations {
            q1_q2: correlation(&q1, &q2),
            q2_m: correlation(&q2, &m),
            m_p: correlation(&m, &p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HipParams, ParamSet};
    use crate::hip::observer::CycleRecorder;
    use crate::hip::topology::{build_hippocampus, build_minimal};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::{Arc, Mutex};

    const PATTERN: [f32; 4] = [1.0, 0.0, 1.0, 0.0];

    fn small_params() -> AlphaParams {
        AlphaParams {
            cyc_per_qtr: 10,
            mem_pools: 2,
            ..Default::default()
        }
    }

    fn small_hip() -> Network {
        let mut rng = StdRng::seed_from_u64(2);
        build_hippocampus(&HipParams::small(), ParamSet::Base, &mut rng).unwrap()
    }

    fn pattern_for(net: &Network, id: LayerId, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        use rand::Rng;
        (0..net.layer(id).len())
            .map(|_| if rng.gen::<f32>() < 0.3 { 1.0 } else { 0.0 })
            .collect()
    }

    fn apply_pattern(net: &mut Network, topo: &HipTopology, protocol: Protocol) {
        net.init_ext();
        let pat = pattern_for(net, topo.ec_in, 9);
        match protocol {
            Protocol::Autoencoder => {
                net.apply_ext(topo.autoin.unwrap(), &pat).unwrap();
                net.apply_ext(topo.auto.unwrap(), &pat).unwrap();
            }
            Protocol::RetrievalPractice | Protocol::RetrievalPracticeAutoencoder => {
                net.apply_ext(topo.input.unwrap(), &pat).unwrap();
                net.apply_ext(topo.ec_out, &pat).unwrap();
            }
            _ => {
                net.apply_ext(topo.input.unwrap(), &pat).unwrap();
                net.apply_ext(topo.output.unwrap(), &pat).unwrap();
            }
        }
    }

    fn scales(net: &Network) -> Vec<WtScale> {
        net.projections().iter().map(|p| p.wt_scale).collect()
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if na > 0.0 && nb > 0.0 {
            dot / (na * nb)
        } else {
            0.0
        }
    }

    #[test]
    fn test_protocol_names_round_trip() {
        for p in Protocol::ALL {
            assert_eq!(Protocol::from_name(p.name()), Some(p));
        }
        assert_eq!(Protocol::from_name("RPAE"), Some(Protocol::RetrievalPracticeAutoencoder));
        assert_eq!(Protocol::from_name("bogus"), None);
    }

    #[test]
    fn test_schedules() {
        assert_eq!(Protocol::EncodeRecall.schedule(25), [25; 4]);
        assert_eq!(Protocol::RetrievalPractice.schedule(25), [25, 25, 100, 25]);
        assert_eq!(Protocol::RetrievalPracticeAutoencoder.schedule(25), [25, 50, 75, 25]);
    }

    #[test]
    fn test_protocol_requirements_checked_up_front() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = build_minimal(0.01, 0.1, &mut rng).unwrap();
        assert!(AlphaCycle::new(&net, Protocol::EncodeRecall, small_params()).is_ok());
        for p in [
            Protocol::RetrievalPractice,
            Protocol::RetrievalPracticeAutoencoder,
            Protocol::Autoencoder,
        ] {
            let err = AlphaCycle::new(&net, p, small_params()).err();
            assert!(err.is_some(), "{} must reject the minimal topology", p);
        }
        let mut ac = AlphaCycle::new(&net, Protocol::EncodeRecall, small_params()).unwrap();
        assert!(ac.set_protocol(Protocol::Autoencoder).is_err());
        assert_eq!(ac.protocol(), Protocol::EncodeRecall, "failed switch leaves protocol as is");
    }

    #[test]
    fn test_weight_scales_restored_for_every_protocol() {
        for protocol in Protocol::ALL {
            for train in [true, false] {
                let mut net = small_hip();
                let mut ac = AlphaCycle::new(&net, protocol, small_params()).unwrap();
                let topo = ac.topology().clone();
                apply_pattern(&mut net, &topo, protocol);
                let before = scales(&net);
                let learn_before: Vec<bool> = net.projections().iter().map(|p| p.learn).collect();
                let kinds_before: Vec<LayerKind> = net.layers().iter().map(|l| l.kind()).collect();
                ac.run_trial(&mut net, train).unwrap();
                assert_eq!(scales(&net), before, "{} train={} leaked scale changes", protocol, train);
                let learn_after: Vec<bool> = net.projections().iter().map(|p| p.learn).collect();
                assert_eq!(learn_after, learn_before, "{} leaked learn flags", protocol);
                let kinds_after: Vec<LayerKind> = net.layers().iter().map(|l| l.kind()).collect();
                assert_eq!(kinds_after, kinds_before, "{} leaked layer kinds", protocol);
                assert!(net.layers().iter().all(|l| !l.is_off()), "{} left layers off", protocol);
            }
        }
    }

    #[test]
    fn test_delta_applied_at_next_trial() {
        let mut net = small_hip();
        let mut ac = AlphaCycle::new(&net, Protocol::EncodeRecall, small_params()).unwrap();
        let topo = ac.topology().clone();
        apply_pattern(&mut net, &topo, Protocol::EncodeRecall);
        let pj = topo.ca1_from_ec_in;
        let lwt0: Vec<f32> = net.projection(pj).syns().iter().map(|s| s.lwt).collect();

        ac.run_trial(&mut net, true).unwrap();
        let lwt1: Vec<f32> = net.projection(pj).syns().iter().map(|s| s.lwt).collect();
        assert_eq!(lwt1, lwt0, "weights must not move within the trial");
        let any_dwt = topo
            .ec_ca1_prjns()
            .into_iter()
            .chain(topo.hippo_prjns())
            .any(|p| net.projection(p).syns().iter().any(|s| s.dwt != 0.0));
        assert!(any_dwt, "training trial should leave pending deltas");

        let pending = net.projection(pj).syns().iter().filter(|s| s.dwt != 0.0).count();
        assert!(pending > 0, "ECin -> CA1 should carry pending deltas");
        ac.run_trial(&mut net, true).unwrap();
        let lwt2: Vec<f32> = net.projection(pj).syns().iter().map(|s| s.lwt).collect();
        assert_ne!(lwt2, lwt0, "pending deltas fold in when the next trial begins");
    }

    #[test]
    fn test_test_trial_does_not_learn() {
        let mut net = small_hip();
        let mut ac = AlphaCycle::new(&net, Protocol::EncodeRecall, small_params()).unwrap();
        let topo = ac.topology().clone();
        apply_pattern(&mut net, &topo, Protocol::EncodeRecall);
        ac.run_trial(&mut net, false).unwrap();
        for p in net.projections() {
            assert!(p.syns().iter().all(|s| s.dwt == 0.0), "{} accumulated in test", p.name());
        }
    }

    #[test]
    fn test_pretrain_keeps_ca3_silent() {
        let mut net = small_hip();
        let mut ac = AlphaCycle::new(&net, Protocol::PreTrain, small_params()).unwrap();
        let topo = ac.topology().clone();
        apply_pattern(&mut net, &topo, Protocol::PreTrain);
        ac.run_trial(&mut net, true).unwrap();
        assert!(net.layer(topo.ca3).values(ActVar::ActM).iter().all(|&a| a == 0.0));
        let schaffer = net.projection(topo.ca1_from_ca3);
        assert!(schaffer.syns().iter().all(|s| s.dwt == 0.0), "off sender must not learn");
    }

    #[test]
    fn test_autoencoder_learns_only_autoencoder() {
        let mut net = small_hip();
        let mut ac = AlphaCycle::new(&net, Protocol::Autoencoder, small_params()).unwrap();
        let topo = ac.topology().clone();
        apply_pattern(&mut net, &topo, Protocol::Autoencoder);
        ac.run_trial(&mut net, true).unwrap();
        for p in topo.hippo_prjns().into_iter().chain(topo.ec_ca1_prjns()) {
            assert!(net.projection(p).syns().iter().all(|s| s.dwt == 0.0));
        }
        let auto = net.projection(topo.auto_from_autohid.unwrap());
        assert!(auto.syns().iter().any(|s| s.dwt != 0.0), "autoencoder should learn");
    }

    #[test]
    fn test_recorder_sees_every_test_cycle() {
        let mut net = small_hip();
        let mut ac = AlphaCycle::new(&net, Protocol::EncodeRecall, small_params()).unwrap();
        let topo = ac.topology().clone();
        let rec = Arc::new(Mutex::new(CycleRecorder::new(vec![topo.ca1, topo.ec_out])));
        ac.add_observer(Box::new(rec.clone()));
        apply_pattern(&mut net, &topo, Protocol::EncodeRecall);

        ac.run_trial(&mut net, true).unwrap();
        assert!(rec.lock().unwrap().samples().is_empty(), "training cycles are not recorded");
        ac.run_trial(&mut net, false).unwrap();
        let guard = rec.lock().unwrap();
        assert_eq!(guard.samples().len(), 40);
        assert!(guard.samples().iter().all(|s| s.means.len() == 2));
    }

    #[test]
    fn test_observers_do_not_change_trajectory() {
        let run = |observe: bool| {
            let mut net = small_hip();
            let mut ac = AlphaCycle::new(&net, Protocol::EncodeRecall, small_params()).unwrap();
            let topo = ac.topology().clone();
            if observe {
                ac.add_observer(Box::new(Arc::new(Mutex::new(CycleRecorder::new(vec![topo.ca3])))));
            }
            apply_pattern(&mut net, &topo, Protocol::EncodeRecall);
            ac.run_trial(&mut net, false).unwrap();
            net.layer(topo.ec_out).values(ActVar::ActM)
        };
        assert_eq!(run(false), run(true));
    }

    #[test]
    fn test_trial_stats_are_finite() {
        let mut net = small_hip();
        let mut ac = AlphaCycle::new(&net, Protocol::EncodeRecall, small_params()).unwrap();
        let topo = ac.topology().clone();
        apply_pattern(&mut net, &topo, Protocol::EncodeRecall);
        ac.run_trial(&mut net, true).unwrap();
        let st = ac.trial_stats(&net, true);
        assert!(st.sse.is_finite() && st.avg_sse.is_finite() && st.cos_diff.is_finite());
        assert!(st.mem_score() == 0.0 || st.mem_score() == 1.0);
        let cor = ac.ca3_correlations();
        assert!(cor.q1_q2.is_finite() && cor.m_p.is_finite());
    }

    #[test]
    fn test_minimal_network_cosine_never_drops() {
        let params = AlphaParams {
            cyc_per_qtr: 25,
            mem_pools: 0,
            ..Default::default()
        };
        for seed in [1u64, 2, 3, 5, 7, 11] {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut net = build_minimal(0.01, 0.1, &mut rng).unwrap();
            let mut ac = AlphaCycle::new(&net, Protocol::EncodeRecall, params.clone()).unwrap();
            let topo = ac.topology().clone();

            let mut cos = Vec::with_capacity(50);
            for _ in 0..50 {
                net.init_ext();
                net.apply_ext(topo.ec_in, &PATTERN).unwrap();
                net.apply_ext(topo.ec_out, &PATTERN).unwrap();
                ac.run_trial(&mut net, true).unwrap();
                let out = net.layer(topo.ec_out).values(ActVar::ActM);
                let c = cosine(&out, &PATTERN);
                assert!(c.is_finite());
                cos.push(c);
            }

            for (t, pair) in cos.windows(2).enumerate() {
                assert!(
                    pair[1] >= pair[0] - 1e-3,
                    "seed {}: cosine fell from {} to {} at trial {}: {:?}",
                    seed,
                    pair[0],
                    pair[1],
                    t + 1,
                    cos
                );
            }
            assert!(cos[49] > 0.95, "seed {}: recall should reach the target: {:?}", seed, cos);
        }
    }
}
