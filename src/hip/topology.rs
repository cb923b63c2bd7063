//! Hippocampal network construction and handle resolution
//!
//! [`build_hippocampus`] lays out the full EC / DG / CA3 / CA1 circuit with
//! its cortical and autoencoder side routes. [`HipTopology::resolve`] then
//! looks every population and pathway up once, so the trial loop only ever
//! touches typed handles.

use crate::config::{HipParams, ParamSet, PathwayParams};
use crate::error::{HipError, Result};
use crate::learn::{LearningRule, MinusPhase};
use crate::net::{InhibParams, LayerId, LayerKind, LayerParams, Network, Pattern, ProjId, ProjectionSpec, Shape};
use rand::Rng;

/// Layer names
pub mod names {
    pub const INPUT: &str = "Input";
    pub const EC_IN: &str = "ECin";
    pub const EC_OUT: &str = "ECout";
    pub const DG: &str = "DG";
    pub const CA3: &str = "CA3";
    pub const CA1: &str = "CA1";
    pub const CORTEX: &str = "Cortex";
    pub const OUTPUT: &str = "Output";
    pub const AUTOIN: &str = "Autoin";
    pub const AUTOHID: &str = "Autohid";
    pub const AUTO: &str = "Auto";
}

use names::*;

fn ec_params() -> LayerParams {
    let mut p = LayerParams::with_inhib(InhibParams::pools(2.0, 0.2));
    p.act.gbar_l = 0.1;
    p
}

/// CHL projection carrying one pathway's learning settings
fn pathway(pattern: Pattern, pp: &PathwayParams) -> ProjectionSpec {
    let mut spec = ProjectionSpec::new(pattern)
        .rule(LearningRule::ContrastiveHebbian(pp.chl()))
        .lrate(pp.lrate);
    spec.params.norm.on = pp.norm;
    spec.params.momentum.on = pp.momentum;
    spec
}

/// Build the full hippocampal network with initialized weights
pub fn build_hippocampus<R: Rng>(hp: &HipParams, set: ParamSet, rng: &mut R) -> Result<Network> {
    hp.validate()?;
    let mut net = Network::new("Hip_bench");
    let ec = Shape::pooled(hp.ec_size.y, hp.ec_size.x, hp.ec_pool.y, hp.ec_pool.x);
    let dg_size = hp.dg_size();

    let input = net.add_layer(INPUT, LayerKind::Input, ec, LayerParams::default())?;
    let ec_in = net.add_layer(EC_IN, LayerKind::Hidden, ec, ec_params())?;
    let ec_out = net.add_layer(EC_OUT, LayerKind::Target, ec, ec_params())?;
    let auto = net.add_layer(
        AUTO,
        LayerKind::Target,
        ec,
        LayerParams::with_inhib(InhibParams::pools(1.4, 0.1)),
    )?;
    let autoin = net.add_layer(AUTOIN, LayerKind::Hidden, ec, LayerParams::default())?;
    let autohid = net.add_layer(
        AUTOHID,
        LayerKind::Hidden,
        Shape::pooled(hp.ec_size.y, hp.ec_size.x, hp.autohid_pool.y, hp.autohid_pool.x),
        LayerParams::with_inhib(InhibParams::pools(2.0, 0.1)),
    )?;
    let ca1 = net.add_layer(
        CA1,
        LayerKind::Hidden,
        Shape::pooled(hp.ec_size.y, hp.ec_size.x, hp.ca1_pool.y, hp.ca1_pool.x),
        LayerParams::with_inhib(InhibParams::pools(2.4, 0.1)),
    )?;
    let dg = net.add_layer(
        DG,
        LayerKind::Hidden,
        Shape::grid(dg_size.y, dg_size.x),
        LayerParams::with_inhib(InhibParams::layer(3.8, 0.01)),
    )?;
    let ca3 = net.add_layer(
        CA3,
        LayerKind::Hidden,
        Shape::grid(hp.ca3_size.y, hp.ca3_size.x),
        LayerParams::with_inhib(InhibParams::layer(2.8, 0.02)),
    )?;
    let output = net.add_layer(
        OUTPUT,
        LayerKind::Target,
        ec,
        LayerParams::with_inhib(InhibParams::pools(2.0, 0.1)),
    )?;
    let cortex = net.add_layer(
        CORTEX,
        LayerKind::Hidden,
        Shape::grid(hp.cortex_size.y, hp.cortex_size.x),
        LayerParams::with_inhib(InhibParams::layer(1.8, 0.088)),
    )?;

    let pool1to1 = Pattern::pool_one_to_one();
    let pw = &hp.pathways;

    net.connect(input, ec_in, ProjectionSpec::fixed(Pattern::OneToOne, 0.8), rng)?;
    net.connect(
        ec_out,
        ec_in,
        ProjectionSpec::fixed(Pattern::OneToOne, 0.9).init(0.9, 0.01).rel(0.5),
        rng,
    )?;
    net.connect(ec_out, output, ProjectionSpec::new(Pattern::OneToOne).learn(false).rel(0.5), rng)?;

    net.connect(ec_in, ca1, pathway(pool1to1, &pw.ec_ca1), rng)?;
    net.connect(ca1, ec_out, pathway(pool1to1, &pw.ec_ca1).abs(4.0), rng)?;
    net.connect(ec_out, ca1, pathway(pool1to1, &pw.ec_ca1), rng)?;

    net.connect(autohid, auto, ProjectionSpec::new(pool1to1).lrate(0.08), rng)?;
    net.connect(auto, autohid, ProjectionSpec::new(pool1to1).lrate(0.08), rng)?;
    net.connect(autoin, autohid, ProjectionSpec::new(pool1to1), rng)?;
    // Silent and frozen outside retrieval practice with the autoencoder
    net.connect(
        ec_out,
        autohid,
        ProjectionSpec::new(pool1to1).lrate(0.08).abs(0.0).learn(false),
        rng,
    )?;

    let into_cortex = Pattern::PoolOneToOne {
        send_start: 0,
        recv_start: 0,
        n_pools: Some(3),
    };
    let cortex_out = Pattern::PoolOneToOne {
        send_start: 0,
        recv_start: 0,
        n_pools: Some(2),
    };
    net.connect(input, cortex, ProjectionSpec::new(into_cortex), rng)?;
    net.connect(cortex, output, ProjectionSpec::new(cortex_out).rel(1.0), rng)?;
    net.connect(output, cortex, ProjectionSpec::new(cortex_out), rng)?;

    // Perforant path
    net.connect(ec_in, dg, pathway(Pattern::UniformRandom { pcon: hp.dg_pcon }, &pw.dg), rng)?;
    net.connect(
        ec_in,
        ca3,
        pathway(Pattern::UniformRandom { pcon: hp.ca3_pcon }, &pw.perforant),
        rng,
    )?;
    net.connect(ca3, ca3, pathway(Pattern::Full, &pw.ca3_recurrent).rel(0.1), rng)?;

    // Schaffer collaterals
    let mut schaffer = pw.schaffer;
    if set == ParamSet::RetrievalPractice {
        schaffer.minus = MinusPhase::Q2;
    }
    net.connect(ca3, ca1, pathway(Pattern::Full, &schaffer), rng)?;

    // Mossy fibers
    net.connect(
        dg,
        ca3,
        pathway(Pattern::UniformRandom { pcon: hp.mossy_pcon }, &pw.mossy)
            .init(0.9, 0.01)
            .rel(4.0)
            .learn(false),
        rng,
    )?;

    net.init_weights(rng);
    log::debug!(
        "[TOPO] {}: {} layers, {} projections",
        net.name(),
        net.layers().len(),
        net.projections().len()
    );
    Ok(net)
}

/// Soft units, light inhibition and a fixed expected activity
///
/// With the full network's gain and inhibition, one of four CA1 units
/// crossing threshold flips the recalled pattern between trials.
fn minimal_layer_params() -> LayerParams {
    let mut inhib = InhibParams::layer(0.5, 0.5);
    inhib.act_avg.fixed = true;
    let mut params = LayerParams::with_inhib(inhib);
    params.act.gain = 10.0;
    params
}

/// Four-unit EC -> CA3 -> CA1 -> EC loop with a direct EC -> CA1 route
///
/// `hebb` and `lrate` configure the CA3 -> CA1 pathway. ECin -> CA3 stays
/// frozen, so CA3 is a stable code for the clamped EC pattern.
pub fn build_minimal<R: Rng>(hebb: f32, lrate: f32, rng: &mut R) -> Result<Network> {
    let mut net = Network::new("Hip_minimal");
    let shape = Shape::grid(1, 4);
    let ec_in = net.add_layer(EC_IN, LayerKind::Hidden, shape, minimal_layer_params())?;
    let ca3 = net.add_layer(CA3, LayerKind::Hidden, shape, minimal_layer_params())?;
    let ca1 = net.add_layer(CA1, LayerKind::Hidden, shape, minimal_layer_params())?;
    let ec_out = net.add_layer(EC_OUT, LayerKind::Target, shape, minimal_layer_params())?;

    net.connect(ec_in, ca3, ProjectionSpec::fixed(Pattern::Full, 0.5).init(0.5, 0.2), rng)?;
    net.connect(
        ca3,
        ca1,
        ProjectionSpec::new(Pattern::Full)
            .rule(LearningRule::chl(hebb))
            .lrate(lrate)
            .plain(),
        rng,
    )?;
    let encoder = PathwayParams::encoder(0.04);
    net.connect(ec_in, ca1, pathway(Pattern::Full, &encoder), rng)?;
    net.connect(ca1, ec_out, pathway(Pattern::Full, &encoder), rng)?;
    net.init_weights(rng);
    Ok(net)
}

/// Resolved handles into a hippocampal network
///
/// The core of ECin, ECout, CA3, CA1 and the two CA1 drivers is required;
/// the rest is resolved when present and checked per protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HipTopology {
    pub ec_in: LayerId,
    pub ec_out: LayerId,
    pub ca3: LayerId,
    pub ca1: LayerId,
    pub input: Option<LayerId>,
    pub dg: Option<LayerId>,
    pub output: Option<LayerId>,
    pub cortex: Option<LayerId>,
    pub autoin: Option<LayerId>,
    pub autohid: Option<LayerId>,
    pub auto: Option<LayerId>,

    pub ca1_from_ec_in: ProjId,
    pub ca1_from_ca3: ProjId,
    pub ec_out_from_ca1: Option<ProjId>,
    pub ca1_from_ec_out: Option<ProjId>,
    pub dg_from_ec_in: Option<ProjId>,
    pub ca3_from_ec_in: Option<ProjId>,
    pub ca3_from_ca3: Option<ProjId>,
    pub ca3_from_dg: Option<ProjId>,
    pub output_from_cortex: Option<ProjId>,
    pub autohid_from_autoin: Option<ProjId>,
    pub autohid_from_ec_out: Option<ProjId>,
    pub auto_from_autohid: Option<ProjId>,
    pub autohid_from_auto: Option<ProjId>,
}

fn required_layer(net: &Network, name: &str) -> Result<LayerId> {
    net.layer_by_name(name).ok_or_else(|| HipError::MissingLayer(name.to_string()))
}

fn required_prjn(net: &Network, send: &str, recv: &str) -> Result<ProjId> {
    net.projection_between(send, recv)
        .ok_or_else(|| HipError::missing_projection(send, recv))
}

impl HipTopology {
    pub fn resolve(net: &Network) -> Result<Self> {
        let topo = Self {
            ec_in: required_layer(net, EC_IN)?,
            ec_out: required_layer(net, EC_OUT)?,
            ca3: required_layer(net, CA3)?,
            ca1: required_layer(net, CA1)?,
            input: net.layer_by_name(INPUT),
            dg: net.layer_by_name(DG),
            output: net.layer_by_name(OUTPUT),
            cortex: net.layer_by_name(CORTEX),
            autoin: net.layer_by_name(AUTOIN),
            autohid: net.layer_by_name(AUTOHID),
            auto: net.layer_by_name(AUTO),
            ca1_from_ec_in: required_prjn(net, EC_IN, CA1)?,
            ca1_from_ca3: required_prjn(net, CA3, CA1)?,
            ec_out_from_ca1: net.projection_between(CA1, EC_OUT),
            ca1_from_ec_out: net.projection_between(EC_OUT, CA1),
            dg_from_ec_in: net.projection_between(EC_IN, DG),
            ca3_from_ec_in: net.projection_between(EC_IN, CA3),
            ca3_from_ca3: net.projection_between(CA3, CA3),
            ca3_from_dg: net.projection_between(DG, CA3),
            output_from_cortex: net.projection_between(CORTEX, OUTPUT),
            autohid_from_autoin: net.projection_between(AUTOIN, AUTOHID),
            autohid_from_ec_out: net.projection_between(EC_OUT, AUTOHID),
            auto_from_autohid: net.projection_between(AUTOHID, AUTO),
            autohid_from_auto: net.projection_between(AUTO, AUTOHID),
        };
        log::debug!(
            "[TOPO] {}: resolved core, output={} dg={} autoencoder={}",
            net.name(),
            topo.output.is_some(),
            topo.dg.is_some(),
            topo.auto.is_some()
        );
        Ok(topo)
    }

    /// Population scored by memory statistics: Output when present
    pub fn mem_layer(&self) -> LayerId {
        self.output.unwrap_or(self.ec_out)
    }

    /// Unwrap an optional layer or report it by name
    pub fn layer(id: Option<LayerId>, name: &str) -> Result<LayerId> {
        id.ok_or_else(|| HipError::MissingLayer(name.to_string()))
    }

    /// Unwrap an optional projection or report it by endpoint names
    pub fn prjn(id: Option<ProjId>, send: &str, recv: &str) -> Result<ProjId> {
        id.ok_or_else(|| HipError::missing_projection(send, recv))
    }

    /// Encoder pathways between EC and CA1
    pub fn ec_ca1_prjns(&self) -> Vec<ProjId> {
        let mut v = vec![self.ca1_from_ec_in];
        v.extend(self.ec_out_from_ca1);
        v.extend(self.ca1_from_ec_out);
        v
    }

    /// DG, CA3 and Schaffer pathways
    pub fn hippo_prjns(&self) -> Vec<ProjId> {
        let mut v = vec![self.ca1_from_ca3];
        v.extend(self.dg_from_ec_in);
        v.extend(self.ca3_from_ec_in);
        v.extend(self.ca3_from_ca3);
        v.extend(self.ca3_from_dg);
        v
    }

    /// Autoencoder pathways, including the ECout tap
    pub fn autoencoder_prjns(&self) -> Vec<ProjId> {
        [
            self.autohid_from_autoin,
            self.autohid_from_ec_out,
            self.auto_from_autohid,
            self.autohid_from_auto,
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn autoencoder_layers(&self) -> Vec<LayerId> {
        [self.autoin, self.autohid, self.auto].into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HipParams;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_net() -> Network {
        let mut rng = StdRng::seed_from_u64(2);
        build_hippocampus(&HipParams::small(), ParamSet::Base, &mut rng).unwrap()
    }

    #[test]
    fn test_full_topology_resolves() {
        let net = small_net();
        let topo = HipTopology::resolve(&net).unwrap();
        assert!(topo.dg.is_some() && topo.output.is_some() && topo.cortex.is_some());
        assert!(topo.ca3_from_dg.is_some());
        assert_eq!(topo.mem_layer(), topo.output.unwrap());
        assert_eq!(topo.autoencoder_prjns().len(), 4);
        assert_eq!(topo.hippo_prjns().len(), 5);
        assert_eq!(topo.ec_ca1_prjns().len(), 3);
    }

    #[test]
    fn test_pathway_settings() {
        let net = small_net();
        let mossy = net.projection(net.projection_between(DG, CA3).unwrap());
        assert!(!mossy.learn);
        assert_eq!(mossy.wt_scale.rel, 4.0);
        assert!(mossy.rule.is_chl());

        let schaffer = net.projection(net.projection_between(CA3, CA1).unwrap());
        let chl = schaffer.rule.chl_params().unwrap();
        assert!((chl.hebb() - 0.01).abs() < 1e-6);
        assert!((chl.err() - 0.99).abs() < 1e-6);
        assert_eq!(chl.minus, MinusPhase::ActM);
        assert!((schaffer.params.lrate - 0.05).abs() < 1e-6);

        let back = net.projection(net.projection_between(CA1, EC_OUT).unwrap());
        assert_eq!(back.wt_scale.abs, 4.0);
        assert_eq!(back.rule.chl_params().unwrap().minus, MinusPhase::Q1);

        let inp = net.projection(net.projection_between(INPUT, EC_IN).unwrap());
        assert!(inp.syns().iter().all(|sy| (sy.wt - 0.8).abs() < 1e-6));
    }

    #[test]
    fn test_retrieval_practice_param_set() {
        let mut rng = StdRng::seed_from_u64(2);
        let net = build_hippocampus(&HipParams::small(), ParamSet::RetrievalPractice, &mut rng).unwrap();
        let schaffer = net.projection(net.projection_between(CA3, CA1).unwrap());
        assert_eq!(schaffer.rule.chl_params().unwrap().minus, MinusPhase::Q2);
    }

    #[test]
    fn test_configured_pathways_flow_into_projections() {
        let mut hp = HipParams::small();
        hp.pathways.schaffer.hebb = 0.05;
        hp.pathways.schaffer.savg_thr = 0.02;
        hp.pathways.dg.lrate = 0.3;
        hp.pathways.perforant.norm = true;
        let mut rng = StdRng::seed_from_u64(2);
        let net = build_hippocampus(&hp, ParamSet::Base, &mut rng).unwrap();

        let schaffer = net.projection(net.projection_between(CA3, CA1).unwrap());
        let chl = schaffer.rule.chl_params().unwrap();
        assert!((chl.hebb() - 0.05).abs() < 1e-6);
        assert!((chl.err() - 0.95).abs() < 1e-6);
        assert_eq!(chl.savg_thr, 0.02);
        let dg = net.projection(net.projection_between(EC_IN, DG).unwrap());
        assert!((dg.params.lrate - 0.3).abs() < 1e-6);
        let perforant = net.projection(net.projection_between(EC_IN, CA3).unwrap());
        assert!(perforant.params.norm.on);
        assert!(!perforant.params.momentum.on);
    }

    #[test]
    fn test_invalid_pathway_fails_build() {
        let mut hp = HipParams::small();
        hp.pathways.schaffer.hebb = 2.0;
        let mut rng = StdRng::seed_from_u64(2);
        let err = build_hippocampus(&hp, ParamSet::Base, &mut rng).unwrap_err();
        assert!(matches!(err, HipError::Config(_)), "got {:?}", err);
    }

    #[test]
    fn test_cortex_routes_limited_to_pools() {
        let net = small_net();
        let hp = HipParams::small();
        let pool = hp.ec_pool.len();
        let into = net.projection(net.projection_between(INPUT, CORTEX).unwrap());
        assert_eq!(into.len(), 3 * pool * hp.cortex_size.len());
        let out = net.projection(net.projection_between(CORTEX, OUTPUT).unwrap());
        assert_eq!(out.len(), hp.cortex_size.len() * 2 * pool);
    }

    #[test]
    fn test_minimal_resolves_without_extras() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = build_minimal(0.01, 0.1, &mut rng).unwrap();
        let topo = HipTopology::resolve(&net).unwrap();
        assert_eq!(topo.mem_layer(), topo.ec_out);
        assert!(topo.dg.is_none());
        assert!(matches!(
            HipTopology::layer(topo.dg, DG),
            Err(HipError::MissingLayer(ref n)) if n == "DG"
        ));
    }

    #[test]
    fn test_missing_core_is_fatal() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut net = Network::new("partial");
        let a = net.add_layer(EC_IN, LayerKind::Hidden, Shape::grid(1, 4), LayerParams::default()).unwrap();
        let b = net.add_layer(CA1, LayerKind::Hidden, Shape::grid(1, 4), LayerParams::default()).unwrap();
        net.connect(a, b, ProjectionSpec::new(Pattern::Full), &mut rng).unwrap();
        let err = HipTopology::resolve(&net).unwrap_err();
        assert!(matches!(err, HipError::MissingLayer(ref n) if n == "ECout"));

        net.add_layer(EC_OUT, LayerKind::Target, Shape::grid(1, 4), LayerParams::default()).unwrap();
        net.add_layer(CA3, LayerKind::Hidden, Shape::grid(1, 4), LayerParams::default()).unwrap();
        let err = HipTopology::resolve(&net).unwrap_err();
        assert!(matches!(err, HipError::MissingProjection { ref send, .. } if send == "CA3"));
    }
}
