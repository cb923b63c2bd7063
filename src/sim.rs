//! # Experiment Driver
//!
//! [`Simulation`] owns the network, the trial controller, the pattern
//! tables and the run/epoch bookkeeping. Training proceeds in phases; each
//! phase presents its table in shuffled order once per epoch.
//!
//! ## Phases
//!
//! | Phase | Protocol | Table | Epoch limit | Ends the run |
//! |-------|----------|-------|-------------|--------------|
//! | `Train` | encode-recall | TrainAB | `max_epochs` | yes |
//! | `PreTrain` | pretrain | TrainAll | `pre_train_epochs` | no |
//! | `RetrievalPractice` | rp | TrainRP | `max_epochs` | no |
//! | `RetrievalPracticeAutoencoder` | rpae | TrainRP | `max_epochs` | no |
//! | `Restudy` | restudy | TrainAB | `max_epochs` | no |
//! | `Autoencoder` | ae | TrainNoise | `ae_train_epochs` | no |
//!
//! Training tests the AB list every `test_interval` epochs and stops
//! early once `n_zero_stop` consecutive test epochs are fully remembered.
//!
//! Once a run has ended, the next training trial starts a new
//! run; side phases such as restudy or retrieval practice continue on the finished
//! run's weights. The stop flag is only looked at between trials.

use crate::config::{RunParams, SimConfig};
use crate::error::{HipError, Result};
use crate::hip::{
    build_hippocampus, AlphaCycle, AlphaParams, CycleObserver, EpochStats, EpochSummary, HipTopology, Protocol,
    TrialStats,
};
use crate::net::{LayerId, Network};
use crate::patterns::{PatternTable, Patterns};
use crate::persist::WeightsSnapshot;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Training phase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Train,
    PreTrain,
    RetrievalPractice,
    RetrievalPracticeAutoencoder,
    Restudy,
    Autoencoder,
}

impl Phase {
    pub fn protocol(self) -> Protocol {
        match self {
            Phase::Train => Protocol::EncodeRecall,
            Phase::PreTrain => Protocol::PreTrain,
            Phase::RetrievalPractice => Protocol::RetrievalPractice,
            Phase::RetrievalPracticeAutoencoder => Protocol::RetrievalPracticeAutoencoder,
            Phase::Restudy => Protocol::Restudy,
            Phase::Autoencoder => Protocol::Autoencoder,
        }
    }

    pub fn from_protocol(protocol: Protocol) -> Self {
        match protocol {
            Protocol::EncodeRecall => Phase::Train,
            Protocol::PreTrain => Phase::PreTrain,
            Protocol::RetrievalPractice => Phase::RetrievalPractice,
            Protocol::RetrievalPracticeAutoencoder => Phase::RetrievalPracticeAutoencoder,
            Protocol::Restudy => Phase::Restudy,
            Protocol::Autoencoder => Phase::Autoencoder,
        }
    }

    fn table(self) -> Table {
        match self {
            Phase::Train | Phase::Restudy => Table::TrainAb,
            Phase::PreTrain => Table::TrainAll,
            Phase::RetrievalPractice | Phase::RetrievalPracticeAutoencoder => Table::TrainRp,
            Phase::Autoencoder => Table::TrainNoise,
        }
    }

    fn epoch_limit(self, run: &RunParams) -> usize {
        match self {
            Phase::PreTrain => run.pre_train_epochs,
            Phase::Autoencoder => run.ae_train_epochs,
            _ => run.max_epochs,
        }
    }

    fn ends_run(self) -> bool {
        matches!(self, Phase::Train)
    }
}

/// Outcome of one training trial
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrialStep {
    /// Trial inside an epoch
    Trial(TrialStats),
    /// Last trial of an epoch
    EpochEnd(TrialStats, EpochSummary),
    /// Last trial of the phase; for run-ending phases, of the run
    PhaseEnd(TrialStats, EpochSummary),
}

impl TrialStep {
    pub fn stats(&self) -> &TrialStats {
        match self {
            TrialStep::Trial(st) | TrialStep::EpochEnd(st, _) | TrialStep::PhaseEnd(st, _) => st,
        }
    }

    pub fn epoch_summary(&self) -> Option<&EpochSummary> {
        match self {
            TrialStep::Trial(_) => None,
            TrialStep::EpochEnd(_, s) | TrialStep::PhaseEnd(_, s) => Some(s),
        }
    }

    pub fn phase_done(&self) -> bool {
        matches!(self, TrialStep::PhaseEnd(..))
    }
}

/// Summary of a finished run
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunRecord {
    pub run: usize,
    /// Training epochs completed
    pub epochs: usize,
    /// First test epoch with every item remembered
    pub first_zero: Option<usize>,
    pub last_test: Option<EpochSummary>,
}

/// Pattern tables the driver presents
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Table {
    TrainAb,
    TrainAll,
    TestAb,
    TrainRp,
    TrainNoise,
}

impl Table {
    const ALL: [Table; 5] = [
        Table::TrainAb,
        Table::TrainAll,
        Table::TestAb,
        Table::TrainRp,
        Table::TrainNoise,
    ];

    fn of(self, pats: &Patterns) -> &PatternTable {
        match self {
            Table::TrainAb => &pats.train_ab,
            Table::TrainAll => pats.train_all(),
            Table::TestAb => &pats.test_ab,
            Table::TrainRp => &pats.train_rp,
            Table::TrainNoise => &pats.train_noise,
        }
    }
}

/// Clamped layers of one table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TableLayers {
    input: LayerId,
    output: LayerId,
}

impl TableLayers {
    fn resolve(net: &Network, table: &PatternTable) -> Result<Self> {
        let find = |name: &str| net.layer_by_name(name).ok_or_else(|| HipError::MissingLayer(name.to_string()));
        Ok(Self {
            input: find(table.input_layer)?,
            output: find(table.output_layer)?,
        })
    }
}

fn apply_row(net: &mut Network, table: &PatternTable, layers: TableLayers, idx: usize) -> Result<()> {
    let row = table
        .rows
        .get(idx)
        .ok_or_else(|| HipError::Config(format!("{} has no item {}", table.name, idx)))?;
    net.init_ext();
    net.apply_ext(layers.input, &row.input)?;
    net.apply_ext(layers.output, &row.output)?;
    Ok(())
}

/// Simulation context
pub struct Simulation {
    cfg: SimConfig,
    net: Network,
    alpha: AlphaCycle,
    pats: Patterns,
    /// Indexed by `Table as usize`
    table_layers: Vec<TableLayers>,
    rng: StdRng,
    phase: Phase,
    phase_done: bool,
    order: Vec<usize>,
    pos: usize,
    epoch: usize,
    run: usize,
    stats: EpochStats,
    train_log: Vec<EpochSummary>,
    test_log: Vec<EpochSummary>,
    records: Vec<RunRecord>,
    stop: Arc<AtomicBool>,
    needs_new_run: bool,
}

impl Simulation {
    /// Build the network and patterns, then start run 0
    pub fn new(cfg: SimConfig) -> Result<Self> {
        cfg.validate()?;
        let mut rng = StdRng::seed_from_u64(cfg.run.seed);
        let net = build_hippocampus(&cfg.hip, cfg.run.param_set, &mut rng)?;
        let pats = Patterns::generate(&cfg.hip, &cfg.pat, &mut rng)?;
        let alpha = AlphaCycle::new(&net, Protocol::EncodeRecall, AlphaParams::from_config(&cfg))?;
        let table_layers = Table::ALL
            .iter()
            .map(|t| TableLayers::resolve(&net, t.of(&pats)))
            .collect::<Result<Vec<_>>>()?;
        let mut sim = Self {
            cfg,
            net,
            alpha,
            pats,
            table_layers,
            rng,
            phase: Phase::Train,
            phase_done: false,
            order: Vec::new(),
            pos: 0,
            epoch: 0,
            run: 0,
            stats: EpochStats::new(),
            train_log: Vec::new(),
            test_log: Vec::new(),
            records: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
            needs_new_run: true,
        };
        sim.new_run()?;
        Ok(sim)
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    pub fn network(&self) -> &Network {
        &self.net
    }

    pub fn topology(&self) -> &HipTopology {
        self.alpha.topology()
    }

    pub fn patterns(&self) -> &Patterns {
        &self.pats
    }

    pub fn protocol(&self) -> Protocol {
        self.alpha.protocol()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current run index
    pub fn run(&self) -> usize {
        self.run
    }

    /// Epochs completed in the current phase
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn epoch_stats(&self) -> &EpochStats {
        &self.stats
    }

    pub fn train_log(&self) -> &[EpochSummary] {
        &self.train_log
    }

    pub fn test_log(&self) -> &[EpochSummary] {
        &self.test_log
    }

    pub fn run_records(&self) -> &[RunRecord] {
        &self.records
    }

    /// True once every configured run has ended
    pub fn is_finished(&self) -> bool {
        self.records.len() >= self.cfg.run.runs
    }

    pub fn add_observer(&mut self, observer: Box<dyn CycleObserver>) {
        self.alpha.add_observer(observer);
    }

    /// Shared flag that halts the driver loops before the next trial
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Reseed, reinitialize weights and clear statistics for the current run
    pub fn new_run(&mut self) -> Result<()> {
        self.rng = StdRng::seed_from_u64(self.cfg.run.seed.wrapping_add(self.run as u64));
        self.net.init_weights(&mut self.rng);
        self.net.init_acts();
        self.alpha.reset();
        self.stats.reset();
        self.train_log.clear();
        self.test_log.clear();
        self.enter_phase(Phase::Train)?;
        self.needs_new_run = false;
        log::info!("[SIM] run {}: started (seed {})", self.run, self.cfg.run.seed.wrapping_add(self.run as u64));
        Ok(())
    }

    fn enter_phase(&mut self, phase: Phase) -> Result<()> {
        self.alpha.set_protocol(phase.protocol())?;
        self.phase = phase;
        self.phase_done = false;
        self.epoch = 0;
        self.stats.clear_trials();
        self.shuffle();
        log::debug!("[SIM] run {}: entering {:?}", self.run, phase);
        Ok(())
    }

    fn shuffle(&mut self) {
        let n = self.phase.table().of(&self.pats).len();
        self.order = (0..n).collect();
        self.order.shuffle(&mut self.rng);
        self.pos = 0;
    }

    fn run_end(&mut self) {
        let rec = RunRecord {
            run: self.run,
            epochs: self.epoch,
            first_zero: self.stats.first_zero,
            last_test: self.test_log.last().copied(),
        };
        log::info!(
            "[SIM] run {}: done after {} epochs, first_zero={:?}",
            rec.run,
            rec.epochs,
            rec.first_zero
        );
        self.records.push(rec);
        self.needs_new_run = true;
    }

    fn present(&mut self, table: Table, idx: usize) -> Result<()> {
        apply_row(&mut self.net, table.of(&self.pats), self.table_layers[table as usize], idx)
    }

    /// Advance the run counter and start that run
    pub fn next_run(&mut self) -> Result<()> {
        self.run += 1;
        self.new_run()
    }

    /// Run one training trial of `phase`, handling epoch and run boundaries
    ///
    /// After a run ends, only a run-ending phase moves on to the next run;
    /// other phases keep working on the finished run's weights. Once every
    /// configured run has ended, a run-ending phase fails with
    /// [`HipError::RunsFinished`].
    pub fn trial(&mut self, phase: Phase) -> Result<TrialStep> {
        if self.needs_new_run && phase.ends_run() {
            if self.is_finished() {
                return Err(HipError::RunsFinished(self.cfg.run.runs));
            }
            self.next_run()?;
        }
        if phase != self.phase || self.phase_done {
            self.enter_phase(phase)?;
        }
        let idx = self.order[self.pos];
        self.pos += 1;
        self.present(phase.table(), idx)?;
        self.alpha.run_trial(&mut self.net, true)?;
        let st = self.alpha.trial_stats(&self.net, true);
        self.stats.push(st);
        if self.pos < self.order.len() {
            return Ok(TrialStep::Trial(st));
        }

        let summary = self.stats.finish_epoch(self.epoch);
        self.epoch += 1;
        self.train_log.push(summary);
        log::info!(
            "[SIM] run {} {:?} epoch {}: sse={:.3} pct_err={:.2} cos_diff={:.3} mem={:.2}",
            self.run,
            phase,
            summary.epoch,
            summary.sse,
            summary.pct_err,
            summary.cos_diff,
            summary.mem
        );

        let limit = phase.epoch_limit(&self.cfg.run);
        if phase.ends_run() {
            if let Some(iv) = self.cfg.run.test_interval {
                if self.epoch % iv == 0 {
                    self.test_all()?;
                }
            }
            if self.stats.learned(self.cfg.run.n_zero_stop) || self.epoch >= limit {
                self.run_end();
                return Ok(TrialStep::PhaseEnd(st, summary));
            }
        } else if self.epoch >= limit {
            self.phase_done = true;
            return Ok(TrialStep::PhaseEnd(st, summary));
        }
        self.shuffle();
        Ok(TrialStep::EpochEnd(st, summary))
    }

    pub fn train_trial(&mut self) -> Result<TrialStep> {
        self.trial(Phase::Train)
    }

    /// Trials of `phase` until the current epoch ends; None if stopped first
    pub fn epoch_of(&mut self, phase: Phase) -> Result<Option<EpochSummary>> {
        self.stop.store(false, Ordering::SeqCst);
        loop {
            if self.stopped() {
                return Ok(None);
            }
            if let Some(s) = self.trial(phase)?.epoch_summary() {
                return Ok(Some(*s));
            }
        }
    }

    /// Epochs of `phase` until it ends; the summaries of completed epochs
    pub fn run_phase(&mut self, phase: Phase) -> Result<Vec<EpochSummary>> {
        self.stop.store(false, Ordering::SeqCst);
        let mut out = Vec::new();
        loop {
            if self.stopped() {
                return Ok(out);
            }
            let step = self.trial(phase)?;
            if let Some(s) = step.epoch_summary() {
                out.push(*s);
            }
            if step.phase_done() {
                return Ok(out);
            }
        }
    }

    pub fn train_epoch(&mut self) -> Result<Option<EpochSummary>> {
        self.epoch_of(Phase::Train)
    }

    /// Train until the current run ends; None if stopped first
    pub fn train_run(&mut self) -> Result<Option<RunRecord>> {
        let before = self.records.len();
        self.run_phase(Phase::Train)?;
        Ok(if self.records.len() > before {
            self.records.last().copied()
        } else {
            None
        })
    }

    /// Train every remaining run
    pub fn train_all_runs(&mut self) -> Result<&[RunRecord]> {
        while !self.is_finished() {
            if self.train_run()?.is_none() {
                break;
            }
        }
        Ok(&self.records)
    }

    pub fn pre_train(&mut self) -> Result<Vec<EpochSummary>> {
        self.run_phase(Phase::PreTrain)
    }

    pub fn retrieval_practice_epoch(&mut self) -> Result<Option<EpochSummary>> {
        self.epoch_of(Phase::RetrievalPractice)
    }

    pub fn retrieval_practice_autoencoder_epoch(&mut self) -> Result<Option<EpochSummary>> {
        self.epoch_of(Phase::RetrievalPracticeAutoencoder)
    }

    pub fn restudy_epoch(&mut self) -> Result<Option<EpochSummary>> {
        self.epoch_of(Phase::Restudy)
    }

    pub fn autoencoder_epoch(&mut self) -> Result<Option<EpochSummary>> {
        self.epoch_of(Phase::Autoencoder)
    }

    fn test_item(&mut self, protocol: Protocol, table: Table, idx: usize) -> Result<TrialStats> {
        let prev = self.alpha.protocol();
        self.alpha.set_protocol(protocol)?;
        let res = self
            .present(table, idx)
            .and_then(|_| self.alpha.run_trial(&mut self.net, false));
        self.alpha.set_protocol(prev)?;
        res?;
        Ok(self.alpha.trial_stats(&self.net, false))
    }

    /// Test one AB item without learning
    pub fn test_trial(&mut self, idx: usize) -> Result<TrialStats> {
        self.test_item(Protocol::EncodeRecall, Table::TestAb, idx)
    }

    fn test_table(&mut self, protocol: Protocol, table: Table) -> Result<EpochSummary> {
        let n = table.of(&self.pats).len();
        let mut trials = Vec::with_capacity(n);
        for i in 0..n {
            if self.stopped() {
                break;
            }
            trials.push(self.test_item(protocol, table, i)?);
        }
        Ok(EpochSummary::from_trials(self.epoch, &trials))
    }

    /// Test every AB item; updates the stopping counters
    pub fn test_all(&mut self) -> Result<EpochSummary> {
        let summary = self.test_table(Protocol::EncodeRecall, Table::TestAb)?;
        self.stats.record_test(&summary);
        self.test_log.push(summary);
        log::info!(
            "[SIM] run {} test after epoch {}: mem={:.2} fn={:.3} fp={:.3} n_zero={}",
            self.run,
            summary.epoch,
            summary.mem,
            summary.trg_on_was_off,
            summary.trg_off_was_on,
            self.stats.n_zero
        );
        Ok(summary)
    }

    /// Test the autoencoder on the noise table
    pub fn test_autoencoder(&mut self) -> Result<EpochSummary> {
        let summary = self.test_table(Protocol::Autoencoder, Table::TrainNoise)?;
        log::info!("[SIM] run {} autoencoder test: mem={:.2}", self.run, summary.mem);
        Ok(summary)
    }

    pub fn save_weights(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        WeightsSnapshot::capture(&self.net).save(path)
    }

    pub fn load_weights(&mut self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let snap = WeightsSnapshot::load(path)?;
        snap.apply(&mut self.net)?;
        Ok(())
    }
}
