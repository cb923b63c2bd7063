//! Read-only observers of the alpha cycle
//!
//! Observers receive `&Network` at their chosen cadence and can never alter
//! the numeric trajectory of a trial.

use crate::net::{ActVar, LayerId, Network, Time};
use std::sync::{Arc, Mutex};

/// How often an observer is refreshed
///
/// Ordered from finest to coarsest. Every cadence up to `Quarter` is also
/// refreshed at quarter ends; `Phase` only after quarters 2 and 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum UpdateCadence {
    /// Every cycle
    Cycle,
    /// Every 10 cycles
    FastSpike,
    /// End of each quarter
    Quarter,
    /// End of the minus and plus phases
    Phase,
    /// End of the trial
    AlphaCycle,
}

impl UpdateCadence {
    /// Refresh after cycle `cyc` (0-based) of a quarter `n` cycles long?
    pub(crate) fn on_cycle(&self, cyc: usize, n: usize) -> bool {
        match self {
            // The last cycle is covered by the quarter refresh
            UpdateCadence::Cycle => cyc + 1 != n,
            UpdateCadence::FastSpike => (cyc + 1) % 10 == 0,
            _ => false,
        }
    }

    /// Refresh at the end of `quarter`?
    pub(crate) fn on_quarter(&self, quarter: usize) -> bool {
        match self {
            UpdateCadence::Phase => quarter >= 2,
            UpdateCadence::AlphaCycle => false,
            _ => true,
        }
    }
}

/// Receives network snapshots during a trial
pub trait CycleObserver {
    fn cadence(&self) -> UpdateCadence;

    fn refresh(&mut self, net: &Network, time: &Time, train: bool);
}

/// Shared observers stay readable by their owner between trials
impl<T: CycleObserver> CycleObserver for Arc<Mutex<T>> {
    fn cadence(&self) -> UpdateCadence {
        match self.lock() {
            Ok(o) => o.cadence(),
            Err(_) => UpdateCadence::AlphaCycle,
        }
    }

    fn refresh(&mut self, net: &Network, time: &Time, train: bool) {
        if let Ok(mut o) = self.lock() {
            o.refresh(net, time, train);
        }
    }
}

/// One recorded cycle
#[derive(Clone, Debug, PartialEq)]
pub struct CycleSample {
    pub cycle: usize,
    pub quarter: usize,
    /// Mean activation per watched layer, in watch order
    pub means: Vec<f32>,
}

/// Records mean layer activity every cycle of test trials
#[derive(Clone, Debug, Default)]
pub struct CycleRecorder {
    layers: Vec<LayerId>,
    samples: Vec<CycleSample>,
}

impl CycleRecorder {
    pub fn new(layers: Vec<LayerId>) -> Self {
        Self {
            layers,
            samples: Vec::new(),
        }
    }

    pub fn samples(&self) -> &[CycleSample] {
        &self.samples
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl CycleObserver for CycleRecorder {
    fn cadence(&self) -> UpdateCadence {
        UpdateCadence::Cycle
    }

    fn refresh(&mut self, net: &Network, time: &Time, train: bool) {
        if train {
            return;
        }
        // A new trial restarts the cycle count
        if self.samples.last().map_or(false, |s| s.cycle >= time.cycle) {
            self.samples.clear();
        }
        let means = self
            .layers
            .iter()
            .map(|&id| {
                let acts = net.layer(id).values(ActVar::Act);
                acts.iter().sum::<f32>() / acts.len().max(1) as f32
            })
            .collect();
        self.samples.push(CycleSample {
            cycle: time.cycle,
            quarter: time.quarter,
            means,
        });
    }
}
