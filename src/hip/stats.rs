//! Memory-completion and trial statistics
//!
//! ## Memory score
//!
//! Output `ActM` and targets are binarized at 0.5. Target-on bits whose cue
//! unit (ECin `ActQ1`) was below 0.5 are *completion* bits: they had to be
//! recalled rather than read off the input. A trial counts as remembered
//! when both the false-positive rate and the false-negative rate (all bits
//! in training, completion bits in testing) are below the threshold.

use serde::{Deserialize, Serialize};

/// Binarization threshold for activations and targets
pub const BIN_THR: f32 = 0.5;

/// Per-unit tolerance for squared error
pub const SSE_TOL: f32 = 0.5;

/// Result of scoring one trial's recall
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemStats {
    /// 1 when remembered, 0 when not
    pub mem: f64,
    /// Target-on bits that stayed off, over all target-on bits
    pub trg_on_was_off_all: f64,
    /// Target-on completion bits that stayed off, over completion bits
    pub trg_on_was_off_cmp: f64,
    /// Target-off bits that came on, over target-off bits
    pub trg_off_was_on: f64,
    pub trg_on_n: usize,
    pub trg_off_n: usize,
    /// Completion bits
    pub cmp_n: usize,
}

impl MemStats {
    /// False-negative rate the score was judged on
    pub fn false_negative_rate(&self, train: bool) -> f64 {
        if train {
            self.trg_on_was_off_all
        } else {
            self.trg_on_was_off_cmp
        }
    }

    pub fn false_positive_rate(&self) -> f64 {
        self.trg_off_was_on
    }
}

fn rate(count: usize, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        count as f64 / n as f64
    }
}

/// Score recall of `targ` by `act_m` given the cue `cue`
///
/// All three slices are read up to the shortest length. A test trial with
/// no completion bits keeps `prev_mem` as its score.
pub fn score_memory(act_m: &[f32], targ: &[f32], cue: &[f32], thr: f64, train: bool, prev_mem: f64) -> MemStats {
    let (mut on_off_all, mut on_off_cmp, mut off_on) = (0usize, 0usize, 0usize);
    let (mut on_n, mut off_n, mut cmp_n) = (0usize, 0usize, 0usize);
    for ((&a, &t), &c) in act_m.iter().zip(targ).zip(cue) {
        if t < BIN_THR {
            off_n += 1;
            if a > BIN_THR {
                off_on += 1;
            }
            continue;
        }
        on_n += 1;
        let missed = a < BIN_THR;
        if c < BIN_THR {
            cmp_n += 1;
            if missed {
                on_off_cmp += 1;
            }
        }
        if missed {
            on_off_all += 1;
        }
    }

    let mut st = MemStats {
        mem: prev_mem,
        trg_on_was_off_all: rate(on_off_all, on_n),
        trg_on_was_off_cmp: on_off_cmp as f64,
        trg_off_was_on: rate(off_on, off_n),
        trg_on_n: on_n,
        trg_off_n: off_n,
        cmp_n,
    };
    let remembered = |fn_rate: f64| fn_rate < thr && st.trg_off_was_on < thr;
    if train {
        st.mem = if remembered(st.trg_on_was_off_all) { 1.0 } else { 0.0 };
    } else if cmp_n > 0 {
        st.trg_on_was_off_cmp = rate(on_off_cmp, cmp_n);
        st.mem = if remembered(st.trg_on_was_off_cmp) { 1.0 } else { 0.0 };
    } else {
        log::warn!("[STATS] test trial has no completion bits, memory score unchanged");
    }
    st
}

/// Sum squared error of `act` against `targ`, ignoring per-unit errors
/// within tolerance; returns (sse, sse / n)
pub fn sse(act: &[f32], targ: &[f32]) -> (f64, f64) {
    let mut sum = 0.0f64;
    let mut n = 0usize;
    for (&a, &t) in act.iter().zip(targ) {
        n += 1;
        let d = (t - a).abs();
        if d < SSE_TOL {
            continue;
        }
        sum += (d * d) as f64;
    }
    let avg = if n > 0 { sum / n as f64 } else { 0.0 };
    (sum, avg)
}

/// Pearson correlation; 0 when either side is constant
pub fn correlation(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let ma = a[..n].iter().sum::<f32>() / n as f32;
    let mb = b[..n].iter().sum::<f32>() / n as f32;
    let (mut cov, mut va, mut vb) = (0.0f32, 0.0f32, 0.0f32);
    for (&x, &y) in a[..n].iter().zip(&b[..n]) {
        let (dx, dy) = (x - ma, y - mb);
        cov += dx * dy;
        va += dx * dx;
        vb += dy * dy;
    }
    let denom = (va * vb).sqrt();
    if denom > 0.0 {
        cov / denom
    } else {
        0.0
    }
}

/// Correlations between successive CA3 snapshots of one trial
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ca3Correlations {
    pub q1_q2: f32,
    pub q2_m: f32,
    pub m_p: f32,
}

/// Statistics of one trial
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialStats {
    pub sse: f64,
    pub avg_sse: f64,
    pub cos_diff: f64,
    pub mem: MemStats,
    pub train: bool,
}

impl TrialStats {
    pub fn mem_score(&self) -> f64 {
        self.mem.mem
    }

    pub fn false_positive_rate(&self) -> f64 {
        self.mem.false_positive_rate()
    }

    pub fn false_negative_rate(&self) -> f64 {
        self.mem.false_negative_rate(self.train)
    }
}

/// Aggregate over one epoch of trials
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub trials: usize,
    /// Mean trial SSE
    pub sse: f64,
    pub avg_sse: f64,
    /// Fraction of trials with nonzero SSE
    pub pct_err: f64,
    pub pct_cor: f64,
    pub cos_diff: f64,
    /// Mean memory score
    pub mem: f64,
    pub trg_on_was_off: f64,
    pub trg_off_was_on: f64,
}

impl EpochSummary {
    pub fn from_trials(epoch: usize, trials: &[TrialStats]) -> Self {
        let n = trials.len();
        if n == 0 {
            return Self {
                epoch,
                ..Default::default()
            };
        }
        let nf = n as f64;
        let mean = |f: &dyn Fn(&TrialStats) -> f64| trials.iter().map(f).sum::<f64>() / nf;
        let pct_err = trials.iter().filter(|t| t.sse != 0.0).count() as f64 / nf;
        Self {
            epoch,
            trials: n,
            sse: mean(&|t| t.sse),
            avg_sse: mean(&|t| t.avg_sse),
            pct_err,
            pct_cor: 1.0 - pct_err,
            cos_diff: mean(&|t| t.cos_diff),
            mem: mean(&|t| t.mem.mem),
            trg_on_was_off: mean(&|t| t.false_negative_rate()),
            trg_off_was_on: mean(&|t| t.false_positive_rate()),
        }
    }
}

/// Running epoch accumulator plus the stopping criterion
#[derive(Clone, Debug, Default)]
pub struct EpochStats {
    trials: Vec<TrialStats>,
    /// First test epoch with a perfect memory score
    pub first_zero: Option<usize>,
    /// Consecutive perfect test epochs
    pub n_zero: usize,
}

impl EpochStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Drop accumulated trials, keeping the stopping counters
    pub fn clear_trials(&mut self) {
        self.trials.clear();
    }

    pub fn push(&mut self, trial: TrialStats) {
        self.trials.push(trial);
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Summarize and clear the accumulated trials
    pub fn finish_epoch(&mut self, epoch: usize) -> EpochSummary {
        let summary = EpochSummary::from_trials(epoch, &self.trials);
        self.trials.clear();
        summary
    }

    /// Track perfect test epochs
    pub fn record_test(&mut self, test: &EpochSummary) {
        if test.mem >= 1.0 {
            if self.first_zero.is_none() {
                self.first_zero = Some(test.epoch);
            }
            self.n_zero += 1;
        } else {
            self.n_zero = 0;
        }
    }

    /// True once `n_zero_stop` consecutive perfect test epochs were seen
    pub fn learned(&self, n_zero_stop: usize) -> bool {
        n_zero_stop > 0 && self.n_zero >= n_zero_stop
    }
}
