//! Paired-associate pattern lists
//!
//! Every EC pattern is six pools: `A`, `B`, a per-item `C` pool and three
//! context pools. Item pools are sparse random binary codes with a minimum
//! pairwise difference; context pools are copies of one of three list
//! prototypes with a few bits flipped per item.
//!
//! | Table | Input pools | Target pools |
//! |-------|-------------|--------------|
//! | `train_ab` | A B C ctxt | A B C ctxt |
//! | `test_ab` | - - C ctxt | A B C ctxt |
//! | `train_rp` | - - C ctxt | A B C ctxt (on ECout) |
//! | `train_noise` | - - C ctxt (on Autoin) | A B C ctxt (on Auto) |

use crate::config::{HipParams, PatParams};
use crate::error::{HipError, Result};
use crate::hip::names;
use rand::seq::index::sample;
use rand::Rng;
use std::collections::BTreeMap;

/// Pools per EC pattern
pub const N_POOLS: usize = 6;

/// Context variants generated, four per prototype
const N_CTXT: usize = 12;

/// Redraws allowed while enforcing the minimum difference
const MAX_REDRAWS: usize = 100;

/// Number of units for a fraction of `n`, rounded to nearest
pub fn n_from_pct(pct: f32, n: usize) -> usize {
    (pct * n as f32).round() as usize
}

/// Named pool-sized pattern rows
#[derive(Clone, Debug, Default)]
pub struct PoolVocab {
    pool_len: usize,
    entries: BTreeMap<String, Vec<Vec<f32>>>,
}

impl PoolVocab {
    pub fn new(pool_len: usize) -> Self {
        Self {
            pool_len,
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[Vec<f32>]> {
        self.entries.get(name).map(|v| v.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    fn add_empty(&mut self, name: &str, rows: usize) {
        self.entries.insert(name.to_string(), vec![vec![0.0; self.pool_len]; rows]);
    }

    /// Rows with exactly `n_on` active bits, each pair differing in at least
    /// `min_diff` of them
    fn add_permuted_binary<R: Rng>(&mut self, name: &str, rows: usize, n_on: usize, min_diff: f32, rng: &mut R) {
        let n_on = n_on.min(self.pool_len);
        let need = min_diff * n_on as f32;
        let mut out: Vec<Vec<f32>> = Vec::with_capacity(rows);
        let mut exhausted = 0usize;
        for _ in 0..rows {
            let mut row = self.random_row(n_on, rng);
            for _ in 0..MAX_REDRAWS {
                let close = out.iter().any(|prev| ((n_on - overlap(prev, &row)) as f32) < need);
                if !close {
                    break;
                }
                row = self.random_row(n_on, rng);
            }
            if out.iter().any(|prev| ((n_on - overlap(prev, &row)) as f32) < need) {
                exhausted += 1;
            }
            out.push(row);
        }
        if exhausted > 0 {
            log::warn!(
                "[PATS] {}: {} of {} rows closer than min_diff {:.2} after {} redraws",
                name,
                exhausted,
                rows,
                min_diff,
                MAX_REDRAWS
            );
        }
        self.entries.insert(name.to_string(), out);
    }

    fn random_row<R: Rng>(&self, n_on: usize, rng: &mut R) -> Vec<f32> {
        let mut row = vec![0.0; self.pool_len];
        for i in sample(rng, self.pool_len, n_on) {
            row[i] = 1.0;
        }
        row
    }

    /// `rows` copies of row `src_row` of `src`
    fn add_repeat(&mut self, name: &str, rows: usize, src: &str, src_row: usize) -> Result<()> {
        let row = self
            .entries
            .get(src)
            .and_then(|v| v.get(src_row))
            .cloned()
            .ok_or_else(|| HipError::Config(format!("vocab {} has no row {}", src, src_row)))?;
        self.entries.insert(name.to_string(), vec![row; rows]);
        Ok(())
    }

    /// Turn `n_off` active bits off and `n_on` inactive bits on in every row
    fn flip_bits<R: Rng>(&mut self, name: &str, n_off: usize, n_on: usize, rng: &mut R) {
        if let Some(rows) = self.entries.get_mut(name) {
            for row in rows.iter_mut() {
                flip_row(row, n_off, n_on, rng);
            }
        }
    }

    /// Make each row a drifted copy of the one before it
    fn drift<R: Rng>(&mut self, name: &str, n_flip: usize, rng: &mut R) {
        if let Some(rows) = self.entries.get_mut(name) {
            for i in 1..rows.len() {
                let mut next = rows[i - 1].clone();
                flip_row(&mut next, n_flip, n_flip, rng);
                rows[i] = next;
            }
        }
    }

    /// Concatenate row `row` of each named entry, pool after pool
    fn mix(&self, pools: &[&str], row: usize) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(pools.len() * self.pool_len);
        for name in pools {
            let r = self
                .entries
                .get(*name)
                .and_then(|v| v.get(row))
                .ok_or_else(|| HipError::Config(format!("vocab {} has no row {}", name, row)))?;
            out.extend_from_slice(r);
        }
        Ok(out)
    }
}

fn overlap(a: &[f32], b: &[f32]) -> usize {
    a.iter().zip(b).filter(|(x, y)| **x > 0.5 && **y > 0.5).count()
}

fn flip_row<R: Rng>(row: &mut [f32], n_off: usize, n_on: usize, rng: &mut R) {
    let on: Vec<usize> = (0..row.len()).filter(|&i| row[i] > 0.5).collect();
    let off: Vec<usize> = (0..row.len()).filter(|&i| row[i] <= 0.5).collect();
    for k in sample(rng, on.len(), n_off.min(on.len())) {
        row[on[k]] = 0.0;
    }
    for k in sample(rng, off.len(), n_on.min(off.len())) {
        row[off[k]] = 1.0;
    }
}

/// One row of a pattern table
#[derive(Clone, Debug, PartialEq)]
pub struct TrialPattern {
    pub name: String,
    pub input: Vec<f32>,
    pub output: Vec<f32>,
}

/// Rows applied as input to one layer and target to another
#[derive(Clone, Debug)]
pub struct PatternTable {
    pub name: String,
    pub input_layer: &'static str,
    pub output_layer: &'static str,
    pub rows: Vec<TrialPattern>,
}

impl PatternTable {
    fn mixed(
        name: &str,
        vocab: &PoolVocab,
        (input_layer, input_pools): (&'static str, &[&str]),
        (output_layer, output_pools): (&'static str, &[&str]),
        n: usize,
    ) -> Result<Self> {
        let rows = (0..n)
            .map(|i| {
                Ok(TrialPattern {
                    name: format!("{}_{}", name, i),
                    input: vocab.mix(input_pools, i)?,
                    output: vocab.mix(output_pools, i)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: name.to_string(),
            input_layer,
            output_layer,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// All tables for one run
#[derive(Clone, Debug)]
pub struct Patterns {
    pub vocab: PoolVocab,
    pub train_ab: PatternTable,
    pub test_ab: PatternTable,
    pub train_rp: PatternTable,
    pub train_noise: PatternTable,
}

impl Patterns {
    pub fn generate<R: Rng>(hp: &HipParams, pp: &PatParams, rng: &mut R) -> Result<Self> {
        if hp.ec_size.len() != N_POOLS {
            return Err(HipError::Config(format!(
                "patterns need {} EC pools, ec_size is {}x{}",
                N_POOLS, hp.ec_size.y, hp.ec_size.x
            )));
        }
        let pool_len = hp.ec_pool.len();
        let n = pp.list_size;
        let n_on = n_from_pct(hp.ec_pct_act, pool_len);
        let ctxt_flip = n_from_pct(pp.ctxt_flip_pct, n_on);

        let mut vocab = PoolVocab::new(pool_len);
        vocab.add_empty("empty", n);
        for name in ["A", "B", "C", "lA", "lB"] {
            vocab.add_permuted_binary(name, n, n_on, pp.min_diff_pct, rng);
        }
        vocab.add_permuted_binary("ctxt", 3, n_on, pp.min_diff_pct, rng);
        for i in 0..N_CTXT {
            let name = format!("ctxt{}", i + 1);
            vocab.add_repeat(&name, n, "ctxt", i / 4)?;
            if pp.drift_ctxt {
                vocab.drift(&name, n_from_pct(pp.drift_pct, n_on), rng);
            } else {
                vocab.flip_bits(&name, ctxt_flip, ctxt_flip, rng);
            }
        }

        let full = ["A", "B", "C", "ctxt2", "ctxt3", "ctxt4"];
        let cue = ["empty", "empty", "C", "ctxt2", "ctxt3", "ctxt4"];
        let train_ab = PatternTable::mixed("TrainAB", &vocab, (names::INPUT, &full), (names::OUTPUT, &full), n)?;
        let test_ab = PatternTable::mixed("TestAB", &vocab, (names::INPUT, &cue), (names::OUTPUT, &full), n)?;
        let train_rp = PatternTable::mixed("TrainRP", &vocab, (names::INPUT, &cue), (names::EC_OUT, &full), n)?;
        let train_noise = PatternTable::mixed("TrainNoise", &vocab, (names::AUTOIN, &cue), (names::AUTO, &full), n)?;
        log::debug!(
            "[PATS] {} items, {} of {} bits on per pool, {} context bits flipped",
            n,
            n_on,
            pool_len,
            ctxt_flip
        );
        Ok(Self {
            vocab,
            train_ab,
            test_ab,
            train_rp,
            train_noise,
        })
    }

    /// Table for full-list training; the AB list in this paradigm
    pub fn train_all(&self) -> &PatternTable {
        &self.train_ab
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small() -> Patterns {
        let mut rng = StdRng::seed_from_u64(7);
        let pp = PatParams {
            list_size: 6,
            min_diff_pct: 0.3,
            ..Default::default()
        };
        Patterns::generate(&HipParams::small(), &pp, &mut rng).unwrap()
    }

    fn pools(v: &[f32], pool_len: usize) -> Vec<&[f32]> {
        v.chunks(pool_len).collect()
    }

    fn on(v: &[f32]) -> usize {
        v.iter().filter(|&&x| x > 0.5).count()
    }

    #[test]
    fn test_n_from_pct_rounds() {
        assert_eq!(n_from_pct(0.2, 49), 10);
        assert_eq!(n_from_pct(0.34, 9), 3);
        assert_eq!(n_from_pct(0.5, 3), 2);
        assert_eq!(n_from_pct(0.0, 9), 0);
    }

    #[test]
    fn test_table_sizes() {
        let p = small();
        let len = HipParams::small().ec_size.len() * HipParams::small().ec_pool.len();
        for t in [&p.train_ab, &p.test_ab, &p.train_rp, &p.train_noise] {
            assert_eq!(t.len(), 6, "{}", t.name);
            assert!(t.rows.iter().all(|r| r.input.len() == len && r.output.len() == len));
        }
        assert_eq!(p.train_rp.output_layer, names::EC_OUT);
        assert_eq!(p.train_noise.input_layer, names::AUTOIN);
    }

    #[test]
    fn test_cue_masks_ab_pools() {
        let p = small();
        let pl = HipParams::small().ec_pool.len();
        for (test, train) in p.test_ab.rows.iter().zip(&p.train_ab.rows) {
            let cue = pools(&test.input, pl);
            assert_eq!(on(cue[0]) + on(cue[1]), 0, "A and B must be absent from the cue");
            assert_eq!(&test.input[2 * pl..], &train.input[2 * pl..], "C and context kept");
            assert_eq!(test.output, train.output);
        }
    }

    #[test]
    fn test_item_pools_are_sparse() {
        let p = small();
        let pl = HipParams::small().ec_pool.len();
        for row in &p.train_ab.rows {
            for pool in pools(&row.input, pl).into_iter().take(3) {
                assert_eq!(on(pool), 3);
            }
        }
    }

    #[test]
    fn test_min_diff_honored() {
        let p = small();
        let a = p.vocab.get("A").unwrap();
        for i in 0..a.len() {
            for j in 0..i {
                let diff = 3 - overlap(&a[i], &a[j]);
                assert!(diff as f32 >= 0.3 * 3.0, "rows {} and {} too close", i, j);
            }
        }
    }

    #[test]
    fn test_contexts_flip_from_prototype() {
        let p = small();
        let proto = &p.vocab.get("ctxt").unwrap()[0];
        let c1 = p.vocab.get("ctxt1").unwrap();
        for row in c1 {
            assert_eq!(on(row), 3, "flips keep the active count");
            assert_eq!(overlap(row, proto), 1, "two of three prototype bits moved");
        }
    }

    #[test]
    fn test_drifted_contexts_chain() {
        let mut rng = StdRng::seed_from_u64(3);
        let pp = PatParams {
            list_size: 5,
            min_diff_pct: 0.3,
            drift_ctxt: true,
            drift_pct: 0.34,
            ..Default::default()
        };
        let p = Patterns::generate(&HipParams::small(), &pp, &mut rng).unwrap();
        let c = p.vocab.get("ctxt5").unwrap();
        assert_eq!(c[0], p.vocab.get("ctxt").unwrap()[1], "first item keeps the prototype");
        for w in c.windows(2) {
            assert_eq!(on(&w[1]), 3);
            assert_eq!(overlap(&w[0], &w[1]), 2, "one bit moves per step");
        }
    }

    #[test]
    fn test_same_seed_same_patterns() {
        let a = small();
        let b = small();
        assert_eq!(a.train_ab.rows, b.train_ab.rows);
    }

    #[test]
    fn test_wrong_pool_count_rejected() {
        let mut hp = HipParams::small();
        hp.ec_size = crate::config::Vec2i::new(1, 3);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(Patterns::generate(&hp, &PatParams::default(), &mut rng).is_err());
    }
}
