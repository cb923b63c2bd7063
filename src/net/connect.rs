//! Connectivity patterns
//!
//! A pattern decides which (send, recv) unit pairs get a synapse. Output is
//! sender-major: for each sending unit, the sorted receiving units.

use super::layer::Shape;
use crate::error::{HipError, Result};
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Projection connectivity
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    /// Every sender to every receiver
    Full,
    /// Unit i to unit i
    OneToOne,
    /// Each receiver gets `round(pcon * n_send)` random senders
    UniformRandom { pcon: f32 },
    /// Pool i of the sender to pool i of the receiver
    ///
    /// When only one side has pools, each of its pools in range connects
    /// to the whole other layer.
    PoolOneToOne {
        send_start: usize,
        recv_start: usize,
        /// Pools to connect; all when `None`
        n_pools: Option<usize>,
    },
}

impl Pattern {
    /// Pool-to-pool over every pool
    pub fn pool_one_to_one() -> Self {
        Pattern::PoolOneToOne {
            send_start: 0,
            recv_start: 0,
            n_pools: None,
        }
    }

    /// Build the sender-major connection lists
    pub fn connect<R: Rng>(&self, send: &Shape, recv: &Shape, rng: &mut R) -> Result<Vec<Vec<usize>>> {
        let ns = send.len();
        let nr = recv.len();
        let mut cons = vec![Vec::new(); ns];
        match *self {
            Pattern::Full => {
                for c in cons.iter_mut() {
                    c.extend(0..nr);
                }
            }
            Pattern::OneToOne => {
                if ns != nr {
                    return Err(HipError::ShapeMismatch {
                        expected: send.dims(),
                        actual: recv.dims(),
                    });
                }
                for (i, c) in cons.iter_mut().enumerate() {
                    c.push(i);
                }
            }
            Pattern::UniformRandom { pcon } => {
                if !(0.0..=1.0).contains(&pcon) {
                    return Err(HipError::Config(format!("pcon {} outside [0, 1]", pcon)));
                }
                let n = ((pcon * ns as f32).round() as usize).clamp(1, ns.max(1));
                for ri in 0..nr {
                    for si in sample(rng, ns, n.min(ns)).into_iter() {
                        cons[si].push(ri);
                    }
                }
                for c in cons.iter_mut() {
                    c.sort_unstable();
                }
            }
            Pattern::PoolOneToOne {
                send_start,
                recv_start,
                n_pools,
            } => {
                let (sp, rp) = (send.n_pools(), recv.n_pools());
                let (ss, rs) = (send.pool_size(), recv.pool_size());
                match (send.is_pooled(), recv.is_pooled()) {
                    (true, true) => {
                        let avail = sp.saturating_sub(send_start).min(rp.saturating_sub(recv_start));
                        let np = n_pools.map_or(avail, |n| n.min(avail));
                        for p in 0..np {
                            let sbase = (send_start + p) * ss;
                            let rbase = (recv_start + p) * rs;
                            for si in sbase..sbase + ss {
                                cons[si].extend(rbase..rbase + rs);
                            }
                        }
                    }
                    (true, false) => {
                        let avail = sp.saturating_sub(send_start);
                        let np = n_pools.map_or(avail, |n| n.min(avail));
                        for si in send_start * ss..(send_start + np) * ss {
                            cons[si].extend(0..nr);
                        }
                    }
                    (false, true) => {
                        let avail = rp.saturating_sub(recv_start);
                        let np = n_pools.map_or(avail, |n| n.min(avail));
                        for c in cons.iter_mut() {
                            c.extend(recv_start * rs..(recv_start + np) * rs);
                        }
                    }
                    (false, false) => {
                        for c in cons.iter_mut() {
                            c.extend(0..nr);
                        }
                    }
                }
            }
        }
        Ok(cons)
    }
}
