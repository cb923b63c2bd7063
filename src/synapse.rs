//! Synaptic state
//!
//! One directed connection between a sending and a receiving unit. The
//! linear weight is the learned quantity; the effective weight is derived
//! from it through the sigmoidal contrast function and is what net input
//! actually sees.

use serde::{Deserialize, Serialize};

/// Per-connection state
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Synapse {
    /// Effective weight, `sig(lwt)`
    pub wt: f32,
    /// Linear weight in [0, 1]
    pub lwt: f32,
    /// Accumulated delta, folded into `lwt` by the next application
    pub dwt: f32,
    /// Running max |dwt| for normalization
    pub norm: f32,
    /// Momentum accumulator
    pub moment: f32,
}

impl Synapse {
    /// Fresh synapse with a given effective/linear weight pair
    pub fn new(wt: f32, lwt: f32) -> Self {
        Self {
            wt,
            lwt,
            ..Default::default()
        }
    }

    /// Clear learning accumulators, keeping weights
    pub fn reset_learning(&mut self) {
        self.dwt = 0.0;
        self.norm = 0.0;
        self.moment = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_has_no_pending_delta() {
        let sy = Synapse::new(0.5, 0.5);
        assert_eq!(sy.dwt, 0.0);
        assert_eq!(sy.norm, 0.0);
        assert_eq!(sy.moment, 0.0);
    }

    #[test]
    fn test_reset_learning_keeps_weights() {
        let mut sy = Synapse::new(0.7, 0.6);
        sy.dwt = 0.1;
        sy.norm = 0.2;
        sy.moment = -0.3;
        sy.reset_learning();
        assert_eq!(sy, Synapse::new(0.7, 0.6));
    }
}
