//! Alpha-cycle time bookkeeping

use serde::{Deserialize, Serialize};

/// Position within the current trial
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    /// Cycle within the trial
    pub cycle: usize,
    /// Cycles since construction
    pub total_cycle: usize,
    /// Quarter index, 0..=3
    pub quarter: usize,
    /// Cycle within the current quarter
    pub quarter_cycle: usize,
    /// Default cycles per quarter
    pub cyc_per_qtr: usize,
}

impl Time {
    pub fn new(cyc_per_qtr: usize) -> Self {
        Self {
            cycle: 0,
            total_cycle: 0,
            quarter: 0,
            quarter_cycle: 0,
            cyc_per_qtr,
        }
    }

    /// Reset at the start of an alpha cycle
    pub fn alpha_cycle_start(&mut self) {
        self.cycle = 0;
        self.quarter = 0;
        self.quarter_cycle = 0;
    }

    pub fn cycle_inc(&mut self) {
        self.cycle += 1;
        self.total_cycle += 1;
        self.quarter_cycle += 1;
    }

    pub fn quarter_inc(&mut self) {
        self.quarter += 1;
        self.quarter_cycle = 0;
    }

    /// Quarter 3 is the plus phase
    pub fn plus_phase(&self) -> bool {
        self.quarter == 3
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new(25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_progression() {
        let mut t = Time::new(5);
        t.alpha_cycle_start();
        for q in 0..4 {
            assert_eq!(t.quarter, q);
            assert_eq!(t.plus_phase(), q == 3);
            for _ in 0..t.cyc_per_qtr {
                t.cycle_inc();
            }
            assert_eq!(t.quarter_cycle, 5);
            t.quarter_inc();
        }
        assert_eq!(t.cycle, 20);
        assert_eq!(t.total_cycle, 20);

        t.alpha_cycle_start();
        assert_eq!(t.cycle, 0);
        assert_eq!(t.total_cycle, 20, "total survives trial reset");
    }
}
