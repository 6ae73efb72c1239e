// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Rule-based decision state machine with hysteresis margin and dwell.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DecoderStability, RulesThresholds};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Decision {
    #[default]
    Rest = 0,
    Repair = 1,
    Prune = 2,
}

impl Decision {
    pub const ALL: [Decision; 3] = [Decision::Rest, Decision::Repair, Decision::Prune];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Rest => write!(f, "rest"),
            Decision::Repair => write!(f, "repair"),
            Decision::Prune => write!(f, "prune"),
        }
    }
}

/// Feature vector for one decision.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DecoderInputs {
    pub low_occupancy: f64,
    pub mismatch: f64,
    pub energy: f64,
    /// Absent PLV counts as healthy coherence.
    pub plv: Option<f64>,
    pub global_v_offset: f64,
    pub domain_low_fraction: f64,
}

/// Soft scores in `[0, 1]`, indexed by [`Decision::index`].
pub type Scores = [f64; 3];

#[derive(Clone, Debug)]
pub struct RulesDecoder {
    thresholds: RulesThresholds,
    stability: DecoderStability,
    current: Decision,
    hold_steps: u32,
    prune_steps: u32,
}

impl RulesDecoder {
    pub fn new(thresholds: RulesThresholds, stability: DecoderStability) -> Self {
        Self {
            thresholds,
            stability,
            current: Decision::Rest,
            hold_steps: 0,
            prune_steps: 0,
        }
    }

    pub fn current(&self) -> Decision {
        self.current
    }

    pub fn thresholds(&self) -> &RulesThresholds {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: RulesThresholds) {
        self.thresholds = thresholds;
    }

    /// Remaining calls during which a switch is blocked.
    pub fn hold_steps(&self) -> u32 {
        self.hold_steps
    }

    /// Consecutive calls on which the strict prune condition has held.
    pub fn prune_steps(&self) -> u32 {
        self.prune_steps
    }

    fn prune_condition(&self, inputs: &DecoderInputs) -> bool {
        let th = &self.thresholds;
        th.prune_enabled
            && inputs.low_occupancy >= th.prune_low_occ_threshold
            && inputs.energy <= th.prune_energy_max
            && inputs.mismatch >= th.prune_mismatch_min
    }

    /// Fraction of satisfied rule conditions per state.
    pub fn scores(&self, inputs: &DecoderInputs, prune_condition: bool) -> Scores {
        let th = &self.thresholds;
        let plv_ok = inputs.plv.map_or(true, |plv| plv >= th.healthy_plv_min);
        let plv_bad = inputs.plv.map_or(false, |plv| plv < th.healthy_plv_min);
        let context_high = inputs.global_v_offset >= th.global_v_offset
            || inputs.domain_low_fraction >= th.domain_low_fraction;

        let repair = fraction_satisfied(&[
            inputs.low_occupancy >= th.low_occ_threshold,
            inputs.mismatch <= th.mismatch_ok,
            inputs.energy >= th.energy_ok,
            plv_bad,
            context_high,
        ]);
        let rest = fraction_satisfied(&[
            plv_ok,
            inputs.low_occupancy < th.low_occ_threshold,
            inputs.mismatch > th.mismatch_ok,
        ]);
        let prune = if th.prune_enabled
            && prune_condition
            && self.prune_steps >= th.prune_dwell_steps.max(1)
        {
            1.0
        } else {
            0.0
        };

        [rest.clamp(0.0, 1.0), repair.clamp(0.0, 1.0), prune]
    }

    /// Advances the machine one call and returns the (possibly unchanged) decision.
    pub fn decide(&mut self, inputs: &DecoderInputs) -> Decision {
        self.hold_steps = self.hold_steps.saturating_sub(1);

        let prune_condition = self.prune_condition(inputs);
        self.prune_steps = if prune_condition {
            self.prune_steps.saturating_add(1)
        } else {
            0
        };

        let scores = self.scores(inputs, prune_condition);
        let proposed = argmax(&scores);
        let current = self.current;
        if proposed == current || self.hold_steps > 0 {
            return current;
        }
        let margin = scores[proposed.index()] - scores[current.index()];
        if margin <= self.stability.hysteresis_margin {
            return current;
        }
        debug!(from = %current, to = %proposed, margin, "decision switched");
        self.current = proposed;
        self.hold_steps = self.stability.decision_dwell;
        proposed
    }
}

fn fraction_satisfied(conditions: &[bool]) -> f64 {
    if conditions.is_empty() {
        return 0.0;
    }
    conditions.iter().filter(|&&met| met).count() as f64 / conditions.len() as f64
}

/// Highest score wins; ties go to the lowest state index.
fn argmax(scores: &Scores) -> Decision {
    let mut best = Decision::Rest;
    for decision in Decision::ALL {
        if scores[decision.index()] > scores[best.index()] {
            best = decision;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn thresholds(healthy_plv_min: f64) -> RulesThresholds {
        RulesThresholds {
            low_occ_threshold: 0.3,
            energy_ok: 0.3,
            mismatch_ok: 0.3,
            healthy_plv_min,
            ..RulesThresholds::default()
        }
    }

    fn inputs(
        low_occupancy: f64,
        mismatch: f64,
        energy: f64,
        plv: Option<f64>,
        global_v_offset: f64,
        domain_low_fraction: f64,
    ) -> DecoderInputs {
        DecoderInputs {
            low_occupancy,
            mismatch,
            energy,
            plv,
            global_v_offset,
            domain_low_fraction,
        }
    }

    fn strong_rest() -> DecoderInputs {
        inputs(0.0, 1.0, 1.0, Some(1.0), 0.0, 0.0)
    }

    fn strong_repair() -> DecoderInputs {
        inputs(0.9, 0.1, 0.9, Some(0.0), 20.0, 0.7)
    }

    #[test]
    fn dwell_and_hysteresis_block_flicker() {
        let stability = DecoderStability {
            hysteresis_margin: 0.2,
            decision_dwell: 5,
        };
        let mut decoder = RulesDecoder::new(thresholds(0.5), stability);
        assert_eq!(
            decoder.decide(&inputs(0.1, 0.9, 0.5, Some(0.9), 0.0, 0.1)),
            Decision::Rest
        );
        assert_eq!(
            decoder.decide(&inputs(0.20, 0.50, 0.20, Some(0.51), 0.0, 0.1)),
            Decision::Rest
        );

        decoder.set_thresholds(thresholds(0.9));
        assert_eq!(decoder.decide(&strong_repair()), Decision::Repair);
        assert_eq!(decoder.hold_steps(), 5);

        for _ in 0..4 {
            assert_eq!(decoder.decide(&strong_rest()), Decision::Repair);
        }
        assert_eq!(decoder.decide(&strong_rest()), Decision::Rest);
    }

    #[test]
    fn small_margin_is_not_enough() {
        let stability = DecoderStability {
            hysteresis_margin: 0.5,
            decision_dwell: 0,
        };
        let mut decoder = RulesDecoder::new(thresholds(0.5), stability);
        // repair 3/5 vs rest 1/3: proposes REPAIR by ~0.27 only.
        let nudging = inputs(0.9, 0.8, 0.1, Some(0.1), 0.0, 0.9);
        let scores = decoder.scores(&nudging, false);
        assert_abs_diff_eq!(scores[1], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(scores[0], 1.0 / 3.0, epsilon = 1e-12);
        for _ in 0..10 {
            assert_eq!(decoder.decide(&nudging), Decision::Rest);
        }
        assert_eq!(decoder.decide(&strong_repair()), Decision::Repair);
    }

    #[test]
    fn missing_plv_counts_as_healthy() {
        let decoder = RulesDecoder::new(thresholds(0.5), DecoderStability::default());
        let scores = decoder.scores(&inputs(0.0, 0.0, 0.0, None, 0.0, 0.0), false);
        // rest: plv ok + low occupancy; repair: mismatch ok only.
        assert_abs_diff_eq!(scores[0], 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scores[1], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        assert_eq!(argmax(&[0.5, 0.5, 0.5]), Decision::Rest);
        assert_eq!(argmax(&[0.2, 0.6, 0.6]), Decision::Repair);
        assert_eq!(argmax(&[0.0, 0.0, 1.0]), Decision::Prune);
    }

    fn prune_thresholds() -> RulesThresholds {
        RulesThresholds {
            prune_enabled: true,
            prune_low_occ_threshold: 0.9,
            prune_energy_max: 0.2,
            prune_mismatch_min: 0.7,
            prune_dwell_steps: 5,
            ..thresholds(0.5)
        }
    }

    fn prune_frame() -> DecoderInputs {
        inputs(0.95, 0.8, 0.1, Some(0.1), 0.0, 0.9)
    }

    #[test]
    fn prune_requires_sustained_evidence() {
        let stability = DecoderStability {
            hysteresis_margin: 0.05,
            decision_dwell: 1,
        };
        let mut decoder = RulesDecoder::new(prune_thresholds(), stability);
        let actions: Vec<_> = (0..6).map(|_| decoder.decide(&prune_frame())).collect();
        assert!(actions[..4].iter().all(|&a| a != Decision::Prune));
        assert_eq!(actions[4], Decision::Prune);
        assert_eq!(actions[5], Decision::Prune);
    }

    #[test]
    fn single_miss_resets_prune_counter() {
        let stability = DecoderStability {
            hysteresis_margin: 0.05,
            decision_dwell: 1,
        };
        let mut decoder = RulesDecoder::new(prune_thresholds(), stability);
        for _ in 0..4 {
            decoder.decide(&prune_frame());
        }
        assert_eq!(decoder.prune_steps(), 4);
        let miss = DecoderInputs {
            energy: 0.5,
            ..prune_frame()
        };
        decoder.decide(&miss);
        assert_eq!(decoder.prune_steps(), 0);
        for _ in 0..4 {
            assert_ne!(decoder.decide(&prune_frame()), Decision::Prune);
        }
        assert_eq!(decoder.decide(&prune_frame()), Decision::Prune);
    }

    #[test]
    fn disabled_prune_never_scores() {
        let mut decoder = RulesDecoder::new(thresholds(0.5), DecoderStability::default());
        for _ in 0..500 {
            assert_ne!(decoder.decide(&prune_frame()), Decision::Prune);
        }
        assert_eq!(decoder.prune_steps(), 0);
    }

    #[test]
    fn hold_countdown_never_underflows() {
        let mut decoder = RulesDecoder::new(thresholds(0.5), DecoderStability::default());
        for _ in 0..3 {
            decoder.decide(&strong_rest());
        }
        assert_eq!(decoder.hold_steps(), 0);
    }
}
