// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Duty-cycled pulse generator with a refractory lockout and Hill shaping.

use ndarray::Array2;
use tracing::trace;

use crate::config::{ActuationParams, HillParams};

/// Cooperative saturating response `s^n / (k^n + s^n)`.
///
/// Negative inputs clamp to zero and `n` is clamped to at least one. With a
/// non-positive half-activation constant the curve degenerates to a step.
pub fn hill_response(signal: f64, n: f64, k: f64) -> f64 {
    let s = signal.max(0.0);
    let n = n.max(1.0);
    if k <= 0.0 {
        return if s > 0.0 { 1.0 } else { 0.0 };
    }
    if s == 0.0 {
        return 0.0;
    }
    let sn = s.powf(n);
    let h = sn / (k.powf(n) + sn);
    if h.is_finite() {
        h.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

#[derive(Clone, Debug)]
pub struct PulseActuator {
    params: ActuationParams,
    dt: f64,
    elapsed: f64,
    next_ok: f64,
}

impl PulseActuator {
    pub fn new(params: ActuationParams, dt: f64) -> Self {
        Self {
            params,
            dt,
            elapsed: 0.0,
            next_ok: 0.0,
        }
    }

    pub fn params(&self) -> &ActuationParams {
        &self.params
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Earliest time at which another on-window may open.
    pub fn next_ok(&self) -> f64 {
        self.next_ok
    }

    fn modulation(hill: &HillParams, depol_signal: f64) -> f64 {
        if !hill.enabled {
            return 1.0;
        }
        hill_response(depol_signal * hill.scale, hill.n, hill.k)
    }

    /// Advances the clock by one step and returns the uniform pulse level.
    pub fn pulse_level(&mut self, allow: bool, energy_ok: bool, depol_signal: f64) -> f64 {
        self.elapsed += self.dt;
        if !self.params.enabled || !allow || self.elapsed < self.next_ok {
            return 0.0;
        }

        let (amplitude, duty) = if energy_ok {
            (self.params.amplitude, self.params.duty)
        } else {
            (self.params.low_energy.amplitude, self.params.low_energy.duty)
        };
        let period = self.params.period;
        if duty <= 0.0 || period <= 0.0 {
            return 0.0;
        }

        let phase = self.elapsed.rem_euclid(period) / period;
        if phase >= duty {
            return 0.0;
        }

        let h = Self::modulation(&self.params.hill, depol_signal);
        if h <= 0.0 {
            return 0.0;
        }

        let end_of_window = self.elapsed + (duty - phase) * period;
        self.next_ok = self.next_ok.max(end_of_window + self.params.refractory);
        trace!(
            t = self.elapsed,
            next_ok = self.next_ok,
            level = amplitude * h,
            "pulse emitted"
        );
        amplitude * h
    }

    pub fn step(
        &mut self,
        allow: bool,
        energy_ok: bool,
        shape: (usize, usize),
        depol_signal: f64,
    ) -> Array2<f64> {
        let level = self.pulse_level(allow, energy_ok, depol_signal);
        Array2::from_elem(shape, level)
    }
}
