// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ndarray::{Array2, ArrayView2, Zip};

use crate::config::EnergyParams;
use crate::error::{HomeostatError, HomeostatResult};
use crate::grid::{grid_mean, laplacian_2d, Boundary};

/// Local metabolic resource. Production saturates toward 1, decay is linear,
/// actuation costs energy in proportion to its magnitude, and an optional
/// lateral flux spreads it between neighbours. The level is clamped at zero
/// after every step; there is no upper clamp.
#[derive(Clone, Debug)]
pub struct EnergyField {
    params: EnergyParams,
    boundary: Boundary,
    e: Array2<f64>,
}

impl EnergyField {
    pub fn new(grid: (usize, usize), params: EnergyParams, boundary: Boundary) -> Self {
        let e = Array2::from_elem(grid, params.e0);
        Self {
            params,
            boundary,
            e,
        }
    }

    pub fn params(&self) -> &EnergyParams {
        &self.params
    }

    pub fn energy(&self) -> ArrayView2<'_, f64> {
        self.e.view()
    }

    pub(crate) fn energy_mut(&mut self) -> &mut Array2<f64> {
        &mut self.e
    }

    pub fn mean_energy(&self) -> f64 {
        grid_mean(&self.e.view())
    }

    /// Fraction of cells strictly below `level`.
    pub fn fraction_below(&self, level: f64) -> f64 {
        let total = self.e.len();
        if total == 0 {
            return 0.0;
        }
        self.e.iter().filter(|&&value| value < level).count() as f64 / total as f64
    }

    pub fn set_initial(&mut self, e0: f64) {
        self.e.fill(e0);
    }

    pub fn set_initial_grid(&mut self, e0: Array2<f64>) -> HomeostatResult<()> {
        if e0.dim() != self.e.dim() {
            return Err(HomeostatError::ShapeMismatch {
                expected: self.e.dim(),
                actual: e0.dim(),
            });
        }
        self.e = e0;
        Ok(())
    }

    pub fn step(&mut self, dt: f64, actuation: &ArrayView2<'_, f64>) {
        let EnergyParams {
            k_oxphos,
            gamma_decay,
            alpha_cost,
            beta_flux,
            ..
        } = self.params;
        let flux = if beta_flux != 0.0 {
            Some(laplacian_2d(&self.e.view(), self.boundary))
        } else {
            None
        };
        Zip::indexed(&mut self.e)
            .and(actuation)
            .for_each(|idx, e, &u| {
                let lateral = flux.as_ref().map_or(0.0, |lap| beta_flux * lap[idx]);
                let rate = k_oxphos * (1.0 - *e) - gamma_decay * *e - alpha_cost * u.abs() + lateral;
                *e = (*e + dt * rate).max(0.0);
            });
    }
}
