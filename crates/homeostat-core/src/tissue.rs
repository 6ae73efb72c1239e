// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ndarray::{Array2, ArrayView2, Zip};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::config::TissueParams;
use crate::error::{HomeostatError, HomeostatResult};
use crate::grid::{grid_mean, laplacian_2d};

/// Membrane voltage grid integrated with explicit Euler:
///
/// ```text
/// V += dt * (-gL (V - EL) + D ∇²V + u) + ξ,   ξ ~ N(0, rms²) per cell
/// ```
#[derive(Clone, Debug)]
pub struct TissueField {
    params: TissueParams,
    dt: f64,
    v: Array2<f64>,
    noise: Option<Normal<f64>>,
    rng: StdRng,
}

impl TissueField {
    pub fn new(
        grid: (usize, usize),
        dt: f64,
        params: TissueParams,
        rng: StdRng,
    ) -> HomeostatResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(HomeostatError::InvalidTimestep(dt));
        }
        let noise = if params.noise_rms > 0.0 {
            Some(
                Normal::new(0.0, params.noise_rms)
                    .map_err(|_| HomeostatError::InvalidNoise(params.noise_rms))?,
            )
        } else if params.noise_rms == 0.0 {
            None
        } else {
            return Err(HomeostatError::InvalidNoise(params.noise_rms));
        };
        let v = Array2::from_elem(grid, params.v0);
        Ok(Self {
            params,
            dt,
            v,
            noise,
            rng,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.v.dim()
    }

    pub fn params(&self) -> &TissueParams {
        &self.params
    }

    pub fn voltage(&self) -> ArrayView2<'_, f64> {
        self.v.view()
    }

    pub(crate) fn voltage_mut(&mut self) -> &mut Array2<f64> {
        &mut self.v
    }

    pub fn mean_voltage(&self) -> f64 {
        grid_mean(&self.v.view())
    }

    /// Resets every cell to `v0`.
    pub fn set_initial(&mut self, v0: f64) {
        self.v.fill(v0);
    }

    /// Replaces the grid with a full initial-condition array.
    pub fn set_initial_grid(&mut self, v0: Array2<f64>) -> HomeostatResult<()> {
        if v0.dim() != self.v.dim() {
            return Err(HomeostatError::ShapeMismatch {
                expected: self.v.dim(),
                actual: v0.dim(),
            });
        }
        self.v = v0;
        Ok(())
    }

    /// Advances one step under the given actuation field.
    pub fn step(&mut self, actuation: &ArrayView2<'_, f64>) {
        let TissueParams {
            el,
            gl,
            diffusion,
            boundary,
            ..
        } = self.params;
        let dt = self.dt;
        let lap = laplacian_2d(&self.v.view(), boundary);
        Zip::from(&mut self.v)
            .and(&lap)
            .and(actuation)
            .for_each(|v, &l, &u| {
                *v += dt * (-gl * (*v - el) + diffusion * l + u);
            });
        if let Some(noise) = &self.noise {
            for v in self.v.iter_mut() {
                *v += noise.sample(&mut self.rng);
            }
        }
    }
}
