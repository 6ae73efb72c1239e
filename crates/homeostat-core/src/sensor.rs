// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! LOW-band recorder: Schmitt classification of depolarised cells, a leaky
//! occupancy integral, neighbour mismatch, and the slow global offset.

use ndarray::{Array2, ArrayView2, Zip};

use crate::config::RecorderParams;
use crate::domain::Domain;
use crate::grid::{ema_update, grid_mean, neighbour_mean, true_fraction, Boundary};

/// Time constant (in run time units) of the global offset average.
pub const GLOBAL_OFFSET_TAU: f64 = 600.0;

/// Direction in which voltages cross into the LOW band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BandPolarity {
    /// Entered at `v <= low_enter`, left at `v >= low_exit`.
    Falling,
    /// Entered at `v >= low_enter`, left at `v <= low_exit`.
    Rising,
}

impl BandPolarity {
    pub fn from_thresholds(low_enter: f64, low_exit: f64) -> Self {
        if low_enter <= low_exit {
            BandPolarity::Falling
        } else {
            BandPolarity::Rising
        }
    }
}

#[derive(Clone, Debug)]
pub struct Sensor {
    params: RecorderParams,
    polarity: BandPolarity,
    boundary: Boundary,
    low: Array2<bool>,
    occupancy: Array2<f64>,
    mismatch: Array2<f64>,
    occupancy_alpha: f64,
    offset_alpha: f64,
    offset_ema: f64,
    healthy_ref: Option<f64>,
}

impl Sensor {
    pub fn new(grid: (usize, usize), dt: f64, params: RecorderParams, boundary: Boundary) -> Self {
        let occupancy_alpha = (dt / params.tau_low.max(1e-6)).clamp(1e-6, 1.0);
        let offset_alpha = (dt / GLOBAL_OFFSET_TAU).clamp(1e-6, 1.0);
        let polarity = BandPolarity::from_thresholds(params.low_enter, params.low_exit);
        Self {
            params,
            polarity,
            boundary,
            low: Array2::from_elem(grid, false),
            occupancy: Array2::zeros(grid),
            mismatch: Array2::zeros(grid),
            occupancy_alpha,
            offset_alpha,
            offset_ema: 0.0,
            healthy_ref: None,
        }
    }

    pub fn params(&self) -> &RecorderParams {
        &self.params
    }

    pub fn polarity(&self) -> BandPolarity {
        self.polarity
    }

    pub fn low_state(&self) -> ArrayView2<'_, bool> {
        self.low.view()
    }

    pub fn low_occupancy(&self) -> ArrayView2<'_, f64> {
        self.occupancy.view()
    }

    /// Mismatch grid as of the last [`Sensor::neighbor_mismatch`] call.
    pub fn mismatch(&self) -> ArrayView2<'_, f64> {
        self.mismatch.view()
    }

    /// Updates the Schmitt labels. Cells inside the dead zone keep their label.
    pub fn update_bands(&mut self, v: &ArrayView2<'_, f64>) {
        let enter = self.params.low_enter;
        let exit = self.params.low_exit;
        let polarity = self.polarity;
        Zip::from(&mut self.low).and(v).for_each(|low, &v| {
            let (entering, leaving) = match polarity {
                BandPolarity::Falling => (v <= enter, v >= exit),
                BandPolarity::Rising => (v >= enter, v <= exit),
            };
            if entering {
                *low = true;
            } else if leaving {
                *low = false;
            }
        });
    }

    /// Leaky integration of the LOW indicator; stays within `[0, 1]`.
    pub fn update_low_occupancy(&mut self) {
        let alpha = self.occupancy_alpha;
        Zip::from(&mut self.occupancy)
            .and(&self.low)
            .for_each(|occ, &low| {
                let indicator = if low { 1.0 } else { 0.0 };
                *occ = (1.0 - alpha) * *occ + alpha * indicator;
            });
    }

    /// Recomputes per-cell disagreement with the four neighbours' labels.
    pub fn neighbor_mismatch(&mut self) -> ArrayView2<'_, f64> {
        let labels = self.low.mapv(|low| if low { 1.0 } else { 0.0 });
        let neigh = neighbour_mean(&labels.view(), self.boundary);
        Zip::from(&mut self.mismatch)
            .and(&self.low)
            .and(&neigh)
            .for_each(|out, &low, &n| *out = if low { 1.0 - n } else { n });
        self.mismatch.view()
    }

    /// Runs the band, occupancy and mismatch updates in order.
    pub fn observe(&mut self, v: &ArrayView2<'_, f64>) {
        self.update_bands(v);
        self.update_low_occupancy();
        self.neighbor_mismatch();
    }

    pub fn domain_low_fraction(&self) -> f64 {
        true_fraction(&self.low.view())
    }

    pub fn domain_low_fraction_in(&self, domain: &Domain) -> f64 {
        true_fraction(&domain.view(&self.low))
    }

    pub fn set_healthy_ref(&mut self, v_ref: f64) {
        self.healthy_ref = Some(v_ref);
    }

    pub fn healthy_ref(&self) -> Option<f64> {
        self.healthy_ref
    }

    /// Slow EMA of `mean(V) - healthy_ref`. Without a configured reference the
    /// first observed mean becomes the reference, so the offset starts at zero.
    pub fn global_v_offset(&mut self, v: &ArrayView2<'_, f64>) -> f64 {
        let mean = grid_mean(v);
        let reference = *self.healthy_ref.get_or_insert(mean);
        self.offset_ema = ema_update(self.offset_ema, mean - reference, self.offset_alpha);
        self.offset_ema
    }

    /// Last value returned by [`Sensor::global_v_offset`].
    pub fn last_global_offset(&self) -> f64 {
        self.offset_ema
    }
}
