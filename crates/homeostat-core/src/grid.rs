// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Grid primitives shared by every stateful component: neighbourhood sums
//! under periodic or reflecting boundaries, the discrete Laplacian, EMA
//! updates, and the short-lag coupling estimator.

use std::collections::VecDeque;

use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// Edge treatment for every four-neighbour stencil on the grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Opposite edges are neighbours.
    #[default]
    Periodic,
    /// Zero-flux edges: the ghost neighbour mirrors the edge cell.
    Reflecting,
}

impl Boundary {
    #[inline]
    fn neighbour(self, index: usize, forward: bool, len: usize) -> usize {
        match (self, forward) {
            (Boundary::Periodic, true) => (index + 1) % len,
            (Boundary::Periodic, false) => (index + len - 1) % len,
            (Boundary::Reflecting, true) => (index + 1).min(len - 1),
            (Boundary::Reflecting, false) => index.saturating_sub(1),
        }
    }
}

/// Sum of the four orthogonal neighbours of every cell.
pub fn neighbour_sum(field: &ArrayView2<'_, f64>, boundary: Boundary) -> Array2<f64> {
    let (h, w) = field.dim();
    Array2::from_shape_fn((h, w), |(i, j)| {
        let up = field[[boundary.neighbour(i, false, h), j]];
        let down = field[[boundary.neighbour(i, true, h), j]];
        let left = field[[i, boundary.neighbour(j, false, w)]];
        let right = field[[i, boundary.neighbour(j, true, w)]];
        up + down + left + right
    })
}

/// Mean of the four orthogonal neighbours of every cell.
pub fn neighbour_mean(field: &ArrayView2<'_, f64>, boundary: Boundary) -> Array2<f64> {
    let mut sum = neighbour_sum(field, boundary);
    sum.mapv_inplace(|value| value * 0.25);
    sum
}

/// Five-point discrete Laplacian. Both boundary modes conserve the field sum.
pub fn laplacian_2d(field: &ArrayView2<'_, f64>, boundary: Boundary) -> Array2<f64> {
    let mut lap = neighbour_sum(field, boundary);
    Zip::from(&mut lap)
        .and(field)
        .for_each(|acc, &centre| *acc -= 4.0 * centre);
    lap
}

/// Exponential moving average step. `alpha` is clamped to `[1e-6, 1]`;
/// higher values track the input faster.
#[inline]
pub fn ema_update(prev: f64, x: f64, alpha: f64) -> f64 {
    let alpha = alpha.clamp(1e-6, 1.0);
    (1.0 - alpha) * prev + alpha * x
}

/// Arithmetic mean of a grid, `0.0` when empty.
#[inline]
pub fn grid_mean(field: &ArrayView2<'_, f64>) -> f64 {
    field.mean().unwrap_or(0.0)
}

/// Fraction of `true` cells in a boolean grid, `0.0` when empty.
pub fn true_fraction(field: &ArrayView2<'_, bool>) -> f64 {
    let total = field.len();
    if total == 0 {
        return 0.0;
    }
    field.iter().filter(|&&flag| flag).count() as f64 / total as f64
}

/// Pearson correlation between a frame and its own four-neighbour mean.
pub fn neighbour_correlation(frame: &ArrayView2<'_, f64>, boundary: Boundary) -> f64 {
    let neigh = neighbour_mean(frame, boundary);
    let frame_mean = grid_mean(frame);
    let neigh_mean = grid_mean(&neigh.view());
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    Zip::from(frame).and(&neigh).for_each(|&a, &b| {
        let a = a - frame_mean;
        let b = b - neigh_mean;
        dot += a * b;
        norm_a += a * a;
        norm_b += b * b;
    });
    dot / (norm_a.sqrt() * norm_b.sqrt() + 1e-9)
}

/// Minimum number of frames before a coupling estimate is reported.
pub const MIN_COUPLING_FRAMES: usize = 4;

/// Sliding window behind the short-lag spatial coupling proxy.
///
/// Each pushed frame contributes one neighbour correlation; the estimate is
/// the window mean mapped from `[-1, 1]` onto `[0, 1]`. Only the per-frame
/// correlation is retained since the frame itself is never revisited.
#[derive(Clone, Debug)]
pub struct CouplingWindow {
    capacity: usize,
    boundary: Boundary,
    correlations: VecDeque<f64>,
}

impl CouplingWindow {
    pub fn new(capacity: usize, boundary: Boundary) -> Self {
        let capacity = capacity.max(MIN_COUPLING_FRAMES);
        Self {
            capacity,
            boundary,
            correlations: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, frame: &ArrayView2<'_, f64>) {
        if self.correlations.len() == self.capacity {
            self.correlations.pop_front();
        }
        self.correlations
            .push_back(neighbour_correlation(frame, self.boundary));
    }

    pub fn len(&self) -> usize {
        self.correlations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.correlations.is_empty()
    }

    /// Current coupling estimate, `None` until enough frames are buffered.
    pub fn estimate(&self) -> Option<f64> {
        if self.correlations.len() < MIN_COUPLING_FRAMES {
            return None;
        }
        let mean = self.correlations.iter().sum::<f64>() / self.correlations.len() as f64;
        Some(((mean + 1.0) / 2.0).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn ramp() -> Array2<f64> {
        array![
            [0.0, 1.5, -2.0, 4.0],
            [3.0, -1.0, 0.5, 2.0],
            [1.0, 7.0, -3.0, 0.0]
        ]
    }

    #[test]
    fn constant_field_has_zero_laplacian() {
        let field = Array2::from_elem((4, 5), -18.0);
        for boundary in [Boundary::Periodic, Boundary::Reflecting] {
            let lap = laplacian_2d(&field.view(), boundary);
            assert!(lap.iter().all(|value| value.abs() < 1e-12));
        }
    }

    #[test]
    fn laplacian_conserves_total_under_both_boundaries() {
        let field = ramp();
        for boundary in [Boundary::Periodic, Boundary::Reflecting] {
            let lap = laplacian_2d(&field.view(), boundary);
            assert_abs_diff_eq!(lap.sum(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn reflecting_corner_sees_only_interior_neighbours() {
        let field = ramp();
        let lap = laplacian_2d(&field.view(), Boundary::Reflecting);
        // Ghost neighbours mirror the corner, leaving the two real neighbours.
        let expected = (3.0 - 0.0) + (1.5 - 0.0);
        assert_abs_diff_eq!(lap[[0, 0]], expected, epsilon = 1e-12);
    }

    #[test]
    fn periodic_wraps_across_edges() {
        let field = ramp();
        let lap = laplacian_2d(&field.view(), Boundary::Periodic);
        let expected = field[[2, 0]] + field[[1, 0]] + field[[0, 3]] + field[[0, 1]]
            - 4.0 * field[[0, 0]];
        assert_abs_diff_eq!(lap[[0, 0]], expected, epsilon = 1e-12);
    }

    #[test]
    fn ema_clamps_alpha() {
        assert_abs_diff_eq!(ema_update(1.0, 5.0, 2.0), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ema_update(1.0, 5.0, 0.25), 2.0, epsilon = 1e-12);
        assert!(ema_update(1.0, 5.0, 0.0) > 1.0);
    }

    #[test]
    fn coupling_requires_four_frames() {
        let mut window = CouplingWindow::new(50, Boundary::Periodic);
        let frame = ramp();
        for _ in 0..3 {
            window.push(&frame.view());
            assert!(window.estimate().is_none());
        }
        window.push(&frame.view());
        let estimate = window.estimate().unwrap();
        assert!((0.0..=1.0).contains(&estimate));
    }

    #[test]
    fn coupling_window_is_bounded() {
        let mut window = CouplingWindow::new(6, Boundary::Reflecting);
        for _ in 0..20 {
            window.push(&ramp().view());
        }
        assert_eq!(window.len(), 6);
    }

    #[test]
    fn smooth_field_reads_as_strongly_coupled() {
        let smooth = Array2::from_shape_fn((8, 8), |(i, j)| (i + j) as f64);
        let mut window = CouplingWindow::new(10, Boundary::Reflecting);
        for _ in 0..4 {
            window.push(&smooth.view());
        }
        assert!(window.estimate().unwrap() > 0.9);
    }
}
