// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

/// Errors raised while assembling a run. The per-step loop itself never fails.
#[derive(Debug, Error)]
pub enum HomeostatError {
    /// Grid or tile has a zero dimension.
    #[error("grid {height}x{width} must have non-zero dimensions")]
    InvalidGrid { height: usize, width: usize },

    /// Domain tiles must divide the grid exactly.
    #[error("tile {tile_h}x{tile_w} does not evenly divide grid {height}x{width}")]
    TileMismatch {
        height: usize,
        width: usize,
        tile_h: usize,
        tile_w: usize,
    },

    #[error("time step must be finite and positive (got {0})")]
    InvalidTimestep(f64),

    #[error("noise rms must be finite and non-negative (got {0})")]
    InvalidNoise(f64),

    /// An initial-condition array did not match the grid.
    #[error("expected a {expected:?} array, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("failed to decode run configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type HomeostatResult<T> = Result<T, HomeostatError>;
