// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Rectangular domain tiling and one-time injuries.

use std::ops::Range;

use ndarray::{s, Array2, ArrayView2, ArrayViewMut2};
use rand::seq::index;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::Injury;
use crate::error::{HomeostatError, HomeostatResult};

/// A disjoint rectangular window onto the grid. Owns no storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Domain {
    pub id: usize,
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl Domain {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.cols.len())
    }

    pub fn view<'a, T>(&self, field: &'a Array2<T>) -> ArrayView2<'a, T> {
        field.slice(s![self.rows.clone(), self.cols.clone()])
    }

    pub fn view_of<'a, T>(&self, field: &ArrayView2<'a, T>) -> ArrayView2<'a, T> {
        field.clone().slice_move(s![self.rows.clone(), self.cols.clone()])
    }

    pub fn view_mut<'a, T>(&self, field: &'a mut Array2<T>) -> ArrayViewMut2<'a, T> {
        field.slice_mut(s![self.rows.clone(), self.cols.clone()])
    }
}

/// Splits the grid into row-major tiles. Tiles must divide the grid exactly.
pub fn partition(grid: (usize, usize), tile: (usize, usize)) -> HomeostatResult<Vec<Domain>> {
    let (height, width) = grid;
    let (tile_h, tile_w) = tile;
    if height == 0 || width == 0 {
        return Err(HomeostatError::InvalidGrid { height, width });
    }
    if tile_h == 0 || tile_w == 0 {
        return Err(HomeostatError::InvalidGrid {
            height: tile_h,
            width: tile_w,
        });
    }
    if height % tile_h != 0 || width % tile_w != 0 {
        return Err(HomeostatError::TileMismatch {
            height,
            width,
            tile_h,
            tile_w,
        });
    }
    let per_row = width / tile_w;
    let domains = (0..height / tile_h)
        .flat_map(|bi| (0..per_row).map(move |bj| (bi, bj)))
        .map(|(bi, bj)| Domain {
            id: bi * per_row + bj,
            rows: bi * tile_h..(bi + 1) * tile_h,
            cols: bj * tile_w..(bj + 1) * tile_w,
        })
        .collect();
    Ok(domains)
}

/// Draws the permanent controller-health flags: `round(fraction * n)` distinct
/// domains lose their controller, the rest stay healthy.
pub fn draw_controller_health<R: Rng + ?Sized>(
    domain_count: usize,
    dropout_fraction: f64,
    rng: &mut R,
) -> Vec<bool> {
    let mut health = vec![true; domain_count];
    let fraction = if dropout_fraction.is_finite() {
        dropout_fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let failures = ((fraction * domain_count as f64).round() as usize).min(domain_count);
    if failures > 0 {
        for failed in index::sample(rng, domain_count, failures).iter() {
            health[failed] = false;
        }
    }
    health
}

/// Applies one-time injuries. Entries naming a missing domain are skipped.
pub fn apply_injuries(
    v: &mut Array2<f64>,
    e: &mut Array2<f64>,
    domains: &[Domain],
    injuries: &[Injury],
) {
    for injury in injuries {
        let Some(domain) = usize::try_from(injury.id)
            .ok()
            .and_then(|id| domains.get(id))
        else {
            warn!(id = injury.id, domains = domains.len(), "ignoring injury for unknown domain");
            continue;
        };
        if let Some(delta) = injury.delta_v {
            domain.view_mut(v).mapv_inplace(|value| value + delta);
        }
        if let Some(level) = injury.e0 {
            domain.view_mut(e).fill(level);
        }
        debug!(
            domain = domain.id,
            delta_v = ?injury.delta_v,
            e0 = ?injury.e0,
            "applied injury"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn partition_is_row_major_and_exact() {
        let domains = partition((4, 6), (2, 3)).unwrap();
        assert_eq!(domains.len(), 4);
        assert_eq!(domains[1].rows, 0..2);
        assert_eq!(domains[1].cols, 3..6);
        assert_eq!(domains[2].rows, 2..4);
        assert_eq!(domains[2].cols, 0..3);
        let covered: usize = domains.iter().map(|d| d.rows.len() * d.cols.len()).sum();
        assert_eq!(covered, 24);
    }

    #[test]
    fn partition_rejects_uneven_tiles() {
        assert!(matches!(
            partition((5, 4), (2, 2)),
            Err(HomeostatError::TileMismatch { .. })
        ));
    }

    #[test]
    fn dropout_fails_the_requested_share() {
        let mut rng = StdRng::seed_from_u64(3);
        let health = draw_controller_health(8, 0.25, &mut rng);
        assert_eq!(health.iter().filter(|&&h| !h).count(), 2);
        assert!(draw_controller_health(5, 0.0, &mut rng).iter().all(|&h| h));
        assert!(draw_controller_health(5, 1.0, &mut rng).iter().all(|&h| !h));
    }

    #[test]
    fn dropout_draw_is_seeded() {
        let a = draw_controller_health(16, 0.5, &mut StdRng::seed_from_u64(11));
        let b = draw_controller_health(16, 0.5, &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }

    #[test]
    fn injuries_touch_only_their_domain() {
        let domains = partition((4, 4), (2, 2)).unwrap();
        let mut v = Array2::from_elem((4, 4), -18.0);
        let mut e = Array2::from_elem((4, 4), 0.8);
        let injuries = vec![
            Injury {
                id: 3,
                delta_v: Some(5.0),
                e0: Some(0.1),
            },
            Injury {
                id: 9,
                delta_v: Some(100.0),
                e0: None,
            },
            Injury {
                id: -1,
                delta_v: None,
                e0: Some(0.0),
            },
        ];
        apply_injuries(&mut v, &mut e, &domains, &injuries);
        assert_eq!(v[[3, 3]], -13.0);
        assert_eq!(e[[2, 2]], 0.1);
        assert_eq!(v[[0, 0]], -18.0);
        assert_eq!(e[[1, 3]], 0.8);
        assert_eq!(v.iter().filter(|&&x| x == -13.0).count(), 4);
    }
}
