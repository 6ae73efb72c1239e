// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Safety interlocks. All four are pure functions of their inputs.

/// Permits nominal actuation while mean energy sits at or above the floor.
pub fn energy_gate(e_mean: f64, emin_eff: f64) -> bool {
    e_mean >= emin_eff
}

/// Relaxes the energy floor as more of the tissue is already starved:
/// `max(floor, emin * (1 - k * low_energy_fraction))`.
pub fn compute_adaptive_emin(
    emin: f64,
    low_energy_fraction: f64,
    enabled: bool,
    k: f64,
    floor: f64,
) -> f64 {
    if !enabled {
        return emin;
    }
    floor.max(emin * (1.0 - k * low_energy_fraction))
}

/// Actuation is warranted only once global coherence has persistently broken down.
pub fn oscillation_gate(plv_persistently_bad: bool) -> bool {
    plv_persistently_bad
}

/// Requires neighbourhood consensus when the tissue is coupled. An absent or
/// non-finite coupling estimate never blocks, and neither does an estimate
/// below `min_coupling`.
pub fn geometry_gate(
    mismatch_mean: f64,
    max_mismatch: f64,
    coupling_estimate: Option<f64>,
    min_coupling: f64,
) -> bool {
    match coupling_estimate {
        Some(coupling) if coupling.is_finite() => {
            coupling < min_coupling || mismatch_mean <= max_mismatch
        }
        _ => true,
    }
}
