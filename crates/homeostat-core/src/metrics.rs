// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Run metrics computed once over the logged series.

/// Converts a duration to a whole step count, never below `min`.
fn steps_for(duration: f64, dt: f64, min: usize) -> usize {
    let steps = (duration / dt.max(1e-9)).round();
    if steps.is_finite() && steps > min as f64 {
        steps as usize
    } else {
        min
    }
}

/// First index at which `series` drops below `threshold` and stays there for
/// `dwell_s` seconds.
pub fn compute_recovery_time(
    series: &[f64],
    dt: f64,
    threshold: f64,
    dwell_s: f64,
) -> Option<usize> {
    let dwell_steps = steps_for(dwell_s, dt, 1);
    let mut run = 0usize;
    for (idx, &value) in series.iter().enumerate() {
        run = if value < threshold { run + 1 } else { 0 };
        if run >= dwell_steps {
            return Some(idx + 1 - dwell_steps);
        }
    }
    None
}

/// Fraction of consecutive action pairs that differ after the warm-up.
pub fn compute_flicker_rate(actions: &[u8], dt: f64, warmup_s: f64) -> f64 {
    if actions.is_empty() {
        return 0.0;
    }
    let warmup = steps_for(warmup_s, dt, 0);
    let tail = if warmup < actions.len() {
        &actions[warmup..]
    } else {
        &actions[actions.len() - 1..]
    };
    if tail.len() <= 1 {
        return 0.0;
    }
    let switches = tail.windows(2).filter(|pair| pair[0] != pair[1]).count();
    switches as f64 / (tail.len() - 1) as f64
}

fn mean_defined(values: &[Option<f64>]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Ratio of the mean PLV over the last `window_s` to the first, clipped to
/// `[0, 1]`. Undefined samples are skipped inside each window.
pub fn compute_plv_retention(plv_series: &[Option<f64>], dt: f64, window_s: f64) -> Option<f64> {
    let window = steps_for(window_s, dt, 1);
    if plv_series.len() < 2 * window {
        return None;
    }
    let start = mean_defined(&plv_series[..window])?;
    let end = mean_defined(&plv_series[plv_series.len() - window..])?;
    if start <= 1e-6 {
        return None;
    }
    Some((end / start).clamp(0.0, 1.0))
}
