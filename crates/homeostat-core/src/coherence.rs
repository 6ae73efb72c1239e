// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Oscillation coherence of the grid-mean voltage.
//!
//! The detector keeps a ring buffer of downsampled grid means and measures how
//! tightly the instantaneous phase of that series clusters. Phase comes from
//! the analytic signal (FFT-based Hilbert transform); the phase-locking value
//! is `|mean(exp(iφ))|`. A persistence accumulator debounces the "bad" flag so
//! a brief dip does not open the oscillation gate.

use std::fmt;

use ndarray::ArrayView2;
use num_complex::Complex64;
use rustfft::FftPlanner;

use crate::config::CoherenceParams;
use crate::grid::grid_mean;

/// Samples required before a PLV is reported.
pub const MIN_PLV_SAMPLES: usize = 8;

/// Result of one coherence query.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CoherenceReading {
    /// `None` while fewer than [`MIN_PLV_SAMPLES`] samples are buffered.
    pub plv: Option<f64>,
    pub persistently_bad: bool,
}

pub struct CoherenceDetector {
    params: CoherenceParams,
    dt: f64,
    downsample: usize,
    buffer: Vec<f64>,
    head: usize,
    count: usize,
    acc_steps: usize,
    bad_duration: f64,
    cached_plv: Option<Option<f64>>,
    last_plv: Option<f64>,
    /// A sample arrived since the persistence accumulator last moved.
    fresh: bool,
    planner: FftPlanner<f64>,
}

impl fmt::Debug for CoherenceDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoherenceDetector")
            .field("params", &self.params)
            .field("capacity", &self.buffer.len())
            .field("count", &self.count)
            .field("bad_duration", &self.bad_duration)
            .field("last_plv", &self.last_plv)
            .finish()
    }
}

impl CoherenceDetector {
    pub fn new(params: CoherenceParams, dt: f64) -> Self {
        let downsample = params.downsample.max(1);
        let samples = (params.window_seconds / (dt * downsample as f64)).round();
        let capacity = if samples.is_finite() && samples > 0.0 {
            (samples as usize).max(MIN_PLV_SAMPLES)
        } else {
            MIN_PLV_SAMPLES
        };
        Self {
            params,
            dt,
            downsample,
            buffer: vec![0.0; capacity],
            head: 0,
            count: 0,
            acc_steps: 0,
            bad_duration: 0.0,
            cached_plv: None,
            last_plv: None,
            fresh: false,
            planner: FftPlanner::new(),
        }
    }

    pub fn params(&self) -> &CoherenceParams {
        &self.params
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Interval between buffered samples.
    pub fn sample_interval(&self) -> f64 {
        self.dt * self.downsample as f64
    }

    /// Counts one step and appends the grid mean every `downsample` calls.
    pub fn update(&mut self, v: &ArrayView2<'_, f64>) {
        self.acc_steps += 1;
        if self.acc_steps < self.downsample {
            return;
        }
        self.acc_steps = 0;
        self.push_sample(grid_mean(v));
    }

    fn push_sample(&mut self, value: f64) {
        let capacity = self.buffer.len();
        self.buffer[self.head] = value;
        self.head = (self.head + 1) % capacity;
        self.count = (self.count + 1).min(capacity);
        self.cached_plv = None;
        self.fresh = true;
    }

    /// Buffered samples, oldest first.
    pub fn series(&self) -> Vec<f64> {
        if self.count == self.buffer.len() {
            self.buffer[self.head..]
                .iter()
                .chain(&self.buffer[..self.head])
                .copied()
                .collect()
        } else {
            self.buffer[..self.count].to_vec()
        }
    }

    pub fn last_plv(&self) -> Option<f64> {
        self.last_plv
    }

    /// Current PLV plus the debounced "persistently bad" flag.
    ///
    /// Each new sample advances the bad-duration accumulator by one sample
    /// interval while the PLV sits below `healthy_plv_min`, and drains it
    /// (floored at zero) otherwise. Repeated calls between samples leave it
    /// untouched.
    pub fn plv_with_persistence(&mut self) -> CoherenceReading {
        let plv = self.compute_plv();
        self.last_plv = plv;
        let fresh = std::mem::replace(&mut self.fresh, false);
        let Some(value) = plv else {
            return CoherenceReading {
                plv: None,
                persistently_bad: false,
            };
        };
        let below = value < self.params.healthy_plv_min;
        if self.params.min_bad_duration <= 0.0 {
            return CoherenceReading {
                plv,
                persistently_bad: below,
            };
        }
        let interval = self.sample_interval();
        if !fresh {
            return CoherenceReading {
                plv,
                persistently_bad: self.bad_duration >= self.params.min_bad_duration,
            };
        }
        self.bad_duration = if below {
            self.bad_duration + interval
        } else {
            (self.bad_duration - interval).max(0.0)
        };
        CoherenceReading {
            plv,
            persistently_bad: self.bad_duration >= self.params.min_bad_duration,
        }
    }

    fn compute_plv(&mut self) -> Option<f64> {
        if let Some(cached) = self.cached_plv {
            return cached;
        }
        let plv = if self.count < MIN_PLV_SAMPLES {
            None
        } else {
            let series = self.series();
            let rate = 1.0 / self.sample_interval();
            Some(phase_locking_value(
                &mut self.planner,
                &series,
                self.params.bandpass.map(|band| (band, rate)),
            ))
        };
        self.cached_plv = Some(plv);
        plv
    }
}

/// Phase-locking value of a real series, in `[0, 1]`.
///
/// The series is demeaned first; a numerically flat series yields `0.0`. With
/// a `((low_hz, high_hz), sample_rate)` band, spectral content outside the
/// band is discarded before the phase is extracted.
pub fn phase_locking_value(
    planner: &mut FftPlanner<f64>,
    series: &[f64],
    band: Option<((f64, f64), f64)>,
) -> f64 {
    let n = series.len();
    if n == 0 {
        return 0.0;
    }
    let mean = series.iter().sum::<f64>() / n as f64;
    let centred: Vec<f64> = series.iter().map(|x| x - mean).collect();
    if centred.iter().all(|x| x.abs() <= 1e-8) {
        return 0.0;
    }
    let analytic = analytic_signal(planner, &centred, band);
    if analytic.iter().all(|z| z.norm() <= 1e-12) {
        return 0.0;
    }
    let sum = analytic
        .iter()
        .map(|z| Complex64::from_polar(1.0, z.arg()))
        .fold(Complex64::new(0.0, 0.0), |acc, z| acc + z);
    let plv = (sum / n as f64).norm();
    if plv.is_finite() {
        plv.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Analytic signal via the one-sided spectrum (negative frequencies removed,
/// positive frequencies doubled), optionally band-limited.
pub fn analytic_signal(
    planner: &mut FftPlanner<f64>,
    series: &[f64],
    band: Option<((f64, f64), f64)>,
) -> Vec<Complex64> {
    let n = series.len();
    let mut spectrum: Vec<Complex64> = series.iter().map(|&x| Complex64::new(x, 0.0)).collect();
    if n == 0 {
        return spectrum;
    }
    planner.plan_fft_forward(n).process(&mut spectrum);

    for (k, bin) in spectrum.iter_mut().enumerate() {
        let weight = if k == 0 || (n % 2 == 0 && k == n / 2) {
            1.0
        } else if k < (n + 1) / 2 {
            2.0
        } else {
            0.0
        };
        let keep = match band {
            Some(((low, high), rate)) => {
                let freq = k.min(n - k) as f64 * rate / n as f64;
                freq >= low && freq <= high
            }
            None => true,
        };
        *bin *= if keep { weight } else { 0.0 };
    }

    planner.plan_fft_inverse(n).process(&mut spectrum);
    let scale = 1.0 / n as f64;
    for z in spectrum.iter_mut() {
        *z *= scale;
    }
    spectrum
}
