// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Run configuration surface. Loading from disk is left to the host; every
//! struct deserialises with defaults so partial documents are accepted.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::{HomeostatError, HomeostatResult};
use crate::grid::Boundary;

/// Complete configuration for one closed-loop run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Grid shape as `(rows, cols)`.
    pub grid: (usize, usize),
    pub dt: f64,
    pub steps: usize,
    /// Base seed from which per-component streams are derived.
    pub seed: u64,
    pub tissue: TissueParams,
    pub energy: EnergyParams,
    pub recorder: RecorderParams,
    pub coherence: CoherenceParams,
    pub decoder: RulesThresholds,
    pub stability: DecoderStability,
    pub actuation: ActuationParams,
    pub domains: DomainParams,
    pub gates: GateParams,
    pub logging: LoggingParams,
    pub metrics: MetricsParams,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            grid: (32, 32),
            dt: 1.0,
            steps: 3600,
            seed: 1337,
            tissue: TissueParams::default(),
            energy: EnergyParams::default(),
            recorder: RecorderParams::default(),
            coherence: CoherenceParams::default(),
            decoder: RulesThresholds::default(),
            stability: DecoderStability::default(),
            actuation: ActuationParams::default(),
            domains: DomainParams::default(),
            gates: GateParams::default(),
            logging: LoggingParams::default(),
            metrics: MetricsParams::default(),
        }
    }
}

impl RunConfig {
    /// Decodes a JSON document handed over by the host.
    pub fn from_json_str(raw: &str) -> HomeostatResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Tile shape, defaulting to a single domain spanning the grid.
    pub fn tile(&self) -> (usize, usize) {
        self.domains.tile.unwrap_or(self.grid)
    }

    /// Rejects shapes that cannot be run. Called before any state is built.
    pub fn validate(&self) -> HomeostatResult<()> {
        let (height, width) = self.grid;
        if height == 0 || width == 0 {
            return Err(HomeostatError::InvalidGrid { height, width });
        }
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(HomeostatError::InvalidTimestep(self.dt));
        }
        if !self.tissue.noise_rms.is_finite() || self.tissue.noise_rms < 0.0 {
            return Err(HomeostatError::InvalidNoise(self.tissue.noise_rms));
        }
        let (tile_h, tile_w) = self.tile();
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
        Ok(())
    }
}

/// Membrane dynamics of the tissue grid (voltages in mV).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TissueParams {
    /// Leak reversal potential.
    pub el: f64,
    /// Leak conductance.
    pub gl: f64,
    /// Gap-junction diffusion coefficient.
    pub diffusion: f64,
    pub noise_rms: f64,
    pub boundary: Boundary,
    /// Uniform initial voltage.
    pub v0: f64,
    /// Reference for the global offset estimate. Unset means "first observed mean".
    pub healthy_ref: Option<f64>,
    /// Explicit noise seed; otherwise derived from the run seed.
    pub noise_seed: Option<u64>,
}

impl Default for TissueParams {
    fn default() -> Self {
        Self {
            el: -5.0,
            gl: 0.05,
            diffusion: 0.1,
            noise_rms: 0.0,
            boundary: Boundary::Periodic,
            v0: -18.0,
            healthy_ref: None,
            noise_seed: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyParams {
    pub e0: f64,
    /// Production rate toward the saturating level of 1.
    pub k_oxphos: f64,
    pub gamma_decay: f64,
    /// Energy cost per unit of absolute actuation.
    pub alpha_cost: f64,
    /// Lateral energy diffusion.
    pub beta_flux: f64,
    /// Minimum energy required for nominal pulses.
    pub emin: f64,
}

impl Default for EnergyParams {
    fn default() -> Self {
        Self {
            e0: 0.8,
            k_oxphos: 0.01,
            gamma_decay: 0.002,
            alpha_cost: 0.002,
            beta_flux: 0.0,
            emin: 0.2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderParams {
    /// Voltage at which a cell enters the LOW band.
    pub low_enter: f64,
    /// Voltage at which a LOW cell is released.
    pub low_exit: f64,
    /// Time constant of the LOW occupancy integrator.
    pub tau_low: f64,
    /// Default consensus ceiling for the geometry gate.
    pub mismatch_threshold: f64,
}

impl Default for RecorderParams {
    fn default() -> Self {
        Self {
            low_enter: -15.0,
            low_exit: -8.0,
            tau_low: 600.0,
            mismatch_threshold: 5.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceParams {
    pub window_seconds: f64,
    pub healthy_plv_min: f64,
    pub downsample: usize,
    /// Debounce before a low PLV counts as persistently bad. `<= 0` disables it.
    pub min_bad_duration: f64,
    /// Optional pass band `(low_hz, high_hz)` applied before phase extraction.
    pub bandpass: Option<(f64, f64)>,
}

impl Default for CoherenceParams {
    fn default() -> Self {
        Self {
            window_seconds: 1200.0,
            healthy_plv_min: 0.5,
            downsample: 20,
            min_bad_duration: 0.0,
            bandpass: None,
        }
    }
}

/// Rule thresholds consumed by [`crate::decoder::RulesDecoder`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesThresholds {
    pub low_occ_threshold: f64,
    pub energy_ok: f64,
    pub mismatch_ok: f64,
    /// Synchronised with the coherence configuration by the orchestrator.
    pub healthy_plv_min: f64,
    pub global_v_offset: f64,
    pub domain_low_fraction: f64,
    pub prune_enabled: bool,
    pub prune_low_occ_threshold: f64,
    pub prune_energy_max: f64,
    pub prune_mismatch_min: f64,
    pub prune_dwell_steps: u32,
}

impl Default for RulesThresholds {
    fn default() -> Self {
        Self {
            low_occ_threshold: 0.30,
            energy_ok: 0.35,
            mismatch_ok: 0.30,
            healthy_plv_min: 0.50,
            global_v_offset: 10.0,
            domain_low_fraction: 0.40,
            prune_enabled: false,
            prune_low_occ_threshold: 0.85,
            prune_energy_max: 0.20,
            prune_mismatch_min: 0.60,
            prune_dwell_steps: 200,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderStability {
    pub hysteresis_margin: f64,
    pub decision_dwell: u32,
}

impl Default for DecoderStability {
    fn default() -> Self {
        Self {
            hysteresis_margin: 0.05,
            decision_dwell: 50,
        }
    }
}

/// Reduced pulse parameters used while the energy gate is closed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseCap {
    pub amplitude: f64,
    pub duty: f64,
}

impl Default for PulseCap {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            duty: 0.05,
        }
    }
}

/// Hill shaping of the pulse amplitude by the sensed depolarisation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HillParams {
    pub enabled: bool,
    pub n: f64,
    pub k: f64,
    /// Multiplier applied to the raw signal before the Hill curve.
    pub scale: f64,
}

impl Default for HillParams {
    fn default() -> Self {
        Self {
            enabled: true,
            n: 2.0,
            k: 0.3,
            scale: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuationParams {
    /// `false` silences every actuator (the no-actuation ablation arm).
    pub enabled: bool,
    pub amplitude: f64,
    pub duty: f64,
    pub period: f64,
    pub refractory: f64,
    pub low_energy: PulseCap,
    pub hill: HillParams,
}

impl Default for ActuationParams {
    fn default() -> Self {
        Self {
            enabled: true,
            amplitude: 4.0,
            duty: 0.1,
            period: 60.0,
            refractory: 120.0,
            low_energy: PulseCap::default(),
            hill: HillParams::default(),
        }
    }
}

/// One-time perturbation of a single domain at run start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Injury {
    /// Domain index; out-of-range values are ignored. A missing id names no
    /// domain.
    #[serde(default = "Injury::unassigned_id")]
    pub id: i64,
    /// Additive voltage offset.
    #[serde(default)]
    pub delta_v: Option<f64>,
    /// Absolute energy level.
    #[serde(default)]
    pub e0: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainParams {
    /// Tile shape `(rows, cols)`; `None` keeps the whole grid as one domain.
    pub tile: Option<(usize, usize)>,
    /// Fraction of domain controllers that fail permanently at start.
    pub dropout_fraction: f64,
    pub dropout_seed: Option<u64>,
    /// Entries that fail to decode (including `null`) are dropped.
    #[serde(deserialize_with = "lenient_injuries")]
    pub injuries: Vec<Injury>,
}

impl Injury {
    fn unassigned_id() -> i64 {
        -1
    }
}

fn lenient_injuries<'de, D>(deserializer: D) -> Result<Vec<Injury>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Injury>(entry) {
            Ok(injury) => Some(injury),
            Err(err) => {
                warn!(%err, "skipping malformed injury entry");
                None
            }
        })
        .collect())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveEminParams {
    pub enabled: bool,
    pub k: f64,
    pub floor: f64,
}

impl Default for AdaptiveEminParams {
    fn default() -> Self {
        Self {
            enabled: false,
            k: 0.5,
            floor: 0.05,
        }
    }
}

/// Safety interlocks. A disabled gate always permits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateParams {
    pub energy: bool,
    pub oscillation: bool,
    pub geometry: bool,
    pub adaptive_emin: AdaptiveEminParams,
    /// Consensus ceiling; falls back to `recorder.mismatch_threshold`.
    pub max_mismatch: Option<f64>,
    pub min_coupling: f64,
}

impl Default for GateParams {
    fn default() -> Self {
        Self {
            energy: true,
            oscillation: true,
            geometry: true,
            adaptive_emin: AdaptiveEminParams::default(),
            max_mismatch: None,
            min_coupling: 0.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingParams {
    /// Records are emitted on steps that are multiples of the stride.
    pub stride: usize,
    /// Capacity of the coupling estimator window.
    pub coupling_window: usize,
}

impl Default for LoggingParams {
    fn default() -> Self {
        Self {
            stride: 10,
            coupling_window: 50,
        }
    }
}

/// Parameters of the end-of-run summary metrics (durations in seconds).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsParams {
    pub recovery_threshold: f64,
    pub recovery_dwell: f64,
    pub flicker_warmup: f64,
    pub retention_window: f64,
}

impl Default for MetricsParams {
    fn default() -> Self {
        Self {
            recovery_threshold: 0.10,
            recovery_dwell: 60.0,
            flicker_warmup: 0.0,
            retention_window: 300.0,
        }
    }
}
