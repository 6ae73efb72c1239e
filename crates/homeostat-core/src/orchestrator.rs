// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Multi-domain closed-loop driver.
//!
//! Each step reads the shared grids once, lets every domain decide and pulse
//! into its own slice of the actuation field, then advances tissue and energy
//! with the combined field. Domains never read each other's state.

use homeostat_config::determinism::SeedSource;
use ndarray::Array2;
use tracing::{debug_span, info, warn};

use crate::actuator::PulseActuator;
use crate::coherence::CoherenceDetector;
use crate::config::{GateParams, RunConfig};
use crate::decoder::{Decision, DecoderInputs, RulesDecoder};
use crate::domain::{apply_injuries, draw_controller_health, partition, Domain};
use crate::energy::EnergyField;
use crate::error::HomeostatResult;
use crate::gates::{compute_adaptive_emin, energy_gate, geometry_gate, oscillation_gate};
use crate::grid::{grid_mean, CouplingWindow};
use crate::metrics::{compute_flicker_rate, compute_plv_retention, compute_recovery_time};
use crate::records::{DomainRecord, GlobalRecord, RecordSink, RunSummary};
use crate::sensor::Sensor;
use crate::tissue::TissueField;

const NOISE_STREAM: &str = "tissue.noise";
const DROPOUT_STREAM: &str = "domains.dropout";

/// Decision and actuation state owned by one domain.
#[derive(Clone, Debug)]
pub struct DomainController {
    domain: Domain,
    decoder: RulesDecoder,
    actuator: PulseActuator,
    healthy: bool,
    last_action: Decision,
    last_pulse: f64,
}

impl DomainController {
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn decoder(&self) -> &RulesDecoder {
        &self.decoder
    }

    pub fn actuator(&self) -> &PulseActuator {
        &self.actuator
    }

    /// Fixed at construction. An unhealthy controller always rests.
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn last_action(&self) -> Decision {
        self.last_action
    }

    /// Uniform level written into this domain's slice on the last step.
    pub fn last_pulse(&self) -> f64 {
        self.last_pulse
    }
}

/// The sustained-offset clause forces the gate open whenever the slow global
/// offset reaches the decoder's context threshold, even with healthy PLV.
fn oscillation_ok(gates: &GateParams, plv_bad: bool, offset: f64, offset_threshold: f64) -> bool {
    !gates.oscillation || oscillation_gate(plv_bad) || offset >= offset_threshold
}

#[derive(Debug)]
pub struct Orchestrator {
    config: RunConfig,
    tissue: TissueField,
    energy: EnergyField,
    sensor: Sensor,
    coherence: CoherenceDetector,
    coupling: CouplingWindow,
    controllers: Vec<DomainController>,
    actuation: Array2<f64>,
    step_index: usize,
    low_fraction_series: Vec<f64>,
    action_series: Vec<u8>,
    plv_series: Vec<Option<f64>>,
}

impl Orchestrator {
    pub fn new(mut config: RunConfig) -> HomeostatResult<Self> {
        config.validate()?;
        let seeds = SeedSource::new(config.seed);
        let tile = config.tile();
        let domains = partition(config.grid, tile)?;
        let boundary = config.tissue.boundary;

        let noise_rng = seeds.rng_from_optional(config.tissue.noise_seed, NOISE_STREAM);
        let mut tissue = TissueField::new(config.grid, config.dt, config.tissue.clone(), noise_rng)?;
        let mut energy = EnergyField::new(config.grid, config.energy.clone(), boundary);
        let mut sensor = Sensor::new(config.grid, config.dt, config.recorder.clone(), boundary);
        if let Some(reference) = config.tissue.healthy_ref {
            sensor.set_healthy_ref(reference);
        }
        apply_injuries(
            tissue.voltage_mut(),
            energy.energy_mut(),
            &domains,
            &config.domains.injuries,
        );

        config.decoder.healthy_plv_min = config.coherence.healthy_plv_min;
        let mut dropout_rng = seeds.rng_from_optional(config.domains.dropout_seed, DROPOUT_STREAM);
        let health = draw_controller_health(
            domains.len(),
            config.domains.dropout_fraction,
            &mut dropout_rng,
        );

        let controllers: Vec<_> = domains
            .into_iter()
            .zip(health)
            .map(|(domain, healthy)| {
                if !healthy {
                    warn!(domain = domain.id, "controller dropped out");
                }
                DomainController {
                    domain,
                    decoder: RulesDecoder::new(config.decoder.clone(), config.stability.clone()),
                    actuator: PulseActuator::new(config.actuation.clone(), config.dt),
                    healthy,
                    last_action: Decision::Rest,
                    last_pulse: 0.0,
                }
            })
            .collect();

        info!(
            grid = ?config.grid,
            tile = ?tile,
            domains = controllers.len(),
            dropout = config.domains.dropout_fraction,
            steps = config.steps,
            "homeostat initialised"
        );

        Ok(Self {
            coherence: CoherenceDetector::new(config.coherence.clone(), config.dt),
            coupling: CouplingWindow::new(config.logging.coupling_window, boundary),
            actuation: Array2::zeros(config.grid),
            controllers,
            tissue,
            energy,
            sensor,
            step_index: 0,
            low_fraction_series: Vec::with_capacity(config.steps),
            action_series: Vec::with_capacity(config.steps),
            plv_series: Vec::with_capacity(config.steps),
            config,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn tissue(&self) -> &TissueField {
        &self.tissue
    }

    pub fn energy(&self) -> &EnergyField {
        &self.energy
    }

    pub fn sensor(&self) -> &Sensor {
        &self.sensor
    }

    pub fn coherence(&self) -> &CoherenceDetector {
        &self.coherence
    }

    pub fn controllers(&self) -> &[DomainController] {
        &self.controllers
    }

    /// Actuation field applied on the last step.
    pub fn actuation(&self) -> &Array2<f64> {
        &self.actuation
    }

    pub fn steps_taken(&self) -> usize {
        self.step_index
    }

    /// Advances the loop by one step and returns the highest domain action.
    pub fn step<S: RecordSink + ?Sized>(&mut self, sink: &mut S) -> Decision {
        let dt = self.config.dt;
        let t = self.step_index as f64 * dt;

        let voltage = self.tissue.voltage();
        self.coherence.update(&voltage);
        self.sensor.observe(&voltage);
        let reading = self.coherence.plv_with_persistence();
        let global_v_offset = self.sensor.global_v_offset(&voltage);
        self.coupling.push(&voltage);
        let coupling = self.coupling.estimate();

        let low_occ = self.sensor.low_occupancy();
        let mismatch = self.sensor.mismatch();
        let energy = self.energy.energy();
        let mean_v = grid_mean(&voltage);
        let mean_low_occ = grid_mean(&low_occ);
        let mean_mismatch = grid_mean(&mismatch);
        let mean_energy = grid_mean(&energy);
        let low_fraction = self.sensor.domain_low_fraction();

        let gates = &self.config.gates;
        let emin = self.energy.params().emin;
        let emin_eff = compute_adaptive_emin(
            emin,
            self.energy.fraction_below(emin),
            gates.adaptive_emin.enabled,
            gates.adaptive_emin.k,
            gates.adaptive_emin.floor,
        );
        let osc_ok = oscillation_ok(
            gates,
            reading.persistently_bad,
            global_v_offset,
            self.config.decoder.global_v_offset,
        );
        let max_mismatch = gates
            .max_mismatch
            .unwrap_or(self.config.recorder.mismatch_threshold);

        let stride = self.config.logging.stride.max(1);
        let logging = self.step_index % stride == 0;
        let mut domain_rows = Vec::new();
        let mut global_action = Decision::Rest;

        self.actuation.fill(0.0);
        for ctrl in &mut self.controllers {
            let _span = debug_span!("domain", id = ctrl.domain.id).entered();
            let d_low_occ = grid_mean(&ctrl.domain.view_of(&low_occ));
            let d_mismatch = grid_mean(&ctrl.domain.view_of(&mismatch));
            let d_energy = grid_mean(&ctrl.domain.view_of(&energy));
            let d_low_fraction = self.sensor.domain_low_fraction_in(&ctrl.domain);

            let action = if ctrl.healthy {
                ctrl.decoder.decide(&DecoderInputs {
                    low_occupancy: d_low_occ,
                    mismatch: d_mismatch,
                    energy: d_energy,
                    plv: reading.plv,
                    global_v_offset,
                    domain_low_fraction: d_low_fraction,
                })
            } else {
                Decision::Rest
            };

            let energy_ok = !gates.energy || energy_gate(d_energy, emin_eff);
            let geometry_ok = !gates.geometry
                || geometry_gate(d_mismatch, max_mismatch, coupling, gates.min_coupling);
            let allow = ctrl.healthy && action == Decision::Repair && osc_ok && geometry_ok;
            let level = ctrl.actuator.pulse_level(allow, energy_ok, d_low_occ);
            ctrl.domain.view_mut(&mut self.actuation).fill(level);

            ctrl.last_action = action;
            ctrl.last_pulse = level;
            global_action = global_action.max(action);

            if logging {
                domain_rows.push(DomainRecord {
                    t,
                    domain_id: ctrl.domain.id,
                    action: action.code(),
                    mean_v: grid_mean(&ctrl.domain.view_of(&voltage)),
                    low_occ: d_low_occ,
                    mismatch: d_mismatch,
                    energy: d_energy,
                    low_fraction: d_low_fraction,
                    controller_health: if ctrl.healthy { 1.0 } else { 0.0 },
                });
            }
        }

        if logging {
            sink.global(&GlobalRecord {
                t,
                action: global_action.code(),
                mean_v,
                low_occ: mean_low_occ,
                mismatch: mean_mismatch,
                energy: mean_energy,
                plv: reading.plv,
                global_v_offset,
                domain_low_fraction: low_fraction,
                reserved: 0.0,
                coupling,
            });
            for row in &domain_rows {
                sink.domain(row);
            }
        }

        self.low_fraction_series.push(low_fraction);
        self.action_series.push(global_action.code());
        self.plv_series.push(reading.plv);

        self.tissue.step(&self.actuation.view());
        self.energy.step(dt, &self.actuation.view());
        self.step_index += 1;
        global_action
    }

    /// Runs the configured number of steps and summarises them.
    pub fn run<S: RecordSink + ?Sized>(&mut self, sink: &mut S) -> RunSummary {
        for _ in 0..self.config.steps {
            self.step(sink);
        }
        let summary = self.summary();
        info!(
            steps = self.step_index,
            recovery_step = ?summary.recovery_step,
            flicker_rate = summary.flicker_rate,
            plv_retention = ?summary.plv_retention,
            final_mean_v = summary.final_mean_v,
            final_mean_energy = summary.final_mean_energy,
            "run complete"
        );
        summary
    }

    /// Metrics over every step taken so far.
    pub fn summary(&self) -> RunSummary {
        let dt = self.config.dt;
        let metrics = &self.config.metrics;
        RunSummary {
            recovery_step: compute_recovery_time(
                &self.low_fraction_series,
                dt,
                metrics.recovery_threshold,
                metrics.recovery_dwell,
            ),
            flicker_rate: compute_flicker_rate(&self.action_series, dt, metrics.flicker_warmup),
            plv_retention: compute_plv_retention(&self.plv_series, dt, metrics.retention_window),
            final_mean_v: self.tissue.mean_voltage(),
            final_mean_energy: self.energy.mean_energy(),
            final_low_occ: grid_mean(&self.sensor.low_occupancy()),
            domain_count: self.controllers.len(),
            tile: self.config.tile(),
            dropout_fraction: self.config.domains.dropout_fraction,
        }
    }
}
