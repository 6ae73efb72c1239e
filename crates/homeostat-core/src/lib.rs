// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Polarity homeostat: a multi-domain closed-loop controller for the
//! membrane voltage of a 2-D tissue grid.
//!
//! [`Orchestrator`] composes the tissue and energy integrators, the LOW-band
//! [`Sensor`], the PLV [`CoherenceDetector`], per-domain [`RulesDecoder`]s and
//! [`PulseActuator`]s behind the safety gates, and emits [`GlobalRecord`] and
//! [`DomainRecord`] rows into a [`RecordSink`].

use std::sync::OnceLock;

use homeostat_config::tracing::{self as config_tracing, InitError};
use tracing::warn;

pub mod actuator;
pub mod coherence;
pub mod config;
pub mod decoder;
pub mod domain;
pub mod energy;
pub mod error;
pub mod gates;
pub mod grid;
pub mod metrics;
pub mod orchestrator;
pub mod records;
pub mod sensor;
pub mod tissue;

pub use actuator::{hill_response, PulseActuator};
pub use coherence::{phase_locking_value, CoherenceDetector, CoherenceReading};
pub use config::RunConfig;
pub use decoder::{Decision, DecoderInputs, RulesDecoder};
pub use domain::Domain;
pub use energy::EnergyField;
pub use error::{HomeostatError, HomeostatResult};
pub use grid::Boundary;
pub use orchestrator::{DomainController, Orchestrator};
pub use records::{DomainRecord, GlobalRecord, NullSink, RecordSink, RunLog, RunSummary};
pub use sensor::Sensor;
pub use tissue::TissueField;

static INIT_GUARD: OnceLock<Result<(), InitError>> = OnceLock::new();

/// Installs the process-wide tracing subscriber once. Later calls are no-ops.
pub fn init_tracing() {
    let result = INIT_GUARD.get_or_init(|| match config_tracing::init_tracing() {
        Ok(()) => Ok(()),
        Err(InitError::AlreadyInitialised) => Ok(()),
        Err(err) => Err(err),
    });

    if let Err(err) = result {
        warn!("failed to initialise tracing subscriber: {err}");
    }
}
